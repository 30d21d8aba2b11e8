use crate::{
    core::{build_ports, validate, EffectivePermissions, Topology, Traffic},
    fetch::{Fetcher, DEFAULT_PAGE_SIZE},
    k8s::Scope,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};
use tokio::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[clap(
    name = "kubi",
    version,
    about = "Correlates Kubernetes resources into topology, health findings, and permissions"
)]
pub struct Args {
    #[clap(long, default_value = "warn", env = "KUBI_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain", env = "KUBI_LOG_FORMAT")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// Restricts namespaced collections to a single namespace. All namespaces are listed when
    /// unset.
    #[clap(long, short = 'n', env = "KUBI_NAMESPACE")]
    namespace: Option<String>,

    /// Bounds each list call, including all of its pages.
    #[clap(long, default_value = "10000")]
    request_timeout_ms: u64,

    #[clap(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Filters pods, services, endpoint slices, ingresses, PVCs and network policies.
    #[clap(long, short = 'l')]
    label_selector: Option<String>,

    #[clap(long)]
    pretty: bool,

    /// Writes the JSON document to a file instead of stdout.
    #[clap(long, short = 'o')]
    output: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Prints the resource graph.
    Topology,

    /// Prints cross-resource health findings.
    Validate,

    /// Prints the rules granted to a service account in `--namespace`.
    Permissions {
        #[clap(long)]
        service_account: String,
    },

    /// Prints service, container and ingress ports.
    Ports,

    /// Prints service selection, ingress routes and network policies.
    Traffic,
}

struct Output {
    pretty: bool,
    path: Option<PathBuf>,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            namespace,
            request_timeout_ms,
            page_size,
            label_selector,
            pretty,
            output,
            command,
        } = self;

        log_format
            .try_init(log_level)
            .expect("must configure logging");

        let scope = Scope::from_namespace(namespace.as_deref());
        let timeout = Duration::from_millis(request_timeout_ms);
        info!(%scope, ?timeout, ?command, "Fetching");

        let client = client.try_client().await?;
        let fetcher = Fetcher::new(client, scope, timeout)
            .with_page_size(page_size)
            .with_label_selector(label_selector);
        let output = Output { pretty, path: output };

        match command {
            Command::Topology => {
                let snapshot = fetcher.topology().await?;
                output.write(&Topology::from_snapshot(&snapshot))
            }
            Command::Validate => {
                let snapshot = fetcher.validation().await?;
                output.write(&validate(&snapshot))
            }
            Command::Permissions { service_account } => {
                let snapshot = fetcher.permissions().await?;
                let ns = fetcher.scope().namespace().unwrap_or_default();
                output.write(&EffectivePermissions::resolve(
                    ns,
                    &service_account,
                    &snapshot,
                ))
            }
            Command::Ports => {
                let snapshot = fetcher.ports().await?;
                output.write(&build_ports(
                    &snapshot.pods,
                    &snapshot.services,
                    &snapshot.endpoint_slices,
                    &snapshot.ingresses,
                ))
            }
            Command::Traffic => {
                let snapshot = fetcher.traffic().await?;
                output.write(&Traffic::from_snapshot(&snapshot))
            }
        }
    }
}

// === impl Output ===

impl Output {
    fn encode<T: Serialize>(&self, value: &T) -> serde_json::Result<Vec<u8>> {
        let mut json = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        json.push(b'\n');
        Ok(json)
    }

    fn write<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = self.encode(value)?;
        match &self.path {
            Some(path) => fs::write(path, &json)
                .with_context(|| format!("failed to write {}", path.display()))?,
            None => io::stdout().lock().write_all(&json)?,
        }
        debug!(bytes = json.len(), "Wrote output");
        Ok(())
    }
}
