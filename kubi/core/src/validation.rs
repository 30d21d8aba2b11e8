//! Cross-resource health checks over a snapshot.
//!
//! Each rule is an independent, pure function of the snapshot. A rule aggregates everything it
//! implicates into a single finding (`pods-not-ready` is the exception, reporting once per
//! service), and a rule that implicates nothing produces no finding.

use crate::{
    index::{self, PodsByNamespace, ServiceIndex, SlicesByService},
    rbac,
};
use kubi_k8s_api::{Pod, ResourceExt, ResourceId, ResourceSnapshot, Selector};
use serde::Serialize;
use tracing::trace;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub details: String,
    pub objects: Vec<String>,
}

type Rule = fn(&ResourceSnapshot) -> Vec<Finding>;

const RULES: [(&str, Rule); 8] = [
    ("services-no-endpoints", services_without_endpoints),
    ("pods-not-ready", pods_not_ready_behind_service),
    ("ingress-missing-service", ingress_missing_service),
    ("endpointslice-missing-service", endpoint_slices_without_service),
    ("node-pressure", node_pressure),
    ("pvc-pending", pvcs_pending),
    ("rbac-cluster-admin", rbac_cluster_admin),
    ("rbac-wildcards", rbac_wildcards),
];

/// The node conditions that indicate pressure when true.
const PRESSURE_CONDITIONS: [&str; 4] = [
    "MemoryPressure",
    "DiskPressure",
    "PIDPressure",
    "NetworkUnavailable",
];

const CLUSTER_ADMIN: &str = "cluster-admin";

/// Runs every rule over the snapshot, returning findings ordered by severity (critical first),
/// then title, then id.
pub fn validate(snapshot: &ResourceSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (rule, check) in RULES.iter() {
        let found = check(snapshot);
        trace!(%rule, findings = found.len());
        findings.extend(found.into_iter().filter(|f| !f.objects.is_empty()));
    }

    findings.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.id.cmp(&b.id))
    });
    findings
}

// === impl Finding ===

impl Finding {
    /// Builds a finding, or nothing if no objects are implicated.
    fn aggregate(
        id: impl ToString,
        severity: Severity,
        title: &str,
        details: impl ToString,
        objects: Vec<String>,
    ) -> Option<Self> {
        if objects.is_empty() {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            severity,
            title: title.to_string(),
            details: details.to_string(),
            objects,
        })
    }
}

/// Flags services (other than `ExternalName` services) that no endpoint slice reports an address
/// for.
fn services_without_endpoints(snapshot: &ResourceSnapshot) -> Vec<Finding> {
    let slices = SlicesByService::new(&snapshot.endpoint_slices);

    let missing = snapshot
        .services
        .iter()
        .filter(|svc| {
            svc.spec.as_ref().and_then(|s| s.type_.as_deref()) != Some("ExternalName")
        })
        .map(ResourceId::of)
        .filter(|id| {
            slices
                .get(&id.namespace, &id.name)
                .iter()
                .all(|slice| index::address_count(slice) == 0)
        })
        .map(|id| id.to_string())
        .collect();

    Finding::aggregate(
        "services-no-endpoints",
        Severity::Warning,
        "Services without endpoints",
        "Services have no ready endpoints in EndpointSlices.",
        missing,
    )
    .into_iter()
    .collect()
}

/// Reports, once per service, pods that the service selects but that are not Ready.
fn pods_not_ready_behind_service(snapshot: &ResourceSnapshot) -> Vec<Finding> {
    let pods = PodsByNamespace::new(&snapshot.pods);

    let mut findings = Vec::new();
    for svc in &snapshot.services {
        let selector =
            Selector::from_optional(svc.spec.as_ref().and_then(|s| s.selector.as_ref()));
        if selector.is_empty() {
            continue;
        }

        let id = ResourceId::of(svc);
        let not_ready = pods
            .get(&id.namespace)
            .iter()
            .filter(|pod| selector.matches(pod.labels()))
            .filter(|pod| !pod_ready(pod))
            .map(|pod| ResourceId::of(*pod).to_string())
            .collect();

        findings.extend(Finding::aggregate(
            format!("pods-not-ready-{}-{}", id.namespace, id.name),
            Severity::Warning,
            "Pods not Ready behind Service",
            format!("Service {id} has pods that are not Ready."),
            not_ready,
        ));
    }
    findings
}

fn ingress_missing_service(snapshot: &ResourceSnapshot) -> Vec<Finding> {
    let services = ServiceIndex::new(&snapshot.services);

    let mut missing = Vec::new();
    for ingress in &snapshot.ingresses {
        let id = ResourceId::of(ingress);
        for backend in index::ingress_backends(ingress) {
            if !services.contains(&id.namespace, &backend.service) {
                missing.push(format!("{id} -> {}", backend.service));
            }
        }
    }

    Finding::aggregate(
        "ingress-missing-service",
        Severity::Warning,
        "Ingress points to missing Service",
        "Ingress backend references a Service that does not exist.",
        missing,
    )
    .into_iter()
    .collect()
}

fn endpoint_slices_without_service(snapshot: &ResourceSnapshot) -> Vec<Finding> {
    let services = ServiceIndex::new(&snapshot.services);

    let missing = snapshot
        .endpoint_slices
        .iter()
        .filter_map(|slice| {
            let svc = index::owning_service(slice)?;
            let id = ResourceId::of(slice);
            (!services.contains(&id.namespace, svc)).then(|| id.to_string())
        })
        .collect();

    Finding::aggregate(
        "endpointslice-missing-service",
        Severity::Warning,
        "EndpointSlice without Service",
        "EndpointSlices reference a Service that is missing.",
        missing,
    )
    .into_iter()
    .collect()
}

fn node_pressure(snapshot: &ResourceSnapshot) -> Vec<Finding> {
    let mut issues = Vec::new();
    for node in &snapshot.nodes {
        let conditions = node.status.as_ref().and_then(|s| s.conditions.as_ref());
        for condition in conditions.into_iter().flatten() {
            if condition.status == "True" && PRESSURE_CONDITIONS.contains(&condition.type_.as_str())
            {
                issues.push(format!("{} ({})", node.name_any(), condition.type_));
            }
        }
    }

    Finding::aggregate(
        "node-pressure",
        Severity::Critical,
        "Node pressure conditions",
        "Nodes report pressure conditions or network unavailable.",
        issues,
    )
    .into_iter()
    .collect()
}

fn pvcs_pending(snapshot: &ResourceSnapshot) -> Vec<Finding> {
    let pending = snapshot
        .pvcs
        .iter()
        .filter(|pvc| pvc.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Pending"))
        .map(|pvc| ResourceId::of(pvc).to_string())
        .collect();

    Finding::aggregate(
        "pvc-pending",
        Severity::Warning,
        "PVCs stuck Pending",
        "Some PersistentVolumeClaims are not bound.",
        pending,
    )
    .into_iter()
    .collect()
}

/// Flags cluster role bindings to `cluster-admin`. Namespaced role bindings that reference the
/// `cluster-admin` cluster role are not flagged.
fn rbac_cluster_admin(snapshot: &ResourceSnapshot) -> Vec<Finding> {
    let bindings = snapshot
        .cluster_role_bindings
        .iter()
        .filter(|b| b.role_ref.name.eq_ignore_ascii_case(CLUSTER_ADMIN))
        .map(|b| b.name_any())
        .collect();

    Finding::aggregate(
        "rbac-cluster-admin",
        Severity::Warning,
        "Cluster-admin bindings",
        "ClusterRoleBindings grant cluster-admin privileges.",
        bindings,
    )
    .into_iter()
    .collect()
}

fn rbac_wildcards(snapshot: &ResourceSnapshot) -> Vec<Finding> {
    let roles = snapshot
        .roles
        .iter()
        .filter(|role| rbac::has_wildcard_rule(role.rules.as_deref()))
        .map(|role| ResourceId::of(role).to_string());
    let cluster_roles = snapshot
        .cluster_roles
        .iter()
        .filter(|role| rbac::has_wildcard_rule(role.rules.as_deref()))
        .map(|role| role.name_any());

    Finding::aggregate(
        "rbac-wildcards",
        Severity::Warning,
        "RBAC wildcard permissions",
        "Roles contain wildcard verbs or resources.",
        roles.chain(cluster_roles).collect(),
    )
    .into_iter()
    .collect()
}

/// A pod is Ready iff its `Ready` condition is `True`.
pub fn pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|c| c.status == "True")
}
