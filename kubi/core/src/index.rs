//! Lookup tables for the heuristic joins between resource collections.
//!
//! Each table is built once per correlation pass and borrows from the snapshot it indexes.

use ahash::AHashMap as HashMap;
use kubi_k8s_api::{
    EndpointSlice, Ingress, Pod, ResourceExt, ResourceId, Service, LABEL_SERVICE_NAME,
};

/// Indexes services by namespace and name.
#[derive(Debug, Default)]
pub struct ServiceIndex<'a> {
    by_id: HashMap<ResourceId, &'a Service>,
}

/// Indexes pods by their status IP.
#[derive(Debug, Default)]
pub struct PodIpIndex<'a> {
    by_ip: HashMap<&'a str, &'a Pod>,
}

/// Groups pods by namespace, preserving input order within a namespace.
#[derive(Debug, Default)]
pub struct PodsByNamespace<'a> {
    by_ns: HashMap<String, Vec<&'a Pod>>,
}

/// Groups endpoint slices by the service that owns them, preserving input order.
#[derive(Debug, Default)]
pub struct SlicesByService<'a> {
    by_service: HashMap<ResourceId, Vec<&'a EndpointSlice>>,
}

/// A service reference extracted from an ingress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressBackend {
    /// The rule's host, `*` for the default backend.
    pub host: String,

    /// The path, `*` for the default backend.
    pub path: String,

    /// The referenced service's name, in the ingress's namespace.
    pub service: String,

    /// The service port number, or its name when no number is set.
    pub port: String,
}

// === impl ServiceIndex ===

impl<'a> ServiceIndex<'a> {
    pub fn new(services: &'a [Service]) -> Self {
        let by_id = services
            .iter()
            .map(|svc| (ResourceId::of(svc), svc))
            .collect();
        Self { by_id }
    }

    pub fn get(&self, ns: &str, name: &str) -> Option<&'a Service> {
        self.by_id.get(&ResourceId::new(ns, name)).copied()
    }

    #[inline]
    pub fn contains(&self, ns: &str, name: &str) -> bool {
        self.get(ns, name).is_some()
    }
}

// === impl PodIpIndex ===

impl<'a> PodIpIndex<'a> {
    /// Pods without an IP are skipped. When several pods report the same IP, the last one wins:
    /// IPs are reused as pods come and go.
    pub fn new(pods: &'a [Pod]) -> Self {
        let mut by_ip = HashMap::with_capacity(pods.len());
        for pod in pods {
            if let Some(ip) = pod_ip(pod) {
                by_ip.insert(ip, pod);
            }
        }
        Self { by_ip }
    }

    pub fn get(&self, ip: &str) -> Option<&'a Pod> {
        self.by_ip.get(ip).copied()
    }
}

// === impl PodsByNamespace ===

impl<'a> PodsByNamespace<'a> {
    pub fn new(pods: &'a [Pod]) -> Self {
        let mut by_ns = HashMap::<String, Vec<&'a Pod>>::default();
        for pod in pods {
            by_ns
                .entry(pod.namespace().unwrap_or_default())
                .or_default()
                .push(pod);
        }
        Self { by_ns }
    }

    pub fn get(&self, ns: &str) -> &[&'a Pod] {
        self.by_ns.get(ns).map(Vec::as_slice).unwrap_or_default()
    }
}

// === impl SlicesByService ===

impl<'a> SlicesByService<'a> {
    /// Slices without an owning-service label are not indexed.
    pub fn new(slices: &'a [EndpointSlice]) -> Self {
        let mut by_service = HashMap::<ResourceId, Vec<&'a EndpointSlice>>::default();
        for slice in slices {
            if let Some(svc) = owning_service(slice) {
                let id = ResourceId::new(slice.namespace().unwrap_or_default(), svc);
                by_service.entry(id).or_default().push(slice);
            }
        }
        Self { by_service }
    }

    pub fn get(&self, ns: &str, service: &str) -> &[&'a EndpointSlice] {
        self.by_service
            .get(&ResourceId::new(ns, service))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Returns the name of the service an endpoint slice serves, if it is labeled with one.
pub fn owning_service(slice: &EndpointSlice) -> Option<&str> {
    slice
        .labels()
        .get(LABEL_SERVICE_NAME)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

/// Returns the pod's status IP, if one has been assigned.
pub fn pod_ip(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()?
        .pod_ip
        .as_deref()
        .filter(|ip| !ip.is_empty())
}

/// Counts the addresses across all endpoints of a slice, regardless of readiness.
pub fn address_count(slice: &EndpointSlice) -> usize {
    slice.endpoints.iter().map(|ep| ep.addresses.len()).sum()
}

/// Lists an ingress's service backends: the default backend first, then every HTTP path backend
/// across every rule. Backends that reference a non-service resource are skipped.
pub fn ingress_backends(ingress: &Ingress) -> Vec<IngressBackend> {
    let Some(spec) = ingress.spec.as_ref() else {
        return Vec::new();
    };

    let mut backends = Vec::new();
    if let Some(svc) = spec
        .default_backend
        .as_ref()
        .and_then(|backend| backend.service.as_ref())
    {
        backends.push(IngressBackend {
            host: "*".to_string(),
            path: "*".to_string(),
            service: svc.name.clone(),
            port: backend_port(svc.port.as_ref()),
        });
    }

    for rule in spec.rules.iter().flatten() {
        let Some(http) = rule.http.as_ref() else {
            continue;
        };
        for path in &http.paths {
            if let Some(svc) = path.backend.service.as_ref() {
                backends.push(IngressBackend {
                    host: rule.host.clone().unwrap_or_default(),
                    path: path.path.clone().unwrap_or_default(),
                    service: svc.name.clone(),
                    port: backend_port(svc.port.as_ref()),
                });
            }
        }
    }

    backends
}

fn backend_port(port: Option<&k8s_openapi::api::networking::v1::ServiceBackendPort>) -> String {
    let Some(port) = port else {
        return String::new();
    };
    match port.number {
        Some(n) if n > 0 => n.to_string(),
        _ => port.name.clone().unwrap_or_default(),
    }
}
