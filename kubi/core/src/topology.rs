//! Assembles nodes, pods, services, endpoint slices, and ingresses into a typed graph.

use crate::index::{self, PodIpIndex, ServiceIndex};
use ahash::AHashSet as HashSet;
use kubi_k8s_api::{
    api::core::v1::NodeCondition, EndpointSlice, Ingress, Map, Node, Pod, ResourceExt,
    ResourceSnapshot, Service,
};
use serde::Serialize;
use tracing::{debug, trace};

/// The kinds of object that appear in the graph.
///
/// Variants are declared in the lexical order of their names so that sorting by kind is the
/// same as sorting by kind string.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum NodeKind {
    EndpointSlice,
    Ingress,
    Node,
    Pod,
    Service,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EdgeKind {
    ServiceToEndpointSlice,
    EndpointSliceToPod,
    IngressToService,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyNode {
    /// `kind:namespace/name`, or `kind:name` for cluster-scoped kinds. Unique within a graph.
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub labels: Map,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Topology {
    /// Sorted by kind, then name.
    pub nodes: Vec<TopologyNode>,

    /// In discovery order.
    pub edges: Vec<TopologyEdge>,
}

/// Accumulates the graph, enforcing that keys are unique and that edges never dangle.
#[derive(Debug, Default)]
struct Builder {
    nodes: Vec<TopologyNode>,
    keys: HashSet<String>,
    edges: Vec<TopologyEdge>,
    edge_ids: HashSet<String>,
}

/// Builds the topology graph. Missing or empty collections simply produce a smaller graph.
pub fn build_topology(
    nodes: &[Node],
    pods: &[Pod],
    services: &[Service],
    ingresses: &[Ingress],
    slices: &[EndpointSlice],
) -> Topology {
    let mut graph = Builder::default();

    for pod in pods {
        let status = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_default();
        graph.push_node(NodeKind::Pod, pod, status);
    }
    for node in nodes {
        let conditions = node.status.as_ref().and_then(|s| s.conditions.as_deref());
        graph.push_node(NodeKind::Node, node, node_ready_status(conditions).to_string());
    }
    for svc in services {
        let status = svc
            .spec
            .as_ref()
            .and_then(|s| s.type_.clone())
            .unwrap_or_default();
        graph.push_node(NodeKind::Service, svc, status);
    }
    for slice in slices {
        graph.push_node(NodeKind::EndpointSlice, slice, endpoint_slice_status(slice));
    }
    for ingress in ingresses {
        let class = ingress
            .spec
            .as_ref()
            .and_then(|s| s.ingress_class_name.clone())
            .unwrap_or_default();
        graph.push_node(NodeKind::Ingress, ingress, class);
    }

    let pods_by_ip = PodIpIndex::new(pods);
    let services = ServiceIndex::new(services);

    for slice in slices {
        let Some(svc_name) = index::owning_service(slice) else {
            continue;
        };
        let ns = slice.namespace().unwrap_or_default();
        let slice_key = NodeKind::EndpointSlice.key(&ns, &slice.name_any());

        // An orphaned slice stays in the graph as a node but contributes no edges.
        if !services.contains(&ns, svc_name) {
            trace!(
                %ns,
                slice = %slice.name_any(),
                service = %svc_name,
                "Owning service not found"
            );
            continue;
        }
        let svc_key = NodeKind::Service.key(&ns, svc_name);
        graph.push_edge(
            svc_key,
            slice_key.clone(),
            EdgeKind::ServiceToEndpointSlice,
            None,
        );

        for address in slice.endpoints.iter().flat_map(|ep| ep.addresses.iter()) {
            match pods_by_ip.get(address) {
                Some(pod) => {
                    let pod_key = key_of(NodeKind::Pod, pod);
                    graph.push_edge(
                        slice_key.clone(),
                        pod_key,
                        EdgeKind::EndpointSliceToPod,
                        None,
                    );
                }
                None => trace!(
                    %ns,
                    slice = %slice.name_any(),
                    %address,
                    "Address does not resolve to a pod"
                ),
            }
        }
    }

    for ingress in ingresses {
        let ns = ingress.namespace().unwrap_or_default();
        let ingress_key = NodeKind::Ingress.key(&ns, &ingress.name_any());
        for backend in index::ingress_backends(ingress) {
            if !services.contains(&ns, &backend.service) {
                trace!(
                    %ns,
                    ingress = %ingress.name_any(),
                    service = %backend.service,
                    "Backend service not found"
                );
                continue;
            }
            let svc_key = NodeKind::Service.key(&ns, &backend.service);
            graph.push_edge(
                ingress_key.clone(),
                svc_key,
                EdgeKind::IngressToService,
                Some(&backend.service),
            );
        }
    }

    graph.finish()
}

// === impl Topology ===

impl Topology {
    pub fn from_snapshot(snapshot: &ResourceSnapshot) -> Self {
        build_topology(
            &snapshot.nodes,
            &snapshot.pods,
            &snapshot.services,
            &snapshot.ingresses,
            &snapshot.endpoint_slices,
        )
    }
}

// === impl NodeKind ===

impl NodeKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::EndpointSlice => "endpointslice",
            Self::Ingress => "ingress",
            Self::Node => "node",
            Self::Pod => "pod",
            Self::Service => "service",
        }
    }

    #[inline]
    pub fn is_namespaced(self) -> bool {
        !matches!(self, Self::Node)
    }

    /// Formats the identity key for an object of this kind.
    pub fn key(self, ns: &str, name: &str) -> String {
        if self.is_namespaced() {
            format!("{}:{}/{}", self.prefix(), ns, name)
        } else {
            format!("{}:{}", self.prefix(), name)
        }
    }
}

// === impl Builder ===

impl Builder {
    fn push_node<K: ResourceExt>(&mut self, kind: NodeKind, obj: &K, status: String) {
        let id = key_of(kind, obj);
        if !self.keys.insert(id.clone()) {
            debug!(%id, "Skipping object with duplicate identity");
            return;
        }

        let namespace = if kind.is_namespaced() {
            obj.namespace().filter(|ns| !ns.is_empty())
        } else {
            None
        };
        self.nodes.push(TopologyNode {
            id,
            kind,
            name: obj.name_any(),
            namespace,
            status,
            labels: obj.labels().clone(),
        });
    }

    fn push_edge(&mut self, from: String, to: String, kind: EdgeKind, suffix: Option<&str>) {
        if !self.keys.contains(&from) || !self.keys.contains(&to) {
            trace!(%from, %to, ?kind, "Dropping dangling edge");
            return;
        }

        let id = match suffix {
            Some(suffix) => format!("{from}->{to}:{suffix}"),
            None => format!("{from}->{to}"),
        };
        if !self.edge_ids.insert(id.clone()) {
            return;
        }
        self.edges.push(TopologyEdge { id, from, to, kind });
    }

    fn finish(self) -> Topology {
        let Self {
            mut nodes, edges, ..
        } = self;
        nodes.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        Topology { nodes, edges }
    }
}

fn key_of<K: ResourceExt>(kind: NodeKind, obj: &K) -> String {
    kind.key(&obj.namespace().unwrap_or_default(), &obj.name_any())
}

/// Derives `Ready`, `NotReady`, or `Unknown` from a node's `Ready` condition.
pub fn node_ready_status(conditions: Option<&[NodeCondition]>) -> &'static str {
    match conditions
        .unwrap_or_default()
        .iter()
        .find(|c| c.type_ == "Ready")
    {
        Some(c) if c.status == "True" => "Ready",
        Some(_) => "NotReady",
        None => "Unknown",
    }
}

/// Formats `Ready <ready>/<total>`, where `ready` counts only the addresses of endpoints whose
/// `ready` condition is explicitly true.
pub fn endpoint_slice_status(slice: &EndpointSlice) -> String {
    let total = index::address_count(slice);
    let ready: usize = slice
        .endpoints
        .iter()
        .filter(|ep| ep.conditions.as_ref().and_then(|c| c.ready) == Some(true))
        .map(|ep| ep.addresses.len())
        .sum();
    format!("Ready {ready}/{total}")
}
