use super::*;
use crate::topology::{build_topology, EdgeKind, NodeKind, Topology};
use ahash::AHashSet as HashSet;
use kubi_k8s_api::{ResourceSnapshot, Scope};
use pretty_assertions::assert_eq;

fn web_snapshot() -> ResourceSnapshot {
    ResourceSnapshot::new(Scope::Namespace("default".to_string()))
        .with_nodes(Some(vec![mk_node("node-a", Some(("Ready", "True")))]))
        .with_pods(Some(vec![
            mk_pod("default", "web-1", Some("10.0.0.1"), Some(("app", "web")), true),
            mk_pod("default", "web-2", Some("10.0.0.2"), Some(("app", "web")), false),
        ]))
        .with_services(Some(vec![mk_service(
            "default",
            "web",
            "ClusterIP",
            Some(("app", "web")),
        )]))
        .with_endpoint_slices(Some(vec![mk_slice(
            "default",
            "web-abc",
            Some("web"),
            vec![
                ("10.0.0.1", Some(true)),
                ("10.0.0.2", Some(false)),
                ("192.168.1.10", None),
            ],
        )]))
        .with_ingresses(Some(vec![mk_ingress(
            "default",
            "web",
            Some("web"),
            vec![("web.example.com", "/", "web"), ("web.example.com", "/api", "api")],
        )]))
}

fn assert_no_dangling_edges(topology: &Topology) {
    let keys = topology
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .collect::<HashSet<_>>();
    for edge in &topology.edges {
        assert!(keys.contains(edge.from.as_str()), "dangling from: {edge:?}");
        assert!(keys.contains(edge.to.as_str()), "dangling to: {edge:?}");
    }
}

#[test]
fn empty_snapshot_is_empty_graph() {
    let topology = build_topology(&[], &[], &[], &[], &[]);
    assert_eq!(topology, Topology::default());
}

#[test]
fn nodes_are_sorted_by_kind_then_name() {
    let topology = Topology::from_snapshot(&web_snapshot());
    let ids = topology
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            "endpointslice:default/web-abc",
            "ingress:default/web",
            "node:node-a",
            "pod:default/web-1",
            "pod:default/web-2",
            "service:default/web",
        ]
    );
}

#[test]
fn statuses() {
    let topology = Topology::from_snapshot(&web_snapshot());
    let status = |id: &str| {
        topology
            .nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.status.clone())
            .expect("node must exist")
    };
    assert_eq!(status("endpointslice:default/web-abc"), "Ready 1/3");
    assert_eq!(status("ingress:default/web"), "nginx");
    assert_eq!(status("node:node-a"), "Ready");
    assert_eq!(status("pod:default/web-1"), "Running");
    assert_eq!(status("service:default/web"), "ClusterIP");
}

#[test]
fn node_ready_status() {
    let nodes = vec![
        mk_node("ready", Some(("Ready", "True"))),
        mk_node("not-ready", vec![("MemoryPressure", "False"), ("Ready", "False")]),
        mk_node("unknown", Some(("DiskPressure", "False"))),
    ];
    let topology = build_topology(&nodes, &[], &[], &[], &[]);
    let statuses = topology
        .nodes
        .iter()
        .map(|n| (n.name.as_str(), n.status.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![
            ("not-ready", "NotReady"),
            ("ready", "Ready"),
            ("unknown", "Unknown")
        ]
    );
    assert!(topology.nodes.iter().all(|n| n.namespace.is_none()));
}

#[test]
fn edges_in_discovery_order() {
    let topology = Topology::from_snapshot(&web_snapshot());
    let edges = topology
        .edges
        .iter()
        .map(|e| (e.kind, e.from.as_str(), e.to.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        edges,
        vec![
            (
                EdgeKind::ServiceToEndpointSlice,
                "service:default/web",
                "endpointslice:default/web-abc"
            ),
            (
                EdgeKind::EndpointSliceToPod,
                "endpointslice:default/web-abc",
                "pod:default/web-1"
            ),
            (
                EdgeKind::EndpointSliceToPod,
                "endpointslice:default/web-abc",
                "pod:default/web-2"
            ),
            (
                EdgeKind::IngressToService,
                "ingress:default/web",
                "service:default/web"
            ),
        ]
    );
    assert_eq!(
        topology.edges.last().map(|e| e.id.as_str()),
        Some("ingress:default/web->service:default/web:web")
    );
    assert_no_dangling_edges(&topology);
}

#[test]
fn unresolved_references_are_dropped() {
    // The slice's owner is missing and its address matches no pod; the ingress backend is
    // missing too.
    let slices = vec![mk_slice(
        "default",
        "orphan",
        Some("gone"),
        Some(("10.9.9.9", Some(true))),
    )];
    let ingresses = vec![mk_ingress("default", "ing", Some("gone"), None)];
    let topology = build_topology(&[], &[], &[], &ingresses, &slices);
    assert_eq!(topology.nodes.len(), 2);
    assert!(topology.edges.is_empty());
}

#[test]
fn slices_without_owning_service_have_no_edges() {
    let pods = vec![mk_pod("default", "web-1", Some("10.0.0.1"), None, true)];
    let slices = vec![mk_slice(
        "default",
        "web-abc",
        Some("gone"),
        Some(("10.0.0.1", Some(true))),
    )];
    let topology = build_topology(&[], &pods, &[], &[], &slices);
    assert!(topology.edges.is_empty());
    let ids = topology
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["endpointslice:default/web-abc", "pod:default/web-1"]);

    // A service in another namespace does not own the slice.
    let services = vec![mk_service("other", "gone", "ClusterIP", None)];
    let topology = build_topology(&[], &pods, &services, &[], &slices);
    assert!(topology.edges.is_empty());
}

#[test]
fn unlabeled_slices_have_no_edges() {
    let pods = vec![mk_pod("default", "web-1", Some("10.0.0.1"), None, true)];
    let slices = vec![mk_slice(
        "default",
        "manual",
        None,
        Some(("10.0.0.1", Some(true))),
    )];
    let topology = build_topology(&[], &pods, &[], &[], &slices);
    assert!(topology.edges.is_empty());
}

#[test]
fn last_pod_with_an_ip_wins() {
    let pods = vec![
        mk_pod("default", "old", Some("10.0.0.1"), None, false),
        mk_pod("default", "new", Some("10.0.0.1"), None, true),
    ];
    let services = vec![mk_service("default", "web", "ClusterIP", None)];
    let slices = vec![mk_slice(
        "default",
        "web-abc",
        Some("web"),
        Some(("10.0.0.1", Some(true))),
    )];
    let topology = build_topology(&[], &pods, &services, &[], &slices);
    let pod_edges = topology
        .edges
        .iter()
        .filter(|e| e.kind == EdgeKind::EndpointSliceToPod)
        .map(|e| e.to.as_str())
        .collect::<Vec<_>>();
    assert_eq!(pod_edges, vec!["pod:default/new"]);
}

#[test]
fn identity_keys_are_unique() {
    let pods = vec![
        mk_pod("default", "web-1", None, None, true),
        mk_pod("default", "web-1", None, None, true),
        mk_pod("other", "web-1", None, None, true),
    ];
    let services = vec![mk_service("default", "web-1", "ClusterIP", None)];
    let topology = build_topology(&[], &pods, &services, &[], &[]);
    let keys = topology
        .nodes
        .iter()
        .map(|n| n.id.clone())
        .collect::<HashSet<_>>();
    assert_eq!(keys.len(), topology.nodes.len());
    assert_eq!(topology.nodes.len(), 3);
}

#[test]
fn repeated_ingress_backends_yield_one_edge() {
    let services = vec![mk_service("default", "web", "ClusterIP", None)];
    let ingresses = vec![mk_ingress(
        "default",
        "web",
        Some("web"),
        vec![("a.example.com", "/", "web"), ("b.example.com", "/", "web")],
    )];
    let topology = build_topology(&[], &[], &services, &ingresses, &[]);
    assert_eq!(topology.edges.len(), 1);
}

#[test]
fn idempotent() {
    let snapshot = web_snapshot();
    let a = serde_json::to_string(&Topology::from_snapshot(&snapshot)).unwrap();
    let b = serde_json::to_string(&Topology::from_snapshot(&snapshot)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn serializes_wire_names() {
    let topology = build_topology(&[mk_node("node-a", None)], &[], &[], &[], &[]);
    let json = serde_json::to_value(&topology).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "nodes": [{
                "id": "node:node-a",
                "kind": "Node",
                "name": "node-a",
                "status": "Unknown",
            }],
            "edges": [],
        })
    );
    assert_eq!(NodeKind::Node.key("ignored", "node-a"), "node:node-a");
}

#[test]
fn missing_namespace_is_omitted() {
    let mut pod = mk_pod("default", "web-1", None, None, true);
    pod.metadata.namespace = None;
    let topology = build_topology(&[], &[pod], &[], &[], &[]);
    assert_eq!(topology.nodes[0].id, "pod:/web-1");
    assert_eq!(topology.nodes[0].namespace, None);

    let json = serde_json::to_value(&topology).unwrap();
    assert!(json["nodes"][0].get("namespace").is_none());

    let mut pod = mk_pod("default", "web-2", None, None, true);
    pod.metadata.namespace = Some(String::new());
    let topology = build_topology(&[], &[pod], &[], &[], &[]);
    assert_eq!(topology.nodes[0].namespace, None);
}
