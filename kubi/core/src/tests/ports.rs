use super::*;
use crate::ports::{self, build_ports, IngressRoute};
use k8s_openapi::{
    api::{
        core::v1::{LoadBalancerIngress, LoadBalancerStatus, ServiceStatus},
        discovery::v1::EndpointPort,
    },
    apimachinery::pkg::util::intstr::IntOrString,
};
use pretty_assertions::assert_eq;

fn mk_port(name: Option<&str>, port: i32, target: Option<IntOrString>) -> ServicePort {
    ServicePort {
        name: name.map(str::to_string),
        port,
        target_port: target,
        ..Default::default()
    }
}

fn mk_slice_port(name: Option<&str>, port: i32, protocol: Option<&str>) -> EndpointPort {
    EndpointPort {
        name: name.map(str::to_string),
        port: Some(port),
        protocol: protocol.map(str::to_string),
        ..Default::default()
    }
}

fn with_ports(mut slice: k8s::EndpointSlice, ports: Vec<EndpointPort>) -> k8s::EndpointSlice {
    slice.ports = Some(ports);
    slice
}

fn pod_endpoints(svc: k8s::Service, slices: Vec<k8s::EndpointSlice>) -> Vec<Vec<String>> {
    build_ports(&[], &[svc], &slices, &[])
        .services
        .into_iter()
        .map(|row| row.pod_endpoints)
        .collect()
}

#[test]
fn container_ports_in_declaration_order() {
    let pod = mk_pod_with_ports(
        "default",
        "web-1",
        vec![
            (
                "app",
                vec![
                    ContainerPort {
                        name: Some("http".to_string()),
                        container_port: 8080,
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    },
                    ContainerPort {
                        container_port: 9090,
                        host_port: Some(19090),
                        ..Default::default()
                    },
                ],
            ),
            ("sidecar", vec![]),
        ],
    );

    let rows = build_ports(&[pod], &[], &[], &[]).containers;
    let rows = rows
        .iter()
        .map(|c| (c.container.as_str(), c.port, c.protocol.as_str(), c.host_port))
        .collect::<Vec<_>>();
    assert_eq!(rows, vec![("app", 8080, "TCP", 0), ("app", 9090, "", 19090)]);
}

#[test]
fn pods_without_containers_have_no_ports() {
    let pod = mk_pod("default", "web-1", Some("10.0.0.1"), None, true);
    assert!(build_ports(&[pod], &[], &[], &[]).containers.is_empty());
}

#[test]
fn named_ports_match_by_name() {
    let svc = mk_service_with_ports(
        "default",
        "web",
        vec![mk_port(
            Some("http"),
            80,
            Some(IntOrString::String("http".to_string())),
        )],
    );
    let slices = vec![with_ports(
        mk_slice(
            "default",
            "web-abc",
            Some("web"),
            vec![("10.0.0.1", Some(true)), ("10.0.0.2", Some(false))],
        ),
        vec![
            mk_slice_port(Some("http"), 8080, None),
            mk_slice_port(Some("metrics"), 9090, Some("TCP")),
        ],
    )];

    assert_eq!(
        pod_endpoints(svc, slices),
        vec![vec!["10.0.0.1:8080/TCP".to_string(), "10.0.0.2:8080/TCP".to_string()]]
    );
}

#[test]
fn numeric_target_port_matches_slice_port() {
    let svc = mk_service_with_ports(
        "default",
        "web",
        vec![mk_port(None, 80, Some(IntOrString::Int(8080)))],
    );
    let slices = vec![with_ports(
        mk_slice("default", "web-abc", Some("web"), Some(("10.0.0.1", None))),
        vec![
            mk_slice_port(None, 8080, Some("UDP")),
            mk_slice_port(None, 80, None),
        ],
    )];

    assert_eq!(
        pod_endpoints(svc, slices),
        vec![vec!["10.0.0.1:8080/UDP".to_string()]]
    );
}

#[test]
fn named_service_port_against_unnamed_slice_port() {
    let svc = mk_service_with_ports(
        "default",
        "web",
        vec![mk_port(Some("http"), 80, Some(IntOrString::Int(8080)))],
    );
    let slices = vec![with_ports(
        mk_slice("default", "web-abc", Some("web"), Some(("10.0.0.1", None))),
        vec![mk_slice_port(None, 8080, None)],
    )];

    assert_eq!(
        pod_endpoints(svc, slices),
        vec![vec!["10.0.0.1:8080/TCP".to_string()]]
    );
}

#[test]
fn absent_target_port_matches_service_port() {
    let svc = mk_service_with_ports("default", "web", vec![mk_port(None, 80, None)]);
    let slices = vec![with_ports(
        mk_slice("default", "web-abc", Some("web"), Some(("10.0.0.1", None))),
        vec![mk_slice_port(None, 80, None), mk_slice_port(None, 81, None)],
    )];

    assert_eq!(
        pod_endpoints(svc, slices),
        vec![vec!["10.0.0.1:80/TCP".to_string()]]
    );
}

#[test]
fn only_owned_slices_contribute_endpoints() {
    let svc = mk_service_with_ports("default", "web", vec![mk_port(None, 80, None)]);
    let slices = vec![
        with_ports(
            mk_slice("default", "api-abc", Some("api"), Some(("10.0.0.1", None))),
            vec![mk_slice_port(None, 80, None)],
        ),
        with_ports(
            mk_slice("other", "web-abc", Some("web"), Some(("10.0.0.2", None))),
            vec![mk_slice_port(None, 80, None)],
        ),
        with_ports(
            mk_slice("default", "manual", None, Some(("10.0.0.3", None))),
            vec![mk_slice_port(None, 80, None)],
        ),
    ];

    assert_eq!(pod_endpoints(svc, slices), vec![Vec::<String>::new()]);
}

#[test]
fn service_rows() {
    let mut b = mk_service_with_ports(
        "default",
        "b",
        vec![
            mk_port(Some("http"), 80, Some(IntOrString::String("web".to_string()))),
            mk_port(Some("https"), 443, None),
        ],
    );
    if let Some(spec) = b.spec.as_mut() {
        spec.type_ = Some("NodePort".to_string());
        if let Some(ports) = spec.ports.as_mut() {
            ports[0].node_port = Some(30080);
            ports[0].protocol = Some("TCP".to_string());
        }
    }
    let a = mk_service_with_ports(
        "default",
        "a",
        vec![mk_port(None, 53, Some(IntOrString::Int(5353)))],
    );
    let z = mk_service_with_ports("alpha", "z", vec![mk_port(None, 8080, None)]);
    let no_spec = k8s::Service {
        metadata: mk_meta(Some("default"), "bare", None),
        ..Default::default()
    };

    let rows = build_ports(&[], &[b, no_spec, a, z], &[], &[]).services;
    assert_eq!(
        rows,
        vec![
            ports::ServicePort {
                namespace: "alpha".to_string(),
                service: "z".to_string(),
                type_: "ClusterIP".to_string(),
                port: 8080,
                target_port: String::new(),
                protocol: String::new(),
                node_port: 0,
                external_ips: vec![],
                pod_endpoints: vec![],
            },
            ports::ServicePort {
                namespace: "default".to_string(),
                service: "a".to_string(),
                type_: "ClusterIP".to_string(),
                port: 53,
                target_port: "5353".to_string(),
                protocol: String::new(),
                node_port: 0,
                external_ips: vec![],
                pod_endpoints: vec![],
            },
            ports::ServicePort {
                namespace: "default".to_string(),
                service: "b".to_string(),
                type_: "NodePort".to_string(),
                port: 80,
                target_port: "web".to_string(),
                protocol: "TCP".to_string(),
                node_port: 30080,
                external_ips: vec![],
                pod_endpoints: vec![],
            },
            ports::ServicePort {
                namespace: "default".to_string(),
                service: "b".to_string(),
                type_: "NodePort".to_string(),
                port: 443,
                target_port: String::new(),
                protocol: String::new(),
                node_port: 0,
                external_ips: vec![],
                pod_endpoints: vec![],
            },
        ]
    );
}

#[test]
fn external_ips() {
    let mut explicit = mk_service("default", "explicit", "ClusterIP", None);
    if let Some(spec) = explicit.spec.as_mut() {
        spec.external_ips = Some(vec!["203.0.113.10".to_string()]);
    }

    let lb_status = Some(ServiceStatus {
        load_balancer: Some(LoadBalancerStatus {
            ingress: Some(vec![
                LoadBalancerIngress {
                    ip: Some("198.51.100.1".to_string()),
                    ..Default::default()
                },
                LoadBalancerIngress {
                    hostname: Some("lb.example.com".to_string()),
                    ip: Some(String::new()),
                    ..Default::default()
                },
            ]),
        }),
        ..Default::default()
    });
    let mut lb = mk_service("default", "lb", "LoadBalancer", None);
    lb.status = lb_status.clone();
    let mut cluster_ip = mk_service("default", "internal", "ClusterIP", None);
    cluster_ip.status = lb_status;

    assert_eq!(ports::external_ips(&explicit), vec!["203.0.113.10"]);
    assert_eq!(ports::external_ips(&lb), vec!["198.51.100.1", "lb.example.com"]);
    assert!(ports::external_ips(&cluster_ip).is_empty());
}

#[test]
fn ingress_routes() {
    let mut ingress = mk_ingress(
        "default",
        "web",
        Some("fallback"),
        vec![("web.example.com", "/", "web")],
    );
    let mut named = mk_backend("api", 0);
    if let Some(svc) = named.service.as_mut() {
        svc.port = Some(ServiceBackendPort {
            name: Some("grpc".to_string()),
            number: None,
        });
    }
    if let Some(rules) = ingress.spec.as_mut().and_then(|s| s.rules.as_mut()) {
        rules.push(IngressRule {
            host: None,
            http: Some(HTTPIngressRuleValue {
                paths: vec![HTTPIngressPath {
                    backend: named,
                    path: None,
                    path_type: "ImplementationSpecific".to_string(),
                }],
            }),
        });
    }

    let route = |host: &str, path: &str, service: &str, port: &str| IngressRoute {
        namespace: "default".to_string(),
        ingress: "web".to_string(),
        host: host.to_string(),
        path: path.to_string(),
        service: service.to_string(),
        port: port.to_string(),
    };
    assert_eq!(
        build_ports(&[], &[], &[], &[ingress]).ingresses,
        vec![
            route("*", "*", "fallback", "80"),
            route("web.example.com", "/", "web", "80"),
            route("", "", "api", "grpc"),
        ]
    );
}

#[test]
fn serializes_service_type() {
    let svc = mk_service_with_ports("default", "web", vec![mk_port(None, 80, None)]);
    let json = serde_json::to_value(build_ports(&[], &[svc], &[], &[])).unwrap();
    assert_eq!(json["services"][0]["type"], "ClusterIP");
    assert_eq!(json["services"][0]["targetPort"], "");
    assert_eq!(json["services"][0]["podEndpoints"], serde_json::json!([]));
    assert_eq!(json["containers"], serde_json::json!([]));
}
