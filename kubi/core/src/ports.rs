//! Correlates service ports with endpoint slice ports, container ports, and ingress backends.

use crate::index::{self, IngressBackend, SlicesByService};
use k8s_openapi::{
    api::{core::v1::ServicePort as K8sServicePort, discovery::v1::EndpointPort},
    apimachinery::pkg::util::intstr::IntOrString,
};
use kubi_k8s_api::{EndpointSlice, Ingress, Pod, ResourceId, Service};
use serde::Serialize;

const DEFAULT_PROTOCOL: &str = "TCP";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub namespace: String,
    pub service: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub port: i32,
    pub target_port: String,
    pub protocol: String,
    pub node_port: i32,
    pub external_ips: Vec<String>,

    /// `address:port/protocol` for every endpoint address serving this port.
    pub pod_endpoints: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub port: i32,
    pub protocol: String,
    pub host_port: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRoute {
    pub namespace: String,
    pub ingress: String,
    pub host: String,
    pub path: String,
    pub service: String,
    pub port: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Ports {
    pub services: Vec<ServicePort>,
    pub containers: Vec<ContainerPort>,
    pub ingresses: Vec<IngressRoute>,
}

pub fn build_ports(
    pods: &[Pod],
    services: &[Service],
    slices: &[EndpointSlice],
    ingresses: &[Ingress],
) -> Ports {
    let containers = pods.iter().flat_map(container_ports).collect();

    let slices = SlicesByService::new(slices);
    let mut service_ports = services
        .iter()
        .flat_map(|svc| ports_of_service(svc, &slices))
        .collect::<Vec<_>>();
    service_ports.sort_by(|a, b| {
        a.namespace
            .cmp(&b.namespace)
            .then_with(|| a.service.cmp(&b.service))
    });

    Ports {
        services: service_ports,
        containers,
        ingresses: ingress_routes(ingresses),
    }
}

/// Lists one route per service backend of each ingress.
pub fn ingress_routes(ingresses: &[Ingress]) -> Vec<IngressRoute> {
    ingresses
        .iter()
        .flat_map(|ingress| {
            let ResourceId { namespace, name } = ResourceId::of(ingress);
            index::ingress_backends(ingress)
                .into_iter()
                .map(move |backend: IngressBackend| IngressRoute {
                    namespace: namespace.clone(),
                    ingress: name.clone(),
                    host: backend.host,
                    path: backend.path,
                    service: backend.service,
                    port: backend.port,
                })
        })
        .collect()
}

fn container_ports(pod: &Pod) -> Vec<ContainerPort> {
    let ResourceId { namespace, name } = ResourceId::of(pod);
    let containers = pod.spec.as_ref().map(|s| s.containers.as_slice());

    let mut ports = Vec::new();
    for container in containers.unwrap_or_default() {
        for port in container.ports.iter().flatten() {
            ports.push(ContainerPort {
                namespace: namespace.clone(),
                pod: name.clone(),
                container: container.name.clone(),
                port: port.container_port,
                protocol: port.protocol.clone().unwrap_or_default(),
                host_port: port.host_port.unwrap_or_default(),
            });
        }
    }
    ports
}

fn ports_of_service(svc: &Service, slices: &SlicesByService<'_>) -> Vec<ServicePort> {
    let Some(spec) = svc.spec.as_ref() else {
        return Vec::new();
    };
    let ResourceId { namespace, name } = ResourceId::of(svc);
    let related = slices.get(&namespace, &name);
    let external_ips = external_ips(svc);
    let type_ = spec.type_.clone().unwrap_or_default();

    spec.ports
        .iter()
        .flatten()
        .map(|port| ServicePort {
            namespace: namespace.clone(),
            service: name.clone(),
            type_: type_.clone(),
            port: port.port,
            target_port: target_port(port.target_port.as_ref()),
            protocol: port.protocol.clone().unwrap_or_default(),
            node_port: port.node_port.unwrap_or_default(),
            external_ips: external_ips.clone(),
            pod_endpoints: endpoints_for_port(port, related),
        })
        .collect()
}

/// Lists `address:port/protocol` for every address in `slices` whose slice port matches the
/// service port.
fn endpoints_for_port(port: &K8sServicePort, slices: &[&EndpointSlice]) -> Vec<String> {
    let mut endpoints = Vec::new();
    for slice in slices {
        for slice_port in slice.ports.iter().flatten() {
            let Some(number) = slice_port.port else {
                continue;
            };
            if !port_matches(port, slice_port) {
                continue;
            }
            let protocol = slice_port.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL);
            for address in slice.endpoints.iter().flat_map(|ep| ep.addresses.iter()) {
                endpoints.push(format!("{address}:{number}/{protocol}"));
            }
        }
    }
    endpoints
}

/// Matches by name when both ports are named; otherwise by numeric target port; otherwise by
/// service port number.
fn port_matches(port: &K8sServicePort, slice_port: &EndpointPort) -> bool {
    let svc_name = port.name.as_deref().unwrap_or_default();
    if !svc_name.is_empty() {
        if let Some(slice_name) = slice_port.name.as_deref() {
            return svc_name == slice_name;
        }
    }
    if let Some(IntOrString::Int(target)) = &port.target_port {
        return slice_port.port == Some(*target);
    }
    port.port != 0 && slice_port.port == Some(port.port)
}

fn target_port(target: Option<&IntOrString>) -> String {
    match target {
        Some(IntOrString::Int(port)) => port.to_string(),
        Some(IntOrString::String(name)) => name.clone(),
        None => String::new(),
    }
}

/// A service's explicit external IPs; failing that, a load balancer's ingress IPs and hostnames.
pub fn external_ips(svc: &Service) -> Vec<String> {
    let spec = svc.spec.as_ref();
    if let Some(ips) = spec.and_then(|s| s.external_ips.as_ref()) {
        if !ips.is_empty() {
            return ips.clone();
        }
    }

    if spec.and_then(|s| s.type_.as_deref()) != Some("LoadBalancer") {
        return Vec::new();
    }

    let ingress = svc
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref());
    let mut ips = Vec::new();
    for lb in ingress.into_iter().flatten() {
        ips.extend(lb.ip.iter().filter(|ip| !ip.is_empty()).cloned());
        ips.extend(lb.hostname.iter().filter(|h| !h.is_empty()).cloned());
    }
    ips
}
