//! Summarizes the intended traffic paths: which pods each service selects, where ingresses
//! route, and which pods network policies apply to.

use crate::{
    index::PodsByNamespace,
    ports::{self, IngressRoute},
};
use kubi_k8s_api::{
    Ingress, NetworkPolicy, Pod, ResourceExt, ResourceId, ResourceSnapshot, Selector,
    Service,
};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIntent {
    pub namespace: String,
    pub service: String,

    /// Sorted `key=value` pairs, or `(none)` for a service without a selector.
    pub selector: String,

    /// Names of the same-namespace pods the selector matches.
    pub pods: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySummary {
    pub namespace: String,
    pub name: String,
    pub types: Vec<String>,
    pub pod_selector: String,
    pub ingress_rules: usize,
    pub egress_rules: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Traffic {
    pub service_intents: Vec<ServiceIntent>,
    pub ingress_intents: Vec<IngressRoute>,
    pub network_policies: Vec<NetworkPolicySummary>,
}

pub fn build_traffic(
    services: &[Service],
    pods: &[Pod],
    ingresses: &[Ingress],
    policies: &[NetworkPolicy],
) -> Traffic {
    Traffic {
        service_intents: service_intents(services, pods),
        ingress_intents: ports::ingress_routes(ingresses),
        network_policies: policies.iter().map(summarize_policy).collect(),
    }
}

// === impl Traffic ===

impl Traffic {
    pub fn from_snapshot(snapshot: &ResourceSnapshot) -> Self {
        build_traffic(
            &snapshot.services,
            &snapshot.pods,
            &snapshot.ingresses,
            &snapshot.network_policies,
        )
    }
}

fn service_intents(services: &[Service], pods: &[Pod]) -> Vec<ServiceIntent> {
    let pods = PodsByNamespace::new(pods);

    services
        .iter()
        .map(|svc| {
            let ResourceId { namespace, name } = ResourceId::of(svc);
            let selector =
                Selector::from_optional(svc.spec.as_ref().and_then(|s| s.selector.as_ref()));
            if selector.is_empty() {
                return ServiceIntent {
                    namespace,
                    service: name,
                    selector: Selector::NONE.to_string(),
                    pods: Vec::new(),
                };
            }

            let matched = pods
                .get(&namespace)
                .iter()
                .filter(|pod| selector.matches(pod.labels()))
                .map(|pod| pod.name_any())
                .collect();
            ServiceIntent {
                namespace,
                service: name,
                selector: selector.to_string(),
                pods: matched,
            }
        })
        .collect()
}

fn summarize_policy(policy: &NetworkPolicy) -> NetworkPolicySummary {
    let ResourceId { namespace, name } = ResourceId::of(policy);
    let spec = policy.spec.as_ref();
    let pod_selector =
        Selector::from_optional(spec.and_then(|s| s.pod_selector.match_labels.as_ref()));

    NetworkPolicySummary {
        namespace,
        name,
        types: spec
            .and_then(|s| s.policy_types.clone())
            .unwrap_or_default(),
        pod_selector: pod_selector.to_string(),
        ingress_rules: spec.and_then(|s| s.ingress.as_ref()).map_or(0, Vec::len),
        egress_rules: spec.and_then(|s| s.egress.as_ref()).map_or(0, Vec::len),
    }
}
