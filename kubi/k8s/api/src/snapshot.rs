//! A point-in-time bundle of the resource collections a correlation pass consumes.
//!
//! Every collection is independently fetched and may independently be missing. At this boundary a
//! missing collection is normalized to an empty one, so the correlation code never distinguishes
//! "the list call failed" from "there are no such objects".

use k8s_openapi::api::{
    core::v1::{Node, PersistentVolumeClaim, Pod, Service},
    discovery::v1::EndpointSlice,
    networking::v1::{Ingress, NetworkPolicy},
    rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
};
use std::fmt;

/// The namespace scope a snapshot was fetched for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Scope {
    #[default]
    All,
    Namespace(String),
}

#[derive(Clone, Debug, Default)]
pub struct ResourceSnapshot {
    pub scope: Scope,
    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
    pub services: Vec<Service>,
    pub endpoint_slices: Vec<EndpointSlice>,
    pub ingresses: Vec<Ingress>,
    pub network_policies: Vec<NetworkPolicy>,
    pub pvcs: Vec<PersistentVolumeClaim>,
    pub roles: Vec<Role>,
    pub cluster_roles: Vec<ClusterRole>,
    pub role_bindings: Vec<RoleBinding>,
    pub cluster_role_bindings: Vec<ClusterRoleBinding>,
}

macro_rules! collection_setters {
    ($($with:ident => $field:ident: $ty:ty),+ $(,)?) => {
        $(
            #[inline]
            pub fn $with(mut self, items: Option<Vec<$ty>>) -> Self {
                self.$field = items.unwrap_or_default();
                self
            }
        )+
    };
}

// === impl Scope ===

impl Scope {
    /// Interprets an optional namespace argument; an absent or empty namespace means all
    /// namespaces.
    pub fn from_namespace(ns: Option<&str>) -> Self {
        match ns {
            None | Some("") => Self::All,
            Some(ns) => Self::Namespace(ns.to_string()),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Namespace(ns) => Some(ns.as_str()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Namespace(ns) => f.write_str(ns),
        }
    }
}

// === impl ResourceSnapshot ===

impl ResourceSnapshot {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            ..Default::default()
        }
    }

    collection_setters! {
        with_nodes => nodes: Node,
        with_pods => pods: Pod,
        with_services => services: Service,
        with_endpoint_slices => endpoint_slices: EndpointSlice,
        with_ingresses => ingresses: Ingress,
        with_network_policies => network_policies: NetworkPolicy,
        with_pvcs => pvcs: PersistentVolumeClaim,
        with_roles => roles: Role,
        with_cluster_roles => cluster_roles: ClusterRole,
        with_role_bindings => role_bindings: RoleBinding,
        with_cluster_role_bindings => cluster_role_bindings: ClusterRoleBinding,
    }
}
