#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
mod resource_id;
pub mod snapshot;

pub use self::{
    labels::{Map, Selector},
    resource_id::ResourceId,
    snapshot::{ResourceSnapshot, Scope},
};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{Node, PersistentVolumeClaim, Pod, Service},
        discovery::v1::EndpointSlice,
        networking::v1::{Ingress, NetworkPolicy},
        rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, Subject},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
pub use kube::ResourceExt;

/// The label an EndpointSlice carries naming the Service it serves.
pub const LABEL_SERVICE_NAME: &str = "kubernetes.io/service-name";
