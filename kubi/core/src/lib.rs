//! Kubi correlation engine
//!
//! Correlates independently-fetched cluster resource collections into the views a dashboard
//! renders. Kubernetes has no foreign keys between these resources, so every relationship is a
//! heuristic join:
//!
//! - A `Service` owns an `EndpointSlice` when the slice carries the `kubernetes.io/service-name`
//!   label naming it (same namespace).
//! - An `EndpointSlice` address points at a `Pod` when it equals the pod's status IP.
//! - An `Ingress` backend references a `Service` by name (same namespace).
//! - A `Service` selects a `Pod` when every selector label is present on the pod.
//! - A binding grants a `Role`/`ClusterRole` through its role reference.
//!
//! ```text
//! [ Ingress ] -> [ Service ] -> [ EndpointSlice ] -> [ Pod ]
//! [ RoleBinding | ClusterRoleBinding ] -> [ Role | ClusterRole ] -> [ PolicyRule ]
//! ```
//!
//! Each join builds its lookup table once per pass (see [`index`]). A reference that does not
//! resolve is dropped, never reported as an error: snapshots are partial and eventually
//! consistent, so every operation here is total and pure.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod index;
pub mod ports;
pub mod rbac;
pub mod topology;
pub mod traffic;
pub mod validation;


pub use self::{
    ports::{build_ports, Ports},
    rbac::{resolve_effective, EffectivePermissions, PolicyRule},
    topology::{build_topology, EdgeKind, NodeKind, Topology, TopologyEdge, TopologyNode},
    traffic::{build_traffic, Traffic},
    validation::{validate, Finding, Severity},
};
pub use kubi_k8s_api as k8s;
