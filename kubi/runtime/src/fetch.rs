//! Lists the resource collections a command needs and bundles them into a snapshot.
//!
//! Workload collections are mandatory: any failure aborts the snapshot. RBAC collections loaded
//! for validation are best-effort and degrade to empty collections.

use crate::k8s::{
    ClusterRole, ClusterRoleBinding, EndpointSlice, Ingress, NetworkPolicy, Node,
    PersistentVolumeClaim, Pod, ResourceSnapshot, Role, RoleBinding, Scope, Service,
};
use k8s_openapi::NamespaceResourceScope;
use kube::{api::ListParams, Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;
use tokio::time::{self, Duration};
use tracing::{debug, info_span, warn, Instrument};

pub const DEFAULT_PAGE_SIZE: u32 = 500;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to list {resource}")]
    Api {
        resource: &'static str,
        #[source]
        source: kube::Error,
    },

    #[error("listing {resource} timed out after {timeout:?}")]
    Timeout {
        resource: &'static str,
        timeout: Duration,
    },

    #[error("a namespace is required to resolve service account permissions")]
    MissingNamespace,
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    scope: Scope,
    timeout: Duration,
    page_size: u32,
    label_selector: Option<String>,
}

/// Degrades a failed list to an absent collection, which the snapshot treats as empty.
pub fn best_effort<T>(result: Result<Vec<T>, FetchError>) -> Option<Vec<T>> {
    match result {
        Ok(items) => Some(items),
        Err(error) => {
            warn!(%error, "Continuing without collection");
            None
        }
    }
}

// === impl Fetcher ===

impl Fetcher {
    pub fn new(client: Client, scope: Scope, timeout: Duration) -> Self {
        Self {
            client,
            scope,
            timeout,
            page_size: DEFAULT_PAGE_SIZE,
            label_selector: None,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Filters workload collections. RBAC and cluster-scoped collections are never filtered.
    pub fn with_label_selector(mut self, selector: Option<String>) -> Self {
        self.label_selector = selector.filter(|s| !s.is_empty());
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Nodes, pods, services, endpoint slices and ingresses.
    pub async fn topology(&self) -> Result<ResourceSnapshot, FetchError> {
        let (nodes, pods, services, endpoint_slices, ingresses) = tokio::try_join!(
            self.cluster::<Node>("nodes"),
            self.workloads::<Pod>("pods"),
            self.workloads::<Service>("services"),
            self.workloads::<EndpointSlice>("endpointslices"),
            self.workloads::<Ingress>("ingresses"),
        )?;

        Ok(ResourceSnapshot::new(self.scope.clone())
            .with_nodes(Some(nodes))
            .with_pods(Some(pods))
            .with_services(Some(services))
            .with_endpoint_slices(Some(endpoint_slices))
            .with_ingresses(Some(ingresses)))
    }

    /// The topology collections plus PVCs, with best-effort RBAC collections.
    pub async fn validation(&self) -> Result<ResourceSnapshot, FetchError> {
        let (snapshot, pvcs) = tokio::try_join!(
            self.topology(),
            self.workloads::<PersistentVolumeClaim>("persistentvolumeclaims"),
        )?;
        let (roles, cluster_roles, role_bindings, cluster_role_bindings) = tokio::join!(
            self.namespaced::<Role>("roles"),
            self.cluster::<ClusterRole>("clusterroles"),
            self.namespaced::<RoleBinding>("rolebindings"),
            self.cluster::<ClusterRoleBinding>("clusterrolebindings"),
        );

        Ok(snapshot
            .with_pvcs(Some(pvcs))
            .with_roles(best_effort(roles))
            .with_cluster_roles(best_effort(cluster_roles))
            .with_role_bindings(best_effort(role_bindings))
            .with_cluster_role_bindings(best_effort(cluster_role_bindings)))
    }

    /// The RBAC collections of a single namespace, all mandatory.
    pub async fn permissions(&self) -> Result<ResourceSnapshot, FetchError> {
        if self.scope.namespace().is_none() {
            return Err(FetchError::MissingNamespace);
        }

        let (roles, cluster_roles, role_bindings, cluster_role_bindings) = tokio::try_join!(
            self.namespaced::<Role>("roles"),
            self.cluster::<ClusterRole>("clusterroles"),
            self.namespaced::<RoleBinding>("rolebindings"),
            self.cluster::<ClusterRoleBinding>("clusterrolebindings"),
        )?;

        Ok(ResourceSnapshot::new(self.scope.clone())
            .with_roles(Some(roles))
            .with_cluster_roles(Some(cluster_roles))
            .with_role_bindings(Some(role_bindings))
            .with_cluster_role_bindings(Some(cluster_role_bindings)))
    }

    pub async fn ports(&self) -> Result<ResourceSnapshot, FetchError> {
        let (pods, services, endpoint_slices, ingresses) = tokio::try_join!(
            self.workloads::<Pod>("pods"),
            self.workloads::<Service>("services"),
            self.workloads::<EndpointSlice>("endpointslices"),
            self.workloads::<Ingress>("ingresses"),
        )?;

        Ok(ResourceSnapshot::new(self.scope.clone())
            .with_pods(Some(pods))
            .with_services(Some(services))
            .with_endpoint_slices(Some(endpoint_slices))
            .with_ingresses(Some(ingresses)))
    }

    pub async fn traffic(&self) -> Result<ResourceSnapshot, FetchError> {
        let (services, pods, ingresses, network_policies) = tokio::try_join!(
            self.workloads::<Service>("services"),
            self.workloads::<Pod>("pods"),
            self.workloads::<Ingress>("ingresses"),
            self.workloads::<NetworkPolicy>("networkpolicies"),
        )?;

        Ok(ResourceSnapshot::new(self.scope.clone())
            .with_services(Some(services))
            .with_pods(Some(pods))
            .with_ingresses(Some(ingresses))
            .with_network_policies(Some(network_policies)))
    }

    /// Lists a namespaced collection in scope, filtered by the label selector.
    async fn workloads<K>(&self, resource: &'static str) -> Result<Vec<K>, FetchError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
        K: Clone + DeserializeOwned + fmt::Debug,
    {
        let params = match self.label_selector.as_deref() {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };
        self.list(resource, self.scoped_api(), params).await
    }

    /// Lists a namespaced collection in scope, unfiltered.
    async fn namespaced<K>(&self, resource: &'static str) -> Result<Vec<K>, FetchError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
        K: Clone + DeserializeOwned + fmt::Debug,
    {
        self.list(resource, self.scoped_api(), ListParams::default())
            .await
    }

    async fn cluster<K>(&self, resource: &'static str) -> Result<Vec<K>, FetchError>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + fmt::Debug,
    {
        self.list(resource, Api::all(self.client.clone()), ListParams::default())
            .await
    }

    fn scoped_api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        match &self.scope {
            Scope::All => Api::all(self.client.clone()),
            Scope::Namespace(ns) => Api::namespaced(self.client.clone(), ns),
        }
    }

    /// Lists every page of a collection. The timeout bounds all pages together.
    async fn list<K>(
        &self,
        resource: &'static str,
        api: Api<K>,
        params: ListParams,
    ) -> Result<Vec<K>, FetchError>
    where
        K: Resource + Clone + DeserializeOwned + fmt::Debug,
    {
        let pages = list_pages(api, params.limit(self.page_size));
        let items = time::timeout(self.timeout, pages)
            .instrument(info_span!("list", %resource, scope = %self.scope))
            .await
            .map_err(|_| FetchError::Timeout {
                resource,
                timeout: self.timeout,
            })?
            .map_err(|source| FetchError::Api { resource, source })?;
        debug!(%resource, items = items.len(), "Listed");
        Ok(items)
    }
}

async fn list_pages<K>(api: Api<K>, mut params: ListParams) -> kube::Result<Vec<K>>
where
    K: Resource + Clone + DeserializeOwned + fmt::Debug,
{
    let mut items = Vec::new();
    loop {
        let page = api.list(&params).await?;
        items.extend(page.items);
        match page.metadata.continue_ {
            Some(token) if !token.is_empty() => params = params.continue_token(&token),
            _ => return Ok(items),
        }
    }
}
