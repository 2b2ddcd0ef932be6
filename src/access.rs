//! Cluster Access Layer (C1).
//!
//! Uniform typed and dynamic reads against the cluster API, with namespace
//! scoping and error normalization, per `spec.md` §4.1 and §6.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Service};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use kube::api::{Api, ListParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::ApiResource;
use kube::Client;

use crate::error::AccessError;

/// Empty string or `"all"` mean cluster-wide, per `spec.md` §4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceScope {
    All,
    Named(String),
}

impl NamespaceScope {
    pub fn parse(value: &str) -> Self {
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            NamespaceScope::All
        } else {
            NamespaceScope::Named(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NamespaceScope::All => "",
            NamespaceScope::Named(ns) => ns,
        }
    }

    pub fn matches(&self, ns: &str) -> bool {
        match self {
            NamespaceScope::All => true,
            NamespaceScope::Named(scoped) => scoped == ns,
        }
    }
}

/// Reference to an arbitrary API group/version/resource, for the dynamic
/// handle (CRDs whose Rust types this crate doesn't compile against).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }
}

/// Typed reads against native resource kinds, per `spec.md` §6.
#[async_trait]
pub trait TypedAccess: Send + Sync {
    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<Pod>, AccessError>;
    async fn list_deployments(&self, scope: &NamespaceScope) -> Result<Vec<Deployment>, AccessError>;
    async fn list_stateful_sets(&self, scope: &NamespaceScope) -> Result<Vec<StatefulSet>, AccessError>;
    async fn list_daemon_sets(&self, scope: &NamespaceScope) -> Result<Vec<DaemonSet>, AccessError>;
    async fn list_services(&self, scope: &NamespaceScope) -> Result<Vec<Service>, AccessError>;
    async fn list_nodes(&self) -> Result<Vec<Node>, AccessError>;
    async fn list_namespaces(&self) -> Result<Vec<Namespace>, AccessError>;
    async fn list_ingresses(&self, scope: &NamespaceScope) -> Result<Vec<Ingress>, AccessError>;
    async fn list_network_policies(
        &self,
        scope: &NamespaceScope,
    ) -> Result<Vec<NetworkPolicy>, AccessError>;
}

/// Dynamic reads for CRDs (Istio, Cilium), per `spec.md` §6 and §9.
#[async_trait]
pub trait DynamicAccess: Send + Sync {
    async fn list_dynamic(
        &self,
        gvr: &GroupVersionResource,
        scope: &NamespaceScope,
    ) -> Result<Vec<DynamicObject>, AccessError>;
}

/// The live cluster access implementation, over `kube::Client`.
#[derive(Clone)]
pub struct KubeClusterAccess {
    client: Client,
}

impl KubeClusterAccess {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, scope: &NamespaceScope) -> Api<K>
    where
        K: kube::Resource<DynamicType = ()> + Clone + std::fmt::Debug,
    {
        match scope {
            NamespaceScope::All => Api::all(self.client.clone()),
            NamespaceScope::Named(ns) => Api::namespaced(self.client.clone(), ns),
        }
    }

    async fn list<K>(&self, api: Api<K>) -> Result<Vec<K>, AccessError>
    where
        K: Clone + std::fmt::Debug + serde::de::DeserializeOwned,
    {
        api.list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(normalize_kube_error)
    }
}

/// Map a `kube::Error` onto the taxonomy of `spec.md` §4.1/§7.
pub fn normalize_kube_error(err: kube::Error) -> AccessError {
    match &err {
        kube::Error::Api(resp) => match resp.code {
            401 | 403 => AccessError::NotAuthorized(resp.message.clone()),
            404 => AccessError::NotFound(resp.message.clone()),
            408 | 429 | 500..=599 => AccessError::Transient(resp.message.clone()),
            _ => AccessError::PermanentOther(resp.message.clone()),
        },
        kube::Error::HyperError(_) | kube::Error::Service(_) => {
            AccessError::Unavailable(err.to_string())
        }
        _ => AccessError::PermanentOther(err.to_string()),
    }
}

#[async_trait]
impl TypedAccess for KubeClusterAccess {
    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<Pod>, AccessError> {
        self.list(self.api::<Pod>(scope)).await
    }

    async fn list_deployments(
        &self,
        scope: &NamespaceScope,
    ) -> Result<Vec<Deployment>, AccessError> {
        self.list(self.api::<Deployment>(scope)).await
    }

    async fn list_stateful_sets(
        &self,
        scope: &NamespaceScope,
    ) -> Result<Vec<StatefulSet>, AccessError> {
        self.list(self.api::<StatefulSet>(scope)).await
    }

    async fn list_daemon_sets(
        &self,
        scope: &NamespaceScope,
    ) -> Result<Vec<DaemonSet>, AccessError> {
        self.list(self.api::<DaemonSet>(scope)).await
    }

    async fn list_services(&self, scope: &NamespaceScope) -> Result<Vec<Service>, AccessError> {
        self.list(self.api::<Service>(scope)).await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, AccessError> {
        let api: Api<Node> = Api::all(self.client.clone());
        self.list(api).await
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, AccessError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        self.list(api).await
    }

    async fn list_ingresses(&self, scope: &NamespaceScope) -> Result<Vec<Ingress>, AccessError> {
        self.list(self.api::<Ingress>(scope)).await
    }

    async fn list_network_policies(
        &self,
        scope: &NamespaceScope,
    ) -> Result<Vec<NetworkPolicy>, AccessError> {
        self.list(self.api::<NetworkPolicy>(scope)).await
    }
}

#[async_trait]
impl DynamicAccess for KubeClusterAccess {
    async fn list_dynamic(
        &self,
        gvr: &GroupVersionResource,
        scope: &NamespaceScope,
    ) -> Result<Vec<DynamicObject>, AccessError> {
        // The REST path is driven by the plural below, not by `kind`, so a
        // placeholder kind derived from the resource name is harmless here.
        let gvk = GroupVersionKind::gvk(&gvr.group, &gvr.version, &gvr.resource);
        let api_resource = ApiResource::from_gvk_with_plural(&gvk, &gvr.resource);

        let api: Api<DynamicObject> = match scope {
            NamespaceScope::All => Api::all_with(self.client.clone(), &api_resource),
            NamespaceScope::Named(ns) => {
                Api::namespaced_with(self.client.clone(), ns, &api_resource)
            }
        };

        let list = api
            .list(&ListParams::default())
            .await
            .map_err(normalize_kube_error)?;

        Ok(list.items)
    }
}
