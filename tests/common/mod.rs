//! In-memory `TypedAccess`/`DynamicAccess` fixture for end-to-end tests.
//!
//! No live cluster is available to this crate's test suite (`SPEC_FULL.md`
//! §4.1), so scenarios from `spec.md` §8 are built against `FakeClusterAccess`
//! instead: a builder that holds fixture objects in memory and answers
//! `TypedAccess`/`DynamicAccess` calls the same way `KubeClusterAccess` would,
//! minus the network hop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Service};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;

use stargazer::access::{DynamicAccess, GroupVersionResource, NamespaceScope, TypedAccess};
use stargazer::error::AccessError;

#[derive(Default)]
pub struct FakeClusterAccess {
    pub pods: Vec<Pod>,
    pub deployments: Vec<Deployment>,
    pub stateful_sets: Vec<StatefulSet>,
    pub daemon_sets: Vec<DaemonSet>,
    pub services: Vec<Service>,
    pub nodes: Vec<Node>,
    pub namespaces: Vec<Namespace>,
    pub ingresses: Vec<Ingress>,
    pub network_policies: Vec<NetworkPolicy>,
    dynamic: Mutex<HashMap<(String, String, String), Vec<DynamicObject>>>,
    pub pod_list_calls: AtomicUsize,
}

impl FakeClusterAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dynamic(
        mut self,
        group: &str,
        version: &str,
        resource: &str,
        items: Vec<DynamicObject>,
    ) -> Self {
        self.dynamic
            .get_mut()
            .unwrap()
            .insert((group.to_string(), version.to_string(), resource.to_string()), items);
        self
    }
}

fn scope_filter<'a, T>(
    items: &'a [T],
    scope: &NamespaceScope,
    meta_of: impl Fn(&'a T) -> &'a ObjectMeta,
) -> Vec<T>
where
    T: Clone,
{
    items
        .iter()
        .filter(|item| scope.matches(meta_of(item).namespace.as_deref().unwrap_or("")))
        .cloned()
        .collect()
}

#[async_trait]
impl TypedAccess for FakeClusterAccess {
    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<Pod>, AccessError> {
        self.pod_list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(scope_filter(&self.pods, scope, |p| &p.metadata))
    }

    async fn list_deployments(&self, scope: &NamespaceScope) -> Result<Vec<Deployment>, AccessError> {
        Ok(scope_filter(&self.deployments, scope, |d| &d.metadata))
    }

    async fn list_stateful_sets(&self, scope: &NamespaceScope) -> Result<Vec<StatefulSet>, AccessError> {
        Ok(scope_filter(&self.stateful_sets, scope, |s| &s.metadata))
    }

    async fn list_daemon_sets(&self, scope: &NamespaceScope) -> Result<Vec<DaemonSet>, AccessError> {
        Ok(scope_filter(&self.daemon_sets, scope, |d| &d.metadata))
    }

    async fn list_services(&self, scope: &NamespaceScope) -> Result<Vec<Service>, AccessError> {
        Ok(scope_filter(&self.services, scope, |s| &s.metadata))
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, AccessError> {
        Ok(self.nodes.clone())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, AccessError> {
        Ok(self.namespaces.clone())
    }

    async fn list_ingresses(&self, scope: &NamespaceScope) -> Result<Vec<Ingress>, AccessError> {
        Ok(scope_filter(&self.ingresses, scope, |i| &i.metadata))
    }

    async fn list_network_policies(
        &self,
        scope: &NamespaceScope,
    ) -> Result<Vec<NetworkPolicy>, AccessError> {
        Ok(scope_filter(&self.network_policies, scope, |n| &n.metadata))
    }
}

#[async_trait]
impl DynamicAccess for FakeClusterAccess {
    async fn list_dynamic(
        &self,
        gvr: &GroupVersionResource,
        _scope: &NamespaceScope,
    ) -> Result<Vec<DynamicObject>, AccessError> {
        let key = (gvr.group.clone(), gvr.version.clone(), gvr.resource.clone());
        match self.dynamic.lock().unwrap().get(&key) {
            Some(items) => Ok(items.clone()),
            None => Err(AccessError::NotFound(format!(
                "no fixture registered for {}/{}/{}",
                gvr.group, gvr.version, gvr.resource
            ))),
        }
    }
}

pub fn make_pod(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
    use k8s_openapi::api::core::v1::{Container, ContainerStatus, PodCondition, PodSpec, PodStatus};

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "main".to_string(),
                image: Some("nginx:latest".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            container_statuses: Some(vec![ContainerStatus {
                name: "main".to_string(),
                restart_count: 0,
                ready: true,
                image: "nginx:latest".to_string(),
                image_id: String::new(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

pub fn make_deployment(
    namespace: &str,
    name: &str,
    desired: i32,
    ready: i32,
    image: &str,
) -> Deployment {
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(desired),
            selector: LabelSelector::default(),
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "main".to_string(),
                        image: Some(image.to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        status: Some(DeploymentStatus {
            ready_replicas: Some(ready),
            ..Default::default()
        }),
    }
}

pub fn make_service(namespace: &str, name: &str) -> Service {
    use k8s_openapi::api::core::v1::ServicePort;

    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(k8s_openapi::api::core::v1::ServiceSpec {
            ports: Some(vec![ServicePort {
                port: 80,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn make_network_policy(namespace: &str, name: &str) -> NetworkPolicy {
    use k8s_openapi::api::networking::v1::NetworkPolicySpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default(),
            policy_types: Some(vec!["Ingress".to_string()]),
            ..Default::default()
        }),
    }
}

pub fn make_ingress(namespace: &str, name: &str, host: &str, backend_service: &str) -> Ingress {
    use k8s_openapi::api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressRule, IngressServiceBackend,
        IngressSpec,
    };

    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(host.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: backend_service.to_string(),
                                port: None,
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
