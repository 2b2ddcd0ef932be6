//! Pod, Deployment/StatefulSet/DaemonSet, Node, and Namespace translation.
//!
//! Implements the pod readiness, service-mesh presence, age, and node
//! status rules of `spec.md` §4.3.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};

use crate::clock::age_string;
use crate::model::{
    ContainerRuntimeState, ContainerStateInfo, NamespaceInfo, NamespacePhase, NodeInfo,
    NodeStatus, PodInfo, PodPhase, WorkloadInfo, WorkloadKind,
};

const MESH_INDICATOR_STRINGS: [&str; 2] = ["istio", "envoy"];
const MESH_ANNOTATION_KEYS: [&str; 2] = ["sidecar.istio.io/status", "sidecar.istio.io/inject"];

/// `PodInfo::ready` = value of the `Ready` condition equal to `True`;
/// absent condition means not ready, per `spec.md` §4.3.
pub fn pod_to_info(pod: &Pod) -> PodInfo {
    let metadata = &pod.metadata;
    let name = metadata.name.clone().unwrap_or_default();
    let namespace = metadata.namespace.clone().unwrap_or_default();
    let labels = to_map(metadata.labels.as_ref());
    let annotations = to_map(metadata.annotations.as_ref());

    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(parse_phase)
        .unwrap_or(PodPhase::Unknown);

    let ready_condition = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"));
    let ready = ready_condition.is_some_and(|c| c.status == "True");
    let ready_condition_since = ready_condition
        .and_then(|c| c.last_transition_time.as_ref())
        .map(|t| t.0);

    let node = pod.spec.as_ref().and_then(|s| s.node_name.clone());

    let container_statuses = status.and_then(|s| s.container_statuses.as_ref());
    let restart_count = container_statuses
        .map(|statuses| statuses.iter().map(|c| c.restart_count).sum())
        .unwrap_or(0);

    let containers = pod
        .spec
        .as_ref()
        .map(|s| s.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();
    let init_containers = pod
        .spec
        .as_ref()
        .and_then(|s| s.init_containers.as_ref())
        .map(|cs| cs.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();

    let container_states = container_statuses
        .map(|statuses| statuses.iter().map(container_state_info).collect())
        .unwrap_or_default();

    let images: Vec<String> = pod
        .spec
        .as_ref()
        .map(|s| s.containers.iter().filter_map(|c| c.image.clone()).collect())
        .unwrap_or_default();

    let mesh_present = detect_mesh_presence(&containers, &images, &annotations);

    PodInfo {
        name,
        namespace,
        phase,
        node,
        ready,
        ready_condition_since,
        restart_count,
        containers,
        init_containers,
        labels,
        annotations,
        container_states,
        mesh_present,
    }
}

fn parse_phase(phase: &str) -> PodPhase {
    match phase {
        "Pending" => PodPhase::Pending,
        "Running" => PodPhase::Running,
        "Succeeded" => PodPhase::Succeeded,
        "Failed" => PodPhase::Failed,
        _ => PodPhase::Unknown,
    }
}

fn container_state_info(status: &k8s_openapi::api::core::v1::ContainerStatus) -> ContainerStateInfo {
    let (state, reason, message) = match status.state.as_ref() {
        Some(s) if s.running.is_some() => (ContainerRuntimeState::Running, None, None),
        Some(s) if s.waiting.is_some() => {
            let w = s.waiting.as_ref().unwrap();
            (
                ContainerRuntimeState::Waiting,
                w.reason.clone(),
                w.message.clone(),
            )
        }
        Some(s) if s.terminated.is_some() => {
            let t = s.terminated.as_ref().unwrap();
            (
                ContainerRuntimeState::Terminated,
                t.reason.clone(),
                t.message.clone(),
            )
        }
        _ => (ContainerRuntimeState::Waiting, None, None),
    };
    ContainerStateInfo {
        name: status.name.clone(),
        state,
        reason,
        message,
    }
}

/// Service-mesh presence = OR of the checks in `spec.md` §4.3: container or
/// image name containing `istio`/`envoy` (case-insensitive), any annotation
/// key containing `istio`/`sidecar`, or one of the two well-known sidecar
/// annotation keys.
fn detect_mesh_presence(
    containers: &[String],
    images: &[String],
    annotations: &BTreeMap<String, String>,
) -> bool {
    let name_hits = containers.iter().chain(images.iter()).any(|s| {
        let lower = s.to_lowercase();
        MESH_INDICATOR_STRINGS.iter().any(|needle| lower.contains(needle))
    });

    let annotation_hits = annotations.keys().any(|k| {
        let lower = k.to_lowercase();
        lower.contains("istio") || lower.contains("sidecar")
    });

    let known_key_hits = MESH_ANNOTATION_KEYS
        .iter()
        .any(|key| annotations.contains_key(*key));

    name_hits || annotation_hits || known_key_hits
}

fn to_map(src: Option<&std::collections::BTreeMap<String, String>>) -> BTreeMap<String, String> {
    src.cloned().unwrap_or_default()
}

pub fn deployment_to_info(d: &Deployment, now: DateTime<Utc>) -> WorkloadInfo {
    let meta = &d.metadata;
    let spec = d.spec.clone().unwrap_or_default();
    let status = d.status.clone().unwrap_or_default();
    WorkloadInfo {
        kind: WorkloadKind::Deployment,
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        desired_replicas: spec.replicas.unwrap_or(0),
        ready_replicas: status.ready_replicas.unwrap_or(0),
        available_replicas: status.available_replicas.unwrap_or(0),
        selector: to_map(spec.selector.match_labels.as_ref()),
        images: template_images(&spec.template),
        age: creation_age(meta, now),
    }
}

pub fn stateful_set_to_info(s: &StatefulSet, now: DateTime<Utc>) -> WorkloadInfo {
    let meta = &s.metadata;
    let spec = s.spec.clone().unwrap_or_default();
    let status = s.status.clone().unwrap_or_default();
    WorkloadInfo {
        kind: WorkloadKind::StatefulSet,
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        desired_replicas: spec.replicas.unwrap_or(1),
        ready_replicas: status.ready_replicas.unwrap_or(0),
        available_replicas: status.available_replicas.unwrap_or(0),
        selector: to_map(spec.selector.match_labels.as_ref()),
        images: template_images(&spec.template),
        age: creation_age(meta, now),
    }
}

pub fn daemon_set_to_info(d: &DaemonSet, now: DateTime<Utc>) -> WorkloadInfo {
    let meta = &d.metadata;
    let spec = d.spec.clone().unwrap_or_default();
    let status = d.status.clone().unwrap_or_default();
    WorkloadInfo {
        kind: WorkloadKind::DaemonSet,
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        desired_replicas: status.desired_number_scheduled,
        ready_replicas: status.number_ready,
        available_replicas: status.number_available.unwrap_or(0),
        selector: to_map(spec.selector.match_labels.as_ref()),
        images: template_images(&spec.template),
        age: creation_age(meta, now),
    }
}

fn template_images(template: &k8s_openapi::api::core::v1::PodTemplateSpec) -> Vec<String> {
    template
        .spec
        .as_ref()
        .map(|s| s.containers.iter().filter_map(|c| c.image.clone()).collect())
        .unwrap_or_default()
}

fn creation_age(
    meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
    now: DateTime<Utc>,
) -> String {
    meta.creation_timestamp
        .as_ref()
        .map(|t| age_string(t.0, now))
        .unwrap_or_else(|| "<1m".to_string())
}

/// Node status = `"Ready"` iff `NodeReady=True`, else `"NotReady"`, per
/// `spec.md` §4.3.
pub fn node_to_info(node: &Node) -> NodeInfo {
    let meta = &node.metadata;
    let status = node.status.as_ref();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|c| c.status == "True");

    let role_labels: Vec<String> = meta
        .labels
        .as_ref()
        .map(|labels| {
            labels
                .keys()
                .filter(|k| k.starts_with("node-role.kubernetes.io/"))
                .map(|k| {
                    k.trim_start_matches("node-role.kubernetes.io/")
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default();

    let kubelet_version = status
        .and_then(|s| s.node_info.as_ref())
        .map(|info| info.kubelet_version.clone())
        .unwrap_or_default();

    let capacity = status
        .and_then(|s| s.capacity.as_ref())
        .map(|cap| {
            cap.iter()
                .map(|(k, v)| (k.clone(), v.0.clone()))
                .collect()
        })
        .unwrap_or_default();

    NodeInfo {
        name: meta.name.clone().unwrap_or_default(),
        status: if ready {
            NodeStatus::Ready
        } else {
            NodeStatus::NotReady
        },
        role_labels,
        kubelet_version,
        capacity,
    }
}

pub fn namespace_to_info(ns: &Namespace) -> NamespaceInfo {
    let phase = ns
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("Active");
    NamespaceInfo {
        name: ns.metadata.name.clone().unwrap_or_default(),
        phase: if phase == "Terminating" {
            NamespacePhase::Terminating
        } else {
            NamespacePhase::Active
        },
    }
}
