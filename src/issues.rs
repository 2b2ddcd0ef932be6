//! Issue Detector (C8), per `spec.md` §4.7.
//!
//! A rule-based scan that walks a [`TopologySnapshot`] and emits
//! prioritized issues. Detection rules take an [`IssueDetectorConfig`]
//! **(expansion, `SPEC_FULL.md` §4.7)**: `spec.md` names a restart-count
//! threshold and a notion of "production namespaces" for the blocked-edge
//! rule without giving either a concrete value, so both are configuration
//! with documented defaults rather than guesses baked into the rule logic.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ContainerRuntimeState, NodeStatus, TopologySnapshot, WorkloadKind};

/// Container waiting reasons `spec.md` §4.7 names as issue triggers.
const CRASH_WAITING_REASONS: [&str; 3] = [
    "CrashLoopBackOff",
    "ImagePullBackOff",
    "CreateContainerError",
];

/// `spec.md` §4.7: "pods not Ready for >5m".
const NOT_READY_THRESHOLD_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    // Declared in ascending `Ord` so `.max()`/sorts put Critical first when
    // reversed; `spec.md` §4.7 orders Critical > Warning > Info.
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub resource_type: String,
    pub resource_name: String,
    pub namespace: String,
}

/// Parameters the distilled spec leaves open (`spec.md` §4.7); defaults
/// documented in `DESIGN.md`'s Open Question resolution.
#[derive(Debug, Clone)]
pub struct IssueDetectorConfig {
    pub restart_count_threshold: i32,
    /// Literal names or `*-suffix` glob patterns identifying "production"
    /// namespaces for the blocked-edge rule.
    pub production_namespace_patterns: Vec<String>,
}

impl Default for IssueDetectorConfig {
    fn default() -> Self {
        Self {
            restart_count_threshold: 5,
            production_namespace_patterns: vec![
                "prod".to_string(),
                "production".to_string(),
                "*-prod".to_string(),
                "*-production".to_string(),
            ],
        }
    }
}

fn is_production_namespace(namespace: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| match pattern.strip_prefix('*') {
        Some(suffix) => namespace.ends_with(suffix),
        None => namespace == pattern,
    })
}

/// Walk `topology` and emit every issue the rules of `spec.md` §4.7 find,
/// deduplicated by `(resource_type, resource_name, namespace, rule_id)`.
pub fn detect(topology: &TopologySnapshot, config: &IssueDetectorConfig, now: DateTime<Utc>) -> Vec<Issue> {
    let mut seen: HashSet<(String, String, String, &'static str)> = HashSet::new();
    let mut issues = Vec::new();

    let mut push = |rule_id: &'static str, issue: Issue| {
        let key = (
            issue.resource_type.clone(),
            issue.resource_name.clone(),
            issue.namespace.clone(),
            rule_id,
        );
        if seen.insert(key) {
            issues.push(issue);
        }
    };

    for pod in &topology.pods {
        let resource_name = pod.name.clone();

        if !pod.ready {
            if let Some(since) = pod.ready_condition_since {
                let minutes = now.signed_duration_since(since).num_minutes();
                if minutes >= NOT_READY_THRESHOLD_MINUTES {
                    push(
                        "pod-not-ready",
                        Issue {
                            id: format!("pod-not-ready:{}:{}", pod.namespace, pod.name),
                            title: "Pod not Ready".to_string(),
                            description: format!(
                                "pod '{}/{}' has not been Ready for {}m",
                                pod.namespace, pod.name, minutes
                            ),
                            priority: Priority::Warning,
                            resource_type: "Pod".to_string(),
                            resource_name: resource_name.clone(),
                            namespace: pod.namespace.clone(),
                        },
                    );
                }
            }
        }

        for state in &pod.container_states {
            if state.state != ContainerRuntimeState::Waiting {
                continue;
            }
            let Some(reason) = state.reason.as_deref() else {
                continue;
            };
            if CRASH_WAITING_REASONS.contains(&reason) {
                push(
                    "container-waiting",
                    Issue {
                        id: format!(
                            "container-waiting:{}:{}:{}",
                            pod.namespace, pod.name, state.name
                        ),
                        title: format!("Container waiting: {reason}"),
                        description: format!(
                            "container '{}' in pod '{}/{}' is waiting: {reason}",
                            state.name, pod.namespace, pod.name
                        ),
                        priority: Priority::Critical,
                        resource_type: "Pod".to_string(),
                        resource_name: resource_name.clone(),
                        namespace: pod.namespace.clone(),
                    },
                );
            }
        }

        if pod.restart_count >= config.restart_count_threshold {
            push(
                "restart-count",
                Issue {
                    id: format!("restart-count:{}:{}", pod.namespace, pod.name),
                    title: "High container restart count".to_string(),
                    description: format!(
                        "pod '{}/{}' has restarted {} times (threshold {})",
                        pod.namespace, pod.name, pod.restart_count, config.restart_count_threshold
                    ),
                    priority: Priority::Warning,
                    resource_type: "Pod".to_string(),
                    resource_name,
                    namespace: pod.namespace.clone(),
                },
            );
        }
    }

    for workload in &topology.workloads {
        if workload.kind != WorkloadKind::Deployment {
            continue;
        }
        if workload.ready_replicas < workload.desired_replicas {
            push(
                "deployment-under-replicas",
                Issue {
                    id: format!("deployment-under-replicas:{}:{}", workload.namespace, workload.name),
                    title: "Deployment under-replicated".to_string(),
                    description: format!(
                        "deployment '{}/{}' has {}/{} replicas ready",
                        workload.namespace, workload.name, workload.ready_replicas, workload.desired_replicas
                    ),
                    priority: Priority::Warning,
                    resource_type: "Deployment".to_string(),
                    resource_name: workload.name.clone(),
                    namespace: workload.namespace.clone(),
                },
            );
        }
    }

    for node in &topology.nodes {
        if node.status == NodeStatus::NotReady {
            push(
                "node-not-ready",
                Issue {
                    id: format!("node-not-ready:{}", node.name),
                    title: "Node not Ready".to_string(),
                    description: format!("node '{}' is NotReady", node.name),
                    priority: Priority::Critical,
                    resource_type: "Node".to_string(),
                    resource_name: node.name.clone(),
                    namespace: String::new(),
                },
            );
        }
    }

    for service in topology.services.values() {
        if service.selector.is_empty() {
            continue;
        }
        let has_backing_pod = topology.pods.iter().any(|pod| {
            pod.namespace == service.namespace
                && service
                    .selector
                    .iter()
                    .all(|(k, v)| pod.labels.get(k) == Some(v))
        });
        if !has_backing_pod {
            push(
                "orphaned-service",
                Issue {
                    id: format!("orphaned-service:{}", service.key),
                    title: "Orphaned service".to_string(),
                    description: format!(
                        "service '{}' has a selector matching no pod",
                        service.key
                    ),
                    priority: Priority::Info,
                    resource_type: "Service".to_string(),
                    resource_name: service.name.clone(),
                    namespace: service.namespace.clone(),
                },
            );
        }
    }

    detect_blocked_production_edges(topology, config, &mut push);

    issues.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.resource_type.cmp(&b.resource_type))
            .then_with(|| a.resource_name.cmp(&b.resource_name))
            .then_with(|| a.namespace.cmp(&b.namespace))
    });
    issues
}

fn detect_blocked_production_edges(
    topology: &TopologySnapshot,
    config: &IssueDetectorConfig,
    push: &mut impl FnMut(&'static str, Issue),
) {
    let namespace_of = |key: &str| -> Option<&str> {
        topology.services.get(key).map(|s| s.namespace.as_str())
    };

    let mut blocked: BTreeMap<(String, String), String> = BTreeMap::new();
    for conns in topology.connectivity.values() {
        for conn in conns {
            if conn.allowed {
                continue;
            }
            let touches_prod = [namespace_of(&conn.from), namespace_of(&conn.to)]
                .into_iter()
                .flatten()
                .any(|ns| is_production_namespace(ns, &config.production_namespace_patterns));
            if touches_prod {
                blocked
                    .entry((conn.from.clone(), conn.to.clone()))
                    .or_insert_with(|| conn.reason.clone());
            }
        }
    }
    for conn in &topology.ingress_connections {
        if conn.allowed {
            continue;
        }
        if namespace_of(&conn.to)
            .is_some_and(|ns| is_production_namespace(ns, &config.production_namespace_patterns))
        {
            blocked
                .entry((conn.from.clone(), conn.to.clone()))
                .or_insert_with(|| conn.reason.clone());
        }
    }
    for conn in &topology.egress_connections {
        if conn.allowed {
            continue;
        }
        if namespace_of(&conn.from)
            .is_some_and(|ns| is_production_namespace(ns, &config.production_namespace_patterns))
        {
            blocked
                .entry((conn.from.clone(), conn.to.clone()))
                .or_insert_with(|| conn.reason.clone());
        }
    }

    for ((from, to), reason) in blocked {
        let namespace = namespace_of(&from).or_else(|| namespace_of(&to)).unwrap_or("").to_string();
        push(
            "blocked-edge-production",
            Issue {
                id: format!("blocked-edge-production:{from}:{to}"),
                title: "Blocked edge in production namespace".to_string(),
                description: format!("edge '{from}' -> '{to}' is blocked: {reason}"),
                priority: Priority::Critical,
                resource_type: "Connection".to_string(),
                resource_name: format!("{from}->{to}"),
                namespace,
            },
        );
    }
}
