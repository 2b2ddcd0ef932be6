//! Core data model — value-typed snapshots, per `spec.md` §3.
//!
//! A scan produces one immutable `TopologySnapshot`. Nothing in this
//! module is mutated after the builder publishes it; consumers (tracer,
//! detector, HTTP handlers) take ownership or a shared reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved endpoints used in connectivity edges and traces.
pub const SENTINEL_INGRESS_GATEWAY: &str = "ingress-gateway";
pub const SENTINEL_EGRESS_GATEWAY: &str = "egress-gateway";
pub const SENTINEL_EXTERNAL: &str = "external";

/// Namespace-qualified key `ns/name`.
pub fn service_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/* ============================= WORKLOADS ============================= */

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContainerRuntimeState {
    Running,
    Waiting,
    Terminated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerStateInfo {
    pub name: String,
    pub state: ContainerRuntimeState,
    pub reason: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    pub node: Option<String>,
    pub ready: bool,
    /// Last transition time of the `Ready` condition, used by the issue
    /// detector's "not Ready for >5m" rule (`spec.md` §4.7).
    pub ready_condition_since: Option<DateTime<Utc>>,
    pub restart_count: i32,
    pub containers: Vec<String>,
    pub init_containers: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub container_states: Vec<ContainerStateInfo>,
    pub mesh_present: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadInfo {
    pub kind: WorkloadKind,
    pub name: String,
    pub namespace: String,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub selector: BTreeMap<String, String>,
    pub images: Vec<String>,
    pub age: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    ClusterIp,
    NodePort,
    LoadBalancer,
    ExternalName,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServicePort {
    pub name: Option<String>,
    pub number: i32,
    pub protocol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInfo {
    /// `ns/name`.
    pub key: String,
    pub name: String,
    pub namespace: String,
    pub service_type: ServiceType,
    pub cluster_ip: Option<String>,
    pub ports: Vec<ServicePort>,
    pub selector: BTreeMap<String, String>,
    pub backing_workloads: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Ready,
    NotReady,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInfo {
    pub name: String,
    pub status: NodeStatus,
    pub role_labels: Vec<String>,
    pub kubelet_version: String,
    pub capacity: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NamespacePhase {
    Active,
    Terminating,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamespaceInfo {
    pub name: String,
    pub phase: NamespacePhase,
}

/* ============================= CONNECTIVITY ============================= */

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: String,
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConnection {
    pub from: String,
    pub to: String,
    pub allowed: bool,
    pub reason: String,
    pub policies: Vec<String>,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngressConnection {
    pub from: String,
    pub to: String,
    pub allowed: bool,
    pub reason: String,
    pub policies: Vec<String>,
    pub port: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EgressConnection {
    pub from: String,
    /// Hostname, or the `external` sentinel.
    pub to: String,
    pub allowed: bool,
    pub reason: String,
    pub policies: Vec<String>,
    /// `true` for the implicit direct-egress edge emitted in the absence
    /// of an Istio egress gateway (`spec.md` §4.4 step 8).
    pub implicit: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    IstioIngress,
    IstioEgress,
    KubernetesIngress,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayInfo {
    pub name: String,
    pub namespace: String,
    pub kind: GatewayKind,
    pub hosts: Vec<String>,
    pub ports: Vec<i32>,
    pub selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngressRoute {
    pub gateway: String,
    pub host: String,
    pub path: String,
    pub target_service_key: String,
    pub route_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalServiceInfo {
    pub name: String,
    pub namespace: String,
    pub hosts: Vec<String>,
    pub ports: Vec<i32>,
    pub service_entry_type: String,
}

/* ============================= POLICIES ============================= */

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PolicyRule {
    pub raw: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkPolicyInfo {
    pub name: String,
    pub namespace: String,
    pub pod_selector: BTreeMap<String, String>,
    pub ingress_rules: Vec<PolicyRule>,
    pub egress_rules: Vec<PolicyRule>,
    pub policy_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiliumNetworkPolicyInfo {
    pub name: String,
    /// Empty ⇒ cluster-scoped.
    pub namespace: String,
    pub endpoint_selector: BTreeMap<String, String>,
    pub ingress_rules: Vec<PolicyRule>,
    pub egress_rules: Vec<PolicyRule>,
    pub derived_from: Option<String>,
}

impl CiliumNetworkPolicyInfo {
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IstioPolicyType {
    AuthorizationPolicy,
    PeerAuthentication,
    RequestAuthentication,
    Sidecar,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum IstioAction {
    Allow,
    Deny,
    Audit,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IstioPolicyInfo {
    pub name: String,
    pub namespace: String,
    pub policy_type: IstioPolicyType,
    pub selector: BTreeMap<String, String>,
    pub action: IstioAction,
    pub rules: Vec<PolicyRule>,
}

/* ============================= INFRASTRUCTURE ============================= */

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InfrastructureInfo {
    pub istio_enabled: bool,
    pub istio_api_version: Option<String>,
    pub cilium_enabled: bool,
    pub ingress_nginx_enabled: bool,
}

/* ============================= SNAPSHOT ============================= */

/// Immutable topology snapshot, produced atomically by the builder (C5).
///
/// `spec.md` §3 names the services map, connectivity map, ingress/egress
/// info, infrastructure info, and the three policy lists as the snapshot's
/// contents. **(expansion)** `pods`, `workloads`, `nodes`, and `namespaces`
/// are carried alongside them: the Issue Detector (C8, `spec.md` §4.7)
/// walks pod readiness/restarts, deployment replica counts, and node
/// status, none of which are reachable from the fields `spec.md` §3 lists
/// on their own. The builder already collects all four in step 1, so
/// retaining them on the published snapshot is the natural way to hand
/// that data to downstream consumers without a second cluster round-trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopologySnapshot {
    pub services: BTreeMap<String, ServiceInfo>,
    pub connectivity: BTreeMap<String, Vec<ServiceConnection>>,
    pub ingress_routes: Vec<IngressRoute>,
    pub ingress_connections: Vec<IngressConnection>,
    pub egress_connections: Vec<EgressConnection>,
    pub gateways: Vec<GatewayInfo>,
    pub external_services: Vec<ExternalServiceInfo>,
    pub infrastructure: InfrastructureInfo,
    pub network_policies: Vec<NetworkPolicyInfo>,
    pub cilium_policies: Vec<CiliumNetworkPolicyInfo>,
    pub istio_policies: Vec<IstioPolicyInfo>,
    pub pods: Vec<PodInfo>,
    pub workloads: Vec<WorkloadInfo>,
    pub nodes: Vec<NodeInfo>,
    pub namespaces: Vec<NamespaceInfo>,
    /// Resource kinds that were unavailable (NotAuthorized) during this
    /// scan, per `spec.md` §7's "successful-but-degraded" behavior.
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl TopologySnapshot {
    /// Invariant 1 (`spec.md` §3/§8): every connection's endpoints resolve
    /// to a known service or to one of the three sentinels.
    pub fn endpoints_resolve(&self) -> bool {
        let is_known = |key: &str| {
            self.services.contains_key(key)
                || key == SENTINEL_INGRESS_GATEWAY
                || key == SENTINEL_EGRESS_GATEWAY
                || key == SENTINEL_EXTERNAL
        };

        // Egress `to` is a ServiceEntry hostname list (`spec.md` §3: "to:
        // external hostname-or-`external`"), never a service key or
        // sentinel, so it is resolved by definition once non-empty.
        self.connectivity.values().flatten().all(|c| {
            (self.services.contains_key(&c.from) || is_known(&c.from)) && is_known(&c.to)
        }) && self
            .ingress_connections
            .iter()
            .all(|c| is_known(&c.to))
            && self
                .egress_connections
                .iter()
                .all(|c| is_known(&c.from) && !c.to.is_empty())
    }

    /// Invariant 2 (`spec.md` §3/§8): `allowed=false` implies non-empty
    /// `policies` and a `reason` mentioning at least one of them.
    pub fn denials_cite_policies(&self) -> bool {
        let check = |allowed: bool, reason: &str, policies: &[String]| {
            if allowed {
                true
            } else {
                !policies.is_empty() && policies.iter().any(|p| reason.contains(p.as_str()))
            }
        };

        self.connectivity
            .values()
            .flatten()
            .all(|c| check(c.allowed, &c.reason, &c.policies))
            && self
                .ingress_connections
                .iter()
                .all(|c| check(c.allowed, &c.reason, &c.policies))
            && self
                .egress_connections
                .iter()
                .all(|c| check(c.allowed, &c.reason, &c.policies))
    }
}
