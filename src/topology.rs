//! Topology Builder (C5), per `spec.md` §4.4.
//!
//! Assembles services, workload-to-workload connections, ingress/egress
//! edges into one immutable [`TopologySnapshot`], following the ten steps
//! of `spec.md` §4.4 in order. Concurrency follows `spec.md` §5: each
//! resource kind is fetched through the TTL cache (C2) as an independent
//! future, joined before assembly begins.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Service};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};

use crate::access::{DynamicAccess, GroupVersionResource, NamespaceScope, TypedAccess};
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::collectors::{cilium, ingress as ingress_collector, istio, policies, services, workloads};
use crate::error::{with_kind_context, AccessError, StargazerError};
use crate::evaluator::{PolicyContext, PolicyEvaluator};
use crate::infra;
use crate::logging::Logger;
use crate::model::*;

const ISTIO_GVR_GATEWAYS: &str = "gateways";
const ISTIO_GVR_VIRTUAL_SERVICES: &str = "virtualservices";
const ISTIO_GVR_SERVICE_ENTRIES: &str = "serviceentries";
const ISTIO_GVR_AUTHZ_POLICIES: &str = "authorizationpolicies";
const ISTIO_GROUP: &str = "networking.istio.io";
const CILIUM_GROUP: &str = "cilium.io";
const CILIUM_VERSION: &str = "v2";

pub struct BuildParams<'a> {
    pub typed: &'a dyn TypedAccess,
    pub dynamic: &'a dyn DynamicAccess,
    pub cache: &'a TtlCache,
    pub clock: &'a dyn Clock,
    pub logger: &'a dyn Logger,
    pub evaluator: &'a dyn PolicyEvaluator,
    pub scope: NamespaceScope,
    pub deadline: Duration,
}

/// Build one topology snapshot, bounded by `params.deadline`
/// (`spec.md` §5: "a query triggers a bounded, time-windowed refresh").
pub async fn build(params: BuildParams<'_>) -> Result<TopologySnapshot, StargazerError> {
    match tokio::time::timeout(params.deadline, build_inner(&params)).await {
        Ok(result) => result,
        Err(_) => Err(StargazerError::Transient(
            "topology build exceeded query deadline".to_string(),
        )),
    }
}

async fn build_inner(params: &BuildParams<'_>) -> Result<TopologySnapshot, StargazerError> {
    let now = params.clock.now();
    let mut warnings = Vec::new();

    // --- Step 1: Services, Pods, Namespaces in parallel (mandatory kinds). ---
    let scope_key = params.scope.as_str();
    let (pods_result, services_result, namespaces_result) = tokio::join!(
        params
            .cache
            .get_or_fetch(&format!("pods:{scope_key}"), || params.typed.list_pods(&params.scope)),
        params
            .cache
            .get_or_fetch(&format!("services:{scope_key}"), || params
                .typed
                .list_services(&params.scope)),
        params
            .cache
            .get_or_fetch("namespaces:all", || params.typed.list_namespaces()),
    );

    let pods_raw: Vec<Pod> = require_mandatory(pods_result, "pods", &mut warnings, params.logger)?;
    let services_raw: Vec<Service> =
        require_mandatory(services_result, "services", &mut warnings, params.logger)?;
    let namespaces_raw: Vec<Namespace> =
        require_mandatory(namespaces_result, "namespaces", &mut warnings, params.logger)?;

    let pods: Vec<PodInfo> = pods_raw.iter().map(workloads::pod_to_info).collect();
    let namespaces: Vec<NamespaceInfo> = namespaces_raw.iter().map(workloads::namespace_to_info).collect();

    // Optional-but-expected workload kinds, nodes, native network policies.
    let (deployments_result, stateful_sets_result, daemon_sets_result, nodes_result, network_policies_result, ingresses_result) = tokio::join!(
        params
            .cache
            .get_or_fetch(&format!("deployments:{scope_key}"), || params
                .typed
                .list_deployments(&params.scope)),
        params
            .cache
            .get_or_fetch(&format!("statefulsets:{scope_key}"), || params
                .typed
                .list_stateful_sets(&params.scope)),
        params
            .cache
            .get_or_fetch(&format!("daemonsets:{scope_key}"), || params
                .typed
                .list_daemon_sets(&params.scope)),
        params.cache.get_or_fetch("nodes:all", || params.typed.list_nodes()),
        params
            .cache
            .get_or_fetch(&format!("networkpolicies:{scope_key}"), || params
                .typed
                .list_network_policies(&params.scope)),
        params
            .cache
            .get_or_fetch(&format!("ingresses:{scope_key}"), || params
                .typed
                .list_ingresses(&params.scope)),
    );

    let deployments: Vec<Deployment> =
        optional_or_empty(deployments_result, "deployments", &mut warnings, params.logger);
    let stateful_sets: Vec<StatefulSet> =
        optional_or_empty(stateful_sets_result, "statefulsets", &mut warnings, params.logger);
    let daemon_sets: Vec<DaemonSet> =
        optional_or_empty(daemon_sets_result, "daemonsets", &mut warnings, params.logger);
    let nodes_raw: Vec<Node> = optional_or_empty(nodes_result, "nodes", &mut warnings, params.logger);
    let network_policies_raw: Vec<NetworkPolicy> = optional_or_empty(
        network_policies_result,
        "networkpolicies",
        &mut warnings,
        params.logger,
    );
    let ingresses_raw: Vec<Ingress> =
        optional_or_empty(ingresses_result, "ingresses", &mut warnings, params.logger);

    let nodes: Vec<NodeInfo> = nodes_raw.iter().map(workloads::node_to_info).collect();
    let network_policies: Vec<NetworkPolicyInfo> = network_policies_raw
        .iter()
        .map(policies::network_policy_to_info)
        .collect();

    let mut workload_infos: Vec<WorkloadInfo> = Vec::new();
    workload_infos.extend(deployments.iter().map(|d| workloads::deployment_to_info(d, now)));
    workload_infos.extend(
        stateful_sets
            .iter()
            .map(|s| workloads::stateful_set_to_info(s, now)),
    );
    workload_infos.extend(daemon_sets.iter().map(|d| workloads::daemon_set_to_info(d, now)));

    // --- Step 2: resolve each service's backing workloads by selector match. ---
    let mut service_infos: Vec<ServiceInfo> = services_raw.iter().map(services::service_to_info).collect();
    for service in &mut service_infos {
        if service.selector.is_empty() {
            continue;
        }
        service.backing_workloads = workload_infos
            .iter()
            .filter(|w| {
                w.namespace == service.namespace
                    && !w.selector.is_empty()
                    && is_subset(&service.selector, &w.selector)
            })
            .map(|w| format!("{}/{}", workload_kind_str(w.kind), w.name))
            .collect();
    }

    let services_map: BTreeMap<String, ServiceInfo> = service_infos
        .into_iter()
        .map(|s| (s.key.clone(), s))
        .collect();
    let known_service_keys: HashSet<String> = services_map.keys().cloned().collect();

    let in_scope_keys: Vec<String> = services_map
        .values()
        .filter(|s| params.scope.matches(&s.namespace))
        .map(|s| s.key.clone())
        .collect();

    // --- Step 4: infrastructure detection. ---
    let mut infrastructure = infra::detect(params.dynamic).await;

    // --- Step 3: candidate service-to-service connections, evaluated. ---
    let policy_ctx_network = network_policies.clone();
    let mut cilium_policies: Vec<CiliumNetworkPolicyInfo> = Vec::new();
    let mut istio_policies: Vec<IstioPolicyInfo> = Vec::new();
    let mut gateways: Vec<GatewayInfo> = Vec::new();
    let mut ingress_routes: Vec<IngressRoute> = Vec::new();
    let mut external_services: Vec<ExternalServiceInfo> = Vec::new();

    // --- Step 5: Istio Gateways/VirtualServices/ServiceEntries/AuthorizationPolicies. ---
    if infrastructure.istio_enabled {
        let version = infrastructure
            .istio_api_version
            .clone()
            .unwrap_or_else(|| "v1".to_string());

        let gw_gvr = GroupVersionResource::new(ISTIO_GROUP, &version, ISTIO_GVR_GATEWAYS);
        let vs_gvr = GroupVersionResource::new(ISTIO_GROUP, &version, ISTIO_GVR_VIRTUAL_SERVICES);
        let se_gvr = GroupVersionResource::new(ISTIO_GROUP, &version, ISTIO_GVR_SERVICE_ENTRIES);
        let ap_gvr = GroupVersionResource::new(ISTIO_GROUP, &version, ISTIO_GVR_AUTHZ_POLICIES);

        let gateway_objs = params
            .dynamic
            .list_dynamic(&gw_gvr, &NamespaceScope::All)
            .await
            .unwrap_or_default();
        gateways = gateway_objs.iter().map(istio::gateway_to_info).collect();

        let vs_objs = params
            .dynamic
            .list_dynamic(&vs_gvr, &NamespaceScope::All)
            .await
            .unwrap_or_default();
        for vs in &vs_objs {
            let gateway_name = vs.metadata.name.clone().unwrap_or_default();
            ingress_routes.extend(istio::virtual_service_to_routes(vs, &gateway_name));
        }

        let se_objs = params
            .dynamic
            .list_dynamic(&se_gvr, &NamespaceScope::All)
            .await
            .unwrap_or_default();
        external_services = se_objs.iter().map(istio::service_entry_to_info).collect();

        let ap_objs = params
            .dynamic
            .list_dynamic(&ap_gvr, &NamespaceScope::All)
            .await
            .unwrap_or_default();
        istio_policies = ap_objs
            .iter()
            .map(|o| istio::policy_to_info(o, IstioPolicyType::AuthorizationPolicy))
            .collect();
    }

    // --- Cilium policies (optional; cluster- and namespace-scoped). ---
    if infrastructure.cilium_enabled {
        let namespaced_gvr =
            GroupVersionResource::new(CILIUM_GROUP, CILIUM_VERSION, "ciliumnetworkpolicies");
        let clusterwide_gvr =
            GroupVersionResource::new(CILIUM_GROUP, CILIUM_VERSION, "ciliumclusterwidenetworkpolicies");

        let namespaced_objs = params
            .dynamic
            .list_dynamic(&namespaced_gvr, &NamespaceScope::All)
            .await
            .unwrap_or_default();
        cilium_policies.extend(
            namespaced_objs
                .iter()
                .map(|o| cilium::network_policy_to_info(o, false)),
        );

        let clusterwide_objs = params
            .dynamic
            .list_dynamic(&clusterwide_gvr, &NamespaceScope::All)
            .await
            .unwrap_or_default();
        cilium_policies.extend(
            clusterwide_objs
                .iter()
                .map(|o| cilium::network_policy_to_info(o, true)),
        );
    }

    let policy_ctx = PolicyContext {
        network_policies: &policy_ctx_network,
        cilium_policies: &cilium_policies,
        istio_policies: &istio_policies,
    };

    let mut connectivity: BTreeMap<String, Vec<ServiceConnection>> = BTreeMap::new();
    for from in &in_scope_keys {
        let mut edges = Vec::new();
        for to in &in_scope_keys {
            if from == to {
                continue;
            }
            let verdict = params.evaluator.evaluate_service_edge(from, to, &policy_ctx);
            let ports = services_map.get(to).map(|s| s.ports.clone()).unwrap_or_default();
            edges.push(ServiceConnection {
                from: from.clone(),
                to: to.clone(),
                allowed: verdict.allowed,
                reason: verdict.reason,
                policies: verdict.policies,
                ports,
            });
        }
        connectivity.insert(from.clone(), edges);
    }

    // --- Step 6: Kubernetes Ingresses -> routes + candidate IngressConnections. ---
    let mut ingress_connections = Vec::new();
    for ing in &ingresses_raw {
        let routes = ingress_collector::ingress_to_routes(ing, &known_service_keys);
        for route in &routes {
            let verdict = params.evaluator.evaluate_ingress_edge(
                SENTINEL_INGRESS_GATEWAY,
                &route.target_service_key,
                &policy_ctx,
            );
            ingress_connections.push(IngressConnection {
                from: SENTINEL_INGRESS_GATEWAY.to_string(),
                to: route.target_service_key.clone(),
                allowed: verdict.allowed,
                reason: verdict.reason,
                policies: verdict.policies,
                port: None,
            });
        }
        ingress_routes.extend(routes);
    }

    // --- Step 7: ServiceEntries -> EgressConnection per in-scope service. ---
    let mut egress_connections = Vec::new();
    if !external_services.is_empty() {
        let joined_hosts: Vec<String> = external_services
            .iter()
            .flat_map(|se| se.hosts.iter().cloned())
            .collect();
        let target = joined_hosts.join(",");
        if !target.is_empty() {
            for service_key in &in_scope_keys {
                let verdict = params
                    .evaluator
                    .evaluate_egress_edge(service_key, &target, &policy_ctx);
                egress_connections.push(EgressConnection {
                    from: service_key.clone(),
                    to: target.clone(),
                    allowed: verdict.allowed,
                    reason: verdict.reason,
                    policies: verdict.policies,
                    implicit: false,
                });
            }
        }
    }

    // --- Step 8: implicit direct-egress edge when no Istio egress gateway. ---
    let has_egress_gateway = gateways.iter().any(|g| g.kind == GatewayKind::IstioEgress);
    if !has_egress_gateway {
        for service_key in &in_scope_keys {
            let verdict =
                params
                    .evaluator
                    .evaluate_egress_edge(service_key, SENTINEL_EXTERNAL, &policy_ctx);
            egress_connections.push(EgressConnection {
                from: service_key.clone(),
                to: SENTINEL_EXTERNAL.to_string(),
                allowed: verdict.allowed,
                reason: verdict.reason,
                policies: verdict.policies,
                implicit: true,
            });
        }
    }

    // --- Step 10: freeze. ---
    let snapshot = TopologySnapshot {
        services: services_map,
        connectivity,
        ingress_routes,
        ingress_connections,
        egress_connections,
        gateways,
        external_services,
        infrastructure,
        network_policies,
        cilium_policies,
        istio_policies,
        pods,
        workloads: workload_infos,
        nodes,
        namespaces,
        warnings,
        generated_at: now,
    };

    params.logger.info(
        "topology_snapshot_built",
        &[
            ("services", &snapshot.services.len().to_string()),
            ("warnings", &snapshot.warnings.len().to_string()),
        ],
    );

    Ok(snapshot)
}

fn require_mandatory<K>(
    result: Result<Vec<K>, AccessError>,
    kind: &str,
    warnings: &mut Vec<String>,
    logger: &dyn Logger,
) -> Result<Vec<K>, StargazerError> {
    match result {
        Ok(items) => Ok(items),
        Err(AccessError::NotAuthorized(msg)) => {
            warnings.push(format!("{kind} unavailable: not authorized ({msg})"));
            logger.warn("collector_not_authorized", &[("kind", kind), ("message", &msg)]);
            Ok(Vec::new())
        }
        Err(other) => {
            logger.warn("collector_degraded", &[("kind", kind), ("error", &other.to_string())]);
            Err(StargazerError::from(with_kind_context(kind, other)))
        }
    }
}

fn optional_or_empty<K>(
    result: Result<Vec<K>, AccessError>,
    kind: &str,
    warnings: &mut Vec<String>,
    logger: &dyn Logger,
) -> Vec<K> {
    match result {
        Ok(items) => items,
        Err(AccessError::NotAuthorized(msg)) => {
            warnings.push(format!("{kind} unavailable: not authorized ({msg})"));
            logger.warn("collector_not_authorized", &[("kind", kind), ("message", &msg)]);
            Vec::new()
        }
        Err(AccessError::NotFound(_)) => Vec::new(),
        Err(other) => {
            logger.warn("collector_degraded", &[("kind", kind), ("error", &other.to_string())]);
            Vec::new()
        }
    }
}

fn is_subset(needle: &BTreeMap<String, String>, haystack: &BTreeMap<String, String>) -> bool {
    needle.iter().all(|(k, v)| haystack.get(k) == Some(v))
}

fn workload_kind_str(kind: WorkloadKind) -> &'static str {
    match kind {
        WorkloadKind::Deployment => "deployment",
        WorkloadKind::StatefulSet => "statefulset",
        WorkloadKind::DaemonSet => "daemonset",
    }
}
