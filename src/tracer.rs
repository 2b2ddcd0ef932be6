//! Path Tracer (C7), per `spec.md` §4.6.
//!
//! Composes edge verdicts already attached to a [`TopologySnapshot`] by the
//! builder (C5) and evaluator (C6) into a multi-hop reachability decision.
//! The tracer itself evaluates nothing — it only walks edges the snapshot
//! already carries a verdict for, per `spec.md` §4.6's opening line:
//! "Given (source, destination, namespace, topology)".

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::model::{
    TopologySnapshot, SENTINEL_EGRESS_GATEWAY, SENTINEL_EXTERNAL, SENTINEL_INGRESS_GATEWAY,
};

/// Bounded BFS hop cap, `spec.md` §4.6: "max 8 hops to avoid cycles".
const MAX_HOPS: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HopRecord {
    pub from: String,
    pub to: String,
    pub allowed: bool,
    pub reason: String,
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TracePathResult {
    pub allowed: bool,
    pub path: Vec<HopRecord>,
    pub reason: String,
}

/// Trace reachability from `source` to `destination` over `topology`.
///
/// `source`/`destination` are service keys (`ns/name`) or one of the
/// sentinels `ingress-gateway`/`egress-gateway` (`external` never appears
/// as a caller-supplied endpoint; it is a destination reached only via an
/// [`crate::model::EgressConnection`]). `namespace` is accepted for parity
/// with `spec.md` §4.6's signature; the topology passed in is already
/// scoped by the builder (`spec.md` §4.4), so the tracer itself does not
/// need to re-filter by namespace — it is unused beyond documenting intent.
pub fn trace(
    source: &str,
    destination: &str,
    namespace: Option<&str>,
    topology: &TopologySnapshot,
) -> TracePathResult {
    let _ = namespace;

    if source == destination {
        return TracePathResult {
            allowed: true,
            path: Vec::new(),
            reason: "Path allowed".to_string(),
        };
    }

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(source.to_string());

    let mut queue: VecDeque<(String, Vec<HopRecord>)> = VecDeque::new();

    if source == SENTINEL_INGRESS_GATEWAY {
        // Step 1: seed with every IngressConnection, sorted by `to` so BFS
        // exploration order already matches the lexicographic tie-break.
        let mut seeds: Vec<_> = topology.ingress_connections.iter().collect();
        seeds.sort_by(|a, b| a.to.cmp(&b.to));
        for conn in seeds {
            if visited.contains(&conn.to) {
                continue;
            }
            let hop = HopRecord {
                from: SENTINEL_INGRESS_GATEWAY.to_string(),
                to: conn.to.clone(),
                allowed: conn.allowed,
                reason: conn.reason.clone(),
                policies: conn.policies.clone(),
            };
            if conn.to == destination {
                return finish(vec![hop]);
            }
            visited.insert(conn.to.clone());
            queue.push_back((conn.to.clone(), vec![hop]));
        }
    } else {
        queue.push_back((source.to_string(), Vec::new()));
    }

    while let Some((current, path)) = queue.pop_front() {
        if path.len() >= MAX_HOPS {
            continue;
        }

        // Step 2: destination is the egress gateway — a terminal hop is any
        // EgressConnection leaving the current node.
        if destination == SENTINEL_EGRESS_GATEWAY {
            let mut candidates: Vec<_> = topology
                .egress_connections
                .iter()
                .filter(|c| c.from == current)
                .collect();
            candidates.sort_by(|a, b| a.to.cmp(&b.to));
            if let Some(conn) = candidates.into_iter().next() {
                let mut next_path = path.clone();
                next_path.push(HopRecord {
                    from: current.clone(),
                    to: SENTINEL_EGRESS_GATEWAY.to_string(),
                    allowed: conn.allowed,
                    reason: conn.reason.clone(),
                    policies: conn.policies.clone(),
                });
                return finish(next_path);
            }
        }

        // Step 3: service-to-service edges from the connectivity map.
        let mut neighbors: Vec<_> = topology
            .connectivity
            .get(&current)
            .map(|edges| edges.iter().collect())
            .unwrap_or_else(Vec::new);
        neighbors.sort_by(|a, b| a.to.cmp(&b.to));

        for conn in neighbors {
            if visited.contains(&conn.to) {
                continue;
            }
            let mut next_path = path.clone();
            next_path.push(HopRecord {
                from: current.clone(),
                to: conn.to.clone(),
                allowed: conn.allowed,
                reason: conn.reason.clone(),
                policies: conn.policies.clone(),
            });

            if conn.to == destination {
                return finish(next_path);
            }

            if conn.to == SENTINEL_EXTERNAL && destination == SENTINEL_EXTERNAL {
                return finish(next_path);
            }

            visited.insert(conn.to.clone());
            queue.push_back((conn.to.clone(), next_path));
        }
    }

    TracePathResult {
        allowed: false,
        path: Vec::new(),
        reason: "No path found".to_string(),
    }
}

/// Invariant 6 (`spec.md` §8): the result's `allowed` is the conjunction of
/// every hop's `allowed`, and the top-level `reason` is the first blocking
/// hop's reason, or `"Path allowed"` when every hop passes.
fn finish(path: Vec<HopRecord>) -> TracePathResult {
    let first_blocking = path.iter().find(|h| !h.allowed);
    match first_blocking {
        Some(hop) => TracePathResult {
            allowed: false,
            reason: hop.reason.clone(),
            path,
        },
        None => TracePathResult {
            allowed: true,
            reason: "Path allowed".to_string(),
            path,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn base_snapshot() -> TopologySnapshot {
        TopologySnapshot {
            services: BTreeMap::new(),
            connectivity: BTreeMap::new(),
            ingress_routes: vec![],
            ingress_connections: vec![],
            egress_connections: vec![],
            gateways: vec![],
            external_services: vec![],
            infrastructure: InfrastructureInfo::default(),
            network_policies: vec![],
            cilium_policies: vec![],
            istio_policies: vec![],
            pods: vec![],
            workloads: vec![],
            nodes: vec![],
            namespaces: vec![],
            warnings: vec![],
            generated_at: Utc::now(),
        }
    }

    fn allowed_conn(from: &str, to: &str) -> ServiceConnection {
        ServiceConnection {
            from: from.to_string(),
            to: to.to_string(),
            allowed: true,
            reason: "No policy blocking".to_string(),
            policies: vec![],
            ports: vec![],
        }
    }

    fn blocked_conn(from: &str, to: &str, policy: &str) -> ServiceConnection {
        ServiceConnection {
            from: from.to_string(),
            to: to.to_string(),
            allowed: false,
            reason: format!("blocked by policy '{policy}'"),
            policies: vec![policy.to_string()],
            ports: vec![],
        }
    }

    // Scenario S2: direct allowed service-to-service edge.
    #[test]
    fn direct_allowed_edge_traces_single_hop() {
        let mut snap = base_snapshot();
        snap.connectivity.insert(
            "default/src".to_string(),
            vec![allowed_conn("default/src", "default/dst")],
        );

        let result = trace("default/src", "default/dst", None, &snap);
        assert!(result.allowed);
        assert_eq!(result.path.len(), 1);
        assert_eq!(result.reason, "Path allowed");
    }

    // Scenario S3: ingress-gateway -> app -> db, two hops.
    #[test]
    fn ingress_then_service_hop_traces_two_hops() {
        let mut snap = base_snapshot();
        snap.ingress_connections.push(IngressConnection {
            from: SENTINEL_INGRESS_GATEWAY.to_string(),
            to: "default/app".to_string(),
            allowed: true,
            reason: "No policy blocking".to_string(),
            policies: vec![],
            port: None,
        });
        snap.connectivity.insert(
            "default/app".to_string(),
            vec![allowed_conn("default/app", "default/db")],
        );

        let result = trace(SENTINEL_INGRESS_GATEWAY, "default/db", None, &snap);
        assert!(result.allowed);
        assert_eq!(result.path.len(), 2);
        assert_eq!(result.path[0].to, "default/app");
        assert_eq!(result.path[1].to, "default/db");
    }

    #[test]
    fn blocked_hop_reports_allowed_false_with_blocking_reason() {
        let mut snap = base_snapshot();
        snap.connectivity.insert(
            "default/src".to_string(),
            vec![blocked_conn("default/src", "default/dst", "lockdown")],
        );

        let result = trace("default/src", "default/dst", None, &snap);
        assert!(!result.allowed);
        assert!(result.reason.contains("lockdown"));
    }

    #[test]
    fn no_path_found_when_destination_unreachable() {
        let snap = base_snapshot();
        let result = trace("default/src", "default/dst", None, &snap);
        assert!(!result.allowed);
        assert!(result.path.is_empty());
        assert_eq!(result.reason, "No path found");
    }

    #[test]
    fn tie_break_prefers_lexicographically_smallest_path() {
        let mut snap = base_snapshot();
        snap.connectivity.insert(
            "default/src".to_string(),
            vec![allowed_conn("default/src", "default/b"), allowed_conn("default/src", "default/a")],
        );
        snap.connectivity.insert(
            "default/a".to_string(),
            vec![allowed_conn("default/a", "default/dst")],
        );
        snap.connectivity.insert(
            "default/b".to_string(),
            vec![allowed_conn("default/b", "default/dst")],
        );

        let result = trace("default/src", "default/dst", None, &snap);
        assert!(result.allowed);
        assert_eq!(result.path[0].to, "default/a");
    }

    #[test]
    fn hop_cap_prevents_cycles_from_looping_forever() {
        let mut snap = base_snapshot();
        snap.connectivity.insert(
            "default/a".to_string(),
            vec![allowed_conn("default/a", "default/b")],
        );
        snap.connectivity.insert(
            "default/b".to_string(),
            vec![allowed_conn("default/b", "default/a")],
        );

        let result = trace("default/a", "default/unreachable", None, &snap);
        assert!(!result.allowed);
        assert_eq!(result.reason, "No path found");
    }

    #[test]
    fn egress_destination_terminates_on_any_egress_connection() {
        let mut snap = base_snapshot();
        snap.egress_connections.push(EgressConnection {
            from: "default/web".to_string(),
            to: SENTINEL_EXTERNAL.to_string(),
            allowed: true,
            reason: "No policy blocking".to_string(),
            policies: vec![],
            implicit: true,
        });

        let result = trace("default/web", SENTINEL_EGRESS_GATEWAY, None, &snap);
        assert!(result.allowed);
        assert_eq!(result.path.len(), 1);
        assert_eq!(result.path[0].to, SENTINEL_EGRESS_GATEWAY);
    }

    #[test]
    fn same_source_and_destination_is_trivially_allowed() {
        let snap = base_snapshot();
        let result = trace("default/src", "default/src", None, &snap);
        assert!(result.allowed);
        assert!(result.path.is_empty());
    }
}
