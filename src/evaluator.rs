//! Policy Evaluator (C6), per `spec.md` §4.3 and §4.5.
//!
//! The conservative model: an edge is blocked the moment any *applicable*
//! policy of any family exists, with no rule-level matching. This
//! deliberately overestimates restriction (`spec.md` §9's documented
//! limitation) — a future `PolicyEvaluator` may distinguish ALLOW/DENY
//! Istio actions and pod-selector matches, but that refinement is left
//! undecided here by design, not by oversight.

use crate::model::{
    service_key, CiliumNetworkPolicyInfo, IstioPolicyInfo, IstioPolicyType, NetworkPolicyInfo,
    Verdict, SENTINEL_EXTERNAL,
};

/// Borrowed view over a snapshot's policy lists, passed to every evaluator
/// call. Read-only: `spec.md` §5 — "Policy lists are read-only after
/// collection and may be shared by reference across evaluators."
pub struct PolicyContext<'a> {
    pub network_policies: &'a [NetworkPolicyInfo],
    pub cilium_policies: &'a [CiliumNetworkPolicyInfo],
    pub istio_policies: &'a [IstioPolicyInfo],
}

/// Pure, stateless evaluator over a `PolicyContext`. Implementations are
/// swappable (`spec.md` §4.5); `ConservativeEvaluator` is the default.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate_service_edge(&self, from: &str, to: &str, ctx: &PolicyContext<'_>) -> Verdict;
    fn evaluate_ingress_edge(&self, gateway: &str, to: &str, ctx: &PolicyContext<'_>) -> Verdict;
    fn evaluate_egress_edge(&self, from: &str, to: &str, ctx: &PolicyContext<'_>) -> Verdict;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConservativeEvaluator;

impl PolicyEvaluator for ConservativeEvaluator {
    fn evaluate_service_edge(&self, from: &str, to: &str, ctx: &PolicyContext<'_>) -> Verdict {
        let _ = from;
        let target_namespace = namespace_of_key(to);
        evaluate_conservative(&target_namespace, ctx)
    }

    fn evaluate_ingress_edge(&self, gateway: &str, to: &str, ctx: &PolicyContext<'_>) -> Verdict {
        let _ = gateway;
        let target_namespace = namespace_of_key(to);
        evaluate_conservative(&target_namespace, ctx)
    }

    fn evaluate_egress_edge(&self, from: &str, to: &str, ctx: &PolicyContext<'_>) -> Verdict {
        let _ = to;
        // Egress is gated by the source namespace's policies: a
        // `NetworkPolicy`/Cilium policy restricting a namespace's outbound
        // traffic applies regardless of which external host is the target.
        let target_namespace = namespace_of_key(from);
        evaluate_conservative(&target_namespace, ctx)
    }
}

fn namespace_of_key(key: &str) -> String {
    if key == SENTINEL_EXTERNAL {
        return String::new();
    }
    key.split_once('/')
        .map(|(ns, _)| ns.to_string())
        .unwrap_or_default()
}

/// Applicability and default-allow rule of `spec.md` §4.3, with policies
/// iterated in the stable `(namespace, name)` order the spec requires for
/// determinism.
fn evaluate_conservative(target_namespace: &str, ctx: &PolicyContext<'_>) -> Verdict {
    let mut applicable: Vec<(&str, &str)> = Vec::new();

    for p in ctx.network_policies {
        if p.namespace == target_namespace {
            applicable.push((p.namespace.as_str(), p.name.as_str()));
        }
    }
    for p in ctx.cilium_policies {
        if p.is_cluster_scoped() || p.namespace == target_namespace {
            applicable.push((p.namespace.as_str(), p.name.as_str()));
        }
    }
    for p in ctx.istio_policies {
        if p.policy_type == IstioPolicyType::AuthorizationPolicy && p.namespace == target_namespace
        {
            applicable.push((p.namespace.as_str(), p.name.as_str()));
        }
    }

    applicable.sort_by(|a, b| a.0.cmp(b.0).then(a.1.cmp(b.1)));
    applicable.dedup();

    if applicable.is_empty() {
        return Verdict {
            allowed: true,
            reason: "No policy blocking".to_string(),
            policies: Vec::new(),
        };
    }

    let (_, first_name) = applicable[0];
    Verdict {
        allowed: false,
        reason: format!("blocked by policy '{first_name}'"),
        policies: applicable.iter().map(|(_, name)| name.to_string()).collect(),
    }
}

/// Convenience constructor mirroring `service_key` for callers building
/// `PolicyContext` from collected snapshots elsewhere in the crate.
pub fn default_evaluator() -> ConservativeEvaluator {
    ConservativeEvaluator
}

#[cfg(test)]
mod tests {
    use super::*;

    fn np(namespace: &str, name: &str) -> NetworkPolicyInfo {
        NetworkPolicyInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            pod_selector: Default::default(),
            ingress_rules: vec![],
            egress_rules: vec![],
            policy_types: vec!["Ingress".to_string()],
        }
    }

    #[test]
    fn default_allow_when_no_applicable_policy() {
        let ctx = PolicyContext {
            network_policies: &[],
            cilium_policies: &[],
            istio_policies: &[],
        };
        let verdict =
            ConservativeEvaluator.evaluate_service_edge("default/src", "default/dst", &ctx);
        assert!(verdict.allowed);
        assert!(verdict.policies.is_empty());
        assert_eq!(verdict.reason, "No policy blocking");
    }

    #[test]
    fn applicable_network_policy_blocks_and_cites_itself() {
        let policies = vec![np("default", "lockdown")];
        let ctx = PolicyContext {
            network_policies: &policies,
            cilium_policies: &[],
            istio_policies: &[],
        };
        let verdict =
            ConservativeEvaluator.evaluate_ingress_edge("ingress-gateway", "default/app", &ctx);
        assert!(!verdict.allowed);
        assert_eq!(verdict.policies, vec!["lockdown".to_string()]);
        assert!(verdict.reason.contains("lockdown"));
    }

    #[test]
    fn clusterwide_cilium_policy_applies_to_every_namespace() {
        let cilium = vec![CiliumNetworkPolicyInfo {
            name: "deny-all".to_string(),
            namespace: String::new(),
            endpoint_selector: Default::default(),
            ingress_rules: vec![],
            egress_rules: vec![],
            derived_from: None,
        }];
        let ctx = PolicyContext {
            network_policies: &[],
            cilium_policies: &cilium,
            istio_policies: &[],
        };
        let verdict = ConservativeEvaluator.evaluate_service_edge(
            "other/src",
            &service_key("any-namespace", "dst"),
            &ctx,
        );
        assert!(!verdict.allowed);
        assert_eq!(verdict.policies, vec!["deny-all".to_string()]);
    }

    #[test]
    fn istio_peer_authentication_is_not_applicable() {
        let istio = vec![IstioPolicyInfo {
            name: "mtls".to_string(),
            namespace: "default".to_string(),
            policy_type: IstioPolicyType::PeerAuthentication,
            selector: Default::default(),
            action: crate::model::IstioAction::Allow,
            rules: vec![],
        }];
        let ctx = PolicyContext {
            network_policies: &[],
            cilium_policies: &[],
            istio_policies: &istio,
        };
        let verdict =
            ConservativeEvaluator.evaluate_service_edge("default/src", "default/dst", &ctx);
        assert!(verdict.allowed);
    }

    #[test]
    fn deterministic_ordering_picks_lowest_namespace_then_name() {
        let policies = vec![np("default", "zeta"), np("default", "alpha")];
        let ctx = PolicyContext {
            network_policies: &policies,
            cilium_policies: &[],
            istio_policies: &[],
        };
        let verdict =
            ConservativeEvaluator.evaluate_service_edge("default/src", "default/dst", &ctx);
        assert_eq!(verdict.policies, vec!["alpha".to_string(), "zeta".to_string()]);
        assert!(verdict.reason.contains("alpha"));
    }
}
