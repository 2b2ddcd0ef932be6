//! Native `NetworkPolicy` translation.
//!
//! Rule bodies are kept as an opaque JSON-serialized [`PolicyRule::raw`]
//! string rather than re-modeled field by field: the conservative evaluator
//! (`spec.md` §4.3) never inspects rule contents, only applicability by
//! namespace, so there is nothing an exact Rust shape would buy here.

use k8s_openapi::api::networking::v1::{NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule};

use crate::model::{NetworkPolicyInfo, PolicyRule};

pub fn network_policy_to_info(np: &NetworkPolicy) -> NetworkPolicyInfo {
    let meta = &np.metadata;
    let spec = np.spec.clone().unwrap_or_default();

    NetworkPolicyInfo {
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        pod_selector: spec.pod_selector.match_labels.unwrap_or_default(),
        ingress_rules: spec
            .ingress
            .unwrap_or_default()
            .iter()
            .map(ingress_rule_to_raw)
            .collect(),
        egress_rules: spec
            .egress
            .unwrap_or_default()
            .iter()
            .map(egress_rule_to_raw)
            .collect(),
        policy_types: spec.policy_types.unwrap_or_default(),
    }
}

fn ingress_rule_to_raw(rule: &NetworkPolicyIngressRule) -> PolicyRule {
    PolicyRule {
        raw: serde_json::to_string(rule).unwrap_or_default(),
    }
}

fn egress_rule_to_raw(rule: &NetworkPolicyEgressRule) -> PolicyRule {
    PolicyRule {
        raw: serde_json::to_string(rule).unwrap_or_default(),
    }
}
