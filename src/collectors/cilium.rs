//! Cilium CRD translation: `CiliumNetworkPolicy` and
//! `CiliumClusterwideNetworkPolicy`, reached through the dynamic client.
//! A clusterwide policy has no namespace, so `namespace` on the resulting
//! [`CiliumNetworkPolicyInfo`] is left empty, matching `spec.md` §3's
//! "empty ⇒ cluster-scoped" rule.

use kube::core::DynamicObject;

use super::json::string_map_at;
use crate::model::{CiliumNetworkPolicyInfo, PolicyRule};

pub fn network_policy_to_info(obj: &DynamicObject, cluster_scoped: bool) -> CiliumNetworkPolicyInfo {
    let name = obj.metadata.name.clone().unwrap_or_default();
    let namespace = if cluster_scoped {
        String::new()
    } else {
        obj.metadata.namespace.clone().unwrap_or_default()
    };

    let endpoint_selector = string_map_at(&obj.data, &["spec", "endpointSelector", "matchLabels"]);

    let ingress_rules = rules_at(obj, "ingress");
    let egress_rules = rules_at(obj, "egress");

    let derived_from = obj
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get("app.kubernetes.io/managed-by"))
        .cloned();

    CiliumNetworkPolicyInfo {
        name,
        namespace,
        endpoint_selector,
        ingress_rules,
        egress_rules,
        derived_from,
    }
}

fn rules_at(obj: &DynamicObject, field: &str) -> Vec<PolicyRule> {
    obj.data
        .get("spec")
        .and_then(|s| s.get(field))
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .map(|r| PolicyRule {
                    raw: serde_json::to_string(r).unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default()
}
