//! Istio CRD translation: Gateways, VirtualServices, ServiceEntries, and
//! the AuthorizationPolicy/PeerAuthentication/RequestAuthentication/
//! Sidecar family, all reached through the dynamic client (`spec.md` §9).

use kube::core::DynamicObject;

use super::json::{i64_at, str_at, string_array_at, string_map_at};
use crate::model::{
    service_key, ExternalServiceInfo, GatewayInfo, GatewayKind, IngressRoute, IstioAction,
    IstioPolicyInfo, IstioPolicyType, PolicyRule,
};

const EGRESS_SELECTOR_HINT: &str = "egressgateway";

pub fn gateway_to_info(obj: &DynamicObject) -> GatewayInfo {
    let name = obj.metadata.name.clone().unwrap_or_default();
    let namespace = obj.metadata.namespace.clone().unwrap_or_default();
    let selector = string_map_at(&obj.data, &["spec", "selector"]);

    let servers = obj.data.get("spec").and_then(|s| s.get("servers"));
    let mut hosts = Vec::new();
    let mut ports = Vec::new();
    if let Some(servers) = servers.and_then(|v| v.as_array()) {
        for server in servers {
            hosts.extend(string_array_at(server, &["hosts"]));
            if let Some(port) = i64_at(server, &["port", "number"]) {
                ports.push(port as i32);
            }
        }
    }

    let kind = if selector
        .values()
        .any(|v| v.to_lowercase().contains(EGRESS_SELECTOR_HINT))
    {
        GatewayKind::IstioEgress
    } else {
        GatewayKind::IstioIngress
    };

    GatewayInfo {
        name,
        namespace,
        kind,
        hosts,
        ports,
        selector,
    }
}

pub fn service_entry_to_info(obj: &DynamicObject) -> ExternalServiceInfo {
    let name = obj.metadata.name.clone().unwrap_or_default();
    let namespace = obj.metadata.namespace.clone().unwrap_or_default();
    let hosts = string_array_at(&obj.data, &["spec", "hosts"]);

    let ports = obj
        .data
        .get("spec")
        .and_then(|s| s.get("ports"))
        .and_then(|p| p.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|port| i64_at(port, &["number"]).map(|n| n as i32))
                .collect()
        })
        .unwrap_or_default();

    let service_entry_type = str_at(&obj.data, &["spec", "resolution"])
        .filter(|s| !s.is_empty())
        .unwrap_or("MESH_EXTERNAL")
        .to_string();

    ExternalServiceInfo {
        name,
        namespace,
        hosts,
        ports,
        service_entry_type,
    }
}

/// VirtualServices carry `http[].match[].uri.prefix` routes to a
/// `destination.host`. A destination host resolves to a known service key
/// when it is (or starts with) `<name>.<namespace>.svc...`; otherwise the
/// route is skipped (`spec.md` §4.4 step 6 only emits routes whose backend
/// resolves to a known service).
pub fn virtual_service_to_routes(obj: &DynamicObject, gateway_name: &str) -> Vec<IngressRoute> {
    let hosts = string_array_at(&obj.data, &["spec", "hosts"]);
    let http_routes = obj
        .data
        .get("spec")
        .and_then(|s| s.get("http"))
        .and_then(|h| h.as_array())
        .cloned()
        .unwrap_or_default();

    let mut routes = Vec::new();
    for http in &http_routes {
        let paths = http
            .get("match")
            .and_then(|m| m.as_array())
            .map(|matches| {
                matches
                    .iter()
                    .filter_map(|m| str_at(m, &["uri", "prefix"]).map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let path = paths.first().cloned().unwrap_or_else(|| "/".to_string());

        let destinations = http
            .get("route")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        for dest in &destinations {
            let Some(host) = str_at(dest, &["destination", "host"]) else {
                continue;
            };
            let Some(target) = resolve_destination_service(host) else {
                continue;
            };

            for vs_host in &hosts {
                routes.push(IngressRoute {
                    gateway: gateway_name.to_string(),
                    host: vs_host.clone(),
                    path: path.clone(),
                    target_service_key: target.clone(),
                    route_type: "istio-virtualservice".to_string(),
                });
            }
        }
    }
    routes
}

/// `svc.namespace.svc.cluster.local` or `svc.namespace` -> `namespace/svc`.
fn resolve_destination_service(host: &str) -> Option<String> {
    let mut parts = host.split('.');
    let name = parts.next()?;
    let namespace = parts.next()?;
    if name.is_empty() || namespace.is_empty() {
        return None;
    }
    Some(service_key(namespace, name))
}

pub fn policy_to_info(obj: &DynamicObject, policy_type: IstioPolicyType) -> IstioPolicyInfo {
    let name = obj.metadata.name.clone().unwrap_or_default();
    let namespace = obj.metadata.namespace.clone().unwrap_or_default();
    let selector = string_map_at(&obj.data, &["spec", "selector", "matchLabels"]);

    let action = match policy_type {
        IstioPolicyType::AuthorizationPolicy => {
            match str_at(&obj.data, &["spec", "action"]) {
                Some("DENY") => IstioAction::Deny,
                Some("AUDIT") => IstioAction::Audit,
                Some("CUSTOM") => IstioAction::Custom,
                _ => IstioAction::Allow,
            }
        }
        // Non-AuthorizationPolicy kinds carry no `action`; the conservative
        // evaluator never treats them as applicable (`spec.md` §4.3), so
        // the default is a harmless placeholder, not a load-bearing value.
        _ => IstioAction::Allow,
    };

    let rules = obj
        .data
        .get("spec")
        .and_then(|s| s.get("rules"))
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .map(|r| PolicyRule {
                    raw: serde_json::to_string(r).unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    IstioPolicyInfo {
        name,
        namespace,
        policy_type,
        selector,
        action,
        rules,
    }
}
