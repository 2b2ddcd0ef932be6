//! Kubernetes `Ingress` translation (`spec.md` §4.4 step 6).
//!
//! For each rule/path whose backend resolves to a known service, emits an
//! `IngressRoute` naming the ingress object as `gateway`. The topology
//! builder turns each route into a candidate `IngressConnection` from the
//! `ingress-gateway` sentinel to the target service.

use std::collections::HashSet;

use k8s_openapi::api::networking::v1::Ingress;

use crate::model::{service_key, IngressRoute};

pub fn ingress_to_routes(ing: &Ingress, known_services: &HashSet<String>) -> Vec<IngressRoute> {
    let gateway = ing.metadata.name.clone().unwrap_or_default();
    let namespace = ing.metadata.namespace.clone().unwrap_or_default();

    let Some(spec) = ing.spec.as_ref() else {
        return Vec::new();
    };
    let Some(rules) = spec.rules.as_ref() else {
        return Vec::new();
    };

    let mut routes = Vec::new();
    for rule in rules {
        let host = rule.host.clone().unwrap_or_default();
        let Some(http) = rule.http.as_ref() else {
            continue;
        };
        for path in &http.paths {
            let Some(service_backend) = path.backend.service.as_ref() else {
                continue;
            };
            let target = service_key(&namespace, &service_backend.name);
            if !known_services.contains(&target) {
                continue;
            }
            routes.push(IngressRoute {
                gateway: gateway.clone(),
                host: host.clone(),
                path: path.path.clone().unwrap_or_else(|| "/".to_string()),
                target_service_key: target,
                route_type: "kubernetes-ingress".to_string(),
            });
        }
    }
    routes
}
