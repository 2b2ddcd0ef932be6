//! Service translation.
//!
//! `backing_workloads` is intentionally left empty here: resolving it
//! requires pods and workloads collected separately, so the topology
//! builder (C5, step 2) fills it in by selector intersection.

use k8s_openapi::api::core::v1::Service;

use crate::model::{service_key, ServiceInfo, ServicePort, ServiceType};

pub fn service_to_info(svc: &Service) -> ServiceInfo {
    let meta = &svc.metadata;
    let name = meta.name.clone().unwrap_or_default();
    let namespace = meta.namespace.clone().unwrap_or_default();
    let spec = svc.spec.clone().unwrap_or_default();

    let service_type = match spec.type_.as_deref() {
        Some("NodePort") => ServiceType::NodePort,
        Some("LoadBalancer") => ServiceType::LoadBalancer,
        Some("ExternalName") => ServiceType::ExternalName,
        _ => ServiceType::ClusterIp,
    };

    let ports = spec
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| ServicePort {
            name: p.name,
            number: p.port,
            protocol: p.protocol.unwrap_or_else(|| "TCP".to_string()),
        })
        .collect();

    ServiceInfo {
        key: service_key(&namespace, &name),
        name,
        namespace,
        service_type,
        cluster_ip: spec.cluster_ip,
        ports,
        selector: spec.selector.unwrap_or_default(),
        backing_workloads: Vec::new(),
    }
}
