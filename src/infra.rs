//! Infrastructure Detector (C4).
//!
//! Discovers which optional subsystems (Istio, Cilium, Ingress-Nginx) are
//! present in the cluster and, for Istio, at which API version, per
//! `spec.md` §4 C4 and §4.3's "Dynamic API version probe". Detection uses
//! the dynamic handle so the probe never depends on CRDs being compiled
//! into this crate; a probe failing with `NotFound` means the subsystem is
//! absent, not an error (`spec.md` §7).

use crate::access::{DynamicAccess, GroupVersionResource, NamespaceScope};
use crate::error::AccessError;
use crate::model::InfrastructureInfo;

const ISTIO_GROUP: &str = "networking.istio.io";
const ISTIO_VERSIONS: [&str; 2] = ["v1", "v1beta1"];
const CILIUM_GROUP: &str = "cilium.io";
const CILIUM_VERSION: &str = "v2";
const INGRESS_CLASS_GROUP: &str = "networking.k8s.io";
const INGRESS_CLASS_VERSION: &str = "v1";

/// Probe for Istio, Cilium, and Ingress-Nginx, returning a populated
/// [`InfrastructureInfo`]. Each probe is independent: a missing subsystem
/// never aborts detection of the others.
pub async fn detect(dynamic: &dyn DynamicAccess) -> InfrastructureInfo {
    let (istio_enabled, istio_api_version) = probe_istio(dynamic).await;
    let cilium_enabled = probe_cilium(dynamic).await;
    let ingress_nginx_enabled = probe_ingress_nginx(dynamic).await;

    InfrastructureInfo {
        istio_enabled,
        istio_api_version,
        cilium_enabled,
        ingress_nginx_enabled,
    }
}

/// Try `networking.istio.io/v1` first, then fall back to `v1beta1`, per
/// `spec.md` §4.3. The winning version is cached for the snapshot by the
/// caller storing it on `InfrastructureInfo`.
async fn probe_istio(dynamic: &dyn DynamicAccess) -> (bool, Option<String>) {
    for version in ISTIO_VERSIONS {
        let gvr = GroupVersionResource::new(ISTIO_GROUP, version, "gateways");
        match dynamic.list_dynamic(&gvr, &NamespaceScope::All).await {
            Ok(_) => return (true, Some(version.to_string())),
            Err(AccessError::NotFound(_)) => continue,
            Err(_) => continue,
        }
    }
    (false, None)
}

async fn probe_cilium(dynamic: &dyn DynamicAccess) -> bool {
    let gvr = GroupVersionResource::new(CILIUM_GROUP, CILIUM_VERSION, "ciliumnetworkpolicies");
    matches!(
        dynamic.list_dynamic(&gvr, &NamespaceScope::All).await,
        Ok(_)
    )
}

async fn probe_ingress_nginx(dynamic: &dyn DynamicAccess) -> bool {
    let gvr = GroupVersionResource::new(INGRESS_CLASS_GROUP, INGRESS_CLASS_VERSION, "ingressclasses");
    match dynamic.list_dynamic(&gvr, &NamespaceScope::All).await {
        Ok(items) => items.iter().any(|obj| {
            obj.metadata
                .name
                .as_deref()
                .unwrap_or("")
                .to_lowercase()
                .contains("nginx")
        }),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kube::core::DynamicObject;
    use std::sync::Mutex;

    struct FakeDynamic {
        responses: Mutex<Vec<(GroupVersionResource, Result<Vec<DynamicObject>, AccessError>)>>,
    }

    #[async_trait]
    impl DynamicAccess for FakeDynamic {
        async fn list_dynamic(
            &self,
            gvr: &GroupVersionResource,
            _scope: &NamespaceScope,
        ) -> Result<Vec<DynamicObject>, AccessError> {
            let mut responses = self.responses.lock().unwrap();
            let idx = responses.iter().position(|(g, _)| g == gvr);
            match idx {
                Some(i) => responses.remove(i).1,
                None => Err(AccessError::NotFound("no such resource".into())),
            }
        }
    }

    #[tokio::test]
    async fn istio_v1_preferred_over_v1beta1() {
        let fake = FakeDynamic {
            responses: Mutex::new(vec![(
                GroupVersionResource::new(ISTIO_GROUP, "v1", "gateways"),
                Ok(vec![]),
            )]),
        };
        let (enabled, version) = probe_istio(&fake).await;
        assert!(enabled);
        assert_eq!(version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn istio_falls_back_to_v1beta1() {
        let fake = FakeDynamic {
            responses: Mutex::new(vec![(
                GroupVersionResource::new(ISTIO_GROUP, "v1beta1", "gateways"),
                Ok(vec![]),
            )]),
        };
        let (enabled, version) = probe_istio(&fake).await;
        assert!(enabled);
        assert_eq!(version.as_deref(), Some("v1beta1"));
    }

    #[tokio::test]
    async fn istio_absent_when_both_versions_not_found() {
        let fake = FakeDynamic {
            responses: Mutex::new(vec![]),
        };
        let (enabled, version) = probe_istio(&fake).await;
        assert!(!enabled);
        assert_eq!(version, None);
    }

    #[tokio::test]
    async fn detect_combines_independent_probes() {
        let fake = FakeDynamic {
            responses: Mutex::new(vec![(
                GroupVersionResource::new(CILIUM_GROUP, CILIUM_VERSION, "ciliumnetworkpolicies"),
                Ok(vec![]),
            )]),
        };
        let info = detect(&fake).await;
        assert!(!info.istio_enabled);
        assert!(info.cilium_enabled);
        assert!(!info.ingress_nginx_enabled);
    }
}
