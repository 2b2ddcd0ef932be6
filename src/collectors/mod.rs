//! Resource Collectors (C3).
//!
//! One module per resource family, each translating API objects into the
//! data-model structs of `model.rs` using the exact rules of `spec.md`
//! §4.3. Collectors never talk to the cluster directly; they are called
//! with already-fetched API objects (the caller routes the fetch through
//! the TTL cache, C2) so the translation logic stays trivially testable.

pub mod cilium;
pub mod ingress;
pub mod istio;
pub(crate) mod json;
pub mod policies;
pub mod services;
pub mod workloads;
