//! Thin CLI wiring around the engine, per `spec.md` §6's "CLI surface of
//! the host program". None of this is engine surface: each command builds
//! the capability handles the engine needs (`kube::Client`, cache, clock,
//! logger, evaluator) and hands them to `stargazer::topology::build`.

pub mod check;
pub mod list;
pub mod scan;
pub mod setup;
pub mod web;
