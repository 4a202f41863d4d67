//! Shared domain types for SkillGate.
//!
//! Manifests, requirements, probe outcomes, gating results, registry
//! entries, configuration and their error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod gating;
pub mod skill;
