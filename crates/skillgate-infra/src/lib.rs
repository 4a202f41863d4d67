//! Infrastructure layer for SkillGate.
//!
//! Implements the ports defined in `skillgate-core` against the local
//! machine: dependency probes via `tokio::process`, the directory-backed
//! skill catalog, and `config.toml` loading.

pub mod config;
pub mod filesystem;
pub mod skill;
