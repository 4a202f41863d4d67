//! Skill infrastructure: real dependency probes and the on-disk catalog.

pub mod catalog;
pub mod system_probes;
