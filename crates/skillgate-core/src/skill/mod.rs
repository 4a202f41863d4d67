//! Skill gating: manifest parsing, dependency probing, gating evaluation and
//! the registry that enforces the bundled/user trust boundary.
//!
//! The probe layer and the definition source are ports (`ProbeSet`,
//! `DefinitionSource`); `skillgate-infra` supplies the real implementations.

pub mod evaluator;
pub mod manifest;
pub mod matcher;
pub mod probe;
pub mod registry;
pub mod report;
pub mod source;

#[cfg(test)]
mod testing;
