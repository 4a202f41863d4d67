//! Probe port: one presence check per requirement kind.
//!
//! The infrastructure layer implements [`ProbeSet`] against the real host
//! (search path, interpreter package listing, process environment,
//! filesystem). Probes must never fail: missing tooling, spawn errors and
//! I/O errors are reported as `present = false` with a diagnostic detail.

use std::future::Future;

use skillgate_types::skill::{Requirement, RequirementKind};

/// Answer from a single probe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub present: bool,
    pub detail: Option<String>,
}

impl ProbeReport {
    pub fn present(detail: impl Into<String>) -> Self {
        Self {
            present: true,
            detail: Some(detail.into()),
        }
    }

    pub fn missing(detail: impl Into<String>) -> Self {
        Self {
            present: false,
            detail: Some(detail.into()),
        }
    }
}

/// Presence checks for each requirement kind.
///
/// Implementations perform real but non-destructive I/O, never retry and
/// never time out internally; the evaluator owns timeout policy. Uses RPITIT
/// for async methods.
pub trait ProbeSet: Send + Sync {
    /// Resolve `name` on the executable search path.
    fn binary(&self, name: &str) -> impl Future<Output = ProbeReport> + Send;

    /// Look `name` up in the interpreter's installed package listing.
    fn interpreter_package(&self, name: &str) -> impl Future<Output = ProbeReport> + Send;

    /// Check that `name` is set in the process environment.
    fn environment_variable(&self, name: &str) -> impl Future<Output = ProbeReport> + Send;

    /// Check that the config path exists and is readable.
    fn config_file(&self, name: &str) -> impl Future<Output = ProbeReport> + Send;
}

/// Dispatch a requirement to the probe for its kind.
pub async fn probe_requirement<P: ProbeSet>(
    probes: &P,
    requirement: &Requirement,
) -> ProbeReport {
    let name = requirement.name.as_str();
    match requirement.kind {
        RequirementKind::Binary => probes.binary(name).await,
        RequirementKind::InterpreterPackage => probes.interpreter_package(name).await,
        RequirementKind::EnvironmentVariable => probes.environment_variable(name).await,
        RequirementKind::ConfigFile => probes.config_file(name).await,
    }
}
