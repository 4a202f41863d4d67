//! Gating outcome types.
//!
//! `ProbeOutcome` is the result of checking one requirement; `GatingResult`
//! is the reduced decision for a whole manifest; `RegistryEntry` is what the
//! registry keeps per skill.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::skill::{Manifest, Requirement, SkillSource};

/// Result of probing one requirement.
///
/// Created once per evaluation and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Position of the requirement in the manifest's declaration order.
    pub index: usize,
    pub requirement: Requirement,
    pub present: bool,
    /// Resolved path, error message or timeout note.
    pub detail: Option<String>,
}

/// Aggregate gating decision for one manifest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pass,
    PassWithWarnings,
    Fail,
}

impl Decision {
    /// Whether a skill with this decision may be activated.
    pub fn allows_activation(self) -> bool {
        !matches!(self, Self::Fail)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::PassWithWarnings => write!(f, "pass-with-warnings"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Gating result for one skill.
///
/// Invariant: `decision == Fail` iff `failures` is non-empty;
/// `decision == PassWithWarnings` iff `failures` is empty and `warnings` is
/// non-empty; `Pass` otherwise. All three outcome lists are in manifest
/// declaration order. Built by `skillgate-core::skill::evaluator::reduce`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatingResult {
    pub skill_id: String,
    pub decision: Decision,
    /// Required requirements that were missing.
    pub failures: Vec<ProbeOutcome>,
    /// Optional requirements that were missing.
    pub warnings: Vec<ProbeOutcome>,
    /// Requirements that were present.
    pub satisfied: Vec<ProbeOutcome>,
    pub evaluated_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl GatingResult {
    /// All outcomes merged back into declaration order.
    pub fn outcomes(&self) -> Vec<&ProbeOutcome> {
        let mut all: Vec<&ProbeOutcome> = self
            .failures
            .iter()
            .chain(self.warnings.iter())
            .chain(self.satisfied.iter())
            .collect();
        all.sort_by_key(|o| o.index);
        all
    }
}

/// Lifecycle state of a gated skill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkillState {
    /// Passed gating (possibly with warnings); exposed for activation.
    Active,
    /// Failed gating; listed for diagnostics but never activated.
    Inactive,
}

impl fmt::Display for SkillState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// The registry's bookkeeping for one gated skill.
///
/// Replaced wholesale on reload. Mutability is derived from the manifest's
/// source; the registry enforces it on every mutating call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub manifest: Manifest,
    pub latest_result: GatingResult,
    /// Where the definition was read from.
    pub location: PathBuf,
    pub loaded_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn mutable(&self) -> bool {
        self.manifest.is_mutable()
    }

    pub fn state(&self) -> SkillState {
        if self.latest_result.decision.allows_activation() {
            SkillState::Active
        } else {
            SkillState::Inactive
        }
    }
}

/// One row of the registry listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillListing {
    pub skill_id: String,
    pub source: SkillSource,
    pub state: SkillState,
    pub decision: Decision,
    pub warnings: Vec<ProbeOutcome>,
    pub failures: Vec<ProbeOutcome>,
}

impl From<&RegistryEntry> for SkillListing {
    fn from(entry: &RegistryEntry) -> Self {
        Self {
            skill_id: entry.manifest.skill_id.clone(),
            source: entry.manifest.source,
            state: entry.state(),
            decision: entry.latest_result.decision,
            warnings: entry.latest_result.warnings.clone(),
            failures: entry.latest_result.failures.clone(),
        }
    }
}

/// Degraded-capability notice for a skill that passed with warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningNotice {
    pub skill_id: String,
    pub warnings: Vec<ProbeOutcome>,
}
