//! Skill manifest domain types.
//!
//! A manifest is the declared requirement set of one skill plus its identity
//! and trust metadata. These types carry no behavior beyond small helpers;
//! parsing lives in `skillgate-core::skill::manifest`.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requirement kinds
// ---------------------------------------------------------------------------

/// The closed set of dependency kinds a skill can declare.
///
/// Each kind maps to exactly one probe. Adding a kind means adding a probe
/// method to `ProbeSet`, which the compiler enforces through exhaustive
/// matches in the evaluator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementKind {
    Binary,
    InterpreterPackage,
    EnvironmentVariable,
    ConfigFile,
}

impl RequirementKind {
    /// Every kind, in reporting order.
    pub const ALL: [RequirementKind; 4] = [
        Self::Binary,
        Self::InterpreterPackage,
        Self::EnvironmentVariable,
        Self::ConfigFile,
    ];

    /// Canonical manifest spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::InterpreterPackage => "interpreter-package",
            Self::EnvironmentVariable => "environment-variable",
            Self::ConfigFile => "config-file",
        }
    }

    /// Resolve a manifest `kind` value, accepting the short aliases.
    ///
    /// Matching is case-insensitive and treats `_` like `-`.
    pub fn from_alias(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "binary" | "bin" => Some(Self::Binary),
            "interpreter-package" | "package" | "python-package" => {
                Some(Self::InterpreterPackage)
            }
            "environment-variable" | "env" | "env-var" => Some(Self::EnvironmentVariable),
            "config-file" | "config" => Some(Self::ConfigFile),
            _ => None,
        }
    }

    /// Whether probing this kind spawns an external process.
    ///
    /// Process-spawning probes share the evaluator's concurrency bound.
    pub fn spawns_process(self) -> bool {
        match self {
            Self::Binary | Self::InterpreterPackage => true,
            Self::EnvironmentVariable | Self::ConfigFile => false,
        }
    }
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a missing dependency blocks the skill or only degrades it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Necessity {
    #[default]
    Required,
    Optional,
}

impl Necessity {
    /// Parse a manifest `necessity` value (case-insensitive).
    pub fn from_alias(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "required" => Some(Self::Required),
            "optional" => Some(Self::Optional),
            _ => None,
        }
    }

    /// The stricter of two necessities. Required wins.
    pub fn stricter(self, other: Self) -> Self {
        if self == Self::Required || other == Self::Required {
            Self::Required
        } else {
            Self::Optional
        }
    }
}

impl fmt::Display for Necessity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Optional => write!(f, "optional"),
        }
    }
}

/// One declared dependency of a skill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub kind: RequirementKind,
    /// Binary name, package name, variable name or config path.
    pub name: String,
    pub necessity: Necessity,
}

impl Requirement {
    pub fn new(kind: RequirementKind, name: impl Into<String>, necessity: Necessity) -> Self {
        Self {
            kind,
            name: name.into(),
            necessity,
        }
    }

    pub fn required(kind: RequirementKind, name: impl Into<String>) -> Self {
        Self::new(kind, name, Necessity::Required)
    }

    pub fn optional(kind: RequirementKind, name: impl Into<String>) -> Self {
        Self::new(kind, name, Necessity::Optional)
    }

    /// Identity used for duplicate detection within one manifest.
    pub fn key(&self) -> (RequirementKind, &str) {
        (self.kind, self.name.as_str())
    }

    pub fn is_required(&self) -> bool {
        self.necessity == Necessity::Required
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.name, self.necessity)
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Where a skill definition came from, which decides whether the registry
/// API may mutate it.
///
/// - `Bundled`: shipped with the host, immutable through the registry API.
/// - `User`: user-supplied, may be overwritten, edited or removed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkillSource {
    Bundled,
    User,
}

impl SkillSource {
    pub fn is_mutable(self) -> bool {
        self == Self::User
    }
}

impl fmt::Display for SkillSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled => write!(f, "bundled"),
            Self::User => write!(f, "user"),
        }
    }
}

/// Opaque skill content carried alongside the manifest.
///
/// The gating core never interprets this; it is handed to the relevance
/// matcher and the host as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillPayload {
    #[serde(default)]
    pub description: Option<String>,
    /// Activation keywords, consumed by the relevance matcher.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Markdown body below the SKILL.md frontmatter.
    #[serde(default)]
    pub body: String,
}

/// The full requirement set for one skill, plus identity.
///
/// Requirements keep declaration order; evaluation ignores it but reports
/// follow it. `(kind, name)` pairs are unique once the manifest has been
/// through `skillgate-core::skill::manifest::parse_manifest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub skill_id: String,
    pub source: SkillSource,
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub payload: SkillPayload,
}

impl Manifest {
    /// A manifest with no requirements and an empty payload.
    pub fn new(skill_id: impl Into<String>, source: SkillSource) -> Self {
        Self {
            skill_id: skill_id.into(),
            source,
            requirements: Vec::new(),
            payload: SkillPayload::default(),
        }
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn is_mutable(&self) -> bool {
        self.source.is_mutable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_aliases_resolve() {
        assert_eq!(RequirementKind::from_alias("bin"), Some(RequirementKind::Binary));
        assert_eq!(
            RequirementKind::from_alias("env"),
            Some(RequirementKind::EnvironmentVariable)
        );
        assert_eq!(
            RequirementKind::from_alias("Python_Package"),
            Some(RequirementKind::InterpreterPackage)
        );
        assert_eq!(
            RequirementKind::from_alias("config-file"),
            Some(RequirementKind::ConfigFile)
        );
        assert_eq!(RequirementKind::from_alias("socket"), None);
    }

    #[test]
    fn only_binary_and_package_spawn_processes() {
        let spawning: Vec<_> = RequirementKind::ALL
            .iter()
            .filter(|k| k.spawns_process())
            .collect();
        assert_eq!(
            spawning,
            vec![&RequirementKind::Binary, &RequirementKind::InterpreterPackage]
        );
    }

    #[test]
    fn required_is_stricter_than_optional() {
        assert_eq!(
            Necessity::Optional.stricter(Necessity::Required),
            Necessity::Required
        );
        assert_eq!(
            Necessity::Required.stricter(Necessity::Optional),
            Necessity::Required
        );
        assert_eq!(
            Necessity::Optional.stricter(Necessity::Optional),
            Necessity::Optional
        );
    }

    #[test]
    fn only_user_source_is_mutable() {
        assert!(SkillSource::User.is_mutable());
        assert!(!SkillSource::Bundled.is_mutable());
        assert!(!Manifest::new("core-git", SkillSource::Bundled).is_mutable());
    }

    #[test]
    fn kind_serializes_kebab_case() {
        let json = serde_json::to_string(&RequirementKind::InterpreterPackage).unwrap();
        assert_eq!(json, "\"interpreter-package\"");
    }
}
