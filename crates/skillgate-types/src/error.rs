use std::fmt;

use thiserror::Error;

/// Errors from parsing a skill definition into a manifest.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("skill definition must start with frontmatter delimiter '---'")]
    MissingFrontmatter,

    #[error("skill definition is missing the closing frontmatter delimiter '---'")]
    UnclosedFrontmatter,

    #[error("malformed manifest: {0}")]
    Malformed(String),

    #[error("manifest has no skill_id")]
    MissingSkillId,

    #[error("skill_id '{0}' is reserved")]
    ReservedSkillId(String),

    #[error("skill_id '{0}' must contain only lowercase letters, digits, '-' and '_'")]
    InvalidSkillId(String),

    #[error("requirement #{index} has an empty name")]
    EmptyRequirementName { index: usize },

    #[error("requirement #{index} has unknown kind '{kind}'")]
    UnknownKind { index: usize, kind: String },

    #[error("requirement #{index} has unknown necessity '{necessity}'")]
    UnknownNecessity { index: usize, necessity: String },
}

/// Errors from a single gating evaluation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("gating evaluation for '{skill_id}' was cancelled")]
    Cancelled { skill_id: String },
}

/// Errors from reading or writing skill definitions.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("skill definition not found: {0}")]
    NotFound(String),

    #[error("refusing to modify {0}: not inside the user skills directory")]
    NotWritable(String),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry operations that mutate an entry and are therefore subject to
/// the trust boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatingOperation {
    Remove,
    Overwrite,
    ReloadFromUserEdit,
}

impl fmt::Display for MutatingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remove => write!(f, "remove"),
            Self::Overwrite => write!(f, "overwrite"),
            Self::ReloadFromUserEdit => write!(f, "reload-from-user-edit"),
        }
    }
}

/// Errors surfaced by the skill registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("skill '{0}' not found")]
    NotFound(String),

    #[error("trust violation: cannot {operation} bundled skill '{skill_id}'")]
    TrustViolation {
        skill_id: String,
        operation: MutatingOperation,
    },

    #[error("failed to parse skill definition: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("skill source error: {0}")]
    Source(#[from] SourceError),

    #[error("definition for '{expected}' now declares skill_id '{found}'")]
    IdentityChanged { expected: String, found: String },

    #[error("registry is shut down")]
    Shutdown,
}

impl RegistryError {
    pub fn is_trust_violation(&self) -> bool {
        matches!(self, Self::TrustViolation { .. })
    }
}
