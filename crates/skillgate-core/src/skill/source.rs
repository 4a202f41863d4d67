//! Definition source port.
//!
//! A [`DefinitionSource`] enumerates raw SKILL.md documents for the bundled
//! and user sources and persists user edits. The registry never touches the
//! filesystem directly; `skillgate-infra` provides the directory-backed
//! implementation.

use std::future::Future;
use std::path::{Path, PathBuf};

use skillgate_types::error::SourceError;
use skillgate_types::skill::SkillSource;

/// An unparsed skill definition and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillDocument {
    pub source: SkillSource,
    pub location: PathBuf,
    pub content: String,
}

/// Enumerates and persists skill definitions. Uses RPITIT for async methods.
pub trait DefinitionSource: Send + Sync {
    /// List every candidate definition for one source.
    fn scan(
        &self,
        source: SkillSource,
    ) -> impl Future<Output = Result<Vec<SkillDocument>, SourceError>> + Send;

    /// Re-read a single definition from its recorded location.
    fn fetch(
        &self,
        location: &Path,
    ) -> impl Future<Output = Result<SkillDocument, SourceError>> + Send;

    /// Persist a user definition for `skill_id`, returning its location.
    fn store(
        &self,
        skill_id: &str,
        content: &str,
    ) -> impl Future<Output = Result<PathBuf, SourceError>> + Send;

    /// Delete the user definition at `location`.
    fn delete(&self, location: &Path) -> impl Future<Output = Result<(), SourceError>> + Send;
}
