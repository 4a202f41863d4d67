//! Directory-backed skill catalog.
//!
//! Bundled and user skills live in separate directories with the same
//! layout. Only the user directory is ever written to.
//!
//! ```text
//! {bundled_dir}/{skill-id}/SKILL.md
//! {user_dir}/{skill-id}/SKILL.md
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use skillgate_core::skill::source::{DefinitionSource, SkillDocument};
use skillgate_types::error::SourceError;
use skillgate_types::skill::SkillSource;

const SKILL_FILE: &str = "SKILL.md";

#[derive(Debug, Clone)]
pub struct FilesystemCatalog {
    bundled_dir: PathBuf,
    user_dir: PathBuf,
}

impl FilesystemCatalog {
    pub fn new(bundled_dir: PathBuf, user_dir: PathBuf) -> Self {
        Self {
            bundled_dir,
            user_dir,
        }
    }

    pub fn bundled_dir(&self) -> &Path {
        &self.bundled_dir
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    fn dir_for(&self, source: SkillSource) -> &Path {
        match source {
            SkillSource::Bundled => &self.bundled_dir,
            SkillSource::User => &self.user_dir,
        }
    }

    fn source_of(&self, location: &Path) -> SkillSource {
        if location.starts_with(&self.user_dir) {
            SkillSource::User
        } else {
            SkillSource::Bundled
        }
    }

    fn ensure_writable(&self, location: &Path) -> Result<(), SourceError> {
        if location.starts_with(&self.user_dir) && location != self.user_dir {
            Ok(())
        } else {
            Err(SourceError::NotWritable(location.display().to_string()))
        }
    }
}

impl DefinitionSource for FilesystemCatalog {
    async fn scan(&self, source: SkillSource) -> Result<Vec<SkillDocument>, SourceError> {
        let dir = self.dir_for(source);
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(source = %source, dir = %dir.display(), "Skill directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }

            let location = path.join(SKILL_FILE);
            match tokio::fs::read_to_string(&location).await {
                Ok(content) => documents.push(SkillDocument {
                    source,
                    location,
                    content,
                }),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(location = %location.display(), error = %e, "Skipping unreadable skill");
                }
            }
        }

        documents.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(documents)
    }

    async fn fetch(&self, location: &Path) -> Result<SkillDocument, SourceError> {
        match tokio::fs::read_to_string(location).await {
            Ok(content) => Ok(SkillDocument {
                source: self.source_of(location),
                location: location.to_path_buf(),
                content,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SourceError::NotFound(location.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, skill_id: &str, content: &str) -> Result<PathBuf, SourceError> {
        let skill_dir = self.user_dir.join(skill_id);
        self.ensure_writable(&skill_dir)?;

        tokio::fs::create_dir_all(&skill_dir).await?;
        let location = skill_dir.join(SKILL_FILE);
        tokio::fs::write(&location, content).await?;

        tracing::debug!(skill = %skill_id, location = %location.display(), "Stored user skill");
        Ok(location)
    }

    async fn delete(&self, location: &Path) -> Result<(), SourceError> {
        self.ensure_writable(location)?;

        // The whole skill directory goes when the definition is its SKILL.md.
        let target = match location.parent() {
            Some(parent)
                if location.file_name().is_some_and(|n| n == SKILL_FILE)
                    && parent != self.user_dir =>
            {
                parent
            }
            _ => location,
        };

        let removed = if tokio::fs::metadata(target).await.is_ok_and(|m| m.is_dir()) {
            tokio::fs::remove_dir_all(target).await
        } else {
            tokio::fs::remove_file(target).await
        };

        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SourceError::NotFound(location.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
