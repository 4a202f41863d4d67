//! In-memory fakes for the probe and definition-source ports.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use skillgate_types::error::SourceError;
use skillgate_types::skill::{RequirementKind, SkillSource};

use super::probe::{ProbeReport, ProbeSet};
use super::source::{DefinitionSource, SkillDocument};

#[derive(Debug, Clone)]
pub enum FakeBehavior {
    Present,
    Missing,
    /// Sleep, then report present or missing.
    Delay(Duration, bool),
    /// Never complete.
    Hang,
    Panic,
}

/// Scripted probes keyed by `(kind, name)`. Unscripted requirements are missing.
#[derive(Debug, Default)]
pub struct FakeProbes {
    behaviors: Mutex<HashMap<(RequirementKind, String), FakeBehavior>>,
    pub calls: AtomicUsize,
    in_flight_processes: AtomicUsize,
    pub max_in_flight_processes: AtomicUsize,
}

impl FakeProbes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, kind: RequirementKind, name: &str, behavior: FakeBehavior) -> Self {
        self.set(kind, name, behavior);
        self
    }

    pub fn set(&self, kind: RequirementKind, name: &str, behavior: FakeBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert((kind, name.to_string()), behavior);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run(&self, kind: RequirementKind, name: &str) -> ProbeReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&(kind, name.to_string()))
            .cloned()
            .unwrap_or(FakeBehavior::Missing);

        if kind.spawns_process() {
            let now = self.in_flight_processes.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight_processes.fetch_max(now, Ordering::SeqCst);
        }

        let report = match behavior {
            FakeBehavior::Present => ProbeReport::present(format!("/fake/{name}")),
            FakeBehavior::Missing => ProbeReport::missing(format!("{name} not found")),
            FakeBehavior::Delay(delay, present) => {
                tokio::time::sleep(delay).await;
                if present {
                    ProbeReport::present(format!("/fake/{name}"))
                } else {
                    ProbeReport::missing(format!("{name} not found"))
                }
            }
            FakeBehavior::Hang => std::future::pending().await,
            FakeBehavior::Panic => panic!("probe for {name} exploded"),
        };

        if kind.spawns_process() {
            self.in_flight_processes.fetch_sub(1, Ordering::SeqCst);
        }
        report
    }
}

impl ProbeSet for FakeProbes {
    async fn binary(&self, name: &str) -> ProbeReport {
        self.run(RequirementKind::Binary, name).await
    }

    async fn interpreter_package(&self, name: &str) -> ProbeReport {
        self.run(RequirementKind::InterpreterPackage, name).await
    }

    async fn environment_variable(&self, name: &str) -> ProbeReport {
        self.run(RequirementKind::EnvironmentVariable, name).await
    }

    async fn config_file(&self, name: &str) -> ProbeReport {
        self.run(RequirementKind::ConfigFile, name).await
    }
}

/// In-memory catalog of SKILL.md documents keyed by location.
#[derive(Debug, Default)]
pub struct FakeCatalog {
    documents: Mutex<Vec<SkillDocument>>,
    pub deleted: Mutex<Vec<PathBuf>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, source: SkillSource, location: &str, content: &str) {
        let mut docs = self.documents.lock().unwrap();
        docs.retain(|d| d.location != Path::new(location));
        docs.push(SkillDocument {
            source,
            location: PathBuf::from(location),
            content: content.to_string(),
        });
    }

    pub fn remove_location(&self, location: &str) {
        self.documents
            .lock()
            .unwrap()
            .retain(|d| d.location != Path::new(location));
    }
}

impl DefinitionSource for FakeCatalog {
    async fn scan(&self, source: SkillSource) -> Result<Vec<SkillDocument>, SourceError> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.source == source)
            .cloned()
            .collect())
    }

    async fn fetch(&self, location: &Path) -> Result<SkillDocument, SourceError> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.location == location)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(location.display().to_string()))
    }

    async fn store(&self, skill_id: &str, content: &str) -> Result<PathBuf, SourceError> {
        let location = format!("user/{skill_id}/SKILL.md");
        self.add(SkillSource::User, &location, content);
        Ok(PathBuf::from(location))
    }

    async fn delete(&self, location: &Path) -> Result<(), SourceError> {
        let mut docs = self.documents.lock().unwrap();
        let before = docs.len();
        docs.retain(|d| d.location != location);
        if docs.len() == before {
            return Err(SourceError::NotFound(location.display().to_string()));
        }
        self.deleted.lock().unwrap().push(location.to_path_buf());
        Ok(())
    }
}

/// A SKILL.md document with the given requirement lines.
pub fn skill_doc(skill_id: &str, requirements: &[(&str, &str, &str)]) -> String {
    let mut doc = format!("---\nskill_id: {skill_id}\nkeywords: [{skill_id}]\nrequirements:\n");
    if requirements.is_empty() {
        doc = format!("---\nskill_id: {skill_id}\nkeywords: [{skill_id}]\n");
    }
    for (kind, name, necessity) in requirements {
        doc.push_str(&format!(
            "  - kind: {kind}\n    name: {name}\n    necessity: {necessity}\n"
        ));
    }
    doc.push_str("---\nBody.\n");
    doc
}
