//! Application state wiring the registry to the concrete infrastructure.

use std::path::PathBuf;
use std::sync::Arc;

use skillgate_core::skill::evaluator::GatingEvaluator;
use skillgate_core::skill::registry::SkillRegistry;
use skillgate_infra::config::{
    bundled_skills_dir, load_gating_config, resolve_probe_timeout, resolve_process_limit,
    user_skills_dir,
};
use skillgate_infra::skill::catalog::FilesystemCatalog;
use skillgate_infra::skill::system_probes::SystemProbes;
use skillgate_types::skill::SkillSource;

/// The registry pinned to real probes and the on-disk catalog.
pub type ConcreteRegistry = SkillRegistry<SystemProbes, FilesystemCatalog>;

pub struct AppState {
    pub registry: Arc<ConcreteRegistry>,
}

impl AppState {
    /// Load configuration and wire probes, catalog and registry.
    pub async fn init(data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_gating_config(&data_dir).await;
        let probes = Arc::new(SystemProbes::from_config(&config, &data_dir));
        let evaluator = GatingEvaluator::new(
            probes,
            resolve_process_limit(&config),
            resolve_probe_timeout(&config),
        );
        let catalog = Arc::new(FilesystemCatalog::new(
            bundled_skills_dir(&config, &data_dir),
            user_skills_dir(&config, &data_dir),
        ));

        tracing::debug!(
            data_dir = %data_dir.display(),
            max_concurrent_processes = evaluator.max_concurrent_processes(),
            probe_timeout_ms = evaluator.probe_timeout().as_millis() as u64,
            "Skill registry configured"
        );

        Ok(Self {
            registry: Arc::new(SkillRegistry::new(evaluator, catalog)),
        })
    }

    /// Discover bundled skills, then user skills.
    ///
    /// Bundled skills go first so user definitions that reuse a bundled id
    /// are rejected instead of shadowing it.
    pub async fn load_skills(&self) -> anyhow::Result<()> {
        for source in [SkillSource::Bundled, SkillSource::User] {
            self.registry.discover(source).await?;
        }
        Ok(())
    }
}
