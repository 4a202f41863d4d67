//! Gating configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.skillgate/` in production)
//! and deserializes it into [`GatingConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use skillgate_types::config::GatingConfig;

use crate::filesystem::resolve_against;

/// Floor for the per-probe timeout.
const MIN_PROBE_TIMEOUT_MS: u64 = 100;

/// Floor for concurrent process-spawning probes.
const MIN_CONCURRENT_PROCESSES: usize = 1;

/// Load gating configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`GatingConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_gating_config(data_dir: &Path) -> GatingConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GatingConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GatingConfig::default();
        }
    };

    match toml::from_str::<GatingConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GatingConfig::default()
        }
    }
}

/// Per-probe timeout, never below 100ms.
pub fn resolve_probe_timeout(config: &GatingConfig) -> Duration {
    Duration::from_millis(config.probe_timeout_ms.max(MIN_PROBE_TIMEOUT_MS))
}

/// Process-probe concurrency limit, never below 1.
pub fn resolve_process_limit(config: &GatingConfig) -> usize {
    config.max_concurrent_processes.max(MIN_CONCURRENT_PROCESSES)
}

/// Directory holding bundled skills: `bundled_dir` or `{data_dir}/bundled`.
pub fn bundled_skills_dir(config: &GatingConfig, data_dir: &Path) -> PathBuf {
    match &config.bundled_dir {
        Some(dir) => resolve_against(data_dir, dir),
        None => data_dir.join("bundled"),
    }
}

/// Directory holding user skills: `user_dir` or `{data_dir}/skills`.
pub fn user_skills_dir(config: &GatingConfig, data_dir: &Path) -> PathBuf {
    match &config.user_dir {
        Some(dir) => resolve_against(data_dir, dir),
        None => data_dir.join("skills"),
    }
}

/// Base for relative config-file requirements: `config_base_dir` or the data dir.
pub fn config_base_dir(config: &GatingConfig, data_dir: &Path) -> PathBuf {
    match &config.config_base_dir {
        Some(dir) => resolve_against(data_dir, dir),
        None => data_dir.to_path_buf(),
    }
}
