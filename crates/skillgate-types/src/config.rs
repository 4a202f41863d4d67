//! Gating configuration types.
//!
//! `GatingConfig` represents the `config.toml` in the data directory. Every
//! field has a default so an empty or missing file is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the gating engine and registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatingConfig {
    /// Upper bound on simultaneously spawned probe processes.
    #[serde(default = "default_max_concurrent_processes")]
    pub max_concurrent_processes: usize,

    /// Per-probe timeout in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Base directory for relative config-file requirements.
    /// Defaults to the data directory when unset.
    #[serde(default)]
    pub config_base_dir: Option<PathBuf>,

    /// Directory of bundled skills. Defaults to `{data_dir}/bundled`.
    #[serde(default)]
    pub bundled_dir: Option<PathBuf>,

    /// Directory of user skills. Defaults to `{data_dir}/skills`.
    #[serde(default)]
    pub user_dir: Option<PathBuf>,

    #[serde(default)]
    pub interpreter: InterpreterConfig,

    #[serde(default)]
    pub package_matching: PackageNameMatching,
}

fn default_max_concurrent_processes() -> usize {
    8
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_processes: default_max_concurrent_processes(),
            probe_timeout_ms: default_probe_timeout_ms(),
            config_base_dir: None,
            bundled_dir: None,
            user_dir: None,
            interpreter: InterpreterConfig::default(),
            package_matching: PackageNameMatching::default(),
        }
    }
}

/// How interpreter-package probes list installed packages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// Interpreters tried in order; the first one on the search path is used.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,
    /// Arguments that make the interpreter print its installed packages.
    #[serde(default = "default_list_args")]
    pub list_args: Vec<String>,
}

fn default_candidates() -> Vec<String> {
    vec!["python3".to_string(), "python".to_string()]
}

fn default_list_args() -> Vec<String> {
    ["-m", "pip", "list", "--format=freeze"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            list_args: default_list_args(),
        }
    }
}

/// Package-name comparison rules for interpreter-package probes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageNameMatching {
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
    /// Treat `-` and `_` as the same character.
    #[serde(default = "default_true")]
    pub separator_insensitive: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PackageNameMatching {
    fn default() -> Self {
        Self {
            case_insensitive: true,
            separator_insensitive: true,
        }
    }
}

impl PackageNameMatching {
    /// Reduce a package name to its comparison form.
    pub fn normalize(&self, name: &str) -> String {
        let name = name.trim();
        let name = if self.case_insensitive {
            name.to_lowercase()
        } else {
            name.to_string()
        };
        if self.separator_insensitive {
            name.replace('_', "-")
        } else {
            name
        }
    }

    pub fn matches(&self, declared: &str, installed: &str) -> bool {
        self.normalize(declared) == self.normalize(installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GatingConfig::default();
        assert_eq!(config.max_concurrent_processes, 8);
        assert_eq!(config.probe_timeout_ms, 5_000);
        assert_eq!(config.interpreter.candidates, vec!["python3", "python"]);
        assert!(config.package_matching.case_insensitive);
        assert!(config.package_matching.separator_insensitive);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: GatingConfig = toml::from_str("").unwrap();
        assert_eq!(config, GatingConfig::default());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config: GatingConfig = toml::from_str(
            r#"
max_concurrent_processes = 2
probe_timeout_ms = 750
user_dir = "/srv/skills"

[package_matching]
separator_insensitive = false
"#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_processes, 2);
        assert_eq!(config.probe_timeout_ms, 750);
        assert_eq!(config.user_dir, Some(PathBuf::from("/srv/skills")));
        assert!(config.package_matching.case_insensitive);
        assert!(!config.package_matching.separator_insensitive);
        assert_eq!(config.interpreter, InterpreterConfig::default());
    }

    #[test]
    fn package_names_match_across_case_and_separator() {
        let rules = PackageNameMatching::default();
        assert!(rules.matches("my-package", "my_package"));
        assert!(rules.matches("PyYAML", "pyyaml"));
        assert!(!rules.matches("requests", "requests-oauthlib"));
    }

    #[test]
    fn strict_matching_keeps_case_and_separators() {
        let rules = PackageNameMatching {
            case_insensitive: false,
            separator_insensitive: false,
        };
        assert!(!rules.matches("my-package", "my_package"));
        assert!(!rules.matches("PyYAML", "pyyaml"));
        assert!(rules.matches("numpy", "numpy"));
    }
}
