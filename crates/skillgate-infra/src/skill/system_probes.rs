//! Host dependency probes.
//!
//! Implements [`ProbeSet`] against the real environment: the executable
//! search path, the interpreter's package listing, the process environment
//! and the filesystem. Probes are read-only and never fail: any spawn error,
//! missing tool or I/O error becomes a missing report with a diagnostic
//! detail.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use skillgate_core::skill::probe::{ProbeReport, ProbeSet};
use skillgate_types::config::{GatingConfig, InterpreterConfig, PackageNameMatching};
use tokio::process::Command;

use crate::config::config_base_dir;
use crate::filesystem::resolve_against;

/// Search-path lookup tool for binary probes.
#[cfg(windows)]
const LOOKUP_COMMAND: &str = "where";
#[cfg(not(windows))]
const LOOKUP_COMMAND: &str = "which";

/// Probes backed by the local machine.
#[derive(Debug, Clone)]
pub struct SystemProbes {
    interpreter: InterpreterConfig,
    package_matching: PackageNameMatching,
    config_base_dir: PathBuf,
}

impl SystemProbes {
    pub fn new(
        interpreter: InterpreterConfig,
        package_matching: PackageNameMatching,
        config_base_dir: PathBuf,
    ) -> Self {
        Self {
            interpreter,
            package_matching,
            config_base_dir,
        }
    }

    pub fn from_config(config: &GatingConfig, data_dir: &Path) -> Self {
        Self::new(
            config.interpreter.clone(),
            config.package_matching,
            config_base_dir(config, data_dir),
        )
    }

    /// Run the first available interpreter's package listing.
    ///
    /// Returns the interpreter used and its stdout, or a missing report
    /// explaining why no listing could be produced.
    async fn package_listing(&self) -> Result<(String, String), ProbeReport> {
        for candidate in &self.interpreter.candidates {
            let output = Command::new(candidate)
                .args(&self.interpreter.list_args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await;

            match output {
                Ok(out) if out.status.success() => {
                    return Ok((
                        candidate.clone(),
                        String::from_utf8_lossy(&out.stdout).into_owned(),
                    ));
                }
                Ok(out) => {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    return Err(ProbeReport::missing(format!(
                        "{candidate} package listing exited with {}: {}",
                        out.status,
                        stderr.trim()
                    )));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::trace!(interpreter = %candidate, "Interpreter not available");
                }
                Err(e) => {
                    return Err(ProbeReport::missing(format!(
                        "failed to run {candidate}: {e}"
                    )));
                }
            }
        }

        Err(ProbeReport::missing(format!(
            "no interpreter available (tried {})",
            self.interpreter.candidates.join(", ")
        )))
    }
}

impl ProbeSet for SystemProbes {
    async fn binary(&self, name: &str) -> ProbeReport {
        let output = Command::new(LOOKUP_COMMAND)
            .arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
                    Some(path) => ProbeReport::present(path),
                    None => ProbeReport::present("found on search path"),
                }
            }
            Ok(_) => ProbeReport::missing(format!("{name} not found on search path")),
            Err(e) => ProbeReport::missing(format!("failed to run {LOOKUP_COMMAND}: {e}")),
        }
    }

    async fn interpreter_package(&self, name: &str) -> ProbeReport {
        let (interpreter, listing) = match self.package_listing().await {
            Ok(listing) => listing,
            Err(report) => return report,
        };

        match installed_packages(&listing).find(|installed| self.package_matching.matches(name, installed)) {
            Some(installed) => ProbeReport::present(format!("{installed} ({interpreter})")),
            None => ProbeReport::missing(format!("{name} is not installed for {interpreter}")),
        }
    }

    async fn environment_variable(&self, name: &str) -> ProbeReport {
        // An empty value still counts as set.
        if std::env::var_os(name).is_some() {
            ProbeReport::present(format!("{name} is set"))
        } else {
            ProbeReport::missing(format!("{name} is not set"))
        }
    }

    async fn config_file(&self, name: &str) -> ProbeReport {
        let path = resolve_against(&self.config_base_dir, Path::new(name));

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => return ProbeReport::missing(format!("{}: {e}", path.display())),
        };

        let readable = if metadata.is_dir() {
            tokio::fs::read_dir(&path).await.map(|_| ())
        } else {
            tokio::fs::File::open(&path).await.map(|_| ())
        };

        match readable {
            Ok(()) => ProbeReport::present(path.display().to_string()),
            Err(e) => ProbeReport::missing(format!("{} is not readable: {e}", path.display())),
        }
    }
}

/// Package names from a listing in `pip list --format=freeze` style.
///
/// Accepts `name==version`, `name @ url` and bare `name` lines; blank lines,
/// comments and editable-install markers are skipped.
fn installed_packages(listing: &str) -> impl Iterator<Item = &str> {
    listing.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            return None;
        }
        let name = line
            .split_once("==")
            .map(|(name, _)| name)
            .or_else(|| line.split_once(" @ ").map(|(name, _)| name))
            .unwrap_or(line)
            .trim();
        (!name.is_empty()).then_some(name)
    })
}
