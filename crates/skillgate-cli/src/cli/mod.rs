//! CLI command definitions for the `skillgate` binary.

pub mod skill;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Gate skills on the dependencies they declare.
#[derive(Parser)]
#[command(name = "skillgate", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory (defaults to ~/.skillgate).
    #[arg(long, global = true, env = "SKILLGATE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every discovered skill with its gating decision.
    #[command(alias = "ls")]
    List,

    /// Show the full gating report for one skill, or all of them.
    Check {
        /// Skill id to check. Omit to check every skill.
        skill: Option<String>,
    },

    /// Re-read and re-gate skills.
    Reload {
        /// Skill id to reload.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        skill: Option<String>,

        /// Rediscover all skills, dropping ones whose definitions are gone.
        #[arg(long)]
        all: bool,
    },

    /// Install or replace a user skill from a SKILL.md file.
    Install {
        /// Path to the SKILL.md to install.
        path: PathBuf,
    },

    /// Remove a user skill. Bundled skills cannot be removed.
    #[command(alias = "rm")]
    Remove {
        /// Skill id to remove.
        skill: String,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        force: bool,
    },

    /// Show which active skills match a query.
    Match {
        /// Free-text query.
        query: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
