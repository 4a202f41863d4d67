//! SkillGate CLI entry point.
//!
//! Binary name: `skillgate`
//!
//! Parses CLI arguments, wires the skill registry to the local machine and
//! dispatches to the command handlers.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use skillgate_infra::filesystem::resolve_data_dir;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity; RUST_LOG still wins when set
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,skillgate_core=debug,skillgate_infra=debug",
        _ => "trace",
    };
    skillgate_observe::tracing_setup::init_tracing(filter, cli.otel).map_err(anyhow::Error::from_boxed)?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "skillgate", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = cli.data_dir.clone().unwrap_or_else(resolve_data_dir);
    let state = AppState::init(data_dir).await?;

    let result = run(&cli, &state).await;

    state.registry.shutdown();
    skillgate_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: &Cli, state: &AppState) -> anyhow::Result<()> {
    let json = cli.json;

    match &cli.command {
        Commands::List => cli::skill::list(state, json).await,
        Commands::Check { skill } => cli::skill::check(state, skill.as_deref(), json).await,
        Commands::Reload { skill, all } => {
            cli::skill::reload(state, skill.as_deref(), *all, json).await
        }
        Commands::Install { path } => cli::skill::install(state, path, json).await,
        Commands::Remove { skill, force } => {
            cli::skill::remove(state, skill, *force, json).await
        }
        Commands::Match { query } => cli::skill::match_query(state, query, json).await,
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}
