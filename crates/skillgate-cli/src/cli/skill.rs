//! Skill command handlers: list, check, reload, install, remove, match.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use skillgate_core::skill::matcher::KeywordMatcher;
use skillgate_core::skill::registry::{DiscoveryFailure, ReloadTarget};
use skillgate_core::skill::report::render_report;
use skillgate_types::gating::{Decision, GatingResult, ProbeOutcome, SkillListing};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub async fn list(state: &AppState, json: bool) -> Result<()> {
    state.load_skills().await?;
    let listings = state.registry.list();
    let failures = state.registry.parse_failures();

    if json {
        let out = serde_json::json!({
            "skills": listings,
            "failures": failures.iter().map(failure_json).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if listings.is_empty() {
        let catalog = state.registry.catalog();
        println!(
            "  No skills found. Add {} files under {} or {}.",
            style("<skill-id>/SKILL.md").yellow(),
            style(catalog.bundled_dir().display()).dim(),
            style(catalog.user_dir().display()).dim()
        );
    } else {
        println!("{}", listing_table(&listings));
    }
    print_failures(&failures);
    println!();

    Ok(())
}

fn listing_table(listings: &[SkillListing]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Skill").fg(Color::Cyan),
            Cell::new("Source"),
            Cell::new("State"),
            Cell::new("Decision"),
            Cell::new("Missing"),
        ]);

    for listing in listings {
        let missing: Vec<String> = listing
            .failures
            .iter()
            .chain(listing.warnings.iter())
            .map(|o| o.requirement.name.clone())
            .collect();
        let missing = if missing.is_empty() {
            "-".to_string()
        } else {
            missing.join(", ")
        };

        table.add_row(vec![
            Cell::new(&listing.skill_id),
            Cell::new(listing.source.to_string()),
            Cell::new(listing.state.to_string()),
            Cell::new(listing.decision.to_string()).fg(decision_color(listing.decision)),
            Cell::new(missing),
        ]);
    }

    table
}

fn decision_color(decision: Decision) -> Color {
    match decision {
        Decision::Pass => Color::Green,
        Decision::PassWithWarnings => Color::Yellow,
        Decision::Fail => Color::Red,
    }
}

fn print_failures(failures: &[DiscoveryFailure]) {
    for failure in failures {
        print_failure(failure);
    }
}

fn print_failure(failure: &DiscoveryFailure) {
    println!(
        "  {} Not loaded: {} ({})",
        style("!").red().bold(),
        style(failure.location.display()).dim(),
        failure.reason
    );
}

fn failure_json(failure: &DiscoveryFailure) -> serde_json::Value {
    serde_json::json!({
        "source": failure.source,
        "location": failure.location,
        "reason": failure.reason.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Check
// ---------------------------------------------------------------------------

pub async fn check(state: &AppState, skill_id: Option<&str>, json: bool) -> Result<()> {
    state.load_skills().await?;

    let results: Vec<GatingResult> = match skill_id {
        Some(id) => vec![state.registry.gate(id)?],
        None => state
            .registry
            .list()
            .iter()
            .map(|l| state.registry.gate(&l.skill_id))
            .collect::<Result<_, _>>()?,
    };

    if json {
        match skill_id {
            Some(_) => println!("{}", serde_json::to_string_pretty(&results[0])?),
            None => println!("{}", serde_json::to_string_pretty(&results)?),
        }
        return Ok(());
    }

    if results.is_empty() {
        println!();
        println!("  No skills to check.");
        println!();
        return Ok(());
    }

    for result in &results {
        print_report(result);
    }

    Ok(())
}

fn print_report(result: &GatingResult) {
    let marker = match result.decision {
        Decision::Pass => style("✓").green(),
        Decision::PassWithWarnings => style("!").yellow(),
        Decision::Fail => style("✗").red(),
    };

    println!();
    println!(
        "  {} {}",
        marker.bold(),
        style(&result.skill_id).cyan().bold()
    );
    for line in render_report(result).lines().skip(1) {
        println!("  {line}");
    }
}

// ---------------------------------------------------------------------------
// Reload
// ---------------------------------------------------------------------------

pub async fn reload(state: &AppState, skill_id: Option<&str>, all: bool, json: bool) -> Result<()> {
    if all {
        let report = state.registry.reload(ReloadTarget::All).await?;
        let failures: Vec<&DiscoveryFailure> = report
            .bundled
            .failures
            .iter()
            .chain(report.user.failures.iter())
            .collect();

        if json {
            let out = serde_json::json!({
                "bundled": report.bundled.loaded,
                "user": report.user.loaded,
                "dropped": report.dropped,
                "failures": failures.iter().copied().map(failure_json).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            println!();
            println!(
                "  {} Reloaded {} bundled and {} user skills",
                style("*").green().bold(),
                report.bundled.loaded.len(),
                report.user.loaded.len()
            );
            for dropped in &report.dropped {
                println!("  {} Dropped '{}'", style("-").yellow(), style(dropped).cyan());
            }
            for failure in failures {
                print_failure(failure);
            }
            println!();
        }
        return Ok(());
    }

    let Some(skill_id) = skill_id else {
        bail!("Specify a skill id or --all.");
    };

    state.load_skills().await?;
    state
        .registry
        .reload(ReloadTarget::Skill(skill_id.to_string()))
        .await?;
    let result = state.registry.gate(skill_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_report(&result);
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Install
// ---------------------------------------------------------------------------

pub async fn install(state: &AppState, path: &Path, json: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    state.load_skills().await?;
    let entry = state.registry.overwrite(&content).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "installed": entry.manifest.skill_id,
                "location": entry.location,
                "result": entry.latest_result,
            })
        );
        return Ok(());
    }

    println!();
    println!(
        "  {} Installed skill '{}' to {}",
        style("*").green().bold(),
        style(&entry.manifest.skill_id).cyan(),
        style(entry.location.display()).dim()
    );
    print_report(&entry.latest_result);
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Remove
// ---------------------------------------------------------------------------

pub async fn remove(state: &AppState, skill_id: &str, force: bool, json: bool) -> Result<()> {
    state.load_skills().await?;

    // Bundled skills go straight to the registry, which refuses them.
    let mutable = state.registry.entry(skill_id).is_some_and(|e| e.mutable());
    if mutable && !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete user skill '{}' and its directory?",
                style(skill_id).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Removal cancelled.");
            return Ok(());
        }
    }

    state.registry.remove(skill_id).await?;

    if json {
        println!("{}", serde_json::json!({"removed": skill_id}));
    } else {
        println!();
        println!(
            "  {} Removed skill '{}'",
            style("*").green().bold(),
            style(skill_id).cyan()
        );
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

pub async fn match_query(state: &AppState, query: &str, json: bool) -> Result<()> {
    state.load_skills().await?;

    let matches = state.registry.activate_candidates_for(query, &KeywordMatcher);
    let notices: Vec<_> = state
        .registry
        .drain_warning_notices()
        .into_iter()
        .filter(|n| matches.contains(&n.skill_id))
        .collect();

    if json {
        let out = serde_json::json!({
            "query": query,
            "matches": matches,
            "warnings": notices,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if matches.is_empty() {
        println!("  No active skill matches '{}'.", style(query).yellow());
    }
    for (i, skill_id) in matches.iter().enumerate() {
        println!("  {}. {}", style(i + 1).cyan(), style(skill_id).bold());
    }
    for notice in &notices {
        println!(
            "  {} '{}' runs with reduced capability, missing: {}",
            style("!").yellow(),
            style(&notice.skill_id).cyan(),
            missing_names(&notice.warnings)
        );
    }
    println!();

    Ok(())
}

fn missing_names(outcomes: &[ProbeOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| o.requirement.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
