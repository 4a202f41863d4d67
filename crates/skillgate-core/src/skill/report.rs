//! Plain-text gating diagnostics.

use skillgate_types::gating::GatingResult;

/// Render a gating result as a multi-line report.
///
/// Lists every requirement in declaration order with a present/missing
/// marker, its necessity and the probe detail when there is one.
pub fn render_report(result: &GatingResult) -> String {
    let mut lines = vec![
        format!("skill: {}", result.skill_id),
        format!("decision: {} ({}ms)", result.decision, result.duration_ms),
    ];

    let outcomes = result.outcomes();
    if outcomes.is_empty() {
        lines.push("  (no requirements)".to_string());
    }

    lines.extend(outcomes.iter().map(|outcome| {
        let marker = if outcome.present { "ok" } else { "missing" };
        let line = format!(
            "  [{marker}] {} {} ({})",
            outcome.requirement.kind, outcome.requirement.name, outcome.requirement.necessity
        );
        match &outcome.detail {
            Some(detail) => format!("{line}: {detail}"),
            None => line,
        }
    }));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
