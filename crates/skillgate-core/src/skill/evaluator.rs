//! Gating evaluator: concurrent probing plus a necessity-based reduction.
//!
//! Every requirement of a manifest is probed in its own task inside a
//! `JoinSet`. Probes that spawn processes first take a permit from a shared
//! `Semaphore`, so many skills declaring many binaries queue behind the
//! configured bound instead of exhausting the host. Each probe runs under its
//! own timeout; a slow or hung dependency check only marks that requirement
//! missing.
//!
//! Outcomes are slotted by declaration index, never by arrival order, so two
//! evaluations of the same manifest against the same host produce identical
//! `failures`/`warnings` lists.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use skillgate_types::error::EvaluationError;
use skillgate_types::gating::{Decision, GatingResult, ProbeOutcome};
use skillgate_types::skill::{Manifest, Necessity};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::probe::{ProbeReport, ProbeSet, probe_requirement};

/// Runs the probe layer for one manifest and reduces the outcomes.
///
/// Cloning is cheap: the probe set and the process permit pool are shared,
/// which is what makes the concurrency bound global across all skills
/// evaluated through clones of one evaluator.
#[derive(Debug)]
pub struct GatingEvaluator<P> {
    probes: Arc<P>,
    process_slots: Arc<Semaphore>,
    max_concurrent_processes: usize,
    probe_timeout: Duration,
}

impl<P> Clone for GatingEvaluator<P> {
    fn clone(&self) -> Self {
        Self {
            probes: Arc::clone(&self.probes),
            process_slots: Arc::clone(&self.process_slots),
            max_concurrent_processes: self.max_concurrent_processes,
            probe_timeout: self.probe_timeout,
        }
    }
}

impl<P: ProbeSet + 'static> GatingEvaluator<P> {
    /// Create an evaluator. `max_concurrent_processes` is clamped to at least 1.
    pub fn new(probes: Arc<P>, max_concurrent_processes: usize, probe_timeout: Duration) -> Self {
        let max_concurrent_processes = max_concurrent_processes.max(1);
        Self {
            probes,
            process_slots: Arc::new(Semaphore::new(max_concurrent_processes)),
            max_concurrent_processes,
            probe_timeout,
        }
    }

    pub fn max_concurrent_processes(&self) -> usize {
        self.max_concurrent_processes
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Probe every requirement of `manifest` once and reduce the results.
    ///
    /// Returns `EvaluationError::Cancelled` if `cancel` fires before all
    /// probes finish; outstanding probe tasks are aborted and any outcomes
    /// gathered so far are discarded.
    pub async fn evaluate(
        &self,
        manifest: &Manifest,
        cancel: &CancellationToken,
    ) -> Result<GatingResult, EvaluationError> {
        let started = Instant::now();
        let skill_id = manifest.skill_id.as_str();

        if cancel.is_cancelled() {
            return Err(EvaluationError::Cancelled {
                skill_id: skill_id.to_owned(),
            });
        }

        let mut join_set = JoinSet::new();

        for (index, requirement) in manifest.requirements.iter().cloned().enumerate() {
            let probes = Arc::clone(&self.probes);
            let slots = Arc::clone(&self.process_slots);
            let timeout = self.probe_timeout;

            join_set.spawn(async move {
                // Permit is held for the duration of the probe (released on drop)
                let _permit = if requirement.kind.spawns_process() {
                    match slots.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            return (index, ProbeReport::missing("probe process pool is closed"));
                        }
                    }
                } else {
                    None
                };

                let report =
                    match tokio::time::timeout(timeout, probe_requirement(probes.as_ref(), &requirement))
                        .await
                    {
                        Ok(report) => report,
                        Err(_elapsed) => ProbeReport::missing(format!(
                            "probe timed out after {}ms",
                            timeout.as_millis()
                        )),
                    };

                (index, report)
            });
        }

        let mut reports: Vec<Option<ProbeReport>> = vec![None; manifest.requirements.len()];

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    tracing::debug!(skill = %skill_id, "Gating evaluation cancelled");
                    return Err(EvaluationError::Cancelled {
                        skill_id: skill_id.to_owned(),
                    });
                }

                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(Ok((index, report))) => reports[index] = Some(report),
                    Some(Err(e)) => {
                        tracing::error!(skill = %skill_id, error = %e, "Probe task failed");
                    }
                },
            }
        }

        let outcomes = manifest
            .requirements
            .iter()
            .zip(reports)
            .enumerate()
            .map(|(index, (requirement, report))| {
                let report = report
                    .unwrap_or_else(|| ProbeReport::missing("probe task failed before reporting"));
                ProbeOutcome {
                    index,
                    requirement: requirement.clone(),
                    present: report.present,
                    detail: report.detail,
                }
            })
            .collect();

        let result = reduce(skill_id, outcomes, started.elapsed().as_millis() as u64);

        tracing::debug!(
            skill = %skill_id,
            decision = %result.decision,
            failures = result.failures.len(),
            warnings = result.warnings.len(),
            duration_ms = result.duration_ms,
            "Gating evaluation finished"
        );

        Ok(result)
    }
}

/// Classify probe outcomes by necessity and derive the decision.
///
/// - required & missing -> `failures`
/// - optional & missing -> `warnings`
/// - present -> `satisfied`
///
/// `Fail` iff there is any failure, else `PassWithWarnings` iff there is any
/// warning, else `Pass`. All lists come out in declaration order.
pub fn reduce(skill_id: &str, mut outcomes: Vec<ProbeOutcome>, duration_ms: u64) -> GatingResult {
    outcomes.sort_by_key(|o| o.index);

    let mut failures = Vec::new();
    let mut warnings = Vec::new();
    let mut satisfied = Vec::new();

    for outcome in outcomes {
        match (outcome.present, outcome.requirement.necessity) {
            (true, _) => satisfied.push(outcome),
            (false, Necessity::Required) => failures.push(outcome),
            (false, Necessity::Optional) => warnings.push(outcome),
        }
    }

    let decision = if !failures.is_empty() {
        Decision::Fail
    } else if !warnings.is_empty() {
        Decision::PassWithWarnings
    } else {
        Decision::Pass
    };

    GatingResult {
        skill_id: skill_id.to_owned(),
        decision,
        failures,
        warnings,
        satisfied,
        evaluated_at: Utc::now(),
        duration_ms,
    }
}
