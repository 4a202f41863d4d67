//! Skill registry: discovery, gating outcomes and the trust boundary.
//!
//! The registry owns an explicit map from skill id to a per-entry slot.
//! Each slot serializes evaluations of its own skill behind an async mutex
//! and publishes finished entries by swapping an `Arc<RegistryEntry>`, so:
//!
//! - readers (`list`, `gate`, activation lookups) never wait on an
//!   evaluation and never observe a half-built entry,
//! - two reloads of the same skill run one after the other,
//! - reloads of different skills proceed independently.
//!
//! Bundled entries are immutable through this API. Every mutating call
//! (`remove`, `overwrite`, `reload_from_user_edit`) checks the entry's
//! source before touching any state and fails with
//! `RegistryError::TrustViolation` otherwise.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::join_all;
use skillgate_types::error::{EvaluationError, MutatingOperation, ParseError, RegistryError};
use skillgate_types::gating::{
    Decision, GatingResult, RegistryEntry, SkillListing, SkillState, WarningNotice,
};
use skillgate_types::skill::{Manifest, SkillSource};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

use super::evaluator::GatingEvaluator;
use super::manifest::parse_manifest;
use super::matcher::{ActivationCandidate, RelevanceMatcher};
use super::probe::ProbeSet;
use super::source::{DefinitionSource, SkillDocument};

// ---------------------------------------------------------------------------
// Discovery reporting
// ---------------------------------------------------------------------------

/// Why a discovered definition did not become a registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryFailureReason {
    /// The definition is malformed; the skill stays unloaded.
    Parse(ParseError),
    /// Another definition in the same source already claimed this id.
    DuplicateSkillId(String),
    /// A user definition tried to claim the id of a bundled skill.
    ShadowsBundled(String),
}

impl fmt::Display for DiscoveryFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::DuplicateSkillId(id) => write!(f, "duplicate skill_id '{id}'"),
            Self::ShadowsBundled(id) => {
                write!(f, "user skill '{id}' would shadow a bundled skill")
            }
        }
    }
}

/// A definition that failed discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFailure {
    pub source: SkillSource,
    pub location: PathBuf,
    pub reason: DiscoveryFailureReason,
}

/// Summary of one `discover` call.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Skills gated and installed, in scan order.
    pub loaded: Vec<String>,
    /// Skills parsed but whose evaluation was cancelled.
    pub cancelled: Vec<String>,
    pub failures: Vec<DiscoveryFailure>,
}

/// Which skills a reload covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadTarget {
    Skill(String),
    All,
}

/// Summary of a full reload.
#[derive(Debug, Clone, Default)]
pub struct ReloadReport {
    pub bundled: DiscoveryReport,
    pub user: DiscoveryReport,
    /// Entries dropped because their definitions disappeared.
    pub dropped: Vec<String>,
}

// ---------------------------------------------------------------------------
// Entry slots
// ---------------------------------------------------------------------------

/// Per-skill storage and locking.
#[derive(Debug, Default)]
struct EntrySlot {
    /// Held for the whole of an evaluation or mutation of this skill.
    gate_lock: Arc<tokio::sync::Mutex<()>>,
    current: RwLock<Option<Arc<RegistryEntry>>>,
    /// Cancels the evaluation currently running for this skill.
    in_flight: Mutex<Option<CancellationToken>>,
    /// Set when a PassWithWarnings result has not been surfaced yet.
    notice_pending: AtomicBool,
}

impl EntrySlot {
    fn current(&self) -> Option<Arc<RegistryEntry>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, entry: Arc<RegistryEntry>) {
        let pending = entry.latest_result.decision == Decision::PassWithWarnings;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(entry);
        self.notice_pending.store(pending, Ordering::SeqCst);
    }

    fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.notice_pending.store(false, Ordering::SeqCst);
    }

    fn set_in_flight(&self, token: Option<CancellationToken>) {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn cancel_in_flight(&self) -> bool {
        match self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// SkillRegistry
// ---------------------------------------------------------------------------

/// Registry of discovered skills and their gating results.
///
/// Generic over the probe set `P` and the definition source `D` so the host
/// pins real infrastructure while tests use in-memory fakes.
pub struct SkillRegistry<P, D> {
    evaluator: GatingEvaluator<P>,
    catalog: Arc<D>,
    entries: DashMap<String, Arc<EntrySlot>>,
    failures: DashMap<PathBuf, DiscoveryFailure>,
    shutdown: CancellationToken,
}

impl<P, D> fmt::Debug for SkillRegistry<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkillRegistry")
            .field("entries", &self.entries.len())
            .field("failures", &self.failures.len())
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl<P, D> SkillRegistry<P, D>
where
    P: ProbeSet + 'static,
    D: DefinitionSource,
{
    pub fn new(evaluator: GatingEvaluator<P>, catalog: Arc<D>) -> Self {
        Self {
            evaluator,
            catalog,
            entries: DashMap::new(),
            failures: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn catalog(&self) -> &D {
        &self.catalog
    }

    // -- discovery ----------------------------------------------------------

    /// Scan one source, parse every definition and gate the parsed manifests
    /// concurrently.
    ///
    /// Parse failures are recorded and logged; they never abort discovery of
    /// the remaining definitions. The trust level of each manifest comes from
    /// the source being scanned, never from the document itself.
    pub async fn discover(&self, source: SkillSource) -> Result<DiscoveryReport, RegistryError> {
        if self.shutdown.is_cancelled() {
            return Err(RegistryError::Shutdown);
        }

        let documents = self.catalog.scan(source).await?;
        self.failures.retain(|_, f| f.source != source);

        tracing::debug!(source = %source, candidates = documents.len(), "Discovering skills");

        let mut report = DiscoveryReport::default();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut candidates: Vec<(Manifest, PathBuf)> = Vec::new();

        for SkillDocument {
            location, content, ..
        } in documents
        {
            match parse_manifest(&content, source) {
                Ok(parsed) => {
                    let skill_id = parsed.manifest.skill_id.clone();
                    if claimed.insert(skill_id.clone()) {
                        candidates.push((parsed.manifest, location));
                    } else {
                        tracing::warn!(
                            skill = %skill_id,
                            location = %location.display(),
                            "Skipping duplicate skill definition"
                        );
                        self.record_failure(
                            &mut report,
                            source,
                            location,
                            DiscoveryFailureReason::DuplicateSkillId(skill_id),
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        location = %location.display(),
                        error = %e,
                        "Skipping malformed skill definition"
                    );
                    self.record_failure(
                        &mut report,
                        source,
                        location,
                        DiscoveryFailureReason::Parse(e),
                    );
                }
            }
        }

        let outcomes = join_all(
            candidates
                .into_iter()
                .map(|(manifest, location)| self.install_discovered(manifest, location)),
        )
        .await;

        for outcome in outcomes {
            match outcome {
                Installed::Loaded(skill_id) => report.loaded.push(skill_id),
                Installed::Cancelled(skill_id) => report.cancelled.push(skill_id),
                Installed::Rejected(location, reason) => {
                    self.record_failure(&mut report, source, location, reason);
                }
            }
        }

        tracing::info!(
            source = %source,
            loaded = report.loaded.len(),
            failed = report.failures.len(),
            "Skill discovery finished"
        );

        Ok(report)
    }

    async fn install_discovered(&self, manifest: Manifest, location: PathBuf) -> Installed {
        let skill_id = manifest.skill_id.clone();
        let (slot, _guard) = match self.lock_slot(&skill_id, true).await {
            Ok(locked) => locked,
            Err(e) => {
                tracing::debug!(skill = %skill_id, error = %e, "Skill not installed");
                return Installed::Cancelled(skill_id);
            }
        };

        if manifest.source == SkillSource::User {
            if let Some(existing) = slot.current() {
                if !existing.mutable() {
                    tracing::warn!(
                        skill = %skill_id,
                        location = %location.display(),
                        "User skill would shadow a bundled skill; ignoring it"
                    );
                    return Installed::Rejected(
                        location,
                        DiscoveryFailureReason::ShadowsBundled(skill_id),
                    );
                }
            }
        } else if slot.current().is_some_and(|e| e.mutable()) {
            tracing::warn!(skill = %skill_id, "Bundled skill replaces user skill with the same id");
        }

        match self.evaluate_locked(&slot, manifest, location).await {
            Ok(_) => Installed::Loaded(skill_id),
            Err(e) => {
                tracing::debug!(skill = %skill_id, error = %e, "Skill not installed");
                self.discard_if_empty(&skill_id, &slot);
                Installed::Cancelled(skill_id)
            }
        }
    }

    fn record_failure(
        &self,
        report: &mut DiscoveryReport,
        source: SkillSource,
        location: PathBuf,
        reason: DiscoveryFailureReason,
    ) {
        let failure = DiscoveryFailure {
            source,
            location: location.clone(),
            reason,
        };
        self.failures.insert(location, failure.clone());
        report.failures.push(failure);
    }

    // -- reads --------------------------------------------------------------

    /// The cached gating result for a skill. Never re-probes.
    pub fn gate(&self, skill_id: &str) -> Result<GatingResult, RegistryError> {
        self.entry(skill_id)
            .map(|e| e.latest_result.clone())
            .ok_or_else(|| RegistryError::NotFound(skill_id.to_owned()))
    }

    /// The current entry for a skill, if it has been gated.
    pub fn entry(&self, skill_id: &str) -> Option<Arc<RegistryEntry>> {
        let slot = self.entries.get(skill_id).map(|s| Arc::clone(s.value()))?;
        slot.current()
    }

    /// Every gated entry, active and inactive, sorted by skill id.
    pub fn list(&self) -> Vec<SkillListing> {
        let mut listings: Vec<SkillListing> = self
            .snapshot()
            .iter()
            .map(|e| SkillListing::from(e.as_ref()))
            .collect();
        listings.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        listings
    }

    /// Definitions that failed discovery, sorted by location.
    pub fn parse_failures(&self) -> Vec<DiscoveryFailure> {
        let mut failures: Vec<DiscoveryFailure> =
            self.failures.iter().map(|f| f.value().clone()).collect();
        failures.sort_by(|a, b| a.location.cmp(&b.location));
        failures
    }

    /// Ask `matcher` which active skills fit `query`.
    ///
    /// Only `Active` entries are offered, and ids the matcher returns that
    /// are not active are dropped.
    pub fn activate_candidates_for<M>(&self, query: &str, matcher: &M) -> Vec<String>
    where
        M: RelevanceMatcher + ?Sized,
    {
        let mut active: Vec<Arc<RegistryEntry>> = self
            .snapshot()
            .into_iter()
            .filter(|e| e.state() == SkillState::Active)
            .collect();
        active.sort_by(|a, b| a.manifest.skill_id.cmp(&b.manifest.skill_id));

        let candidates: Vec<ActivationCandidate<'_>> = active
            .iter()
            .map(|e| ActivationCandidate {
                skill_id: &e.manifest.skill_id,
                payload: &e.manifest.payload,
            })
            .collect();

        let allowed: HashSet<&str> = candidates.iter().map(|c| c.skill_id).collect();
        let mut seen = HashSet::new();
        matcher
            .rank(query, &candidates)
            .into_iter()
            .filter(|id| allowed.contains(id.as_str()) && seen.insert(id.clone()))
            .collect()
    }

    /// Degraded-capability notices not yet surfaced to the host.
    ///
    /// Each PassWithWarnings load or reload yields its notice exactly once.
    pub fn drain_warning_notices(&self) -> Vec<WarningNotice> {
        let slots: Vec<Arc<EntrySlot>> = self.entries.iter().map(|s| Arc::clone(s.value())).collect();
        let mut notices: Vec<WarningNotice> = slots
            .iter()
            .filter(|slot| slot.notice_pending.swap(false, Ordering::SeqCst))
            .filter_map(|slot| slot.current())
            .filter(|e| !e.latest_result.warnings.is_empty())
            .map(|e| WarningNotice {
                skill_id: e.manifest.skill_id.clone(),
                warnings: e.latest_result.warnings.clone(),
            })
            .collect();
        notices.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        notices
    }

    // -- reload -------------------------------------------------------------

    /// Re-run discovery and gating.
    ///
    /// `ReloadTarget::Skill` re-reads that skill's definition from its
    /// recorded location and replaces the entry wholesale; any error leaves
    /// the old entry in place. `ReloadTarget::All` rediscovers both sources
    /// and drops entries whose definitions are gone or no longer parse.
    pub async fn reload(&self, target: ReloadTarget) -> Result<ReloadReport, RegistryError> {
        match target {
            ReloadTarget::Skill(skill_id) => {
                let entry = self.reload_skill(&skill_id, None).await?;
                let mut report = ReloadReport::default();
                match entry.manifest.source {
                    SkillSource::Bundled => report.bundled.loaded.push(skill_id),
                    SkillSource::User => report.user.loaded.push(skill_id),
                }
                Ok(report)
            }
            ReloadTarget::All => self.reload_all().await,
        }
    }

    /// Re-read and re-gate a user skill after its definition was edited.
    pub async fn reload_from_user_edit(
        &self,
        skill_id: &str,
    ) -> Result<Arc<RegistryEntry>, RegistryError> {
        self.reload_skill(skill_id, Some(MutatingOperation::ReloadFromUserEdit))
            .await
    }

    async fn reload_skill(
        &self,
        skill_id: &str,
        operation: Option<MutatingOperation>,
    ) -> Result<Arc<RegistryEntry>, RegistryError> {
        let (slot, _guard) = self.lock_slot(skill_id, false).await?;
        let existing = slot
            .current()
            .ok_or_else(|| RegistryError::NotFound(skill_id.to_owned()))?;

        if let Some(operation) = operation {
            ensure_mutable(&existing, operation)?;
        }

        let document = self.catalog.fetch(&existing.location).await?;
        let parsed = parse_manifest(&document.content, existing.manifest.source)?;
        if parsed.manifest.skill_id != skill_id {
            return Err(RegistryError::IdentityChanged {
                expected: skill_id.to_owned(),
                found: parsed.manifest.skill_id,
            });
        }

        tracing::info!(skill = %skill_id, "Reloading skill");
        self.evaluate_locked(&slot, parsed.manifest, existing.location.clone())
            .await
    }

    async fn reload_all(&self) -> Result<ReloadReport, RegistryError> {
        let bundled = self.discover(SkillSource::Bundled).await;
        let user = self.discover(SkillSource::User).await;

        let mut report = ReloadReport::default();
        let mut rescanned: Vec<(SkillSource, HashSet<String>)> = Vec::new();

        for (source, result) in [(SkillSource::Bundled, bundled), (SkillSource::User, user)] {
            match result {
                Ok(discovery) => {
                    let seen: HashSet<String> = discovery
                        .loaded
                        .iter()
                        .chain(discovery.cancelled.iter())
                        .cloned()
                        .collect();
                    rescanned.push((source, seen));
                    match source {
                        SkillSource::Bundled => report.bundled = discovery,
                        SkillSource::User => report.user = discovery,
                    }
                }
                Err(RegistryError::Shutdown) => return Err(RegistryError::Shutdown),
                Err(e) => {
                    // Keep this source's entries when it could not be scanned.
                    tracing::warn!(source = %source, error = %e, "Skill source scan failed");
                }
            }
        }

        for (source, seen) in rescanned {
            for entry in self.snapshot() {
                let skill_id = entry.manifest.skill_id.as_str();
                if entry.manifest.source == source && !seen.contains(skill_id) {
                    if self.drop_entry(skill_id, &entry.location).await {
                        tracing::info!(skill = %skill_id, source = %source, "Dropped vanished skill");
                        report.dropped.push(skill_id.to_owned());
                    }
                }
            }
        }

        report.dropped.sort();
        Ok(report)
    }

    /// Remove the entry for `skill_id` if it still points at `location`.
    async fn drop_entry(&self, skill_id: &str, location: &Path) -> bool {
        let Ok((slot, _guard)) = self.lock_slot(skill_id, false).await else {
            return false;
        };
        if !slot.current().is_some_and(|e| e.location == location) {
            return false;
        }
        self.unmap(skill_id, &slot);
        true
    }

    // -- mutations (trust boundary) -----------------------------------------

    /// Install or replace a user skill from SKILL.md content.
    ///
    /// The content is parsed as a user definition, persisted through the
    /// definition source and gated. Replacing a bundled skill is a
    /// `TrustViolation`; nothing is written in that case.
    pub async fn overwrite(&self, content: &str) -> Result<Arc<RegistryEntry>, RegistryError> {
        if self.shutdown.is_cancelled() {
            return Err(RegistryError::Shutdown);
        }

        let parsed = parse_manifest(content, SkillSource::User)?;
        let skill_id = parsed.manifest.skill_id.clone();
        let (slot, _guard) = self.lock_slot(&skill_id, true).await?;

        if let Some(existing) = slot.current() {
            if let Err(e) = ensure_mutable(&existing, MutatingOperation::Overwrite) {
                tracing::warn!(skill = %skill_id, "Rejected overwrite of bundled skill");
                return Err(e);
            }
        }

        let location = match self.catalog.store(&skill_id, content).await {
            Ok(location) => location,
            Err(e) => {
                self.discard_if_empty(&skill_id, &slot);
                return Err(e.into());
            }
        };

        let result = self.evaluate_locked(&slot, parsed.manifest, location).await;
        if result.is_err() {
            self.discard_if_empty(&skill_id, &slot);
        }
        result
    }

    /// Delete a user skill's definition and drop its entry.
    ///
    /// Bundled skills are rejected with `TrustViolation` before anything is
    /// touched. Waits for any in-flight evaluation of the same skill.
    pub async fn remove(&self, skill_id: &str) -> Result<(), RegistryError> {
        let (slot, _guard) = self.lock_slot(skill_id, false).await?;
        let existing = slot
            .current()
            .ok_or_else(|| RegistryError::NotFound(skill_id.to_owned()))?;

        if let Err(e) = ensure_mutable(&existing, MutatingOperation::Remove) {
            tracing::warn!(skill = %skill_id, "Rejected removal of bundled skill");
            return Err(e);
        }

        self.catalog.delete(&existing.location).await?;
        self.unmap(skill_id, &slot);
        tracing::info!(skill = %skill_id, "Removed user skill");
        Ok(())
    }

    // -- cancellation -------------------------------------------------------

    /// Cancel the in-flight evaluation of one skill, if any.
    ///
    /// The skill keeps its previous entry. Returns whether an evaluation was
    /// running.
    pub fn abort(&self, skill_id: &str) -> bool {
        self.entries
            .get(skill_id)
            .map(|s| Arc::clone(s.value()))
            .is_some_and(|slot| slot.cancel_in_flight())
    }

    /// Cancel every in-flight evaluation and refuse new ones.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down skill registry");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // -- internals ----------------------------------------------------------

    fn slot(&self, skill_id: &str) -> Arc<EntrySlot> {
        Arc::clone(self.entries.entry(skill_id.to_owned()).or_default().value())
    }

    fn existing_slot(&self, skill_id: &str) -> Result<Arc<EntrySlot>, RegistryError> {
        self.entries
            .get(skill_id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| RegistryError::NotFound(skill_id.to_owned()))
    }

    /// Lock the slot currently mapped to `skill_id`.
    ///
    /// A waiter can find its slot unmapped by the time the lock is granted;
    /// it then retries against the slot mapped now. With `create` a missing
    /// slot is inserted, otherwise a missing skill is `NotFound`. Slots are
    /// only unmapped under their own lock, so the mapping holds for as long
    /// as the guard lives.
    async fn lock_slot(
        &self,
        skill_id: &str,
        create: bool,
    ) -> Result<(Arc<EntrySlot>, OwnedMutexGuard<()>), RegistryError> {
        loop {
            let slot = if create {
                self.slot(skill_id)
            } else {
                self.existing_slot(skill_id)?
            };
            let guard = Arc::clone(&slot.gate_lock).lock_owned().await;
            let mapped = self
                .entries
                .get(skill_id)
                .is_some_and(|s| Arc::ptr_eq(s.value(), &slot));
            if mapped {
                return Ok((slot, guard));
            }
        }
    }

    /// Empty a locked slot and take it out of the map.
    fn unmap(&self, skill_id: &str, slot: &Arc<EntrySlot>) {
        slot.clear();
        self.entries.remove_if(skill_id, |_, s| Arc::ptr_eq(s, slot));
    }

    /// Drop a slot that never received an entry.
    fn discard_if_empty(&self, skill_id: &str, slot: &Arc<EntrySlot>) {
        if slot.current().is_none() {
            self.entries
                .remove_if(skill_id, |_, s| Arc::ptr_eq(s, slot));
        }
    }

    fn snapshot(&self) -> Vec<Arc<RegistryEntry>> {
        let slots: Vec<Arc<EntrySlot>> = self.entries.iter().map(|s| Arc::clone(s.value())).collect();
        slots.iter().filter_map(|s| s.current()).collect()
    }

    /// Gate `manifest` and publish the entry. Caller holds `slot.gate_lock`.
    ///
    /// Publishing clears any discovery failure recorded for the same
    /// location. On cancellation the previous entry (if any) stays published.
    async fn evaluate_locked(
        &self,
        slot: &EntrySlot,
        manifest: Manifest,
        location: PathBuf,
    ) -> Result<Arc<RegistryEntry>, RegistryError> {
        if self.shutdown.is_cancelled() {
            return Err(RegistryError::Shutdown);
        }

        let token = self.shutdown.child_token();
        slot.set_in_flight(Some(token.clone()));
        let evaluated = self.evaluator.evaluate(&manifest, &token).await;
        slot.set_in_flight(None);

        let result = match evaluated {
            Ok(result) => result,
            Err(EvaluationError::Cancelled { .. }) if self.shutdown.is_cancelled() => {
                return Err(RegistryError::Shutdown);
            }
            Err(e) => return Err(e.into()),
        };

        log_gating_outcome(&result);

        let entry = Arc::new(RegistryEntry {
            manifest,
            latest_result: result,
            location,
            loaded_at: Utc::now(),
        });
        slot.publish(Arc::clone(&entry));
        self.failures.remove(&entry.location);
        Ok(entry)
    }
}

enum Installed {
    Loaded(String),
    Cancelled(String),
    Rejected(PathBuf, DiscoveryFailureReason),
}

fn ensure_mutable(entry: &RegistryEntry, operation: MutatingOperation) -> Result<(), RegistryError> {
    if entry.mutable() {
        Ok(())
    } else {
        Err(RegistryError::TrustViolation {
            skill_id: entry.manifest.skill_id.clone(),
            operation,
        })
    }
}

fn log_gating_outcome(result: &GatingResult) {
    let skill = result.skill_id.as_str();
    match result.decision {
        Decision::Pass => tracing::info!(skill = %skill, "Skill passed gating"),
        Decision::PassWithWarnings => {
            let missing: Vec<String> = result.warnings.iter().map(|o| o.requirement.to_string()).collect();
            tracing::warn!(
                skill = %skill,
                missing = ?missing,
                "Skill loaded with reduced capability: optional requirements missing"
            );
        }
        Decision::Fail => {
            let missing: Vec<String> = result.failures.iter().map(|o| o.requirement.to_string()).collect();
            tracing::warn!(
                skill = %skill,
                missing = ?missing,
                "Skipping skill: required requirements missing"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::skill::matcher::KeywordMatcher;
    use crate::skill::testing::{FakeBehavior, FakeCatalog, FakeProbes, skill_doc};
    use skillgate_types::skill::RequirementKind::{Binary, EnvironmentVariable};

    type TestRegistry = SkillRegistry<FakeProbes, FakeCatalog>;

    fn registry_with(probes: FakeProbes, catalog: FakeCatalog) -> (TestRegistry, Arc<FakeProbes>, Arc<FakeCatalog>) {
        let probes = Arc::new(probes);
        let catalog = Arc::new(catalog);
        let evaluator = GatingEvaluator::new(Arc::clone(&probes), 4, Duration::from_secs(2));
        (SkillRegistry::new(evaluator, Arc::clone(&catalog)), probes, catalog)
    }

    fn bundled_and_user_catalog() -> FakeCatalog {
        let catalog = FakeCatalog::new();
        catalog.add(
            SkillSource::Bundled,
            "bundled/core-git/SKILL.md",
            &skill_doc("core-git", &[("binary", "git", "required")]),
        );
        catalog.add(
            SkillSource::User,
            "user/notes/SKILL.md",
            &skill_doc("notes", &[("env", "NOTES_DIR", "optional")]),
        );
        catalog
    }

    #[tokio::test]
    async fn discover_gates_and_lists_entries() {
        let probes = FakeProbes::new().with(Binary, "git", FakeBehavior::Present);
        let (registry, _, _) = registry_with(probes, bundled_and_user_catalog());

        let bundled = registry.discover(SkillSource::Bundled).await.unwrap();
        let user = registry.discover(SkillSource::User).await.unwrap();
        assert_eq!(bundled.loaded, vec!["core-git"]);
        assert_eq!(user.loaded, vec!["notes"]);

        let listing = registry.list();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].skill_id, "core-git");
        assert_eq!(listing[0].decision, Decision::Pass);
        assert_eq!(listing[0].source, SkillSource::Bundled);
        assert_eq!(listing[1].skill_id, "notes");
        assert_eq!(listing[1].decision, Decision::PassWithWarnings);
        assert_eq!(listing[1].warnings.len(), 1);
    }

    #[tokio::test]
    async fn parse_failure_keeps_skill_unloaded_without_aborting_discovery() {
        let catalog = FakeCatalog::new();
        catalog.add(SkillSource::User, "user/broken/SKILL.md", "no frontmatter here");
        catalog.add(SkillSource::User, "user/ok/SKILL.md", &skill_doc("ok", &[]));
        let (registry, _, _) = registry_with(FakeProbes::new(), catalog);

        let report = registry.discover(SkillSource::User).await.unwrap();
        assert_eq!(report.loaded, vec!["ok"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].reason,
            DiscoveryFailureReason::Parse(ParseError::MissingFrontmatter)
        );
        assert_eq!(registry.parse_failures().len(), 1);
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn failing_skill_is_listed_but_never_activated() {
        let catalog = FakeCatalog::new();
        catalog.add(
            SkillSource::User,
            "user/deployer/SKILL.md",
            &skill_doc("deployer", &[("binary", "kubectl", "required")]),
        );
        catalog.add(SkillSource::User, "user/notes/SKILL.md", &skill_doc("notes", &[]));
        let (registry, _, _) = registry_with(FakeProbes::new(), catalog);
        registry.discover(SkillSource::User).await.unwrap();

        let listing = registry.list();
        let deployer = listing.iter().find(|l| l.skill_id == "deployer").unwrap();
        assert_eq!(deployer.state, SkillState::Inactive);
        assert_eq!(deployer.failures[0].requirement.name, "kubectl");

        let candidates = registry.activate_candidates_for("deployer and notes please", &KeywordMatcher);
        assert_eq!(candidates, vec!["notes"]);
    }

    #[tokio::test]
    async fn activation_ignores_ids_the_matcher_invents() {
        struct Everything;
        impl RelevanceMatcher for Everything {
            fn rank(&self, _query: &str, candidates: &[ActivationCandidate<'_>]) -> Vec<String> {
                let mut ids: Vec<String> = candidates.iter().map(|c| c.skill_id.to_owned()).collect();
                ids.push("not-registered".to_owned());
                ids.push(ids[0].clone());
                ids
            }
        }

        let (registry, _, _) = registry_with(FakeProbes::new(), bundled_and_user_catalog());
        registry.discover(SkillSource::User).await.unwrap();
        assert_eq!(registry.activate_candidates_for("anything", &Everything), vec!["notes"]);
    }

    #[tokio::test]
    async fn gate_returns_cached_result_without_reprobing() {
        let (registry, probes, _) = registry_with(FakeProbes::new(), bundled_and_user_catalog());
        registry.discover(SkillSource::Bundled).await.unwrap();
        let calls = probes.calls();

        let first = registry.gate("core-git").unwrap();
        let second = registry.gate("core-git").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.decision, Decision::Fail);
        assert_eq!(probes.calls(), calls);
        assert!(matches!(registry.gate("missing"), Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn remove_bundled_is_trust_violation_and_changes_nothing() {
        let (registry, _, catalog) = registry_with(FakeProbes::new(), bundled_and_user_catalog());
        registry.discover(SkillSource::Bundled).await.unwrap();
        let before = registry.entry("core-git").unwrap();

        let err = registry.remove("core-git").await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::TrustViolation {
                ref skill_id,
                operation: MutatingOperation::Remove,
            } if skill_id == "core-git"
        ));

        let after = registry.entry("core-git").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(catalog.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn overwrite_bundled_is_trust_violation_and_writes_nothing() {
        let (registry, _, catalog) = registry_with(FakeProbes::new(), bundled_and_user_catalog());
        registry.discover(SkillSource::Bundled).await.unwrap();
        let before = registry.entry("core-git").unwrap();

        let err = registry
            .overwrite(&skill_doc("core-git", &[]))
            .await
            .unwrap_err();
        assert!(err.is_trust_violation());

        let after = registry.entry("core-git").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.manifest.source, SkillSource::Bundled);
        assert!(
            catalog
                .fetch(Path::new("user/core-git/SKILL.md"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn reload_from_user_edit_on_bundled_is_trust_violation() {
        let (registry, probes, _) = registry_with(FakeProbes::new(), bundled_and_user_catalog());
        registry.discover(SkillSource::Bundled).await.unwrap();
        let calls = probes.calls();

        let err = registry.reload_from_user_edit("core-git").await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::TrustViolation {
                operation: MutatingOperation::ReloadFromUserEdit,
                ..
            }
        ));
        assert_eq!(probes.calls(), calls);
    }

    #[tokio::test]
    async fn user_skill_can_be_overwritten_and_removed() {
        let (registry, _, catalog) = registry_with(FakeProbes::new(), FakeCatalog::new());

        let entry = registry
            .overwrite(&skill_doc("scratch", &[("env", "SCRATCH", "required")]))
            .await
            .unwrap();
        assert_eq!(entry.manifest.source, SkillSource::User);
        assert_eq!(entry.latest_result.decision, Decision::Fail);

        let entry = registry.overwrite(&skill_doc("scratch", &[])).await.unwrap();
        assert_eq!(entry.latest_result.decision, Decision::Pass);

        registry.remove("scratch").await.unwrap();
        assert!(registry.entry("scratch").is_none());
        assert_eq!(
            catalog.deleted.lock().unwrap().as_slice(),
            &[PathBuf::from("user/scratch/SKILL.md")]
        );
        assert!(matches!(
            registry.remove("scratch").await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn user_definition_cannot_shadow_bundled_skill() {
        let catalog = bundled_and_user_catalog();
        catalog.add(SkillSource::User, "user/core-git/SKILL.md", &skill_doc("core-git", &[]));
        let (registry, _, _) = registry_with(FakeProbes::new(), catalog);

        registry.discover(SkillSource::Bundled).await.unwrap();
        let report = registry.discover(SkillSource::User).await.unwrap();

        assert_eq!(report.loaded, vec!["notes"]);
        assert_eq!(
            report.failures[0].reason,
            DiscoveryFailureReason::ShadowsBundled("core-git".to_owned())
        );
        assert_eq!(
            registry.entry("core-git").unwrap().manifest.source,
            SkillSource::Bundled
        );
    }

    #[tokio::test]
    async fn duplicate_ids_within_a_source_keep_the_first() {
        let catalog = FakeCatalog::new();
        catalog.add(SkillSource::User, "user/a/SKILL.md", &skill_doc("same", &[]));
        catalog.add(
            SkillSource::User,
            "user/b/SKILL.md",
            &skill_doc("same", &[("binary", "nope", "required")]),
        );
        let (registry, _, _) = registry_with(FakeProbes::new(), catalog);

        let report = registry.discover(SkillSource::User).await.unwrap();
        assert_eq!(report.loaded, vec!["same"]);
        assert_eq!(
            report.failures[0].reason,
            DiscoveryFailureReason::DuplicateSkillId("same".to_owned())
        );
        assert_eq!(
            registry.entry("same").unwrap().location,
            PathBuf::from("user/a/SKILL.md")
        );
    }

    #[tokio::test]
    async fn reload_of_one_skill_leaves_others_untouched() {
        let probes = FakeProbes::new().with(Binary, "git", FakeBehavior::Present);
        let (registry, probes, _) = registry_with(probes, bundled_and_user_catalog());
        registry.discover(SkillSource::Bundled).await.unwrap();
        registry.discover(SkillSource::User).await.unwrap();

        let notes_before = registry.entry("notes").unwrap();
        probes.set(EnvironmentVariable, "NOTES_DIR", FakeBehavior::Present);
        probes.set(Binary, "git", FakeBehavior::Missing);

        registry.reload(ReloadTarget::Skill("core-git".to_owned())).await.unwrap();

        assert_eq!(registry.gate("core-git").unwrap().decision, Decision::Fail);
        let notes_after = registry.entry("notes").unwrap();
        assert!(Arc::ptr_eq(&notes_before, &notes_after));
        assert_eq!(notes_after.latest_result.decision, Decision::PassWithWarnings);
    }

    #[tokio::test]
    async fn reload_from_user_edit_picks_up_new_content() {
        let (registry, _, catalog) = registry_with(FakeProbes::new(), bundled_and_user_catalog());
        registry.discover(SkillSource::User).await.unwrap();
        assert_eq!(registry.gate("notes").unwrap().decision, Decision::PassWithWarnings);

        catalog.add(SkillSource::User, "user/notes/SKILL.md", &skill_doc("notes", &[]));
        let entry = registry.reload_from_user_edit("notes").await.unwrap();
        assert_eq!(entry.latest_result.decision, Decision::Pass);
    }

    #[tokio::test]
    async fn reload_rejects_changed_identity_and_keeps_entry() {
        let (registry, _, catalog) = registry_with(FakeProbes::new(), bundled_and_user_catalog());
        registry.discover(SkillSource::User).await.unwrap();
        let before = registry.entry("notes").unwrap();

        catalog.add(SkillSource::User, "user/notes/SKILL.md", &skill_doc("renamed", &[]));
        let err = registry.reload_from_user_edit("notes").await.unwrap_err();
        assert!(matches!(err, RegistryError::IdentityChanged { .. }));
        assert!(Arc::ptr_eq(&before, &registry.entry("notes").unwrap()));
    }

    #[tokio::test]
    async fn reload_all_drops_vanished_definitions() {
        let (registry, _, catalog) = registry_with(FakeProbes::new(), bundled_and_user_catalog());
        registry.reload(ReloadTarget::All).await.unwrap();
        assert_eq!(registry.list().len(), 2);

        catalog.remove_location("user/notes/SKILL.md");
        catalog.add(SkillSource::User, "user/fresh/SKILL.md", &skill_doc("fresh", &[]));
        let report = registry.reload(ReloadTarget::All).await.unwrap();

        assert_eq!(report.dropped, vec!["notes"]);
        assert_eq!(report.user.loaded, vec!["fresh"]);
        let ids: Vec<String> = registry.list().into_iter().map(|l| l.skill_id).collect();
        assert_eq!(ids, vec!["core-git", "fresh"]);
    }

    #[tokio::test]
    async fn concurrent_reloads_of_one_skill_serialize() {
        let probes = FakeProbes::new().with(
            Binary,
            "git",
            FakeBehavior::Delay(Duration::from_millis(40), true),
        );
        let (registry, probes, _) = registry_with(probes, bundled_and_user_catalog());
        registry.discover(SkillSource::Bundled).await.unwrap();

        let target = || ReloadTarget::Skill("core-git".to_owned());
        let (a, b, c) = tokio::join!(
            registry.reload(target()),
            registry.reload(target()),
            registry.reload(target())
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(
            probes.max_in_flight_processes.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn reads_proceed_while_another_skill_reloads() {
        let (registry, probes, _) = registry_with(FakeProbes::new(), bundled_and_user_catalog());
        registry.discover(SkillSource::Bundled).await.unwrap();
        registry.discover(SkillSource::User).await.unwrap();
        probes.set(Binary, "git", FakeBehavior::Hang);

        let reload = registry.reload(ReloadTarget::Skill("core-git".to_owned()));
        let reads = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let notes = registry.gate("notes").unwrap();
            let git = registry.gate("core-git").unwrap();
            assert!(registry.abort("core-git"));
            (notes, git)
        };

        let (reloaded, (notes, git)) = tokio::join!(reload, reads);
        assert_eq!(notes.decision, Decision::PassWithWarnings);
        // The in-progress replacement is never visible; the old result is.
        assert_eq!(git.decision, Decision::Fail);
        assert!(matches!(reloaded, Err(RegistryError::Evaluation(_))));
        assert_eq!(registry.gate("core-git").unwrap(), git);
    }

    #[tokio::test]
    async fn warnings_are_surfaced_once_per_load() {
        let (registry, _, _) = registry_with(FakeProbes::new(), bundled_and_user_catalog());
        registry.discover(SkillSource::User).await.unwrap();

        let notices = registry.drain_warning_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].skill_id, "notes");
        assert_eq!(notices[0].warnings[0].requirement.name, "NOTES_DIR");

        let _ = registry.activate_candidates_for("notes", &KeywordMatcher);
        assert!(registry.drain_warning_notices().is_empty());

        registry.reload(ReloadTarget::Skill("notes".to_owned())).await.unwrap();
        assert_eq!(registry.drain_warning_notices().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_and_refuses_new_work() {
        let (registry, probes, _) = registry_with(FakeProbes::new(), bundled_and_user_catalog());
        registry.discover(SkillSource::Bundled).await.unwrap();
        probes.set(Binary, "git", FakeBehavior::Hang);

        let reload = registry.reload(ReloadTarget::Skill("core-git".to_owned()));
        let stop = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            registry.shutdown();
        };
        let (reloaded, ()) = tokio::join!(reload, stop);

        assert!(matches!(reloaded, Err(RegistryError::Shutdown)));
        assert!(registry.is_shut_down());
        assert!(registry.entry("core-git").is_some());
        assert!(matches!(
            registry.discover(SkillSource::User).await,
            Err(RegistryError::Shutdown)
        ));
    }

    #[tokio::test]
    async fn overwrite_queued_behind_remove_lands_in_a_live_entry() {
        let probes = FakeProbes::new().with(
            EnvironmentVariable,
            "SCRATCH",
            FakeBehavior::Delay(Duration::from_millis(100), true),
        );
        let (registry, _, catalog) = registry_with(probes, FakeCatalog::new());
        registry
            .overwrite(&skill_doc("scratch", &[("env", "SCRATCH", "required")]))
            .await
            .unwrap();

        // The reload holds the lock; remove and then overwrite queue behind it.
        let scratch_doc = skill_doc("scratch", &[]);
        let (reloaded, removed, overwritten) = tokio::join!(
            registry.reload(ReloadTarget::Skill("scratch".to_owned())),
            registry.remove("scratch"),
            registry.overwrite(&scratch_doc)
        );
        assert!(reloaded.is_ok());
        assert!(removed.is_ok());
        let overwritten = overwritten.unwrap();

        let entry = registry.entry("scratch").unwrap();
        assert!(Arc::ptr_eq(&entry, &overwritten));
        assert_eq!(entry.latest_result.decision, Decision::Pass);
        assert_eq!(registry.list().len(), 1);
        assert_eq!(
            registry.activate_candidates_for("scratch", &KeywordMatcher),
            vec!["scratch"]
        );
        assert!(catalog.fetch(Path::new("user/scratch/SKILL.md")).await.is_ok());
    }

    #[tokio::test]
    async fn removed_skill_leaves_no_stale_entry_for_waiters() {
        let probes = FakeProbes::new().with(
            EnvironmentVariable,
            "SCRATCH",
            FakeBehavior::Delay(Duration::from_millis(50), true),
        );
        let (registry, _, _) = registry_with(probes, FakeCatalog::new());
        registry
            .overwrite(&skill_doc("scratch", &[("env", "SCRATCH", "required")]))
            .await
            .unwrap();

        let (reloaded, removed, reloaded_after) = tokio::join!(
            registry.reload(ReloadTarget::Skill("scratch".to_owned())),
            registry.remove("scratch"),
            registry.reload_from_user_edit("scratch")
        );
        assert!(reloaded.is_ok());
        assert!(removed.is_ok());
        assert!(matches!(reloaded_after, Err(RegistryError::NotFound(_))));
        assert!(registry.entry("scratch").is_none());
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn fixing_a_broken_definition_clears_its_failure() {
        let catalog = FakeCatalog::new();
        catalog.add(SkillSource::User, "user/scratch/SKILL.md", "broken");
        let (registry, _, _) = registry_with(FakeProbes::new(), catalog);

        registry.discover(SkillSource::User).await.unwrap();
        assert_eq!(registry.parse_failures().len(), 1);

        registry.overwrite(&skill_doc("scratch", &[])).await.unwrap();
        assert!(registry.entry("scratch").is_some());
        assert!(registry.parse_failures().is_empty());
    }

    #[tokio::test]
    async fn duplicate_requirement_yields_single_outcome() {
        let catalog = FakeCatalog::new();
        catalog.add(
            SkillSource::User,
            "user/x/SKILL.md",
            &skill_doc("x", &[("binary", "git", "required"), ("binary", "git", "optional")]),
        );
        let (registry, _, _) = registry_with(FakeProbes::new(), catalog);
        registry.discover(SkillSource::User).await.unwrap();

        let result = registry.gate("x").unwrap();
        assert_eq!(result.decision, Decision::Fail);
        assert_eq!(result.outcomes().len(), 1);
        assert!(result.failures[0].requirement.is_required());
    }
}
