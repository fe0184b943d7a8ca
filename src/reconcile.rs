//! The reconciliation engine.
//!
//! A sync is two phases:
//!
//! 1. **Plan** ([`Reconciler::plan`]): load the manifest, discover sources,
//!    compute the expected set and scan the output root. Every expected
//!    artifact lands in exactly one of `to_generate` (missing or stale) or
//!    `to_skip` (valid); every orphan lands in `to_delete`. Any error here is
//!    fatal and nothing has been written yet.
//!
//! 2. **Run** ([`Reconciler::run`]): delete orphans, then generate. Both go
//!    through a dedicated rayon pool bounded by `max_workers`, which is what
//!    keeps provider calls within their rate limit. Each item is isolated: a
//!    failed read, provider call, write or delete becomes a
//!    [`OutcomeKind::Failed`] outcome and the run moves on. Skips do no I/O.
//!    Finally the manifest is updated and, only if it changed, saved.
//!
//! A second sync with unchanged inputs therefore plans nothing but skips and
//! performs zero writes or deletes.
//!
//! ## Cancellation
//!
//! A [`CancelToken`] and an optional timeout are checked before each item
//! starts. Once either trips, no further item starts; items already running
//! finish normally. Items that never started are recorded as failed with
//! reason [`CANCELLED_REASON`] and `retryable = true`, and the summary status
//! becomes `cancelled`. Writes are atomic per item, so a cancelled run never
//! leaves a truncated artifact behind.
//!
//! ## Progress
//!
//! An optional `Sender<SyncEvent>` receives one event per finished item, in
//! completion order, for live CLI output. The returned [`RunResult`] is
//! independent of it.
//!
//! ## Panics
//!
//! A panic inside a provider or storage call is caught at the item boundary
//! and recorded as a permanent failure of that item. The rest of the run,
//! the manifest update and the summary are unaffected.

use crate::config::{ConfigError, SyncConfig, effective_workers};
use crate::expected::{self, ArtifactKind, ExpectedArtifact};
use crate::manifest::{MANIFEST_PATH, SyncManifest};
use crate::naming::NamingPolicy;
use crate::provider::StyleProvider;
use crate::report::{self, OutcomeKind, RunInfo, RunOutcome, Summary};
use crate::scan;
use crate::storage::{Storage, StorageEntry, StorageError};
use crate::styles::StyleRegistry;
use chrono::Utc;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failure reason recorded for items that never started.
pub const CANCELLED_REASON: &str = "cancelled before start";

/// Errors that abort a sync before any item runs.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Shared flag that stops a run from starting new items.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub naming: NamingPolicy,
    pub mirror_originals: bool,
    pub extensions: Vec<String>,
    pub max_workers: usize,
    /// Stop starting new items after this long.
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            naming: config.naming,
            mirror_originals: config.mirror_originals,
            extensions: config.extensions.clone(),
            max_workers: effective_workers(&config.processing),
            timeout: config.processing.timeout_secs.map(Duration::from_secs),
            cancel: CancelToken::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerateReason {
    /// Not present in the output root.
    Missing,
    /// Present, but built from another source version or other params.
    Stale,
}

#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub artifact: ExpectedArtifact,
    pub reason: GenerateReason,
}

/// What a run will do. `to_generate` and `to_skip` together are exactly the
/// expected set; `to_delete` never contains an expected path.
#[derive(Debug, Clone)]
pub struct ReconciliationPlan {
    pub to_generate: Vec<PlannedItem>,
    pub to_skip: Vec<ExpectedArtifact>,
    pub to_delete: Vec<StorageEntry>,
    /// Manifest as loaded at planning time.
    pub manifest: SyncManifest,
    /// Source images discovered under the source root.
    pub sources_found: usize,
}

impl ReconciliationPlan {
    /// Whether running this plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.to_generate.is_empty() && self.to_delete.is_empty()
    }

    /// Size of the expected set this plan was built from.
    pub fn expected(&self) -> usize {
        self.to_generate.len() + self.to_skip.len()
    }
}

/// Progress event for one finished item.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Deleted {
        path: String,
    },
    Written {
        path: String,
        label: String,
        kind: OutcomeKind,
        reason: GenerateReason,
    },
    Failed {
        path: String,
        reason: String,
        retryable: bool,
    },
}

#[derive(Debug, Clone)]
pub struct RunResult {
    /// One outcome per item: deletes, then generations, then skips.
    pub outcomes: Vec<RunOutcome>,
    pub summary: Summary,
}

/// Drives one source root / output root pair toward the expected state.
pub struct Reconciler<'a> {
    source: &'a dyn Storage,
    output: &'a dyn Storage,
    registry: &'a StyleRegistry,
    options: SyncOptions,
    pool: rayon::ThreadPool,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        source: &'a dyn Storage,
        output: &'a dyn Storage,
        registry: &'a StyleRegistry,
        options: SyncOptions,
    ) -> Result<Self, SyncError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.max_workers.max(1))
            .thread_name(|i| format!("stylesync-worker-{}", i))
            .build()?;
        Ok(Self {
            source,
            output,
            registry,
            options,
            pool,
        })
    }

    /// Compute the plan. Read-only.
    pub fn plan(&self) -> Result<ReconciliationPlan, SyncError> {
        self.registry.check_naming(self.options.naming)?;

        let manifest = SyncManifest::load(self.output)?;
        let sources = expected::discover_sources(self.source, &self.options.extensions)?;
        let expected = expected::compute(
            &sources,
            self.registry,
            self.options.naming,
            self.options.mirror_originals,
        )?;
        let actual = scan::scan(self.output, &expected, &manifest)?;

        let valid: HashSet<&str> = actual.valid.iter().map(String::as_str).collect();
        let stale: HashSet<&str> = actual.stale.iter().map(String::as_str).collect();

        let mut to_generate = Vec::new();
        let mut to_skip = Vec::new();
        for artifact in expected.iter() {
            let path = artifact.output_path.as_str();
            if valid.contains(path) {
                to_skip.push(artifact.clone());
            } else {
                let reason = if stale.contains(path) {
                    GenerateReason::Stale
                } else {
                    GenerateReason::Missing
                };
                debug!("{}: {:?}", path, reason);
                to_generate.push(PlannedItem {
                    artifact: artifact.clone(),
                    reason,
                });
            }
        }

        info!(
            "{} sources, {} expected artifacts: {} to generate, {} to skip, {} to delete",
            sources.len(),
            expected.len(),
            to_generate.len(),
            to_skip.len(),
            actual.orphans.len()
        );

        Ok(ReconciliationPlan {
            to_generate,
            to_skip,
            to_delete: actual.orphans,
            manifest,
            sources_found: sources.len(),
        })
    }

    /// Execute a plan. Per-item failures are recorded, never returned.
    pub fn run(
        &self,
        plan: ReconciliationPlan,
        provider: &dyn StyleProvider,
        events: Option<Sender<SyncEvent>>,
    ) -> RunResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let deadline = self.options.timeout.map(|t| clock + t);
        let stopped = AtomicBool::new(false);
        let may_start = || {
            let halted = self.options.cancel.is_cancelled()
                || deadline.is_some_and(|d| Instant::now() >= d);
            if halted {
                stopped.store(true, Ordering::SeqCst);
            }
            !halted
        };
        let events = events.as_ref();

        let deleted: Vec<RunOutcome> = self.pool.install(|| {
            plan.to_delete
                .par_iter()
                .map(|entry| {
                    if !may_start() {
                        return not_started(&entry.path, events);
                    }
                    guarded(&entry.path, events, || self.delete_orphan(entry, events))
                })
                .collect()
        });

        // Order-preserving collect: generated[i] belongs to to_generate[i].
        let generated: Vec<RunOutcome> = self.pool.install(|| {
            plan.to_generate
                .par_iter()
                .map(|item| {
                    if !may_start() {
                        return not_started(&item.artifact.output_path, events);
                    }
                    let path = item.artifact.output_path.as_str();
                    guarded(path, events, || self.generate(item, provider, events))
                })
                .collect()
        });

        let mut outcomes = Vec::with_capacity(
            deleted.len() + generated.len() + plan.to_skip.len() + 1,
        );

        let mut manifest = plan.manifest.clone();
        for (item, outcome) in plan.to_generate.iter().zip(&generated) {
            let artifact = &item.artifact;
            match outcome.kind {
                OutcomeKind::Generated | OutcomeKind::Copied => manifest.record(
                    artifact.output_path.clone(),
                    artifact.source.fingerprint.clone(),
                    artifact.params_hash.clone(),
                ),
                _ => manifest.remove(&artifact.output_path),
            }
        }
        let expected_paths: HashSet<&str> = plan
            .to_generate
            .iter()
            .map(|i| i.artifact.output_path.as_str())
            .chain(plan.to_skip.iter().map(|a| a.output_path.as_str()))
            .collect();
        manifest.retain(|p| expected_paths.contains(p));

        outcomes.extend(deleted);
        outcomes.extend(generated);
        outcomes.extend(
            plan.to_skip
                .iter()
                .map(|a| RunOutcome::skipped(a.output_path.clone())),
        );

        if manifest != plan.manifest {
            if let Err(e) = manifest.save(self.output) {
                warn!("Failed to save sync manifest: {}", e);
                outcomes.push(RunOutcome::failed(
                    MANIFEST_PATH,
                    format!("saving manifest: {}", e),
                    e.is_retryable(),
                ));
            }
        } else {
            debug!("Manifest unchanged, not rewriting");
        }

        let run = RunInfo {
            source: self.source.describe(),
            output: self.output.describe(),
            started_at,
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            sources_found: plan.sources_found,
            expected: plan.expected(),
        };
        let summary = report::aggregate(&outcomes, stopped.load(Ordering::SeqCst), run);
        info!("Sync {}", summary);
        RunResult { outcomes, summary }
    }

    /// Plan and run in one go.
    pub fn sync(
        &self,
        provider: &dyn StyleProvider,
        events: Option<Sender<SyncEvent>>,
    ) -> Result<RunResult, SyncError> {
        let plan = self.plan()?;
        Ok(self.run(plan, provider, events))
    }

    fn delete_orphan(&self, entry: &StorageEntry, events: Option<&Sender<SyncEvent>>) -> RunOutcome {
        match self.output.delete(&entry.path) {
            Ok(()) => {
                debug!("Deleted orphan {}", entry.path);
                emit(
                    events,
                    SyncEvent::Deleted {
                        path: entry.path.clone(),
                    },
                );
                RunOutcome::deleted(entry.path.clone())
            }
            Err(e) => item_failed(&entry.path, format!("delete: {}", e), e.is_retryable(), events),
        }
    }

    fn generate(
        &self,
        item: &PlannedItem,
        provider: &dyn StyleProvider,
        events: Option<&Sender<SyncEvent>>,
    ) -> RunOutcome {
        let artifact = &item.artifact;
        let path = artifact.output_path.as_str();

        let source_bytes = match self.source.read(&artifact.source.path) {
            Ok(b) => b,
            Err(e) => {
                return item_failed(
                    path,
                    format!("reading source {}: {}", artifact.source.path, e),
                    e.is_retryable(),
                    events,
                );
            }
        };

        let (data, kind) = match (&artifact.kind, &artifact.style) {
            (ArtifactKind::Original, _) => (source_bytes, OutcomeKind::Copied),
            (ArtifactKind::Styled { .. }, Some(style)) => {
                match provider.transform(&source_bytes, &artifact.source.path, style) {
                    Ok(bytes) => (bytes, OutcomeKind::Generated),
                    Err(e) => {
                        return item_failed(
                            path,
                            format!("provider {}: {}", provider.name(), e),
                            e.retryable,
                            events,
                        );
                    }
                }
            }
            (ArtifactKind::Styled { name }, None) => {
                return item_failed(path, format!("style '{}' not resolved", name), false, events);
            }
        };

        if let Err(e) = self.output.write(path, &data) {
            return item_failed(path, format!("write: {}", e), e.is_retryable(), events);
        }

        debug!("{} {} ({:?})", label_verb(kind), path, item.reason);
        emit(
            events,
            SyncEvent::Written {
                path: path.to_string(),
                label: artifact.kind.label().to_string(),
                kind,
                reason: item.reason,
            },
        );
        match kind {
            OutcomeKind::Copied => RunOutcome::copied(path),
            _ => RunOutcome::generated(path),
        }
    }
}

fn label_verb(kind: OutcomeKind) -> &'static str {
    match kind {
        OutcomeKind::Copied => "Copied",
        _ => "Generated",
    }
}

fn emit(events: Option<&Sender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = events {
        // A closed receiver only means nobody is watching.
        let _ = tx.send(event);
    }
}

fn item_failed(
    path: &str,
    reason: String,
    retryable: bool,
    events: Option<&Sender<SyncEvent>>,
) -> RunOutcome {
    warn!("{}: {}", path, reason);
    emit(
        events,
        SyncEvent::Failed {
            path: path.to_string(),
            reason: reason.clone(),
            retryable,
        },
    );
    RunOutcome::failed(path, reason, retryable)
}

/// Run one item, turning a panic into a failed outcome for `path`.
fn guarded(
    path: &str,
    events: Option<&Sender<SyncEvent>>,
    work: impl FnOnce() -> RunOutcome,
) -> RunOutcome {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(outcome) => outcome,
        Err(payload) => item_failed(
            path,
            format!("panicked: {}", panic_message(payload.as_ref())),
            false,
            events,
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn not_started(path: &str, events: Option<&Sender<SyncEvent>>) -> RunOutcome {
    debug!("{}: {}", path, CANCELLED_REASON);
    emit(
        events,
        SyncEvent::Failed {
            path: path.to_string(),
            reason: CANCELLED_REASON.to_string(),
            retryable: true,
        },
    );
    RunOutcome::failed(path, CANCELLED_REASON, true)
}
