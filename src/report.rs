//! Run outcomes and their summary.
//!
//! Every item the reconciler touches produces exactly one [`RunOutcome`].
//! [`aggregate`] folds those into a [`Summary`]: counts and sorted path lists
//! per outcome kind, plus failure reasons. It is pure, so the summary of a
//! run is fully determined by its outcomes.
//!
//! The summary serializes to the JSON shape callers of the sync function
//! consume. Run metadata ([`RunInfo`]) sits at the top level next to the
//! outcome lists:
//!
//! ```json
//! {
//!   "source": "/home/me/images",
//!   "output": "/home/me/styled",
//!   "started_at": "2026-10-19T09:30:00.123456Z",
//!   "duration_ms": 5120,
//!   "sources_found": 2,
//!   "expected": 6,
//!   "status": "partial",
//!   "counts": { "processed": 3, "copied": 2, "skipped": 0, "deleted": 1, "failed": 1 },
//!   "processed": ["anime/a.jpg", "anime/b.jpg", "sketch/a.jpg"],
//!   "copied": ["original/a.jpg", "original/b.jpg"],
//!   "skipped": [],
//!   "deleted": ["watercolor/a.jpg"],
//!   "failed": [{ "path": "sketch/b.jpg", "reason": "provider timeout", "retryable": true }]
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Styled artifact written from provider output.
    Generated,
    /// Original mirror written from source bytes.
    Copied,
    Skipped,
    Deleted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub reason: String,
    /// Whether repeating the run might fix it.
    pub retryable: bool,
}

/// Result of one item in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    /// Output-root-relative path of the artifact.
    pub path: String,
    pub kind: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl RunOutcome {
    fn ok(path: impl Into<String>, kind: OutcomeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            error: None,
        }
    }

    pub fn generated(path: impl Into<String>) -> Self {
        Self::ok(path, OutcomeKind::Generated)
    }

    pub fn copied(path: impl Into<String>) -> Self {
        Self::ok(path, OutcomeKind::Copied)
    }

    pub fn skipped(path: impl Into<String>) -> Self {
        Self::ok(path, OutcomeKind::Skipped)
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self::ok(path, OutcomeKind::Deleted)
    }

    pub fn failed(path: impl Into<String>, reason: impl Into<String>, retryable: bool) -> Self {
        Self {
            path: path.into(),
            kind: OutcomeKind::Failed,
            error: Some(ItemError {
                reason: reason.into(),
                retryable,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every item succeeded.
    Completed,
    /// At least one item failed.
    Partial,
    /// Cancellation or timeout stopped the run before all items started.
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Completed => "completed",
            RunStatus::Partial => "partial",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub path: String,
    pub reason: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    #[serde(rename = "processed")]
    pub generated: usize,
    pub copied: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl Counts {
    pub fn total(&self) -> usize {
        self.generated + self.copied + self.skipped + self.deleted + self.failed
    }
}

/// Which roots a run covered, when it ran and how big it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunInfo {
    /// Source root, as described by its storage adapter.
    pub source: String,
    pub output: String,
    /// When execution of the plan began.
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub sources_found: usize,
    /// Expected artifacts: one per source per enabled style, plus mirrors.
    pub expected: usize,
}

/// Aggregated result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    #[serde(flatten)]
    pub run: RunInfo,
    pub status: RunStatus,
    pub counts: Counts,
    #[serde(rename = "processed")]
    pub generated: Vec<String>,
    pub copied: Vec<String>,
    pub skipped: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<FailedItem>,
}

impl Summary {
    /// Whether the output now matches the expected state.
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        write!(
            f,
            "{}: {} generated, {} copied, {} skipped, {} deleted, {} failed",
            self.status, c.generated, c.copied, c.skipped, c.deleted, c.failed
        )
    }
}

/// Fold outcomes into a summary.
///
/// `cancelled` is whether cancellation or the run timeout stopped new items
/// from starting; it takes precedence over `partial`.
pub fn aggregate(outcomes: &[RunOutcome], cancelled: bool, run: RunInfo) -> Summary {
    let mut generated = Vec::new();
    let mut copied = Vec::new();
    let mut skipped = Vec::new();
    let mut deleted = Vec::new();
    let mut failed = Vec::new();

    for outcome in outcomes {
        let path = outcome.path.clone();
        match outcome.kind {
            OutcomeKind::Generated => generated.push(path),
            OutcomeKind::Copied => copied.push(path),
            OutcomeKind::Skipped => skipped.push(path),
            OutcomeKind::Deleted => deleted.push(path),
            OutcomeKind::Failed => {
                let (reason, retryable) = match &outcome.error {
                    Some(e) => (e.reason.clone(), e.retryable),
                    None => ("unknown error".to_string(), false),
                };
                failed.push(FailedItem {
                    path,
                    reason,
                    retryable,
                });
            }
        }
    }

    generated.sort();
    copied.sort();
    skipped.sort();
    deleted.sort();
    failed.sort_by(|a, b| a.path.cmp(&b.path));

    let status = if cancelled {
        RunStatus::Cancelled
    } else if failed.is_empty() {
        RunStatus::Completed
    } else {
        RunStatus::Partial
    };

    Summary {
        run,
        status,
        counts: Counts {
            generated: generated.len(),
            copied: copied.len(),
            skipped: skipped.len(),
            deleted: deleted.len(),
            failed: failed.len(),
        },
        generated,
        copied,
        skipped,
        deleted,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::run_info;

    #[test]
    fn empty_run_is_completed() {
        let summary = aggregate(&[], false, run_info());
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.counts.total(), 0);
    }

    #[test]
    fn buckets_and_sorts_by_kind() {
        let outcomes = vec![
            RunOutcome::generated("sketch/a.jpg"),
            RunOutcome::generated("anime/a.jpg"),
            RunOutcome::copied("original/a.jpg"),
            RunOutcome::skipped("anime/b.jpg"),
            RunOutcome::deleted("watercolor/a.jpg"),
        ];
        let summary = aggregate(&outcomes, false, run_info());
        assert_eq!(summary.generated, vec!["anime/a.jpg", "sketch/a.jpg"]);
        assert_eq!(summary.copied, vec!["original/a.jpg"]);
        assert_eq!(summary.skipped, vec!["anime/b.jpg"]);
        assert_eq!(summary.deleted, vec!["watercolor/a.jpg"]);
        assert_eq!(summary.counts.total(), 5);
        assert!(summary.is_complete());
    }

    #[test]
    fn any_failure_makes_partial() {
        let outcomes = vec![
            RunOutcome::generated("anime/a.jpg"),
            RunOutcome::failed("anime/b.jpg", "provider timeout", true),
        ];
        let summary = aggregate(&outcomes, false, run_info());
        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(
            summary.failed,
            vec![FailedItem {
                path: "anime/b.jpg".into(),
                reason: "provider timeout".into(),
                retryable: true,
            }]
        );
    }

    #[test]
    fn cancelled_takes_precedence() {
        let outcomes = vec![RunOutcome::failed("anime/a.jpg", "cancelled before start", true)];
        assert_eq!(aggregate(&outcomes, true, run_info()).status, RunStatus::Cancelled);
    }

    #[test]
    fn json_uses_processed_for_generated() {
        let mut run = run_info();
        run.duration_ms = 1500;
        let summary = aggregate(&[RunOutcome::generated("anime/a.jpg")], false, run);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["processed"][0], "anime/a.jpg");
        assert_eq!(json["counts"]["processed"], 1);
        assert!(json.get("generated").is_none());

        assert_eq!(json["source"], "memory:source");
        assert_eq!(json["output"], "memory:output");
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["sources_found"], 1);
        assert_eq!(json["expected"], 2);
        let started: DateTime<Utc> = json["started_at"].as_str().unwrap().parse().unwrap();
        assert_eq!(started, summary.run.started_at);
    }

    #[test]
    fn display_lists_counts() {
        let summary = aggregate(
            &[
                RunOutcome::generated("a"),
                RunOutcome::skipped("b"),
                RunOutcome::failed("c", "x", false),
            ],
            false,
            run_info(),
        );
        assert_eq!(
            summary.to_string(),
            "partial: 1 generated, 0 copied, 1 skipped, 0 deleted, 1 failed"
        );
    }
}
