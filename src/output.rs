//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Styles (naming: style-folder)
//! 01 anime → anime/
//!     Prompt: Redraw this photo as a hand-painted anime still
//!     Strength: 0.6
//! 02 sketch → sketch/ (disabled)
//! ```
//!
//! ## Plan
//!
//! ```text
//! Generate (3)
//!     anime/a.jpg (missing)
//!     anime/b.jpg (stale)
//!     original/a.jpg (missing)
//! Delete (1)
//!     watercolor/a.jpg
//! Skip (4)
//! ```
//!
//! ## Sync
//!
//! One line per finished item while the run progresses, then the summary:
//!
//! ```text
//! deleted   watercolor/a.jpg
//! copied    original/a.jpg
//! generated anime/a.jpg [anime, stale]
//! failed    anime/b.jpg: provider stylize: timeout (retryable)
//!
//! partial: 1 generated, 1 copied, 4 skipped, 1 deleted, 1 failed
//! Failed
//!     anime/b.jpg: provider stylize: timeout (retryable)
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::naming::{self, NamingPolicy};
use crate::reconcile::{GenerateReason, ReconciliationPlan, SyncEvent};
use crate::report::{OutcomeKind, Summary};
use crate::styles::StyleRegistry;

fn reason_str(reason: GenerateReason) -> &'static str {
    match reason {
        GenerateReason::Missing => "missing",
        GenerateReason::Stale => "stale",
    }
}

fn retry_str(retryable: bool) -> &'static str {
    if retryable { "retryable" } else { "permanent" }
}

fn policy_str(policy: NamingPolicy) -> &'static str {
    match policy {
        NamingPolicy::StyleFolder => "style-folder",
        NamingPolicy::IndexSuffix => "index-suffix",
    }
}

// ============================================================================
// Check output
// ============================================================================

/// Format the validated style registry.
pub fn format_styles(registry: &StyleRegistry, policy: NamingPolicy) -> Vec<String> {
    let mut lines = vec![format!("Styles (naming: {})", policy_str(policy))];
    for (style, enabled) in registry.all() {
        let target = match policy {
            NamingPolicy::StyleFolder => format!("{}/", style.slug),
            NamingPolicy::IndexSuffix => {
                naming::styled_path(policy, &style.slug, &style.index, "*.*")
            }
        };
        let header = format!("{} {} \u{2192} {}", style.index, style.name, target);
        if enabled {
            lines.push(header);
            lines.push(format!("    Prompt: {}", style.prompt));
            lines.push(format!("    Strength: {}", style.strength));
        } else {
            lines.push(format!("{} (disabled)", header));
        }
    }
    lines
}

pub fn print_styles(registry: &StyleRegistry, policy: NamingPolicy) {
    for line in format_styles(registry, policy) {
        println!("{}", line);
    }
}

// ============================================================================
// Plan output
// ============================================================================

/// Format a reconciliation plan.
///
/// Generations and deletions are listed by path; skips only by count, since
/// on a synced tree they are everything.
pub fn format_plan(plan: &ReconciliationPlan) -> Vec<String> {
    let mut lines = Vec::new();

    if !plan.to_generate.is_empty() {
        lines.push(format!("Generate ({})", plan.to_generate.len()));
        for item in &plan.to_generate {
            lines.push(format!(
                "    {} ({})",
                item.artifact.output_path,
                reason_str(item.reason)
            ));
        }
    }
    if !plan.to_delete.is_empty() {
        lines.push(format!("Delete ({})", plan.to_delete.len()));
        for entry in &plan.to_delete {
            lines.push(format!("    {}", entry.path));
        }
    }
    if !plan.to_skip.is_empty() {
        lines.push(format!("Skip ({})", plan.to_skip.len()));
    }
    if plan.is_noop() {
        lines.push("Output is in sync".to_string());
    }
    lines
}

pub fn print_plan(plan: &ReconciliationPlan) {
    for line in format_plan(plan) {
        println!("{}", line);
    }
}

// ============================================================================
// Sync output
// ============================================================================

/// Format a single progress event.
pub fn format_sync_event(event: &SyncEvent) -> Vec<String> {
    match event {
        SyncEvent::Deleted { path } => vec![format!("deleted   {}", path)],
        SyncEvent::Written {
            path,
            label,
            kind,
            reason,
        } => match kind {
            OutcomeKind::Copied => vec![format!("copied    {}", path)],
            _ => vec![format!(
                "generated {} [{}, {}]",
                path,
                label,
                reason_str(*reason)
            )],
        },
        SyncEvent::Failed {
            path,
            reason,
            retryable,
        } => vec![format!(
            "failed    {}: {} ({})",
            path,
            reason,
            retry_str(*retryable)
        )],
    }
}

/// Format the end-of-run summary: one count line, then every failure.
pub fn format_summary(summary: &Summary) -> Vec<String> {
    let mut lines = vec![summary.to_string()];
    if !summary.failed.is_empty() {
        lines.push("Failed".to_string());
        for item in &summary.failed {
            lines.push(format!(
                "    {}: {} ({})",
                item.path,
                item.reason,
                retry_str(item.retryable)
            ));
        }
    }
    lines
}

pub fn print_summary(summary: &Summary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}
