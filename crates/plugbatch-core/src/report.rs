//! Report rendering
//!
//! Plain-text and JSON renderings of batch and rollback reports, shared by
//! the CLI and anything that wants a notification body.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::Result;
use crate::domain::plugin::{BatchReport, ItemStatus};
use crate::domain::rollback::{BatchManifest, RollbackEntryStatus, RollbackReport};

fn status_marker(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Success => "ok",
        ItemStatus::Failed => "FAILED",
        ItemStatus::Incompatible => "incompatible",
    }
}

/// One line per item, its messages indented beneath, then the summary
pub fn render_batch_text(report: &BatchReport) -> String {
    let mut out = String::new();
    let title = if report.dry_run { "Dry run" } else { "Batch" };
    let _ = writeln!(out, "{} {}", title, report.batch_id);

    for result in &report.results {
        let version = match &result.previous_version {
            Some(previous) => format!("{} -> {}", previous, result.new_version),
            None => result.new_version.clone(),
        };
        let _ = writeln!(
            out,
            "  [{}] {} {} ({}){}",
            status_marker(result.status),
            result.action,
            result.slug,
            version,
            if result.activated { ", active" } else { "" }
        );
        for message in &result.messages {
            let _ = writeln!(out, "      {}", message);
        }
        if let Some(backup) = &result.backup {
            let _ = writeln!(out, "      backup: {}", backup);
        }
    }

    let s = &report.summary;
    let _ = write!(
        out,
        "Summary: {} total, {} installed, {} updated, {} failed, {} incompatible",
        s.total, s.installed, s.updated, s.failed, s.incompatible
    );
    out
}

/// Per-entry outcome of a rollback, then the overall verdict
pub fn render_rollback_text(report: &RollbackReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Rollback of batch {}", report.batch_id);

    for entry in &report.results {
        let marker = match entry.status {
            RollbackEntryStatus::Success => "ok",
            RollbackEntryStatus::Failed => "FAILED",
            RollbackEntryStatus::Skipped => "skipped",
        };
        let _ = writeln!(out, "  [{}] {}: {}", marker, entry.slug, entry.message);
    }

    if report.success {
        let _ = write!(out, "Rolled back {} item(s)", report.reverted());
    } else {
        let _ = write!(
            out,
            "Rollback incomplete: {} item(s) failed; the batch can be rolled back again",
            report.failures.len()
        );
    }
    out
}

/// Table of recorded batches
pub fn render_manifest_list(manifests: &[BatchManifest], now: DateTime<Utc>) -> String {
    if manifests.is_empty() {
        return "No batches available for rollback".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:<38} {:<20} {:>7} {:>10}", "BATCH", "CREATED", "ITEMS", "EXPIRES IN");
    for manifest in manifests {
        let _ = writeln!(
            out,
            "{:<38} {:<20} {:>7} {:>10}",
            manifest.batch_id,
            manifest.created_at.format("%Y-%m-%d %H:%M:%S"),
            manifest.entries.len(),
            manifest.display_remaining(now)
        );
    }
    out.trim_end().to_string()
}

/// Details of a single recorded batch
pub fn render_manifest(manifest: &BatchManifest, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Batch {}", manifest.batch_id);
    let _ = writeln!(
        out,
        "Created {} (expires in {})",
        manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        manifest.display_remaining(now)
    );
    for entry in &manifest.entries {
        let _ = write!(
            out,
            "  {} {} {} [{}]",
            entry.action, entry.slug, entry.new_version, entry.status
        );
        if let Some(backup) = &entry.backup {
            let _ = write!(out, " backup: {}", backup);
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Pretty JSON for any serializable report
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
