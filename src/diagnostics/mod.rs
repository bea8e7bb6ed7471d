//! Markdown debug dump of a discovery pass.
//!
//! Meant for a human chasing a filter or enrichment mismatch; the layout is
//! not a stable machine format.

use crate::discovery::WindowSnapshot;
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// Render `snapshots` grouped by owning process, every field listed
pub fn render_report(snapshots: &[WindowSnapshot], generated_at: DateTime<Utc>) -> Result<String> {
    let mut by_process: BTreeMap<i32, Vec<&WindowSnapshot>> = BTreeMap::new();
    for snapshot in snapshots {
        by_process.entry(snapshot.pid).or_default().push(snapshot);
    }

    let mut out = String::new();
    writeln!(out, "# WinScout window dump")?;
    writeln!(out)?;
    writeln!(out, "- Generated: {}", generated_at.to_rfc3339())?;
    writeln!(out, "- Windows: {}", snapshots.len())?;
    writeln!(out, "- Processes: {}", by_process.len())?;

    for (pid, windows) in &by_process {
        let first = windows[0];
        writeln!(out)?;
        writeln!(
            out,
            "## {} (pid {}, {})",
            first.app_name,
            pid,
            first.bundle_id.as_deref().unwrap_or("no bundle id")
        )?;

        for window in windows {
            writeln!(out)?;
            writeln!(out, "### Window {}", window.window_id)?;
            writeln!(out)?;
            writeln!(out, "| Field | Value |")?;
            writeln!(out, "|-------|-------|")?;

            let fields = serde_json::to_value(window).context("failed to serialize snapshot")?;
            if let Value::Object(map) = fields {
                for (field, value) in map {
                    writeln!(out, "| {} | {} |", field, cell(&value))?;
                }
            }
        }
    }

    Ok(out)
}

/// Write a timestamped report into `dir`, creating it when missing
pub fn write_dump(dir: &Path, snapshots: &[WindowSnapshot]) -> Result<PathBuf> {
    let now = Utc::now();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create dump directory {}", dir.display()))?;

    let path = dir.join(format!("windows-{}.md", now.format("%Y%m%d-%H%M%S%.3f")));
    let report = render_report(snapshots, now)?;
    std::fs::write(&path, report)
        .with_context(|| format!("failed to write dump {}", path.display()))?;

    info!(path = %path.display(), windows = snapshots.len(), "Wrote debug dump");
    Ok(path)
}

fn cell(value: &Value) -> String {
    let text = match value {
        Value::Null => "-".to_string(),
        Value::String(text) if text.is_empty() => "\"\"".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}
