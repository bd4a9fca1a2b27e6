//! Line-level completion edits against the ledger document.

use std::path::Path;

use anyhow::{Context, Result};
use brain_core::{iso_date, write_text_atomic};
use chrono::Utc;

use crate::ledger_tags::{is_open_line, OPEN_MARKER};

pub const CHECKED_MARKER: &str = "- [x]";

fn completion_annotation(source_label: &str, completed_on: &str) -> String {
    format!(" (completed via {source_label} {completed_on})")
}

/// Rewrites one open line as completed. Returns `None` when the line is not open.
fn rewrite_line(line: &str, source_label: &str, completed_on: &str) -> Option<String> {
    if !is_open_line(line) {
        return None;
    }
    let (body, line_ending) = match line.strip_suffix('\r') {
        Some(body) => (body, "\r"),
        None => (line, ""),
    };
    let indent_len = body.len() - body.trim_start().len();
    let (indent, rest) = body.split_at(indent_len);
    let remainder = rest.strip_prefix(OPEN_MARKER)?;
    Some(format!(
        "{indent}{CHECKED_MARKER}{remainder}{}{line_ending}",
        completion_annotation(source_label, completed_on)
    ))
}

/// Marks each listed line completed in `content`.
///
/// Lines that are out of range or no longer open are left untouched, so
/// re-applying the same edit to an already rewritten document is a no-op.
/// Returns the new document and the indexes that actually changed.
pub fn rewrite_lines_completed(
    content: &str,
    line_indexes: &[usize],
    source_label: &str,
    completed_on: &str,
) -> (String, Vec<usize>) {
    let mut lines = content.split('\n').map(str::to_string).collect::<Vec<_>>();
    let mut changed = Vec::new();
    for &index in line_indexes {
        let Some(line) = lines.get_mut(index) else {
            continue;
        };
        if let Some(rewritten) = rewrite_line(line, source_label, completed_on) {
            *line = rewritten;
            changed.push(index);
        }
    }
    (lines.join("\n"), changed)
}

/// Re-reads the ledger, marks `line_index` completed, and writes the whole document back.
///
/// Returns `false` without writing when the line is missing or no longer open.
pub fn mark_completed(path: &Path, line_index: usize, source_label: &str) -> Result<bool> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read ledger {}", path.display()))?;
    let completed_on = iso_date(Utc::now());
    let (updated, changed) =
        rewrite_lines_completed(&content, &[line_index], source_label, &completed_on);
    if changed.is_empty() {
        return Ok(false);
    }
    write_text_atomic(path, &updated)
        .with_context(|| format!("failed to write ledger {}", path.display()))?;
    Ok(true)
}
