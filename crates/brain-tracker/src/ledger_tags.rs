//! Ledger tag index: derives tracker references from the commitment ledger.
//!
//! Tags are never cached. Every caller re-scans the document so line
//! positions always reflect the text as it is on disk right now.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

pub const TRACKER_TAG_PREFIX: &str = "@tracker:";
pub const OPEN_MARKER: &str = "- [ ]";

const CHECKED_MARKERS: &[&str] = &["- [x]", "- [X]"];

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"@tracker:([A-Z][A-Z0-9]*-\d+)").expect("valid tracker tag regex")
    })
}

/// One ledger line carrying a tracker reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerTag {
    pub remote_identifier: String,
    pub line_index: usize,
    pub is_completed: bool,
    pub raw_line: String,
}

/// Strips indentation and a trailing carriage return before marker checks.
pub(crate) fn marker_view(line: &str) -> &str {
    line.trim_end_matches('\r').trim_start()
}

pub fn is_completed_line(line: &str) -> bool {
    let view = marker_view(line);
    CHECKED_MARKERS.iter().any(|marker| view.starts_with(marker))
}

pub fn is_open_line(line: &str) -> bool {
    marker_view(line).starts_with(OPEN_MARKER)
}

/// Scans ledger text in document order.
pub fn scan_ledger_text(content: &str) -> Vec<LedgerTag> {
    content
        .split('\n')
        .enumerate()
        .filter_map(|(line_index, line)| {
            let captures = tag_pattern().captures(line)?;
            let identifier = captures.get(1)?.as_str().to_string();
            Some(LedgerTag {
                remote_identifier: identifier,
                line_index,
                is_completed: is_completed_line(line),
                raw_line: line.trim_end_matches('\r').to_string(),
            })
        })
        .collect()
}

/// Blocking scan for synchronous callers; a missing ledger yields no tags.
pub fn scan_ledger(path: &Path) -> Result<Vec<LedgerTag>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(scan_ledger_text(&content)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(error) => {
            Err(error).with_context(|| format!("failed to read ledger {}", path.display()))
        }
    }
}
