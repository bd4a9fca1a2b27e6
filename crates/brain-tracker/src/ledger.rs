//! Shared handle to the commitment ledger with a single-writer guard.
//!
//! Both reconciliation paths (scheduled poll and inbound webhook) mutate the
//! same flat document. Every mutation takes `write_lock`, re-reads the file,
//! re-resolves the target line by identifier, and only then rewrites it.
//! Remote queries never run while the lock is held.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use brain_core::{iso_date, write_text_atomic};
use chrono::Utc;
use tokio::sync::Mutex;

use crate::ledger_mutator::rewrite_lines_completed;
use crate::ledger_tags::{scan_ledger_text, LedgerTag};

/// Result of asking the ledger to complete every open line for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed { line_indexes: Vec<usize> },
    AlreadyCompleted,
    NotTracked,
    /// Tagged lines exist but none carries an open checkbox to rewrite.
    MarkerMissing,
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Current document text, or `None` when the ledger does not exist yet.
    async fn read(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error)
                .with_context(|| format!("failed to read ledger {}", self.path.display())),
        }
    }

    pub async fn scan(&self) -> Result<Vec<LedgerTag>> {
        Ok(self
            .read()
            .await?
            .map(|content| scan_ledger_text(&content))
            .unwrap_or_default())
    }

    /// Tags whose line is still open; completed tags never become candidates.
    pub async fn open_tags(&self) -> Result<Vec<LedgerTag>> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .filter(|tag| !tag.is_completed)
            .collect())
    }

    /// Marks every open line tagged with `identifier` as completed.
    pub async fn complete_if_open(
        &self,
        identifier: &str,
        source_label: &str,
    ) -> Result<CompletionOutcome> {
        let _guard = self.write_lock.lock().await;
        let Some(content) = self.read().await? else {
            return Ok(CompletionOutcome::NotTracked);
        };
        let matching = scan_ledger_text(&content)
            .into_iter()
            .filter(|tag| tag.remote_identifier == identifier)
            .collect::<Vec<_>>();
        if matching.is_empty() {
            return Ok(CompletionOutcome::NotTracked);
        }
        let open_indexes = matching
            .iter()
            .filter(|tag| !tag.is_completed)
            .map(|tag| tag.line_index)
            .collect::<Vec<_>>();
        if open_indexes.is_empty() {
            return Ok(CompletionOutcome::AlreadyCompleted);
        }

        let completed_on = iso_date(Utc::now());
        let (updated, changed) =
            rewrite_lines_completed(&content, &open_indexes, source_label, &completed_on);
        if changed.is_empty() {
            return Ok(CompletionOutcome::MarkerMissing);
        }
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_text_atomic(&path, &updated))
            .await
            .context("ledger write task failed")?
            .with_context(|| format!("failed to write ledger {}", self.path.display()))?;
        tracing::info!(
            identifier,
            lines = ?changed,
            ledger = %self.path.display(),
            "ledger commitment marked completed"
        );
        Ok(CompletionOutcome::Completed {
            line_indexes: changed,
        })
    }
}
