//! Reconciliation engine: converges ledger lines with remote issue state.
//!
//! A ledger line is rewritten to completed only when it is open locally and
//! the remote state is terminal. The poll path asks the tracker; the webhook
//! path trusts the pushed state. Both funnel through `Ledger::complete_if_open`.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::ledger::{CompletionOutcome, Ledger};
use crate::tracker_client::IssueTracker;
use crate::tracker_types::{is_terminal_state_type, IssueIdentifier};

pub const DEFAULT_SOURCE_LABEL: &str = "Linear";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerChangeKind {
    Completed,
}

/// Change record reported by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerChange {
    #[serde(rename = "type")]
    pub kind: LedgerChangeKind,
    pub identifier: String,
    pub title: String,
    pub state: String,
}

/// Issue event pushed by the tracker's webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub identifier: String,
    pub title: Option<String>,
    pub state_name: Option<String>,
    pub state_type: Option<String>,
}

impl WebhookEvent {
    /// Extracts an issue event from a `{ type, data }` payload.
    ///
    /// Returns `None` for non-issue events or payloads without a usable identifier.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        if payload.get("type").and_then(Value::as_str) != Some("Issue") {
            return None;
        }
        let data = payload.get("data").filter(|data| data.is_object())?;
        let identifier = data
            .get("identifier")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .or_else(|| {
                let team_key = data.pointer("/team/key").and_then(Value::as_str)?;
                let number = data.get("number").and_then(Value::as_u64)?;
                Some(format!("{team_key}-{number}"))
            })?;
        let text = |pointer: &str| {
            data.pointer(pointer)
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        };
        Some(Self {
            identifier,
            title: text("/title"),
            state_name: text("/state/name"),
            state_type: text("/state/type"),
        })
    }

    fn is_terminal(&self) -> bool {
        self.state_type
            .as_deref()
            .is_some_and(is_terminal_state_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Ignored,
    NotTerminal,
    Untracked,
    AlreadyCompleted,
    MarkerMissing,
    Completed(LedgerChange),
}

pub struct ReconcileEngine {
    tracker: Arc<dyn IssueTracker>,
    ledger: Arc<Ledger>,
    source_label: String,
}

impl ReconcileEngine {
    pub fn new(tracker: Arc<dyn IssueTracker>, ledger: Arc<Ledger>) -> Self {
        Self {
            tracker,
            ledger,
            source_label: DEFAULT_SOURCE_LABEL.to_string(),
        }
    }

    pub fn with_source_label(mut self, source_label: impl Into<String>) -> Self {
        self.source_label = source_label.into();
        self
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn tracker(&self) -> &Arc<dyn IssueTracker> {
        &self.tracker
    }

    /// Poll path: queries every open tag and completes lines whose issue is terminal.
    ///
    /// Per-tag failures are logged and skipped. Only a failure to read the
    /// ledger itself aborts the pass.
    pub async fn reconcile_all(&self) -> Result<Vec<LedgerChange>> {
        if !self.tracker.is_configured() {
            return Ok(Vec::new());
        }

        let open_tags = self.ledger.open_tags().await?;
        let mut seen = HashSet::new();
        let mut changes = Vec::new();
        for tag in open_tags {
            if !seen.insert(tag.remote_identifier.clone()) {
                continue;
            }
            let identifier = match IssueIdentifier::parse(&tag.remote_identifier) {
                Ok(identifier) => identifier,
                Err(error) => {
                    tracing::warn!(identifier = %tag.remote_identifier, %error, "skipping ledger tag");
                    continue;
                }
            };

            let issue = match self.tracker.find_issue(&identifier).await {
                Ok(Some(issue)) => issue,
                Ok(None) => {
                    tracing::debug!(identifier = %identifier, "tracker issue not found");
                    continue;
                }
                Err(error) => {
                    tracing::warn!(identifier = %identifier, %error, "tracker sync query failed");
                    continue;
                }
            };
            if !issue.state.is_terminal() {
                continue;
            }

            match self
                .ledger
                .complete_if_open(&tag.remote_identifier, &self.source_label)
                .await
            {
                Ok(CompletionOutcome::Completed { .. }) => changes.push(LedgerChange {
                    kind: LedgerChangeKind::Completed,
                    identifier: tag.remote_identifier.clone(),
                    title: issue.title,
                    state: issue.state.name,
                }),
                Ok(outcome) => {
                    tracing::debug!(identifier = %identifier, ?outcome, "ledger line not rewritten");
                }
                Err(error) => {
                    tracing::warn!(identifier = %identifier, %error, "ledger update failed");
                }
            }
        }
        Ok(changes)
    }

    /// Push path: applies a webhook-delivered state without querying the tracker.
    pub async fn apply_webhook(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        if !event.is_terminal() {
            return Ok(WebhookOutcome::NotTerminal);
        }
        let outcome = self
            .ledger
            .complete_if_open(&event.identifier, &self.source_label)
            .await?;
        Ok(match outcome {
            CompletionOutcome::Completed { .. } => WebhookOutcome::Completed(LedgerChange {
                kind: LedgerChangeKind::Completed,
                identifier: event.identifier.clone(),
                title: event.title.clone().unwrap_or_default(),
                state: event
                    .state_name
                    .clone()
                    .or_else(|| event.state_type.clone())
                    .unwrap_or_default(),
            }),
            CompletionOutcome::AlreadyCompleted => WebhookOutcome::AlreadyCompleted,
            CompletionOutcome::NotTracked => WebhookOutcome::Untracked,
            CompletionOutcome::MarkerMissing => WebhookOutcome::MarkerMissing,
        })
    }

    /// Parses a raw webhook payload and applies it; unrecognised payloads are ignored.
    pub async fn apply_webhook_payload(&self, payload: &Value) -> Result<WebhookOutcome> {
        match WebhookEvent::from_payload(payload) {
            Some(event) => self.apply_webhook(&event).await,
            None => Ok(WebhookOutcome::Ignored),
        }
    }
}
