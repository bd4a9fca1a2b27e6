//! Commitment-ledger reconciliation against the remote issue tracker.
//!
//! The ledger is a flat markdown document whose lines may carry
//! `@tracker:TEAM-123` tags. This crate scans those tags, asks the tracker
//! about them (poll path) or accepts pushed state (webhook path), and marks
//! ledger lines completed once the remote issue reaches a terminal state.

pub mod ledger;
pub mod ledger_mutator;
pub mod ledger_tags;
pub mod poll_scheduler;
pub mod reconcile;
pub mod tracker_client;
mod tracker_retry;
pub mod tracker_types;

pub use ledger::{CompletionOutcome, Ledger};
pub use ledger_mutator::{mark_completed, rewrite_lines_completed, CHECKED_MARKER};
pub use ledger_tags::{scan_ledger, scan_ledger_text, LedgerTag, OPEN_MARKER, TRACKER_TAG_PREFIX};
pub use poll_scheduler::{start_poll_scheduler, PollSchedulerHandle};
pub use reconcile::{
    LedgerChange, LedgerChangeKind, ReconcileEngine, WebhookEvent, WebhookOutcome,
    DEFAULT_SOURCE_LABEL,
};
pub use tracker_client::{IssueTracker, TrackerClient, TrackerClientConfig, DEFAULT_TRACKER_API_URL};
pub use tracker_types::{
    is_terminal_state_type, CreatedIssue, IssueIdentifier, TrackerAssignee, TrackerError,
    TrackerIssue, TrackerIssueState,
};
