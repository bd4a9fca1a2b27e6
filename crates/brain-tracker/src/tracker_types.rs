//! Typed tracker payloads, issue identifiers, and the tracker error taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remote state types after which a ledger line is no longer tracked as open.
const TERMINAL_STATE_TYPES: &[&str] = &["completed", "canceled"];

/// Returns true when `state_type` means the remote work is finished or abandoned.
pub fn is_terminal_state_type(state_type: &str) -> bool {
    let normalized = state_type.trim().to_ascii_lowercase();
    TERMINAL_STATE_TYPES.contains(&normalized.as_str())
}

/// Failures surfaced by the tracker client.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker credential is not configured")]
    MissingCredential,
    #[error("invalid issue identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("Team \"{0}\" not found")]
    TeamNotFound(String),
    #[error("{0}")]
    Graphql(String),
    #[error("tracker api {operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("tracker api {operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode tracker {operation}: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

/// `TEAM-123` style reference to a tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueIdentifier {
    pub team_key: String,
    pub number: u64,
}

impl IssueIdentifier {
    pub fn parse(raw: &str) -> Result<Self, TrackerError> {
        let trimmed = raw.trim();
        let invalid = || TrackerError::InvalidIdentifier(trimmed.to_string());
        let (team_key, number) = trimmed.rsplit_once('-').ok_or_else(invalid)?;
        if team_key.is_empty()
            || !team_key
                .chars()
                .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
        {
            return Err(invalid());
        }
        let number = number.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self {
            team_key: team_key.to_string(),
            number,
        })
    }
}

impl fmt::Display for IssueIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.team_key, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerIssueState {
    pub name: String,
    #[serde(rename = "type")]
    pub state_type: String,
}

impl TrackerIssueState {
    pub fn is_terminal(&self) -> bool {
        is_terminal_state_type(&self.state_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerAssignee {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerIssue {
    pub id: String,
    pub identifier: String,
    pub title: String,
    pub state: TrackerIssueState,
    #[serde(default)]
    pub assignee: Option<TrackerAssignee>,
}

/// Issue returned by a successful `issueCreate` mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub id: String,
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}
