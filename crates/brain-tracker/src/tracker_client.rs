//! GraphQL client for the remote issue tracker.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tracker_retry::{clip_error_body, RetryPolicy};
use crate::tracker_types::{CreatedIssue, IssueIdentifier, TrackerError, TrackerIssue};

pub const DEFAULT_TRACKER_API_URL: &str = "https://api.linear.app/graphql";

const ISSUE_BY_ID_QUERY: &str = r#"
query($id: String!) {
  issue(id: $id) {
    id
    identifier
    title
    state { name type }
    assignee { name }
  }
}"#;

const FIND_ISSUE_QUERY: &str = r#"
query($filter: IssueFilter) {
  issues(filter: $filter, first: 1) {
    nodes {
      id
      identifier
      title
      state { name type }
      assignee { name }
    }
  }
}"#;

const FIND_TEAM_QUERY: &str = r#"
query($key: String!) {
  teams(filter: { key: { eq: $key } }) {
    nodes { id }
  }
}"#;

const CREATE_ISSUE_MUTATION: &str = r#"
mutation($input: IssueCreateInput!) {
  issueCreate(input: $input) {
    success
    issue { id identifier title url }
  }
}"#;

/// Operations the reconciliation engine and HTTP surface need from the tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// False when no credential is configured; callers treat that as "integration disabled".
    fn is_configured(&self) -> bool;

    async fn find_issue(
        &self,
        identifier: &IssueIdentifier,
    ) -> Result<Option<TrackerIssue>, TrackerError>;

    async fn create_issue(
        &self,
        team_key: &str,
        title: &str,
        description: &str,
    ) -> Result<CreatedIssue, TrackerError>;
}

#[derive(Debug, Clone)]
pub struct TrackerClientConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for TrackerClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_TRACKER_API_URL.to_string(),
            api_key: None,
            request_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphqlErrorMessage>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct NodeList<T> {
    nodes: Vec<T>,
}

#[derive(Clone)]
pub struct TrackerClient {
    http: reqwest::Client,
    api_url: String,
    configured: bool,
    retry: RetryPolicy,
}

impl TrackerClient {
    pub fn new(config: TrackerClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("brain-tracker-sync"),
        );
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        if let Some(api_key) = api_key {
            let mut auth_value = reqwest::header::HeaderValue::from_str(api_key)
                .context("invalid tracker authorization header")?;
            auth_value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, auth_value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create tracker api client")?;
        Ok(Self {
            http,
            api_url: config.api_url.trim().to_string(),
            configured: api_key.is_some(),
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay_ms),
        })
    }

    /// Fetches one issue by tracker id or human identifier.
    pub async fn issue_by_id(&self, id: &str) -> Result<Option<TrackerIssue>, TrackerError> {
        #[derive(Deserialize)]
        struct IssueData {
            issue: Option<TrackerIssue>,
        }

        let data: IssueData = self
            .graphql("issue lookup", ISSUE_BY_ID_QUERY, json!({ "id": id }))
            .await?;
        Ok(data.issue)
    }

    pub async fn find_team_id(&self, team_key: &str) -> Result<Option<String>, TrackerError> {
        #[derive(Deserialize)]
        struct TeamNode {
            id: String,
        }
        #[derive(Deserialize)]
        struct TeamsData {
            teams: NodeList<TeamNode>,
        }

        let data: TeamsData = self
            .graphql("team lookup", FIND_TEAM_QUERY, json!({ "key": team_key }))
            .await?;
        Ok(data.teams.nodes.into_iter().next().map(|team| team.id))
    }

    async fn graphql<T>(
        &self,
        operation: &'static str,
        query: &str,
        variables: Value,
    ) -> Result<T, TrackerError>
    where
        T: DeserializeOwned,
    {
        if !self.configured {
            return Err(TrackerError::MissingCredential);
        }
        let payload = json!({ "query": query, "variables": variables });
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = self
                .http
                .post(self.api_url.as_str())
                .header("x-brain-retry-attempt", attempt.saturating_sub(1).to_string())
                .json(&payload)
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let envelope = response
                            .json::<GraphqlEnvelope<T>>()
                            .await
                            .map_err(|error| TrackerError::Decode {
                                operation,
                                message: error.to_string(),
                            })?;
                        if let Some(first) = envelope.errors.and_then(|errors| errors.into_iter().next())
                        {
                            return Err(TrackerError::Graphql(first.message));
                        }
                        return envelope.data.ok_or_else(|| TrackerError::Decode {
                            operation,
                            message: "response carried no data".to_string(),
                        });
                    }

                    let headers = response.headers().clone();
                    let body = response.text().await.unwrap_or_default();
                    if let Some(delay) = self.retry.after_status(attempt, status, &headers, &body) {
                        tracing::debug!(
                            operation,
                            status = status.as_u16(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying tracker request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if let Some(message) = first_graphql_error_message(&body) {
                        return Err(TrackerError::Graphql(message));
                    }
                    return Err(TrackerError::Status {
                        operation,
                        status: status.as_u16(),
                        body: clip_error_body(&body),
                    });
                }
                Err(error) => {
                    if let Some(delay) = self.retry.after_transport_error(attempt, &error) {
                        tracing::debug!(operation, attempt, %error, "retrying tracker request");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(TrackerError::Transport {
                        operation,
                        source: error,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl IssueTracker for TrackerClient {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn find_issue(
        &self,
        identifier: &IssueIdentifier,
    ) -> Result<Option<TrackerIssue>, TrackerError> {
        #[derive(Deserialize)]
        struct IssuesData {
            issues: NodeList<TrackerIssue>,
        }

        let filter = json!({
            "number": { "eq": identifier.number },
            "team": { "key": { "eq": identifier.team_key } },
        });
        let data: IssuesData = self
            .graphql("issue search", FIND_ISSUE_QUERY, json!({ "filter": filter }))
            .await?;
        Ok(data.issues.nodes.into_iter().next())
    }

    async fn create_issue(
        &self,
        team_key: &str,
        title: &str,
        description: &str,
    ) -> Result<CreatedIssue, TrackerError> {
        #[derive(Deserialize)]
        struct IssueCreatePayload {
            issue: Option<CreatedIssue>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct IssueCreateData {
            issue_create: IssueCreatePayload,
        }

        let team_id = self
            .find_team_id(team_key)
            .await?
            .ok_or_else(|| TrackerError::TeamNotFound(team_key.to_string()))?;
        let input = json!({
            "teamId": team_id,
            "title": title,
            "description": description,
        });
        let data: IssueCreateData = self
            .graphql("issue create", CREATE_ISSUE_MUTATION, json!({ "input": input }))
            .await?;
        data.issue_create.issue.ok_or_else(|| TrackerError::Decode {
            operation: "issue create",
            message: "mutation returned no issue".to_string(),
        })
    }
}

fn first_graphql_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<Value>(body).ok()?;
    parsed
        .get("errors")?
        .as_array()?
        .first()?
        .get("message")?
        .as_str()
        .map(ToOwned::to_owned)
}
