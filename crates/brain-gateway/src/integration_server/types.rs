use serde::Deserialize;

use super::*;

#[derive(Debug, Clone)]
pub(super) struct IntegrationApiError {
    pub(super) status: StatusCode,
    pub(super) message: String,
}

impl IntegrationApiError {
    pub(super) fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(super) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub(super) fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub(super) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for IntegrationApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Body of `POST /integration/create`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct CreateIssueRequest {
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl CreateIssueRequest {
    pub(super) fn team(&self) -> Option<&str> {
        non_blank(&self.team)
    }

    pub(super) fn title(&self) -> Option<&str> {
        non_blank(&self.title)
    }

    pub(super) fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }
}
