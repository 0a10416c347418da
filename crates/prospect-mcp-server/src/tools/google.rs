//! Shared plumbing for the session-gated Gmail and Calendar tools.

use prospect_common::{HttpClient, HttpRequest};
use prospect_dispatch::{Session, ToolError, DEFAULT_IDENTITY_FIELD};
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Authorized JSON calls against the Google REST APIs.
#[derive(Clone)]
pub struct GoogleApi {
    http: Arc<dyn HttpClient>,
    gmail_base: String,
    calendar_base: String,
}

impl GoogleApi {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            gmail_base: GMAIL_API_BASE.to_string(),
            calendar_base: CALENDAR_API_BASE.to_string(),
        }
    }

    pub fn gmail_url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<String, ToolError> {
        endpoint(&self.gmail_base, segments, query)
    }

    pub fn calendar_url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<String, ToolError> {
        endpoint(&self.calendar_base, segments, query)
    }

    /// Send `request` with the session's bearer token. Non-2xx statuses
    /// become [`ToolError::Upstream`]; an empty body comes back as `Null`.
    pub async fn send(&self, session: &Session, request: HttpRequest) -> Result<Value, ToolError> {
        let response = self
            .http
            .request(request.bearer(&session.access_token))
            .await?;

        if !response.is_success() {
            tracing::warn!(
                identity = %session.identity,
                status = response.status,
                "Google API call rejected"
            );
            return Err(ToolError::Upstream {
                status: response.status,
                body: response.text(),
            });
        }

        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(response.json()?)
    }
}

/// Append percent-encoded path segments and query pairs to `base`.
fn endpoint(base: &str, segments: &[&str], query: &[(&str, String)]) -> Result<String, ToolError> {
    let mut url = Url::parse(base).map_err(|e| ToolError::Internal(format!("Bad API base {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ToolError::Internal(format!("API base {base} cannot take a path")))?
        .extend(segments);
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())));
    }
    Ok(url.into())
}

/// Input schema for a gated tool: `properties` plus the required identity
/// argument.
pub fn user_scoped_schema(properties: Value, required: &[&str]) -> Value {
    let mut properties = match properties {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    properties.insert(
        DEFAULT_IDENTITY_FIELD.to_string(),
        json!({
            "type": "string",
            "description": "The EMAIL of the Google account for which you are executing this action."
        }),
    );

    let mut required_fields = vec![DEFAULT_IDENTITY_FIELD];
    required_fields.extend_from_slice(required);

    json!({
        "type": "object",
        "properties": properties,
        "required": required_fields,
    })
}
