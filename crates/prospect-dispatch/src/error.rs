use prospect_common::HttpError;
use std::time::Duration;
use thiserror::Error;

/// Failures of the authorization precondition. Each one is terminal for the
/// call that hit it and leaves the identity retryable on the next call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("Authorization timed out after {waited:?} waiting for the OAuth callback")]
    AuthorizationTimeout { waited: Duration },

    #[error("Authorization expired for {identity}: {reason}")]
    AuthorizationExpired { identity: String, reason: String },

    #[error("Authorization already in progress for {0}")]
    AuthorizationInProgress(String),

    #[error("Authorization failed for {identity}: {reason}")]
    AuthorizationFailed { identity: String, reason: String },

    #[error("Account for email: {0} is not configured")]
    UnknownIdentity(String),
}

/// Everything `Dispatcher::try_call` can report. The `Display` text is the
/// `errorMessage` clients see.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("arguments must be a JSON object")]
    InvalidArguments,

    #[error("{0} argument is missing")]
    MissingIdentity(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("Tool execution failed: {0}")]
    HandlerFailure(String),
}

/// Errors a tool handler reports back to the dispatcher.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("No authorized session available for this tool")]
    MissingSession,

    #[error("Upstream API returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::Internal(format!("JSON error: {e}"))
    }
}
