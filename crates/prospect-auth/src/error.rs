use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    // Files
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Client secrets in {0} have no 'installed' or 'web' section")]
    MissingClientSection(PathBuf),

    // Provider
    #[error("Invalid authorization endpoint {url}: {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("Token request failed: {0}")]
    TokenRequest(String),

    #[error("Token endpoint rejected the request ({status}): {body}")]
    TokenRejected { status: u16, body: String },

    // Callback listener
    #[error("Failed to bind OAuth callback listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("OAuth callback listener stopped before a code arrived")]
    ListenerClosed,

    #[error("OAuth flow timed out after {waited:?}")]
    Timeout { waited: Duration },

    #[error("Failed to open browser: {0}")]
    Browser(String),
}
