use prospect_common::fs_utils::atomic_write;
use prospect_dispatch::{ToolCall, ToolContent, ToolDescriptor, ToolError, ToolHandler};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex};
use thiserror::Error;

pub const DEFAULT_STORE_PATH: &str = "./url_tracking.json";
const MAX_DOCUMENT_ID_LEN: usize = 1500;

static SCHEME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://").unwrap());
static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9-]").unwrap());

/// Document id for a URL: scheme dropped, everything outside
/// `[A-Za-z0-9-]` replaced with `_`, capped at 1500 characters.
pub fn encode_url(url: &str) -> String {
    let without_scheme = SCHEME.replace(url, "");
    let cleaned = UNSAFE_CHARS.replace_all(&without_scheme, "_");
    cleaned.chars().take(MAX_DOCUMENT_ID_LEN).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedUrl {
    pub url: String,
    pub emails: Vec<String>,
    pub is_new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Created,
    EmailAdded,
    AlreadyTracked,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Failed to read tracking store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write tracking store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Tracking store {path} is corrupt: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Tracking store lock poisoned")]
    Poisoned,
}

impl From<TrackerError> for ToolError {
    fn from(e: TrackerError) -> Self {
        ToolError::Internal(e.to_string())
    }
}

/// Persistence behind the tracker tools, keyed by [`encode_url`].
pub trait TrackingStore: Send + Sync {
    fn track(&self, url: &str, email: &str) -> Result<TrackOutcome, TrackerError>;
    fn all(&self) -> Result<Vec<TrackedUrl>, TrackerError>;
}

/// Whole collection in one JSON object, rewritten atomically on change.
pub struct JsonFileTrackingStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileTrackingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, TrackedUrl>, TrackerError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(TrackerError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|source| TrackerError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, documents: &BTreeMap<String, TrackedUrl>) -> Result<(), TrackerError> {
        let body = serde_json::to_vec_pretty(documents).map_err(|source| TrackerError::Parse {
            path: self.path.clone(),
            source,
        })?;
        atomic_write(&self.path, &body).map_err(|source| TrackerError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl TrackingStore for JsonFileTrackingStore {
    fn track(&self, url: &str, email: &str) -> Result<TrackOutcome, TrackerError> {
        let _guard = self.lock.lock().map_err(|_| TrackerError::Poisoned)?;
        let mut documents = self.load()?;

        let id = encode_url(url);
        let outcome = match documents.get_mut(&id) {
            Some(doc) if doc.emails.iter().any(|known| known == email) => {
                return Ok(TrackOutcome::AlreadyTracked)
            }
            Some(doc) => {
                doc.emails.push(email.to_string());
                doc.is_new = true;
                TrackOutcome::EmailAdded
            }
            None => {
                documents.insert(
                    id,
                    TrackedUrl {
                        url: url.to_string(),
                        emails: vec![email.to_string()],
                        is_new: true,
                    },
                );
                TrackOutcome::Created
            }
        };

        self.save(&documents)?;
        Ok(outcome)
    }

    fn all(&self) -> Result<Vec<TrackedUrl>, TrackerError> {
        let _guard = self.lock.lock().map_err(|_| TrackerError::Poisoned)?;
        Ok(self.load()?.into_values().collect())
    }
}

#[derive(Deserialize)]
struct TrackParams {
    url: String,
    email: String,
}

pub struct TrackUrlEmailTool {
    store: Arc<dyn TrackingStore>,
}

impl TrackUrlEmailTool {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ToolHandler for TrackUrlEmailTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "track_url_email".into(),
            description: "Track a URL and its associated email".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "The URL to track" },
                    "email": { "type": "string", "description": "The email associated with the URL" }
                },
                "required": ["url", "email"]
            }),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let params: TrackParams = call.parse()?;
        let outcome = self.store.track(&params.url, &params.email)?;
        tracing::debug!(url = %params.url, ?outcome, "tracked");
        Ok(vec![ToolContent::text(format!(
            "Successfully tracked URL: {} with email: {}",
            params.url, params.email
        ))])
    }
}

pub struct GetTrackedDataTool {
    store: Arc<dyn TrackingStore>,
}

impl GetTrackedDataTool {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetTrackedDataTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_tracked_data".into(),
            description: "Get all tracked URLs and emails".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn run(&self, _call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let lines: Vec<String> = self
            .store
            .all()?
            .iter()
            .map(|doc| {
                format!(
                    "URL: {}, Emails: {}, New: {}",
                    doc.url,
                    doc.emails.join(", "),
                    doc.is_new
                )
            })
            .collect();
        Ok(vec![ToolContent::text(lines.join("\n"))])
    }
}
