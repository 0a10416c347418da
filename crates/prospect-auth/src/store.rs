use crate::credential::Credential;
use crate::error::AuthError;
use prospect_common::fs_utils::{atomic_write, encode_file_component};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Durable credential storage keyed by identity.
pub trait CredentialStore: Send + Sync {
    fn load(&self, identity: &str) -> Result<Option<Credential>, AuthError>;

    fn save(&self, credential: &Credential) -> Result<(), AuthError>;
}

/// One JSON file per identity, `.oauth2.<encoded identity>.json`, inside `dir`.
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, identity: &str) -> PathBuf {
        self.dir
            .join(format!(".oauth2.{}.json", encode_file_component(identity)))
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, identity: &str) -> Result<Option<Credential>, AuthError> {
        let path = self.path_for(identity);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(AuthError::Read { path, source }),
        };
        let credential: Credential =
            serde_json::from_str(&raw).map_err(|source| AuthError::Parse { path, source })?;
        // A record only ever answers for the identity it was issued to.
        if credential.identity != identity {
            tracing::warn!("credential file for {identity} belongs to another identity, ignoring it");
            return Ok(None);
        }
        Ok(Some(credential))
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let path = self.path_for(&credential.identity);
        let json = serde_json::to_vec_pretty(credential).map_err(|source| AuthError::Parse {
            path: path.clone(),
            source,
        })?;
        atomic_write(&path, &json).map_err(|source| AuthError::Write { path, source })
    }
}

/// In-process store, used by tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(credentials: impl IntoIterator<Item = Credential>) -> Self {
        let entries = credentials
            .into_iter()
            .map(|c| (c.identity.clone(), c))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, identity: &str) -> Result<Option<Credential>, AuthError> {
        Ok(self
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(identity).cloned()))
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(credential.identity.clone(), credential.clone());
        }
        Ok(())
    }
}
