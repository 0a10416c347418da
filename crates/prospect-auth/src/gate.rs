//! OAuth session gate: makes sure a usable credential exists for an identity
//! before a gated tool runs.
//!
//! Per identity the gate moves through
//! `NoCredential → PendingAuthorization → Authorized`, and
//! `Authorized → Refreshing → Authorized | NoCredential`.
//! Interactive authorization is only started from `NoCredential`; a second
//! call that would need it while a flow is in flight fails fast with
//! `AuthorizationInProgress` instead of racing for the callback port.

use crate::browser::UrlOpener;
use crate::callback::CallbackListener;
use crate::credential::Credential;
use crate::error::AuthError;
use crate::provider::OAuthProvider;
use crate::store::CredentialStore;
use chrono::Utc;
use prospect_dispatch::{GateError, Session, SessionGate};
use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_CALLBACK_PORT: u16 = 4100;
pub const DEFAULT_CALLBACK_PATH: &str = "/code";
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Loopback address the callback listener binds.
    pub callback_addr: SocketAddr,
    pub callback_path: String,
    /// Redirect URI registered with the provider. Derived from the bound
    /// address when unset.
    pub redirect_uri: Option<String>,
    pub timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            callback_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_CALLBACK_PORT)),
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            redirect_uri: None,
            timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }
}

pub struct OAuthGate {
    config: GateConfig,
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn OAuthProvider>,
    opener: Arc<dyn UrlOpener>,
    allowed: Option<HashSet<String>>,
    identity_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    pending: Mutex<HashSet<String>>,
    revoked: Mutex<HashSet<String>>,
    listener_slot: tokio::sync::Mutex<()>,
}

impl OAuthGate {
    pub fn new(
        config: GateConfig,
        store: Arc<dyn CredentialStore>,
        provider: Arc<dyn OAuthProvider>,
        opener: Arc<dyn UrlOpener>,
    ) -> Self {
        Self {
            config,
            store,
            provider,
            opener,
            allowed: None,
            identity_locks: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashSet::new()),
            revoked: Mutex::new(HashSet::new()),
            listener_slot: tokio::sync::Mutex::new(()),
        }
    }

    /// Only serve these identities; everything else fails with `UnknownIdentity`.
    pub fn with_allowed_identities(mut self, identities: impl IntoIterator<Item = String>) -> Self {
        self.allowed = Some(identities.into_iter().collect());
        self
    }

    /// Return a non-expired credential for `identity`, refreshing or running
    /// the interactive flow as needed.
    pub async fn ensure_credential(&self, identity: &str) -> Result<Credential, GateError> {
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(identity) {
                return Err(GateError::UnknownIdentity(identity.to_string()));
            }
        }

        let lock = self.identity_lock(identity);
        {
            let _guard = lock.lock().await;

            let stored = if self.is_revoked(identity) {
                None
            } else {
                self.store
                    .load(identity)
                    .map_err(|e| failed(identity, e))?
            };

            match stored {
                Some(credential) if !credential.is_expired_at(Utc::now()) => {
                    tracing::debug!("credentials found for {identity}");
                    return Ok(credential);
                }
                Some(credential) => return self.refresh(credential).await,
                None => {}
            }

            if !self.claim_pending(identity) {
                return Err(GateError::AuthorizationInProgress(identity.to_string()));
            }
        }

        let _claim = PendingClaim {
            pending: &self.pending,
            identity,
        };
        self.authorize_interactively(identity).await
    }

    async fn refresh(&self, credential: Credential) -> Result<Credential, GateError> {
        let identity = credential.identity.clone();
        let Some(refresh_token) = credential.refresh_token.clone() else {
            self.mark_revoked(&identity);
            return Err(GateError::AuthorizationExpired {
                identity,
                reason: "no refresh token stored".to_string(),
            });
        };

        tracing::info!("credentials expired for {identity}, refreshing");
        match self.provider.refresh(&refresh_token).await {
            Ok(grant) => {
                let fresh = credential.refreshed(grant, Utc::now());
                self.store
                    .save(&fresh)
                    .map_err(|e| failed(&identity, e))?;
                tracing::info!("stored refreshed credentials for {identity}");
                Ok(fresh)
            }
            Err(e) => {
                tracing::warn!("refresh rejected for {identity}: {e}");
                self.mark_revoked(&identity);
                Err(GateError::AuthorizationExpired {
                    identity,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn authorize_interactively(&self, identity: &str) -> Result<Credential, GateError> {
        // The callback port is fixed, so only one flow may listen at a time.
        let Ok(_slot) = self.listener_slot.try_lock() else {
            return Err(GateError::AuthorizationInProgress(identity.to_string()));
        };

        let listener = CallbackListener::bind(self.config.callback_addr, &self.config.callback_path)
            .await
            .map_err(|e| failed(identity, e))?;
        let redirect_uri = self.config.redirect_uri.clone().unwrap_or_else(|| {
            format!("http://{}{}", listener.local_addr(), self.config.callback_path)
        });

        tracing::info!("no credentials found for {identity}, starting auth flow");
        let auth_url = self
            .provider
            .authorization_url(identity, &redirect_uri)
            .map_err(|e| failed(identity, e))?;
        self.opener
            .open(&auth_url)
            .map_err(|e| failed(identity, e))?;

        tracing::info!("Waiting for OAuth completion...");
        let code = match listener.wait_for_code(self.config.timeout).await {
            Ok(code) => code,
            Err(AuthError::Timeout { waited }) => {
                tracing::error!("OAuth flow for {identity} timed out");
                return Err(GateError::AuthorizationTimeout { waited });
            }
            Err(e) => return Err(failed(identity, e)),
        };

        let grant = self
            .provider
            .exchange_code(&code, &redirect_uri)
            .await
            .map_err(|e| failed(identity, e))?;
        let credential = Credential::from_grant(identity, grant, Utc::now());
        self.store
            .save(&credential)
            .map_err(|e| failed(identity, e))?;
        self.clear_revoked(identity);

        tracing::info!("OAuth flow completed for {identity}");
        Ok(credential)
    }

    fn identity_lock(&self, identity: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .identity_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(identity.to_string()).or_default())
    }

    fn claim_pending(&self, identity: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(identity.to_string())
    }

    fn is_revoked(&self, identity: &str) -> bool {
        self.revoked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(identity)
    }

    fn mark_revoked(&self, identity: &str) {
        self.revoked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(identity.to_string());
    }

    fn clear_revoked(&self, identity: &str) {
        self.revoked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(identity);
    }
}

#[async_trait::async_trait]
impl SessionGate for OAuthGate {
    async fn ensure_session(&self, identity: &str) -> Result<Session, GateError> {
        self.ensure_credential(identity)
            .await
            .map(|credential| credential.session())
    }
}

/// Releases an identity's pending-authorization claim when the flow ends,
/// however it ends.
struct PendingClaim<'a> {
    pending: &'a Mutex<HashSet<String>>,
    identity: &'a str,
}

impl Drop for PendingClaim<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(self.identity);
    }
}

fn failed(identity: &str, e: AuthError) -> GateError {
    GateError::AuthorizationFailed {
        identity: identity.to_string(),
        reason: e.to_string(),
    }
}
