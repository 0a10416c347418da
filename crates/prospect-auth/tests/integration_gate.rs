use chrono::{Duration as ChronoDuration, Utc};
use prospect_auth::{
    AuthError, Credential, CredentialStore, GateConfig, MemoryCredentialStore, OAuthGate,
    OAuthProvider, TokenGrant, UrlOpener,
};
use prospect_dispatch::{
    CallEnvelope, Dispatcher, GateError, ToolCall, ToolContent, ToolDescriptor, ToolError,
    ToolHandler, ToolRegistry, DEFAULT_IDENTITY_FIELD,
};
use serde_json::json;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ── Doubles ────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeProvider {
    reject_refresh: bool,
    reject_exchange: bool,
    exchanges: AtomicUsize,
    refreshes: AtomicUsize,
}

#[async_trait::async_trait]
impl OAuthProvider for FakeProvider {
    /// The "consent page" redirects straight back with a code.
    fn authorization_url(&self, identity: &str, redirect_uri: &str) -> Result<String, AuthError> {
        Ok(format!("{redirect_uri}?code=code-for-{identity}"))
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<TokenGrant, AuthError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if self.reject_exchange {
            return Err(AuthError::TokenRejected {
                status: 400,
                body: "invalid_grant".into(),
            });
        }
        Ok(TokenGrant {
            access_token: format!("access-{code}"),
            refresh_token: Some("refresh-1".into()),
            expires_in: 3600,
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, AuthError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.reject_refresh {
            return Err(AuthError::TokenRejected {
                status: 400,
                body: "invalid_grant".into(),
            });
        }
        Ok(TokenGrant {
            access_token: "refreshed-token".into(),
            refresh_token: None,
            expires_in: 3600,
        })
    }
}

/// Simulates the user's browser: follows the authorization URL once the
/// first `skip` opens have been ignored.
struct BrowserSim {
    opens: AtomicUsize,
    skip: usize,
}

impl BrowserSim {
    fn new() -> Self {
        Self::skipping(0)
    }

    fn skipping(skip: usize) -> Self {
        Self {
            opens: AtomicUsize::new(0),
            skip,
        }
    }
}

impl UrlOpener for BrowserSim {
    fn open(&self, url: &str) -> Result<(), AuthError> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst);
        if n >= self.skip {
            let url = url.to_string();
            tokio::spawn(async move {
                let client = reqwest::Client::builder().no_proxy().build().unwrap();
                let _ = client.get(url).send().await;
            });
        }
        Ok(())
    }
}

/// Records URLs and lets the test decide when to "click".
#[derive(Default)]
struct ManualBrowser {
    urls: Mutex<Vec<String>>,
    opened: Notify,
}

impl UrlOpener for ManualBrowser {
    fn open(&self, url: &str) -> Result<(), AuthError> {
        self.urls.lock().unwrap().push(url.to_string());
        self.opened.notify_one();
        Ok(())
    }
}

fn free_loopback_addr() -> SocketAddr {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn config(timeout: Duration) -> GateConfig {
    GateConfig {
        callback_addr: free_loopback_addr(),
        timeout,
        ..GateConfig::default()
    }
}

fn stored(identity: &str, token: &str, expiry_offset_secs: i64, refresh: Option<&str>) -> Credential {
    Credential {
        identity: identity.into(),
        access_token: token.into(),
        refresh_token: refresh.map(str::to_string),
        expiry: Utc::now() + ChronoDuration::seconds(expiry_offset_secs),
    }
}

// ── Interactive flow ───────────────────────────────────────────────

#[tokio::test]
async fn test_fresh_identity_runs_one_interactive_flow() {
    let store = Arc::new(MemoryCredentialStore::new());
    let provider = Arc::new(FakeProvider::default());
    let browser = Arc::new(BrowserSim::new());
    let gate = OAuthGate::new(
        config(Duration::from_secs(10)),
        store.clone(),
        provider.clone(),
        browser.clone(),
    );

    let credential = gate.ensure_credential("a@example.com").await.unwrap();

    assert_eq!(credential.access_token, "access-code-for-a@example.com");
    assert_eq!(browser.opens.load(Ordering::SeqCst), 1);
    assert_eq!(provider.exchanges.load(Ordering::SeqCst), 1);
    assert_eq!(store.load("a@example.com").unwrap(), Some(credential));

    // Authorized now: no second flow
    gate.ensure_credential("a@example.com").await.unwrap();
    assert_eq!(browser.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_valid_credential_skips_refresh_and_flow() {
    let store = Arc::new(MemoryCredentialStore::with([stored(
        "a@example.com",
        "still-good",
        3600,
        Some("r"),
    )]));
    let provider = Arc::new(FakeProvider::default());
    let browser = Arc::new(BrowserSim::new());
    let gate = OAuthGate::new(config(Duration::from_secs(1)), store, provider.clone(), browser.clone());

    let credential = gate.ensure_credential("a@example.com").await.unwrap();

    assert_eq!(credential.access_token, "still-good");
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
    assert_eq!(browser.opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_timeout_then_success_leaves_one_valid_record() {
    let store = Arc::new(MemoryCredentialStore::new());
    let provider = Arc::new(FakeProvider::default());
    // First open is ignored, so the first attempt times out
    let browser = Arc::new(BrowserSim::skipping(1));
    let gate = OAuthGate::new(
        config(Duration::from_millis(300)),
        store.clone(),
        provider,
        browser.clone(),
    );

    let err = gate.ensure_credential("b@example.com").await.unwrap_err();
    assert_eq!(
        err,
        GateError::AuthorizationTimeout {
            waited: Duration::from_millis(300)
        }
    );
    assert!(err.to_string().contains("after 300ms"));
    assert!(store.is_empty());

    // Same fixed port binds again: the first listener was shut down
    let credential = gate.ensure_credential("b@example.com").await.unwrap();

    assert_eq!(browser.opens.load(Ordering::SeqCst), 2);
    assert_eq!(store.len(), 1);
    let record = store.load("b@example.com").unwrap().unwrap();
    assert_eq!(record, credential);
    assert!(!record.is_expired_at(Utc::now()));
}

#[tokio::test]
async fn test_concurrent_call_for_same_identity_fails_fast() {
    let store = Arc::new(MemoryCredentialStore::new());
    let browser = Arc::new(ManualBrowser::default());
    let gate = Arc::new(OAuthGate::new(
        config(Duration::from_secs(10)),
        store.clone(),
        Arc::new(FakeProvider::default()),
        browser.clone(),
    ));

    let first = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.ensure_credential("a@example.com").await })
    };
    browser.opened.notified().await;

    let second = gate.ensure_credential("a@example.com").await.unwrap_err();
    assert_eq!(
        second,
        GateError::AuthorizationInProgress("a@example.com".into())
    );

    // Only one listener was started
    let url = browser.urls.lock().unwrap().clone();
    assert_eq!(url.len(), 1);

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let response = client.get(&url[0]).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let credential = first.await.unwrap().unwrap();
    assert_eq!(store.load("a@example.com").unwrap(), Some(credential));

    // Flow finished: later calls for the identity succeed without a new flow
    gate.ensure_credential("a@example.com").await.unwrap();
    assert_eq!(browser.urls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_other_identity_cannot_start_second_listener() {
    let browser = Arc::new(ManualBrowser::default());
    let gate = Arc::new(OAuthGate::new(
        config(Duration::from_secs(10)),
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(FakeProvider::default()),
        browser.clone(),
    ));

    let first = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.ensure_credential("a@example.com").await })
    };
    browser.opened.notified().await;

    let err = gate.ensure_credential("c@example.com").await.unwrap_err();
    assert_eq!(err, GateError::AuthorizationInProgress("c@example.com".into()));

    let url = browser.urls.lock().unwrap()[0].clone();
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    client.get(url).send().await.unwrap();
    first.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_exchange_failure_is_retryable() {
    let store = Arc::new(MemoryCredentialStore::new());
    let provider = Arc::new(FakeProvider {
        reject_exchange: true,
        ..FakeProvider::default()
    });
    let browser = Arc::new(BrowserSim::new());
    let gate = OAuthGate::new(config(Duration::from_secs(10)), store.clone(), provider.clone(), browser.clone());

    let err = gate.ensure_credential("a@example.com").await.unwrap_err();
    assert!(matches!(err, GateError::AuthorizationFailed { .. }));
    assert!(store.is_empty());

    // Not stuck in PendingAuthorization: a new attempt starts a new flow
    let err = gate.ensure_credential("a@example.com").await.unwrap_err();
    assert!(matches!(err, GateError::AuthorizationFailed { .. }));
    assert_eq!(browser.opens.load(Ordering::SeqCst), 2);
    assert_eq!(provider.exchanges.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_occupied_callback_port_fails_authorization() {
    let occupied = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let gate = OAuthGate::new(
        GateConfig {
            callback_addr: occupied.local_addr().unwrap(),
            timeout: Duration::from_secs(1),
            ..GateConfig::default()
        },
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(FakeProvider::default()),
        Arc::new(BrowserSim::new()),
    );

    let err = gate.ensure_credential("a@example.com").await.unwrap_err();

    match err {
        GateError::AuthorizationFailed { reason, .. } => assert!(reason.contains("bind")),
        other => panic!("unexpected error: {other:?}"),
    }
}

// ── Refresh ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_expired_credential_is_refreshed_and_persisted() {
    let store = Arc::new(MemoryCredentialStore::with([stored(
        "a@example.com",
        "stale",
        -600,
        Some("refresh-1"),
    )]));
    let provider = Arc::new(FakeProvider::default());
    let browser = Arc::new(BrowserSim::new());
    let gate = OAuthGate::new(config(Duration::from_secs(1)), store.clone(), provider.clone(), browser.clone());

    let credential = gate.ensure_credential("a@example.com").await.unwrap();

    assert_eq!(credential.access_token, "refreshed-token");
    assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(browser.opens.load(Ordering::SeqCst), 0);
    assert_eq!(store.load("a@example.com").unwrap(), Some(credential));
}

#[tokio::test]
async fn test_rejected_refresh_surfaces_expired_then_reauthorizes() {
    let store = Arc::new(MemoryCredentialStore::with([stored(
        "a@example.com",
        "stale",
        -600,
        Some("revoked"),
    )]));
    let provider = Arc::new(FakeProvider {
        reject_refresh: true,
        ..FakeProvider::default()
    });
    let browser = Arc::new(BrowserSim::new());
    let gate = OAuthGate::new(config(Duration::from_secs(10)), store.clone(), provider.clone(), browser.clone());

    let err = gate.ensure_credential("a@example.com").await.unwrap_err();
    assert!(matches!(err, GateError::AuthorizationExpired { .. }));
    // No automatic fallback to the interactive flow, and nothing deleted
    assert_eq!(browser.opens.load(Ordering::SeqCst), 0);
    assert!(store.load("a@example.com").unwrap().is_some());

    // Next call starts from NoCredential
    let credential = gate.ensure_credential("a@example.com").await.unwrap();
    assert_eq!(credential.access_token, "access-code-for-a@example.com");
    assert_eq!(browser.opens.load(Ordering::SeqCst), 1);
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_without_refresh_token() {
    let store = Arc::new(MemoryCredentialStore::with([stored("a@example.com", "stale", -10, None)]));
    let gate = OAuthGate::new(
        config(Duration::from_secs(1)),
        store,
        Arc::new(FakeProvider::default()),
        Arc::new(BrowserSim::new()),
    );

    let err = gate.ensure_credential("a@example.com").await.unwrap_err();

    assert_eq!(
        err,
        GateError::AuthorizationExpired {
            identity: "a@example.com".into(),
            reason: "no refresh token stored".into(),
        }
    );
}

// ── Allow-list ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unlisted_identity_rejected_before_any_flow() {
    let browser = Arc::new(BrowserSim::new());
    let gate = OAuthGate::new(
        config(Duration::from_secs(1)),
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(FakeProvider::default()),
        browser.clone(),
    )
    .with_allowed_identities(["a@example.com".to_string()]);

    let err = gate.ensure_credential("mallory@example.com").await.unwrap_err();

    assert_eq!(err, GateError::UnknownIdentity("mallory@example.com".into()));
    assert_eq!(browser.opens.load(Ordering::SeqCst), 0);
}

// ── Through the dispatcher ─────────────────────────────────────────

struct WhoAmI;

#[async_trait::async_trait]
impl ToolHandler for WhoAmI {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "whoami".into(),
            description: "Reports the session token".into(),
            input_schema: json!({"type": "object", "required": ["__user_id__"]}),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        Ok(vec![ToolContent::text(format!(
            "{}:{}",
            session.identity, session.access_token
        ))])
    }
}

#[tokio::test]
async fn test_dispatcher_refreshes_before_handler_runs() {
    let store = Arc::new(MemoryCredentialStore::with([stored(
        "a@example.com",
        "stale",
        -600,
        Some("refresh-1"),
    )]));
    let gate = Arc::new(OAuthGate::new(
        config(Duration::from_secs(1)),
        store,
        Arc::new(FakeProvider::default()),
        Arc::new(BrowserSim::new()),
    ));
    let mut registry = ToolRegistry::new();
    registry.register(WhoAmI);
    let dispatcher = Dispatcher::new(registry).with_gate(gate, DEFAULT_IDENTITY_FIELD);

    let result = dispatcher
        .call_tool(CallEnvelope::new(
            "whoami",
            json!({"__user_id__": "a@example.com"}),
        ))
        .await;

    assert_eq!(
        result.content(),
        &[ToolContent::text("a@example.com:refreshed-token")]
    );
}
