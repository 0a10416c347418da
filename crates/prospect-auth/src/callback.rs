//! One-shot loopback listener that receives the OAuth redirect.
//!
//! `GET <path>?code=...` completes the flow exactly once. Everything else is
//! rejected with a 4xx and changes nothing.

use crate::error::AuthError;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const SUCCESS_BODY: &str = "Auth successful! You can close the tab!";

/// Upper bound on how long shutdown waits for in-flight responses to flush.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type CodeSlot = Arc<Mutex<Option<oneshot::Sender<String>>>>;

pub struct CallbackListener {
    local_addr: SocketAddr,
    code_rx: oneshot::Receiver<String>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CallbackListener {
    /// Bind `addr` and start serving `path` in the background.
    pub async fn bind(addr: SocketAddr, path: &str) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AuthError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AuthError::Bind { addr, source })?;

        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let slot: CodeSlot = Arc::new(Mutex::new(Some(code_tx)));

        let app = Router::new()
            .route(path, get(receive_code))
            .with_state(slot);

        tracing::info!("starting OAuth callback listener at {local_addr}");
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("OAuth callback listener failed: {e}");
            }
            tracing::info!("OAuth callback listener stopped");
        });

        Ok(Self {
            local_addr,
            code_rx,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait up to `timeout` for the first authorization code. The listener
    /// is shut down on every exit path and the port is free when this returns.
    pub async fn wait_for_code(mut self, timeout: Duration) -> Result<String, AuthError> {
        let outcome = tokio::time::timeout(timeout, &mut self.code_rx).await;
        self.shutdown().await;
        match outcome {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(_)) => Err(AuthError::ListenerClosed),
            Err(_) => Err(AuthError::Timeout {
                waited: timeout,
            }),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task)
            .await
            .is_err()
        {
            tracing::warn!("OAuth callback listener did not drain in time, aborting it");
            self.task.abort();
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn receive_code(
    State(slot): State<CodeSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    let Some(code) = params.get("code").filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing authorization code");
    };

    let sender = slot.lock().ok().and_then(|mut pending| pending.take());
    match sender {
        Some(tx) => {
            let _ = tx.send(code.clone());
            (StatusCode::OK, SUCCESS_BODY)
        }
        None => (StatusCode::CONFLICT, "Authorization already completed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_wrong_path_and_missing_code_are_rejected() {
        let listener = CallbackListener::bind(loopback(), "/code").await.unwrap();
        let base = format!("http://{}", listener.local_addr());
        let client = client();

        let wrong_path = client.get(format!("{base}/other?code=x")).send().await.unwrap();
        assert_eq!(wrong_path.status().as_u16(), 404);

        let no_code = client.get(format!("{base}/code")).send().await.unwrap();
        assert_eq!(no_code.status().as_u16(), 400);

        let empty_code = client.get(format!("{base}/code?code=")).send().await.unwrap();
        assert_eq!(empty_code.status().as_u16(), 400);

        // Rejections left the flow open: a valid code still completes it
        let ok = client.get(format!("{base}/code?code=abc")).send().await.unwrap();
        assert_eq!(ok.status().as_u16(), 200);
        assert_eq!(ok.text().await.unwrap(), SUCCESS_BODY);

        let code = listener.wait_for_code(Duration::from_secs(5)).await.unwrap();
        assert_eq!(code, "abc");
    }

    #[tokio::test]
    async fn test_first_code_wins() {
        let listener = CallbackListener::bind(loopback(), "/code").await.unwrap();
        let base = format!("http://{}", listener.local_addr());
        let client = client();

        let first = client.get(format!("{base}/code?code=first")).send().await.unwrap();
        assert_eq!(first.status().as_u16(), 200);
        let second = client.get(format!("{base}/code?code=second")).send().await.unwrap();
        assert_eq!(second.status().as_u16(), 409);

        let code = listener.wait_for_code(Duration::from_secs(5)).await.unwrap();
        assert_eq!(code, "first");
    }

    #[tokio::test]
    async fn test_timeout_shuts_listener_down() {
        let listener = CallbackListener::bind(loopback(), "/code").await.unwrap();
        let addr = listener.local_addr();

        let err = listener
            .wait_for_code(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(&err, AuthError::Timeout { waited } if *waited == Duration::from_millis(100)));
        assert_eq!(err.to_string(), "OAuth flow timed out after 100ms");

        // The port is free again
        let again = CallbackListener::bind(addr, "/code").await.unwrap();
        assert_eq!(again.local_addr(), addr);
    }
}
