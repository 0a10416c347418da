//! Scripted `HttpClient` for exercising tool handlers without a network.

use crate::http::{HttpClient, HttpError, HttpRequest, HttpResponse};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued responses in order and records every request it sees.
/// Running out of responses is reported as a transport error.
#[derive(Default)]
pub struct ScriptedHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, body: impl Into<String>) -> Self {
        self.push(Ok(HttpResponse {
            status,
            body: body.into().into_bytes(),
        }));
        self
    }

    pub fn respond_json(self, status: u16, body: serde_json::Value) -> Self {
        self.respond(status, body.to_string())
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    fn push(&self, entry: Result<HttpResponse, String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(entry);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map_or_else(|_| Vec::new(), |entries| entries.clone())
    }
}

#[async_trait::async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let url = request.url.clone();
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request);
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(HttpError::Transport { url, message }),
            None => Err(HttpError::Transport {
                url,
                message: "no scripted response left".to_string(),
            }),
        }
    }
}
