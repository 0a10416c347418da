//! OAuth 2.0 authorization-code provider.
//!
//! Talks to the token endpoint with plain form posts; no provider SDK.

use crate::accounts::ClientSecrets;
use crate::credential::TokenGrant;
use crate::error::AuthError;
use serde::Deserialize;

/// Mail, calendar and the identity scopes needed to tie a token to an email.
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://mail.google.com/",
    "https://www.googleapis.com/auth/calendar",
];

#[async_trait::async_trait]
pub trait OAuthProvider: Send + Sync {
    /// URL the user opens to grant access; the provider redirects to
    /// `redirect_uri` with `?code=...` afterwards.
    fn authorization_url(&self, identity: &str, redirect_uri: &str) -> Result<String, AuthError>;

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

fn default_expires_in() -> u64 {
    3600
}

pub struct GoogleOAuthProvider {
    secrets: ClientSecrets,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl GoogleOAuthProvider {
    pub fn new(secrets: ClientSecrets) -> Self {
        Self {
            secrets,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, AuthError> {
        let response = self
            .http_client
            .post(&self.secrets.token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::TokenRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenRejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenRequest(format!("Failed to parse token response: {e}")))?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
        })
    }
}

#[async_trait::async_trait]
impl OAuthProvider for GoogleOAuthProvider {
    fn authorization_url(&self, identity: &str, redirect_uri: &str) -> Result<String, AuthError> {
        let scope = self.scopes.join(" ");
        let url = url::Url::parse_with_params(
            &self.secrets.auth_uri,
            &[
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("login_hint", identity),
            ],
        )
        .map_err(|e| AuthError::InvalidEndpoint {
            url: self.secrets.auth_uri.clone(),
            message: e.to_string(),
        })?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, AuthError> {
        tracing::info!("exchanging authorization code for tokens");
        self.token_request(&[
            ("code", code),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .await
    }
}
