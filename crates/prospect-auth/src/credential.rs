use chrono::{DateTime, Duration, Utc};
use prospect_dispatch::Session;
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before their real expiry so a
/// call never starts with a token about to lapse mid-request.
pub const EXPIRY_LEEWAY_SECS: i64 = 60;

/// Tokens returned by a code exchange or a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// Persisted per-identity OAuth credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub identity: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
}

impl Credential {
    pub fn from_grant(identity: &str, grant: TokenGrant, now: DateTime<Utc>) -> Self {
        Self {
            identity: identity.to_string(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expiry: expiry_after(now, grant.expires_in),
        }
    }

    /// Apply a refresh grant. Providers usually omit the refresh token on
    /// refresh, in which case the stored one is kept.
    pub fn refreshed(&self, grant: TokenGrant, now: DateTime<Utc>) -> Self {
        Self {
            identity: self.identity.clone(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or_else(|| self.refresh_token.clone()),
            expiry: expiry_after(now, grant.expires_in),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now + Duration::seconds(EXPIRY_LEEWAY_SECS)
    }

    pub fn session(&self) -> Session {
        Session {
            identity: self.identity.clone(),
            access_token: self.access_token.clone(),
        }
    }
}

fn expiry_after(now: DateTime<Utc>, expires_in: u64) -> DateTime<Utc> {
    let secs = i64::try_from(expires_in).unwrap_or(i64::MAX / 1000);
    now + Duration::seconds(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(token: &str, refresh: Option<&str>, expires_in: u64) -> TokenGrant {
        TokenGrant {
            access_token: token.into(),
            refresh_token: refresh.map(str::to_string),
            expires_in,
        }
    }

    #[test]
    fn test_expiry_respects_leeway() {
        let now = Utc::now();
        let credential = Credential::from_grant("a@example.com", grant("t", None, 3600), now);
        assert!(!credential.is_expired_at(now));
        assert!(credential.is_expired_at(now + Duration::seconds(3600 - 30)));

        let short = Credential::from_grant("a@example.com", grant("t", None, 30), now);
        assert!(short.is_expired_at(now));
    }

    #[test]
    fn test_refresh_keeps_existing_refresh_token() {
        let now = Utc::now();
        let original = Credential::from_grant("a@example.com", grant("old", Some("r1"), 10), now);

        let refreshed = original.refreshed(grant("new", None, 3600), now);
        assert_eq!(refreshed.access_token, "new");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("r1"));

        let rotated = original.refreshed(grant("newer", Some("r2"), 3600), now);
        assert_eq!(rotated.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn test_credential_json_shape() {
        let now = Utc::now();
        let credential = Credential::from_grant("a@example.com", grant("t", Some("r"), 60), now);
        let value = serde_json::to_value(&credential).unwrap();
        assert_eq!(value["identity"], "a@example.com");
        assert_eq!(value["access_token"], "t");
        assert_eq!(value["refresh_token"], "r");
        let back: Credential = serde_json::from_value(value).unwrap();
        assert_eq!(back, credential);
    }
}
