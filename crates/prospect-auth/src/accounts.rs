use crate::error::AuthError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// An account the server is allowed to act for.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AccountInfo {
    pub email: String,
    #[serde(default)]
    pub account_type: String,
    #[serde(default)]
    pub extra_info: String,
}

#[derive(Deserialize)]
struct AccountsFile {
    accounts: Vec<AccountInfo>,
}

/// Read the account allow-list (`{"accounts": [{"email": ...}, ...]}`).
pub fn load_accounts(path: &Path) -> Result<Vec<AccountInfo>, AuthError> {
    let raw = read(path)?;
    let file: AccountsFile = serde_json::from_str(&raw).map_err(|source| AuthError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.accounts)
}

/// OAuth client registration for the installed-app flow.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

/// Read a Google client secrets file. Both the `installed` and the `web`
/// layouts are accepted; `installed` wins when both are present.
pub fn load_client_secrets(path: &Path) -> Result<ClientSecrets, AuthError> {
    let raw = read(path)?;
    let file: SecretsFile = serde_json::from_str(&raw).map_err(|source| AuthError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    file.installed
        .or(file.web)
        .ok_or_else(|| AuthError::MissingClientSection(path.to_path_buf()))
}

fn read(path: &Path) -> Result<String, AuthError> {
    fs::read_to_string(path).map_err(|source| AuthError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".accounts.json");
        fs::write(
            &path,
            r#"{"accounts":[{"email":"a@example.com","account_type":"personal","extra_info":"main"},{"email":"b@example.com"}]}"#,
        )
        .unwrap();

        let accounts = load_accounts(&path).unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].account_type, "personal");
        assert_eq!(accounts[1].email, "b@example.com");
        assert_eq!(accounts[1].extra_info, "");
    }

    #[test]
    fn test_load_client_secrets_installed_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".gauth.json");
        fs::write(
            &path,
            r#"{"installed":{"client_id":"id","client_secret":"secret","redirect_uris":["http://localhost:4100/code"]}}"#,
        )
        .unwrap();

        let secrets = load_client_secrets(&path).unwrap();
        assert_eq!(secrets.client_id, "id");
        assert_eq!(secrets.token_uri, GOOGLE_TOKEN_URI);
        assert_eq!(secrets.auth_uri, GOOGLE_AUTH_URI);
    }

    #[test]
    fn test_load_client_secrets_web_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".gauth.json");
        fs::write(
            &path,
            r#"{"web":{"client_id":"wid","client_secret":"ws","token_uri":"https://example.com/token"}}"#,
        )
        .unwrap();

        let secrets = load_client_secrets(&path).unwrap();
        assert_eq!(secrets.client_id, "wid");
        assert_eq!(secrets.token_uri, "https://example.com/token");
    }

    #[test]
    fn test_load_client_secrets_without_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".gauth.json");
        fs::write(&path, r#"{"other":{}}"#).unwrap();

        let err = load_client_secrets(&path).unwrap_err();
        assert!(matches!(err, AuthError::MissingClientSection(_)));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_accounts(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, AuthError::Read { .. }));
    }
}
