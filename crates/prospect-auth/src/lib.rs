pub mod accounts;
pub mod browser;
pub mod callback;
pub mod credential;
pub mod error;
pub mod gate;
pub mod provider;
pub mod store;

pub use accounts::{AccountInfo, ClientSecrets};
pub use browser::{SystemBrowser, UrlOpener};
pub use credential::{Credential, TokenGrant};
pub use error::AuthError;
pub use gate::{GateConfig, OAuthGate};
pub use provider::{GoogleOAuthProvider, OAuthProvider};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
