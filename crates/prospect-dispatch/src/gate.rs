use crate::error::GateError;
use crate::types::Session;

/// Argument that carries the caller identity on gated servers.
pub const DEFAULT_IDENTITY_FIELD: &str = "__user_id__";

/// Authorization precondition run before a gated call reaches its handler.
///
/// Implementations guarantee that a returned session holds a non-expired
/// access token for `identity`.
#[async_trait::async_trait]
pub trait SessionGate: Send + Sync {
    async fn ensure_session(&self, identity: &str) -> Result<Session, GateError>;
}
