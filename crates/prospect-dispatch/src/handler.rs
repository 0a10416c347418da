use crate::error::ToolError;
use crate::types::{ToolCall, ToolContent, ToolDescriptor};

/// Trait that every tool implements.
///
/// One instance per tool name lives for the whole process. Handlers may keep
/// clients or caches internally but must not rely on per-call state.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError>;
}
