pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod handler;
pub mod mcp;
pub mod registry;
pub mod server;
pub mod types;

pub use dispatcher::Dispatcher;
pub use error::{CallError, GateError, ToolError};
pub use gate::{SessionGate, DEFAULT_IDENTITY_FIELD};
pub use handler::ToolHandler;
pub use registry::ToolRegistry;
pub use types::{CallEnvelope, ResultEnvelope, Session, ToolCall, ToolContent, ToolDescriptor};
