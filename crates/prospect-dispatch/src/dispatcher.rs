use crate::error::CallError;
use crate::gate::SessionGate;
use crate::registry::ToolRegistry;
use crate::types::{CallEnvelope, ResultEnvelope, ToolCall, ToolContent, ToolDescriptor};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

struct GateBinding {
    gate: Arc<dyn SessionGate>,
    identity_field: String,
}

/// Routes call envelopes to handlers and normalizes every outcome into a
/// `ResultEnvelope`. Handler errors and panics never escape `call_tool`.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    gate: Option<GateBinding>,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            gate: None,
        }
    }

    /// Require every call to name an identity in `identity_field` and pass
    /// `gate` before its handler runs.
    pub fn with_gate(mut self, gate: Arc<dyn SessionGate>, identity_field: impl Into<String>) -> Self {
        self.gate = Some(GateBinding {
            gate,
            identity_field: identity_field.into(),
        });
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn is_gated(&self) -> bool {
        self.gate.is_some()
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.list_all()
    }

    pub async fn call_tool(&self, envelope: CallEnvelope) -> ResultEnvelope {
        let name = envelope.name.clone();
        match self.try_call(envelope).await {
            Ok(content) => ResultEnvelope::Success(content),
            Err(e) => {
                tracing::error!(tool = %name, "Error during call_tool: {e}");
                ResultEnvelope::Failure(e.to_string())
            }
        }
    }

    /// Run one call through validation, the session gate, lookup, and the
    /// handler, in that order. The first failing step ends the call.
    pub async fn try_call(&self, envelope: CallEnvelope) -> Result<Vec<ToolContent>, CallError> {
        let CallEnvelope { name, arguments } = envelope;

        let Value::Object(arguments) = arguments else {
            return Err(CallError::InvalidArguments);
        };

        let session = match &self.gate {
            Some(binding) => {
                let identity = arguments
                    .get(&binding.identity_field)
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| CallError::MissingIdentity(binding.identity_field.clone()))?;
                let session = binding.gate.ensure_session(identity).await?;
                tracing::debug!("session ready for {identity}");
                Some(session)
            }
            None => None,
        };

        let handler = self
            .registry
            .lookup(&name)
            .ok_or_else(|| CallError::UnknownTool(name.clone()))?;

        let call = ToolCall {
            name,
            arguments,
            session,
        };

        match AssertUnwindSafe(handler.run(call)).catch_unwind().await {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(CallError::HandlerFailure(e.to_string())),
            Err(payload) => Err(CallError::HandlerFailure(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_extracts_str_and_string() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(boxed.as_ref()), "handler panicked");
    }
}
