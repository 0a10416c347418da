use crate::error::ToolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Static metadata for one callable tool.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// One content block of a tool result.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".into(),
            text: text.into(),
        }
    }

    /// Pretty-printed JSON as a text block.
    pub fn json(value: &Value) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::text(text)
    }
}

/// Authorized principal handed to gated handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: String,
    pub access_token: String,
}

/// Wire-level call request: a tool name plus its raw argument payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CallEnvelope {
    #[serde(default)]
    pub name: String,
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

impl CallEnvelope {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// What a handler receives: validated arguments and, when the server is
/// gated, the caller's session.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub session: Option<Session>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            session: None,
        }
    }

    /// Deserialize the arguments into a typed parameter struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ToolError> {
        serde_json::from_value(Value::Object(self.arguments.clone()))
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))
    }

    pub fn session(&self) -> Result<&Session, ToolError> {
        self.session.as_ref().ok_or(ToolError::MissingSession)
    }
}

/// Normalized outcome of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultEnvelope {
    Success(Vec<ToolContent>),
    Failure(String),
}

impl ResultEnvelope {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResultEnvelope::Success(_))
    }

    pub fn content(&self) -> &[ToolContent] {
        match self {
            ResultEnvelope::Success(content) => content,
            ResultEnvelope::Failure(_) => &[],
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ResultEnvelope::Success(_) => None,
            ResultEnvelope::Failure(message) => Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct EchoParams {
        text: String,
    }

    #[test]
    fn test_envelope_defaults_missing_arguments_to_empty_object() {
        let envelope: CallEnvelope = serde_json::from_value(json!({"name": "echo"})).unwrap();
        assert_eq!(envelope.arguments, json!({}));
    }

    #[test]
    fn test_parse_reports_invalid_parameters() {
        let mut args = Map::new();
        args.insert("text".into(), json!(42));
        let call = ToolCall::new("echo", args);

        let err = call.parse::<EchoParams>().err().unwrap();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[test]
    fn test_parse_ignores_extra_fields() {
        let mut args = Map::new();
        args.insert("text".into(), json!("hi"));
        args.insert("__user_id__".into(), json!("a@example.com"));
        let call = ToolCall::new("echo", args);

        assert_eq!(call.parse::<EchoParams>().unwrap().text, "hi");
    }

    #[test]
    fn test_session_required() {
        let call = ToolCall::new("gmail", Map::new());
        assert!(matches!(call.session(), Err(ToolError::MissingSession)));
    }

    #[test]
    fn test_descriptor_serializes_input_schema_camel_case() {
        let descriptor = ToolDescriptor {
            name: "echo".into(),
            description: "Echo text".into(),
            input_schema: json!({"type": "object"}),
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["inputSchema"], json!({"type": "object"}));
    }
}
