use crate::dispatcher::Dispatcher;
use crate::mcp::*;
use crate::types::CallEnvelope;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Transport I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Run the MCP server: read JSON-RPC from stdin, write responses to stdout.
pub async fn run(dispatcher: Dispatcher, info: ServerInfo) -> Result<(), ServeError> {
    let reader = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(&dispatcher, &info, reader, stdout).await
}

/// Serve line-delimited JSON-RPC from `reader` until EOF, one request at a
/// time, writing each response as a single line to `writer`.
pub async fn serve<R, W>(
    dispatcher: &Dispatcher,
    info: &ServerInfo,
    reader: R,
    mut writer: W,
) -> Result<(), ServeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    tracing::info!("MCP server {} ready, reading from stdin", info.name);

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                let resp = JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {e}"));
                write_response(&mut writer, &resp).await?;
                continue;
            }
        };

        if let Some(resp) = handle_request(&request, dispatcher, info).await {
            write_response(&mut writer, &resp).await?;
        }
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}

async fn handle_request(
    req: &JsonRpcRequest,
    dispatcher: &Dispatcher,
    info: &ServerInfo,
) -> Option<JsonRpcResponse> {
    match req.method.as_str() {
        "initialize" => {
            let result = InitializeResult {
                protocol_version: PROTOCOL_VERSION.into(),
                capabilities: ServerCapabilities {
                    tools: ToolsCapability {
                        list_changed: false,
                    },
                },
                server_info: info.clone(),
            };
            Some(respond(req.id.clone(), &result))
        }

        // Notifications get no response
        "notifications/initialized" | "initialized" => None,

        "ping" => Some(JsonRpcResponse::success(
            req.id.clone(),
            Value::Object(Map::new()),
        )),

        "tools/list" => {
            let result = ToolsListResult {
                tools: dispatcher.list_tools(),
            };
            Some(respond(req.id.clone(), &result))
        }

        "tools/call" => {
            let envelope = call_envelope(&req.params);
            let result: ToolCallResult = dispatcher.call_tool(envelope).await.into();
            Some(respond(req.id.clone(), &result))
        }

        _ => {
            tracing::debug!("Unknown method: {}", req.method);
            Some(JsonRpcResponse::error(
                req.id.clone(),
                METHOD_NOT_FOUND,
                format!("Method not found: {}", req.method),
            ))
        }
    }
}

/// Pull `{name, arguments}` out of tools/call params. A missing or null
/// `arguments` means no arguments; any other non-object is left for the
/// dispatcher to reject.
fn call_envelope(params: &Value) -> CallEnvelope {
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(other) => other.clone(),
    };
    CallEnvelope::new(name, arguments)
}

fn respond<T: Serialize>(id: Option<Value>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {e}")),
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    resp: &JsonRpcResponse,
) -> Result<(), ServeError> {
    let json = serde_json::to_string(resp)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
