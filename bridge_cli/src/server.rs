//! MCP server: reads newline-delimited JSON-RPC requests, dispatches them
//! against the model session and writes one response line per request.
//!
//! Requests are handled one at a time in arrival order. Tool failures are
//! reported inside the `tools/call` result (`isError: true`), so a bad call or
//! an unreachable engine never ends the session.

use std::sync::Arc;

use bridge_core::resources::{read_resource, RESOURCES};
use bridge_core::tools::{call_tool, TOOLS};
use bridge_core::{BridgeError, ModelSession};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::prompts;
use crate::protocol::{
    ContentBlock, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PromptGetParams, ResourceReadParams,
    ToolCallParams, ToolCallResult, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
    PROTOCOL_VERSION,
};

const INSTRUCTIONS: &str = "Bridge modelling and analysis server. Build the model with the create_* tools, \
set_support and the load tools, check it with validate_model, then run_analysis and read results with \
get_analysis_results. create_simple_beam_bridge and create_continuous_beam_bridge build a whole girder \
in one call. The model resources under bridge://model/ show its current state. \
Use the prompts for guided workflows.";

pub struct McpServer {
    name: String,
    session: Arc<ModelSession>,
}

impl McpServer {
    pub fn new(name: impl Into<String>, session: Arc<ModelSession>) -> Self {
        McpServer {
            name: name.into(),
            session,
        }
    }

    /// Serve until the input closes
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(reply) = self.handle_line(&line).await {
                writer.write_all(reply.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        info!("input closed, stopping server");
        Ok(())
    }

    /// Answer one input line; notifications get no answer
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<Value>(line) {
            Err(e) => Some(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(PARSE_ERROR, format!("parse error: {e}")),
            )),
            Ok(message) => self.handle_message(message).await,
        }?;
        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "cannot encode response");
                None
            }
        }
    }

    async fn handle_message(&self, message: Value) -> Option<JsonRpcResponse> {
        let id_hint = message.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    id_hint,
                    JsonRpcError::new(INVALID_REQUEST, format!("invalid request: {e}")),
                ))
            }
        };
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::failure(
                request.id.unwrap_or(Value::Null),
                JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
            ));
        }
        if request.is_notification() {
            debug!(method = %request.method, "notification");
            return None;
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        debug!(method = %request.method, %id, "request");
        Some(match self.dispatch(&request.method, request.params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": TOOLS.as_slice() })),
            "tools/call" => {
                let params: ToolCallParams = parse_params(params)?;
                Ok(self.call_tool(params).await)
            }
            "resources/list" => Ok(json!({ "resources": RESOURCES })),
            "resources/read" => {
                let params: ResourceReadParams = parse_params(params)?;
                let contents = read_resource(&self.session, &params.uri)
                    .map_err(|e| JsonRpcError::new(INVALID_PARAMS, e.to_string()))?;
                let text = serde_json::to_string_pretty(&contents)
                    .map_err(|e| JsonRpcError::new(INVALID_PARAMS, e.to_string()))?;
                Ok(json!({
                    "contents": [{"uri": params.uri, "mimeType": "application/json", "text": text}]
                }))
            }
            "prompts/list" => Ok(json!({ "prompts": prompts::catalog() })),
            "prompts/get" => {
                let params: PromptGetParams = parse_params(params)?;
                prompts::render(&params.name, &params.arguments)
                    .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, format!("unknown prompt '{}'", params.name)))
            }
            other => Err(JsonRpcError::new(METHOD_NOT_FOUND, format!("method not found: {other}"))),
        }
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {"listChanged": false},
                "resources": {"subscribe": false, "listChanged": false},
                "prompts": {"listChanged": false}
            },
            "serverInfo": {"name": self.name, "version": env!("CARGO_PKG_VERSION")},
            "instructions": INSTRUCTIONS,
        })
    }

    async fn call_tool(&self, params: ToolCallParams) -> Value {
        let result = match call_tool(&self.session, &params.name, params.arguments).await {
            Ok(output) => ToolCallResult {
                content: vec![ContentBlock::text(output.text)],
                structured_content: Some(output.data),
                is_error: false,
            },
            Err(error) => {
                info!(tool = %params.name, code = error.error_code(), "tool call failed");
                tool_error(&error)
            }
        };
        serde_json::to_value(result).unwrap_or_else(|e| json!({
            "content": [{"type": "text", "text": format!("cannot encode tool result: {e}")}],
            "isError": true
        }))
    }
}

fn tool_error(error: &BridgeError) -> ToolCallResult {
    let mut details = serde_json::to_value(error).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut details {
        map.insert("code".to_string(), json!(error.error_code()));
        map.insert("recoverable".to_string(), json!(error.is_recoverable()));
    }
    ToolCallResult {
        content: vec![ContentBlock::text(format!("[{}] {error}", error.error_code()))],
        structured_content: Some(details),
        is_error: true,
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(params).map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("invalid params: {e}")))
}
