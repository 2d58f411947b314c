//! The protocol session
//!
//! Owns both halves of the duplex channel. Inbound lines are decoded and handled one
//! at a time in arrival order; every outbound message (responses and the progress
//! notifications emitted during a call) goes through the session's single sink.

use std::sync::Arc;

use rust_mcp_sdk::schema::{
    CallToolResult, ContentBlock, Implementation, InitializeResult, JsonrpcMessage,
    ServerCapabilities, ServerCapabilitiesTools, TextContent,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, warn};

use crate::{
    domain::{
        dispatcher::{Dispatcher, InvocationRequest, InvocationResult, ToolOutput},
        progress::ProgressToken,
        registry::ToolDescriptor,
    },
    errors::{InvocationError, TransportError},
    mcp::{
        rpc::{
            invocation_error_to_json_rpc, is_json_rpc_error, json_rpc_error, json_rpc_result,
            request_id_to_value, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
        },
        transport::MessageSink,
    },
};

/// Newest first; the first entry is offered when the client asks for something else.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

const SERVER_INSTRUCTIONS: &str =
    "Call ask_human when a decision or fact can only come from a person.";

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
    #[serde(rename = "_meta", default)]
    meta: Option<Map<String, Value>>,
}

pub struct Session {
    dispatcher: Arc<Dispatcher>,
    sink: Arc<dyn MessageSink>,
}

impl Session {
    pub fn new(dispatcher: Arc<Dispatcher>, sink: Arc<dyn MessageSink>) -> Self {
        Self { dispatcher, sink }
    }

    pub fn on_list_tools(&self) -> &[ToolDescriptor] {
        self.dispatcher.registry().list_tools()
    }

    /// Builds the invocation and runs it to a terminal result. A malformed progress
    /// token fails the call before dispatch. A panic inside the handler is reported
    /// as a handler failure instead of tearing down the session.
    pub async fn on_call_tool(
        &self,
        name: String,
        arguments: Option<Map<String, Value>>,
        meta: Option<&Map<String, Value>>,
    ) -> InvocationResult {
        let correlation_token = meta.map(ProgressToken::from_meta).transpose()?.flatten();
        let request = InvocationRequest {
            tool_name: name,
            arguments: arguments.unwrap_or_default(),
            correlation_token,
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        match tokio::spawn(async move { dispatcher.dispatch(request).await }).await {
            Ok(result) => result,
            Err(join_error) => {
                error!(error = %join_error, "tool dispatch aborted");
                Err(InvocationError::handler("tool handler aborted unexpectedly"))
            }
        }
    }

    /// Reads newline-delimited JSON-RPC messages until the input closes. Only a
    /// read failure or a failed write ends the loop early; a line that is not
    /// UTF-8 is answered with a parse error like any other undecodable line.
    pub async fn run<R>(&self, mut reader: R) -> Result<(), TransportError>
    where
        R: AsyncBufRead + Unpin,
    {
        info!("session started");
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let outcome = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(line.trim()).await,
                Err(err) => {
                    warn!(error = %err, "message is not valid UTF-8");
                    self.sink
                        .send(&json_rpc_error(None, PARSE_ERROR, "Parse error"))
                        .await
                }
            };

            if let Err(err) = outcome {
                error!(error = %err, "failed to write response, closing session");
                return Err(err);
            }
        }

        info!("end of input, session closed");
        Ok(())
    }

    pub async fn handle_line(&self, line: &str) -> Result<(), TransportError> {
        let payload: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "unparsable message");
                return self.sink.send(&json_rpc_error(None, PARSE_ERROR, "Parse error")).await;
            }
        };

        if let Some(batch) = payload.as_array() {
            if batch.is_empty() {
                return self
                    .sink
                    .send(&json_rpc_error(None, INVALID_REQUEST, "Invalid Request"))
                    .await;
            }

            let mut responses = Vec::new();
            for item in batch {
                if let Some(response) = self.handle_json_rpc_value(item.clone()).await {
                    responses.push(response);
                }
            }

            if responses.is_empty() {
                return Ok(());
            }
            return self.sink.send(&Value::Array(responses)).await;
        }

        match self.handle_json_rpc_value(payload).await {
            Some(response) => self.sink.send(&response).await,
            None => Ok(()),
        }
    }

    pub async fn handle_json_rpc_value(&self, payload: Value) -> Option<Value> {
        if !payload.is_object() {
            return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
        }

        let request_id = payload.get("id").cloned();
        let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(_) => return Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request")),
        };

        match parsed {
            JsonrpcMessage::Request(request) => {
                let request_id = request_id_to_value(request.id);
                if request.method.trim().is_empty() {
                    return Some(json_rpc_error(
                        Some(request_id),
                        INVALID_REQUEST,
                        "Invalid Request",
                    ));
                }

                Some(
                    self.handle_json_rpc_request(
                        Some(request_id),
                        request.method,
                        request.params.map(Value::Object),
                    )
                    .await,
                )
            }
            JsonrpcMessage::Notification(notification) => {
                info!(method = %notification.method, "notification received");
                None
            }
            JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => {
                Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request"))
            }
        }
    }

    pub async fn handle_json_rpc_request(
        &self,
        id: Option<Value>,
        method: String,
        params: Option<Value>,
    ) -> Value {
        let mut tool = None;

        let response = match method.as_str() {
            "initialize" => initialize_response(id, params.as_ref()),
            "ping" => json_rpc_result(id, json!({})),
            "tools/list" => json_rpc_result(id, json!({ "tools": self.on_list_tools() })),
            "tools/call" => match params.map(serde_json::from_value::<CallToolParams>) {
                Some(Ok(call)) => {
                    tool = Some(call.name.clone());
                    self.call_tool_response(id, call).await
                }
                _ => json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
            },
            _ => json_rpc_error(id, METHOD_NOT_FOUND, "Method not found"),
        };

        info!(
            method = %method,
            tool = tool.as_deref().unwrap_or("-"),
            outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
            "mcp action audited"
        );

        response
    }

    async fn call_tool_response(&self, id: Option<Value>, call: CallToolParams) -> Value {
        match self
            .on_call_tool(call.name, call.arguments, call.meta.as_ref())
            .await
        {
            Ok(output) => json_rpc_result(id, call_tool_result(output)),
            Err(err) => {
                warn!(kind = %err.kind(), error = %err, "tool call failed");
                invocation_error_to_json_rpc(id, err)
            }
        }
    }
}

pub fn negotiate_protocol_version(params: Option<&Value>) -> Option<&'static str> {
    let offered = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())?;

    Some(
        SUPPORTED_PROTOCOL_VERSIONS
            .into_iter()
            .find(|supported| *supported == offered)
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]),
    )
}

fn initialize_response(id: Option<Value>, params: Option<&Value>) -> Value {
    let Some(protocol_version) = negotiate_protocol_version(params) else {
        return json_rpc_error(id, INVALID_PARAMS, "Invalid params");
    };

    let initialize_result = InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            ..Default::default()
        },
        protocol_version: protocol_version.to_string(),
        instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        meta: None,
    };

    json_rpc_result(
        id,
        serde_json::to_value(initialize_result).expect("initialize result serialization"),
    )
}

fn call_tool_result(output: ToolOutput) -> Value {
    let content = output
        .content
        .into_iter()
        .map(|item| ContentBlock::from(TextContent::new(item.text, None, None)))
        .collect();

    serde_json::to_value(CallToolResult {
        content,
        is_error: None,
        meta: None,
        structured_content: None,
    })
    .expect("tool result serialization")
}
