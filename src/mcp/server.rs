/// MCP server implementation that handles JSON-RPC communication
///
/// This module implements the actual MCP server that:
/// 1. Reads newline-delimited JSON-RPC requests
/// 2. Dispatches tool calls and resource reads to a `ToolRegistry`
/// 3. Writes one JSON-RPC response line per request (none for notifications)

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::protocol::*;
use super::McpError;
use crate::provider::{ProviderError, ToolRegistry};

/// MCP server exposing the tools and resources of one registry
pub struct McpServer {
    name: String,
    registry: ToolRegistry,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(name: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the MCP server over stdin/stdout
    pub async fn run_stdio(&mut self) -> Result<(), McpError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve requests from `reader` until it reaches end of input
    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(server = %self.name, tools = self.registry.len(), "Starting MCP server, waiting for JSON-RPC requests...");

        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();

            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("MCP server shutting down (input closed)");
                    break;
                }
                Ok(_) => {
                    if let Some(response) = self.process_line(&line).await {
                        let response_str = serde_json::to_string(&response)?;

                        // Write response + newline
                        writer.write_all(response_str.as_bytes()).await?;
                        writer.write_all(b"\n").await?;
                        writer.flush().await?;

                        debug!("Sent response: {}", response_str);
                    }
                }
                Err(e) => {
                    error!("Failed to read request: {}", e);
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    /// Process a single line of JSON-RPC input
    pub async fn process_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        debug!("Processing request: {}", line);

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse JSON-RPC request: {}", e);
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    error_codes::PARSE_ERROR,
                    format!("Invalid JSON: {}", e),
                    None,
                ));
            }
        };

        self.handle_request(request).await
    }

    async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = match request.id {
            Some(id) => id,
            None => {
                self.handle_notification(&request.method);
                return None;
            }
        };

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => {
                let tools: Vec<ToolInfo> = self.registry.definitions().into_iter().map(ToolInfo::from).collect();
                respond(id, &ListToolsResult { tools })
            }
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "resources/list" => respond(
                id,
                &ListResourcesResult {
                    resources: self.registry.resources(),
                },
            ),
            "resources/templates/list" => respond(
                id,
                &ListResourceTemplatesResult {
                    resource_templates: self.registry.resource_templates(),
                },
            ),
            "resources/read" => self.handle_resources_read(id, request.params).await,
            _ => JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method '{}' not found", request.method),
                None,
            ),
        };
        Some(response)
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" => info!("MCP client initialized"),
            other => debug!(method = %other, "Ignoring notification"),
        }
    }

    /// Handle MCP initialization request
    fn handle_initialize(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        match params.map(serde_json::from_value::<InitializeParams>) {
            Some(Ok(params)) => info!(
                client = %params.client_info.name,
                protocol = %params.protocol_version,
                "MCP client connected"
            ),
            Some(Err(e)) => warn!("Unrecognized initialize parameters: {}", e),
            None => info!("MCP client connected"),
        }

        let resources = if self.registry.resources().is_empty() && self.registry.resource_templates().is_empty() {
            None
        } else {
            Some(ResourcesCapability::default())
        };

        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
                resources,
            },
            server_info: PeerInfo {
                name: self.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        respond(id, &result)
    }

    /// Handle tools/call request
    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let tool_params: ToolCallParams = match parse_params(&id, params) {
            Ok(p) => p,
            Err(response) => return response,
        };

        let result = match self.registry.execute(&tool_params.name, tool_params.arguments).await {
            Ok(output) => ToolCallResult::from(output),
            Err(ProviderError::UnknownTool(name)) => ToolCallResult::error(format!("Unknown tool: {}", name)),
            Err(e) => ToolCallResult::error(e.to_string()),
        };

        respond(id, &result)
    }

    /// Handle resources/read request
    async fn handle_resources_read(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let read_params: ReadResourceParams = match parse_params(&id, params) {
            Ok(p) => p,
            Err(response) => return response,
        };

        match self.registry.read_resource(&read_params.uri).await {
            Some(Ok(text)) => respond(
                id,
                &ReadResourceResult {
                    contents: vec![ResourceContents {
                        uri: read_params.uri,
                        mime_type: Some("text/plain".to_string()),
                        text,
                    }],
                },
            ),
            Some(Err(e)) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string(), None),
            None => JsonRpcResponse::error(
                id,
                error_codes::RESOURCE_NOT_FOUND,
                format!("Resource '{}' not found", read_params.uri),
                None,
            ),
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    id: &Value,
    params: Option<Value>,
) -> Result<T, JsonRpcResponse> {
    let params = params.ok_or_else(|| {
        JsonRpcResponse::error(id.clone(), error_codes::INVALID_PARAMS, "Missing parameters".to_string(), None)
    })?;
    serde_json::from_value(params).map_err(|e| {
        JsonRpcResponse::error(
            id.clone(),
            error_codes::INVALID_PARAMS,
            format!("Invalid parameters: {}", e),
            None,
        )
    })
}

fn respond<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string(), None),
    }
}
