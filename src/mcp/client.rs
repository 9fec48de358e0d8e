/// MCP client over stdio
///
/// Launches a server subprocess (or attaches to any byte stream pair), runs
/// the initialize handshake, and forwards tool calls as JSON-RPC requests.
/// Requests are strictly sequential: one request is written and its response
/// read before the connection is released.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use super::protocol::*;
use super::McpError;
use crate::provider::{
    ProviderError, ResourceDescriptor, ToolArguments, ToolDefinition, ToolOutput, ToolProvider,
};

/// How to launch a server subprocess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ServerCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Resolve a `--server` target into a command line
    ///
    /// `weather` and `sql` re-launch this binary in `serve` mode. A `.py`
    /// script runs under `python`, a `.js` script under `node`, and anything
    /// else is executed directly. `extra_args` are appended in every case.
    pub fn from_target(target: &str, extra_args: &[String]) -> Result<Self, McpError> {
        let mut command = match target {
            "weather" | "sql" => Self::new(
                std::env::current_exe()?,
                vec!["serve".to_string(), target.to_string()],
            ),
            _ => Self::for_script(Path::new(target)),
        };
        command.args.extend(extra_args.iter().cloned());
        Ok(command)
    }

    fn for_script(path: &Path) -> Self {
        let script = path.to_string_lossy().into_owned();
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") => Self::new("python", vec![script]),
            Some("js") => Self::new("node", vec![script]),
            _ => Self::new(path, Vec::new()),
        }
    }
}

type BoxedReader = Box<dyn AsyncBufRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

struct Connection {
    reader: BoxedReader,
    writer: BoxedWriter,
    next_id: i64,
    /// Set while a request is in flight; still set afterwards if the
    /// exchange was abandoned part way, leaving the stream out of sync
    in_flight: bool,
}

impl Connection {
    fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            reader,
            writer,
            next_id: 1,
            in_flight: false,
        }
    }

    async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), McpError> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read lines until the response carrying `id` arrives
    ///
    /// Server notifications are skipped. Server-initiated requests are
    /// answered: `ping` with an empty result, anything else with
    /// method-not-found.
    async fn receive(&mut self, id: i64) -> Result<JsonRpcResponse, McpError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(McpError::Closed);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(trimmed)?;
            let is_response = value.get("result").is_some() || value.get("error").is_some();
            if is_response {
                if value.get("id").and_then(Value::as_i64) == Some(id) {
                    return Ok(serde_json::from_value(value)?);
                }
                trace!(message = %trimmed, "Skipping response to another request");
                continue;
            }

            match (value.get("method").and_then(Value::as_str), value.get("id")) {
                (Some(method), Some(request_id)) if !request_id.is_null() => {
                    let reply = server_request_reply(method, request_id.clone());
                    debug!(method = %method, "Answering server request");
                    self.send(&reply).await?;
                }
                _ => trace!(message = %trimmed, "Skipping server notification"),
            }
        }
    }
}

fn server_request_reply(method: &str, id: Value) -> JsonRpcResponse {
    match method {
        "ping" => JsonRpcResponse::success(id, json!({})),
        other => JsonRpcResponse::error(
            id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method '{}' not found", other),
            None,
        ),
    }
}

/// A connected MCP server
pub struct McpClient {
    connection: Mutex<Connection>,
    child: Mutex<Option<Child>>,
    server_info: PeerInfo,
}

impl McpClient {
    /// Spawn an MCP server process and connect to it
    ///
    /// The process is killed when the client is dropped.
    pub async fn spawn(command: &ServerCommand) -> Result<Self, McpError> {
        info!(program = %command.program.display(), args = ?command.args, "Spawning MCP server process");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Protocol("Failed to capture server stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Protocol("Failed to capture server stdout".to_string()))?;

        let client = Self::connect(stdout, stdin).await?;
        *client.child.lock().await = Some(child);
        Ok(client)
    }

    /// Perform the handshake over an existing stream pair
    pub async fn connect<R, W>(reader: R, writer: W) -> Result<Self, McpError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut connection = Connection::new(Box::new(BufReader::new(reader)), Box::new(writer));

        let params = json!({
            "protocolVersion": MCP_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "mcp-labs-client",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let result: InitializeResult = roundtrip(&mut connection, "initialize", Some(params)).await?;
        connection
            .send(&JsonRpcRequest::notification("notifications/initialized", None))
            .await?;

        info!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP client initialized"
        );

        Ok(Self {
            connection: Mutex::new(connection),
            child: Mutex::new(None),
            server_info: result.server_info,
        })
    }

    pub fn server_info(&self) -> &PeerInfo {
        &self.server_info
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T, McpError> {
        let mut connection = self.connection.lock().await;
        roundtrip(&mut connection, method, params).await
    }

    /// Fetch the server's tool list
    pub async fn discover_tools(&self) -> Result<Vec<ToolDefinition>, McpError> {
        let result: ListToolsResult = self.request("tools/list", None).await?;
        for tool in &result.tools {
            debug!(name = %tool.name, "Discovered tool");
        }
        Ok(result.tools.into_iter().map(ToolDefinition::from).collect())
    }

    /// Call a tool on the remote server
    pub async fn invoke_tool(&self, name: &str, arguments: &ToolArguments) -> Result<ToolCallResult, McpError> {
        let params = json!({
            "name": name,
            "arguments": arguments,
        });
        self.request("tools/call", Some(params)).await
    }

    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, McpError> {
        let result: ListResourcesResult = self.request("resources/list", None).await?;
        Ok(result.resources)
    }

    /// Read a resource and join its text contents
    pub async fn read_resource(&self, uri: &str) -> Result<String, McpError> {
        let result: ReadResourceResult = self.request("resources/read", Some(json!({"uri": uri}))).await?;
        Ok(result
            .contents
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Stop the server process, if this client spawned one
    pub async fn shutdown(&self) -> Result<(), McpError> {
        if let Some(mut child) = self.child.lock().await.take() {
            info!("Shutting down MCP server process");
            child.kill().await?;
        }
        Ok(())
    }
}

async fn roundtrip<T: DeserializeOwned>(
    connection: &mut Connection,
    method: &str,
    params: Option<Value>,
) -> Result<T, McpError> {
    if connection.in_flight {
        warn!(method = %method, "Connection abandoned mid-request, refusing further use");
        return Err(McpError::Closed);
    }
    let id = connection.next_id;
    connection.next_id += 1;

    debug!(method = %method, id, "Sending request");
    connection.in_flight = true;
    connection.send(&JsonRpcRequest::new(id, method, params)).await?;
    let response = connection.receive(id).await?;
    connection.in_flight = false;

    if let Some(err) = response.error {
        return Err(McpError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    let result = response
        .result
        .ok_or_else(|| McpError::Protocol(format!("response to '{}' has no result", method)))?;
    Ok(serde_json::from_value(result)?)
}

#[async_trait]
impl ToolProvider for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ProviderError> {
        Ok(self.discover_tools().await?)
    }

    async fn call_tool(&self, name: &str, arguments: &ToolArguments) -> Result<ToolOutput, ProviderError> {
        let result = self.invoke_tool(name, arguments).await?;
        Ok(ToolOutput {
            content: result.text(),
            is_error: result.is_error,
        })
    }
}
