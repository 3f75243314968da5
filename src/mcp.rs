//! MCP (Model Context Protocol) client used as the agent's tool host.
//!
//! The client speaks JSON-RPC 2.0 over one of two transports:
//! - **Stdio**: launch the server as a subprocess and exchange newline-delimited
//!   JSON over its stdin/stdout
//! - **HTTP**: POST each frame to a server endpoint
//!
//! # Example
//! ```rust,ignore
//! use sayr_mcp_agent::mcp::{McpClient, StdioTransport};
//!
//! let transport = StdioTransport::new("python", &["example_mcp_server.py"])?;
//! let client = McpClient::new(transport);
//! let tools = client.list_tools().await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::config::{McpConfig, TransportKind};
use crate::error::{AgentError, Result};
use crate::tool::{ToolDescriptor, ToolHost, ToolOutput};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ─────────────────────────────────────────────────────────────────────────────
// Protocol types
// ─────────────────────────────────────────────────────────────────────────────

/// JSON-RPC request. Notifications carry no `id`.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn call(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(0),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.into(),
            params: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The `result` payload, or the server's error as `AgentError::Mcp`.
    pub fn into_result(self, method: &str) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(AgentError::Mcp(format!(
                "{method} failed ({}): {}",
                error.code, error.message
            )));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Tool definition as listed by a server.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

impl From<McpToolDefinition> for ToolDescriptor {
    fn from(def: McpToolDefinition) -> Self {
        ToolDescriptor::from_schema(def.name, def.description, &def.input_schema)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<McpToolDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport trait
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for the response carrying the same id.
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Send a notification; no response is expected.
    async fn notify(&self, notification: JsonRpcRequest) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<T: McpTransport + ?Sized> McpTransport for Box<T> {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        (**self).send(request).await
    }

    async fn notify(&self, notification: JsonRpcRequest) -> Result<()> {
        (**self).notify(notification).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}

/// Opens the transport described by `cfg`.
pub fn connect(cfg: &McpConfig) -> Result<Box<dyn McpTransport>> {
    match cfg.transport {
        TransportKind::Stdio => {
            let args: Vec<&str> = cfg.args.iter().map(String::as_str).collect();
            tracing::info!(command = %cfg.command, ?args, "launching MCP server");
            Ok(Box::new(StdioTransport::with_env(
                &cfg.command,
                &args,
                cfg.env.clone(),
            )?))
        }
        TransportKind::Http => {
            let url = cfg.url.clone().ok_or_else(|| {
                AgentError::Config("mcp.url is required for the http transport".into())
            })?;
            tracing::info!(%url, "connecting to MCP server");
            Ok(Box::new(HttpTransport::new(url)))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP transport
// ─────────────────────────────────────────────────────────────────────────────

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    request_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            request_id: AtomicU64::new(1),
        }
    }

    async fn post(&self, frame: &JsonRpcRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.url)
            .json(frame)
            .send()
            .await
            .map_err(|e| AgentError::Transport(format!("HTTP request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AgentError::Transport(format!(
                "MCP server answered {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        request.id = Some(self.request_id.fetch_add(1, Ordering::SeqCst));
        self.post(&request)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Mcp(format!("Failed to parse response: {e}")))
    }

    async fn notify(&self, notification: JsonRpcRequest) -> Result<()> {
        self.post(&notification).await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stdio transport
// ─────────────────────────────────────────────────────────────────────────────

pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    request_id: AtomicU64,
}

impl StdioTransport {
    pub fn new(command: &str, args: &[&str]) -> Result<Self> {
        Self::with_env(command, args, HashMap::new())
    }

    pub fn with_env(command: &str, args: &[&str], env: HashMap<String, String>) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| AgentError::Transport(format!("Failed to spawn MCP server: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Transport("MCP server stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| AgentError::Transport("MCP server stdout not available".into()))?;

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(stdout),
            request_id: AtomicU64::new(1),
        })
    }

    async fn write_frame(&self, frame: &JsonRpcRequest) -> Result<()> {
        let mut line = serde_json::to_string(frame)?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AgentError::Transport(format!("Failed to write to MCP server: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| AgentError::Transport(format!("Failed to flush: {e}")))
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        request.id = Some(id);
        self.write_frame(&request).await?;

        let mut stdout = self.stdout.lock().await;
        loop {
            let mut line = String::new();
            let read = stdout
                .read_line(&mut line)
                .await
                .map_err(|e| {
                    AgentError::Transport(format!("Failed to read from MCP server: {e}"))
                })?;
            if read == 0 {
                return Err(AgentError::Transport(
                    "MCP server closed its output before responding".into(),
                ));
            }
            if let Some(response) = match_response(&line, id)? {
                return Ok(response);
            }
        }
    }

    async fn notify(&self, notification: JsonRpcRequest) -> Result<()> {
        self.write_frame(&notification).await
    }

    async fn close(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        if let Some(mut child) = child.take() {
            child
                .kill()
                .await
                .map_err(|e| AgentError::Transport(format!("Failed to kill MCP server: {e}")))?;
        }
        Ok(())
    }
}

/// Returns the response in `line` if it answers request `id`. Blank lines,
/// server notifications and replies to other ids are skipped.
fn match_response(line: &str, id: u64) -> Result<Option<JsonRpcResponse>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let frame: Value = serde_json::from_str(line)
        .map_err(|e| AgentError::Mcp(format!("Failed to parse response: {e}")))?;
    if frame.get("id").and_then(Value::as_u64) != Some(id) {
        tracing::debug!(frame = %line, "skipping unrelated MCP frame");
        return Ok(None);
    }
    serde_json::from_value(frame)
        .map(Some)
        .map_err(|e| AgentError::Mcp(format!("Failed to parse response: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

pub struct McpClient<T: McpTransport> {
    transport: T,
    server_info: Mutex<Option<ServerInfo>>,
}

impl<T: McpTransport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            server_info: Mutex::new(None),
        }
    }

    /// Performs the handshake once; later calls return the cached server info.
    pub async fn initialize(&self) -> Result<ServerInfo> {
        let mut info = self.server_info.lock().await;
        if let Some(existing) = info.as_ref() {
            return Ok(existing.clone());
        }

        let request = JsonRpcRequest::call(
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
        );
        let result = self.transport.send(request).await?.into_result("initialize")?;
        let result: InitializeResult = serde_json::from_value(result)
            .map_err(|e| AgentError::Mcp(format!("Failed to parse initialize result: {e}")))?;

        self.transport
            .notify(JsonRpcRequest::notification("notifications/initialized"))
            .await?;

        tracing::info!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP session initialized"
        );
        *info = Some(result.server_info.clone());
        Ok(result.server_info)
    }

    pub async fn list_tool_definitions(&self) -> Result<Vec<McpToolDefinition>> {
        self.initialize().await?;
        let result = self
            .transport
            .send(JsonRpcRequest::call("tools/list", None))
            .await?
            .into_result("tools/list")?;
        let result: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| AgentError::Mcp(format!("Failed to parse tools/list result: {e}")))?;
        Ok(result.tools)
    }

    /// Raw `tools/call` result.
    pub async fn call_tool_raw(&self, name: &str, arguments: Value) -> Result<Value> {
        self.initialize().await?;
        let request = JsonRpcRequest::call(
            "tools/call",
            Some(serde_json::json!({
                "name": name,
                "arguments": arguments
            })),
        );
        let result = self
            .transport
            .send(request)
            .await?
            .into_result("tools/call")?;
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            tracing::warn!(tool = %name, "tool reported an error result");
        }
        Ok(result)
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }

    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.lock().await.clone()
    }
}

#[async_trait]
impl<T: McpTransport> ToolHost for McpClient<T> {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self
            .list_tool_definitions()
            .await?
            .into_iter()
            .map(ToolDescriptor::from)
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let result = self.call_tool_raw(name, arguments).await?;
        Ok(ToolOutput::from_call_result(&result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Replays canned results and records every frame it was handed.
    #[derive(Default)]
    struct ScriptedTransport {
        results: StdMutex<VecDeque<Value>>,
        frames: StdMutex<Vec<JsonRpcRequest>>,
    }

    impl ScriptedTransport {
        fn new(results: Vec<Value>) -> Self {
            Self {
                results: StdMutex::new(results.into()),
                frames: StdMutex::new(Vec::new()),
            }
        }

        fn methods(&self) -> Vec<String> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|f| f.method.clone())
                .collect()
        }
    }

    #[async_trait]
    impl McpTransport for ScriptedTransport {
        async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
            self.frames.lock().unwrap().push(request);
            let next = self.results.lock().unwrap().pop_front().unwrap();
            Ok(serde_json::from_value(next).unwrap())
        }

        async fn notify(&self, notification: JsonRpcRequest) -> Result<()> {
            self.frames.lock().unwrap().push(notification);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn init_reply() -> Value {
        json!({"jsonrpc":"2.0","id":1,"result":{
            "protocolVersion":"2024-11-05",
            "capabilities":{"tools":{}},
            "serverInfo":{"name":"Calculator","version":"1.0"}
        }})
    }

    #[test]
    fn notification_has_no_id() {
        let request = JsonRpcRequest::notification("notifications/initialized");
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"method\":\"notifications/initialized\""));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn tool_definition_becomes_descriptor() {
        let def: McpToolDefinition = serde_json::from_str(
            r#"{"name":"add","description":"Add two numbers","inputSchema":{"type":"object","properties":{"a":{"type":"integer"},"b":{"type":"integer"}},"required":["a","b"]}}"#,
        )
        .unwrap();
        let tool = ToolDescriptor::from(def);
        assert_eq!(tool.signature(), "add(a: integer, b: integer) - Add two numbers");
    }

    #[test]
    fn matches_only_the_awaited_id() {
        let note = r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#;
        assert!(match_response(note, 3).unwrap().is_none());
        assert!(match_response("\n", 3).unwrap().is_none());
        let other = r#"{"jsonrpc":"2.0","id":2,"result":{}}"#;
        assert!(match_response(other, 3).unwrap().is_none());
        let mine = r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#;
        assert_eq!(match_response(mine, 3).unwrap().unwrap().id, Some(3));
        assert!(matches!(match_response("not json", 3), Err(AgentError::Mcp(_))));
    }

    #[tokio::test]
    async fn initializes_once_before_listing() {
        let transport = ScriptedTransport::new(vec![
            init_reply(),
            json!({"jsonrpc":"2.0","id":2,"result":{"tools":[
                {"name":"add","inputSchema":{"properties":{"a":{"type":"integer"}}}},
                {"name":"add","inputSchema":{}}
            ]}}),
            json!({"jsonrpc":"2.0","id":3,"result":{"tools":[]}}),
        ]);
        let client = McpClient::new(transport);

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].description, None);
        client.list_tools().await.unwrap();

        assert_eq!(
            client.transport.methods(),
            vec!["initialize", "notifications/initialized", "tools/list", "tools/list"]
        );
        assert_eq!(client.server_info().await.unwrap().name, "Calculator");
    }

    #[tokio::test]
    async fn call_tool_normalizes_content() {
        let transport = ScriptedTransport::new(vec![
            init_reply(),
            json!({"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"8"}],"isError":false}}),
        ]);
        let client = McpClient::new(transport);
        let output = client.call_tool("add", json!({"a":5,"b":3})).await.unwrap();
        assert_eq!(output, ToolOutput::Structured(vec!["8".into()]));
    }

    #[tokio::test]
    async fn rpc_error_becomes_mcp_error() {
        let transport = ScriptedTransport::new(vec![
            init_reply(),
            json!({"jsonrpc":"2.0","id":2,"error":{"code":-32602,"message":"Unknown tool: nope"}}),
        ]);
        let client = McpClient::new(transport);
        let err = client.call_tool("nope", json!({})).await.unwrap_err();
        match err {
            AgentError::Mcp(message) => assert!(message.contains("Unknown tool: nope")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn http_config_requires_url() {
        let cfg = McpConfig {
            transport: TransportKind::Http,
            url: None,
            ..McpConfig::default()
        };
        assert!(matches!(connect(&cfg).err(), Some(AgentError::Config(_))));
    }
}
