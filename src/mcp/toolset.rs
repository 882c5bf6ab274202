//! MCP toolset: wires a tool-providing subprocess into an agent.
//!
//! [`McpToolset`] spawns an MCP server (by default this binary's `serve`
//! subcommand), lists its tools once, and dispatches calls to it with a
//! per-call timeout.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use rmcp::{
    ServiceExt,
    model::{CallToolRequestParams, RawContent},
    service::{RoleClient, RunningService},
    transport::TokioChildProcess,
};
use serde::Serialize;
use tokio::process::Command;

use crate::config::AgentConfig;
use crate::logging::DataSource;

/// How to launch the MCP server subprocess.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StdioConnectionParams {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Per-call timeout.
    #[serde(rename = "timeout_secs", serialize_with = "serialize_secs")]
    pub timeout: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl StdioConnectionParams {
    /// Build from agent config. Without an explicit `server_command` the
    /// server is this very executable.
    pub fn from_config(config: &AgentConfig) -> std::io::Result<Self> {
        let command = match &config.server_command {
            Some(cmd) => PathBuf::from(cmd),
            None => std::env::current_exe()?,
        };
        Ok(Self {
            command,
            args: config.server_args.clone(),
            cwd: config.server_cwd.clone(),
            env: BTreeMap::new(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(self.args.iter().map(OsString::from));
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }
}

/// Errors from talking to the MCP server.
#[derive(Debug, thiserror::Error)]
pub enum ToolsetError {
    #[error("failed to start MCP server: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("MCP handshake failed: {0}")]
    Handshake(String),
    #[error("mcp tool '{0}' not available")]
    UnknownTool(String),
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),
    #[error("mcp call failed: {0}")]
    Call(String),
    #[error("mcp tool '{name}' timed out after {secs}s")]
    Timeout { name: String, secs: u64 },
    #[error("mcp tool error: {0}")]
    Tool(String),
}

/// A tool advertised by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A connected MCP server and the tools it advertised.
pub struct McpToolset {
    peer: RunningService<RoleClient, ()>,
    tools: BTreeMap<String, ToolInfo>,
    timeout: Duration,
}

impl McpToolset {
    /// Spawn the server and complete the MCP handshake.
    pub async fn connect_stdio(params: &StdioConnectionParams) -> Result<Self, ToolsetError> {
        let transport = TokioChildProcess::new(params.to_command())?;
        let peer: RunningService<RoleClient, ()> = ()
            .serve(transport)
            .await
            .map_err(|e| ToolsetError::Handshake(e.to_string()))?;
        Self::from_peer(peer, params.timeout).await
    }

    /// Adopt an already-initialized client peer (any transport).
    pub async fn from_peer(
        peer: RunningService<RoleClient, ()>,
        timeout: Duration,
    ) -> Result<Self, ToolsetError> {
        let mcp_tools = peer
            .list_all_tools()
            .await
            .map_err(|e| ToolsetError::Handshake(e.to_string()))?;

        let tools: BTreeMap<String, ToolInfo> = mcp_tools
            .iter()
            .map(|t| {
                let info = convert_tool(t);
                (info.name.clone(), info)
            })
            .collect();

        let source = DataSource::Agent;
        tracing::info!(%source, tools = tools.len(), "connected to MCP server");
        Ok(Self {
            peer,
            tools,
            timeout,
        })
    }

    /// Tools advertised by the server, ordered by name.
    pub fn tools(&self) -> impl Iterator<Item = &ToolInfo> {
        self.tools.values()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Call a tool with JSON object arguments; returns its text output.
    pub async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, ToolsetError> {
        if !self.has_tool(name) {
            return Err(ToolsetError::UnknownTool(name.to_string()));
        }

        let params = CallToolRequestParams::new(name.to_string());
        let params = match arguments {
            serde_json::Value::Object(map) => params.with_arguments(map),
            serde_json::Value::Null => params,
            other => {
                return Err(ToolsetError::InvalidArguments(format!(
                    "expected an object, got {other}"
                )));
            }
        };

        let result = tokio::time::timeout(self.timeout, self.peer.call_tool(params))
            .await
            .map_err(|_| ToolsetError::Timeout {
                name: name.to_string(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ToolsetError::Call(e.to_string()))?;

        let text = extract_text(&result.content);
        if result.is_error == Some(true) {
            Err(ToolsetError::Tool(text))
        } else {
            Ok(text)
        }
    }

    /// Close the connection and wait for the server to exit.
    pub async fn shutdown(self) -> Result<(), ToolsetError> {
        self.peer
            .cancel()
            .await
            .map(|_| ())
            .map_err(|e| ToolsetError::Call(e.to_string()))
    }
}

/// Convert an rmcp tool into our description of it.
pub fn convert_tool(mcp_tool: &rmcp::model::Tool) -> ToolInfo {
    ToolInfo {
        name: mcp_tool.name.to_string(),
        description: mcp_tool
            .description
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default(),
        input_schema: serde_json::Value::Object(mcp_tool.input_schema.as_ref().clone()),
    }
}

/// Extract text content from MCP Content items.
fn extract_text(content: &[rmcp::model::Content]) -> String {
    content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
