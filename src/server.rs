//! Line-delimited JSON-RPC server over stdio.
//!
//! One JSON object per line in, one per line out. Log output goes to
//! stderr; stdout belongs to the protocol. Tool results are wrapped as
//! MCP-style text content blocks.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use docweaver_engine::Project;
use docweaver_tools::{ToolError, ToolRegistry};

/// Lines longer than this are dropped instead of parsed.
const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

const PROTOCOL_VERSION: &str = "2024-11-05";

pub struct StdioServer {
    project: Arc<Project>,
    registry: ToolRegistry,
    initialized: bool,
}

/// What the loop should do after a message.
enum Step {
    Reply(Value),
    Silent,
    Shutdown(Value),
}

impl StdioServer {
    pub fn new(project: Arc<Project>, registry: ToolRegistry) -> Self {
        Self {
            project,
            registry,
            initialized: false,
        }
    }

    /// Serve until stdin closes or a `shutdown` request arrives.
    pub async fn run(mut self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await.context("reading stdin")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.len() > MAX_LINE_BYTES {
                tracing::warn!("dropping oversized request line ({} bytes)", line.len());
                continue;
            }
            let message: Value = match serde_json::from_str(line) {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!("dropping malformed request: {err}");
                    continue;
                }
            };

            match self.handle(&message) {
                Step::Reply(response) => write_line(&mut stdout, &response).await?,
                Step::Silent => {}
                Step::Shutdown(response) => {
                    write_line(&mut stdout, &response).await?;
                    tracing::info!("shutdown requested, exiting");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Route one decoded message. Notifications return `Silent`.
    fn handle(&mut self, message: &Value) -> Step {
        let id = message.get("id").cloned();
        let method = message.get("method").and_then(Value::as_str).unwrap_or("");

        match method {
            "initialize" => {
                self.initialized = true;
                Step::Reply(ok_response(
                    id,
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": { "tools": {} },
                        "serverInfo": {
                            "name": "docweaver",
                            "version": env!("CARGO_PKG_VERSION"),
                        }
                    }),
                ))
            }
            "notifications/initialized" | "initialized" => Step::Silent,
            "tools/list" => Step::Reply(ok_response(
                id,
                json!({ "tools": self.registry.definitions() }),
            )),
            "tools/call" => Step::Reply(self.handle_tool_call(id, message.get("params"))),
            "ping" => Step::Reply(ok_response(id, json!({}))),
            "shutdown" => Step::Shutdown(ok_response(id, Value::Null)),
            _ if id.is_some() => Step::Reply(error_response(
                id,
                -32601,
                format!("unknown method: {method}"),
                None,
            )),
            // Unknown notification: nothing to say.
            _ => Step::Silent,
        }
    }

    fn handle_tool_call(&self, id: Option<Value>, params: Option<&Value>) -> Value {
        if !self.initialized {
            return error_response(id, -32002, "server not initialized".to_string(), None);
        }
        let Some(name) = params
            .and_then(|params| params.get("name"))
            .and_then(Value::as_str)
        else {
            return error_response(id, -32602, "missing tool name".to_string(), None);
        };
        let default_args = json!({});
        let arguments = params
            .and_then(|params| params.get("arguments"))
            .unwrap_or(&default_args);

        match self.registry.dispatch(name, arguments, &self.project) {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result)
                    .unwrap_or_else(|_| result.to_string());
                ok_response(
                    id,
                    json!({ "content": [{ "type": "text", "text": text }] }),
                )
            }
            Err(err) => tool_error_response(id, &err),
        }
    }
}

fn ok_response(id: Option<Value>, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(Value::Null),
        "result": result,
    })
}

fn error_response(id: Option<Value>, code: i64, message: String, data: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(Value::Null),
        "error": error,
    })
}

fn tool_error_response(id: Option<Value>, err: &ToolError) -> Value {
    let data = err.kind().map(|kind| json!({ "kind": kind }));
    error_response(id, err.code(), err.to_string(), data)
}

async fn write_line(stdout: &mut tokio::io::Stdout, message: &Value) -> Result<()> {
    let mut encoded = serde_json::to_string(message).context("encoding response")?;
    encoded.push('\n');
    stdout
        .write_all(encoded.as_bytes())
        .await
        .context("writing response")?;
    stdout.flush().await.context("flushing stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docweaver_tools::catalog::default_registry;
    use std::fs;

    fn server() -> (tempfile::TempDir, StdioServer) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("main.adoc"),
            "= Intro\n\nHello.\n\n== Overview\n\nBody.\n",
        )
        .unwrap();
        let project = Project::open(dir.path()).unwrap();
        (dir, StdioServer::new(project, default_registry()))
    }

    fn reply(server: &mut StdioServer, message: Value) -> Value {
        match server.handle(&message) {
            Step::Reply(value) | Step::Shutdown(value) => value,
            Step::Silent => panic!("expected a reply"),
        }
    }

    #[test]
    fn initialize_reports_protocol_and_server_info() {
        let (_dir, mut server) = server();
        let response = reply(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        );
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], "docweaver");
    }

    #[test]
    fn tools_call_before_initialize_is_rejected() {
        let (_dir, mut server) = server();
        let response = reply(
            &mut server,
            json!({
                "jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": {"name": "get_structure", "arguments": {}}
            }),
        );
        assert_eq!(response["error"]["code"], -32002);
    }

    #[test]
    fn tools_list_and_call_round_trip() {
        let (_dir, mut server) = server();
        reply(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        );

        let listing = reply(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        );
        assert_eq!(listing["result"]["tools"].as_array().unwrap().len(), 13);

        let response = reply(
            &mut server,
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "get_section", "arguments": {"path": "intro.overview"}}
            }),
        );
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let decoded: Value = serde_json::from_str(text).unwrap();
        assert_eq!(decoded["content"], "Body.");
    }

    #[test]
    fn domain_errors_become_structured_rpc_errors() {
        let (_dir, mut server) = server();
        reply(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        );
        let response = reply(
            &mut server,
            json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "get_section", "arguments": {"path": "ghost"}}
            }),
        );
        assert_eq!(response["error"]["code"], -32000);
        assert_eq!(response["error"]["data"]["kind"], "not_found");
    }

    #[test]
    fn unknown_method_with_id_errors_and_notification_stays_silent() {
        let (_dir, mut server) = server();
        let response = reply(
            &mut server,
            json!({"jsonrpc": "2.0", "id": 9, "method": "bogus/method"}),
        );
        assert_eq!(response["error"]["code"], -32601);

        assert!(matches!(
            server.handle(&json!({"jsonrpc": "2.0", "method": "bogus/notification"})),
            Step::Silent
        ));
        assert!(matches!(
            server.handle(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"})),
            Step::Silent
        ));
    }

    #[test]
    fn shutdown_stops_the_loop() {
        let (_dir, mut server) = server();
        let step = server.handle(&json!({"jsonrpc": "2.0", "id": 7, "method": "shutdown"}));
        assert!(matches!(step, Step::Shutdown(_)));
    }
}
