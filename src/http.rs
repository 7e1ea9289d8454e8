//! Minimal browser-facing HTTP API.
//!
//! A hand-rolled HTTP/1.1 GET responder over a `TcpListener`: read the
//! request head, route, emit one JSON response, close. The surface is five
//! read-only routes, so there is no web framework here, just the usual
//! header-then-body framing discipline.

use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use docweaver_engine::Project;
use docweaver_types::EngineError;

/// How many consecutive ports to try from the configured base.
const PORT_SCAN_RANGE: u16 = 20;

pub struct HttpServer {
    listener: TcpListener,
    project: Arc<Project>,
    port: u16,
}

impl HttpServer {
    /// Bind the first free port in `[port_base, port_base + 19]`.
    pub async fn bind(project: Arc<Project>, port_base: u16) -> Result<Self> {
        for offset in 0..PORT_SCAN_RANGE {
            let port = port_base + offset;
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => {
                    return Ok(Self {
                        listener,
                        project,
                        port,
                    });
                }
                Err(err) => {
                    tracing::debug!("port {port} unavailable: {err}");
                }
            }
        }
        bail!(
            "no free port in {}..={}",
            port_base,
            port_base + PORT_SCAN_RANGE - 1
        );
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept loop; one task per connection.
    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let project = Arc::clone(&self.project);
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, project).await {
                            tracing::debug!("http connection error: {err}");
                        }
                    });
                }
                Err(err) => {
                    tracing::warn!("accept failed: {err}");
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, project: Arc<Project>) -> Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .context("reading request line")?;
    // Drain headers; the API needs none of them.
    loop {
        let mut header = String::new();
        let read = reader
            .read_line(&mut header)
            .await
            .context("reading header")?;
        if read == 0 || header.trim().is_empty() {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("/");

    let (status, body) = if method == "GET" {
        route(&project, target)
    } else {
        (
            405,
            json!({ "error": format!("method {method} not allowed") }),
        )
    };

    let payload = body.to_string();
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let mut stream = reader.into_inner();
    stream
        .write_all(response.as_bytes())
        .await
        .context("writing response")?;
    stream.shutdown().await.ok();
    Ok(())
}

fn engine_error_status(err: &EngineError) -> u16 {
    match err {
        EngineError::NotFound(_) => 404,
        EngineError::InvalidArgument(_) => 400,
        _ => 500,
    }
}

fn error_body(err: &EngineError) -> Value {
    json!({ "error": err.to_string(), "kind": err.kind() })
}

fn to_json<T: serde::Serialize>(value: &T) -> (u16, Value) {
    match serde_json::to_value(value) {
        Ok(value) => (200, value),
        Err(err) => (500, json!({ "error": err.to_string() })),
    }
}

/// Dispatch one GET request target.
fn route(project: &Project, target: &str) -> (u16, Value) {
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    match path {
        "/api/structure" => to_json(&project.read(|index| index.get_root_files_structure())),
        "/api/metadata" => to_json(&project.read(|index| index.project_metadata())),
        "/api/dependencies" => to_json(&project.read(|index| index.get_dependencies())),
        "/api/validate" => to_json(&project.read(|index| index.validate_structure())),
        _ => match path.strip_prefix("/api/section/") {
            Some(encoded) => section_route(project, encoded, query),
            None => (404, json!({ "error": format!("no such route: {path}") })),
        },
    }
}

fn section_route(project: &Project, encoded_id: &str, query: Option<&str>) -> (u16, Value) {
    let id = match percent_decode_str(encoded_id).decode_utf8() {
        Ok(id) => id.into_owned(),
        Err(_) => {
            return (400, json!({ "error": "section id is not valid UTF-8" }));
        }
    };
    let full_context = query
        .map(|query| {
            query
                .split('&')
                .any(|pair| pair == "context=full")
        })
        .unwrap_or(false);

    let view = match project.read(|index| index.get_section(&id)) {
        Ok(view) => view,
        Err(err) => return (engine_error_status(&err), error_body(&err)),
    };
    let (status, mut body) = to_json(&view);
    if status != 200 || !full_context {
        return (status, body);
    }

    let source = project.root().join(&view.source_file);
    match std::fs::read_to_string(&source) {
        Ok(full_content) => {
            body["full_content"] = Value::String(full_content);
            body["section_position"] = json!({
                "line_start": view.line_start,
                "line_end": view.line_end,
            });
            (200, body)
        }
        Err(err) => {
            let err = EngineError::io(view.source_file.clone(), err);
            (engine_error_status(&err), error_body(&err))
        }
    }
}
