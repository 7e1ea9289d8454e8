//! Process bootstrap for the docweaver tool server.

mod config;
mod http;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ServerConfig;
use crate::server::StdioServer;
use docweaver_engine::{watcher, Project};
use docweaver_tools::catalog::default_registry;

/// Serve a documentation project to agents over stdio JSON-RPC, with an
/// optional browser-facing HTTP API.
#[derive(Debug, Parser)]
#[command(name = "docweaver", version)]
struct Cli {
    /// Root directory of the documentation project.
    project_root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the protocol; all logging goes to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();
    let project = Project::open(&cli.project_root).with_context(|| {
        format!(
            "failed to open documentation project at {}",
            cli.project_root.display()
        )
    })?;
    tracing::info!(
        "indexed {} sections under {}",
        project.read(|index| index.section_count()),
        project.root().display()
    );

    let _watcher = watcher::spawn(Arc::clone(&project)).context("starting file watcher")?;

    if config.enable_webserver {
        let web = http::HttpServer::bind(Arc::clone(&project), config.webserver_port_base)
            .await
            .context("starting web API")?;
        tracing::info!("web API listening on http://127.0.0.1:{}", web.port());
        tokio::spawn(web.serve());
    }

    StdioServer::new(project, default_registry()).run().await
}
