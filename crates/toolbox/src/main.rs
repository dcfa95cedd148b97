//! toolbox - serve database-backed tools over HTTP and MCP.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolbox_core::{Registry, ToolsFile};
use toolbox_mcp::{serve_stdio, Dispatcher};
use toolbox_server::Server;
use toolbox_util::log::{self, LogConfig, LogFormat, LogLevel};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "toolbox")]
#[command(author, version, about = "Serve database-backed tools over HTTP and MCP", long_about = None)]
struct Cli {
    /// Tools file to load
    #[arg(long, default_value = "tools.yaml")]
    tools_file: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1")]
    address: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// Speak MCP over stdin/stdout instead of serving HTTP
    #[arg(long)]
    stdio: bool,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", value_parser = parse_log_level)]
    log_level: LogLevel,

    /// Log output format (standard, json)
    #[arg(long, default_value = "standard", value_parser = parse_log_format)]
    logging_format: LogFormat,
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::parse(s).ok_or_else(|| format!("unknown log level {s:?}"))
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    LogFormat::parse(s).ok_or_else(|| format!("unknown logging format {s:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    log::init(&LogConfig {
        level: cli.log_level,
        format: cli.logging_format,
        include_location: cli.log_level == LogLevel::Trace,
    });

    let tools = ToolsFile::load(&cli.tools_file)
        .with_context(|| format!("unable to load {}", cli.tools_file.display()))?;
    let registry = Arc::new(
        Registry::build(&tools, env!("CARGO_PKG_VERSION"))
            .await
            .context("unable to initialize tools")?,
    );
    info!(
        sources = registry.sources().len(),
        auth_services = registry.auth_services().len(),
        tools = registry.tools().len(),
        toolsets = registry.toolsets().len(),
        "Initialized registry"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    if cli.stdio {
        let result = serve_stdio(Dispatcher::new(registry.clone()), shutdown).await;
        registry.close().await;
        result.context("stdio transport failed")?;
        return Ok(());
    }

    let server = Server::bind(registry, &cli.address, cli.port).await?;
    server.run(shutdown).await?;
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Unable to listen for SIGTERM");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Unable to listen for Ctrl-C");
                    return;
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Unable to listen for Ctrl-C");
            return;
        }
    }
    info!("Shutting down");
    shutdown.cancel();
}
