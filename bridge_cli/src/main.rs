//! # bridge-mcp
//!
//! MCP server for bridge modelling and analysis. Speaks JSON-RPC 2.0 over
//! stdio; logs go to stderr.
//!
//! ```text
//! bridge-mcp --config bridge-mcp.toml --engine-addr 127.0.0.1:7878
//! ```

mod prompts;
mod protocol;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_core::config::{BridgeConfig, EngineKind};
use bridge_core::ModelSession;
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::server::McpServer;

#[derive(Parser, Debug)]
#[command(name = "bridge-mcp", version, about = "MCP server for bridge modelling and analysis")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "BRIDGE_MCP_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `bridge_core=trace`
    #[arg(long)]
    log_level: Option<String>,

    /// Analysis engine bridge address (`host:port`); selects the TCP engine
    #[arg(long)]
    engine_addr: Option<String>,

    /// Name of the model opened at startup
    #[arg(long)]
    model_name: Option<String>,
}

/// Defaults, then the config file, then the environment, then flags
fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    config.apply_env();
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(address) = &cli.engine_addr {
        config.engine.kind = EngineKind::Tcp;
        config.engine.address = Some(address.clone());
    }
    if let Some(name) = &cli.model_name {
        config.model_name = name.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// `RUST_LOG` wins over the configured level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.log_level);

    let session = Arc::new(ModelSession::from_config(&config).context("opening model session")?);
    info!(
        server = %config.server_name,
        model = %config.model_name,
        engine = session.engine_name(),
        "bridge-mcp ready on stdio"
    );

    let server = McpServer::new(config.server_name.clone(), session);
    server
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
        .context("stdio transport failed")?;
    Ok(())
}
