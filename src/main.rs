//! DB Hub MCP Server - Main entry point.
//!
//! Serves SQL tools over MCP against named connections to SQLite,
//! PostgreSQL, MySQL/MariaDB, and SQL Server.

use clap::Parser;
use dbhub_mcp_server::config::{Config, TransportMode};
use dbhub_mcp_server::db::ConnectionRegistry;
use dbhub_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    init_tracing(&config);

    info!(
        transport = %config.transport,
        "Starting DB Hub MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = Arc::new(ConnectionRegistry::new());

    // Connect to preconfigured databases; more can be added at runtime via
    // the add_connection tool
    let specs = config.parse_databases()?;
    if !specs.is_empty() {
        info!(count = specs.len(), "Connecting to preconfigured databases");
    }
    for spec in specs {
        info!(connection_id = %spec.id, kind = %spec.kind, "Connecting to database");
        registry.add(spec.id.clone(), spec.kind, spec.params).await?;
    }

    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            let transport = StdioTransport::new(registry);
            transport.run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            let transport = HttpTransport::new(
                registry,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            );
            transport.run().await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
