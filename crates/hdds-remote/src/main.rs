// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS Remote Object Server
//!
//! Hosts the built-in object types (`List`, `Dict`, `Counter`) plus a shared
//! `Counter` instance published as `counter`.
//!
//! # Usage
//!
//! ```bash
//! # Start server on default port (5000)
//! hdds-remote-server
//!
//! # Custom port and config
//! hdds-remote-server --port 5010 --config server.json
//!
//! # Compact wire encoding
//! hdds-remote-server --codec cbor
//! ```

use clap::Parser;
use hdds_remote::builtins::{self, Counter};
use hdds_remote::{Codec, ObjectRef, ObjectRegistry, ObjectServer, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// HDDS Remote Object Server - drive server-side objects through proxies
#[derive(Parser, Debug)]
#[command(name = "hdds-remote-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wire encoding (json, cbor)
    #[arg(long, default_value = "json")]
    codec: Codec,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_connections: usize,

    /// Maximum message size in bytes
    #[arg(long, default_value_t = hdds_remote::frame::DEFAULT_MAX_MESSAGE_SIZE)]
    max_message_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Load or create config
    let config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig {
            bind_address: args.bind.parse()?,
            port: args.port,
            codec: args.codec,
            max_connections: args.max_connections,
            max_message_size: args.max_message_size,
            ..Default::default()
        }
    };

    let registry = Arc::new(ObjectRegistry::new());
    builtins::register_builtins(&registry)?;
    registry.register_named("counter", ObjectRef::new(Counter::new(0)))?;

    info!("+----------------------------------------------------+");
    info!(
        "|       HDDS Remote Object Server v{}             |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:   {:40} |", config.socket_addr());
    info!("|  Codec:  {:40} |", config.codec.to_string());
    info!(
        "|  Conns:  {:40} |",
        if config.max_connections == 0 {
            "unlimited".to_string()
        } else {
            config.max_connections.to_string()
        }
    );
    info!("|  Types:  {:40} |", registry.type_names().join(", "));
    info!("+----------------------------------------------------+");

    let server = ObjectServer::new(config, registry)?;

    // Handle shutdown signals
    let server_handle = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping server...");
        server_handle.shutdown();
    });

    server.run().await?;

    info!("Remote object server stopped");
    Ok(())
}
