// Allow dead code - some helpers are kept for API completeness
#![allow(dead_code)]

//! Local Pseudo-TLD Resolver Service
//!
//! Resolves names under a reserved pseudo-TLD (".p2p" by default) to
//! loopback addresses and serves a small web responder reachable
//! through them. The host resolver is redirected here for the life of
//! the process and put back exactly as it was on shutdown.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         P2P-DNS                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DNS Responder (53/udp)  ←── A queries for *.p2p            │
//! │  Name Table              ←── static records + wildcard      │
//! │  Resolver Binding        ←── resolv.conf / resolvectl       │
//! │  HTTP Responder (8080)   ←── greeting, peers, metrics       │
//! │  Supervisor              ←── signals, exactly-once restore  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

mod api;
mod binding;
mod config;
mod dns;
mod names;
mod registry;
mod supervisor;

use config::{BindFailurePolicy, BindingStrategy, Config};
use names::NameTable;
use supervisor::Supervisor;

/// Local name resolution for the .p2p pseudo-TLD
#[derive(Parser, Debug)]
#[command(name = "p2p-dns")]
#[command(version)]
#[command(about = "Serve and resolve names under a local pseudo-TLD", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "p2p-dns.toml")]
    config: PathBuf,

    /// DNS responder port (port 53 needs root or CAP_NET_BIND_SERVICE)
    #[arg(long)]
    dns_port: Option<u16>,

    /// HTTP responder port
    #[arg(long)]
    http_port: Option<u16>,

    /// Resolver binding strategy (resolv-conf, resolvectl, disabled)
    #[arg(long)]
    binding: Option<BindingStrategy>,

    /// What to do when binding fails (fail-fast, degraded-no-redirect)
    #[arg(long)]
    on_bind_failure: Option<BindFailurePolicy>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .init();

    info!("🌐 p2p-dns v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        warn!("Config file not found, using defaults");
        Config::default()
    };

    // Override config with CLI args
    let config = config
        .with_dns_port(args.dns_port)
        .with_http_port(args.http_port)
        .with_binding_strategy(args.binding)
        .with_bind_failure_policy(args.on_bind_failure);

    config.validate()?;

    info!("⚙️  Configuration:");
    info!("   Zone: .{}", config.zone);
    info!("   DNS port: {}", config.dns_port);
    info!("   HTTP port: {}", config.http_port);
    info!("   Binding strategy: {}", config.binding_strategy);
    info!("   On bind failure: {}", config.on_bind_failure);

    // Build the name table
    let table = NameTable::new(&config.zone, &config.records, config.wildcard_address);
    info!("📖 Name table loaded with {} records", table.len());
    if let Some(wildcard) = table.wildcard() {
        info!("   Unlisted .{} names answer with {}", config.zone, wildcard);
    }

    let supervisor = Supervisor::new(Arc::new(config), Arc::new(RwLock::new(table)));
    supervisor.run().await
}
