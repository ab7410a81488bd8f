//! ==============================================================================
//! main.rs - gpio console entry point
//! ==============================================================================
//!
//! purpose:
//!     operator console for a remote hardware-access service that owns the
//!     pins of a 40-position header. the console pulls the header state, lets
//!     the operator stage direction changes, and commits setup / write / read
//!     actions one pin at a time.
//!
//! responsibilities:
//!     - load configuration (console.toml + cli overrides)
//!     - initialise tracing
//!     - build the http client for the pin service
//!     - initial load, then start the refresh scheduler
//!     - serve the operator console until ctrl-c
//!
//! relationships:
//!     - uses: config.rs, service.rs (HttpPinService), controller.rs,
//!       scheduler.rs, console.rs
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                     console (this binary)                    │
//!     │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//!     │  │  scheduler   │   │  web console │   │  operator forms  │  │
//!     │  │  (5s ticks)  │   │  (port 8080) │   │  edit / commit   │  │
//!     │  └──────┬───────┘   └──────┬───────┘   └────────┬─────────┘  │
//!     │         └──────────────────┼────────────────────┘            │
//!     │                      ┌─────┴──────┐                          │
//!     │                      │ controller │ <- controller.rs         │
//!     │                      └─────┬──────┘                          │
//!     │        snapshot store + pending edits -> reconcile -> views  │
//!     └────────────────────────────┼─────────────────────────────────┘
//!                                  │ http / json
//!                        ┌─────────┴─────────┐
//!                        │ pin service       │
//!                        │ (owns the header) │
//!                        └───────────────────┘
//!
//! ==============================================================================

mod activity;
mod config;
mod console;
mod controller;
mod domain;
mod error;
mod pending;
mod reconcile;
mod scheduler;
mod service;
mod snapshot;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigSource, ConsoleConfig};
use crate::controller::{Controller, RefreshOutcome};
use crate::scheduler::RefreshScheduler;
use crate::service::HttpPinService;

#[derive(Debug, Parser)]
#[command(name = "webgpio-console", version, about = "Operator console for a remote GPIO service")]
struct Args {
    /// config file (default: config/console.toml, then ../config/console.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// pin service base url, overrides [remote].base_url
    #[arg(long)]
    base_url: Option<String>,

    /// console listen address, overrides [console].bind
    #[arg(long)]
    bind: Option<String>,

    /// start with auto-refresh off
    #[arg(long)]
    no_auto_refresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // step 1: configuration (before tracing, the filter lives in it)
    let (mut config, source) = match &args.config {
        Some(path) => (
            ConsoleConfig::load(path).with_context(|| format!("config {}", path.display()))?,
            ConfigSource::File(path.clone()),
        ),
        None => ConsoleConfig::load_or_default(),
    };
    if let Some(base_url) = args.base_url {
        config.remote.base_url = base_url;
    }
    if let Some(bind) = args.bind {
        config.console.bind = bind;
    }
    if args.no_auto_refresh {
        config.refresh.auto_start = false;
    }

    // step 2: logging. RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("===========================================================");
    println!("  WebGPIO Console");
    println!("  \"Desired vs. actual, one pin at a time\"");
    println!("===========================================================");
    source.log();
    config.log_summary();

    // step 3: pin service client + controller
    let service = HttpPinService::new(&config.remote.base_url, config.request_timeout())
        .context("building pin service client")?;
    tracing::info!("[STARTUP] ✓ pin service client for {}", service.base_url());
    let controller = Controller::new(Arc::new(service), config.controller_options());

    // step 4: initial load. a failure is reported in the console, not fatal
    match controller.load().await {
        RefreshOutcome::Applied(count) => tracing::info!("[STARTUP] ✓ {} pins loaded", count),
        RefreshOutcome::Failed(e) => tracing::warn!("[STARTUP] initial load failed: {}", e),
        RefreshOutcome::Skipped => {}
    }

    // step 5: refresh scheduler
    let scheduler = RefreshScheduler::new(controller.clone(), config.refresh_interval());
    if config.refresh.auto_start {
        scheduler.start().await;
    }

    // step 6: console, until ctrl-c
    let state = console::ConsoleState {
        controller,
        scheduler: scheduler.clone(),
    };
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let served = console::serve(&config.console.bind, state, shutdown)
        .await
        .with_context(|| format!("console on {}", config.console.bind));

    scheduler.stop().await;
    tracing::info!("[SHUTDOWN] console stopped");
    served
}
