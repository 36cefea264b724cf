// src/lib.rs

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod flow;
pub mod graph;
pub mod logging;
pub mod runner;
pub mod service;
pub mod types;

use std::sync::Arc;

use tracing::{error, info};

use crate::api::AppState;
use crate::cli::CliArgs;
use crate::errors::Result;
use crate::flow::{CommandNodeRunner, WorkflowExecutor};
use crate::graph::{GraphStore, MemoryGraphStore};
use crate::runner::ShellProcessBackend;
use crate::service::{MemoryServiceStore, ServiceRegistry};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - service registry + process backend
/// - workflow executor
/// - the control API server
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = config::load_and_validate(&args.config)?;

    if let Some(host) = args.host {
        cfg.server.host = host;
    }
    if let Some(port) = args.port {
        cfg.server.port = port;
    }

    let registry = ServiceRegistry::new(
        ShellProcessBackend::new(),
        Box::new(MemoryServiceStore::new()),
        cfg.runner.clone(),
    );

    let graphs: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());

    let executor = WorkflowExecutor::new(CommandNodeRunner::new(), cfg.runner.kill_grace());

    let state = AppState {
        registry,
        graphs,
        executor,
    };

    // The accept loop is synchronous; it lives on its own thread and hops
    // onto the runtime per request.
    let handle = tokio::runtime::Handle::current();
    let server_cfg = cfg.server.clone();
    let _server_thread = std::thread::Builder::new()
        .name("control-api".to_string())
        .spawn(move || {
            if let Err(err) = api::serve(&server_cfg, state, handle) {
                error!(error = %err, "control API server failed");
            }
        })?;

    tokio::signal::ctrl_c().await.map_err(crate::errors::ProcdagError::Io)?;
    info!("shutdown requested; exiting");

    Ok(())
}
