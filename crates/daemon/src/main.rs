// SPDX-License-Identifier: MIT

//! `zd`: the hypervisor control daemon binary.
//!
//! Loads config, sets up logging, builds the registry, reconciles
//! persisted state against live processes, serves the HTTP API, and on
//! `SIGINT`/`SIGTERM` stops the HTTP surface before forcefully stopping
//! every machine (spec.md §4.5, §6).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use zd_daemon::config::{Config, LoadOutcome};
use zd_daemon::{api, logging, LifecycleError};
use zd_datastore::Datastore;
use zd_runtime::{ContainerDriver, EmulatorDriver, RuntimeDriver, TapManager};
use zd_registry::Registry;

/// Forceful-stop timeout used at shutdown for every machine still running.
const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// TAP-to-bridge helper invoked by `EmulatorDriver`; see `zd-bridge-attach`.
const BRIDGE_ATTACH_BIN: &str = "zd-bridge-attach";

/// `docker` CLI invoked by `ContainerDriver`.
const DOCKER_CLI: &str = "docker";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config_path = std::path::PathBuf::from("/etc/zd.json");
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-v" => {
                println!("zd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "-c" | "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("error: {arg} requires a path argument");
                    std::process::exit(1);
                };
                config_path = std::path::PathBuf::from(path);
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: zd [-c|--config <path>] [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = match Config::load(&config_path)? {
        LoadOutcome::WroteDefault { path } => {
            eprintln!("config not found, wrote default to {}", path.display());
            return Ok(());
        }
        LoadOutcome::Loaded(cfg) => cfg,
    };

    let log_path = config.log_path();
    logging::rotate_log_if_needed(&log_path);
    let _log_guard = logging::setup_logging(&log_path)?;

    info!(nodename = %config.nodename, "starting zd");

    let mut datastores = HashMap::new();
    for (name, ds_cfg) in &config.datastores {
        let ds = Datastore::open(name.clone(), ds_cfg.path.clone(), ds_cfg.init)?;
        datastores.insert(name.clone(), ds);
    }

    let mut drivers: HashMap<String, Arc<dyn RuntimeDriver>> = HashMap::new();
    drivers.insert(zd_core::RuntimeKind::EMULATOR.to_string(), Arc::new(EmulatorDriver::new(BRIDGE_ATTACH_BIN)));
    drivers.insert(zd_core::RuntimeKind::CONTAINER.to_string(), Arc::new(ContainerDriver::new(DOCKER_CLI)));

    let registry = Registry::new(datastores, drivers, Arc::new(TapManager::new()))?;
    registry.reconcile().await?;

    let app = api::router(Arc::clone(&registry));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.apiport));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.apiport, e))?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(port = config.apiport, "listening");

    let serve = axum::serve(listener, app);
    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server exited with error");
            }
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down");
        }
    }

    // Stop the HTTP surface first (already dropped with `serve`'s future),
    // then forcefully stop every machine.
    registry.shutdown_all(SHUTDOWN_TIMEOUT).await;
    info!("zd stopped");
    Ok(())
}

fn print_help() {
    println!("zd {}", env!("CARGO_PKG_VERSION"));
    println!("Hypervisor control daemon");
    println!();
    println!("USAGE:");
    println!("    zd [-c|--config <path>]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <path>   Config file path (default: /etc/zd.json)");
    println!("    -h, --help            Print help information");
    println!("    -v, --version         Print version information");
}
