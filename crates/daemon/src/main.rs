// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! crankd: run the sync poller and the job loop against one store.

use crank_daemon::{config::Config, run, sync};
use crank_docker::Docker;
use crank_store::Store;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = start(std::env::args().nth(1).as_deref()).await {
        tracing::error!(error = %err, "crankd failed to start");
        std::process::exit(1);
    }
}

async fn start(mode: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(Config::from_env()?);
    let store = Arc::new(Store::open(&config.database_file)?);
    let docker = Docker::new(config.management_image());
    tracing::info!(
        backend = %config.backend,
        database = %config.database_file.display(),
        "starting"
    );

    match mode {
        Some("sync") => sync::main_loop(&store, &config).await,
        Some("run") => run::main_loop(&store, &config, &docker).await,
        None => {
            let sync_store = Arc::clone(&store);
            let sync_config = Arc::clone(&config);
            let sync_task =
                tokio::spawn(async move { sync::main_loop(&sync_store, &sync_config).await });
            run::main_loop(&store, &config, &docker).await;
            sync_task.abort();
        }
        Some(other) => {
            return Err(format!("unknown mode '{other}' (expected 'run' or 'sync')").into());
        }
    }
    Ok(())
}
