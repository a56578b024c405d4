pub mod cli;
pub mod logging;
pub mod server;
pub mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use qingli_core::{ConfigStore, Monitor};
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    cli::Cli,
    server::AppState,
    status::{SharedStatus, spawn_status_listener},
};

/// 启动轮询器和 Web 界面，直到收到 Ctrl-C
pub async fn run(cli: Cli) -> Result<()> {
    let store = Arc::new(ConfigStore::open(&cli.config).await);
    info!(config = %store.path().display(), "configuration loaded");

    let (monitor, rx) = Monitor::new(Arc::clone(&store));
    let handle = monitor.handle();
    let status = SharedStatus::default();
    spawn_status_listener(Arc::clone(&status), rx);
    tokio::spawn(monitor.run());

    if cli.no_web {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("shutting down");
        return Ok(());
    }

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!(addr = %cli.listen, "web interface listening");
    server::serve(listener, AppState::new(store, handle, status)).await
}
