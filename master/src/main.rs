mod handlers;
mod jobs;
mod pool;
mod rpc;
mod scheduler;
mod state;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use common::config;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::rpc::HttpInvoker;
use crate::state::{AppState, MasterSettings, WorkerRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=debug,tower_http=info")),
        )
        .init();

    let settings = MasterSettings::from_env();
    info!(
        "work_dir={} reintentos={:?} cleanup={}",
        settings.work_dir.display(),
        settings.retry,
        settings.cleanup
    );

    let workers = WorkerRegistry::default();
    let invoker = HttpInvoker::new(config::rpc_timeout(), workers.clone())
        .context("no se pudo crear el cliente HTTP")?;
    let state = AppState::new(settings, workers, Arc::new(invoker));

    // router HTTP
    let app = handlers::build_router(state);

    let addr = config::master_listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", addr))?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
