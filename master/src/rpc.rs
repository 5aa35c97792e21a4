use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{DoTaskArgs, DoTaskResponse, WorkerAddr};
use reqwest::Client;
use tracing::warn;

use crate::scheduler::TaskInvoker;
use crate::state::WorkerRegistry;

/// Ruta del worker que ejecuta una tarea.
pub const DO_TASK_PATH: &str = "/api/v1/tasks/do";

/// Invoca tareas en los workers por HTTP (POST DoTaskArgs -> DoTaskResponse).
/// Éxito sólo si el worker responde 2xx con `ok: true`.
pub struct HttpInvoker {
    client: Client,
    registry: WorkerRegistry,
}

impl HttpInvoker {
    pub fn new(timeout: Option<Duration>, registry: WorkerRegistry) -> reqwest::Result<Self> {
        let mut builder = Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build()?,
            registry,
        })
    }

    async fn call(&self, worker: &str, args: &DoTaskArgs) -> reqwest::Result<bool> {
        let url = format!("{}{}", worker.trim_end_matches('/'), DO_TASK_PATH);
        let resp = self.client.post(&url).json(args).send().await?;

        if !resp.status().is_success() {
            warn!("worker {} devolvió status {}", worker, resp.status());
            return Ok(false);
        }

        let body: DoTaskResponse = resp.json().await?;
        Ok(body.ok)
    }
}

#[async_trait]
impl TaskInvoker for HttpInvoker {
    async fn invoke(&self, worker: &WorkerAddr, args: &DoTaskArgs) -> bool {
        let started = Instant::now();
        self.registry.call_started(worker);

        let ok = match self.call(worker, args).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!("error HTTP llamando al worker {}: {:?}", worker, e);
                false
            }
        };

        self.registry.call_finished(worker, ok, started.elapsed());
        ok
    }
}
