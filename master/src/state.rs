// master/src/state.rs

use common::{config, JobId, JobInfo, WorkerAddr, WorkerId, WorkerMetrics};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime},
};

use crate::pool::WorkerPool;
use crate::scheduler::{RetryPolicy, SharedProgress, TaskInvoker};

/// Lock que sigue adelante aunque otro hilo haya hecho panic con el lock
/// tomado: el estado que protegen estos mutex no queda a medio escribir.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct MasterSettings {
    pub work_dir: PathBuf,
    pub retry: RetryPolicy,
    pub cleanup: bool,
}

impl MasterSettings {
    pub fn from_env() -> Self {
        Self {
            work_dir: config::work_dir(),
            retry: RetryPolicy::from_max_attempts(config::max_task_attempts()),
            cleanup: config::cleanup_intermediate(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<Mutex<HashMap<JobId, JobEntry>>>,
    pub workers: WorkerRegistry,
    // workers disponibles para recibir tareas
    pub pool: WorkerPool,
    pub invoker: Arc<dyn TaskInvoker>,
    pub settings: MasterSettings,
}

impl AppState {
    pub fn new(
        settings: MasterSettings,
        workers: WorkerRegistry,
        invoker: Arc<dyn TaskInvoker>,
    ) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            workers,
            pool: WorkerPool::new(),
            invoker,
            settings,
        }
    }

    pub fn job_snapshot(&self, id: &str) -> Option<JobInfo> {
        lock(&self.jobs).get(id).map(JobEntry::snapshot)
    }

    /// Aplica `f` sobre la info del job, si existe.
    pub fn update_job(&self, id: &str, f: impl FnOnce(&mut JobEntry)) {
        if let Some(entry) = lock(&self.jobs).get_mut(id) {
            f(entry);
        }
    }
}

/// Un job más el avance en vivo de la fase que está corriendo.
#[derive(Debug, Clone)]
pub struct JobEntry {
    pub info: JobInfo,
    pub live: Option<SharedProgress>,
}

impl JobEntry {
    pub fn new(info: JobInfo) -> Self {
        Self { info, live: None }
    }

    /// Copia de la info con el avance de la fase en curso al día.
    pub fn snapshot(&self) -> JobInfo {
        let mut info = self.info.clone();
        if let Some(live) = &self.live {
            let progress = lock(live).clone();
            match progress.phase {
                common::JobPhase::Map => info.map_progress = Some(progress),
                common::JobPhase::Reduce => info.reduce_progress = Some(progress),
            }
        }
        info
    }
}

/* --------- Registro de workers --------- */

#[derive(Debug, Clone)]
pub struct WorkerMeta {
    pub worker_id: WorkerId,
    pub hostname: String,
    pub registered_at: SystemTime,

    // Métricas de llamadas master -> worker
    pub calls_started: u64,
    pub calls_succeeded: u64,
    pub calls_failed: u64,
    pub total_call_time_ms: u64,
}

/// Workers que se registraron alguna vez, por dirección.
/// Un fallo nunca saca a un worker de acá ni del pool.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    inner: Arc<Mutex<HashMap<WorkerAddr, WorkerMeta>>>,
}

impl WorkerRegistry {
    /// Registra un worker. Devuelve su id y si es la primera vez que se ve
    /// esta dirección (sólo en ese caso hay que meterlo en el pool).
    pub fn register(&self, address: &str, hostname: &str) -> (WorkerId, bool) {
        let mut workers = lock(&self.inner);
        if let Some(meta) = workers.get(address) {
            return (meta.worker_id.clone(), false);
        }

        let worker_id = uuid::Uuid::new_v4().to_string();
        workers.insert(
            address.to_string(),
            WorkerMeta {
                worker_id: worker_id.clone(),
                hostname: hostname.to_string(),
                registered_at: SystemTime::now(),
                calls_started: 0,
                calls_succeeded: 0,
                calls_failed: 0,
                total_call_time_ms: 0,
            },
        );
        (worker_id, true)
    }

    pub fn call_started(&self, address: &str) {
        if let Some(meta) = lock(&self.inner).get_mut(address) {
            meta.calls_started += 1;
        }
    }

    pub fn call_finished(&self, address: &str, ok: bool, elapsed: Duration) {
        if let Some(meta) = lock(&self.inner).get_mut(address) {
            meta.total_call_time_ms += elapsed.as_millis() as u64;
            if ok {
                meta.calls_succeeded += 1;
            } else {
                meta.calls_failed += 1;
            }
        }
    }

    pub fn metrics(&self) -> Vec<WorkerMetrics> {
        let now = SystemTime::now();
        let workers = lock(&self.inner);

        let mut out: Vec<WorkerMetrics> = workers
            .iter()
            .map(|(address, meta)| {
                let finished = meta.calls_succeeded + meta.calls_failed;
                WorkerMetrics {
                    worker_id: meta.worker_id.clone(),
                    address: address.clone(),
                    hostname: meta.hostname.clone(),
                    registered_secs_ago: now
                        .duration_since(meta.registered_at)
                        .unwrap_or_default()
                        .as_secs(),
                    calls_started: meta.calls_started,
                    calls_succeeded: meta.calls_succeeded,
                    calls_failed: meta.calls_failed,
                    avg_call_ms: (finished > 0)
                        .then(|| meta.total_call_time_ms as f64 / finished as f64),
                }
            })
            .collect();
        out.sort_by(|a, b| a.address.cmp(&b.address));
        out
    }
}
