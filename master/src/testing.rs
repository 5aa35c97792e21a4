//! Invokers falsos para los tests del scheduler, de los jobs y de la API.

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use common::{apps::WordCount, engine, store::DecodeMode, DoTaskArgs, JobPhase, WorkerAddr};

use crate::pool::WorkerPool;
use crate::scheduler::TaskInvoker;
use crate::state::lock;

type Script = dyn Fn(&str, &DoTaskArgs, u32) -> bool + Send + Sync;

/// Responde según un script `(worker, args, n° de llamada de ese índice)`.
/// Cuenta llamadas y éxitos por índice de tarea.
pub struct ScriptedInvoker {
    script: Box<Script>,
    calls: Mutex<HashMap<usize, u32>>,
    successes: Mutex<HashMap<usize, u32>>,
    total: AtomicU32,
}

impl ScriptedInvoker {
    pub fn new(script: impl Fn(&str, &DoTaskArgs, u32) -> bool + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(HashMap::new()),
            successes: Mutex::new(HashMap::new()),
            total: AtomicU32::new(0),
        }
    }

    pub fn calls_for(&self, index: usize) -> u32 {
        lock(&self.calls).get(&index).copied().unwrap_or(0)
    }

    pub fn successes(&self, index: usize) -> u32 {
        lock(&self.successes).get(&index).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskInvoker for ScriptedInvoker {
    async fn invoke(&self, worker: &WorkerAddr, args: &DoTaskArgs) -> bool {
        self.total.fetch_add(1, Ordering::SeqCst);
        let call = {
            let mut calls = lock(&self.calls);
            let c = calls.entry(args.task_number).or_insert(0);
            *c += 1;
            *c
        };

        // cede el hilo para mezclar los loops como lo haría la red
        tokio::task::yield_now().await;

        let ok = (self.script)(worker.as_str(), args, call);
        if ok {
            *lock(&self.successes).entry(args.task_number).or_insert(0) += 1;
        }
        ok
    }
}

/// Ejecuta las tareas de verdad (WordCount) en este proceso, como si fuera
/// un worker. La primera llamada de cada tarea en `fail_once` falla.
pub struct LocalInvoker {
    work_dir: PathBuf,
    fail_once: Mutex<HashSet<(JobPhase, usize)>>,
}

impl LocalInvoker {
    pub fn new(work_dir: PathBuf, fail_once: &[(JobPhase, usize)]) -> Self {
        Self {
            work_dir,
            fail_once: Mutex::new(fail_once.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl TaskInvoker for LocalInvoker {
    async fn invoke(&self, _worker: &WorkerAddr, args: &DoTaskArgs) -> bool {
        if lock(&self.fail_once).remove(&(args.phase, args.task_number)) {
            return false;
        }

        let work_dir = self.work_dir.clone();
        let args = args.clone();
        tokio::task::spawn_blocking(move || {
            engine::execute_task(&work_dir, &args, &WordCount, DecodeMode::Lenient).is_ok()
        })
        .await
        .unwrap_or(false)
    }
}

/// Espera (con límite) a que el pool tenga `n` workers libres: la
/// devolución es asíncrona y puede llegar después de la barrera.
pub async fn wait_for_pool(pool: &WorkerPool, n: usize) {
    for _ in 0..200 {
        if pool.available() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pool.available(), n, "el pool no recuperó sus workers");
}
