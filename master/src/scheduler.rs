//! Scheduler de fases.
//!
//! Cada índice de tarea tiene su propio loop de asignación (una task de
//! tokio): saca un worker del pool, le pide que ejecute la tarea, lo
//! devuelve al pool en segundo plano y, si la llamada falló, vuelve a
//! empezar. La fase termina cuando todos los loops salieron.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{DoTaskArgs, JobPhase, PhaseProgress, TaskState, WorkerAddr};
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::pool::{PoolClosed, WorkerPool};
use crate::state::lock;

/// Transporte master -> worker: "ejecutá esta tarea".
/// Cualquier problema (timeout, worker caído, error de la tarea) es `false`.
#[async_trait]
pub trait TaskInvoker: Send + Sync + 'static {
    async fn invoke(&self, worker: &WorkerAddr, args: &DoTaskArgs) -> bool;
}

/// Cuántas veces se intenta una tarea antes de rendirse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Reintentar hasta que salga bien. Si nunca vuelve a haber un worker
    /// sano, la fase queda colgada en vez de fallar.
    #[default]
    Unbounded,
    MaxAttempts(u32),
}

impl RetryPolicy {
    /// `None` o `Some(0)` = sin límite.
    pub fn from_max_attempts(max: Option<u32>) -> Self {
        match max {
            Some(n) if n > 0 => RetryPolicy::MaxAttempts(n),
            _ => RetryPolicy::Unbounded,
        }
    }

    fn allows_another(&self, attempts_done: u32) -> bool {
        match self {
            RetryPolicy::Unbounded => true,
            RetryPolicy::MaxAttempts(max) => attempts_done < *max,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    PoolClosed(#[from] PoolClosed),

    #[error("la tarea {phase} {index} falló {attempts} veces, no se reintenta más")]
    TaskExhausted {
        phase: JobPhase,
        index: usize,
        attempts: u32,
    },

    #[error("un loop de asignación terminó de forma anormal: {0}")]
    Join(#[from] JoinError),
}

/// Avance de una fase, compartido con quien quiera mirarlo (la API).
pub type SharedProgress = Arc<Mutex<PhaseProgress>>;

/// Resultado de una fase completa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: JobPhase,
    /// Intentos que necesitó cada índice hasta quedar Done
    pub attempts: Vec<u32>,
}

impl PhaseReport {
    pub fn retries(&self) -> u32 {
        self.attempts.iter().map(|a| a.saturating_sub(1)).sum()
    }
}

fn set_state(progress: &SharedProgress, index: usize, state: TaskState) {
    if let Some(slot) = lock(progress).tasks.get_mut(index) {
        // Done no se pisa nunca
        if !slot.is_done() {
            *slot = state;
        }
    }
}

/// Loop de asignación de un índice. Devuelve los intentos que hicieron falta.
async fn run_task_loop(
    index: usize,
    args: DoTaskArgs,
    pool: WorkerPool,
    invoker: Arc<dyn TaskInvoker>,
    policy: RetryPolicy,
    progress: SharedProgress,
) -> Result<u32, SchedulerError> {
    let phase = args.phase;
    let mut attempt: u32 = 0;

    loop {
        // (a) esperar un worker libre
        let worker = pool.take().await?;
        attempt += 1;
        set_state(&progress, index, TaskState::Running { attempt });

        // (b) llamada sincrónica al worker
        let ok = invoker.invoke(&worker, &args).await;
        if !ok {
            warn!(
                "intento {} de la tarea {} {} falló en el worker {}",
                attempt, phase, index, worker
            );
        }

        // (c) el worker vuelve al pool pase lo que pase, sin esperar
        pool.give_back(worker);

        // (d) listo, o a reintentar
        if ok {
            set_state(&progress, index, TaskState::Done { attempts: attempt });
            debug!("tarea {} {} lista en {} intento(s)", phase, index, attempt);
            return Ok(attempt);
        }

        if !policy.allows_another(attempt) {
            set_state(&progress, index, TaskState::Exhausted { attempts: attempt });
            return Err(SchedulerError::TaskExhausted {
                phase,
                index,
                attempts: attempt,
            });
        }
        set_state(&progress, index, TaskState::Pending);
    }
}

/// Ejecuta una fase: `tasks[i]` es la tarea de índice i.
///
/// Bloquea hasta que todos los índices terminaron su loop. Con
/// `RetryPolicy::Unbounded` eso es "hasta que todos quedaron Done". Con un
/// límite de intentos, una tarea agotada no corta a las demás: se espera a
/// todas y recién después se devuelve el error.
pub async fn schedule(
    pool: &WorkerPool,
    invoker: Arc<dyn TaskInvoker>,
    phase: JobPhase,
    tasks: Vec<DoTaskArgs>,
    policy: RetryPolicy,
    progress: SharedProgress,
) -> Result<PhaseReport, SchedulerError> {
    let n_tasks = tasks.len();
    info!(
        "schedule: {} tareas {} ({} workers libres)",
        n_tasks,
        phase,
        pool.available()
    );

    let mut loops = JoinSet::new();
    for (index, args) in tasks.into_iter().enumerate() {
        let pool = pool.clone();
        let invoker = Arc::clone(&invoker);
        let progress = Arc::clone(&progress);
        loops.spawn(async move {
            let res = run_task_loop(index, args, pool, invoker, policy, progress).await;
            (index, res)
        });
    }

    // Barrera: esperar a todos los loops
    let mut attempts = vec![0u32; n_tasks];
    let mut first_error: Option<SchedulerError> = None;
    while let Some(joined) = loops.join_next().await {
        match joined {
            Ok((index, Ok(n))) => attempts[index] = n,
            Ok((_, Err(e))) => {
                warn!("fase {}: {}", phase, e);
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(SchedulerError::Join(e));
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    let report = PhaseReport { phase, attempts };
    info!(
        "schedule: fase {} terminada ({} reintentos)",
        phase,
        report.retries()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_for_pool, ScriptedInvoker};
    use std::time::Duration;
    use tokio::time::timeout;

    fn map_tasks(n: usize) -> Vec<DoTaskArgs> {
        (0..n)
            .map(|i| DoTaskArgs::map("job", i, &format!("in-{i}.txt"), 2))
            .collect()
    }

    fn new_progress(n: usize) -> SharedProgress {
        Arc::new(Mutex::new(PhaseProgress::new(JobPhase::Map, n)))
    }

    fn pool_with(workers: &[&str]) -> WorkerPool {
        let pool = WorkerPool::new();
        for w in workers {
            pool.put(w.to_string());
        }
        pool
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn schedule_completa_todas_las_tareas_y_devuelve_los_workers() {
        let pool = pool_with(&["w1", "w2", "w3"]);
        let invoker = Arc::new(ScriptedInvoker::new(|_, _, _| true));
        let progress = new_progress(10);

        let report = schedule(
            &pool,
            invoker.clone(),
            JobPhase::Map,
            map_tasks(10),
            RetryPolicy::Unbounded,
            progress.clone(),
        )
        .await
        .unwrap();

        assert_eq!(report.attempts, vec![1; 10]);
        assert_eq!(report.retries(), 0);
        assert_eq!(lock(&progress).done(), 10);
        for i in 0..10 {
            assert_eq!(invoker.successes(i), 1);
        }
        wait_for_pool(&pool, 3).await;
    }

    #[tokio::test]
    async fn schedule_sin_tareas_vuelve_enseguida() {
        let pool = WorkerPool::new();
        let invoker = Arc::new(ScriptedInvoker::new(|_, _, _| true));

        let report = timeout(
            Duration::from_secs(1),
            schedule(
                &pool,
                invoker,
                JobPhase::Reduce,
                vec![],
                RetryPolicy::Unbounded,
                new_progress(0),
            ),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(report.attempts.is_empty());
    }

    /// El worker falla la primera llamada de la tarea 3 y la siguiente sale
    /// bien: la tarea queda Done una sola vez.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn schedule_reintenta_la_tarea_que_falla_una_vez() {
        let pool = pool_with(&["w1", "w2"]);
        let invoker = Arc::new(ScriptedInvoker::new(|_, args, call| {
            !(args.task_number == 3 && call == 1)
        }));
        let progress = new_progress(6);

        let report = schedule(
            &pool,
            invoker.clone(),
            JobPhase::Map,
            map_tasks(6),
            RetryPolicy::Unbounded,
            progress.clone(),
        )
        .await
        .unwrap();

        assert_eq!(report.attempts[3], 2);
        assert_eq!(report.retries(), 1);
        assert_eq!(invoker.successes(3), 1);
        assert_eq!(invoker.calls_for(3), 2);
        assert_eq!(lock(&progress).tasks[3], TaskState::Done { attempts: 2 });
    }

    /// Un worker muerto para siempre no impide terminar mientras quede
    /// uno sano.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn schedule_termina_con_un_worker_muerto_y_uno_sano() {
        let pool = pool_with(&["muerto", "sano"]);
        let invoker = Arc::new(ScriptedInvoker::new(|worker, _, _| worker == "sano"));

        let report = timeout(
            Duration::from_secs(10),
            schedule(
                &pool,
                invoker.clone(),
                JobPhase::Map,
                map_tasks(20),
                RetryPolicy::Unbounded,
                new_progress(20),
            ),
        )
        .await
        .expect("la fase se colgó")
        .unwrap();

        assert_eq!(report.attempts.len(), 20);
        for i in 0..20 {
            assert_eq!(invoker.successes(i), 1);
        }
    }

    /// Muchos fallos seguidos con un único worker: la devolución asíncrona
    /// al pool no puede dejar a nadie esperando para siempre.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn schedule_sin_deadlock_con_fallos_rapidos_y_un_worker() {
        let pool = pool_with(&["w1"]);
        let invoker = Arc::new(ScriptedInvoker::new(|_, _, call| call > 5));

        let report = timeout(
            Duration::from_secs(10),
            schedule(
                &pool,
                invoker.clone(),
                JobPhase::Reduce,
                map_tasks(8),
                RetryPolicy::Unbounded,
                new_progress(8),
            ),
        )
        .await
        .expect("deadlock devolviendo workers")
        .unwrap();

        assert_eq!(report.attempts, vec![6; 8]);
        assert_eq!(invoker.total_calls(), 48);
        wait_for_pool(&pool, 1).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn schedule_espera_a_que_se_registre_un_worker() {
        let pool = WorkerPool::new();
        let invoker = Arc::new(ScriptedInvoker::new(|_, _, _| true));

        let p = pool.clone();
        let phase = tokio::spawn(async move {
            schedule(
                &p,
                invoker,
                JobPhase::Map,
                map_tasks(3),
                RetryPolicy::Unbounded,
                new_progress(3),
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!phase.is_finished());

        pool.put("tarde".to_string());
        let report = timeout(Duration::from_secs(5), phase)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(report.attempts, vec![1, 1, 1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn schedule_con_limite_espera_a_todas_y_reporta_la_agotada() {
        let pool = pool_with(&["w1", "w2"]);
        let invoker = Arc::new(ScriptedInvoker::new(|_, args, _| args.task_number != 1));
        let progress = new_progress(4);

        let err = schedule(
            &pool,
            invoker.clone(),
            JobPhase::Map,
            map_tasks(4),
            RetryPolicy::MaxAttempts(2),
            progress.clone(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            SchedulerError::TaskExhausted {
                index: 1,
                attempts: 2,
                ..
            }
        ));
        assert_eq!(invoker.calls_for(1), 2);

        // las demás tareas igual terminaron
        let p = lock(&progress);
        assert_eq!(p.tasks[1], TaskState::Exhausted { attempts: 2 });
        for i in [0, 2, 3] {
            assert!(p.tasks[i].is_done());
        }
    }

    #[tokio::test]
    async fn schedule_con_pool_cerrado_falla() {
        let pool = WorkerPool::new();
        pool.close();
        let invoker = Arc::new(ScriptedInvoker::new(|_, _, _| true));

        let err = schedule(
            &pool,
            invoker,
            JobPhase::Map,
            map_tasks(2),
            RetryPolicy::Unbounded,
            new_progress(2),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SchedulerError::PoolClosed(_)));
    }

    #[test]
    fn retry_policy_desde_config() {
        assert_eq!(RetryPolicy::from_max_attempts(None), RetryPolicy::Unbounded);
        assert_eq!(RetryPolicy::from_max_attempts(Some(0)), RetryPolicy::Unbounded);
        assert_eq!(
            RetryPolicy::from_max_attempts(Some(3)),
            RetryPolicy::MaxAttempts(3)
        );

        assert!(RetryPolicy::Unbounded.allows_another(1_000_000));
        assert!(RetryPolicy::MaxAttempts(3).allows_another(2));
        assert!(!RetryPolicy::MaxAttempts(3).allows_another(3));
    }
}
