use std::sync::{Arc, Mutex};

use chrono::Utc;
use common::{store::JobPaths, DoTaskArgs, JobPhase, JobStatus, PhaseProgress};
use tracing::{info, warn};

use crate::scheduler::{schedule, PhaseReport, SchedulerError, SharedProgress};
use crate::state::{lock, AppState};

/// Tareas de una fase, en orden de índice.
pub fn phase_tasks(
    name: &str,
    phase: JobPhase,
    files: &[String],
    n_reduce: usize,
) -> Vec<DoTaskArgs> {
    match phase {
        JobPhase::Map => files
            .iter()
            .enumerate()
            .map(|(m, file)| DoTaskArgs::map(name, m, file, n_reduce))
            .collect(),
        JobPhase::Reduce => (0..n_reduce)
            .map(|r| DoTaskArgs::reduce(name, r, files.len()))
            .collect(),
    }
}

/// Corre una fase del job y deja su avance final en el JobInfo.
async fn run_phase(
    state: &AppState,
    job_id: &str,
    name: &str,
    phase: JobPhase,
    files: &[String],
    n_reduce: usize,
) -> Result<PhaseReport, SchedulerError> {
    let tasks = phase_tasks(name, phase, files, n_reduce);
    let progress: SharedProgress =
        Arc::new(Mutex::new(PhaseProgress::new(phase, tasks.len())));

    state.update_job(job_id, |entry| {
        entry.info.current_phase = Some(phase);
        entry.live = Some(Arc::clone(&progress));
    });

    let res = schedule(
        &state.pool,
        Arc::clone(&state.invoker),
        phase,
        tasks,
        state.settings.retry,
        Arc::clone(&progress),
    )
    .await;

    // los reintentos salen del avance final: cuentan también si la fase falló
    let final_progress = lock(&progress).clone();
    state.update_job(job_id, |entry| {
        entry.live = None;
        entry.info.retries += final_progress.retries();
        match phase {
            JobPhase::Map => entry.info.map_progress = Some(final_progress),
            JobPhase::Reduce => entry.info.reduce_progress = Some(final_progress),
        }
    });

    res
}

fn finish_job(state: &AppState, job_id: &str, status: JobStatus, error: Option<String>) {
    state.update_job(job_id, |entry| {
        entry.info.status = status;
        entry.info.current_phase = None;
        entry.info.error = error;
        entry.info.finished_at = Some(Utc::now());
    });
}

/// Corre un job completo: fase Map, fase Reduce y (opcional) limpieza de
/// particiones. Con reintentos ilimitados nunca termina en Failed: si no
/// hay workers sanos, se queda esperando.
pub async fn run_job(state: AppState, job_id: String) {
    let Some(job) = state.job_snapshot(&job_id) else {
        warn!("run_job: el job {} no existe", job_id);
        return;
    };
    let name = job.name.clone();
    let files = job.files.clone();
    let n_reduce = job.n_reduce;

    state.update_job(&job_id, |entry| {
        entry.info.status = JobStatus::Running;
        entry.info.started_at = Some(Utc::now());
    });
    info!(
        "job {} ({}): {} maps, {} reduces",
        job_id,
        name,
        files.len(),
        n_reduce
    );

    for phase in [JobPhase::Map, JobPhase::Reduce] {
        if let Err(e) = run_phase(&state, &job_id, &name, phase, &files, n_reduce).await {
            warn!("job {} falló en la fase {}: {}", job_id, phase, e);
            finish_job(&state, &job_id, JobStatus::Failed, Some(e.to_string()));
            return;
        }
    }

    if state.settings.cleanup {
        match JobPaths::new(&state.settings.work_dir, &name) {
            Ok(paths) => match paths.remove_partitions(files.len(), n_reduce) {
                Ok(n) => info!("job {}: {} particiones borradas", job_id, n),
                Err(e) => warn!("job {}: no se pudieron borrar las particiones: {}", job_id, e),
            },
            Err(e) => warn!("job {}: {}", job_id, e),
        }
    }

    finish_job(&state, &job_id, JobStatus::Succeeded, None);
    info!("job {} ({}) terminado", job_id, name);
}
