use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use common::{
    store::{validate_job_name, JobPaths},
    JobInfo, JobRequest, JobResults, JobStatus, WorkerMetrics, WorkerRegisterRequest,
    WorkerRegisterResponse,
};
use glob::glob;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::jobs::run_job;
use crate::state::{lock, AppState, JobEntry};

type ApiError = (StatusCode, String);

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/jobs", post(create_job))
        .route("/api/v1/jobs/:id", get(get_job))
        .route("/api/v1/jobs/:id/results", get(get_job_results))
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/register", post(register_worker))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, msg.into())
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

/// Splits del job: primero los explícitos, después los que encuentre el
/// glob (ordenados). Sin repetidos.
fn resolve_inputs(req: &JobRequest) -> Result<Vec<String>, ApiError> {
    let mut files: Vec<String> = Vec::new();

    for f in &req.files {
        if !std::path::Path::new(f).is_file() {
            return Err(bad_request(format!("el archivo de entrada {} no existe", f)));
        }
        if !files.contains(f) {
            files.push(f.clone());
        }
    }

    if let Some(pattern) = &req.input_glob {
        let entries =
            glob(pattern).map_err(|e| bad_request(format!("input_glob inválido: {}", e)))?;
        let mut matched: Vec<String> = entries
            .flatten()
            .filter(|p| p.is_file())
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        matched.sort();
        for f in matched {
            if !files.contains(&f) {
                files.push(f);
            }
        }
    }

    if files.is_empty() {
        return Err(bad_request("el job no tiene archivos de entrada"));
    }
    Ok(files)
}

// Crea un job nuevo y lo lanza en segundo plano
async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<JobRequest>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    validate_job_name(&req.name).map_err(|e| bad_request(e.to_string()))?;
    if req.n_reduce == 0 {
        return Err(bad_request("n_reduce tiene que ser al menos 1"));
    }
    let files = resolve_inputs(&req)?;

    let job_id = uuid::Uuid::new_v4().to_string();
    let info = JobInfo {
        id: job_id.clone(),
        name: req.name.clone(),
        status: JobStatus::Accepted,
        files,
        n_reduce: req.n_reduce,
        current_phase: None,
        map_progress: None,
        reduce_progress: None,
        error: None,
        submitted_at: Utc::now(),
        started_at: None,
        finished_at: None,
        retries: 0,
    };

    {
        let mut jobs = lock(&state.jobs);
        // el nombre es la carpeta de trabajo: dos jobs vivos no pueden compartirla
        if jobs.values().any(|j| j.info.name == req.name) {
            return Err((
                StatusCode::CONFLICT,
                format!("ya existe un job llamado {}", req.name),
            ));
        }
        jobs.insert(job_id.clone(), JobEntry::new(info.clone()));
    }

    info!(
        "job {} ({}) aceptado: {} splits, {} reduces",
        job_id,
        info.name,
        info.files.len(),
        info.n_reduce
    );
    tokio::spawn(run_job(state.clone(), job_id));

    Ok((StatusCode::ACCEPTED, Json(info)))
}

// Devuelve el estado de un job con el avance de cada fase
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobInfo>, StatusCode> {
    state.job_snapshot(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// Lista los archivos de merge de un job
async fn get_job_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResults>, ApiError> {
    let job = state
        .job_snapshot(&id)
        .ok_or((StatusCode::NOT_FOUND, format!("job {} no encontrado", id)))?;

    let paths = JobPaths::new(&state.settings.work_dir, &job.name)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let files = (0..job.n_reduce)
        .map(|r| paths.merge_path(r))
        .filter(|p| p.is_file())
        .map(|p| p.to_string_lossy().to_string())
        .collect();

    Ok(Json(JobResults {
        job_id: job.id,
        status: job.status,
        job_dir: paths.job_dir().to_string_lossy().to_string(),
        files,
    }))
}

// Registra un worker; sólo la primera vez entra al pool
async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRegisterRequest>,
) -> Result<Json<WorkerRegisterResponse>, ApiError> {
    let address = req.address.trim().trim_end_matches('/').to_string();
    if address.is_empty() {
        return Err(bad_request("el worker tiene que mandar su dirección"));
    }

    let (worker_id, is_new) = state.workers.register(&address, &req.hostname);
    if is_new {
        info!("worker {} registrado en {} ({})", worker_id, address, req.hostname);
        state.pool.put(address);
    } else {
        warn!("worker {} se registró de nuevo, no se agrega al pool", address);
    }

    Ok(Json(WorkerRegisterResponse { worker_id }))
}

// Métricas de todos los workers registrados
async fn list_workers(State(state): State<AppState>) -> Json<Vec<WorkerMetrics>> {
    Json(state.workers.metrics())
}
