use anyhow::{anyhow, Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    apps::{app_by_name, MapReduceApp, APP_NAMES},
    config, engine,
    store::DecodeMode,
    DoTaskArgs, DoTaskResponse, WorkerRegisterRequest, WorkerRegisterResponse,
};
use reqwest::Client;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{net::TcpListener, sync::Mutex, time::sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const REGISTER_RETRY: Duration = Duration::from_secs(1);

/// Estado compartido por los handlers del worker.
#[derive(Clone)]
pub struct WorkerState {
    work_dir: PathBuf,
    app: Arc<dyn MapReduceApp>,
    decode_mode: DecodeMode,
    // el worker ejecuta de a una tarea
    busy: Arc<Mutex<()>>,
    /// Después de atender tantas tareas el worker deja de responder bien.
    fail_after: Option<u64>,
    served: Arc<AtomicU64>,
}

impl WorkerState {
    pub fn new(
        work_dir: PathBuf,
        app: Arc<dyn MapReduceApp>,
        decode_mode: DecodeMode,
        fail_after: Option<u64>,
    ) -> Self {
        Self {
            work_dir,
            app,
            decode_mode,
            busy: Arc::new(Mutex::new(())),
            fail_after,
            served: Arc::new(AtomicU64::new(0)),
        }
    }
}

pub fn build_router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/tasks/do", post(do_task))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

// Ejecuta una tarea map o reduce sobre el work dir compartido
async fn do_task(
    State(state): State<WorkerState>,
    Json(args): Json<DoTaskArgs>,
) -> Result<Json<DoTaskResponse>, StatusCode> {
    let _busy = state.busy.lock().await;

    let served = state.served.fetch_add(1, Ordering::SeqCst);
    if let Some(limit) = state.fail_after {
        if served >= limit {
            warn!(
                "falla simulada: ya se atendieron {} tareas, rechazo {} {} del job {}",
                limit, args.phase, args.task_number, args.job_name
            );
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    info!(
        "tarea {} {} del job {}",
        args.phase, args.task_number, args.job_name
    );

    let work_dir = state.work_dir.clone();
    let app = Arc::clone(&state.app);
    let mode = state.decode_mode;
    let task = args.clone();
    let handle = tokio::task::spawn_blocking(move || {
        engine::execute_task(&work_dir, &task, app.as_ref(), mode)
    });

    let ok = match handle.await {
        Ok(Ok(())) => {
            info!("terminé {} {} correctamente", args.phase, args.task_number);
            true
        }
        Ok(Err(e)) => {
            warn!("error procesando {} {}: {}", args.phase, args.task_number, e);
            false
        }
        Err(e) => {
            warn!("panic o join error en {} {}: {:?}", args.phase, args.task_number, e);
            false
        }
    };

    Ok(Json(DoTaskResponse { ok }))
}

/// Se registra en el master, reintentando cada segundo hasta que acepte.
async fn register_loop(client: Client, master_url: String, req: WorkerRegisterRequest) {
    let url = format!("{}/api/v1/workers/register", master_url.trim_end_matches('/'));
    loop {
        match client.post(&url).json(&req).send().await {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<WorkerRegisterResponse>().await {
                    Ok(WorkerRegisterResponse { worker_id }) => {
                        info!(
                            "worker {} registrado en {} como {}",
                            worker_id, master_url, req.address
                        );
                        return;
                    }
                    Err(e) => warn!("respuesta de registro inválida: {:?}", e),
                }
            }
            Ok(resp) => warn!("el master rechazó el registro: status {}", resp.status()),
            Err(e) => warn!("no se pudo contactar al master en {}: {}", master_url, e),
        }
        sleep(REGISTER_RETRY).await;
    }
}

fn local_hostname() -> String {
    hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// Arranca el worker:
/// - Atiende /api/v1/tasks/do con la app configurada (MR_APP).
/// - Se registra en el master en segundo plano.
pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("worker=debug,reqwest=info")),
        )
        .init();

    let app_name = config::app_name();
    let app: Arc<dyn MapReduceApp> = app_by_name(&app_name)
        .map(Arc::from)
        .ok_or_else(|| anyhow!("app {} desconocida (hay: {:?})", app_name, APP_NAMES))?;

    let state = WorkerState::new(
        config::work_dir(),
        app,
        config::decode_mode(),
        config::worker_fail_after(),
    );

    let listen = config::worker_listen_addr();
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", listen))?;
    let local = listener.local_addr()?;

    let hostname = local_hostname();
    let address = config::worker_advertise_url()
        .unwrap_or_else(|| format!("http://{}:{}", hostname, local.port()));

    info!(
        "worker escuchando en {} (app={}, work_dir={}, fail_after={:?})",
        local,
        app_name,
        state.work_dir.display(),
        state.fail_after
    );

    tokio::spawn(register_loop(
        Client::new(),
        config::master_base_url(),
        WorkerRegisterRequest { address, hostname },
    ));

    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
