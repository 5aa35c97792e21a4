//! Configuración por variables de entorno, con defaults pensados para
//! correr en Docker (master en http://master:8080, datos en /data).

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::store::DecodeMode;

pub const DEFAULT_MASTER_URL: &str = "http://localhost:8080";
pub const DEFAULT_MASTER_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_WORKER_LISTEN: &str = "0.0.0.0:0";
pub const DEFAULT_WORK_DIR: &str = "/data/tmp";
pub const DEFAULT_APP: &str = "wordcount";

/// Lee `name` y lo parsea; si no está o no parsea, devuelve `default`.
pub fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env_opt(name).unwrap_or(default)
}

/// Lee `name` y lo parsea; None si no está, está vacía o no parsea.
pub fn env_opt<T: FromStr>(name: &str) -> Option<T> {
    env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| s.trim().parse::<T>().ok())
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Ok("1") | Ok("true") | Ok("yes") | Ok("on")
    )
}

/// URL base del master.
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
pub fn master_base_url() -> String {
    env_or("MASTER_URL", DEFAULT_MASTER_URL.to_string())
}

pub fn master_listen_addr() -> String {
    env_or("MASTER_LISTEN", DEFAULT_MASTER_LISTEN.to_string())
}

pub fn worker_listen_addr() -> String {
    env_or("WORKER_LISTEN", DEFAULT_WORKER_LISTEN.to_string())
}

/// URL con la que el worker se anuncia al master, si se fuerza.
pub fn worker_advertise_url() -> Option<String> {
    env_opt("WORKER_ADVERTISE_URL")
}

/// Carpeta compartida donde viven particiones y merges.
pub fn work_dir() -> PathBuf {
    PathBuf::from(env_or("MR_WORK_DIR", DEFAULT_WORK_DIR.to_string()))
}

pub fn app_name() -> String {
    env_or("MR_APP", DEFAULT_APP.to_string())
}

/// Máximo de intentos por tarea. None (o 0) = reintentar para siempre.
pub fn max_task_attempts() -> Option<u32> {
    env_opt::<u32>("MAX_TASK_ATTEMPTS").filter(|n| *n > 0)
}

/// Timeout de cada llamada master -> worker. None = sin timeout.
pub fn rpc_timeout() -> Option<Duration> {
    env_opt::<u64>("RPC_TIMEOUT_SECS")
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}

pub fn decode_mode() -> DecodeMode {
    if env_flag("MR_STRICT_DECODE") {
        DecodeMode::Strict
    } else {
        DecodeMode::Lenient
    }
}

/// Si el master borra las particiones al terminar bien un job.
pub fn cleanup_intermediate() -> bool {
    env_flag("MR_CLEANUP")
}

/// Inyección de fallas: el worker "muere" después de N tareas.
pub fn worker_fail_after() -> Option<u64> {
    env_opt("WORKER_FAIL_AFTER")
}
