use serde::{Deserialize, Serialize};

pub type WorkerId = String;

/// URL base de un worker, ej: "http://worker-1:9000".
pub type WorkerAddr = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterRequest {
    /// Dirección donde el worker atiende /api/v1/tasks/do
    pub address: WorkerAddr,
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterResponse {
    pub worker_id: WorkerId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkerMetrics {
    pub worker_id: WorkerId,
    pub address: WorkerAddr,
    pub hostname: String,
    pub registered_secs_ago: u64,
    pub calls_started: u64,
    pub calls_succeeded: u64,
    pub calls_failed: u64,
    pub avg_call_ms: Option<f64>,
}
