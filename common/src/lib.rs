pub mod apps;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod job;
pub mod partition;
pub mod results;
pub mod store;
pub mod task;
pub mod wordcount;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use apps::{app_by_name, MapReduceApp};
pub use error::EngineError;
pub use job::{JobId, JobInfo, JobRequest, JobStatus, PhaseProgress};
pub use results::JobResults;
pub use task::{DoTaskArgs, DoTaskResponse, JobPhase, TaskState};
pub use worker::{
    WorkerAddr, WorkerId, WorkerMetrics, WorkerRegisterRequest, WorkerRegisterResponse,
};

/* --------- Registro intermedio / de salida --------- */

/// Par clave/valor que producen las funciones map y reduce.
/// Ambos campos pueden tener cualquier carácter (saltos de línea, comillas...),
/// por eso se serializan como JSON y no como texto separado por comas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
