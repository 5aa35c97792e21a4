use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::task::{JobPhase, TaskState};

pub type JobId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Nombre del job; también es el nombre de su carpeta de trabajo
    pub name: String,

    /// Patrón de archivos de entrada, ej: "/data/input/*.txt"
    #[serde(default)]
    pub input_glob: Option<String>,

    /// Lista explícita de splits (se suma a lo que encuentre input_glob)
    #[serde(default)]
    pub files: Vec<String>,

    /// Número de tareas reduce (R)
    pub n_reduce: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Accepted,
    Running,
    Failed,
    Succeeded,
}

/// Foto del avance de una fase: un estado por índice de tarea.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub phase: JobPhase,
    pub tasks: Vec<TaskState>,
}

impl PhaseProgress {
    pub fn new(phase: JobPhase, n_tasks: usize) -> Self {
        Self {
            phase,
            tasks: vec![TaskState::Pending; n_tasks],
        }
    }

    pub fn done(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_done()).count()
    }

    /// Intentos fallidos de toda la fase, terminara bien o no.
    pub fn retries(&self) -> u32 {
        self.tasks.iter().map(TaskState::retries).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,

    /// Splits de entrada (M = files.len())
    pub files: Vec<String>,
    pub n_reduce: usize,

    /// Fase en curso (None antes de empezar o al terminar)
    pub current_phase: Option<JobPhase>,
    pub map_progress: Option<PhaseProgress>,
    pub reduce_progress: Option<PhaseProgress>,

    /// Mensaje del error que terminó el job, si lo hubo
    pub error: Option<String>,

    /// -------- Métricas del job --------
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub retries: u32,
}

impl JobInfo {
    pub fn n_map(&self) -> usize {
        self.files.len()
    }
}
