use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResults {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Carpeta de trabajo del job (partitions + merges)
    pub job_dir: String,
    /// Un archivo de merge por tarea reduce, en orden de índice.
    /// Sólo se listan los que existen en disco.
    pub files: Vec<String>,
}
