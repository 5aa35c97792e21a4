use serde::{Deserialize, Serialize};
use std::fmt;

/// Fase del job a la que pertenece una tarea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPhase {
    Map,
    Reduce,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Map => write!(f, "map"),
            JobPhase::Reduce => write!(f, "reduce"),
        }
    }
}

/// Payload que el master manda a un worker para que ejecute una tarea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoTaskArgs {
    pub job_name: String,

    /// Split de entrada. Sólo viene en tareas Map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    pub phase: JobPhase,

    /// Índice de la tarea dentro de su fase (0..N-1)
    pub task_number: usize,

    /// R (número de reduces) en tareas Map, M (número de maps) en tareas Reduce
    pub num_other_phase: usize,
}

impl DoTaskArgs {
    pub fn map(job_name: &str, task_number: usize, file: &str, n_reduce: usize) -> Self {
        Self {
            job_name: job_name.to_string(),
            file: Some(file.to_string()),
            phase: JobPhase::Map,
            task_number,
            num_other_phase: n_reduce,
        }
    }

    pub fn reduce(job_name: &str, task_number: usize, n_map: usize) -> Self {
        Self {
            job_name: job_name.to_string(),
            file: None,
            phase: JobPhase::Reduce,
            task_number,
            num_other_phase: n_map,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoTaskResponse {
    pub ok: bool,
}

/// Estado de un índice de tarea dentro de una fase.
/// `Done` es terminal: una vez alcanzado no se vuelve atrás.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running { attempt: u32 },
    Done { attempts: u32 },
    /// Se quedó sin intentos (sólo con un límite de reintentos).
    Exhausted { attempts: u32 },
}

impl TaskState {
    pub fn is_done(&self) -> bool {
        matches!(self, TaskState::Done { .. })
    }

    /// Intentos fallidos que ya se sabe que tuvo este índice.
    pub fn retries(&self) -> u32 {
        match self {
            TaskState::Pending => 0,
            TaskState::Running { attempt } => attempt.saturating_sub(1),
            TaskState::Done { attempts } => attempts.saturating_sub(1),
            TaskState::Exhausted { attempts } => *attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn do_task_args_de_reduce_no_serializa_file() {
        let args = DoTaskArgs::reduce("wc", 1, 3);
        let json = serde_json::to_value(&args).unwrap();

        assert!(json.get("file").is_none());
        assert_eq!(json["phase"], "REDUCE");
        assert_eq!(json["num_other_phase"], 3);

        let back: DoTaskArgs = serde_json::from_value(json).unwrap();
        assert_eq!(back, args);
    }

    #[test]
    fn task_state_done_es_terminal() {
        assert!(TaskState::Done { attempts: 2 }.is_done());
        assert!(!TaskState::Running { attempt: 1 }.is_done());
        assert!(!TaskState::Pending.is_done());
        assert!(!TaskState::Exhausted { attempts: 3 }.is_done());
    }

    #[test]
    fn task_state_cuenta_los_intentos_fallidos() {
        assert_eq!(TaskState::Pending.retries(), 0);
        assert_eq!(TaskState::Running { attempt: 3 }.retries(), 2);
        assert_eq!(TaskState::Done { attempts: 1 }.retries(), 0);
        assert_eq!(TaskState::Done { attempts: 4 }.retries(), 3);
        // todos sus intentos fallaron
        assert_eq!(TaskState::Exhausted { attempts: 2 }.retries(), 2);
    }
}
