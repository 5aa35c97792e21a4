use std::{io, path::PathBuf};

use thiserror::Error;

/// Errores de un intento de tarea (map o reduce).
/// Todos son fatales para el intento y nunca para el proceso: el worker
/// los reporta como fallo y el master reintenta en otro worker.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("nombre de job inválido: {0:?}")]
    InvalidJobName(String),

    #[error("argumentos de tarea inválidos: {0}")]
    InvalidArgs(String),

    #[error("no se pudo leer el split {path}: {source}")]
    ReadInput { path: PathBuf, source: io::Error },

    #[error("no se pudo crear {path}: {source}")]
    CreateOutput { path: PathBuf, source: io::Error },

    #[error("error escribiendo {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("error cerrando {path}: {source}")]
    Close { path: PathBuf, source: io::Error },

    #[error("no se pudo abrir la partición {path}: {source}")]
    OpenPartition { path: PathBuf, source: io::Error },

    #[error("error leyendo la partición {path}: {source}")]
    ReadPartition { path: PathBuf, source: io::Error },

    #[error("registro corrupto en {path} (línea {line}): {source}")]
    Decode {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("no se pudo serializar un registro para {path}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
}
