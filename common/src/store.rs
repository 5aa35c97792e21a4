//! Almacenamiento de registros intermedios y de salida.
//!
//! Cada archivo es JSONL: un `KeyValue` serializado por línea. JSON escapa
//! los saltos de línea dentro de strings, así que cada línea es exactamente
//! un registro sin importar qué tengan la clave o el valor.

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::{error::EngineError, KeyValue};

/// Prefijo de la carpeta de trabajo de cada job dentro del work dir.
pub const JOB_DIR_PREFIX: &str = "mrtmp.";

/// Valida que un nombre de job sirva como componente de ruta:
/// no vacío, sólo `[A-Za-z0-9._-]` y distinto de "." y "..".
pub fn validate_job_name(name: &str) -> Result<(), EngineError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if name.is_empty() || name == "." || name == ".." || !valid_chars {
        return Err(EngineError::InvalidJobName(name.to_string()));
    }
    Ok(())
}

/// Rutas de un job. Todas cuelgan de `<work_dir>/mrtmp.<job>/` para que dos
/// jobs que comparten work dir no pisen sus archivos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    work_dir: PathBuf,
    job_name: String,
}

impl JobPaths {
    pub fn new(work_dir: impl Into<PathBuf>, job_name: &str) -> Result<Self, EngineError> {
        validate_job_name(job_name)?;
        Ok(Self {
            work_dir: work_dir.into(),
            job_name: job_name.to_string(),
        })
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn job_dir(&self) -> PathBuf {
        self.work_dir.join(format!("{}{}", JOB_DIR_PREFIX, self.job_name))
    }

    /// Partición que escribe el map `map_task` para el reduce `reduce_task`.
    pub fn partition_path(&self, map_task: usize, reduce_task: usize) -> PathBuf {
        self.job_dir()
            .join(format!("map-{}-reduce-{}.jsonl", map_task, reduce_task))
    }

    /// Salida final de la tarea reduce `reduce_task`.
    pub fn merge_path(&self, reduce_task: usize) -> PathBuf {
        self.job_dir().join(format!("merge-{}.jsonl", reduce_task))
    }

    pub fn ensure_job_dir(&self) -> Result<(), EngineError> {
        let dir = self.job_dir();
        fs::create_dir_all(&dir).map_err(|source| EngineError::CreateOutput { path: dir, source })
    }

    /// Borra las particiones intermedias del job. Las que no existen se
    /// ignoran. Devuelve cuántas se borraron.
    pub fn remove_partitions(&self, n_map: usize, n_reduce: usize) -> io::Result<usize> {
        let mut removed = 0;
        for m in 0..n_map {
            for r in 0..n_reduce {
                match fs::remove_file(self.partition_path(m, r)) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(removed)
    }
}

/* =========================
   Escritura
   ========================= */

/// Escribe registros JSONL en un archivo, truncándolo al crearlo.
pub struct RecordWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl RecordWriter {
    pub fn create(path: &Path) -> Result<Self, EngineError> {
        let file = File::create(path).map_err(|source| EngineError::CreateOutput {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Un registro por llamada, terminado en '\n'.
    pub fn write(&mut self, kv: &KeyValue) -> Result<(), EngineError> {
        serde_json::to_writer(&mut self.writer, kv).map_err(|e| {
            if e.is_io() {
                EngineError::Write {
                    path: self.path.clone(),
                    source: io::Error::from(e),
                }
            } else {
                EngineError::Encode {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })?;
        self.writer
            .write_all(b"\n")
            .map_err(|source| EngineError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.written += 1;
        Ok(())
    }

    /// Flush + sync del archivo. Un error acá invalida todo el intento.
    pub fn close(self) -> Result<usize, EngineError> {
        let Self {
            path,
            writer,
            written,
        } = self;

        let file = writer.into_inner().map_err(|e| EngineError::Close {
            path: path.clone(),
            source: e.into_error(),
        })?;
        file.sync_all()
            .map_err(|source| EngineError::Close { path, source })?;
        Ok(written)
    }
}

/* =========================
   Lectura
   ========================= */

/// Qué hacer con un registro que no se puede decodificar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    /// Se trata como fin de archivo: se deja de leer esa partición y se
    /// sigue con lo ya leído. Puede esconder corrupción real.
    #[default]
    Lenient,
    /// El registro corrupto hace fallar el intento.
    Strict,
}

/// Lee registros JSONL uno por uno hasta fin de archivo.
pub struct RecordReader<R> {
    path: PathBuf,
    reader: BufReader<R>,
    mode: DecodeMode,
    line: usize,
    finished: bool,
    truncated: bool,
}

impl RecordReader<File> {
    pub fn open(path: &Path, mode: DecodeMode) -> Result<Self, EngineError> {
        let file = File::open(path).map_err(|source| EngineError::OpenPartition {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(path, file, mode))
    }
}

impl<R: Read> RecordReader<R> {
    pub fn new(path: &Path, inner: R, mode: DecodeMode) -> Self {
        Self {
            path: path.to_path_buf(),
            reader: BufReader::new(inner),
            mode,
            line: 0,
            finished: false,
            truncated: false,
        }
    }

    /// true si la lectura se cortó por un registro corrupto (modo Lenient).
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Siguiente registro, `Ok(None)` en fin de archivo.
    pub fn next_record(&mut self) -> Result<Option<KeyValue>, EngineError> {
        let mut buf = Vec::new();
        loop {
            if self.finished {
                return Ok(None);
            }

            buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| EngineError::ReadPartition {
                    path: self.path.clone(),
                    source,
                })?;
            if n == 0 {
                self.finished = true;
                return Ok(None);
            }
            self.line += 1;

            if buf.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            match serde_json::from_slice::<KeyValue>(&buf) {
                Ok(kv) => return Ok(Some(kv)),
                Err(source) => match self.mode {
                    DecodeMode::Strict => {
                        self.finished = true;
                        return Err(EngineError::Decode {
                            path: self.path.clone(),
                            line: self.line,
                            source,
                        });
                    }
                    DecodeMode::Lenient => {
                        warn!(
                            "registro corrupto en {} (línea {}), se trata como fin de archivo: {}",
                            self.path.display(),
                            self.line,
                            source
                        );
                        self.finished = true;
                        self.truncated = true;
                        return Ok(None);
                    }
                },
            }
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<KeyValue, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Lee un archivo JSONL completo. Útil para merges y tests.
pub fn read_records(path: &Path, mode: DecodeMode) -> Result<Vec<KeyValue>, EngineError> {
    RecordReader::open(path, mode)?.collect()
}
