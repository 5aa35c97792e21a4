use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    apps::MapReduceApp,
    error::EngineError,
    partition::bucket,
    store::{DecodeMode, JobPaths, RecordReader, RecordWriter},
    task::{DoTaskArgs, JobPhase},
    KeyValue,
};

/// Resumen de un intento de map exitoso.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapSummary {
    pub map_task: usize,
    /// Registros escritos en cada bucket (len = R)
    pub records_per_bucket: Vec<usize>,
}

/// Resumen de un intento de reduce exitoso.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceSummary {
    pub reduce_task: usize,
    pub partitions_read: usize,
    pub records_read: usize,
    pub keys_written: usize,
    /// Particiones cuya lectura se cortó por un registro corrupto (modo Lenient)
    pub truncated_partitions: Vec<usize>,
}

/* =========================
   Map
   ========================= */

/// Ejecuta una tarea map:
/// 1. Lee el split completo.
/// 2. Llama a `app.map` una vez.
/// 3. Crea (o trunca) las R particiones de este map.
/// 4. Manda cada registro a `bucket(key, R)`.
/// 5. Cierra las R particiones, aunque estén vacías.
///
/// Cualquier error corta el intento y puede dejar archivos a medias; un
/// reintento los reescribe todos desde cero.
pub fn do_map(
    paths: &JobPaths,
    map_task: usize,
    input: &Path,
    n_reduce: usize,
    app: &dyn MapReduceApp,
) -> Result<MapSummary, EngineError> {
    if n_reduce == 0 {
        return Err(EngineError::InvalidArgs(
            "una tarea map necesita al menos un reduce".to_string(),
        ));
    }

    // 1) Leer el split; bytes que no son UTF-8 se reemplazan, no fallan
    let bytes = fs::read(input).map_err(|source| EngineError::ReadInput {
        path: input.to_path_buf(),
        source,
    })?;
    let contents = String::from_utf8_lossy(&bytes);

    // 2) Función de usuario
    let file_name = input.to_string_lossy();
    let key_values = app.map(&file_name, &contents);

    // 3) Un writer por bucket
    paths.ensure_job_dir()?;
    let mut writers = (0..n_reduce)
        .map(|r| RecordWriter::create(&paths.partition_path(map_task, r)))
        .collect::<Result<Vec<_>, _>>()?;

    // 4) Cada registro a su bucket
    for kv in &key_values {
        writers[bucket(&kv.key, n_reduce)].write(kv)?;
    }

    // 5) Cerrar todo (los vacíos también tienen que quedar en disco)
    let mut records_per_bucket = Vec::with_capacity(n_reduce);
    for w in writers {
        records_per_bucket.push(w.close()?);
    }

    debug!(
        "map {} del job {}: {} registros -> {:?}",
        map_task,
        paths.job_name(),
        key_values.len(),
        records_per_bucket
    );

    Ok(MapSummary {
        map_task,
        records_per_bucket,
    })
}

/* =========================
   Reduce
   ========================= */

/// Lee las M particiones de `reduce_task` y agrupa los valores por clave.
/// Los valores quedan en orden de map ascendente y, dentro de cada
/// partición, en orden de llegada.
fn collect_partitions(
    paths: &JobPaths,
    reduce_task: usize,
    n_map: usize,
    mode: DecodeMode,
) -> Result<(HashMap<String, Vec<String>>, usize, Vec<usize>), EngineError> {
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    let mut records_read = 0;
    let mut truncated = Vec::new();

    for m in 0..n_map {
        let path = paths.partition_path(m, reduce_task);
        let mut reader = RecordReader::open(&path, mode)?;

        while let Some(KeyValue { key, value }) = reader.next_record()? {
            grouped.entry(key).or_default().push(value);
            records_read += 1;
        }

        if reader.truncated() {
            truncated.push(m);
        }
    }

    Ok((grouped, records_read, truncated))
}

/// Ejecuta una tarea reduce:
/// 1. Lee las M particiones (job, m, reduce_task); si falta o falla una,
///    falla todo el intento y no se escribe nada.
/// 2. Llama a `app.reduce` una vez por clave distinta.
/// 3. Escribe un `KeyValue` por clave en el merge de este reduce.
///
/// Las claves se escriben ordenadas, así la salida de un reintento es
/// idéntica byte a byte.
pub fn do_reduce(
    paths: &JobPaths,
    reduce_task: usize,
    n_map: usize,
    app: &dyn MapReduceApp,
    mode: DecodeMode,
) -> Result<ReduceSummary, EngineError> {
    // 1) Leer todo antes de agregar
    let (grouped, records_read, truncated_partitions) =
        collect_partitions(paths, reduce_task, n_map, mode)?;

    let mut keys: Vec<&String> = grouped.keys().collect();
    keys.sort();

    // 2) + 3) Reducir y escribir
    paths.ensure_job_dir()?;
    let mut writer = RecordWriter::create(&paths.merge_path(reduce_task))?;
    for key in keys {
        let value = app.reduce(key, &grouped[key]);
        writer.write(&KeyValue::new(key.as_str(), value))?;
    }
    let keys_written = writer.close()?;

    debug!(
        "reduce {} del job {}: {} registros de {} particiones -> {} claves",
        reduce_task,
        paths.job_name(),
        records_read,
        n_map,
        keys_written
    );

    Ok(ReduceSummary {
        reduce_task,
        partitions_read: n_map,
        records_read,
        keys_written,
        truncated_partitions,
    })
}

/* =========================
   Despacho desde el worker
   ========================= */

/// Ejecuta la tarea que describe `args` contra `work_dir`.
/// Es lo que corre un worker cuando el master le pide "run task".
pub fn execute_task(
    work_dir: &Path,
    args: &DoTaskArgs,
    app: &dyn MapReduceApp,
    mode: DecodeMode,
) -> Result<(), EngineError> {
    let paths = JobPaths::new(work_dir, &args.job_name)?;

    match args.phase {
        JobPhase::Map => {
            let file = args.file.as_deref().ok_or_else(|| {
                EngineError::InvalidArgs(format!(
                    "tarea map {} sin archivo de entrada",
                    args.task_number
                ))
            })?;
            do_map(
                &paths,
                args.task_number,
                Path::new(file),
                args.num_other_phase,
                app,
            )?;
        }
        JobPhase::Reduce => {
            do_reduce(&paths, args.task_number, args.num_other_phase, app, mode)?;
        }
    }

    Ok(())
}

/* =========================
   Ejecución secuencial (sin master ni workers)
   ========================= */

/// Corre un job completo en este proceso: todos los maps y después todos
/// los reduces, con los mismos executors que usan los workers.
/// Devuelve las rutas de los merges, una por reduce.
pub fn run_sequential(
    paths: &JobPaths,
    files: &[String],
    n_reduce: usize,
    app: &dyn MapReduceApp,
    mode: DecodeMode,
) -> Result<Vec<PathBuf>, EngineError> {
    for (m, file) in files.iter().enumerate() {
        do_map(paths, m, Path::new(file), n_reduce, app)?;
    }

    let mut merges = Vec::with_capacity(n_reduce);
    for r in 0..n_reduce {
        do_reduce(paths, r, files.len(), app, mode)?;
        merges.push(paths.merge_path(r));
    }

    Ok(merges)
}
