use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{
    apps::{app_by_name, APP_NAMES},
    config, engine,
    store::JobPaths,
    JobInfo, JobRequest, JobResults, PhaseProgress, TaskState, WorkerMetrics,
};
use glob::glob;
use reqwest::Client;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(about = "CLI para mandar jobs MapReduce al master")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Envía un job nuevo al master
    Submit {
        #[arg(value_name = "NOMBRE")]
        name: String,

        /// Patrón de archivos de entrada (visto desde el master)
        #[arg(long, value_name = "GLOB")]
        input: String,

        /// Número de tareas reduce
        #[arg(long, default_value_t = 1)]
        reduce: usize,
    },
    /// Consulta el estado de un job
    Status {
        #[arg(value_name = "JOB_ID")]
        id: String,
    },
    /// Lista los archivos de merge de un job
    Results {
        #[arg(value_name = "JOB_ID")]
        id: String,
    },

    Workers,

    /// Corre el job completo en este proceso, sin master ni workers
    Local {
        #[arg(value_name = "NOMBRE")]
        name: String,

        #[arg(long, value_name = "GLOB")]
        input: String,

        #[arg(long, default_value_t = 1)]
        reduce: usize,

        /// wordcount | index
        #[arg(long, default_value = "wordcount")]
        app: String,

        /// Carpeta de trabajo (por defecto MR_WORK_DIR)
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
}

/// Archivos que matchean el patrón, ordenados.
fn expand_glob(pattern: &str) -> Result<Vec<String>> {
    let mut files: Vec<String> = glob(pattern)
        .with_context(|| format!("patrón inválido: {}", pattern))?
        .flatten()
        .filter(|p| p.is_file())
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    files.sort();
    Ok(files)
}

fn progress_line(p: &PhaseProgress) -> String {
    let running = p
        .tasks
        .iter()
        .filter(|t| matches!(t, TaskState::Running { .. }))
        .count();
    format!(
        "{}: {}/{} hechas, {} corriendo",
        p.phase,
        p.done(),
        p.tasks.len(),
        running
    )
}

fn print_job(job: &JobInfo) {
    println!("Job:");
    println!("  id: {}", job.id);
    println!("  nombre: {}", job.name);
    println!("  estado: {:?}", job.status);
    println!("  splits (M): {}", job.n_map());
    println!("  reduces (R): {}", job.n_reduce);
    if let Some(phase) = job.current_phase {
        println!("  fase actual: {}", phase);
    }
    if let Some(p) = &job.map_progress {
        println!("  {}", progress_line(p));
    }
    if let Some(p) = &job.reduce_progress {
        println!("  {}", progress_line(p));
    }
    println!("  reintentos: {}", job.retries);
    if let Some(err) = &job.error {
        println!("  error: {}", err);
    }
    println!("  submitted_at: {}", job.submitted_at);
    if let Some(ref started) = job.started_at {
        println!("  iniciado: {}", started);
    }
    if let Some(ref done) = job.finished_at {
        println!("  finalizado: {}", done);
    }
}

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("client=info")),
        )
        .init();

    let cli = Cli::parse();
    let client = Client::new();
    let base_url = config::master_base_url();

    match cli.command {
        Commands::Submit {
            name,
            input,
            reduce,
        } => {
            let url = format!("{}/api/v1/jobs", base_url);
            let req = JobRequest {
                name,
                input_glob: Some(input),
                files: Vec::new(),
                n_reduce: reduce,
            };
            let resp = client.post(&url).json(&req).send().await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let msg = resp.text().await.unwrap_or_default();
                bail!("el master rechazó el job ({}): {}", status, msg);
            }
            let job: JobInfo = resp.json().await?;
            println!("Job creado:");
            println!("  id: {}", job.id);
            println!("  nombre: {}", job.name);
            println!("  estado: {:?}", job.status);
            println!("  splits: {}", job.files.len());
            println!("  reduces: {}", job.n_reduce);
        }

        Commands::Status { id } => {
            let url = format!("{}/api/v1/jobs/{}", base_url, id);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let job: JobInfo = resp.json().await?;
                print_job(&job);
            } else {
                println!("Error: job no encontrado (status {})", resp.status());
            }
        }

        Commands::Results { id } => {
            let url = format!("{}/api/v1/jobs/{id}/results", base_url);
            let resp = client.get(&url).send().await?;

            if resp.status().is_success() {
                let results: JobResults = resp.json().await?;
                println!("Resultados para job {} ({:?}):", results.job_id, results.status);
                println!("  carpeta del job: {}", results.job_dir);
                if results.files.is_empty() {
                    println!("  (sin merges todavía)");
                } else {
                    println!("  merges:");
                    for f in results.files {
                        println!("    - {}", f);
                    }
                }
            } else {
                println!("No se encontraron resultados para job {id}");
            }
        }

        Commands::Workers => {
            let url = format!("{}/api/v1/workers", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let workers: Vec<WorkerMetrics> = resp.json().await?;
                if workers.is_empty() {
                    println!("No hay workers registrados.");
                }
                for w in workers {
                    println!("Worker {}", w.worker_id);
                    println!("  dirección : {}", w.address);
                    println!("  host      : {}", w.hostname);
                    println!("  registrado: hace {} s", w.registered_secs_ago);
                    println!(
                        "  llamadas  : started={}, ok={}, failed={}",
                        w.calls_started, w.calls_succeeded, w.calls_failed
                    );
                    match w.avg_call_ms {
                        Some(avg) => println!("  avg_ms    : {:.1}", avg),
                        None => println!("  avg_ms    : (sin datos)"),
                    }
                    println!();
                }
            } else {
                println!(
                    "Error consultando /api/v1/workers (status {})",
                    resp.status()
                );
            }
        }

        Commands::Local {
            name,
            input,
            reduce,
            app,
            work_dir,
        } => {
            let merges = run_local(&name, &input, reduce, &app, work_dir)?;
            println!("Job {} completado. Merges:", name);
            for m in merges {
                println!("  - {}", m.display());
            }
        }
    }

    Ok(())
}

fn run_local(
    name: &str,
    input: &str,
    n_reduce: usize,
    app_name: &str,
    work_dir: Option<PathBuf>,
) -> Result<Vec<PathBuf>> {
    let app = app_by_name(app_name)
        .ok_or_else(|| anyhow!("app {} desconocida (hay: {:?})", app_name, APP_NAMES))?;
    let files = expand_glob(input)?;
    if files.is_empty() {
        bail!("ningún archivo matchea {}", input);
    }

    let work_dir = work_dir.unwrap_or_else(config::work_dir);
    let paths = JobPaths::new(work_dir, name)?;
    info!(
        "corriendo {} localmente: {} splits, {} reduces en {}",
        name,
        files.len(),
        n_reduce,
        paths.job_dir().display()
    );

    let mode = config::decode_mode();
    let merges = engine::run_sequential(&paths, &files, n_reduce, app.as_ref(), mode)?;
    Ok(merges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::store::{read_records, DecodeMode};
    use std::{env, fs};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("client_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    #[test]
    fn parsea_submit_con_defaults() {
        let args = ["client", "submit", "wc", "--input", "/data/*.txt"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Submit {
                name,
                input,
                reduce,
            } => {
                assert_eq!(name, "wc");
                assert_eq!(input, "/data/*.txt");
                assert_eq!(reduce, 1);
            }
            other => panic!("comando inesperado: {:?}", other),
        }
    }

    #[test]
    fn expand_glob_ordena_y_omite_carpetas() {
        let tmp = temp_dir("glob");
        fs::write(tmp.join("b.txt"), "b").unwrap();
        fs::write(tmp.join("a.txt"), "a").unwrap();
        fs::create_dir_all(tmp.join("c.txt")).unwrap();

        let files = expand_glob(&format!("{}/*.txt", tmp.to_string_lossy())).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.txt"));
        assert!(files[1].ends_with("b.txt"));
    }

    #[test]
    fn run_local_index_arma_el_indice() {
        let tmp = temp_dir("local");
        let input = tmp.join("in");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("1.txt"), "rust go").unwrap();
        fs::write(input.join("2.txt"), "rust").unwrap();

        let pattern = format!("{}/*.txt", input.to_string_lossy());
        let merges = run_local("ii", &pattern, 2, "index", Some(tmp.join("work"))).unwrap();
        assert_eq!(merges.len(), 2);

        let mut rust = None;
        for m in &merges {
            for kv in read_records(m, DecodeMode::Strict).unwrap() {
                if kv.key == "rust" {
                    rust = Some(kv.value);
                }
            }
        }
        let rust = rust.expect("falta la clave rust");
        assert!(rust.starts_with("2 "));

        assert!(run_local("ii", &pattern, 1, "nada", Some(tmp.join("work"))).is_err());
        let empty = format!("{}/*.csv", input.to_string_lossy());
        assert!(run_local("ii", &empty, 1, "index", Some(tmp.join("work"))).is_err());
    }
}
