//! Exam splitting worker.
//!
//! `examsplit-worker` (or `examsplit-worker run`) starts the job runner.
//! `examsplit-worker submit <exam_id> <pdf_path> [upload_key]` records an
//! upload and queues it for the runner.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use examsplit_converter::{ConverterApi, ConverterConfig};
use examsplit_core::env::{optional, ProcessEnv};
use examsplit_core::types::DbId;
use examsplit_db::DbPool;
use examsplit_events::{EventBus, EventPersistence};
use examsplit_pipeline::{store, submit_upload, JobRunner, PipelineConfig, PipelineContext};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: examsplit-worker [run | submit <exam_id> <pdf_path> [upload_key]]";

enum Command {
    Run,
    Submit {
        exam_id: DbId,
        pdf_path: PathBuf,
        upload_key: Option<String>,
    },
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    match args.first().map(String::as_str) {
        None | Some("run") => Ok(Command::Run),
        Some("submit") => {
            let (Some(exam_id), Some(pdf_path)) = (args.get(1), args.get(2)) else {
                bail!(USAGE);
            };
            Ok(Command::Submit {
                exam_id: exam_id
                    .parse()
                    .with_context(|| format!("invalid exam id {exam_id:?}"))?,
                pdf_path: PathBuf::from(pdf_path),
                upload_key: args.get(3).cloned(),
            })
        }
        Some(other) => bail!("unknown command {other:?}\n{USAGE}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    // --- Configuration ---
    let config = PipelineConfig::from_env(&ProcessEnv).context("Invalid pipeline configuration")?;
    tracing::info!(
        scratch = %config.scratch_root.display(),
        batch_size = config.batch_size,
        policy = ?config.truncation_policy,
        "Loaded pipeline configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = examsplit_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    examsplit_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    examsplit_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    match command {
        Command::Submit {
            exam_id,
            pdf_path,
            upload_key,
        } => submit(&pool, &config, exam_id, pdf_path, upload_key).await,
        Command::Run => run(pool, config).await,
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "examsplit_worker=debug,examsplit_pipeline=debug".into());
    let json = optional(&ProcessEnv, "LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn submit(
    pool: &DbPool,
    config: &PipelineConfig,
    exam_id: DbId,
    pdf_path: PathBuf,
    upload_key: Option<String>,
) -> anyhow::Result<()> {
    let source = tokio::fs::read(&pdf_path)
        .await
        .with_context(|| format!("Failed to read {}", pdf_path.display()))?;
    let upload_key = upload_key.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let receipt = submit_upload(pool, config, exam_id, &upload_key, source).await?;
    tracing::info!(
        upload_id = receipt.upload_id,
        job_id = ?receipt.job_id,
        duplicate = receipt.duplicate,
        "Upload submitted",
    );
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

async fn run(pool: DbPool, config: PipelineConfig) -> anyhow::Result<()> {
    let converter = ConverterConfig::from_env(&ProcessEnv).context("Invalid converter configuration")?;
    let fleet = ConverterApi::new(converter.url.clone(), converter.request_timeout)
        .context("Failed to build converter client")?;
    tracing::info!(url = %converter.url, instance_type = %converter.instance_type, "Converter client ready");

    let document_store = store::from_config(&config.store).await;

    // --- Event bus ---
    let events = Arc::new(EventBus::default());
    let persistence_handle = tokio::spawn(EventPersistence::run(pool.clone(), events.subscribe()));

    let ctx = PipelineContext {
        pool,
        config: Arc::new(config),
        store: Arc::from(document_store),
        fleet: Arc::new(fleet),
        events: Arc::clone(&events),
        credentials: converter.credentials,
        instance_type: converter.instance_type,
    };

    // --- Job runner ---
    let cancel = CancellationToken::new();
    let runner = JobRunner::new(ctx);
    let runner_cancel = cancel.clone();
    let runner_handle = tokio::spawn(async move { runner.run(runner_cancel).await });
    tracing::info!("Worker started");

    shutdown_signal().await;
    tracing::info!("Shutdown requested, waiting for running jobs");

    cancel.cancel();
    if let Err(e) = runner_handle.await {
        tracing::error!(error = %e, "Job runner task panicked");
    }

    // The runner held the last context clone; dropping ours closes the bus.
    drop(events);
    match tokio::time::timeout(Duration::from_secs(5), persistence_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Event persistence task panicked"),
        Err(_) => tracing::warn!("Event persistence did not flush within 5s, events may be lost"),
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
