use actix_web::web;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info, warn};
mod api;
use crate::api::{state::AppState, transcode::TranscodeService};
mod cli;
mod config;
mod engine;
mod janitor;
mod logging;
mod pipeline;
mod server;
mod shutdown;
mod streamer;
mod workspace;
use crate::cli::{Cli, Command};
use crate::engine::{Engine, JobRunner};
use crate::janitor::Janitor;
use crate::shutdown::ShutdownCoordinator;
use crate::workspace::WorkspaceManager;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    // Load configuration from environment
    let mut config = config::Config::from_env()
        .expect("Failed to load configuration");
    if let Some(port) = cli.port {
        config.port = port;
    }

    logging::init(&config.log_dir)
        .expect("Failed to create logs directory");

    let engine = match Engine::discover(config.ffmpeg_path.as_deref()) {
        Ok(engine) => Some(engine),
        Err(e) => {
            error!("{}; job endpoints will fail until ffmpeg is installed or FFMPEG_PATH is set", e);
            None
        }
    };

    let workspaces = WorkspaceManager::new(&config.work_dir).await?;
    let janitor = Janitor::new(
        workspaces.clone(),
        Duration::from_secs(config.janitor_interval_secs),
        Duration::from_secs(config.artifact_max_age_secs),
    );

    match cli.command() {
        Command::CheckEngine => return check_engine(engine).await,
        Command::Sweep => {
            let report = janitor.sweep().await;
            info!(
                "Sweep of {} finished: removed {}, skipped {} active, {} fresh, {} failed",
                config.work_dir.display(),
                report.removed,
                report.skipped_active,
                report.skipped_fresh,
                report.failed
            );
            return Ok(());
        }
        Command::Serve => {}
    }

    info!("Starting media-gateway");
    info!("Configuration loaded successfully:");
    info!("  - Work directory: {}", config.work_dir.display());
    info!("  - Max payload size: {} bytes", config.max_payload_size);
    info!("  - Max concurrent jobs: {}", config.max_concurrent_jobs);
    info!("  - Job timeout: {}s", config.job_timeout_secs);
    if let Some(engine) = &engine {
        match engine.version().await {
            Ok(version) => info!("  - Media engine: {} ({})", engine.program().display(), version),
            Err(e) => warn!("  - Media engine: {} (version unknown: {})", engine.program().display(), e),
        }
    }

    let runner = JobRunner::new(
        engine,
        config.max_concurrent_jobs,
        Duration::from_secs(config.job_timeout_secs),
    );

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let janitor_handle = tokio::spawn(janitor.clone().run(shutdown_rx));

    let state = web::Data::new(AppState::new(runner.clone(), workspaces.clone()));
    let transcode_service = web::Data::new(TranscodeService::new(workspaces.clone(), runner));

    let (server, addrs) = server::bind(
        (config.host.as_str(), config.port),
        state,
        transcode_service,
        config.max_payload_size,
    )?;
    for addr in &addrs {
        info!("Server starting on http://{}", addr);
    }

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    let coordinator = ShutdownCoordinator::new(
        server_handle,
        server_task,
        vec![janitor_handle],
        shutdown_tx,
        janitor,
    );

    coordinator.wait_for_shutdown().await
}

async fn check_engine(engine: Option<Engine>) -> std::io::Result<()> {
    let Some(engine) = engine else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "media engine not found",
        ));
    };
    let version = engine
        .version()
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    info!("Media engine: {}", engine.program().display());
    info!("Version: {}", version);
    Ok(())
}
