use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use config::{AppConfig, Command, PostUploadAction};
use services::{
    cloudinary::CloudinaryClient,
    ingest_service::IngestService,
    key_mapper::KeyMapper,
    remote_store::RemoteStore,
    scheduler::{Schedule, Scheduler},
    sweeper::Sweeper,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- .env is optional; real environment variables win ---
    let dotenv = dotenvy::dotenv();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("zone_mirror=info".parse()?),
        )
        .init();
    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;
    tracing::info!("Starting zone-mirror with config: {:?}", cfg);

    // --- Shared remote client + key layout ---
    let store: Arc<dyn RemoteStore> = Arc::new(CloudinaryClient::new(cfg.remote.clone())?);
    let mapper = KeyMapper::new(cfg.mirror.root.clone(), cfg.mirror.base_dir.clone());

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    match command {
        Command::Serve { .. } => serve(cfg, store, mapper, shutdown).await,
        Command::Mirror { once: true, .. } => {
            let report = Sweeper::new(store, mapper).sweep().await?;
            tracing::info!("Sweep complete: {:?}", report);
            Ok(())
        }
        Command::Mirror { once: false, .. } => {
            let sweeper = Arc::new(Sweeper::new(store, mapper));
            Scheduler::new(cfg.mirror.schedule, shutdown)
                .run(sweeper)
                .await;
            Ok(())
        }
    }
}

async fn serve(
    cfg: AppConfig,
    store: Arc<dyn RemoteStore>,
    mapper: KeyMapper,
    shutdown: CancellationToken,
) -> Result<()> {
    // --- Ensure upload directory exists ---
    if !tokio::fs::try_exists(&cfg.upload_dir).await? {
        tokio::fs::create_dir_all(&cfg.upload_dir).await?;
        tracing::info!("Created upload directory at {}", cfg.upload_dir.display());
    }

    // --- Initialize core service ---
    let mut ingest = IngestService::new(store.clone(), mapper.clone(), cfg.upload_dir.clone())
        .with_timestamp_suffix(cfg.timestamp_suffix);
    match cfg.post_upload {
        PostUploadAction::None => {}
        PostUploadAction::Mirror => ingest = ingest.mirror_after_upload(),
        PostUploadAction::Sweep => {
            // Sweeps requested by uploads run one at a time on a background task.
            let scheduler = Scheduler::new(Schedule::OnDemand, shutdown.clone());
            ingest = ingest.sweep_after_upload(scheduler.trigger());
            let sweeper = Arc::new(Sweeper::new(store, mapper));
            tokio::spawn(scheduler.run(sweeper));
        }
    }

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(ingest);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Shutdown signal received");
            token.cancel();
        }
        Err(err) => tracing::warn!("Failed to listen for shutdown signal: {}", err),
    }
}
