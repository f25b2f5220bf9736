use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use asset_processor::api::routes::ROUTES;
use asset_processor::api::{ApiServer, AppState};
use asset_processor::config::Cli;
use asset_processor::handlers::Dispatcher;
use asset_processor::jobs::JobRegistry;
use asset_processor::{logging, panic_hook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads them
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    cli.validate()?;

    let logging = logging::init_logging(cli.log_dir.as_deref())?;
    panic_hook::install();

    let service_config = Arc::new(cli.service_config());
    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_path = %service_config.base_path.display(),
        poll_interval_ms = service_config.poll_interval.as_millis() as u64,
        auto_advance = service_config.auto_advance,
        "Starting asset-processor"
    );
    if !service_config.base_path.is_dir() {
        warn!(
            base_path = %service_config.base_path.display(),
            "Upload base path does not exist yet; every job will be rejected until it does"
        );
    }

    match logging.log_dir() {
        Some(dir) => info!(log_dir = %dir.display(), "Writing rotated log files"),
        None => info!("LOG_DIR not set, logging to console only"),
    }

    let shutdown = CancellationToken::new();
    logging.start_retention_cleanup(shutdown.child_token());

    let dispatcher = Dispatcher::new(Arc::clone(&service_config), shutdown.child_token());
    let registry = Arc::new(
        JobRegistry::new(service_config.base_path.clone(), Arc::new(dispatcher))
            .with_auto_advance(service_config.auto_advance),
    );

    let state = AppState::new(registry).with_admin_token(cli.admin_token.clone());
    if state.admin_token.is_none() {
        info!("ADMIN_TOKEN not set, restart endpoint disabled");
    }

    let server = ApiServer::with_state(cli.api_config(), state);
    for (method, path) in ROUTES {
        info!("  {method:<5} {path}");
    }

    let server_token = server.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
        }
        shutdown.cancel();
        server_token.cancel();
    });

    server.run().await?;
    info!("asset-processor stopped");
    Ok(())
}
