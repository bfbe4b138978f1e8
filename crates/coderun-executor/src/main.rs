//! coderun executor server

use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use coderun_executor::{config, http, AppState, Config};

const DEFAULT_LOG_FILTER: &str = "coderun_executor=info,coderun_claude_sdk=info,tower_http=info";

#[tokio::main]
async fn main() -> ExitCode {
    // Before tracing, so the file may set RUST_LOG
    let env_file = config::load_env_file();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    match &env_file {
        Ok(Some(path)) => info!(path = %path.display(), "Loaded environment file"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Ignoring unreadable environment file"),
    }

    let config = Config::parse();
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Executor failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    tokio::fs::create_dir_all(&config.workspace_base)
        .await
        .map_err(|e| {
            format!(
                "Failed to create workspace base '{}': {}",
                config.workspace_base.display(),
                e
            )
        })?;

    let state = AppState::from_config(&config)?;
    let router = http::create_router(state.clone());

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!(
        addr = %addr,
        workspace_base = %config.workspace_base.display(),
        file_handler_url = %config.file_handler_url,
        max_concurrent_tasks = config.max_concurrent_tasks,
        task_timeout_secs = config.task_timeout_secs,
        max_turns = config.max_turns,
        "Starting coderun executor"
    );

    let shutdown_state = state.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
            shutdown_state.admission.close();
        })
        .await?;

    info!("Executor stopped");
    Ok(())
}
