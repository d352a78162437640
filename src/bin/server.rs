//! agrovision inference server.
//!
//! Usage:
//!   agrovision-server [CONFIG_PATH]
//!
//! CONFIG_PATH defaults to `serving_config.json`. Startup loads every
//! model artifact and registers the supported categories with the
//! external category service; any failure is fatal and the process exits
//! before binding.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use agrovision::core::{ServingConfig, ServingError, ServingResult};
use agrovision::server::{self, registration, startup};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "serving_config.json".to_string());

    match run(PathBuf::from(config_path)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal startup error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: PathBuf) -> ServingResult<()> {
    let config = ServingConfig::from_file(&config_path)?;
    info!(config = %config_path.display(), "starting agrovision server");

    let state = startup::build_state(&config)?;

    let categories = state.dispatcher.registry().category_names();
    registration::register_categories(&config.registration_url, &categories)?;

    let app = server::router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| ServingError::Io {
            operation: format!("bind {}", config.bind_addr),
            path: None,
            source: e,
        })?;
    info!(addr = %config.bind_addr, "serving inference requests");

    axum::serve(listener, app)
        .await
        .map_err(|e| ServingError::Io {
            operation: "serve".to_string(),
            path: None,
            source: e,
        })?;
    Ok(())
}
