//! Vigil admission server entry point.
//!
//! Reads settings from the environment (see [`vigil_gateway::config`]),
//! builds the validator gate from the spec file and serves admission
//! decisions until interrupted.

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vigil_gateway::config::ServerConfig;
use vigil_gateway::error::ServerResult;
use vigil_gateway::reload::SpecReloader;
use vigil_gateway::server::AdmissionServer;
use vigil_validator::{Gate, ValidatorSpec};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vigil_gateway=info,vigil_validator=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run().await {
        error!(error = %e, "Vigil admission server failed");
        eprintln!("Vigil error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> ServerResult<()> {
    let config = ServerConfig::from_env()?;
    let spec = ValidatorSpec::load(&config.spec_path)?;
    let gate = Arc::new(Gate::from_spec(spec)?);

    info!(
        port = config.port,
        spec = %config.spec_path.display(),
        watch_spec = config.watch_spec,
        eval_budget_ms = ?config.eval_budget.map(|d| d.as_millis()),
        "Vigil configuration loaded"
    );

    let reloader = if config.watch_spec {
        match SpecReloader::spawn(Arc::clone(&gate), &config.spec_path) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(error = %e, "Spec hot reload disabled");
                None
            }
        }
    } else {
        None
    };

    let result = AdmissionServer::new(config, Arc::clone(&gate))
        .start(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await;

    if let Some(reloader) = reloader {
        reloader.stop();
    }
    gate.release();
    result
}
