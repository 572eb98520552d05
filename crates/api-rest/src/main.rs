//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `clinica-run` binary serves the same
//! router.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::bootstrap::{rest_addr_from_env_value, state_from_env};

/// Main entry point for the clinica REST API server
///
/// # Environment Variables
/// - `CLINICA_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `CLINICA_TABLES_FILE`: Prediction tables YAML (default: embedded tables)
/// - `CLINICA_SEED_FILE`: Appointment store seed JSON (default: empty store)
/// - `ML_API_URL`, `ML_API_TIMEOUT`: Remote model service (default: disabled, 30 seconds)
/// - `CLINICA_HISTORY_WINDOW_DAYS`, `CLINICA_BASE_DAILY`: Estimator overrides
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - any configuration value is invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("clinica_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = rest_addr_from_env_value(std::env::var("CLINICA_REST_ADDR").ok());
    tracing::info!("-- Starting clinica REST API on {}", addr);

    let app = api_rest::router(state_from_env()?);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
