use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::bootstrap::{rest_addr_from_env_value, state_from_env};

/// Main entry point for the clinica application
///
/// Resolves configuration once, then serves the REST API until interrupted.
///
/// # Environment Variables
/// - `CLINICA_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CLINICA_TABLES_FILE`: Prediction tables YAML (default: embedded tables)
/// - `CLINICA_SEED_FILE`: Appointment store seed JSON (default: empty store)
/// - `ML_API_URL`: Remote model service base URL (default: disabled)
/// - `ML_API_TIMEOUT`: Remote model service timeout in seconds (default: 30)
/// - `CLINICA_HISTORY_WINDOW_DAYS`: No-show history window (default: 90)
/// - `CLINICA_BASE_DAILY`: Baseline daily demand override
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinica_run=info".parse()?)
                .add_directive("clinica_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = rest_addr_from_env_value(std::env::var("CLINICA_REST_ADDR").ok());
    let state = state_from_env()?;
    tracing::info!(
        "++ Prediction tables {} loaded, model service {}",
        state.service.config().tables().version,
        state.service.config().ml_api_url().unwrap_or("disabled")
    );

    tracing::info!("++ Starting clinica REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, api_rest::router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {:?}", e);
            }
            tracing::info!("-- Shutting down clinica REST");
        })
        .await?;

    Ok(())
}
