//! Startup wiring shared by the REST binaries.
//!
//! Environment variables are read here once; handlers only see the resulting [`AppState`].

use crate::AppState;
use clinica_core::config::{
    base_daily_from_env_value, history_window_from_env_value, ml_api_timeout_from_env_value,
    ml_api_url_from_env_value, path_from_env_value,
};
use clinica_core::store::{AppointmentStore, InMemoryAppointmentStore};
use clinica_core::{EstimatorConfig, PredictionLog, PredictionService, PredictionTables};
use std::sync::Arc;

/// Default listen address for the REST server.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Resolve the listen address from `CLINICA_REST_ADDR`.
pub fn rest_addr_from_env_value(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_REST_ADDR.into())
}

/// Build the estimator configuration from the process environment.
///
/// # Errors
/// Returns an error if any variable is malformed or the tables file cannot be loaded.
pub fn config_from_env() -> anyhow::Result<EstimatorConfig> {
    let tables_path = path_from_env_value(std::env::var("CLINICA_TABLES_FILE").ok());
    let tables = PredictionTables::load(tables_path.as_deref())?;
    tracing::info!("-- Loaded prediction tables version {}", tables.version);

    let config = EstimatorConfig::new(
        tables,
        ml_api_url_from_env_value(std::env::var("ML_API_URL").ok())?,
        ml_api_timeout_from_env_value(std::env::var("ML_API_TIMEOUT").ok())?,
        history_window_from_env_value(std::env::var("CLINICA_HISTORY_WINDOW_DAYS").ok())?,
        base_daily_from_env_value(std::env::var("CLINICA_BASE_DAILY").ok())?,
    )?;
    Ok(config)
}

/// Open the appointment store named by `CLINICA_SEED_FILE`, or an empty one.
///
/// # Errors
/// Returns an error if the seed file cannot be read or references unknown patients.
pub fn store_from_env() -> anyhow::Result<Arc<dyn AppointmentStore>> {
    let seed = path_from_env_value(std::env::var("CLINICA_SEED_FILE").ok());
    let store = match seed {
        Some(path) => {
            let store = InMemoryAppointmentStore::from_seed_file(&path)?;
            tracing::info!(
                "-- Seeded {} patients from {}",
                store.patient_count(),
                path.display()
            );
            store
        }
        None => {
            tracing::warn!("CLINICA_SEED_FILE not set, starting with an empty appointment store");
            InMemoryAppointmentStore::new()
        }
    };
    let store: Arc<dyn AppointmentStore> = Arc::new(store);
    Ok(store)
}

/// Build the full application state from the process environment.
pub fn state_from_env() -> anyhow::Result<AppState> {
    let config = config_from_env()?;
    let store = store_from_env()?;
    Ok(app_state(PredictionService::new(config, store)?))
}

/// Wrap `service` with a fresh audit log.
pub fn app_state(service: PredictionService) -> AppState {
    let log = Arc::new(PredictionLog::new());
    AppState {
        service: Arc::new(service.with_log(log.clone())),
        log,
    }
}
