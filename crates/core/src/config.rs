//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the prediction
//! service. Request handlers never read environment variables; binaries pass raw values through
//! the `*_from_env_value` helpers below and build an [`EstimatorConfig`].

use crate::constants::{DEFAULT_HISTORY_WINDOW_DAYS, DEFAULT_ML_API_TIMEOUT_SECS};
use crate::tables::PredictionTables;
use crate::{PredictionError, PredictionResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Estimator configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct EstimatorConfig {
    tables: Arc<PredictionTables>,
    ml_api_url: Option<String>,
    ml_api_timeout: Duration,
    history_window_days: u32,
    base_daily: Option<f64>,
}

impl EstimatorConfig {
    /// Create a new `EstimatorConfig`.
    ///
    /// `ml_api_url` of `None` disables the remote model service entirely.
    pub fn new(
        tables: PredictionTables,
        ml_api_url: Option<String>,
        ml_api_timeout: Duration,
        history_window_days: u32,
        base_daily: Option<f64>,
    ) -> PredictionResult<Self> {
        if history_window_days == 0 {
            return Err(PredictionError::Configuration(
                "history window must be at least one day".into(),
            ));
        }
        if ml_api_timeout.is_zero() {
            return Err(PredictionError::Configuration(
                "model service timeout must be positive".into(),
            ));
        }
        if let Some(base) = base_daily {
            if !(base.is_finite() && base > 0.0) {
                return Err(PredictionError::Configuration(format!(
                    "base daily demand must be positive, got {base}"
                )));
            }
        }

        Ok(Self {
            tables: Arc::new(tables),
            ml_api_url,
            ml_api_timeout,
            history_window_days,
            base_daily,
        })
    }

    /// Embedded tables, no remote service and default windows.
    pub fn with_defaults() -> PredictionResult<Self> {
        Self::new(
            PredictionTables::embedded()?,
            None,
            Duration::from_secs(DEFAULT_ML_API_TIMEOUT_SECS),
            DEFAULT_HISTORY_WINDOW_DAYS,
            None,
        )
    }

    pub fn tables(&self) -> &Arc<PredictionTables> {
        &self.tables
    }

    pub fn ml_api_url(&self) -> Option<&str> {
        self.ml_api_url.as_deref()
    }

    pub fn ml_api_timeout(&self) -> Duration {
        self.ml_api_timeout
    }

    pub fn history_window_days(&self) -> u32 {
        self.history_window_days
    }

    pub fn base_daily(&self) -> Option<f64> {
        self.base_daily
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `ML_API_URL`. Unset or empty disables the remote service.
pub fn ml_api_url_from_env_value(value: Option<String>) -> PredictionResult<Option<String>> {
    match non_empty(value) {
        None => Ok(None),
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            Ok(Some(url.trim_end_matches('/').to_string()))
        }
        Some(url) => Err(PredictionError::Configuration(format!(
            "ML_API_URL must start with http:// or https://, got {url}"
        ))),
    }
}

/// Parse `ML_API_TIMEOUT` in whole seconds.
pub fn ml_api_timeout_from_env_value(value: Option<String>) -> PredictionResult<Duration> {
    let secs = match non_empty(value) {
        None => DEFAULT_ML_API_TIMEOUT_SECS,
        Some(v) => v.parse::<u64>().map_err(|_| {
            PredictionError::Configuration(format!(
                "ML_API_TIMEOUT must be a whole number of seconds, got {v}"
            ))
        })?,
    };
    if secs == 0 {
        return Err(PredictionError::Configuration(
            "ML_API_TIMEOUT must be positive".into(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse `CLINICA_HISTORY_WINDOW_DAYS`.
pub fn history_window_from_env_value(value: Option<String>) -> PredictionResult<u32> {
    match non_empty(value) {
        None => Ok(DEFAULT_HISTORY_WINDOW_DAYS),
        Some(v) => v.parse::<u32>().map_err(|_| {
            PredictionError::Configuration(format!(
                "CLINICA_HISTORY_WINDOW_DAYS must be a whole number, got {v}"
            ))
        }),
    }
}

/// Parse `CLINICA_BASE_DAILY`. Unset keeps the value from the tables.
pub fn base_daily_from_env_value(value: Option<String>) -> PredictionResult<Option<f64>> {
    non_empty(value)
        .map(|v| {
            v.parse::<f64>().map_err(|_| {
                PredictionError::Configuration(format!(
                    "CLINICA_BASE_DAILY must be a number, got {v}"
                ))
            })
        })
        .transpose()
}

/// Parse an optional file path such as `CLINICA_TABLES_FILE` or `CLINICA_SEED_FILE`.
pub fn path_from_env_value(value: Option<String>) -> Option<PathBuf> {
    non_empty(value).map(PathBuf::from)
}
