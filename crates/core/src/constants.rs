//! Constants used throughout the clinica core crate.

/// Embedded default prediction tables, used when no tables file is configured.
pub const DEFAULT_TABLES_YAML: &str = include_str!("../tables/v1.yaml");

/// Default trailing window, in days, for no-show history.
pub const DEFAULT_HISTORY_WINDOW_DAYS: u32 = 90;

/// Default timeout for calls to the remote prediction service.
pub const DEFAULT_ML_API_TIMEOUT_SECS: u64 = 30;

/// Days since last visit reported when a patient never attended.
pub const NEVER_VISITED_DAYS: u32 = 365;

/// Age sent to the remote service when the birth date is unknown.
pub const DEFAULT_REMOTE_AGE: u32 = 40;

/// Diagnosis sent to the remote service when the patient has no recorded diagnosis.
pub const DEFAULT_REMOTE_DIAGNOSIS: &str = "M79.3";

/// Model name recorded in the audit log for heuristic no-show predictions.
pub const HEURISTIC_NO_SHOW_MODEL: &str = "Heuristic_Fallback_v1.0";

/// Model name recorded in the audit log for heuristic demand predictions.
pub const HEURISTIC_DEMAND_MODEL: &str = "DemandHeuristic_v1.0";

/// Model name recorded in the audit log for no-show predictions from the model service.
pub const REMOTE_NO_SHOW_MODEL: &str = "RandomForest_v1.0";

/// Model name recorded in the audit log for demand predictions from the model service.
pub const REMOTE_DEMAND_MODEL: &str = "DemandPredictor_v1.0";

/// Longest trailing window, in days, accepted by the audit statistics.
pub const MAX_STATISTICS_DAYS: u32 = 365;

/// Records kept by the prediction log before the oldest are dropped.
pub const DEFAULT_PREDICTION_LOG_CAPACITY: usize = 50_000;

/// Window, in hours, within which a repeated pending no-show alert reuses the existing record.
pub const ALERT_DEDUP_HOURS: i64 = 24;
