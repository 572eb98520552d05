//! # Clinica Core
//!
//! Core prediction logic for the clinic scheduling system.
//!
//! This crate contains the no-show risk estimator, the demand forecaster and the services
//! around them:
//! - Deterministic heuristic predictions driven by versioned static tables
//! - An optional remote model service with automatic fallback to the heuristic
//! - Appointment history access behind the [`store::AppointmentStore`] trait
//! - An audit log of issued predictions and follow-up actions
//!
//! **No API concerns**: HTTP servers and request/response envelopes belong in `api-rest` and
//! `api-shared`.

pub mod audit;
pub mod config;
pub mod constants;
pub mod demand;
pub mod error;
pub mod heuristic;
pub mod model;
pub mod predictor;
pub mod remote;
pub mod service;
pub mod store;
pub mod tables;
pub mod validation;

pub use audit::{
    ModelEfficacy, PredictionKind, PredictionLog, PredictionRecord, PredictionStatistics,
};
pub use config::EstimatorConfig;
pub use demand::{demand_action, DemandAction, DemandForecaster};
pub use error::{
    AuditError, AuditResult, PredictionError, PredictionResult, StoreError, StoreResult,
};
pub use heuristic::HeuristicPredictor;
pub use model::{
    DailyCount, DemandForecast, DemandForecastPoint, DemandRequest, DemandTrends,
    DiagnosisDemand, HistoricalStats, NoShowQuery, PredictionSource, RiskLevel, RiskPrediction,
    SeasonalAnalysis, TrendDirection,
};
pub use predictor::Predictor;
pub use remote::RemotePredictor;
pub use service::{AppointmentRisk, BatchEntry, MlHealth, PredictionService};
pub use tables::PredictionTables;

pub use clinica_types::{CidCode, PatientId};
