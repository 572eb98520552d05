//! Estimator inputs and outputs.
//!
//! Output types serialize with the field names existing consumers of the clinic API expect
//! (`probabilidade_falta`, `forecast_data`, `diagnostico_breakdown`, ...).

use crate::tables::RiskThresholds;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clinica_types::{CidCode, PatientId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single no-show prediction request.
#[derive(Debug, Clone, PartialEq)]
pub struct NoShowQuery {
    pub patient_id: PatientId,
    pub target_date: NaiveDate,
    /// Appointment time, when known. The time-of-day factor only applies when present.
    pub target_time: Option<NaiveTime>,
    pub diagnosis_code: Option<CidCode>,
    /// Apply December and holiday adjustments. Requires a holiday calendar.
    pub seasonal_adjustment: bool,
}

impl NoShowQuery {
    pub fn new(patient_id: PatientId, target_date: NaiveDate) -> Self {
        Self {
            patient_id,
            target_date,
            target_time: None,
            diagnosis_code: None,
            seasonal_adjustment: false,
        }
    }

    pub fn at(mut self, time: NaiveTime) -> Self {
        self.target_time = Some(time);
        self
    }

    pub fn with_seasonal_adjustment(mut self, enabled: bool) -> Self {
        self.seasonal_adjustment = enabled;
        self
    }
}

/// A demand forecast request over the inclusive range `[start, end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub diagnosis: Option<CidCode>,
}

/// Aggregate history for one patient, computed by the store over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalStats {
    /// Appointments in the window whose outcome is attended or no-show.
    pub attendance_count: u32,
    pub no_show_count: u32,
    pub days_since_last_visit: u32,
    pub patient_age: Option<u32>,
    /// Externally supplied propensity feature in `[0, 1]`.
    pub behavior_score: Option<f64>,
    pub diagnosis_code: Option<CidCode>,
}

impl HistoricalStats {
    /// Fraction of counted appointments that were no-shows, `0.0` without history.
    pub fn no_show_ratio(&self) -> f64 {
        if self.attendance_count == 0 {
            return 0.0;
        }
        f64::from(self.no_show_count) / f64::from(self.attendance_count)
    }
}

/// Categorical risk bucket derived from a probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum RiskLevel {
    #[serde(rename = "baixo")]
    Low,
    #[serde(rename = "medio")]
    Medium,
    #[serde(rename = "alto")]
    High,
}

impl RiskLevel {
    pub fn classify(probability: f64, thresholds: RiskThresholds) -> Self {
        if probability >= thresholds.high {
            RiskLevel::High
        } else if probability >= thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "baixo",
            RiskLevel::Medium => "medio",
            RiskLevel::High => "alto",
        }
    }
}

/// Which predictor produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Fallback,
    MlApi,
}

/// No-show prediction for one patient and appointment slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RiskPrediction {
    #[serde(rename = "paciente_id")]
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub patient_id: PatientId,
    #[serde(rename = "probabilidade_falta")]
    pub probability: f64,
    #[serde(rename = "confianca")]
    pub confidence: f64,
    #[serde(rename = "nivel_risco")]
    pub risk_level: RiskLevel,
    #[serde(rename = "fatores_risco")]
    pub contributing_factors: Vec<String>,
    #[serde(rename = "acao_recomendada")]
    pub recommended_action: String,
    #[serde(rename = "data_agendamento")]
    pub target_date: NaiveDate,
    #[serde(rename = "timestamp")]
    pub generated_at: DateTime<Utc>,
    pub source: PredictionSource,
}

/// One day of a demand forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DemandForecastPoint {
    pub date: NaiveDate,
    pub predicted: f64,
    pub confidence_upper: f64,
    pub confidence_lower: f64,
}

/// Demand forecast over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DemandForecast {
    pub success: bool,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Echo of the requested diagnosis filter. The breakdown does not depend on it.
    #[serde(rename = "diagnostico")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub diagnosis_filter: Option<CidCode>,
    pub predicted_appointments: u64,
    pub daily_average: f64,
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<u64>))]
    pub confidence_interval: [u64; 2],
    #[serde(rename = "forecast_data")]
    pub points: Vec<DemandForecastPoint>,
    #[serde(rename = "diagnostico_breakdown")]
    pub diagnosis_breakdown: BTreeMap<String, u64>,
    pub seasonal_factors: BTreeMap<String, f64>,
    pub model_confidence: f64,
    #[serde(rename = "timestamp")]
    pub generated_at: DateTime<Utc>,
    pub source: PredictionSource,
}

/// Static seasonal reference data plus human-readable insights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SeasonalAnalysis {
    pub success: bool,
    pub monthly: Vec<SeasonalFactor>,
    pub weekly: Vec<SeasonalFactor>,
    pub insights: Vec<String>,
    pub source: PredictionSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SeasonalFactor {
    pub name: String,
    pub factor: f64,
}

/// Expected demand split by diagnosis over a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DiagnosisDemand {
    pub success: bool,
    pub period_days: u32,
    pub total_appointments: u64,
    pub breakdown: BTreeMap<String, u64>,
    pub pie_data: Vec<PieSlice>,
    pub source: PredictionSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PieSlice {
    pub name: String,
    pub value: u64,
    pub percentage: f64,
}

/// Booked appointments on one past day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DailyCount {
    pub date: NaiveDate,
    pub appointments: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Historical demand over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DemandTrends {
    pub success: bool,
    pub period_days: u32,
    pub historical_data: Vec<DailyCount>,
    pub average_daily: f64,
    pub trend_direction: TrendDirection,
    pub seasonality_detected: bool,
    /// True when the series comes from the store rather than the synthetic baseline.
    pub observed: bool,
    pub source: PredictionSource,
}

/// Round to `places` decimal places, half away from zero.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
