//! Deterministic no-show estimator.
//!
//! The probability is composed from additive risk factors over a fixed base rate:
//! attendance history, day of week, age, time of day, an optional behaviour feature and, on
//! request, December and holiday adjustments. The result is clamped and rounded to four
//! decimal places, so identical inputs always produce identical probabilities.
//!
//! When the appointment store cannot supply history the estimator is called with `None` and
//! answers from the static factors alone.

use crate::constants::{HEURISTIC_DEMAND_MODEL, HEURISTIC_NO_SHOW_MODEL};
use crate::demand::DemandForecaster;
use crate::model::{
    round_to, DailyCount, DemandForecast, DemandRequest, DemandTrends, DiagnosisDemand,
    HistoricalStats, NoShowQuery, PredictionSource, RiskLevel, RiskPrediction, SeasonalAnalysis,
};
use crate::predictor::Predictor;
use crate::tables::{HolidayCalendar, PredictionTables};
use crate::{PredictionError, PredictionResult};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use std::sync::Arc;

/// A single additive contribution that raised the probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskFactor {
    HistoryHigh,
    HistoryPresent,
    Monday,
    Friday,
    Weekend,
    Elderly,
    Young,
    EarlyHour,
    LateHour,
    HabitualPattern,
    December,
    Holiday,
    HolidayEve,
    DecemberEvening,
}

impl RiskFactor {
    pub fn label(&self) -> &'static str {
        match self {
            RiskFactor::HistoryHigh => "Histórico de faltas elevado",
            RiskFactor::HistoryPresent => "Faltas recentes no histórico",
            RiskFactor::Monday => "Segunda-feira (maior índice de faltas)",
            RiskFactor::Friday => "Sexta-feira",
            RiskFactor::Weekend => "Final de semana",
            RiskFactor::Elderly => "Paciente idoso (mais de 70 anos)",
            RiskFactor::Young => "Paciente jovem (menos de 25 anos)",
            RiskFactor::EarlyHour => "Horário matinal",
            RiskFactor::LateHour => "Agendamento em horário tardio",
            RiskFactor::HabitualPattern => "Padrão recorrente de faltas",
            RiskFactor::December => "Dezembro (férias e viagens)",
            RiskFactor::Holiday => "Agendamento em feriado",
            RiskFactor::HolidayEve => "Véspera de feriado",
            RiskFactor::DecemberEvening => "Horário tardio em dezembro",
        }
    }
}

/// Running sum of factor contributions.
struct Composition {
    probability: f64,
    factors: Vec<RiskFactor>,
}

impl Composition {
    fn add(&mut self, delta: f64, factor: Option<RiskFactor>) {
        self.probability += delta;
        if let Some(factor) = factor {
            self.factors.push(factor);
        }
    }
}

/// Local, rule-based predictor. Never reports itself unavailable.
#[derive(Debug, Clone)]
pub struct HeuristicPredictor {
    tables: Arc<PredictionTables>,
    forecaster: DemandForecaster,
}

impl HeuristicPredictor {
    pub fn new(tables: Arc<PredictionTables>, base_daily: Option<f64>) -> Self {
        let forecaster = DemandForecaster::new(tables.clone(), base_daily);
        Self { tables, forecaster }
    }

    pub fn tables(&self) -> &PredictionTables {
        &self.tables
    }

    pub fn forecaster(&self) -> &DemandForecaster {
        &self.forecaster
    }

    /// Estimate the no-show probability for `query`, stamping the result with the current time.
    ///
    /// # Errors
    ///
    /// - `PredictionError::InvalidInput` when `stats` is internally inconsistent.
    /// - `PredictionError::Configuration` when seasonal adjustment is requested but no holiday
    ///   calendar is configured.
    pub fn estimate_no_show(
        &self,
        query: &NoShowQuery,
        stats: Option<&HistoricalStats>,
    ) -> PredictionResult<RiskPrediction> {
        self.estimate_no_show_at(query, stats, Utc::now())
    }

    /// Same as [`Self::estimate_no_show`] with an explicit generation timestamp.
    pub fn estimate_no_show_at(
        &self,
        query: &NoShowQuery,
        stats: Option<&HistoricalStats>,
        generated_at: DateTime<Utc>,
    ) -> PredictionResult<RiskPrediction> {
        if let Some(stats) = stats {
            validate_stats(stats)?;
        }
        let calendar = if query.seasonal_adjustment {
            Some(self.tables.holiday_calendar().ok_or_else(|| {
                PredictionError::Configuration(
                    "seasonal adjustment requested but no holiday calendar is configured".into(),
                )
            })?)
        } else {
            None
        };

        let t = &self.tables.no_show;
        let mut c = Composition {
            probability: t.base,
            factors: Vec::new(),
        };

        if let Some(stats) = stats {
            let ratio = stats.no_show_ratio();
            if ratio > 0.0 {
                let factor = if ratio > t.history_high_ratio {
                    RiskFactor::HistoryHigh
                } else {
                    RiskFactor::HistoryPresent
                };
                let capped = (c.probability + ratio * t.history_weight).min(t.history_cap);
                c.add(capped - c.probability, Some(factor));
            }
        }

        match query.target_date.weekday() {
            Weekday::Mon => c.add(t.weekday.monday, Some(RiskFactor::Monday)),
            Weekday::Fri => c.add(t.weekday.friday, Some(RiskFactor::Friday)),
            Weekday::Sat | Weekday::Sun => c.add(t.weekday.weekend, Some(RiskFactor::Weekend)),
            _ => {}
        }

        if let Some(age) = stats.and_then(|s| s.patient_age) {
            if age > t.age.elderly_over {
                c.add(t.age.elderly, Some(RiskFactor::Elderly));
            } else if age < t.age.young_under {
                c.add(t.age.young, Some(RiskFactor::Young));
            } else if (t.age.adult_min..=t.age.adult_max).contains(&age) {
                c.add(t.age.adult, None);
            }
        }

        let hour = query.target_time.map(|time| time.hour());
        if let Some(hour) = hour {
            if hour <= t.hour.early_until {
                c.add(t.hour.early, Some(RiskFactor::EarlyHour));
            } else if hour >= t.hour.late_from {
                c.add(t.hour.late, Some(RiskFactor::LateHour));
            }
        }

        if let Some(score) = stats.and_then(|s| s.behavior_score) {
            if score > t.pattern.habitual_above {
                c.add(t.pattern.habitual, Some(RiskFactor::HabitualPattern));
            } else if score < t.pattern.reliable_below {
                c.add(t.pattern.reliable, None);
            }
        }

        if let Some(calendar) = calendar {
            self.apply_seasonal(&mut c, calendar, query.target_date, hour);
        }

        let probability = round_to(c.probability.clamp(t.clamp_min, t.clamp_max), 4);
        let risk_level = RiskLevel::classify(probability, t.thresholds);
        let recommended_action = match risk_level {
            RiskLevel::High => t.actions.alto.clone(),
            RiskLevel::Medium => t.actions.medio.clone(),
            RiskLevel::Low => t.actions.baixo.clone(),
        };

        Ok(RiskPrediction {
            patient_id: query.patient_id,
            probability,
            confidence: t.fallback_confidence,
            risk_level,
            contributing_factors: c.factors.iter().map(|f| f.label().to_string()).collect(),
            recommended_action,
            target_date: query.target_date,
            generated_at,
            source: PredictionSource::Fallback,
        })
    }

    fn apply_seasonal(
        &self,
        c: &mut Composition,
        calendar: HolidayCalendar<'_>,
        date: NaiveDate,
        hour: Option<u32>,
    ) {
        let s = &self.tables.no_show.seasonal;
        let december = HolidayCalendar::is_december(date);
        if december {
            c.add(s.december, Some(RiskFactor::December));
        }
        if calendar.is_holiday(date) {
            c.add(s.holiday, Some(RiskFactor::Holiday));
        }
        if calendar.is_holiday_eve(date) {
            c.add(s.holiday_eve, Some(RiskFactor::HolidayEve));
        }
        if december && hour.is_some_and(|h| h >= s.december_evening_from) {
            c.add(s.december_evening, Some(RiskFactor::DecemberEvening));
        }
    }
}

/// Reject history that cannot describe a real patient.
pub(crate) fn validate_stats(stats: &HistoricalStats) -> PredictionResult<()> {
    if stats.no_show_count > stats.attendance_count {
        return Err(PredictionError::InvalidInput(format!(
            "no_show_count ({}) exceeds attendance_count ({})",
            stats.no_show_count, stats.attendance_count
        )));
    }
    if let Some(score) = stats.behavior_score {
        if !(0.0..=1.0).contains(&score) {
            return Err(PredictionError::InvalidInput(format!(
                "behavior_score must lie in [0, 1], got {score}"
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl Predictor for HeuristicPredictor {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn health(&self) -> PredictionResult<serde_json::Value> {
        Ok(serde_json::json!({ "status": "ok", "predictor": self.name() }))
    }

    async fn model_info(&self) -> PredictionResult<serde_json::Value> {
        Ok(serde_json::json!({
            "predictor": self.name(),
            "no_show_model": HEURISTIC_NO_SHOW_MODEL,
            "demand_model": HEURISTIC_DEMAND_MODEL,
            "tables_version": self.tables.version,
            "confidence": self.tables.no_show.fallback_confidence,
            "holiday_calendar": self.tables.holiday_calendar().is_some(),
        }))
    }

    async fn predict_no_show(
        &self,
        query: &NoShowQuery,
        stats: Option<&HistoricalStats>,
    ) -> PredictionResult<RiskPrediction> {
        self.estimate_no_show(query, stats)
    }

    async fn forecast_demand(&self, request: &DemandRequest) -> PredictionResult<DemandForecast> {
        self.forecaster.forecast(request)
    }

    async fn demand_by_diagnosis(&self, period_days: u32) -> PredictionResult<DiagnosisDemand> {
        self.forecaster.by_diagnosis(period_days)
    }

    async fn demand_trends(
        &self,
        period_days: u32,
        history: Option<&[DailyCount]>,
        today: NaiveDate,
    ) -> PredictionResult<DemandTrends> {
        self.forecaster.trends(period_days, history, today)
    }

    async fn seasonal_analysis(&self) -> PredictionResult<SeasonalAnalysis> {
        Ok(self.forecaster.seasonal_analysis())
    }
}
