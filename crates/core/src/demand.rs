//! Deterministic appointment demand forecasting.
//!
//! Daily forecasts combine a base daily average, a weekday multiplier and a smooth sinusoidal
//! seasonal term over the requested range. Diagnosis breakdowns apply a fixed share table to the
//! forecast total.

use crate::model::{
    round_to, DailyCount, DemandForecast, DemandForecastPoint, DemandRequest, DemandTrends,
    DiagnosisDemand, PieSlice, PredictionSource, SeasonalAnalysis, SeasonalFactor, TrendDirection,
};
use crate::tables::{DemandTable, PredictionTables};
use crate::validation::{validate_date_range, validate_period_days};
use crate::PredictionResult;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// Relative change between the two halves of a trend window that counts as a direction.
const TREND_CHANGE: f64 = 0.10;

/// Ratio between the busiest and quietest weekday means above which a weekly cycle is reported.
const SEASONALITY_RATIO: f64 = 1.5;

/// Operational recommendation for a forecast volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandAction {
    IncreaseCapacity,
    Promote,
    Normal,
}

impl DemandAction {
    pub fn message(&self) -> &'static str {
        match self {
            DemandAction::IncreaseCapacity => {
                "Alto volume previsto - considerar aumentar capacidade de atendimento"
            }
            DemandAction::Promote => {
                "Baixo volume previsto - considerar campanhas de marketing ou promoções"
            }
            DemandAction::Normal => "Volume dentro do esperado - manter operação normal",
        }
    }
}

/// Map a forecast total over `days` to an operational recommendation.
pub fn demand_action(predicted_appointments: u64, days: u32) -> DemandAction {
    let daily = predicted_appointments as f64 / f64::from(days.max(1));
    if daily > 20.0 {
        DemandAction::IncreaseCapacity
    } else if daily < 8.0 {
        DemandAction::Promote
    } else {
        DemandAction::Normal
    }
}

#[derive(Debug, Clone)]
pub struct DemandForecaster {
    tables: Arc<PredictionTables>,
    base_daily: f64,
}

impl DemandForecaster {
    /// `base_daily` overrides the table's daily average when set.
    pub fn new(tables: Arc<PredictionTables>, base_daily: Option<f64>) -> Self {
        let base_daily = base_daily.unwrap_or(tables.demand.base_daily);
        Self { tables, base_daily }
    }

    pub fn base_daily(&self) -> f64 {
        self.base_daily
    }

    fn table(&self) -> &DemandTable {
        &self.tables.demand
    }

    /// Forecast daily demand over `[request.start, request.end]`.
    ///
    /// # Errors
    ///
    /// Returns `PredictionError::InvalidInput` when the range is inverted or longer than the
    /// configured maximum.
    pub fn forecast(&self, request: &DemandRequest) -> PredictionResult<DemandForecast> {
        let days = self.range_days(request.start, request.end)?;
        let t = self.table();

        let points: Vec<DemandForecastPoint> = (0..days)
            .map(|i| {
                let date = request.start + Duration::days(i64::from(i));
                let weekday = t.weekday_multipliers.for_weekday(date.weekday());
                let seasonal =
                    1.0 + t.seasonal_amplitude * (2.0 * PI * f64::from(i) / f64::from(days)).sin();
                let predicted = (self.base_daily * weekday * seasonal).max(t.minimum_daily);
                DemandForecastPoint {
                    date,
                    predicted: round_to(predicted, 1),
                    confidence_upper: round_to(predicted * t.band_upper, 1),
                    confidence_lower: round_to(predicted * t.band_lower, 1),
                }
            })
            .collect();

        // The total follows the published daily points, weekday boosts and sine term included.
        let sum: f64 = points.iter().map(|p| p.predicted).sum();
        let total = sum.round() as u64;

        Ok(DemandForecast {
            success: true,
            period_start: request.start,
            period_end: request.end,
            diagnosis_filter: request.diagnosis.clone(),
            predicted_appointments: total,
            daily_average: round_to(total as f64 / f64::from(days), 1),
            confidence_interval: [
                (total as f64 * t.band_lower).floor() as u64,
                (total as f64 * t.band_upper).floor() as u64,
            ],
            points,
            diagnosis_breakdown: self.breakdown(total),
            seasonal_factors: t.seasonal_factors.clone(),
            model_confidence: t.model_confidence,
            generated_at: Utc::now(),
            source: PredictionSource::Fallback,
        })
    }

    /// Expected demand over the next `period_days`, split by diagnosis.
    pub fn by_diagnosis(&self, period_days: u32) -> PredictionResult<DiagnosisDemand> {
        self.check_period(period_days)?;
        let total = (self.base_daily * f64::from(period_days)).round() as u64;
        let breakdown = self.breakdown(total);
        let pie_data = self
            .table()
            .diagnoses
            .iter()
            .map(|d| {
                let value = breakdown.get(&d.code).copied().unwrap_or(0);
                let percentage = if total == 0 {
                    0.0
                } else {
                    round_to(value as f64 / total as f64 * 100.0, 1)
                };
                PieSlice {
                    name: format!("{} - {}", d.code, d.name),
                    value,
                    percentage,
                }
            })
            .collect();

        Ok(DiagnosisDemand {
            success: true,
            period_days,
            total_appointments: total,
            breakdown,
            pie_data,
            source: PredictionSource::Fallback,
        })
    }

    /// Daily demand over the `period_days` before `today`.
    ///
    /// Uses `history` when supplied, otherwise a synthetic weekday baseline.
    pub fn trends(
        &self,
        period_days: u32,
        history: Option<&[DailyCount]>,
        today: NaiveDate,
    ) -> PredictionResult<DemandTrends> {
        self.check_period(period_days)?;
        let (series, observed) = match history {
            Some(history) => (history.to_vec(), true),
            None => (self.synthetic_history(period_days, today), false),
        };

        let average_daily = mean(series.iter().map(|d| f64::from(d.appointments)));
        let (first, second) = series.split_at(series.len() / 2);
        let first_mean = mean(first.iter().map(|d| f64::from(d.appointments)));
        let second_mean = mean(second.iter().map(|d| f64::from(d.appointments)));
        let trend_direction = if second_mean > first_mean * (1.0 + TREND_CHANGE) {
            TrendDirection::Increasing
        } else if second_mean < first_mean * (1.0 - TREND_CHANGE) {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };

        Ok(DemandTrends {
            success: true,
            period_days,
            seasonality_detected: weekly_cycle(&series),
            historical_data: series,
            average_daily: round_to(average_daily, 1),
            trend_direction,
            observed,
            source: PredictionSource::Fallback,
        })
    }

    pub fn seasonal_analysis(&self) -> SeasonalAnalysis {
        let reference = &self.tables.seasonal_analysis;
        let convert = |factors: &[crate::tables::NamedFactor]| {
            factors
                .iter()
                .map(|f| SeasonalFactor {
                    name: f.name.clone(),
                    factor: f.factor,
                })
                .collect()
        };
        SeasonalAnalysis {
            success: true,
            monthly: convert(&reference.monthly),
            weekly: convert(&reference.weekly),
            insights: reference.insights.clone(),
            source: PredictionSource::Fallback,
        }
    }

    fn synthetic_history(&self, period_days: u32, today: NaiveDate) -> Vec<DailyCount> {
        let start = today - Duration::days(i64::from(period_days));
        let multipliers = &self.table().trend_multipliers;
        (0..period_days)
            .map(|i| {
                let date = start + Duration::days(i64::from(i));
                let expected = self.base_daily * multipliers.for_weekday(date.weekday());
                DailyCount {
                    date,
                    appointments: expected.round().max(0.0) as u32,
                }
            })
            .collect()
    }

    fn breakdown(&self, total: u64) -> BTreeMap<String, u64> {
        self.table()
            .diagnoses
            .iter()
            .map(|d| (d.code.clone(), (total as f64 * d.share).floor() as u64))
            .collect()
    }

    fn range_days(&self, start: NaiveDate, end: NaiveDate) -> PredictionResult<u32> {
        validate_date_range(start, end, self.table().max_range_days)
    }

    fn check_period(&self, period_days: u32) -> PredictionResult<()> {
        validate_period_days(period_days, self.table().max_range_days)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0u32), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / f64::from(count)
    }
}

fn weekly_cycle(series: &[DailyCount]) -> bool {
    if series.len() < 7 {
        return false;
    }
    let mut totals = [(0.0f64, 0u32); 7];
    for day in series {
        let slot = &mut totals[day.date.weekday().num_days_from_monday() as usize];
        slot.0 += f64::from(day.appointments);
        slot.1 += 1;
    }
    let means: Vec<f64> = totals
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(sum, n)| sum / f64::from(*n))
        .collect();
    let max = means.iter().copied().fold(f64::MIN, f64::max);
    let min = means.iter().copied().fold(f64::MAX, f64::min);
    if min <= 0.0 {
        return max > 0.0;
    }
    max / min >= SEASONALITY_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PredictionError;
    use chrono::Weekday;

    fn forecaster() -> DemandForecaster {
        DemandForecaster::new(
            Arc::new(PredictionTables::embedded().expect("tables")),
            None,
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn request(start: NaiveDate, end: NaiveDate) -> DemandRequest {
        DemandRequest {
            start,
            end,
            diagnosis: None,
        }
    }

    #[test]
    fn test_single_day_forecast() {
        // 2025-11-05 is a Wednesday; sin(0) = 0, so the day gets exactly the base.
        let forecast = forecaster()
            .forecast(&request(date(2025, 11, 5), date(2025, 11, 5)))
            .expect("forecast");
        assert_eq!(forecast.points.len(), 1);
        assert_eq!(forecast.points[0].predicted, 15.0);
        assert_eq!(forecast.points[0].confidence_upper, 18.0);
        assert_eq!(forecast.points[0].confidence_lower, 12.0);
        assert_eq!(forecast.predicted_appointments, 15);
        assert_eq!(forecast.daily_average, 15.0);
        assert_eq!(forecast.confidence_interval, [12, 18]);
        assert_eq!(forecast.model_confidence, 0.6);
    }

    #[test]
    fn test_week_total_is_sum_of_daily_points() {
        // Monday 2025-11-03 to Sunday 2025-11-09: Monday and Tuesday boosts plus one sine cycle.
        let forecast = forecaster()
            .forecast(&request(date(2025, 11, 3), date(2025, 11, 9)))
            .expect("forecast");
        let predicted: Vec<f64> = forecast.points.iter().map(|p| p.predicted).collect();
        assert_eq!(predicted, vec![18.0, 19.1, 17.9, 16.3, 13.7, 3.6, 3.8]);
        assert_eq!(forecast.predicted_appointments, 92);
        assert_eq!(forecast.daily_average, 13.1);
        assert_eq!(forecast.confidence_interval, [73, 110]);
        assert_eq!(forecast.diagnosis_breakdown["M79.3"], 27);
        assert_eq!(forecast.diagnosis_breakdown["M17.9"], 9);
    }

    #[test]
    fn test_sunday_is_below_following_monday() {
        // 2025-11-09 Sunday, 2025-11-10 Monday.
        let forecast = forecaster()
            .forecast(&request(date(2025, 11, 9), date(2025, 11, 10)))
            .expect("forecast");
        assert_eq!(forecast.points[0].date.weekday(), Weekday::Sun);
        assert!(forecast.points[0].predicted < forecast.points[1].predicted);
    }

    #[test]
    fn test_band_invariant_and_minimum() {
        let forecast = forecaster()
            .forecast(&request(date(2025, 11, 1), date(2026, 1, 31)))
            .expect("forecast");
        for point in &forecast.points {
            assert!(point.confidence_lower <= point.predicted);
            assert!(point.predicted <= point.confidence_upper);
            assert!(point.predicted >= 2.0);
        }
        let [low, high] = forecast.confidence_interval;
        assert!(low <= forecast.predicted_appointments);
        assert!(forecast.predicted_appointments <= high);
    }

    #[test]
    fn test_breakdown_sums_close_to_total() {
        let forecast = forecaster()
            .forecast(&request(date(2025, 11, 1), date(2025, 11, 30)))
            .expect("forecast");
        let sum: u64 = forecast.diagnosis_breakdown.values().sum();
        let total = forecast.predicted_appointments;
        assert!(sum <= total && total - sum <= 5, "sum {sum} total {total}");
        assert_eq!(forecast.diagnosis_breakdown.len(), 5);
    }

    #[test]
    fn test_diagnosis_filter_is_echoed() {
        let mut req = request(date(2025, 11, 1), date(2025, 11, 7));
        req.diagnosis = Some("M54.5".parse().expect("code"));
        let forecaster = forecaster();
        let filtered = forecaster.forecast(&req).expect("forecast");
        let unfiltered = forecaster
            .forecast(&request(date(2025, 11, 1), date(2025, 11, 7)))
            .expect("forecast");
        assert_eq!(
            filtered.diagnosis_filter.as_ref().map(|c| c.as_str()),
            Some("M54.5")
        );
        assert_eq!(filtered.diagnosis_breakdown, unfiltered.diagnosis_breakdown);
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        let f = forecaster();
        let err = f
            .forecast(&request(date(2025, 11, 10), date(2025, 11, 9)))
            .expect_err("inverted range");
        assert!(matches!(err, PredictionError::InvalidInput(msg) if msg.contains("before")));

        let err = f
            .forecast(&request(date(2025, 1, 1), date(2026, 1, 2)))
            .expect_err("range too long");
        assert_eq!(err.kind(), "invalid_input");

        // 366 days inclusive is accepted.
        assert!(f
            .forecast(&request(date(2025, 1, 1), date(2026, 1, 1)))
            .is_ok());
    }

    #[test]
    fn test_base_daily_override() {
        let f = DemandForecaster::new(
            Arc::new(PredictionTables::embedded().expect("tables")),
            Some(30.0),
        );
        let forecast = f
            .forecast(&request(date(2025, 11, 5), date(2025, 11, 5)))
            .expect("forecast");
        assert_eq!(forecast.predicted_appointments, 30);
    }

    #[test]
    fn test_by_diagnosis_pie_data() {
        let demand = forecaster().by_diagnosis(30).expect("demand");
        assert_eq!(demand.total_appointments, 450);
        assert_eq!(demand.breakdown["M79.3"], 135);
        assert_eq!(demand.breakdown["M17.9"], 45);
        assert_eq!(demand.pie_data[0].name, "M79.3 - Fibromialgia");
        assert_eq!(demand.pie_data[0].percentage, 30.0);
        assert!(forecaster().by_diagnosis(0).is_err());
    }

    #[test]
    fn test_synthetic_trends_are_deterministic() {
        let f = forecaster();
        let today = date(2025, 11, 17);
        let a = f.trends(28, None, today).expect("trends");
        let b = f.trends(28, None, today).expect("trends");
        assert_eq!(a, b);
        assert!(!a.observed);
        assert_eq!(a.historical_data.len(), 28);
        assert_eq!(a.historical_data[0].date, date(2025, 10, 20));
        assert_eq!(a.historical_data[27].date, date(2025, 11, 16));
        // Four whole weeks: both halves hold the same weekday mix.
        assert_eq!(a.trend_direction, TrendDirection::Stable);
        assert!(a.seasonality_detected);
    }

    #[test]
    fn test_observed_trend_direction() {
        let f = forecaster();
        let start = date(2025, 11, 3);
        let history: Vec<DailyCount> = (0..14)
            .map(|i| DailyCount {
                date: start + Duration::days(i),
                appointments: if i < 7 { 10 } else { 14 },
            })
            .collect();
        let trends = f
            .trends(14, Some(&history), date(2025, 11, 17))
            .expect("trends");
        assert!(trends.observed);
        assert_eq!(trends.trend_direction, TrendDirection::Increasing);
        assert_eq!(trends.average_daily, 12.0);
        assert!(!trends.seasonality_detected);
    }

    #[test]
    fn test_demand_action_thresholds() {
        assert_eq!(demand_action(630, 30), DemandAction::IncreaseCapacity);
        assert_eq!(demand_action(600, 30), DemandAction::Normal);
        assert_eq!(demand_action(240, 30), DemandAction::Normal);
        assert_eq!(demand_action(200, 30), DemandAction::Promote);
        assert!(DemandAction::Normal.message().contains("manter operação normal"));
    }

    #[test]
    fn test_seasonal_analysis_reference() {
        let analysis = forecaster().seasonal_analysis();
        assert_eq!(analysis.monthly.len(), 12);
        assert_eq!(analysis.monthly[0].name, "Janeiro");
        assert_eq!(analysis.monthly[11].factor, 0.6);
        assert_eq!(analysis.weekly[6].name, "Domingo");
        assert_eq!(analysis.insights.len(), 4);
    }
}
