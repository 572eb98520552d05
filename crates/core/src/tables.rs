//! Versioned static prediction tables.
//!
//! All the constants the heuristic estimator and the demand forecaster depend on (risk factor
//! weights, thresholds, weekday multipliers, diagnosis shares, seasonal reference tables and the
//! holiday calendar) live in a YAML document. The default document is embedded in the binary;
//! deployments may replace it with a file of the same shape without a rebuild.
//!
//! Tables are parsed and validated once at startup and then shared read-only.

use crate::constants::DEFAULT_TABLES_YAML;
use crate::{PredictionError, PredictionResult};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Complete set of static tables.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionTables {
    pub version: String,
    pub no_show: NoShowTable,
    pub demand: DemandTable,
    pub seasonal_analysis: SeasonalReference,
    #[serde(default)]
    pub holidays: Option<Vec<Holiday>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoShowTable {
    pub base: f64,
    pub history_weight: f64,
    pub history_cap: f64,
    pub history_high_ratio: f64,
    pub weekday: WeekdayRisk,
    pub age: AgeRisk,
    pub hour: HourRisk,
    pub pattern: PatternRisk,
    pub seasonal: SeasonalRisk,
    pub clamp_min: f64,
    pub clamp_max: f64,
    pub fallback_confidence: f64,
    pub thresholds: RiskThresholds,
    pub actions: ActionTable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeekdayRisk {
    pub monday: f64,
    pub friday: f64,
    pub weekend: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgeRisk {
    pub elderly_over: u32,
    pub elderly: f64,
    pub young_under: u32,
    pub young: f64,
    pub adult_min: u32,
    pub adult_max: u32,
    pub adult: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourRisk {
    pub early_until: u32,
    pub early: f64,
    pub late_from: u32,
    pub late: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatternRisk {
    pub habitual_above: f64,
    pub habitual: f64,
    pub reliable_below: f64,
    pub reliable: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeasonalRisk {
    pub december: f64,
    pub holiday: f64,
    pub holiday_eve: f64,
    pub december_evening_from: u32,
    pub december_evening: f64,
}

/// Probability cut-offs for the no-show risk level.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RiskThresholds {
    pub high: f64,
    pub medium: f64,
}

/// Recommended action per risk level.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionTable {
    pub alto: String,
    pub medio: String,
    pub baixo: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemandTable {
    pub base_daily: f64,
    pub minimum_daily: f64,
    pub seasonal_amplitude: f64,
    pub band_lower: f64,
    pub band_upper: f64,
    pub model_confidence: f64,
    pub max_range_days: u32,
    pub weekday_multipliers: WeekdayMultipliers,
    pub trend_multipliers: WeekdayMultipliers,
    pub seasonal_factors: BTreeMap<String, f64>,
    pub diagnoses: Vec<DiagnosisShare>,
}

/// One multiplier per day of the week.
#[derive(Debug, Clone, Deserialize)]
pub struct WeekdayMultipliers {
    pub monday: f64,
    pub tuesday: f64,
    pub wednesday: f64,
    pub thursday: f64,
    pub friday: f64,
    pub saturday: f64,
    pub sunday: f64,
}

impl WeekdayMultipliers {
    pub fn for_weekday(&self, weekday: Weekday) -> f64 {
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    fn all(&self) -> [f64; 7] {
        [
            self.monday,
            self.tuesday,
            self.wednesday,
            self.thursday,
            self.friday,
            self.saturday,
            self.sunday,
        ]
    }
}

/// Fixed share of total demand attributed to a diagnosis category.
#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosisShare {
    pub code: String,
    pub name: String,
    pub share: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeasonalReference {
    pub monthly: Vec<NamedFactor>,
    pub weekly: Vec<NamedFactor>,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedFactor {
    pub name: String,
    pub factor: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
}

/// Lookup view over the configured holidays.
#[derive(Debug, Clone, Copy)]
pub struct HolidayCalendar<'a> {
    holidays: &'a [Holiday],
}

impl<'a> HolidayCalendar<'a> {
    pub fn new(holidays: &'a [Holiday]) -> Self {
        Self { holidays }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.iter().any(|h| h.date == date)
    }

    /// True when the following day is a holiday.
    pub fn is_holiday_eve(&self, date: NaiveDate) -> bool {
        date.succ_opt().is_some_and(|next| self.is_holiday(next))
    }

    pub fn is_december(date: NaiveDate) -> bool {
        date.month() == 12
    }
}

impl PredictionTables {
    /// Parse and validate tables from a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `PredictionError::Configuration` if the document does not parse or breaks one of
    /// the table invariants checked by [`PredictionTables::validate`].
    pub fn from_yaml(yaml: &str) -> PredictionResult<Self> {
        let tables: PredictionTables = serde_yaml::from_str(yaml).map_err(|e| {
            PredictionError::Configuration(format!("failed to parse prediction tables: {e}"))
        })?;
        tables.validate()?;
        Ok(tables)
    }

    /// The tables embedded in the crate.
    pub fn embedded() -> PredictionResult<Self> {
        Self::from_yaml(DEFAULT_TABLES_YAML)
    }

    /// Load tables from `path`, or the embedded defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> PredictionResult<Self> {
        match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|e| {
                    PredictionError::Configuration(format!(
                        "failed to read prediction tables {}: {e}",
                        path.display()
                    ))
                })?;
                let tables = Self::from_yaml(&yaml)?;
                tracing::info!(
                    "loaded prediction tables {} from {}",
                    tables.version,
                    path.display()
                );
                Ok(tables)
            }
            None => Self::embedded(),
        }
    }

    /// The holiday calendar, if one is configured.
    pub fn holiday_calendar(&self) -> Option<HolidayCalendar<'_>> {
        self.holidays.as_deref().map(HolidayCalendar::new)
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> PredictionResult<()> {
        fn fail(msg: impl Into<String>) -> PredictionResult<()> {
            Err(PredictionError::Configuration(msg.into()))
        }

        if self.version.trim().is_empty() {
            return fail("tables version cannot be empty");
        }

        if let Some(field) = self.first_non_finite() {
            return fail(format!("{field} must be a finite number"));
        }

        let ns = &self.no_show;
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        if !(unit(ns.clamp_min) && unit(ns.clamp_max) && ns.clamp_min <= ns.clamp_max) {
            return fail("no_show clamp bounds must satisfy 0 <= clamp_min <= clamp_max <= 1");
        }
        if !unit(ns.base) || !unit(ns.history_cap) || !unit(ns.fallback_confidence) {
            return fail("no_show base, history_cap and fallback_confidence must lie in [0, 1]");
        }
        if !(unit(ns.thresholds.medium)
            && unit(ns.thresholds.high)
            && ns.thresholds.medium <= ns.thresholds.high)
        {
            return fail("risk thresholds must satisfy 0 <= medium <= high <= 1");
        }

        let demand = &self.demand;
        if demand.base_daily <= 0.0 || demand.minimum_daily < 0.0 {
            return fail("demand base_daily must be positive and minimum_daily non-negative");
        }
        if !(demand.band_lower <= 1.0 && demand.band_upper >= 1.0 && demand.band_lower >= 0.0) {
            return fail("demand band must satisfy 0 <= band_lower <= 1 <= band_upper");
        }
        if !unit(demand.model_confidence) {
            return fail("demand model_confidence must lie in [0, 1]");
        }
        if demand.max_range_days == 0 {
            return fail("demand max_range_days must be positive");
        }
        let multipliers = demand
            .weekday_multipliers
            .all()
            .into_iter()
            .chain(demand.trend_multipliers.all());
        if multipliers.into_iter().any(|m| m < 0.0) {
            return fail("weekday multipliers cannot be negative");
        }
        if demand.diagnoses.is_empty() {
            return fail("demand diagnoses table cannot be empty");
        }
        let share_total: f64 = demand.diagnoses.iter().map(|d| d.share).sum();
        if (share_total - 1.0).abs() > 1e-6 || demand.diagnoses.iter().any(|d| d.share < 0.0) {
            return fail(format!(
                "diagnosis shares must be non-negative and sum to 1.0 (got {share_total})"
            ));
        }

        if self.seasonal_analysis.monthly.len() != 12 {
            return fail("seasonal_analysis.monthly must have 12 entries");
        }
        if self.seasonal_analysis.weekly.len() != 7 {
            return fail("seasonal_analysis.weekly must have 7 entries");
        }

        Ok(())
    }

    /// Name of the first numeric table entry that is NaN or infinite.
    fn first_non_finite(&self) -> Option<String> {
        let ns = &self.no_show;
        let d = &self.demand;
        let named = [
            ("no_show.base", ns.base),
            ("no_show.history_weight", ns.history_weight),
            ("no_show.history_cap", ns.history_cap),
            ("no_show.history_high_ratio", ns.history_high_ratio),
            ("no_show.weekday.monday", ns.weekday.monday),
            ("no_show.weekday.friday", ns.weekday.friday),
            ("no_show.weekday.weekend", ns.weekday.weekend),
            ("no_show.age.elderly", ns.age.elderly),
            ("no_show.age.young", ns.age.young),
            ("no_show.age.adult", ns.age.adult),
            ("no_show.hour.early", ns.hour.early),
            ("no_show.hour.late", ns.hour.late),
            ("no_show.pattern.habitual_above", ns.pattern.habitual_above),
            ("no_show.pattern.habitual", ns.pattern.habitual),
            ("no_show.pattern.reliable_below", ns.pattern.reliable_below),
            ("no_show.pattern.reliable", ns.pattern.reliable),
            ("no_show.seasonal.december", ns.seasonal.december),
            ("no_show.seasonal.holiday", ns.seasonal.holiday),
            ("no_show.seasonal.holiday_eve", ns.seasonal.holiday_eve),
            ("no_show.seasonal.december_evening", ns.seasonal.december_evening),
            ("demand.base_daily", d.base_daily),
            ("demand.minimum_daily", d.minimum_daily),
            ("demand.seasonal_amplitude", d.seasonal_amplitude),
            ("demand.band_lower", d.band_lower),
            ("demand.band_upper", d.band_upper),
        ];
        if let Some((field, _)) = named.iter().find(|(_, v)| !v.is_finite()) {
            return Some((*field).to_string());
        }

        if d.weekday_multipliers.all().iter().any(|m| !m.is_finite()) {
            return Some("demand.weekday_multipliers".into());
        }
        if d.trend_multipliers.all().iter().any(|m| !m.is_finite()) {
            return Some("demand.trend_multipliers".into());
        }
        if let Some((name, _)) = d.seasonal_factors.iter().find(|(_, v)| !v.is_finite()) {
            return Some(format!("demand.seasonal_factors.{name}"));
        }
        if let Some(diag) = d.diagnoses.iter().find(|d| !d.share.is_finite()) {
            return Some(format!("share of diagnosis {}", diag.code));
        }
        let reference = &self.seasonal_analysis;
        reference
            .monthly
            .iter()
            .chain(&reference.weekly)
            .find(|f| !f.factor.is_finite())
            .map(|f| format!("seasonal factor {}", f.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_embedded_tables_are_valid() {
        let tables = PredictionTables::embedded().expect("embedded tables should parse");
        assert_eq!(tables.no_show.base, 0.15);
        assert_eq!(tables.demand.base_daily, 15.0);
        assert_eq!(tables.demand.diagnoses.len(), 5);
        assert_eq!(tables.demand.diagnoses[0].code, "M79.3");
        assert!(tables.holiday_calendar().is_some());
    }

    #[test]
    fn test_holiday_calendar_detects_holiday_and_eve() {
        let tables = PredictionTables::embedded().expect("embedded tables");
        let calendar = tables.holiday_calendar().expect("calendar");
        let christmas = NaiveDate::from_ymd_opt(2025, 12, 25).expect("date");
        let christmas_eve = NaiveDate::from_ymd_opt(2025, 12, 24).expect("date");
        assert!(calendar.is_holiday(christmas));
        assert!(!calendar.is_holiday(christmas_eve));
        assert!(calendar.is_holiday_eve(christmas_eve));
    }

    #[test]
    fn test_rejects_shares_not_summing_to_one() {
        let yaml = DEFAULT_TABLES_YAML.replace("share: 0.10", "share: 0.20");
        let err = PredictionTables::from_yaml(&yaml).expect_err("should reject shares");
        assert!(matches!(err, PredictionError::Configuration(msg) if msg.contains("sum to 1.0")));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let yaml = DEFAULT_TABLES_YAML.replace("high: 0.5", "high: 0.2");
        let err = PredictionTables::from_yaml(&yaml).expect_err("should reject thresholds");
        assert!(matches!(err, PredictionError::Configuration(msg) if msg.contains("thresholds")));
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let yaml = DEFAULT_TABLES_YAML.replace("base_daily: 15.0", "base_daily: .nan");
        let err = PredictionTables::from_yaml(&yaml).expect_err("should reject NaN base");
        assert!(
            matches!(err, PredictionError::Configuration(msg) if msg.contains("demand.base_daily"))
        );

        let yaml = DEFAULT_TABLES_YAML.replace("tuesday: 1.1", "tuesday: .inf");
        let err = PredictionTables::from_yaml(&yaml).expect_err("should reject infinite multiplier");
        assert!(matches!(err, PredictionError::Configuration(msg) if msg.contains("finite")));
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        let err = PredictionTables::from_yaml("version: [").expect_err("should reject");
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn test_tables_without_holidays_have_no_calendar() {
        let cut = DEFAULT_TABLES_YAML
            .find("holidays:")
            .expect("holidays section present");
        let tables =
            PredictionTables::from_yaml(&DEFAULT_TABLES_YAML[..cut]).expect("tables should parse");
        assert!(tables.holiday_calendar().is_none());
    }

    #[test]
    fn test_load_reads_tables_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        let yaml = DEFAULT_TABLES_YAML.replace("version: \"2025.10-v1\"", "version: \"custom\"");
        file.write_all(yaml.as_bytes()).expect("write tables");

        let tables = PredictionTables::load(Some(file.path())).expect("load from file");
        assert_eq!(tables.version, "custom");

        let missing = PredictionTables::load(Some(Path::new("/definitely/not/here.yaml")));
        assert!(matches!(missing, Err(PredictionError::Configuration(_))));
    }
}
