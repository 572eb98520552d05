//! Input validation utilities.
//!
//! Checks applied to caller-supplied ranges and limits before they reach the estimator or the
//! forecaster.

use crate::{PredictionError, PredictionResult};
use chrono::NaiveDate;

/// Validates an inclusive date range and returns its length in days.
///
/// # Errors
///
/// Returns `PredictionError::InvalidInput` if `end` is before `start` or the range spans more
/// than `max_days` days.
pub fn validate_date_range(
    start: NaiveDate,
    end: NaiveDate,
    max_days: u32,
) -> PredictionResult<u32> {
    if end < start {
        return Err(PredictionError::InvalidInput(format!(
            "end date {end} is before start date {start}"
        )));
    }

    let days = (end - start).num_days() + 1;
    if days > i64::from(max_days) {
        return Err(PredictionError::InvalidInput(format!(
            "date range of {days} days exceeds the maximum of {max_days}"
        )));
    }

    Ok(days as u32)
}

/// Validates a trailing or forward period length in days.
pub fn validate_period_days(days: u32, max_days: u32) -> PredictionResult<()> {
    if days == 0 || days > max_days {
        return Err(PredictionError::InvalidInput(format!(
            "period must be between 1 and {max_days} days, got {days}"
        )));
    }
    Ok(())
}

/// Validates a probability threshold.
pub fn validate_probability(name: &str, value: f64) -> PredictionResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(PredictionError::InvalidInput(format!(
            "{name} must lie in [0, 1], got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_validate_date_range_accepts_single_day() {
        assert_eq!(
            validate_date_range(date(2025, 11, 3), date(2025, 11, 3), 366).expect("valid"),
            1
        );
    }

    #[test]
    fn test_validate_date_range_rejects_inverted() {
        let err = validate_date_range(date(2025, 11, 3), date(2025, 11, 2), 366)
            .expect_err("should reject");
        assert!(matches!(err, PredictionError::InvalidInput(msg) if msg.contains("before")));
    }

    #[test]
    fn test_validate_date_range_rejects_too_long() {
        assert_eq!(
            validate_date_range(date(2025, 1, 1), date(2026, 1, 1), 366).expect("valid"),
            366
        );
        let err = validate_date_range(date(2025, 1, 1), date(2026, 1, 2), 366)
            .expect_err("should reject");
        assert!(matches!(err, PredictionError::InvalidInput(msg) if msg.contains("exceeds")));
    }

    #[test]
    fn test_validate_period_days() {
        assert!(validate_period_days(30, 366).is_ok());
        assert!(validate_period_days(0, 366).is_err());
        assert!(validate_period_days(367, 366).is_err());
    }

    #[test]
    fn test_validate_probability() {
        assert!(validate_probability("limite", 0.6).is_ok());
        assert!(validate_probability("limite", 1.0).is_ok());
        let err = validate_probability("limite", 1.2).expect_err("should reject");
        assert!(matches!(err, PredictionError::InvalidInput(msg) if msg.starts_with("limite")));
        assert!(validate_probability("limite", f64::NAN).is_err());
    }
}
