//! Appointment and patient history access.
//!
//! The estimator never talks to storage directly. [`collect_stats`] turns the queries exposed by
//! an [`AppointmentStore`] into the [`HistoricalStats`] the estimator consumes.

pub mod memory;

use crate::constants::NEVER_VISITED_DAYS;
use crate::model::{DailyCount, HistoricalStats};
use crate::StoreResult;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use clinica_types::{CidCode, PatientId};
use serde::{Deserialize, Serialize};

pub use memory::InMemoryAppointmentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum AppointmentStatus {
    #[serde(rename = "agendado")]
    Scheduled,
    #[serde(rename = "realizado")]
    Attended,
    #[serde(rename = "faltou")]
    NoShow,
    #[serde(rename = "cancelado")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: u64,
    pub patient_id: PatientId,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: PatientId,
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub behavior_score: Option<f64>,
}

impl PatientRecord {
    /// Age in whole years on `on`, if the birth date is known.
    pub fn age_on(&self, on: NaiveDate) -> Option<u32> {
        let birth = self.birth_date?;
        let mut years = on.year() - birth.year();
        if (on.month(), on.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

/// Attended and missed appointments inside a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub attended: u32,
    pub no_show: u32,
}

/// Read access to appointment history.
///
/// Implementations report transient failures as `StoreError::Unavailable` so callers can
/// degrade instead of failing.
pub trait AppointmentStore: Send + Sync {
    fn patient(&self, id: PatientId) -> StoreResult<PatientRecord>;

    /// Outcomes of appointments dated in `[as_of - window_days, as_of]`.
    fn outcome_counts(
        &self,
        id: PatientId,
        window_days: u32,
        as_of: NaiveDate,
    ) -> StoreResult<OutcomeCounts>;

    fn last_attended(&self, id: PatientId) -> StoreResult<Option<NaiveDate>>;

    fn latest_diagnosis(&self, id: PatientId) -> StoreResult<Option<CidCode>>;

    /// Appointments on `date`, excluding cancellations.
    fn booked_count(&self, date: NaiveDate) -> StoreResult<u32>;

    /// Appointments on `date` still in the scheduled state, ordered by time.
    fn scheduled_on(&self, date: NaiveDate) -> StoreResult<Vec<Appointment>>;
}

/// Build estimator input for `id` from the store.
///
/// # Errors
///
/// - `StoreError::PatientNotFound` if the patient does not exist.
/// - `StoreError::Unavailable` if the store cannot be queried.
pub fn collect_stats(
    store: &dyn AppointmentStore,
    id: PatientId,
    window_days: u32,
    as_of: NaiveDate,
) -> StoreResult<HistoricalStats> {
    let patient = store.patient(id)?;
    let counts = store.outcome_counts(id, window_days, as_of)?;
    let days_since_last_visit = match store.last_attended(id)? {
        Some(last) => u32::try_from((as_of - last).num_days().max(0)).unwrap_or(u32::MAX),
        None => NEVER_VISITED_DAYS,
    };
    let diagnosis_code = store.latest_diagnosis(id)?;

    Ok(HistoricalStats {
        attendance_count: counts.attended + counts.no_show,
        no_show_count: counts.no_show,
        days_since_last_visit,
        patient_age: patient.age_on(as_of),
        behavior_score: patient.behavior_score,
        diagnosis_code,
    })
}

/// Booked appointments per day for the `days` days before `today`.
pub fn daily_counts(
    store: &dyn AppointmentStore,
    days: u32,
    today: NaiveDate,
) -> StoreResult<Vec<DailyCount>> {
    let start = today - Duration::days(i64::from(days));
    (0..days)
        .map(|i| {
            let date = start + Duration::days(i64::from(i));
            Ok(DailyCount {
                date,
                appointments: store.booked_count(date)?,
            })
        })
        .collect()
}
