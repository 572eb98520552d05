//! In-process appointment store, optionally seeded from a JSON file.

use super::{Appointment, AppointmentStatus, AppointmentStore, OutcomeCounts, PatientRecord};
use crate::{StoreError, StoreResult};
use chrono::{Duration, NaiveDate};
use clinica_types::{CidCode, PatientId};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

/// Behaviour feature derived from the patient id, used only for demonstration data.
///
/// Spreads seeded patients across `0.0..=0.9` so the pattern factor has something to act on.
pub fn demo_behavior_score(id: PatientId) -> f64 {
    (id.get() % 10) as f64 / 10.0
}

#[derive(Debug, Clone, PartialEq)]
struct DiagnosisEntry {
    code: CidCode,
    recorded_on: NaiveDate,
}

#[derive(Debug, Default)]
struct StoreData {
    patients: HashMap<PatientId, PatientRecord>,
    appointments: Vec<Appointment>,
    diagnoses: HashMap<PatientId, Vec<DiagnosisEntry>>,
}

/// On-disk seed document.
#[derive(Debug, Deserialize)]
struct SeedFile {
    /// Fill missing behaviour scores with [`demo_behavior_score`].
    #[serde(default)]
    demo_patterns: bool,
    #[serde(default)]
    patients: Vec<PatientRecord>,
    #[serde(default)]
    appointments: Vec<Appointment>,
    #[serde(default)]
    diagnoses: Vec<SeedDiagnosis>,
}

#[derive(Debug, Deserialize)]
struct SeedDiagnosis {
    patient_id: PatientId,
    code: CidCode,
    recorded_on: NaiveDate,
}

/// Thread-safe store backed by in-memory maps.
///
/// The store can be marked unavailable to exercise degraded prediction paths.
#[derive(Debug)]
pub struct InMemoryAppointmentStore {
    data: RwLock<StoreData>,
    available: AtomicBool,
}

impl Default for InMemoryAppointmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(StoreData::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Load patients, appointments and diagnoses from a JSON seed file.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Seed` if the file cannot be read or parsed, or if an appointment or
    /// diagnosis refers to a patient missing from the file.
    pub fn from_seed_file(path: &Path) -> StoreResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Seed(format!("failed to read {}: {e}", path.display())))?;
        let store = Self::from_seed_json(&raw)?;
        tracing::info!("seeded appointment store from {}", path.display());
        Ok(store)
    }

    pub fn from_seed_json(raw: &str) -> StoreResult<Self> {
        let seed: SeedFile = serde_json::from_str(raw)
            .map_err(|e| StoreError::Seed(format!("invalid seed document: {e}")))?;

        let store = Self::new();
        for mut patient in seed.patients {
            if seed.demo_patterns && patient.behavior_score.is_none() {
                patient.behavior_score = Some(demo_behavior_score(patient.id));
            }
            store.insert_patient(patient);
        }
        {
            let data = store.read()?;
            let unknown = seed
                .appointments
                .iter()
                .map(|a| a.patient_id)
                .chain(seed.diagnoses.iter().map(|d| d.patient_id))
                .find(|id| !data.patients.contains_key(id));
            if let Some(id) = unknown {
                return Err(StoreError::Seed(format!(
                    "seed references unknown patient {id}"
                )));
            }
        }
        for appointment in seed.appointments {
            store.insert_appointment(appointment);
        }
        for d in seed.diagnoses {
            store.insert_diagnosis(d.patient_id, d.code, d.recorded_on);
        }
        Ok(store)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn insert_patient(&self, patient: PatientRecord) {
        if let Ok(mut data) = self.data.write() {
            data.patients.insert(patient.id, patient);
        }
    }

    pub fn insert_appointment(&self, appointment: Appointment) {
        if let Ok(mut data) = self.data.write() {
            data.appointments.push(appointment);
        }
    }

    pub fn insert_diagnosis(&self, id: PatientId, code: CidCode, recorded_on: NaiveDate) {
        if let Ok(mut data) = self.data.write() {
            data.diagnoses
                .entry(id)
                .or_default()
                .push(DiagnosisEntry { code, recorded_on });
        }
    }

    pub fn patient_count(&self) -> usize {
        self.data.read().map(|d| d.patients.len()).unwrap_or(0)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(
                "appointment store is offline".into(),
            ))
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreData>> {
        self.check_available()?;
        self.data
            .read()
            .map_err(|_| StoreError::Unavailable("appointment store lock poisoned".into()))
    }
}

impl AppointmentStore for InMemoryAppointmentStore {
    fn patient(&self, id: PatientId) -> StoreResult<PatientRecord> {
        self.read()?
            .patients
            .get(&id)
            .cloned()
            .ok_or(StoreError::PatientNotFound(id))
    }

    fn outcome_counts(
        &self,
        id: PatientId,
        window_days: u32,
        as_of: NaiveDate,
    ) -> StoreResult<OutcomeCounts> {
        let data = self.read()?;
        let since = as_of - Duration::days(i64::from(window_days));
        let mut counts = OutcomeCounts::default();
        for a in data
            .appointments
            .iter()
            .filter(|a| a.patient_id == id && a.date >= since && a.date <= as_of)
        {
            match a.status {
                AppointmentStatus::Attended => counts.attended += 1,
                AppointmentStatus::NoShow => counts.no_show += 1,
                AppointmentStatus::Scheduled | AppointmentStatus::Cancelled => {}
            }
        }
        Ok(counts)
    }

    fn last_attended(&self, id: PatientId) -> StoreResult<Option<NaiveDate>> {
        Ok(self
            .read()?
            .appointments
            .iter()
            .filter(|a| a.patient_id == id && a.status == AppointmentStatus::Attended)
            .map(|a| a.date)
            .max())
    }

    fn latest_diagnosis(&self, id: PatientId) -> StoreResult<Option<CidCode>> {
        Ok(self.read()?.diagnoses.get(&id).and_then(|entries| {
            entries
                .iter()
                .max_by_key(|e| e.recorded_on)
                .map(|e| e.code.clone())
        }))
    }

    fn booked_count(&self, date: NaiveDate) -> StoreResult<u32> {
        let count = self
            .read()?
            .appointments
            .iter()
            .filter(|a| a.date == date && a.status != AppointmentStatus::Cancelled)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn scheduled_on(&self, date: NaiveDate) -> StoreResult<Vec<Appointment>> {
        let mut scheduled: Vec<Appointment> = self
            .read()?
            .appointments
            .iter()
            .filter(|a| a.date == date && a.status == AppointmentStatus::Scheduled)
            .cloned()
            .collect();
        scheduled.sort_by_key(|a| (a.time, a.id));
        Ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn patient(id: u64) -> PatientId {
        PatientId::new(id).expect("valid id")
    }

    const SEED: &str = r#"{
        "demo_patterns": true,
        "patients": [
            {"id": 7, "name": "Carlos Alves", "birth_date": "1988-02-01"},
            {"id": 12, "name": "Beatriz Rocha", "behavior_score": 0.1}
        ],
        "appointments": [
            {"id": 1, "patient_id": 7, "date": "2025-11-04", "time": "14:00:00", "status": "agendado"},
            {"id": 2, "patient_id": 12, "date": "2025-11-04", "time": "08:00:00", "status": "agendado"},
            {"id": 3, "patient_id": 12, "date": "2025-11-04", "status": "cancelado"},
            {"id": 4, "patient_id": 7, "date": "2025-10-01", "status": "faltou"}
        ],
        "diagnoses": [
            {"patient_id": 7, "code": "M79.3", "recorded_on": "2025-09-01"}
        ]
    }"#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_demo_behavior_score_spreads_by_id() {
        assert_eq!(demo_behavior_score(patient(10)), 0.0);
        assert_eq!(demo_behavior_score(patient(7)), 0.7);
        assert_eq!(demo_behavior_score(patient(19)), 0.9);
    }

    #[test]
    fn test_seed_fills_demo_scores_only_when_missing() {
        let store = InMemoryAppointmentStore::from_seed_json(SEED).expect("seed");
        assert_eq!(store.patient_count(), 2);
        assert_eq!(
            store.patient(patient(7)).expect("patient").behavior_score,
            Some(0.7)
        );
        assert_eq!(
            store.patient(patient(12)).expect("patient").behavior_score,
            Some(0.1)
        );
    }

    #[test]
    fn test_bundled_demo_seed_loads() {
        let store = InMemoryAppointmentStore::from_seed_json(include_str!("../../seed/demo.json"))
            .expect("demo seed");
        assert_eq!(store.patient_count(), 5);
        assert_eq!(
            store.patient(patient(5)).expect("patient").behavior_score,
            Some(0.5)
        );
        assert_eq!(
            store
                .latest_diagnosis(patient(2))
                .expect("diagnosis")
                .map(|c| c.to_string()),
            Some("S83.5".to_string())
        );
    }

    #[test]
    fn test_scheduled_on_orders_by_time_and_skips_cancelled() {
        let store = InMemoryAppointmentStore::from_seed_json(SEED).expect("seed");
        let scheduled = store.scheduled_on(date(2025, 11, 4)).expect("scheduled");
        let ids: Vec<u64> = scheduled.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(store.booked_count(date(2025, 11, 4)).expect("count"), 2);
    }

    #[test]
    fn test_seed_rejects_unknown_patient_reference() {
        let raw = r#"{"patients": [], "appointments": [
            {"id": 1, "patient_id": 3, "date": "2025-11-04", "status": "agendado"}
        ]}"#;
        let err = InMemoryAppointmentStore::from_seed_json(raw).expect_err("should reject");
        assert!(matches!(err, StoreError::Seed(msg) if msg.contains("unknown patient 3")));
    }

    #[test]
    fn test_seed_rejects_zero_patient_id() {
        let raw = r#"{"patients": [{"id": 0, "name": "x"}]}"#;
        assert!(matches!(
            InMemoryAppointmentStore::from_seed_json(raw),
            Err(StoreError::Seed(_))
        ));
    }

    #[test]
    fn test_from_seed_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SEED.as_bytes()).expect("write seed");
        let store = InMemoryAppointmentStore::from_seed_file(file.path()).expect("seed");
        assert_eq!(
            store
                .latest_diagnosis(patient(7))
                .expect("diagnosis")
                .map(|c| c.to_string()),
            Some("M79.3".to_string())
        );
    }

    #[test]
    fn test_offline_store_reports_unavailable() {
        let store = InMemoryAppointmentStore::from_seed_json(SEED).expect("seed");
        store.set_available(false);
        assert!(matches!(
            store.patient(patient(7)),
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.booked_count(date(2025, 11, 4)),
            Err(StoreError::Unavailable(_))
        ));
        store.set_available(true);
        assert!(store.patient(patient(7)).is_ok());
    }
}
