//! Append-only log of issued predictions and the follow-up actions taken on them.
//!
//! The log is bounded: records older than [`MAX_STATISTICS_DAYS`] are pruned on insert and the
//! oldest records are dropped once the configured capacity is reached. A repeated pending
//! no-show alert for the same patient and appointment date within [`ALERT_DEDUP_HOURS`] reuses
//! the existing record.

use crate::constants::{ALERT_DEDUP_HOURS, DEFAULT_PREDICTION_LOG_CAPACITY, MAX_STATISTICS_DAYS};
use crate::{AuditError, AuditResult};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clinica_types::PatientId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;
use uuid::Uuid;

/// No-show value at or above which a pending alert is urgent.
pub const URGENT_NO_SHOW: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum PredictionKind {
    #[serde(rename = "probabilidade_falta")]
    NoShow,
    #[serde(rename = "demanda_periodo")]
    DemandPeriod,
}

impl PredictionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionKind::NoShow => "probabilidade_falta",
            PredictionKind::DemandPeriod => "demanda_periodo",
        }
    }

    /// Level shown for a stored value of this kind.
    pub fn level(&self, value: f64) -> &'static str {
        match self {
            PredictionKind::NoShow if value >= 0.8 => "alto",
            PredictionKind::NoShow if value >= 0.5 => "medio",
            PredictionKind::NoShow => "baixo",
            PredictionKind::DemandPeriod => "neutro",
        }
    }

    /// Follow-up action derived from the value alone.
    ///
    /// Demand records carry a volume, not a probability, so their action always comes from the
    /// caller.
    pub fn action(&self, value: f64) -> Option<&'static str> {
        match self {
            PredictionKind::NoShow if value >= 0.8 => Some("Enviar lembrete urgente via WhatsApp"),
            PredictionKind::NoShow if value >= 0.6 => Some("Enviar lembrete por SMS"),
            PredictionKind::NoShow if value >= 0.4 => Some("Ligar para confirmar presença"),
            PredictionKind::NoShow => Some("Monitorar paciente"),
            PredictionKind::DemandPeriod => None,
        }
    }
}

/// Qualitative band for a stored confidence value.
pub fn confidence_level(confidence: Option<f64>) -> &'static str {
    match confidence {
        None => "desconhecida",
        Some(c) if c >= 0.9 => "muito_alta",
        Some(c) if c >= 0.8 => "alta",
        Some(c) if c >= 0.6 => "media",
        Some(c) if c >= 0.4 => "baixa",
        Some(_) => "muito_baixa",
    }
}

/// Input for [`PredictionLog::record`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub patient_id: Option<PatientId>,
    pub kind: PredictionKind,
    pub value: f64,
    pub confidence: Option<f64>,
    pub target_date: NaiveDate,
    pub target_end: Option<NaiveDate>,
    pub model: String,
    pub inputs: serde_json::Value,
    /// Overrides the action table for this kind when set.
    pub recommended_action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PredictionRecord {
    pub id: Uuid,
    #[serde(rename = "paciente_id")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<u64>))]
    pub patient_id: Option<PatientId>,
    #[serde(rename = "tipo_previsao")]
    pub kind: PredictionKind,
    #[serde(rename = "valor_previsao")]
    pub value: f64,
    #[serde(rename = "confianca")]
    pub confidence: Option<f64>,
    #[serde(rename = "data_previsao")]
    pub target_date: NaiveDate,
    #[serde(rename = "data_fim_previsao")]
    pub target_end: Option<NaiveDate>,
    #[serde(rename = "modelo_utilizado")]
    pub model: String,
    #[serde(rename = "parametros_entrada")]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub inputs: serde_json::Value,
    #[serde(rename = "acao_recomendada")]
    pub recommended_action: String,
    #[serde(rename = "executada")]
    pub executed: bool,
    #[serde(rename = "observacoes_execucao")]
    pub execution_notes: Option<String>,
    #[serde(rename = "data_calculo")]
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn level(&self) -> &'static str {
        self.kind.level(self.value)
    }

    pub fn confidence_level(&self) -> &'static str {
        confidence_level(self.confidence)
    }

    /// Follow-up state: `executada`, `urgente`, `pendente` or `sem_acao`.
    pub fn status(&self) -> &'static str {
        if self.executed {
            "executada"
        } else if self.recommended_action.is_empty() {
            "sem_acao"
        } else if self.kind == PredictionKind::NoShow && self.value >= URGENT_NO_SHOW {
            "urgente"
        } else {
            "pendente"
        }
    }

    fn same_alert(&self, new: &NewPrediction, since: DateTime<Utc>) -> bool {
        new.kind == PredictionKind::NoShow
            && new.patient_id.is_some()
            && self.kind == new.kind
            && self.patient_id == new.patient_id
            && self.target_date == new.target_date
            && !self.executed
            && self.created_at >= since
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RiskDistribution {
    pub baixo: usize,
    pub medio: usize,
    pub alto: usize,
}

/// How the no-show model's alerts were followed up over a period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ModelEfficacy {
    pub total_predictions: usize,
    /// Mean stored confidence, two decimal places; absent when no record carries one.
    pub average_confidence: Option<f64>,
    /// Predictions at or above the urgent threshold.
    pub high_risk_predictions: usize,
    pub actions_executed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PredictionStatistics {
    pub total_predictions: usize,
    pub predictions_by_type: BTreeMap<String, usize>,
    /// No-show predictions only.
    pub risk_distribution: RiskDistribution,
    pub actions_executed: usize,
    /// Percentage of predictions acted upon, one decimal place.
    pub execution_rate: f64,
    pub model_efficacy: ModelEfficacy,
}

#[derive(Debug)]
pub struct PredictionLog {
    records: RwLock<VecDeque<PredictionRecord>>,
    capacity: usize,
}

impl Default for PredictionLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PREDICTION_LOG_CAPACITY)
    }
}

impl PredictionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log holding at most `capacity` records (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a prediction, or return the pending alert it duplicates.
    pub fn record(&self, new: NewPrediction, now: DateTime<Utc>) -> AuditResult<PredictionRecord> {
        let mut records = self.records.write().map_err(|_| AuditError::Poisoned)?;

        let dedup_since = now - Duration::hours(ALERT_DEDUP_HOURS);
        if let Some(existing) = records.iter().rev().find(|r| r.same_alert(&new, dedup_since)) {
            return Ok(existing.clone());
        }

        let retention_start = now - Duration::days(i64::from(MAX_STATISTICS_DAYS));
        while records
            .front()
            .is_some_and(|r| r.created_at < retention_start)
        {
            records.pop_front();
        }
        while records.len() >= self.capacity {
            records.pop_front();
        }

        let recommended_action = new
            .recommended_action
            .or_else(|| new.kind.action(new.value).map(str::to_string))
            .unwrap_or_default();
        let record = PredictionRecord {
            id: Uuid::new_v4(),
            patient_id: new.patient_id,
            kind: new.kind,
            value: new.value,
            confidence: new.confidence,
            target_date: new.target_date,
            target_end: new.target_end,
            model: new.model,
            inputs: new.inputs,
            recommended_action,
            executed: false,
            execution_notes: None,
            created_at: now,
        };
        records.push_back(record.clone());
        Ok(record)
    }

    /// Flag the follow-up action of record `id` as done.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::NotFound` if no record has this id.
    pub fn mark_executed(&self, id: Uuid, notes: Option<String>) -> AuditResult<PredictionRecord> {
        let mut records = self.records.write().map_err(|_| AuditError::Poisoned)?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(AuditError::NotFound(id))?;
        record.executed = true;
        if notes.is_some() {
            record.execution_notes = notes;
        }
        Ok(record.clone())
    }

    /// Pending no-show predictions at or above `threshold` for `today` or later, highest first.
    pub fn high_risk(
        &self,
        threshold: f64,
        today: NaiveDate,
    ) -> AuditResult<Vec<PredictionRecord>> {
        let records = self.records.read().map_err(|_| AuditError::Poisoned)?;
        let mut matching: Vec<PredictionRecord> = records
            .iter()
            .filter(|r| {
                r.kind == PredictionKind::NoShow
                    && r.value >= threshold
                    && r.target_date >= today
                    && !r.executed
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.value.total_cmp(&a.value));
        Ok(matching)
    }

    /// Summary of predictions recorded during the last `days` days.
    pub fn statistics(&self, days: u32, now: DateTime<Utc>) -> AuditResult<PredictionStatistics> {
        let since = now - Duration::days(i64::from(days));
        let records = self.records.read().map_err(|_| AuditError::Poisoned)?;
        let recent: Vec<&PredictionRecord> =
            records.iter().filter(|r| r.created_at >= since).collect();

        let mut predictions_by_type = BTreeMap::new();
        let mut risk_distribution = RiskDistribution::default();
        let mut actions_executed = 0;
        for r in &recent {
            *predictions_by_type
                .entry(r.kind.as_str().to_string())
                .or_insert(0) += 1;
            if r.executed {
                actions_executed += 1;
            }
            if r.kind == PredictionKind::NoShow {
                if r.value < 0.3 {
                    risk_distribution.baixo += 1;
                } else if r.value < 0.6 {
                    risk_distribution.medio += 1;
                } else {
                    risk_distribution.alto += 1;
                }
            }
        }

        let total_predictions = recent.len();
        let execution_rate = if total_predictions == 0 {
            0.0
        } else {
            crate::model::round_to(actions_executed as f64 / total_predictions as f64 * 100.0, 1)
        };

        Ok(PredictionStatistics {
            total_predictions,
            predictions_by_type,
            risk_distribution,
            actions_executed,
            execution_rate,
            model_efficacy: efficacy(
                recent
                    .iter()
                    .copied()
                    .filter(|r| r.kind == PredictionKind::NoShow),
            ),
        })
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn efficacy<'a>(records: impl Iterator<Item = &'a PredictionRecord>) -> ModelEfficacy {
    let mut summary = ModelEfficacy::default();
    let (mut confidence_sum, mut confidence_count) = (0.0, 0u32);
    for r in records {
        summary.total_predictions += 1;
        if r.value >= URGENT_NO_SHOW {
            summary.high_risk_predictions += 1;
        }
        if r.executed {
            summary.actions_executed += 1;
        }
        if let Some(c) = r.confidence {
            confidence_sum += c;
            confidence_count += 1;
        }
    }
    if confidence_count > 0 {
        summary.average_confidence = Some(crate::model::round_to(
            confidence_sum / f64::from(confidence_count),
            2,
        ));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn no_show(patient: u64, value: f64, target: NaiveDate) -> NewPrediction {
        NewPrediction {
            patient_id: Some(PatientId::new(patient).expect("id")),
            kind: PredictionKind::NoShow,
            value,
            confidence: Some(0.5),
            target_date: target,
            target_end: None,
            model: "Heuristic_Fallback_v1.0".into(),
            inputs: serde_json::json!({}),
            recommended_action: None,
        }
    }

    fn demand(total: f64, target: NaiveDate) -> NewPrediction {
        NewPrediction {
            patient_id: None,
            kind: PredictionKind::DemandPeriod,
            value: total,
            confidence: Some(0.6),
            target_date: target,
            target_end: Some(target + Duration::days(29)),
            model: "DemandHeuristic_v1.0".into(),
            inputs: serde_json::json!({}),
            recommended_action: Some("Volume dentro do esperado - manter operação normal".into()),
        }
    }

    #[test]
    fn test_action_table() {
        assert_eq!(
            PredictionKind::NoShow.action(0.85),
            Some("Enviar lembrete urgente via WhatsApp")
        );
        assert_eq!(PredictionKind::NoShow.action(0.6), Some("Enviar lembrete por SMS"));
        assert_eq!(
            PredictionKind::NoShow.action(0.4),
            Some("Ligar para confirmar presença")
        );
        assert_eq!(PredictionKind::NoShow.action(0.39), Some("Monitorar paciente"));
        assert_eq!(PredictionKind::DemandPeriod.action(450.0), None);
    }

    #[test]
    fn test_stored_levels_and_confidence_bands() {
        assert_eq!(PredictionKind::NoShow.level(0.8), "alto");
        assert_eq!(PredictionKind::NoShow.level(0.5), "medio");
        assert_eq!(PredictionKind::NoShow.level(0.49), "baixo");
        assert_eq!(PredictionKind::DemandPeriod.level(0.9), "neutro");
        assert_eq!(confidence_level(None), "desconhecida");
        assert_eq!(confidence_level(Some(0.95)), "muito_alta");
        assert_eq!(confidence_level(Some(0.8)), "alta");
        assert_eq!(confidence_level(Some(0.6)), "media");
        assert_eq!(confidence_level(Some(0.4)), "baixa");
        assert_eq!(confidence_level(Some(0.1)), "muito_baixa");
    }

    #[test]
    fn test_record_fills_action_and_status() {
        let log = PredictionLog::new();
        let record = log
            .record(no_show(1, 0.75, date(2025, 11, 4)), Utc::now())
            .expect("record");
        assert_eq!(record.recommended_action, "Enviar lembrete por SMS");
        assert_eq!(record.status(), "urgente");
        assert_eq!(record.confidence_level(), "baixa");
        assert!(!record.executed);

        let mut custom = no_show(2, 0.2, date(2025, 11, 4));
        custom.recommended_action = Some("Monitoramento padrão".into());
        let record = log.record(custom, Utc::now()).expect("record");
        assert_eq!(record.recommended_action, "Monitoramento padrão");
        assert_eq!(record.status(), "pendente");

        let mut no_action = demand(450.0, date(2025, 11, 1));
        no_action.recommended_action = None;
        let record = log.record(no_action, Utc::now()).expect("record");
        assert_eq!(record.recommended_action, "");
        assert_eq!(record.status(), "sem_acao");
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_repeated_alert_within_a_day_reuses_record() {
        let log = PredictionLog::new();
        let now = Utc::now();
        let target = date(2025, 11, 4);
        let first = log.record(no_show(1, 0.75, target), now).expect("record");
        let again = log
            .record(no_show(1, 0.8, target), now + Duration::hours(3))
            .expect("record");
        assert_eq!(again.id, first.id);
        assert_eq!(again.value, 0.75);
        assert_eq!(log.len(), 1);

        // Other patient, other date, a day later, or once acted upon: new records.
        log.record(no_show(2, 0.75, target), now).expect("record");
        log.record(no_show(1, 0.75, date(2025, 11, 5)), now)
            .expect("record");
        let later = log
            .record(no_show(1, 0.75, target), now + Duration::hours(25))
            .expect("record");
        assert_ne!(later.id, first.id);
        log.mark_executed(later.id, None).expect("mark");
        let after_execution = log
            .record(no_show(1, 0.75, target), now + Duration::hours(26))
            .expect("record");
        assert_ne!(after_execution.id, later.id);
        assert_eq!(log.len(), 5);

        // Demand records are never merged.
        log.record(demand(450.0, target), now).expect("record");
        log.record(demand(450.0, target), now).expect("record");
        assert_eq!(log.len(), 7);
    }

    #[test]
    fn test_mark_executed() {
        let log = PredictionLog::new();
        let record = log
            .record(no_show(1, 0.9, date(2025, 11, 4)), Utc::now())
            .expect("record");
        let updated = log
            .mark_executed(record.id, Some("Paciente confirmou".into()))
            .expect("mark");
        assert!(updated.executed);
        assert_eq!(updated.status(), "executada");
        assert_eq!(updated.execution_notes.as_deref(), Some("Paciente confirmou"));
        assert!(log
            .high_risk(0.0, date(2025, 11, 4))
            .expect("high risk")
            .is_empty());

        let missing = Uuid::new_v4();
        let err = log.mark_executed(missing, None).expect_err("unknown id");
        assert_eq!(err, AuditError::NotFound(missing));
    }

    #[test]
    fn test_high_risk_filters_and_orders() {
        let log = PredictionLog::new();
        let today = date(2025, 11, 4);
        let now = Utc::now();
        log.record(no_show(1, 0.65, today), now).expect("record");
        log.record(no_show(2, 0.9, date(2025, 11, 5)), now)
            .expect("record");
        log.record(no_show(3, 0.95, date(2025, 11, 3)), now)
            .expect("record");
        log.record(no_show(4, 0.3, today), now).expect("record");
        let done = log.record(no_show(5, 0.8, today), now).expect("record");
        log.mark_executed(done.id, None).expect("mark");

        let values: Vec<f64> = log
            .high_risk(0.6, today)
            .expect("high risk")
            .iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![0.9, 0.65]);
    }

    #[test]
    fn test_statistics() {
        let log = PredictionLog::new();
        let now = Utc::now();
        let target = date(2025, 11, 4);
        let ids: Vec<Uuid> = [0.1, 0.29, 0.3, 0.59, 0.7, 0.9]
            .into_iter()
            .zip(1u64..)
            .map(|(value, patient)| {
                log.record(no_show(patient, value, target), now)
                    .expect("record")
                    .id
            })
            .collect();
        log.record(demand(450.0, target), now).expect("record");
        // Too old to count.
        log.record(no_show(9, 0.9, target), now - Duration::days(40))
            .expect("record");
        log.mark_executed(ids[0], None).expect("mark");

        let stats = log.statistics(30, now).expect("statistics");
        assert_eq!(stats.total_predictions, 7);
        assert_eq!(stats.predictions_by_type["probabilidade_falta"], 6);
        assert_eq!(stats.predictions_by_type["demanda_periodo"], 1);
        assert_eq!(
            stats.risk_distribution,
            RiskDistribution {
                baixo: 2,
                medio: 2,
                alto: 2
            }
        );
        assert_eq!(stats.actions_executed, 1);
        assert_eq!(stats.execution_rate, 14.3);
        assert_eq!(
            stats.model_efficacy,
            ModelEfficacy {
                total_predictions: 6,
                average_confidence: Some(0.5),
                high_risk_predictions: 2,
                actions_executed: 1,
            }
        );
    }

    #[test]
    fn test_statistics_empty_log() {
        let stats = PredictionLog::new()
            .statistics(30, Utc::now())
            .expect("statistics");
        assert_eq!(stats.total_predictions, 0);
        assert_eq!(stats.execution_rate, 0.0);
        assert_eq!(stats.model_efficacy.average_confidence, None);
    }

    #[test]
    fn test_log_keeps_newest_records_within_capacity() {
        let log = PredictionLog::with_capacity(3);
        let now = Utc::now();
        let target = date(2025, 11, 4);
        let ids: Vec<Uuid> = (1..=5)
            .map(|patient| {
                log.record(no_show(patient, 0.9, target), now)
                    .expect("record")
                    .id
            })
            .collect();
        assert_eq!(log.len(), 3);

        let kept: Vec<Uuid> = log
            .high_risk(0.0, target)
            .expect("high risk")
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(kept.len(), 3);
        assert!(ids[2..].iter().all(|id| kept.contains(id)));
        assert_eq!(
            log.mark_executed(ids[0], None).expect_err("evicted"),
            AuditError::NotFound(ids[0])
        );
    }

    #[test]
    fn test_records_past_retention_are_pruned() {
        let log = PredictionLog::new();
        let now = Utc::now();
        let target = date(2025, 11, 4);
        let stale = now - Duration::days(i64::from(MAX_STATISTICS_DAYS) + 1);
        log.record(no_show(1, 0.9, target), stale).expect("record");
        log.record(no_show(2, 0.9, target), now - Duration::days(10))
            .expect("record");
        assert_eq!(log.len(), 2);

        log.record(no_show(3, 0.9, target), now).expect("record");
        assert_eq!(log.len(), 2);
        let stats = log.statistics(MAX_STATISTICS_DAYS, now).expect("stats");
        assert_eq!(stats.total_predictions, 2);
    }
}
