//! JSON envelopes for the prediction endpoints.
//!
//! Request bodies keep dates and times as raw strings so a malformed value becomes a structured
//! `invalid_input` error instead of an extractor rejection.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use clinica_core::{
    AppointmentRisk, BatchEntry, CidCode, DemandRequest, MlHealth, NoShowQuery, PatientId,
    PredictionError, PredictionRecord, PredictionResult, PredictionStatistics, RiskLevel,
    RiskPrediction,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Default threshold for the high-risk listing.
pub const DEFAULT_HIGH_RISK_THRESHOLD: f64 = 0.6;

/// Note stored when an action is marked as executed without observations.
pub const DEFAULT_EXECUTION_NOTE: &str = "Ação executada manualmente";

/// Structured error body returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub success: bool,
    /// Machine-readable kind, e.g. `invalid_input`.
    pub error: String,
    pub message: String,
}

impl ErrorRes {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: message.into(),
        }
    }
}

impl From<&PredictionError> for ErrorRes {
    fn from(err: &PredictionError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Parse an optional `YYYY-MM-DD` field. Blank counts as absent.
pub fn parse_date(field: &str, value: Option<&str>) -> PredictionResult<Option<NaiveDate>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                PredictionError::InvalidInput(format!("{field} must be a YYYY-MM-DD date, got {v}"))
            }),
    }
}

/// Parse an optional `HH:MM` or `HH:MM:SS` field. Blank counts as absent.
pub fn parse_time(field: &str, value: Option<&str>) -> PredictionResult<Option<NaiveTime>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveTime::parse_from_str(v, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(v, "%H:%M"))
            .map(Some)
            .map_err(|_| {
                PredictionError::InvalidInput(format!("{field} must be an HH:MM time, got {v}"))
            }),
    }
}

fn appointment_date(value: Option<&str>, today: NaiveDate) -> PredictionResult<NaiveDate> {
    match parse_date("data_agendamento", value)? {
        Some(date) => Ok(date),
        None => today.checked_add_days(Days::new(1)).ok_or_else(|| {
            PredictionError::InvalidInput(format!("no appointment date after {today}"))
        }),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictFaltaReq {
    /// Appointment date. Defaults to tomorrow.
    pub data_agendamento: Option<String>,
    /// Appointment time, `HH:MM`.
    pub hora: Option<String>,
    /// Apply December and holiday adjustments.
    #[serde(default)]
    pub ajuste_sazonal: bool,
}

impl PredictFaltaReq {
    /// Build the estimator query for `patient_id`.
    ///
    /// # Errors
    /// Returns `PredictionError::InvalidInput` for a malformed date or time.
    pub fn into_query(
        self,
        patient_id: PatientId,
        today: NaiveDate,
    ) -> PredictionResult<NoShowQuery> {
        let date = appointment_date(self.data_agendamento.as_deref(), today)?;
        let mut query =
            NoShowQuery::new(patient_id, date).with_seasonal_adjustment(self.ajuste_sazonal);
        query.target_time = parse_time("hora", self.hora.as_deref())?;
        Ok(query)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictFaltaRes {
    pub success: bool,
    pub prediction: RiskPrediction,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictBatchReq {
    #[serde(default)]
    pub paciente_ids: Vec<u64>,
    pub data_agendamento: Option<String>,
    pub hora: Option<String>,
}

impl PredictBatchReq {
    /// Validated patient ids, in request order.
    ///
    /// # Errors
    /// Returns `PredictionError::InvalidInput` for an empty list or a zero id.
    pub fn patient_ids(&self) -> PredictionResult<Vec<PatientId>> {
        if self.paciente_ids.is_empty() {
            return Err(PredictionError::InvalidInput(
                "paciente_ids must not be empty".into(),
            ));
        }
        self.paciente_ids
            .iter()
            .map(|&id| {
                PatientId::new(id).map_err(|e| PredictionError::InvalidInput(e.to_string()))
            })
            .collect()
    }

    /// Appointment slot shared by every patient of the batch.
    pub fn slot(&self, today: NaiveDate) -> PredictionResult<(NaiveDate, Option<NaiveTime>)> {
        Ok((
            appointment_date(self.data_agendamento.as_deref(), today)?,
            parse_time("hora", self.hora.as_deref())?,
        ))
    }
}

/// Outcome for one patient of a batch. Exactly one of `prediction` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchItemRes {
    pub paciente_id: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<RiskPrediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<BatchEntry> for BatchItemRes {
    fn from(entry: BatchEntry) -> Self {
        let paciente_id = entry.patient_id.get();
        match entry.result {
            Ok(prediction) => Self {
                paciente_id,
                success: true,
                prediction: Some(prediction),
                error: None,
                message: None,
            },
            Err(e) => Self {
                paciente_id,
                success: false,
                prediction: None,
                error: Some(e.kind().to_string()),
                message: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictBatchRes {
    pub success: bool,
    pub predictions: Vec<BatchItemRes>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalyzeTomorrowRes {
    pub success: bool,
    pub date: NaiveDate,
    pub total_agendamentos: usize,
    pub predictions: Vec<AppointmentRisk>,
    pub high_risk_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl AnalyzeTomorrowRes {
    pub fn new(date: NaiveDate, predictions: Vec<AppointmentRisk>, now: DateTime<Utc>) -> Self {
        let high_risk_count = predictions
            .iter()
            .filter(|p| p.prediction.risk_level == RiskLevel::High)
            .count();
        Self {
            success: true,
            date,
            total_agendamentos: predictions.len(),
            predictions,
            high_risk_count,
            timestamp: now,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HighRiskQuery {
    /// Minimum no-show probability, default 0.6.
    pub limite: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DaysQuery {
    /// Period length in days.
    pub days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HighRiskPatient {
    pub paciente_id: Option<u64>,
    pub paciente_nome: String,
    pub probabilidade_falta: f64,
    pub confianca: Option<f64>,
    pub data_previsao: NaiveDate,
    pub acao_recomendada: String,
    pub nivel_risco: String,
    pub nivel_confianca: String,
    /// `urgente` or `pendente`.
    pub status_recomendacao: String,
}

impl HighRiskPatient {
    pub fn new(record: &PredictionRecord, patient_name: String) -> Self {
        Self {
            paciente_id: record.patient_id.map(PatientId::get),
            paciente_nome: patient_name,
            probabilidade_falta: record.value,
            confianca: record.confidence,
            data_previsao: record.target_date,
            acao_recomendada: record.recommended_action.clone(),
            nivel_risco: record.level().to_string(),
            nivel_confianca: record.confidence_level().to_string(),
            status_recomendacao: record.status().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HighRiskRes {
    pub success: bool,
    pub limit_threshold: f64,
    pub total_high_risk: usize,
    pub patients: Vec<HighRiskPatient>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatisticsRes {
    pub success: bool,
    pub period_days: u32,
    pub statistics: PredictionStatistics,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MarkExecutedReq {
    pub observacoes: Option<String>,
}

impl MarkExecutedReq {
    pub fn notes(self) -> String {
        self.observacoes
            .filter(|o| !o.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_EXECUTION_NOTE.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MarkExecutedRes {
    pub success: bool,
    pub message: String,
    pub previsao: PredictionRecord,
    pub status_recomendacao: String,
}

impl MarkExecutedRes {
    pub fn new(previsao: PredictionRecord) -> Self {
        Self {
            success: true,
            message: "Ação marcada como executada".into(),
            status_recomendacao: previsao.status().to_string(),
            previsao,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictDemandReq {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// CID-10 code, echoed in the forecast.
    pub diagnostico: Option<String>,
}

impl PredictDemandReq {
    /// # Errors
    /// Returns `PredictionError::InvalidInput` when either date is missing or malformed, or the
    /// diagnosis is not a CID-10 code.
    pub fn into_request(self) -> PredictionResult<DemandRequest> {
        let start = parse_date("start_date", self.start_date.as_deref())?;
        let end = parse_date("end_date", self.end_date.as_deref())?;
        let (Some(start), Some(end)) = (start, end) else {
            return Err(PredictionError::InvalidInput(
                "start_date and end_date are required".into(),
            ));
        };
        let diagnosis = self
            .diagnostico
            .filter(|d| !d.trim().is_empty())
            .map(|d| CidCode::new(d).map_err(|e| PredictionError::InvalidInput(e.to_string())))
            .transpose()?;
        Ok(DemandRequest {
            start,
            end,
            diagnosis,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MlHealthRes {
    #[serde(flatten)]
    pub health: MlHealth,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ModelInfoRes {
    #[schema(value_type = Object)]
    pub model_info: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}
