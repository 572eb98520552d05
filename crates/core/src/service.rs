//! Prediction orchestration.
//!
//! [`PredictionService`] gathers patient history from the appointment store, picks the remote
//! model service when one is configured and reachable, and falls back to the local heuristic
//! otherwise. An unavailable store degrades predictions instead of failing them.

use crate::audit::{NewPrediction, PredictionKind, PredictionLog};
use crate::config::EstimatorConfig;
use crate::constants::{
    HEURISTIC_DEMAND_MODEL, HEURISTIC_NO_SHOW_MODEL, REMOTE_DEMAND_MODEL, REMOTE_NO_SHOW_MODEL,
};
use crate::demand::demand_action;
use crate::heuristic::{validate_stats, HeuristicPredictor};
use crate::model::{
    DemandForecast, DemandRequest, DemandTrends, DiagnosisDemand, HistoricalStats, NoShowQuery,
    PredictionSource, RiskPrediction, SeasonalAnalysis,
};
use crate::predictor::Predictor;
use crate::remote::RemotePredictor;
use crate::store::{collect_stats, daily_counts, AppointmentStore};
use crate::validation::{validate_date_range, validate_period_days};
use crate::{PredictionError, PredictionResult, StoreError};
use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use clinica_types::PatientId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome for one patient of a batch request.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub patient_id: PatientId,
    pub result: PredictionResult<RiskPrediction>,
}

/// Prediction for one scheduled appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AppointmentRisk {
    #[serde(rename = "agendamento_id")]
    pub appointment_id: u64,
    #[serde(rename = "paciente_nome")]
    pub patient_name: String,
    #[serde(rename = "hora")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub time: Option<NaiveTime>,
    #[serde(rename = "previsao")]
    pub prediction: RiskPrediction,
}

/// Availability of the model service and the appointment store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MlHealth {
    /// `online`, `offline` or `disabled`.
    pub ml_api_status: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub ml_api_data: Option<serde_json::Value>,
    pub store_available: bool,
    pub tables_version: String,
}

pub struct PredictionService {
    config: EstimatorConfig,
    heuristic: HeuristicPredictor,
    remote: Option<Arc<dyn Predictor>>,
    store: Arc<dyn AppointmentStore>,
    log: Option<Arc<PredictionLog>>,
}

impl PredictionService {
    /// Build the service, creating a remote client when the configuration names a URL.
    ///
    /// # Errors
    ///
    /// Returns `PredictionError::Configuration` if the remote client cannot be created.
    pub fn new(
        config: EstimatorConfig,
        store: Arc<dyn AppointmentStore>,
    ) -> PredictionResult<Self> {
        let heuristic = HeuristicPredictor::new(config.tables().clone(), config.base_daily());
        let remote: Option<Arc<dyn Predictor>> = match config.ml_api_url() {
            Some(url) => {
                tracing::info!("model service enabled at {}", url);
                Some(Arc::new(RemotePredictor::new(
                    url,
                    config.ml_api_timeout(),
                    config.tables().clone(),
                )?))
            }
            None => {
                tracing::info!("model service disabled, using heuristic predictions only");
                None
            }
        };
        Ok(Self {
            config,
            heuristic,
            remote,
            store,
            log: None,
        })
    }

    /// Use `remote` instead of the configured model service.
    pub fn with_remote(mut self, remote: Arc<dyn Predictor>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Record every successful prediction in `log`.
    pub fn with_log(mut self, log: Arc<PredictionLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn heuristic(&self) -> &HeuristicPredictor {
        &self.heuristic
    }

    pub fn store(&self) -> &Arc<dyn AppointmentStore> {
        &self.store
    }

    pub fn log(&self) -> Option<&Arc<PredictionLog>> {
        self.log.as_ref()
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// History for `id`, or `None` when the store is unavailable.
    fn stats_for(&self, id: PatientId) -> PredictionResult<Option<HistoricalStats>> {
        match collect_stats(
            self.store.as_ref(),
            id,
            self.config.history_window_days(),
            Self::today(),
        ) {
            Ok(stats) => {
                validate_stats(&stats)?;
                Ok(Some(stats))
            }
            Err(StoreError::Unavailable(msg)) => {
                tracing::warn!("history unavailable for patient {}, degrading: {}", id, msg);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Predict the no-show probability for one appointment.
    ///
    /// # Errors
    ///
    /// - `PredictionError::InvalidInput` for an unknown patient or inconsistent history.
    /// - `PredictionError::Configuration` if seasonal adjustment is requested without a calendar.
    pub async fn predict_no_show(&self, query: NoShowQuery) -> PredictionResult<RiskPrediction> {
        let stats = self.stats_for(query.patient_id)?;
        let prediction = self.dispatch_no_show(&query, stats.as_ref()).await?;
        self.audit_no_show(&prediction, stats.as_ref());
        Ok(prediction)
    }

    async fn dispatch_no_show(
        &self,
        query: &NoShowQuery,
        stats: Option<&HistoricalStats>,
    ) -> PredictionResult<RiskPrediction> {
        // The model service has no holiday calendar; seasonal queries stay local.
        if let Some(remote) = self.remote.as_ref().filter(|_| !query.seasonal_adjustment) {
            match remote.predict_no_show(query, stats).await {
                Ok(prediction) => return Ok(prediction),
                Err(e) => tracing::warn!(
                    "{} prediction failed for patient {}, using heuristic: {}",
                    remote.name(),
                    query.patient_id,
                    e
                ),
            }
        }
        self.heuristic.estimate_no_show(query, stats)
    }

    /// Predict independently for each patient. Never fails as a whole.
    pub async fn predict_batch(
        &self,
        patient_ids: &[PatientId],
        date: NaiveDate,
        time: Option<NaiveTime>,
    ) -> Vec<BatchEntry> {
        let mut results: Vec<Option<PredictionResult<RiskPrediction>>> =
            Vec::with_capacity(patient_ids.len());
        let mut pending = Vec::new();
        let mut pending_slots = Vec::new();

        for &id in patient_ids {
            let mut query = NoShowQuery::new(id, date);
            query.target_time = time;
            match self.stats_for(id) {
                Ok(stats) => {
                    pending_slots.push(results.len());
                    pending.push((query, stats));
                    results.push(None);
                }
                Err(e) => results.push(Some(Err(e))),
            }
        }

        let remote_results = match &self.remote {
            Some(remote) if !pending.is_empty() => Some(remote.predict_batch(&pending).await),
            _ => None,
        };

        for (n, (query, stats)) in pending.iter().enumerate() {
            let from_remote = remote_results
                .as_ref()
                .and_then(|r| r.get(n))
                .and_then(|r| r.as_ref().ok())
                .cloned();
            let result = match from_remote {
                Some(prediction) => Ok(prediction),
                None => self.heuristic.estimate_no_show(query, stats.as_ref()),
            };
            if let Ok(prediction) = &result {
                self.audit_no_show(prediction, stats.as_ref());
            }
            results[pending_slots[n]] = Some(result);
        }

        patient_ids
            .iter()
            .zip(results)
            .map(|(&patient_id, result)| BatchEntry {
                patient_id,
                result: result.unwrap_or_else(|| {
                    Err(PredictionError::UpstreamUnavailable(
                        "no prediction produced".into(),
                    ))
                }),
            })
            .collect()
    }

    /// Predictions for every appointment still scheduled on `date`.
    ///
    /// # Errors
    ///
    /// Returns `PredictionError::UpstreamUnavailable` if the store cannot list appointments.
    pub async fn analyze_day(&self, date: NaiveDate) -> PredictionResult<Vec<AppointmentRisk>> {
        let appointments = self.store.scheduled_on(date)?;
        let mut risks = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            let mut query = NoShowQuery::new(appointment.patient_id, date);
            query.target_time = appointment.time;
            let prediction = match self.predict_no_show(query).await {
                Ok(prediction) => prediction,
                Err(e) => {
                    tracing::warn!(
                        "skipping appointment {} for patient {}: {}",
                        appointment.id,
                        appointment.patient_id,
                        e
                    );
                    continue;
                }
            };
            let patient_name = self
                .store
                .patient(appointment.patient_id)
                .map(|p| p.name)
                .unwrap_or_else(|_| "N/A".to_string());
            risks.push(AppointmentRisk {
                appointment_id: appointment.id,
                patient_name,
                time: appointment.time,
                prediction,
            });
        }
        Ok(risks)
    }

    /// Forecast daily demand for the requested range.
    ///
    /// # Errors
    ///
    /// Returns `PredictionError::InvalidInput` for an inverted or oversized range.
    pub async fn forecast_demand(
        &self,
        request: DemandRequest,
    ) -> PredictionResult<DemandForecast> {
        let days = validate_date_range(
            request.start,
            request.end,
            self.config.tables().demand.max_range_days,
        )?;
        let forecast = match &self.remote {
            Some(remote) => match remote.forecast_demand(&request).await {
                Ok(forecast) => forecast,
                Err(e) => {
                    tracing::warn!(
                        "{} demand forecast failed, using heuristic: {}",
                        remote.name(),
                        e
                    );
                    self.heuristic.forecaster().forecast(&request)?
                }
            },
            None => self.heuristic.forecaster().forecast(&request)?,
        };
        self.audit_demand(&forecast, days);
        Ok(forecast)
    }

    pub async fn demand_by_diagnosis(
        &self,
        period_days: u32,
    ) -> PredictionResult<DiagnosisDemand> {
        validate_period_days(period_days, self.config.tables().demand.max_range_days)?;
        if let Some(remote) = &self.remote {
            match remote.demand_by_diagnosis(period_days).await {
                Ok(demand) => return Ok(demand),
                Err(e) => tracing::warn!(
                    "{} diagnosis demand failed, using heuristic: {}",
                    remote.name(),
                    e
                ),
            }
        }
        self.heuristic.forecaster().by_diagnosis(period_days)
    }

    /// Demand over the trailing `period_days`, from the store when it is reachable.
    pub async fn demand_trends(&self, period_days: u32) -> PredictionResult<DemandTrends> {
        validate_period_days(period_days, self.config.tables().demand.max_range_days)?;
        let today = Self::today();
        if let Some(remote) = &self.remote {
            match remote.demand_trends(period_days, None, today).await {
                Ok(trends) => return Ok(trends),
                Err(e) => tracing::warn!(
                    "{} demand trends failed, using heuristic: {}",
                    remote.name(),
                    e
                ),
            }
        }
        let history = match daily_counts(self.store.as_ref(), period_days, today) {
            Ok(history) => Some(history),
            Err(e) => {
                tracing::warn!("demand history unavailable, using synthetic baseline: {}", e);
                None
            }
        };
        self.heuristic
            .forecaster()
            .trends(period_days, history.as_deref(), today)
    }

    pub async fn seasonal_analysis(&self) -> PredictionResult<SeasonalAnalysis> {
        if let Some(remote) = &self.remote {
            match remote.seasonal_analysis().await {
                Ok(analysis) => return Ok(analysis),
                Err(e) => tracing::warn!(
                    "{} seasonal analysis failed, using reference tables: {}",
                    remote.name(),
                    e
                ),
            }
        }
        Ok(self.heuristic.forecaster().seasonal_analysis())
    }

    pub async fn ml_health(&self) -> MlHealth {
        let (ml_api_status, ml_api_data) = match &self.remote {
            None => ("disabled", None),
            Some(remote) => match remote.health().await {
                Ok(data) => ("online", Some(data)),
                Err(e) => {
                    tracing::warn!("{} health check failed: {}", remote.name(), e);
                    ("offline", None)
                }
            },
        };
        MlHealth {
            ml_api_status: ml_api_status.to_string(),
            ml_api_data,
            store_available: self.store.booked_count(Self::today()).is_ok(),
            tables_version: self.config.tables().version.clone(),
        }
    }

    pub async fn model_info(&self) -> serde_json::Value {
        let heuristic = self
            .heuristic
            .model_info()
            .await
            .unwrap_or(serde_json::Value::Null);
        let remote = match &self.remote {
            None => serde_json::Value::Null,
            Some(remote) => remote.model_info().await.unwrap_or_else(|e| {
                serde_json::json!({ "error": e.kind(), "message": e.to_string() })
            }),
        };
        serde_json::json!({
            "active_predictor": self.remote.as_ref().map_or(self.heuristic.name(), |r| r.name()),
            "heuristic": heuristic,
            "ml_api": remote,
        })
    }

    fn audit_no_show(&self, prediction: &RiskPrediction, stats: Option<&HistoricalStats>) {
        let Some(log) = &self.log else {
            return;
        };
        let model = match prediction.source {
            PredictionSource::Fallback => HEURISTIC_NO_SHOW_MODEL,
            PredictionSource::MlApi => REMOTE_NO_SHOW_MODEL,
        };
        let entry = NewPrediction {
            patient_id: Some(prediction.patient_id),
            kind: PredictionKind::NoShow,
            value: prediction.probability,
            confidence: Some(prediction.confidence),
            target_date: prediction.target_date,
            target_end: None,
            model: model.to_string(),
            inputs: serde_json::json!({
                "idade": stats.and_then(|s| s.patient_age),
                "historico_faltas": stats.map(HistoricalStats::no_show_ratio),
                "dia_semana": prediction.target_date.weekday().num_days_from_sunday(),
                "fatores_risco": prediction.contributing_factors,
            }),
            recommended_action: None,
        };
        if let Err(e) = log.record(entry, Utc::now()) {
            tracing::error!("failed to record no-show prediction: {:?}", e);
        }
    }

    fn audit_demand(&self, forecast: &DemandForecast, days: u32) {
        let Some(log) = &self.log else {
            return;
        };
        let model = match forecast.source {
            PredictionSource::Fallback => HEURISTIC_DEMAND_MODEL,
            PredictionSource::MlApi => REMOTE_DEMAND_MODEL,
        };
        let entry = NewPrediction {
            patient_id: None,
            kind: PredictionKind::DemandPeriod,
            value: forecast.predicted_appointments as f64,
            confidence: Some(forecast.model_confidence),
            target_date: forecast.period_start,
            target_end: Some(forecast.period_end),
            model: model.to_string(),
            inputs: serde_json::json!({
                "start_date": forecast.period_start,
                "end_date": forecast.period_end,
                "diagnostico": forecast.diagnosis_filter,
                "seasonal_factors": forecast.seasonal_factors,
            }),
            recommended_action: Some(
                demand_action(forecast.predicted_appointments, days)
                    .message()
                    .to_string(),
            ),
        };
        if let Err(e) = log.record(entry, Utc::now()) {
            tracing::error!("failed to record demand prediction: {:?}", e);
        }
    }
}
