//! HTTP client for the external model service.
//!
//! Every transport, status and decoding failure surfaces as
//! `PredictionError::UpstreamUnavailable`; the caller decides whether to fall back.
//! Values returned by the service are clamped into their valid ranges before use.

use crate::constants::{DEFAULT_REMOTE_AGE, DEFAULT_REMOTE_DIAGNOSIS, NEVER_VISITED_DAYS};
use crate::model::{
    round_to, DailyCount, DemandForecast, DemandForecastPoint, DemandRequest, DemandTrends,
    DiagnosisDemand, HistoricalStats, NoShowQuery, PieSlice, PredictionSource, RiskLevel,
    RiskPrediction, SeasonalAnalysis, SeasonalFactor, TrendDirection,
};
use crate::predictor::Predictor;
use crate::tables::{NamedFactor, PredictionTables};
use crate::{PredictionError, PredictionResult};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub struct RemotePredictor {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    tables: Arc<PredictionTables>,
}

/// Patient features sent to `/predict-falta` and `/predict-batch`.
#[derive(Debug, Serialize, PartialEq)]
struct PatientFeatures {
    paciente_id: u64,
    idade: u32,
    historico_faltas: f64,
    /// 0 = Sunday.
    dia_semana: u32,
    diagnostico_cid: String,
    dias_desde_ultima: u32,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    pacientes: &'a [PatientFeatures],
}

#[derive(Deserialize)]
struct BatchResponse {
    predictions: Vec<NoShowResponse>,
}

#[derive(Debug, Deserialize)]
struct NoShowResponse {
    #[serde(default)]
    paciente_id: Option<u64>,
    probabilidade_falta: f64,
    #[serde(default)]
    confianca: Option<f64>,
    #[serde(default)]
    fatores_risco: Vec<String>,
    #[serde(default)]
    acao_recomendada: Option<String>,
}

#[derive(Serialize)]
struct DemandPayload<'a> {
    start_date: NaiveDate,
    end_date: NaiveDate,
    diagnostico: Option<&'a str>,
}

#[derive(Deserialize)]
struct DemandResponse {
    predicted_appointments: f64,
    #[serde(default)]
    forecast_data: Vec<PointResponse>,
    #[serde(default)]
    confidence_interval: Option<[f64; 2]>,
    #[serde(default)]
    diagnostico_breakdown: BTreeMap<String, f64>,
    #[serde(default)]
    seasonal_factors: BTreeMap<String, f64>,
    #[serde(default)]
    model_confidence: Option<f64>,
}

#[derive(Deserialize)]
struct PointResponse {
    date: NaiveDate,
    predicted: f64,
    confidence_upper: f64,
    confidence_lower: f64,
}

#[derive(Deserialize)]
struct DiagnosisResponse {
    total_appointments: f64,
    #[serde(default)]
    breakdown: BTreeMap<String, f64>,
    #[serde(default)]
    pie_data: Vec<PieResponse>,
}

#[derive(Deserialize)]
struct PieResponse {
    name: String,
    value: f64,
    percentage: f64,
}

#[derive(Deserialize)]
struct TrendsResponse {
    #[serde(default)]
    historical_data: Vec<DailyResponse>,
    #[serde(default)]
    trend_direction: Option<String>,
    #[serde(default)]
    seasonality_detected: bool,
}

#[derive(Deserialize)]
struct DailyResponse {
    date: NaiveDate,
    appointments: f64,
}

#[derive(Deserialize)]
struct SeasonalResponse {
    seasonal_factors: SeasonalFactorsResponse,
    #[serde(default)]
    insights: Vec<String>,
}

#[derive(Deserialize)]
struct SeasonalFactorsResponse {
    monthly: BTreeMap<String, f64>,
    weekly: BTreeMap<String, f64>,
}

impl RemotePredictor {
    /// Create a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `PredictionError::Configuration` if the URL is empty or the HTTP client cannot be
    /// built.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tables: Arc<PredictionTables>,
    ) -> PredictionResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(PredictionError::Configuration(
                "model service URL cannot be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                PredictionError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            base_url: base_url.to_string(),
            client,
            timeout,
            tables,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, e: reqwest::Error) -> PredictionError {
        if e.is_connect() {
            PredictionError::UpstreamUnavailable(format!(
                "cannot connect to model service at {}",
                self.base_url
            ))
        } else if e.is_timeout() {
            PredictionError::UpstreamUnavailable(format!(
                "model service timed out after {}s",
                self.timeout.as_secs()
            ))
        } else {
            PredictionError::UpstreamUnavailable(format!("model service request failed: {e}"))
        }
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> PredictionResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictionError::UpstreamUnavailable(format!(
                "model service {path} returned {}: {body}",
                status.as_u16()
            )));
        }
        response.json::<T>().await.map_err(|e| {
            PredictionError::UpstreamUnavailable(format!(
                "invalid response from model service {path}: {e}"
            ))
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> PredictionResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(path, response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> PredictionResult<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(path, response).await
    }

    fn to_prediction(
        &self,
        query: &NoShowQuery,
        response: NoShowResponse,
    ) -> PredictionResult<RiskPrediction> {
        if let Some(id) = response.paciente_id {
            if id != query.patient_id.get() {
                return Err(PredictionError::UpstreamUnavailable(format!(
                    "model service answered for patient {id} instead of {}",
                    query.patient_id
                )));
            }
        }
        let t = &self.tables.no_show;
        let probability = round_to(unit(response.probabilidade_falta), 4);
        let confidence = unit(response.confianca.unwrap_or(t.fallback_confidence));
        let risk_level = RiskLevel::classify(probability, t.thresholds);
        let recommended_action = response.acao_recomendada.unwrap_or_else(|| {
            match risk_level {
                RiskLevel::High => t.actions.alto.clone(),
                RiskLevel::Medium => t.actions.medio.clone(),
                RiskLevel::Low => t.actions.baixo.clone(),
            }
        });
        Ok(RiskPrediction {
            patient_id: query.patient_id,
            probability,
            confidence,
            risk_level,
            contributing_factors: response.fatores_risco,
            recommended_action,
            target_date: query.target_date,
            generated_at: Utc::now(),
            source: PredictionSource::MlApi,
        })
    }

    fn ordered_factors(
        reference: &[NamedFactor],
        mut remote: BTreeMap<String, f64>,
    ) -> Vec<SeasonalFactor> {
        let mut ordered: Vec<SeasonalFactor> = reference
            .iter()
            .filter_map(|r| {
                remote.remove(&r.name).map(|factor| SeasonalFactor {
                    name: r.name.clone(),
                    factor,
                })
            })
            .collect();
        ordered.extend(
            remote
                .into_iter()
                .map(|(name, factor)| SeasonalFactor { name, factor }),
        );
        ordered
    }
}

fn features(query: &NoShowQuery, stats: Option<&HistoricalStats>) -> PatientFeatures {
    PatientFeatures {
        paciente_id: query.patient_id.get(),
        idade: stats
            .and_then(|s| s.patient_age)
            .unwrap_or(DEFAULT_REMOTE_AGE),
        historico_faltas: stats.map(HistoricalStats::no_show_ratio).unwrap_or(0.0),
        dia_semana: query.target_date.weekday().num_days_from_sunday(),
        diagnostico_cid: query
            .diagnosis_code
            .as_ref()
            .or_else(|| stats.and_then(|s| s.diagnosis_code.as_ref()))
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_REMOTE_DIAGNOSIS.to_string()),
        dias_desde_ultima: stats
            .map(|s| s.days_since_last_visit)
            .unwrap_or(NEVER_VISITED_DAYS),
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn count(value: f64) -> u64 {
    if value.is_nan() || value < 0.0 {
        0
    } else {
        value.round() as u64
    }
}

#[async_trait]
impl Predictor for RemotePredictor {
    fn name(&self) -> &'static str {
        "ml_api"
    }

    async fn health(&self) -> PredictionResult<serde_json::Value> {
        self.get("/health", &[]).await
    }

    async fn model_info(&self) -> PredictionResult<serde_json::Value> {
        self.get("/model-info", &[]).await
    }

    async fn predict_no_show(
        &self,
        query: &NoShowQuery,
        stats: Option<&HistoricalStats>,
    ) -> PredictionResult<RiskPrediction> {
        let payload = features(query, stats);
        tracing::info!(
            "sending no-show features for patient {} to model service",
            payload.paciente_id
        );
        let response: NoShowResponse = self.post("/predict-falta", &payload).await?;
        self.to_prediction(query, response)
    }

    async fn predict_batch(
        &self,
        items: &[(NoShowQuery, Option<HistoricalStats>)],
    ) -> Vec<PredictionResult<RiskPrediction>> {
        let payload: Vec<PatientFeatures> = items
            .iter()
            .map(|(query, stats)| features(query, stats.as_ref()))
            .collect();
        let response: BatchResponse = match self
            .post("/predict-batch", &BatchRequest { pacientes: &payload })
            .await
        {
            Ok(response) => response,
            Err(e) => return items.iter().map(|_| Err(e.clone())).collect(),
        };

        let mut by_patient: BTreeMap<u64, NoShowResponse> = response
            .predictions
            .into_iter()
            .filter_map(|p| p.paciente_id.map(|id| (id, p)))
            .collect();
        items
            .iter()
            .map(|(query, _)| match by_patient.remove(&query.patient_id.get()) {
                Some(response) => self.to_prediction(query, response),
                None => Err(PredictionError::UpstreamUnavailable(format!(
                    "model service returned no prediction for patient {}",
                    query.patient_id
                ))),
            })
            .collect()
    }

    async fn forecast_demand(&self, request: &DemandRequest) -> PredictionResult<DemandForecast> {
        let payload = DemandPayload {
            start_date: request.start,
            end_date: request.end,
            diagnostico: request.diagnosis.as_ref().map(|c| c.as_str()),
        };
        let response: DemandResponse = self.post("/predict-demand", &payload).await?;

        let days = (request.end - request.start).num_days().max(0) + 1;
        let total = count(response.predicted_appointments);
        let interval = response
            .confidence_interval
            .map(|[low, high]| [count(low), count(high)])
            .unwrap_or([total, total]);
        let points = response
            .forecast_data
            .into_iter()
            .map(|p| {
                let predicted = p.predicted.max(0.0);
                DemandForecastPoint {
                    date: p.date,
                    predicted,
                    confidence_upper: p.confidence_upper.max(predicted),
                    confidence_lower: p.confidence_lower.clamp(0.0, predicted),
                }
            })
            .collect();

        Ok(DemandForecast {
            success: true,
            period_start: request.start,
            period_end: request.end,
            diagnosis_filter: request.diagnosis.clone(),
            predicted_appointments: total,
            daily_average: round_to(total as f64 / days as f64, 1),
            confidence_interval: interval,
            points,
            diagnosis_breakdown: response
                .diagnostico_breakdown
                .into_iter()
                .map(|(code, n)| (code, count(n)))
                .collect(),
            seasonal_factors: response.seasonal_factors,
            model_confidence: unit(
                response
                    .model_confidence
                    .unwrap_or(self.tables.demand.model_confidence),
            ),
            generated_at: Utc::now(),
            source: PredictionSource::MlApi,
        })
    }

    async fn demand_by_diagnosis(&self, period_days: u32) -> PredictionResult<DiagnosisDemand> {
        let response: DiagnosisResponse = self
            .get("/demand-by-diagnosis", &[("days", period_days.to_string())])
            .await?;
        Ok(DiagnosisDemand {
            success: true,
            period_days,
            total_appointments: count(response.total_appointments),
            breakdown: response
                .breakdown
                .into_iter()
                .map(|(code, n)| (code, count(n)))
                .collect(),
            pie_data: response
                .pie_data
                .into_iter()
                .map(|p| PieSlice {
                    name: p.name,
                    value: count(p.value),
                    percentage: p.percentage.clamp(0.0, 100.0),
                })
                .collect(),
            source: PredictionSource::MlApi,
        })
    }

    async fn demand_trends(
        &self,
        period_days: u32,
        _history: Option<&[DailyCount]>,
        _today: NaiveDate,
    ) -> PredictionResult<DemandTrends> {
        let response: TrendsResponse = self
            .get("/demand-trends", &[("days", period_days.to_string())])
            .await?;
        let historical_data: Vec<DailyCount> = response
            .historical_data
            .into_iter()
            .map(|d| DailyCount {
                date: d.date,
                appointments: u32::try_from(count(d.appointments)).unwrap_or(u32::MAX),
            })
            .collect();
        let total: f64 = historical_data
            .iter()
            .map(|d| f64::from(d.appointments))
            .sum();
        let average_daily = if historical_data.is_empty() {
            0.0
        } else {
            round_to(total / historical_data.len() as f64, 1)
        };
        let trend_direction = match response.trend_direction.as_deref() {
            Some("increasing") => TrendDirection::Increasing,
            Some("decreasing") => TrendDirection::Decreasing,
            _ => TrendDirection::Stable,
        };
        Ok(DemandTrends {
            success: true,
            period_days,
            historical_data,
            average_daily,
            trend_direction,
            seasonality_detected: response.seasonality_detected,
            observed: true,
            source: PredictionSource::MlApi,
        })
    }

    async fn seasonal_analysis(&self) -> PredictionResult<SeasonalAnalysis> {
        let response: SeasonalResponse = self.get("/seasonal-analysis", &[]).await?;
        let reference = &self.tables.seasonal_analysis;
        Ok(SeasonalAnalysis {
            success: true,
            monthly: Self::ordered_factors(&reference.monthly, response.seasonal_factors.monthly),
            weekly: Self::ordered_factors(&reference.weekly, response.seasonal_factors.weekly),
            insights: response.insights,
            source: PredictionSource::MlApi,
        })
    }
}

impl std::fmt::Debug for RemotePredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePredictor")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinica_types::PatientId;

    fn tables() -> Arc<PredictionTables> {
        Arc::new(PredictionTables::embedded().expect("tables"))
    }

    fn patient(id: u64) -> PatientId {
        PatientId::new(id).expect("valid id")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn unreachable() -> RemotePredictor {
        // Port 9 (discard) is not expected to accept connections on a test host.
        RemotePredictor::new("http://127.0.0.1:9/", Duration::from_secs(2), tables())
            .expect("client")
    }

    #[test]
    fn test_new_rejects_empty_url() {
        let err = RemotePredictor::new("  ", Duration::from_secs(1), tables())
            .expect_err("should reject");
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let remote = unreachable();
        assert_eq!(remote.base_url(), "http://127.0.0.1:9");
        assert_eq!(remote.url("/health"), "http://127.0.0.1:9/health");
    }

    #[test]
    fn test_features_use_defaults_without_stats() {
        // 2025-11-09 is a Sunday.
        let query = NoShowQuery::new(patient(12), date(2025, 11, 9));
        let f = features(&query, None);
        assert_eq!(
            f,
            PatientFeatures {
                paciente_id: 12,
                idade: 40,
                historico_faltas: 0.0,
                dia_semana: 0,
                diagnostico_cid: "M79.3".into(),
                dias_desde_ultima: 365,
            }
        );
    }

    #[test]
    fn test_features_from_stats() {
        let query = NoShowQuery::new(patient(3), date(2025, 11, 10));
        let stats = HistoricalStats {
            attendance_count: 4,
            no_show_count: 1,
            days_since_last_visit: 12,
            patient_age: Some(67),
            behavior_score: None,
            diagnosis_code: Some("m54.5".parse().expect("code")),
        };
        let f = features(&query, Some(&stats));
        assert_eq!(f.idade, 67);
        assert_eq!(f.historico_faltas, 0.25);
        assert_eq!(f.dia_semana, 1);
        assert_eq!(f.diagnostico_cid, "M54.5");
        assert_eq!(f.dias_desde_ultima, 12);
    }

    #[test]
    fn test_remote_values_are_clamped() {
        let remote = unreachable();
        let query = NoShowQuery::new(patient(5), date(2025, 11, 10));
        let response: NoShowResponse = serde_json::from_value(serde_json::json!({
            "paciente_id": 5,
            "probabilidade_falta": 1.7,
            "confianca": -0.2,
            "fatores_risco": ["Histórico de faltas elevado"]
        }))
        .expect("response");
        let prediction = remote.to_prediction(&query, response).expect("prediction");
        assert_eq!(prediction.probability, 1.0);
        assert_eq!(prediction.confidence, 0.0);
        assert_eq!(prediction.risk_level, RiskLevel::High);
        assert_eq!(prediction.recommended_action, "Ligar para confirmar presença");
        assert_eq!(prediction.source, PredictionSource::MlApi);
    }

    #[test]
    fn test_mismatched_patient_is_rejected() {
        let remote = unreachable();
        let query = NoShowQuery::new(patient(5), date(2025, 11, 10));
        let response: NoShowResponse = serde_json::from_value(serde_json::json!({
            "paciente_id": 6,
            "probabilidade_falta": 0.2
        }))
        .expect("response");
        let err = remote
            .to_prediction(&query, response)
            .expect_err("should reject");
        assert_eq!(err.kind(), "upstream_unavailable");
    }

    #[test]
    fn test_seasonal_factors_follow_reference_order() {
        let t = tables();
        let remote: BTreeMap<String, f64> = [("Terça", 1.0), ("Segunda", 2.0), ("Extra", 0.5)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let ordered = RemotePredictor::ordered_factors(&t.seasonal_analysis.weekly, remote);
        let names: Vec<&str> = ordered.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Segunda", "Terça", "Extra"]);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_upstream_unavailable() {
        let remote = unreachable();
        let err = remote.health().await.expect_err("no service");
        assert!(matches!(err, PredictionError::UpstreamUnavailable(_)));

        let query = NoShowQuery::new(patient(1), date(2025, 11, 10));
        let results = remote.predict_batch(&[(query.clone(), None), (query, None)]).await;
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(PredictionError::UpstreamUnavailable(_)))));
    }
}
