//! # API REST
//!
//! REST API implementation for the clinic prediction service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, error status codes)
//!
//! Uses `api-shared` for request and response envelopes and `clinica-core` for predictions.

#![warn(rust_2018_idioms)]

pub mod bootstrap;
mod extract;

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{Days, NaiveDate, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api_shared::dto::{
    AnalyzeTomorrowRes, BatchItemRes, DaysQuery, HighRiskPatient, HighRiskQuery, HighRiskRes,
    MarkExecutedReq, MarkExecutedRes, MlHealthRes, ModelInfoRes, PredictBatchReq,
    PredictBatchRes, PredictDemandReq, PredictFaltaReq, PredictFaltaRes, StatisticsRes,
    DEFAULT_HIGH_RISK_THRESHOLD,
};
use api_shared::{ErrorRes, HealthRes, HealthService};
use clinica_core::constants::MAX_STATISTICS_DAYS;
use clinica_core::validation::{validate_period_days, validate_probability};
use extract::{JsonBody, OptionalJsonBody, QueryParams};

use clinica_core::{
    AppointmentRisk, AuditError, DemandForecast, DemandTrends, DiagnosisDemand, PatientId,
    PredictionError, PredictionLog, PredictionRecord, PredictionService, PredictionStatistics,
    RiskPrediction, SeasonalAnalysis,
};

/// Default period for statistics and demand by diagnosis.
const DEFAULT_PERIOD_DAYS: u32 = 30;

/// Default trailing window for demand trends.
const DEFAULT_TREND_DAYS: u32 = 90;

/// Application state for the REST API server
///
/// Contains shared state that needs to be accessible to all request handlers: the prediction
/// service and the audit log it records into.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub log: Arc<PredictionLog>,
}

type ApiError = (StatusCode, Json<ErrorRes>);

fn prediction_error(context: &str, e: PredictionError) -> ApiError {
    let status = match &e {
        PredictionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PredictionError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PredictionError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("{} error: {:?}", context, e);
    } else {
        tracing::warn!("{} rejected: {}", context, e);
    }
    (status, Json(ErrorRes::from(&e)))
}

fn audit_error(context: &str, e: AuditError) -> ApiError {
    match e {
        AuditError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorRes::new("not_found", e.to_string())),
        ),
        AuditError::Poisoned => {
            tracing::error!("{} error: {:?}", context, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorRes::new("internal_error", e.to_string())),
            )
        }
    }
}

fn parse_patient_id(raw: &str) -> Result<PatientId, ApiError> {
    raw.parse::<PatientId>().map_err(|e| {
        prediction_error(
            "Parse patient id",
            PredictionError::InvalidInput(e.to_string()),
        )
    })
}

fn tomorrow() -> Result<NaiveDate, ApiError> {
    let today = Utc::now().date_naive();
    today.checked_add_days(Days::new(1)).ok_or_else(|| {
        prediction_error(
            "Resolve tomorrow",
            PredictionError::InvalidInput(format!("no date after {today}")),
        )
    })
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        ml_health,
        model_info,
        predict_falta,
        predict_batch,
        analyze_tomorrow,
        high_risk_patients,
        statistics,
        mark_executed,
        predict_demand,
        demand_trends,
        demand_by_diagnosis,
        seasonal_analysis,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        MlHealthRes,
        ModelInfoRes,
        PredictFaltaReq,
        PredictFaltaRes,
        PredictBatchReq,
        PredictBatchRes,
        BatchItemRes,
        AnalyzeTomorrowRes,
        AppointmentRisk,
        RiskPrediction,
        HighRiskRes,
        HighRiskPatient,
        StatisticsRes,
        PredictionStatistics,
        MarkExecutedReq,
        MarkExecutedRes,
        PredictionRecord,
        PredictDemandReq,
        DemandForecast,
        DemandTrends,
        DiagnosisDemand,
        SeasonalAnalysis,
    ))
)]
pub struct ApiDoc;

/// Build the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ml/health", get(ml_health))
        .route("/ml/model-info", get(model_info))
        .route("/ml/predict-falta/:paciente_id", post(predict_falta))
        .route("/ml/predict-batch", post(predict_batch))
        .route("/ml/analyze-tomorrow", get(analyze_tomorrow))
        .route("/ml/high-risk-patients", get(high_risk_patients))
        .route("/ml/statistics", get(statistics))
        .route("/ml/mark-executed/:id", put(mark_executed))
        .route("/ml/predict-demand", post(predict_demand))
        .route("/ml/demand-trends", get(demand_trends))
        .route("/ml/demand-by-diagnosis", get(demand_by_diagnosis))
        .route("/ml/seasonal-analysis", get(seasonal_analysis))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Liveness only. Used for monitoring and load balancer health checks.
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/ml/health",
    responses(
        (status = 200, description = "Model service and store availability", body = MlHealthRes)
    )
)]
/// Report whether the model service is online, offline or disabled.
///
/// Always answers 200: an unreachable model service is reported, not raised.
#[axum::debug_handler]
async fn ml_health(State(state): State<AppState>) -> Json<MlHealthRes> {
    Json(MlHealthRes {
        health: state.service.ml_health().await,
        timestamp: Utc::now(),
    })
}

#[utoipa::path(
    get,
    path = "/ml/model-info",
    responses(
        (status = 200, description = "Active predictor and model details", body = ModelInfoRes)
    )
)]
#[axum::debug_handler]
async fn model_info(State(state): State<AppState>) -> Json<ModelInfoRes> {
    Json(ModelInfoRes {
        model_info: state.service.model_info().await,
        timestamp: Utc::now(),
    })
}

#[utoipa::path(
    post,
    path = "/ml/predict-falta/{paciente_id}",
    params(("paciente_id" = u64, Path, description = "Patient identifier")),
    request_body = PredictFaltaReq,
    responses(
        (status = 200, description = "No-show prediction", body = PredictFaltaRes),
        (status = 400, description = "Unknown patient or malformed input", body = ErrorRes),
        (status = 500, description = "Configuration error", body = ErrorRes)
    )
)]
/// Predict the no-show probability for one patient
///
/// The appointment date defaults to tomorrow. The body may be omitted entirely.
///
/// # Errors
/// Returns `400 Bad Request` if:
/// - the patient id is not a positive integer or is unknown,
/// - the body is not JSON or has fields of the wrong type,
/// - the date or time is malformed.
///
/// Returns `500 Internal Server Error` if seasonal adjustment is requested without a holiday
/// calendar.
#[axum::debug_handler]
async fn predict_falta(
    State(state): State<AppState>,
    AxumPath(paciente_id): AxumPath<String>,
    OptionalJsonBody(req): OptionalJsonBody<PredictFaltaReq>,
) -> Result<Json<PredictFaltaRes>, ApiError> {
    let patient_id = parse_patient_id(&paciente_id)?;
    let query = req
        .into_query(patient_id, Utc::now().date_naive())
        .map_err(|e| prediction_error("Predict falta", e))?;

    match state.service.predict_no_show(query).await {
        Ok(prediction) => Ok(Json(PredictFaltaRes {
            success: true,
            prediction,
            timestamp: Utc::now(),
        })),
        Err(e) => Err(prediction_error("Predict falta", e)),
    }
}

#[utoipa::path(
    post,
    path = "/ml/predict-batch",
    request_body = PredictBatchReq,
    responses(
        (status = 200, description = "One result per requested patient", body = PredictBatchRes),
        (status = 400, description = "Empty patient list or malformed input", body = ErrorRes)
    )
)]
/// Predict no-show probabilities for several patients
///
/// Each patient is predicted independently; a failing lookup becomes a per-item error and never
/// fails the request.
#[axum::debug_handler]
async fn predict_batch(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PredictBatchReq>,
) -> Result<Json<PredictBatchRes>, ApiError> {
    let patient_ids = req
        .patient_ids()
        .map_err(|e| prediction_error("Predict batch", e))?;
    let (date, time) = req
        .slot(Utc::now().date_naive())
        .map_err(|e| prediction_error("Predict batch", e))?;

    let entries = state.service.predict_batch(&patient_ids, date, time).await;
    Ok(Json(PredictBatchRes {
        success: true,
        predictions: entries.into_iter().map(BatchItemRes::from).collect(),
        timestamp: Utc::now(),
    }))
}

#[utoipa::path(
    get,
    path = "/ml/analyze-tomorrow",
    responses(
        (status = 200, description = "Predictions for tomorrow's appointments", body = AnalyzeTomorrowRes),
        (status = 503, description = "Appointment store unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn analyze_tomorrow(
    State(state): State<AppState>,
) -> Result<Json<AnalyzeTomorrowRes>, ApiError> {
    let date = tomorrow()?;
    match state.service.analyze_day(date).await {
        Ok(predictions) => Ok(Json(AnalyzeTomorrowRes::new(date, predictions, Utc::now()))),
        Err(e) => Err(prediction_error("Analyze tomorrow", e)),
    }
}

#[utoipa::path(
    get,
    path = "/ml/high-risk-patients",
    params(HighRiskQuery),
    responses(
        (status = 200, description = "Pending high-risk predictions, highest first", body = HighRiskRes),
        (status = 400, description = "Threshold outside [0, 1]", body = ErrorRes)
    )
)]
/// List recorded no-show predictions at or above `limite` whose action is still pending
#[axum::debug_handler]
async fn high_risk_patients(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<HighRiskQuery>,
) -> Result<Json<HighRiskRes>, ApiError> {
    let threshold = query.limite.unwrap_or(DEFAULT_HIGH_RISK_THRESHOLD);
    validate_probability("limite", threshold)
        .map_err(|e| prediction_error("High risk patients", e))?;

    let records = state
        .log
        .high_risk(threshold, Utc::now().date_naive())
        .map_err(|e| audit_error("High risk patients", e))?;
    let patients: Vec<HighRiskPatient> = records
        .iter()
        .map(|record| {
            let name = record
                .patient_id
                .and_then(|id| state.service.store().patient(id).ok())
                .map(|p| p.name)
                .unwrap_or_else(|| "N/A".to_string());
            HighRiskPatient::new(record, name)
        })
        .collect();

    Ok(Json(HighRiskRes {
        success: true,
        limit_threshold: threshold,
        total_high_risk: patients.len(),
        patients,
        timestamp: Utc::now(),
    }))
}

#[utoipa::path(
    get,
    path = "/ml/statistics",
    params(DaysQuery),
    responses(
        (status = 200, description = "Summary of recent predictions", body = StatisticsRes),
        (status = 400, description = "Invalid period", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn statistics(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<DaysQuery>,
) -> Result<Json<StatisticsRes>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_PERIOD_DAYS);
    validate_period_days(days, MAX_STATISTICS_DAYS)
        .map_err(|e| prediction_error("Statistics", e))?;

    let now = Utc::now();
    let statistics = state
        .log
        .statistics(days, now)
        .map_err(|e| audit_error("Statistics", e))?;
    Ok(Json(StatisticsRes {
        success: true,
        period_days: days,
        statistics,
        timestamp: now,
    }))
}

#[utoipa::path(
    put,
    path = "/ml/mark-executed/{id}",
    params(("id" = String, Path, description = "Prediction record id")),
    request_body = MarkExecutedReq,
    responses(
        (status = 200, description = "Action marked as executed", body = MarkExecutedRes),
        (status = 400, description = "Malformed record id or body", body = ErrorRes),
        (status = 404, description = "Prediction record not found", body = ErrorRes)
    )
)]
/// Flag the follow-up action of a recorded prediction as done
#[axum::debug_handler]
async fn mark_executed(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    OptionalJsonBody(req): OptionalJsonBody<MarkExecutedReq>,
) -> Result<Json<MarkExecutedRes>, ApiError> {
    let id = uuid::Uuid::parse_str(&id).map_err(|e| {
        prediction_error(
            "Mark executed",
            PredictionError::InvalidInput(format!("invalid prediction id: {e}")),
        )
    })?;
    match state.log.mark_executed(id, Some(req.notes())) {
        Ok(previsao) => Ok(Json(MarkExecutedRes::new(previsao))),
        Err(e) => Err(audit_error("Mark executed", e)),
    }
}

#[utoipa::path(
    post,
    path = "/ml/predict-demand",
    request_body = PredictDemandReq,
    responses(
        (status = 200, description = "Daily demand forecast", body = DemandForecast),
        (status = 400, description = "Missing, malformed or oversized date range", body = ErrorRes)
    )
)]
/// Forecast appointment demand over an inclusive date range
#[axum::debug_handler]
async fn predict_demand(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PredictDemandReq>,
) -> Result<Json<DemandForecast>, ApiError> {
    let request = req
        .into_request()
        .map_err(|e| prediction_error("Predict demand", e))?;
    match state.service.forecast_demand(request).await {
        Ok(forecast) => Ok(Json(forecast)),
        Err(e) => Err(prediction_error("Predict demand", e)),
    }
}

#[utoipa::path(
    get,
    path = "/ml/demand-trends",
    params(DaysQuery),
    responses(
        (status = 200, description = "Historical demand over the trailing period", body = DemandTrends),
        (status = 400, description = "Invalid period", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn demand_trends(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<DaysQuery>,
) -> Result<Json<DemandTrends>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_TREND_DAYS);
    match state.service.demand_trends(days).await {
        Ok(trends) => Ok(Json(trends)),
        Err(e) => Err(prediction_error("Demand trends", e)),
    }
}

#[utoipa::path(
    get,
    path = "/ml/demand-by-diagnosis",
    params(DaysQuery),
    responses(
        (status = 200, description = "Expected demand per diagnosis", body = DiagnosisDemand),
        (status = 400, description = "Invalid period", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn demand_by_diagnosis(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<DaysQuery>,
) -> Result<Json<DiagnosisDemand>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_PERIOD_DAYS);
    match state.service.demand_by_diagnosis(days).await {
        Ok(demand) => Ok(Json(demand)),
        Err(e) => Err(prediction_error("Demand by diagnosis", e)),
    }
}

#[utoipa::path(
    get,
    path = "/ml/seasonal-analysis",
    responses(
        (status = 200, description = "Seasonal reference factors", body = SeasonalAnalysis)
    )
)]
#[axum::debug_handler]
async fn seasonal_analysis(
    State(state): State<AppState>,
) -> Result<Json<SeasonalAnalysis>, ApiError> {
    match state.service.seasonal_analysis().await {
        Ok(analysis) => Ok(Json(analysis)),
        Err(e) => Err(prediction_error("Seasonal analysis", e)),
    }
}
