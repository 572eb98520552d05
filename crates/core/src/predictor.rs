//! The prediction capability shared by the local heuristic and the remote model service.
//!
//! Call sites never branch on which implementation they hold: [`crate::PredictionService`]
//! owns an optional remote [`Predictor`] and the always-available heuristic one, and picks
//! between them by availability.

use crate::model::{
    DailyCount, DemandForecast, DemandRequest, DiagnosisDemand, DemandTrends, HistoricalStats,
    NoShowQuery, RiskPrediction, SeasonalAnalysis,
};
use crate::PredictionResult;
use async_trait::async_trait;
use chrono::NaiveDate;

/// A source of no-show and demand predictions.
///
/// Implementations must be `Send + Sync` so a single instance can serve concurrent requests.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Short identifier used in logs and model-info responses.
    fn name(&self) -> &'static str;

    /// Report whether the predictor can serve requests.
    ///
    /// # Errors
    /// Returns `PredictionError::UpstreamUnavailable` when the backing service cannot be reached.
    async fn health(&self) -> PredictionResult<serde_json::Value>;

    /// Describe the model behind this predictor.
    async fn model_info(&self) -> PredictionResult<serde_json::Value>;

    /// Predict the probability that the patient misses the appointment described by `query`.
    ///
    /// `stats` is `None` when the appointment store could not supply history; implementations
    /// must still answer from the static factors.
    async fn predict_no_show(
        &self,
        query: &NoShowQuery,
        stats: Option<&HistoricalStats>,
    ) -> PredictionResult<RiskPrediction>;

    /// Predict every item independently, one result per item in input order.
    ///
    /// The default runs [`Predictor::predict_no_show`] for each item in turn.
    async fn predict_batch(
        &self,
        items: &[(NoShowQuery, Option<HistoricalStats>)],
    ) -> Vec<PredictionResult<RiskPrediction>> {
        let mut results = Vec::with_capacity(items.len());
        for (query, stats) in items {
            results.push(self.predict_no_show(query, stats.as_ref()).await);
        }
        results
    }

    /// Forecast daily appointment counts for the requested range.
    async fn forecast_demand(&self, request: &DemandRequest) -> PredictionResult<DemandForecast>;

    /// Split expected demand over `period_days` by diagnosis.
    async fn demand_by_diagnosis(&self, period_days: u32) -> PredictionResult<DiagnosisDemand>;

    /// Summarise demand over the trailing `period_days` ending the day before `today`.
    ///
    /// `history` carries observed daily counts from the store when available.
    async fn demand_trends(
        &self,
        period_days: u32,
        history: Option<&[DailyCount]>,
        today: NaiveDate,
    ) -> PredictionResult<DemandTrends>;

    /// Monthly and weekly seasonal reference factors.
    async fn seasonal_analysis(&self) -> PredictionResult<SeasonalAnalysis>;
}
