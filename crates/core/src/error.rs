use clinica_types::PatientId;

/// Errors returned by the estimator, the forecaster and the prediction service.
///
/// Every variant is recoverable at the API boundary: callers either degrade (for
/// `UpstreamUnavailable`) or surface the error as a structured object using [`Self::kind`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictionError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PredictionError {
    /// Machine-readable error kind used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictionError::UpstreamUnavailable(_) => "upstream_unavailable",
            PredictionError::InvalidInput(_) => "invalid_input",
            PredictionError::Configuration(_) => "configuration_error",
        }
    }
}

pub type PredictionResult<T> = std::result::Result<T, PredictionError>;

/// Errors raised by an appointment store implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("appointment store unavailable: {0}")]
    Unavailable(String),
    #[error("patient not found: {0}")]
    PatientNotFound(PatientId),
    #[error("failed to read seed data: {0}")]
    Seed(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for PredictionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => PredictionError::UpstreamUnavailable(msg),
            StoreError::PatientNotFound(id) => {
                PredictionError::InvalidInput(format!("unknown patient id: {id}"))
            }
            StoreError::Seed(msg) => PredictionError::Configuration(msg),
        }
    }
}

/// Errors raised by the prediction audit log.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuditError {
    #[error("prediction record not found: {0}")]
    NotFound(uuid::Uuid),
    #[error("prediction log lock poisoned")]
    Poisoned,
}

pub type AuditResult<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable_per_variant() {
        assert_eq!(
            PredictionError::UpstreamUnavailable("x".into()).kind(),
            "upstream_unavailable"
        );
        assert_eq!(PredictionError::InvalidInput("x".into()).kind(), "invalid_input");
        assert_eq!(
            PredictionError::Configuration("x".into()).kind(),
            "configuration_error"
        );
    }

    #[test]
    fn test_store_error_maps_to_prediction_error() {
        let id = PatientId::new(9).expect("valid id");
        let err: PredictionError = StoreError::PatientNotFound(id).into();
        assert!(
            matches!(err, PredictionError::InvalidInput(msg) if msg.contains("unknown patient id: 9"))
        );

        let err: PredictionError = StoreError::Unavailable("db down".into()).into();
        assert_eq!(err.kind(), "upstream_unavailable");
    }
}
