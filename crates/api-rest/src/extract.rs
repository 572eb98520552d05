//! Request extractors that report malformed input as a structured `invalid_input` error.
//!
//! axum's own `Json` and `Query` extractors answer with plain-text 400/415/422 responses; these
//! wrappers keep every failure in the `ErrorRes` shape the handlers use.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{header, request::Parts, HeaderMap},
    Json,
};
use clinica_core::PredictionError;
use serde::de::DeserializeOwned;

use crate::{prediction_error, ApiError};

fn invalid_request(context: &str, message: String) -> ApiError {
    prediction_error(context, PredictionError::InvalidInput(message))
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|essence| essence.trim().to_ascii_lowercase())
        .is_some_and(|essence| essence == "application/json" || essence.ends_with("+json"))
}

/// Required JSON body.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(invalid_request(
                "Request body",
                format!("invalid request body: {}", rejection.body_text()),
            )),
        }
    }
}

/// JSON body that may be omitted.
///
/// An empty body yields `T::default()`. A non-empty body must be declared as JSON and must
/// deserialize into `T`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalJsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJsonBody<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let json_declared = has_json_content_type(req.headers());
        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            invalid_request(
                "Request body",
                format!("failed to read request body: {}", rejection.body_text()),
            )
        })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }
        if !json_declared {
            return Err(invalid_request(
                "Request body",
                "request body must be sent with content-type application/json".into(),
            ));
        }
        serde_json::from_slice(&bytes).map(Self).map_err(|e| {
            invalid_request("Request body", format!("invalid request body: {e}"))
        })
    }
}

/// Query string parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(invalid_request(
                "Query string",
                format!("invalid query string: {}", rejection.body_text()),
            )),
        }
    }
}
