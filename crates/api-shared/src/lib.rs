//! # API Shared
//!
//! Request and response envelopes shared by the clinic's HTTP surfaces.
//!
//! Handles:
//! - JSON request bodies and their conversion into estimator queries
//! - Response envelopes with the field names existing clients read
//! - The structured error object returned on failure
//! - Health checks
//!
//! Prediction logic lives in `clinica-core`; this crate only shapes its inputs and outputs.

pub mod dto;
pub mod health;

pub use dto::ErrorRes;
pub use health::{HealthRes, HealthService};
