//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body is `{"error": <message>}`; named service conditions add
//! `"code"` and validation failures add `"fields"`.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use patreq_core::ServiceEvent;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("validation failed: {0}")]
  Validation(validator::ValidationErrors),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("session missing or expired")]
  Unauthorized,

  #[error("permission denied: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("{0}")]
  Conflict(ServiceEvent),

  #[error("service error: {0}")]
  Service(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<patreq_core::Error> for ApiError {
  fn from(err: patreq_core::Error) -> Self {
    use patreq_core::Error as E;
    match err {
      E::Validation(e) => Self::Validation(e),
      E::NotFound(what) => Self::NotFound(what),
      E::Unauthorized => Self::Unauthorized,
      E::Forbidden(what) => Self::Forbidden(what),
      E::Event(evt) => Self::Conflict(evt),
      E::Transport(e) => Self::Service(e),
    }
  }
}

/// Convert a backend result into the API error space.
pub fn service<T, E: Into<patreq_core::Error>>(result: Result<T, E>) -> Result<T, ApiError> {
  result.map_err(|e| ApiError::from(e.into()))
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let message = self.to_string();
    let (status, body) = match self {
      ApiError::Validation(errors) => {
        let mut fields: Vec<String> =
          errors.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        (StatusCode::BAD_REQUEST, json!({ "error": message, "fields": fields }))
      }
      ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
      ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({ "error": message })),
      ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, json!({ "error": message })),
      ApiError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": message })),
      ApiError::Conflict(evt) => {
        (StatusCode::CONFLICT, json!({ "error": evt.desc, "code": evt.code }))
      }
      ApiError::Service(e) => {
        error!(error = %e, "service failure");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message }))
      }
    };
    (status, Json(body)).into_response()
  }
}
