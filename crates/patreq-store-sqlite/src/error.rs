//! Error type for `patreq-store-sqlite`.

use patreq_core::{ServiceEvent, request::RequestId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] patreq_core::Error),

  #[error("validation failed: {0}")]
  Validation(#[from] validator::ValidationErrors),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown column value: {0}")]
  Decode(String),

  #[error("request not found: {0}")]
  RequestNotFound(RequestId),

  #[error("session missing or expired")]
  NoSession,

  #[error("permission denied: {0}")]
  PermissionDenied(&'static str),

  /// A named, recoverable condition reported to the caller as-is.
  #[error("{0}")]
  Conflict(ServiceEvent),
}

impl Error {
  pub(crate) fn conflict(code: &str, desc: impl Into<String>) -> Self {
    Self::Conflict(ServiceEvent::new(code, desc))
  }
}

impl From<Error> for patreq_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Core(e) => e,
      Error::Validation(e) => Self::Validation(e),
      Error::RequestNotFound(id) => Self::NotFound(format!("request {id}")),
      Error::NoSession => Self::Unauthorized,
      Error::PermissionDenied(what) => Self::Forbidden(what.to_owned()),
      Error::Conflict(evt) => Self::Event(evt),
      other @ (Error::Database(_)
      | Error::Json(_)
      | Error::DateParse(_)
      | Error::Decode(_)) => Self::transport(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
