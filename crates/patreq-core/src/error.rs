//! Error types for `patreq-core`.
//!
//! Admission outcomes are *not* errors; they are returned as values from
//! [`crate::admission`]. What remains here is local validation, named
//! conditions raised by the service, and transport failures.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Named service conditions ────────────────────────────────────────────────

/// A specific, recoverable condition reported by the service, as opposed to
/// a generic transport failure. Callers match on [`ServiceEvent::code`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEvent {
  pub code: String,
  pub desc: String,
}

impl ServiceEvent {
  pub const DUPLICATE_REQUEST: &'static str = "PATRON_REQUEST_DUPLICATE";
  pub const QUOTA_EXCEEDED: &'static str = "PATRON_REQUEST_QUOTA_EXCEEDED";
  pub const FORMAT_NOT_ELIGIBLE: &'static str = "PATRON_REQUEST_FORMAT_NOT_ELIGIBLE";
  pub const ALREADY_TERMINAL: &'static str = "PATRON_REQUEST_ALREADY_TERMINAL";
  pub const INVARIANT_VIOLATION: &'static str = "PATRON_REQUEST_INVARIANT_VIOLATION";
  pub const LINEITEM_NOT_APPLICABLE: &'static str = "PATRON_REQUEST_LINEITEM_NOT_APPLICABLE";
  /// The record changed since it was read; re-read and retry.
  pub const STALE_WRITE: &'static str = "PATRON_REQUEST_STALE_WRITE";
  /// The service refused input that passed local validation.
  pub const INVALID_INPUT: &'static str = "PATRON_REQUEST_INVALID_INPUT";

  pub fn new(code: impl Into<String>, desc: impl Into<String>) -> Self {
    Self { code: code.into(), desc: desc.into() }
  }

  pub fn is(&self, code: &str) -> bool { self.code == code }
}

impl fmt::Display for ServiceEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.code, self.desc)
  }
}

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Error {
  /// Local field validation failed; nothing was sent to the service.
  #[error("validation failed: {0}")]
  Validation(#[from] validator::ValidationErrors),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("session missing or expired")]
  Unauthorized,

  #[error("permission denied: {0}")]
  Forbidden(String),

  #[error("{0}")]
  Event(ServiceEvent),

  #[error("transport error: {0}")]
  Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn transport(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    Self::Transport(err.into())
  }

  pub fn event(code: impl Into<String>, desc: impl Into<String>) -> Self {
    Self::Event(ServiceEvent::new(code, desc))
  }

  /// Transport failures are the only class logged as unexpected.
  pub fn is_transport(&self) -> bool { matches!(self, Self::Transport(_)) }

  pub fn service_event(&self) -> Option<&ServiceEvent> {
    match self {
      Self::Event(evt) => Some(evt),
      _ => None,
    }
  }

  pub fn is_event(&self, code: &str) -> bool {
    self.service_event().is_some_and(|evt| evt.is(code))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
