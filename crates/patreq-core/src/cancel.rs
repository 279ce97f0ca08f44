//! Two-step cancel confirmation.
//!
//! The first cancel action on a request only arms the confirmation. A second
//! action on the same request confirms it; an action on another request
//! re-arms for that one.

use crate::request::RequestId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelConfirm {
  #[default]
  Idle,
  Armed(RequestId),
}

/// What a cancel action should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelStep {
  /// Wait for confirmation; no remote call.
  Armed(RequestId),
  /// Execute the cancel for this id.
  Confirmed(RequestId),
}

impl CancelConfirm {
  /// Feed a cancel action on `id`.
  pub fn press(self, id: RequestId) -> (Self, CancelStep) {
    match self {
      Self::Armed(armed) if armed == id => (Self::Idle, CancelStep::Confirmed(id)),
      _ => (Self::Armed(id), CancelStep::Armed(id)),
    }
  }

  /// Any unrelated action disarms.
  pub fn reset(&mut self) { *self = Self::Idle; }

  pub fn armed(&self) -> Option<RequestId> {
    match self {
      Self::Armed(id) => Some(*id),
      Self::Idle => None,
    }
  }
}
