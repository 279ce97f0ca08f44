//! Canonical request status, derived and never stored.
//!
//! The status is recomputed from a handful of timestamp and routing fields
//! every time it is needed, by the client and by the service alike. Both
//! sides call [`resolve`], so they cannot disagree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::request::{Request, RouteTo};

// ─── Status codes ────────────────────────────────────────────────────────────

/// Every step a request can be shown at. Declaration order is the order of
/// the progress trail.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RequestStatus {
  Submitted,
  PatronPending,
  PurchaseReview,
  PurchaseApproved,
  PurchaseFailed,
  IllReview,
  IllRequested,
  IllFailed,
  HoldFailed,
  HoldPlaced,
  Completed,
}

impl RequestStatus {
  /// Failure-family steps render as `rejected` when current.
  pub fn is_failure(self) -> bool {
    matches!(self, Self::PurchaseFailed | Self::IllFailed | Self::HoldFailed)
  }

  /// Completed, or any failure.
  pub fn is_terminal(self) -> bool { self == Self::Completed || self.is_failure() }

  /// The triage track a step belongs to; `None` for track-neutral steps.
  pub fn track(self) -> Option<RouteTo> {
    match self {
      Self::PurchaseReview | Self::PurchaseApproved | Self::PurchaseFailed => {
        Some(RouteTo::Acq)
      }
      Self::IllReview | Self::IllRequested | Self::IllFailed => Some(RouteTo::Ill),
      _ => None,
    }
  }

  /// Patron-facing label.
  pub fn label(self) -> &'static str {
    match self {
      Self::Submitted => "Request Submitted",
      Self::PatronPending => "Pending Patron Response",
      Self::PurchaseReview => "Under Consideration for Purchase",
      Self::PurchaseApproved => "Purchase Approved",
      Self::PurchaseFailed => "Unable to Purchase",
      Self::IllReview => "Transferred to Interlibrary Loan",
      Self::IllRequested => "Interlibrary Loan Request Submitted",
      Self::IllFailed => "Unable to Complete Interlibrary Loan",
      Self::HoldFailed => "Unable to Place Hold",
      Self::HoldPlaced => "Hold Placed",
      Self::Completed => "Request Complete",
    }
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// The only fields status resolution may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
  pub cancel_date:   Option<DateTime<Utc>>,
  pub reject_date:   Option<DateTime<Utc>>,
  pub complete_date: Option<DateTime<Utc>>,
  pub claim_date:    Option<DateTime<Utc>>,
  pub route_to:      Option<RouteTo>,
}

impl From<&Request> for StatusSnapshot {
  fn from(r: &Request) -> Self {
    Self {
      cancel_date:   r.cancel_date,
      reject_date:   r.reject_date,
      complete_date: r.complete_date,
      claim_date:    r.claim_date,
      route_to:      r.route_to,
    }
  }
}

impl StatusSnapshot {
  /// First match wins: cancel, reject, complete, claim, submitted.
  ///
  /// A canceled request is outside the active pipeline and has no status.
  /// An unrouted request is treated as acquisitions when choosing the
  /// failure family.
  pub fn resolve(&self) -> Option<RequestStatus> {
    if self.cancel_date.is_some() {
      return None;
    }
    let status = if self.reject_date.is_some() {
      match self.route_to {
        Some(RouteTo::Ill) => RequestStatus::IllFailed,
        _ => RequestStatus::PurchaseFailed,
      }
    } else if self.complete_date.is_some() {
      RequestStatus::Completed
    } else if self.claim_date.is_some() {
      match self.route_to {
        Some(RouteTo::Acq) => RequestStatus::PurchaseReview,
        Some(RouteTo::Ill) => RequestStatus::IllReview,
        None => RequestStatus::PatronPending,
      }
    } else {
      RequestStatus::Submitted
    };
    Some(status)
  }
}

/// Resolve the canonical status of `request`; `None` when canceled.
pub fn resolve(request: &Request) -> Option<RequestStatus> {
  StatusSnapshot::from(request).resolve()
}

// ─── Wire pair ───────────────────────────────────────────────────────────────

/// A request bundled with its computed status, as returned by list
/// operations. `status` is `None` for canceled requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestWithStatus {
  pub request: Request,
  pub status:  Option<RequestStatus>,
}

impl RequestWithStatus {
  pub fn new(request: Request) -> Self {
    let status = resolve(&request);
    Self { request, status }
  }
}
