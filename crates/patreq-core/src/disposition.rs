//! Rendering dispositions for the progress trail.
//!
//! Every step of [`RequestStatus`] is shown next to a request with one of
//! four dispositions. The mapping depends on the request's current status
//! and on the track (`route_to`) it was sent down: steps belonging to the
//! other track are never shown as reached.

use serde::{Deserialize, Serialize};
use strum::{Display, IntoEnumIterator};

use crate::{
  request::{Request, RouteTo},
  status::{RequestStatus, resolve},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Disposition {
  Complete,
  Pending,
  Skipped,
  Rejected,
}

/// One rendered line of the progress trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailStep {
  pub step:        RequestStatus,
  pub disposition: Disposition,
}

/// Disposition of `step` for `request`.
pub fn disposition(request: &Request, step: RequestStatus) -> Disposition {
  disposition_for(resolve(request), request.route_to, step)
}

/// Disposition of `step` given an already-resolved status and route.
///
/// `status` is `None` for canceled requests, which show only the
/// submission step.
pub fn disposition_for(
  status: Option<RequestStatus>,
  route_to: Option<RouteTo>,
  step: RequestStatus,
) -> Disposition {
  use RequestStatus as S;

  if step == S::Submitted {
    return Disposition::Complete;
  }
  let Some(status) = status else {
    return Disposition::Skipped;
  };
  if step == status {
    return if step.is_failure() {
      Disposition::Rejected
    } else {
      Disposition::Complete
    };
  }
  if step.is_failure() {
    return Disposition::Skipped;
  }
  // Nothing has been decided yet; every remaining step is still possible.
  if status == S::Submitted {
    return Disposition::Pending;
  }

  if let Some(track) = step.track() {
    return match route_to {
      Some(route) if route != track => Disposition::Skipped,
      Some(_) => track_step(status, step),
      // Past submission with no route: no track was taken.
      None => Disposition::Skipped,
    };
  }

  match step {
    // Only ever shown while current.
    S::PatronPending => Disposition::Skipped,
    _ if status.is_terminal() => Disposition::Skipped,
    _ => Disposition::Pending,
  }
}

/// A step on the request's own track, the status being past `submitted`.
fn track_step(status: RequestStatus, step: RequestStatus) -> Disposition {
  match step {
    RequestStatus::PurchaseReview | RequestStatus::IllReview => Disposition::Complete,
    _ if status == RequestStatus::Completed => Disposition::Complete,
    _ if status.is_terminal() => Disposition::Skipped,
    _ => Disposition::Pending,
  }
}

/// The full trail, one entry per step in display order.
pub fn progress_trail(request: &Request) -> Vec<TrailStep> {
  let status = resolve(request);
  RequestStatus::iter()
    .map(|step| TrailStep {
      step,
      disposition: disposition_for(status, request.route_to, step),
    })
    .collect()
}

/// The trail without skipped steps, as shown to patrons.
pub fn visible_trail(request: &Request) -> Vec<TrailStep> {
  progress_trail(request)
    .into_iter()
    .filter(|s| s.disposition != Disposition::Skipped)
    .collect()
}
