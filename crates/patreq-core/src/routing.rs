//! Acquisitions-vs-ILL routing and the staff save flow.
//!
//! The route is computed by the service from a request snapshot and then
//! stored on the request. It is recomputed only when a routing-relevant field
//! changed and staff did not override the route in the same edit.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
  repository::RequestRepository,
  request::{FORMAT_ARTICLE, Request, RouteTo, UserId},
  service::{RequestService, remote},
};

/// Whether an edit invalidates the stored route.
///
/// True when `pubdate` or `format` changed and the route itself was left as
/// saved; a route changed by hand is never overwritten.
pub fn needs_reroute(saved: &Request, edited: &Request) -> bool {
  edited.route_to == saved.route_to
    && (edited.pubdate != saved.pubdate || edited.format != saved.format)
}

/// Items published at least this many years ago go to ILL by default.
pub const DEFAULT_ILL_MIN_AGE_YEARS: i32 = 2;

/// The service's routing rule.
///
/// A patron who opted out of ILL always gets acquisitions. Articles are
/// never purchased. Older items are borrowed; recent ones are bought.
pub fn route_for(request: &Request, ill_min_age_years: i32, current_year: i32) -> RouteTo {
  if request.ill_opt_out {
    return RouteTo::Acq;
  }
  if request.format == FORMAT_ARTICLE {
    return RouteTo::Ill;
  }
  let year = request
    .pubdate
    .as_deref()
    .and_then(|p| p.trim().get(..4))
    .and_then(|y| y.parse::<i32>().ok());
  match year {
    Some(year) if current_year - year >= ill_min_age_years => RouteTo::Ill,
    _ => RouteTo::Acq,
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
  /// Claim the request for this staff member if nobody holds it.
  pub claim_as: Option<UserId>,
}

pub struct RoutingResolver<S> {
  repo: RequestRepository<S>,
}

impl<S: RequestService> RoutingResolver<S> {
  pub fn new(repo: RequestRepository<S>) -> Self { Self { repo } }

  pub fn from_service(service: Arc<S>) -> Self { Self::new(RequestRepository::new(service)) }

  /// Return the stored route, asking the service only when there is none.
  pub async fn resolve_route(&self, token: &str, request: &mut Request) -> crate::Result<RouteTo> {
    if let Some(route) = request.route_to {
      return Ok(route);
    }
    let route = remote(
      "request.get_route_to",
      self.repo.service().get_route_to(token, request).await,
    )?;
    debug!(id = request.id, %route, "route computed");
    request.route_to = Some(route);
    Ok(route)
  }

  /// Persist a staff edit of `saved`.
  ///
  /// A newly set line item is not written with the rest of the record; it is
  /// applied afterwards through the service's line item operation. If that
  /// second step fails the record is already saved and must be re-read.
  pub async fn save(
    &self,
    token: &str,
    saved: &Request,
    mut edited: Request,
    options: SaveOptions,
  ) -> crate::Result<Request> {
    if let Some(staff) = options.claim_as
      && !edited.is_claimed()
    {
      edited.claim(staff, Utc::now());
    }

    if needs_reroute(saved, &edited) {
      info!(id = edited.id, "routing fields changed; recomputing route");
      edited.route_to = None;
    }
    self.resolve_route(token, &mut edited).await?;

    // Only a newly set line item goes through the apply step; a cleared one
    // is written with the record.
    let held_lineitem = match edited.lineitem {
      Some(li) if edited.lineitem != saved.lineitem => {
        edited.lineitem = saved.lineitem;
        Some(li)
      }
      _ => None,
    };

    let updated = self.repo.update(token, edited).await?;
    let Some(lineitem) = held_lineitem else {
      return Ok(updated);
    };

    let applied = remote(
      "request.lineitem.apply",
      self.repo.service().apply_lineitem(token, updated.id, lineitem).await,
    );
    match applied {
      Ok(request) => {
        info!(id = request.id, lineitem, "line item applied");
        Ok(request)
      }
      Err(err) => {
        warn!(id = updated.id, lineitem, error = %err, "line item not applied after save");
        Err(err)
      }
    }
  }
}
