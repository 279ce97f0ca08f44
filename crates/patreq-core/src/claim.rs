//! Staff ownership of queued requests.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::{
  error::Error,
  request::{Request, RequestId, UserId},
  service::{RequestService, remote},
};

pub use crate::batch::BatchReport;

pub struct ClaimCoordinator<S> {
  service: Arc<S>,
}

impl<S: RequestService> ClaimCoordinator<S> {
  pub fn new(service: Arc<S>) -> Self { Self { service } }

  /// Claim every unclaimed request among `ids` for `staff`.
  ///
  /// Requests already claimed by anyone, including `staff`, are left alone.
  /// A request claimed by someone else between the read and the write is
  /// reported as untouched.
  pub async fn claim(&self, token: &str, ids: &[RequestId], staff: UserId) -> BatchReport {
    let now = Utc::now();
    crate::batch::apply_each(&*self.service, token, ids, "claim", |r| {
      if r.is_claimed() {
        return false;
      }
      r.claim(staff, now);
      true
    })
    .await
  }

  /// Clear the claim pair of one request.
  pub async fn unclaim(&self, token: &str, id: RequestId) -> crate::Result<Request> {
    let mut request =
      remote("request.retrieve", self.service.retrieve_request(token, id).await)?
        .ok_or_else(|| Error::NotFound(format!("request {id}")))?;
    request.unclaim();
    let request = remote("request.update", self.service.update_request(token, request).await)?;
    info!(id, "request unclaimed");
    Ok(request)
  }
}
