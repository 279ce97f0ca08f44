//! Client-side access to request records.
//!
//! [`RequestRepository`] wraps a [`RequestService`] with the local checks
//! that must happen before a remote call: normalisation and validation of new
//! requests, de-duplication of concurrent submits, two-step cancel
//! confirmation and record invariant checks on update.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashSet;
use tracing::{info, warn};
use validator::Validate;

use crate::{
  cancel::{CancelConfirm, CancelStep},
  error::{Error, ServiceEvent},
  request::{NewRequest, Request, RequestId, Transition, UserId},
  service::{RequestService, remote},
  status::{RequestStatus, RequestWithStatus, resolve},
};

// ─── Submit guard ────────────────────────────────────────────────────────────

/// Set of submissions currently in flight, keyed by
/// [`NewRequest::submit_key`].
#[derive(Debug, Default)]
pub struct SubmitGuard {
  in_flight: DashSet<String>,
}

/// Marks a key as in flight until dropped.
#[derive(Debug)]
pub struct InFlight<'a> {
  guard: &'a SubmitGuard,
  key:   String,
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) { self.guard.in_flight.remove(&self.key); }
}

impl SubmitGuard {
  pub fn new() -> Self { Self::default() }

  /// `None` when the same key is already being submitted.
  pub fn begin(&self, key: String) -> Option<InFlight<'_>> {
    if self.in_flight.insert(key.clone()) {
      Some(InFlight { guard: self, key })
    } else {
      None
    }
  }

  pub fn is_in_flight(&self, key: &str) -> bool { self.in_flight.contains(key) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
  Created(RequestId),
  /// The same item is already being submitted; nothing was sent.
  InFlight,
}

// ─── Repository ──────────────────────────────────────────────────────────────

pub struct RequestRepository<S> {
  service: Arc<S>,
  guard:   Arc<SubmitGuard>,
}

impl<S> Clone for RequestRepository<S> {
  fn clone(&self) -> Self {
    Self { service: self.service.clone(), guard: self.guard.clone() }
  }
}

impl<S: RequestService> RequestRepository<S> {
  pub fn new(service: Arc<S>) -> Self {
    Self { service, guard: Arc::new(SubmitGuard::new()) }
  }

  pub fn service(&self) -> &Arc<S> { &self.service }

  pub fn guard(&self) -> &SubmitGuard { &self.guard }

  /// Validate and submit a new request.
  pub async fn create(&self, token: &str, input: NewRequest) -> crate::Result<CreateOutcome> {
    let input = input.normalized();
    input.validate()?;

    let Some(_in_flight) = self.guard.begin(input.submit_key()) else {
      info!(title = %input.title, "submit already in flight; ignoring");
      return Ok(CreateOutcome::InFlight);
    };
    let created = remote("request.create", self.service.create_request(token, input).await)?;
    info!(id = created.request_id, "request created");
    Ok(CreateOutcome::Created(created.request_id))
  }

  pub async fn list_pending(&self, token: &str) -> crate::Result<Vec<RequestWithStatus>> {
    let rows = remote(
      "request.retrieve.pending",
      self.service.retrieve_pending(token).await,
    )?;
    check_statuses(&rows);
    Ok(rows)
  }

  pub async fn list_all(&self, token: &str) -> crate::Result<Vec<RequestWithStatus>> {
    let rows = remote("request.retrieve.all", self.service.retrieve_all(token).await)?;
    check_statuses(&rows);
    Ok(rows)
  }

  /// Feed a cancel action through the confirmation state machine.
  ///
  /// Only a confirmed action reaches the service; when that call fails the
  /// confirmation is restored so the patron can retry.
  pub async fn cancel(
    &self,
    token: &str,
    confirm: &mut CancelConfirm,
    id: RequestId,
  ) -> crate::Result<CancelStep> {
    let previous = *confirm;
    let (next, step) = previous.press(id);
    *confirm = next;

    if let CancelStep::Confirmed(id) = step {
      if let Err(err) = remote("request.cancel", self.service.cancel_request(token, id).await)
      {
        *confirm = previous;
        return Err(err);
      }
      info!(id, "request canceled");
    }
    Ok(step)
  }

  pub async fn retrieve(&self, token: &str, id: RequestId) -> crate::Result<Request> {
    remote("request.retrieve", self.service.retrieve_request(token, id).await)?
      .ok_or_else(|| Error::NotFound(format!("request {id}")))
  }

  /// Write staff edits back. Records that break an invariant never leave
  /// the client.
  pub async fn update(&self, token: &str, request: Request) -> crate::Result<Request> {
    if let Some(why) = request.invariant_violation() {
      return Err(Error::event(ServiceEvent::INVARIANT_VIOLATION, why));
    }
    remote("request.update", self.service.update_request(token, request).await)
  }

  /// Apply a lifecycle transition and persist it.
  pub async fn transition(
    &self,
    token: &str,
    id: RequestId,
    transition: Transition,
    staff: UserId,
  ) -> crate::Result<Request> {
    let mut request = self.retrieve(token, id).await?;
    let label = format!("{transition:?}");
    request.apply(transition, staff, Utc::now());
    let request = self.update(token, request).await?;
    info!(id, transition = %label, "request transitioned");
    Ok(request)
  }

  pub async fn status(&self, token: &str, id: RequestId) -> crate::Result<Option<RequestStatus>> {
    let reply = remote("request.status", self.service.request_status(token, id).await)?;
    Ok(reply.status)
  }
}

/// The service computes the status with the same resolver; a mismatch
/// means the two sides run different rules.
fn check_statuses(rows: &[RequestWithStatus]) {
  for row in rows {
    let local = resolve(&row.request);
    if local != row.status {
      warn!(
        id = row.request.id,
        server = ?row.status,
        local = ?local,
        "status disagreement between client and service"
      );
    }
  }
}
