//! Sequential batch edits over staff-selected requests.
//!
//! Each request is read, edited and written back on its own. A failure on
//! one item is recorded and does not roll back the items already written.
//! When the service reports that an item changed between the read and the
//! write, the item is read again and the edit re-applied to the fresh copy.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
  ServiceEvent,
  error::Error,
  request::{Request, RequestId, RouteTo},
  service::{RequestService, remote},
};

/// Outcome of a batch edit, item by item.
#[derive(Debug, Default)]
pub struct BatchReport {
  /// Requests written back, as returned by the service.
  pub updated:   Vec<Request>,
  /// Requests the edit left alone.
  pub untouched: Vec<RequestId>,
  pub failed:    Vec<(RequestId, Error)>,
}

impl BatchReport {
  pub fn is_clean(&self) -> bool { self.failed.is_empty() }
}

/// Read, edit and write back every id in order.
///
/// `edit` returns `false` to leave a request untouched.
pub async fn apply_each<S, F>(
  service: &S,
  token: &str,
  ids: &[RequestId],
  op: &'static str,
  mut edit: F,
) -> BatchReport
where
  S: RequestService,
  F: FnMut(&mut Request) -> bool,
{
  let mut report = BatchReport::default();
  for &id in ids {
    match edit_one(service, token, id, &mut edit).await {
      Ok(Some(request)) => report.updated.push(request),
      Ok(None) => report.untouched.push(id),
      Err(err) => {
        warn!(op, id, error = %err, "batch item failed");
        report.failed.push((id, err));
      }
    }
  }
  info!(
    op,
    updated = report.updated.len(),
    untouched = report.untouched.len(),
    failed = report.failed.len(),
    "batch edit finished"
  );
  report
}

/// Read-edit-write attempts per item before a concurrent writer wins.
const MAX_ATTEMPTS: u32 = 3;

async fn edit_one<S, F>(
  service: &S,
  token: &str,
  id: RequestId,
  edit: &mut F,
) -> crate::Result<Option<Request>>
where
  S: RequestService,
  F: FnMut(&mut Request) -> bool,
{
  let mut attempt = 1;
  loop {
    let mut request = remote("request.retrieve", service.retrieve_request(token, id).await)?
      .ok_or_else(|| Error::NotFound(format!("request {id}")))?;
    if !edit(&mut request) {
      return Ok(None);
    }
    match remote("request.update", service.update_request(token, request).await) {
      Err(err) if attempt < MAX_ATTEMPTS && err.is_event(ServiceEvent::STALE_WRITE) => {
        debug!(id, attempt, "request changed since it was read; retrying");
        attempt += 1;
      }
      result => return result.map(Some),
    }
  }
}

// ─── Editor ──────────────────────────────────────────────────────────────────

/// The staff batch actions of the triage queue.
pub struct BatchEditor<S> {
  service: Arc<S>,
}

impl<S> Clone for BatchEditor<S> {
  fn clone(&self) -> Self { Self { service: self.service.clone() } }
}

impl<S: RequestService> BatchEditor<S> {
  pub fn new(service: Arc<S>) -> Self { Self { service } }

  pub async fn set_vendor(&self, token: &str, ids: &[RequestId], vendor: &str) -> BatchReport {
    if vendor.is_empty() {
      return BatchReport { untouched: ids.to_vec(), ..BatchReport::default() };
    }
    apply_each(&*self.service, token, ids, "vendor", |r| {
      r.vendor = Some(vendor.to_owned());
      true
    })
    .await
  }

  /// Manual route override; the value is kept until staff change it.
  pub async fn set_route(&self, token: &str, ids: &[RequestId], route: RouteTo) -> BatchReport {
    apply_each(&*self.service, token, ids, "route", |r| {
      r.route_to = Some(route);
      true
    })
    .await
  }

  pub async fn add_staff_note(&self, token: &str, ids: &[RequestId], note: &str) -> BatchReport {
    if note.is_empty() {
      return BatchReport { untouched: ids.to_vec(), ..BatchReport::default() };
    }
    apply_each(&*self.service, token, ids, "staff_note", |r| {
      r.append_staff_note(note);
      true
    })
    .await
  }

  /// Notes appended here are shown to the patron.
  pub async fn add_patron_note(&self, token: &str, ids: &[RequestId], note: &str) -> BatchReport {
    if note.is_empty() {
      return BatchReport { untouched: ids.to_vec(), ..BatchReport::default() };
    }
    apply_each(&*self.service, token, ids, "patron_note", |r| {
      r.append_patron_note(note);
      true
    })
    .await
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::testing::{FakeService, request};

  #[tokio::test]
  async fn notes_append_across_a_batch() {
    let svc = Arc::new(FakeService::staff(4));
    let mut noted = request(1);
    noted.staff_notes = Some("first".into());
    svc.insert(noted);
    svc.insert(request(2));

    let editor = BatchEditor::new(svc.clone());
    let report = editor.add_staff_note("tok", &[1, 2], "second").await;
    assert!(report.is_clean());

    assert_eq!(svc.get(1).staff_notes.as_deref(), Some("first\nsecond"));
    assert_eq!(svc.get(2).staff_notes.as_deref(), Some("second"));
  }

  #[tokio::test]
  async fn missing_item_fails_alone() {
    let svc = Arc::new(FakeService::staff(4));
    svc.insert(request(1));
    svc.insert(request(3));

    let editor = BatchEditor::new(svc.clone());
    let report = editor.set_vendor("tok", &[1, 2, 3], "Baker & Taylor").await;

    assert_eq!(report.updated.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0], (2, Error::NotFound(_))));
    assert_eq!(svc.get(3).vendor.as_deref(), Some("Baker & Taylor"));
  }

  #[tokio::test]
  async fn manual_route_override_is_written() {
    let svc = Arc::new(FakeService::staff(4));
    svc.insert(request(1));
    let report = BatchEditor::new(svc.clone()).set_route("tok", &[1], RouteTo::Ill).await;
    assert!(report.is_clean());
    assert_eq!(svc.get(1).route_to, Some(RouteTo::Ill));
  }

  #[tokio::test]
  async fn concurrent_cancel_survives_a_vendor_edit() {
    let svc = Arc::new(FakeService::staff(4));
    svc.insert(request(1));
    svc.edit_concurrently(1, |r| r.cancel_date = Some(Utc::now()));

    let report = BatchEditor::new(svc.clone()).set_vendor("tok", &[1], "Baker & Taylor").await;

    assert!(report.is_clean());
    let stored = svc.get(1);
    assert!(stored.cancel_date.is_some());
    assert_eq!(stored.vendor.as_deref(), Some("Baker & Taylor"));
    assert_eq!(svc.update_count(), 1);
  }

  #[tokio::test]
  async fn empty_vendor_is_ignored() {
    let svc = Arc::new(FakeService::staff(4));
    svc.insert(request(1));
    let report = BatchEditor::new(svc.clone()).set_vendor("tok", &[1], "").await;
    assert_eq!(report.untouched, vec![1]);
    assert_eq!(svc.update_count(), 0);
  }
}
