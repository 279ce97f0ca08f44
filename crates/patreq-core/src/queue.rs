//! The staff triage queue: filter predicates, sorting and a reloadable view.

use std::{cmp::Ordering, sync::Arc};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  claim::{BatchReport, ClaimCoordinator},
  request::{Request, RequestId, RouteTo, UserId},
  service::{RequestService, remote},
};

// ─── Filter ──────────────────────────────────────────────────────────────────

/// Queue filter toggles. Route toggles are OR-combined; with none selected,
/// any route matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueFilter {
  pub route_ill:      bool,
  pub route_acq:      bool,
  pub route_none:     bool,
  pub show_rejected:  bool,
  pub show_completed: bool,
  pub show_canceled:  bool,
  /// Restrict to requests claimed by the viewing staff member.
  pub claimed_by_me:  bool,
}

impl Default for QueueFilter {
  fn default() -> Self {
    Self {
      route_ill:      true,
      route_acq:      true,
      route_none:     true,
      show_rejected:  false,
      show_completed: false,
      show_canceled:  false,
      claimed_by_me:  false,
    }
  }
}

impl QueueFilter {
  fn route_selected(&self) -> bool {
    self.route_ill || self.route_acq || self.route_none
  }

  pub fn matches_route(&self, route: Option<RouteTo>) -> bool {
    if !self.route_selected() {
      return true;
    }
    match route {
      Some(RouteTo::Ill) => self.route_ill,
      Some(RouteTo::Acq) => self.route_acq,
      None => self.route_none,
    }
  }

  /// Whether `request` belongs in the queue of staff member `me`.
  pub fn matches(&self, request: &Request, me: UserId) -> bool {
    if request.cancel_date.is_some() && !self.show_canceled {
      return false;
    }
    if request.complete_date.is_some() && !self.show_completed {
      return false;
    }
    if request.reject_date.is_some() && !self.show_rejected {
      return false;
    }
    if self.claimed_by_me && request.claimed_by != Some(me) {
      return false;
    }
    self.matches_route(request.route_to)
  }
}

// ─── Sorting ─────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortColumn {
  CreateDate,
  Title,
  Author,
  Format,
  RouteTo,
  ClaimDate,
  Vendor,
  Id,
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortDirection {
  #[default]
  Asc,
  Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSort {
  pub column:    SortColumn,
  pub direction: SortDirection,
}

impl Default for QueueSort {
  fn default() -> Self {
    Self { column: SortColumn::CreateDate, direction: SortDirection::Asc }
  }
}

fn text_key(v: Option<&str>) -> Option<String> { v.map(str::to_lowercase) }

impl QueueSort {
  pub fn compare(&self, a: &Request, b: &Request) -> Ordering {
    let ord = match self.column {
      SortColumn::CreateDate => a.create_date.cmp(&b.create_date),
      SortColumn::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
      SortColumn::Author => {
        text_key(a.author.as_deref()).cmp(&text_key(b.author.as_deref()))
      }
      SortColumn::Format => a.format.to_lowercase().cmp(&b.format.to_lowercase()),
      SortColumn::RouteTo => a
        .route_to
        .map(|r| r.to_string())
        .cmp(&b.route_to.map(|r| r.to_string())),
      SortColumn::ClaimDate => a.claim_date.cmp(&b.claim_date),
      SortColumn::Vendor => {
        text_key(a.vendor.as_deref()).cmp(&text_key(b.vendor.as_deref()))
      }
      SortColumn::Id => Ordering::Equal,
    };
    let ord = ord.then_with(|| a.id.cmp(&b.id));
    match self.direction {
      SortDirection::Asc => ord,
      SortDirection::Desc => ord.reverse(),
    }
  }

  pub fn sort(&self, rows: &mut [Request]) { rows.sort_by(|a, b| self.compare(a, b)); }
}

// ─── View ────────────────────────────────────────────────────────────────────

/// A staff member's filtered, sorted view of the triage queue.
pub struct RequestQueueView<S> {
  service: Arc<S>,
  me:      UserId,
  filter:  QueueFilter,
  sort:    QueueSort,
  rows:    Vec<Request>,
}

impl<S: RequestService> RequestQueueView<S> {
  pub fn new(service: Arc<S>, me: UserId) -> Self {
    Self {
      service,
      me,
      filter: QueueFilter::default(),
      sort: QueueSort::default(),
      rows: Vec::new(),
    }
  }

  pub fn rows(&self) -> &[Request] { &self.rows }

  pub fn filter(&self) -> QueueFilter { self.filter }

  pub fn sort_order(&self) -> QueueSort { self.sort }

  /// Fetch the queue from the service and apply the local sort.
  pub async fn reload(&mut self, token: &str) -> crate::Result<&[Request]> {
    let mut rows =
      remote("request.queue", self.service.search_queue(token, &self.filter).await)?;
    rows.retain(|r| self.filter.matches(r, self.me));
    self.sort.sort(&mut rows);
    self.rows = rows;
    Ok(&self.rows)
  }

  pub async fn set_filter(
    &mut self,
    token: &str,
    filter: QueueFilter,
  ) -> crate::Result<&[Request]> {
    self.filter = filter;
    self.reload(token).await
  }

  /// Change the sort column; resorts the rows already loaded.
  pub fn set_sort(&mut self, sort: QueueSort) {
    self.sort = sort;
    self.sort.sort(&mut self.rows);
  }

  /// Replace locally-mutated rows and drop those that no longer match.
  pub fn apply_local(&mut self, updated: impl IntoIterator<Item = Request>) {
    for request in updated {
      if let Some(row) = self.rows.iter_mut().find(|r| r.id == request.id) {
        *row = request;
      }
    }
    let (filter, me) = (self.filter, self.me);
    self.rows.retain(|r| filter.matches(r, me));
    self.sort.sort(&mut self.rows);
  }

  /// Claim the selected rows for the viewing staff member.
  pub async fn claim_selected(
    &mut self,
    token: &str,
    ids: &[RequestId],
  ) -> crate::Result<BatchReport> {
    let coordinator = ClaimCoordinator::new(self.service.clone());
    let report = coordinator.claim(token, ids, self.me).await;
    self.apply_local(report.updated.clone());
    Ok(report)
  }

  /// Release a claim and drop the row if the view no longer shows it.
  pub async fn unclaim(&mut self, token: &str, id: RequestId) -> crate::Result<Request> {
    let coordinator = ClaimCoordinator::new(self.service.clone());
    let request = coordinator.unclaim(token, id).await?;
    self.apply_local([request.clone()]);
    Ok(request)
  }
}
