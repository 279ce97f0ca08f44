//! In-process fake of the request service for engine tests.

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  sync::{Mutex, MutexGuard},
  time::Duration,
};

use chrono::{Datelike, TimeZone, Utc};
use serde_json::Value;

use crate::{
  error::{Error, ServiceEvent},
  queue::QueueFilter,
  request::{LineitemId, NewRequest, Request, RequestId, RouteTo},
  routing::{DEFAULT_ILL_MIN_AGE_YEARS, route_for},
  service::{
    CreatedRequest, DupeQuery, OrgSettingValue, OrgUnit, RecordSource, RecordSuggestion,
    RequestService, Session, SettingSummary, StatusReply,
  },
  status::{RequestWithStatus, resolve},
};

/// A fresh, unrouted request owned by patron 7.
pub fn request(id: RequestId) -> Request {
  Request {
    id,
    usr: 7,
    requestor: 7,
    title: "Parable of the Sower".into(),
    author: Some("Octavia E. Butler".into()),
    identifier: None,
    format: "book".into(),
    publisher: None,
    pubdate: None,
    language: None,
    notes: None,
    pickup_lib: None,
    email: None,
    phone: None,
    ill_opt_out: false,
    id_matched: false,
    create_date: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + chrono::Duration::minutes(id),
    claim_date: None,
    claimed_by: None,
    reject_date: None,
    rejected_by: None,
    reject_reason: None,
    complete_date: None,
    cancel_date: None,
    route_to: None,
    lineitem: None,
    illno: None,
    vendor: None,
    staff_notes: None,
    patron_notes: None,
    revision: 0,
  }
}

#[derive(Default)]
struct Counters {
  create:        usize,
  cancel:        usize,
  update:        usize,
  dupes:         usize,
  record_search: usize,
  route:         usize,
  org_fetch:     usize,
}

#[derive(Default)]
struct State {
  requests:         BTreeMap<RequestId, Request>,
  next_id:          RequestId,
  settings:         HashMap<String, Value>,
  org_settings:     HashMap<String, Vec<OrgSettingValue>>,
  patron_settings:  HashMap<String, Value>,
  counters:         Counters,
  fail_updates_for: HashSet<RequestId>,
  fail_transport:   bool,
  reject_lineitems: bool,
  slow_dupes:       Option<(String, Duration)>,
  last_update:      Option<Request>,
  lineitem_calls:   Vec<(RequestId, LineitemId)>,
  /// Another writer's edit, landed between the next read and write of a
  /// request.
  concurrent_edit:  Option<(RequestId, fn(&mut Request))>,
}

pub struct FakeService {
  session: Option<Session>,
  state:   Mutex<State>,
}

impl FakeService {
  fn with_session(session: Option<Session>) -> Self {
    let state = State { next_id: 1000, ..State::default() };
    Self { session, state: Mutex::new(state) }
  }

  pub fn patron(user_id: i64) -> Self {
    Self::with_session(Some(Session { user_id, home_ou: 2, staff: false }))
  }

  pub fn staff(user_id: i64) -> Self {
    Self::with_session(Some(Session { user_id, home_ou: 1, staff: true }))
  }

  pub fn anonymous() -> Self { Self::with_session(None) }

  fn lock(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap() }

  pub fn insert(&self, request: Request) { self.lock().requests.insert(request.id, request); }

  pub fn get(&self, id: RequestId) -> Request { self.lock().requests[&id].clone() }

  pub fn set_setting(&self, name: &str, value: Value) {
    self.lock().settings.insert(name.into(), value);
  }

  pub fn set_org_setting(&self, name: &str, org_unit: i64, value: Value) {
    self
      .lock()
      .org_settings
      .entry(name.into())
      .or_default()
      .push(OrgSettingValue { org_unit, summary: SettingSummary { value: Some(value) } });
  }

  pub fn fail_updates_for(&self, id: RequestId) { self.lock().fail_updates_for.insert(id); }

  pub fn edit_concurrently(&self, id: RequestId, edit: fn(&mut Request)) {
    self.lock().concurrent_edit = Some((id, edit));
  }

  pub fn fail_transport(&self, fail: bool) { self.lock().fail_transport = fail; }

  pub fn reject_lineitems(&self, reject: bool) { self.lock().reject_lineitems = reject; }

  pub fn slow_dupes_for(&self, title: &str, delay: Duration) {
    self.lock().slow_dupes = Some((title.into(), delay));
  }

  pub fn create_count(&self) -> usize { self.lock().counters.create }
  pub fn cancel_count(&self) -> usize { self.lock().counters.cancel }
  pub fn update_count(&self) -> usize { self.lock().counters.update }
  pub fn dupes_count(&self) -> usize { self.lock().counters.dupes }
  pub fn record_search_count(&self) -> usize { self.lock().counters.record_search }
  pub fn route_count(&self) -> usize { self.lock().counters.route }
  pub fn org_fetch_count(&self) -> usize { self.lock().counters.org_fetch }
  pub fn org_unit_count(&self) -> usize { org_units().len() }

  pub fn last_update(&self) -> Option<Request> { self.lock().last_update.clone() }

  pub fn lineitem_calls(&self) -> Vec<(RequestId, LineitemId)> {
    self.lock().lineitem_calls.clone()
  }

  fn user(&self) -> Result<&Session, Error> { self.session.as_ref().ok_or(Error::Unauthorized) }

  fn check_transport(&self) -> Result<(), Error> {
    if self.lock().fail_transport {
      return Err(Error::transport("connection reset"));
    }
    Ok(())
  }

  fn mine(&self, include_terminal: bool) -> Result<Vec<RequestWithStatus>, Error> {
    let usr = self.user()?.user_id;
    Ok(
      self
        .lock()
        .requests
        .values()
        .filter(|r| r.usr == usr && (include_terminal || r.is_active()))
        .cloned()
        .map(RequestWithStatus::new)
        .collect(),
    )
  }
}

fn org_units() -> Vec<OrgUnit> {
  let unit = |id, parent, shortname: &str| OrgUnit {
    id,
    parent,
    shortname: shortname.into(),
    name: format!("{shortname} Library"),
  };
  vec![unit(1, None, "SYS"), unit(2, Some(1), "BR1"), unit(3, Some(1), "BR2"), unit(4, Some(1), "BR3")]
}

fn same_text(a: Option<&str>, b: Option<&str>) -> bool {
  matches!((a, b), (Some(a), Some(b)) if a.eq_ignore_ascii_case(b))
}

impl RequestService for FakeService {
  type Error = Error;

  async fn session(&self, _token: &str) -> Result<Option<Session>, Error> {
    Ok(self.session.clone())
  }

  async fn create_request(&self, _token: &str, input: NewRequest) -> Result<CreatedRequest, Error> {
    self.check_transport()?;
    let session = self.user()?.clone();
    let mut state = self.lock();
    state.counters.create += 1;
    state.next_id += 1;
    let id = state.next_id;
    let mut r = request(id);
    r.usr = input.usr.unwrap_or(session.user_id);
    r.requestor = session.user_id;
    r.title = input.title;
    r.author = input.author;
    r.identifier = input.identifier;
    r.format = input.format;
    r.pubdate = input.pubdate;
    r.ill_opt_out = input.ill_opt_out;
    r.create_date = Utc::now();
    state.requests.insert(id, r);
    Ok(CreatedRequest { request_id: id })
  }

  async fn retrieve_pending(&self, _token: &str) -> Result<Vec<RequestWithStatus>, Error> {
    self.mine(false)
  }

  async fn retrieve_all(&self, _token: &str) -> Result<Vec<RequestWithStatus>, Error> {
    self.mine(true)
  }

  async fn cancel_request(&self, _token: &str, id: RequestId) -> Result<(), Error> {
    self.check_transport()?;
    let mut state = self.lock();
    state.counters.cancel += 1;
    let r = state
      .requests
      .get_mut(&id)
      .ok_or_else(|| Error::NotFound(format!("request {id}")))?;
    r.cancel_date = Some(Utc::now());
    r.revision += 1;
    Ok(())
  }

  async fn create_allowed(&self, _token: &str) -> Result<bool, Error> {
    Ok(self.session.is_some())
  }

  async fn dupes_search(&self, _token: &str, query: &DupeQuery) -> Result<bool, Error> {
    let usr = self.user()?.user_id;
    let delay = {
      let mut state = self.lock();
      state.counters.dupes += 1;
      state
        .slow_dupes
        .as_ref()
        .filter(|(title, _)| query.title.as_deref() == Some(title.as_str()))
        .map(|(_, d)| *d)
    };
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    let state = self.lock();
    Ok(state.requests.values().any(|r| {
      r.usr == usr
        && r.is_active()
        && r.format == query.format
        && (same_text(r.identifier.as_deref(), query.identifier.as_deref())
          || same_text(Some(&r.title), query.title.as_deref()))
    }))
  }

  async fn record_search(
    &self,
    _token: &str,
    identifier: &str,
  ) -> Result<Vec<RecordSuggestion>, Error> {
    self.lock().counters.record_search += 1;
    Ok(vec![RecordSuggestion {
      id:        55,
      source:    RecordSource::External,
      title:     format!("Record for {identifier}"),
      author:    None,
      pubdate:   None,
      publisher: None,
    }])
  }

  async fn get_route_to(&self, _token: &str, request: &Request) -> Result<RouteTo, Error> {
    self.lock().counters.route += 1;
    Ok(route_for(request, DEFAULT_ILL_MIN_AGE_YEARS, Utc::now().year()))
  }

  async fn request_status(&self, _token: &str, id: RequestId) -> Result<StatusReply, Error> {
    let state = self.lock();
    let r = state
      .requests
      .get(&id)
      .ok_or_else(|| Error::NotFound(format!("request {id}")))?;
    Ok(StatusReply { status: resolve(r) })
  }

  async fn setting(&self, name: &str, _token: &str) -> Result<Option<Value>, Error> {
    Ok(self.lock().settings.get(name).cloned())
  }

  async fn org_setting_for_all(&self, name: &str) -> Result<Vec<OrgSettingValue>, Error> {
    Ok(self.lock().org_settings.get(name).cloned().unwrap_or_default())
  }

  async fn org_units(&self) -> Result<Vec<OrgUnit>, Error> {
    self.lock().counters.org_fetch += 1;
    Ok(org_units())
  }

  async fn patron_setting(&self, _token: &str, name: &str) -> Result<Option<Value>, Error> {
    Ok(self.lock().patron_settings.get(name).cloned())
  }

  async fn update_patron_setting(
    &self,
    _token: &str,
    name: &str,
    value: Value,
  ) -> Result<(), Error> {
    self.lock().patron_settings.insert(name.into(), value);
    Ok(())
  }

  async fn retrieve_request(&self, _token: &str, id: RequestId) -> Result<Option<Request>, Error> {
    self.check_transport()?;
    Ok(self.lock().requests.get(&id).cloned())
  }

  async fn update_request(&self, _token: &str, request: Request) -> Result<Request, Error> {
    self.check_transport()?;
    let mut state = self.lock();
    if state.fail_updates_for.contains(&request.id) {
      return Err(Error::transport("update rejected"));
    }
    let state = &mut *state;
    let stored = state
      .requests
      .get_mut(&request.id)
      .ok_or_else(|| Error::NotFound(format!("request {}", request.id)))?;
    if let Some((_, edit)) = state.concurrent_edit.take_if(|(id, _)| *id == request.id) {
      edit(stored);
      stored.revision += 1;
    }
    if stored.revision != request.revision {
      return Err(Error::event(
        ServiceEvent::STALE_WRITE,
        format!("request {} changed since revision {}", request.id, request.revision),
      ));
    }
    let updated = Request { revision: request.revision + 1, ..request.clone() };
    *stored = updated.clone();
    state.counters.update += 1;
    state.last_update = Some(request);
    Ok(updated)
  }

  async fn search_queue(&self, _token: &str, filter: &QueueFilter) -> Result<Vec<Request>, Error> {
    let me = self.user()?.user_id;
    Ok(
      self
        .lock()
        .requests
        .values()
        .filter(|r| filter.matches(r, me))
        .cloned()
        .collect(),
    )
  }

  async fn apply_lineitem(
    &self,
    _token: &str,
    id: RequestId,
    lineitem: LineitemId,
  ) -> Result<Request, Error> {
    let mut state = self.lock();
    state.lineitem_calls.push((id, lineitem));
    if state.reject_lineitems {
      return Err(Error::event(
        ServiceEvent::LINEITEM_NOT_APPLICABLE,
        "line item has no copies for this request",
      ));
    }
    let r = state
      .requests
      .get_mut(&id)
      .ok_or_else(|| Error::NotFound(format!("request {id}")))?;
    r.lineitem = Some(lineitem);
    r.revision += 1;
    Ok(r.clone())
  }
}
