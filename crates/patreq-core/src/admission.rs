//! Admission control for new requests.
//!
//! Admission outcomes are values, not errors: a patron over quota or typing a
//! duplicate sees a disabled submit action, never a failure. Only transport
//! and session problems surface as [`crate::Error`].

use std::{
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use validator::Validate;

use crate::{
  repository::{CreateOutcome, RequestRepository},
  request::{FORMAT_ARTICLE, FORMAT_EBOOK_EAUDIO, NewRequest, RequestId},
  service::{
    DupeQuery, RecordSource, RecordSuggestion, RequestService, remote, setting_i64,
  },
};

pub const MAX_ACTIVE_SETTING: &str = "patron_requests.max_active";
pub const DEFAULT_MAX_ACTIVE: i64 = 20;
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);
pub const MIN_IDENTIFIER_LENGTH: usize = 6;

// ─── Quota ───────────────────────────────────────────────────────────────────

/// The configured maximum; absent or zero falls back to the default.
pub fn effective_max(configured: Option<i64>) -> i64 {
  match configured {
    Some(max) if max > 0 => max,
    _ => DEFAULT_MAX_ACTIVE,
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCheck {
  pub allowed:      bool,
  pub active_count: i64,
  pub max_count:    i64,
}

impl QuotaCheck {
  pub fn new(active_count: i64, max_count: i64) -> Self {
    Self { allowed: active_count < max_count, active_count, max_count }
  }
}

// ─── Duplicates ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCheck {
  pub title_duplicate:      bool,
  pub identifier_duplicate: bool,
}

impl DuplicateCheck {
  /// Attribute a positive search to the identifier when one was given, to
  /// the title otherwise.
  pub fn from_match(found: bool, query: &DupeQuery) -> Self {
    if !found {
      return Self::default();
    }
    let has_identifier = query.identifier.as_deref().is_some_and(|i| !i.is_empty());
    Self { title_duplicate: !has_identifier, identifier_duplicate: has_identifier }
  }

  pub fn any(&self) -> bool { self.title_duplicate || self.identifier_duplicate }
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
  /// Formats that can never be requested.
  pub ineligible_formats: Vec<String>,
  /// Debounce window for duplicate searches.
  #[serde(with = "millis")]
  pub quiet_period:       Duration,
}

impl Default for AdmissionConfig {
  fn default() -> Self {
    Self {
      ineligible_formats: vec![FORMAT_EBOOK_EAUDIO.to_owned()],
      quiet_period:       DEFAULT_QUIET_PERIOD,
    }
  }
}

impl AdmissionConfig {
  pub fn is_format_eligible(&self, format: &str) -> bool {
    !format.is_empty() && !self.ineligible_formats.iter().any(|f| f == format)
  }
}

mod millis {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
  }
}

// ─── Admission state ─────────────────────────────────────────────────────────

/// A locally-held catalogue record the patron picked; they should place a
/// hold on it instead of requesting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldRedirect {
  pub record_id: i64,
}

impl HoldRedirect {
  pub fn for_record(record: &RecordSuggestion) -> Option<Self> {
    (record.source == RecordSource::Local).then_some(Self { record_id: record.id })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Blocker {
  NoSession,
  NotPermitted,
  QuotaExceeded { active_count: i64, max_count: i64 },
  Duplicate { identifier: bool },
  FormatIneligible,
  LookupInFlight,
  HoldRedirect { record_id: i64 },
  InvalidFields { fields: Vec<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionState {
  pub session:          bool,
  pub permitted:        bool,
  pub quota:            Option<QuotaCheck>,
  pub duplicate:        DuplicateCheck,
  pub format_eligible:  bool,
  /// A duplicate search or identifier lookup has not answered yet.
  pub lookup_in_flight: bool,
  pub hold_redirect:    Option<HoldRedirect>,
  pub invalid_fields:   Vec<String>,
}

impl AdmissionState {
  pub fn blockers(&self) -> Vec<Blocker> {
    let mut out = Vec::new();
    if !self.session {
      out.push(Blocker::NoSession);
    }
    if !self.permitted {
      out.push(Blocker::NotPermitted);
    }
    if let Some(q) = self.quota.filter(|q| !q.allowed) {
      out.push(Blocker::QuotaExceeded { active_count: q.active_count, max_count: q.max_count });
    }
    if self.duplicate.any() {
      out.push(Blocker::Duplicate { identifier: self.duplicate.identifier_duplicate });
    }
    if !self.format_eligible {
      out.push(Blocker::FormatIneligible);
    }
    if self.lookup_in_flight {
      out.push(Blocker::LookupInFlight);
    }
    if let Some(h) = self.hold_redirect {
      out.push(Blocker::HoldRedirect { record_id: h.record_id });
    }
    if !self.invalid_fields.is_empty() {
      out.push(Blocker::InvalidFields { fields: self.invalid_fields.clone() });
    }
    out
  }

  pub fn can_submit(&self) -> bool { self.blockers().is_empty() }
}

// ─── Debounce and stale-response handling ────────────────────────────────────

/// Trailing-edge debounce: only the last call within the quiet period
/// proceeds.
#[derive(Debug)]
pub struct Debouncer {
  generation: AtomicU64,
  quiet:      Duration,
}

impl Debouncer {
  pub fn new(quiet: Duration) -> Self { Self { generation: AtomicU64::new(0), quiet } }

  /// Wait out the quiet period. `false` when a newer call arrived meanwhile.
  pub async fn settle(&self) -> bool {
    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
    if self.quiet.is_zero() {
      return true;
    }
    tokio::time::sleep(self.quiet).await;
    self.generation.load(Ordering::SeqCst) == generation
  }
}

/// Remembers the latest input so responses to older inputs can be dropped.
#[derive(Debug)]
pub struct LatestOnly<T> {
  latest: ArcSwapOption<T>,
}

impl<T> Default for LatestOnly<T> {
  fn default() -> Self { Self { latest: ArcSwapOption::empty() } }
}

impl<T: PartialEq> LatestOnly<T> {
  pub fn set(&self, input: T) { self.latest.store(Some(Arc::new(input))); }

  pub fn is_latest(&self, input: &T) -> bool {
    matches!(&*self.latest.load(), Some(latest) if **latest == *input)
  }

  pub fn clear(&self) { self.latest.store(None); }
}

// ─── Controller ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentLookup {
  /// Too short, unchanged since the last lookup, or an article.
  Skipped,
  Suggestions(Vec<RecordSuggestion>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
  Created(RequestId),
  InFlight,
  Blocked(Vec<Blocker>),
}

pub struct AdmissionController<S> {
  service:         Arc<S>,
  config:          AdmissionConfig,
  debouncer:       Debouncer,
  latest_dupe:     LatestOnly<DupeQuery>,
  previous_search: ArcSwapOption<String>,
}

impl<S: RequestService> AdmissionController<S> {
  pub fn new(service: Arc<S>, config: AdmissionConfig) -> Self {
    let debouncer = Debouncer::new(config.quiet_period);
    Self {
      service,
      config,
      debouncer,
      latest_dupe: LatestOnly::default(),
      previous_search: ArcSwapOption::empty(),
    }
  }

  pub fn config(&self) -> &AdmissionConfig { &self.config }

  pub fn is_format_eligible(&self, format: &str) -> bool {
    self.config.is_format_eligible(format)
  }

  pub async fn check_permission(&self, token: &str) -> crate::Result<bool> {
    remote("request.create.allowed", self.service.create_allowed(token).await)
  }

  pub async fn check_quota(&self, token: &str) -> crate::Result<QuotaCheck> {
    let configured = remote(
      "settings.retrieve",
      self.service.setting(MAX_ACTIVE_SETTING, token).await,
    )?;
    let max = effective_max(setting_i64(configured.as_ref()));
    let active =
      remote("request.retrieve.pending", self.service.retrieve_pending(token).await)?;
    Ok(QuotaCheck::new(active.len() as i64, max))
  }

  /// Debounced duplicate check.
  ///
  /// `None` means the result was superseded by a newer input, either during
  /// the quiet period or while the search was in flight, and must be
  /// ignored.
  pub async fn check_duplicate(
    &self,
    token: &str,
    query: DupeQuery,
  ) -> crate::Result<Option<DuplicateCheck>> {
    self.latest_dupe.set(query.clone());
    if !query.is_searchable() {
      return Ok(Some(DuplicateCheck::default()));
    }
    if !self.debouncer.settle().await {
      debug!("duplicate check superseded during quiet period");
      return Ok(None);
    }
    let found = remote("request.dupes.search", self.service.dupes_search(token, &query).await)?;
    if !self.latest_dupe.is_latest(&query) {
      warn!(title = ?query.title, "discarding stale duplicate search response");
      return Ok(None);
    }
    Ok(Some(DuplicateCheck::from_match(found, &query)))
  }

  /// Look an identifier up in the catalogue.
  pub async fn lookup_identifier(
    &self,
    token: &str,
    identifier: &str,
    format: &str,
  ) -> crate::Result<IdentLookup> {
    let identifier = identifier.trim();
    let repeated =
      matches!(&*self.previous_search.load(), Some(prev) if prev.as_str() == identifier);
    if identifier.len() < MIN_IDENTIFIER_LENGTH || repeated || format == FORMAT_ARTICLE {
      return Ok(IdentLookup::Skipped);
    }
    self.previous_search.store(Some(Arc::new(identifier.to_owned())));
    let found =
      remote("request.record.search", self.service.record_search(token, identifier).await)?;
    debug!(identifier, matches = found.len(), "identifier lookup");
    Ok(IdentLookup::Suggestions(found))
  }

  /// Evaluate every admission rule for `draft`, undebounced.
  pub async fn evaluate(&self, token: &str, draft: &NewRequest) -> crate::Result<AdmissionState> {
    let draft = draft.clone().normalized();
    let invalid_fields = match draft.validate() {
      Ok(()) => Vec::new(),
      Err(errs) => {
        let mut fields: Vec<String> = errs.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        fields
      }
    };
    let format_eligible = self.is_format_eligible(&draft.format);

    let session = remote("session.retrieve", self.service.session(token).await)?;
    if session.is_none() {
      return Ok(AdmissionState { format_eligible, invalid_fields, ..AdmissionState::default() });
    }

    let permitted = self.check_permission(token).await?;
    let quota = if permitted { Some(self.check_quota(token).await?) } else { None };

    let query = DupeQuery {
      format:     draft.format.clone(),
      title:      Some(draft.title.clone()),
      identifier: draft.identifier.clone(),
    };
    let duplicate = if query.is_searchable() {
      let found =
        remote("request.dupes.search", self.service.dupes_search(token, &query).await)?;
      DuplicateCheck::from_match(found, &query)
    } else {
      DuplicateCheck::default()
    };

    Ok(AdmissionState {
      session: true,
      permitted,
      quota,
      duplicate,
      format_eligible,
      lookup_in_flight: false,
      hold_redirect: None,
      invalid_fields,
    })
  }

  /// Submit `draft` if `state` admits it.
  pub async fn submit(
    &self,
    repo: &RequestRepository<S>,
    token: &str,
    draft: NewRequest,
    state: &AdmissionState,
  ) -> crate::Result<SubmitOutcome> {
    let blockers = state.blockers();
    if !blockers.is_empty() {
      debug!(?blockers, "submit blocked");
      return Ok(SubmitOutcome::Blocked(blockers));
    }
    Ok(match repo.create(token, draft).await? {
      CreateOutcome::Created(id) => SubmitOutcome::Created(id),
      CreateOutcome::InFlight => SubmitOutcome::InFlight,
    })
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::testing::{FakeService, request};

  fn admitted() -> AdmissionState {
    AdmissionState {
      session: true,
      permitted: true,
      quota: Some(QuotaCheck::new(0, 20)),
      format_eligible: true,
      ..AdmissionState::default()
    }
  }

  fn controller(svc: &Arc<FakeService>) -> AdmissionController<FakeService> {
    AdmissionController::new(
      svc.clone(),
      AdmissionConfig { quiet_period: Duration::ZERO, ..AdmissionConfig::default() },
    )
  }

  #[test]
  fn quota_boundaries() {
    assert!(QuotaCheck::new(19, 20).allowed);
    assert!(!QuotaCheck::new(20, 20).allowed);
    assert!(!QuotaCheck::new(21, 20).allowed);
  }

  #[test]
  fn zero_or_missing_max_falls_back_to_default() {
    assert_eq!(effective_max(Some(0)), DEFAULT_MAX_ACTIVE);
    assert_eq!(effective_max(None), DEFAULT_MAX_ACTIVE);
    assert_eq!(effective_max(Some(-3)), DEFAULT_MAX_ACTIVE);
    assert_eq!(effective_max(Some(5)), 5);
  }

  #[test]
  fn identifier_match_suppresses_title_flag() {
    let query = DupeQuery {
      format:     "book".into(),
      title:      Some("Dune".into()),
      identifier: Some("9780441013593".into()),
    };
    let check = DuplicateCheck::from_match(true, &query);
    assert!(check.identifier_duplicate);
    assert!(!check.title_duplicate);

    let title_only = DupeQuery { identifier: None, ..query };
    let check = DuplicateCheck::from_match(true, &title_only);
    assert!(check.title_duplicate && !check.identifier_duplicate);
  }

  #[test]
  fn ebook_eaudio_blocks_submit_everything_else_equal() {
    let config = AdmissionConfig::default();
    let mut state = admitted();
    state.format_eligible = config.is_format_eligible("book");
    assert!(state.can_submit());

    state.format_eligible = config.is_format_eligible(FORMAT_EBOOK_EAUDIO);
    assert!(!state.can_submit());
    assert_eq!(state.blockers(), vec![Blocker::FormatIneligible]);
  }

  #[test]
  fn empty_format_is_not_eligible() {
    assert!(!AdmissionConfig::default().is_format_eligible(""));
  }

  #[test]
  fn every_blocker_is_reported() {
    let state = AdmissionState {
      duplicate: DuplicateCheck { title_duplicate: true, identifier_duplicate: false },
      lookup_in_flight: true,
      hold_redirect: Some(HoldRedirect { record_id: 12 }),
      quota: Some(QuotaCheck::new(20, 20)),
      invalid_fields: vec!["pubdate".into()],
      ..AdmissionState::default()
    };
    assert_eq!(state.blockers().len(), 8);
  }

  #[test]
  fn only_local_records_redirect_to_a_hold() {
    let mut record = RecordSuggestion {
      id:        12,
      source:    RecordSource::Local,
      title:     "Dune".into(),
      author:    None,
      pubdate:   None,
      publisher: None,
    };
    assert_eq!(HoldRedirect::for_record(&record), Some(HoldRedirect { record_id: 12 }));
    record.source = RecordSource::External;
    assert_eq!(HoldRedirect::for_record(&record), None);
  }

  #[tokio::test]
  async fn quota_uses_setting_and_pending_count() {
    let svc = Arc::new(FakeService::patron(7));
    svc.set_setting(MAX_ACTIVE_SETTING, json!("2"));
    svc.insert(request(1));
    svc.insert(request(2));
    let check = controller(&svc).check_quota("tok").await.unwrap();
    assert_eq!(check, QuotaCheck { allowed: false, active_count: 2, max_count: 2 });

    svc.set_setting(MAX_ACTIVE_SETTING, json!(0));
    let check = controller(&svc).check_quota("tok").await.unwrap();
    assert!(check.allowed);
    assert_eq!(check.max_count, DEFAULT_MAX_ACTIVE);
  }

  #[tokio::test]
  async fn unsearchable_query_makes_no_call() {
    let svc = Arc::new(FakeService::patron(7));
    let query = DupeQuery { format: String::new(), title: Some("Dune".into()), identifier: None };
    let check = controller(&svc).check_duplicate("tok", query).await.unwrap();
    assert_eq!(check, Some(DuplicateCheck::default()));
    assert_eq!(svc.dupes_count(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn quiet_period_collapses_bursts() {
    let svc = Arc::new(FakeService::patron(7));
    let admission = AdmissionController::new(svc.clone(), AdmissionConfig::default());
    let q = |t: &str| DupeQuery {
      format:     "book".into(),
      title:      Some(t.into()),
      identifier: None,
    };

    let (first, second) = tokio::join!(admission.check_duplicate("tok", q("Du")), async {
      tokio::time::sleep(Duration::from_millis(100)).await;
      admission.check_duplicate("tok", q("Dune")).await
    });

    assert_eq!(first.unwrap(), None);
    assert!(second.unwrap().is_some());
    assert_eq!(svc.dupes_count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn stale_response_is_discarded() {
    let svc = Arc::new(FakeService::patron(7));
    let mut existing = request(1);
    existing.title = "Slow Title".into();
    svc.insert(existing);
    svc.slow_dupes_for("Slow Title", Duration::from_millis(300));
    let admission = controller(&svc);
    let q = |t: &str| DupeQuery {
      format:     "book".into(),
      title:      Some(t.into()),
      identifier: None,
    };

    let (slow, fast) = tokio::join!(admission.check_duplicate("tok", q("Slow Title")), async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      admission.check_duplicate("tok", q("Fast Title")).await
    });

    assert_eq!(slow.unwrap(), None);
    assert_eq!(fast.unwrap(), Some(DuplicateCheck::default()));
  }

  #[tokio::test]
  async fn identifier_lookup_skip_rules() {
    let svc = Arc::new(FakeService::patron(7));
    let admission = controller(&svc);

    assert_eq!(admission.lookup_identifier("tok", "12345", "book").await.unwrap(), IdentLookup::Skipped);
    assert_eq!(
      admission.lookup_identifier("tok", "9780441013593", "article").await.unwrap(),
      IdentLookup::Skipped
    );
    assert!(matches!(
      admission.lookup_identifier("tok", "9780441013593", "book").await.unwrap(),
      IdentLookup::Suggestions(_)
    ));
    assert_eq!(
      admission.lookup_identifier("tok", "9780441013593", "book").await.unwrap(),
      IdentLookup::Skipped
    );
    assert_eq!(svc.record_search_count(), 1);
  }

  #[tokio::test]
  async fn evaluate_collects_remote_and_local_rules() {
    let svc = Arc::new(FakeService::patron(7));
    let mut existing = request(1);
    existing.identifier = Some("9780441013593".into());
    svc.insert(existing);
    let admission = controller(&svc);

    let draft = NewRequest {
      identifier: Some("9780441013593".into()),
      ..NewRequest::new("Dune", "book")
    };
    let state = admission.evaluate("tok", &draft).await.unwrap();
    assert!(state.session && state.permitted);
    assert!(state.duplicate.identifier_duplicate);
    assert!(!state.can_submit());

    let fresh = NewRequest::new("Children of Time", "book");
    let state = admission.evaluate("tok", &fresh).await.unwrap();
    assert!(state.can_submit(), "{:?}", state.blockers());
  }

  #[tokio::test]
  async fn evaluate_without_session_blocks() {
    let svc = Arc::new(FakeService::anonymous());
    let state = controller(&svc)
      .evaluate("tok", &NewRequest::new("Dune", "book"))
      .await
      .unwrap();
    assert!(state.blockers().contains(&Blocker::NoSession));
  }

  #[tokio::test]
  async fn submit_respects_blockers() {
    let svc = Arc::new(FakeService::patron(7));
    let admission = controller(&svc);
    let repo = RequestRepository::new(svc.clone());

    let mut blocked = admitted();
    blocked.quota = Some(QuotaCheck::new(20, 20));
    let outcome = admission
      .submit(&repo, "tok", NewRequest::new("Dune", "book"), &blocked)
      .await
      .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Blocked(_)));
    assert_eq!(svc.create_count(), 0);

    let outcome = admission
      .submit(&repo, "tok", NewRequest::new("Dune", "book"), &admitted())
      .await
      .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Created(_)));
  }
}
