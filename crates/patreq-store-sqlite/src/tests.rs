//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::Utc;
use patreq_core::{
  ServiceEvent,
  admission::MAX_ACTIVE_SETTING,
  cancel::{CancelConfirm, CancelStep},
  claim::ClaimCoordinator,
  queue::QueueFilter,
  repository::{CreateOutcome, RequestRepository},
  request::{NewRequest, Request, RouteTo, Transition},
  routing::{RoutingResolver, SaveOptions},
  service::{DupeQuery, OrgUnit, RecordSource, RecordSuggestion, RequestService},
  status::RequestStatus,
};
use serde_json::json;

use crate::{Error, SqliteStore};

const PATRON: i64 = 7;
const OTHER_PATRON: i64 = 8;
const STAFF: i64 = 100;
const OTHER_STAFF: i64 = 101;

struct Fixture {
  store:  SqliteStore,
  patron: String,
  other:  String,
  staff:  String,
}

async fn fixture() -> Fixture {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  for unit in [
    OrgUnit { id: 1, parent: None, shortname: "SYS".into(), name: "System".into() },
    OrgUnit { id: 2, parent: Some(1), shortname: "BR1".into(), name: "Branch One".into() },
    OrgUnit { id: 3, parent: Some(1), shortname: "BR2".into(), name: "Branch Two".into() },
  ] {
    store.put_org_unit(&unit).await.unwrap();
  }
  let patron = store.issue_session(PATRON, 2, false).await.unwrap();
  let other = store.issue_session(OTHER_PATRON, 3, false).await.unwrap();
  let staff = store.issue_session(STAFF, 1, true).await.unwrap();
  Fixture { store, patron, other, staff }
}

fn book(title: &str) -> NewRequest {
  NewRequest { author: Some("Ursula K. Le Guin".into()), ..NewRequest::new(title, "book") }
}

fn conflict_code(err: &Error) -> Option<&str> {
  match err {
    Error::Conflict(evt) => Some(evt.code.as_str()),
    _ => None,
  }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn issued_session_resolves() {
  let f = fixture().await;
  let session = f.store.session(&f.staff).await.unwrap().unwrap();
  assert_eq!(session.user_id, STAFF);
  assert!(session.staff);
  assert!(f.store.session("bogus").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_token_is_rejected() {
  let f = fixture().await;
  let err = f.store.create_request("bogus", book("The Dispossessed")).await.unwrap_err();
  assert!(matches!(err, Error::NoSession));
  assert!(matches!(patreq_core::Error::from(err), patreq_core::Error::Unauthorized));
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_list_pending() {
  let f = fixture().await;
  let created = f.store.create_request(&f.patron, book("The Dispossessed")).await.unwrap();

  let pending = f.store.retrieve_pending(&f.patron).await.unwrap();
  assert_eq!(pending.len(), 1);
  let row = &pending[0];
  assert_eq!(row.request.id, created.request_id);
  assert_eq!(row.request.usr, PATRON);
  assert_eq!(row.request.requestor, PATRON);
  assert_eq!(row.status, Some(RequestStatus::Submitted));

  assert!(f.store.retrieve_pending(&f.other).await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_optional_fields_are_stored_as_null() {
  let f = fixture().await;
  let input = NewRequest {
    author: Some("   ".into()),
    publisher: Some(String::new()),
    ..NewRequest::new("  The Lathe of Heaven  ", "book")
  };
  let id = f.store.create_request(&f.patron, input).await.unwrap().request_id;
  let stored = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();
  assert_eq!(stored.title, "The Lathe of Heaven");
  assert!(stored.author.is_none());
  assert!(stored.publisher.is_none());
}

#[tokio::test]
async fn invalid_fields_are_refused() {
  let f = fixture().await;
  let input = NewRequest { pubdate: Some("spring".into()), ..book("Always Coming Home") };
  let err = f.store.create_request(&f.patron, input).await.unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn ineligible_format_is_refused() {
  let f = fixture().await;
  let err = f
    .store
    .create_request(&f.patron, NewRequest::new("Earthsea", "ebook-eaudio"))
    .await
    .unwrap_err();
  assert_eq!(conflict_code(&err), Some(ServiceEvent::FORMAT_NOT_ELIGIBLE));
}

#[tokio::test]
async fn create_without_permission_is_forbidden() {
  let f = fixture().await;
  f.store.set_can_request(PATRON, false).await.unwrap();
  assert!(!f.store.create_allowed(&f.patron).await.unwrap());

  let err = f.store.create_request(&f.patron, book("Tehanu")).await.unwrap_err();
  assert!(matches!(err, Error::PermissionDenied(_)));
}

#[tokio::test]
async fn only_staff_create_on_behalf_of_others() {
  let f = fixture().await;
  let mediated = NewRequest { usr: Some(OTHER_PATRON), ..book("The Word for World Is Forest") };

  let err = f.store.create_request(&f.patron, mediated.clone()).await.unwrap_err();
  assert!(matches!(err, Error::PermissionDenied(_)));

  let id = f.store.create_request(&f.staff, mediated).await.unwrap().request_id;
  let stored = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();
  assert_eq!(stored.usr, OTHER_PATRON);
  assert_eq!(stored.requestor, STAFF);
}

// ─── Quota ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn global_quota_is_enforced() {
  let f = fixture().await;
  f.store.put_setting(MAX_ACTIVE_SETTING, &json!(2)).await.unwrap();

  f.store.create_request(&f.patron, book("A")).await.unwrap();
  f.store.create_request(&f.patron, book("B")).await.unwrap();
  let err = f.store.create_request(&f.patron, book("C")).await.unwrap_err();
  assert_eq!(conflict_code(&err), Some(ServiceEvent::QUOTA_EXCEEDED));

  // Other patrons have their own allowance.
  f.store.create_request(&f.other, book("C")).await.unwrap();
}

#[tokio::test]
async fn ancestor_org_setting_overrides_global() {
  let f = fixture().await;
  f.store.put_setting(MAX_ACTIVE_SETTING, &json!(5)).await.unwrap();
  f.store.put_org_setting(1, MAX_ACTIVE_SETTING, &json!("1")).await.unwrap();

  f.store.create_request(&f.patron, book("A")).await.unwrap();
  let err = f.store.create_request(&f.patron, book("B")).await.unwrap_err();
  assert_eq!(conflict_code(&err), Some(ServiceEvent::QUOTA_EXCEEDED));

  let seen = f.store.setting(MAX_ACTIVE_SETTING, &f.patron).await.unwrap();
  assert_eq!(seen, Some(json!("1")));
  let anonymous = f.store.setting(MAX_ACTIVE_SETTING, "").await.unwrap();
  assert_eq!(anonymous, Some(json!(5)));
}

#[tokio::test]
async fn canceled_requests_free_quota() {
  let f = fixture().await;
  f.store.put_setting(MAX_ACTIVE_SETTING, &json!(1)).await.unwrap();

  let id = f.store.create_request(&f.patron, book("A")).await.unwrap().request_id;
  f.store.cancel_request(&f.patron, id).await.unwrap();
  f.store.create_request(&f.patron, book("B")).await.unwrap();
}

// ─── Duplicates ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_title_is_refused_case_insensitively() {
  let f = fixture().await;
  f.store.create_request(&f.patron, book("The Left Hand of Darkness")).await.unwrap();

  let err = f
    .store
    .create_request(&f.patron, book("the left hand of darkness"))
    .await
    .unwrap_err();
  assert_eq!(conflict_code(&err), Some(ServiceEvent::DUPLICATE_REQUEST));

  // Same title in another format is a different item.
  f.store
    .create_request(&f.patron, NewRequest::new("The Left Hand of Darkness", "audiobook"))
    .await
    .unwrap();
}

#[tokio::test]
async fn dupes_search_matches_identifier_or_title() {
  let f = fixture().await;
  let input = NewRequest { identifier: Some("9780441478125".into()), ..book("Left Hand") };
  f.store.create_request(&f.patron, input).await.unwrap();

  let by_ident = DupeQuery {
    format:     "book".into(),
    title:      Some("Something Else".into()),
    identifier: Some("9780441478125".into()),
  };
  assert!(f.store.dupes_search(&f.patron, &by_ident).await.unwrap());
  assert!(!f.store.dupes_search(&f.other, &by_ident).await.unwrap());

  let by_title =
    DupeQuery { format: "book".into(), title: Some("LEFT HAND".into()), identifier: None };
  assert!(f.store.dupes_search(&f.patron, &by_title).await.unwrap());

  let empty = DupeQuery { format: "book".into(), title: None, identifier: None };
  assert!(!f.store.dupes_search(&f.patron, &empty).await.unwrap());
}

#[tokio::test]
async fn same_title_under_a_new_identifier_is_a_duplicate() {
  let f = fixture().await;
  let input = NewRequest { identifier: Some("9780441478125".into()), ..book("Left Hand") };
  f.store.create_request(&f.patron, input).await.unwrap();

  let reissue = DupeQuery {
    format:     "book".into(),
    title:      Some("left hand".into()),
    identifier: Some("9780441007318".into()),
  };
  assert!(f.store.dupes_search(&f.patron, &reissue).await.unwrap());

  let input = NewRequest { identifier: Some("9780441007318".into()), ..book("Left Hand") };
  let err = f.store.create_request(&f.patron, input).await.unwrap_err();
  assert_eq!(conflict_code(&err), Some(ServiceEvent::DUPLICATE_REQUEST));
}

// ─── Cancel ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_moves_request_out_of_pending() {
  let f = fixture().await;
  let id = f.store.create_request(&f.patron, book("Lavinia")).await.unwrap().request_id;
  f.store.cancel_request(&f.patron, id).await.unwrap();

  assert!(f.store.retrieve_pending(&f.patron).await.unwrap().is_empty());
  let all = f.store.retrieve_all(&f.patron).await.unwrap();
  assert_eq!(all.len(), 1);
  assert!(all[0].request.cancel_date.is_some());
  assert_eq!(all[0].status, None);

  let err = f.store.cancel_request(&f.patron, id).await.unwrap_err();
  assert_eq!(conflict_code(&err), Some(ServiceEvent::ALREADY_TERMINAL));
}

#[tokio::test]
async fn patrons_cannot_touch_each_others_requests() {
  let f = fixture().await;
  let id = f.store.create_request(&f.patron, book("Lavinia")).await.unwrap().request_id;

  let err = f.store.cancel_request(&f.other, id).await.unwrap_err();
  assert!(matches!(err, Error::RequestNotFound(got) if got == id));
  let err = f.store.request_status(&f.other, id).await.unwrap_err();
  assert!(matches!(err, Error::RequestNotFound(_)));

  // Staff may cancel on the patron's behalf.
  f.store.cancel_request(&f.staff, id).await.unwrap();
}

#[tokio::test]
async fn repository_cancel_needs_confirmation() {
  let f = fixture().await;
  let repo = RequestRepository::new(Arc::new(f.store.clone()));
  let CreateOutcome::Created(id) = repo.create(&f.patron, book("Powers")).await.unwrap() else {
    panic!("expected a created request");
  };

  let mut confirm = CancelConfirm::default();
  let step = repo.cancel(&f.patron, &mut confirm, id).await.unwrap();
  assert_eq!(step, CancelStep::Armed(id));
  assert_eq!(repo.list_pending(&f.patron).await.unwrap().len(), 1);

  let step = repo.cancel(&f.patron, &mut confirm, id).await.unwrap();
  assert_eq!(step, CancelStep::Confirmed(id));
  assert!(repo.list_pending(&f.patron).await.unwrap().is_empty());
}

// ─── Staff operations ────────────────────────────────────────────────────────

#[tokio::test]
async fn staff_operations_need_a_staff_session() {
  let f = fixture().await;
  let id = f.store.create_request(&f.patron, book("Gifts")).await.unwrap().request_id;

  let err = f.store.retrieve_request(&f.patron, id).await.unwrap_err();
  assert!(matches!(err, Error::PermissionDenied(_)));
  let err = f.store.search_queue(&f.patron, &QueueFilter::default()).await.unwrap_err();
  assert!(matches!(err, Error::PermissionDenied(_)));
}

#[tokio::test]
async fn update_keeps_identity_fields() {
  let f = fixture().await;
  let id = f.store.create_request(&f.patron, book("Voices")).await.unwrap().request_id;
  let mut edited = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();
  let created = edited.create_date;

  edited.usr = 999;
  edited.create_date = Utc::now();
  edited.vendor = Some("Baker & Taylor".into());
  edited.claim(STAFF, Utc::now());
  let saved = f.store.update_request(&f.staff, edited).await.unwrap();

  assert_eq!(saved.usr, PATRON);
  assert_eq!(saved.create_date, created);
  let stored = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();
  assert_eq!(stored.vendor.as_deref(), Some("Baker & Taylor"));
  assert_eq!(stored.claimed_by, Some(STAFF));
}

#[tokio::test]
async fn update_refuses_broken_records() {
  let f = fixture().await;
  let id = f.store.create_request(&f.patron, book("Voices")).await.unwrap().request_id;
  let mut edited = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();
  edited.reject_date = Some(Utc::now());
  edited.complete_date = Some(Utc::now());

  let err = f.store.update_request(&f.staff, edited).await.unwrap_err();
  assert_eq!(conflict_code(&err), Some(ServiceEvent::INVARIANT_VIOLATION));
}

#[tokio::test]
async fn update_of_missing_request_is_not_found() {
  let f = fixture().await;
  let id = f.store.create_request(&f.patron, book("Voices")).await.unwrap().request_id;
  let mut ghost = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();
  ghost.id = 4242;
  let err = f.store.update_request(&f.staff, ghost).await.unwrap_err();
  assert!(matches!(err, Error::RequestNotFound(4242)));
}

#[tokio::test]
async fn update_from_an_outdated_copy_is_refused() {
  let f = fixture().await;
  let id = f.store.create_request(&f.patron, book("Voices")).await.unwrap().request_id;
  let mut stale = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();
  assert_eq!(stale.revision, 0);

  f.store.cancel_request(&f.patron, id).await.unwrap();

  stale.vendor = Some("Ingram".into());
  let err = f.store.update_request(&f.staff, stale).await.unwrap_err();
  assert_eq!(conflict_code(&err), Some(ServiceEvent::STALE_WRITE));

  let stored = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();
  assert!(stored.cancel_date.is_some());
  assert_eq!(stored.vendor, None);
  assert_eq!(stored.revision, 1);
}

#[tokio::test]
async fn each_update_advances_the_revision() {
  let f = fixture().await;
  let id = f.store.create_request(&f.patron, book("Voices")).await.unwrap().request_id;
  let mut req = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();

  req.vendor = Some("Ingram".into());
  let saved = f.store.update_request(&f.staff, req).await.unwrap();
  assert_eq!(saved.revision, 1);

  let mut again = saved.clone();
  again.vendor = Some("Baker & Taylor".into());
  let saved = f.store.update_request(&f.staff, again).await.unwrap();
  assert_eq!(saved.revision, 2);
  assert_eq!(f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap(), saved);
}

#[tokio::test]
async fn simultaneous_claims_leave_one_holder() {
  let f = fixture().await;
  let other_staff = f.store.issue_session(OTHER_STAFF, 1, true).await.unwrap();
  let id = f.store.create_request(&f.patron, book("Powers")).await.unwrap().request_id;

  let store = Arc::new(f.store.clone());
  let first = ClaimCoordinator::new(store.clone());
  let second = ClaimCoordinator::new(store);
  let ids = [id];
  let (a, b) = tokio::join!(
    first.claim(&f.staff, &ids, STAFF),
    second.claim(&other_staff, &ids, OTHER_STAFF),
  );

  assert!(a.failed.is_empty() && b.failed.is_empty());
  assert_eq!(a.updated.len() + b.updated.len(), 1);
  assert_eq!(a.untouched.len() + b.untouched.len(), 1);
  let winner = if a.updated.is_empty() { OTHER_STAFF } else { STAFF };
  let stored = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();
  assert_eq!(stored.claimed_by, Some(winner));
}

#[tokio::test]
async fn queue_filters_by_state_route_and_claim() {
  let f = fixture().await;
  let a = f.store.create_request(&f.patron, book("A")).await.unwrap().request_id;
  let b = f.store.create_request(&f.patron, book("B")).await.unwrap().request_id;
  let c = f.store.create_request(&f.other, book("C")).await.unwrap().request_id;
  f.store.cancel_request(&f.other, c).await.unwrap();

  let mut req_b = f.store.retrieve_request(&f.staff, b).await.unwrap().unwrap();
  req_b.route_to = Some(RouteTo::Ill);
  req_b.claim(STAFF, Utc::now());
  f.store.update_request(&f.staff, req_b).await.unwrap();

  let ids = |rows: Vec<Request>| rows.iter().map(|r| r.id).collect::<Vec<_>>();

  let default = f.store.search_queue(&f.staff, &QueueFilter::default()).await.unwrap();
  assert_eq!(ids(default), vec![a, b]);

  let canceled_too = QueueFilter { show_canceled: true, ..QueueFilter::default() };
  assert_eq!(ids(f.store.search_queue(&f.staff, &canceled_too).await.unwrap()), vec![a, b, c]);

  let ill_only = QueueFilter { route_acq: false, route_none: false, ..QueueFilter::default() };
  assert_eq!(ids(f.store.search_queue(&f.staff, &ill_only).await.unwrap()), vec![b]);

  let mine = QueueFilter { claimed_by_me: true, ..QueueFilter::default() };
  assert_eq!(ids(f.store.search_queue(&f.staff, &mine).await.unwrap()), vec![b]);
}

#[tokio::test]
async fn lineitems_apply_only_to_active_purchase_requests() {
  let f = fixture().await;
  let acq = f.store.create_request(&f.patron, book("A")).await.unwrap().request_id;
  let ill = f.store.create_request(&f.patron, book("B")).await.unwrap().request_id;

  let mut req = f.store.retrieve_request(&f.staff, ill).await.unwrap().unwrap();
  req.route_to = Some(RouteTo::Ill);
  f.store.update_request(&f.staff, req).await.unwrap();

  let applied = f.store.apply_lineitem(&f.staff, acq, 55).await.unwrap();
  assert_eq!(applied.lineitem, Some(55));

  let err = f.store.apply_lineitem(&f.staff, ill, 56).await.unwrap_err();
  assert_eq!(conflict_code(&err), Some(ServiceEvent::LINEITEM_NOT_APPLICABLE));

  f.store.cancel_request(&f.patron, acq).await.unwrap();
  let err = f.store.apply_lineitem(&f.staff, acq, 57).await.unwrap_err();
  assert_eq!(conflict_code(&err), Some(ServiceEvent::LINEITEM_NOT_APPLICABLE));
}

// ─── Routing and status ──────────────────────────────────────────────────────

#[tokio::test]
async fn route_rule_follows_format_and_age() {
  let f = fixture().await;
  let id = f.store.create_request(&f.patron, book("Recent")).await.unwrap().request_id;
  let mut req = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();

  req.pubdate = Some("1969".into());
  assert_eq!(f.store.get_route_to(&f.staff, &req).await.unwrap(), RouteTo::Ill);

  req.ill_opt_out = true;
  assert_eq!(f.store.get_route_to(&f.staff, &req).await.unwrap(), RouteTo::Acq);

  req.ill_opt_out = false;
  req.pubdate = Some(Utc::now().format("%Y").to_string());
  assert_eq!(f.store.get_route_to(&f.staff, &req).await.unwrap(), RouteTo::Acq);

  req.format = "article".into();
  assert_eq!(f.store.get_route_to(&f.staff, &req).await.unwrap(), RouteTo::Ill);
}

#[tokio::test]
async fn status_follows_staff_transitions() {
  let f = fixture().await;
  let store = Arc::new(f.store.clone());
  let repo = RequestRepository::new(store.clone());
  let resolver = RoutingResolver::new(repo.clone());

  let input = NewRequest { pubdate: Some("1970".into()), ..book("The Lathe of Heaven") };
  let id = f.store.create_request(&f.patron, input).await.unwrap().request_id;

  let saved = repo.retrieve(&f.staff, id).await.unwrap();
  let options = SaveOptions { claim_as: Some(STAFF) };
  let routed = resolver.save(&f.staff, &saved, saved.clone(), options).await.unwrap();
  assert_eq!(routed.route_to, Some(RouteTo::Ill));
  assert_eq!(routed.claimed_by, Some(STAFF));
  assert_eq!(repo.status(&f.patron, id).await.unwrap(), Some(RequestStatus::IllReview));

  let reason = Some("no lender".to_owned());
  repo.transition(&f.staff, id, Transition::Reject { reason }, STAFF).await.unwrap();
  assert_eq!(repo.status(&f.patron, id).await.unwrap(), Some(RequestStatus::IllFailed));

  repo.transition(&f.staff, id, Transition::Complete, STAFF).await.unwrap();
  assert_eq!(repo.status(&f.patron, id).await.unwrap(), Some(RequestStatus::Completed));
}

#[tokio::test]
async fn save_applies_changed_lineitem_separately() {
  let f = fixture().await;
  let store = Arc::new(f.store.clone());
  let resolver = RoutingResolver::from_service(store);

  let id = f.store.create_request(&f.patron, book("Changing Planes")).await.unwrap().request_id;
  let saved = f.store.retrieve_request(&f.staff, id).await.unwrap().unwrap();
  let mut edited = saved.clone();
  edited.lineitem = Some(31);

  let result = resolver.save(&f.staff, &saved, edited, SaveOptions::default()).await.unwrap();
  assert_eq!(result.route_to, Some(RouteTo::Acq));
  assert_eq!(result.lineitem, Some(31));
}

// ─── Settings and lookups ────────────────────────────────────────────────────

#[tokio::test]
async fn patron_settings_round_trip() {
  let f = fixture().await;
  let name = "opac.default_pickup_location";
  assert!(f.store.patron_setting(&f.patron, name).await.unwrap().is_none());

  f.store.update_patron_setting(&f.patron, name, json!(3)).await.unwrap();
  f.store.update_patron_setting(&f.patron, name, json!(2)).await.unwrap();
  assert_eq!(f.store.patron_setting(&f.patron, name).await.unwrap(), Some(json!(2)));
  assert!(f.store.patron_setting(&f.other, name).await.unwrap().is_none());
}

#[tokio::test]
async fn org_units_and_org_settings_are_listed() {
  let f = fixture().await;
  let units = f.store.org_units().await.unwrap();
  assert_eq!(units.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2, 3]);

  let name = "opac.holds.org_unit_not_pickup_lib";
  f.store.put_org_setting(3, name, &json!(true)).await.unwrap();
  let values = f.store.org_setting_for_all(name).await.unwrap();
  assert_eq!(values.len(), 1);
  assert_eq!(values[0].org_unit, 3);
  assert_eq!(values[0].summary.value, Some(json!(true)));
}

#[tokio::test]
async fn record_search_matches_identifier() {
  let f = fixture().await;
  let record = RecordSuggestion {
    id:        501,
    source:    RecordSource::Local,
    title:     "A Wizard of Earthsea".into(),
    author:    Some("Ursula K. Le Guin".into()),
    pubdate:   Some("1968".into()),
    publisher: None,
  };
  f.store.put_bib_record("9780547773742", &record).await.unwrap();

  let found = f.store.record_search(&f.patron, " 9780547773742 ").await.unwrap();
  assert_eq!(found, vec![record]);
  assert!(f.store.record_search(&f.patron, "0000000000").await.unwrap().is_empty());
  assert!(f.store.record_search(&f.patron, "  ").await.unwrap().is_empty());
}
