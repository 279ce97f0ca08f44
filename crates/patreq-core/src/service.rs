//! The `RequestService` trait and the wire types of its operations.
//!
//! The trait is implemented by the backing service (`patreq-store-sqlite`)
//! and by remote clients (`patreq-cli`). Engine components in this crate
//! depend on the abstraction only.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  error::Error,
  queue::QueueFilter,
  request::{
    LineitemId, NewRequest, OrgId, Request, RequestId, RouteTo, UserId,
  },
  status::{RequestStatus, RequestWithStatus},
};

// ─── Wire types ──────────────────────────────────────────────────────────────

/// The authenticated user behind a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub user_id: UserId,
  pub home_ou: OrgId,
  /// Staff sessions may triage and edit any request.
  #[serde(default)]
  pub staff:   bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRequest {
  pub request_id: RequestId,
}

/// Arguments of the duplicate search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DupeQuery {
  pub format:     String,
  pub title:      Option<String>,
  pub identifier: Option<String>,
}

impl DupeQuery {
  /// A search is only meaningful with a format and a title or identifier.
  pub fn is_searchable(&self) -> bool {
    let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
    !self.format.is_empty() && (filled(&self.title) || filled(&self.identifier))
  }
}

/// Where a suggested bibliographic record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
  /// Held by this library; the patron should place a hold instead.
  Local,
  External,
}

/// A catalogue match for an identifier lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSuggestion {
  pub id:        i64,
  pub source:    RecordSource,
  pub title:     String,
  pub author:    Option<String>,
  pub pubdate:   Option<String>,
  pub publisher: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnit {
  pub id:        OrgId,
  pub parent:    Option<OrgId>,
  pub shortname: String,
  pub name:      String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingSummary {
  pub value: Option<Value>,
}

/// One org unit's value of an org-scoped setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgSettingValue {
  pub org_unit: OrgId,
  pub summary:  SettingSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
  pub status: Option<RequestStatus>,
}

/// Interpret a loosely-typed setting value as an integer.
///
/// Settings arrive as JSON; numeric strings are accepted.
pub fn setting_i64(value: Option<&Value>) -> Option<i64> {
  match value? {
    Value::Number(n) => n.as_i64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// Interpret a loosely-typed setting value as a flag.
pub fn setting_bool(value: Option<&Value>) -> bool {
  match value {
    Some(Value::Bool(b)) => *b,
    Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
    Some(Value::String(s)) => matches!(s.trim(), "1" | "t" | "true"),
    _ => false,
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the patron request service.
///
/// Every operation except the org-unit and org-setting lookups takes the
/// opaque session token. All methods return `Send` futures so the trait can
/// be used behind `axum`.
pub trait RequestService: Send + Sync {
  type Error: std::error::Error + Into<Error> + Send + Sync + 'static;

  // ── Session ───────────────────────────────────────────────────────────

  /// Resolve a token; `None` when unknown or expired.
  fn session<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + 'a;

  // ── Patron operations ─────────────────────────────────────────────────

  /// Create a request. Staff sessions may set `usr` to create on a
  /// patron's behalf.
  fn create_request<'a>(
    &'a self,
    token: &'a str,
    input: NewRequest,
  ) -> impl Future<Output = Result<CreatedRequest, Self::Error>> + Send + 'a;

  /// The session user's non-terminal requests.
  fn retrieve_pending<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<Vec<RequestWithStatus>, Self::Error>> + Send + 'a;

  /// Every request of the session user, terminal ones included.
  fn retrieve_all<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<Vec<RequestWithStatus>, Self::Error>> + Send + 'a;

  fn cancel_request<'a>(
    &'a self,
    token: &'a str,
    id: RequestId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Whether the session user holds the permission to create requests.
  fn create_allowed<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Whether an active request of the same format matches the identifier,
  /// or the title when no identifier is given.
  fn dupes_search<'a>(
    &'a self,
    token: &'a str,
    query: &'a DupeQuery,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn record_search<'a>(
    &'a self,
    token: &'a str,
    identifier: &'a str,
  ) -> impl Future<Output = Result<Vec<RecordSuggestion>, Self::Error>> + Send + 'a;

  /// Compute the triage track for a request snapshot. Nothing is stored.
  fn get_route_to<'a>(
    &'a self,
    token: &'a str,
    request: &'a Request,
  ) -> impl Future<Output = Result<RouteTo, Self::Error>> + Send + 'a;

  fn request_status<'a>(
    &'a self,
    token: &'a str,
    id: RequestId,
  ) -> impl Future<Output = Result<StatusReply, Self::Error>> + Send + 'a;

  // ── Settings ──────────────────────────────────────────────────────────

  /// A server setting as seen from the session's home org.
  fn setting<'a>(
    &'a self,
    name: &'a str,
    token: &'a str,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + 'a;

  fn org_setting_for_all<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Vec<OrgSettingValue>, Self::Error>> + Send + 'a;

  fn org_units(
    &self,
  ) -> impl Future<Output = Result<Vec<OrgUnit>, Self::Error>> + Send + '_;

  fn patron_setting<'a>(
    &'a self,
    token: &'a str,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + 'a;

  fn update_patron_setting<'a>(
    &'a self,
    token: &'a str,
    name: &'a str,
    value: Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Staff operations ──────────────────────────────────────────────────

  fn retrieve_request<'a>(
    &'a self,
    token: &'a str,
    id: RequestId,
  ) -> impl Future<Output = Result<Option<Request>, Self::Error>> + Send + 'a;

  /// Persist staff edits. Identity fields (`id`, `usr`, `requestor`,
  /// `create_date`) are never changed.
  fn update_request<'a>(
    &'a self,
    token: &'a str,
    request: Request,
  ) -> impl Future<Output = Result<Request, Self::Error>> + Send + 'a;

  fn search_queue<'a>(
    &'a self,
    token: &'a str,
    filter: &'a QueueFilter,
  ) -> impl Future<Output = Result<Vec<Request>, Self::Error>> + Send + 'a;

  /// Attach an acquisitions line item, which places the patron's hold.
  fn apply_lineitem<'a>(
    &'a self,
    token: &'a str,
    id: RequestId,
    lineitem: LineitemId,
  ) -> impl Future<Output = Result<Request, Self::Error>> + Send + 'a;
}

/// Convert a backend result into the core error, logging transport failures.
pub(crate) fn remote<T, E: Into<Error>>(op: &str, result: Result<T, E>) -> crate::Result<T> {
  result.map_err(|e| {
    let err = e.into();
    if err.is_transport() {
      tracing::error!(op, error = %err, "remote call failed");
    }
    err
  })
}
