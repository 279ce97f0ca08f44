//! Session, settings, org unit and catalogue lookups.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/session` | The session for the bearer token, or `null` |
//! | `GET`  | `/settings/:name` | Token optional; `null` when unset |
//! | `GET`  | `/org-settings/:name` | Every org unit that sets the value |
//! | `GET`  | `/org-units` | |
//! | `GET`  | `/patron-settings/:name` | |
//! | `PUT`  | `/patron-settings/:name` | Body: any JSON value; 204 |
//! | `GET`  | `/records?identifier=` | Catalogue suggestions |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use patreq_core::service::{
  OrgSettingValue, OrgUnit, RecordSuggestion, RequestService, Session,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
  auth::{BearerToken, OptionalToken},
  error::{ApiError, service},
};

/// `GET /session`
pub async fn session<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
) -> Result<Json<Option<Session>>, ApiError> {
  Ok(Json(service(svc.session(&token).await)?))
}

/// `GET /settings/:name`
pub async fn setting<S: RequestService>(
  State(svc): State<Arc<S>>,
  OptionalToken(token): OptionalToken,
  Path(name): Path<String>,
) -> Result<Json<Option<Value>>, ApiError> {
  let token = token.unwrap_or_default();
  Ok(Json(service(svc.setting(&name, &token).await)?))
}

/// `GET /org-settings/:name`
pub async fn org_setting_for_all<S: RequestService>(
  State(svc): State<Arc<S>>,
  Path(name): Path<String>,
) -> Result<Json<Vec<OrgSettingValue>>, ApiError> {
  Ok(Json(service(svc.org_setting_for_all(&name).await)?))
}

/// `GET /org-units`
pub async fn org_units<S: RequestService>(
  State(svc): State<Arc<S>>,
) -> Result<Json<Vec<OrgUnit>>, ApiError> {
  Ok(Json(service(svc.org_units().await)?))
}

/// `GET /patron-settings/:name`
pub async fn patron_setting<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Path(name): Path<String>,
) -> Result<Json<Option<Value>>, ApiError> {
  Ok(Json(service(svc.patron_setting(&token, &name).await)?))
}

/// `PUT /patron-settings/:name`
pub async fn update_patron_setting<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Path(name): Path<String>,
  Json(value): Json<Value>,
) -> Result<StatusCode, ApiError> {
  service(svc.update_patron_setting(&token, &name, value).await)?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RecordParams {
  pub identifier: String,
}

/// `GET /records?identifier=<isbn|issn|...>`
pub async fn records<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Query(params): Query<RecordParams>,
) -> Result<Json<Vec<RecordSuggestion>>, ApiError> {
  Ok(Json(service(svc.record_search(&token, &params.identifier).await)?))
}
