//! Handlers for patron-facing `/requests` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/requests` | Body: [`NewRequest`]; 201 + `{"request_id"}`; 409 on quota, duplicate or format |
//! | `GET`  | `/requests` | Pending requests with status; `?all=true` includes terminal ones |
//! | `GET`  | `/requests/allowed` | `true` when the session may create requests |
//! | `POST` | `/requests/dupes` | Body: [`DupeQuery`]; `true` when an active duplicate exists |
//! | `POST` | `/requests/route` | Body: a request snapshot; returns `"acq"` or `"ill"` |
//! | `GET`  | `/requests/:id/status` | `{"status": ...}`; status is `null` once canceled |
//! | `POST` | `/requests/:id/cancel` | 204; 409 when already terminal |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use patreq_core::{
  request::{NewRequest, Request, RequestId, RouteTo},
  service::{DupeQuery, RequestService, StatusReply},
  status::RequestWithStatus,
};
use serde::Deserialize;
use tracing::info;

use crate::{
  auth::BearerToken,
  error::{ApiError, service},
};

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /requests`
pub async fn create<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Json(body): Json<NewRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let created = service(svc.create_request(&token, body).await)?;
  info!(request_id = created.request_id, "request created via api");
  Ok((StatusCode::CREATED, Json(created)))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// Include canceled, rejected and completed requests.
  #[serde(default)]
  pub all: bool,
}

/// `GET /requests[?all=true]`
pub async fn list<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<RequestWithStatus>>, ApiError> {
  let rows = if params.all {
    service(svc.retrieve_all(&token).await)?
  } else {
    service(svc.retrieve_pending(&token).await)?
  };
  Ok(Json(rows))
}

// ─── Admission helpers ────────────────────────────────────────────────────────

/// `GET /requests/allowed`
pub async fn allowed<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
) -> Result<Json<bool>, ApiError> {
  Ok(Json(service(svc.create_allowed(&token).await)?))
}

/// `POST /requests/dupes`
pub async fn dupes<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Json(query): Json<DupeQuery>,
) -> Result<Json<bool>, ApiError> {
  Ok(Json(service(svc.dupes_search(&token, &query).await)?))
}

/// `POST /requests/route`
pub async fn route<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Json(request): Json<Request>,
) -> Result<Json<RouteTo>, ApiError> {
  Ok(Json(service(svc.get_route_to(&token, &request).await)?))
}

// ─── Single request ───────────────────────────────────────────────────────────

/// `GET /requests/:id/status`
pub async fn status<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Path(id): Path<RequestId>,
) -> Result<Json<StatusReply>, ApiError> {
  Ok(Json(service(svc.request_status(&token, id).await)?))
}

/// `POST /requests/:id/cancel`
pub async fn cancel<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Path(id): Path<RequestId>,
) -> Result<StatusCode, ApiError> {
  service(svc.cancel_request(&token, id).await)?;
  Ok(StatusCode::NO_CONTENT)
}
