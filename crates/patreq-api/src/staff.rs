//! Handlers for staff-only `/staff` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/staff/queue` | Body: [`QueueFilter`]; matching requests |
//! | `GET`  | `/staff/requests/:id` | 404 if not found |
//! | `PUT`  | `/staff/requests/:id` | Body: full request; returns the stored record; 409 when `revision` is outdated |
//! | `POST` | `/staff/requests/:id/lineitem` | Body: `{"lineitem": <id>}` |
//!
//! Non-staff sessions get 403 from the service.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use patreq_core::{
  queue::QueueFilter,
  request::{LineitemId, Request, RequestId},
  service::RequestService,
};
use serde::Deserialize;

use crate::{
  auth::BearerToken,
  error::{ApiError, service},
};

/// `POST /staff/queue`
pub async fn queue<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Json(filter): Json<QueueFilter>,
) -> Result<Json<Vec<Request>>, ApiError> {
  Ok(Json(service(svc.search_queue(&token, &filter).await)?))
}

/// `GET /staff/requests/:id`
pub async fn get_one<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Path(id): Path<RequestId>,
) -> Result<Json<Request>, ApiError> {
  service(svc.retrieve_request(&token, id).await)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("request {id}")))
}

/// `PUT /staff/requests/:id`
pub async fn update<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Path(id): Path<RequestId>,
  Json(request): Json<Request>,
) -> Result<Json<Request>, ApiError> {
  if request.id != id {
    return Err(ApiError::BadRequest(format!(
      "body id {} does not match path id {id}",
      request.id
    )));
  }
  Ok(Json(service(svc.update_request(&token, request).await)?))
}

#[derive(Debug, Deserialize)]
pub struct LineitemBody {
  pub lineitem: LineitemId,
}

/// `POST /staff/requests/:id/lineitem`
pub async fn apply_lineitem<S: RequestService>(
  State(svc): State<Arc<S>>,
  BearerToken(token): BearerToken,
  Path(id): Path<RequestId>,
  Json(body): Json<LineitemBody>,
) -> Result<Json<Request>, ApiError> {
  Ok(Json(service(svc.apply_lineitem(&token, id, body.lineitem).await)?))
}
