//! JSON-over-HTTP API for the patron request service.
//!
//! Exposes an axum [`Router`] backed by any
//! [`patreq_core::service::RequestService`]. The session token travels as a
//! bearer token; TLS and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", patreq_api::api_router(store.clone()))
//! ```

pub mod auth;
pub mod error;
pub mod lookup;
pub mod requests;
pub mod staff;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use patreq_core::service::RequestService;

pub use error::ApiError;

/// Build a fully-materialised API router for `svc`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(svc: Arc<S>) -> Router<()>
where
  S: RequestService + 'static,
{
  Router::new()
    // Session and lookups
    .route("/session", get(lookup::session::<S>))
    .route("/settings/{name}", get(lookup::setting::<S>))
    .route("/org-settings/{name}", get(lookup::org_setting_for_all::<S>))
    .route("/org-units", get(lookup::org_units::<S>))
    .route(
      "/patron-settings/{name}",
      get(lookup::patron_setting::<S>).put(lookup::update_patron_setting::<S>),
    )
    .route("/records", get(lookup::records::<S>))
    // Patron requests
    .route("/requests", get(requests::list::<S>).post(requests::create::<S>))
    .route("/requests/allowed", get(requests::allowed::<S>))
    .route("/requests/dupes", post(requests::dupes::<S>))
    .route("/requests/route", post(requests::route::<S>))
    .route("/requests/{id}/status", get(requests::status::<S>))
    .route("/requests/{id}/cancel", post(requests::cancel::<S>))
    // Staff
    .route("/staff/queue", post(staff::queue::<S>))
    .route("/staff/requests/{id}", get(staff::get_one::<S>).put(staff::update::<S>))
    .route("/staff/requests/{id}/lineitem", post(staff::apply_lineitem::<S>))
    .with_state(svc)
}
