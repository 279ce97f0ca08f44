//! Session token extraction.
//!
//! Clients send the opaque session token as `Authorization: Bearer <token>`.
//! The token is passed through to the service untouched; deciding whether it
//! is valid is the service's job.

use std::convert::Infallible;

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};

use crate::error::ApiError;

/// The caller's session token. Rejects with 401 when absent.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// The caller's session token, if any. Never rejects.
#[derive(Debug, Clone)]
pub struct OptionalToken(pub Option<String>);

fn bearer(headers: &HeaderMap) -> Option<String> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .map(str::to_owned)
}

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    bearer(&parts.headers).map(Self).ok_or(ApiError::Unauthorized)
  }
}

impl<S: Send + Sync> FromRequestParts<S> for OptionalToken {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    Ok(Self(bearer(&parts.headers)))
  }
}
