//! Async HTTP client for the patreq JSON API.
//!
//! [`ApiClient`] implements [`RequestService`], so every engine component in
//! `patreq-core` runs unchanged against a remote server. HTTP failures are
//! mapped back into the core error taxonomy.

use std::time::Duration;

use anyhow::Context as _;
use patreq_core::{
  ServiceEvent,
  queue::QueueFilter,
  request::{LineitemId, NewRequest, Request, RequestId, RouteTo},
  service::{
    CreatedRequest, DupeQuery, OrgSettingValue, OrgUnit, RecordSuggestion, RequestService,
    Session, StatusReply,
  },
  status::RequestWithStatus,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use thiserror::Error;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ClientError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("server returned {status}: {message}")]
  Status { status: u16, message: String },

  #[error("request rejected: {message}")]
  Rejected { message: String, fields: Vec<String> },

  #[error("session missing or expired")]
  Unauthorized,

  #[error("permission denied: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("{0}")]
  Event(ServiceEvent),
}

impl From<ClientError> for patreq_core::Error {
  fn from(err: ClientError) -> Self {
    match err {
      ClientError::Rejected { message, fields } => Self::event(
        ServiceEvent::INVALID_INPUT,
        format!("{message} (fields: {})", fields.join(", ")),
      ),
      ClientError::Unauthorized => Self::Unauthorized,
      ClientError::Forbidden(what) => Self::Forbidden(what),
      ClientError::NotFound(what) => Self::NotFound(what),
      ClientError::Event(evt) => Self::Event(evt),
      other @ (ClientError::Http(_) | ClientError::Status { .. }) => Self::transport(other),
    }
  }
}

/// Error body written by the API.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  error:  String,
  code:   Option<String>,
  #[serde(default)]
  fields: Vec<String>,
}

fn error_for(status: StatusCode, body: ErrorBody) -> ClientError {
  match status {
    StatusCode::BAD_REQUEST => ClientError::Rejected { message: body.error, fields: body.fields },
    StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
    StatusCode::FORBIDDEN => ClientError::Forbidden(body.error),
    StatusCode::NOT_FOUND => ClientError::NotFound(body.error),
    StatusCode::CONFLICT => match body.code {
      Some(code) => ClientError::Event(ServiceEvent::new(code, body.error)),
      None => ClientError::Status { status: status.as_u16(), message: body.error },
    },
    other => ClientError::Status { status: other.as_u16(), message: body.error },
  }
}

async fn check(resp: Response) -> Result<Response, ClientError> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let body = resp.json::<ErrorBody>().await.unwrap_or_default();
  Err(error_for(status, body))
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// Connection settings for the patreq API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
}

/// Async HTTP client for the patreq JSON API. Clones share one connection
/// pool.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn get(&self, path: &str, token: &str) -> RequestBuilder {
    authed(self.client.get(self.url(path)), token)
  }

  fn post(&self, path: &str, token: &str) -> RequestBuilder {
    authed(self.client.post(self.url(path)), token)
  }

  fn put(&self, path: &str, token: &str) -> RequestBuilder {
    authed(self.client.put(self.url(path)), token)
  }
}

fn authed(req: RequestBuilder, token: &str) -> RequestBuilder {
  if token.is_empty() { req } else { req.bearer_auth(token) }
}

async fn fetch<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ClientError> {
  let resp = check(req.send().await?).await?;
  Ok(resp.json().await?)
}

async fn execute(req: RequestBuilder) -> Result<(), ClientError> {
  check(req.send().await?).await?;
  Ok(())
}

// ─── RequestService impl ──────────────────────────────────────────────────────

impl RequestService for ApiClient {
  type Error = ClientError;

  async fn session(&self, token: &str) -> Result<Option<Session>, ClientError> {
    match fetch(self.get("/session", token)).await {
      Err(ClientError::Unauthorized) => Ok(None),
      other => other,
    }
  }

  async fn create_request(
    &self,
    token: &str,
    input: NewRequest,
  ) -> Result<CreatedRequest, ClientError> {
    fetch(self.post("/requests", token).json(&input)).await
  }

  async fn retrieve_pending(&self, token: &str) -> Result<Vec<RequestWithStatus>, ClientError> {
    fetch(self.get("/requests", token)).await
  }

  async fn retrieve_all(&self, token: &str) -> Result<Vec<RequestWithStatus>, ClientError> {
    fetch(self.get("/requests", token).query(&[("all", "true")])).await
  }

  async fn cancel_request(&self, token: &str, id: RequestId) -> Result<(), ClientError> {
    execute(self.post(&format!("/requests/{id}/cancel"), token)).await
  }

  async fn create_allowed(&self, token: &str) -> Result<bool, ClientError> {
    fetch(self.get("/requests/allowed", token)).await
  }

  async fn dupes_search(&self, token: &str, query: &DupeQuery) -> Result<bool, ClientError> {
    fetch(self.post("/requests/dupes", token).json(query)).await
  }

  async fn record_search(
    &self,
    token: &str,
    identifier: &str,
  ) -> Result<Vec<RecordSuggestion>, ClientError> {
    fetch(self.get("/records", token).query(&[("identifier", identifier)])).await
  }

  async fn get_route_to(&self, token: &str, request: &Request) -> Result<RouteTo, ClientError> {
    fetch(self.post("/requests/route", token).json(request)).await
  }

  async fn request_status(&self, token: &str, id: RequestId) -> Result<StatusReply, ClientError> {
    fetch(self.get(&format!("/requests/{id}/status"), token)).await
  }

  async fn setting(&self, name: &str, token: &str) -> Result<Option<Value>, ClientError> {
    fetch(self.get(&format!("/settings/{name}"), token)).await
  }

  async fn org_setting_for_all(&self, name: &str) -> Result<Vec<OrgSettingValue>, ClientError> {
    fetch(self.get(&format!("/org-settings/{name}"), "")).await
  }

  async fn org_units(&self) -> Result<Vec<OrgUnit>, ClientError> {
    fetch(self.get("/org-units", "")).await
  }

  async fn patron_setting(&self, token: &str, name: &str) -> Result<Option<Value>, ClientError> {
    fetch(self.get(&format!("/patron-settings/{name}"), token)).await
  }

  async fn update_patron_setting(
    &self,
    token: &str,
    name: &str,
    value: Value,
  ) -> Result<(), ClientError> {
    execute(self.put(&format!("/patron-settings/{name}"), token).json(&value)).await
  }

  async fn retrieve_request(
    &self,
    token: &str,
    id: RequestId,
  ) -> Result<Option<Request>, ClientError> {
    match fetch(self.get(&format!("/staff/requests/{id}"), token)).await {
      Err(ClientError::NotFound(_)) => Ok(None),
      other => other.map(Some),
    }
  }

  async fn update_request(&self, token: &str, request: Request) -> Result<Request, ClientError> {
    fetch(self.put(&format!("/staff/requests/{}", request.id), token).json(&request)).await
  }

  async fn search_queue(
    &self,
    token: &str,
    filter: &QueueFilter,
  ) -> Result<Vec<Request>, ClientError> {
    fetch(self.post("/staff/queue", token).json(filter)).await
  }

  async fn apply_lineitem(
    &self,
    token: &str,
    id: RequestId,
    lineitem: LineitemId,
  ) -> Result<Request, ClientError> {
    let body = json!({ "lineitem": lineitem });
    fetch(self.post(&format!("/staff/requests/{id}/lineitem"), token).json(&body)).await
  }
}
