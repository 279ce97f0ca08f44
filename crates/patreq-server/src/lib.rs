//! Assembly of the patron request server: configuration, store seeding and
//! the HTTP application.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::{Router, routing::get};
use patreq_core::{
  admission::AdmissionConfig,
  request::OrgId,
  routing::DEFAULT_ILL_MIN_AGE_YEARS,
  service::{OrgUnit, RequestService},
};
use patreq_store_sqlite::{SqliteStore, StoreOptions};
use serde::Deserialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::info;

// ─── Configuration ────────────────────────────────────────────────────────────

/// A global setting written into the store at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingSeed {
  pub name:  String,
  pub value: Value,
}

/// A per-org setting written into the store at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgSettingSeed {
  pub org_unit: OrgId,
  pub name:     String,
  pub value:    Value,
}

/// Runtime server configuration, deserialised from `config.toml` and
/// `PATREQ_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:              String,
  pub port:              u16,
  pub store_path:        PathBuf,
  pub ill_min_age_years: i32,
  pub admission:         AdmissionConfig,
  /// Org units listed parents first.
  pub org_units:         Vec<OrgUnit>,
  pub settings:          Vec<SettingSeed>,
  pub org_settings:      Vec<OrgSettingSeed>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:              "127.0.0.1".to_owned(),
      port:              8080,
      store_path:        PathBuf::from("~/.local/share/patreq/patreq.db"),
      ill_min_age_years: DEFAULT_ILL_MIN_AGE_YEARS,
      admission:         AdmissionConfig::default(),
      org_units:         Vec::new(),
      settings:          Vec::new(),
      org_settings:      Vec::new(),
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      ill_min_age_years: self.ill_min_age_years,
      admission:         self.admission.clone(),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Seeding ──────────────────────────────────────────────────────────────────

/// Write configured org units and settings into `store`. Existing values
/// with the same key are overwritten.
pub async fn seed(store: &SqliteStore, config: &ServerConfig) -> patreq_store_sqlite::Result<()> {
  for unit in &config.org_units {
    store.put_org_unit(unit).await?;
  }
  for seed in &config.settings {
    store.put_setting(&seed.name, &seed.value).await?;
  }
  for seed in &config.org_settings {
    store.put_org_setting(seed.org_unit, &seed.name, &seed.value).await?;
  }
  info!(
    org_units = config.org_units.len(),
    settings = config.settings.len(),
    org_settings = config.org_settings.len(),
    "store seeded"
  );
  Ok(())
}

// ─── Application ──────────────────────────────────────────────────────────────

/// The full HTTP application: the API under `/api`, a liveness probe, and
/// request tracing.
pub fn app<S>(svc: Arc<S>) -> Router
where
  S: RequestService + 'static,
{
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", patreq_api::api_router(svc))
    .layer(TraceLayer::new_for_http())
}
