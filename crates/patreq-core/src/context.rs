//! Client context: the loaded session and cached org data.
//!
//! Components that need to react to login or logout subscribe to
//! [`SessionEvent`]s instead of polling the session.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::{RwLock, broadcast};
use tracing::info;

use crate::{
  error::Error,
  request::OrgId,
  service::{OrgUnit, RequestService, Session, remote, setting_bool, setting_i64},
};

pub const NOT_PICKUP_LIB_SETTING: &str = "opac.holds.org_unit_not_pickup_lib";
pub const DEFAULT_PICKUP_SETTING: &str = "opac.default_pickup_location";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
  Loaded(Session),
  Ended,
}

#[derive(Default)]
struct State {
  token:       Option<String>,
  session:     Option<Session>,
  org_units:   Option<Arc<Vec<OrgUnit>>>,
  pickup_libs: Option<Arc<Vec<OrgUnit>>>,
}

pub struct ClientContext<S> {
  service: Arc<S>,
  state:   RwLock<State>,
  events:  broadcast::Sender<SessionEvent>,
}

impl<S: RequestService> ClientContext<S> {
  pub fn new(service: Arc<S>) -> Self {
    let (events, _) = broadcast::channel(16);
    Self { service, state: RwLock::new(State::default()), events }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.events.subscribe() }

  /// Resolve `token` and make it the current session.
  pub async fn load_session(&self, token: &str) -> crate::Result<Session> {
    let session = remote("session.retrieve", self.service.session(token).await)?
      .ok_or(Error::Unauthorized)?;
    {
      let mut state = self.state.write().await;
      state.token = Some(token.to_owned());
      state.session = Some(session.clone());
    }
    info!(user = session.user_id, "session loaded");
    // No subscribers is fine.
    let _ = self.events.send(SessionEvent::Loaded(session.clone()));
    Ok(session)
  }

  pub async fn end_session(&self) {
    {
      let mut state = self.state.write().await;
      state.token = None;
      state.session = None;
    }
    let _ = self.events.send(SessionEvent::Ended);
  }

  pub async fn session(&self) -> Option<Session> { self.state.read().await.session.clone() }

  pub async fn token(&self) -> Option<String> { self.state.read().await.token.clone() }

  async fn require_token(&self) -> crate::Result<String> {
    self.token().await.ok_or(Error::Unauthorized)
  }

  /// Org units, fetched once and cached until [`Self::refresh_org_units`].
  pub async fn org_units(&self) -> crate::Result<Arc<Vec<OrgUnit>>> {
    if let Some(units) = self.state.read().await.org_units.clone() {
      return Ok(units);
    }
    let units = Arc::new(remote("org.units", self.service.org_units().await)?);
    self.state.write().await.org_units = Some(units.clone());
    Ok(units)
  }

  /// Org units a hold may be picked up at.
  pub async fn pickup_libs(&self) -> crate::Result<Arc<Vec<OrgUnit>>> {
    if let Some(libs) = self.state.read().await.pickup_libs.clone() {
      return Ok(libs);
    }
    let units = self.org_units().await?;
    let excluded: Vec<OrgId> = remote(
      "org.settings.value_for_all_orgs",
      self.service.org_setting_for_all(NOT_PICKUP_LIB_SETTING).await,
    )?
    .into_iter()
    .filter(|v| setting_bool(v.summary.value.as_ref()))
    .map(|v| v.org_unit)
    .collect();
    let libs: Vec<OrgUnit> =
      units.iter().filter(|u| !excluded.contains(&u.id)).cloned().collect();
    let libs = Arc::new(libs);
    self.state.write().await.pickup_libs = Some(libs.clone());
    Ok(libs)
  }

  /// Drop cached org data; the next read refetches.
  pub async fn refresh_org_units(&self) {
    let mut state = self.state.write().await;
    state.org_units = None;
    state.pickup_libs = None;
  }

  /// The patron's preferred pickup library, else their home library.
  pub async fn default_pickup_lib(&self) -> crate::Result<OrgId> {
    let token = self.require_token().await?;
    let home_ou = self.session().await.map(|s| s.home_ou).ok_or(Error::Unauthorized)?;
    let pref = remote(
      "patron.settings.retrieve",
      self.service.patron_setting(&token, DEFAULT_PICKUP_SETTING).await,
    )?;
    Ok(setting_i64(pref.as_ref()).filter(|&id| id > 0).unwrap_or(home_ou))
  }

  pub async fn set_default_pickup_lib(&self, org: OrgId) -> crate::Result<()> {
    let token = self.require_token().await?;
    remote(
      "patron.settings.update",
      self.service.update_patron_setting(&token, DEFAULT_PICKUP_SETTING, json!(org)).await,
    )
  }
}
