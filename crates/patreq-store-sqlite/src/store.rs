//! [`SqliteStore`], the SQLite implementation of [`RequestService`].

use std::{path::Path, sync::Arc};

use chrono::{Datelike, Utc};
use rusqlite::{Connection, OptionalExtension as _};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use patreq_core::{
  ServiceEvent,
  admission::{AdmissionConfig, MAX_ACTIVE_SETTING, QuotaCheck, effective_max},
  queue::QueueFilter,
  request::{LineitemId, NewRequest, OrgId, Request, RequestId, RouteTo, UserId},
  routing::{DEFAULT_ILL_MIN_AGE_YEARS, route_for},
  service::{
    CreatedRequest, DupeQuery, OrgSettingValue, OrgUnit, RecordSource, RecordSuggestion,
    RequestService, Session, StatusReply, setting_i64,
  },
  status::{RequestWithStatus, resolve},
};

use crate::{
  Error, Result,
  encode::{
    REQUEST_COLUMNS, RawRequest, RawSuggestion, decode_org_setting, decode_value, encode_dt,
    encode_route, encode_value, read_raw_request,
  },
  schema::SCHEMA,
};

/// Org trees deeper than this are treated as cyclic.
const MAX_ORG_DEPTH: usize = 32;

const ACTIVE: &str = "cancel_date IS NULL AND reject_date IS NULL AND complete_date IS NULL";

// ─── Options ─────────────────────────────────────────────────────────────────

/// Business-rule knobs of the service.
#[derive(Debug, Clone)]
pub struct StoreOptions {
  /// Items at least this many years old are routed to ILL.
  pub ill_min_age_years: i32,
  pub admission:         AdmissionConfig,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self {
      ill_min_age_years: DEFAULT_ILL_MIN_AGE_YEARS,
      admission:         AdmissionConfig::default(),
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A patron request store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  options: Arc<StoreOptions>,
}

/// A resolved session plus the user's request permission.
struct Principal {
  session:     Session,
  can_request: bool,
}

enum Refusal {
  Quota(QuotaCheck),
  Duplicate,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, options: Arc::new(options) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store with default options; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, options: Arc::new(StoreOptions::default()) };
    store.init_schema().await?;
    Ok(store)
  }

  pub fn options(&self) -> &StoreOptions { &self.options }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Administration ────────────────────────────────────────────────────────

  /// Create or update a user and issue a fresh opaque session token.
  pub async fn issue_session(&self, user_id: UserId, home_ou: OrgId, staff: bool) -> Result<String> {
    let token = Uuid::new_v4().simple().to_string();
    let tok = token.clone();
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO users (id, home_ou, staff) VALUES (?1, ?2, ?3)
           ON CONFLICT(id) DO UPDATE SET home_ou = excluded.home_ou, staff = excluded.staff",
          rusqlite::params![user_id, home_ou, staff],
        )?;
        tx.execute(
          "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![tok, user_id, now],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    info!(user_id, staff, "session issued");
    Ok(token)
  }

  pub async fn set_can_request(&self, user_id: UserId, allowed: bool) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE users SET can_request = ?2 WHERE id = ?1",
          rusqlite::params![user_id, allowed],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn put_setting(&self, name: &str, value: &Value) -> Result<()> {
    let name = name.to_owned();
    let json = encode_value(value)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO settings (name, value_json) VALUES (?1, ?2)
           ON CONFLICT(name) DO UPDATE SET value_json = excluded.value_json",
          rusqlite::params![name, json],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn put_org_unit(&self, unit: &OrgUnit) -> Result<()> {
    let unit = unit.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO org_units (id, parent, shortname, name) VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(id) DO UPDATE SET parent = excluded.parent,
             shortname = excluded.shortname, name = excluded.name",
          rusqlite::params![unit.id, unit.parent, unit.shortname, unit.name],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn put_org_setting(&self, org_unit: OrgId, name: &str, value: &Value) -> Result<()> {
    let name = name.to_owned();
    let json = encode_value(value)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO org_settings (org_unit, name, value_json) VALUES (?1, ?2, ?3)
           ON CONFLICT(org_unit, name) DO UPDATE SET value_json = excluded.value_json",
          rusqlite::params![org_unit, name, json],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn put_bib_record(&self, identifier: &str, record: &RecordSuggestion) -> Result<()> {
    let identifier = identifier.to_owned();
    let record = record.clone();
    let source = match record.source {
      RecordSource::Local => "local",
      RecordSource::External => "external",
    };
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO bib_records (id, source, identifier, title, author, pubdate, publisher)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            record.id,
            source,
            identifier,
            record.title,
            record.author,
            record.pubdate,
            record.publisher
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn lookup(&self, token: &str) -> Result<Option<Principal>> {
    let token = token.to_owned();
    let row = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT u.id, u.home_ou, u.staff, u.can_request
               FROM sessions s JOIN users u ON u.id = s.user_id
               WHERE s.token = ?1",
              rusqlite::params![token],
              |row| {
                Ok((
                  row.get::<_, i64>(0)?,
                  row.get::<_, i64>(1)?,
                  row.get::<_, bool>(2)?,
                  row.get::<_, bool>(3)?,
                ))
              },
            )
            .optional()?,
        )
      })
      .await?;
    Ok(row.map(|(user_id, home_ou, staff, can_request)| Principal {
      session: Session { user_id, home_ou, staff },
      can_request,
    }))
  }

  async fn principal(&self, token: &str) -> Result<Principal> {
    self.lookup(token).await?.ok_or(Error::NoSession)
  }

  async fn staff(&self, token: &str) -> Result<Session> {
    let who = self.principal(token).await?;
    if !who.session.staff {
      return Err(Error::PermissionDenied("staff session required"));
    }
    Ok(who.session)
  }

  async fn fetch(&self, id: RequestId) -> Result<Option<Request>> {
    let raw = self.conn.call(move |conn| Ok(fetch_raw(conn, id)?)).await?;
    raw.map(RawRequest::into_request).transpose()
  }

  /// Fetch a request the session may see: its own, or any for staff.
  async fn fetch_visible(&self, who: &Session, id: RequestId) -> Result<Request> {
    let request = self.fetch(id).await?.ok_or(Error::RequestNotFound(id))?;
    if request.usr != who.user_id && !who.staff {
      // Other patrons' requests are indistinguishable from missing ones.
      return Err(Error::RequestNotFound(id));
    }
    Ok(request)
  }

  async fn list_for(&self, usr: UserId, include_terminal: bool) -> Result<Vec<RequestWithStatus>> {
    let sql = if include_terminal {
      format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE usr = ?1 ORDER BY create_date, id")
    } else {
      format!(
        "SELECT {REQUEST_COLUMNS} FROM requests WHERE usr = ?1 AND {ACTIVE} \
         ORDER BY create_date, id"
      )
    };
    let raws: Vec<RawRequest> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![usr], read_raw_request)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws
      .into_iter()
      .map(|raw| raw.into_request().map(RequestWithStatus::new))
      .collect()
  }
}

// ─── Synchronous query helpers ───────────────────────────────────────────────

fn fetch_raw(conn: &Connection, id: RequestId) -> rusqlite::Result<Option<RawRequest>> {
  conn
    .query_row(
      &format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1"),
      rusqlite::params![id],
      read_raw_request,
    )
    .optional()
}

/// Raw JSON of a setting as seen from `org`: the nearest ancestor that sets
/// it wins, then the global default.
fn setting_json(
  conn: &Connection,
  org: Option<OrgId>,
  name: &str,
) -> rusqlite::Result<Option<String>> {
  let mut org = org;
  let mut depth = 0;
  while let Some(id) = org {
    let found: Option<String> = conn
      .query_row(
        "SELECT value_json FROM org_settings WHERE org_unit = ?1 AND name = ?2",
        rusqlite::params![id, name],
        |row| row.get(0),
      )
      .optional()?;
    if found.is_some() {
      return Ok(found);
    }
    depth += 1;
    if depth >= MAX_ORG_DEPTH {
      break;
    }
    org = conn
      .query_row(
        "SELECT parent FROM org_units WHERE id = ?1",
        rusqlite::params![id],
        |row| row.get::<_, Option<i64>>(0),
      )
      .optional()?
      .flatten();
  }
  conn
    .query_row(
      "SELECT value_json FROM settings WHERE name = ?1",
      rusqlite::params![name],
      |row| row.get(0),
    )
    .optional()
}

fn active_count(conn: &Connection, usr: UserId) -> rusqlite::Result<i64> {
  conn.query_row(
    &format!("SELECT COUNT(*) FROM requests WHERE usr = ?1 AND {ACTIVE}"),
    rusqlite::params![usr],
    |row| row.get(0),
  )
}

/// Whether `usr` has an active request of the same format matching the
/// identifier or the title. Case-insensitive; blank values match nothing.
fn dupe_exists(conn: &Connection, usr: UserId, query: &DupeQuery) -> rusqlite::Result<bool> {
  let non_blank = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned);
  conn.query_row(
    &format!(
      "SELECT EXISTS (SELECT 1 FROM requests WHERE usr = ?1 AND format = ?2 AND {ACTIVE} \
       AND (identifier = ?3 COLLATE NOCASE OR title = ?4 COLLATE NOCASE))"
    ),
    rusqlite::params![
      usr,
      query.format,
      non_blank(query.identifier.as_deref()),
      non_blank(query.title.as_deref()),
    ],
    |row| row.get(0),
  )
}

fn queue_sql(filter: &QueueFilter, me: UserId) -> (String, Vec<i64>) {
  let mut clauses: Vec<String> = Vec::new();
  let mut params = Vec::new();
  if !filter.show_canceled {
    clauses.push("cancel_date IS NULL".into());
  }
  if !filter.show_completed {
    clauses.push("complete_date IS NULL".into());
  }
  if !filter.show_rejected {
    clauses.push("reject_date IS NULL".into());
  }
  if filter.claimed_by_me {
    clauses.push("claimed_by = ?1".into());
    params.push(me);
  }
  let mut routes = Vec::new();
  if filter.route_ill {
    routes.push("route_to = 'ill'");
  }
  if filter.route_acq {
    routes.push("route_to = 'acq'");
  }
  if filter.route_none {
    routes.push("route_to IS NULL");
  }
  if !routes.is_empty() {
    clauses.push(format!("({})", routes.join(" OR ")));
  }
  let where_clause = if clauses.is_empty() {
    String::new()
  } else {
    format!(" WHERE {}", clauses.join(" AND "))
  };
  (
    format!("SELECT {REQUEST_COLUMNS} FROM requests{where_clause} ORDER BY create_date, id"),
    params,
  )
}

// ─── RequestService impl ─────────────────────────────────────────────────────

impl RequestService for SqliteStore {
  type Error = Error;

  // ── Session ───────────────────────────────────────────────────────────────

  async fn session(&self, token: &str) -> Result<Option<Session>> {
    Ok(self.lookup(token).await?.map(|p| p.session))
  }

  // ── Patron operations ─────────────────────────────────────────────────────

  async fn create_request(&self, token: &str, input: NewRequest) -> Result<CreatedRequest> {
    let who = self.principal(token).await?;
    let input = input.normalized();
    input.validate()?;

    let usr = match input.usr {
      Some(usr) if usr != who.session.user_id => {
        if !who.session.staff {
          return Err(Error::PermissionDenied("mediated requests require a staff session"));
        }
        usr
      }
      _ => {
        if !who.can_request {
          return Err(Error::PermissionDenied("request.create"));
        }
        who.session.user_id
      }
    };
    if !self.options.admission.is_format_eligible(&input.format) {
      return Err(Error::conflict(
        ServiceEvent::FORMAT_NOT_ELIGIBLE,
        format!("format {:?} cannot be requested", input.format),
      ));
    }

    let requestor = who.session.user_id;
    let home_ou = who.session.home_ou;
    let now = encode_dt(Utc::now());
    let query = DupeQuery {
      format:     input.format.clone(),
      title:      Some(input.title.clone()),
      identifier: input.identifier.clone(),
    };

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let configured = setting_json(&tx, Some(home_ou), MAX_ACTIVE_SETTING)?
          .and_then(|s| serde_json::from_str::<Value>(&s).ok());
        let max = effective_max(setting_i64(configured.as_ref()));
        let quota = QuotaCheck::new(active_count(&tx, usr)?, max);
        if !quota.allowed {
          return Ok(Err(Refusal::Quota(quota)));
        }
        if dupe_exists(&tx, usr, &query)? {
          return Ok(Err(Refusal::Duplicate));
        }

        tx.execute(
          "INSERT INTO requests (usr, requestor, title, author, identifier, format, publisher,
             pubdate, language, notes, pickup_lib, email, phone, ill_opt_out, id_matched,
             create_date)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
          rusqlite::params![
            usr,
            requestor,
            input.title,
            input.author,
            input.identifier,
            input.format,
            input.publisher,
            input.pubdate,
            input.language,
            input.notes,
            input.pickup_lib,
            input.email,
            input.phone,
            input.ill_opt_out,
            input.id_matched,
            now,
          ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Ok(id))
      })
      .await?;

    match outcome {
      Ok(request_id) => {
        info!(request_id, usr, requestor, "request created");
        Ok(CreatedRequest { request_id })
      }
      Err(Refusal::Quota(q)) => Err(Error::conflict(
        ServiceEvent::QUOTA_EXCEEDED,
        format!("{} of {} active requests", q.active_count, q.max_count),
      )),
      Err(Refusal::Duplicate) => Err(Error::conflict(
        ServiceEvent::DUPLICATE_REQUEST,
        "an active request for this item already exists",
      )),
    }
  }

  async fn retrieve_pending(&self, token: &str) -> Result<Vec<RequestWithStatus>> {
    let who = self.principal(token).await?;
    self.list_for(who.session.user_id, false).await
  }

  async fn retrieve_all(&self, token: &str) -> Result<Vec<RequestWithStatus>> {
    let who = self.principal(token).await?;
    self.list_for(who.session.user_id, true).await
  }

  async fn cancel_request(&self, token: &str, id: RequestId) -> Result<()> {
    let who = self.principal(token).await?;
    self.fetch_visible(&who.session, id).await?;

    let now = encode_dt(Utc::now());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          &format!("UPDATE requests SET cancel_date = ?2, revision = revision + 1 \
           WHERE id = ?1 AND {ACTIVE}"),
          rusqlite::params![id, now],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(Error::conflict(
        ServiceEvent::ALREADY_TERMINAL,
        format!("request {id} is already canceled, rejected or complete"),
      ));
    }
    info!(id, by = who.session.user_id, "request canceled");
    Ok(())
  }

  async fn create_allowed(&self, token: &str) -> Result<bool> {
    Ok(self.principal(token).await?.can_request)
  }

  async fn dupes_search(&self, token: &str, query: &DupeQuery) -> Result<bool> {
    let who = self.principal(token).await?;
    if !query.is_searchable() {
      return Ok(false);
    }
    let usr = who.session.user_id;
    let query = query.clone();
    Ok(self.conn.call(move |conn| Ok(dupe_exists(conn, usr, &query)?)).await?)
  }

  async fn record_search(&self, token: &str, identifier: &str) -> Result<Vec<RecordSuggestion>> {
    self.principal(token).await?;
    let identifier = identifier.trim().to_owned();
    if identifier.is_empty() {
      return Ok(Vec::new());
    }
    let raws: Vec<RawSuggestion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, source, title, author, pubdate, publisher FROM bib_records
           WHERE identifier = ?1 COLLATE NOCASE ORDER BY source DESC, id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![identifier], |row| {
            Ok(RawSuggestion {
              id:        row.get(0)?,
              source:    row.get(1)?,
              title:     row.get(2)?,
              author:    row.get(3)?,
              pubdate:   row.get(4)?,
              publisher: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSuggestion::into_suggestion).collect()
  }

  async fn get_route_to(&self, token: &str, request: &Request) -> Result<RouteTo> {
    self.principal(token).await?;
    let route = route_for(request, self.options.ill_min_age_years, Utc::now().year());
    debug!(id = request.id, %route, "route decided");
    Ok(route)
  }

  async fn request_status(&self, token: &str, id: RequestId) -> Result<StatusReply> {
    let who = self.principal(token).await?;
    let request = self.fetch_visible(&who.session, id).await?;
    Ok(StatusReply { status: resolve(&request) })
  }

  // ── Settings ──────────────────────────────────────────────────────────────

  async fn setting(&self, name: &str, token: &str) -> Result<Option<Value>> {
    let org = self.lookup(token).await?.map(|p| p.session.home_ou);
    let name = name.to_owned();
    let json = self.conn.call(move |conn| Ok(setting_json(conn, org, &name)?)).await?;
    json.as_deref().map(decode_value).transpose()
  }

  async fn org_setting_for_all(&self, name: &str) -> Result<Vec<OrgSettingValue>> {
    let name = name.to_owned();
    let rows: Vec<(i64, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT org_unit, value_json FROM org_settings WHERE name = ?1 ORDER BY org_unit",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![name], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    rows.iter().map(|(org, json)| decode_org_setting(*org, json)).collect()
  }

  async fn org_units(&self) -> Result<Vec<OrgUnit>> {
    Ok(
      self
        .conn
        .call(|conn| {
          let mut stmt =
            conn.prepare("SELECT id, parent, shortname, name FROM org_units ORDER BY id")?;
          let rows = stmt
            .query_map([], |row| {
              Ok(OrgUnit {
                id:        row.get(0)?,
                parent:    row.get(1)?,
                shortname: row.get(2)?,
                name:      row.get(3)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  async fn patron_setting(&self, token: &str, name: &str) -> Result<Option<Value>> {
    let usr = self.principal(token).await?.session.user_id;
    let name = name.to_owned();
    let json: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value_json FROM patron_settings WHERE user_id = ?1 AND name = ?2",
              rusqlite::params![usr, name],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    json.as_deref().map(decode_value).transpose()
  }

  async fn update_patron_setting(&self, token: &str, name: &str, value: Value) -> Result<()> {
    let usr = self.principal(token).await?.session.user_id;
    let name = name.to_owned();
    let json = encode_value(&value)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO patron_settings (user_id, name, value_json) VALUES (?1, ?2, ?3)
           ON CONFLICT(user_id, name) DO UPDATE SET value_json = excluded.value_json",
          rusqlite::params![usr, name, json],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Staff operations ──────────────────────────────────────────────────────

  async fn retrieve_request(&self, token: &str, id: RequestId) -> Result<Option<Request>> {
    self.staff(token).await?;
    self.fetch(id).await
  }

  async fn update_request(&self, token: &str, request: Request) -> Result<Request> {
    let staff = self.staff(token).await?;
    let existing = self.fetch(request.id).await?.ok_or(Error::RequestNotFound(request.id))?;

    let merged = Request {
      id: existing.id,
      usr: existing.usr,
      requestor: existing.requestor,
      create_date: existing.create_date,
      ..request
    };
    if let Some(why) = merged.invariant_violation() {
      return Err(Error::conflict(ServiceEvent::INVARIANT_VIOLATION, why));
    }

    let r = merged.clone();
    let read_at = r.revision;
    let dt = |d: Option<chrono::DateTime<Utc>>| d.map(encode_dt);
    let params = (
      dt(r.claim_date),
      dt(r.reject_date),
      dt(r.complete_date),
      dt(r.cancel_date),
      r.route_to.map(encode_route),
    );
    // Conditional on the revision the caller read: a write based on an
    // outdated copy changes nothing.
    let changed = self
      .conn
      .call(move |conn| {
        let (claim_date, reject_date, complete_date, cancel_date, route_to) = params;
        Ok(conn.execute(
          "UPDATE requests SET title = ?2, author = ?3, identifier = ?4, format = ?5,
             publisher = ?6, pubdate = ?7, language = ?8, notes = ?9, pickup_lib = ?10,
             email = ?11, phone = ?12, ill_opt_out = ?13, id_matched = ?14,
             claim_date = ?15, claimed_by = ?16, reject_date = ?17, rejected_by = ?18,
             reject_reason = ?19, complete_date = ?20, cancel_date = ?21, route_to = ?22,
             lineitem = ?23, illno = ?24, vendor = ?25, staff_notes = ?26, patron_notes = ?27,
             revision = revision + 1
           WHERE id = ?1 AND revision = ?28",
          rusqlite::params![
            r.id,
            r.title,
            r.author,
            r.identifier,
            r.format,
            r.publisher,
            r.pubdate,
            r.language,
            r.notes,
            r.pickup_lib,
            r.email,
            r.phone,
            r.ill_opt_out,
            r.id_matched,
            claim_date,
            r.claimed_by,
            reject_date,
            r.rejected_by,
            r.reject_reason,
            complete_date,
            cancel_date,
            route_to,
            r.lineitem,
            r.illno,
            r.vendor,
            r.staff_notes,
            r.patron_notes,
            read_at,
          ],
        )?)
      })
      .await?;
    if changed == 0 {
      warn!(id = merged.id, revision = read_at, "refusing stale request update");
      return Err(Error::conflict(
        ServiceEvent::STALE_WRITE,
        format!("request {} changed since revision {read_at}", merged.id),
      ));
    }
    debug!(id = merged.id, by = staff.user_id, "request updated");
    Ok(Request { revision: read_at + 1, ..merged })
  }

  async fn search_queue(&self, token: &str, filter: &QueueFilter) -> Result<Vec<Request>> {
    let me = self.staff(token).await?.user_id;
    let (sql, params) = queue_sql(filter, me);
    let raws: Vec<RawRequest> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), read_raw_request)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawRequest::into_request).collect()
  }

  async fn apply_lineitem(
    &self,
    token: &str,
    id: RequestId,
    lineitem: LineitemId,
  ) -> Result<Request> {
    let staff = self.staff(token).await?;
    let mut request = self.fetch(id).await?.ok_or(Error::RequestNotFound(id))?;
    if request.cancel_date.is_some() || request.reject_date.is_some() {
      return Err(Error::conflict(
        ServiceEvent::LINEITEM_NOT_APPLICABLE,
        format!("request {id} is no longer active"),
      ));
    }
    if request.route_to == Some(RouteTo::Ill) {
      return Err(Error::conflict(
        ServiceEvent::LINEITEM_NOT_APPLICABLE,
        format!("request {id} is routed to interlibrary loan"),
      ));
    }
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE requests SET lineitem = ?2, revision = revision + 1
           WHERE id = ?1 AND cancel_date IS NULL AND reject_date IS NULL",
          rusqlite::params![id, lineitem],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(Error::conflict(
        ServiceEvent::LINEITEM_NOT_APPLICABLE,
        format!("request {id} is no longer active"),
      ));
    }
    request.lineitem = Some(lineitem);
    request.revision += 1;
    info!(id, lineitem, by = staff.user_id, "line item applied");
    Ok(request)
  }
}
