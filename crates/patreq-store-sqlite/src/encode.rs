//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with microseconds, routes
//! as their lowercase code, setting values as compact JSON, and flags as 0/1
//! integers.

use chrono::{DateTime, SecondsFormat, Utc};
use patreq_core::{
  request::{Request, RouteTo},
  service::{OrgSettingValue, RecordSource, RecordSuggestion, SettingSummary},
};
use serde_json::Value;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width so that text ordering matches time ordering.
pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── RouteTo ─────────────────────────────────────────────────────────────────

pub fn encode_route(r: RouteTo) -> String { r.to_string() }

pub fn decode_route(s: &str) -> Result<RouteTo> {
  s.parse().map_err(|_| Error::Decode(format!("route_to {s:?}")))
}

// ─── Setting values ──────────────────────────────────────────────────────────

pub fn encode_value(v: &Value) -> Result<String> { Ok(serde_json::to_string(v)?) }

pub fn decode_value(s: &str) -> Result<Value> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list shared by every query that reads whole request rows, in the
/// order [`read_raw_request`] expects.
pub const REQUEST_COLUMNS: &str = "id, usr, requestor, title, author, identifier, format, \
   publisher, pubdate, language, notes, pickup_lib, email, phone, ill_opt_out, id_matched, \
   create_date, claim_date, claimed_by, reject_date, rejected_by, reject_reason, \
   complete_date, cancel_date, route_to, lineitem, illno, vendor, staff_notes, patron_notes, \
   revision";

/// Raw values read directly from a `requests` row.
pub struct RawRequest {
  pub id:            i64,
  pub usr:           i64,
  pub requestor:     i64,
  pub title:         String,
  pub author:        Option<String>,
  pub identifier:    Option<String>,
  pub format:        String,
  pub publisher:     Option<String>,
  pub pubdate:       Option<String>,
  pub language:      Option<String>,
  pub notes:         Option<String>,
  pub pickup_lib:    Option<i64>,
  pub email:         Option<String>,
  pub phone:         Option<String>,
  pub ill_opt_out:   bool,
  pub id_matched:    bool,
  pub create_date:   String,
  pub claim_date:    Option<String>,
  pub claimed_by:    Option<i64>,
  pub reject_date:   Option<String>,
  pub rejected_by:   Option<i64>,
  pub reject_reason: Option<String>,
  pub complete_date: Option<String>,
  pub cancel_date:   Option<String>,
  pub route_to:      Option<String>,
  pub lineitem:      Option<i64>,
  pub illno:         Option<String>,
  pub vendor:        Option<String>,
  pub staff_notes:   Option<String>,
  pub patron_notes:  Option<String>,
  pub revision:      i64,
}

pub fn read_raw_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRequest> {
  Ok(RawRequest {
    id:            row.get(0)?,
    usr:           row.get(1)?,
    requestor:     row.get(2)?,
    title:         row.get(3)?,
    author:        row.get(4)?,
    identifier:    row.get(5)?,
    format:        row.get(6)?,
    publisher:     row.get(7)?,
    pubdate:       row.get(8)?,
    language:      row.get(9)?,
    notes:         row.get(10)?,
    pickup_lib:    row.get(11)?,
    email:         row.get(12)?,
    phone:         row.get(13)?,
    ill_opt_out:   row.get(14)?,
    id_matched:    row.get(15)?,
    create_date:   row.get(16)?,
    claim_date:    row.get(17)?,
    claimed_by:    row.get(18)?,
    reject_date:   row.get(19)?,
    rejected_by:   row.get(20)?,
    reject_reason: row.get(21)?,
    complete_date: row.get(22)?,
    cancel_date:   row.get(23)?,
    route_to:      row.get(24)?,
    lineitem:      row.get(25)?,
    illno:         row.get(26)?,
    vendor:        row.get(27)?,
    staff_notes:   row.get(28)?,
    patron_notes:  row.get(29)?,
    revision:      row.get(30)?,
  })
}

impl RawRequest {
  pub fn into_request(self) -> Result<Request> {
    Ok(Request {
      id:            self.id,
      usr:           self.usr,
      requestor:     self.requestor,
      title:         self.title,
      author:        self.author,
      identifier:    self.identifier,
      format:        self.format,
      publisher:     self.publisher,
      pubdate:       self.pubdate,
      language:      self.language,
      notes:         self.notes,
      pickup_lib:    self.pickup_lib,
      email:         self.email,
      phone:         self.phone,
      ill_opt_out:   self.ill_opt_out,
      id_matched:    self.id_matched,
      create_date:   decode_dt(&self.create_date)?,
      claim_date:    decode_opt_dt(self.claim_date)?,
      claimed_by:    self.claimed_by,
      reject_date:   decode_opt_dt(self.reject_date)?,
      rejected_by:   self.rejected_by,
      reject_reason: self.reject_reason,
      complete_date: decode_opt_dt(self.complete_date)?,
      cancel_date:   decode_opt_dt(self.cancel_date)?,
      route_to:      self.route_to.as_deref().map(decode_route).transpose()?,
      lineitem:      self.lineitem,
      illno:         self.illno,
      vendor:        self.vendor,
      staff_notes:   self.staff_notes,
      patron_notes:  self.patron_notes,
      revision:      self.revision,
    })
  }
}

/// Raw values from a `bib_records` row.
pub struct RawSuggestion {
  pub id:        i64,
  pub source:    String,
  pub title:     String,
  pub author:    Option<String>,
  pub pubdate:   Option<String>,
  pub publisher: Option<String>,
}

impl RawSuggestion {
  pub fn into_suggestion(self) -> Result<RecordSuggestion> {
    let source = match self.source.as_str() {
      "local" => RecordSource::Local,
      "external" => RecordSource::External,
      other => return Err(Error::Decode(format!("record source {other:?}"))),
    };
    Ok(RecordSuggestion {
      id: self.id,
      source,
      title: self.title,
      author: self.author,
      pubdate: self.pubdate,
      publisher: self.publisher,
    })
  }
}

pub fn decode_org_setting(org_unit: i64, value_json: &str) -> Result<OrgSettingValue> {
  Ok(OrgSettingValue {
    org_unit,
    summary: SettingSummary { value: Some(decode_value(value_json)?) },
  })
}
