//! The request record, the central entity of the subsystem.
//!
//! A request is created once by a patron (or by staff on a patron's behalf)
//! and then mutated by triage. It is never deleted; terminal requests are
//! retained for audit and excluded only from default listings. Its status is
//! never stored: see [`crate::status`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::{Validate, ValidationError};

pub type RequestId = i64;
pub type UserId = i64;
pub type OrgId = i64;
pub type LineitemId = i64;

/// Format code for journal articles; articles are never matched against the
/// catalogue by identifier.
pub const FORMAT_ARTICLE: &str = "article";

/// Combined e-book / e-audio format, which cannot be requested.
pub const FORMAT_EBOOK_EAUDIO: &str = "ebook-eaudio";

// ─── Routing track ───────────────────────────────────────────────────────────

/// The triage track that owns a request.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RouteTo {
  /// Acquisitions: the library considers buying the item.
  Acq,
  /// Interlibrary loan: the item is borrowed from another library.
  Ill,
}

// ─── Request ─────────────────────────────────────────────────────────────────

/// A patron item request as stored by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
  pub id:            RequestId,
  /// The patron the request is placed for.
  pub usr:           UserId,
  /// Who submitted it; differs from `usr` for staff-mediated requests.
  pub requestor:     UserId,

  // ── Bibliographic description (patron supplied) ──
  pub title:         String,
  pub author:        Option<String>,
  pub identifier:    Option<String>,
  pub format:        String,
  pub publisher:     Option<String>,
  pub pubdate:       Option<String>,
  pub language:      Option<String>,
  pub notes:         Option<String>,

  // ── Patron preferences ──
  pub pickup_lib:    Option<OrgId>,
  pub email:         Option<String>,
  pub phone:         Option<String>,
  #[serde(default)]
  pub ill_opt_out:   bool,
  #[serde(default)]
  pub id_matched:    bool,

  // ── Lifecycle ──
  /// Set once by the service at creation.
  pub create_date:   DateTime<Utc>,
  pub claim_date:    Option<DateTime<Utc>>,
  pub claimed_by:    Option<UserId>,
  pub reject_date:   Option<DateTime<Utc>>,
  pub rejected_by:   Option<UserId>,
  pub reject_reason: Option<String>,
  pub complete_date: Option<DateTime<Utc>>,
  pub cancel_date:   Option<DateTime<Utc>>,

  // ── Triage metadata ──
  pub route_to:      Option<RouteTo>,
  pub lineitem:      Option<LineitemId>,
  pub illno:         Option<String>,
  pub vendor:        Option<String>,
  pub staff_notes:   Option<String>,
  pub patron_notes:  Option<String>,

  /// Bumped by the service on every write. A staff update must carry the
  /// revision it was read at.
  #[serde(default)]
  pub revision:      i64,
}

/// Which terminal or in-progress state a staff member sees for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StaffState {
  Pending,
  Processing,
  Complete,
  Canceled,
  Rejected,
}

/// A staff-driven lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Transition {
  Complete,
  Reject { reason: Option<String> },
  /// Return a terminal request to the active pipeline.
  Reactivate,
}

impl Request {
  pub fn is_canceled(&self) -> bool { self.cancel_date.is_some() }

  /// Canceled, rejected or completed.
  pub fn is_terminal(&self) -> bool {
    self.cancel_date.is_some()
      || self.reject_date.is_some()
      || self.complete_date.is_some()
  }

  /// Counts towards the patron's active-request quota.
  pub fn is_active(&self) -> bool { !self.is_terminal() }

  pub fn is_claimed(&self) -> bool { self.claimed_by.is_some() }

  pub fn staff_state(&self) -> StaffState {
    if self.cancel_date.is_some() {
      StaffState::Canceled
    } else if self.reject_date.is_some() {
      StaffState::Rejected
    } else if self.complete_date.is_some() {
      StaffState::Complete
    } else if self.claim_date.is_some() {
      StaffState::Processing
    } else {
      StaffState::Pending
    }
  }

  // ── Claim pair ─────────────────────────────────────────────────────────

  pub fn claim(&mut self, staff: UserId, at: DateTime<Utc>) {
    self.claimed_by = Some(staff);
    self.claim_date = Some(at);
  }

  pub fn unclaim(&mut self) {
    self.claimed_by = None;
    self.claim_date = None;
  }

  // ── Terminal transitions ───────────────────────────────────────────────

  /// Mark fulfilled. Clears any rejection (and its satellite fields) and any
  /// cancellation.
  pub fn mark_complete(&mut self, at: DateTime<Utc>) {
    self.cancel_date = None;
    self.clear_rejection();
    self.complete_date = Some(at);
  }

  /// Mark rejected by `staff`. Clears completion and cancellation.
  pub fn mark_rejected(
    &mut self,
    staff: UserId,
    reason: Option<String>,
    at: DateTime<Utc>,
  ) {
    self.cancel_date = None;
    self.complete_date = None;
    self.reject_date = Some(at);
    self.rejected_by = Some(staff);
    self.reject_reason = reason;
  }

  pub fn reactivate(&mut self) {
    self.cancel_date = None;
    self.complete_date = None;
    self.clear_rejection();
  }

  pub fn apply(&mut self, transition: Transition, staff: UserId, at: DateTime<Utc>) {
    match transition {
      Transition::Complete => self.mark_complete(at),
      Transition::Reject { reason } => self.mark_rejected(staff, reason, at),
      Transition::Reactivate => self.reactivate(),
    }
  }

  fn clear_rejection(&mut self) {
    self.reject_date = None;
    self.rejected_by = None;
    self.reject_reason = None;
  }

  // ── Notes ──────────────────────────────────────────────────────────────

  pub fn append_staff_note(&mut self, note: &str) {
    append_line(&mut self.staff_notes, note);
  }

  pub fn append_patron_note(&mut self, note: &str) {
    append_line(&mut self.patron_notes, note);
  }

  /// Describe the first broken record invariant, if any.
  pub fn invariant_violation(&self) -> Option<&'static str> {
    if self.reject_date.is_some() && self.complete_date.is_some() {
      return Some("reject_date and complete_date are both set");
    }
    if self.claimed_by.is_some() != self.claim_date.is_some() {
      return Some("claimed_by and claim_date must be set and cleared together");
    }
    if self.reject_date.is_none()
      && (self.rejected_by.is_some() || self.reject_reason.is_some())
    {
      return Some("rejected_by / reject_reason set without reject_date");
    }
    None
  }
}

fn append_line(field: &mut Option<String>, line: &str) {
  match field {
    Some(existing) if !existing.is_empty() => {
      existing.push('\n');
      existing.push_str(line);
    }
    _ => *field = Some(line.to_owned()),
  }
}

// ─── NewRequest ──────────────────────────────────────────────────────────────

/// Input to [`crate::service::RequestService::create_request`].
///
/// Validated locally before any remote call; see [`NewRequest::normalized`]
/// for the handling of blank form values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewRequest {
  #[validate(length(min = 1, max = 256))]
  pub title:       String,
  #[validate(length(max = 256))]
  pub author:      Option<String>,
  #[validate(length(max = 256))]
  pub identifier:  Option<String>,
  #[validate(length(min = 1, max = 64))]
  pub format:      String,
  #[validate(length(max = 256))]
  pub publisher:   Option<String>,
  #[validate(custom(function = "four_digit_year"))]
  pub pubdate:     Option<String>,
  #[validate(length(max = 256))]
  pub language:    Option<String>,
  #[validate(length(max = 256))]
  pub notes:       Option<String>,
  pub pickup_lib:  Option<OrgId>,
  #[validate(email)]
  pub email:       Option<String>,
  #[validate(custom(function = "phone_number"))]
  pub phone:       Option<String>,
  #[serde(default)]
  pub ill_opt_out: bool,
  #[serde(default)]
  pub id_matched:  bool,
  /// Staff-mediated requests name the patron; patrons leave this empty and
  /// the service uses the session user.
  pub usr:         Option<UserId>,
}

impl NewRequest {
  pub fn new(title: impl Into<String>, format: impl Into<String>) -> Self {
    Self { title: title.into(), format: format.into(), ..Self::default() }
  }

  /// Trim every text field and turn blank optional values into `None`.
  pub fn normalized(mut self) -> Self {
    self.title = self.title.trim().to_owned();
    self.format = self.format.trim().to_owned();
    for field in [
      &mut self.author,
      &mut self.identifier,
      &mut self.publisher,
      &mut self.pubdate,
      &mut self.language,
      &mut self.notes,
      &mut self.email,
      &mut self.phone,
    ] {
      *field = field
        .take()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty());
    }
    self
  }

  /// Key used to de-duplicate concurrent submissions of the same item.
  pub fn submit_key(&self) -> String {
    let item = self
      .identifier
      .as_deref()
      .unwrap_or(&self.title)
      .to_lowercase();
    match self.usr {
      Some(usr) => format!("{usr}:{item}"),
      None => item,
    }
  }
}

fn four_digit_year(value: &str) -> Result<(), ValidationError> {
  if value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit()) {
    Ok(())
  } else {
    Err(ValidationError::new("pubdate_year"))
  }
}

fn phone_number(value: &str) -> Result<(), ValidationError> {
  let allowed = value
    .chars()
    .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '+' | '.'));
  let digits = value.chars().filter(char::is_ascii_digit).count();
  if allowed && (7..=15).contains(&digits) {
    Ok(())
  } else {
    Err(ValidationError::new("phone_format"))
  }
}
