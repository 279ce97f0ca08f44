//! Plain-text rendering of requests, trails and batch outcomes.

use patreq_core::{
  admission::Blocker,
  batch::BatchReport,
  disposition::{Disposition, visible_trail},
  request::Request,
  status::RequestStatus,
};

/// One line for a patron's request list.
pub fn request_line(request: &Request, status: Option<RequestStatus>) -> String {
  let label = status.map_or("Canceled", RequestStatus::label);
  let author = request.author.as_deref().map(|a| format!(" / {a}")).unwrap_or_default();
  format!(
    "#{:<6} {:<10} {}{}  [{}]",
    request.id,
    request.create_date.format("%Y-%m-%d"),
    request.title,
    author,
    label
  )
}

/// One line for the staff queue.
pub fn queue_line(request: &Request) -> String {
  let route = request.route_to.map_or_else(|| "-".to_owned(), |r| r.to_string());
  let claimed = request.claimed_by.map_or_else(|| "-".to_owned(), |u| u.to_string());
  format!(
    "#{:<6} {:<10} {:<4} {:<10} claimed:{:<6} {} ({})",
    request.id,
    request.staff_state(),
    route,
    request.create_date.format("%Y-%m-%d"),
    claimed,
    request.title,
    request.format
  )
}

fn marker(disposition: Disposition) -> &'static str {
  match disposition {
    Disposition::Complete => "[x]",
    Disposition::Pending => "[ ]",
    Disposition::Rejected => "[!]",
    Disposition::Skipped => "[-]",
  }
}

/// The progress trail of `request`, one line per visible step.
pub fn trail_lines(request: &Request) -> Vec<String> {
  visible_trail(request)
    .into_iter()
    .map(|s| format!("{} {}", marker(s.disposition), s.step.label()))
    .collect()
}

pub fn blocker_message(blocker: &Blocker) -> String {
  match blocker {
    Blocker::NoSession => "not logged in".to_owned(),
    Blocker::NotPermitted => "this account may not place requests".to_owned(),
    Blocker::QuotaExceeded { active_count, max_count } => {
      format!("request limit reached ({active_count} of {max_count} active)")
    }
    Blocker::Duplicate { identifier: true } => {
      "an active request with this identifier already exists".to_owned()
    }
    Blocker::Duplicate { identifier: false } => {
      "an active request with this title already exists".to_owned()
    }
    Blocker::FormatIneligible => "this format cannot be requested".to_owned(),
    Blocker::LookupInFlight => "a lookup is still running".to_owned(),
    Blocker::HoldRedirect { record_id } => {
      format!("the library already owns this item; place a hold on record {record_id}")
    }
    Blocker::InvalidFields { fields } => format!("invalid fields: {}", fields.join(", ")),
  }
}

pub fn report_lines(report: &BatchReport) -> Vec<String> {
  let mut out: Vec<String> = report.updated.iter().map(|r| format!("updated #{}", r.id)).collect();
  out.extend(report.untouched.iter().map(|id| format!("unchanged #{id}")));
  out.extend(report.failed.iter().map(|(id, e)| format!("failed #{id}: {e}")));
  out
}
