//! Subcommand implementations, each driving a `patreq-core` engine component
//! over the HTTP client.

use std::{
  io::{self, BufRead, Write},
  sync::Arc,
};

use anyhow::{Context, Result, bail};
use patreq_core::{
  admission::{
    AdmissionConfig, AdmissionController, AdmissionState, HoldRedirect, IdentLookup,
    SubmitOutcome,
  },
  batch::{BatchEditor, BatchReport},
  cancel::{CancelConfirm, CancelStep},
  context::ClientContext,
  queue::{QueueFilter, QueueSort, RequestQueueView},
  repository::RequestRepository,
  request::{LineitemId, NewRequest, OrgId, Request, RequestId, RouteTo, Transition, UserId},
  routing::{RoutingResolver, SaveOptions},
  service::Session,
};
use tracing::debug;

use crate::{client::ApiClient, render};

/// A loaded session plus the engine components built on it.
pub struct Runner {
  svc:     Arc<ApiClient>,
  ctx:     ClientContext<ApiClient>,
  repo:    RequestRepository<ApiClient>,
  token:   String,
  session: Session,
}

/// Fields a staff member may change with `edit`.
#[derive(Debug, Default)]
pub struct Edits {
  pub title:    Option<String>,
  pub format:   Option<String>,
  pub pubdate:  Option<String>,
  pub route:    Option<RouteTo>,
  pub lineitem: Option<LineitemId>,
  pub illno:    Option<String>,
}

impl Runner {
  pub async fn connect(svc: ApiClient, token: String) -> Result<Self> {
    let svc = Arc::new(svc);
    let ctx = ClientContext::new(svc.clone());
    let session = ctx.load_session(&token).await.context("loading session")?;
    debug!(user = session.user_id, staff = session.staff, "connected");
    let repo = RequestRepository::new(svc.clone());
    Ok(Self { svc, ctx, repo, token, session })
  }

  fn staff_id(&self) -> Result<UserId> {
    if !self.session.staff {
      bail!("this command needs a staff session");
    }
    Ok(self.session.user_id)
  }

  // ── Patron commands ───────────────────────────────────────────────────────

  /// Evaluate admission for `draft`. A local catalogue match on the
  /// identifier redirects the patron to a hold.
  async fn admission(
    &self,
    draft: &NewRequest,
  ) -> Result<(AdmissionController<ApiClient>, AdmissionState)> {
    let admission = AdmissionController::new(self.svc.clone(), AdmissionConfig::default());
    let mut state = admission.evaluate(&self.token, draft).await?;
    if let Some(identifier) = draft.identifier.as_deref()
      && let IdentLookup::Suggestions(found) =
        admission.lookup_identifier(&self.token, identifier, &draft.format).await?
    {
      for record in &found {
        println!("match: #{} {} ({:?})", record.id, record.title, record.source);
      }
      state.hold_redirect = found.iter().find_map(HoldRedirect::for_record);
    }
    Ok((admission, state))
  }

  pub async fn check(&self, draft: NewRequest) -> Result<()> {
    let (_, state) = self.admission(&draft).await?;
    let blockers = state.blockers();
    if blockers.is_empty() {
      println!("ok: request can be submitted");
    }
    for blocker in &blockers {
      println!("blocked: {}", render::blocker_message(blocker));
    }
    Ok(())
  }

  pub async fn submit(&self, mut draft: NewRequest) -> Result<()> {
    if draft.pickup_lib.is_none() && draft.usr.is_none() {
      draft.pickup_lib = Some(self.ctx.default_pickup_lib().await?);
    }
    let (admission, state) = self.admission(&draft).await?;
    match admission.submit(&self.repo, &self.token, draft, &state).await? {
      SubmitOutcome::Created(id) => println!("created request #{id}"),
      SubmitOutcome::InFlight => println!("an identical request is already being submitted"),
      SubmitOutcome::Blocked(blockers) => {
        for blocker in &blockers {
          println!("blocked: {}", render::blocker_message(blocker));
        }
        bail!("request not submitted");
      }
    }
    Ok(())
  }

  pub async fn list(&self, all: bool) -> Result<()> {
    let rows = if all {
      self.repo.list_all(&self.token).await?
    } else {
      self.repo.list_pending(&self.token).await?
    };
    if rows.is_empty() {
      println!("no requests");
    }
    for row in &rows {
      println!("{}", render::request_line(&row.request, row.status));
    }
    Ok(())
  }

  /// Two-step cancel: the first press arms, the answer to the prompt
  /// confirms.
  pub async fn cancel(&self, id: RequestId, assume_yes: bool) -> Result<()> {
    let mut confirm = CancelConfirm::default();
    self.repo.cancel(&self.token, &mut confirm, id).await?;
    if !assume_yes && !confirm_prompt(&format!("Cancel request #{id}? [y/N] "))? {
      confirm.reset();
      println!("request #{id} left as is");
      return Ok(());
    }
    match self.repo.cancel(&self.token, &mut confirm, id).await? {
      CancelStep::Confirmed(id) => println!("request #{id} canceled"),
      CancelStep::Armed(id) => println!("cancel of #{id} still awaiting confirmation"),
    }
    Ok(())
  }

  pub async fn trail(&self, id: RequestId) -> Result<()> {
    let request = self.find(id).await?;
    println!("#{} {}", request.id, request.title);
    for line in render::trail_lines(&request) {
      println!("  {line}");
    }
    Ok(())
  }

  async fn find(&self, id: RequestId) -> Result<Request> {
    if self.session.staff {
      return Ok(self.repo.retrieve(&self.token, id).await?);
    }
    self
      .repo
      .list_all(&self.token)
      .await?
      .into_iter()
      .map(|row| row.request)
      .find(|r| r.id == id)
      .with_context(|| format!("request #{id} not found"))
  }

  pub async fn pickup(&self, set: Option<OrgId>) -> Result<()> {
    let libs = self.ctx.pickup_libs().await?;
    if let Some(org) = set {
      if !libs.iter().any(|u| u.id == org) {
        bail!("org unit {org} is not a pickup library");
      }
      self.ctx.set_default_pickup_lib(org).await?;
    }
    let current = self.ctx.default_pickup_lib().await?;
    for lib in libs.iter() {
      let mark = if lib.id == current { "*" } else { " " };
      println!("{mark} {:<4} {:<8} {}", lib.id, lib.shortname, lib.name);
    }
    Ok(())
  }

  // ── Staff commands ────────────────────────────────────────────────────────

  pub async fn queue(&self, filter: QueueFilter, sort: QueueSort) -> Result<()> {
    let mut view = RequestQueueView::new(self.svc.clone(), self.staff_id()?);
    view.set_filter(&self.token, filter).await?;
    view.set_sort(sort);
    if view.rows().is_empty() {
      println!("queue is empty");
    }
    for request in view.rows() {
      println!("{}", render::queue_line(request));
    }
    Ok(())
  }

  pub async fn claim(&self, ids: &[RequestId]) -> Result<()> {
    let mut view = RequestQueueView::new(self.svc.clone(), self.staff_id()?);
    let report = view.claim_selected(&self.token, ids).await?;
    print_report(&report)
  }

  pub async fn unclaim(&self, id: RequestId) -> Result<()> {
    let mut view = RequestQueueView::new(self.svc.clone(), self.staff_id()?);
    view.unclaim(&self.token, id).await?;
    println!("released #{id}");
    Ok(())
  }

  /// Save staff edits through the routing resolver, claiming the request
  /// if nobody holds it.
  pub async fn edit(&self, id: RequestId, edits: Edits) -> Result<()> {
    let me = self.staff_id()?;
    let saved = self.repo.retrieve(&self.token, id).await?;
    let mut edited = saved.clone();
    if let Some(title) = edits.title {
      edited.title = title;
    }
    if let Some(format) = edits.format {
      edited.format = format;
    }
    if let Some(pubdate) = edits.pubdate {
      edited.pubdate = Some(pubdate);
    }
    if let Some(route) = edits.route {
      edited.route_to = Some(route);
    }
    if let Some(lineitem) = edits.lineitem {
      edited.lineitem = Some(lineitem);
    }
    if let Some(illno) = edits.illno {
      edited.illno = Some(illno);
    }
    let resolver = RoutingResolver::new(self.repo.clone());
    let options = SaveOptions { claim_as: Some(me) };
    let updated = resolver.save(&self.token, &saved, edited, options).await?;
    println!("{}", render::queue_line(&updated));
    Ok(())
  }

  pub async fn transition(&self, id: RequestId, transition: Transition) -> Result<()> {
    let me = self.staff_id()?;
    let updated = self.repo.transition(&self.token, id, transition, me).await?;
    println!("{}", render::queue_line(&updated));
    Ok(())
  }

  pub async fn note(&self, ids: &[RequestId], text: &str, patron: bool) -> Result<()> {
    self.staff_id()?;
    let editor = BatchEditor::new(self.svc.clone());
    let report = if patron {
      editor.add_patron_note(&self.token, ids, text).await
    } else {
      editor.add_staff_note(&self.token, ids, text).await
    };
    print_report(&report)
  }

  pub async fn vendor(&self, ids: &[RequestId], vendor: &str) -> Result<()> {
    self.staff_id()?;
    let report = BatchEditor::new(self.svc.clone()).set_vendor(&self.token, ids, vendor).await;
    print_report(&report)
  }

  pub async fn route(&self, ids: &[RequestId], route: RouteTo) -> Result<()> {
    self.staff_id()?;
    let report = BatchEditor::new(self.svc.clone()).set_route(&self.token, ids, route).await;
    print_report(&report)
  }
}

fn print_report(report: &BatchReport) -> Result<()> {
  for line in render::report_lines(report) {
    println!("{line}");
  }
  if !report.is_clean() {
    bail!("{} of the requests failed", report.failed.len());
  }
  Ok(())
}

fn confirm_prompt(question: &str) -> Result<bool> {
  print!("{question}");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line).context("reading answer")?;
  Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
