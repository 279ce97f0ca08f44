//! `patreq`: command-line client for the patron request service.
//!
//! # Usage
//!
//! ```
//! patreq --url http://localhost:8080 --token 3f9c… submit "Kindred" --author "Octavia E. Butler"
//! patreq --config ~/.config/patreq/config.toml list --all
//! patreq queue --ill --sort claim_date --desc
//! ```

mod client;
mod commands;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use client::{ApiClient, ApiConfig};
use commands::{Edits, Runner};
use patreq_core::{
  queue::{QueueFilter, QueueSort, SortColumn, SortDirection},
  request::{LineitemId, NewRequest, OrgId, RequestId, RouteTo, Transition, UserId},
};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "patreq", about = "Patron item requests from the command line")]
struct Args {
  /// Path to a TOML config file (url, token).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the patreq server (default: http://localhost:8080).
  #[arg(long, env = "PATREQ_URL")]
  url: Option<String>,

  /// Session token issued by the server.
  #[arg(long, env = "PATREQ_TOKEN")]
  token: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Submit a new request.
  Submit(DraftArgs),
  /// Show what would block a request without submitting it.
  Check(DraftArgs),
  /// List your requests (pending only unless `--all`).
  List {
    #[arg(long)]
    all: bool,
  },
  /// Cancel one of your requests.
  Cancel {
    id:  RequestId,
    /// Skip the confirmation prompt.
    #[arg(short, long)]
    yes: bool,
  },
  /// Show the progress trail of a request.
  Trail { id: RequestId },
  /// List pickup libraries, optionally setting your default.
  Pickup {
    #[arg(long, value_name = "ORG")]
    set: Option<OrgId>,
  },

  // ── Staff ──
  /// Show the staff request queue.
  Queue(QueueArgs),
  /// Claim requests for yourself.
  Claim {
    #[arg(required = true)]
    ids: Vec<RequestId>,
  },
  /// Release your claim on a request.
  Unclaim { id: RequestId },
  /// Edit a request and save it through routing.
  Edit(EditArgs),
  /// Mark a request complete.
  Complete { id: RequestId },
  /// Reject a request.
  Reject {
    id:     RequestId,
    #[arg(long)]
    reason: Option<String>,
  },
  /// Return a completed or rejected request to the queue.
  Reactivate { id: RequestId },
  /// Append a note to each request.
  Note {
    #[arg(required = true)]
    ids:    Vec<RequestId>,
    #[arg(long)]
    text:   String,
    /// Write a patron-visible note instead of a staff note.
    #[arg(long)]
    patron: bool,
  },
  /// Set the vendor on each request.
  Vendor {
    #[arg(required = true)]
    ids:    Vec<RequestId>,
    #[arg(long)]
    vendor: String,
  },
  /// Route each request to `acq` or `ill`.
  Route {
    #[arg(required = true)]
    ids:   Vec<RequestId>,
    #[arg(long)]
    route: RouteTo,
  },
}

#[derive(ClapArgs, Debug)]
struct DraftArgs {
  title:       String,
  #[arg(long, default_value = "book")]
  format:      String,
  #[arg(long)]
  author:      Option<String>,
  /// ISBN, ISSN or UPC.
  #[arg(long)]
  identifier:  Option<String>,
  #[arg(long)]
  publisher:   Option<String>,
  /// Four-digit publication year.
  #[arg(long)]
  pubdate:     Option<String>,
  #[arg(long)]
  language:    Option<String>,
  #[arg(long)]
  notes:       Option<String>,
  #[arg(long, value_name = "ORG")]
  pickup_lib:  Option<OrgId>,
  #[arg(long)]
  email:       Option<String>,
  #[arg(long)]
  phone:       Option<String>,
  /// Do not borrow the item from another library.
  #[arg(long)]
  ill_opt_out: bool,
  /// Place the request for another patron (staff only).
  #[arg(long, value_name = "USER")]
  for_patron:  Option<UserId>,
}

impl From<DraftArgs> for NewRequest {
  fn from(a: DraftArgs) -> Self {
    NewRequest {
      title:       a.title,
      author:      a.author,
      identifier:  a.identifier,
      format:      a.format,
      publisher:   a.publisher,
      pubdate:     a.pubdate,
      language:    a.language,
      notes:       a.notes,
      pickup_lib:  a.pickup_lib,
      email:       a.email,
      phone:       a.phone,
      ill_opt_out: a.ill_opt_out,
      id_matched:  false,
      usr:         a.for_patron,
    }
    .normalized()
  }
}

#[derive(ClapArgs, Debug)]
struct QueueArgs {
  /// Show only the named tracks; with none given, all tracks are shown.
  #[arg(long)]
  ill:       bool,
  #[arg(long)]
  acq:       bool,
  #[arg(long)]
  unrouted:  bool,
  #[arg(long)]
  rejected:  bool,
  #[arg(long)]
  completed: bool,
  #[arg(long)]
  canceled:  bool,
  /// Only requests you have claimed.
  #[arg(long)]
  mine:      bool,
  #[arg(long, default_value = "create_date")]
  sort:      SortColumn,
  #[arg(long)]
  desc:      bool,
}

impl QueueArgs {
  fn filter(&self) -> QueueFilter {
    let any_track = self.ill || self.acq || self.unrouted;
    QueueFilter {
      route_ill:      self.ill || !any_track,
      route_acq:      self.acq || !any_track,
      route_none:     self.unrouted || !any_track,
      show_rejected:  self.rejected,
      show_completed: self.completed,
      show_canceled:  self.canceled,
      claimed_by_me:  self.mine,
    }
  }

  fn sort(&self) -> QueueSort {
    let direction = if self.desc { SortDirection::Desc } else { SortDirection::Asc };
    QueueSort { column: self.sort, direction }
  }
}

#[derive(ClapArgs, Debug)]
struct EditArgs {
  id:       RequestId,
  #[arg(long)]
  title:    Option<String>,
  #[arg(long)]
  format:   Option<String>,
  #[arg(long)]
  pubdate:  Option<String>,
  #[arg(long)]
  route:    Option<RouteTo>,
  #[arg(long)]
  lineitem: Option<LineitemId>,
  #[arg(long)]
  illno:    Option<String>,
}

impl EditArgs {
  fn edits(self) -> (RequestId, Edits) {
    let edits = Edits {
      title:    self.title,
      format:   self.format,
      pubdate:  self.pubdate,
      route:    self.route,
      lineitem: self.lineitem,
      illno:    self.illno,
    };
    (self.id, edits)
  }
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:   String,
  #[serde(default)]
  token: String,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
  };
  let token = args
    .token
    .or_else(|| (!file_cfg.token.is_empty()).then(|| file_cfg.token.clone()))
    .context("no session token; pass --token or set PATREQ_TOKEN")?;

  let runner = Runner::connect(ApiClient::new(api_config)?, token).await?;
  run(&runner, args.command).await
}

async fn run(runner: &Runner, command: Command) -> Result<()> {
  match command {
    Command::Submit(draft) => runner.submit(draft.into()).await,
    Command::Check(draft) => runner.check(draft.into()).await,
    Command::List { all } => runner.list(all).await,
    Command::Cancel { id, yes } => runner.cancel(id, yes).await,
    Command::Trail { id } => runner.trail(id).await,
    Command::Pickup { set } => runner.pickup(set).await,
    Command::Queue(q) => runner.queue(q.filter(), q.sort()).await,
    Command::Claim { ids } => runner.claim(&ids).await,
    Command::Unclaim { id } => runner.unclaim(id).await,
    Command::Edit(edit) => {
      let (id, edits) = edit.edits();
      runner.edit(id, edits).await
    }
    Command::Complete { id } => runner.transition(id, Transition::Complete).await,
    Command::Reject { id, reason } => runner.transition(id, Transition::Reject { reason }).await,
    Command::Reactivate { id } => runner.transition(id, Transition::Reactivate).await,
    Command::Note { ids, text, patron } => runner.note(&ids, &text, patron).await,
    Command::Vendor { ids, vendor } => runner.vendor(&ids, &vendor).await,
    Command::Route { ids, route } => runner.route(&ids, route).await,
  }
}
