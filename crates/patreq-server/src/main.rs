//! patreq-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) and `PATREQ_*`
//! environment variables, opens the SQLite store, seeds configured org units
//! and settings, and serves the JSON API over HTTP.
//!
//! # Issuing session tokens
//!
//! Sessions are opaque tokens created by an operator:
//!
//! ```
//! cargo run -p patreq-server -- --issue-session 42 --home-ou 2
//! cargo run -p patreq-server -- --issue-session 7 --staff
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use patreq_core::request::{OrgId, UserId};
use patreq_server::{ServerConfig, app, expand_tilde, seed};
use patreq_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Patron item request server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Issue a session token for this user id, print it and exit.
  #[arg(long, value_name = "USER")]
  issue_session: Option<UserId>,

  /// Home org unit of the user named by `--issue-session`.
  #[arg(long, default_value_t = 1, requires = "issue_session")]
  home_ou: OrgId,

  /// Mark the user named by `--issue-session` as staff.
  #[arg(long, requires = "issue_session")]
  staff: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PATREQ"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&store_path, server_cfg.store_options())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // Helper mode: issue a session token and exit.
  if let Some(user_id) = cli.issue_session {
    let token = store
      .issue_session(user_id, cli.home_ou, cli.staff)
      .await
      .context("failed to issue session")?;
    println!("{token}");
    return Ok(());
  }

  seed(&store, &server_cfg).await.context("failed to seed store")?;

  let app = app(Arc::new(store));
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::warn!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
