//! specimen-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), layers
//! `SPECIMEN_*` environment variables over it, opens the SQLite store and
//! serves the JSON API over HTTP.
//!
//! ```toml
//! host                = "0.0.0.0"
//! port                = 8080
//! store_path          = "~/.local/share/specimen/lab.db"
//! busy_timeout_ms     = 5000
//! qc_block_on_warning = false
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use specimen_server::{ServerConfig, app, expand_tilde};
use specimen_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Sample lifecycle and gating server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the versioned transition tables as JSON and exit.
  #[arg(long)]
  print_transitions: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.print_transitions {
    let tables = serde_json::to_string_pretty(&specimen_core::workflow::tables())
      .context("failed to serialise transition tables")?;
    println!("{tables}");
    return Ok(());
  }

  let server_cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open_with(&store_path, server_cfg.store_options())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  tracing::info!(
    path = %store_path.display(),
    qc_block_on_warning = server_cfg.qc_block_on_warning,
    "store opened"
  );

  let address = server_cfg.address();
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  tracing::info!("Listening on http://{address}");
  axum::serve(listener, app(Arc::new(store)))
    .await
    .context("server error")?;

  Ok(())
}
