//! HTTP server wiring for the specimen lifecycle engine: configuration and
//! the traced application router.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use axum::Router;
use serde::Deserialize;
use specimen_core::{policy::QcGatePolicy, store::LabStore};
use specimen_store_sqlite::StoreOptions;
use tower_http::trace::TraceLayer;

/// Prefix for environment overrides, e.g. `SPECIMEN_PORT=9000`.
pub const ENV_PREFIX: &str = "SPECIMEN";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `SPECIMEN_*` environment variables. Every field has a default.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  /// How long a write waits on a locked database before answering 503.
  pub busy_timeout_ms:     u64,
  /// Make a QC `warning` block verification the way `fail` does.
  pub qc_block_on_warning: bool,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                "127.0.0.1".to_string(),
      port:                8080,
      store_path:          PathBuf::from("specimen.db"),
      busy_timeout_ms:     5_000,
      qc_block_on_warning: false,
    }
  }
}

impl ServerConfig {
  /// Layer the optional TOML file at `path` under the environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix(ENV_PREFIX))
      .build()?
      .try_deserialize()
  }

  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      busy_timeout: Duration::from_millis(self.busy_timeout_ms),
      qc_gate:      QcGatePolicy { block_on_warning: self.qc_block_on_warning },
    }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
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

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API router wrapped in request tracing.
pub fn app<S>(store: Arc<S>) -> Router
where
  S: LabStore + 'static,
{
  specimen_api::api_router(store).layer(TraceLayer::new_for_http())
}
