//! JSON REST API for the specimen lifecycle engine.
//!
//! Exposes an axum [`Router`] backed by any [`specimen_core::store::LabStore`].
//! Actor resolution is delegated to an upstream collaborator that forwards
//! identity headers (see [`actor`]); TLS and transport concerns are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", specimen_api::api_router(store.clone()))
//! ```

pub mod actor;
pub mod artifacts;
pub mod audit;
pub mod error;
pub mod qc;
pub mod sample_tests;
pub mod samples;
pub mod sequences;
pub mod transitions;

use std::{str::FromStr, sync::Arc};

use axum::{
  Router,
  body::Bytes,
  routing::{get, post},
};
use serde::{Deserialize, de::DeserializeOwned};
use specimen_core::store::LabStore;

pub use actor::CurrentActor;
pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: LabStore + 'static,
{
  Router::new()
    // Samples
    .route("/samples", post(samples::create::<S>))
    .route("/samples/{id}", get(samples::get_one::<S>))
    .route("/samples/{id}/status", post(samples::testing_status::<S>))
    .route("/samples/{id}/request-status", post(samples::request_status::<S>))
    .route("/samples/{id}/intake-checklist", post(samples::intake_checklist::<S>))
    .route("/samples/{id}/intake-validate", post(samples::intake_validate::<S>))
    // Tests
    .route(
      "/samples/{id}/tests",
      get(sample_tests::list::<S>).post(sample_tests::create::<S>),
    )
    .route("/sample-tests/{id}", get(sample_tests::get_one::<S>))
    .route("/sample-tests/{id}/status", post(sample_tests::status::<S>))
    .route("/sample-tests/{id}/verify", post(sample_tests::verify::<S>))
    .route("/sample-tests/{id}/validate", post(sample_tests::validate::<S>))
    // QC
    .route("/samples/{id}/qc-runs", get(qc::list_runs::<S>).post(qc::record_run::<S>))
    .route("/samples/{id}/qc-summary", get(qc::summary::<S>))
    .route("/qc-controls", post(qc::create_control::<S>))
    .route("/qc-controls/{id}/deactivate", post(qc::deactivate_control::<S>))
    // Artifacts
    .route("/samples/{id}/artifacts", get(artifacts::list::<S>))
    .route("/samples/{id}/certificate", post(artifacts::ensure_certificate::<S>))
    .route("/samples/{id}/loa", post(artifacts::create_loa::<S>))
    .route("/artifacts/{id}/lock", post(artifacts::lock::<S>))
    .route("/loa/{id}/sign", post(artifacts::sign_loa::<S>))
    .route("/loa/{id}/send", post(artifacts::send_loa::<S>))
    .route("/client/loa/{id}/sign", post(artifacts::client_sign_loa::<S>))
    // Sequences
    .route("/sequences/{series}", get(sequences::peek::<S>))
    .route("/sequences/{series}/allocate", post(sequences::allocate::<S>))
    // Audit
    .route("/audit/{entity_type}/{id}", get(audit::trail::<S>))
    // Transition tables
    .route("/transitions", get(transitions::handler))
    .with_state(store)
}

// ─── Shared request helpers ──────────────────────────────────────────────────

/// Body of the status-change endpoints. The target stays a plain string so
/// that an unknown name maps to a 422 instead of a generic body rejection.
#[derive(Debug, Default, Deserialize)]
pub struct StatusBody {
  pub target_status: String,
  pub note:          Option<String>,
}

/// Optional body carrying only a free-text note.
#[derive(Debug, Default, Deserialize)]
pub struct NoteBody {
  pub note: Option<String>,
}

/// Parse a status name from the workflow's vocabulary.
pub(crate) fn parse_status<T: FromStr>(raw: &str) -> Result<T, ApiError> {
  raw.trim().parse().map_err(|_| ApiError::UnknownStatus(raw.to_owned()))
}

/// Decode an optional JSON body; an empty body yields the default value.
pub(crate) fn optional_json<T>(body: &Bytes) -> Result<T, ApiError>
where
  T: DeserializeOwned + Default,
{
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(T::default());
  }
  serde_json::from_slice(body)
    .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}
