//! Handlers for per-parameter tests.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/samples/:id/tests` | All tests of a sample |
//! | `POST` | `/samples/:id/tests` | Body: `{"parameter_id":"…","method_id":null}`; 201 |
//! | `GET`  | `/sample-tests/:id` | 404 if not found |
//! | `POST` | `/sample-tests/:id/status` | Body: [`StatusBody`] |
//! | `POST` | `/sample-tests/:id/verify` | Optional `{"note":"…"}`; QC gated |
//! | `POST` | `/sample-tests/:id/validate` | Optional `{"note":"…"}`; QC gated |
//!
//! Transition responses carry the updated test and, when that step completed
//! the sample, the certificate it generated.

use std::sync::Arc;

use axum::{
  Json,
  body::Bytes,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use specimen_core::{
  Actor,
  sample::{NewSampleTest, SampleTest},
  status::TestStatus,
  store::{LabStore, TestAdvance},
};
use uuid::Uuid;

use crate::{CurrentActor, NoteBody, StatusBody, error::ApiError, optional_json, parse_status};

// ─── List / get ───────────────────────────────────────────────────────────────

/// `GET /samples/:id/tests`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Path(sample_id): Path<Uuid>,
) -> Result<Json<Vec<SampleTest>>, ApiError>
where
  S: LabStore,
{
  let tests = store
    .list_tests(sample_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(tests))
}

/// `GET /sample-tests/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SampleTest>, ApiError>
where
  S: LabStore,
{
  store
    .get_test(id)
    .await
    .map_err(ApiError::from_store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("sample test {id}")))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub parameter_id: Uuid,
  pub method_id:    Option<Uuid>,
}

/// `POST /samples/:id/tests`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Path(sample_id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LabStore,
{
  let input = NewSampleTest {
    sample_id,
    parameter_id: body.parameter_id,
    method_id:    body.method_id,
  };
  let test = store
    .add_test(input, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(test)))
}

// ─── Transitions ──────────────────────────────────────────────────────────────

/// `POST /sample-tests/:id/status`
pub async fn status<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<StatusBody>,
) -> Result<Json<TestAdvance>, ApiError>
where
  S: LabStore,
{
  let target: TestStatus = parse_status(&body.target_status)?;
  advance(&*store, id, target, body.note, actor).await
}

/// `POST /sample-tests/:id/verify`
pub async fn verify<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
  body: Bytes,
) -> Result<Json<TestAdvance>, ApiError>
where
  S: LabStore,
{
  let NoteBody { note } = optional_json(&body)?;
  advance(&*store, id, TestStatus::Verified, note, actor).await
}

/// `POST /sample-tests/:id/validate`
pub async fn validate<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
  body: Bytes,
) -> Result<Json<TestAdvance>, ApiError>
where
  S: LabStore,
{
  let NoteBody { note } = optional_json(&body)?;
  advance(&*store, id, TestStatus::Validated, note, actor).await
}

async fn advance<S>(
  store: &S,
  id: Uuid,
  target: TestStatus,
  note: Option<String>,
  actor: Actor,
) -> Result<Json<TestAdvance>, ApiError>
where
  S: LabStore,
{
  let advanced = store
    .advance_test(id, target, note, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(advanced))
}
