//! Handlers for `/samples` endpoints and the intake track.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/samples` | Body: [`NewSample`]; returns 201 |
//! | `GET`  | `/samples/:id` | Includes `high_level_status` |
//! | `POST` | `/samples/:id/status` | Laboratory track; body: [`StatusBody`] |
//! | `POST` | `/samples/:id/request-status` | Intake track; body: [`StatusBody`] |
//! | `POST` | `/samples/:id/intake-checklist` | 201 first submission, 409 resubmission |
//! | `POST` | `/samples/:id/intake-validate` | Idempotent; repeats return the existing code |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Serialize;
use specimen_core::{
  sample::{ChecklistSubmission, IntakeChecklist, NewSample, Sample},
  status::{HighLevelStatus, IntakeStatus, TestingStatus},
  store::LabStore,
};
use uuid::Uuid;

use crate::{CurrentActor, StatusBody, error::ApiError, parse_status};

/// A sample as returned over the wire, with its derived coarse status.
#[derive(Debug, Serialize)]
pub struct SampleView {
  #[serde(flatten)]
  pub sample:            Sample,
  pub high_level_status: HighLevelStatus,
}

impl From<Sample> for SampleView {
  fn from(sample: Sample) -> Self {
    let high_level_status = sample.high_level_status();
    Self { sample, high_level_status }
  }
}

#[derive(Debug, Serialize)]
pub struct ValidationView {
  pub sample:          SampleView,
  pub lab_sample_code: String,
  pub newly_assigned:  bool,
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /samples`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<NewSample>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LabStore,
{
  let sample = store
    .create_sample(body, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(SampleView::from(sample))))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /samples/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SampleView>, ApiError>
where
  S: LabStore,
{
  store
    .get_sample(id)
    .await
    .map_err(ApiError::from_store)?
    .map(|s| Json(SampleView::from(s)))
    .ok_or_else(|| ApiError::NotFound(format!("sample {id}")))
}

// ─── Status changes ───────────────────────────────────────────────────────────

/// `POST /samples/:id/status` (laboratory track)
pub async fn testing_status<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<StatusBody>,
) -> Result<Json<SampleView>, ApiError>
where
  S: LabStore,
{
  let target: TestingStatus = parse_status(&body.target_status)?;
  let sample = store
    .advance_sample(id, target, body.note, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(sample.into()))
}

/// `POST /samples/:id/request-status` (intake track)
pub async fn request_status<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<StatusBody>,
) -> Result<Json<SampleView>, ApiError>
where
  S: LabStore,
{
  let target: IntakeStatus = parse_status(&body.target_status)?;
  let sample = store
    .transition_intake(id, target, body.note, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(sample.into()))
}

// ─── Intake checklist and validation ─────────────────────────────────────────

/// `POST /samples/:id/intake-checklist`, body: `{"checks":{...},"notes":{...}}`
pub async fn intake_checklist<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<ChecklistSubmission>,
) -> Result<(StatusCode, Json<IntakeChecklist>), ApiError>
where
  S: LabStore,
{
  let checklist = store
    .submit_checklist(id, body, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(checklist)))
}

/// `POST /samples/:id/intake-validate`
pub async fn intake_validate<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<ValidationView>, ApiError>
where
  S: LabStore,
{
  let validation = store
    .validate_intake(id, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(ValidationView {
    sample:          validation.sample.into(),
    lab_sample_code: validation.lab_sample_code,
    newly_assigned:  validation.newly_assigned,
  }))
}
