//! Handlers for QC controls and runs.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/qc-controls` | Body: [`NewQcControl`]; 201 |
//! | `POST` | `/qc-controls/:id/deactivate` | The only mutation a control allows |
//! | `GET`  | `/samples/:id/qc-runs` | Runs recorded for the sample's batch |
//! | `POST` | `/samples/:id/qc-runs` | Body: `{"qc_control_id":"…","value":1.2}`; 201 |
//! | `GET`  | `/samples/:id/qc-summary` | `{"status":"…","counts":{…}}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use specimen_core::{
  qc::{NewQcControl, QcControl, QcRun, QcSummary},
  store::LabStore,
};
use uuid::Uuid;

use crate::{CurrentActor, error::ApiError};

// ─── Controls ─────────────────────────────────────────────────────────────────

/// `POST /qc-controls`
pub async fn create_control<S>(
  State(store): State<Arc<S>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<NewQcControl>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LabStore,
{
  let control = store
    .create_qc_control(body, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(control)))
}

/// `POST /qc-controls/:id/deactivate`
pub async fn deactivate_control<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<QcControl>, ApiError>
where
  S: LabStore,
{
  let control = store
    .deactivate_qc_control(id, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(control))
}

// ─── Runs ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RunBody {
  pub qc_control_id: Uuid,
  pub value:         f64,
}

/// `POST /samples/:id/qc-runs`
pub async fn record_run<S>(
  State(store): State<Arc<S>>,
  Path(sample_id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<RunBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LabStore,
{
  let run = store
    .record_qc_run(sample_id, body.qc_control_id, body.value, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(run)))
}

/// `GET /samples/:id/qc-runs`
pub async fn list_runs<S>(
  State(store): State<Arc<S>>,
  Path(sample_id): Path<Uuid>,
) -> Result<Json<Vec<QcRun>>, ApiError>
where
  S: LabStore,
{
  let runs = store
    .list_qc_runs(sample_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(runs))
}

/// `GET /samples/:id/qc-summary`
pub async fn summary<S>(
  State(store): State<Arc<S>>,
  Path(sample_id): Path<Uuid>,
) -> Result<Json<QcSummary>, ApiError>
where
  S: LabStore,
{
  let summary = store
    .qc_summary(sample_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(summary))
}
