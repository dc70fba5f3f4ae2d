//! Handlers for generated documents.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/samples/:id/artifacts` | Certificate and letter of order, if any |
//! | `POST` | `/samples/:id/certificate` | Re-runs the trigger; `null` while tests are outstanding |
//! | `POST` | `/samples/:id/loa` | 201; allocates an order number |
//! | `POST` | `/artifacts/:id/lock` | Records the content digest |
//! | `POST` | `/loa/:id/sign` | Body: `{"role_code":"lab_head"}` |
//! | `POST` | `/loa/:id/send` | From `internally_signed` |
//! | `POST` | `/client/loa/:id/sign` | From `sent`; locks the letter |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use specimen_core::{Role, artifact::GeneratedArtifact, store::LabStore};
use uuid::Uuid;

use crate::{CurrentActor, error::ApiError};

// ─── Listing and certificates ─────────────────────────────────────────────────

/// `GET /samples/:id/artifacts`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Path(sample_id): Path<Uuid>,
) -> Result<Json<Vec<GeneratedArtifact>>, ApiError>
where
  S: LabStore,
{
  let artifacts = store
    .list_artifacts(sample_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(artifacts))
}

/// `POST /samples/:id/certificate`
pub async fn ensure_certificate<S>(
  State(store): State<Arc<S>>,
  Path(sample_id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<Option<GeneratedArtifact>>, ApiError>
where
  S: LabStore,
{
  let certificate = store
    .ensure_certificate(sample_id, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(certificate))
}

/// `POST /artifacts/:id/lock`
pub async fn lock<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<GeneratedArtifact>, ApiError>
where
  S: LabStore,
{
  let artifact = store
    .lock_artifact(id, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(artifact))
}

// ─── Letter of order ──────────────────────────────────────────────────────────

/// `POST /samples/:id/loa`
pub async fn create_loa<S>(
  State(store): State<Arc<S>>,
  Path(sample_id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
) -> Result<impl IntoResponse, ApiError>
where
  S: LabStore,
{
  let letter = store
    .create_letter_of_order(sample_id, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(letter)))
}

#[derive(Debug, Deserialize)]
pub struct SignBody {
  pub role_code: String,
}

/// `POST /loa/:id/sign`
pub async fn sign_loa<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<SignBody>,
) -> Result<Json<GeneratedArtifact>, ApiError>
where
  S: LabStore,
{
  let role_code: Role = body
    .role_code
    .trim()
    .parse()
    .map_err(|_| ApiError::BadRequest(format!("unknown role code {:?}", body.role_code)))?;
  let letter = store
    .sign_letter_of_order(id, role_code, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(letter))
}

/// `POST /loa/:id/send`
pub async fn send_loa<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<GeneratedArtifact>, ApiError>
where
  S: LabStore,
{
  let letter = store
    .send_letter_of_order(id, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(letter))
}

/// `POST /client/loa/:id/sign`
pub async fn client_sign_loa<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<GeneratedArtifact>, ApiError>
where
  S: LabStore,
{
  let letter = store
    .client_sign_letter_of_order(id, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(letter))
}
