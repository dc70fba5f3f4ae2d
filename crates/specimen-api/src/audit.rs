//! `GET /audit/:entity_type/:id`: the audit trail of one entity, oldest
//! first. `entity_type` is one of `sample`, `sample_test`, `qc_control`,
//! `qc_run`, `sequence` or `artifact`; sequence trails are keyed by counter
//! name rather than UUID.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use specimen_core::{
  audit::{AuditLogEntry, EntityType},
  store::LabStore,
};

use crate::error::ApiError;

pub async fn trail<S>(
  State(store): State<Arc<S>>,
  Path((entity_type, id)): Path<(String, String)>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError>
where
  S: LabStore,
{
  let entity_type: EntityType = entity_type
    .parse()
    .map_err(|_| ApiError::NotFound(format!("entity type {entity_type}")))?;
  let entries = store
    .audit_trail(entity_type, id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(entries))
}
