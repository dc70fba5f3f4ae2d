//! Handlers for `/sequences` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/sequences/:series` | Next value, not consumed |
//! | `POST` | `/sequences/:series/allocate` | Only series no workflow owns |
//!
//! Series names: `lab-sample-code`, `report-number`, `order-number`,
//! `parameter-catalog`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Serialize;
use specimen_core::{
  sequence::{Allocation, Series},
  store::LabStore,
};

use crate::{CurrentActor, error::ApiError};

fn parse_series(raw: &str) -> Result<Series, ApiError> {
  raw.parse().map_err(|_| ApiError::NotFound(format!("series {raw}")))
}

#[derive(Debug, Serialize)]
pub struct PeekView {
  pub series:         Series,
  pub next_value:     i64,
  pub next_formatted: String,
}

/// `GET /sequences/:series`
pub async fn peek<S>(
  State(store): State<Arc<S>>,
  Path(series): Path<String>,
) -> Result<Json<PeekView>, ApiError>
where
  S: LabStore,
{
  let series = parse_series(&series)?;
  let next_value = store
    .peek_sequence(series)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(PeekView {
    series,
    next_value,
    next_formatted: series.render(next_value),
  }))
}

/// `POST /sequences/:series/allocate`
pub async fn allocate<S>(
  State(store): State<Arc<S>>,
  Path(series): Path<String>,
  CurrentActor(actor): CurrentActor,
) -> Result<Json<Allocation>, ApiError>
where
  S: LabStore,
{
  let series = parse_series(&series)?;
  let allocation = store
    .allocate(series, actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(allocation))
}
