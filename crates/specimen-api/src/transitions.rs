//! `GET /transitions`: the versioned transition tables.

use axum::Json;
use specimen_core::workflow::{self, TransitionTables};

pub async fn handler() -> Json<TransitionTables> { Json(workflow::tables()) }
