//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body is `{"error": "<message>", "reason": "<code>"}`. For
//! validation rejections `reason` is the [`specimen_core::BlockReason`]; for everything else
//! it names the rejection kind.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use specimen_core::store::StoreError;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// A domain rejection raised by the store before any write.
  #[error(transparent)]
  Rejected(specimen_core::Error),

  /// The request carried no usable actor identity.
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  /// A status name outside the workflow's vocabulary.
  #[error("unknown status {0:?}")]
  UnknownStatus(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Split a backend error into its domain rejection, if it carries one, or
  /// an opaque infrastructure failure.
  pub fn from_store<E: StoreError>(e: E) -> Self {
    if let Some(rejection) = e.rejection() {
      return ApiError::Rejected(rejection.clone());
    }
    ApiError::Store(Box::new(e))
  }

  pub fn status(&self) -> StatusCode {
    use specimen_core::Error as Core;
    match self {
      ApiError::Rejected(e) => match e {
        Core::NotFound(_) => StatusCode::NOT_FOUND,
        Core::BadRequest(_) => StatusCode::BAD_REQUEST,
        Core::Forbidden(_) => StatusCode::FORBIDDEN,
        Core::InvalidTransition(_) | Core::Validation { .. } => {
          StatusCode::UNPROCESSABLE_ENTITY
        }
        Core::Conflict(_) => StatusCode::CONFLICT,
        Core::Busy => StatusCode::SERVICE_UNAVAILABLE,
      },
      ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      ApiError::UnknownStatus(_) => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Machine-readable code placed in the `reason` field.
  pub fn reason(&self) -> &str {
    use specimen_core::Error as Core;
    match self {
      ApiError::Rejected(e) => match e {
        Core::NotFound(_) => "not_found",
        Core::BadRequest(_) => "bad_request",
        Core::Forbidden(_) => "forbidden",
        Core::InvalidTransition(_) => "invalid_transition",
        Core::Conflict(_) => "conflict",
        Core::Validation { reason, .. } => reason.as_ref(),
        Core::Busy => "busy",
      },
      ApiError::Unauthorized(_) => "unauthorized",
      ApiError::UnknownStatus(_) => "invalid_value",
      ApiError::NotFound(_) => "not_found",
      ApiError::BadRequest(_) => "bad_request",
      ApiError::Store(_) => "internal",
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = json!({ "error": self.to_string(), "reason": self.reason() });
    (status, Json(body)).into_response()
  }
}
