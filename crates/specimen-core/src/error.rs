//! Error types for `specimen-core`.
//!
//! [`Error`] is the rejection taxonomy shared by every layer. Rejections are
//! produced before any write, so a rejected request leaves no state change,
//! no consumed sequence value and no audit entry behind.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use thiserror::Error;

/// Machine-readable cause attached to [`Error::Validation`], so a client can
/// tell "blocked by QC" apart from "wrong state" or "missing input".
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlockReason {
  /// The most recent QC verdict for the batch is `fail`.
  QcFailed,
  /// The QC verdict is `warning` and warnings are configured to block.
  QcWarning,
  MissingFields,
  ChecklistMissing,
  ChecklistFailed,
  /// The entity is not in a state that permits the operation.
  NotEligible,
  /// The sample has not completed intake (validated with a lab code).
  IntakeIncomplete,
  InvalidValue,
  /// The artifact is locked and can no longer change.
  Locked,
}

#[derive(Debug, Clone, Error)]
pub enum Error {
  #[error("{0} not found")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("invalid transition: {0}")]
  InvalidTransition(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("{message}")]
  Validation {
    reason:  BlockReason,
    message: String,
  },

  #[error("resource busy; retry the request")]
  Busy,
}

impl Error {
  pub fn validation(reason: BlockReason, message: impl Into<String>) -> Self {
    Self::Validation { reason, message: message.into() }
  }

  pub fn not_found(what: impl std::fmt::Display) -> Self {
    Self::NotFound(what.to_string())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
