//! Actors and the roles they act under.
//!
//! Identity and role resolution belong to an external collaborator; the
//! engine only ever sees an already-resolved [`Actor`].

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
  /// The customer requesting the analysis.
  Client,
  Admin,
  /// Receives and inspects physical specimens; hands them to analysts.
  SampleCollector,
  Analyst,
  OperationalManager,
  LabHead,
}

impl Role {
  /// Roles with supervisory scope over other staff's work.
  pub fn is_supervisory(self) -> bool {
    matches!(self, Self::OperationalManager | Self::LabHead)
  }
}

/// The authenticated principal behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub actor_id: Uuid,
  pub role:     Role,
}

impl Actor {
  pub fn new(actor_id: Uuid, role: Role) -> Self { Self { actor_id, role } }
}
