//! Audit log records.
//!
//! An entry is written in the same transaction as the mutation it describes
//! and is never updated or deleted afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::role::{Actor, Role};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum AuditAction {
  #[serde(rename = "sample.create")]
  #[strum(serialize = "sample.create")]
  SampleCreate,
  #[serde(rename = "sample.intake_transition")]
  #[strum(serialize = "sample.intake_transition")]
  SampleIntakeTransition,
  #[serde(rename = "sample.testing_transition")]
  #[strum(serialize = "sample.testing_transition")]
  SampleTestingTransition,
  #[serde(rename = "sample.intake_checklist")]
  #[strum(serialize = "sample.intake_checklist")]
  SampleIntakeChecklist,
  #[serde(rename = "sample.intake_validate")]
  #[strum(serialize = "sample.intake_validate")]
  SampleIntakeValidate,
  #[serde(rename = "sample_test.create")]
  #[strum(serialize = "sample_test.create")]
  SampleTestCreate,
  #[serde(rename = "sample_test.transition")]
  #[strum(serialize = "sample_test.transition")]
  SampleTestTransition,
  #[serde(rename = "qc_control.create")]
  #[strum(serialize = "qc_control.create")]
  QcControlCreate,
  #[serde(rename = "qc_control.deactivate")]
  #[strum(serialize = "qc_control.deactivate")]
  QcControlDeactivate,
  #[serde(rename = "qc_run.record")]
  #[strum(serialize = "qc_run.record")]
  QcRunRecord,
  #[serde(rename = "sequence.allocate")]
  #[strum(serialize = "sequence.allocate")]
  SequenceAllocate,
  #[serde(rename = "artifact.generate")]
  #[strum(serialize = "artifact.generate")]
  ArtifactGenerate,
  #[serde(rename = "artifact.lock")]
  #[strum(serialize = "artifact.lock")]
  ArtifactLock,
  #[serde(rename = "loa.create")]
  #[strum(serialize = "loa.create")]
  LoaCreate,
  #[serde(rename = "loa.sign")]
  #[strum(serialize = "loa.sign")]
  LoaSign,
  #[serde(rename = "loa.send")]
  #[strum(serialize = "loa.send")]
  LoaSend,
  #[serde(rename = "loa.client_sign")]
  #[strum(serialize = "loa.client_sign")]
  LoaClientSign,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
  Sample,
  SampleTest,
  QcControl,
  QcRun,
  Sequence,
  Artifact,
}

/// An immutable record of one authorized mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
  pub entry_id:    Uuid,
  pub actor_id:    Uuid,
  pub actor_role:  Role,
  pub action:      AuditAction,
  pub entity_type: EntityType,
  /// UUID of the entity, or the counter name for sequence allocations.
  pub entity_id:   String,
  pub note:        Option<String>,
  pub before:      Option<serde_json::Value>,
  pub after:       serde_json::Value,
  pub recorded_at: DateTime<Utc>,
}

/// Input to a backend's audit append; `entry_id` and `recorded_at` are
/// assigned on write.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
  pub actor:       Actor,
  pub action:      AuditAction,
  pub entity_type: EntityType,
  pub entity_id:   String,
  pub note:        Option<String>,
  pub before:      Option<serde_json::Value>,
  pub after:       serde_json::Value,
}

impl NewAuditEntry {
  pub fn new(
    actor: &Actor,
    action: AuditAction,
    entity_type: EntityType,
    entity_id: impl ToString,
  ) -> Self {
    Self {
      actor: *actor,
      action,
      entity_type,
      entity_id: entity_id.to_string(),
      note: None,
      before: None,
      after: serde_json::Value::Null,
    }
  }

  pub fn note(mut self, note: Option<String>) -> Self {
    self.note = note;
    self
  }

  pub fn before<T: Serialize>(mut self, value: &T) -> serde_json::Result<Self> {
    self.before = Some(serde_json::to_value(value)?);
    Ok(self)
  }

  pub fn after<T: Serialize>(mut self, value: &T) -> serde_json::Result<Self> {
    self.after = serde_json::to_value(value)?;
    Ok(self)
  }
}
