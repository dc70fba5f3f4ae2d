//! Samples, their per-parameter tests and the intake checklist.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  status::{HighLevelStatus, IntakeStatus, Milestone, TestStatus, TestingStatus},
  workflow::Edge,
};

// ─── Milestones ──────────────────────────────────────────────────────────────

/// Write-once checkpoint timestamps keyed by [`Milestone`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Milestones(BTreeMap<Milestone, DateTime<Utc>>);

impl Milestones {
  /// Record `milestone` at `at` unless it was already recorded. Returns
  /// whether a new timestamp was written.
  pub fn stamp(&mut self, milestone: Milestone, at: DateTime<Utc>) -> bool {
    if self.0.contains_key(&milestone) {
      return false;
    }
    self.0.insert(milestone, at);
    true
  }

  pub fn get(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
    self.0.get(&milestone).copied()
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

// ─── Sample ──────────────────────────────────────────────────────────────────

/// A physical specimen tracked on two independent workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
  pub sample_id:             Uuid,
  pub client_id:             Uuid,
  pub description:           Option<String>,
  pub administrative_status: IntakeStatus,
  pub testing_status:        TestingStatus,
  /// Rendered lab code (e.g. `BML-001`); assigned once, at intake validation.
  pub lab_sample_code:       Option<String>,
  /// Incremented each time the sample is physically received, so a sample
  /// returned and re-delivered gets a fresh checklist.
  pub intake_round:          u32,
  pub return_reason:         Option<String>,
  pub created_by:            Uuid,
  pub assigned_to:           Uuid,
  pub created_at:            DateTime<Utc>,
  pub updated_at:            DateTime<Utc>,
  pub milestones:            Milestones,
}

impl Sample {
  pub fn high_level_status(&self) -> HighLevelStatus {
    self.testing_status.high_level()
  }

  /// True once intake validation has completed and a lab code exists. The
  /// laboratory tracks may not progress before this.
  pub fn intake_complete(&self) -> bool {
    self.milestones.get(Milestone::IntakeValidatedAt).is_some()
      && self.lab_sample_code.is_some()
  }

  pub fn apply_intake(&mut self, edge: &Edge<IntakeStatus>, at: DateTime<Utc>) {
    self.administrative_status = edge.to;
    if let Some(m) = edge.milestone {
      self.milestones.stamp(m, at);
    }
    if edge.to == IntakeStatus::PhysicallyReceived {
      self.intake_round += 1;
    }
    self.updated_at = at;
  }

  pub fn apply_testing(&mut self, edge: &Edge<TestingStatus>, at: DateTime<Utc>) {
    self.testing_status = edge.to;
    if let Some(m) = edge.milestone {
      self.milestones.stamp(m, at);
    }
    self.updated_at = at;
  }
}

/// Input to [`crate::store::LabStore::create_sample`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSample {
  pub client_id:   Uuid,
  pub description: Option<String>,
  /// Only honoured for roles with supervisory scope.
  pub assigned_to: Option<Uuid>,
}

// ─── SampleTest ──────────────────────────────────────────────────────────────

/// One (sample, parameter) analysis with its own status track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTest {
  pub test_id:      Uuid,
  pub sample_id:    Uuid,
  pub parameter_id: Uuid,
  pub method_id:    Option<Uuid>,
  pub status:       TestStatus,
  pub qc_passed:    bool,
  pub is_verified:  bool,
  pub is_validated: bool,
  pub verified_by:  Option<Uuid>,
  pub validated_by: Option<Uuid>,
  pub created_by:   Uuid,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
  pub milestones:   Milestones,
}

impl SampleTest {
  pub fn apply(&mut self, edge: &Edge<TestStatus>, actor: Uuid, at: DateTime<Utc>) {
    self.status = edge.to;
    match edge.to {
      TestStatus::Verified => {
        self.qc_passed = true;
        self.is_verified = true;
        self.verified_by = Some(actor);
      }
      TestStatus::Validated => {
        self.is_validated = true;
        self.validated_by = Some(actor);
      }
      _ => {}
    }
    if let Some(m) = edge.milestone {
      self.milestones.stamp(m, at);
    }
    self.updated_at = at;
  }
}

/// Input to [`crate::store::LabStore::add_test`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewSampleTest {
  pub sample_id:    Uuid,
  pub parameter_id: Uuid,
  pub method_id:    Option<Uuid>,
}

// ─── Intake checklist ────────────────────────────────────────────────────────

/// What the collector submits after physically receiving a sample.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChecklistSubmission {
  /// Item name → passed.
  pub checks: BTreeMap<String, bool>,
  /// Item name → free-text remark.
  #[serde(default)]
  pub notes:  BTreeMap<String, String>,
}

impl ChecklistSubmission {
  pub fn failed_items(&self) -> Vec<&str> {
    self
      .checks
      .iter()
      .filter(|(_, passed)| !**passed)
      .map(|(name, _)| name.as_str())
      .collect()
  }

  pub fn passed(&self) -> bool { self.checks.values().all(|passed| *passed) }

  /// Textual reason recorded on a sample whose checklist failed: the notes
  /// of the failed items, falling back to the item names.
  pub fn return_reason(&self) -> Option<String> {
    let failed = self.failed_items();
    if failed.is_empty() {
      return None;
    }
    let parts: Vec<String> = failed
      .iter()
      .map(|name| match self.notes.get(*name) {
        Some(note) if !note.trim().is_empty() => format!("{name}: {}", note.trim()),
        _ => (*name).to_owned(),
      })
      .collect();
    Some(format!("intake checklist failed ({})", parts.join("; ")))
  }
}

/// A recorded checklist decision; at most one per sample per intake round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeChecklist {
  pub checklist_id: Uuid,
  pub sample_id:    Uuid,
  pub intake_round: u32,
  pub checks:       BTreeMap<String, bool>,
  pub notes:        BTreeMap<String, String>,
  pub passed:       bool,
  pub submitted_by: Uuid,
  pub submitted_at: DateTime<Utc>,
}

/// Result of [`crate::store::LabStore::validate_intake`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeValidation {
  pub sample:          Sample,
  pub lab_sample_code: String,
  /// `false` when the call returned a previously assigned code.
  pub newly_assigned:  bool,
}
