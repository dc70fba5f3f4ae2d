//! Status vocabularies, one enumerated type per workflow.
//!
//! The string forms are the persisted and wire representation. Changing the
//! vocabulary means bumping
//! [`TRANSITION_TABLE_VERSION`](crate::workflow::TRANSITION_TABLE_VERSION)
//! and migrating stored rows, never patching constraints in place.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

// ─── Intake (administrative) track ───────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntakeStatus {
  Draft,
  Submitted,
  Returned,
  NeedsRevision,
  ReadyForDelivery,
  InTransitToCollector,
  UnderInspection,
  InspectionFailedReturnedToAdmin,
  PhysicallyReceived,
  AwaitingVerification,
  IntakeChecklistPassed,
  IntakeValidated,
  WaitingSampleIdAssignment,
  SampleIdPendingVerification,
  SampleIdApprovedForAssignment,
  InTransitToAnalyst,
  ReceivedByAnalyst,
}

// ─── Laboratory testing track (sample level) ─────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TestingStatus {
  Received,
  InProgress,
  TestingCompleted,
  Verified,
  Validated,
  Reported,
  Cancelled,
  Failed,
}

impl TestingStatus {
  /// The coarse status exposed to external consumers.
  pub fn high_level(self) -> HighLevelStatus {
    match self {
      Self::Received => HighLevelStatus::Registered,
      Self::InProgress | Self::TestingCompleted => HighLevelStatus::Testing,
      Self::Verified | Self::Validated => HighLevelStatus::Review,
      Self::Reported => HighLevelStatus::Completed,
      Self::Cancelled | Self::Failed => HighLevelStatus::Closed,
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HighLevelStatus {
  Registered,
  Testing,
  Review,
  Completed,
  Closed,
}

// ─── Laboratory testing track (per parameter) ────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TestStatus {
  Draft,
  InProgress,
  Measured,
  Verified,
  Validated,
  Cancelled,
  Failed,
}

// ─── Letter of order ─────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoaStatus {
  Draft,
  /// Every required internal signature has been collected.
  InternallySigned,
  Sent,
  /// Countersigned by the client; the document is locked.
  ClientSigned,
}

// ─── Milestones ──────────────────────────────────────────────────────────────

/// A named checkpoint timestamp. Each is written at most once per entity.
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
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Milestone {
  // intake / custody
  SubmittedAt,
  DispatchedToCollectorAt,
  PhysicallyReceivedAt,
  IntakeValidatedAt,
  DispatchedToAnalystAt,
  ReceivedByAnalystAt,
  // sample testing
  TestingStartedAt,
  TestingCompletedAt,
  ReportedAt,
  // per-parameter testing
  StartedAt,
  MeasuredAt,
  // shared checkpoints
  OmVerifiedAt,
  LhValidatedAt,
  ClosedAt,
}
