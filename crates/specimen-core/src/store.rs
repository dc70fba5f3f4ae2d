//! The `LabStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `specimen-store-sqlite`). Every mutating method is one all-or-nothing
//! transaction: authorization and adjacency are checked against freshly read
//! state inside the transaction, then the new state, any allocated sequence
//! value and the audit entry are committed together. A rejected call leaves
//! no trace.
//!
//! All methods return `Send` futures so the trait can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error,
  artifact::GeneratedArtifact,
  audit::{AuditLogEntry, EntityType},
  qc::{NewQcControl, QcControl, QcRun, QcSummary},
  role::{Actor, Role},
  sample::{
    ChecklistSubmission, IntakeChecklist, IntakeValidation, NewSample, NewSampleTest,
    Sample, SampleTest,
  },
  sequence::{Allocation, Series},
  status::{IntakeStatus, TestStatus, TestingStatus},
};

/// Errors from a backend, with access to the domain rejection they carry.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The rejection behind this error, or `None` for infrastructure failures.
  fn rejection(&self) -> Option<&Error>;
}

/// Result of advancing a test; `certificate` is set when this step completed
/// the sample and generated its certificate of analysis.
#[derive(Debug, Clone, Serialize)]
pub struct TestAdvance {
  pub test:        SampleTest,
  pub certificate: Option<GeneratedArtifact>,
}

/// Abstraction over a transactional lifecycle store.
pub trait LabStore: Send + Sync {
  type Error: StoreError;

  // ── Samples ───────────────────────────────────────────────────────────

  /// Create a sample in `draft` / `received`, stamped with its creator.
  fn create_sample(
    &self,
    input: NewSample,
    actor: Actor,
  ) -> impl Future<Output = Result<Sample, Self::Error>> + Send + '_;

  fn get_sample(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Sample>, Self::Error>> + Send + '_;

  /// Move the sample along the intake track.
  fn transition_intake(
    &self,
    sample_id: Uuid,
    target: IntakeStatus,
    note: Option<String>,
    actor: Actor,
  ) -> impl Future<Output = Result<Sample, Self::Error>> + Send + '_;

  /// Move the sample along the laboratory track.
  fn advance_sample(
    &self,
    sample_id: Uuid,
    target: TestingStatus,
    note: Option<String>,
    actor: Actor,
  ) -> impl Future<Output = Result<Sample, Self::Error>> + Send + '_;

  /// Record the single-shot intake checklist for the current intake round.
  fn submit_checklist(
    &self,
    sample_id: Uuid,
    submission: ChecklistSubmission,
    actor: Actor,
  ) -> impl Future<Output = Result<IntakeChecklist, Self::Error>> + Send + '_;

  /// Validate intake and assign the lab sample code. Idempotent: a sample
  /// that already carries a code gets it back without a new allocation.
  fn validate_intake(
    &self,
    sample_id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<IntakeValidation, Self::Error>> + Send + '_;

  // ── Tests ─────────────────────────────────────────────────────────────

  fn add_test(
    &self,
    input: NewSampleTest,
    actor: Actor,
  ) -> impl Future<Output = Result<SampleTest, Self::Error>> + Send + '_;

  fn get_test(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<SampleTest>, Self::Error>> + Send + '_;

  fn list_tests(
    &self,
    sample_id: Uuid,
  ) -> impl Future<Output = Result<Vec<SampleTest>, Self::Error>> + Send + '_;

  /// Move one test along its track. Reaching a terminal state runs the
  /// certificate trigger in the same transaction.
  fn advance_test(
    &self,
    test_id: Uuid,
    target: TestStatus,
    note: Option<String>,
    actor: Actor,
  ) -> impl Future<Output = Result<TestAdvance, Self::Error>> + Send + '_;

  // ── QC ────────────────────────────────────────────────────────────────

  fn create_qc_control(
    &self,
    input: NewQcControl,
    actor: Actor,
  ) -> impl Future<Output = Result<QcControl, Self::Error>> + Send + '_;

  fn deactivate_qc_control(
    &self,
    id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<QcControl, Self::Error>> + Send + '_;

  /// Score and append a control reading for the sample's batch.
  fn record_qc_run(
    &self,
    sample_id: Uuid,
    qc_control_id: Uuid,
    value: f64,
    actor: Actor,
  ) -> impl Future<Output = Result<QcRun, Self::Error>> + Send + '_;

  fn list_qc_runs(
    &self,
    sample_id: Uuid,
  ) -> impl Future<Output = Result<Vec<QcRun>, Self::Error>> + Send + '_;

  fn qc_summary(
    &self,
    sample_id: Uuid,
  ) -> impl Future<Output = Result<QcSummary, Self::Error>> + Send + '_;

  // ── Sequences ─────────────────────────────────────────────────────────

  /// Allocate directly from a series that no workflow owns.
  fn allocate(
    &self,
    series: Series,
    actor: Actor,
  ) -> impl Future<Output = Result<Allocation, Self::Error>> + Send + '_;

  /// The value the next allocation will return, without consuming it.
  fn peek_sequence(
    &self,
    series: Series,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  // ── Artifacts ─────────────────────────────────────────────────────────

  /// Re-run the certificate trigger. Returns the sample's certificate
  /// (existing or newly generated), or `None` while tests are outstanding.
  fn ensure_certificate(
    &self,
    sample_id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<Option<GeneratedArtifact>, Self::Error>> + Send + '_;

  fn list_artifacts(
    &self,
    sample_id: Uuid,
  ) -> impl Future<Output = Result<Vec<GeneratedArtifact>, Self::Error>> + Send + '_;

  fn lock_artifact(
    &self,
    artifact_id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<GeneratedArtifact, Self::Error>> + Send + '_;

  fn create_letter_of_order(
    &self,
    sample_id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<GeneratedArtifact, Self::Error>> + Send + '_;

  /// Add an internal signature under `role_code`, which must be the actor's
  /// own role.
  fn sign_letter_of_order(
    &self,
    artifact_id: Uuid,
    role_code: Role,
    actor: Actor,
  ) -> impl Future<Output = Result<GeneratedArtifact, Self::Error>> + Send + '_;

  fn send_letter_of_order(
    &self,
    artifact_id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<GeneratedArtifact, Self::Error>> + Send + '_;

  /// Countersign as the client, which locks the document.
  fn client_sign_letter_of_order(
    &self,
    artifact_id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<GeneratedArtifact, Self::Error>> + Send + '_;

  // ── Audit ─────────────────────────────────────────────────────────────

  /// Every entry for one entity, oldest first.
  fn audit_trail(
    &self,
    entity_type: EntityType,
    entity_id: String,
  ) -> impl Future<Output = Result<Vec<AuditLogEntry>, Self::Error>> + Send + '_;
}
