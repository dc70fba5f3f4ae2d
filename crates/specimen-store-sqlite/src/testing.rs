//! The laboratory tracks: sample-level status and per-parameter tests.
//!
//! Both tracks sit behind the intake gate, and their QC-gated edges consult
//! the sample's batch verdict read inside the same transaction.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use specimen_core::{
  BlockReason, Error as Rejection,
  artifact::ArtifactKind,
  audit::{AuditAction, EntityType, NewAuditEntry},
  policy::{self, Operation, QcGatePolicy},
  role::Actor,
  sample::{Milestones, NewSampleTest, Sample, SampleTest},
  status::{TestStatus, TestingStatus},
  store::TestAdvance,
  workflow::{Driver, Edge, SampleTesting, TestTesting, Workflow, check_transition},
};

use crate::{
  Result,
  artifacts::{self, CertificateOutcome},
  audit, qc, records,
};

fn ensure_intake_complete(sample: &Sample) -> Result<()> {
  if sample.intake_complete() {
    return Ok(());
  }
  Err(
    Rejection::validation(
      BlockReason::IntakeIncomplete,
      format!(
        "sample {} has not completed intake validation",
        sample.sample_id
      ),
    )
    .into(),
  )
}

fn ensure_qc<S: Copy + 'static>(
  conn: &Connection,
  gate: QcGatePolicy,
  edge: &Edge<S>,
  sample_id: Uuid,
) -> Result<()> {
  if edge.qc_gated {
    gate.check(&qc::summary(conn, sample_id)?)?;
  }
  Ok(())
}

pub fn advance_sample(
  conn: &Connection,
  gate: QcGatePolicy,
  sample_id: Uuid,
  target: TestingStatus,
  note: Option<String>,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<Sample> {
  let mut sample = records::require_sample(conn, sample_id)?;
  let from = sample.testing_status;
  let edge = check_transition::<SampleTesting>(actor.role, from, target, Driver::Manual)?;
  ensure_intake_complete(&sample)?;
  ensure_qc(conn, gate, edge, sample_id)?;

  sample.apply_testing(edge, at);
  records::update_sample(conn, &sample)?;

  let entry = NewAuditEntry::new(
    &actor,
    AuditAction::SampleTestingTransition,
    EntityType::Sample,
    sample_id,
  )
  .note(note)
  .before(&json!({ "testing_status": from }))?
  .after(&json!({
    "testing_status": target,
    "high_level_status": sample.high_level_status(),
  }))?;
  audit::append(conn, entry, at)?;
  Ok(sample)
}

pub fn add_test(
  conn: &Connection,
  input: NewSampleTest,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<SampleTest> {
  let sample = records::require_sample(conn, input.sample_id)?;
  policy::authorize(actor.role, Operation::AddTest)?;

  if SampleTesting::is_terminal(sample.testing_status)
    || records::artifact_of_kind(conn, sample.sample_id, ArtifactKind::CertificateOfAnalysis)?
      .is_some()
  {
    return Err(
      Rejection::validation(
        BlockReason::NotEligible,
        format!("sample {} no longer accepts tests", sample.sample_id),
      )
      .into(),
    );
  }
  if records::test_exists(conn, input.sample_id, input.parameter_id)? {
    return Err(
      Rejection::Conflict(format!(
        "parameter {} is already under test for this sample",
        input.parameter_id
      ))
      .into(),
    );
  }

  let test = SampleTest {
    test_id: Uuid::new_v4(),
    sample_id: input.sample_id,
    parameter_id: input.parameter_id,
    method_id: input.method_id,
    status: TestStatus::Draft,
    qc_passed: false,
    is_verified: false,
    is_validated: false,
    verified_by: None,
    validated_by: None,
    created_by: actor.actor_id,
    created_at: at,
    updated_at: at,
    milestones: Milestones::default(),
  };
  records::insert_test(conn, &test)?;

  let entry = NewAuditEntry::new(
    &actor,
    AuditAction::SampleTestCreate,
    EntityType::SampleTest,
    test.test_id,
  )
  .after(&test)?;
  audit::append(conn, entry, at)?;
  Ok(test)
}

/// Move one test. When the test settles in a terminal state the
/// certificate trigger runs before the transaction commits.
pub fn advance_test(
  conn: &Connection,
  gate: QcGatePolicy,
  test_id: Uuid,
  target: TestStatus,
  note: Option<String>,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<TestAdvance> {
  let mut test = records::require_test(conn, test_id)?;
  let from = test.status;
  let edge = check_transition::<TestTesting>(actor.role, from, target, Driver::Manual)?;
  let sample = records::require_sample(conn, test.sample_id)?;
  ensure_intake_complete(&sample)?;
  ensure_qc(conn, gate, edge, sample.sample_id)?;

  test.apply(edge, actor.actor_id, at);
  records::update_test(conn, &test)?;

  let entry = NewAuditEntry::new(
    &actor,
    AuditAction::SampleTestTransition,
    EntityType::SampleTest,
    test_id,
  )
  .note(note)
  .before(&json!({ "status": from }))?
  .after(&json!({
    "status": target,
    "qc_passed": test.qc_passed,
    "is_verified": test.is_verified,
    "is_validated": test.is_validated,
  }))?;
  audit::append(conn, entry, at)?;

  let certificate = if TestTesting::is_terminal(test.status) {
    match artifacts::certificate_trigger(conn, sample.sample_id, actor, at)? {
      CertificateOutcome::Generated(artifact) => Some(artifact),
      CertificateOutcome::Existing(_) | CertificateOutcome::Pending => None,
    }
  } else {
    None
  };

  Ok(TestAdvance { test, certificate })
}
