//! Sample creation and the intake track: manual transitions, the checklist
//! decision and intake validation with lab code assignment.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use specimen_core::{
  BlockReason, Error as Rejection,
  audit::{AuditAction, EntityType, NewAuditEntry},
  policy::{self, Operation},
  role::{Actor, Role},
  sample::{
    ChecklistSubmission, IntakeChecklist, IntakeValidation, Milestones, NewSample, Sample,
  },
  sequence::Series,
  status::{IntakeStatus, TestingStatus},
  workflow::{Driver, Intake, check_transition, driver_roles},
};

use crate::{Result, audit, records, sequence};

pub fn create_sample(
  conn: &Connection,
  input: NewSample,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<Sample> {
  policy::authorize(actor.role, Operation::CreateSample)?;
  if input.client_id.is_nil() {
    return Err(
      Rejection::validation(BlockReason::MissingFields, "client_id is required").into(),
    );
  }
  if actor.role == Role::Client && input.client_id != actor.actor_id {
    return Err(
      Rejection::Forbidden("clients may only register their own samples".into()).into(),
    );
  }
  let assigned_to = policy::resolve_assignee(&actor, input.assigned_to)?;

  let sample = Sample {
    sample_id: Uuid::new_v4(),
    client_id: input.client_id,
    description: input.description,
    administrative_status: IntakeStatus::Draft,
    testing_status: TestingStatus::Received,
    lab_sample_code: None,
    intake_round: 0,
    return_reason: None,
    created_by: actor.actor_id,
    assigned_to,
    created_at: at,
    updated_at: at,
    milestones: Milestones::default(),
  };
  records::insert_sample(conn, &sample)?;

  let entry = NewAuditEntry::new(
    &actor,
    AuditAction::SampleCreate,
    EntityType::Sample,
    sample.sample_id,
  )
  .after(&sample)?;
  audit::append(conn, entry, at)?;
  Ok(sample)
}

fn is_return(status: IntakeStatus) -> bool {
  matches!(
    status,
    IntakeStatus::Returned
      | IntakeStatus::NeedsRevision
      | IntakeStatus::InspectionFailedReturnedToAdmin
  )
}

pub fn transition(
  conn: &Connection,
  sample_id: Uuid,
  target: IntakeStatus,
  note: Option<String>,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<Sample> {
  let mut sample = records::require_sample(conn, sample_id)?;
  let from = sample.administrative_status;
  let edge = check_transition::<Intake>(actor.role, from, target, Driver::Manual)?;

  sample.apply_intake(edge, at);
  if is_return(target) {
    if let Some(reason) = note.as_ref().filter(|n| !n.trim().is_empty()) {
      sample.return_reason = Some(reason.trim().to_owned());
    }
  } else if target == IntakeStatus::Submitted {
    sample.return_reason = None;
  }
  records::update_sample(conn, &sample)?;

  let entry = NewAuditEntry::new(
    &actor,
    AuditAction::SampleIntakeTransition,
    EntityType::Sample,
    sample_id,
  )
  .note(note)
  .before(&json!({ "administrative_status": from }))?
  .after(&json!({
    "administrative_status": target,
    "return_reason": sample.return_reason,
  }))?;
  audit::append(conn, entry, at)?;
  Ok(sample)
}

fn require_driver_role(role: Role, driver: Driver) -> Result<()> {
  if driver_roles::<Intake>(driver).contains(&role) {
    Ok(())
  } else {
    Err(Rejection::Forbidden(format!("role {role} may not perform {driver}")).into())
  }
}

/// Record the checklist for the sample's current intake round and move the
/// sample on: every item passed advances to `awaiting_verification`, any
/// failure returns it with a reason.
pub fn submit_checklist(
  conn: &Connection,
  sample_id: Uuid,
  submission: ChecklistSubmission,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<IntakeChecklist> {
  let mut sample = records::require_sample(conn, sample_id)?;
  require_driver_role(actor.role, Driver::Checklist)?;

  if submission.checks.is_empty() {
    return Err(
      Rejection::validation(BlockReason::MissingFields, "the checklist has no items").into(),
    );
  }
  if sample.intake_round > 0
    && records::load_checklist(conn, sample_id, sample.intake_round)?.is_some()
  {
    return Err(
      Rejection::Conflict(format!(
        "an intake checklist was already recorded for round {}",
        sample.intake_round
      ))
      .into(),
    );
  }
  let from = sample.administrative_status;
  if from != IntakeStatus::PhysicallyReceived {
    return Err(
      Rejection::validation(
        BlockReason::NotEligible,
        format!("checklist requires physically_received, sample is {from}"),
      )
      .into(),
    );
  }

  let passed = submission.passed();
  let target = if passed {
    IntakeStatus::AwaitingVerification
  } else {
    IntakeStatus::Returned
  };
  let edge = check_transition::<Intake>(actor.role, from, target, Driver::Checklist)?;

  let checklist = IntakeChecklist {
    checklist_id: Uuid::new_v4(),
    sample_id,
    intake_round: sample.intake_round,
    passed,
    submitted_by: actor.actor_id,
    submitted_at: at,
    checks: submission.checks.clone(),
    notes: submission.notes.clone(),
  };
  records::insert_checklist(conn, &checklist)?;

  sample.apply_intake(edge, at);
  sample.return_reason = submission.return_reason();
  records::update_sample(conn, &sample)?;

  let entry = NewAuditEntry::new(
    &actor,
    AuditAction::SampleIntakeChecklist,
    EntityType::Sample,
    sample_id,
  )
  .note(sample.return_reason.clone())
  .before(&json!({ "administrative_status": from }))?
  .after(&json!({
    "administrative_status": target,
    "intake_round": checklist.intake_round,
    "passed": passed,
    "failed_items": submission.failed_items(),
  }))?;
  audit::append(conn, entry, at)?;
  Ok(checklist)
}

/// Validate intake and assign the lab sample code.
///
/// Check-then-allocate happens inside the caller's transaction: a sample
/// that already carries a code gets it back without touching the counter.
pub fn validate(
  conn: &Connection,
  sample_id: Uuid,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<IntakeValidation> {
  let mut sample = records::require_sample(conn, sample_id)?;
  require_driver_role(actor.role, Driver::IntakeValidation)?;

  if let Some(code) = sample.lab_sample_code.clone() {
    return Ok(IntakeValidation { sample, lab_sample_code: code, newly_assigned: false });
  }

  let from = sample.administrative_status;
  if from != IntakeStatus::IntakeChecklistPassed {
    return Err(
      Rejection::validation(
        BlockReason::NotEligible,
        format!("intake validation requires intake_checklist_passed, sample is {from}"),
      )
      .into(),
    );
  }
  match records::load_checklist(conn, sample_id, sample.intake_round)? {
    None => {
      return Err(
        Rejection::validation(
          BlockReason::ChecklistMissing,
          "no intake checklist recorded for the current intake round",
        )
        .into(),
      );
    }
    Some(c) if !c.passed => {
      return Err(
        Rejection::validation(BlockReason::ChecklistFailed, "the intake checklist failed")
          .into(),
      );
    }
    Some(_) => {}
  }

  let edge = check_transition::<Intake>(
    actor.role,
    from,
    IntakeStatus::IntakeValidated,
    Driver::IntakeValidation,
  )?;

  let allocation = sequence::take(conn, Series::LabSampleCode)?;
  sample.lab_sample_code = Some(allocation.formatted.clone());
  sample.apply_intake(edge, at);
  records::update_sample(conn, &sample)?;

  let entry = NewAuditEntry::new(
    &actor,
    AuditAction::SampleIntakeValidate,
    EntityType::Sample,
    sample_id,
  )
  .before(&json!({ "administrative_status": from, "lab_sample_code": null }))?
  .after(&json!({
    "administrative_status": IntakeStatus::IntakeValidated,
    "lab_sample_code": allocation.formatted,
    "sequence_value": allocation.value,
  }))?;
  audit::append(conn, entry, at)?;

  Ok(IntakeValidation {
    lab_sample_code: allocation.formatted,
    sample,
    newly_assigned: true,
  })
}
