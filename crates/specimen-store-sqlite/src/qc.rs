//! QC controls and runs. A run is scored against the control's recent
//! history for the same sample, read in the transaction that appends it.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use specimen_core::{
  BlockReason, Error as Rejection,
  audit::{AuditAction, EntityType, NewAuditEntry},
  policy::{self, Operation},
  qc::{self, NewQcControl, QcControl, QcRun, QcSummary},
  role::Actor,
  workflow::{SampleTesting, Workflow},
};

use crate::{Result, audit, records};

pub fn create_control(
  conn: &Connection,
  input: NewQcControl,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<QcControl> {
  policy::authorize(actor.role, Operation::CreateQcControl)?;
  let rules = input.parse_rules()?;

  let control = QcControl {
    qc_control_id: Uuid::new_v4(),
    parameter_id: input.parameter_id,
    method_id: input.method_id,
    name: input.name.trim().to_owned(),
    target: input.target,
    tolerance: input.tolerance,
    rules,
    active: true,
    created_by: actor.actor_id,
    created_at: at,
  };
  records::insert_control(conn, &control)?;

  let entry = NewAuditEntry::new(
    &actor,
    AuditAction::QcControlCreate,
    EntityType::QcControl,
    control.qc_control_id,
  )
  .after(&control)?;
  audit::append(conn, entry, at)?;
  Ok(control)
}

pub fn deactivate_control(
  conn: &Connection,
  id: Uuid,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<QcControl> {
  let mut control = records::require_control(conn, id)?;
  policy::authorize(actor.role, Operation::DeactivateQcControl)?;
  if !control.active {
    return Err(Rejection::Conflict(format!("QC control {id} is already inactive")).into());
  }

  records::set_control_active(conn, id, false)?;
  control.active = false;

  let entry =
    NewAuditEntry::new(&actor, AuditAction::QcControlDeactivate, EntityType::QcControl, id)
      .before(&json!({ "active": true }))?
      .after(&json!({ "active": false }))?;
  audit::append(conn, entry, at)?;
  Ok(control)
}

pub fn record_run(
  conn: &Connection,
  sample_id: Uuid,
  qc_control_id: Uuid,
  value: f64,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<QcRun> {
  let sample = records::require_sample(conn, sample_id)?;
  let control = records::require_control(conn, qc_control_id)?;
  policy::authorize(actor.role, Operation::RecordQcRun)?;

  if !control.active {
    return Err(
      Rejection::validation(
        BlockReason::InvalidValue,
        format!("QC control {qc_control_id} is inactive"),
      )
      .into(),
    );
  }
  if SampleTesting::is_terminal(sample.testing_status) {
    return Err(
      Rejection::validation(
        BlockReason::NotEligible,
        format!("sample is {}; QC is closed", sample.testing_status),
      )
      .into(),
    );
  }

  let keep = qc::history_window(&control.rules).saturating_sub(1);
  let history = records::recent_z_scores(conn, sample_id, qc_control_id, keep)?;
  let evaluation = qc::evaluate_run(&control, value, &history)?;

  let run = QcRun {
    run_id: Uuid::new_v4(),
    sample_id,
    qc_control_id,
    value,
    z_score: evaluation.z_score,
    violated_rules: evaluation.violated_rules,
    status: evaluation.status,
    recorded_by: actor.actor_id,
    recorded_at: at,
  };
  records::insert_run(conn, &run)?;

  let entry = NewAuditEntry::new(&actor, AuditAction::QcRunRecord, EntityType::QcRun, run.run_id)
    .after(&run)?;
  audit::append(conn, entry, at)?;
  Ok(run)
}

/// The batch verdict for a sample: the worst status among its runs.
pub fn summary(conn: &Connection, sample_id: Uuid) -> Result<QcSummary> {
  let runs = records::runs_for_sample(conn, sample_id)?;
  Ok(qc::summarize(&runs))
}
