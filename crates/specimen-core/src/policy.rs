//! Transition authorization and the QC gate.
//!
//! Everything here is pure so it can be exercised without a store.
//! Transition rights are decided per edge by the tables in
//! [`crate::workflow`]; operations that are not transitions carry their own
//! role sets in [`Operation`].

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::{
  BlockReason, Error, Result,
  qc::{QcStatus, QcSummary},
  role::{Actor, Role},
  workflow::{Workflow, find_edge},
};

/// Whether `role` may move a `W` entity from `from` to `to`.
///
/// Authorization is decided strictly on the edge: a role holding one edge
/// gains nothing on any other.
pub fn is_allowed<W: Workflow>(role: Role, from: W::State, to: W::State) -> bool {
  from != to && find_edge::<W>(from, to).is_some_and(|edge| edge.permits(role))
}

// ─── Non-transition operations ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
  CreateSample,
  AddTest,
  CreateQcControl,
  DeactivateQcControl,
  RecordQcRun,
  AllocateSequence,
  EnsureCertificate,
  LockArtifact,
  CreateLetterOfOrder,
}

impl Operation {
  pub fn roles(self) -> &'static [Role] {
    use Role::*;
    match self {
      Self::CreateSample => &[Client, Admin, OperationalManager, LabHead],
      Self::AddTest => &[Admin, OperationalManager, LabHead],
      Self::CreateQcControl => &[OperationalManager, LabHead],
      Self::DeactivateQcControl => &[Admin, OperationalManager, LabHead],
      Self::RecordQcRun => &[Analyst, OperationalManager, LabHead],
      Self::AllocateSequence => &[Admin],
      Self::EnsureCertificate => &[Admin, OperationalManager, LabHead],
      Self::LockArtifact => &[LabHead],
      Self::CreateLetterOfOrder => &[Admin],
    }
  }
}

pub fn authorize(role: Role, operation: Operation) -> Result<()> {
  if operation.roles().contains(&role) {
    Ok(())
  } else {
    Err(Error::Forbidden(format!("role {role} may not {operation}")))
  }
}

/// Whether `role` may name someone other than itself as a new sample's
/// assignee. Administrators may not; supervisory roles may.
pub fn may_override_assignee(role: Role) -> bool { role.is_supervisory() }

/// The assignee for a sample created by `actor`.
pub fn resolve_assignee(actor: &Actor, requested: Option<Uuid>) -> Result<Uuid> {
  match requested {
    None => Ok(actor.actor_id),
    Some(id) if id == actor.actor_id => Ok(id),
    Some(id) if may_override_assignee(actor.role) => Ok(id),
    Some(_) => Err(Error::Forbidden(format!(
      "role {} may not assign samples to other staff",
      actor.role
    ))),
  }
}

// ─── QC gate ─────────────────────────────────────────────────────────────────

/// Which QC verdicts block QC-gated transitions. `fail` always blocks;
/// `warning` is advisory unless configured otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcGatePolicy {
  #[serde(default)]
  pub block_on_warning: bool,
}

impl QcGatePolicy {
  pub fn check(&self, summary: &QcSummary) -> Result<()> {
    match summary.status {
      QcStatus::Fail => Err(Error::validation(
        BlockReason::QcFailed,
        format!("blocked by QC: {} failing run(s)", summary.counts.fail),
      )),
      QcStatus::Warning if self.block_on_warning => Err(Error::validation(
        BlockReason::QcWarning,
        format!("blocked by QC: {} warning run(s)", summary.counts.warning),
      )),
      _ => Ok(()),
    }
  }
}
