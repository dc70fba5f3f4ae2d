//! Versioned, data-driven transition tables.
//!
//! Each workflow is one [`Workflow`] implementor whose edges live in a single
//! static table. Every edge names the roles that may traverse it, the
//! operation that drives it, whether a QC verdict gates it and which
//! milestone it stamps. Nothing outside this module decides adjacency.
//!
//! ```text
//! intake:   draft ─▶ submitted ─▶ ready_for_delivery ─▶ in_transit_to_collector
//!             ▲          │                                      │
//!             └─ returned/needs_revision                 under_inspection
//!                                                               │
//!           physically_received ─(checklist)─▶ awaiting_verification
//!                                                               │
//!           intake_checklist_passed ─(intake validation)─▶ intake_validated
//!
//! testing:  received ─▶ in_progress ─▶ testing_completed ─▶ verified
//!                                           ─▶ validated ─▶ reported
//! ```

use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::{
  Error, Result,
  role::Role,
  status::{IntakeStatus, LoaStatus, Milestone, TestStatus, TestingStatus},
};

/// Bumped whenever an edge, role set or status vocabulary changes.
pub const TRANSITION_TABLE_VERSION: u32 = 1;

// ─── Edges ───────────────────────────────────────────────────────────────────

/// Which operation is allowed to traverse an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Driver {
  /// A plain status-change request.
  Manual,
  /// Submission of the intake checklist.
  Checklist,
  /// Intake validation, which also mints the lab sample code.
  IntakeValidation,
  /// Collection of the internal signatures on a letter of order.
  Signature,
}

/// The source side of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "state", rename_all = "snake_case")]
pub enum Origin<S> {
  State(S),
  /// Any state that is not terminal for the workflow (override edges).
  AnyActive,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Edge<S: Copy + 'static> {
  pub from:      Origin<S>,
  pub to:        S,
  pub roles:     &'static [Role],
  pub driver:    Driver,
  pub qc_gated:  bool,
  pub milestone: Option<Milestone>,
}

impl<S: Copy + 'static> Edge<S> {
  const fn new(from: Origin<S>, to: S, roles: &'static [Role]) -> Self {
    Self {
      from,
      to,
      roles,
      driver: Driver::Manual,
      qc_gated: false,
      milestone: None,
    }
  }

  const fn between(from: S, to: S, roles: &'static [Role]) -> Self {
    Self::new(Origin::State(from), to, roles)
  }

  const fn from_any_active(to: S, roles: &'static [Role]) -> Self {
    Self::new(Origin::AnyActive, to, roles)
  }

  const fn stamps(mut self, milestone: Milestone) -> Self {
    self.milestone = Some(milestone);
    self
  }

  const fn driven_by(mut self, driver: Driver) -> Self {
    self.driver = driver;
    self
  }

  const fn qc_gated(mut self) -> Self {
    self.qc_gated = true;
    self
  }

  pub fn permits(&self, role: Role) -> bool { self.roles.contains(&role) }
}

// ─── Workflow trait ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowKind {
  Intake,
  SampleTesting,
  TestTesting,
  LetterOfOrder,
}

pub trait Workflow {
  type State: Copy + PartialEq + std::fmt::Display + Serialize + 'static;

  const KIND: WorkflowKind;

  fn edges() -> &'static [Edge<Self::State>];

  fn is_terminal(state: Self::State) -> bool;
}

/// Locate the edge `from → to`, if the table has one.
pub fn find_edge<W: Workflow>(
  from: W::State,
  to: W::State,
) -> Option<&'static Edge<W::State>> {
  W::edges().iter().find(|edge| {
    edge.to == to
      && match edge.from {
        Origin::State(s) => s == from,
        Origin::AnyActive => !W::is_terminal(from),
      }
  })
}

/// Validate a requested transition against the table.
///
/// Checks run in a fixed order: same-state requests are `BadRequest`,
/// missing edges and edges owned by another driver are `InvalidTransition`,
/// and a role absent from the edge is `Forbidden`.
pub fn check_transition<W: Workflow>(
  role: Role,
  from: W::State,
  to: W::State,
  driver: Driver,
) -> Result<&'static Edge<W::State>> {
  if from == to {
    return Err(Error::BadRequest(format!(
      "{} is already {from}",
      W::KIND
    )));
  }

  let edge = find_edge::<W>(from, to).ok_or_else(|| {
    Error::InvalidTransition(format!("{}: {from} -> {to}", W::KIND))
  })?;

  if edge.driver != driver {
    return Err(Error::InvalidTransition(format!(
      "{}: {from} -> {to} is driven by {}",
      W::KIND,
      edge.driver
    )));
  }

  if !edge.permits(role) {
    return Err(Error::Forbidden(format!(
      "role {role} may not move {} from {from} to {to}",
      W::KIND
    )));
  }

  Ok(edge)
}

/// The roles that may drive the first edge of `driver` in `W`.
pub fn driver_roles<W: Workflow>(driver: Driver) -> &'static [Role] {
  W::edges()
    .iter()
    .find(|edge| edge.driver == driver)
    .map(|edge| edge.roles)
    .unwrap_or(&[])
}

// ─── Role sets ───────────────────────────────────────────────────────────────

const CLIENT_OR_ADMIN: &[Role] = &[Role::Client, Role::Admin];
const ADMIN: &[Role] = &[Role::Admin];
const COLLECTOR: &[Role] = &[Role::SampleCollector];
const COLLECTOR_OR_OM: &[Role] =
  &[Role::SampleCollector, Role::OperationalManager];
const OM: &[Role] = &[Role::OperationalManager];
const SUPERVISORS: &[Role] = &[Role::OperationalManager, Role::LabHead];
const ANALYST: &[Role] = &[Role::Analyst];
const ANALYST_OR_OM: &[Role] = &[Role::Analyst, Role::OperationalManager];
const LAB_HEAD: &[Role] = &[Role::LabHead];
const LAB_HEAD_OR_ADMIN: &[Role] = &[Role::LabHead, Role::Admin];
const CLIENT: &[Role] = &[Role::Client];

// ─── Intake ──────────────────────────────────────────────────────────────────

pub struct Intake;

static INTAKE_EDGES: &[Edge<IntakeStatus>] = {
  use IntakeStatus::*;
  &[
    Edge::between(Draft, Submitted, CLIENT_OR_ADMIN).stamps(Milestone::SubmittedAt),
    Edge::between(Submitted, Returned, ADMIN),
    Edge::between(Submitted, NeedsRevision, ADMIN),
    Edge::between(Submitted, ReadyForDelivery, ADMIN),
    // revision loops
    Edge::between(Returned, Draft, CLIENT_OR_ADMIN),
    Edge::between(Returned, Submitted, CLIENT_OR_ADMIN).stamps(Milestone::SubmittedAt),
    Edge::between(NeedsRevision, Draft, CLIENT_OR_ADMIN),
    Edge::between(NeedsRevision, Submitted, CLIENT_OR_ADMIN)
      .stamps(Milestone::SubmittedAt),
    // custody
    Edge::between(ReadyForDelivery, InTransitToCollector, CLIENT_OR_ADMIN)
      .stamps(Milestone::DispatchedToCollectorAt),
    Edge::between(InTransitToCollector, UnderInspection, COLLECTOR),
    Edge::between(UnderInspection, PhysicallyReceived, COLLECTOR)
      .stamps(Milestone::PhysicallyReceivedAt),
    Edge::between(UnderInspection, InspectionFailedReturnedToAdmin, COLLECTOR),
    Edge::between(InspectionFailedReturnedToAdmin, Returned, ADMIN),
    // checklist decision
    Edge::between(PhysicallyReceived, AwaitingVerification, COLLECTOR_OR_OM)
      .driven_by(Driver::Checklist),
    Edge::between(PhysicallyReceived, Returned, COLLECTOR_OR_OM)
      .driven_by(Driver::Checklist),
    Edge::between(AwaitingVerification, IntakeChecklistPassed, OM),
    Edge::between(AwaitingVerification, Returned, OM),
    Edge::between(IntakeChecklistPassed, IntakeValidated, SUPERVISORS)
      .driven_by(Driver::IntakeValidation)
      .stamps(Milestone::IntakeValidatedAt),
    // sample id review
    Edge::between(IntakeValidated, WaitingSampleIdAssignment, ADMIN),
    Edge::between(WaitingSampleIdAssignment, SampleIdPendingVerification, ADMIN),
    Edge::between(SampleIdPendingVerification, WaitingSampleIdAssignment, SUPERVISORS),
    Edge::between(
      SampleIdPendingVerification,
      SampleIdApprovedForAssignment,
      SUPERVISORS,
    ),
    // analyst handoff
    Edge::between(IntakeValidated, InTransitToAnalyst, COLLECTOR)
      .stamps(Milestone::DispatchedToAnalystAt),
    Edge::between(SampleIdApprovedForAssignment, InTransitToAnalyst, COLLECTOR)
      .stamps(Milestone::DispatchedToAnalystAt),
    Edge::between(InTransitToAnalyst, ReceivedByAnalyst, ANALYST)
      .stamps(Milestone::ReceivedByAnalystAt),
  ]
};

impl Workflow for Intake {
  type State = IntakeStatus;

  const KIND: WorkflowKind = WorkflowKind::Intake;

  fn edges() -> &'static [Edge<IntakeStatus>] { INTAKE_EDGES }

  fn is_terminal(state: IntakeStatus) -> bool {
    matches!(state, IntakeStatus::ReceivedByAnalyst)
  }
}

// ─── Sample testing ──────────────────────────────────────────────────────────

pub struct SampleTesting;

static SAMPLE_TESTING_EDGES: &[Edge<TestingStatus>] = {
  use TestingStatus::*;
  &[
    Edge::between(Received, InProgress, ANALYST_OR_OM)
      .stamps(Milestone::TestingStartedAt),
    Edge::between(InProgress, TestingCompleted, ANALYST)
      .stamps(Milestone::TestingCompletedAt),
    Edge::between(TestingCompleted, Verified, OM)
      .qc_gated()
      .stamps(Milestone::OmVerifiedAt),
    Edge::between(Verified, Validated, LAB_HEAD)
      .qc_gated()
      .stamps(Milestone::LhValidatedAt),
    Edge::between(Validated, Reported, LAB_HEAD_OR_ADMIN).stamps(Milestone::ReportedAt),
    Edge::from_any_active(Cancelled, SUPERVISORS).stamps(Milestone::ClosedAt),
    Edge::from_any_active(Failed, SUPERVISORS).stamps(Milestone::ClosedAt),
  ]
};

impl Workflow for SampleTesting {
  type State = TestingStatus;

  const KIND: WorkflowKind = WorkflowKind::SampleTesting;

  fn edges() -> &'static [Edge<TestingStatus>] { SAMPLE_TESTING_EDGES }

  fn is_terminal(state: TestingStatus) -> bool {
    matches!(
      state,
      TestingStatus::Reported | TestingStatus::Cancelled | TestingStatus::Failed
    )
  }
}

// ─── Per-parameter testing ───────────────────────────────────────────────────

pub struct TestTesting;

static TEST_TESTING_EDGES: &[Edge<TestStatus>] = {
  use TestStatus::*;
  &[
    Edge::between(Draft, InProgress, ANALYST_OR_OM).stamps(Milestone::StartedAt),
    Edge::between(InProgress, Measured, ANALYST).stamps(Milestone::MeasuredAt),
    Edge::between(Measured, Verified, OM)
      .qc_gated()
      .stamps(Milestone::OmVerifiedAt),
    Edge::between(Verified, Validated, LAB_HEAD)
      .qc_gated()
      .stamps(Milestone::LhValidatedAt),
    Edge::from_any_active(Cancelled, SUPERVISORS).stamps(Milestone::ClosedAt),
    Edge::from_any_active(Failed, SUPERVISORS).stamps(Milestone::ClosedAt),
  ]
};

impl Workflow for TestTesting {
  type State = TestStatus;

  const KIND: WorkflowKind = WorkflowKind::TestTesting;

  fn edges() -> &'static [Edge<TestStatus>] { TEST_TESTING_EDGES }

  fn is_terminal(state: TestStatus) -> bool {
    matches!(
      state,
      TestStatus::Validated | TestStatus::Cancelled | TestStatus::Failed
    )
  }
}

// ─── Letter of order ─────────────────────────────────────────────────────────

pub struct LetterOfOrder;

static LOA_EDGES: &[Edge<LoaStatus>] = {
  use LoaStatus::*;
  &[
    Edge::between(Draft, InternallySigned, SUPERVISORS).driven_by(Driver::Signature),
    Edge::between(InternallySigned, Sent, ADMIN),
    Edge::between(Sent, ClientSigned, CLIENT),
  ]
};

impl Workflow for LetterOfOrder {
  type State = LoaStatus;

  const KIND: WorkflowKind = WorkflowKind::LetterOfOrder;

  fn edges() -> &'static [Edge<LoaStatus>] { LOA_EDGES }

  fn is_terminal(state: LoaStatus) -> bool { matches!(state, LoaStatus::ClientSigned) }
}

// ─── Published tables ────────────────────────────────────────────────────────

/// A serialisable dump of every table, for operators and clients.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionTables {
  pub version:        u32,
  pub intake:         &'static [Edge<IntakeStatus>],
  pub sample_testing: &'static [Edge<TestingStatus>],
  pub test_testing:   &'static [Edge<TestStatus>],
  pub letter_of_order: &'static [Edge<LoaStatus>],
}

pub fn tables() -> TransitionTables {
  TransitionTables {
    version:         TRANSITION_TABLE_VERSION,
    intake:          Intake::edges(),
    sample_testing:  SampleTesting::edges(),
    test_testing:    TestTesting::edges(),
    letter_of_order: LetterOfOrder::edges(),
  }
}
