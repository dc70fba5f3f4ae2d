//! Integration tests for `SqliteStore`, mostly against an in-memory database.

use std::{collections::BTreeMap, time::Duration};

use specimen_core::{
  BlockReason, Error as Rejection,
  artifact::ArtifactKind,
  audit::{AuditAction, EntityType},
  policy::QcGatePolicy,
  qc::{NewQcControl, QcStatus},
  role::{Actor, Role},
  sample::{ChecklistSubmission, NewSample, NewSampleTest, Sample, SampleTest},
  sequence::Series,
  status::{HighLevelStatus, IntakeStatus, LoaStatus, Milestone, TestStatus, TestingStatus},
  store::LabStore,
};
use uuid::Uuid;

use crate::{Error, SqliteStore, StoreOptions};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

struct Staff {
  client:    Actor,
  admin:     Actor,
  collector: Actor,
  analyst:   Actor,
  om:        Actor,
  lh:        Actor,
}

fn staff() -> Staff {
  let actor = |role| Actor::new(Uuid::new_v4(), role);
  Staff {
    client:    actor(Role::Client),
    admin:     actor(Role::Admin),
    collector: actor(Role::SampleCollector),
    analyst:   actor(Role::Analyst),
    om:        actor(Role::OperationalManager),
    lh:        actor(Role::LabHead),
  }
}

fn rejection(err: Error) -> Rejection {
  match err {
    Error::Core(e) => e,
    other => panic!("expected a rejection, got {other}"),
  }
}

fn reason(err: Error) -> BlockReason {
  match rejection(err) {
    Rejection::Validation { reason, .. } => reason,
    other => panic!("expected a validation error, got {other}"),
  }
}

fn checklist(items: &[(&str, bool)]) -> ChecklistSubmission {
  ChecklistSubmission {
    checks: items.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect(),
    notes:  BTreeMap::new(),
  }
}

async fn trail_len(s: &SqliteStore, entity: EntityType, id: Uuid) -> usize {
  s.audit_trail(entity, id.to_string()).await.unwrap().len()
}

async fn new_sample(s: &SqliteStore, who: &Staff) -> Sample {
  s.create_sample(
    NewSample { client_id: who.client.actor_id, ..Default::default() },
    who.client,
  )
  .await
  .unwrap()
}

/// Drive a sample from `draft` to `physically_received`.
async fn received(s: &SqliteStore, who: &Staff, sample: &Sample) {
  use IntakeStatus::*;
  let steps = [
    (Submitted, who.client),
    (ReadyForDelivery, who.admin),
    (InTransitToCollector, who.admin),
    (UnderInspection, who.collector),
    (PhysicallyReceived, who.collector),
  ];
  for (target, actor) in steps {
    s.transition_intake(sample.sample_id, target, None, actor).await.unwrap();
  }
}

/// A sample that has passed its checklist and been validated.
async fn validated_sample(s: &SqliteStore, who: &Staff) -> Sample {
  let sample = new_sample(s, who).await;
  received(s, who, &sample).await;
  s.submit_checklist(sample.sample_id, checklist(&[("sealed", true)]), who.collector)
    .await
    .unwrap();
  s.transition_intake(
    sample.sample_id,
    IntakeStatus::IntakeChecklistPassed,
    None,
    who.om,
  )
  .await
  .unwrap();
  s.validate_intake(sample.sample_id, who.om).await.unwrap().sample
}

async fn add_test(s: &SqliteStore, who: &Staff, sample: &Sample) -> SampleTest {
  s.add_test(
    NewSampleTest {
      sample_id:    sample.sample_id,
      parameter_id: Uuid::new_v4(),
      method_id:    None,
    },
    who.admin,
  )
  .await
  .unwrap()
}

/// Move a test from `draft` to `measured`.
async fn measured(s: &SqliteStore, who: &Staff, test: &SampleTest) {
  s.advance_test(test.test_id, TestStatus::InProgress, None, who.analyst)
    .await
    .unwrap();
  s.advance_test(test.test_id, TestStatus::Measured, None, who.analyst)
    .await
    .unwrap();
}

async fn control(s: &SqliteStore, who: &Staff, rules: &[&str]) -> Uuid {
  s.create_qc_control(
    NewQcControl {
      parameter_id: Uuid::new_v4(),
      method_id:    None,
      name:         "level 1".into(),
      target:       0.0,
      tolerance:    1.0,
      rules:        rules.iter().map(|r| (*r).to_owned()).collect(),
    },
    who.om,
  )
  .await
  .unwrap()
  .qc_control_id
}

// ─── Samples ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_sample_starts_both_tracks_and_is_audited() {
  let s = store().await;
  let who = staff();

  let sample = new_sample(&s, &who).await;
  assert_eq!(sample.administrative_status, IntakeStatus::Draft);
  assert_eq!(sample.testing_status, TestingStatus::Received);
  assert_eq!(sample.high_level_status(), HighLevelStatus::Registered);
  assert_eq!(sample.created_by, who.client.actor_id);
  assert_eq!(sample.assigned_to, who.client.actor_id);

  let fetched = s.get_sample(sample.sample_id).await.unwrap().unwrap();
  assert_eq!(fetched, sample);

  let trail = s
    .audit_trail(EntityType::Sample, sample.sample_id.to_string())
    .await
    .unwrap();
  assert_eq!(trail.len(), 1);
  assert_eq!(trail[0].action, AuditAction::SampleCreate);
  assert_eq!(trail[0].actor_id, who.client.actor_id);
  assert_eq!(trail[0].actor_role, Role::Client);
}

#[tokio::test]
async fn only_supervisors_assign_samples_to_others() {
  let s = store().await;
  let who = staff();
  let other = Uuid::new_v4();
  let input = |assigned_to| NewSample {
    client_id: who.client.actor_id,
    description: Some("river water".into()),
    assigned_to,
  };

  let err = s.create_sample(input(Some(other)), who.admin).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));

  let sample = s.create_sample(input(Some(other)), who.om).await.unwrap();
  assert_eq!(sample.assigned_to, other);
  assert_eq!(sample.created_by, who.om.actor_id);

  let err = s.create_sample(input(None), who.analyst).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));
}

#[tokio::test]
async fn missing_sample_is_not_found() {
  let s = store().await;
  let who = staff();
  assert!(s.get_sample(Uuid::new_v4()).await.unwrap().is_none());

  let err = s
    .transition_intake(Uuid::new_v4(), IntakeStatus::Submitted, None, who.client)
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::NotFound(_)));
}

// ─── Intake track ────────────────────────────────────────────────────────────

#[tokio::test]
async fn same_state_request_is_bad_request_and_leaves_no_trace() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;

  let err = s
    .transition_intake(sample.sample_id, IntakeStatus::Draft, None, who.admin)
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::BadRequest(_)));
  assert_eq!(trail_len(&s, EntityType::Sample, sample.sample_id).await, 1);
}

#[tokio::test]
async fn role_off_the_edge_is_forbidden_and_leaves_no_trace() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;

  for actor in [who.collector, who.analyst, who.om, who.lh] {
    let err = s
      .transition_intake(sample.sample_id, IntakeStatus::Submitted, None, actor)
      .await
      .unwrap_err();
    assert!(matches!(rejection(err), Rejection::Forbidden(_)), "{}", actor.role);
  }

  let fetched = s.get_sample(sample.sample_id).await.unwrap().unwrap();
  assert_eq!(fetched.administrative_status, IntakeStatus::Draft);
  assert_eq!(trail_len(&s, EntityType::Sample, sample.sample_id).await, 1);
}

#[tokio::test]
async fn non_adjacent_target_is_invalid_transition() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;

  let err = s
    .transition_intake(sample.sample_id, IntakeStatus::PhysicallyReceived, None, who.admin)
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::InvalidTransition(_)));
}

#[tokio::test]
async fn checklist_edges_are_not_reachable_manually() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;
  received(&s, &who, &sample).await;

  let err = s
    .transition_intake(
      sample.sample_id,
      IntakeStatus::AwaitingVerification,
      None,
      who.collector,
    )
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::InvalidTransition(_)));
}

#[tokio::test]
async fn custody_steps_stamp_milestones_once() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;
  received(&s, &who, &sample).await;

  let sample = s.get_sample(sample.sample_id).await.unwrap().unwrap();
  assert_eq!(sample.administrative_status, IntakeStatus::PhysicallyReceived);
  assert_eq!(sample.intake_round, 1);
  let submitted = sample.milestones.get(Milestone::SubmittedAt).unwrap();
  assert!(sample.milestones.get(Milestone::PhysicallyReceivedAt).is_some());
  assert!(sample.milestones.get(Milestone::DispatchedToCollectorAt).is_some());

  // Creation plus five transitions, each audited once.
  assert_eq!(trail_len(&s, EntityType::Sample, sample.sample_id).await, 6);

  // A failed checklist and resubmission keeps the first submitted_at.
  s.submit_checklist(sample.sample_id, checklist(&[("sealed", false)]), who.collector)
    .await
    .unwrap();
  let again = s
    .transition_intake(sample.sample_id, IntakeStatus::Submitted, None, who.client)
    .await
    .unwrap();
  assert_eq!(again.milestones.get(Milestone::SubmittedAt), Some(submitted));
}

// ─── Checklist ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn passing_checklist_advances_to_awaiting_verification() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;
  received(&s, &who, &sample).await;

  let record = s
    .submit_checklist(
      sample.sample_id,
      checklist(&[("sealed", true), ("labelled", true)]),
      who.collector,
    )
    .await
    .unwrap();
  assert!(record.passed);
  assert_eq!(record.intake_round, 1);

  let sample = s.get_sample(sample.sample_id).await.unwrap().unwrap();
  assert_eq!(sample.administrative_status, IntakeStatus::AwaitingVerification);
  assert!(sample.return_reason.is_none());
}

#[tokio::test]
async fn failing_checklist_returns_the_sample_with_a_reason() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;
  received(&s, &who, &sample).await;

  let mut submission = checklist(&[("sealed", false), ("labelled", true)]);
  submission.notes.insert("sealed".into(), "cap missing".into());
  let record = s
    .submit_checklist(sample.sample_id, submission, who.collector)
    .await
    .unwrap();
  assert!(!record.passed);

  let sample = s.get_sample(sample.sample_id).await.unwrap().unwrap();
  assert_eq!(sample.administrative_status, IntakeStatus::Returned);
  assert_eq!(
    sample.return_reason.as_deref(),
    Some("intake checklist failed (sealed: cap missing)")
  );
}

#[tokio::test]
async fn checklist_is_single_shot_per_intake_round() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;
  received(&s, &who, &sample).await;

  s.submit_checklist(sample.sample_id, checklist(&[("sealed", false)]), who.collector)
    .await
    .unwrap();
  let audited = trail_len(&s, EntityType::Sample, sample.sample_id).await;

  let err = s
    .submit_checklist(sample.sample_id, checklist(&[("sealed", true)]), who.collector)
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::Conflict(_)));
  assert_eq!(trail_len(&s, EntityType::Sample, sample.sample_id).await, audited);

  // Resubmitted and delivered again: a fresh round takes a fresh checklist.
  s.transition_intake(sample.sample_id, IntakeStatus::Submitted, None, who.client)
    .await
    .unwrap();
  for (target, actor) in [
    (IntakeStatus::ReadyForDelivery, who.admin),
    (IntakeStatus::InTransitToCollector, who.admin),
    (IntakeStatus::UnderInspection, who.collector),
    (IntakeStatus::PhysicallyReceived, who.collector),
  ] {
    s.transition_intake(sample.sample_id, target, None, actor).await.unwrap();
  }
  let record = s
    .submit_checklist(sample.sample_id, checklist(&[("sealed", true)]), who.om)
    .await
    .unwrap();
  assert_eq!(record.intake_round, 2);
  assert!(record.passed);
}

#[tokio::test]
async fn checklist_requires_physical_receipt_and_items() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;

  let err = s
    .submit_checklist(sample.sample_id, checklist(&[("sealed", true)]), who.collector)
    .await
    .unwrap_err();
  assert_eq!(reason(err), BlockReason::NotEligible);

  received(&s, &who, &sample).await;
  let err = s
    .submit_checklist(sample.sample_id, checklist(&[]), who.collector)
    .await
    .unwrap_err();
  assert_eq!(reason(err), BlockReason::MissingFields);

  let err = s
    .submit_checklist(sample.sample_id, checklist(&[("sealed", true)]), who.analyst)
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));
}

// ─── Intake validation and numbering ─────────────────────────────────────────

#[tokio::test]
async fn intake_validation_is_idempotent() {
  let s = store().await;
  let who = staff();
  let before = s.peek_sequence(Series::LabSampleCode).await.unwrap();

  let sample = validated_sample(&s, &who).await;
  assert_eq!(sample.administrative_status, IntakeStatus::IntakeValidated);
  assert_eq!(sample.lab_sample_code.as_deref(), Some("BML-001"));
  assert!(sample.intake_complete());
  let audited = trail_len(&s, EntityType::Sample, sample.sample_id).await;

  let again = s.validate_intake(sample.sample_id, who.lh).await.unwrap();
  assert!(!again.newly_assigned);
  assert_eq!(again.lab_sample_code, "BML-001");

  assert_eq!(s.peek_sequence(Series::LabSampleCode).await.unwrap(), before + 1);
  assert_eq!(trail_len(&s, EntityType::Sample, sample.sample_id).await, audited);
}

#[tokio::test]
async fn intake_validation_requires_a_passed_checklist_state() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;
  received(&s, &who, &sample).await;

  let err = s.validate_intake(sample.sample_id, who.om).await.unwrap_err();
  assert_eq!(reason(err), BlockReason::NotEligible);

  let err = s.validate_intake(sample.sample_id, who.admin).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));

  assert_eq!(s.peek_sequence(Series::LabSampleCode).await.unwrap(), 1);
}

#[tokio::test]
async fn back_to_back_validations_get_increasing_codes() {
  let s = store().await;
  let who = staff();
  let first = validated_sample(&s, &who).await;
  let second = validated_sample(&s, &who).await;
  assert_eq!(first.lab_sample_code.as_deref(), Some("BML-001"));
  assert_eq!(second.lab_sample_code.as_deref(), Some("BML-002"));
}

#[tokio::test]
async fn concurrent_validations_never_collide() {
  let s = store().await;
  let who = staff();

  let mut ready = Vec::new();
  for _ in 0..6 {
    let sample = new_sample(&s, &who).await;
    received(&s, &who, &sample).await;
    s.submit_checklist(sample.sample_id, checklist(&[("sealed", true)]), who.collector)
      .await
      .unwrap();
    s.transition_intake(
      sample.sample_id,
      IntakeStatus::IntakeChecklistPassed,
      None,
      who.om,
    )
    .await
    .unwrap();
    ready.push(sample.sample_id);
  }

  // Each sample is validated twice at once; the duplicate must not consume
  // a second value.
  let mut handles = Vec::new();
  for id in ready.iter().chain(ready.iter()).copied() {
    let s = s.clone();
    let om = who.om;
    handles.push(tokio::spawn(async move { s.validate_intake(id, om).await }));
  }
  let mut by_sample: BTreeMap<Uuid, Vec<String>> = BTreeMap::new();
  for handle in handles {
    let v = handle.await.unwrap().unwrap();
    by_sample.entry(v.sample.sample_id).or_default().push(v.lab_sample_code);
  }

  let mut codes = Vec::new();
  for (_, pair) in by_sample {
    assert_eq!(pair.len(), 2);
    assert_eq!(pair[0], pair[1]);
    codes.push(pair[0].clone());
  }
  codes.sort();
  let expected: Vec<String> = (1..=6).map(|n| Series::LabSampleCode.render(n)).collect();
  assert_eq!(codes, expected);
  assert_eq!(s.peek_sequence(Series::LabSampleCode).await.unwrap(), 7);
}

#[tokio::test]
async fn direct_allocation_is_limited_to_unowned_series() {
  let s = store().await;
  let who = staff();

  let err = s.allocate(Series::LabSampleCode, who.admin).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));
  let err = s.allocate(Series::ParameterCatalog, who.analyst).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));

  let first = s.allocate(Series::ParameterCatalog, who.admin).await.unwrap();
  let second = s.allocate(Series::ParameterCatalog, who.admin).await.unwrap();
  assert_eq!(first.formatted, "PRM-0001");
  assert_eq!(second.value, 2);

  let trail = s
    .audit_trail(EntityType::Sequence, "PARAMETER_CATALOG_NO".into())
    .await
    .unwrap();
  assert_eq!(trail.len(), 2);
  assert!(trail.iter().all(|e| e.action == AuditAction::SequenceAllocate));
}

// ─── Laboratory tracks ───────────────────────────────────────────────────────

#[tokio::test]
async fn testing_waits_for_intake_validation() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;

  let err = s
    .advance_sample(sample.sample_id, TestingStatus::InProgress, None, who.analyst)
    .await
    .unwrap_err();
  assert_eq!(reason(err), BlockReason::IntakeIncomplete);

  let test = add_test(&s, &who, &sample).await;
  let err = s
    .advance_test(test.test_id, TestStatus::InProgress, None, who.analyst)
    .await
    .unwrap_err();
  assert_eq!(reason(err), BlockReason::IntakeIncomplete);
}

#[tokio::test]
async fn sample_track_runs_to_reported() {
  let s = store().await;
  let who = staff();
  let sample = validated_sample(&s, &who).await;
  let id = sample.sample_id;

  let steps = [
    (TestingStatus::InProgress, who.analyst, HighLevelStatus::Testing),
    (TestingStatus::TestingCompleted, who.analyst, HighLevelStatus::Testing),
    (TestingStatus::Verified, who.om, HighLevelStatus::Review),
    (TestingStatus::Validated, who.lh, HighLevelStatus::Review),
    (TestingStatus::Reported, who.admin, HighLevelStatus::Completed),
  ];
  for (target, actor, high_level) in steps {
    let sample = s.advance_sample(id, target, None, actor).await.unwrap();
    assert_eq!(sample.testing_status, target);
    assert_eq!(sample.high_level_status(), high_level);
  }

  let sample = s.get_sample(id).await.unwrap().unwrap();
  for m in [
    Milestone::TestingStartedAt,
    Milestone::TestingCompletedAt,
    Milestone::OmVerifiedAt,
    Milestone::LhValidatedAt,
    Milestone::ReportedAt,
  ] {
    assert!(sample.milestones.get(m).is_some(), "{m}");
  }

  let err = s
    .advance_sample(id, TestingStatus::Cancelled, None, who.lh)
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::InvalidTransition(_)));
}

#[tokio::test]
async fn skipping_a_step_is_rejected_for_a_capable_role() {
  let s = store().await;
  let who = staff();
  let sample = validated_sample(&s, &who).await;
  let id = sample.sample_id;
  for (target, actor) in [
    (TestingStatus::InProgress, who.analyst),
    (TestingStatus::TestingCompleted, who.analyst),
    (TestingStatus::Verified, who.om),
  ] {
    s.advance_sample(id, target, None, actor).await.unwrap();
  }

  let audited = trail_len(&s, EntityType::Sample, id).await;
  let err = s
    .advance_sample(id, TestingStatus::Reported, None, who.lh)
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::InvalidTransition(_)));

  let sample = s.get_sample(id).await.unwrap().unwrap();
  assert_eq!(sample.testing_status, TestingStatus::Verified);
  assert_eq!(trail_len(&s, EntityType::Sample, id).await, audited);
}

#[tokio::test]
async fn analyst_cannot_verify_a_test() {
  let s = store().await;
  let who = staff();
  let sample = validated_sample(&s, &who).await;
  let test = add_test(&s, &who, &sample).await;
  measured(&s, &who, &test).await;

  let err = s
    .advance_test(test.test_id, TestStatus::Verified, None, who.analyst)
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));

  let advance = s
    .advance_test(test.test_id, TestStatus::Verified, Some("ok".into()), who.om)
    .await
    .unwrap();
  assert!(advance.test.is_verified && advance.test.qc_passed);
  assert_eq!(advance.test.verified_by, Some(who.om.actor_id));
  assert!(advance.certificate.is_none());
}

#[tokio::test]
async fn duplicate_parameter_is_conflict() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;
  let input = NewSampleTest {
    sample_id:    sample.sample_id,
    parameter_id: Uuid::new_v4(),
    method_id:    None,
  };

  s.add_test(input.clone(), who.admin).await.unwrap();
  let err = s.add_test(input.clone(), who.om).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Conflict(_)));
  let err = s.add_test(input, who.analyst).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));
  assert_eq!(s.list_tests(sample.sample_id).await.unwrap().len(), 1);
}

// ─── QC ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn qc_failure_blocks_verification() {
  let s = store().await;
  let who = staff();
  let sample = validated_sample(&s, &who).await;
  let test = add_test(&s, &who, &sample).await;
  measured(&s, &who, &test).await;
  let qc = control(&s, &who, &["1-2s", "1-3s"]).await;

  let run = s.record_qc_run(sample.sample_id, qc, 4.0, who.analyst).await.unwrap();
  assert_eq!(run.z_score, 4.0);
  assert_eq!(run.status, QcStatus::Fail);
  assert_eq!(run.violated_rules, vec!["1-2s".to_owned(), "1-3s".to_owned()]);

  let summary = s.qc_summary(sample.sample_id).await.unwrap();
  assert_eq!(summary.status, QcStatus::Fail);
  assert_eq!(summary.counts.fail, 1);

  let audited = trail_len(&s, EntityType::SampleTest, test.test_id).await;
  let err = s
    .advance_test(test.test_id, TestStatus::Verified, None, who.om)
    .await
    .unwrap_err();
  assert_eq!(reason(err), BlockReason::QcFailed);

  let test = s.get_test(test.test_id).await.unwrap().unwrap();
  assert_eq!(test.status, TestStatus::Measured);
  assert!(!test.is_verified);
  assert_eq!(trail_len(&s, EntityType::SampleTest, test.test_id).await, audited);
}

#[tokio::test]
async fn qc_warning_is_advisory_unless_configured() {
  for block_on_warning in [false, true] {
    let s = SqliteStore::open_in_memory_with(StoreOptions {
      qc_gate: QcGatePolicy { block_on_warning },
      ..StoreOptions::default()
    })
    .await
    .unwrap();
    let who = staff();
    let sample = validated_sample(&s, &who).await;
    let test = add_test(&s, &who, &sample).await;
    measured(&s, &who, &test).await;
    let qc = control(&s, &who, &["1-2s", "1-3s"]).await;

    let run = s.record_qc_run(sample.sample_id, qc, -2.5, who.analyst).await.unwrap();
    assert_eq!(run.status, QcStatus::Warning);

    let result = s.advance_test(test.test_id, TestStatus::Verified, None, who.om).await;
    if block_on_warning {
      assert_eq!(reason(result.unwrap_err()), BlockReason::QcWarning);
    } else {
      assert_eq!(result.unwrap().test.status, TestStatus::Verified);
    }
  }
}

#[tokio::test]
async fn range_rule_fails_across_two_in_band_runs() {
  let s = store().await;
  let who = staff();
  let sample = validated_sample(&s, &who).await;
  let qc = control(&s, &who, &["1-3s", "R-4s"]).await;

  let first = s.record_qc_run(sample.sample_id, qc, 1.9, who.analyst).await.unwrap();
  assert_eq!(first.status, QcStatus::Pass);
  let second = s.record_qc_run(sample.sample_id, qc, -2.2, who.analyst).await.unwrap();
  assert_eq!(second.status, QcStatus::Fail);
  assert_eq!(second.violated_rules, vec!["R-4s".to_owned()]);

  let summary = s.qc_summary(sample.sample_id).await.unwrap();
  assert_eq!(summary.status, QcStatus::Fail);
  assert_eq!((summary.counts.pass, summary.counts.fail), (1, 1));
  assert_eq!(s.list_qc_runs(sample.sample_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn history_is_scoped_to_the_sample() {
  let s = store().await;
  let who = staff();
  let a = validated_sample(&s, &who).await;
  let b = validated_sample(&s, &who).await;
  let qc = control(&s, &who, &["R-4s"]).await;

  s.record_qc_run(a.sample_id, qc, 2.1, who.analyst).await.unwrap();
  let run = s.record_qc_run(b.sample_id, qc, -2.1, who.analyst).await.unwrap();
  assert_eq!(run.status, QcStatus::Pass);
  assert_eq!(s.qc_summary(b.sample_id).await.unwrap().status, QcStatus::Pass);
}

#[tokio::test]
async fn controls_validate_rules_and_deactivate_once() {
  let s = store().await;
  let who = staff();
  let sample = validated_sample(&s, &who).await;

  let err = s
    .create_qc_control(
      NewQcControl {
        parameter_id: Uuid::new_v4(),
        method_id:    None,
        name:         "bad".into(),
        target:       1.0,
        tolerance:    0.0,
        rules:        vec!["1-3s".into()],
      },
      who.om,
    )
    .await
    .unwrap_err();
  assert_eq!(reason(err), BlockReason::InvalidValue);

  let qc = control(&s, &who, &["1-3s"]).await;
  let off = s.deactivate_qc_control(qc, who.admin).await.unwrap();
  assert!(!off.active);
  let err = s.deactivate_qc_control(qc, who.lh).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Conflict(_)));

  let err = s
    .record_qc_run(sample.sample_id, qc, 0.1, who.analyst)
    .await
    .unwrap_err();
  assert_eq!(reason(err), BlockReason::InvalidValue);
  assert!(s.list_qc_runs(sample.sample_id).await.unwrap().is_empty());
}

// ─── Artifacts ───────────────────────────────────────────────────────────────

async fn validate_test(s: &SqliteStore, who: &Staff, test: &SampleTest) -> Option<Uuid> {
  measured(s, who, test).await;
  s.advance_test(test.test_id, TestStatus::Verified, None, who.om)
    .await
    .unwrap();
  s.advance_test(test.test_id, TestStatus::Validated, None, who.lh)
    .await
    .unwrap()
    .certificate
    .map(|c| c.artifact_id)
}

#[tokio::test]
async fn last_validation_generates_exactly_one_certificate() {
  let s = store().await;
  let who = staff();
  let sample = validated_sample(&s, &who).await;
  let first = add_test(&s, &who, &sample).await;
  let second = add_test(&s, &who, &sample).await;
  let dropped = add_test(&s, &who, &sample).await;
  s.advance_test(dropped.test_id, TestStatus::Cancelled, None, who.om)
    .await
    .unwrap();

  assert!(validate_test(&s, &who, &first).await.is_none());
  let generated = validate_test(&s, &who, &second).await.expect("certificate");

  let artifacts = s.list_artifacts(sample.sample_id).await.unwrap();
  assert_eq!(artifacts.len(), 1);
  assert_eq!(artifacts[0].artifact_id, generated);
  assert_eq!(artifacts[0].kind, ArtifactKind::CertificateOfAnalysis);
  assert_eq!(artifacts[0].number, "RPT-00001");

  let again = s.ensure_certificate(sample.sample_id, who.admin).await.unwrap();
  assert_eq!(again.map(|a| a.artifact_id), Some(generated));
  assert_eq!(s.list_artifacts(sample.sample_id).await.unwrap().len(), 1);
  assert_eq!(s.peek_sequence(Series::ReportNumber).await.unwrap(), 2);
  assert_eq!(trail_len(&s, EntityType::Artifact, generated).await, 1);

  // No more tests once certified.
  let err = s
    .add_test(
      NewSampleTest {
        sample_id:    sample.sample_id,
        parameter_id: Uuid::new_v4(),
        method_id:    None,
      },
      who.admin,
    )
    .await
    .unwrap_err();
  assert_eq!(reason(err), BlockReason::NotEligible);
}

#[tokio::test]
async fn certificate_waits_for_outstanding_tests() {
  let s = store().await;
  let who = staff();
  let sample = validated_sample(&s, &who).await;
  assert!(s.ensure_certificate(sample.sample_id, who.om).await.unwrap().is_none());

  let test = add_test(&s, &who, &sample).await;
  assert!(s.ensure_certificate(sample.sample_id, who.om).await.unwrap().is_none());
  s.advance_test(test.test_id, TestStatus::Failed, None, who.lh)
    .await
    .unwrap();
  assert!(s.ensure_certificate(sample.sample_id, who.om).await.unwrap().is_none());
  assert_eq!(s.peek_sequence(Series::ReportNumber).await.unwrap(), 1);

  let err = s
    .ensure_certificate(sample.sample_id, who.analyst)
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));
}

#[tokio::test]
async fn cancelling_the_last_open_test_certifies_the_validated_rest() {
  let s = store().await;
  let who = staff();
  let sample = validated_sample(&s, &who).await;
  let kept = add_test(&s, &who, &sample).await;
  let open = add_test(&s, &who, &sample).await;

  assert!(validate_test(&s, &who, &kept).await.is_none());
  assert!(s.ensure_certificate(sample.sample_id, who.om).await.unwrap().is_none());

  let advance = s
    .advance_test(open.test_id, TestStatus::Cancelled, None, who.om)
    .await
    .unwrap();
  assert_eq!(advance.test.status, TestStatus::Cancelled);
  let generated = advance.certificate.expect("certificate").artifact_id;

  let artifacts = s.list_artifacts(sample.sample_id).await.unwrap();
  assert_eq!(artifacts.len(), 1);
  assert_eq!(artifacts[0].artifact_id, generated);
  assert_eq!(artifacts[0].kind, ArtifactKind::CertificateOfAnalysis);

  let again = s.ensure_certificate(sample.sample_id, who.lh).await.unwrap();
  assert_eq!(again.map(|a| a.artifact_id), Some(generated));
  assert_eq!(s.list_artifacts(sample.sample_id).await.unwrap().len(), 1);
  assert_eq!(s.peek_sequence(Series::ReportNumber).await.unwrap(), 2);
}

#[tokio::test]
async fn lab_head_locks_a_certificate_once() {
  let s = store().await;
  let who = staff();
  let sample = validated_sample(&s, &who).await;
  let test = add_test(&s, &who, &sample).await;
  let certificate = validate_test(&s, &who, &test).await.unwrap();

  let err = s.lock_artifact(certificate, who.om).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));

  let locked = s.lock_artifact(certificate, who.lh).await.unwrap();
  assert!(locked.locked);
  assert!(locked.locked_at.is_some());
  assert_eq!(locked.content_digest.as_ref().map(String::len), Some(64));

  let err = s.lock_artifact(certificate, who.lh).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Conflict(_)));
}

#[tokio::test]
async fn letter_of_order_signature_flow() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;

  let err = s.create_letter_of_order(sample.sample_id, who.om).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));
  let letter = s.create_letter_of_order(sample.sample_id, who.admin).await.unwrap();
  assert_eq!(letter.number, "LOA-00001");
  assert_eq!(letter.loa_status, Some(LoaStatus::Draft));
  let err = s.create_letter_of_order(sample.sample_id, who.admin).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Conflict(_)));
  let id = letter.artifact_id;

  let err = s
    .sign_letter_of_order(id, Role::OperationalManager, who.analyst)
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));
  let err = s.sign_letter_of_order(id, Role::Analyst, who.analyst).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::BadRequest(_)));

  let letter = s
    .sign_letter_of_order(id, Role::OperationalManager, who.om)
    .await
    .unwrap();
  assert_eq!(letter.loa_status, Some(LoaStatus::Draft));
  let err = s
    .sign_letter_of_order(id, Role::OperationalManager, who.om)
    .await
    .unwrap_err();
  assert!(matches!(rejection(err), Rejection::Conflict(_)));

  let err = s.send_letter_of_order(id, who.admin).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::InvalidTransition(_)));

  let letter = s.sign_letter_of_order(id, Role::LabHead, who.lh).await.unwrap();
  assert_eq!(letter.loa_status, Some(LoaStatus::InternallySigned));
  assert!(letter.internal_signatures_complete());

  let err = s.client_sign_letter_of_order(id, who.client).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::InvalidTransition(_)));
  let letter = s.send_letter_of_order(id, who.admin).await.unwrap();
  assert_eq!(letter.loa_status, Some(LoaStatus::Sent));

  let stranger = Actor::new(Uuid::new_v4(), Role::Client);
  let err = s.client_sign_letter_of_order(id, stranger).await.unwrap_err();
  assert!(matches!(rejection(err), Rejection::Forbidden(_)));

  let letter = s.client_sign_letter_of_order(id, who.client).await.unwrap();
  assert_eq!(letter.loa_status, Some(LoaStatus::ClientSigned));
  assert!(letter.locked);
  assert!(letter.content_digest.is_some());
  assert_eq!(letter.signatures.len(), 3);

  let err = s.send_letter_of_order(id, who.admin).await.unwrap_err();
  assert_eq!(reason(err), BlockReason::Locked);

  let actions: Vec<AuditAction> = s
    .audit_trail(EntityType::Artifact, id.to_string())
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.action)
    .collect();
  assert_eq!(
    actions,
    vec![
      AuditAction::LoaCreate,
      AuditAction::LoaSign,
      AuditAction::LoaSign,
      AuditAction::LoaSend,
      AuditAction::LoaClientSign,
    ]
  );
}

// ─── Audit log ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn audit_log_and_qc_runs_are_append_only() {
  let s = store().await;
  let who = staff();
  let sample = validated_sample(&s, &who).await;
  let qc = control(&s, &who, &["1-3s"]).await;
  s.record_qc_run(sample.sample_id, qc, 0.5, who.analyst).await.unwrap();

  assert!(s.execute_raw("UPDATE audit_log SET note = 'x'").await.is_err());
  assert!(s.execute_raw("UPDATE qc_runs SET value = 0").await.is_err());
  assert!(s.execute_raw("DELETE FROM audit_log").await.is_err());
  assert!(s.execute_raw("DELETE FROM qc_runs").await.is_err());
}

#[tokio::test]
async fn transitions_record_old_and_new_values() {
  let s = store().await;
  let who = staff();
  let sample = new_sample(&s, &who).await;
  s.transition_intake(
    sample.sample_id,
    IntakeStatus::Submitted,
    Some("first batch".into()),
    who.client,
  )
  .await
  .unwrap();

  let trail = s
    .audit_trail(EntityType::Sample, sample.sample_id.to_string())
    .await
    .unwrap();
  let entry = &trail[1];
  assert_eq!(entry.action, AuditAction::SampleIntakeTransition);
  assert_eq!(entry.note.as_deref(), Some("first batch"));
  assert_eq!(
    entry.before.as_ref().unwrap()["administrative_status"],
    "draft"
  );
  assert_eq!(entry.after["administrative_status"], "submitted");
}

// ─── Contention ──────────────────────────────────────────────────────────────

fn row_count(conn: &rusqlite::Connection, table: &str) -> i64 {
  conn
    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
    .unwrap()
}

#[tokio::test]
async fn held_write_lock_surfaces_as_busy_and_writes_nothing() {
  let path = std::env::temp_dir().join(format!("specimen-busy-{}.db", Uuid::new_v4()));
  let s = SqliteStore::open_with(&path, StoreOptions {
    busy_timeout: Duration::from_millis(100),
    ..StoreOptions::default()
  })
  .await
  .unwrap();
  let who = staff();

  let holder = rusqlite::Connection::open(&path).unwrap();
  let samples = row_count(&holder, "samples");
  let audited = row_count(&holder, "audit_log");
  holder.execute_batch("BEGIN IMMEDIATE").unwrap();

  let err = s
    .create_sample(
      NewSample { client_id: who.client.actor_id, ..Default::default() },
      who.client,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(Rejection::Busy)), "got {err}");

  holder.execute_batch("ROLLBACK").unwrap();
  assert_eq!(row_count(&holder, "samples"), samples);
  assert_eq!(row_count(&holder, "audit_log"), audited);

  // The lock is gone, so the same request now goes through.
  let sample = new_sample(&s, &who).await;
  assert_eq!(row_count(&holder, "samples"), samples + 1);
  assert_eq!(trail_len(&s, EntityType::Sample, sample.sample_id).await, 1);

  drop(holder);
  for suffix in ["", "-wal", "-shm"] {
    let mut file = path.clone().into_os_string();
    file.push(suffix);
    let _ = std::fs::remove_file(file);
  }
}
