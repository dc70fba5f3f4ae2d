//! [`SqliteStore`], the SQLite implementation of [`LabStore`].

use std::{path::Path, time::Duration};

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use specimen_core::{
  artifact::GeneratedArtifact,
  audit::{AuditLogEntry, AuditAction, EntityType, NewAuditEntry},
  policy::{self, Operation, QcGatePolicy},
  qc::{NewQcControl, QcControl, QcRun, QcSummary},
  role::{Actor, Role},
  sample::{
    ChecklistSubmission, IntakeChecklist, IntakeValidation, NewSample, NewSampleTest,
    Sample, SampleTest,
  },
  sequence::{Allocation, Series},
  status::{IntakeStatus, TestStatus, TestingStatus},
  store::{LabStore, TestAdvance},
};

use crate::{
  Error, Result, artifacts, audit, intake, qc, records, schema::SCHEMA, sequence, testing,
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Tunables for a [`SqliteStore`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
  /// How long a write waits for the database lock before failing with
  /// [`specimen_core::Error::Busy`].
  pub busy_timeout: Duration,
  pub qc_gate:      QcGatePolicy,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self {
      busy_timeout: Duration::from_secs(5),
      qc_gate:      QcGatePolicy::default(),
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A lifecycle store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection handle is shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  options: StoreOptions,
}

impl SqliteStore {
  /// Open (or create) a store at `path` with default options.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with(path, StoreOptions::default()).await
  }

  pub async fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, options };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with(StoreOptions::default()).await
  }

  pub async fn open_in_memory_with(options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, options };
    store.init_schema().await?;
    Ok(store)
  }

  pub fn options(&self) -> StoreOptions { self.options }

  async fn init_schema(&self) -> Result<()> {
    let busy_timeout = self.options.busy_timeout;
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(sequence::seed(conn))
      })
      .await?
  }

  /// Run `f` inside one `BEGIN IMMEDIATE` transaction. Any error rolls the
  /// whole transaction back.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    let outcome = self
      .conn
      .call(move |conn| Ok(in_transaction(conn, f)))
      .await?;
    if let Err(Error::Core(rejection)) = &outcome {
      tracing::debug!(%rejection, "request rejected");
    }
    outcome
  }

  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }
}

fn in_transaction<T>(
  conn: &mut Connection,
  f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let value = f(&tx)?;
  tx.commit()?;
  Ok(value)
}

// ─── LabStore impl ───────────────────────────────────────────────────────────

impl LabStore for SqliteStore {
  type Error = Error;

  // ── Samples ───────────────────────────────────────────────────────────────

  async fn create_sample(&self, input: NewSample, actor: Actor) -> Result<Sample> {
    let sample = self
      .write(move |conn| intake::create_sample(conn, input, actor, Utc::now()))
      .await?;
    tracing::info!(
      sample_id = %sample.sample_id,
      actor = %actor.actor_id,
      role = %actor.role,
      "sample created"
    );
    Ok(sample)
  }

  async fn get_sample(&self, id: Uuid) -> Result<Option<Sample>> {
    self.read(move |conn| records::load_sample(conn, id)).await
  }

  async fn transition_intake(
    &self,
    sample_id: Uuid,
    target: IntakeStatus,
    note: Option<String>,
    actor: Actor,
  ) -> Result<Sample> {
    let sample = self
      .write(move |conn| intake::transition(conn, sample_id, target, note, actor, Utc::now()))
      .await?;
    tracing::info!(%sample_id, to = %target, role = %actor.role, "intake transition");
    Ok(sample)
  }

  async fn advance_sample(
    &self,
    sample_id: Uuid,
    target: TestingStatus,
    note: Option<String>,
    actor: Actor,
  ) -> Result<Sample> {
    let gate = self.options.qc_gate;
    let sample = self
      .write(move |conn| {
        testing::advance_sample(conn, gate, sample_id, target, note, actor, Utc::now())
      })
      .await?;
    tracing::info!(%sample_id, to = %target, role = %actor.role, "testing transition");
    Ok(sample)
  }

  async fn submit_checklist(
    &self,
    sample_id: Uuid,
    submission: ChecklistSubmission,
    actor: Actor,
  ) -> Result<IntakeChecklist> {
    let checklist = self
      .write(move |conn| {
        intake::submit_checklist(conn, sample_id, submission, actor, Utc::now())
      })
      .await?;
    tracing::info!(
      %sample_id,
      round = checklist.intake_round,
      passed = checklist.passed,
      "intake checklist recorded"
    );
    Ok(checklist)
  }

  async fn validate_intake(&self, sample_id: Uuid, actor: Actor) -> Result<IntakeValidation> {
    let validation = self
      .write(move |conn| intake::validate(conn, sample_id, actor, Utc::now()))
      .await?;
    if validation.newly_assigned {
      tracing::info!(%sample_id, code = %validation.lab_sample_code, "lab sample code assigned");
    }
    Ok(validation)
  }

  // ── Tests ─────────────────────────────────────────────────────────────────

  async fn add_test(&self, input: NewSampleTest, actor: Actor) -> Result<SampleTest> {
    let test = self
      .write(move |conn| testing::add_test(conn, input, actor, Utc::now()))
      .await?;
    tracing::info!(test_id = %test.test_id, sample_id = %test.sample_id, "test added");
    Ok(test)
  }

  async fn get_test(&self, id: Uuid) -> Result<Option<SampleTest>> {
    self.read(move |conn| records::load_test(conn, id)).await
  }

  async fn list_tests(&self, sample_id: Uuid) -> Result<Vec<SampleTest>> {
    self
      .read(move |conn| {
        records::require_sample(conn, sample_id)?;
        records::tests_for_sample(conn, sample_id)
      })
      .await
  }

  async fn advance_test(
    &self,
    test_id: Uuid,
    target: TestStatus,
    note: Option<String>,
    actor: Actor,
  ) -> Result<TestAdvance> {
    let gate = self.options.qc_gate;
    let advance = self
      .write(move |conn| {
        testing::advance_test(conn, gate, test_id, target, note, actor, Utc::now())
      })
      .await?;
    tracing::info!(%test_id, to = %target, role = %actor.role, "test transition");
    if let Some(certificate) = &advance.certificate {
      tracing::info!(
        sample_id = %certificate.sample_id,
        number = %certificate.number,
        "certificate of analysis generated"
      );
    }
    Ok(advance)
  }

  // ── QC ────────────────────────────────────────────────────────────────────

  async fn create_qc_control(&self, input: NewQcControl, actor: Actor) -> Result<QcControl> {
    let control = self
      .write(move |conn| qc::create_control(conn, input, actor, Utc::now()))
      .await?;
    tracing::info!(
      qc_control_id = %control.qc_control_id,
      name = %control.name,
      "QC control created"
    );
    Ok(control)
  }

  async fn deactivate_qc_control(&self, id: Uuid, actor: Actor) -> Result<QcControl> {
    let control = self
      .write(move |conn| qc::deactivate_control(conn, id, actor, Utc::now()))
      .await?;
    tracing::info!(qc_control_id = %id, "QC control deactivated");
    Ok(control)
  }

  async fn record_qc_run(
    &self,
    sample_id: Uuid,
    qc_control_id: Uuid,
    value: f64,
    actor: Actor,
  ) -> Result<QcRun> {
    let run = self
      .write(move |conn| {
        qc::record_run(conn, sample_id, qc_control_id, value, actor, Utc::now())
      })
      .await?;
    tracing::info!(
      %sample_id,
      %qc_control_id,
      z = run.z_score,
      status = %run.status,
      "QC run recorded"
    );
    Ok(run)
  }

  async fn list_qc_runs(&self, sample_id: Uuid) -> Result<Vec<QcRun>> {
    self
      .read(move |conn| {
        records::require_sample(conn, sample_id)?;
        records::runs_for_sample(conn, sample_id)
      })
      .await
  }

  async fn qc_summary(&self, sample_id: Uuid) -> Result<QcSummary> {
    self
      .read(move |conn| {
        records::require_sample(conn, sample_id)?;
        qc::summary(conn, sample_id)
      })
      .await
  }

  // ── Sequences ─────────────────────────────────────────────────────────────

  async fn allocate(&self, series: Series, actor: Actor) -> Result<Allocation> {
    let allocation = self
      .write(move |conn| {
        policy::authorize(actor.role, Operation::AllocateSequence)?;
        if series.is_workflow_owned() {
          return Err(
            specimen_core::Error::Forbidden(format!(
              "{series} numbers are only issued by their workflow"
            ))
            .into(),
          );
        }
        let allocation = sequence::take(conn, series)?;
        let entry = NewAuditEntry::new(
          &actor,
          AuditAction::SequenceAllocate,
          EntityType::Sequence,
          series.counter_name(),
        )
        .after(&allocation)?;
        audit::append(conn, entry, Utc::now())?;
        Ok(allocation)
      })
      .await?;
    tracing::info!(%series, value = allocation.value, "sequence value allocated");
    Ok(allocation)
  }

  async fn peek_sequence(&self, series: Series) -> Result<i64> {
    self.read(move |conn| sequence::peek(conn, series)).await
  }

  // ── Artifacts ─────────────────────────────────────────────────────────────

  async fn ensure_certificate(
    &self,
    sample_id: Uuid,
    actor: Actor,
  ) -> Result<Option<GeneratedArtifact>> {
    let outcome = self
      .write(move |conn| artifacts::ensure_certificate(conn, sample_id, actor, Utc::now()))
      .await?;
    if let artifacts::CertificateOutcome::Generated(a) = &outcome {
      tracing::info!(%sample_id, number = %a.number, "certificate of analysis generated");
    }
    Ok(outcome.into_artifact())
  }

  async fn list_artifacts(&self, sample_id: Uuid) -> Result<Vec<GeneratedArtifact>> {
    self
      .read(move |conn| {
        records::require_sample(conn, sample_id)?;
        records::artifacts_for_sample(conn, sample_id)
      })
      .await
  }

  async fn lock_artifact(&self, artifact_id: Uuid, actor: Actor) -> Result<GeneratedArtifact> {
    let artifact = self
      .write(move |conn| artifacts::lock(conn, artifact_id, actor, Utc::now()))
      .await?;
    tracing::info!(%artifact_id, number = %artifact.number, "artifact locked");
    Ok(artifact)
  }

  async fn create_letter_of_order(
    &self,
    sample_id: Uuid,
    actor: Actor,
  ) -> Result<GeneratedArtifact> {
    let letter = self
      .write(move |conn| artifacts::create_letter(conn, sample_id, actor, Utc::now()))
      .await?;
    tracing::info!(%sample_id, number = %letter.number, "letter of order created");
    Ok(letter)
  }

  async fn sign_letter_of_order(
    &self,
    artifact_id: Uuid,
    role_code: Role,
    actor: Actor,
  ) -> Result<GeneratedArtifact> {
    let letter = self
      .write(move |conn| {
        artifacts::sign_letter(conn, artifact_id, role_code, actor, Utc::now())
      })
      .await?;
    tracing::info!(%artifact_id, signed_as = %role_code, "letter of order signed");
    Ok(letter)
  }

  async fn send_letter_of_order(
    &self,
    artifact_id: Uuid,
    actor: Actor,
  ) -> Result<GeneratedArtifact> {
    let letter = self
      .write(move |conn| artifacts::send_letter(conn, artifact_id, actor, Utc::now()))
      .await?;
    tracing::info!(%artifact_id, "letter of order sent");
    Ok(letter)
  }

  async fn client_sign_letter_of_order(
    &self,
    artifact_id: Uuid,
    actor: Actor,
  ) -> Result<GeneratedArtifact> {
    let letter = self
      .write(move |conn| {
        artifacts::client_sign_letter(conn, artifact_id, actor, Utc::now())
      })
      .await?;
    tracing::info!(%artifact_id, "letter of order countersigned and locked");
    Ok(letter)
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn audit_trail(
    &self,
    entity_type: EntityType,
    entity_id: String,
  ) -> Result<Vec<AuditLogEntry>> {
    self
      .read(move |conn| audit::trail(conn, entity_type, &entity_id))
      .await
  }
}

#[cfg(test)]
impl SqliteStore {
  /// Run a statement outside any store operation.
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<usize> {
    self.conn.call(move |conn| Ok(conn.execute(sql, [])?)).await.map_err(Error::from)
  }
}
