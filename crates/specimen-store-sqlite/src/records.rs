//! Row-level reads and writes for the entity tables.
//!
//! Everything here takes a plain `&Connection` so it runs equally inside a
//! write transaction or a read-only call.

use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use specimen_core::{
  artifact::{ArtifactKind, GeneratedArtifact, Signature},
  qc::{QcControl, QcRun},
  sample::{IntakeChecklist, Sample, SampleTest},
};

use crate::{
  Error, Result,
  encode::{
    ARTIFACT_COLUMNS, CHECKLIST_COLUMNS, CONTROL_COLUMNS, RUN_COLUMNS, RawArtifact,
    RawChecklist, RawControl, RawRun, RawSample, RawSignature, RawTest, SAMPLE_COLUMNS,
    TEST_COLUMNS, encode_dt, encode_milestones, encode_rules, encode_uuid,
  },
};

fn not_found(what: &str, id: Uuid) -> Error {
  specimen_core::Error::not_found(format!("{what} {id}")).into()
}

// ─── Samples ─────────────────────────────────────────────────────────────────

pub fn load_sample(conn: &Connection, id: Uuid) -> Result<Option<Sample>> {
  conn
    .query_row(
      &format!("SELECT {SAMPLE_COLUMNS} FROM samples WHERE sample_id = ?1"),
      rusqlite::params![encode_uuid(id)],
      RawSample::from_row,
    )
    .optional()?
    .map(RawSample::into_sample)
    .transpose()
}

pub fn require_sample(conn: &Connection, id: Uuid) -> Result<Sample> {
  load_sample(conn, id)?.ok_or_else(|| not_found("sample", id))
}

pub fn insert_sample(conn: &Connection, s: &Sample) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO samples ({SAMPLE_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    ),
    rusqlite::params![
      encode_uuid(s.sample_id),
      encode_uuid(s.client_id),
      s.description,
      s.administrative_status.as_ref(),
      s.testing_status.as_ref(),
      s.lab_sample_code,
      s.intake_round,
      s.return_reason,
      encode_uuid(s.created_by),
      encode_uuid(s.assigned_to),
      encode_dt(s.created_at),
      encode_dt(s.updated_at),
      encode_milestones(&s.milestones)?,
    ],
  )?;
  Ok(())
}

/// Persist every mutable column of `s`.
pub fn update_sample(conn: &Connection, s: &Sample) -> Result<()> {
  conn.execute(
    "UPDATE samples SET
       administrative_status = ?2, testing_status = ?3, lab_sample_code = ?4,
       intake_round = ?5, return_reason = ?6, assigned_to = ?7,
       updated_at = ?8, milestones = ?9
     WHERE sample_id = ?1",
    rusqlite::params![
      encode_uuid(s.sample_id),
      s.administrative_status.as_ref(),
      s.testing_status.as_ref(),
      s.lab_sample_code,
      s.intake_round,
      s.return_reason,
      encode_uuid(s.assigned_to),
      encode_dt(s.updated_at),
      encode_milestones(&s.milestones)?,
    ],
  )?;
  Ok(())
}

// ─── Sample tests ────────────────────────────────────────────────────────────

pub fn load_test(conn: &Connection, id: Uuid) -> Result<Option<SampleTest>> {
  conn
    .query_row(
      &format!("SELECT {TEST_COLUMNS} FROM sample_tests WHERE test_id = ?1"),
      rusqlite::params![encode_uuid(id)],
      RawTest::from_row,
    )
    .optional()?
    .map(RawTest::into_test)
    .transpose()
}

pub fn require_test(conn: &Connection, id: Uuid) -> Result<SampleTest> {
  load_test(conn, id)?.ok_or_else(|| not_found("sample test", id))
}

pub fn tests_for_sample(conn: &Connection, sample_id: Uuid) -> Result<Vec<SampleTest>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {TEST_COLUMNS} FROM sample_tests WHERE sample_id = ?1 ORDER BY rowid"
  ))?;
  let raws = stmt
    .query_map(rusqlite::params![encode_uuid(sample_id)], RawTest::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawTest::into_test).collect()
}

pub fn test_exists(conn: &Connection, sample_id: Uuid, parameter_id: Uuid) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM sample_tests WHERE sample_id = ?1 AND parameter_id = ?2",
        rusqlite::params![encode_uuid(sample_id), encode_uuid(parameter_id)],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

pub fn insert_test(conn: &Connection, t: &SampleTest) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO sample_tests ({TEST_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
    ),
    rusqlite::params![
      encode_uuid(t.test_id),
      encode_uuid(t.sample_id),
      encode_uuid(t.parameter_id),
      t.method_id.map(encode_uuid),
      t.status.as_ref(),
      t.qc_passed,
      t.is_verified,
      t.is_validated,
      t.verified_by.map(encode_uuid),
      t.validated_by.map(encode_uuid),
      encode_uuid(t.created_by),
      encode_dt(t.created_at),
      encode_dt(t.updated_at),
      encode_milestones(&t.milestones)?,
    ],
  )?;
  Ok(())
}

pub fn update_test(conn: &Connection, t: &SampleTest) -> Result<()> {
  conn.execute(
    "UPDATE sample_tests SET
       status = ?2, qc_passed = ?3, is_verified = ?4, is_validated = ?5,
       verified_by = ?6, validated_by = ?7, updated_at = ?8, milestones = ?9
     WHERE test_id = ?1",
    rusqlite::params![
      encode_uuid(t.test_id),
      t.status.as_ref(),
      t.qc_passed,
      t.is_verified,
      t.is_validated,
      t.verified_by.map(encode_uuid),
      t.validated_by.map(encode_uuid),
      encode_dt(t.updated_at),
      encode_milestones(&t.milestones)?,
    ],
  )?;
  Ok(())
}

// ─── Intake checklists ───────────────────────────────────────────────────────

pub fn load_checklist(
  conn: &Connection,
  sample_id: Uuid,
  intake_round: u32,
) -> Result<Option<IntakeChecklist>> {
  conn
    .query_row(
      &format!(
        "SELECT {CHECKLIST_COLUMNS} FROM intake_checklists
         WHERE sample_id = ?1 AND intake_round = ?2"
      ),
      rusqlite::params![encode_uuid(sample_id), intake_round],
      RawChecklist::from_row,
    )
    .optional()?
    .map(RawChecklist::into_checklist)
    .transpose()
}

pub fn insert_checklist(conn: &Connection, c: &IntakeChecklist) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO intake_checklists ({CHECKLIST_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    ),
    rusqlite::params![
      encode_uuid(c.checklist_id),
      encode_uuid(c.sample_id),
      c.intake_round,
      serde_json::to_string(&c.checks)?,
      serde_json::to_string(&c.notes)?,
      c.passed,
      encode_uuid(c.submitted_by),
      encode_dt(c.submitted_at),
    ],
  )?;
  Ok(())
}

// ─── QC controls and runs ────────────────────────────────────────────────────

pub fn load_control(conn: &Connection, id: Uuid) -> Result<Option<QcControl>> {
  conn
    .query_row(
      &format!("SELECT {CONTROL_COLUMNS} FROM qc_controls WHERE qc_control_id = ?1"),
      rusqlite::params![encode_uuid(id)],
      RawControl::from_row,
    )
    .optional()?
    .map(RawControl::into_control)
    .transpose()
}

pub fn require_control(conn: &Connection, id: Uuid) -> Result<QcControl> {
  load_control(conn, id)?.ok_or_else(|| not_found("QC control", id))
}

pub fn insert_control(conn: &Connection, c: &QcControl) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO qc_controls ({CONTROL_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
    ),
    rusqlite::params![
      encode_uuid(c.qc_control_id),
      encode_uuid(c.parameter_id),
      c.method_id.map(encode_uuid),
      c.name,
      c.target,
      c.tolerance,
      encode_rules(&c.rules)?,
      c.active,
      encode_uuid(c.created_by),
      encode_dt(c.created_at),
    ],
  )?;
  Ok(())
}

pub fn set_control_active(conn: &Connection, id: Uuid, active: bool) -> Result<()> {
  conn.execute(
    "UPDATE qc_controls SET active = ?2 WHERE qc_control_id = ?1",
    rusqlite::params![encode_uuid(id), active],
  )?;
  Ok(())
}

/// The last `limit` z-scores for one sample and control, oldest first.
pub fn recent_z_scores(
  conn: &Connection,
  sample_id: Uuid,
  qc_control_id: Uuid,
  limit: usize,
) -> Result<Vec<f64>> {
  if limit == 0 {
    return Ok(Vec::new());
  }
  let mut stmt = conn.prepare(
    "SELECT z_score FROM qc_runs
     WHERE sample_id = ?1 AND qc_control_id = ?2
     ORDER BY rowid DESC LIMIT ?3",
  )?;
  let mut scores = stmt
    .query_map(
      rusqlite::params![
        encode_uuid(sample_id),
        encode_uuid(qc_control_id),
        i64::try_from(limit).unwrap_or(i64::MAX)
      ],
      |row| row.get::<_, f64>(0),
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  scores.reverse();
  Ok(scores)
}

pub fn insert_run(conn: &Connection, r: &QcRun) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO qc_runs ({RUN_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
    ),
    rusqlite::params![
      encode_uuid(r.run_id),
      encode_uuid(r.sample_id),
      encode_uuid(r.qc_control_id),
      r.value,
      r.z_score,
      serde_json::to_string(&r.violated_rules)?,
      r.status.as_ref(),
      encode_uuid(r.recorded_by),
      encode_dt(r.recorded_at),
    ],
  )?;
  Ok(())
}

pub fn runs_for_sample(conn: &Connection, sample_id: Uuid) -> Result<Vec<QcRun>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {RUN_COLUMNS} FROM qc_runs WHERE sample_id = ?1 ORDER BY rowid"
  ))?;
  let raws = stmt
    .query_map(rusqlite::params![encode_uuid(sample_id)], RawRun::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawRun::into_run).collect()
}

// ─── Artifacts ───────────────────────────────────────────────────────────────

fn signatures_for(conn: &Connection, artifact_id: &str) -> Result<Vec<Signature>> {
  let mut stmt = conn.prepare(
    "SELECT role, signed_by, signed_at FROM artifact_signatures
     WHERE artifact_id = ?1 ORDER BY signed_at, role",
  )?;
  let raws = stmt
    .query_map(rusqlite::params![artifact_id], |row| {
      Ok(RawSignature {
        role:      row.get(0)?,
        signed_by: row.get(1)?,
        signed_at: row.get(2)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawSignature::into_signature).collect()
}

fn hydrate(conn: &Connection, raw: RawArtifact) -> Result<GeneratedArtifact> {
  let signatures = signatures_for(conn, &raw.artifact_id)?;
  raw.into_artifact(signatures)
}

pub fn load_artifact(conn: &Connection, id: Uuid) -> Result<Option<GeneratedArtifact>> {
  conn
    .query_row(
      &format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE artifact_id = ?1"),
      rusqlite::params![encode_uuid(id)],
      RawArtifact::from_row,
    )
    .optional()?
    .map(|raw| hydrate(conn, raw))
    .transpose()
}

pub fn require_artifact(conn: &Connection, id: Uuid) -> Result<GeneratedArtifact> {
  load_artifact(conn, id)?.ok_or_else(|| not_found("artifact", id))
}

/// The sample's artifact of `kind`, if one was generated.
pub fn artifact_of_kind(
  conn: &Connection,
  sample_id: Uuid,
  kind: ArtifactKind,
) -> Result<Option<GeneratedArtifact>> {
  conn
    .query_row(
      &format!(
        "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE sample_id = ?1 AND kind = ?2"
      ),
      rusqlite::params![encode_uuid(sample_id), kind.as_ref()],
      RawArtifact::from_row,
    )
    .optional()?
    .map(|raw| hydrate(conn, raw))
    .transpose()
}

pub fn artifacts_for_sample(
  conn: &Connection,
  sample_id: Uuid,
) -> Result<Vec<GeneratedArtifact>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE sample_id = ?1 ORDER BY rowid"
  ))?;
  let raws = stmt
    .query_map(rusqlite::params![encode_uuid(sample_id)], RawArtifact::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(|raw| hydrate(conn, raw)).collect()
}

pub fn insert_artifact(conn: &Connection, a: &GeneratedArtifact) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO artifacts ({ARTIFACT_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
    ),
    rusqlite::params![
      encode_uuid(a.artifact_id),
      encode_uuid(a.sample_id),
      a.kind.as_ref(),
      a.number,
      a.sequence_value,
      a.loa_status.map(|s| s.as_ref().to_owned()),
      a.locked,
      a.locked_at.map(encode_dt),
      a.content_digest,
      encode_uuid(a.created_by),
      encode_dt(a.created_at),
    ],
  )?;
  Ok(())
}

/// Persist the mutable columns of `a`: workflow status and lock state.
pub fn update_artifact(conn: &Connection, a: &GeneratedArtifact) -> Result<()> {
  conn.execute(
    "UPDATE artifacts SET
       loa_status = ?2, locked = ?3, locked_at = ?4, content_digest = ?5
     WHERE artifact_id = ?1",
    rusqlite::params![
      encode_uuid(a.artifact_id),
      a.loa_status.map(|s| s.as_ref().to_owned()),
      a.locked,
      a.locked_at.map(encode_dt),
      a.content_digest,
    ],
  )?;
  Ok(())
}

pub fn insert_signature(conn: &Connection, artifact_id: Uuid, s: &Signature) -> Result<()> {
  conn.execute(
    "INSERT INTO artifact_signatures (artifact_id, role, signed_by, signed_at)
     VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![
      encode_uuid(artifact_id),
      s.role.as_ref(),
      encode_uuid(s.signed_by),
      encode_dt(s.signed_at),
    ],
  )?;
  Ok(())
}
