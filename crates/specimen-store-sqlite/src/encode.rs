//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings and UUIDs hyphenated lowercase. Status
//! columns hold the snake_case vocabulary of the current transition table
//! version; milestones, checklist items and rule lists are compact JSON.

use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use specimen_core::{
  artifact::{GeneratedArtifact, Signature},
  audit::AuditLogEntry,
  qc::{QcControl, QcRule, QcRun},
  sample::{IntakeChecklist, Milestones, Sample, SampleTest},
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Parse a status or other vocabulary column.
pub fn decode_enum<T: FromStr>(what: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::Decode { what, value: s.to_owned() })
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_milestones(m: &Milestones) -> Result<String> {
  Ok(serde_json::to_string(m)?)
}

pub fn encode_rules(rules: &[QcRule]) -> Result<String> {
  Ok(serde_json::to_string(rules)?)
}

// ─── Column lists ────────────────────────────────────────────────────────────

pub const SAMPLE_COLUMNS: &str = "sample_id, client_id, description, \
  administrative_status, testing_status, lab_sample_code, intake_round, \
  return_reason, created_by, assigned_to, created_at, updated_at, milestones";

pub const TEST_COLUMNS: &str = "test_id, sample_id, parameter_id, method_id, \
  status, qc_passed, is_verified, is_validated, verified_by, validated_by, \
  created_by, created_at, updated_at, milestones";

pub const CHECKLIST_COLUMNS: &str = "checklist_id, sample_id, intake_round, \
  checks, notes, passed, submitted_by, submitted_at";

pub const CONTROL_COLUMNS: &str = "qc_control_id, parameter_id, method_id, \
  name, target, tolerance, rules, active, created_by, created_at";

pub const RUN_COLUMNS: &str = "run_id, sample_id, qc_control_id, value, \
  z_score, violated_rules, status, recorded_by, recorded_at";

pub const ARTIFACT_COLUMNS: &str = "artifact_id, sample_id, kind, number, \
  sequence_value, loa_status, locked, locked_at, content_digest, created_by, \
  created_at";

pub const AUDIT_COLUMNS: &str = "entry_id, actor_id, actor_role, action, \
  entity_type, entity_id, note, before_json, after_json, recorded_at";

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `samples` row.
pub struct RawSample {
  pub sample_id:             String,
  pub client_id:             String,
  pub description:           Option<String>,
  pub administrative_status: String,
  pub testing_status:        String,
  pub lab_sample_code:       Option<String>,
  pub intake_round:          u32,
  pub return_reason:         Option<String>,
  pub created_by:            String,
  pub assigned_to:           String,
  pub created_at:            String,
  pub updated_at:            String,
  pub milestones:            String,
}

impl RawSample {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sample_id:             row.get(0)?,
      client_id:             row.get(1)?,
      description:           row.get(2)?,
      administrative_status: row.get(3)?,
      testing_status:        row.get(4)?,
      lab_sample_code:       row.get(5)?,
      intake_round:          row.get(6)?,
      return_reason:         row.get(7)?,
      created_by:            row.get(8)?,
      assigned_to:           row.get(9)?,
      created_at:            row.get(10)?,
      updated_at:            row.get(11)?,
      milestones:            row.get(12)?,
    })
  }

  pub fn into_sample(self) -> Result<Sample> {
    Ok(Sample {
      sample_id:             decode_uuid(&self.sample_id)?,
      client_id:             decode_uuid(&self.client_id)?,
      description:           self.description,
      administrative_status: decode_enum("intake status", &self.administrative_status)?,
      testing_status:        decode_enum("testing status", &self.testing_status)?,
      lab_sample_code:       self.lab_sample_code,
      intake_round:          self.intake_round,
      return_reason:         self.return_reason,
      created_by:            decode_uuid(&self.created_by)?,
      assigned_to:           decode_uuid(&self.assigned_to)?,
      created_at:            decode_dt(&self.created_at)?,
      updated_at:            decode_dt(&self.updated_at)?,
      milestones:            serde_json::from_str(&self.milestones)?,
    })
  }
}

/// Raw values read directly from a `sample_tests` row.
pub struct RawTest {
  pub test_id:      String,
  pub sample_id:    String,
  pub parameter_id: String,
  pub method_id:    Option<String>,
  pub status:       String,
  pub qc_passed:    bool,
  pub is_verified:  bool,
  pub is_validated: bool,
  pub verified_by:  Option<String>,
  pub validated_by: Option<String>,
  pub created_by:   String,
  pub created_at:   String,
  pub updated_at:   String,
  pub milestones:   String,
}

impl RawTest {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      test_id:      row.get(0)?,
      sample_id:    row.get(1)?,
      parameter_id: row.get(2)?,
      method_id:    row.get(3)?,
      status:       row.get(4)?,
      qc_passed:    row.get(5)?,
      is_verified:  row.get(6)?,
      is_validated: row.get(7)?,
      verified_by:  row.get(8)?,
      validated_by: row.get(9)?,
      created_by:   row.get(10)?,
      created_at:   row.get(11)?,
      updated_at:   row.get(12)?,
      milestones:   row.get(13)?,
    })
  }

  pub fn into_test(self) -> Result<SampleTest> {
    Ok(SampleTest {
      test_id:      decode_uuid(&self.test_id)?,
      sample_id:    decode_uuid(&self.sample_id)?,
      parameter_id: decode_uuid(&self.parameter_id)?,
      method_id:    decode_opt_uuid(self.method_id.as_deref())?,
      status:       decode_enum("test status", &self.status)?,
      qc_passed:    self.qc_passed,
      is_verified:  self.is_verified,
      is_validated: self.is_validated,
      verified_by:  decode_opt_uuid(self.verified_by.as_deref())?,
      validated_by: decode_opt_uuid(self.validated_by.as_deref())?,
      created_by:   decode_uuid(&self.created_by)?,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
      milestones:   serde_json::from_str(&self.milestones)?,
    })
  }
}

/// Raw values read directly from an `intake_checklists` row.
pub struct RawChecklist {
  pub checklist_id: String,
  pub sample_id:    String,
  pub intake_round: u32,
  pub checks:       String,
  pub notes:        String,
  pub passed:       bool,
  pub submitted_by: String,
  pub submitted_at: String,
}

impl RawChecklist {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      checklist_id: row.get(0)?,
      sample_id:    row.get(1)?,
      intake_round: row.get(2)?,
      checks:       row.get(3)?,
      notes:        row.get(4)?,
      passed:       row.get(5)?,
      submitted_by: row.get(6)?,
      submitted_at: row.get(7)?,
    })
  }

  pub fn into_checklist(self) -> Result<IntakeChecklist> {
    let checks: BTreeMap<String, bool> = serde_json::from_str(&self.checks)?;
    let notes: BTreeMap<String, String> = serde_json::from_str(&self.notes)?;
    Ok(IntakeChecklist {
      checklist_id: decode_uuid(&self.checklist_id)?,
      sample_id: decode_uuid(&self.sample_id)?,
      intake_round: self.intake_round,
      checks,
      notes,
      passed: self.passed,
      submitted_by: decode_uuid(&self.submitted_by)?,
      submitted_at: decode_dt(&self.submitted_at)?,
    })
  }
}

/// Raw values read directly from a `qc_controls` row.
pub struct RawControl {
  pub qc_control_id: String,
  pub parameter_id:  String,
  pub method_id:     Option<String>,
  pub name:          String,
  pub target:        f64,
  pub tolerance:     f64,
  pub rules:         String,
  pub active:        bool,
  pub created_by:    String,
  pub created_at:    String,
}

impl RawControl {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      qc_control_id: row.get(0)?,
      parameter_id:  row.get(1)?,
      method_id:     row.get(2)?,
      name:          row.get(3)?,
      target:        row.get(4)?,
      tolerance:     row.get(5)?,
      rules:         row.get(6)?,
      active:        row.get(7)?,
      created_by:    row.get(8)?,
      created_at:    row.get(9)?,
    })
  }

  pub fn into_control(self) -> Result<QcControl> {
    Ok(QcControl {
      qc_control_id: decode_uuid(&self.qc_control_id)?,
      parameter_id:  decode_uuid(&self.parameter_id)?,
      method_id:     decode_opt_uuid(self.method_id.as_deref())?,
      name:          self.name,
      target:        self.target,
      tolerance:     self.tolerance,
      rules:         serde_json::from_str(&self.rules)?,
      active:        self.active,
      created_by:    decode_uuid(&self.created_by)?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `qc_runs` row.
pub struct RawRun {
  pub run_id:         String,
  pub sample_id:      String,
  pub qc_control_id:  String,
  pub value:          f64,
  pub z_score:        f64,
  pub violated_rules: String,
  pub status:         String,
  pub recorded_by:    String,
  pub recorded_at:    String,
}

impl RawRun {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      run_id:         row.get(0)?,
      sample_id:      row.get(1)?,
      qc_control_id:  row.get(2)?,
      value:          row.get(3)?,
      z_score:        row.get(4)?,
      violated_rules: row.get(5)?,
      status:         row.get(6)?,
      recorded_by:    row.get(7)?,
      recorded_at:    row.get(8)?,
    })
  }

  pub fn into_run(self) -> Result<QcRun> {
    Ok(QcRun {
      run_id:         decode_uuid(&self.run_id)?,
      sample_id:      decode_uuid(&self.sample_id)?,
      qc_control_id:  decode_uuid(&self.qc_control_id)?,
      value:          self.value,
      z_score:        self.z_score,
      violated_rules: serde_json::from_str(&self.violated_rules)?,
      status:         decode_enum("qc status", &self.status)?,
      recorded_by:    decode_uuid(&self.recorded_by)?,
      recorded_at:    decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw values read directly from an `artifacts` row. Signatures live in their
/// own table and are attached by the caller.
pub struct RawArtifact {
  pub artifact_id:    String,
  pub sample_id:      String,
  pub kind:           String,
  pub number:         String,
  pub sequence_value: i64,
  pub loa_status:     Option<String>,
  pub locked:         bool,
  pub locked_at:      Option<String>,
  pub content_digest: Option<String>,
  pub created_by:     String,
  pub created_at:     String,
}

impl RawArtifact {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      artifact_id:    row.get(0)?,
      sample_id:      row.get(1)?,
      kind:           row.get(2)?,
      number:         row.get(3)?,
      sequence_value: row.get(4)?,
      loa_status:     row.get(5)?,
      locked:         row.get(6)?,
      locked_at:      row.get(7)?,
      content_digest: row.get(8)?,
      created_by:     row.get(9)?,
      created_at:     row.get(10)?,
    })
  }

  pub fn into_artifact(self, signatures: Vec<Signature>) -> Result<GeneratedArtifact> {
    Ok(GeneratedArtifact {
      artifact_id: decode_uuid(&self.artifact_id)?,
      sample_id: decode_uuid(&self.sample_id)?,
      kind: decode_enum("artifact kind", &self.kind)?,
      number: self.number,
      sequence_value: self.sequence_value,
      loa_status: self
        .loa_status
        .as_deref()
        .map(|s| decode_enum("letter of order status", s))
        .transpose()?,
      signatures,
      locked: self.locked,
      locked_at: self.locked_at.as_deref().map(decode_dt).transpose()?,
      content_digest: self.content_digest,
      created_by: decode_uuid(&self.created_by)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `artifact_signatures` row.
pub struct RawSignature {
  pub role:      String,
  pub signed_by: String,
  pub signed_at: String,
}

impl RawSignature {
  pub fn into_signature(self) -> Result<Signature> {
    Ok(Signature {
      role:      decode_enum("role", &self.role)?,
      signed_by: decode_uuid(&self.signed_by)?,
      signed_at: decode_dt(&self.signed_at)?,
    })
  }
}

/// Raw values read directly from an `audit_log` row.
pub struct RawAuditEntry {
  pub entry_id:    String,
  pub actor_id:    String,
  pub actor_role:  String,
  pub action:      String,
  pub entity_type: String,
  pub entity_id:   String,
  pub note:        Option<String>,
  pub before_json: Option<String>,
  pub after_json:  String,
  pub recorded_at: String,
}

impl RawAuditEntry {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:    row.get(0)?,
      actor_id:    row.get(1)?,
      actor_role:  row.get(2)?,
      action:      row.get(3)?,
      entity_type: row.get(4)?,
      entity_id:   row.get(5)?,
      note:        row.get(6)?,
      before_json: row.get(7)?,
      after_json:  row.get(8)?,
      recorded_at: row.get(9)?,
    })
  }

  pub fn into_entry(self) -> Result<AuditLogEntry> {
    Ok(AuditLogEntry {
      entry_id:    decode_uuid(&self.entry_id)?,
      actor_id:    decode_uuid(&self.actor_id)?,
      actor_role:  decode_enum("role", &self.actor_role)?,
      action:      decode_enum("audit action", &self.action)?,
      entity_type: decode_enum("entity type", &self.entity_type)?,
      entity_id:   self.entity_id,
      note:        self.note,
      before:      self.before_json.as_deref().map(serde_json::from_str).transpose()?,
      after:       serde_json::from_str(&self.after_json)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
