//! Generated documents: the certificate trigger, locking and the letter of
//! order signature flow.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use specimen_core::{
  BlockReason, Error as Rejection,
  artifact::{
    ArtifactKind, GeneratedArtifact, REQUIRED_INTERNAL_SIGNERS, Signature, certificate_ready,
  },
  audit::{AuditAction, EntityType, NewAuditEntry},
  policy::{self, Operation},
  role::{Actor, Role},
  status::LoaStatus,
  workflow::{Driver, LetterOfOrder, check_transition},
};

use crate::{Result, audit, digest::content_digest, records, sequence};

/// What the certificate trigger found.
#[derive(Debug)]
pub enum CertificateOutcome {
  /// Some test is still outstanding.
  Pending,
  Existing(GeneratedArtifact),
  Generated(GeneratedArtifact),
}

impl CertificateOutcome {
  pub fn into_artifact(self) -> Option<GeneratedArtifact> {
    match self {
      Self::Pending => None,
      Self::Existing(a) | Self::Generated(a) => Some(a),
    }
  }
}

fn new_artifact(
  conn: &Connection,
  sample_id: Uuid,
  kind: ArtifactKind,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<GeneratedArtifact> {
  let allocation = sequence::take(conn, kind.series())?;
  let artifact = GeneratedArtifact {
    artifact_id: Uuid::new_v4(),
    sample_id,
    kind,
    number: allocation.formatted,
    sequence_value: allocation.value,
    loa_status: (kind == ArtifactKind::LetterOfOrder).then_some(LoaStatus::Draft),
    signatures: Vec::new(),
    locked: false,
    locked_at: None,
    content_digest: None,
    created_by: actor.actor_id,
    created_at: at,
  };
  records::insert_artifact(conn, &artifact)?;
  Ok(artifact)
}

/// Generate the sample's certificate of analysis once every live test is
/// validated. An existing certificate, locked or not, is returned as is.
pub fn certificate_trigger(
  conn: &Connection,
  sample_id: Uuid,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<CertificateOutcome> {
  if let Some(existing) =
    records::artifact_of_kind(conn, sample_id, ArtifactKind::CertificateOfAnalysis)?
  {
    return Ok(CertificateOutcome::Existing(existing));
  }
  let tests = records::tests_for_sample(conn, sample_id)?;
  if !certificate_ready(&tests) {
    return Ok(CertificateOutcome::Pending);
  }

  let artifact =
    new_artifact(conn, sample_id, ArtifactKind::CertificateOfAnalysis, actor, at)?;
  let tests: Vec<Uuid> = tests.iter().map(|t| t.test_id).collect();
  let entry = NewAuditEntry::new(
    &actor,
    AuditAction::ArtifactGenerate,
    EntityType::Artifact,
    artifact.artifact_id,
  )
  .note(Some(format!("certificate {} for sample {sample_id}", artifact.number)))
  .after(&json!({ "artifact": &artifact, "tests": tests }))?;
  audit::append(conn, entry, at)?;
  Ok(CertificateOutcome::Generated(artifact))
}

pub fn ensure_certificate(
  conn: &Connection,
  sample_id: Uuid,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<CertificateOutcome> {
  records::require_sample(conn, sample_id)?;
  policy::authorize(actor.role, Operation::EnsureCertificate)?;
  certificate_trigger(conn, sample_id, actor, at)
}

pub fn lock(
  conn: &Connection,
  artifact_id: Uuid,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<GeneratedArtifact> {
  let mut artifact = records::require_artifact(conn, artifact_id)?;
  policy::authorize(actor.role, Operation::LockArtifact)?;
  if artifact.locked {
    return Err(Rejection::Conflict(format!("{} is already locked", artifact.number)).into());
  }
  if artifact.kind != ArtifactKind::CertificateOfAnalysis {
    return Err(
      Rejection::validation(
        BlockReason::NotEligible,
        "a letter of order is locked by the client's signature",
      )
      .into(),
    );
  }

  let tests = records::tests_for_sample(conn, artifact.sample_id)?;
  artifact.locked = true;
  artifact.locked_at = Some(at);
  artifact.content_digest = Some(content_digest(&artifact, &tests));
  records::update_artifact(conn, &artifact)?;

  let entry =
    NewAuditEntry::new(&actor, AuditAction::ArtifactLock, EntityType::Artifact, artifact_id)
      .before(&json!({ "locked": false }))?
      .after(&json!({
        "locked": true,
        "content_digest": artifact.content_digest,
      }))?;
  audit::append(conn, entry, at)?;
  Ok(artifact)
}

// ─── Letter of order ─────────────────────────────────────────────────────────

fn require_letter(conn: &Connection, id: Uuid) -> Result<GeneratedArtifact> {
  let artifact = records::require_artifact(conn, id)?;
  if artifact.kind != ArtifactKind::LetterOfOrder {
    return Err(
      Rejection::validation(
        BlockReason::NotEligible,
        format!("{} is not a letter of order", artifact.number),
      )
      .into(),
    );
  }
  artifact.ensure_unlocked()?;
  Ok(artifact)
}

fn loa_status(artifact: &GeneratedArtifact) -> LoaStatus {
  artifact.loa_status.unwrap_or(LoaStatus::Draft)
}

pub fn create_letter(
  conn: &Connection,
  sample_id: Uuid,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<GeneratedArtifact> {
  records::require_sample(conn, sample_id)?;
  policy::authorize(actor.role, Operation::CreateLetterOfOrder)?;
  if let Some(existing) =
    records::artifact_of_kind(conn, sample_id, ArtifactKind::LetterOfOrder)?
  {
    return Err(
      Rejection::Conflict(format!(
        "sample {sample_id} already has letter of order {}",
        existing.number
      ))
      .into(),
    );
  }

  let artifact = new_artifact(conn, sample_id, ArtifactKind::LetterOfOrder, actor, at)?;
  let entry = NewAuditEntry::new(
    &actor,
    AuditAction::LoaCreate,
    EntityType::Artifact,
    artifact.artifact_id,
  )
  .after(&artifact)?;
  audit::append(conn, entry, at)?;
  Ok(artifact)
}

/// Add an internal signature under `role_code`. Once every required role
/// has signed the letter becomes `internally_signed`.
pub fn sign_letter(
  conn: &Connection,
  artifact_id: Uuid,
  role_code: Role,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<GeneratedArtifact> {
  let mut artifact = require_letter(conn, artifact_id)?;
  if !REQUIRED_INTERNAL_SIGNERS.contains(&role_code) {
    return Err(
      Rejection::BadRequest(format!("{role_code} is not an internal signing role")).into(),
    );
  }
  if actor.role != role_code {
    return Err(
      Rejection::Forbidden(format!("role {} may not sign as {role_code}", actor.role)).into(),
    );
  }
  if artifact.has_signature(role_code) {
    return Err(
      Rejection::Conflict(format!(
        "{} already carries a {role_code} signature",
        artifact.number
      ))
      .into(),
    );
  }
  let from = loa_status(&artifact);
  if from != LoaStatus::Draft {
    return Err(
      Rejection::InvalidTransition(format!("letter_of_order: cannot sign while {from}")).into(),
    );
  }

  let signature = Signature { role: role_code, signed_by: actor.actor_id, signed_at: at };
  records::insert_signature(conn, artifact_id, &signature)?;
  artifact.signatures.push(signature);

  if artifact.internal_signatures_complete() {
    let edge = check_transition::<LetterOfOrder>(
      actor.role,
      from,
      LoaStatus::InternallySigned,
      Driver::Signature,
    )?;
    artifact.loa_status = Some(edge.to);
    records::update_artifact(conn, &artifact)?;
  }

  let entry =
    NewAuditEntry::new(&actor, AuditAction::LoaSign, EntityType::Artifact, artifact_id)
      .note(Some(role_code.to_string()))
      .before(&json!({ "loa_status": from }))?
      .after(&json!({
        "loa_status": loa_status(&artifact),
        "signed_as": role_code,
      }))?;
  audit::append(conn, entry, at)?;
  Ok(artifact)
}

pub fn send_letter(
  conn: &Connection,
  artifact_id: Uuid,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<GeneratedArtifact> {
  let mut artifact = require_letter(conn, artifact_id)?;
  let from = loa_status(&artifact);
  let edge =
    check_transition::<LetterOfOrder>(actor.role, from, LoaStatus::Sent, Driver::Manual)?;

  artifact.loa_status = Some(edge.to);
  records::update_artifact(conn, &artifact)?;

  let entry =
    NewAuditEntry::new(&actor, AuditAction::LoaSend, EntityType::Artifact, artifact_id)
      .before(&json!({ "loa_status": from }))?
      .after(&json!({ "loa_status": edge.to }))?;
  audit::append(conn, entry, at)?;
  Ok(artifact)
}

/// The client's countersignature, which locks the letter.
pub fn client_sign_letter(
  conn: &Connection,
  artifact_id: Uuid,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<GeneratedArtifact> {
  let mut artifact = require_letter(conn, artifact_id)?;
  let from = loa_status(&artifact);
  let edge = check_transition::<LetterOfOrder>(
    actor.role,
    from,
    LoaStatus::ClientSigned,
    Driver::Manual,
  )?;
  let sample = records::require_sample(conn, artifact.sample_id)?;
  if sample.client_id != actor.actor_id {
    return Err(
      Rejection::Forbidden(format!("{} belongs to another client", artifact.number)).into(),
    );
  }

  let signature = Signature { role: Role::Client, signed_by: actor.actor_id, signed_at: at };
  records::insert_signature(conn, artifact_id, &signature)?;
  artifact.signatures.push(signature);
  artifact.loa_status = Some(edge.to);
  artifact.locked = true;
  artifact.locked_at = Some(at);
  artifact.content_digest = Some(content_digest(&artifact, &[]));
  records::update_artifact(conn, &artifact)?;

  let entry =
    NewAuditEntry::new(&actor, AuditAction::LoaClientSign, EntityType::Artifact, artifact_id)
      .before(&json!({ "loa_status": from, "locked": false }))?
      .after(&json!({
        "loa_status": edge.to,
        "locked": true,
        "content_digest": artifact.content_digest,
      }))?;
  audit::append(conn, entry, at)?;
  Ok(artifact)
}
