//! Generated documents: certificates of analysis and letters of order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  BlockReason, Error, Result,
  role::Role,
  sample::SampleTest,
  sequence::Series,
  status::{LoaStatus, TestStatus},
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ArtifactKind {
  CertificateOfAnalysis,
  LetterOfOrder,
}

impl ArtifactKind {
  /// The series that numbers this kind of document.
  pub fn series(self) -> Series {
    match self {
      Self::CertificateOfAnalysis => Series::ReportNumber,
      Self::LetterOfOrder => Series::OrderNumber,
    }
  }
}

/// Internal roles whose signatures a letter of order needs before it can be
/// sent to the client.
pub const REQUIRED_INTERNAL_SIGNERS: &[Role] = &[Role::OperationalManager, Role::LabHead];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
  pub role:      Role,
  pub signed_by: Uuid,
  pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
  pub artifact_id:    Uuid,
  pub sample_id:      Uuid,
  pub kind:           ArtifactKind,
  /// Rendered document number, unique across all artifacts.
  pub number:         String,
  pub sequence_value: i64,
  /// Only letters of order carry a workflow status.
  pub loa_status:     Option<LoaStatus>,
  pub signatures:     Vec<Signature>,
  pub locked:         bool,
  pub locked_at:      Option<DateTime<Utc>>,
  /// Hex SHA-256 over the document content, recorded when locked.
  pub content_digest: Option<String>,
  pub created_by:     Uuid,
  pub created_at:     DateTime<Utc>,
}

impl GeneratedArtifact {
  pub fn ensure_unlocked(&self) -> Result<()> {
    if self.locked {
      return Err(Error::validation(
        BlockReason::Locked,
        format!("{} {} is locked", self.kind, self.number),
      ));
    }
    Ok(())
  }

  pub fn has_signature(&self, role: Role) -> bool {
    self.signatures.iter().any(|s| s.role == role)
  }

  pub fn internal_signatures_complete(&self) -> bool {
    REQUIRED_INTERNAL_SIGNERS.iter().all(|r| self.has_signature(*r))
  }
}

/// Whether a sample's tests warrant a certificate: at least one test is
/// active, and every test that was not cancelled has been validated.
pub fn certificate_ready(tests: &[SampleTest]) -> bool {
  let mut live = tests.iter().filter(|t| t.status != TestStatus::Cancelled).peekable();
  live.peek().is_some() && live.all(|t| t.status == TestStatus::Validated)
}
