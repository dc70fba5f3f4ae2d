//! Content digests recorded when an artifact is locked.
//!
//! SHA-256 over the artifact's identity, its signatures (sorted by role) and,
//! for certificates, the validated tests it certifies (sorted by id), so the
//! same document always yields the same digest.

use sha2::{Digest, Sha256};
use specimen_core::{artifact::GeneratedArtifact, sample::SampleTest};

pub fn content_digest(artifact: &GeneratedArtifact, tests: &[SampleTest]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(artifact.artifact_id.as_bytes());
  hasher.update(artifact.sample_id.as_bytes());
  hasher.update(artifact.kind.as_ref().as_bytes());
  hasher.update(artifact.number.as_bytes());
  hasher.update(artifact.sequence_value.to_le_bytes());

  let mut signatures: Vec<_> = artifact.signatures.iter().collect();
  signatures.sort_by(|a, b| a.role.as_ref().cmp(b.role.as_ref()));
  for s in signatures {
    hasher.update(s.role.as_ref().as_bytes());
    hasher.update(s.signed_by.as_bytes());
    hasher.update(s.signed_at.timestamp_micros().to_le_bytes());
  }

  let mut tests: Vec<_> = tests.iter().collect();
  tests.sort_by_key(|t| t.test_id);
  for t in tests {
    hasher.update(t.test_id.as_bytes());
    hasher.update(t.parameter_id.as_bytes());
    hasher.update(t.status.as_ref().as_bytes());
    if let Some(by) = t.validated_by {
      hasher.update(by.as_bytes());
    }
  }

  hex::encode(hasher.finalize())
}
