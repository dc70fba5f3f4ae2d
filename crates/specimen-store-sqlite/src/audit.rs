//! Append and query the audit log.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use specimen_core::audit::{AuditLogEntry, EntityType, NewAuditEntry};
use uuid::Uuid;

use crate::{
  Result,
  encode::{AUDIT_COLUMNS, RawAuditEntry, encode_dt, encode_uuid},
};

/// Write one entry inside the caller's transaction.
pub fn append(conn: &Connection, entry: NewAuditEntry, at: DateTime<Utc>) -> Result<Uuid> {
  let entry_id = Uuid::new_v4();
  let before = entry.before.as_ref().map(serde_json::to_string).transpose()?;
  let after = serde_json::to_string(&entry.after)?;

  conn.execute(
    "INSERT INTO audit_log (
       entry_id, actor_id, actor_role, action, entity_type, entity_id,
       note, before_json, after_json, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    rusqlite::params![
      encode_uuid(entry_id),
      encode_uuid(entry.actor.actor_id),
      entry.actor.role.as_ref(),
      entry.action.as_ref(),
      entry.entity_type.as_ref(),
      entry.entity_id,
      entry.note,
      before,
      after,
      encode_dt(at),
    ],
  )?;
  Ok(entry_id)
}

/// Entries for one entity, oldest first.
pub fn trail(
  conn: &Connection,
  entity_type: EntityType,
  entity_id: &str,
) -> Result<Vec<AuditLogEntry>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {AUDIT_COLUMNS} FROM audit_log
     WHERE entity_type = ?1 AND entity_id = ?2
     ORDER BY rowid"
  ))?;
  let raws = stmt
    .query_map(
      rusqlite::params![entity_type.as_ref(), entity_id],
      RawAuditEntry::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawAuditEntry::into_entry).collect()
}
