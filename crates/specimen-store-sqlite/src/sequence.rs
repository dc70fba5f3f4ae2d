//! Counter rows behind the named series.
//!
//! A value is taken with one `UPDATE … RETURNING` on the counter row inside
//! the caller's write transaction, so the database write lock serialises
//! allocation across all callers and a rolled-back transaction returns its
//! value to the series.

use rusqlite::{Connection, OptionalExtension as _};
use specimen_core::sequence::{Allocation, Series};
use strum::IntoEnumIterator as _;

use crate::{Error, Result};

/// Create a counter row for every series that lacks one.
pub fn seed(conn: &Connection) -> Result<()> {
  for series in Series::iter() {
    conn.execute(
      "INSERT OR IGNORE INTO sequence_counters (name, next_value) VALUES (?1, 1)",
      rusqlite::params![series.counter_name()],
    )?;
  }
  Ok(())
}

/// Consume the next value of `series`.
pub fn take(conn: &Connection, series: Series) -> Result<Allocation> {
  let value: i64 = conn
    .query_row(
      "UPDATE sequence_counters SET next_value = next_value + 1
       WHERE name = ?1
       RETURNING next_value - 1",
      rusqlite::params![series.counter_name()],
      |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| missing(series))?;
  Ok(Allocation::new(series, value))
}

/// The value the next [`take`] will return.
pub fn peek(conn: &Connection, series: Series) -> Result<i64> {
  conn
    .query_row(
      "SELECT next_value FROM sequence_counters WHERE name = ?1",
      rusqlite::params![series.counter_name()],
      |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| missing(series))
}

fn missing(series: Series) -> Error {
  specimen_core::Error::not_found(format!("sequence counter {}", series.counter_name()))
    .into()
}
