//! SQLite backend for the specimen lifecycle engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every mutation is a single
//! `BEGIN IMMEDIATE` transaction, which takes the database write lock up
//! front: state is read and written under that lock, and contention beyond
//! the configured busy timeout surfaces as [`specimen_core::Error::Busy`].

mod artifacts;
mod audit;
mod digest;
mod encode;
mod intake;
mod qc;
mod records;
mod schema;
mod sequence;
mod store;
mod testing;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoreOptions};

#[cfg(test)]
mod tests;
