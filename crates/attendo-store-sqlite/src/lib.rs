//! SQLite backend for the attendo store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every statement goes through
//! that one connection, and the read-decide-write paths additionally run in
//! `BEGIN IMMEDIATE` transactions.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
