//! SQLite backend for the patron request service.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Besides persistence, the store owns
//! the service-side business rules: quota and duplicate enforcement on
//! create, the routing decision, and record invariant checks on update.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoreOptions};

#[cfg(test)]
mod tests;
