//! Storage abstraction and implementations for lifeline.
//!
//! This crate provides a trait-based storage interface with a JSON-file
//! reference implementation and an optional SQLite backend.

#![warn(missing_docs)]

pub mod json_storage;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod trait_;

pub use json_storage::JsonStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
pub use trait_::{settle, Result, Storage, StorageError};
