//! Per-request data stores for docflow.
//!
//! A data store collects every value merged during one request. Entries are
//! append-only: a later value for the same variable never replaces an earlier
//! one, so provenance is preserved.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod json_storage;

pub use trait_::{DataStore, StorageError, Result};
pub use memory::MemoryDataStore;
pub use json_storage::JsonDataStore;
