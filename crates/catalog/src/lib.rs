//! Tool and variable catalogs for docflow.
//!
//! The catalogs are read-only once loaded. They are constructed explicitly at
//! startup and shared by reference with the resolver and the coordinator.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_catalog;
pub mod manifest_dir;

pub use trait_::{CatalogError, ManifestProvider, Result, ToolCatalog, VariableCatalog};
pub use json_catalog::{Catalog, CatalogDocument};
pub use manifest_dir::ManifestDir;
