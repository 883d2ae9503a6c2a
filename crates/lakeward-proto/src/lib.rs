//! Lakeward protocol types.
//!
//! Shared between the secure query engine and its HTTP surface. Everything
//! here is plain data and serializes with serde.
//!
//! # Modules
//!
//! - [`value`] - Scalar values carried in result rows
//! - [`result`] - Query results
//! - [`manifest`] - Time-boxed read manifests for direct file access
//! - [`stats`] - Aggregate table statistics
//! - [`error`] - Error classification shared by every exposed operation

pub mod error;
pub mod manifest;
pub mod result;
pub mod stats;
pub mod value;

pub use error::ErrorKind;
pub use manifest::{Manifest, ManifestColumn};
pub use result::QueryResult;
pub use stats::TableStatistics;
pub use value::Value;
