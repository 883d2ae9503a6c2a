//! Query execution, manifests and profiling.

pub mod executor;
pub mod manifest;
pub mod secure;

pub use executor::{ExecutorError, SqlExecutor, SqliteExecutor};
pub use manifest::{
    build_manifest, FilePresigner, PassthroughPresigner, PresignKeyError, SignedUrlPresigner,
};
pub use secure::{ExecuteOptions, SecureQueryEngine};
