//! Song master builder library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod error;
pub mod literal;
pub mod manifest;
pub mod master_store;
pub mod normalize;
pub mod pipeline;
pub mod sources;
pub mod sqlite_persistence;
pub mod validation;

// Re-export commonly used types for convenience
pub use error::{ExtractionError, IntegrityError, ReconciliationError, ValidationError};
pub use master_store::{SongMasterStore, SongRecord};
pub use pipeline::{run_build, run_validate, BuildReport, ValidateOptions};
