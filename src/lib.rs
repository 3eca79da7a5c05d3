//! Status tracking for asynchronous metadata transformations.
//!
//! A [`Transformation`] fans out into one [`MetadataTransformation`] per
//! metadata type. Workers complete each sub-task exactly once with
//! [`MetadataTransformation::succeed`] or [`MetadataTransformation::fail`];
//! readers poll a [`TransformationManager`] for the current state.

pub mod config;
pub mod error;
pub mod manager;
pub mod record;
pub mod status;
pub mod telemetry;
pub mod worker;

pub use error::{
    ErrorCode, PersistenceError, PersistenceErrorKind, TransformationError, TransformationResult,
};
pub use manager::{InMemoryTransformationManager, TransformationManager};
pub use record::{MetadataRecord, StoredTransformation, TransformationRecord, UnknownRecord};
pub use status::{MetadataTransformation, RequestInfo, State, Transformation};
