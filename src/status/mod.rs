mod metadata;
mod request_info;
mod state;
mod transformation;

pub use metadata::MetadataTransformation;
pub(crate) use metadata::Outcome;
pub use request_info::RequestInfo;
pub use state::State;
pub use transformation::Transformation;
