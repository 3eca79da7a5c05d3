use serde::{Deserialize, Serialize};
use url::Url;

/// The three locations associated with a transformation request.
///
/// Immutable once built; shared read-only between a transformation and all of
/// its metadata sub-tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestInfo {
    current_location: Url,
    final_location: Url,
    metadata_location: Url,
}

impl RequestInfo {
    pub fn new(current_location: Url, final_location: Url, metadata_location: Url) -> Self {
        Self {
            current_location,
            final_location,
            metadata_location,
        }
    }

    /// Where the source content can currently be retrieved.
    pub fn current_location(&self) -> &Url {
        &self.current_location
    }

    /// The downloadable location to put on the transformed metadata.
    pub fn final_location(&self) -> &Url {
        &self.final_location
    }

    /// Where the metadata document for the content lives.
    pub fn metadata_location(&self) -> &Url {
        &self.metadata_location
    }
}
