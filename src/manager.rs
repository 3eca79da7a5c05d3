//! Registry of live transformations.
//!
//! [`TransformationManager`] is the contract a registry fulfils; the
//! [`InMemoryTransformationManager`] keeps everything in a process-wide map and
//! a persistence-backed registry can stand in behind the same trait.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{TransformationError, TransformationResult};
use crate::status::{MetadataTransformation, RequestInfo, Transformation};

/// Creates, looks up and deletes transformations.
pub trait TransformationManager: Send + Sync {
    /// Register a new transformation under a freshly generated identifier.
    fn create_transform(
        &self,
        current_location: Url,
        final_location: Url,
        metadata_location: Url,
    ) -> TransformationResult<Arc<Transformation>>;

    /// Look up a transformation by identifier.
    fn get(&self, transform_id: &str) -> TransformationResult<Arc<Transformation>>;

    /// Look up one metadata sub-task of a transformation.
    ///
    /// The not-found error names whichever of the two keys is missing.
    fn get_metadata(
        &self,
        transform_id: &str,
        metadata_type: &str,
    ) -> TransformationResult<Arc<MetadataTransformation>> {
        self.get(transform_id)?
            .metadata(metadata_type)
            .ok_or_else(|| TransformationError::MetadataNotFound {
                transform_id: transform_id.to_string(),
                metadata_type: metadata_type.to_string(),
            })
    }

    /// Remove a transformation and all of its sub-tasks.
    fn delete(&self, transform_id: &str) -> TransformationResult<()>;
}

/// Keeps every transformation in memory for the lifetime of the manager.
#[derive(Debug, Default)]
pub struct InMemoryTransformationManager {
    store: RwLock<HashMap<String, Arc<Transformation>>>,
}

impl InMemoryTransformationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transformation rebuilt from storage under its stored identifier.
    pub fn restore(
        &self,
        transformation: Transformation,
    ) -> TransformationResult<Arc<Transformation>> {
        let mut store = self.write_store();
        if store.contains_key(transformation.transform_id()) {
            return Err(TransformationError::DuplicateTransformation {
                transform_id: transformation.transform_id().to_string(),
            });
        }
        let transformation = Arc::new(transformation);
        store.insert(
            transformation.transform_id().to_string(),
            Arc::clone(&transformation),
        );
        drop(store);

        debug!(transform_id = %transformation.transform_id(), "restored transformation");
        Ok(transformation)
    }

    pub fn len(&self) -> usize {
        self.read_store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_store().is_empty()
    }

    fn read_store(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Transformation>>> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Transformation>>> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransformationManager for InMemoryTransformationManager {
    fn create_transform(
        &self,
        current_location: Url,
        final_location: Url,
        metadata_location: Url,
    ) -> TransformationResult<Arc<Transformation>> {
        let request_info = RequestInfo::new(current_location, final_location, metadata_location);

        let mut store = self.write_store();
        let mut transform_id = Uuid::new_v4().to_string();
        while store.contains_key(&transform_id) {
            transform_id = Uuid::new_v4().to_string();
        }
        let transformation = Arc::new(Transformation::new(transform_id.clone(), request_info));
        store.insert(transform_id.clone(), Arc::clone(&transformation));
        drop(store);

        debug!(transform_id = %transform_id, "created transformation");
        Ok(transformation)
    }

    fn get(&self, transform_id: &str) -> TransformationResult<Arc<Transformation>> {
        self.read_store().get(transform_id).cloned().ok_or_else(|| {
            TransformationError::TransformationNotFound {
                transform_id: transform_id.to_string(),
            }
        })
    }

    fn delete(&self, transform_id: &str) -> TransformationResult<()> {
        match self.write_store().remove(transform_id) {
            Some(_) => {
                debug!(transform_id = %transform_id, "deleted transformation");
                Ok(())
            }
            None => {
                warn!(transform_id = %transform_id, "delete requested for unknown transformation");
                Err(TransformationError::TransformationNotFound {
                    transform_id: transform_id.to_string(),
                })
            }
        }
    }
}
