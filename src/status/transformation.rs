use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use super::metadata::{MetadataTransformation, Outcome};
use super::request_info::RequestInfo;
use super::state::State;
use crate::error::{TransformationError, TransformationResult};

type MetadataMap = BTreeMap<String, Arc<MetadataTransformation>>;

/// One asynchronous transformation job and its metadata sub-tasks.
///
/// A transformation is complete once it has at least one sub-task and every
/// sub-task is terminal. Its completion time and state are folded from the
/// children on every read rather than cached.
#[derive(Debug)]
pub struct Transformation {
    transform_id: String,
    request_info: Arc<RequestInfo>,
    start_time: DateTime<Utc>,
    metadata: Mutex<MetadataMap>,
}

impl Transformation {
    pub(crate) fn new(transform_id: String, request_info: RequestInfo) -> Self {
        Self {
            transform_id,
            request_info: Arc::new(request_info),
            start_time: Utc::now(),
            metadata: Mutex::new(BTreeMap::new()),
        }
    }

    /// Rebuild a transformation whose sub-tasks may already be terminal.
    pub(crate) fn from_parts(
        transform_id: String,
        request_info: RequestInfo,
        start_time: DateTime<Utc>,
        children: impl IntoIterator<Item = (String, DateTime<Utc>, Outcome)>,
    ) -> TransformationResult<Self> {
        let request_info = Arc::new(request_info);
        let mut metadata = BTreeMap::new();
        for (metadata_type, child_start, outcome) in children {
            if metadata.contains_key(&metadata_type) {
                return Err(TransformationError::DuplicateMetadata {
                    transform_id,
                    metadata_type,
                });
            }
            let child = MetadataTransformation::from_parts(
                metadata_type.clone(),
                transform_id.clone(),
                Arc::clone(&request_info),
                child_start,
                outcome,
            );
            metadata.insert(metadata_type, Arc::new(child));
        }

        Ok(Self {
            transform_id,
            request_info,
            start_time,
            metadata: Mutex::new(metadata),
        })
    }

    pub fn transform_id(&self) -> &str {
        &self.transform_id
    }

    pub fn request_info(&self) -> &RequestInfo {
        &self.request_info
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Start tracking a new metadata type for this transformation.
    ///
    /// Fails when the type is empty, already tracked, or the transformation is
    /// already complete. Concurrent adds of the same type resolve to exactly one
    /// success.
    pub fn add(
        &self,
        metadata_type: impl Into<String>,
    ) -> TransformationResult<Arc<MetadataTransformation>> {
        let metadata_type = metadata_type.into();
        if metadata_type.trim().is_empty() {
            return Err(TransformationError::EmptyMetadataType {
                transform_id: self.transform_id.clone(),
            });
        }

        let mut metadata = self.lock_metadata();
        if metadata.contains_key(&metadata_type) {
            drop(metadata);
            warn!(
                transform_id = %self.transform_id,
                metadata_type = %metadata_type,
                "rejected duplicate metadata type"
            );
            return Err(TransformationError::DuplicateMetadata {
                transform_id: self.transform_id.clone(),
                metadata_type,
            });
        }
        if completion_of(&metadata).is_some() {
            drop(metadata);
            warn!(
                transform_id = %self.transform_id,
                metadata_type = %metadata_type,
                "rejected metadata type for a completed transformation"
            );
            return Err(TransformationError::TransformationComplete {
                transform_id: self.transform_id.clone(),
            });
        }

        let child = Arc::new(MetadataTransformation::new(
            metadata_type.clone(),
            self.transform_id.clone(),
            Arc::clone(&self.request_info),
        ));
        metadata.insert(metadata_type.clone(), Arc::clone(&child));
        drop(metadata);

        debug!(
            transform_id = %self.transform_id,
            metadata_type = %metadata_type,
            "added metadata transformation"
        );
        Ok(child)
    }

    /// Snapshot of the current sub-tasks, ordered by metadata type.
    pub fn metadatas(&self) -> Vec<Arc<MetadataTransformation>> {
        self.lock_metadata().values().cloned().collect()
    }

    /// Snapshot of the metadata types currently tracked, in sorted order.
    pub fn metadata_types(&self) -> Vec<String> {
        self.lock_metadata().keys().cloned().collect()
    }

    pub fn metadata(&self, metadata_type: &str) -> Option<Arc<MetadataTransformation>> {
        self.lock_metadata().get(metadata_type).cloned()
    }

    pub fn is_completed(&self) -> bool {
        self.completion_time().is_some()
    }

    /// Latest completion time among the sub-tasks, once all of them are terminal.
    pub fn completion_time(&self) -> Option<DateTime<Utc>> {
        completion_of(&self.lock_metadata())
    }

    pub fn duration(&self) -> TimeDelta {
        let end = self.completion_time().unwrap_or_else(Utc::now);
        (end - self.start_time).max(TimeDelta::zero())
    }

    /// IN_PROGRESS until complete; then FAILED if any sub-task failed,
    /// otherwise SUCCESSFUL.
    pub fn state(&self) -> State {
        let metadata = self.lock_metadata();
        if metadata.is_empty() {
            return State::InProgress;
        }
        let mut state = State::Successful;
        for child in metadata.values() {
            match child.state() {
                State::InProgress => return State::InProgress,
                State::Failed => state = State::Failed,
                State::Successful => {}
            }
        }
        state
    }

    fn lock_metadata(&self) -> MutexGuard<'_, MetadataMap> {
        self.metadata.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Each child's completion time is read once, so a terminal child always
// contributes its timestamp.
fn completion_of(metadata: &MetadataMap) -> Option<DateTime<Utc>> {
    let mut latest: Option<DateTime<Utc>> = None;
    for child in metadata.values() {
        let completed = child.completion_time()?;
        latest = Some(latest.map_or(completed, |current| current.max(completed)));
    }
    latest
}
