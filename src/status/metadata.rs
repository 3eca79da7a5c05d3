use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use super::request_info::RequestInfo;
use super::state::State;
use crate::error::{ErrorCode, TransformationError, TransformationResult};

/// Current outcome of a metadata sub-task.
///
/// Terminal variants carry their completion time, so a record can never be
/// terminal without one.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    InProgress,
    Succeeded {
        completed_at: DateTime<Utc>,
        content_type: String,
        content: Bytes,
    },
    Failed {
        completed_at: DateTime<Utc>,
        reason: ErrorCode,
        message: String,
    },
}

impl Outcome {
    fn state(&self) -> State {
        match self {
            Outcome::InProgress => State::InProgress,
            Outcome::Succeeded { .. } => State::Successful,
            Outcome::Failed { .. } => State::Failed,
        }
    }

    fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Outcome::InProgress => None,
            Outcome::Succeeded { completed_at, .. } | Outcome::Failed { completed_at, .. } => {
                Some(*completed_at)
            }
        }
    }
}

/// Tracks the production of one metadata type for a transformation.
///
/// The record moves from IN_PROGRESS to SUCCESSFUL or FAILED exactly once. The
/// outcome, including content, content type and completion time, is written
/// under a single per-record lock, so a reader that observes a terminal state
/// also observes its completion time.
#[derive(Debug)]
pub struct MetadataTransformation {
    metadata_type: String,
    transform_id: String,
    request_info: Arc<RequestInfo>,
    start_time: DateTime<Utc>,
    outcome: Mutex<Outcome>,
}

impl MetadataTransformation {
    pub(crate) fn new(
        metadata_type: String,
        transform_id: String,
        request_info: Arc<RequestInfo>,
    ) -> Self {
        Self::from_parts(
            metadata_type,
            transform_id,
            request_info,
            Utc::now(),
            Outcome::InProgress,
        )
    }

    /// Rebuild a record in whatever state it was stored in.
    pub(crate) fn from_parts(
        metadata_type: String,
        transform_id: String,
        request_info: Arc<RequestInfo>,
        start_time: DateTime<Utc>,
        outcome: Outcome,
    ) -> Self {
        Self {
            metadata_type,
            transform_id,
            request_info,
            start_time,
            outcome: Mutex::new(outcome),
        }
    }

    pub fn metadata_type(&self) -> &str {
        &self.metadata_type
    }

    /// Identifier of the owning transformation.
    pub fn transform_id(&self) -> &str {
        &self.transform_id
    }

    pub fn request_info(&self) -> &RequestInfo {
        &self.request_info
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn state(&self) -> State {
        self.lock_outcome().state()
    }

    pub fn is_completed(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn was_successful(&self) -> bool {
        self.state() == State::Successful
    }

    pub fn has_failed(&self) -> bool {
        self.state() == State::Failed
    }

    pub fn completion_time(&self) -> Option<DateTime<Utc>> {
        self.lock_outcome().completed_at()
    }

    /// Time spent so far, or the total time once the record is terminal.
    pub fn duration(&self) -> TimeDelta {
        let end = self.completion_time().unwrap_or_else(Utc::now);
        (end - self.start_time).max(TimeDelta::zero())
    }

    /// A fresh reader over the stored content, if the record succeeded.
    pub fn content(&self) -> Option<Cursor<Bytes>> {
        match &*self.lock_outcome() {
            Outcome::Succeeded { content, .. } => Some(Cursor::new(content.clone())),
            _ => None,
        }
    }

    pub fn content_type(&self) -> Option<String> {
        match &*self.lock_outcome() {
            Outcome::Succeeded { content_type, .. } => Some(content_type.clone()),
            _ => None,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        match &*self.lock_outcome() {
            Outcome::Succeeded { content, .. } => Some(content.len() as u64),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<ErrorCode> {
        match &*self.lock_outcome() {
            Outcome::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn failure_message(&self) -> Option<String> {
        match &*self.lock_outcome() {
            Outcome::Failed { message, .. } => Some(message.clone()),
            _ => None,
        }
    }

    /// Mark the sub-task successful, storing everything readable from `content`.
    ///
    /// The stream is drained before the state lock is taken and is dropped on
    /// every exit path. A read failure leaves the record IN_PROGRESS. Only one
    /// of any number of concurrent completions wins; the others get
    /// [`TransformationError::MetadataComplete`].
    pub fn succeed(
        &self,
        content_type: impl Into<String>,
        mut content: impl Read,
    ) -> TransformationResult<()> {
        let completed_at = Utc::now();
        // Skip draining the stream when the record is already terminal.
        if self.is_completed() {
            return Err(self.already_completed());
        }

        let mut buffer = Vec::new();
        let read = content.read_to_end(&mut buffer);
        drop(content);
        read.map_err(|source| TransformationError::ContentIo {
            transform_id: self.transform_id.clone(),
            metadata_type: self.metadata_type.clone(),
            source,
        })?;

        let length = buffer.len();
        let content_type = content_type.into();
        {
            let mut outcome = self.lock_outcome();
            if *outcome != Outcome::InProgress {
                drop(outcome);
                return Err(self.already_completed());
            }
            *outcome = Outcome::Succeeded {
                completed_at,
                content_type: content_type.clone(),
                content: Bytes::from(buffer),
            };
        }

        debug!(
            transform_id = %self.transform_id,
            metadata_type = %self.metadata_type,
            content_type = %content_type,
            content_length = length,
            "metadata transformation succeeded"
        );
        Ok(())
    }

    /// Mark the sub-task failed with a reason and a human-readable message.
    pub fn fail(&self, reason: ErrorCode, message: impl Into<String>) -> TransformationResult<()> {
        let completed_at = Utc::now();
        let message = message.into();
        {
            let mut outcome = self.lock_outcome();
            if *outcome != Outcome::InProgress {
                drop(outcome);
                return Err(self.already_completed());
            }
            *outcome = Outcome::Failed {
                completed_at,
                reason,
                message: message.clone(),
            };
        }

        debug!(
            transform_id = %self.transform_id,
            metadata_type = %self.metadata_type,
            %reason,
            message = %message,
            "metadata transformation failed"
        );
        Ok(())
    }

    pub(crate) fn outcome(&self) -> Outcome {
        self.lock_outcome().clone()
    }

    fn already_completed(&self) -> TransformationError {
        warn!(
            transform_id = %self.transform_id,
            metadata_type = %self.metadata_type,
            "rejected completion of an already completed metadata transformation"
        );
        TransformationError::MetadataComplete {
            transform_id: self.transform_id.clone(),
            metadata_type: self.metadata_type.clone(),
        }
    }

    fn lock_outcome(&self) -> MutexGuard<'_, Outcome> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
