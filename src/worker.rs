use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, TransformationError};
use crate::status::{MetadataTransformation, Transformation};

/// What a simulated worker will do with one metadata type.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedOutcome {
    Succeed {
        content_type: String,
        content: Vec<u8>,
    },
    Fail {
        reason: ErrorCode,
        message: String,
    },
}

/// One metadata type to produce and how producing it ends.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub metadata_type: String,
    pub outcome: PlannedOutcome,
}

impl WorkItem {
    /// Build a plan for `types`, failing the one named by `fail`.
    pub fn plan(types: &[String], fail: Option<&str>) -> Vec<WorkItem> {
        types
            .iter()
            .map(|metadata_type| {
                let outcome = if fail == Some(metadata_type.as_str()) {
                    PlannedOutcome::Fail {
                        reason: ErrorCode::TransformationFailure,
                        message: format!("simulated failure producing [{metadata_type}]"),
                    }
                } else {
                    PlannedOutcome::Succeed {
                        content_type: "application/xml".to_string(),
                        content: format!("<{metadata_type}/>").into_bytes(),
                    }
                };
                WorkItem {
                    metadata_type: metadata_type.clone(),
                    outcome,
                }
            })
            .collect()
    }
}

/// Notified each time a worker completes a metadata sub-task.
pub trait CompletionObserver: Send + Sync {
    fn on_complete(&self, metadata: &MetadataTransformation);
}

/// Observer that ignores completions.
pub struct NoopObserver;

impl CompletionObserver for NoopObserver {
    fn on_complete(&self, _metadata: &MetadataTransformation) {}
}

/// Drives every sub-task of a transformation to completion, one task per type.
pub struct TransformationWorker {
    /// Simulated work per metadata type; the n-th type finishes after n delays.
    pub delay: Duration,
}

impl TransformationWorker {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Add every planned type to `transformation`, then complete them concurrently.
    ///
    /// Every sub-task this call adds ends terminal: if adding a later type is
    /// refused, the ones already added are failed, and every spawned task is
    /// awaited before the first error is returned.
    pub async fn run(
        &self,
        transformation: Arc<Transformation>,
        items: Vec<WorkItem>,
        observer: Arc<dyn CompletionObserver>,
    ) -> Result<()> {
        if items.is_empty() {
            bail!("at least one metadata type is required");
        }
        let mut planned = HashSet::with_capacity(items.len());
        if let Some(item) = items.iter().find(|i| !planned.insert(i.metadata_type.as_str())) {
            bail!("metadata type [{}] is planned more than once", item.metadata_type);
        }

        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            match transformation.add(&item.metadata_type) {
                Ok(metadata) => handles.push((metadata, item.outcome)),
                Err(err) => {
                    abandon(&handles, &err);
                    return Err(err.into());
                }
            }
        }

        let mut tasks = JoinSet::new();
        for (index, (metadata, outcome)) in handles.into_iter().enumerate() {
            let delay = self.delay * (index as u32 + 1);
            let observer = Arc::clone(&observer);
            tasks.spawn(async move {
                sleep(delay).await;
                let result = match outcome {
                    PlannedOutcome::Succeed {
                        content_type,
                        content,
                    } => metadata.succeed(content_type, content.as_slice()),
                    PlannedOutcome::Fail { reason, message } => metadata.fail(reason, message),
                };
                if result.is_ok() {
                    observer.on_complete(&metadata);
                }
                result
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .context("worker task panicked")
                .and_then(|result| result.map_err(anyhow::Error::from));
            if let Err(err) = outcome {
                warn!(transform_id = %transformation.transform_id(), "worker task failed: {err:#}");
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        info!(
            transform_id = %transformation.transform_id(),
            state = %transformation.state(),
            duration_ms = transformation.duration().num_milliseconds(),
            "transformation finished"
        );
        Ok(())
    }
}

// Fail sub-tasks added before the plan was refused so none stay in progress.
fn abandon(handles: &[(Arc<MetadataTransformation>, PlannedOutcome)], cause: &TransformationError) {
    for (metadata, _) in handles {
        if let Err(err) = metadata.fail(
            ErrorCode::InternalServerError,
            format!("worker aborted before completion: {cause}"),
        ) {
            debug!(metadata_type = %metadata.metadata_type(), "sub-task already complete: {err}");
        }
    }
}
