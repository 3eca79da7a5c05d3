use thiserror::Error;

/// Errors raised by the transformation status core.
#[derive(Debug, Error)]
pub enum TransformationError {
    #[error("Transformation [{transform_id}] cannot be found")]
    TransformationNotFound { transform_id: String },

    #[error("No [{metadata_type}] metadata found for transformation [{transform_id}]")]
    MetadataNotFound {
        transform_id: String,
        metadata_type: String,
    },

    #[error("[{metadata_type}] metadata already exists for transformation [{transform_id}]")]
    DuplicateMetadata {
        transform_id: String,
        metadata_type: String,
    },

    #[error("transformation [{transform_id}] is already complete")]
    TransformationComplete { transform_id: String },

    #[error("[{metadata_type}] metadata for transformation [{transform_id}] is already completed")]
    MetadataComplete {
        transform_id: String,
        metadata_type: String,
    },

    #[error("transformation [{transform_id}] is already registered")]
    DuplicateTransformation { transform_id: String },

    #[error("metadata type must not be empty for transformation [{transform_id}]")]
    EmptyMetadataType { transform_id: String },

    #[error("failed to read [{metadata_type}] content for transformation [{transform_id}]")]
    ContentIo {
        transform_id: String,
        metadata_type: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransformationError {
    /// The requested transformation or metadata type does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TransformationNotFound { .. } | Self::MetadataNotFound { .. }
        )
    }

    /// The caller asked for a transition the current state does not allow.
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            Self::DuplicateMetadata { .. }
                | Self::TransformationComplete { .. }
                | Self::MetadataComplete { .. }
                | Self::DuplicateTransformation { .. }
        )
    }

    /// Only transient persistence failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Convenience alias for results of the status core.
pub type TransformationResult<T> = Result<T, TransformationError>;

/// Classifies a persistence failure for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceErrorKind {
    /// The backend may succeed if the same operation is retried.
    Transient,
    /// Retrying will hit the same failure.
    NonTransient,
    /// The stored record was written in a format this build cannot read.
    UnsupportedVersion,
}

impl std::fmt::Display for PersistenceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceErrorKind::Transient => write!(f, "transient"),
            PersistenceErrorKind::NonTransient => write!(f, "non-transient"),
            PersistenceErrorKind::UnsupportedVersion => write!(f, "unsupported version"),
        }
    }
}

/// A failure reported by a persistence backend standing in for the in-memory registry.
#[derive(Debug, Error)]
#[error("{kind} persistence error: {message}")]
pub struct PersistenceError {
    pub kind: PersistenceErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PersistenceError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::Transient, message)
    }

    pub fn non_transient(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::NonTransient, message)
    }

    pub fn unsupported_version(message: impl Into<String>) -> Self {
        Self::new(PersistenceErrorKind::UnsupportedVersion, message)
    }

    fn new(kind: PersistenceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == PersistenceErrorKind::Transient
    }
}

/// Reason recorded when a metadata transformation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The request could not be processed as submitted.
    BadRequest,
    /// The transformation itself failed to produce metadata.
    TransformationFailure,
    /// An unexpected fault in the transformation service.
    InternalServerError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::BadRequest => write!(f, "BAD_REQUEST"),
            ErrorCode::TransformationFailure => write!(f, "TRANSFORMATION_FAILURE"),
            ErrorCode::InternalServerError => write!(f, "INTERNAL_SERVER_ERROR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_messages_name_the_missing_key() {
        let err = TransformationError::TransformationNotFound {
            transform_id: "abc-123".into(),
        };
        assert!(err.is_not_found());
        assert!(err.to_string().contains("abc-123"));

        let err = TransformationError::MetadataNotFound {
            transform_id: "abc-123".into(),
            metadata_type: "irm".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "No [irm] metadata found for transformation [abc-123]"
        );
    }

    #[test]
    fn illegal_state_classification() {
        let err = TransformationError::MetadataComplete {
            transform_id: "t".into(),
            metadata_type: "irm".into(),
        };
        assert!(err.is_illegal_state());
        assert!(!err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn only_transient_persistence_errors_are_retryable() {
        let transient: TransformationError = PersistenceError::transient("connection reset").into();
        assert!(transient.is_retryable());

        let permanent: TransformationError = PersistenceError::non_transient("constraint").into();
        assert!(!permanent.is_retryable());

        let version: TransformationError = PersistenceError::unsupported_version("v9").into();
        assert!(!version.is_retryable());
        assert_eq!(
            version.to_string(),
            "unsupported version persistence error: v9"
        );
    }

    #[test]
    fn persistence_error_keeps_source() {
        let io = std::io::Error::other("disk gone");
        let err = PersistenceError::non_transient("write failed").with_source(io);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "disk gone");
    }

    #[test]
    fn content_io_reports_the_io_error_as_its_source_only() {
        let err = TransformationError::ContentIo {
            transform_id: "t".into(),
            metadata_type: "irm".into(),
            source: std::io::Error::other("stream broke"),
        };
        assert_eq!(
            err.to_string(),
            "failed to read [irm] content for transformation [t]"
        );
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "stream broke");

        let chain = format!("{:#}", anyhow::Error::new(err));
        assert_eq!(chain.matches("stream broke").count(), 1);
    }

    #[test]
    fn error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::TransformationFailure).unwrap();
        assert_eq!(json, "\"TRANSFORMATION_FAILURE\"");
        assert_eq!(ErrorCode::BadRequest.to_string(), "BAD_REQUEST");
    }
}
