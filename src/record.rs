//! Serializable snapshots of transformations for persistence backends.
//!
//! A [`StoredTransformation`] is discriminated by its `version` field. Version
//! [`RECORD_VERSION`] decodes into a [`TransformationRecord`]; any other version
//! is kept as an [`UnknownRecord`] with every raw field intact so it can be
//! written back unchanged. Version 1 records also carry fields this build does
//! not know in their `extra` maps, so a decoded record re-serializes with them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ErrorCode, PersistenceError, TransformationResult};
use crate::status::{MetadataTransformation, Outcome, RequestInfo, State, Transformation};

/// Record format written by this build.
pub const RECORD_VERSION: u64 = 1;

const VERSION_FIELD: &str = "version";

/// Stored form of one metadata sub-task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub metadata_type: String,
    pub start_time: DateTime<Utc>,
    pub state: State,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_content"
    )]
    pub content: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    /// Fields not recognized by this build.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Stored form of a transformation and all of its sub-tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationRecord {
    pub transform_id: String,
    pub request_info: RequestInfo,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Vec<MetadataRecord>,
    /// Fields not recognized by this build.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A record written by a format version this build does not understand.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownRecord {
    pub version: u64,
    /// Every field of the record except `version`.
    pub fields: Map<String, Value>,
}

/// Versioned envelope around a stored transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredTransformation {
    Current(TransformationRecord),
    Unknown(UnknownRecord),
}

impl StoredTransformation {
    pub fn version(&self) -> u64 {
        match self {
            StoredTransformation::Current(_) => RECORD_VERSION,
            StoredTransformation::Unknown(record) => record.version,
        }
    }

    pub fn from_json(json: &str) -> TransformationResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> TransformationResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rebuild the in-memory transformation, if the record version is supported.
    pub fn into_transformation(self) -> TransformationResult<Transformation> {
        match self {
            StoredTransformation::Current(record) => Transformation::restore(record),
            StoredTransformation::Unknown(record) => Err(PersistenceError::unsupported_version(
                format!("transformation record version {} is not supported", record.version),
            )
            .into()),
        }
    }
}

impl From<TransformationRecord> for StoredTransformation {
    fn from(record: TransformationRecord) -> Self {
        StoredTransformation::Current(record)
    }
}

impl Serialize for StoredTransformation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut fields = match self {
            StoredTransformation::Current(record) => match serde_json::to_value(record) {
                Ok(Value::Object(fields)) => fields,
                Ok(_) => return Err(serde::ser::Error::custom("record is not a JSON object")),
                Err(err) => return Err(serde::ser::Error::custom(err)),
            },
            StoredTransformation::Unknown(record) => record.fields.clone(),
        };
        fields.insert(VERSION_FIELD.to_string(), Value::from(self.version()));
        fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StoredTransformation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let version = fields
            .remove(VERSION_FIELD)
            .ok_or_else(|| D::Error::missing_field(VERSION_FIELD))?
            .as_u64()
            .ok_or_else(|| D::Error::custom("record version must be a non-negative integer"))?;

        if version == RECORD_VERSION {
            let record = serde_json::from_value(Value::Object(fields)).map_err(D::Error::custom)?;
            Ok(StoredTransformation::Current(record))
        } else {
            Ok(StoredTransformation::Unknown(UnknownRecord { version, fields }))
        }
    }
}

impl Transformation {
    /// Snapshot the transformation and its sub-tasks.
    pub fn to_record(&self) -> TransformationRecord {
        TransformationRecord {
            transform_id: self.transform_id().to_string(),
            request_info: self.request_info().clone(),
            start_time: self.start_time(),
            metadata: self.metadatas().iter().map(|m| m.to_record()).collect(),
            extra: Map::new(),
        }
    }

    /// Rebuild a transformation from storage. Sub-tasks come back in the state
    /// they were stored in; terminal ones still reject further completions.
    pub fn restore(record: TransformationRecord) -> TransformationResult<Self> {
        let transform_id = record.transform_id;
        let children = record
            .metadata
            .into_iter()
            .map(|metadata| {
                let outcome = outcome_of(&transform_id, &metadata)?;
                Ok((metadata.metadata_type, metadata.start_time, outcome))
            })
            .collect::<TransformationResult<Vec<_>>>()?;
        Transformation::from_parts(transform_id, record.request_info, record.start_time, children)
    }
}

impl MetadataTransformation {
    pub fn to_record(&self) -> MetadataRecord {
        let mut record = MetadataRecord {
            metadata_type: self.metadata_type().to_string(),
            start_time: self.start_time(),
            state: State::InProgress,
            completion_time: None,
            content_type: None,
            content: None,
            failure_reason: None,
            failure_message: None,
            extra: Map::new(),
        };
        match self.outcome() {
            Outcome::InProgress => {}
            Outcome::Succeeded {
                completed_at,
                content_type,
                content,
            } => {
                record.state = State::Successful;
                record.completion_time = Some(completed_at);
                record.content_type = Some(content_type);
                record.content = Some(content.to_vec());
            }
            Outcome::Failed {
                completed_at,
                reason,
                message,
            } => {
                record.state = State::Failed;
                record.completion_time = Some(completed_at);
                record.failure_reason = Some(reason);
                record.failure_message = Some(message);
            }
        }
        record
    }
}

// A stored record whose fields contradict its state would break the
// terminal-implies-completion-time guarantee, so it is refused.
fn outcome_of(transform_id: &str, record: &MetadataRecord) -> TransformationResult<Outcome> {
    let invalid = |detail: &str| {
        PersistenceError::non_transient(format!(
            "[{}] metadata record for transformation [{transform_id}] {detail}",
            record.metadata_type
        ))
    };

    if record.metadata_type.trim().is_empty() {
        return Err(PersistenceError::non_transient(format!(
            "metadata record for transformation [{transform_id}] has an empty metadata type"
        ))
        .into());
    }

    let outcome = match record.state {
        State::InProgress => {
            if record.completion_time.is_some() {
                return Err(invalid("is in progress but has a completion time").into());
            }
            Outcome::InProgress
        }
        State::Successful => Outcome::Succeeded {
            completed_at: record
                .completion_time
                .ok_or_else(|| invalid("succeeded without a completion time"))?,
            content_type: record
                .content_type
                .clone()
                .ok_or_else(|| invalid("succeeded without a content type"))?,
            content: Bytes::from(
                record
                    .content
                    .clone()
                    .ok_or_else(|| invalid("succeeded without content"))?,
            ),
        },
        State::Failed => Outcome::Failed {
            completed_at: record
                .completion_time
                .ok_or_else(|| invalid("failed without a completion time"))?,
            reason: record
                .failure_reason
                .ok_or_else(|| invalid("failed without a reason"))?,
            message: record.failure_message.clone().unwrap_or_default(),
        },
    };
    Ok(outcome)
}

mod base64_content {
    use base64::{Engine as _, engine::general_purpose};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        content: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match content {
            Some(bytes) => serializer.serialize_some(&general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| {
                general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformationError;
    use crate::manager::{InMemoryTransformationManager, TransformationManager};
    use std::io::Read;
    use url::Url;

    fn populated() -> (InMemoryTransformationManager, String) {
        let manager = InMemoryTransformationManager::new();
        let transformation = manager
            .create_transform(
                Url::parse("http://current.com").unwrap(),
                Url::parse("http://final.com").unwrap(),
                Url::parse("http://metacard.com").unwrap(),
            )
            .unwrap();
        let irm = transformation.add("irm").unwrap();
        let metacard = transformation.add("metacard").unwrap();
        transformation.add("thumbnail").unwrap();
        irm.succeed("application/xml", &b"<irm/>"[..]).unwrap();
        metacard
            .fail(ErrorCode::TransformationFailure, "no metacard")
            .unwrap();
        (manager, transformation.transform_id().to_string())
    }

    #[test]
    fn record_captures_every_outcome() {
        let (manager, id) = populated();
        let record = manager.get(&id).unwrap().to_record();

        assert_eq!(record.transform_id, id);
        let types: Vec<&str> = record
            .metadata
            .iter()
            .map(|m| m.metadata_type.as_str())
            .collect();
        assert_eq!(types, vec!["irm", "metacard", "thumbnail"]);

        let irm = &record.metadata[0];
        assert_eq!(irm.state, State::Successful);
        assert_eq!(irm.content.as_deref(), Some(&b"<irm/>"[..]));
        assert_eq!(irm.content_type.as_deref(), Some("application/xml"));

        let metacard = &record.metadata[1];
        assert_eq!(metacard.state, State::Failed);
        assert_eq!(
            metacard.failure_reason,
            Some(ErrorCode::TransformationFailure)
        );

        let thumbnail = &record.metadata[2];
        assert_eq!(thumbnail.state, State::InProgress);
        assert!(thumbnail.completion_time.is_none());
    }

    #[test]
    fn content_is_base64_in_json() {
        let (manager, id) = populated();
        let stored = StoredTransformation::from(manager.get(&id).unwrap().to_record());
        let json: Value = serde_json::to_value(&stored).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["metadata"][0]["content"], "PGlybS8+");
        assert_eq!(
            json["metadata"][1]["failure_reason"],
            "TRANSFORMATION_FAILURE"
        );
        assert!(json["metadata"][2].get("completion_time").is_none());
    }

    #[test]
    fn restored_transformation_keeps_state_and_one_shot_rule() {
        let (manager, id) = populated();
        let json = StoredTransformation::from(manager.get(&id).unwrap().to_record())
            .to_json_pretty()
            .unwrap();

        let restored = StoredTransformation::from_json(&json)
            .unwrap()
            .into_transformation()
            .unwrap();
        let target = InMemoryTransformationManager::new();
        let restored = target.restore(restored).unwrap();

        assert_eq!(restored.transform_id(), id);
        assert_eq!(restored.state(), State::InProgress);
        assert!(restored.completion_time().is_none());

        let irm = target.get_metadata(&id, "irm").unwrap();
        let mut content = String::new();
        irm.content().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "<irm/>");
        assert!(
            irm.fail(ErrorCode::BadRequest, "late")
                .unwrap_err()
                .is_illegal_state()
        );

        let thumbnail = target.get_metadata(&id, "thumbnail").unwrap();
        thumbnail.succeed("image/png", &[1u8, 2, 3][..]).unwrap();
        assert!(thumbnail.succeed("image/png", &[4u8][..]).is_err());
        assert_eq!(restored.state(), State::Failed);
        assert_eq!(restored.completion_time(), thumbnail.completion_time());
    }

    #[test]
    fn unknown_version_is_kept_verbatim() {
        let json = r#"{"version": 7, "transform_id": "abc", "shape": {"new": true}}"#;
        let stored = StoredTransformation::from_json(json).unwrap();

        match &stored {
            StoredTransformation::Unknown(record) => {
                assert_eq!(record.version, 7);
                assert_eq!(record.fields["shape"]["new"], true);
            }
            other => panic!("expected unknown record, got {other:?}"),
        }

        let written: Value = serde_json::to_value(&stored).unwrap();
        let original: Value = serde_json::from_str(json).unwrap();
        assert_eq!(written, original);
    }

    #[test]
    fn unknown_version_cannot_be_restored() {
        let stored = StoredTransformation::from_json(r#"{"version": 2}"#).unwrap();
        let err = stored.into_transformation().unwrap_err();
        match err {
            TransformationError::Persistence(inner) => {
                assert_eq!(
                    inner.kind,
                    crate::error::PersistenceErrorKind::UnsupportedVersion
                );
                assert!(!inner.is_retryable());
            }
            other => panic!("expected persistence error, got {other:?}"),
        }
    }

    #[test]
    fn missing_version_is_malformed() {
        let err = StoredTransformation::from_json(r#"{"transform_id": "abc"}"#).unwrap_err();
        assert!(matches!(err, TransformationError::Json(_)));
    }

    #[test]
    fn inconsistent_record_is_refused() {
        let (manager, id) = populated();
        let mut record = manager.get(&id).unwrap().to_record();
        record.metadata[0].completion_time = None;

        let err = Transformation::restore(record).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("irm"));
    }

    #[test]
    fn blank_metadata_type_is_refused() {
        let (manager, id) = populated();
        let mut record = manager.get(&id).unwrap().to_record();
        record.metadata[2].metadata_type = " ".to_string();

        let err = Transformation::restore(record).unwrap_err();
        match err {
            TransformationError::Persistence(inner) => {
                assert_eq!(inner.kind, crate::error::PersistenceErrorKind::NonTransient);
                assert!(inner.message.contains("empty metadata type"));
            }
            other => panic!("expected persistence error, got {other:?}"),
        }
    }

    #[test]
    fn successful_record_without_content_is_refused() {
        let (manager, id) = populated();
        let mut record = manager.get(&id).unwrap().to_record();
        record.metadata[0].content = None;

        let err = Transformation::restore(record).unwrap_err();
        assert!(matches!(err, TransformationError::Persistence(_)));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("succeeded without content"));
    }

    #[test]
    fn successful_record_with_empty_content_is_restored() {
        let (manager, id) = populated();
        let mut record = manager.get(&id).unwrap().to_record();
        record.metadata[0].content = Some(Vec::new());

        let restored = Transformation::restore(record).unwrap();
        assert_eq!(restored.metadata("irm").unwrap().content_length(), Some(0));
    }

    #[test]
    fn unrecognized_fields_survive_a_current_version_round_trip() {
        let (manager, id) = populated();
        let mut json = serde_json::to_value(StoredTransformation::from(
            manager.get(&id).unwrap().to_record(),
        ))
        .unwrap();
        json["priority"] = Value::from("high");
        json["metadata"][0]["checksum"] = Value::from("abc123");

        let stored: StoredTransformation = serde_json::from_value(json.clone()).unwrap();
        match &stored {
            StoredTransformation::Current(record) => {
                assert_eq!(record.extra["priority"], "high");
                assert_eq!(record.metadata[0].extra["checksum"], "abc123");
            }
            other => panic!("expected current record, got {other:?}"),
        }

        let written = serde_json::to_value(&stored).unwrap();
        assert_eq!(written, json);
    }
}
