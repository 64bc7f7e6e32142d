//! Change notifications and their decoding.
//!
//! The ingestion pipeline hands us untyped JSON. It is decoded here, once,
//! into a validated [`ChangeEvent`]; anything that does not fit is rejected as
//! [`RewindError::MalformedEvent`] before it can reach the versioned store.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RewindError, RewindResult};
use crate::types::{validate_key, ValueType};

/// Kind of change observed in the live store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
    /// Operations that do not change the value (labels, policies, ...).
    Other(String),
}

impl Operation {
    /// Parse the live store's operation name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Create" => Self::Create,
            "Update" => Self::Update,
            "Delete" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("Create"),
            Self::Update => f.write_str("Update"),
            Self::Delete => f.write_str("Delete"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// A validated change to one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub key: String,
    pub operation: Operation,
    /// Server-side modification time, when the notification carries it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The new value. Notifications omit it; the writer then reads the live store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ChangeEvent {
    /// Create a new event for `key`.
    pub fn new(key: impl Into<String>, operation: Operation) -> RewindResult<Self> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self {
            key,
            operation,
            changed_at: None,
            value_type: None,
            description: None,
            value: None,
        })
    }

    /// Builder: set the modification time
    pub fn at(mut self, changed_at: DateTime<Utc>) -> Self {
        self.changed_at = Some(changed_at);
        self
    }

    /// Builder: set the value and its type
    pub fn with_value(mut self, value: impl Into<String>, value_type: ValueType) -> Self {
        self.value = Some(value.into());
        self.value_type = Some(value_type);
        self
    }

    /// Builder: set the value type only
    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Builder: set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Decode one notification body.
    ///
    /// ```json
    /// {"time": "2024-06-08T23:06:33Z",
    ///  "detail": {"name": "/app/db/url", "type": "String",
    ///             "operation": "Update", "description": "optional"}}
    /// ```
    pub fn from_notification(body: &str) -> RewindResult<Self> {
        let raw: RawNotification = serde_json::from_str(body)
            .map_err(|e| RewindError::malformed(format!("invalid notification: {}", e)))?;
        let detail = raw.detail.ok_or_else(|| RewindError::missing_field("detail"))?;
        let name = detail.name.ok_or_else(|| RewindError::missing_field("detail.name"))?;
        let operation = detail
            .operation
            .ok_or_else(|| RewindError::missing_field("detail.operation"))?;
        let time = raw.time.ok_or_else(|| RewindError::missing_field("time"))?;

        validate_key(&name).map_err(|e| RewindError::malformed(e.to_string()))?;
        let value_type = detail
            .value_type
            .map(|t| {
                ValueType::from_str(&t)
                    .map_err(|_| RewindError::malformed(format!("unknown value type '{}'", t)))
            })
            .transpose()?;

        Ok(Self {
            key: name,
            operation: Operation::from_name(&operation),
            changed_at: Some(parse_event_time(&time)?),
            value_type,
            description: detail.description,
            value: None,
        })
    }
}

/// Parse a notification timestamp (`2022-08-03T21:09:31Z`).
pub fn parse_event_time(raw: &str) -> RewindResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
        .map(|naive| naive.and_utc())
        .map_err(|_| RewindError::malformed(format!("invalid event time '{}'", raw)))
}

#[derive(Debug, Deserialize)]
struct RawNotification {
    time: Option<String>,
    detail: Option<RawDetail>,
}

#[derive(Debug, Deserialize)]
struct RawDetail {
    name: Option<String>,
    #[serde(rename = "type")]
    value_type: Option<String>,
    operation: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBatch {
    #[serde(rename = "Records")]
    records: Vec<RawQueueRecord>,
}

#[derive(Debug, Deserialize)]
struct RawQueueRecord {
    #[serde(rename = "messageId")]
    message_id: Option<String>,
    body: String,
}

/// One message of a queue batch, decoded independently of its siblings.
#[derive(Debug)]
pub struct DecodedMessage {
    pub message_id: Option<String>,
    pub event: RewindResult<ChangeEvent>,
}

/// Decode a queue batch `{"Records": [{"body": "..."}]}`.
///
/// Fails only when the batch envelope itself is unreadable; a bad message is
/// reported in its own [`DecodedMessage`].
pub fn decode_batch(payload: &str) -> RewindResult<Vec<DecodedMessage>> {
    let batch: RawBatch = serde_json::from_str(payload)
        .map_err(|e| RewindError::malformed(format!("invalid queue batch: {}", e)))?;
    Ok(batch
        .records
        .into_iter()
        .map(|record| DecodedMessage {
            message_id: record.message_id,
            event: ChangeEvent::from_notification(&record.body),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::TimeZone;

    const BODY: &str = r#"{"version": "0", "detail-type": "Parameter Store Change",
        "source": "aws.ssm", "time": "2022-08-03T21:09:31Z",
        "detail": {"name": "/testyssmbak/H0PTBA", "description": "fancydesc2",
                   "type": "SecureString", "operation": "Update"}}"#;

    #[test]
    fn test_decode_notification() {
        let event = ChangeEvent::from_notification(BODY).unwrap();
        assert_eq!(event.key, "/testyssmbak/H0PTBA");
        assert_eq!(event.operation, Operation::Update);
        assert_eq!(event.value_type, Some(ValueType::SecureString));
        assert_eq!(event.description.as_deref(), Some("fancydesc2"));
        assert_eq!(
            event.changed_at,
            Some(Utc.with_ymd_and_hms(2022, 8, 3, 21, 9, 31).unwrap())
        );
        assert!(event.value.is_none());
    }

    #[test]
    fn test_unknown_operation_is_kept() {
        let body = BODY.replace("\"Update\"", "\"LabelParameterVersion\"");
        let event = ChangeEvent::from_notification(&body).unwrap();
        assert_eq!(
            event.operation,
            Operation::Other("LabelParameterVersion".into())
        );
        assert_eq!(event.operation.to_string(), "LabelParameterVersion");
    }

    #[test]
    fn test_malformed_notifications() {
        let not_json = ChangeEvent::from_notification("{").unwrap_err();
        assert_eq!(not_json.code(), ErrorCode::EventMalformed);

        let no_detail =
            ChangeEvent::from_notification(r#"{"time": "2022-08-03T21:09:31Z"}"#).unwrap_err();
        assert_eq!(no_detail.code(), ErrorCode::EventMissingField);

        let bad_time = BODY.replace("2022-08-03T21:09:31Z", "yesterday");
        assert!(matches!(
            ChangeEvent::from_notification(&bad_time),
            Err(RewindError::MalformedEvent { .. })
        ));

        let bad_type = BODY.replace("SecureString", "Binary");
        assert!(ChangeEvent::from_notification(&bad_type).is_err());

        let bad_key = BODY.replace("/testyssmbak/H0PTBA", "/has space");
        assert!(matches!(
            ChangeEvent::from_notification(&bad_key),
            Err(RewindError::MalformedEvent { .. })
        ));
    }

    #[test]
    fn test_decode_batch_isolates_bad_messages() {
        let payload = serde_json::json!({
            "Records": [
                {"messageId": "m-1", "body": BODY},
                {"messageId": "m-2", "body": "not json"},
            ]
        })
        .to_string();

        let decoded = decode_batch(&payload).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].event.is_ok());
        assert_eq!(decoded[1].message_id.as_deref(), Some("m-2"));
        assert!(decoded[1].event.is_err());
    }

    #[test]
    fn test_decode_batch_rejects_bad_envelope() {
        assert!(decode_batch(r#"{"records": []}"#).is_err());
    }

    #[test]
    fn test_builder_validates_key() {
        assert!(ChangeEvent::new("/ok/key", Operation::Delete).is_ok());
        assert!(ChangeEvent::new("/bad//key", Operation::Delete).is_err());
    }
}
