use crate::error::{AggregatorError, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// A single view as handed over by an event producer.
///
/// Producers send ids as either JSON strings or integers; both are kept as
/// opaque strings. A missing timestamp means "now" on the store's clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewEvent {
    #[serde(deserialize_with = "deserialize_id")]
    pub subject_id: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl ViewEvent {
    pub fn new(subject_id: impl Into<String>, user_id: impl Into<String>, timestamp_ms: i64) -> Self {
        ViewEvent {
            subject_id: subject_id.into(),
            user_id: user_id.into(),
            timestamp: Some(timestamp_ms as f64),
        }
    }

    pub fn untimed(subject_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        ViewEvent {
            subject_id: subject_id.into(),
            user_id: user_id.into(),
            timestamp: None,
        }
    }
}

/// Reject empty or whitespace-only identifiers
pub(crate) fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(AggregatorError::InvalidInput(format!("{} must not be empty", kind)));
    }
    Ok(())
}

fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Int(i64),
        UInt(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Str(s) => s,
        RawId::Int(n) => n.to_string(),
        RawId::UInt(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_string_ids() {
        let event: ViewEvent =
            serde_json::from_str(r#"{"subjectId": 17, "userId": "u-9", "timestamp": 5000}"#).unwrap();
        assert_eq!(event.subject_id, "17");
        assert_eq!(event.user_id, "u-9");
        assert_eq!(event.timestamp, Some(5000.0));
    }

    #[test]
    fn test_missing_timestamp() {
        let event: ViewEvent = serde_json::from_str(r#"{"subjectId": "p", "userId": 3}"#).unwrap();
        assert_eq!(event, ViewEvent::untimed("p", "3"));
    }

    #[test]
    fn test_missing_user_is_a_parse_error() {
        assert!(serde_json::from_str::<ViewEvent>(r#"{"subjectId": 1}"#).is_err());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("subject id", "42").is_ok());
        assert!(validate_id("subject id", "").is_err());
        assert!(validate_id("user id", "   ").is_err());
    }
}
