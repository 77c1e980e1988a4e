//! The persisted record and its string encoding.

use super::error::PersistError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What is written to storage: the partialized state and the version it
/// was written with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub version: u32,
    pub payload: Value,
}

/// Converts records to and from the strings handed to storage.
pub trait RecordCodec: Send + Sync {
    fn encode(&self, record: &PersistedRecord) -> Result<String, PersistError>;
    fn decode(&self, raw: &str) -> Result<PersistedRecord, PersistError>;
}

/// `{"version": <int>, "payload": {...}}`
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl RecordCodec for JsonCodec {
    fn encode(&self, record: &PersistedRecord) -> Result<String, PersistError> {
        serde_json::to_string(record).map_err(|e| PersistError::Encode(e.to_string()))
    }

    fn decode(&self, raw: &str) -> Result<PersistedRecord, PersistError> {
        serde_json::from_str(raw).map_err(|e| PersistError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_version_and_payload() {
        let record = PersistedRecord {
            version: 3,
            payload: json!({ "theme": "dark" }),
        };
        let raw = JsonCodec.encode(&record).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, json!({ "version": 3, "payload": { "theme": "dark" } }));
    }

    #[test]
    fn malformed_input_is_a_decode_error() {
        for raw in ["not json", r#"{"payload": {}}"#, r#"{"version": -1, "payload": {}}"#] {
            assert!(matches!(JsonCodec.decode(raw), Err(PersistError::Decode(_))));
        }
    }
}
