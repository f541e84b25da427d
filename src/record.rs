//! Telemetry records as seen by the uplink
//!
//! The record's own field layout is owned by the application; this crate only
//! needs an item identifier and a JSON rendering of the record.

use crate::error::{UplinkError, UplinkResult};
use serde_json::{Map, Value};

/// A publishable telemetry record
pub trait Record {
    /// Identifier used in the publish topic and for delivery bookkeeping
    fn item_id(&self) -> u32;

    /// JSON object form of the record
    fn to_json(&self) -> Result<Value, serde_json::Error>;
}

/// Encode a record, enforcing the payload bound
pub fn encode_record(record: &dyn Record, max_len: usize) -> UplinkResult<Vec<u8>> {
    let value = record
        .to_json()
        .map_err(|e| UplinkError::frame_malformed(format!("record encoding failed: {e}")))?;
    let bytes = serde_json::to_vec(&value)
        .map_err(|e| UplinkError::frame_malformed(format!("record encoding failed: {e}")))?;

    if bytes.is_empty() {
        return Err(UplinkError::frame_malformed("record encoded to empty payload"));
    }
    if bytes.len() > max_len {
        return Err(UplinkError::payload_too_large(bytes.len(), max_len));
    }
    Ok(bytes)
}

/// Generic record holding an arbitrary JSON object
///
/// The `item_id` is always present in the rendered object so the companion
/// gateway can derive the publish topic from the payload alone.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRecord {
    item_id: u32,
    fields: Map<String, Value>,
}

impl JsonRecord {
    pub fn new(item_id: u32) -> Self {
        Self {
            item_id,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Build from a JSON object carrying an unsigned `item_id`
    pub fn from_value(value: Value) -> UplinkResult<Self> {
        let Value::Object(fields) = value else {
            return Err(UplinkError::config_invalid("record must be a JSON object"));
        };
        let item_id = fields
            .get("item_id")
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| UplinkError::config_invalid("record needs a u32 item_id"))?;
        Ok(Self { item_id, fields })
    }
}

impl Record for JsonRecord {
    fn item_id(&self) -> u32 {
        self.item_id
    }

    fn to_json(&self) -> Result<Value, serde_json::Error> {
        let mut fields = self.fields.clone();
        fields.insert("item_id".to_string(), Value::from(self.item_id));
        Ok(Value::Object(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_record_always_carries_item_id() {
        let record = JsonRecord::new(42).with_field("final_weight", 18.1);
        let value = record.to_json().unwrap();
        assert_eq!(value["item_id"], json!(42));
        assert_eq!(value["final_weight"], json!(18.1));
    }

    #[test]
    fn test_from_value_requires_item_id() {
        assert!(JsonRecord::from_value(json!({"item_id": 7, "mode": "weight"})).is_ok());
        assert!(JsonRecord::from_value(json!({"mode": "weight"})).is_err());
        assert!(JsonRecord::from_value(json!({"item_id": -1})).is_err());
        assert!(JsonRecord::from_value(json!([1, 2, 3])).is_err());
    }

    struct Unencodable;

    impl Record for Unencodable {
        fn item_id(&self) -> u32 {
            9
        }

        fn to_json(&self) -> Result<Value, serde_json::Error> {
            serde_json::from_str("{")
        }
    }

    #[test]
    fn test_encode_failure_is_malformed_frame() {
        let error = encode_record(&Unencodable, 512).unwrap_err();
        assert!(matches!(error, UplinkError::FrameMalformed { .. }));
        assert_eq!(error.kind(), "frame_malformed");
    }

    #[test]
    fn test_encode_record_enforces_bound() {
        let record = JsonRecord::new(1).with_field("blob", "x".repeat(600));
        let result = encode_record(&record, 512);
        assert!(matches!(
            result,
            Err(UplinkError::PayloadTooLarge { max: 512, .. })
        ));

        let small = JsonRecord::new(2).with_field("ok", true);
        let bytes = encode_record(&small, 512).unwrap();
        let decoded: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded["item_id"], json!(2));
    }
}
