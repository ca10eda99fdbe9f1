//! Collectible records as returned by the records endpoint.
//!
//! The endpoint is untrusted: any payload that is not an object carrying an
//! `nfts` array yields zero records, and entries that are not objects are
//! dropped. Records are never mutated after parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the list field in the endpoint payload.
pub const LIST_FIELD: &str = "nfts";

/// One externally-sourced collectible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectibleRecord {
    #[serde(default, deserialize_with = "string_only")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    pub media_gateway: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub contract: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub token_id: Option<String>,
}

impl CollectibleRecord {
    /// Record with only an image reference set.
    pub fn with_image(image: impl Into<String>) -> Self {
        Self { image: Some(image.into()), ..Self::default() }
    }

    /// First non-empty image reference, in alias priority order.
    pub fn image_ref(&self) -> Option<&str> {
        [&self.image, &self.media_gateway, &self.image_url]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

/// Result of parsing a payload. There is one record per raw entry, in
/// payload order; entries that could not be decoded become empty records
/// (no image) so they still occupy their ring slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub records: Vec<CollectibleRecord>,
    pub reported: usize,
}

/// Parse an endpoint payload. Never fails; unusable shapes give an empty batch.
pub fn parse_records(payload: &str) -> RecordBatch {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("Records payload is not valid JSON: {}", e);
            return RecordBatch::default();
        }
    };
    records_from_value(value)
}

/// Same as [`parse_records`] for an already-decoded JSON value.
pub fn records_from_value(value: Value) -> RecordBatch {
    let list = match value {
        Value::Object(mut map) => match map.remove(LIST_FIELD) {
            Some(Value::Array(list)) => list,
            Some(other) => {
                log::warn!("Records field '{}' is not a list ({})", LIST_FIELD, json_kind(&other));
                return RecordBatch::default();
            }
            None => {
                log::warn!("Records payload has no '{}' field", LIST_FIELD);
                return RecordBatch::default();
            }
        },
        other => {
            log::warn!("Records payload is {} rather than an object", json_kind(&other));
            return RecordBatch::default();
        }
    };

    let reported = list.len();
    let records = list
        .into_iter()
        .map(|entry| match serde_json::from_value::<CollectibleRecord>(entry) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("Undecodable record kept as an empty slot: {}", e);
                CollectibleRecord::default()
            }
        })
        .collect();

    RecordBatch { records, reported }
}

/// Marketplace page for a record: `<base>/<contract>[/<token>]`.
pub fn collect_url(
    marketplace_url: &str,
    default_contract: &str,
    contract: Option<&str>,
    token_id: Option<&str>,
) -> String {
    let base = marketplace_url.trim_end_matches('/');
    let contract = contract
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(default_contract);
    match token_id.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => format!("{}/{}/{}", base, contract, token),
        None => format!("{}/{}", base, contract),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Token ids and contracts arrive as either strings or integers depending on
/// the indexer.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Image references of the wrong type are treated as absent.
fn string_only<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_payload() {
        let batch = parse_records(
            r#"{ "nfts": [
                { "image": "https://img/1.png", "contract": "0xabc", "tokenId": "7" },
                { "mediaGateway": "https://gw/2.png", "tokenId": 12 },
                { "imageUrl": "https://alt/3.png" }
            ] }"#,
        );
        assert_eq!(batch.reported, 3);
        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.records[0].image_ref(), Some("https://img/1.png"));
        assert_eq!(batch.records[1].image_ref(), Some("https://gw/2.png"));
        assert_eq!(batch.records[1].token_id.as_deref(), Some("12"));
        assert_eq!(batch.records[2].image_ref(), Some("https://alt/3.png"));
    }

    #[test]
    fn test_image_alias_priority_and_blank() {
        let record = CollectibleRecord {
            image: Some("  ".to_string()),
            media_gateway: Some("gw".to_string()),
            image_url: Some("alt".to_string()),
            ..Default::default()
        };
        assert_eq!(record.image_ref(), Some("gw"));
        assert_eq!(CollectibleRecord::default().image_ref(), None);
    }

    #[test]
    fn test_malformed_shapes_are_empty() {
        for payload in [
            "not json",
            "[]",
            "null",
            r#"{ "items": [ { "image": "x" } ] }"#,
            r#"{ "nfts": { "image": "x" } }"#,
            r#"{ "nfts": "x" }"#,
        ] {
            let batch = parse_records(payload);
            assert!(batch.records.is_empty(), "payload {:?}", payload);
            assert_eq!(batch.reported, 0);
        }
    }

    #[test]
    fn test_non_object_entries_keep_their_position() {
        let batch = parse_records(r#"{ "nfts": [ 1, "two", { "image": "ok" }, null ] }"#);
        assert_eq!(batch.reported, 4);
        assert_eq!(batch.records.len(), 4);
        assert_eq!(batch.records[0], CollectibleRecord::default());
        assert_eq!(batch.records[2].image_ref(), Some("ok"));
        assert_eq!(batch.records.iter().filter(|r| r.image_ref().is_some()).count(), 1);
    }

    #[test]
    fn test_mistyped_fields_do_not_drop_record() {
        let batch = parse_records(
            r#"{ "nfts": [
                { "image": "https://img/a.png", "contract": 123, "tokenId": "5" },
                { "image": 7, "mediaGateway": "https://gw/b.png", "imageUrl": ["x"], "contract": true }
            ] }"#,
        );
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].image_ref(), Some("https://img/a.png"));
        assert_eq!(batch.records[0].contract.as_deref(), Some("123"));
        assert_eq!(batch.records[1].image, None);
        assert_eq!(batch.records[1].image_ref(), Some("https://gw/b.png"));
        assert_eq!(batch.records[1].contract, None);
    }

    #[test]
    fn test_collect_url() {
        let base = "https://zora.co/collect/";
        assert_eq!(
            collect_url(base, "0xdef", Some("0xabc"), Some("5")),
            "https://zora.co/collect/0xabc/5"
        );
        assert_eq!(collect_url(base, "0xdef", None, None), "https://zora.co/collect/0xdef");
        assert_eq!(collect_url(base, "0xdef", Some(""), Some(" ")), "https://zora.co/collect/0xdef");
    }
}
