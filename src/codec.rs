//! Shard-file byte codecs. Defaults to JSON via serde_json.
//!
//! The whole database uses one codec, selected from the `use_bson` config
//! flag at startup; records are never mixed between formats.

use serde_json::{Map, Value};

use crate::error::Result;

/// A decoded shard file: one top-level JSON object mapping root keys to values.
pub type Document = Map<String, Value>;

/// Converts document snapshots to/from bytes for persistence.
pub trait Codec: Send + Sync {
    /// Encode a document to bytes.
    fn encode(&self, doc: &Document) -> Result<Vec<u8>>;

    /// Decode bytes back into a document. Empty input decodes to an empty
    /// document (a shard file that was created but never written).
    fn decode(&self, bytes: &[u8]) -> Result<Document>;

    /// File extension (without the dot) used for shard files in this format.
    fn extension(&self) -> &'static str;
}

/// Compact JSON encoding.
#[derive(Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, doc: &Document) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(doc)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        if bytes.is_empty() {
            return Ok(Document::new());
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

/// BSON encoding, for deployments that prefer a binary on-disk format.
#[derive(Debug, Default)]
pub struct BsonCodec;

impl Codec for BsonCodec {
    fn encode(&self, doc: &Document) -> Result<Vec<u8>> {
        Ok(bson::to_vec(doc)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        if bytes.is_empty() {
            return Ok(Document::new());
        }
        Ok(bson::from_slice(bytes)?)
    }

    fn extension(&self) -> &'static str {
        "bson"
    }
}

/// Returns the codec selected by the `use_bson` config flag.
pub fn for_config(use_bson: bool) -> Box<dyn Codec> {
    if use_bson {
        Box::new(BsonCodec)
    } else {
        Box::new(JsonCodec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        let value = json!({
            "null": null,
            "flag": true,
            "count": 42,
            "ratio": 2.5,
            "name": "alice",
            "tags": ["a", "b"],
            "nested": {"inner": {"leaf": 1}}
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn json_round_trip() {
        let codec = JsonCodec;
        let doc = sample();
        let bytes = codec.encode(&doc).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), doc);
    }

    #[test]
    fn bson_round_trip() {
        let codec = BsonCodec;
        let doc = sample();
        let bytes = codec.encode(&doc).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), doc);
    }

    #[test]
    fn empty_bytes_decode_to_empty_document() {
        assert!(JsonCodec.decode(&[]).unwrap().is_empty());
        assert!(BsonCodec.decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn extension_matches_config_flag() {
        assert_eq!(for_config(false).extension(), "json");
        assert_eq!(for_config(true).extension(), "bson");
    }
}
