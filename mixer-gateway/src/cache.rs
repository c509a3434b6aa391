//! Cache key derivation and the storage envelope.
//!
//! `cache_key` must be stable across field order: for two requests that are
//! field-equal, `cache_key(r1) == cache_key(r2)`. The request is canonicalized to a
//! field-sorted JSON value before hashing, rather than relying on struct declaration
//! order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::Write;

use crate::error::{GatewayError, Result};

/// Prefix on every cache key.
pub const CACHE_KEY_PREFIX: &str = "mixer:request:";

/// Default TTL for cached responses: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// `mixer:request:<hex(sha256(canonical-bytes-of-request))>`.
pub fn cache_key<R: Serialize>(request: &R) -> Result<String> {
    let value = serde_json::to_value(request)
        .map_err(|e| GatewayError::cache_transient(format!("request not serializable: {e}")))?;
    let canonical = canonicalize(&value);
    let bytes = serde_json::to_vec(&canonical)
        .map_err(|e| GatewayError::cache_transient(format!("canonical encode failed: {e}")))?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{CACHE_KEY_PREFIX}{}", hex::encode(digest)))
}

/// A self-describing, gzip-compressed, length-prefixed envelope:
/// `[u32 type_tag_len][type_tag][u32 payload_len][gzip(json(response))]`. The type tag
/// lets a reader reject a value cached under a different request kind without attempting
/// to deserialize it into the wrong type.
pub fn encode_envelope<R: Serialize>(type_tag: &str, response: &R) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(response)
        .map_err(|e| GatewayError::cache_transient(format!("response encode failed: {e}")))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| GatewayError::cache_transient(format!("gzip compress failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| GatewayError::cache_transient(format!("gzip finish failed: {e}")))?;

    let mut buf = Vec::with_capacity(8 + type_tag.len() + compressed.len());
    buf.extend_from_slice(&(type_tag.len() as u32).to_be_bytes());
    buf.extend_from_slice(type_tag.as_bytes());
    buf.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    buf.extend_from_slice(&compressed);
    Ok(buf)
}

/// Decodes an envelope written by [`encode_envelope`], checking `expected_type_tag`
/// before inflating the payload.
pub fn decode_envelope<R: DeserializeOwned>(bytes: &[u8], expected_type_tag: &str) -> Result<R> {
    let err = || GatewayError::cache_transient("malformed cache envelope");
    if bytes.len() < 4 {
        return Err(err());
    }
    let tag_len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let tag_start: usize = 4;
    let tag_end = tag_start.checked_add(tag_len).ok_or_else(err)?;
    let tag_bytes = bytes.get(tag_start..tag_end).ok_or_else(err)?;
    let tag = std::str::from_utf8(tag_bytes).map_err(|_| err())?;
    if tag != expected_type_tag {
        return Err(GatewayError::cache_transient(format!(
            "cache envelope type mismatch: expected `{expected_type_tag}`, found `{tag}`"
        )));
    }
    let len_start = tag_end;
    let len_end = len_start.checked_add(4).ok_or_else(err)?;
    let payload_len = u32::from_be_bytes(bytes.get(len_start..len_end).ok_or_else(err)?.try_into().unwrap()) as usize;
    let payload_start = len_end;
    let payload_end = payload_start.checked_add(payload_len).ok_or_else(err)?;
    let compressed = bytes.get(payload_start..payload_end).ok_or_else(err)?;

    let mut decoder = GzDecoder::new(Vec::new());
    decoder
        .write_all(compressed)
        .map_err(|e| GatewayError::cache_transient(format!("gzip decompress failed: {e}")))?;
    let json = decoder
        .finish()
        .map_err(|e| GatewayError::cache_transient(format!("gzip finish failed: {e}")))?;
    serde_json::from_slice(&json)
        .map_err(|e| GatewayError::cache_transient(format!("response decode failed: {e}")))
}

/// The interface the cache processor consults; no concrete Redis/Memcache client is
/// implemented here, only the interface.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
}

pub type DynCacheBackend = Arc<dyn CacheBackend>;

/// An in-memory test double satisfying [`CacheBackend`], used by this crate's own tests
/// rather than a real Redis client.
#[derive(Default)]
pub struct InMemoryCacheBackend {
    entries: tokio::sync::RwLock<std::collections::HashMap<String, (Vec<u8>, std::time::Instant)>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > std::time::Instant::now() => Ok(Some(value.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, std::time::Instant::now() + ttl));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::NodeRequest;

    #[test]
    fn cache_key_is_stable_across_field_encoding_order() {
        let r1 = NodeRequest {
            dcids: vec!["testNode".to_string()],
            properties: vec![],
            pagination_token: None,
        };
        let value = serde_json::json!({
            "pagination_token": null,
            "properties": [],
            "dcids": ["testNode"],
        });
        let canonical_direct = canonicalize(&value);
        let canonical_from_struct = canonicalize(&serde_json::to_value(&r1).unwrap());
        assert_eq!(canonical_direct, canonical_from_struct);
        assert!(cache_key(&r1).unwrap().starts_with(CACHE_KEY_PREFIX));
    }

    #[test]
    fn cache_key_differs_for_different_requests() {
        let r1 = NodeRequest {
            dcids: vec!["a".to_string()],
            ..Default::default()
        };
        let r2 = NodeRequest {
            dcids: vec!["b".to_string()],
            ..Default::default()
        };
        assert_ne!(cache_key(&r1).unwrap(), cache_key(&r2).unwrap());
    }

    #[tokio::test]
    async fn envelope_round_trips_through_gzip() {
        let response = crate::requests::NodeResponse {
            pagination_token: Some("abc".to_string()),
            ..Default::default()
        };
        let bytes = encode_envelope("NodeResponse", &response).unwrap();
        let decoded: crate::requests::NodeResponse = decode_envelope(&bytes, "NodeResponse").unwrap();
        assert_eq!(decoded, response);
    }

    #[tokio::test]
    async fn envelope_rejects_type_tag_mismatch() {
        let response = crate::requests::NodeResponse::default();
        let bytes = encode_envelope("NodeResponse", &response).unwrap();
        let err = decode_envelope::<crate::requests::ObservationResponse>(&bytes, "ObservationResponse");
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn in_memory_backend_round_trips_and_respects_ttl() {
        let cache = InMemoryCacheBackend::new();
        cache.set("k", b"v".to_vec(), Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
