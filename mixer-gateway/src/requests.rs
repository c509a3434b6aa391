//! The four request kinds the Dispatcher routes, each with a matching empty
//! response used to instantiate a cache-hit target.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonically (field-sorted) serializable: implementors must derive `Serialize` with
/// stable field order, which `serde_json`'s `preserve_order` feature combined with a
/// `BTreeMap`-backed canonicalization in [`crate::cache::cache_key`] guarantees
/// regardless of struct field declaration order.
pub trait CacheableRequest: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync {
    type Response: CacheableResponse;
}

pub trait CacheableResponse:
    Serialize + for<'de> Deserialize<'de> + Clone + Default + PartialEq + Send + Sync
{
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeRequest {
    pub dcids: Vec<String>,
    pub properties: Vec<String>,
    pub pagination_token: Option<String>,
}

impl CacheableRequest for NodeRequest {
    type Response = NodeResponse;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeResponse {
    /// Keyed by [`arc_key`]: `(dcid, property) → arc values`.
    pub arcs: IndexMap<String, Vec<Value>>,
    pub pagination_token: Option<String>,
    pub remote_pagination_info: Option<Box<NodeResponse>>,
}
impl CacheableResponse for NodeResponse {}

/// `NodeResponse::arcs` merges per `(dcid, property)`; JSON object keys must be
/// strings, so the pair is joined with a NUL byte, which cannot appear in a dcid or
/// property name.
pub fn arc_key(dcid: &str, property: &str) -> String {
    format!("{dcid}\u{0}{property}")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ObservationRequest {
    pub variables: Vec<String>,
    pub entities: Vec<String>,
}

impl CacheableRequest for ObservationRequest {
    type Response = ObservationResponse;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObservationResponse {
    /// `variable → entity → faceted series`, in that nesting order.
    pub data: IndexMap<String, IndexMap<String, Vec<Value>>>,
}
impl CacheableResponse for ObservationResponse {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeSearchRequest {
    pub query: String,
    pub max_results: u32,
}

impl CacheableRequest for NodeSearchRequest {
    type Response = NodeSearchResponse;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeSearchResponse {
    pub matches: Vec<String>,
    pub stat_vars: IndexMap<String, Value>,
}
impl CacheableResponse for NodeSearchResponse {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResolveRequest {
    pub nodes: Vec<String>,
    pub resolver: String,
}

impl CacheableRequest for ResolveRequest {
    type Response = ResolveResponse;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResolveResponse {
    /// node → ordered candidate list.
    pub candidates: IndexMap<String, Vec<String>>,
}
impl CacheableResponse for ResolveResponse {}

/// Used only by the Merger; not one of the Dispatcher's four request kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventResponse {
    pub events: Vec<Value>,
    pub provenance: IndexMap<String, String>,
    pub dates: Vec<String>,
}
impl CacheableResponse for EventResponse {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BulkVariableInfoResponse {
    pub by_id: IndexMap<String, Value>,
}
impl CacheableResponse for BulkVariableInfoResponse {}

/// Used only by the Merger; not one of the Dispatcher's four request kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchStatVarResponse {
    pub by_id: IndexMap<String, Value>,
    /// Set-union preserving local order.
    pub matches: Vec<String>,
}
impl CacheableResponse for SearchStatVarResponse {}
