//! Wires the translator, backends, cache, dispatcher, fan-out, and merger into the
//! gateway's public request handlers. Row-to-response shaping is deliberately minimal:
//! detailed, product-specific response shaping is out of scope, so handlers here
//! demonstrate the translate → dispatch → warehouse → merge path rather than
//! reproducing a particular product's field layout.

use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use mixer_translate::mapping::MappingModel;
use mixer_translate::query::QueryLanguage;
use mixer_translate::{translate, TranslateOptions};

use crate::backends::{PrivateStore, WarehouseClient};
use crate::cache::DynCacheBackend;
use crate::dispatcher::{dispatch, CacheProcessor, Processor, RequestContext};
use crate::error::Result;
use crate::merger::merge_node;
use crate::requests::{arc_key, NodeRequest, NodeResponse};

/// Ties together the pieces a request handler needs: the mapping model driving
/// translation, a warehouse connector, an optional private store consulted first,
/// and the response cache.
pub struct Gateway<W, P> {
    pub mapping_model: Arc<MappingModel>,
    pub warehouse: Arc<W>,
    pub private_store: Arc<P>,
    pub cache: DynCacheBackend,
    pub translate_options: TranslateOptions,
    pub fan_out_deadline: Duration,
    /// The `typeOf` the generated Datalog query asserts for the requested node: entity
    /// dispatch and `dcid` binding both require the node's declared type. A production
    /// deployment resolves this per-dcid rather than fixing one type gateway-wide; doing
    /// so is out of scope here.
    pub default_node_type: String,
}

impl<W, P> Gateway<W, P>
where
    W: WarehouseClient + 'static,
    P: PrivateStore + 'static,
{
    pub fn new(
        mapping_model: Arc<MappingModel>,
        warehouse: Arc<W>,
        private_store: Arc<P>,
        cache: DynCacheBackend,
        translate_options: TranslateOptions,
        default_node_type: impl Into<String>,
    ) -> Self {
        Gateway {
            mapping_model,
            warehouse,
            private_store,
            cache,
            translate_options,
            fan_out_deadline: Duration::from_secs(10),
            default_node_type: default_node_type.into(),
        }
    }

    /// Handles a [`NodeRequest`]: private-store lookup first, since a configured private
    /// store takes priority over the shared warehouse for entities it holds, falling
    /// back to translate-and-query for anything the private store doesn't have, all
    /// behind the cache processor.
    #[instrument(skip(self))]
    pub async fn node(&self, request: NodeRequest) -> NodeResponse {
        let processors: Vec<Arc<dyn Processor<NodeRequest>>> =
            vec![Arc::new(CacheProcessor::new(self.cache.clone(), "NodeResponse"))];

        let mapping_model = self.mapping_model.clone();
        let warehouse = self.warehouse.clone();
        let private_store = self.private_store.clone();
        let options = self.translate_options.clone();
        let node_type = self.default_node_type.clone();

        dispatch(&processors, RequestContext::new(request, false), move |req| async move {
            match resolve_node(&mapping_model, warehouse.as_ref(), private_store.as_ref(), &options, &node_type, &req).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "node request failed, returning empty response");
                    NodeResponse::default()
                }
            }
        })
        .await
    }

    /// Merges a locally computed response with one obtained from a remote Mixer peer.
    /// The remote call itself is out of scope (no concrete `RemoteMixerClient`
    /// implementation); callers supply the remote response directly.
    pub fn merge_node_with_remote(&self, local: &NodeResponse, remote: &NodeResponse) -> NodeResponse {
        merge_node(local, remote)
    }
}

async fn resolve_node<W: WarehouseClient, P: PrivateStore>(
    mapping_model: &MappingModel,
    warehouse: &W,
    private_store: &P,
    options: &TranslateOptions,
    node_type: &str,
    request: &NodeRequest,
) -> Result<NodeResponse> {
    let mut response = NodeResponse::default();
    let mut remaining_dcids = Vec::new();

    for dcid in &request.dcids {
        if let Some(properties) = private_store.get(dcid).await? {
            for property in &request.properties {
                if let Some(value) = properties.get(property) {
                    response
                        .arcs
                        .entry(arc_key(dcid, property))
                        .or_default()
                        .push(value.clone());
                }
            }
        } else {
            remaining_dcids.push(dcid.clone());
        }
    }

    if remaining_dcids.is_empty() || request.properties.is_empty() {
        return Ok(response);
    }

    for dcid in &remaining_dcids {
        for property in &request.properties {
            if !is_valid_property_name(property) {
                return Err(mixer_translate::error::TranslateError::invalid_input(
                    format!("invalid property name `{property}`"),
                    1,
                )
                .into());
            }
            let dcid_literal = escape_datalog_literal(dcid);
            let query_text = format!(
                "SELECT ?value, typeOf ?node {node_type}, dcid ?node \"{dcid_literal}\", {property} ?node ?value"
            );
            let sql = translate(mapping_model, &query_text, QueryLanguage::Datalog, options)?;
            let rows = warehouse.query(&sql).await?;
            for row in rows {
                if let Some(value) = row.get("value") {
                    response
                        .arcs
                        .entry(arc_key(dcid, property))
                        .or_default()
                        .push(value.clone());
                }
            }
        }
    }

    Ok(response)
}

/// Escapes `\` and `"` so a caller-supplied value can be embedded inside a
/// double-quoted Datalog string literal without closing it early or splicing in
/// extra patterns.
fn escape_datalog_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Property names are interpolated unquoted, as a predicate token, so (unlike the
/// dcid) there's no literal to escape into; anything but a plain identifier is
/// rejected outright.
fn is_valid_property_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryPrivateStore;
    use crate::cache::InMemoryCacheBackend;
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use mixer_translate::mapping::{Entity, Mapping, MappingObject, Predicate, Table};
    use serde_json::json;

    struct FixedWarehouse {
        value: serde_json::Value,
    }

    #[async_trait]
    impl WarehouseClient for FixedWarehouse {
        async fn query(
            &self,
            _sql: &mixer_translate::sql::SqlOutput,
        ) -> Result<Vec<IndexMap<String, serde_json::Value>>> {
            let mut row = IndexMap::new();
            row.insert("value".to_string(), self.value.clone());
            Ok(vec![row])
        }
    }

    fn sample_model() -> MappingModel {
        let table = Table {
            db: "dc".to_string(),
            name: "Place".to_string(),
            instance_id: String::new(),
        };
        let entity = Entity {
            table: table.clone(),
            local_id: "id".to_string(),
        };
        let mappings = vec![
            Mapping {
                predicate: Predicate::Name("typeOf".to_string()),
                subject: entity.clone(),
                object: MappingObject::Literal("Place".to_string()),
            },
            Mapping {
                predicate: Predicate::Name("name".to_string()),
                subject: entity.clone(),
                object: MappingObject::Column(mixer_translate::mapping::Column {
                    table: table.clone(),
                    name: "name".to_string(),
                }),
            },
            Mapping {
                predicate: Predicate::Name("dcid".to_string()),
                subject: entity.clone(),
                object: MappingObject::Column(mixer_translate::mapping::Column {
                    table: table.clone(),
                    name: "id".to_string(),
                }),
            },
            Mapping {
                predicate: Predicate::FunctionalDeps,
                subject: entity,
                object: MappingObject::Properties(vec!["dcid".to_string()]),
            },
        ];
        MappingModel {
            mappings,
            table_schemas: Default::default(),
        }
    }

    #[tokio::test]
    async fn private_store_hit_skips_the_warehouse() {
        let private_store = Arc::new(InMemoryPrivateStore::new());
        let mut props = IndexMap::new();
        props.insert("name".to_string(), json!("Cached Name"));
        private_store.put("dc/1".to_string(), props).await;

        let gateway = Gateway::new(
            Arc::new(sample_model()),
            Arc::new(FixedWarehouse { value: json!("Warehouse Name") }),
            private_store,
            Arc::new(InMemoryCacheBackend::new()),
            TranslateOptions::default(),
            "Place",
        );

        let response = gateway
            .node(NodeRequest {
                dcids: vec!["dc/1".to_string()],
                properties: vec!["name".to_string()],
                pagination_token: None,
            })
            .await;

        assert_eq!(
            response.arcs.get(&arc_key("dc/1", "name")).unwrap(),
            &vec![json!("Cached Name")]
        );
    }

    #[tokio::test]
    async fn private_store_miss_falls_through_to_the_warehouse() {
        let gateway = Gateway::new(
            Arc::new(sample_model()),
            Arc::new(FixedWarehouse { value: json!("Warehouse Name") }),
            Arc::new(InMemoryPrivateStore::new()),
            Arc::new(InMemoryCacheBackend::new()),
            TranslateOptions::default(),
            "Place",
        );

        let response = gateway
            .node(NodeRequest {
                dcids: vec!["dc/1".to_string()],
                properties: vec!["name".to_string()],
                pagination_token: None,
            })
            .await;

        assert_eq!(
            response.arcs.get(&arc_key("dc/1", "name")).unwrap(),
            &vec![json!("Warehouse Name")]
        );
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        struct CountingWarehouse {
            calls: std::sync::atomic::AtomicUsize,
        }
        #[async_trait]
        impl WarehouseClient for CountingWarehouse {
            async fn query(
                &self,
                _sql: &mixer_translate::sql::SqlOutput,
            ) -> Result<Vec<IndexMap<String, serde_json::Value>>> {
                self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let mut row = IndexMap::new();
                row.insert("value".to_string(), json!("Name"));
                Ok(vec![row])
            }
        }

        let warehouse = Arc::new(CountingWarehouse {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let gateway = Gateway::new(
            Arc::new(sample_model()),
            warehouse.clone(),
            Arc::new(InMemoryPrivateStore::new()),
            Arc::new(InMemoryCacheBackend::new()),
            TranslateOptions::default(),
            "Place",
        );

        let request = NodeRequest {
            dcids: vec!["dc/1".to_string()],
            properties: vec!["name".to_string()],
            pagination_token: None,
        };
        let _ = gateway.node(request.clone()).await;
        let _ = gateway.node(request).await;

        assert_eq!(warehouse.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn escape_datalog_literal_neutralizes_quotes_and_backslashes() {
        let escaped = escape_datalog_literal(r#"x", typeOf ?node "Other"#);
        assert_eq!(escaped, r#"x\", typeOf ?node \"Other"#);
    }

    #[test]
    fn escaped_dcid_cannot_splice_in_an_extra_pattern() {
        let malicious = r#"x", typeOf ?node "Other"#;
        let literal = escape_datalog_literal(malicious);
        let query_text = format!(
            "SELECT ?value, typeOf ?node Place, dcid ?node \"{literal}\", name ?node ?value"
        );
        let parsed = mixer_translate::query::parse_datalog(&query_text).unwrap();
        assert_eq!(parsed.patterns.len(), 3);
        assert_eq!(
            parsed.patterns[1].object,
            mixer_translate::query::QueryObject::Str(malicious.to_string())
        );
    }

    #[tokio::test]
    async fn property_name_with_injected_syntax_is_rejected() {
        let gateway = Gateway::new(
            Arc::new(sample_model()),
            Arc::new(FixedWarehouse { value: json!("Warehouse Name") }),
            Arc::new(InMemoryPrivateStore::new()),
            Arc::new(InMemoryCacheBackend::new()),
            TranslateOptions::default(),
            "Place",
        );

        let response = gateway
            .node(NodeRequest {
                dcids: vec!["dc/1".to_string()],
                properties: vec![r#"name ?node ?value, typeOf ?node "Other"#.to_string()],
                pagination_token: None,
            })
            .await;

        assert!(response.arcs.is_empty());
    }
}
