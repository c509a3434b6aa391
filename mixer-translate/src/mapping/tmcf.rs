//! TMCF (per-table schema) parser.
//!
//! Same line syntax as MCF, but object values take one of three forms: an entity
//! (`E:table->id`), a column (`C:table->name`, the CSV column backing the property), or a
//! schema literal (an optional `dcs:`/`dcid:`/`schema:` prefix, optional surrounding
//! quotes). A column may map to multiple `(node, property)` pairs across blocks that
//! share a table.

use tracing::instrument;

use super::model::{Table, TableSchema};
use super::refs::{parse_column_ref, parse_entity_ref};
use crate::error::{Result, TranslateError};

const SCHEMA_LITERAL_PREFIXES: &[&str] = &["dcs:", "dcid:", "schema:"];

#[derive(Debug, Clone, Default)]
pub struct TmcfDocument {
    pub tables: Vec<(Table, TableSchema)>,
}

#[instrument(skip(text))]
pub fn parse_tmcf(text: &str) -> Result<TmcfDocument> {
    let mut tables: Vec<(Table, TableSchema)> = Vec::new();
    let mut current: Option<(Table, String)> = None; // (table, local node id)

    let table_schema_mut = |tables: &mut Vec<(Table, TableSchema)>, table: &Table| {
        if let Some(pos) = tables.iter().position(|(t, _)| t == table) {
            pos
        } else {
            tables.push((table.clone(), TableSchema::default()));
            tables.len() - 1
        }
    };

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = (idx + 1) as u32;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("Node:") {
            let rest = rest.trim();
            let entity = parse_entity_ref(rest).ok_or_else(|| {
                TranslateError::invalid_input(
                    format!("malformed Node header `{rest}`, expected E:table->id"),
                    line_no,
                )
            })?;
            current = Some((entity.table, entity.local_id));
            continue;
        }

        let Some((table, node_id)) = current.clone() else {
            return Err(TranslateError::invalid_input(
                format!("schema line `{line}` appears before any Node: header"),
                line_no,
            ));
        };

        let Some((property, object_str)) = line.split_once(':') else {
            return Err(TranslateError::invalid_input(
                format!("malformed line `{line}`, expected `property: object`"),
                line_no,
            ));
        };
        let property = property.trim().to_string();
        let object_str = object_str.trim();

        let idx = table_schema_mut(&mut tables, &table);

        if let Some(column) = parse_column_ref(object_str) {
            if column.table != table {
                return Err(TranslateError::invalid_input(
                    format!(
                        "column reference `{object_str}` names table `{}`, expected `{}`",
                        column.table.qualified(),
                        table.qualified()
                    ),
                    line_no,
                ));
            }
            tables[idx]
                .1
                .column_nodes
                .entry(column.name)
                .or_default()
                .push((node_id, property));
            continue;
        }

        if let Some(entity) = parse_entity_ref(object_str) {
            // A reference to another local node in this table's schema; recorded as a
            // literal carrying the referenced node id, resolved at CSV ingestion time.
            tables[idx]
                .1
                .node_literals
                .entry(node_id)
                .or_default()
                .insert(property, entity.local_id);
            continue;
        }

        let literal = strip_schema_literal(object_str);
        tables[idx]
            .1
            .node_literals
            .entry(node_id)
            .or_default()
            .insert(property, literal.to_string());
    }

    Ok(TmcfDocument { tables })
}

fn strip_schema_literal(text: &str) -> &str {
    let mut text = text;
    for prefix in SCHEMA_LITERAL_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest;
            break;
        }
    }
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEATHER_TMCF: &str = r#"
        Node: E:WeatherObs->E0
        typeOf: schema:WeatherObservation
        observedNode: C:WeatherObs->place_id
        variableMeasured: dcs:Temperature
        value: C:WeatherObs->temp_c
        observationDate: C:WeatherObs->date
    "#;

    #[test]
    fn builds_column_and_literal_maps() {
        let doc = parse_tmcf(WEATHER_TMCF).unwrap();
        assert_eq!(doc.tables.len(), 1);
        let (_table, schema) = &doc.tables[0];
        assert_eq!(
            schema.column_nodes.get("place_id"),
            Some(&vec![("E0".to_string(), "observedNode".to_string())])
        );
        assert_eq!(
            schema.node_literals.get("E0").and_then(|m| m.get("typeOf")),
            Some(&"WeatherObservation".to_string())
        );
        assert_eq!(
            schema
                .node_literals
                .get("E0")
                .and_then(|m| m.get("variableMeasured")),
            Some(&"Temperature".to_string())
        );
    }

    #[test]
    fn rejects_schema_line_outside_entity_block() {
        let err = parse_tmcf("value: C:WeatherObs->temp_c").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }
}
