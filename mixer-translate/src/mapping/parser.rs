//! Schema-mapping (MCF) parser.
//!
//! A line-oriented format: `Node: E:table->id` opens an entity block, and each
//! subsequent `predicate: object` line is a mapping under that subject, until the next
//! `Node:` or end of file.

use tracing::instrument;

use super::model::{Entity, Mapping, MappingObject, MappingModel, Predicate};
use super::refs::{parse_column_ref, parse_entity_ref};
use crate::error::{Result, TranslateError};

/// Parses an MCF document into a [`MappingModel`].
#[instrument(skip(text))]
pub fn parse_mcf(text: &str) -> Result<MappingModel> {
    let mut mappings = Vec::new();
    let mut current_subject: Option<Entity> = None;

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
            current_subject = Some(entity);
            continue;
        }

        // Split on the first `": "` rather than the first bare `:` — a Triple predicate
        // key (`C:table->col`) has its own colon before the separator.
        let Some((predicate_str, object_str)) =
            line.split_once(": ").or_else(|| line.split_once(':'))
        else {
            return Err(TranslateError::invalid_input(
                format!("malformed line `{line}`, expected `predicate: object`"),
                line_no,
            ));
        };
        let predicate_str = predicate_str.trim();
        let object_str = object_str.trim();

        let Some(subject) = current_subject.clone() else {
            return Err(TranslateError::invalid_input(
                format!("mapping line `{line}` appears before any Node: header"),
                line_no,
            ));
        };

        let predicate = parse_predicate(predicate_str, &subject, line_no)?;
        let object = parse_object(object_str, &predicate, &subject, line_no)?;

        mappings.push(Mapping {
            predicate,
            subject,
            object,
        });
    }

    Ok(MappingModel::new(mappings))
}

fn parse_predicate(text: &str, subject: &Entity, line_no: u32) -> Result<Predicate> {
    if text == "functionalDeps" {
        return Ok(Predicate::FunctionalDeps);
    }
    if let Some(rest) = text.strip_prefix("C:") {
        let column = parse_column_ref(&format!("C:{rest}")).ok_or_else(|| {
            TranslateError::invalid_input(format!("unknown prefix in predicate `{text}`"), line_no)
        })?;
        if column.table.qualified() != subject.table.qualified() {
            return Err(TranslateError::invalid_input(
                format!(
                    "column predicate `{text}` references table `{}`, expected `{}`",
                    column.table.qualified(),
                    subject.table.qualified()
                ),
                line_no,
            ));
        }
        return Ok(Predicate::Column(column));
    }
    Ok(Predicate::Name(text.to_string()))
}

fn parse_object(
    text: &str,
    predicate: &Predicate,
    subject: &Entity,
    line_no: u32,
) -> Result<MappingObject> {
    if matches!(predicate, Predicate::FunctionalDeps) {
        let props = text.split(',').map(|s| s.trim().to_string()).collect();
        return Ok(MappingObject::Properties(props));
    }
    if let Some(quoted) = strip_quotes(text) {
        return Ok(MappingObject::Literal(quoted.to_string()));
    }
    if let Some(entity) = parse_entity_ref(text) {
        return Ok(MappingObject::Entity(entity));
    }
    if text.starts_with("C:") {
        let column = parse_column_ref(text).ok_or_else(|| {
            TranslateError::invalid_input(format!("unknown prefix in object `{text}`"), line_no)
        })?;
        if column.table.qualified() != subject.table.qualified() {
            return Err(TranslateError::invalid_input(
                format!(
                    "column object `{text}` references table `{}`, expected `{}`",
                    column.table.qualified(),
                    subject.table.qualified()
                ),
                line_no,
            ));
        }
        return Ok(MappingObject::Column(column));
    }
    if text.starts_with("E:") {
        return Err(TranslateError::invalid_input(
            format!("entity reference `{text}` missing `->localId`"),
            line_no,
        ));
    }
    Ok(MappingObject::Literal(text.to_string()))
}

fn strip_quotes(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    Some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLACE_MCF: &str = r#"
        # Place entity
        Node: E:dc.Place->E0
        typeOf: "Place"
        dcid: C:dc.Place->id
        name: C:dc.Place->name
        functionalDeps: dcid

        Node: E:dc.Place->E1
        typeOf: "Place"
        dcid: C:dc.Place->id
        containedInPlace: E:dc.Place->E0
        functionalDeps: dcid
    "#;

    #[test]
    fn parses_entity_blocks() {
        let model = parse_mcf(PLACE_MCF).unwrap();
        assert_eq!(model.entities().len(), 2);
        assert_eq!(model.mappings.len(), 8);
    }

    #[test]
    fn strips_quotes_from_literal() {
        let model = parse_mcf(PLACE_MCF).unwrap();
        let type_of = model
            .mappings
            .iter()
            .find(|m| matches!(&m.predicate, Predicate::Name(n) if n == "typeOf"))
            .unwrap();
        assert_eq!(type_of.object, MappingObject::Literal("Place".to_string()));
    }

    #[test]
    fn rejects_mapping_line_before_node_header() {
        let err = parse_mcf("dcid: C:dc.Place->id").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_column_reference_to_other_table() {
        let text = "Node: E:dc.Place->E0\ndcid: C:dc.Other->id\n";
        let err = parse_mcf(text).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }
}
