//! The Binder: pairs each query statement with every compatible mapping and
//! produces the Cartesian product of viable bindings.

use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::error::{Result, TranslateError};
use crate::mapping::{Mapping, MappingModel, Predicate};
use crate::query::{Node, ParsedQuery, Query};
use crate::solver::SolverOutput;

/// One `(query pattern index, chosen mapping)` pairing.
#[derive(Debug, Clone)]
pub struct Binding<'m> {
    pub pattern_index: usize,
    pub mapping: &'m Mapping,
}

/// A full assignment, one binding per query pattern.
pub type BindingSet<'m> = Vec<Binding<'m>>;

#[instrument(skip(mapping_model, query, solved))]
pub fn bind<'m>(
    mapping_model: &'m MappingModel,
    query: &ParsedQuery,
    solved: &SolverOutput,
    excluded_table_suffixes: &[String],
) -> Result<BindingSet<'m>> {
    let candidates = compute_candidates(mapping_model, query, solved, excluded_table_suffixes, &IndexMap::new())?;
    let must_match = derive_must_match(query, &candidates);

    let refined = compute_candidates(
        mapping_model,
        query,
        solved,
        excluded_table_suffixes,
        &must_match,
    )?;

    for (i, c) in refined.iter().enumerate() {
        if c.is_empty() {
            return Err(TranslateError::not_found(format!(
                "no compatible mapping for pattern `{} {} {:?}`",
                query.patterns[i].predicate, query.patterns[i].subject, query.patterns[i].object
            )));
        }
    }

    let total_sets: usize = refined.iter().map(|c| c.len().max(1)).product();
    debug!(total_sets, "binder produced candidate binding sets");

    // Retrying subsequent sets on downstream (graph/SQL) failure is left unimplemented;
    // the first viable set is taken as-is.
    let chosen: BindingSet = refined
        .into_iter()
        .enumerate()
        .map(|(i, mut c)| Binding {
            pattern_index: i,
            mapping: c.remove(0),
        })
        .collect();

    Ok(chosen)
}

fn compute_candidates<'m>(
    mapping_model: &'m MappingModel,
    query: &ParsedQuery,
    solved: &SolverOutput,
    excluded_table_suffixes: &[String],
    must_match: &IndexMap<Node, crate::mapping::Entity>,
) -> Result<Vec<Vec<&'m Mapping>>> {
    let mut out = Vec::with_capacity(query.patterns.len());
    for (i, pattern) in query.patterns.iter().enumerate() {
        let is_triple = solved.triple_dispatch[i];
        let mut candidates: Vec<&Mapping> = mapping_model
            .mappings
            .iter()
            .filter(|m| !excluded_by_suffix(m, excluded_table_suffixes))
            .filter(|m| compatible(m, pattern, is_triple, solved))
            .collect();
        if let Some(required) = must_match.get(&pattern.subject) {
            candidates.retain(|m| &m.subject == required);
        }
        out.push(candidates);
    }
    Ok(out)
}

fn excluded_by_suffix(mapping: &Mapping, suffixes: &[String]) -> bool {
    suffixes
        .iter()
        .any(|suffix| mapping.subject.table.name.ends_with(suffix.as_str()))
}

fn compatible(mapping: &Mapping, pattern: &Query, is_triple: bool, solved: &SolverOutput) -> bool {
    // Rule 2: never bind the functionalDeps sentinel.
    if mapping.is_functional_deps() {
        return false;
    }
    // Rule 1: triple-dispatch decision must match whether the mapping belongs to the
    // wide Triple table (predicate stored as a column).
    let mapping_is_triple = matches!(mapping.predicate, Predicate::Column(_));
    if mapping_is_triple != is_triple {
        return false;
    }
    // Rule 3: `dcid` queries only ever bind the literal `dcid` predicate, never a Triple
    // predicate column.
    if pattern.predicate == "dcid" {
        if !matches!(&mapping.predicate, Predicate::Name(name) if name == "dcid") {
            return false;
        }
    } else if let Predicate::Name(name) = &mapping.predicate {
        // Rule 4: a string mapping predicate must equal the query predicate.
        if name != &pattern.predicate {
            return false;
        }
    }
    // Rule 5: a string mapping object must equal the query object (or its first element
    // when the query object is a list).
    if let crate::mapping::MappingObject::Literal(lit) = &mapping.object {
        match pattern.object.first_literal() {
            Some(obj) if obj == lit => {}
            Some(_) => return false,
            None => return false,
        }
    }
    // Rule 6: the query node's declared type must be one of the mapping entity's
    // declared types, unless the mapping belongs to the Triple table (which admits any
    // type).
    if !mapping_is_triple {
        if let Some(node_types) = solved.types.node_types.get(&pattern.subject) {
            if let Some(entity_types) = solved.types.entity_types.get(&mapping.subject) {
                if !node_types.iter().any(|t| entity_types.contains(t)) {
                    return false;
                }
            } else if !node_types.is_empty() {
                return false;
            }
        }
    }
    true
}

/// First pass: queries whose candidate set is a singleton pin their subject variable to
/// that mapping's subject entity for the second pass.
fn derive_must_match(
    query: &ParsedQuery,
    candidates: &[Vec<&Mapping>],
) -> IndexMap<Node, crate::mapping::Entity> {
    let mut must_match = IndexMap::new();
    for (i, c) in candidates.iter().enumerate() {
        if c.len() == 1 {
            must_match.insert(query.patterns[i].subject.clone(), c[0].subject.clone());
        }
    }
    must_match
}
