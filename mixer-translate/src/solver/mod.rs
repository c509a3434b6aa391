//! The Solver: functional dependencies, node/entity typing, triple-vs-typed
//! dispatch, query identity assignment, subtype rewriting, provenance column extraction,
//! and out-arc/in-arc enumeration.

use indexmap::{IndexMap, IndexSet};
use tracing::instrument;

use crate::error::{Result, TranslateError};
use crate::mapping::{Column, Entity, MappingModel, MappingObject, Predicate, RESERVED_PREDICATES};
use crate::query::{Node, ParsedQuery, QueryObject};

/// Per-process solver configuration. `excluded_table_suffixes` turns what would
/// otherwise be a hard-coded "PlaceExt"-style exclusion into a configurable list.
#[derive(Debug, Clone, Default)]
pub struct SolverOptions {
    /// Child type → parent type, used by the subtype rewrite.
    pub subtypes: IndexMap<String, String>,
    /// Table-name suffixes whose mappings are never considered by the binder.
    pub excluded_table_suffixes: Vec<String>,
}

/// `entity → property → column`, the resolved functional-dependency index.
#[derive(Debug, Clone, Default)]
pub struct FunctionalDepsIndex {
    pub providers: IndexMap<Entity, IndexMap<String, Column>>,
}

impl FunctionalDepsIndex {
    pub fn dcid_column(&self, entity: &Entity) -> Option<&Column> {
        self.providers.get(entity).and_then(|props| props.get("dcid"))
    }

    /// True only for entities whose unique determiner is `dcid` — only those may be
    /// referenced from other entities.
    pub fn is_foreign_key_capable(&self, entity: &Entity) -> bool {
        self.dcid_column(entity).is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    pub node_types: IndexMap<Node, IndexSet<String>>,
    pub entity_types: IndexMap<Entity, IndexSet<String>>,
}

/// Identifies which SQL table instance a query statement will reference: statements
/// sharing a key share an id, and thus the same stamped table instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum QueryIdKey {
    Triple { predicate: String, subject: String },
    Typed { subject: String },
}

#[derive(Debug, Clone, Default)]
pub struct ProvenanceColumns {
    pub by_table: IndexMap<crate::mapping::Table, Column>,
}

#[derive(Debug, Clone, Default)]
pub struct ArcInfo {
    /// type name → (predicate, column) pairs exposing that type's own properties.
    pub out_arcs: IndexMap<String, Vec<(String, Column)>>,
    /// type name → (predicate, column) pairs for properties on *other* types that point
    /// at this type.
    pub in_arcs: IndexMap<String, Vec<(String, Column)>>,
}

#[derive(Debug, Clone, Default)]
pub struct SolverOutput {
    pub functional_deps: FunctionalDepsIndex,
    pub types: TypeInfo,
    /// Per query-pattern index: true if the pattern is dispatched to the wide Triple
    /// table, false if a typed table is preferred.
    pub triple_dispatch: Vec<bool>,
    /// Per query-pattern index: the query id it shares with any pattern referencing the
    /// same SQL table instance.
    pub query_ids: Vec<u32>,
    pub provenance: ProvenanceColumns,
    pub arcs: ArcInfo,
}

#[instrument(skip(mapping, query, options))]
pub fn solve(
    mapping: &MappingModel,
    query: &mut ParsedQuery,
    options: &SolverOptions,
) -> Result<SolverOutput> {
    let functional_deps = resolve_functional_deps(mapping)?;
    rewrite_subtypes(query, &options.subtypes);
    let types = resolve_types(mapping, query);
    let triple_dispatch = resolve_triple_dispatch(mapping, query, &types);
    let query_ids = assign_query_ids(query, &triple_dispatch);
    let provenance = extract_provenance_columns(mapping, &functional_deps);
    let arcs = build_arc_info(mapping, &types);

    Ok(SolverOutput {
        functional_deps,
        types,
        triple_dispatch,
        query_ids,
        provenance,
        arcs,
    })
}

fn resolve_functional_deps(mapping: &MappingModel) -> Result<FunctionalDepsIndex> {
    let mut providers = IndexMap::new();
    for m in &mapping.mappings {
        if !m.is_functional_deps() {
            continue;
        }
        let MappingObject::Properties(props) = &m.object else {
            return Err(TranslateError::internal(format!(
                "functionalDeps mapping for {} has a non-property-list object",
                m.subject
            )));
        };
        let mut resolved = IndexMap::new();
        for prop in props {
            let providing = mapping.mappings.iter().find(|candidate| {
                candidate.subject == m.subject
                    && matches!(&candidate.predicate, Predicate::Name(p) if p == prop)
            });
            let Some(providing) = providing else {
                return Err(TranslateError::internal(format!(
                    "entity {} declares functional dependency on `{prop}` with no provider",
                    m.subject
                )));
            };
            let MappingObject::Column(col) = &providing.object else {
                return Err(TranslateError::internal(format!(
                    "functional dependency `{prop}` of {} does not resolve to a column",
                    m.subject
                )));
            };
            resolved.insert(prop.clone(), col.clone());
        }
        providers.insert(m.subject.clone(), resolved);
    }
    Ok(FunctionalDepsIndex { providers })
}

fn resolve_types(mapping: &MappingModel, query: &ParsedQuery) -> TypeInfo {
    let mut node_types: IndexMap<Node, IndexSet<String>> = IndexMap::new();
    for pattern in &query.patterns {
        if pattern.predicate == "typeOf" {
            if let Some(t) = pattern.object.first_literal() {
                node_types
                    .entry(pattern.subject.clone())
                    .or_default()
                    .insert(t.to_string());
            }
        }
    }

    let mut entity_types: IndexMap<Entity, IndexSet<String>> = IndexMap::new();
    for m in &mapping.mappings {
        if m.is_type_of() {
            if let MappingObject::Literal(t) = &m.object {
                entity_types
                    .entry(m.subject.clone())
                    .or_default()
                    .insert(t.clone());
            }
        }
    }

    TypeInfo {
        node_types,
        entity_types,
    }
}

fn resolve_triple_dispatch(mapping: &MappingModel, query: &ParsedQuery, types: &TypeInfo) -> Vec<bool> {
    let mut typed_predicate_coverage: IndexSet<(String, String)> = IndexSet::new();
    for m in &mapping.mappings {
        let Predicate::Name(pred) = &m.predicate else {
            continue;
        };
        let Some(entity_types) = types.entity_types.get(&m.subject) else {
            continue;
        };
        for t in entity_types {
            typed_predicate_coverage.insert((t.clone(), pred.clone()));
        }
    }

    query
        .patterns
        .iter()
        .map(|pattern| {
            let excluded = types
                .node_types
                .get(&pattern.subject)
                .is_some_and(|subject_types| {
                    subject_types
                        .iter()
                        .any(|t| typed_predicate_coverage.contains(&(t.clone(), pattern.predicate.clone())))
                });
            !excluded
        })
        .collect()
}

fn assign_query_ids(query: &ParsedQuery, triple_dispatch: &[bool]) -> Vec<u32> {
    let mut next_id = 0u32;
    let mut seen: IndexMap<QueryIdKey, u32> = IndexMap::new();
    query
        .patterns
        .iter()
        .zip(triple_dispatch)
        .map(|(pattern, &is_triple)| {
            let key = if is_triple {
                QueryIdKey::Triple {
                    predicate: pattern.predicate.clone(),
                    subject: pattern.subject.0.clone(),
                }
            } else {
                QueryIdKey::Typed {
                    subject: pattern.subject.0.clone(),
                }
            };
            *seen.entry(key).or_insert_with(|| {
                let id = next_id;
                next_id += 1;
                id
            })
        })
        .collect()
}

/// Rewrites a bare `typeOf ?x T` into `typeOf ?x parent(T)` + `subType ?x T` when `T` has
/// a declared parent and no explicit `subType ?x …` pattern already exists.
fn rewrite_subtypes(query: &mut ParsedQuery, subtypes: &IndexMap<String, String>) {
    let existing_subtype_subjects: IndexSet<Node> = query
        .patterns
        .iter()
        .filter(|p| p.predicate == "subType")
        .map(|p| p.subject.clone())
        .collect();

    let mut additions = Vec::new();
    for pattern in &mut query.patterns {
        if pattern.predicate != "typeOf" {
            continue;
        }
        if existing_subtype_subjects.contains(&pattern.subject) {
            continue;
        }
        let QueryObject::Str(child_type) = pattern.object.clone() else {
            continue;
        };
        let Some(parent_type) = subtypes.get(&child_type) else {
            continue;
        };
        additions.push(crate::query::Query {
            predicate: "subType".to_string(),
            subject: pattern.subject.clone(),
            object: QueryObject::Str(child_type),
        });
        pattern.object = QueryObject::Str(parent_type.clone());
    }
    query.patterns.extend(additions);
}

fn extract_provenance_columns(
    mapping: &MappingModel,
    fds: &FunctionalDepsIndex,
) -> ProvenanceColumns {
    let mut by_table = IndexMap::new();
    for m in &mapping.mappings {
        let Predicate::Name(pred) = &m.predicate else {
            continue;
        };
        if pred != "provenance" {
            continue;
        }
        let column = match &m.object {
            MappingObject::Column(c) => Some(c.clone()),
            MappingObject::Entity(e) => fds.dcid_column(e).cloned(),
            _ => None,
        };
        if let Some(column) = column {
            by_table.insert(m.subject.table.clone(), column);
        }
    }
    ProvenanceColumns { by_table }
}

fn build_arc_info(mapping: &MappingModel, types: &TypeInfo) -> ArcInfo {
    let mut out_arcs: IndexMap<String, Vec<(String, Column)>> = IndexMap::new();
    let mut in_arcs: IndexMap<String, Vec<(String, Column)>> = IndexMap::new();

    for m in &mapping.mappings {
        let Predicate::Name(pred) = &m.predicate else {
            continue;
        };
        if RESERVED_PREDICATES.contains(&pred.as_str()) {
            continue;
        }
        let Some(subject_types) = types.entity_types.get(&m.subject) else {
            continue;
        };
        match &m.object {
            MappingObject::Column(col) => {
                for t in subject_types {
                    out_arcs.entry(t.clone()).or_default().push((pred.clone(), col.clone()));
                }
            }
            MappingObject::Entity(target) => {
                if let Some(target_types) = types.entity_types.get(target) {
                    for t in target_types {
                        if let Some(col) = mapping
                            .mappings_for_subject(&m.subject)
                            .find_map(|candidate| match &candidate.object {
                                MappingObject::Column(c) if candidate.predicate == Predicate::Name("dcid".to_string()) => {
                                    Some(c.clone())
                                }
                                _ => None,
                            })
                        {
                            in_arcs.entry(t.clone()).or_default().push((pred.clone(), col));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    ArcInfo { out_arcs, in_arcs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::parse_mcf;

    const PLACE_MCF: &str = r#"
        Node: E:dc.Place->E0
        typeOf: "Place"
        subType: C:dc.Place->type
        dcid: C:dc.Place->id
        name: C:dc.Place->name
        containedInPlace: E:dc.Place->E0
        functionalDeps: dcid
    "#;

    #[test]
    fn resolves_functional_deps() {
        let model = parse_mcf(PLACE_MCF).unwrap();
        let fds = resolve_functional_deps(&model).unwrap();
        let entity = model.entities()[0].clone();
        assert_eq!(fds.dcid_column(&entity).unwrap().name, "id");
    }

    #[test]
    fn fails_when_functional_dep_has_no_provider() {
        let text = r#"
            Node: E:dc.Place->E0
            typeOf: "Place"
            functionalDeps: dcid
        "#;
        let model = parse_mcf(text).unwrap();
        assert!(resolve_functional_deps(&model).is_err());
    }

    #[test]
    fn subtype_rewrite_splits_typeof_and_adds_subtype() {
        let mut query = crate::query::parse_datalog("SELECT ?n, typeOf ?n City").unwrap();
        let mut subtypes = IndexMap::new();
        subtypes.insert("City".to_string(), "Place".to_string());
        rewrite_subtypes(&mut query, &subtypes);
        assert_eq!(query.patterns.len(), 2);
        assert_eq!(query.patterns[0].object, QueryObject::Str("Place".to_string()));
        assert_eq!(query.patterns[1].predicate, "subType");
        assert_eq!(query.patterns[1].object, QueryObject::Str("City".to_string()));
    }

    #[test]
    fn subtype_rewrite_skips_when_subtype_already_present() {
        let mut query =
            crate::query::parse_datalog("SELECT ?n, typeOf ?n Place, subType ?n City").unwrap();
        let mut subtypes = IndexMap::new();
        subtypes.insert("City".to_string(), "Place".to_string());
        rewrite_subtypes(&mut query, &subtypes);
        assert_eq!(query.patterns.len(), 2);
        assert_eq!(query.patterns[0].object, QueryObject::Str("Place".to_string()));
    }

    #[test]
    fn query_identity_groups_by_subject_for_typed_and_by_predicate_subject_for_triple() {
        let mut query = crate::query::parse_datalog(
            "SELECT ?n, typeOf ?n Place, subType ?n City, name ?n \"San Jose\"",
        )
        .unwrap();
        let model = parse_mcf(PLACE_MCF).unwrap();
        let options = SolverOptions::default();
        let output = solve(&model, &mut query, &options).unwrap();
        // typeOf/subType/name on the same typed subject share one id.
        assert_eq!(output.query_ids[0], output.query_ids[1]);
        assert_eq!(output.query_ids[0], output.query_ids[2]);
    }
}
