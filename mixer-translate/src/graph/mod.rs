//! Builds an equality graph over query terms and mapping terms, resolves entities to
//! literals where possible, prunes redundant JOINs, and emits the list of SQL
//! constraints the SQL emitter turns into a WHERE/JOIN clause set.

use indexmap::{IndexMap, IndexSet};
use petgraph::unionfind::UnionFind;
use tracing::instrument;

use crate::binder::BindingSet;
use crate::mapping::{Column, Entity, MappingObject, Predicate};
use crate::query::{Node, ParsedQuery, QueryObject};
use crate::solver::SolverOutput;

/// A node in the equality graph: either a query term (variable, literal, list literal)
/// or a mapping term (entity, column) stamped with its query-scoped table instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphTerm {
    Var(Node),
    Literal(String),
    ListLiteral(Vec<String>),
    Entity(Entity),
    Column(Column),
}

impl GraphTerm {
    /// Canonical string form used for lexical tie-breaking when emitting constraints.
    pub fn sort_key(&self) -> String {
        match self {
            GraphTerm::Var(n) => format!("0:{n}"),
            GraphTerm::Literal(s) => format!("1:{s}"),
            GraphTerm::ListLiteral(items) => format!("2:{}", items.join(",")),
            GraphTerm::Entity(e) => format!("3:{e}"),
            GraphTerm::Column(c) => format!("4:{}", c.qualified_alias()),
        }
    }
}

/// The wide Triple table's surrogate-id column, used instead of its scalar `value`
/// column whenever the object being bound is itself another entity rather than a
/// literal (see the id-reference rewrite in [`build_and_extract`]).
const TRIPLE_ID_COLUMN: &str = "id";

/// One SQL constraint emitted by constraint extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    ColumnEqLiteral { column: Column, literal: String },
    ColumnEqColumn { left: Column, right: Column },
    ColumnInList { column: Column, values: Vec<String> },
}

impl Constraint {
    fn sort_key(&self) -> String {
        match self {
            Constraint::ColumnEqLiteral { column, literal } => {
                format!("{}={}", column.qualified_alias(), literal)
            }
            Constraint::ColumnEqColumn { left, right } => {
                format!("{}={}", left.qualified_alias(), right.qualified_alias())
            }
            Constraint::ColumnInList { column, values } => {
                format!("{} IN ({})", column.qualified_alias(), values.join(","))
            }
        }
    }
}

/// Output of the Graph Builder & Constraint Extractor, ready for the SQL Emitter.
#[derive(Debug, Clone, Default)]
pub struct ExtractedConstraints {
    pub constraints: Vec<Constraint>,
    /// select variable → the column that projects it.
    pub node_columns: IndexMap<Node, Column>,
    /// select variables bound only to a string literal, with no backing column.
    pub const_nodes: IndexMap<Node, String>,
}

struct EqualityGraph {
    terms: Vec<GraphTerm>,
    index: IndexMap<GraphTerm, usize>,
    uf: UnionFind<usize>,
}

impl EqualityGraph {
    fn new() -> Self {
        EqualityGraph {
            terms: Vec::new(),
            index: IndexMap::new(),
            uf: UnionFind::new(0),
        }
    }

    fn term_id(&mut self, term: GraphTerm) -> usize {
        if let Some(&i) = self.index.get(&term) {
            return i;
        }
        let i = self.terms.len();
        self.terms.push(term.clone());
        self.index.insert(term, i);
        self.uf = {
            let mut new_uf = UnionFind::new(self.terms.len());
            for j in 0..i {
                let root = self.uf.find(j);
                if root != j {
                    new_uf.union(j, root);
                }
            }
            new_uf
        };
        i
    }

    fn union(&mut self, a: GraphTerm, b: GraphTerm) {
        let ai = self.term_id(a);
        let bi = self.term_id(b);
        self.uf.union(ai, bi);
    }

    /// True if `term` was ever referenced (even if never unioned with anything else).
    fn contains(&self, term: &GraphTerm) -> bool {
        self.index.contains_key(term)
    }

    fn root_of(&mut self, term: &GraphTerm) -> Option<usize> {
        self.index.get(term).copied().map(|i| self.uf.find(i))
    }

    /// Connected components, each as the list of its member terms, in first-seen order.
    fn components(&mut self) -> Vec<Vec<GraphTerm>> {
        let mut by_root: IndexMap<usize, Vec<GraphTerm>> = IndexMap::new();
        for i in 0..self.terms.len() {
            let root = self.uf.find(i);
            by_root.entry(root).or_default().push(self.terms[i].clone());
        }
        by_root.into_values().collect()
    }
}

#[instrument(skip(bindings, query, solved))]
pub fn build_and_extract(
    bindings: &BindingSet,
    query: &ParsedQuery,
    solved: &SolverOutput,
) -> ExtractedConstraints {
    let mut graph = EqualityGraph::new();

    // Every select-subject node gets its query-scoped instance id from the solver's
    // query-identity assignment; patterns sharing a subject share an id.
    let mut node_instance: IndexMap<Node, u32> = IndexMap::new();
    for (i, pattern) in query.patterns.iter().enumerate() {
        node_instance
            .entry(pattern.subject.clone())
            .or_insert(solved.query_ids[i]);
    }

    for binding in bindings {
        let pattern = &query.patterns[binding.pattern_index];
        let mapping = binding.mapping;
        let instance_id = solved.query_ids[binding.pattern_index].to_string();

        let subject_term = GraphTerm::Entity(mapping.subject.with_instance_id(instance_id.clone()));
        graph.union(GraphTerm::Var(pattern.subject.clone()), subject_term);

        if let Predicate::Column(pred_col) = &mapping.predicate {
            graph.union(
                GraphTerm::Literal(pattern.predicate.clone()),
                GraphTerm::Column(pred_col.with_instance_id(instance_id.clone())),
            );
        }

        let query_object_term = match &pattern.object {
            QueryObject::Node(n) => GraphTerm::Var(n.clone()),
            QueryObject::Str(s) => GraphTerm::Literal(s.clone()),
            QueryObject::List(items) => GraphTerm::ListLiteral(items.clone()),
        };

        let is_triple = matches!(mapping.predicate, Predicate::Column(_));
        let object_is_shared_node = matches!(&pattern.object, QueryObject::Node(n) if node_instance.contains_key(n));

        match &mapping.object {
            MappingObject::Literal(_) => {
                // Already verified equal by binder compatibility rule 5; a constant
                // match needs no column and so no graph edge.
            }
            MappingObject::Column(col) => {
                let stamped = col.with_instance_id(instance_id);
                // Triple-wide-table objects: when the query's object is a node also
                // referenced elsewhere, or the predicate is `typeOf`, the link is an id
                // reference to another entity rather than a scalar value stored in the
                // row, so bind against the table's id column instead of the mapped
                // value column.
                let bound_column = if is_triple && (object_is_shared_node || pattern.predicate == "typeOf") {
                    Column {
                        table: stamped.table.clone(),
                        name: TRIPLE_ID_COLUMN.to_string(),
                    }
                } else {
                    stamped
                };
                graph.union(query_object_term, GraphTerm::Column(bound_column));
            }
            MappingObject::Entity(obj_entity) => {
                let obj_instance = match &pattern.object {
                    QueryObject::Node(n) => node_instance
                        .get(n)
                        .map(|id| id.to_string())
                        .unwrap_or(instance_id),
                    _ => instance_id,
                };
                graph.union(
                    query_object_term,
                    GraphTerm::Entity(obj_entity.with_instance_id(obj_instance)),
                );
            }
            MappingObject::Properties(_) => {
                // The functionalDeps sentinel never binds (binder rule 2).
            }
        }
    }

    resolve_and_emit(graph, query, solved)
}

fn resolve_and_emit(
    mut graph: EqualityGraph,
    _query: &ParsedQuery,
    solved: &SolverOutput,
) -> ExtractedConstraints {
    // Step 1: resolve entities whose functional-deps column is equated with a literal.
    let all_entities: Vec<Entity> = graph
        .terms
        .iter()
        .filter_map(|t| match t {
            GraphTerm::Entity(e) => Some(e.clone()),
            _ => None,
        })
        .collect();

    let mut resolved: IndexMap<Entity, (Column, String)> = IndexMap::new();
    for entity in &all_entities {
        let base = Entity {
            table: crate::mapping::Table::new(entity.table.db.clone(), entity.table.name.clone()),
            local_id: entity.local_id.clone(),
        };
        let Some(props) = solved.functional_deps.providers.get(&base) else {
            continue;
        };
        for col in props.values() {
            let stamped_col = col.with_instance_id(entity.table.instance_id.clone());
            let col_term = GraphTerm::Column(stamped_col.clone());
            if !graph.contains(&col_term) {
                continue;
            }
            let Some(col_root) = graph.root_of(&col_term) else {
                continue;
            };
            let entity_root = graph.root_of(&GraphTerm::Entity(entity.clone()));
            if entity_root != Some(col_root) {
                continue;
            }
            // Is a literal present in the same component?
            if let Some(lit) = literal_in_component(&mut graph, col_root) {
                resolved.insert(entity.clone(), (stamped_col, lit));
                break;
            }
        }
    }

    // Step 2: prune joins for entities resolved to a literal when no other entity of the
    // same table appears anywhere else in the graph.
    let mut table_entity_counts: IndexMap<String, usize> = IndexMap::new();
    for e in &all_entities {
        *table_entity_counts.entry(e.table.qualified()).or_insert(0) += 1;
    }
    let pruned_entities: IndexSet<Entity> = resolved
        .iter()
        .filter(|(e, _)| table_entity_counts.get(&e.table.qualified()).copied().unwrap_or(0) <= 1)
        .map(|(e, _)| e.clone())
        .collect();
    let pruned_columns: IndexSet<Column> = pruned_entities
        .iter()
        .filter_map(|e| resolved.get(e).map(|(col, _)| col.clone()))
        .collect();

    // Step 3 & 4: emit constraints per component, treating pruned entities/columns as
    // replaced by their resolved literal instead of as graph members.
    let mut constraints = Vec::new();
    let mut node_columns = IndexMap::new();
    let mut const_nodes = IndexMap::new();

    for component in graph.components() {
        let mut vars = Vec::new();
        let mut columns: IndexSet<Column> = IndexSet::new();
        let mut literals: IndexSet<String> = IndexSet::new();
        let mut lists: Vec<Vec<String>> = Vec::new();

        for term in &component {
            match term {
                GraphTerm::Var(n) => vars.push(n.clone()),
                GraphTerm::Literal(s) => {
                    literals.insert(s.clone());
                }
                GraphTerm::ListLiteral(items) => lists.push(items.clone()),
                GraphTerm::Column(c) => {
                    if !pruned_columns.contains(c) {
                        columns.insert(c.clone());
                    }
                }
                GraphTerm::Entity(e) => {
                    if pruned_entities.contains(e) {
                        if let Some((_, lit)) = resolved.get(e) {
                            literals.insert(lit.clone());
                        }
                    }
                }
            }
        }
        let mut sorted_columns: Vec<Column> = columns.into_iter().collect();
        sorted_columns.sort_by_key(|c| c.qualified_alias());

        match sorted_columns.len() {
            0 => {
                if let Some(lit) = literals.iter().next().cloned() {
                    for var in &vars {
                        const_nodes.insert(var.clone(), lit.clone());
                    }
                }
            }
            1 => {
                let col = sorted_columns[0].clone();
                for var in &vars {
                    node_columns.insert(var.clone(), col.clone());
                }
                for lit in literals.iter() {
                    constraints.push(Constraint::ColumnEqLiteral {
                        column: col.clone(),
                        literal: lit.clone(),
                    });
                }
                for list in &lists {
                    constraints.push(Constraint::ColumnInList {
                        column: col.clone(),
                        values: list.clone(),
                    });
                }
            }
            _ => {
                let pivot = sorted_columns[0].clone();
                for other in &sorted_columns[1..] {
                    constraints.push(Constraint::ColumnEqColumn {
                        left: pivot.clone(),
                        right: other.clone(),
                    });
                }
                for var in &vars {
                    node_columns.insert(var.clone(), pivot.clone());
                }
                for lit in literals.iter() {
                    constraints.push(Constraint::ColumnEqLiteral {
                        column: pivot.clone(),
                        literal: lit.clone(),
                    });
                }
                for list in &lists {
                    constraints.push(Constraint::ColumnInList {
                        column: pivot.clone(),
                        values: list.clone(),
                    });
                }
            }
        }
    }

    constraints.sort_by_key(|c| c.sort_key());

    ExtractedConstraints {
        constraints,
        node_columns,
        const_nodes,
    }
}

fn literal_in_component(graph: &mut EqualityGraph, root: usize) -> Option<String> {
    for i in 0..graph.terms.len() {
        if graph.uf.find(i) == root {
            if let GraphTerm::Literal(s) = &graph.terms[i] {
                return Some(s.clone());
            }
        }
    }
    None
}
