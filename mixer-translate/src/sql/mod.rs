//! Turns extracted constraints into a deterministic parameterized SELECT statement
//! against an ANSI-like dialect: named `@parameters`, backtick-quoted `db.table`
//! identifiers, and `IN UNNEST(@name)` for array containment.

use indexmap::IndexMap;
use tracing::instrument;

use crate::error::{Result, TranslateError};
use crate::graph::{Constraint, ExtractedConstraints};
use crate::mapping::Table;
use crate::query::{Node, QueryOptions, SortDirection};
use crate::solver::ProvenanceColumns;

/// A single bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Number(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub struct SqlOutput {
    pub sql: String,
    /// Named parameters in emission order (`value0`, `value1`, … plus `limit`).
    pub params: IndexMap<String, ParamValue>,
    /// select-output index → provenance column indices describing it.
    pub provenance_map: IndexMap<usize, Vec<usize>>,
}

/// The column whose constraints are surfaced first in WHERE, to leverage it as the
/// warehouse clustering key.
pub const VARIABLE_MEASURED_COLUMN: &str = "variable_measured";

#[instrument(skip(select, extracted, options, provenance))]
pub fn emit_sql(
    select: &[Node],
    extracted: &ExtractedConstraints,
    options: &QueryOptions,
    with_provenance: bool,
    provenance: &ProvenanceColumns,
    triple_tables: &[Table],
) -> Result<SqlOutput> {
    let tables = collect_tables(select, extracted);
    if tables.is_empty() && extracted.const_nodes.is_empty() {
        return Err(TranslateError::internal(
            "no table referenced by the select list",
        ));
    }

    let (literal_constraints, join_constraints) = partition_constraints(&extracted.constraints);
    let importance = table_importance(&tables, &literal_constraints, &join_constraints);

    let from_order = order_from_tables(&tables, &literal_constraints);
    let (join_clauses, leftover_joins) = walk_joins(&from_order, &join_constraints, &importance);

    let mut where_constraints: Vec<Constraint> = literal_constraints;
    where_constraints.extend(leftover_joins);
    where_constraints.sort_by_key(|c| c.clone().sort_key_for_where());
    where_constraints.sort_by_key(|c| !c.touches_column(VARIABLE_MEASURED_COLUMN));

    let mut params = IndexMap::new();
    let mut where_clauses = Vec::new();
    for constraint in &where_constraints {
        where_clauses.push(render_where(constraint, &mut params, triple_tables));
    }

    let select_clause = render_select(select, extracted, with_provenance, provenance)?;
    let provenance_map = if with_provenance {
        build_provenance_map(select, extracted, provenance)
    } else {
        IndexMap::new()
    };

    let mut sql = format!("SELECT {select_clause}");
    sql.push_str(&format!(" FROM {}", render_table(&from_order[0])));
    for clause in &join_clauses {
        sql.push(' ');
        sql.push_str(clause);
    }
    if !where_clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clauses.join(" AND "));
    }
    if let Some(order_by) = &options.order_by {
        let dir = match options.order_direction {
            Some(SortDirection::Desc) => "DESC",
            _ => "ASC",
        };
        sql.push_str(&format!(" ORDER BY {} {dir}", order_by.output_alias()));
    }
    if let Some(limit) = options.limit {
        sql.push_str(" LIMIT @limit");
        params.insert("limit".to_string(), ParamValue::Number(limit.to_string()));
    }

    Ok(SqlOutput {
        sql,
        params,
        provenance_map,
    })
}

fn collect_tables(select: &[Node], extracted: &ExtractedConstraints) -> Vec<Table> {
    let mut seen = IndexMap::new();
    for node in select {
        if let Some(col) = extracted.node_columns.get(node) {
            seen.entry(col.table.clone()).or_insert(());
        }
    }
    for constraint in &extracted.constraints {
        for table in constraint.tables() {
            seen.entry(table).or_insert(());
        }
    }
    seen.into_keys().collect()
}

fn partition_constraints(constraints: &[Constraint]) -> (Vec<Constraint>, Vec<Constraint>) {
    let mut literal = Vec::new();
    let mut join = Vec::new();
    for c in constraints {
        match c {
            Constraint::ColumnEqColumn { .. } => join.push(c.clone()),
            _ => literal.push(c.clone()),
        }
    }
    (literal, join)
}

fn table_importance(
    tables: &[Table],
    literal_constraints: &[Constraint],
    join_constraints: &[Constraint],
) -> IndexMap<Table, usize> {
    let mut importance: IndexMap<Table, usize> = tables.iter().cloned().map(|t| (t, 0)).collect();
    for c in literal_constraints.iter().chain(join_constraints.iter()) {
        for t in c.tables() {
            *importance.entry(t).or_insert(0) += 1;
        }
    }
    importance
}

fn order_from_tables(tables: &[Table], literal_constraints: &[Constraint]) -> Vec<Table> {
    let mut literal_counts: IndexMap<Table, usize> = IndexMap::new();
    for c in literal_constraints {
        for t in c.tables() {
            *literal_counts.entry(t).or_insert(0) += 1;
        }
    }
    let mut ordered = tables.to_vec();
    ordered.sort_by(|a, b| {
        let la = literal_counts.get(a).copied().unwrap_or(0);
        let lb = literal_counts.get(b).copied().unwrap_or(0);
        lb.cmp(&la)
            .then_with(|| a.qualified().cmp(&b.qualified()))
            .then_with(|| a.instance_id.cmp(&b.instance_id))
    });
    ordered
}

/// Breadth-first walk of the join-constraint graph, picking at each step the adjacent
/// table touched by the most constraints (ties broken lexically on the table's
/// qualified name). Returns the rendered `JOIN` clauses and the leftover (repeat) edges
/// that get reclassified to WHERE.
fn walk_joins(
    from_order: &[Table],
    join_constraints: &[Constraint],
    importance: &IndexMap<Table, usize>,
) -> (Vec<String>, Vec<Constraint>) {
    let mut visited: Vec<Table> = vec![from_order[0].clone()];
    let mut clauses = Vec::new();
    let mut leftover = Vec::new();
    let mut remaining: Vec<Constraint> = join_constraints.to_vec();

    loop {
        let mut candidate: Option<(usize, Constraint, Table)> = None;
        for (i, c) in remaining.iter().enumerate() {
            let Constraint::ColumnEqColumn { left, right } = c else {
                continue;
            };
            let other_table = if visited.contains(&left.table) && !visited.contains(&right.table) {
                right.table.clone()
            } else if visited.contains(&right.table) && !visited.contains(&left.table) {
                left.table.clone()
            } else {
                continue;
            };
            let better = match &candidate {
                None => true,
                Some((_, _, current_other)) => {
                    let current_importance = importance.get(current_other).copied().unwrap_or(0);
                    let other_importance = importance.get(&other_table).copied().unwrap_or(0);
                    match other_importance.cmp(&current_importance) {
                        std::cmp::Ordering::Greater => true,
                        std::cmp::Ordering::Equal => other_table.qualified() < current_other.qualified(),
                        std::cmp::Ordering::Less => false,
                    }
                }
            };
            if better {
                candidate = Some((i, c.clone(), other_table));
            }
        }
        let Some((idx, constraint, other_table)) = candidate else {
            break;
        };
        remaining.remove(idx);
        visited.push(other_table.clone());
        let (left, right) = match &constraint {
            Constraint::ColumnEqColumn { left, right } => (left, right),
            _ => unreachable!(),
        };
        clauses.push(format!(
            "JOIN {} ON {} = {}",
            render_table(&other_table),
            left.qualified_alias(),
            right.qualified_alias()
        ));
    }

    // Remaining edges connect already-visited tables (self-joins beyond the spanning
    // tree, or disconnected components) — those become WHERE constraints.
    for c in remaining {
        leftover.push(c);
    }
    (clauses, leftover)
}

fn render_table(table: &Table) -> String {
    format!("`{}` AS {}", table.qualified(), table.sql_alias())
}

fn render_select(
    select: &[Node],
    extracted: &ExtractedConstraints,
    with_provenance: bool,
    provenance: &ProvenanceColumns,
) -> Result<String> {
    let mut parts = Vec::new();
    let mut prov_tables_seen: IndexMap<Table, usize> = IndexMap::new();
    for node in select {
        let alias = node.output_alias();
        if let Some(col) = extracted.node_columns.get(node) {
            parts.push(format!("{} AS {alias}", col.qualified_alias()));
        } else if let Some(lit) = extracted.const_nodes.get(node) {
            parts.push(format!("'{}' AS {alias}", escape_sql_string(lit)));
        } else {
            return Err(TranslateError::not_found(format!(
                "select variable `{node}` has no binding"
            )));
        }
    }
    if with_provenance {
        for node in select {
            if let Some(col) = extracted.node_columns.get(node) {
                if let Some(prov_col) = provenance.by_table.get(&col.table) {
                    if !prov_tables_seen.contains_key(&col.table) {
                        let idx = prov_tables_seen.len();
                        prov_tables_seen.insert(col.table.clone(), idx);
                        parts.push(format!("{} AS prov_{idx}", prov_col.qualified_alias()));
                    }
                }
            }
        }
    }
    Ok(parts.join(", "))
}

fn build_provenance_map(
    select: &[Node],
    extracted: &ExtractedConstraints,
    provenance: &ProvenanceColumns,
) -> IndexMap<usize, Vec<usize>> {
    let mut prov_tables_seen: IndexMap<Table, usize> = IndexMap::new();
    let mut table_to_prov_idx: IndexMap<Table, usize> = IndexMap::new();
    for node in select {
        if let Some(col) = extracted.node_columns.get(node) {
            if let Some(_prov_col) = provenance.by_table.get(&col.table) {
                table_to_prov_idx
                    .entry(col.table.clone())
                    .or_insert_with(|| {
                        let idx = prov_tables_seen.len();
                        prov_tables_seen.insert(col.table.clone(), idx);
                        idx
                    });
            }
        }
    }
    let mut map = IndexMap::new();
    for (i, node) in select.iter().enumerate() {
        if let Some(col) = extracted.node_columns.get(node) {
            if let Some(&prov_idx) = table_to_prov_idx.get(&col.table) {
                map.insert(i, vec![prov_idx]);
            }
        }
    }
    map
}

fn render_where(constraint: &Constraint, params: &mut IndexMap<String, ParamValue>, triple_tables: &[Table]) -> String {
    match constraint {
        Constraint::ColumnEqLiteral { column, literal } => {
            let name = next_param_name(params);
            let value = encode_literal(literal, &column.table, triple_tables);
            params.insert(name.clone(), value);
            format!("{} = @{name}", column.qualified_alias())
        }
        Constraint::ColumnInList { column, values } => {
            let name = next_param_name(params);
            params.insert(name.clone(), ParamValue::List(values.clone()));
            format!("{} IN UNNEST(@{name})", column.qualified_alias())
        }
        Constraint::ColumnEqColumn { left, right } => {
            format!("{} = {}", left.qualified_alias(), right.qualified_alias())
        }
    }
}

fn next_param_name(params: &IndexMap<String, ParamValue>) -> String {
    format!("value{}", params.len())
}

fn encode_literal(literal: &str, table: &Table, triple_tables: &[Table]) -> ParamValue {
    let is_triple = triple_tables.iter().any(|t| t.qualified() == table.qualified());
    if !is_triple && literal.parse::<f64>().is_ok() {
        ParamValue::Number(literal.to_string())
    } else {
        ParamValue::Str(literal.to_string())
    }
}

fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

impl Constraint {
    fn tables(&self) -> Vec<Table> {
        match self {
            Constraint::ColumnEqLiteral { column, .. } => vec![column.table.clone()],
            Constraint::ColumnInList { column, .. } => vec![column.table.clone()],
            Constraint::ColumnEqColumn { left, right } => vec![left.table.clone(), right.table.clone()],
        }
    }

    fn touches_column(&self, name: &str) -> bool {
        match self {
            Constraint::ColumnEqLiteral { column, .. } | Constraint::ColumnInList { column, .. } => {
                column.name == name
            }
            Constraint::ColumnEqColumn { left, right } => left.name == name || right.name == name,
        }
    }

    fn sort_key_for_where(self) -> String {
        match self {
            Constraint::ColumnEqLiteral { column, literal } => {
                format!("{}={}", column.qualified_alias(), literal)
            }
            Constraint::ColumnInList { column, values } => {
                format!("{} IN ({})", column.qualified_alias(), values.join(","))
            }
            Constraint::ColumnEqColumn { left, right } => {
                format!("{}={}", left.qualified_alias(), right.qualified_alias())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::bind;
    use crate::graph::build_and_extract;
    use crate::mapping::parse_mcf;
    use crate::solver::{solve, SolverOptions};

    const PLACE_MCF: &str = r#"
        Node: E:dc.Place->E0
        typeOf: "Place"
        subType: C:dc.Place->type
        dcid: C:dc.Place->id
        name: C:dc.Place->name
        functionalDeps: dcid
    "#;

    #[test]
    fn golden_scenario_one_single_table_select() {
        let model = parse_mcf(PLACE_MCF).unwrap();
        let mut query = crate::query::parse_datalog(
            "SELECT ?node, typeOf ?node Place, subType ?node City, dcid ?node ?node",
        )
        .unwrap();
        let options = SolverOptions::default();
        let solved = solve(&model, &mut query, &options).unwrap();
        let bindings = bind(&model, &query, &solved, &[]).unwrap();
        let extracted = build_and_extract(&bindings, &query, &solved);
        let out = emit_sql(
            &query.select,
            &extracted,
            &query.options,
            false,
            &solved.provenance,
            &[],
        )
        .unwrap();

        assert_eq!(
            out.sql,
            "SELECT _dc_Place_0.id AS node FROM `dc.Place` AS _dc_Place_0 WHERE _dc_Place_0.type = @value0"
        );
        assert_eq!(out.params.get("value0"), Some(&ParamValue::Str("City".to_string())));
    }

    const TRIPLE_MCF: &str = r#"
        Node: E:dc.Place->E0
        typeOf: "Place"
        dcid: C:dc.Place->id
        functionalDeps: dcid

        Node: E:dc.Triple->E0
        C:dc.Triple->predicate: C:dc.Triple->value
    "#;

    #[test]
    fn golden_scenario_two_triple_object_is_rewritten_to_id_reference() {
        let model = parse_mcf(TRIPLE_MCF).unwrap();
        let mut query = crate::query::parse_datalog(
            "SELECT ?parent, containedInPlace ?node ?parent, typeOf ?parent Place, dcid ?parent ?parent",
        )
        .unwrap();
        let options = SolverOptions::default();
        let solved = solve(&model, &mut query, &options).unwrap();
        let bindings = bind(&model, &query, &solved, &[]).unwrap();
        let extracted = build_and_extract(&bindings, &query, &solved);
        let out = emit_sql(
            &query.select,
            &extracted,
            &query.options,
            false,
            &solved.provenance,
            &[],
        )
        .unwrap();

        // `?parent` is both the object of a Triple-dispatched `containedInPlace` pattern
        // and the subject of its own typed patterns elsewhere, so the rewrite binds the
        // Triple row's `id` column (an entity reference) rather than its `value` column
        // (a scalar) when joining it to the parent's own table.
        assert_eq!(
            out.sql,
            "SELECT _dc_Place_1.id AS parent FROM `dc.Triple` AS _dc_Triple_0 JOIN `dc.Place` AS _dc_Place_1 ON _dc_Place_1.id = _dc_Triple_0.id WHERE _dc_Triple_0.predicate = @value0"
        );
        assert_eq!(
            out.params.get("value0"),
            Some(&ParamValue::Str("containedInPlace".to_string()))
        );
    }

    #[test]
    fn golden_scenario_three_chained_triple_self_join() {
        let model = parse_mcf(TRIPLE_MCF).unwrap();
        let mut query = crate::query::parse_datalog(
            "SELECT ?grandparent, containedInPlace ?node ?parent, containedInPlace ?parent ?grandparent, typeOf ?grandparent Place, dcid ?grandparent ?grandparent",
        )
        .unwrap();
        let options = SolverOptions::default();
        let solved = solve(&model, &mut query, &options).unwrap();
        let bindings = bind(&model, &query, &solved, &[]).unwrap();
        let extracted = build_and_extract(&bindings, &query, &solved);
        let out = emit_sql(
            &query.select,
            &extracted,
            &query.options,
            false,
            &solved.provenance,
            &[],
        )
        .unwrap();

        // Two `containedInPlace` hops stamp two distinct Triple row instances sharing the
        // same subject's own table; the intermediate `?parent` node chains the first
        // row's rewritten id column into the second row's subject, and the final id
        // reference joins through to the grandparent's own typed table.
        assert!(out.sql.contains("JOIN `dc.Triple` AS _dc_Triple_1"));
        assert!(out.sql.contains("JOIN `dc.Place` AS _dc_Place_2"));
        assert!(out.sql.contains("_dc_Place_2.id = _dc_Triple_1.id"));
        assert!(!out.sql.contains(".value"));
        assert_eq!(
            out.params.get("value0"),
            Some(&ParamValue::Str("containedInPlace".to_string()))
        );
    }
}
