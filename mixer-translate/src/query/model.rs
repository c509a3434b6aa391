//! The internal query representation shared by both parsers: a select list
//! plus a list of triple patterns.

use std::fmt;

/// A query variable, e.g. `?node`. Always carries its leading `?`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node(pub String);

impl Node {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with('?') {
            Node(raw)
        } else {
            Node(format!("?{raw}"))
        }
    }

    /// The alias used in SELECT output: `?` stripped, `/` replaced with `_`.
    pub fn output_alias(&self) -> String {
        self.0.trim_start_matches('?').replace('/', "_")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The polymorphic object of a [`Query`] pattern: a node, a string, or a list
/// of strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryObject {
    Node(Node),
    Str(String),
    List(Vec<String>),
}

impl QueryObject {
    /// The first element when the object is a list, the string itself otherwise; `None`
    /// for a node object (used by the binder's literal-object compatibility rule).
    pub fn first_literal(&self) -> Option<&str> {
        match self {
            QueryObject::Str(s) => Some(s.as_str()),
            QueryObject::List(items) => items.first().map(|s| s.as_str()),
            QueryObject::Node(_) => None,
        }
    }
}

/// One triple pattern: `pred subject object`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub predicate: String,
    pub subject: Node,
    pub object: QueryObject,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Query options parsed from `ORDER BY`/`LIMIT` (SPARQL) or equivalent out-of-band
/// options (Datalog has none in its grammar; options default to empty).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub distinct: bool,
    pub order_by: Option<Node>,
    pub order_direction: Option<SortDirection>,
    pub limit: Option<u64>,
}

/// The output of either parser: select variables plus patterns, ready for the solver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub select: Vec<Node>,
    pub patterns: Vec<Query>,
    pub options: QueryOptions,
}
