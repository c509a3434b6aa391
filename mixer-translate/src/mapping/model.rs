//! Data types for the schema mapping: tables, entities, columns,
//! predicates, mappings and the per-table import schema.
//!
//! Mapping objects are created once at process start from the schema file and are
//! immutable afterwards; they are cheap to clone (`Arc`-free, small owned strings) so that
//! translation can freely stamp query-scoped copies onto them (see [`Table::with_instance_id`]).

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;

/// A qualified table reference, e.g. `dc.Place`.
///
/// `instance_id` disambiguates multiple references to the same underlying table within a
/// single translation (a self-join); it starts empty for tables as they appear in the raw
/// mapping file and is stamped with a query id by the solver/graph builder during
/// translation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Table {
    pub db: String,
    pub name: String,
    pub instance_id: String,
}

impl Table {
    pub fn new(db: impl Into<String>, name: impl Into<String>) -> Self {
        Table {
            db: db.into(),
            name: name.into(),
            instance_id: String::new(),
        }
    }

    /// `db.name`, the form used in MCF/TMCF text and in `FROM` clauses.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.db, self.name)
    }

    /// Returns a copy of this table stamped with a query-scoped instance id, so that two
    /// references to the same table within one query produce distinct SQL aliases.
    pub fn with_instance_id(&self, id: impl Into<String>) -> Table {
        Table {
            db: self.db.clone(),
            name: self.name.clone(),
            instance_id: id.into(),
        }
    }

    /// The SQL alias: non-identifier characters of the qualified name replaced with `_`,
    /// followed by the instance id.
    pub fn sql_alias(&self) -> String {
        let sanitized: String = self
            .qualified()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        format!("_{sanitized}_{}", self.instance_id)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

/// A position in the schema: `(table, localId)`, written `E:table->localId` in MCF.
///
/// Two entities with the same `(table, localId)` are equal. Note the table's
/// `instance_id` is part of equality too, since it is how query-scoped copies of the same
/// mapping-time entity are told apart during translation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    pub table: Table,
    pub local_id: String,
}

impl Entity {
    pub fn new(table: Table, local_id: impl Into<String>) -> Self {
        Entity {
            table,
            local_id: local_id.into(),
        }
    }

    pub fn with_instance_id(&self, id: impl Into<String>) -> Entity {
        Entity {
            table: self.table.with_instance_id(id),
            local_id: self.local_id.clone(),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E:{}->{}", self.table.qualified(), self.local_id)
    }
}

/// A column reference, `C:table->name` in MCF.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Column {
    pub table: Table,
    pub name: String,
}

impl Column {
    pub fn new(table: Table, name: impl Into<String>) -> Self {
        Column {
            table,
            name: name.into(),
        }
    }

    pub fn with_instance_id(&self, id: impl Into<String>) -> Column {
        Column {
            table: self.table.with_instance_id(id),
            name: self.name.clone(),
        }
    }

    /// `alias.column`, as it appears in SELECT/WHERE/JOIN clauses.
    pub fn qualified_alias(&self) -> String {
        format!("{}.{}", self.table.sql_alias(), self.name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C:{}->{}", self.table.qualified(), self.name)
    }
}

/// The predicate side of a [`Mapping`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// The common case: a string predicate name, e.g. `name` or `typeOf`.
    Name(String),
    /// The predicate itself is stored as a cell, used by the wide Triple table.
    Column(Column),
    /// Sentinel marking a functional-dependency declaration; never bound against queries.
    FunctionalDeps,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Name(name) => write!(f, "{name}"),
            Predicate::Column(c) => write!(f, "{c}"),
            Predicate::FunctionalDeps => write!(f, "functionalDeps"),
        }
    }
}

/// The polymorphic object of a [`Mapping`], represented as a tagged variant and matched
/// explicitly at each use site rather than approximated with a parent type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappingObject {
    Literal(String),
    Column(Column),
    Entity(Entity),
    /// Property list, used only when the predicate is `FunctionalDeps`.
    Properties(Vec<String>),
}

/// One `predicate: object` line under a `Node:` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub predicate: Predicate,
    pub subject: Entity,
    pub object: MappingObject,
}

impl Mapping {
    pub fn is_functional_deps(&self) -> bool {
        matches!(self.predicate, Predicate::FunctionalDeps)
    }

    /// True for `typeOf` mappings, used by the solver to derive entity types.
    pub fn is_type_of(&self) -> bool {
        matches!(&self.predicate, Predicate::Name(name) if name == "typeOf")
    }
}

/// Reserved predicates that never participate in out-arc/in-arc enumeration.
pub const RESERVED_PREDICATES: &[&str] =
    &["typeOf", "subType", "dcid", "isPublic", "provenance"];

/// For each table described by a TMCF file: a map from column name to the `(localNodeId,
/// property)` pairs it feeds, and a map from local node id to its literal properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub column_nodes: IndexMap<String, Vec<(String, String)>>,
    pub node_literals: IndexMap<String, BTreeMap<String, String>>,
}

/// The full, immutable mapping model loaded from an MCF file plus any TMCF tables.
#[derive(Debug, Clone, Default)]
pub struct MappingModel {
    pub mappings: Vec<Mapping>,
    pub table_schemas: IndexMap<Table, TableSchema>,
}

impl MappingModel {
    pub fn new(mappings: Vec<Mapping>) -> Self {
        MappingModel {
            mappings,
            table_schemas: IndexMap::new(),
        }
    }

    pub fn mappings_for_subject<'a>(&'a self, subject: &'a Entity) -> impl Iterator<Item = &'a Mapping> {
        self.mappings.iter().filter(move |m| &m.subject == subject)
    }

    /// All distinct entities appearing as mapping subjects, in file order.
    pub fn entities(&self) -> Vec<Entity> {
        let mut seen = IndexMap::new();
        for m in &self.mappings {
            seen.entry(m.subject.clone()).or_insert(());
        }
        seen.into_keys().collect()
    }
}
