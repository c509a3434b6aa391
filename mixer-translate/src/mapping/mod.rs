//! Mapping model and its two parsers.

mod model;
mod parser;
mod refs;
mod tmcf;

pub use model::{
    Column, Entity, Mapping, MappingModel, MappingObject, Predicate, Table, TableSchema,
    RESERVED_PREDICATES,
};
pub use parser::parse_mcf;
pub use refs::{parse_column_ref, parse_entity_ref};
pub use tmcf::{parse_tmcf, TmcfDocument};
