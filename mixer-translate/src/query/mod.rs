//! Query parsers: the Datalog-flavored form and the SPARQL subset, both
//! producing the same internal [`ParsedQuery`] representation.

mod datalog;
mod lexer;
mod model;
mod sparql;

pub use datalog::parse_datalog;
pub use model::{Node, ParsedQuery, Query, QueryObject, QueryOptions, SortDirection};
pub use sparql::parse_sparql;

/// Which concrete grammar produced (or should parse) a query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryLanguage {
    Datalog,
    Sparql,
}

pub fn parse(language: QueryLanguage, text: &str) -> crate::error::Result<ParsedQuery> {
    match language {
        QueryLanguage::Datalog => parse_datalog(text),
        QueryLanguage::Sparql => parse_sparql(text),
    }
}
