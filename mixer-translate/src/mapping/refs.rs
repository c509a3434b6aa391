//! Shared `E:`/`C:` reference grammar used by both the MCF and TMCF parsers.

use nom::bytes::complete::{tag, take_until};
use nom::combinator::{all_consuming, rest};
use nom::sequence::preceded;
use nom::IResult;

use super::model::{Column, Entity, Table};

fn qualified_table(input: &str) -> IResult<&str, Table> {
    let (rest, db_dot_name) = take_until_arrow(input)?;
    let (db, name) = db_dot_name
        .split_once('.')
        .unwrap_or(("dc", db_dot_name));
    Ok((rest, Table::new(db, name)))
}

fn take_until_arrow(input: &str) -> IResult<&str, &str> {
    take_until("->")(input)
}

fn entity_ref(i: &str) -> IResult<&str, Entity> {
    let (i, table) = preceded(tag("E:"), qualified_table)(i)?;
    let (i, local_id) = preceded(tag("->"), rest)(i)?;
    Ok((i, Entity::new(table, local_id)))
}

/// Parses `E:table->localId`.
pub fn parse_entity_ref(input: &str) -> Option<Entity> {
    all_consuming(entity_ref)(input).ok().map(|(_, e)| e)
}

fn column_ref(i: &str) -> IResult<&str, Column> {
    let (i, table) = preceded(tag("C:"), qualified_table)(i)?;
    let (i, name) = preceded(tag("->"), rest)(i)?;
    Ok((i, Column::new(table, name)))
}

/// Parses `C:table->columnName`.
pub fn parse_column_ref(input: &str) -> Option<Column> {
    all_consuming(column_ref)(input).ok().map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entity_ref() {
        let e = parse_entity_ref("E:dc.Place->E0").unwrap();
        assert_eq!(e.table.qualified(), "dc.Place");
        assert_eq!(e.local_id, "E0");
    }

    #[test]
    fn parses_column_ref() {
        let c = parse_column_ref("C:dc.Place->name").unwrap();
        assert_eq!(c.table.qualified(), "dc.Place");
        assert_eq!(c.name, "name");
    }

    #[test]
    fn rejects_malformed_ref() {
        assert!(parse_entity_ref("E:dc.Place").is_none());
        assert!(parse_column_ref("Place->name").is_none());
    }
}
