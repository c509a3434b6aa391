//! The SPARQL-subset parser: an optional `BASE`/`PREFIX` prologue, a
//! `SELECT [DISTINCT] ?var*` clause, a `WHERE { ... }` clause with dot-separated triples
//! and optional parenthesized object lists, optional `ORDER BY [ASC|DESC] ?var`, optional
//! `LIMIT <int>`.

use nom::bytes::complete::{tag, take_until};
use nom::character::complete::multispace0;
use nom::sequence::{delimited, preceded};
use nom::IResult;
use tracing::instrument;

use super::lexer::{split_top_level, tokenize};
use super::model::{Node, ParsedQuery, Query, QueryObject, QueryOptions, SortDirection};
use crate::error::{Result, TranslateError};

#[instrument(skip(text))]
pub fn parse_sparql(text: &str) -> Result<ParsedQuery> {
    let mut rest = text.trim();
    rest = skip_prologue(rest);

    let (select_clause, after_select) = take_clause(rest, "SELECT", 1)?;
    let mut select_tokens = tokenize(select_clause);
    let distinct = matches!(select_tokens.first().map(String::as_str), Some("DISTINCT"));
    if distinct {
        select_tokens.remove(0);
    }
    let select: Vec<Node> = select_tokens.into_iter().map(Node::new).collect();
    if select.is_empty() {
        return Err(TranslateError::invalid_input(
            "SELECT clause names no variables",
            1,
        ));
    }

    let after_select = after_select.trim_start();
    let Some(after_where_kw) = after_select.strip_prefix("WHERE") else {
        return Err(TranslateError::invalid_input(
            "missing required WHERE clause",
            1,
        ));
    };
    let (brace_body, after_braces) = extract_braces(after_where_kw.trim_start())?;
    let patterns = parse_triples(brace_body)?;

    let options = parse_options(after_braces.trim())?;

    Ok(ParsedQuery {
        select,
        patterns,
        options: QueryOptions {
            distinct,
            ..options
        },
    })
}

/// Consumes any number of `BASE <uri>` / `PREFIX pfx: <uri>` lines; this subset does not
/// expand prefixed names, it only accepts and discards the prologue.
fn skip_prologue(mut text: &str) -> &str {
    loop {
        let trimmed = text.trim_start();
        if let Ok((rest, _)) = prologue_line(trimmed) {
            text = rest;
        } else {
            return trimmed;
        }
    }
}

fn prologue_line(input: &str) -> IResult<&str, &str> {
    let base = |i| -> IResult<&str, &str> {
        preceded(
            tag("BASE"),
            delimited(multispace0, delimited(tag("<"), take_until(">"), tag(">")), multispace0),
        )(i)
    };
    let prefix = |i| -> IResult<&str, &str> {
        let (i, _) = tag("PREFIX")(i)?;
        let (i, _) = multispace0(i)?;
        let (i, _) = take_until(":")(i)?;
        let (i, _) = tag(":")(i)?;
        let (i, _) = multispace0(i)?;
        let (i, uri) = delimited(tag("<"), take_until(">"), tag(">"))(i)?;
        let (i, _) = multispace0(i)?;
        Ok((i, uri))
    };
    nom::branch::alt((base, prefix))(input)
}

fn take_clause<'a>(text: &'a str, keyword: &str, line_no: u32) -> Result<(&'a str, &'a str)> {
    let Some(after_kw) = text.strip_prefix(keyword) else {
        return Err(TranslateError::invalid_input(
            format!("missing required {keyword} clause"),
            line_no,
        ));
    };
    match after_kw.find("WHERE") {
        Some(pos) => Ok((after_kw[..pos].trim(), &after_kw[pos..])),
        None => Ok((after_kw.trim(), "")),
    }
}

fn extract_braces(text: &str) -> Result<(&str, &str)> {
    let Some(open) = text.find('{') else {
        return Err(TranslateError::invalid_input(
            "WHERE clause missing opening brace",
            1,
        ));
    };
    let mut depth = 0i32;
    let mut close = None;
    for (i, c) in text.char_indices().skip(open) {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(close) = close else {
        return Err(TranslateError::invalid_input(
            "unterminated braces in WHERE clause",
            1,
        ));
    };
    Ok((&text[open + 1..close], &text[close + 1..]))
}

fn parse_triples(body: &str) -> Result<Vec<Query>> {
    let mut patterns = Vec::new();
    for (i, stmt) in split_top_level(body, '.').into_iter().enumerate() {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        patterns.push(parse_triple(stmt, (i + 1) as u32)?);
    }
    Ok(patterns)
}

fn parse_triple(stmt: &str, line_no: u32) -> Result<Query> {
    let stmt = stmt.trim();
    let Some(rest) = stmt.strip_prefix('?') else {
        return Err(TranslateError::invalid_input(
            format!("triple `{stmt}` subject is not a node"),
            line_no,
        ));
    };
    let Some(sp) = rest.find(char::is_whitespace) else {
        return Err(TranslateError::invalid_input(
            format!("triple `{stmt}` missing predicate/object"),
            line_no,
        ));
    };
    let subject = Node::new(format!("?{}", &rest[..sp]));
    let remainder = rest[sp..].trim_start();

    let pred_end = remainder
        .find(char::is_whitespace)
        .unwrap_or(remainder.len());
    let predicate = remainder[..pred_end].to_string();
    let object_text = remainder[pred_end..].trim();
    if object_text.is_empty() {
        return Err(TranslateError::invalid_input(
            format!("triple `{stmt}` has no object"),
            line_no,
        ));
    }

    let object = if let Some(inner) = object_text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
    {
        QueryObject::List(
            split_top_level(inner, ',')
                .into_iter()
                .map(|s| s.trim().trim_matches('"').to_string())
                .collect(),
        )
    } else {
        let tokens = tokenize(object_text);
        let tok = tokens.first().cloned().unwrap_or_default();
        if tok.starts_with('?') {
            QueryObject::Node(Node::new(tok))
        } else {
            QueryObject::Str(tok)
        }
    };

    Ok(Query {
        predicate,
        subject,
        object,
    })
}

fn parse_options(text: &str) -> Result<QueryOptions> {
    let mut options = QueryOptions::default();
    let mut rest = text.trim();

    if let Some(after) = rest.strip_prefix("ORDER BY") {
        let after = after.trim_start();
        let (direction, after) = if let Some(a) = after.strip_prefix("ASC") {
            (Some(SortDirection::Asc), a)
        } else if let Some(a) = after.strip_prefix("DESC") {
            (Some(SortDirection::Desc), a)
        } else {
            (None, after)
        };
        let after = after.trim_start();
        let var_end = after.find(char::is_whitespace).unwrap_or(after.len());
        let var = &after[..var_end];
        if !var.starts_with('?') {
            return Err(TranslateError::invalid_input(
                "ORDER BY must name a variable",
                1,
            ));
        }
        options.order_by = Some(Node::new(var));
        // ORDER BY with no ASC/DESC defaults to ascending.
        options.order_direction = Some(direction.unwrap_or(SortDirection::Asc));
        rest = after[var_end..].trim_start();
    }

    if let Some(after) = rest.strip_prefix("LIMIT") {
        let after = after.trim();
        let limit: u64 = after.parse().map_err(|_| {
            TranslateError::invalid_input(format!("LIMIT expects an integer, got `{after}`"), 1)
        })?;
        options.limit = Some(limit);
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chain_with_limit() {
        let text = r#"SELECT ?d WHERE { ?r typeOf ChemicalCompoundDiseaseTreatment . ?r compoundID ?c . ?r diseaseID ?dis . ?dis commonName ?d . ?c drugName "Prednisone" . } LIMIT 100"#;
        let q = parse_sparql(text).unwrap();
        assert_eq!(q.select, vec![Node::new("?d")]);
        assert_eq!(q.patterns.len(), 5);
        assert_eq!(q.options.limit, Some(100));
    }

    #[test]
    fn parses_distinct_and_order_by_default_ascending() {
        let text = "SELECT DISTINCT ?n WHERE { ?n typeOf Place . } ORDER BY ?n";
        let q = parse_sparql(text).unwrap();
        assert!(q.options.distinct);
        assert_eq!(q.options.order_direction, Some(SortDirection::Asc));
    }

    #[test]
    fn parses_object_list_in_parens() {
        let text = "SELECT ?n WHERE { ?n dcid (a, b, c) . }";
        let q = parse_sparql(text).unwrap();
        assert_eq!(
            q.patterns[0].object,
            QueryObject::List(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn rejects_unterminated_braces() {
        let text = "SELECT ?n WHERE { ?n typeOf Place .";
        assert!(parse_sparql(text).is_err());
    }

    #[test]
    fn rejects_non_integer_limit() {
        let text = "SELECT ?n WHERE { ?n typeOf Place . } LIMIT abc";
        assert!(parse_sparql(text).is_err());
    }
}
