//! The Datalog-flavored query parser:
//! `SELECT var₁ … varₙ, pattern₁, pattern₂, …`.

use tracing::instrument;

use super::lexer::{split_top_level, tokenize};
use super::model::{Node, ParsedQuery, Query, QueryObject};
use crate::error::{Result, TranslateError};

#[instrument(skip(text))]
pub fn parse_datalog(text: &str) -> Result<ParsedQuery> {
    validate_quotes(text)?;

    let statements = split_top_level(text, ',');
    let mut statements = statements.into_iter().map(|s| s.trim().to_string());

    let Some(select_stmt) = statements.next() else {
        return Err(TranslateError::invalid_input(
            "empty query, expected a SELECT clause",
            1,
        ));
    };
    let Some(vars_text) = select_stmt.strip_prefix("SELECT") else {
        return Err(TranslateError::invalid_input(
            format!("missing required SELECT clause in `{select_stmt}`"),
            1,
        ));
    };
    let select: Vec<Node> = tokenize(vars_text).into_iter().map(Node::new).collect();
    if select.is_empty() {
        return Err(TranslateError::invalid_input(
            "SELECT clause names no variables",
            1,
        ));
    }

    let mut patterns = Vec::new();
    for (i, stmt) in statements.enumerate() {
        let line_no = (i + 2) as u32;
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        patterns.push(parse_pattern(stmt, line_no)?);
    }

    Ok(ParsedQuery {
        select,
        patterns,
        options: Default::default(),
    })
}

fn parse_pattern(stmt: &str, line_no: u32) -> Result<Query> {
    let tokens = tokenize(stmt);
    if tokens.len() < 3 {
        return Err(TranslateError::invalid_input(
            format!("pattern `{stmt}` needs at least `pred subject object`"),
            line_no,
        ));
    }
    let predicate = tokens[0].clone();
    let subject_tok = &tokens[1];
    if !subject_tok.starts_with('?') {
        return Err(TranslateError::invalid_input(
            format!("pattern `{stmt}` subject `{subject_tok}` is not a node"),
            line_no,
        ));
    }
    let subject = Node::new(subject_tok.clone());

    let object_tokens = &tokens[2..];
    let object = if object_tokens.len() == 1 {
        let tok = &object_tokens[0];
        if tok.starts_with('?') {
            QueryObject::Node(Node::new(tok.clone()))
        } else {
            QueryObject::Str(tok.clone())
        }
    } else {
        QueryObject::List(object_tokens.to_vec())
    };

    Ok(Query {
        predicate,
        subject,
        object,
    })
}

fn validate_quotes(text: &str) -> Result<()> {
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes => {
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            _ => {}
        }
    }
    if in_quotes {
        return Err(TranslateError::invalid_input("unpaired quote in query", 1));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_select_with_patterns() {
        let q = parse_datalog(
            "SELECT ?node, typeOf ?node Place, subType ?node City, dcid ?node ?node",
        )
        .unwrap();
        assert_eq!(q.select, vec![Node::new("?node")]);
        assert_eq!(q.patterns.len(), 3);
        assert_eq!(q.patterns[0].predicate, "typeOf");
        assert_eq!(q.patterns[0].object, QueryObject::Str("Place".to_string()));
        assert_eq!(
            q.patterns[2].object,
            QueryObject::Node(Node::new("?node"))
        );
    }

    #[test]
    fn parses_multi_token_object_as_list() {
        let q = parse_datalog("SELECT ?n, dcid ?n a b c").unwrap();
        assert_eq!(
            q.patterns[0].object,
            QueryObject::List(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn honors_quoted_literal_with_spaces_and_commas() {
        let q = parse_datalog(r#"SELECT ?n, name ?n "San Jose, CA""#).unwrap();
        assert_eq!(
            q.patterns[0].object,
            QueryObject::Str("San Jose, CA".to_string())
        );
    }

    #[test]
    fn rejects_unpaired_quote() {
        assert!(parse_datalog(r#"SELECT ?n, name ?n "unterminated"#).is_err());
    }

    #[test]
    fn rejects_missing_select_clause() {
        assert!(parse_datalog("typeOf ?n Place").is_err());
    }
}
