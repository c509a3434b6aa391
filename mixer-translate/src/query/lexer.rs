//! Quote- and escape-aware tokenizing shared by both query parsers: whitespace separates
//! tokens within a statement except inside double-quoted strings, where commas and
//! whitespace are literal. A backslash preceded by another backslash is a literal; a
//! quote preceded by a backslash is a literal.

/// Splits `text` on `sep` wherever `sep` is not inside a double-quoted string.
pub fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes => {
                current.push('\\');
                if let Some(&next) = chars.peek() {
                    current.push(next);
                    chars.next();
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c == sep && !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Splits one statement into whitespace-separated tokens, honoring quoted strings as
/// single tokens with surrounding quotes stripped and escapes resolved.
pub fn tokenize(statement: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = statement.chars().peekable();
    let mut had_token = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes => {
                if let Some(&next) = chars.peek() {
                    if next == '"' || next == '\\' {
                        current.push(next);
                        chars.next();
                        continue;
                    }
                }
                current.push(c);
            }
            '"' => {
                in_quotes = !in_quotes;
                had_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if had_token {
                    tokens.push(std::mem::take(&mut current));
                    had_token = false;
                }
            }
            c => {
                current.push(c);
                had_token = true;
            }
        }
    }
    if had_token {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_comma_only() {
        let parts = split_top_level(r#"SELECT ?a, name ?a "San Jose, CA""#, ',');
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].trim(), r#"name ?a "San Jose, CA""#);
    }

    #[test]
    fn tokenizes_quoted_strings_as_one_token() {
        let tokens = tokenize(r#"name ?node "San Jose, CA""#);
        assert_eq!(tokens, vec!["name", "?node", "San Jose, CA"]);
    }

    #[test]
    fn resolves_escapes_inside_quotes() {
        let tokens = tokenize(r#"name ?node "Say \"hi\"""#);
        assert_eq!(tokens, vec!["name", "?node", r#"Say "hi""#]);
    }
}
