//! Expression and free-text rendering.

use super::Pass;
use crate::model::{split_path, Expression, Literal, StructuredQuery};

impl Pass<'_> {
    pub(super) fn render_expression(&self, expr: &Expression) -> String {
        match expr {
            Expression::Field(path) => self.render_reference(path),
            Expression::Literal(lit) => self.render_literal(lit),
            Expression::Raw(text) => self.render_text(text),
            Expression::Parameter(name) => format!("${{{}}}", name),
            Expression::Subquery(q) => format!("({})", self.render_subquery(q)),
        }
    }

    pub(super) fn render_literal(&self, lit: &Literal) -> String {
        match lit {
            Literal::Null => "null".to_string(),
            Literal::Boolean(b) => self.dialect().boolean_literal(*b).to_string(),
            Literal::Integer(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::String(s) => quote_string(s),
            Literal::List(items) => {
                let rendered: Vec<String> = items.iter().map(|i| self.render_literal(i)).collect();
                format!("({})", rendered.join(", "))
            }
        }
    }

    /// Field path when it looks like one, free text otherwise.
    pub(super) fn render_reference(&self, text: &str) -> String {
        if is_path(text) {
            self.render_field(text)
        } else {
            self.render_text(text)
        }
    }

    /// Resolve `alias.column` against the model's tables.
    ///
    /// Columns of a subquery table are renamed to the subquery's own output
    /// alias. Unknown qualifiers are emitted verbatim.
    pub(super) fn render_field(&self, path: &str) -> String {
        let d = self.dialect();
        match split_path(path) {
            (Some(qualifier), column) => match self.query.table(qualifier) {
                Some(table) => {
                    let column = match table.subquery_model() {
                        Some(sub) => subquery_output(sub, column, d.max_identifier_length)
                            .unwrap_or_else(|| column.to_string()),
                        None => column.to_string(),
                    };
                    format!(
                        "{}.{}",
                        d.quote_identifier(self.aliases.get(qualifier)),
                        d.quote_path(&column)
                    )
                }
                None => {
                    tracing::debug!(%path, "unresolved table qualifier");
                    path.to_string()
                }
            },
            (None, column) => d.quote_path(column),
        }
    }

    /// Rewrite free SQL text token by token.
    ///
    /// Qualified identifiers are resolved like fields, aggregate and date
    /// functions are mapped through the dialect's templates. String literals,
    /// quoted identifiers, `${param}` markers and `(select ...)` spans are
    /// copied untouched.
    pub(super) fn render_text(&self, text: &str) -> String {
        let d = self.dialect();
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == '\'' {
                let end = scan_quoted(&chars, i, '\'');
                out.extend(&chars[i..end]);
                i = end;
            } else if c == '"' || c == '`' || c == d.quote.0 {
                let close = if c == d.quote.0 { d.quote.1 } else { c };
                let end = scan_quoted(&chars, i, close);
                out.extend(&chars[i..end]);
                i = end;
            } else if c == '$' && chars.get(i + 1) == Some(&'{') {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '}')
                    .map(|p| i + p + 1)
                    .unwrap_or(chars.len());
                out.extend(&chars[i..end]);
                i = end;
            } else if c == '(' && starts_subquery(&chars, i) {
                let end = matching_paren(&chars, i).unwrap_or(chars.len());
                out.extend(&chars[i..end]);
                i = end;
            } else if c.is_alphabetic() || c == '_' {
                let end = scan_word(&chars, i);
                let word: String = chars[i..end].iter().collect();
                let after = skip_whitespace(&chars, end);
                if chars.get(after) == Some(&'(') {
                    if let Some(rendered) = self.render_function(&word, &chars, after) {
                        out.push_str(&rendered.0);
                        i = rendered.1;
                        continue;
                    }
                    out.push_str(&word);
                } else {
                    out.push_str(&self.render_word(&word));
                }
                i = end;
            } else if c.is_ascii_digit() {
                let end = scan_word(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            } else {
                out.push(c);
                i += 1;
            }
        }
        out
    }

    /// Apply a dialect function template to `name(...)` starting at `open`.
    /// Returns the text and the index after the closing paren.
    fn render_function(&self, name: &str, chars: &[char], open: usize) -> Option<(String, usize)> {
        let template = self.dialect().function_template(name)?;
        let end = matching_paren(chars, open)?;
        let inner: String = chars[open + 1..end - 1].iter().collect();
        let args = split_arguments(&inner);
        if template_arity(template) != args.len() {
            return None;
        }
        let mut rendered = template.to_string();
        for (idx, arg) in args.iter().enumerate() {
            rendered = rendered.replace(&format!("{{{}}}", idx), &self.render_text(arg.trim()));
        }
        Some((rendered, end))
    }

    fn render_word(&self, word: &str) -> String {
        match split_path(word) {
            (Some(qualifier), _) if self.query.has_table(qualifier) => self.render_field(word),
            _ => word.to_string(),
        }
    }
}

/// Output name of `column` in a subquery's projection.
fn subquery_output(sub: &StructuredQuery, column: &str, max_len: usize) -> Option<String> {
    let names = sub.selection().resolve_aliases(max_len);
    if let Some(name) = names.iter().find(|n| n.eq_ignore_ascii_case(column)) {
        return Some(name.clone());
    }
    sub.selection()
        .iter()
        .position(|c| c.column == column || c.natural_name().is_some_and(|n| n.eq_ignore_ascii_case(column)))
        .and_then(|idx| names.get(idx).cloned())
}

pub(super) fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Plain dotted identifier path (`o.customer_id`, `name`, `o.*`).
pub(super) fn is_path(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '#' | '.' | '*'))
        && !text.starts_with(|c: char| c.is_ascii_digit())
}

fn scan_quoted(chars: &[char], start: usize, close: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == close {
            if chars.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn scan_word(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '#' | '.')) {
        i += 1;
    }
    i
}

fn skip_whitespace(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn starts_subquery(chars: &[char], open: usize) -> bool {
    let start = skip_whitespace(chars, open + 1);
    let word: String = chars[start..scan_word(chars, start)].iter().collect();
    word.eq_ignore_ascii_case("select") || word.eq_ignore_ascii_case("with")
}

/// Index just past the paren matching the one at `open`.
pub(super) fn matching_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\'' => {
                i = scan_quoted(chars, i, '\'');
                continue;
            }
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split function arguments on top-level commas.
fn split_arguments(inner: &str) -> Vec<String> {
    if inner.trim().is_empty() {
        return vec![];
    }
    let chars: Vec<char> = inner.chars().collect();
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\'' => {
                let end = scan_quoted(&chars, i, '\'');
                current.extend(&chars[i..end]);
                i = end;
                continue;
            }
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(std::mem::take(&mut current));
                i += 1;
                continue;
            }
            _ => {}
        }
        current.push(chars[i]);
        i += 1;
    }
    args.push(current);
    args
}

fn template_arity(template: &str) -> usize {
    (0..10)
        .take_while(|n| template.contains(&format!("{{{}}}", n)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_arguments() {
        assert_eq!(split_arguments("a, b"), vec!["a", " b"]);
        assert_eq!(split_arguments("f(a, b), 'x,y'"), vec!["f(a, b)", " 'x,y'"]);
        assert!(split_arguments("  ").is_empty());
    }

    #[test]
    fn test_matching_paren_skips_strings() {
        let chars: Vec<char> = "(a, ')', (b)) tail".chars().collect();
        assert_eq!(matching_paren(&chars, 0), Some(13));
        let open: Vec<char> = "(a".chars().collect();
        assert_eq!(matching_paren(&open, 0), None);
    }

    #[test]
    fn test_template_arity() {
        assert_eq!(template_arity("count(distinct {0})"), 1);
        assert_eq!(template_arity("datediff({0}, {1})"), 2);
        assert_eq!(template_arity("now()"), 0);
    }

    #[test]
    fn test_is_path() {
        assert!(is_path("o.customer_id"));
        assert!(is_path("o.*"));
        assert!(!is_path("count(*)"));
        assert!(!is_path("1.5"));
        assert!(!is_path("a + b"));
    }
}
