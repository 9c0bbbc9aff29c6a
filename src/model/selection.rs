use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::types::split_path;

/// One projected column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectColumn {
    /// Field path (`o.id`) or free expression text (`count(o.id)`).
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    #[serde(default)]
    pub is_expression: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SelectColumn {
    pub fn field(path: impl Into<String>) -> Self {
        Self {
            column: path.into(),
            alias: None,
            declared_type: None,
            is_expression: false,
            description: None,
        }
    }

    pub fn expression(text: impl Into<String>) -> Self {
        Self {
            is_expression: true,
            ..Self::field(text)
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }

    /// Name the column would carry in a result set without an alias.
    pub fn natural_name(&self) -> Option<&str> {
        if self.is_expression {
            None
        } else {
            Some(split_path(&self.column).1)
        }
    }
}

/// Ordered projection list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection {
    pub columns: Vec<SelectColumn>,
}

impl Selection {
    pub fn new(columns: Vec<SelectColumn>) -> Self {
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SelectColumn> {
        self.columns.iter()
    }

    /// Output names of every column, in order.
    ///
    /// Explicit aliases win; unaliased expressions become `exp_1`, `exp_2`, ...;
    /// fields keep their column name. Names are cut to `max_len` characters and
    /// case-insensitive duplicates get a `_<n>` suffix that still fits.
    pub fn resolve_aliases(&self, max_len: usize) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut expr_counter = 0;
        let mut out = Vec::with_capacity(self.columns.len());

        for col in &self.columns {
            let base = match (&col.alias, col.natural_name()) {
                (Some(alias), _) => alias.clone(),
                (None, Some(name)) => name.to_string(),
                (None, None) => {
                    expr_counter += 1;
                    format!("exp_{}", expr_counter)
                }
            };
            let base = truncate_chars(&base, max_len);
            let mut candidate = base.clone();
            let mut n = 1;
            while !seen.insert(candidate.to_lowercase()) {
                let suffix = format!("_{}", n);
                let room = max_len.saturating_sub(suffix.chars().count());
                candidate = format!("{}{}", truncate_chars(&base, room), suffix);
                n += 1;
            }
            out.push(candidate);
        }
        out
    }

    /// 1-based position of the column matching `reference` by path, alias,
    /// or resolved output name.
    pub fn ordinal_of(&self, reference: &str, resolved: &[String]) -> Option<usize> {
        let target = reference.trim();
        self.columns
            .iter()
            .position(|c| c.column == target)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(target)))
            })
            .or_else(|| resolved.iter().position(|a| a.eq_ignore_ascii_case(target)))
            .map(|i| i + 1)
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_aliases_fallbacks() {
        let sel = Selection::new(vec![
            SelectColumn::field("o.id"),
            SelectColumn::expression("count(*)"),
            SelectColumn::expression("max(o.total)").with_alias("top_total"),
            SelectColumn::expression("min(o.total)"),
        ]);
        assert_eq!(sel.resolve_aliases(30), vec!["id", "exp_1", "top_total", "exp_2"]);
    }

    #[test]
    fn test_resolve_aliases_dedupes_case_insensitive() {
        let sel = Selection::new(vec![
            SelectColumn::field("o.id"),
            SelectColumn::field("c.id"),
            SelectColumn::field("p.ID"),
        ]);
        assert_eq!(sel.resolve_aliases(30), vec!["id", "id_1", "ID_2"]);
    }

    #[test]
    fn test_resolve_aliases_respects_length() {
        let long = "a".repeat(40);
        let sel = Selection::new(vec![
            SelectColumn::field(format!("t.{}", long)),
            SelectColumn::field(format!("u.{}", long)),
        ]);
        let aliases = sel.resolve_aliases(30);
        assert!(aliases.iter().all(|a| a.chars().count() <= 30));
        assert_ne!(aliases[0], aliases[1]);
        assert!(aliases[1].ends_with("_1"));
    }

    #[test]
    fn test_ordinal_of() {
        let sel = Selection::new(vec![
            SelectColumn::field("o.region"),
            SelectColumn::expression("sum(o.total)").with_alias("total"),
        ]);
        let resolved = sel.resolve_aliases(30);
        assert_eq!(sel.ordinal_of("o.region", &resolved), Some(1));
        assert_eq!(sel.ordinal_of("TOTAL", &resolved), Some(2));
        assert_eq!(sel.ordinal_of("sum(o.total)", &resolved), Some(2));
        assert_eq!(sel.ordinal_of("o.missing", &resolved), None);
    }
}
