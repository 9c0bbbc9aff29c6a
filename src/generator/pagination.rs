use crate::dialect::{Dialect, Pagination};

/// Clauses of one rendered SELECT, assembled last so pagination can rewrite
/// the head, the WHERE clause or the tail.
#[derive(Debug, Default)]
pub(super) struct Statement {
    pub distinct: bool,
    pub projection: String,
    pub from: Option<String>,
    pub where_clause: Option<String>,
    /// WHERE text must be parenthesized before `and` is appended.
    pub where_needs_parens: bool,
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
    /// `first n`, before `distinct`.
    pub first: Option<String>,
    /// `top n`, after `distinct`.
    pub top: Option<String>,
    pub tail: Option<String>,
}

impl Statement {
    pub fn to_sql(&self) -> String {
        let mut parts = vec!["select".to_string()];
        parts.extend(self.first.clone());
        if self.distinct {
            parts.push("distinct".to_string());
        }
        parts.extend(self.top.clone());
        parts.push(self.projection.clone());

        if let Some(from) = &self.from {
            parts.push(format!("from {}", from));
        }
        if let Some(filter) = &self.where_clause {
            parts.push(format!("where {}", filter));
        }
        if let Some(group_by) = &self.group_by {
            parts.push(format!("group by {}", group_by));
        }
        if let Some(having) = &self.having {
            parts.push(format!("having {}", having));
        }
        if let Some(order_by) = &self.order_by {
            parts.push(format!("order by {}", order_by));
        }
        parts.extend(self.tail.clone());
        parts.join(" ")
    }

    /// Apply the dialect's row-limit form, if a limit is set.
    pub fn paginate(mut self, dialect: &Dialect, limit: Option<u64>) -> String {
        let Some(n) = limit else {
            return self.to_sql();
        };
        match dialect.pagination() {
            Some(Pagination::Limit) => self.tail = Some(format!("limit {}", n)),
            Some(Pagination::Top) => self.top = Some(format!("top {}", n)),
            Some(Pagination::First) => self.first = Some(format!("first {}", n)),
            Some(Pagination::FetchFirst) => self.tail = Some(format!("fetch first {} rows only", n)),
            Some(Pagination::RowNum) => {
                let simple = self.order_by.is_none() && self.group_by.is_none() && !self.distinct;
                if !simple {
                    return wrap_rownum(&self.to_sql(), n);
                }
                self.where_clause = Some(match self.where_clause.take() {
                    Some(w) if self.where_needs_parens => format!("({}) and rownum <= {}", w, n),
                    Some(w) => format!("{} and rownum <= {}", w, n),
                    None => format!("rownum <= {}", n),
                });
            }
            None => {
                tracing::warn!(product = %dialect.product, "no pagination clause, row limit ignored");
            }
        }
        self.to_sql()
    }
}

fn wrap_rownum(sql: &str, n: u64) -> String {
    format!("select * from ({}) where rownum <= {}", sql, n)
}

/// Apply the row limit to SQL text the model could not structure.
pub fn paginate_raw(dialect: &Dialect, sql: &str, limit: Option<u64>) -> String {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    let Some(n) = limit else {
        return sql.to_string();
    };
    match dialect.pagination() {
        Some(Pagination::Limit) => format!("{} limit {}", sql, n),
        Some(Pagination::FetchFirst) => format!("{} fetch first {} rows only", sql, n),
        Some(Pagination::Top) => inject_after_select(sql, &format!("top {}", n), true),
        Some(Pagination::First) => inject_after_select(sql, &format!("first {}", n), false),
        Some(Pagination::RowNum) => wrap_rownum(sql, n),
        None => sql.to_string(),
    }
}

/// Insert `modifier` after the leading `select` (and after `distinct` when
/// `after_distinct`). Text not starting with `select` is left alone.
fn inject_after_select(sql: &str, modifier: &str, after_distinct: bool) -> String {
    let lower = sql.to_ascii_lowercase();
    if !lower.starts_with("select") || !sql[6..].starts_with(char::is_whitespace) {
        tracing::warn!("row limit not applied to non-select statement");
        return sql.to_string();
    }
    let rest = sql[6..].trim_start();
    if after_distinct && rest.to_ascii_lowercase().starts_with("distinct ") {
        let body = rest["distinct ".len()..].trim_start();
        return format!("{} distinct {} {}", &sql[..6], modifier, body);
    }
    format!("{} {} {}", &sql[..6], modifier, rest)
}
