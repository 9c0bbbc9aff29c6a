//! SQL text → [`StructuredQuery`].
//!
//! `sqlparser` does the tokenizing and parsing; this module only maps the
//! parts of a SELECT the model can express. Anything else inside an
//! otherwise structured query is kept as raw text and the outcome is marked
//! [`ParseStatus::Partial`]. Statements the model cannot carry at all
//! (set operations, CTEs, DML) become raw-only models with
//! [`ParseStatus::Failed`].
use anyhow::{anyhow, Result};
use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

use super::persist::ParseStatus;
use super::{
    BinaryCondition, BinaryOp, Condition, Expression, Literal, OrderItem, Relation, SelectColumn,
    SelectTable, StructuredQuery,
};

/// Result of converting SQL text.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub query: StructuredQuery,
    pub status: ParseStatus,
}

impl ParseOutcome {
    fn failed(sql: &str, reason: &str) -> Self {
        tracing::debug!(%reason, "keeping statement as raw sql");
        Self {
            query: StructuredQuery::from_raw(sql.trim()),
            status: ParseStatus::Failed,
        }
    }
}

/// Parse one SELECT statement. Syntax errors are returned as errors; valid
/// SQL the model cannot express yields a raw-only outcome.
pub fn parse_select(sql: &str) -> Result<ParseOutcome> {
    let dialect = GenericDialect {};
    let mut statements =
        SqlParser::parse_sql(&dialect, sql).map_err(|e| anyhow!("SQL parse error: {}", e))?;
    if statements.len() != 1 {
        return Err(anyhow!("Expected 1 statement, found {}", statements.len()));
    }

    let sp::Statement::Query(query) = statements.remove(0) else {
        return Ok(ParseOutcome::failed(sql, "not a select statement"));
    };

    let mut converter = Converter::default();
    match converter.query(*query) {
        Ok(query) => Ok(ParseOutcome {
            query,
            status: if converter.partial {
                ParseStatus::Partial
            } else {
                ParseStatus::Structured
            },
        }),
        Err(Unsupported(reason)) => Ok(ParseOutcome::failed(sql, reason)),
    }
}

/// A construct that forces the whole statement to stay raw.
struct Unsupported(&'static str);

type Conv<T> = std::result::Result<T, Unsupported>;

#[derive(Default)]
struct Converter {
    partial: bool,
    derived: usize,
}

impl Converter {
    fn query(&mut self, query: sp::Query) -> Conv<StructuredQuery> {
        if query.with.is_some() {
            return Err(Unsupported("common table expressions"));
        }
        if query.offset.is_some() || query.fetch.is_some() {
            return Err(Unsupported("offset or fetch clause"));
        }
        let sp::SetExpr::Select(select) = *query.body else {
            return Err(Unsupported("set operation or values list"));
        };
        let mut model = self.select(*select)?;

        if let Some(order_by) = query.order_by {
            let items = order_by
                .exprs
                .into_iter()
                .map(|o| {
                    let field = reference_text(&o.expr);
                    match o.asc {
                        Some(false) => OrderItem::desc(field),
                        _ => OrderItem::asc(field),
                    }
                })
                .collect();
            model.set_order_by(items);
        }

        if let Some(limit) = query.limit {
            match limit_value(&limit) {
                Some(n) => model.set_row_limit(Some(n)),
                None => return Err(Unsupported("non-numeric limit")),
            }
        }
        Ok(model)
    }

    fn select(&mut self, select: sp::Select) -> Conv<StructuredQuery> {
        let mut model = StructuredQuery::new();
        match select.distinct {
            None => {}
            Some(sp::Distinct::Distinct) => model.set_distinct(true),
            Some(_) => return Err(Unsupported("distinct on")),
        }
        if select.top.is_some() {
            return Err(Unsupported("top clause"));
        }

        for twj in select.from {
            self.table_with_joins(&mut model, twj)?;
        }

        let only_wildcard =
            select.projection.len() == 1 && matches!(select.projection[0], sp::SelectItem::Wildcard(_));
        if !only_wildcard {
            for item in select.projection {
                model.add_column(self.select_item(item));
            }
        }

        if let Some(selection) = select.selection {
            let filter = self.condition(selection);
            model.combine_filter_by_and(filter);
        }

        match select.group_by {
            sp::GroupByExpr::Expressions(exprs, _) => {
                if !exprs.is_empty() {
                    model.set_group_by(exprs.iter().map(reference_text).collect());
                }
            }
            sp::GroupByExpr::All(_) => return Err(Unsupported("group by all")),
        }
        if let Some(having) = select.having {
            let post = self.condition(having);
            model.set_post_filter(Some(post));
        }
        Ok(model)
    }

    fn table_with_joins(&mut self, model: &mut StructuredQuery, twj: sp::TableWithJoins) -> Conv<()> {
        let mut joined = vec![self.table_factor(model, twj.relation)?];

        for join in twj.joins {
            let alias = self.table_factor(model, join.relation)?;
            let (kind, constraint) = match join.join_operator {
                sp::JoinOperator::Inner(c) => (BinaryOp::Eq, c),
                sp::JoinOperator::LeftOuter(c) => (BinaryOp::LeftOuter, c),
                sp::JoinOperator::RightOuter(c) => (BinaryOp::RightOuter, c),
                sp::JoinOperator::FullOuter(c) => (BinaryOp::FullOuter, c),
                sp::JoinOperator::CrossJoin => (BinaryOp::Eq, sp::JoinConstraint::None),
                _ => return Err(Unsupported("join operator")),
            };
            match constraint {
                sp::JoinConstraint::On(expr) => self.join_predicates(model, &joined, &alias, kind, expr)?,
                sp::JoinConstraint::None => {}
                _ => return Err(Unsupported("using or natural join")),
            }
            joined.push(alias);
        }
        Ok(())
    }

    /// Turn an ON clause into join nodes. Each equality between the new
    /// table and an earlier one becomes a join carrying the join's kind,
    /// oriented so the operator's preserved side matches the SQL.
    fn join_predicates(
        &mut self,
        model: &mut StructuredQuery,
        joined: &[String],
        new_alias: &str,
        kind: BinaryOp,
        on: sp::Expr,
    ) -> Conv<()> {
        let mut conjuncts = Vec::new();
        flatten_and(on, &mut conjuncts);

        for conjunct in conjuncts {
            let condition = self.condition(conjunct);
            let join = match condition {
                Condition::Binary(b) if b.op == BinaryOp::Eq && b.join_tables().is_some() => b,
                other if kind == BinaryOp::Eq => {
                    model.combine_filter_by_and(other);
                    continue;
                }
                _ => return Err(Unsupported("outer join with a non-join predicate")),
            };
            let Some((left, right)) = join.join_tables() else {
                continue;
            };
            let left_is_new = left == new_alias && joined.iter().any(|t| t == right);
            let right_is_new = right == new_alias && joined.iter().any(|t| t == left);
            if !left_is_new && !right_is_new {
                if kind != BinaryOp::Eq {
                    return Err(Unsupported("outer join predicate between earlier tables"));
                }
                model.combine_filter_by_and(Condition::Binary(join));
                continue;
            }
            // `a left join b on b.x = a.x`: the preserved table is on the right
            // of the predicate, so the marker flips.
            let op = match (kind, left_is_new) {
                (BinaryOp::LeftOuter, true) => BinaryOp::RightOuter,
                (BinaryOp::RightOuter, true) => BinaryOp::LeftOuter,
                (op, _) => op,
            };
            model.add_join(BinaryCondition { op, ..join }, Relation::And);
        }
        Ok(())
    }

    /// Add a FROM item and return its alias.
    fn table_factor(&mut self, model: &mut StructuredQuery, factor: sp::TableFactor) -> Conv<String> {
        let table = match factor {
            sp::TableFactor::Table { name, alias, .. } => {
                let mut parts: Vec<String> = name.0.into_iter().map(|p| p.value).collect();
                let Some(table_name) = parts.pop() else {
                    return Err(Unsupported("empty table name"));
                };
                let alias = alias.map(|a| a.name.value).unwrap_or_else(|| table_name.clone());
                let mut table = SelectTable::named(alias, table_name);
                if let Some(schema) = parts.pop() {
                    table = table.with_schema(schema);
                }
                if let Some(catalog) = parts.pop() {
                    table = table.with_catalog(catalog);
                }
                table
            }
            sp::TableFactor::Derived {
                lateral: false,
                subquery,
                alias,
                ..
            } => {
                self.derived += 1;
                let alias = alias
                    .map(|a| a.name.value)
                    .unwrap_or_else(|| format!("subquery_{}", self.derived));
                SelectTable::subquery(alias, self.query(*subquery)?)
            }
            _ => return Err(Unsupported("table factor")),
        };
        Ok(model.add_table(table).alias.clone())
    }

    fn select_item(&mut self, item: sp::SelectItem) -> SelectColumn {
        match item {
            sp::SelectItem::UnnamedExpr(expr) => column_for(&expr),
            sp::SelectItem::ExprWithAlias { expr, alias } => column_for(&expr).with_alias(alias.value),
            sp::SelectItem::Wildcard(_) => SelectColumn::field("*"),
            sp::SelectItem::QualifiedWildcard(name, _) => SelectColumn::field(format!("{}.*", name)),
        }
    }

    fn condition(&mut self, expr: sp::Expr) -> Condition {
        match expr {
            sp::Expr::BinaryOp {
                left,
                op: op @ (sp::BinaryOperator::And | sp::BinaryOperator::Or),
                right,
            } => {
                let relation = if op == sp::BinaryOperator::And {
                    Relation::And
                } else {
                    Relation::Or
                };
                let left = self.condition(*left);
                let right = self.condition(*right);
                left.combine(relation, right)
            }
            sp::Expr::Nested(inner) => self.condition(*inner).group(),
            sp::Expr::BinaryOp { left, op, right } => match comparison(&op) {
                Some((op, negated)) => {
                    let node = Condition::binary(self.operand(*left), op, self.operand(*right));
                    if negated {
                        node.not()
                    } else {
                        node
                    }
                }
                None => self.raw_predicate(sp::Expr::BinaryOp { left, op, right }),
            },
            sp::Expr::IsNull(inner) => Condition::is_null(self.operand(*inner)),
            sp::Expr::IsNotNull(inner) => Condition::is_null(self.operand(*inner)).not(),
            sp::Expr::Like {
                negated,
                expr,
                pattern,
                escape_char: None,
                ..
            } => {
                let node = Condition::binary(self.operand(*expr), BinaryOp::Like, self.operand(*pattern));
                if negated {
                    node.not()
                } else {
                    node
                }
            }
            sp::Expr::InList { expr, list, negated } => {
                let literals: Option<Vec<Literal>> = list.iter().map(literal_of).collect();
                let right = match literals {
                    Some(items) => Expression::list(items),
                    None => {
                        self.partial = true;
                        let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                        Expression::raw(format!("({})", items.join(", ")))
                    }
                };
                let node = Condition::binary(self.operand(*expr), BinaryOp::In, right);
                if negated {
                    node.not()
                } else {
                    node
                }
            }
            sp::Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let right = self.subquery(*subquery);
                let node = Condition::binary(self.operand(*expr), BinaryOp::In, right);
                if negated {
                    node.not()
                } else {
                    node
                }
            }
            sp::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let node = Condition::between(self.operand(*expr), self.operand(*low), self.operand(*high));
                if negated {
                    node.not()
                } else {
                    node
                }
            }
            sp::Expr::Exists { subquery, negated } => {
                let node = match self.subquery(*subquery) {
                    Expression::Subquery(sub) => Condition::exists(*sub),
                    raw => Condition::predicate(format!("exists {}", raw_text(&raw))),
                };
                if negated {
                    node.not()
                } else {
                    node
                }
            }
            sp::Expr::UnaryOp {
                op: sp::UnaryOperator::Not,
                expr,
            } => {
                if is_connective(&expr) {
                    return self.raw_predicate(sp::Expr::UnaryOp {
                        op: sp::UnaryOperator::Not,
                        expr,
                    });
                }
                self.condition(*expr).not()
            }
            other => self.raw_predicate(other),
        }
    }

    fn raw_predicate(&mut self, expr: sp::Expr) -> Condition {
        self.partial = true;
        Condition::predicate(expr.to_string())
    }

    fn operand(&mut self, expr: sp::Expr) -> Expression {
        if let Some(lit) = literal_of(&expr) {
            return Expression::Literal(lit);
        }
        match expr {
            sp::Expr::Identifier(_) | sp::Expr::CompoundIdentifier(_) => Expression::field(reference_text(&expr)),
            sp::Expr::Subquery(q) => self.subquery(*q),
            sp::Expr::Nested(inner) if matches!(*inner, sp::Expr::Subquery(_)) => self.operand(*inner),
            other => Expression::raw(other.to_string()),
        }
    }

    fn subquery(&mut self, query: sp::Query) -> Expression {
        let text = query.to_string();
        match self.query(query) {
            Ok(sub) => Expression::Subquery(Box::new(sub)),
            Err(_) => {
                self.partial = true;
                Expression::raw(format!("({})", text))
            }
        }
    }
}

fn is_connective(expr: &sp::Expr) -> bool {
    match expr {
        sp::Expr::BinaryOp {
            op: sp::BinaryOperator::And | sp::BinaryOperator::Or,
            ..
        } => true,
        sp::Expr::Nested(inner) => is_connective(inner),
        _ => false,
    }
}

fn raw_text(expr: &Expression) -> &str {
    match expr {
        Expression::Raw(text) => text,
        _ => "",
    }
}

fn flatten_and(expr: sp::Expr, out: &mut Vec<sp::Expr>) {
    match expr {
        sp::Expr::BinaryOp {
            left,
            op: sp::BinaryOperator::And,
            right,
        } => {
            flatten_and(*left, out);
            flatten_and(*right, out);
        }
        sp::Expr::Nested(inner) if matches!(*inner, sp::Expr::BinaryOp { op: sp::BinaryOperator::And, .. }) => {
            flatten_and(*inner, out)
        }
        other => out.push(other),
    }
}

fn comparison(op: &sp::BinaryOperator) -> Option<(BinaryOp, bool)> {
    Some(match op {
        sp::BinaryOperator::Eq => (BinaryOp::Eq, false),
        sp::BinaryOperator::NotEq => (BinaryOp::NotEq, false),
        sp::BinaryOperator::Lt => (BinaryOp::Lt, false),
        sp::BinaryOperator::LtEq => (BinaryOp::LtEq, false),
        sp::BinaryOperator::Gt => (BinaryOp::Gt, false),
        sp::BinaryOperator::GtEq => (BinaryOp::GtEq, false),
        _ => return None,
    })
}

/// Identifier paths keep their dotted form; anything else is its SQL text.
fn reference_text(expr: &sp::Expr) -> String {
    match expr {
        sp::Expr::Identifier(ident) => ident.value.clone(),
        sp::Expr::CompoundIdentifier(parts) => parts
            .iter()
            .map(|p| p.value.as_str())
            .collect::<Vec<_>>()
            .join("."),
        other => other.to_string(),
    }
}

fn column_for(expr: &sp::Expr) -> SelectColumn {
    match expr {
        sp::Expr::Identifier(_) | sp::Expr::CompoundIdentifier(_) => SelectColumn::field(reference_text(expr)),
        other => SelectColumn::expression(other.to_string()),
    }
}

fn literal_of(expr: &sp::Expr) -> Option<Literal> {
    match expr {
        sp::Expr::Value(value) => match value {
            sp::Value::Null => Some(Literal::Null),
            sp::Value::Boolean(b) => Some(Literal::Boolean(*b)),
            sp::Value::SingleQuotedString(s) => Some(Literal::String(s.clone())),
            sp::Value::Number(n, _) => n
                .parse::<i64>()
                .map(Literal::Integer)
                .ok()
                .or_else(|| n.parse::<f64>().ok().map(Literal::Float)),
            _ => None,
        },
        sp::Expr::UnaryOp {
            op: sp::UnaryOperator::Minus,
            expr,
        } => match literal_of(expr)? {
            Literal::Integer(i) => Some(Literal::Integer(-i)),
            Literal::Float(f) => Some(Literal::Float(-f)),
            _ => None,
        },
        _ => None,
    }
}

fn limit_value(expr: &sp::Expr) -> Option<u64> {
    match expr {
        sp::Expr::Value(sp::Value::Number(n, _)) => n.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, Product};
    use crate::generator::{RenderOptions, SqlGenerator};

    fn render_pg(query: &StructuredQuery) -> String {
        let dialect = Dialect::for_product(Product::PostgreSql);
        SqlGenerator::new(&dialect, RenderOptions::default()).render(query)
    }

    #[test]
    fn test_parse_simple_select() {
        let outcome = parse_select("SELECT o.id, c.name FROM orders o, customers c WHERE o.customer_id = c.id").unwrap();
        assert_eq!(outcome.status, ParseStatus::Structured);
        let q = &outcome.query;
        assert_eq!(q.tables().len(), 2);
        assert_eq!(q.selection().len(), 2);
        assert_eq!(
            render_pg(q),
            "select o.id, c.name from orders o inner join customers c on o.customer_id = c.id"
        );
    }

    #[test]
    fn test_parse_left_join_becomes_outer_marker() {
        let outcome =
            parse_select("select o.id from orders o left join customers c on c.id = o.customer_id").unwrap();
        assert_eq!(outcome.status, ParseStatus::Structured);
        assert_eq!(
            render_pg(&outcome.query),
            "select o.id from orders o left outer join customers c on c.id = o.customer_id"
        );
    }

    #[test]
    fn test_parse_inner_join_extra_predicate_goes_to_filter() {
        let outcome = parse_select(
            "select * from orders o join customers c on o.customer_id = c.id and c.active = true",
        )
        .unwrap();
        assert_eq!(outcome.status, ParseStatus::Structured);
        assert_eq!(
            render_pg(&outcome.query),
            "select * from orders o inner join customers c on o.customer_id = c.id where c.active = true"
        );
    }

    #[test]
    fn test_parse_clauses() {
        let outcome = parse_select(
            "select distinct o.region, sum(o.total) as total from sales.orders o \
             where o.status in ('open', 'held') and not o.id between 1 and 5 \
             group by o.region having sum(o.total) > 10 order by total desc limit 20",
        )
        .unwrap();
        assert_eq!(outcome.status, ParseStatus::Structured);
        let q = &outcome.query;
        assert!(q.is_distinct());
        assert_eq!(q.tables()[0].schema.as_deref(), Some("sales"));
        assert_eq!(q.group_by(), Some(&["o.region".to_string()][..]));
        assert!(q.post_filter().is_some());
        assert_eq!(q.order_by().len(), 1);
        assert_eq!(q.hint_scope(None).row_limit(), Some(20));
    }

    #[test]
    fn test_parse_unsupported_is_raw() {
        let union = parse_select("select a from t union select b from u").unwrap();
        assert_eq!(union.status, ParseStatus::Failed);
        assert!(union.query.is_raw_only());

        let insert = parse_select("insert into t values (1)").unwrap();
        assert_eq!(insert.status, ParseStatus::Failed);

        assert!(parse_select("selec * fro t").is_err());
    }

    #[test]
    fn test_parse_raw_fallback_marks_partial() {
        let outcome = parse_select("select o.id from orders o where o.total * 2 > o.limit_value or o.flag").unwrap();
        assert_eq!(outcome.status, ParseStatus::Partial);
    }

    #[test]
    fn test_parse_derived_table() {
        let outcome = parse_select(
            "select s.customer_id from (select o.customer_id from orders o) s",
        )
        .unwrap();
        assert_eq!(outcome.status, ParseStatus::Structured);
        let table = &outcome.query.tables()[0];
        assert_eq!(table.alias, "s");
        assert!(table.subquery_model().is_some());
    }
}
