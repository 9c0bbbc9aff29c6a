//! Leaf types of the structured SQL model.
//!
//! Everything here is plain data: expressions, operators, table references,
//! ordering items and hints. The condition tree lives in
//! [`condition`](super::condition), the owning query in [`query`](super::query).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::query::StructuredQuery;

/// Literal values in SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Value list, used as the right-hand side of `in`.
    List(Vec<Literal>),
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    pub fn is_empty_string(&self) -> bool {
        matches!(self, Literal::String(s) if s.is_empty())
    }
}

/// Scalar expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expression {
    /// Column reference: `table.column` or a bare column/alias.
    Field(String),
    Literal(Literal),
    /// Free SQL text, quoted token-wise at render time.
    Raw(String),
    /// Named runtime parameter, rendered as `${name}` and bound at execution.
    Parameter(String),
    /// Nested query: `(select ...)`.
    Subquery(Box<StructuredQuery>),
}

impl Expression {
    pub fn field(path: impl Into<String>) -> Self {
        Expression::Field(path.into())
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Expression::Raw(text.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expression::Parameter(name.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    pub fn int(value: i64) -> Self {
        Expression::Literal(Literal::Integer(value))
    }

    pub fn list(values: Vec<Literal>) -> Self {
        Expression::Literal(Literal::List(values))
    }

    /// Table qualifier of a `Field` path, if any.
    pub fn qualifier(&self) -> Option<&str> {
        match self {
            Expression::Field(path) => split_path(path).0,
            _ => None,
        }
    }
}

/// Split a dotted field path into `(qualifier, column)`.
///
/// Only the first dot separates the qualifier; the rest belongs to the column.
pub fn split_path(path: &str) -> (Option<&str>, &str) {
    match path.split_once('.') {
        Some((table, column)) if !table.is_empty() && !column.is_empty() => (Some(table), column),
        _ => (None, path),
    }
}

/// Boolean connective of a condition set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    And,
    Or,
}

impl Relation {
    pub fn keyword(self) -> &'static str {
        match self {
            Relation::And => "and",
            Relation::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Exists,
    IsNull,
    /// Opaque boolean expression (`Raw` text or a field).
    Predicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    In,
    /// `*=`: left side preserved.
    LeftOuter,
    /// `=*`: right side preserved.
    RightOuter,
    /// `*=*`
    FullOuter,
}

impl BinaryOp {
    /// Operator text as written in a filter clause. Outer-join markers
    /// collapse to `=`; their semantics live in the FROM clause.
    pub fn sql(self) -> &'static str {
        match self {
            BinaryOp::Eq | BinaryOp::LeftOuter | BinaryOp::RightOuter | BinaryOp::FullOuter => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Like => "like",
            BinaryOp::In => "in",
        }
    }

    /// Legacy marker notation, used by `Display` and the CLI.
    pub fn marker(self) -> &'static str {
        match self {
            BinaryOp::LeftOuter => "*=",
            BinaryOp::RightOuter => "=*",
            BinaryOp::FullOuter => "*=*",
            other => other.sql(),
        }
    }

    /// Join semantics of this operator, when it can form a join.
    pub fn join_kind(self) -> Option<JoinKind> {
        match self {
            BinaryOp::Eq => Some(JoinKind::Inner),
            BinaryOp::LeftOuter => Some(JoinKind::LeftOuter),
            BinaryOp::RightOuter => Some(JoinKind::RightOuter),
            BinaryOp::FullOuter => Some(JoinKind::FullOuter),
            _ => None,
        }
    }

    pub fn from_join_kind(kind: JoinKind) -> Self {
        match kind {
            JoinKind::Inner => BinaryOp::Eq,
            JoinKind::LeftOuter => BinaryOp::LeftOuter,
            JoinKind::RightOuter => BinaryOp::RightOuter,
            JoinKind::FullOuter => BinaryOp::FullOuter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrinaryOp {
    Between,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "inner join",
            JoinKind::LeftOuter => "left outer join",
            JoinKind::RightOuter => "right outer join",
            JoinKind::FullOuter => "full outer join",
        }
    }

    pub fn is_outer(self) -> bool {
        self != JoinKind::Inner
    }

    /// Same join seen from the other table.
    pub fn flipped(self) -> Self {
        match self {
            JoinKind::LeftOuter => JoinKind::RightOuter,
            JoinKind::RightOuter => JoinKind::LeftOuter,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderItem {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// What a FROM entry reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TableSource {
    /// Table name, possibly dotted.
    Named(String),
    /// Subquery-as-table.
    Subquery(Box<StructuredQuery>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectTable {
    pub alias: String,
    pub source: TableSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl SelectTable {
    pub fn named(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            source: TableSource::Named(name.into()),
            catalog: None,
            schema: None,
        }
    }

    pub fn subquery(alias: impl Into<String>, query: StructuredQuery) -> Self {
        Self {
            alias: alias.into(),
            source: TableSource::Subquery(Box::new(query)),
            catalog: None,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        match &self.source {
            TableSource::Named(name) => Some(name),
            TableSource::Subquery(_) => None,
        }
    }

    pub fn subquery_model(&self) -> Option<&StructuredQuery> {
        match &self.source {
            TableSource::Subquery(q) => Some(q),
            TableSource::Named(_) => None,
        }
    }
}

/// Hint keys understood by the generator and the execution engine.
pub mod hint {
    /// Maximum number of rows to return; drives pagination.
    pub const OUTPUT_ROW_LIMIT: &str = "output_row_limit";
    /// Query text does not depend on runtime parameters.
    pub const STATIC: &str = "static";
    /// Statement may be prepared once and reused.
    pub const CACHEABLE: &str = "cacheable";

    /// Hints a subquery inherits from its enclosing query.
    pub const INHERITED: &[&str] = &[STATIC, CACHEABLE];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HintValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl HintValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HintValue::Bool(b) => Some(*b),
            HintValue::Text(s) => s.parse().ok(),
            HintValue::Int(i) => Some(*i != 0),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HintValue::Int(i) => Some(*i),
            HintValue::Text(s) => s.trim().parse().ok(),
            HintValue::Bool(_) => None,
        }
    }
}

impl From<bool> for HintValue {
    fn from(value: bool) -> Self {
        HintValue::Bool(value)
    }
}

impl From<i64> for HintValue {
    fn from(value: i64) -> Self {
        HintValue::Int(value)
    }
}

impl From<&str> for HintValue {
    fn from(value: &str) -> Self {
        HintValue::Text(value.to_string())
    }
}

pub type Hints = BTreeMap<String, HintValue>;

/// Hint lookup chain from a (sub)query up to its enclosing queries.
///
/// Parent links are shared borrows, so a scope can read an enclosing query's
/// hints but never mutate them.
#[derive(Debug, Clone, Copy)]
pub struct HintScope<'a> {
    hints: &'a Hints,
    parent: Option<&'a HintScope<'a>>,
}

impl<'a> HintScope<'a> {
    pub fn new(hints: &'a Hints, parent: Option<&'a HintScope<'a>>) -> Self {
        Self { hints, parent }
    }

    /// Own hint first, then inheritable hints from enclosing scopes.
    pub fn lookup(&self, key: &str) -> Option<&'a HintValue> {
        if let Some(value) = self.hints.get(key) {
            return Some(value);
        }
        if !hint::INHERITED.contains(&key) {
            return None;
        }
        self.parent.and_then(|p| p.lookup(key))
    }

    pub fn row_limit(&self) -> Option<u64> {
        self.lookup(hint::OUTPUT_ROW_LIMIT)
            .and_then(HintValue::as_int)
            .filter(|n| *n > 0)
            .map(|n| n as u64)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.lookup(key).and_then(HintValue::as_bool).unwrap_or(false)
    }
}
