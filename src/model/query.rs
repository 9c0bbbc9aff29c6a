//! The structured SQL model: an owned, mutable description of one SELECT.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::condition::{BinaryCondition, Condition, ConditionSet, TablePair};
use super::selection::{SelectColumn, Selection};
use super::types::{hint, HintScope, HintValue, Hints, OrderItem, Relation, SelectTable};
use crate::dialect::{Dialect, Product};
use crate::generator::{RenderOptions, SqlGenerator};

/// A SELECT statement described structurally.
///
/// Every mutator clears the render memo, so [`render`](Self::render) on an
/// unchanged model is byte-identical and cheap.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StructuredQuery {
    #[serde(default)]
    tables: Vec<SelectTable>,
    #[serde(default)]
    selection: Selection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    post_filter: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_by: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    order_by: Vec<OrderItem>,
    #[serde(default)]
    distinct: bool,
    #[serde(default, skip_serializing_if = "Hints::is_empty")]
    hints: Hints,
    /// Fallback SQL text for models that could not be (fully) structured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_sql: Option<String>,
    #[serde(skip)]
    dialect: Option<Arc<Dialect>>,
    #[serde(skip)]
    memo: RenderMemo,
}

#[derive(Debug, Clone, PartialEq)]
struct MemoEntry {
    product: Product,
    options: RenderOptions,
    sql: String,
}

/// Last rendered text. The lock is held for the whole render pass.
#[derive(Debug, Default)]
struct RenderMemo(Mutex<Option<MemoEntry>>);

impl Clone for RenderMemo {
    fn clone(&self) -> Self {
        RenderMemo(Mutex::new(self.0.lock().clone()))
    }
}

impl Clone for StructuredQuery {
    fn clone(&self) -> Self {
        Self {
            tables: self.tables.clone(),
            selection: self.selection.clone(),
            filter: self.filter.clone(),
            post_filter: self.post_filter.clone(),
            group_by: self.group_by.clone(),
            order_by: self.order_by.clone(),
            distinct: self.distinct,
            hints: self.hints.clone(),
            raw_sql: self.raw_sql.clone(),
            dialect: self.dialect.clone(),
            memo: self.memo.clone(),
        }
    }
}

impl PartialEq for StructuredQuery {
    fn eq(&self, other: &Self) -> bool {
        self.tables == other.tables
            && self.selection == other.selection
            && self.filter == other.filter
            && self.post_filter == other.post_filter
            && self.group_by == other.group_by
            && self.order_by == other.order_by
            && self.distinct == other.distinct
            && self.hints == other.hints
            && self.raw_sql == other.raw_sql
    }
}

impl StructuredQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model that only carries SQL text.
    pub fn from_raw(sql: impl Into<String>) -> Self {
        Self {
            raw_sql: Some(sql.into()),
            ..Self::default()
        }
    }

    fn invalidate(&mut self) {
        *self.memo.0.get_mut() = None;
    }

    // --- tables ---

    pub fn tables(&self) -> &[SelectTable] {
        &self.tables
    }

    /// Add a table, returning the stored entry.
    ///
    /// Adding a table identical to an existing one (same alias and source)
    /// returns the existing entry. An alias already used by a different source
    /// is suffixed with `_<n>` until unique.
    pub fn add_table(&mut self, mut table: SelectTable) -> &SelectTable {
        if let Some(idx) = self.tables.iter().position(|t| t.alias == table.alias) {
            if self.tables[idx] == table {
                return &self.tables[idx];
            }
            let mut n = 1;
            let base = table.alias.clone();
            while self.tables.iter().any(|t| t.alias == table.alias) {
                table.alias = format!("{}_{}", base, n);
                n += 1;
            }
        }
        self.invalidate();
        let idx = self.tables.len();
        self.tables.push(table);
        &self.tables[idx]
    }

    pub fn remove_table(&mut self, alias: &str) -> Option<SelectTable> {
        let idx = self.tables.iter().position(|t| t.alias == alias)?;
        self.invalidate();
        Some(self.tables.remove(idx))
    }

    pub fn table(&self, alias: &str) -> Option<&SelectTable> {
        self.tables.iter().find(|t| t.alias == alias)
    }

    pub fn table_mut(&mut self, alias: &str) -> Option<&mut SelectTable> {
        self.invalidate();
        self.tables.iter_mut().find(|t| t.alias == alias)
    }

    pub fn has_table(&self, alias: &str) -> bool {
        self.tables.iter().any(|t| t.alias == alias)
    }

    // --- selection ---

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        self.invalidate();
        &mut self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.invalidate();
        self.selection = selection;
    }

    pub fn add_column(&mut self, column: SelectColumn) {
        self.invalidate();
        self.selection.columns.push(column);
    }

    // --- filters ---

    pub fn filter(&self) -> Option<&Condition> {
        self.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Option<Condition>) {
        self.invalidate();
        self.filter = filter;
    }

    pub fn combine_filter_by_and(&mut self, condition: Condition) {
        self.combine_filter(Relation::And, condition);
    }

    pub fn combine_filter(&mut self, relation: Relation, condition: Condition) {
        self.invalidate();
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.combine(relation, condition),
            None => condition,
        });
    }

    pub fn post_filter(&self) -> Option<&Condition> {
        self.post_filter.as_ref()
    }

    pub fn set_post_filter(&mut self, post_filter: Option<Condition>) {
        self.invalidate();
        self.post_filter = post_filter;
    }

    pub fn combine_post_filter_by_and(&mut self, condition: Condition) {
        self.invalidate();
        self.post_filter = Some(match self.post_filter.take() {
            Some(existing) => existing.combine(Relation::And, condition),
            None => condition,
        });
    }

    /// Add a join node, reusing the join group already recorded for the same
    /// table pair so repeated calls do not duplicate predicates.
    ///
    /// Nodes that are not joins between two tables are simply merged into the
    /// filter with `merge_relation`.
    pub fn add_join(&mut self, join: BinaryCondition, merge_relation: Relation) {
        self.invalidate();
        let Some(pair) = join.table_pair() else {
            self.combine_filter(merge_relation, Condition::Binary(join));
            return;
        };

        if let Some(group) = self.filter.as_mut().and_then(|f| find_join_group(f, &pair)) {
            let node = Condition::Binary(join);
            if !group.children.contains(&node) {
                group.children.push(node);
            }
            return;
        }

        let group = Condition::Set(ConditionSet {
            relation: Relation::And,
            children: vec![Condition::Binary(join)],
            is_group: true,
            join_pair: Some(pair),
        });
        self.combine_filter(merge_relation, group);
    }

    /// Whether `node` joins two tables of this model.
    pub fn is_join(&self, node: &BinaryCondition) -> bool {
        node.join_tables()
            .is_some_and(|(l, r)| self.has_table(l) && self.has_table(r))
    }

    // --- grouping / ordering ---

    pub fn group_by(&self) -> Option<&[String]> {
        self.group_by.as_deref()
    }

    /// Set grouping. An empty list removes grouping and the post-filter with it.
    pub fn set_group_by(&mut self, group_by: Vec<String>) {
        self.invalidate();
        if group_by.is_empty() {
            self.group_by = None;
            self.post_filter = None;
        } else {
            self.group_by = Some(group_by);
        }
    }

    pub fn order_by(&self) -> &[OrderItem] {
        &self.order_by
    }

    pub fn set_order_by(&mut self, order_by: Vec<OrderItem>) {
        self.invalidate();
        self.order_by = order_by;
    }

    pub fn add_order(&mut self, item: OrderItem) {
        self.invalidate();
        self.order_by.push(item);
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn set_distinct(&mut self, distinct: bool) {
        self.invalidate();
        self.distinct = distinct;
    }

    // --- hints ---

    pub fn hints(&self) -> &Hints {
        &self.hints
    }

    pub fn hint(&self, key: &str) -> Option<&HintValue> {
        self.hints.get(key)
    }

    pub fn set_hint(&mut self, key: impl Into<String>, value: impl Into<HintValue>) {
        self.invalidate();
        self.hints.insert(key.into(), value.into());
    }

    pub fn remove_hint(&mut self, key: &str) -> Option<HintValue> {
        self.invalidate();
        self.hints.remove(key)
    }

    pub fn set_row_limit(&mut self, limit: Option<u64>) {
        match limit {
            Some(n) => {
                let n = i64::try_from(n).unwrap_or(i64::MAX);
                self.set_hint(hint::OUTPUT_ROW_LIMIT, n);
            }
            None => {
                self.remove_hint(hint::OUTPUT_ROW_LIMIT);
            }
        }
    }

    pub fn hint_scope<'a>(&'a self, parent: Option<&'a HintScope<'a>>) -> HintScope<'a> {
        HintScope::new(&self.hints, parent)
    }

    // --- raw text ---

    pub fn raw_sql(&self) -> Option<&str> {
        self.raw_sql.as_deref()
    }

    pub fn set_raw_sql(&mut self, sql: Option<String>) {
        self.invalidate();
        self.raw_sql = sql;
    }

    /// True when only the raw SQL can be rendered.
    pub fn is_raw_only(&self) -> bool {
        self.raw_sql.is_some() && self.tables.is_empty() && self.selection.is_empty()
    }

    // --- dialect binding and rendering ---

    pub fn dialect(&self) -> Option<&Arc<Dialect>> {
        self.dialect.as_ref()
    }

    pub fn bind_dialect(&mut self, dialect: Arc<Dialect>) {
        self.invalidate();
        self.dialect = Some(dialect);
    }

    /// Render with the bound dialect (generic ANSI when unbound).
    pub fn render(&self) -> String {
        match &self.dialect {
            Some(dialect) => self.render_with(dialect, RenderOptions::default()),
            None => self.render_with(&Dialect::for_product(Product::Generic), RenderOptions::default()),
        }
    }

    /// Render for `dialect`, reusing the memo when the last render used the
    /// same dialect and options.
    pub fn render_with(&self, dialect: &Dialect, options: RenderOptions) -> String {
        let mut memo = self.memo.0.lock();
        if let Some(entry) = memo.as_ref() {
            if entry.product == dialect.product && entry.options == options {
                return entry.sql.clone();
            }
        }
        let sql = SqlGenerator::new(dialect, options).render(self);
        tracing::debug!(product = %dialect.product, %sql, "rendered query");
        *memo = Some(MemoEntry {
            product: dialect.product,
            options,
            sql: sql.clone(),
        });
        sql
    }

    /// Whether a cached rendering is present.
    pub fn is_rendered(&self) -> bool {
        self.memo.0.lock().is_some()
    }
}

fn find_join_group<'a>(cond: &'a mut Condition, pair: &TablePair) -> Option<&'a mut ConditionSet> {
    let Condition::Set(set) = cond else {
        return None;
    };
    if set.relation != Relation::And {
        return None;
    }
    if set.join_pair.as_ref().is_some_and(|p| p.matches(pair)) {
        return Some(set);
    }
    for child in set.children.iter_mut() {
        if let Some(found) = find_join_group(child, pair) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{BinaryOp, Expression, OrderItem};

    fn orders_customers() -> StructuredQuery {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("o", "orders"));
        q.add_table(SelectTable::named("c", "customers"));
        q.set_selection(Selection::new(vec![
            SelectColumn::field("o.id"),
            SelectColumn::field("c.name"),
        ]));
        q
    }

    #[test]
    fn test_add_table_is_idempotent() {
        let mut q = orders_customers();
        let alias = q.add_table(SelectTable::named("o", "orders")).alias.clone();
        assert_eq!(alias, "o");
        assert_eq!(q.tables().len(), 2);
    }

    #[test]
    fn test_add_table_alias_clash_is_suffixed() {
        let mut q = orders_customers();
        let alias = q.add_table(SelectTable::named("o", "order_lines")).alias.clone();
        assert_eq!(alias, "o_1");
        assert_eq!(q.tables().len(), 3);
    }

    #[test]
    fn test_remove_table() {
        let mut q = orders_customers();
        assert!(q.remove_table("c").is_some());
        assert!(q.remove_table("c").is_none());
        assert_eq!(q.tables().len(), 1);
    }

    #[test]
    fn test_empty_group_by_clears_post_filter() {
        let mut q = orders_customers();
        q.set_group_by(vec!["c.name".into()]);
        q.set_post_filter(Some(Condition::predicate("count(*) > 1")));
        assert!(q.post_filter().is_some());
        q.set_group_by(vec![]);
        assert!(q.group_by().is_none());
        assert!(q.post_filter().is_none());
    }

    #[test]
    fn test_add_join_reuses_group_for_same_pair() {
        let mut q = orders_customers();
        q.add_join(BinaryCondition::join("o.customer_id", BinaryOp::Eq, "c.id"), Relation::And);
        q.add_join(BinaryCondition::join("o.customer_id", BinaryOp::Eq, "c.id"), Relation::And);
        q.add_join(BinaryCondition::join("o.region", BinaryOp::Eq, "c.region"), Relation::And);

        let filter = q.filter().unwrap().as_set().unwrap();
        assert!(filter.is_group);
        assert_eq!(filter.children.len(), 2);
        assert!(filter.join_pair.is_some());
    }

    #[test]
    fn test_add_join_new_pair_creates_new_group() {
        let mut q = orders_customers();
        q.add_table(SelectTable::named("p", "products"));
        q.combine_filter_by_and(Condition::eq(Expression::field("o.status"), Expression::string("open")));
        q.add_join(BinaryCondition::join("o.customer_id", BinaryOp::Eq, "c.id"), Relation::And);
        q.add_join(BinaryCondition::join("o.product_id", BinaryOp::Eq, "p.id"), Relation::And);
        q.add_join(BinaryCondition::join("p.id", BinaryOp::Eq, "o.product_id"), Relation::And);

        let root = q.filter().unwrap().as_set().unwrap();
        assert_eq!(root.children.len(), 3);
        let mut joins = 0;
        q.filter().unwrap().visit_binaries(&mut |b| {
            if b.join_tables().is_some() {
                joins += 1;
            }
        });
        assert_eq!(joins, 3);
    }

    #[test]
    fn test_render_is_memoized_and_invalidated() {
        let mut q = orders_customers();
        assert!(!q.is_rendered());
        let first = q.render();
        assert!(q.is_rendered());
        assert_eq!(first, q.render());

        q.add_order(OrderItem::desc("o.id"));
        assert!(!q.is_rendered());
        let second = q.render();
        assert_ne!(first, second);
        assert!(second.starts_with(&first));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut inner = StructuredQuery::new();
        inner.add_table(SelectTable::named("x", "items"));
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::subquery("s", inner));

        let mut copy = q.clone();
        assert_eq!(q, copy);
        copy.set_hint(hint::STATIC, true);
        assert_ne!(q, copy);
        assert!(q.hint(hint::STATIC).is_none());
    }

    #[test]
    fn test_is_join_requires_model_tables() {
        let q = orders_customers();
        assert!(q.is_join(&BinaryCondition::join("o.cid", BinaryOp::Eq, "c.id")));
        assert!(!q.is_join(&BinaryCondition::join("o.cid", BinaryOp::Eq, "z.id")));
    }

    #[test]
    fn test_row_limit_hint() {
        let mut q = orders_customers();
        q.set_row_limit(Some(5));
        assert_eq!(q.hint_scope(None).row_limit(), Some(5));
        q.set_row_limit(None);
        assert_eq!(q.hint_scope(None).row_limit(), None);
        q.set_row_limit(Some(u64::MAX));
        assert_eq!(q.hint_scope(None).row_limit(), Some(i64::MAX as u64));
    }
}
