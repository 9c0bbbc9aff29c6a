//! Dialect code generator.
//!
//! Turns a [`StructuredQuery`] into SQL text for one [`Dialect`]. A render
//! pass runs in fixed steps: table alias shortening, projection, FROM (with
//! join reordering), WHERE/HAVING, GROUP BY/ORDER BY, pagination.
//!
//! Rendering never fails. References that cannot be resolved are emitted as
//! the raw text they were given.

mod alias;
mod condition;
mod expr;
mod from;
mod ordering;
mod pagination;
mod projection;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::model::{Condition, Expression, HintScope, Relation, StructuredQuery, UnaryCondition};

pub use alias::{shortened_alias, AliasMap};
pub use pagination::paginate_raw;

/// How much of a table's qualified name to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableQualification {
    /// Bare table names.
    Never,
    /// `schema.table` when a schema is set.
    #[default]
    Schema,
    /// `catalog.schema.table` where the product has catalogs.
    Full,
}

/// Per-data-source rendering choices layered over the dialect defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    /// Force (`Some(true)`) or forbid (`Some(false)`) ANSI joins.
    pub ansi_join: Option<bool>,
    pub qualification: TableQualification,
}

impl RenderOptions {
    pub fn classic() -> Self {
        Self {
            ansi_join: Some(false),
            ..Self::default()
        }
    }

    pub fn ansi() -> Self {
        Self {
            ansi_join: Some(true),
            ..Self::default()
        }
    }
}

/// Stateless renderer for one dialect.
pub struct SqlGenerator<'d> {
    dialect: &'d Dialect,
    options: RenderOptions,
}

impl<'d> SqlGenerator<'d> {
    pub fn new(dialect: &'d Dialect, options: RenderOptions) -> Self {
        Self { dialect, options }
    }

    pub fn dialect(&self) -> &Dialect {
        self.dialect
    }

    pub fn render(&self, query: &StructuredQuery) -> String {
        self.render_scoped(query, None)
    }

    /// Render `query` as a subquery of the query owning `parent`.
    pub(crate) fn render_scoped(&self, query: &StructuredQuery, parent: Option<&HintScope<'_>>) -> String {
        let scope = query.hint_scope(parent);

        if query.is_raw_only() {
            let raw = query.raw_sql().unwrap_or_default();
            return paginate_raw(self.dialect, raw, scope.row_limit());
        }

        let pass = Pass {
            gen: self,
            query,
            scope,
            aliases: AliasMap::build(query.tables(), self.dialect.max_identifier_length),
            output_names: query
                .selection()
                .resolve_aliases(self.dialect.max_identifier_length),
        };
        pass.render()
    }

    fn use_ansi_joins(&self) -> bool {
        self.options.ansi_join.unwrap_or(self.dialect.ansi_join_default)
    }
}

/// State of one render pass over one (sub)query.
struct Pass<'a> {
    gen: &'a SqlGenerator<'a>,
    query: &'a StructuredQuery,
    scope: HintScope<'a>,
    aliases: AliasMap,
    output_names: Vec<String>,
}

impl Pass<'_> {
    fn dialect(&self) -> &Dialect {
        self.gen.dialect
    }

    fn render(&self) -> String {
        let from = self.render_from();
        let where_clause = from
            .remaining
            .as_ref()
            .map(|c| self.render_condition(c))
            .filter(|s| !s.is_empty());
        let where_needs_parens = from.remaining.as_ref().is_some_and(needs_parens_before_and);

        let statement = pagination::Statement {
            distinct: self.query.is_distinct(),
            projection: self.render_projection(),
            from: from.text,
            where_clause,
            where_needs_parens,
            group_by: self.render_group_by(),
            having: self
                .query
                .post_filter()
                .map(|c| self.render_condition(c))
                .filter(|s| !s.is_empty()),
            order_by: self.render_order_by(),
            ..Default::default()
        };
        statement.paginate(self.dialect(), self.scope.row_limit())
    }

    fn render_subquery(&self, query: &StructuredQuery) -> String {
        self.gen.render_scoped(query, Some(&self.scope))
    }
}

/// Whether appending `and ...` to the rendered condition could rebind it.
/// Raw predicates are opaque and may hold their own `or`.
fn needs_parens_before_and(condition: &Condition) -> bool {
    match condition {
        Condition::Set(set) if set.children.len() == 1 => {
            set.children.iter().any(needs_parens_before_and)
        }
        Condition::Set(set) => {
            set.relation == Relation::Or || set.children.iter().any(is_raw_predicate)
        }
        other => is_raw_predicate(other),
    }
}

fn is_raw_predicate(condition: &Condition) -> bool {
    matches!(
        condition,
        Condition::Unary(UnaryCondition { expr: Expression::Raw(_), .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Product;
    use crate::model::{
        hint, BinaryCondition, BinaryOp, Condition, Expression, Literal, OrderItem, Relation,
        SelectColumn, SelectTable, Selection,
    };

    fn dialect(product: Product) -> Dialect {
        Dialect::for_product(product)
    }

    fn orders_customers(op: BinaryOp) -> StructuredQuery {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("o", "orders"));
        q.add_table(SelectTable::named("c", "customers"));
        q.set_selection(Selection::new(vec![
            SelectColumn::field("o.id"),
            SelectColumn::field("c.name"),
        ]));
        q.add_join(BinaryCondition::join("o.customer_id", op, "c.id"), Relation::And);
        q
    }

    fn render(q: &StructuredQuery, product: Product) -> String {
        SqlGenerator::new(&dialect(product), RenderOptions::default()).render(q)
    }

    #[test]
    fn test_classic_join_stays_in_where() {
        let q = orders_customers(BinaryOp::Eq);
        let expected = "select o.id, c.name from orders o, customers c where o.customer_id = c.id";
        assert_eq!(render(&q, Product::Oracle), expected);
        let generic_dialect = dialect(Product::Generic);
        let generic = SqlGenerator::new(&generic_dialect, RenderOptions::classic());
        assert_eq!(generic.render(&q), expected);
    }

    #[test]
    fn test_left_outer_join_moves_to_from() {
        let q = orders_customers(BinaryOp::LeftOuter);
        assert_eq!(
            render(&q, Product::PostgreSql),
            "select o.id, c.name from orders o left outer join customers c on o.customer_id = c.id"
        );
        // Outer joins force ANSI syntax even on classic dialects.
        assert_eq!(
            render(&q, Product::Oracle),
            "select o.id, c.name from orders o left outer join customers c on o.customer_id = c.id"
        );
    }

    #[test]
    fn test_right_outer_marker_orients_join() {
        let q = orders_customers(BinaryOp::RightOuter);
        assert_eq!(
            render(&q, Product::PostgreSql),
            "select o.id, c.name from customers c left outer join orders o on o.customer_id = c.id"
        );
    }

    #[test]
    fn test_row_limit_clause_forms() {
        let mut q = orders_customers(BinaryOp::Eq);
        q.set_row_limit(Some(100));
        assert!(render(&q, Product::PostgreSql).ends_with(" limit 100"));
        assert!(render(&q, Product::SqlServer).starts_with("select top 100 "));
        assert!(render(&q, Product::Db2).ends_with(" fetch first 100 rows only"));
        assert!(render(&q, Product::Informix).starts_with("select first 100 "));
        assert_eq!(
            render(&q, Product::Oracle),
            "select o.id, c.name from orders o, customers c where o.customer_id = c.id and rownum <= 100"
        );
    }

    #[test]
    fn test_remaining_filter_after_join_extraction() {
        let mut q = orders_customers(BinaryOp::Eq);
        q.combine_filter_by_and(Condition::eq(Expression::field("o.status"), Expression::string("open")));
        assert_eq!(
            render(&q, Product::PostgreSql),
            "select o.id, c.name from orders o inner join customers c on o.customer_id = c.id \
             where o.status = 'open'"
        );
    }

    #[test]
    fn test_join_completeness() {
        let mut q = StructuredQuery::new();
        for (alias, name) in [("a", "ta"), ("b", "tb"), ("c", "tc"), ("d", "td"), ("e", "te")] {
            q.add_table(SelectTable::named(alias, name));
        }
        let joins = [
            ("c.k", BinaryOp::LeftOuter, "d.k"),
            ("a.k", BinaryOp::Eq, "b.k"),
            ("b.k", BinaryOp::Eq, "c.k"),
            ("d.j", BinaryOp::Eq, "a.j"),
            ("b.m", BinaryOp::Eq, "a.m"),
        ];
        for (l, op, r) in joins {
            q.add_join(BinaryCondition::join(l, op, r), Relation::And);
        }
        let sql = render(&q, Product::PostgreSql);
        let from = sql.split(" from ").nth(1).unwrap();
        for table in ["ta a", "tb b", "tc c", "td d", "te e"] {
            assert_eq!(from.matches(table).count(), 1, "{} in {}", table, sql);
        }
        for predicate in ["c.k = d.k", "a.k = b.k", "b.k = c.k", "d.j = a.j", "b.m = a.m"] {
            assert_eq!(sql.matches(predicate).count(), 1, "{} in {}", predicate, sql);
        }
        assert!(!sql.contains(" where "));
    }

    #[test]
    fn test_preserved_new_table_attaches_to_chain() {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("a", "ta"));
        q.add_table(SelectTable::named("b", "tb"));
        q.add_table(SelectTable::named("c", "tc"));
        q.add_join(BinaryCondition::join("a.x", BinaryOp::Eq, "b.x"), Relation::And);
        q.add_join(BinaryCondition::join("c.y", BinaryOp::LeftOuter, "b.y"), Relation::And);

        assert_eq!(
            render(&q, Product::Sqlite),
            "select * from tc c left outer join (ta a inner join tb b on a.x = b.x) on c.y = b.y"
        );
        assert_eq!(
            render(&q, Product::PostgreSql),
            "select * from ta a inner join tb b on a.x = b.x right outer join tc c on c.y = b.y"
        );
    }

    #[test]
    fn test_disconnected_components_and_loose_tables() {
        let mut q = StructuredQuery::new();
        for alias in ["a", "b", "c", "d", "e"] {
            q.add_table(SelectTable::named(alias, alias));
        }
        q.add_join(BinaryCondition::join("a.k", BinaryOp::Eq, "b.k"), Relation::And);
        q.add_join(BinaryCondition::join("c.k", BinaryOp::Eq, "d.k"), Relation::And);
        let sql = render(&q, Product::PostgreSql);
        assert_eq!(
            sql,
            "select * from a inner join b on a.k = b.k, c inner join d on c.k = d.k, e"
        );
    }

    #[test]
    fn test_long_aliases_are_shortened_everywhere() {
        let long_a = format!("customer_orders_{}", "x".repeat(20));
        let long_b = format!("customer_orders_{}", "y".repeat(20));
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named(&long_a, "orders"));
        q.add_table(SelectTable::named(&long_b, "orders"));
        q.add_column(SelectColumn::field(format!("{}.id", long_a)));
        q.combine_filter_by_and(Condition::eq(
            Expression::field(format!("{}.id", long_b)),
            Expression::int(1),
        ));

        let oracle = dialect(Product::Oracle);
        let sql = SqlGenerator::new(&oracle, RenderOptions::default()).render(&q);
        assert!(!sql.contains(&long_a) && !sql.contains(&long_b));
        let map = AliasMap::build(q.tables(), 30);
        let (sa, sb) = (map.get(&long_a), map.get(&long_b));
        assert_ne!(sa, sb);
        assert!(sql.contains(&format!("{}.id", sa)));
        assert!(sql.contains(&format!("where {}.id = 1", sb)));
    }

    #[test]
    fn test_rownum_keeps_raw_disjunction_intact() {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("o", "orders"));
        q.set_selection(Selection::new(vec![SelectColumn::field("o.id")]));
        q.set_filter(Some(Condition::predicate("o.a = 1 or o.b = 2")));
        q.set_row_limit(Some(10));
        assert_eq!(
            render(&q, Product::Oracle),
            "select o.id from orders o where (o.a = 1 or o.b = 2) and rownum <= 10"
        );
        assert_eq!(
            render(&q, Product::PostgreSql),
            "select o.id from orders o where o.a = 1 or o.b = 2 limit 10"
        );
    }

    #[test]
    fn test_expression_columns_and_function_templates() {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("o", "orders"));
        q.set_selection(Selection::new(vec![
            SelectColumn::expression("count_distinct(o.customer_id)"),
            SelectColumn::expression("year(o.created_at)").with_alias("yr"),
            SelectColumn::expression("coalesce(o.note, 'n/a')"),
        ]));
        assert_eq!(
            render(&q, Product::PostgreSql),
            "select count(distinct o.customer_id) as exp_1, extract(year from o.created_at) as yr, \
             coalesce(o.note, 'n/a') as exp_2 from orders o"
        );
        assert_eq!(
            render(&q, Product::SqlServer),
            "select count(distinct o.customer_id) as exp_1, datepart(year, o.created_at) as yr, \
             coalesce(o.note, 'n/a') as exp_2 from orders o"
        );
    }

    #[test]
    fn test_reserved_words_are_quoted() {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("u", "user"));
        q.add_column(SelectColumn::field("u.order"));
        assert_eq!(render(&q, Product::PostgreSql), "select u.\"order\" from \"user\" u");
        assert_eq!(render(&q, Product::MySql), "select u.`order` from `user` u");
    }

    #[test]
    fn test_in_list_sentinels() {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("o", "orders"));
        q.add_column(SelectColumn::field("o.id"));

        let in_list = |items: Vec<Literal>| {
            Condition::binary(Expression::field("o.status"), BinaryOp::In, Expression::list(items))
        };

        q.set_filter(Some(in_list(vec![])));
        assert!(render(&q, Product::PostgreSql).ends_with("where o.status in (null)"));

        q.set_filter(Some(in_list(vec![]).not()));
        assert!(render(&q, Product::PostgreSql).ends_with("where 1 = 1"));

        q.set_filter(Some(in_list(vec![Literal::String("a".into()), Literal::Null])));
        assert!(render(&q, Product::PostgreSql).ends_with("where (o.status in ('a') or o.status is null)"));

        q.set_filter(Some(in_list(vec![Literal::String("a".into()), Literal::Null]).not()));
        assert!(render(&q, Product::PostgreSql)
            .ends_with("where (o.status not in ('a') and o.status is not null)"));

        q.set_filter(Some(in_list(vec![Literal::String("a".into()), Literal::String(String::new())])));
        assert!(render(&q, Product::PostgreSql).ends_with("where o.status in ('a', '')"));
        assert!(render(&q, Product::Oracle).ends_with("where (o.status in ('a') or o.status is null)"));
    }

    #[test]
    fn test_condition_parenthesization() {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("o", "orders"));
        q.set_filter(Some(Condition::and(vec![
            Condition::eq(Expression::field("o.a"), Expression::int(1)),
            Condition::or(vec![
                Condition::eq(Expression::field("o.b"), Expression::int(2)),
                Condition::is_null(Expression::field("o.b")),
            ]),
            Condition::and(vec![
                Condition::between(Expression::field("o.c"), Expression::int(1), Expression::int(9)),
                Condition::binary(Expression::field("o.d"), BinaryOp::Like, Expression::string("x%")).not(),
            ])
            .group(),
            Condition::eq(Expression::field("o.e"), Expression::param("status")),
        ])));
        assert_eq!(
            render(&q, Product::PostgreSql),
            "select * from orders o where o.a = 1 and (o.b = 2 or o.b is null) \
             and (o.c between 1 and 9 and o.d not like 'x%') and o.e = ${status}"
        );
    }

    #[test]
    fn test_subquery_table_passes_through_output_alias() {
        let mut sub = StructuredQuery::new();
        sub.add_table(SelectTable::named("o", "orders"));
        sub.set_selection(Selection::new(vec![
            SelectColumn::field("o.customer_id"),
            SelectColumn::expression("sum(o.total)").with_alias("total"),
        ]));
        sub.set_group_by(vec!["o.customer_id".into()]);

        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::subquery("s", sub));
        q.add_table(SelectTable::named("c", "customers"));
        q.set_selection(Selection::new(vec![
            SelectColumn::field("s.TOTAL"),
            SelectColumn::field("c.name"),
        ]));
        q.add_join(BinaryCondition::join("s.customer_id", BinaryOp::Eq, "c.id"), Relation::And);
        q.set_row_limit(Some(5));

        assert_eq!(
            render(&q, Product::PostgreSql),
            "select s.total, c.name from (select o.customer_id, sum(o.total) as total \
             from orders o group by o.customer_id) s inner join customers c on s.customer_id = c.id limit 5"
        );
    }

    #[test]
    fn test_exists_subquery_inherits_flags_not_limit() {
        let mut sub = StructuredQuery::new();
        sub.add_table(SelectTable::named("l", "lines"));
        sub.set_filter(Some(Condition::predicate("l.order_id = o.id")));

        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("o", "orders"));
        q.add_column(SelectColumn::field("o.id"));
        q.set_filter(Some(Condition::exists(sub)));
        q.set_hint(hint::STATIC, true);
        q.set_row_limit(Some(3));

        assert_eq!(
            render(&q, Product::PostgreSql),
            "select o.id from orders o where exists (select * from lines l where l.order_id = o.id) limit 3"
        );
    }

    #[test]
    fn test_ordinal_and_alias_ordering_fallbacks() {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("o", "orders"));
        q.set_selection(Selection::new(vec![
            SelectColumn::field("o.region"),
            SelectColumn::expression("sum(o.total)").with_alias("total"),
        ]));
        q.set_group_by(vec!["o.region".into()]);
        q.set_order_by(vec![OrderItem::desc("total"), OrderItem::asc("o.region")]);

        assert_eq!(
            render(&q, Product::Sybase),
            "select o.region, sum(o.total) as total from orders o group by o.region order by 2 desc, region asc"
        );
        assert_eq!(
            render(&q, Product::PostgreSql),
            "select o.region, sum(o.total) as total from orders o group by o.region \
             order by sum(o.total) desc, o.region asc"
        );
    }

    #[test]
    fn test_group_by_expression_ordinal() {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("o", "orders"));
        q.set_selection(Selection::new(vec![
            SelectColumn::expression("year(o.created_at)").with_alias("yr"),
            SelectColumn::expression("count(*)"),
        ]));
        q.set_group_by(vec!["yr".into()]);
        q.set_post_filter(Some(Condition::predicate("count(*) > 10")));

        assert_eq!(
            render(&q, Product::Informix),
            "select year(o.created_at) as yr, count(*) as exp_1 from orders o group by 1 having count(*) > 10"
        );
        assert_eq!(
            render(&q, Product::PostgreSql),
            "select extract(year from o.created_at) as yr, count(*) as exp_1 from orders o \
             group by extract(year from o.created_at) having count(*) > 10"
        );
    }

    #[test]
    fn test_table_qualification_and_dummy_table() {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("o", "orders").with_schema("sales").with_catalog("erp"));
        let d = dialect(Product::SqlServer);
        let render_with = |qualification| {
            SqlGenerator::new(&d, RenderOptions { ansi_join: None, qualification }).render(&q)
        };
        assert_eq!(render_with(TableQualification::Never), "select * from orders o");
        assert_eq!(render_with(TableQualification::Schema), "select * from sales.orders o");
        assert_eq!(render_with(TableQualification::Full), "select * from erp.sales.orders o");

        let mut constant = StructuredQuery::new();
        constant.add_column(SelectColumn::expression("1"));
        assert_eq!(render(&constant, Product::Oracle), "select 1 as exp_1 from dual");
        assert_eq!(render(&constant, Product::PostgreSql), "select 1 as exp_1");
    }

    #[test]
    fn test_boolean_literals_follow_dialect() {
        let mut q = StructuredQuery::new();
        q.add_table(SelectTable::named("o", "orders"));
        q.set_filter(Some(Condition::eq(
            Expression::field("o.active"),
            Expression::Literal(Literal::Boolean(true)),
        )));
        assert!(render(&q, Product::PostgreSql).ends_with("where o.active = true"));
        assert!(render(&q, Product::SqlServer).ends_with("where o.active = 1"));
    }

    #[test]
    fn test_raw_only_model() {
        let mut q = StructuredQuery::from_raw("select a from t");
        q.set_row_limit(Some(7));
        assert_eq!(render(&q, Product::PostgreSql), "select a from t limit 7");
        assert_eq!(render(&q, Product::SqlServer), "select top 7 a from t");
    }

    #[test]
    fn test_render_is_stable() {
        let q = orders_customers(BinaryOp::LeftOuter);
        let d = dialect(Product::PostgreSql);
        let gen = SqlGenerator::new(&d, RenderOptions::default());
        assert_eq!(gen.render(&q), gen.render(&q));
    }
}
