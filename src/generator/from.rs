//! FROM clause rendering and join reordering.
//!
//! Join predicates found along AND-only paths of the filter are grouped into
//! edges keyed by their unordered table pair. When the edges, in authoring
//! order, already form one chain that attaches each new table on its nullable
//! side ("loyal" order), that order is kept. Otherwise edges are stably sorted
//! with outer joins last. Each connected component becomes one join tree;
//! tables without edges trail as a comma-separated group.

use std::collections::HashSet;

use super::Pass;
use crate::dialect::Feature;
use crate::model::{BinaryCondition, Condition, JoinKind, TableSource};

pub(super) struct FromClause {
    pub text: Option<String>,
    /// Filter left for the WHERE clause once joins moved into ON clauses.
    pub remaining: Option<Condition>,
}

/// Join predicates between one pair of tables.
#[derive(Debug, Clone)]
struct JoinEdge {
    /// Preserved side for left outer joins.
    a: usize,
    b: usize,
    /// Never `RightOuter`: such edges are flipped when the graph is built.
    kind: JoinKind,
    predicates: Vec<BinaryCondition>,
}

#[derive(Debug)]
enum JoinTree {
    Table(usize),
    Join {
        left: Box<JoinTree>,
        kind: JoinKind,
        right: Box<JoinTree>,
        on: Vec<BinaryCondition>,
    },
}

impl JoinTree {
    fn join(left: JoinTree, kind: JoinKind, right: JoinTree, on: Vec<BinaryCondition>) -> Self {
        JoinTree::Join {
            left: Box::new(left),
            kind,
            right: Box::new(right),
            on,
        }
    }

    fn append_on(&mut self, predicates: &[BinaryCondition]) {
        if let JoinTree::Join { on, .. } = self {
            on.extend_from_slice(predicates);
        }
    }

    fn tables(&self, out: &mut Vec<usize>) {
        match self {
            JoinTree::Table(i) => out.push(*i),
            JoinTree::Join { left, right, .. } => {
                left.tables(out);
                right.tables(out);
            }
        }
    }
}

fn merge_kinds(existing: JoinKind, new: JoinKind) -> JoinKind {
    match (existing, new) {
        (a, b) if a == b => a,
        (JoinKind::Inner, other) | (other, JoinKind::Inner) => other,
        _ => JoinKind::FullOuter,
    }
}

/// Group join nodes into edges, keeping first-appearance order.
fn build_edges(table_index: &dyn Fn(&str) -> Option<usize>, joins: &[BinaryCondition]) -> Vec<JoinEdge> {
    let mut edges: Vec<JoinEdge> = Vec::new();
    for join in joins {
        let (Some((l, r)), Some(kind)) = (join.join_tables(), join.op.join_kind()) else {
            continue;
        };
        let (Some(li), Some(ri)) = (table_index(l), table_index(r)) else {
            continue;
        };
        match edges
            .iter_mut()
            .find(|e| (e.a == li && e.b == ri) || (e.a == ri && e.b == li))
        {
            Some(edge) => {
                let relative = if edge.a == li { kind } else { kind.flipped() };
                edge.kind = merge_kinds(edge.kind, relative);
                edge.predicates.push(join.clone());
            }
            None => edges.push(JoinEdge {
                a: li,
                b: ri,
                kind,
                predicates: vec![join.clone()],
            }),
        }
    }
    for edge in &mut edges {
        if edge.kind == JoinKind::RightOuter {
            std::mem::swap(&mut edge.a, &mut edge.b);
            edge.kind = JoinKind::LeftOuter;
        }
    }
    edges
}

/// Whether authoring order is already one connected chain in which every
/// edge after the first brings in exactly one new table on its nullable side.
fn is_loyal(edges: &[JoinEdge]) -> bool {
    let mut seen = HashSet::new();
    for (i, edge) in edges.iter().enumerate() {
        if i == 0 {
            seen.insert(edge.a);
            seen.insert(edge.b);
            continue;
        }
        match (seen.contains(&edge.a), seen.contains(&edge.b)) {
            (true, false) => {
                seen.insert(edge.b);
            }
            (false, true) if edge.kind != JoinKind::LeftOuter => {
                seen.insert(edge.a);
            }
            _ => return false,
        }
    }
    true
}

impl Pass<'_> {
    pub(super) fn render_from(&self) -> FromClause {
        let tables = self.query.tables();
        let filter = self.query.filter().cloned();

        if tables.is_empty() {
            return FromClause {
                text: self.dialect().dummy_table.map(str::to_string),
                remaining: filter,
            };
        }
        let all: Vec<usize> = (0..tables.len()).collect();
        let Some(filter) = filter else {
            return FromClause {
                text: Some(self.comma_list(&all)),
                remaining: None,
            };
        };

        let query = self.query;
        let (rest, joins) = filter.clone().split_joins(&|b| query.is_join(b));
        let has_outer = joins.iter().any(|j| j.op.join_kind() != Some(JoinKind::Inner));

        if joins.is_empty() || (!self.gen.use_ansi_joins() && !has_outer) {
            return FromClause {
                text: Some(self.comma_list(&all)),
                remaining: Some(filter),
            };
        }

        let index_of = |alias: &str| tables.iter().position(|t| t.alias == alias);
        let mut edges = build_edges(&index_of, &joins);
        if !is_loyal(&edges) {
            edges.sort_by_key(|e| e.kind.is_outer());
        }

        let trees = self.build_trees(edges);
        let mut joined = Vec::new();
        let mut parts = Vec::new();
        for tree in &trees {
            tree.tables(&mut joined);
            parts.push(self.render_tree(tree));
        }
        let loose: Vec<usize> = all.into_iter().filter(|i| !joined.contains(i)).collect();
        if !loose.is_empty() {
            parts.push(self.comma_list(&loose));
        }

        FromClause {
            text: Some(parts.join(", ")),
            remaining: rest,
        }
    }

    /// Walk connected components, always taking the first pending edge that
    /// touches the current component.
    fn build_trees(&self, edges: Vec<JoinEdge>) -> Vec<JoinTree> {
        let mut pending = edges;
        let mut trees = Vec::new();
        while !pending.is_empty() {
            let first = pending.remove(0);
            let mut visited: HashSet<usize> = [first.a, first.b].into_iter().collect();
            let mut tree = JoinTree::join(
                JoinTree::Table(first.a),
                self.supported_kind(first.kind),
                JoinTree::Table(first.b),
                first.predicates,
            );
            while let Some(pos) = pending
                .iter()
                .position(|e| visited.contains(&e.a) || visited.contains(&e.b))
            {
                let edge = pending.remove(pos);
                tree = self.attach(tree, edge, &mut visited);
            }
            trees.push(tree);
        }
        trees
    }

    fn attach(&self, tree: JoinTree, edge: JoinEdge, visited: &mut HashSet<usize>) -> JoinTree {
        let kind = self.supported_kind(edge.kind);
        match (visited.contains(&edge.a), visited.contains(&edge.b)) {
            (true, true) => {
                let mut tree = tree;
                tree.append_on(&edge.predicates);
                tree
            }
            (true, false) => {
                visited.insert(edge.b);
                JoinTree::join(tree, kind, JoinTree::Table(edge.b), edge.predicates)
            }
            _ => {
                // The new table is `a`, the preserved side of a left outer join.
                visited.insert(edge.a);
                match kind {
                    JoinKind::LeftOuter if self.dialect().supports(Feature::RightOuterJoin) => {
                        JoinTree::join(tree, JoinKind::RightOuter, JoinTree::Table(edge.a), edge.predicates)
                    }
                    JoinKind::LeftOuter => {
                        JoinTree::join(JoinTree::Table(edge.a), JoinKind::LeftOuter, tree, edge.predicates)
                    }
                    other => JoinTree::join(tree, other, JoinTree::Table(edge.a), edge.predicates),
                }
            }
        }
    }

    fn supported_kind(&self, kind: JoinKind) -> JoinKind {
        if kind == JoinKind::FullOuter && !self.dialect().supports(Feature::FullOuterJoin) {
            tracing::warn!(product = %self.dialect().product, "full outer join unsupported, rendering left outer join");
            return JoinKind::LeftOuter;
        }
        kind
    }

    fn render_tree(&self, tree: &JoinTree) -> String {
        match tree {
            JoinTree::Table(i) => self.table_ref(*i),
            JoinTree::Join {
                left,
                kind,
                right,
                on,
            } => {
                let right_text = match right.as_ref() {
                    JoinTree::Table(i) => self.table_ref(*i),
                    nested => format!("({})", self.render_tree(nested)),
                };
                let predicates: Vec<String> = on.iter().map(|p| self.render_binary(p)).collect();
                format!(
                    "{} {} {} on {}",
                    self.render_tree(left),
                    kind.keyword(),
                    right_text,
                    predicates.join(" and ")
                )
            }
        }
    }

    fn comma_list(&self, indexes: &[usize]) -> String {
        indexes
            .iter()
            .map(|i| self.table_ref(*i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `name alias`, with the alias left out when it equals the table name.
    fn table_ref(&self, index: usize) -> String {
        let d = self.dialect();
        let table = &self.query.tables()[index];
        let alias = self.aliases.get(&table.alias);
        match &table.source {
            TableSource::Named(name) => {
                let bare = name.rsplit('.').next().unwrap_or(name);
                let qualified = self.qualified_name(table.catalog.as_deref(), table.schema.as_deref(), name);
                if bare == alias {
                    qualified
                } else {
                    format!("{} {}", qualified, d.quote_identifier(alias))
                }
            }
            TableSource::Subquery(sub) => {
                format!("({}) {}", self.render_subquery(sub), d.quote_identifier(alias))
            }
        }
    }

    fn qualified_name(&self, catalog: Option<&str>, schema: Option<&str>, name: &str) -> String {
        use super::TableQualification::*;
        let d = self.dialect();
        let mut segments: Vec<&str> = Vec::new();
        match self.gen.options.qualification {
            Never => {}
            Schema => segments.extend(schema),
            Full => {
                if d.supports(Feature::Catalogs) {
                    segments.extend(catalog);
                }
                segments.extend(schema);
            }
        }
        segments.push(name);
        d.quote_path(&segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BinaryOp;

    fn edge(a: usize, b: usize, kind: JoinKind) -> JoinEdge {
        JoinEdge {
            a,
            b,
            kind,
            predicates: vec![],
        }
    }

    #[test]
    fn test_merge_kinds() {
        assert_eq!(merge_kinds(JoinKind::Inner, JoinKind::LeftOuter), JoinKind::LeftOuter);
        assert_eq!(merge_kinds(JoinKind::LeftOuter, JoinKind::LeftOuter), JoinKind::LeftOuter);
        assert_eq!(merge_kinds(JoinKind::LeftOuter, JoinKind::RightOuter), JoinKind::FullOuter);
    }

    #[test]
    fn test_build_edges_groups_pairs_and_flips_right() {
        let names = ["o", "c", "p"];
        let index = |alias: &str| names.iter().position(|n| *n == alias);
        let joins = vec![
            BinaryCondition::join("o.cid", BinaryOp::RightOuter, "c.id"),
            BinaryCondition::join("c.region", BinaryOp::Eq, "o.region"),
            BinaryCondition::join("o.pid", BinaryOp::Eq, "p.id"),
        ];
        let edges = build_edges(&index, &joins);
        assert_eq!(edges.len(), 2);
        assert_eq!((edges[0].a, edges[0].b), (1, 0));
        assert_eq!(edges[0].kind, JoinKind::LeftOuter);
        assert_eq!(edges[0].predicates.len(), 2);
        assert_eq!(edges[1].kind, JoinKind::Inner);
    }

    #[test]
    fn test_loyal_chain() {
        assert!(is_loyal(&[edge(0, 1, JoinKind::Inner), edge(1, 2, JoinKind::LeftOuter)]));
        // New table would be the preserved side.
        assert!(!is_loyal(&[edge(0, 1, JoinKind::Inner), edge(2, 1, JoinKind::LeftOuter)]));
        // Disconnected.
        assert!(!is_loyal(&[edge(0, 1, JoinKind::Inner), edge(2, 3, JoinKind::Inner)]));
        // Cycle.
        assert!(!is_loyal(&[
            edge(0, 1, JoinKind::Inner),
            edge(1, 2, JoinKind::Inner),
            edge(2, 0, JoinKind::Inner),
        ]));
    }
}
