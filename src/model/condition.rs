//! Boolean condition trees used by the filter and post-filter clauses.

use serde::{Deserialize, Serialize};

use super::query::StructuredQuery;
use super::types::{split_path, BinaryOp, Expression, JoinKind, Relation, TrinaryOp, UnaryOp};

/// One node of a filter tree. `Set` is the only branching kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Set(ConditionSet),
    Unary(UnaryCondition),
    Binary(BinaryCondition),
    Trinary(TrinaryCondition),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSet {
    pub relation: Relation,
    pub children: Vec<Condition>,
    /// Explicitly parenthesized by the author.
    #[serde(default)]
    pub is_group: bool,
    /// Table pair of the join group this set was created for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_pair: Option<TablePair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryCondition {
    pub expr: Expression,
    pub op: UnaryOp,
    #[serde(default)]
    pub is_not: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryCondition {
    pub left: Expression,
    pub op: BinaryOp,
    pub right: Expression,
    #[serde(default)]
    pub is_not: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrinaryCondition {
    pub expr: Expression,
    pub op: TrinaryOp,
    pub low: Expression,
    pub high: Expression,
    #[serde(default)]
    pub is_not: bool,
}

/// Dependent (joined-in) and independent (joined-to) tables of a join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TablePair {
    pub dependent: String,
    pub independent: String,
}

impl TablePair {
    /// Orientation-insensitive comparison.
    pub fn matches(&self, other: &TablePair) -> bool {
        (self.dependent == other.dependent && self.independent == other.independent)
            || (self.dependent == other.independent && self.independent == other.dependent)
    }
}

impl BinaryCondition {
    pub fn new(left: Expression, op: BinaryOp, right: Expression) -> Self {
        Self {
            left,
            op,
            right,
            is_not: false,
        }
    }

    /// Join between two qualified fields: `join("o.customer_id", LeftOuter, "c.id")`.
    pub fn join(left: &str, op: BinaryOp, right: &str) -> Self {
        Self::new(Expression::field(left), op, Expression::field(right))
    }

    pub fn negated(mut self) -> Self {
        self.is_not = !self.is_not;
        self
    }

    /// Table qualifiers of both sides when this node is shaped like a join:
    /// a join operator between two fields qualified by distinct tables.
    pub fn join_tables(&self) -> Option<(&str, &str)> {
        if self.is_not {
            return None;
        }
        self.op.join_kind()?;
        let (Expression::Field(l), Expression::Field(r)) = (&self.left, &self.right) else {
            return None;
        };
        let (Some(lt), _) = split_path(l) else {
            return None;
        };
        let (Some(rt), _) = split_path(r) else {
            return None;
        };
        (lt != rt).then_some((lt, rt))
    }

    pub fn join_kind(&self) -> Option<JoinKind> {
        self.join_tables().and(self.op.join_kind())
    }

    /// Dependent/independent pair of a join. The nullable side is the
    /// dependent one; for inner and full joins it is the right-hand table.
    pub fn table_pair(&self) -> Option<TablePair> {
        let (l, r) = self.join_tables()?;
        let (dependent, independent) = match self.op {
            BinaryOp::RightOuter => (l, r),
            _ => (r, l),
        };
        Some(TablePair {
            dependent: dependent.to_string(),
            independent: independent.to_string(),
        })
    }
}

impl Condition {
    pub fn and(children: Vec<Condition>) -> Self {
        Condition::set(Relation::And, children)
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Condition::set(Relation::Or, children)
    }

    pub fn set(relation: Relation, children: Vec<Condition>) -> Self {
        Condition::Set(ConditionSet {
            relation,
            children,
            is_group: false,
            join_pair: None,
        })
    }

    /// Mark a set as an explicit parenthesized group. No-op on leaves.
    pub fn group(mut self) -> Self {
        if let Condition::Set(set) = &mut self {
            set.is_group = true;
        }
        self
    }

    pub fn binary(left: Expression, op: BinaryOp, right: Expression) -> Self {
        Condition::Binary(BinaryCondition::new(left, op, right))
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Condition::binary(left, BinaryOp::Eq, right)
    }

    pub fn join(left: &str, op: BinaryOp, right: &str) -> Self {
        Condition::Binary(BinaryCondition::join(left, op, right))
    }

    pub fn is_null(expr: Expression) -> Self {
        Condition::Unary(UnaryCondition {
            expr,
            op: UnaryOp::IsNull,
            is_not: false,
        })
    }

    pub fn exists(query: StructuredQuery) -> Self {
        Condition::Unary(UnaryCondition {
            expr: Expression::Subquery(Box::new(query)),
            op: UnaryOp::Exists,
            is_not: false,
        })
    }

    pub fn predicate(text: impl Into<String>) -> Self {
        Condition::Unary(UnaryCondition {
            expr: Expression::Raw(text.into()),
            op: UnaryOp::Predicate,
            is_not: false,
        })
    }

    pub fn between(expr: Expression, low: Expression, high: Expression) -> Self {
        Condition::Trinary(TrinaryCondition {
            expr,
            op: TrinaryOp::Between,
            low,
            high,
            is_not: false,
        })
    }

    /// Flip the `is_not` flag of a leaf. Sets carry no negation and are
    /// returned unchanged.
    pub fn not(mut self) -> Self {
        match &mut self {
            Condition::Unary(c) => c.is_not = !c.is_not,
            Condition::Binary(c) => c.is_not = !c.is_not,
            Condition::Trinary(c) => c.is_not = !c.is_not,
            Condition::Set(_) => {}
        }
        self
    }

    pub fn as_set(&self) -> Option<&ConditionSet> {
        match self {
            Condition::Set(set) => Some(set),
            _ => None,
        }
    }

    /// Combine two trees under `relation`, flattening into `self` when it is
    /// an ungrouped set of the same relation.
    pub fn combine(self, relation: Relation, other: Condition) -> Condition {
        match self {
            Condition::Set(mut set)
                if set.relation == relation && !set.is_group && set.join_pair.is_none() =>
            {
                match other {
                    Condition::Set(o)
                        if o.relation == relation && !o.is_group && o.join_pair.is_none() =>
                    {
                        set.children.extend(o.children)
                    }
                    other => set.children.push(other),
                }
                Condition::Set(set)
            }
            this => Condition::set(relation, vec![this, other]),
        }
    }

    /// Pull join nodes out of the tree along AND-only paths.
    ///
    /// Returns the remaining tree (if anything is left) and the extracted
    /// joins in authoring order. Joins under an OR stay where they are.
    pub fn split_joins(
        self,
        is_join: &dyn Fn(&BinaryCondition) -> bool,
    ) -> (Option<Condition>, Vec<BinaryCondition>) {
        let mut joins = Vec::new();
        let rest = split_into(self, is_join, &mut joins);
        (rest, joins)
    }

    /// Visit every binary node in the tree, depth first.
    pub fn visit_binaries<'a>(&'a self, f: &mut dyn FnMut(&'a BinaryCondition)) {
        match self {
            Condition::Set(set) => set.children.iter().for_each(|c| c.visit_binaries(f)),
            Condition::Binary(b) => f(b),
            _ => {}
        }
    }

    /// Whether the tree is an empty set (renders to nothing).
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::Set(set) => set.children.iter().all(Condition::is_empty),
            _ => false,
        }
    }
}

fn split_into(
    cond: Condition,
    is_join: &dyn Fn(&BinaryCondition) -> bool,
    joins: &mut Vec<BinaryCondition>,
) -> Option<Condition> {
    match cond {
        Condition::Binary(b) if is_join(&b) => {
            joins.push(b);
            None
        }
        Condition::Set(mut set) if set.relation == Relation::And => {
            let children = std::mem::take(&mut set.children);
            set.children = children
                .into_iter()
                .filter_map(|c| split_into(c, is_join, joins))
                .collect();
            if set.children.is_empty() {
                None
            } else {
                Some(Condition::Set(set))
            }
        }
        other => Some(other),
    }
}
