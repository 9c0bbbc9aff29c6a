use super::Pass;
use crate::dialect::Feature;
use crate::model::{
    BinaryCondition, BinaryOp, Condition, ConditionSet, Expression, Literal, TrinaryCondition,
    UnaryCondition, UnaryOp,
};

impl Pass<'_> {
    pub(super) fn render_condition(&self, cond: &Condition) -> String {
        match cond {
            Condition::Set(set) => self.render_set(set),
            Condition::Unary(u) => self.render_unary(u),
            Condition::Binary(b) => self.render_binary(b),
            Condition::Trinary(t) => self.render_trinary(t),
        }
    }

    /// Children joined by the set's relation. A child set is parenthesized
    /// when its relation differs or it is an explicit group.
    fn render_set(&self, set: &ConditionSet) -> String {
        let parts: Vec<String> = set
            .children
            .iter()
            .filter_map(|child| {
                let text = self.render_condition(child);
                if text.is_empty() {
                    return None;
                }
                let wrap = match child {
                    Condition::Set(inner) => {
                        let live = inner.children.iter().filter(|c| !c.is_empty()).count();
                        live > 1 && (inner.relation != set.relation || inner.is_group)
                    }
                    _ => false,
                };
                Some(if wrap { format!("({})", text) } else { text })
            })
            .collect();
        parts.join(&format!(" {} ", set.relation.keyword()))
    }

    fn render_unary(&self, cond: &UnaryCondition) -> String {
        let expr = self.render_expression(&cond.expr);
        match (cond.op, cond.is_not) {
            (UnaryOp::Exists, false) => format!("exists {}", expr),
            (UnaryOp::Exists, true) => format!("not exists {}", expr),
            (UnaryOp::IsNull, false) => format!("{} is null", expr),
            (UnaryOp::IsNull, true) => format!("{} is not null", expr),
            (UnaryOp::Predicate, false) => expr,
            (UnaryOp::Predicate, true) => format!("not ({})", expr),
        }
    }

    pub(super) fn render_binary(&self, cond: &BinaryCondition) -> String {
        let left = self.render_expression(&cond.left);
        match cond.op {
            BinaryOp::In => self.render_in(&left, &cond.right, cond.is_not),
            BinaryOp::Like => {
                let right = self.render_expression(&cond.right);
                if cond.is_not {
                    format!("{} not like {}", left, right)
                } else {
                    format!("{} like {}", left, right)
                }
            }
            op => {
                let right = self.render_expression(&cond.right);
                let text = format!("{} {} {}", left, op.sql(), right);
                if cond.is_not {
                    format!("not ({})", text)
                } else {
                    text
                }
            }
        }
    }

    /// `in` with sentinel handling: an empty list matches nothing, NULL
    /// members (and `''` where it means NULL) become an `is null` companion.
    fn render_in(&self, left: &str, right: &Expression, negated: bool) -> String {
        let keyword = if negated { "not in" } else { "in" };
        let items = match right {
            Expression::Literal(Literal::List(items)) => items,
            Expression::Subquery(_) => {
                return format!("{} {} {}", left, keyword, self.render_expression(right));
            }
            Expression::Raw(text) if text.trim_start().starts_with('(') => {
                return format!("{} {} {}", left, keyword, self.render_text(text));
            }
            other => {
                return format!("{} {} ({})", left, keyword, self.render_expression(other));
            }
        };

        if items.is_empty() {
            return if negated {
                "1 = 1".to_string()
            } else {
                format!("{} in (null)", left)
            };
        }

        let empty_is_null = self.dialect().supports(Feature::EmptyStringIsNull);
        let is_nullish = |l: &Literal| l.is_null() || (empty_is_null && l.is_empty_string());
        let has_null = items.iter().any(is_nullish);
        let values: Vec<String> = items
            .iter()
            .filter(|&l| !is_nullish(l))
            .map(|l| self.render_literal(l))
            .collect();

        match (values.is_empty(), has_null, negated) {
            (true, _, false) => format!("{} is null", left),
            (true, _, true) => format!("{} is not null", left),
            (false, false, _) => format!("{} {} ({})", left, keyword, values.join(", ")),
            (false, true, false) => {
                format!("({} in ({}) or {} is null)", left, values.join(", "), left)
            }
            (false, true, true) => {
                format!("({} not in ({}) and {} is not null)", left, values.join(", "), left)
            }
        }
    }

    fn render_trinary(&self, cond: &TrinaryCondition) -> String {
        let keyword = if cond.is_not { "not between" } else { "between" };
        format!(
            "{} {} {} and {}",
            self.render_expression(&cond.expr),
            keyword,
            self.render_expression(&cond.low),
            self.render_expression(&cond.high)
        )
    }
}
