use super::expr::is_path;
use super::Pass;
use crate::dialect::Feature;
use crate::model::SortDirection;

impl Pass<'_> {
    /// GROUP BY list. Expressions fall back to their select-list ordinal on
    /// products that cannot group by expression.
    pub(super) fn render_group_by(&self) -> Option<String> {
        let items = self.query.group_by()?;
        let d = self.dialect();
        let selection = self.query.selection();
        let rendered: Vec<String> = items
            .iter()
            .map(|item| {
                let ordinal = selection.ordinal_of(item, &self.output_names);
                let is_expression = !is_path(item)
                    || ordinal.is_some_and(|n| selection.columns[n - 1].is_expression);
                match ordinal {
                    Some(n) if is_expression && !d.supports(Feature::GroupByExpression) => n.to_string(),
                    Some(n) if selection.columns[n - 1].is_expression => {
                        self.render_text(&selection.columns[n - 1].column)
                    }
                    _ => self.render_reference(item),
                }
            })
            .collect();
        Some(rendered.join(", "))
    }

    /// ORDER BY list. Selected expressions sort by ordinal where expressions
    /// are not allowed; selected columns sort by output alias where the
    /// product only sorts by select-list names.
    pub(super) fn render_order_by(&self) -> Option<String> {
        let items = self.query.order_by();
        if items.is_empty() {
            return None;
        }
        let d = self.dialect();
        let selection = self.query.selection();
        let rendered: Vec<String> = items
            .iter()
            .map(|item| {
                let target = match selection.ordinal_of(&item.field, &self.output_names) {
                    Some(n) if selection.columns[n - 1].is_expression
                        && !d.supports(Feature::OrderByExpression) =>
                    {
                        n.to_string()
                    }
                    Some(n) if !d.supports(Feature::NonAnsiOrderBy) => {
                        d.quote_identifier(&self.output_names[n - 1])
                    }
                    Some(n) if selection.columns[n - 1].is_expression => {
                        self.render_text(&selection.columns[n - 1].column)
                    }
                    _ => self.render_reference(&item.field),
                };
                let direction = match item.direction {
                    SortDirection::Asc => "asc",
                    SortDirection::Desc => "desc",
                };
                format!("{} {}", target, direction)
            })
            .collect();
        Some(rendered.join(", "))
    }
}
