use super::Pass;

impl Pass<'_> {
    /// Select list, aliasing expressions and renamed columns.
    pub(super) fn render_projection(&self) -> String {
        let selection = self.query.selection();
        if selection.is_empty() {
            return "*".to_string();
        }
        let d = self.dialect();
        let items: Vec<String> = selection
            .iter()
            .zip(&self.output_names)
            .map(|(col, output)| {
                let rendered = if col.is_expression {
                    self.render_text(&col.column)
                } else {
                    self.render_reference(&col.column)
                };
                let is_star = col.column == "*" || col.column.ends_with(".*");
                let renamed = col.is_expression || col.natural_name() != Some(output.as_str());
                if renamed && !is_star {
                    format!("{} as {}", rendered, d.quote_identifier(output))
                } else {
                    rendered
                }
            })
            .collect();
        items.join(", ")
    }
}
