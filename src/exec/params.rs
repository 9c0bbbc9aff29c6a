//! Named parameters and their translation to positional placeholders.

use crate::dialect::{Dialect, PlaceholderStyle};
use crate::model::StructuredQuery;

use super::error::ExecError;
use super::value::ParamValue;

pub const USER_PARAM: &str = "user";
pub const ROLES_PARAM: &str = "roles";
pub const GROUPS_PARAM: &str = "groups";

/// The identity a statement runs for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Principal {
    pub user: String,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
}

impl Principal {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }
}

/// Ordered name/value pairs. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTable {
    entries: Vec<(String, ParamValue)>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_booleans(&self) -> bool {
        self.entries.iter().any(|(_, v)| v.is_bool())
    }

    /// Add `user`, `roles` and `groups` for the principal, keeping any
    /// value the caller already set.
    pub fn with_principal(mut self, principal: &Principal) -> Self {
        let list = |items: &[String]| {
            ParamValue::List(items.iter().cloned().map(ParamValue::Text).collect())
        };
        if !self.contains(USER_PARAM) {
            self.set(USER_PARAM, principal.user.clone());
        }
        if !self.contains(ROLES_PARAM) {
            self.set(ROLES_PARAM, list(&principal.roles));
        }
        if !self.contains(GROUPS_PARAM) {
            self.set(GROUPS_PARAM, list(&principal.groups));
        }
        self
    }
}

/// SQL with positional placeholders and the values to send for them.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub values: Vec<ParamValue>,
    /// Parameter name of each value, in placeholder order.
    pub names: Vec<String>,
}

impl BoundStatement {
    pub fn has_booleans(&self) -> bool {
        self.values.iter().any(ParamValue::is_bool)
    }

    /// Values rendered for error reports.
    pub fn describe(&self) -> Vec<String> {
        self.names
            .iter()
            .zip(&self.values)
            .map(|(n, v)| format!("{} = {}", n, v.display()))
            .collect()
    }
}

/// Replace each `${name}` outside string literals with positional
/// placeholders. A list value expands to one placeholder per element; an
/// empty list becomes `null`.
pub fn bind_named(
    sql: &str,
    params: &ParameterTable,
    style: PlaceholderStyle,
) -> Result<BoundStatement, ExecError> {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut names = Vec::new();
    let mut rest = sql;

    while let Some(pos) = rest.find(['\'', '$']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with('\'') {
            let end = literal_end(tail);
            out.push_str(&tail[..end]);
            rest = &tail[end..];
            continue;
        }

        if !tail.starts_with("${") {
            out.push('$');
            rest = &tail[1..];
            continue;
        }

        let Some(close) = tail.find('}') else {
            return Err(ExecError::Binding(format!("unterminated parameter in: {}", tail)));
        };
        let name = tail[2..close].trim();
        let value = params
            .get(name)
            .ok_or_else(|| ExecError::Binding(format!("no value for parameter '{}'", name)))?;

        match value {
            ParamValue::List(items) if items.is_empty() => out.push_str("null"),
            ParamValue::List(items) => {
                let placeholders: Vec<String> = items
                    .iter()
                    .map(|item| {
                        values.push(item.clone());
                        names.push(name.to_string());
                        style.placeholder(values.len())
                    })
                    .collect();
                out.push_str(&placeholders.join(", "));
            }
            single => {
                values.push(single.clone());
                names.push(name.to_string());
                out.push_str(&style.placeholder(values.len()));
            }
        }
        rest = &tail[close + 1..];
    }
    out.push_str(rest);

    Ok(BoundStatement { sql: out, values, names })
}

/// Byte length of the quoted literal at the start of `s`, doubled quotes
/// included. An unterminated literal runs to the end.
fn literal_end(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// A stored procedure invocation with named arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    pub name: String,
    /// Argument names, in declaration order.
    pub arguments: Vec<String>,
}

impl ProcedureCall {
    pub fn new(name: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Call text with `${arg}` markers. When `omit_nulls` is set, arguments
    /// without a non-null value are left out and the rest are passed by name.
    pub fn render(&self, dialect: &Dialect, params: &ParameterTable, omit_nulls: bool) -> String {
        let args: Vec<String> = if omit_nulls {
            self.arguments
                .iter()
                .filter(|a| params.get(a).is_some_and(|v| !v.is_null()))
                .map(|a| dialect.format_named_argument(a, &format!("${{{}}}", a)))
                .collect()
        } else {
            self.arguments.iter().map(|a| format!("${{{}}}", a)).collect()
        };
        dialect.format_procedure_call(&self.name, &args)
    }

    pub fn has_null_arguments(&self, params: &ParameterTable) -> bool {
        self.arguments
            .iter()
            .any(|a| params.get(a).map_or(true, ParamValue::is_null))
    }
}

/// What a request executes.
#[derive(Debug, Clone)]
pub enum QuerySource {
    Model(StructuredQuery),
    Procedure(ProcedureCall),
}

impl From<StructuredQuery> for QuerySource {
    fn from(query: StructuredQuery) -> Self {
        QuerySource::Model(query)
    }
}

impl From<ProcedureCall> for QuerySource {
    fn from(call: ProcedureCall) -> Self {
        QuerySource::Procedure(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Product;

    #[test]
    fn test_bind_dollar_placeholders() {
        let params = ParameterTable::new().with("id", 7).with("name", "bob");
        let bound = bind_named(
            "select * from t where id = ${id} and name = ${name} or id = ${id}",
            &params,
            PlaceholderStyle::Dollar,
        )
        .unwrap();
        assert_eq!(bound.sql, "select * from t where id = $1 and name = $2 or id = $3");
        assert_eq!(bound.values, vec![ParamValue::Int(7), ParamValue::from("bob"), ParamValue::Int(7)]);
        assert_eq!(bound.names, vec!["id", "name", "id"]);
    }

    #[test]
    fn test_bind_lists() {
        let params = ParameterTable::new()
            .with("ids", ParamValue::List(vec![ParamValue::Int(1), ParamValue::Int(2), ParamValue::Int(3)]))
            .with("none", ParamValue::List(vec![]));
        let bound = bind_named(
            "select * from t where id in (${ids}) and k in (${none})",
            &params,
            PlaceholderStyle::Question,
        )
        .unwrap();
        assert_eq!(bound.sql, "select * from t where id in (?, ?, ?) and k in (null)");
        assert_eq!(bound.values.len(), 3);
    }

    #[test]
    fn test_bind_skips_string_literals() {
        let params = ParameterTable::new().with("x", 1);
        let bound = bind_named(
            "select '${x}', 'it''s ${x}', $$ from t where a = ${x}",
            &params,
            PlaceholderStyle::Colon,
        )
        .unwrap();
        assert_eq!(bound.sql, "select '${x}', 'it''s ${x}', $$ from t where a = :1");
        assert_eq!(bound.values, vec![ParamValue::Int(1)]);
    }

    #[test]
    fn test_bind_missing_parameter() {
        let err = bind_named("select ${missing}", &ParameterTable::new(), PlaceholderStyle::Dollar)
            .unwrap_err();
        assert!(matches!(err, ExecError::Binding(msg) if msg.contains("missing")));
    }

    #[test]
    fn test_principal_injection_keeps_caller_values() {
        let principal = Principal {
            user: "alice".into(),
            roles: vec!["admin".into()],
            groups: vec![],
        };
        let params = ParameterTable::new().with("USER", "override").with_principal(&principal);
        assert_eq!(params.get("user"), Some(&ParamValue::from("override")));
        assert_eq!(
            params.get("roles"),
            Some(&ParamValue::List(vec![ParamValue::from("admin")]))
        );
        assert_eq!(params.get("groups"), Some(&ParamValue::List(vec![])));
    }

    #[test]
    fn test_procedure_rendering() {
        let pg = Dialect::for_product(Product::PostgreSql);
        let call = ProcedureCall::new("proc", vec!["a".into(), "b".into(), "c".into()]);
        let params = ParameterTable::new()
            .with("a", 1)
            .with("b", ParamValue::Null)
            .with("c", "x");
        assert!(call.has_null_arguments(&params));
        assert_eq!(call.render(&pg, &params, false), "call proc(${a}, ${b}, ${c})");
        assert_eq!(call.render(&pg, &params, true), "call proc(a => ${a}, c => ${c})");

        let sybase = Dialect::for_product(Product::Sybase);
        assert_eq!(call.render(&sybase, &params, true), "exec proc @a = ${a}, @c = ${c}");
    }
}
