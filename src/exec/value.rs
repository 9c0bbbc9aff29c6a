//! Parameter values going in, cell values coming out.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::time::Duration;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type, WrongType};
use tokio_postgres::Row;

/// A bindable parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// Expanded into one placeholder per element when bound.
    List(Vec<ParamValue>),
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    pub fn is_bool(&self) -> bool {
        match self {
            ParamValue::Bool(_) => true,
            ParamValue::List(items) => items.iter().any(ParamValue::is_bool),
            _ => false,
        }
    }

    /// Text form used in diagnostics.
    pub fn display(&self) -> String {
        match self {
            ParamValue::Null => "NULL".to_string(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Text(s) => format!("'{}'", s),
            ParamValue::Date(d) => d.to_string(),
            ParamValue::Timestamp(ts) => ts.to_string(),
            ParamValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.display()).collect();
                format!("({})", parts.join(", "))
            }
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ParamValue::Null, Into::into)
    }
}

type BoxError = Box<dyn StdError + Sync + Send>;

fn checked<T: ToSql>(value: &T, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if T::accepts(ty) {
        value.to_sql(ty, out)
    } else {
        Err(Box::new(WrongType::new::<T>(ty.clone())))
    }
}

impl ToSql for ParamValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            ParamValue::Null => Ok(IsNull::Yes),
            ParamValue::Bool(b) => checked(b, ty, out),
            ParamValue::Int(i) => match *ty {
                Type::INT2 => checked(&i16::try_from(*i)?, ty, out),
                Type::INT4 => checked(&i32::try_from(*i)?, ty, out),
                Type::FLOAT8 => checked(&(*i as f64), ty, out),
                _ => checked(i, ty, out),
            },
            ParamValue::Float(f) => match *ty {
                Type::FLOAT4 => checked(&(*f as f32), ty, out),
                _ => checked(f, ty, out),
            },
            ParamValue::Text(s) => checked(s, ty, out),
            ParamValue::Date(d) => checked(d, ty, out),
            ParamValue::Timestamp(ts) => checked(ts, ty, out),
            ParamValue::List(_) => Err("list parameters must be expanded before binding".into()),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub max_width: usize,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let name = name.into();
        let max_width = unicode_width::UnicodeWidthStr::width(name.as_str());
        Self {
            name,
            type_name: type_name.into(),
            max_width,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
    Unknown(String),
}

impl CellValue {
    pub fn display(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int16(i) => i.to_string(),
            CellValue::Int32(i) => i.to_string(),
            CellValue::Int64(i) => i.to_string(),
            CellValue::Float32(f) => f.to_string(),
            CellValue::Float64(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Bytes(b) => format!("[{} bytes]", b.len()),
            CellValue::Date(d) => d.to_string(),
            CellValue::Time(t) => t.to_string(),
            CellValue::DateTime(dt) => dt.to_string(),
            CellValue::TimestampTz(dt) => dt.to_string(),
            CellValue::Json(j) => j.to_string(),
            CellValue::Unknown(s) => s.clone(),
        }
    }

    pub fn display_width(&self) -> usize {
        unicode_width::UnicodeWidthStr::width(self.display().as_str())
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
            CellValue::Int16(i) => serde_json::json!(*i),
            CellValue::Int32(i) => serde_json::json!(*i),
            CellValue::Int64(i) => serde_json::json!(*i),
            CellValue::Float32(f) => serde_json::json!(*f),
            CellValue::Float64(f) => serde_json::json!(*f),
            CellValue::Json(j) => j.clone(),
            other => serde_json::Value::String(other.display()),
        }
    }
}

/// Fully collected rows of one statement.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
    pub row_count: usize,
    pub execution_time: Duration,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: vec![],
            rows: vec![],
            row_count: 0,
            execution_time: Duration::ZERO,
        }
    }

    /// Rows as an array of objects keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (i, cell) in row.iter().enumerate() {
                    let name = self
                        .columns
                        .get(i)
                        .map(|c| c.name.clone())
                        .unwrap_or_else(|| format!("column_{}", i));
                    obj.insert(name, cell.to_json());
                }
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    /// Aligned text table, padded by display width.
    pub fn to_table(&self) -> String {
        let pad = |text: &str, width: usize| {
            let used = unicode_width::UnicodeWidthStr::width(text);
            format!("{}{}", text, " ".repeat(width.saturating_sub(used)))
        };
        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        let header: Vec<String> = self.columns.iter().map(|c| pad(&c.name, c.max_width)).collect();
        lines.push(header.join(" | ").trim_end().to_string());
        let rule: Vec<String> = self.columns.iter().map(|c| "-".repeat(c.max_width)).collect();
        lines.push(rule.join("-+-"));
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, cell)| pad(&cell.display(), self.columns.get(i).map_or(0, |c| c.max_width)))
                .collect();
            lines.push(cells.join(" | ").trim_end().to_string());
        }
        lines.join("\n")
    }

    /// Widen column widths to fit every cell.
    pub fn fit_widths(&mut self) {
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(col) = self.columns.get_mut(i) {
                    col.max_width = col.max_width.max(cell.display_width());
                }
            }
        }
    }
}

pub(crate) fn row_values(row: &Row) -> Vec<CellValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| extract_value(row, i, col.type_()))
        .collect()
}

fn extract_value(row: &Row, idx: usize, pg_type: &Type) -> CellValue {
    fn get<'a, T: tokio_postgres::types::FromSql<'a>>(
        row: &'a Row,
        idx: usize,
        wrap: fn(T) -> CellValue,
    ) -> CellValue {
        row.try_get::<_, Option<T>>(idx)
            .ok()
            .flatten()
            .map(wrap)
            .unwrap_or(CellValue::Null)
    }

    match *pg_type {
        Type::BOOL => get(row, idx, CellValue::Bool),
        Type::INT2 => get(row, idx, CellValue::Int16),
        Type::INT4 => get(row, idx, CellValue::Int32),
        Type::INT8 => get(row, idx, CellValue::Int64),
        Type::FLOAT4 => get(row, idx, CellValue::Float32),
        Type::FLOAT8 => get(row, idx, CellValue::Float64),
        Type::TEXT | Type::VARCHAR | Type::NAME | Type::CHAR | Type::BPCHAR => {
            get(row, idx, CellValue::Text)
        }
        Type::BYTEA => get(row, idx, CellValue::Bytes),
        Type::DATE => get(row, idx, CellValue::Date),
        Type::TIME => get(row, idx, CellValue::Time),
        Type::TIMESTAMP => get(row, idx, CellValue::DateTime),
        Type::TIMESTAMPTZ => get(row, idx, CellValue::TimestampTz),
        Type::JSON | Type::JSONB => get(row, idx, CellValue::Json),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(Some(s)) => CellValue::Text(s),
            Ok(None) => CellValue::Null,
            Err(_) => CellValue::Unknown(format!("<{}>", pg_type.name())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::Null.display(), "NULL");
        assert_eq!(CellValue::Bool(false).display(), "false");
        assert_eq!(CellValue::Int32(-100).display(), "-100");
        assert_eq!(CellValue::Bytes(vec![1, 2, 3]).display(), "[3 bytes]");
        let json = CellValue::Json(serde_json::json!({"key": "value"})).display();
        assert!(json.contains("key") && json.contains("value"));
    }

    #[test]
    fn test_display_width() {
        assert_eq!(CellValue::Null.display_width(), 4);
        assert_eq!(CellValue::Text("日本".into()).display_width(), 4);
    }

    #[test]
    fn test_fit_widths() {
        let mut result = QueryResult {
            columns: vec![ColumnInfo::new("id", "int4")],
            rows: vec![vec![CellValue::Int64(123456)]],
            row_count: 1,
            execution_time: Duration::ZERO,
        };
        result.fit_widths();
        assert_eq!(result.columns[0].max_width, 6);
    }

    #[test]
    fn test_json_and_table_output() {
        let mut result = QueryResult {
            columns: vec![ColumnInfo::new("id", "int4"), ColumnInfo::new("name", "text")],
            rows: vec![
                vec![CellValue::Int32(1), CellValue::Text("Alice".into())],
                vec![CellValue::Int32(20), CellValue::Null],
            ],
            row_count: 2,
            execution_time: Duration::ZERO,
        };
        result.fit_widths();
        let json = result.to_json();
        assert_eq!(json[0]["id"], 1);
        assert_eq!(json[0]["name"], "Alice");
        assert!(json[1]["name"].is_null());
        assert_eq!(
            result.to_table(),
            "id | name\n---+------\n1  | Alice\n20 | NULL"
        );
    }

    #[test]
    fn test_param_to_sql_checks_types() {
        let mut buf = BytesMut::new();
        assert!(ParamValue::Bool(true).to_sql(&Type::BOOL, &mut buf).is_ok());
        assert!(ParamValue::Bool(true).to_sql(&Type::TEXT, &mut buf).is_err());
        assert!(ParamValue::Text("1".into()).to_sql(&Type::TEXT, &mut buf).is_ok());
        assert!(ParamValue::Int(7).to_sql(&Type::INT4, &mut buf).is_ok());
        assert!(ParamValue::Int(i64::MAX).to_sql(&Type::INT2, &mut buf).is_err());
        assert!(matches!(
            ParamValue::Null.to_sql(&Type::INT8, &mut buf),
            Ok(IsNull::Yes)
        ));
    }

    #[test]
    fn test_param_helpers() {
        assert!(ParamValue::List(vec![ParamValue::Int(1), ParamValue::Bool(false)]).is_bool());
        assert!(!ParamValue::Text("true".into()).is_bool());
        assert_eq!(ParamValue::from(None::<i64>), ParamValue::Null);
        assert_eq!(ParamValue::from("x").display(), "'x'");
    }
}
