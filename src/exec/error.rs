use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio_postgres::types::WrongType;

/// Broad classification of a driver error, derived from SQLSTATE classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE 42601 and friends)
    Syntax,
    /// Missing tables or columns, ambiguous references
    Semantic,
    /// Runtime failures such as division by zero or constraint violations
    Execution,
    Transaction,
    Connection,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

/// Where a driver failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The server rejected the statement.
    Database,
    /// A parameter value could not be converted to the statement's type.
    Conversion,
    Connection,
    Other,
}

/// Failure reported by a database driver, with the server's diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    /// Vendor error code (SQLSTATE for PostgreSQL).
    pub code: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// 1-based character position in the statement text.
    pub position: Option<u32>,
    pub category: ErrorCategory,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            detail: None,
            hint: None,
            position: None,
            category: match kind {
                DriverErrorKind::Connection => ErrorCategory::Connection,
                _ => ErrorCategory::Unknown,
            },
        }
    }

    /// Database error carrying a vendor code.
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            kind: DriverErrorKind::Database,
            category: categorize_sqlstate(&code),
            code: Some(code),
            message: message.into(),
            detail: None,
            hint: None,
            position: None,
        }
    }

    pub fn from_pg_error(err: &tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let code = db_err.code().code().to_string();
            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            return Self {
                kind: DriverErrorKind::Database,
                category: categorize_sqlstate(&code),
                code: Some(code),
                message: db_err.message().to_string(),
                detail: db_err.detail().map(|s| s.to_string()),
                hint: db_err.hint().map(|s| s.to_string()),
                position,
            };
        }

        let is_conversion = err
            .source()
            .is_some_and(|s| s.downcast_ref::<WrongType>().is_some())
            || err.to_string().starts_with("error serializing parameter");
        let kind = if is_conversion {
            DriverErrorKind::Conversion
        } else if err.is_closed() || err.source().is_some() {
            DriverErrorKind::Connection
        } else {
            DriverErrorKind::Other
        };
        let mut driver = Self::new(kind, err.to_string());
        driver.detail = err.source().map(|e| e.to_string());
        driver
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Multi-line rendering with line/column resolved against `sql`.
    pub fn display_full(&self, sql: &str) -> String {
        let mut lines = vec![format!("{}: {}", self.category, self.message)];

        if let Some(pos) = self.position {
            let (line, col) = byte_offset_to_line_col(sql, pos as usize);
            lines.push(format!("  at line {}, column {}", line, col));
        }
        if let Some(code) = &self.code {
            lines.push(format!("  Code: {}", code));
        }
        if let Some(detail) = &self.detail {
            lines.push(format!("  Detail: {}", detail));
        }
        if let Some(hint) = &self.hint {
            lines.push(format!("  Hint: {}", hint));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("cannot connect to data source {data_source}: {message}")]
    Connection { data_source: String, message: String },

    #[error("parameter binding failed: {0}")]
    Binding(String),

    #[error("statement was cancelled")]
    Cancelled,

    #[error("statement timed out after {elapsed:?}")]
    TimedOut { elapsed: Duration },

    #[error("{source}")]
    Execution {
        sql: String,
        /// Bound values, rendered for diagnostics.
        parameters: Vec<String>,
        source: DriverError,
    },
}

impl ExecError {
    pub fn connection(data_source: impl Into<String>, message: impl fmt::Display) -> Self {
        ExecError::Connection {
            data_source: data_source.into(),
            message: message.to_string(),
        }
    }

    /// Driver diagnostics, when the failure came from the driver.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            ExecError::Execution { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convert a 1-based byte offset in a statement to 1-based (line, column).
pub(crate) fn byte_offset_to_line_col(sql: &str, byte_pos: usize) -> (usize, usize) {
    if byte_pos == 0 || sql.is_empty() {
        return (1, 1);
    }
    let target = (byte_pos - 1).min(sql.len());
    let mut line = 1usize;
    let mut col = 1usize;
    for (i, ch) in sql.char_indices() {
        if i >= target {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Categorize a SQLSTATE code. Non-SQLSTATE vendor codes land in `Unknown`.
pub(crate) fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code.len() != 5 || !code.is_ascii() {
        return ErrorCategory::Unknown;
    }
    match &code[..2] {
        "42" if code == "42601" || code == "42000" => ErrorCategory::Syntax,
        "42" => ErrorCategory::Semantic,
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Syntax.to_string(), "Syntax Error");
        assert_eq!(ErrorCategory::Connection.to_string(), "Connection Error");
        assert_eq!(ErrorCategory::Unknown.to_string(), "Error");
    }

    #[test]
    fn test_categorize_sqlstate() {
        assert_eq!(categorize_sqlstate("42601"), ErrorCategory::Syntax);
        assert_eq!(categorize_sqlstate("42P01"), ErrorCategory::Semantic);
        assert_eq!(categorize_sqlstate("23505"), ErrorCategory::Execution);
        assert_eq!(categorize_sqlstate("57014"), ErrorCategory::Execution);
        assert_eq!(categorize_sqlstate("40001"), ErrorCategory::Transaction);
        assert_eq!(categorize_sqlstate("08006"), ErrorCategory::Connection);
        assert_eq!(categorize_sqlstate("-952"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_byte_offset_to_line_col() {
        let sql = "select *\nfrom users\nwhere id = 1";
        assert_eq!(byte_offset_to_line_col(sql, 1), (1, 1));
        assert_eq!(byte_offset_to_line_col(sql, 10), (2, 1));
        assert_eq!(byte_offset_to_line_col(sql, 21), (3, 1));
    }

    #[test]
    fn test_display_full() {
        let mut err = DriverError::database("42601", "syntax error at or near \",\"");
        err.position = Some(11);
        err.hint = Some("Remove trailing comma.".into());
        let full = err.display_full("select a,\nfrom t");
        assert!(full.starts_with("Syntax Error: syntax error"));
        assert!(full.contains("at line 2, column 1"));
        assert!(full.contains("Code: 42601"));
        assert!(full.contains("Hint: Remove trailing comma."));
    }

    #[test]
    fn test_exec_error_exposes_driver_error() {
        let err = ExecError::Execution {
            sql: "select 1".into(),
            parameters: vec![],
            source: DriverError::database("42P01", "relation \"t\" does not exist"),
        };
        assert_eq!(err.to_string(), "relation \"t\" does not exist");
        assert_eq!(err.driver_error().and_then(|e| e.code()), Some("42P01"));
        assert!(ExecError::Binding("x".into()).driver_error().is_none());
    }
}
