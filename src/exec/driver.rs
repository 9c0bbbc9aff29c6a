//! The seam between the engine and a concrete database driver.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::error::{DriverError, ExecError};
use super::value::{CellValue, ColumnInfo, ParamValue};

/// Hands out connections for one data source and principal.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn DriverConnection>, ExecError>;
}

/// How a statement is sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// No parameters.
    Plain,
    Prepared,
    /// Stored procedure call returning output parameters.
    Callable,
}

/// A statement prepared on one connection.
#[derive(Debug, Clone)]
pub struct StatementHandle {
    pub kind: StatementKind,
    pub sql: String,
    pub(crate) statement: Option<tokio_postgres::Statement>,
}

impl StatementHandle {
    pub fn new(kind: StatementKind, sql: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            statement: None,
        }
    }
}

/// Result of executing a statement.
pub enum DriverOutcome {
    Rows(Box<dyn RowSource>),
    OutputParameters {
        columns: Vec<ColumnInfo>,
        values: Vec<CellValue>,
    },
}

/// Forward-only stream of rows.
#[async_trait]
pub trait RowSource: Send {
    fn columns(&self) -> &[ColumnInfo];
    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>, DriverError>;
}

/// Interrupts whatever statement its connection is running.
#[async_trait]
pub trait Canceller: Send + Sync {
    async fn cancel(&self) -> Result<(), DriverError>;
}

/// One checked-out connection.
#[async_trait]
pub trait DriverConnection: Send {
    /// Product name as reported by the server.
    async fn product_name(&mut self) -> Result<String, DriverError>;

    /// Server-side statement timeout; `None` clears it.
    async fn set_statement_timeout(&mut self, timeout: Option<Duration>) -> Result<(), DriverError>;

    async fn prepare(&mut self, kind: StatementKind, sql: &str) -> Result<StatementHandle, DriverError>;

    fn canceller(&self) -> Arc<dyn Canceller>;

    async fn execute(
        &mut self,
        statement: &StatementHandle,
        params: &[ParamValue],
    ) -> Result<DriverOutcome, DriverError>;
}
