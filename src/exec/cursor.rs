use std::time::Instant;

use super::cancel::{CancelToken, Registration};
use super::driver::{DriverConnection, RowSource, StatementHandle};
use super::error::{DriverError, ExecError};
use super::value::{CellValue, ColumnInfo, QueryResult};

/// Forward-only rows of an executed statement.
///
/// Holds the connection, the statement and its cancellation registration
/// until the rows are exhausted or the cursor is closed or dropped.
pub struct RowCursor {
    columns: Vec<ColumnInfo>,
    statement: StatementHandle,
    parameters: Vec<String>,
    max_rows: Option<usize>,
    fetched: usize,
    started: Instant,
    cancel: Option<CancelToken>,
    held: Option<Held>,
}

// Released together once the rows are done. Fields drop in order: the
// registration goes before the connection returns to its pool.
struct Held {
    rows: Box<dyn RowSource>,
    _registration: Registration,
    _connection: Box<dyn DriverConnection>,
}

impl RowCursor {
    pub(crate) fn new(
        rows: Box<dyn RowSource>,
        statement: StatementHandle,
        parameters: Vec<String>,
        max_rows: Option<usize>,
        cancel: Option<CancelToken>,
        connection: Box<dyn DriverConnection>,
        registration: Registration,
    ) -> Self {
        Self {
            columns: rows.columns().to_vec(),
            statement,
            parameters,
            max_rows,
            fetched: 0,
            started: Instant::now(),
            cancel,
            held: Some(Held {
                rows,
                _connection: connection,
                _registration: registration,
            }),
        }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn sql(&self) -> &str {
        &self.statement.sql
    }

    pub fn fetched(&self) -> usize {
        self.fetched
    }

    pub fn is_open(&self) -> bool {
        self.held.is_some()
    }

    /// Next row, or `None` once exhausted or `max_rows` is reached.
    pub async fn next(&mut self) -> Result<Option<Vec<CellValue>>, ExecError> {
        if self.max_rows.is_some_and(|max| self.fetched >= max) {
            self.release();
        }
        let Some(held) = self.held.as_mut() else {
            return Ok(None);
        };
        match held.rows.next_row().await {
            Ok(Some(row)) => {
                self.fetched += 1;
                Ok(Some(row))
            }
            Ok(None) => {
                self.release();
                Ok(None)
            }
            Err(e) => {
                self.release();
                Err(self.failure(e))
            }
        }
    }

    /// Read the remaining rows.
    pub async fn collect(mut self) -> Result<QueryResult, ExecError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        let mut result = QueryResult {
            columns: std::mem::take(&mut self.columns),
            row_count: rows.len(),
            rows,
            execution_time: self.started.elapsed(),
        };
        result.fit_widths();
        Ok(result)
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.held.take().is_some() {
            tracing::debug!(sql = %self.statement.sql, rows = self.fetched, "cursor closed");
        }
    }

    fn failure(&self, source: DriverError) -> ExecError {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return ExecError::Cancelled;
        }
        ExecError::Execution {
            sql: self.statement.sql.clone(),
            parameters: self.parameters.clone(),
            source,
        }
    }
}

impl std::fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("sql", &self.statement.sql)
            .field("fetched", &self.fetched)
            .field("open", &self.is_open())
            .finish()
    }
}
