use async_trait::async_trait;
use futures_util::StreamExt;
use postgres_native_tls::MakeTlsConnector;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, RowStream, Statement};

use super::driver::{
    Canceller, DriverConnection, DriverOutcome, RowSource, StatementHandle, StatementKind,
};
use super::error::DriverError;
use super::value::{row_values, CellValue, ColumnInfo, ParamValue};

/// A pooled PostgreSQL connection.
pub struct PgConnection {
    client: deadpool_postgres::Object,
    tls: Option<MakeTlsConnector>,
}

impl PgConnection {
    pub fn new(client: deadpool_postgres::Object, tls: Option<MakeTlsConnector>) -> Self {
        Self { client, tls }
    }
}

/// `0` disables the server timeout, so any set limit is at least 1ms.
fn statement_timeout_ms(timeout: Option<Duration>) -> u128 {
    timeout.map_or(0, |t| t.as_millis().max(1))
}

fn column_info(statement: &Statement) -> Vec<ColumnInfo> {
    statement
        .columns()
        .iter()
        .map(|c| ColumnInfo::new(c.name(), c.type_().name()))
        .collect()
}

#[async_trait]
impl DriverConnection for PgConnection {
    async fn product_name(&mut self) -> Result<String, DriverError> {
        let row = self
            .client
            .query_one("select version()", &[])
            .await
            .map_err(|e| DriverError::from_pg_error(&e))?;
        row.try_get::<_, String>(0)
            .map_err(|e| DriverError::from_pg_error(&e))
    }

    async fn set_statement_timeout(&mut self, timeout: Option<Duration>) -> Result<(), DriverError> {
        let millis = statement_timeout_ms(timeout);
        self.client
            .batch_execute(&format!("set statement_timeout = {}", millis))
            .await
            .map_err(|e| DriverError::from_pg_error(&e))
    }

    async fn prepare(&mut self, kind: StatementKind, sql: &str) -> Result<StatementHandle, DriverError> {
        let prepared = match kind {
            StatementKind::Prepared => self.client.prepare_cached(sql).await,
            StatementKind::Plain | StatementKind::Callable => self.client.prepare(sql).await,
        };
        let mut handle = StatementHandle::new(kind, sql);
        handle.statement = Some(prepared.map_err(|e| DriverError::from_pg_error(&e))?);
        Ok(handle)
    }

    fn canceller(&self) -> Arc<dyn Canceller> {
        Arc::new(PgCanceller {
            token: self.client.cancel_token(),
            tls: self.tls.clone(),
        })
    }

    async fn execute(
        &mut self,
        statement: &StatementHandle,
        params: &[ParamValue],
    ) -> Result<DriverOutcome, DriverError> {
        let stmt = match &statement.statement {
            Some(stmt) => stmt.clone(),
            None => self
                .client
                .prepare(&statement.sql)
                .await
                .map_err(|e| DriverError::from_pg_error(&e))?,
        };
        let columns = column_info(&stmt);
        let stream = self
            .client
            .query_raw(&stmt, params.iter().map(|p| p as &(dyn ToSql + Sync)))
            .await
            .map_err(|e| DriverError::from_pg_error(&e))?;
        let mut rows = PgRows {
            columns,
            stream: Box::pin(stream),
        };

        if statement.kind == StatementKind::Callable {
            let values = rows.next_row().await?.unwrap_or_default();
            return Ok(DriverOutcome::OutputParameters {
                columns: rows.columns,
                values,
            });
        }
        Ok(DriverOutcome::Rows(Box::new(rows)))
    }
}

struct PgRows {
    columns: Vec<ColumnInfo>,
    stream: Pin<Box<RowStream>>,
}

#[async_trait]
impl RowSource for PgRows {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>, DriverError> {
        match self.stream.as_mut().next().await {
            Some(Ok(row)) => Ok(Some(row_values(&row))),
            Some(Err(e)) => Err(DriverError::from_pg_error(&e)),
            None => Ok(None),
        }
    }
}

/// Sends a cancel request over a separate connection.
struct PgCanceller {
    token: tokio_postgres::CancelToken,
    tls: Option<MakeTlsConnector>,
}

#[async_trait]
impl Canceller for PgCanceller {
    async fn cancel(&self) -> Result<(), DriverError> {
        let result = match &self.tls {
            Some(tls) => self.token.cancel_query(tls.clone()).await,
            None => self.token.cancel_query(NoTls).await,
        };
        result.map_err(|e| DriverError::from_pg_error(&e))
    }
}
