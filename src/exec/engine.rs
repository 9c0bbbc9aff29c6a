//! Query execution: dialect resolution, binding, bounded retry, timeouts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::dialect::{Dialect, DialectRegistry, Feature};

use super::cancel::{CancelToken, CancellationRegistry};
use super::cursor::RowCursor;
use super::datasource::DataSource;
use super::driver::{
    ConnectionProvider, DriverConnection, DriverOutcome, StatementHandle, StatementKind,
};
use super::error::{DriverError, ExecError};
use super::params::{bind_named, BoundStatement, ParameterTable, Principal, QuerySource};
use super::pool::PoolFactory;
use super::retry::{classify, AttemptPlan, BooleanMode, MAX_ATTEMPTS};
use super::value::{CellValue, ColumnInfo, ParamValue};

/// One statement to run.
#[derive(Debug)]
pub struct ExecutionRequest {
    pub source: QuerySource,
    pub parameters: ParameterTable,
    pub principal: Option<Principal>,
    /// Row limit applied to the rendered query and the cursor.
    pub max_rows: Option<usize>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl ExecutionRequest {
    pub fn new(source: impl Into<QuerySource>) -> Self {
        Self {
            source: source.into(),
            parameters: ParameterTable::new(),
            principal: None,
            max_rows: None,
            timeout: None,
            cancel: None,
        }
    }

    pub fn parameters(mut self, parameters: ParameterTable) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug)]
pub enum QueryOutcome {
    Rows(RowCursor),
    OutputParameters {
        columns: Vec<ColumnInfo>,
        values: Vec<CellValue>,
    },
    /// The statement ran past its timeout and was interrupted.
    TimedOut { elapsed: Duration, limit: Duration },
}

enum AttemptFailure {
    Driver(DriverError),
    TimedOut(Duration),
}

pub struct QueryEngine {
    registry: Arc<DialectRegistry>,
    cancellations: Arc<CancellationRegistry>,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, Arc::new(DialectRegistry::new()))
    }

    pub fn with_registry(config: EngineConfig, registry: Arc<DialectRegistry>) -> Self {
        Self {
            registry,
            cancellations: Arc::new(CancellationRegistry::new()),
            config,
        }
    }

    pub fn dialects(&self) -> &Arc<DialectRegistry> {
        &self.registry
    }

    pub fn cancellations(&self) -> &Arc<CancellationRegistry> {
        &self.cancellations
    }

    /// Run a request against the data source's pool.
    pub async fn execute(
        &self,
        data_source: &DataSource,
        request: ExecutionRequest,
    ) -> Result<QueryOutcome, ExecError> {
        let provider = PoolFactory::global(&self.config.pool)
            .provider(data_source, request.principal.as_ref())?;
        self.execute_with(&provider, data_source, request).await
    }

    /// A pooled connection for metadata work outside the engine.
    pub async fn get_connection(
        &self,
        data_source: &DataSource,
        principal: Option<&Principal>,
    ) -> Result<Box<dyn DriverConnection>, ExecError> {
        PoolFactory::global(&self.config.pool)
            .provider(data_source, principal)?
            .acquire()
            .await
    }

    /// Run a request with connections from `provider`.
    pub async fn execute_with(
        &self,
        provider: &dyn ConnectionProvider,
        data_source: &DataSource,
        request: ExecutionRequest,
    ) -> Result<QueryOutcome, ExecError> {
        let ExecutionRequest {
            source,
            parameters,
            principal,
            max_rows,
            timeout,
            cancel,
        } = request;
        let max_rows = max_rows.or(self.config.execution.default_max_rows);
        let timeout = timeout.or_else(|| self.config.execution.default_timeout());
        let params = match &principal {
            Some(principal) => parameters.with_principal(principal),
            None => parameters,
        };

        let mut conn = provider.acquire().await?;
        let dialect = self.resolve_dialect(data_source, conn.as_mut()).await?;

        let rendered = match &source {
            QuerySource::Model(query) => {
                let mut query = query.clone();
                if let Some(n) = max_rows {
                    query.set_row_limit(Some(n as u64));
                }
                query.render_with(&dialect, data_source.render_options())
            }
            QuerySource::Procedure(_) => String::new(),
        };

        let has_booleans = params.has_booleans();
        let omit_nulls = match &source {
            QuerySource::Procedure(call) => {
                dialect.supports(Feature::NamedProcedureArguments) && call.has_null_arguments(&params)
            }
            QuerySource::Model(_) => false,
        };
        let mut plan = AttemptPlan::initial(&dialect, omit_nulls);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let text = match &source {
                QuerySource::Procedure(call) => {
                    call.render(&dialect, &params, plan.omit_null_arguments)
                }
                QuerySource::Model(_) => rendered.clone(),
            };
            let mut bound = bind_named(&text, &params, dialect.placeholder)?;
            if plan.boolean_mode == BooleanMode::String {
                stringify_booleans(&mut bound.values, &dialect);
            }
            let kind = match &source {
                QuerySource::Procedure(_) => StatementKind::Callable,
                QuerySource::Model(_) if bound.values.is_empty() => StatementKind::Plain,
                QuerySource::Model(_) => StatementKind::Prepared,
            };
            tracing::debug!(attempt, ?kind, sql = %bound.sql, "executing statement");

            let started = Instant::now();
            let failure = match conn.prepare(kind, &bound.sql).await {
                Err(e) => AttemptFailure::Driver(e),
                Ok(handle) => {
                    let registration = self.cancellations.register(conn.canceller(), cancel.as_ref());
                    if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                        return Err(ExecError::Cancelled);
                    }
                    match self.run(conn.as_mut(), &dialect, &handle, &bound, timeout).await {
                        Ok(DriverOutcome::Rows(rows)) => {
                            let parameters = bound.describe();
                            return Ok(QueryOutcome::Rows(RowCursor::new(
                                rows,
                                handle,
                                parameters,
                                max_rows,
                                cancel,
                                conn,
                                registration,
                            )));
                        }
                        Ok(DriverOutcome::OutputParameters { columns, values }) => {
                            return Ok(QueryOutcome::OutputParameters { columns, values });
                        }
                        Err(failure) => failure,
                    }
                }
            };

            let error = match failure {
                AttemptFailure::TimedOut(limit) => {
                    return Ok(QueryOutcome::TimedOut {
                        elapsed: started.elapsed(),
                        limit,
                    });
                }
                AttemptFailure::Driver(error) => error,
            };

            if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(ExecError::Cancelled);
            }
            if let Some(code) = error.code() {
                if let Some(limit) = timeout.filter(|_| dialect.retry.is_timeout(code)) {
                    let elapsed = started.elapsed();
                    if elapsed >= limit {
                        return Ok(QueryOutcome::TimedOut { elapsed, limit });
                    }
                }
                if dialect.retry.is_cancelled(code) {
                    return Err(ExecError::Cancelled);
                }
            }

            let next = if attempt < MAX_ATTEMPTS {
                classify(plan, &error, &dialect, has_booleans)
            } else {
                None
            };
            match next {
                Some(next) => {
                    tracing::warn!(
                        attempt,
                        code = error.code().unwrap_or("-"),
                        error = %error,
                        ?next,
                        "retrying statement"
                    );
                    plan = next;
                }
                None => return Err(execution_error(&bound, error)),
            }
        }
    }

    async fn run(
        &self,
        conn: &mut dyn DriverConnection,
        dialect: &Dialect,
        handle: &StatementHandle,
        bound: &BoundStatement,
        timeout: Option<Duration>,
    ) -> Result<DriverOutcome, AttemptFailure> {
        if dialect.supports(Feature::StatementTimeout) {
            conn.set_statement_timeout(timeout)
                .await
                .map_err(AttemptFailure::Driver)?;
            return conn
                .execute(handle, &bound.values)
                .await
                .map_err(AttemptFailure::Driver);
        }

        let Some(limit) = timeout else {
            return conn
                .execute(handle, &bound.values)
                .await
                .map_err(AttemptFailure::Driver);
        };
        let canceller = conn.canceller();
        match tokio::time::timeout(limit, conn.execute(handle, &bound.values)).await {
            Ok(result) => result.map_err(AttemptFailure::Driver),
            Err(_) => {
                if let Err(e) = canceller.cancel().await {
                    tracing::warn!(error = %e, "cancel after timeout failed");
                }
                Err(AttemptFailure::TimedOut(limit))
            }
        }
    }

    async fn resolve_dialect(
        &self,
        data_source: &DataSource,
        conn: &mut dyn DriverConnection,
    ) -> Result<Arc<Dialect>, ExecError> {
        if let Some(product) = data_source.product {
            return Ok(self.registry.get(product));
        }
        if let Some(reported) = data_source.detected_product() {
            return Ok(self.registry.resolve(reported));
        }
        let reported = conn
            .product_name()
            .await
            .map_err(|e| ExecError::connection(data_source.identity(), e))?;
        let dialect = self.registry.resolve(&reported);
        tracing::info!(
            data_source = %data_source.identity(),
            reported = %reported,
            product = %dialect.product,
            "detected database product"
        );
        data_source.remember_product(reported);
        Ok(dialect)
    }

    /// Cancel a running statement by registry id.
    pub async fn cancel(&self, statement_id: u64) -> bool {
        self.cancellations.cancel(statement_id).await
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn stringify_booleans(values: &mut [ParamValue], dialect: &Dialect) {
    for value in values.iter_mut() {
        if let ParamValue::Bool(b) = value {
            *value = ParamValue::Text(dialect.boolean_string(*b).to_string());
        }
    }
}

fn execution_error(bound: &BoundStatement, source: DriverError) -> ExecError {
    ExecError::Execution {
        sql: bound.sql.clone(),
        parameters: bound.describe(),
        source,
    }
}
