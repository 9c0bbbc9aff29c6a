//! In-memory driver that records statements and replays scripted outcomes.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use super::cancel::CancellationRegistry;
use super::driver::{
    Canceller, ConnectionProvider, DriverConnection, DriverOutcome, RowSource, StatementHandle,
    StatementKind,
};
use super::error::{DriverError, ExecError};
use super::value::{CellValue, ColumnInfo, ParamValue};

pub(crate) enum Step {
    Rows(Vec<Vec<CellValue>>),
    Fail(DriverError),
    /// Block until cancelled or the statement timeout expires.
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Executed {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<ParamValue>,
}

#[derive(Default)]
struct State {
    product: String,
    script: VecDeque<Step>,
    executed: Vec<Executed>,
    timeouts: Vec<Option<Duration>>,
    product_queries: usize,
    watched: Option<Arc<CancellationRegistry>>,
    /// Registrations still active each time a connection was released.
    active_at_release: Vec<usize>,
}

#[derive(Clone)]
pub(crate) struct MockDriver {
    state: Arc<Mutex<State>>,
    cancelled: Arc<Notify>,
}

impl MockDriver {
    pub fn new(product: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                product: product.to_string(),
                ..State::default()
            })),
            cancelled: Arc::new(Notify::new()),
        }
    }

    pub fn then(self, step: Step) -> Self {
        self.state.lock().script.push_back(step);
        self
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.state.lock().executed.clone()
    }

    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.state.lock().timeouts.clone()
    }

    pub fn product_queries(&self) -> usize {
        self.state.lock().product_queries
    }

    pub fn watch_releases(self, registry: Arc<CancellationRegistry>) -> Self {
        self.state.lock().watched = Some(registry);
        self
    }

    pub fn active_at_release(&self) -> Vec<usize> {
        self.state.lock().active_at_release.clone()
    }
}

pub(crate) fn int_rows(values: &[i64]) -> Vec<Vec<CellValue>> {
    values.iter().map(|v| vec![CellValue::Int64(*v)]).collect()
}

#[async_trait]
impl ConnectionProvider for MockDriver {
    async fn acquire(&self) -> Result<Box<dyn DriverConnection>, ExecError> {
        Ok(Box::new(MockConnection {
            driver: self.clone(),
            timeout: None,
        }))
    }
}

struct MockConnection {
    driver: MockDriver,
    timeout: Option<Duration>,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        let mut state = self.driver.state.lock();
        if let Some(active) = state.watched.as_ref().map(|r| r.active().len()) {
            state.active_at_release.push(active);
        }
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    async fn product_name(&mut self) -> Result<String, DriverError> {
        let mut state = self.driver.state.lock();
        state.product_queries += 1;
        Ok(state.product.clone())
    }

    async fn set_statement_timeout(&mut self, timeout: Option<Duration>) -> Result<(), DriverError> {
        self.timeout = timeout;
        self.driver.state.lock().timeouts.push(timeout);
        Ok(())
    }

    async fn prepare(&mut self, kind: StatementKind, sql: &str) -> Result<StatementHandle, DriverError> {
        Ok(StatementHandle::new(kind, sql))
    }

    fn canceller(&self) -> Arc<dyn Canceller> {
        Arc::new(MockCanceller(self.driver.cancelled.clone()))
    }

    async fn execute(
        &mut self,
        statement: &StatementHandle,
        params: &[ParamValue],
    ) -> Result<DriverOutcome, DriverError> {
        let step = {
            let mut state = self.driver.state.lock();
            state.executed.push(Executed {
                kind: statement.kind,
                sql: statement.sql.clone(),
                params: params.to_vec(),
            });
            state.script.pop_front().unwrap_or(Step::Rows(vec![]))
        };

        let rows = match step {
            Step::Rows(rows) => rows,
            Step::Fail(e) => return Err(e),
            Step::Hang => {
                let cancelled = self.driver.cancelled.notified();
                let message = match self.timeout {
                    Some(limit) => tokio::select! {
                        _ = tokio::time::sleep(limit) => "canceling statement due to statement timeout",
                        _ = cancelled => "canceling statement due to user request",
                    },
                    None => {
                        cancelled.await;
                        "canceling statement due to user request"
                    }
                };
                return Err(DriverError::database("57014", message));
            }
        };

        let columns = vec![ColumnInfo::new("value", "int8")];
        if statement.kind == StatementKind::Callable {
            return Ok(DriverOutcome::OutputParameters {
                columns,
                values: rows.into_iter().next().unwrap_or_default(),
            });
        }
        Ok(DriverOutcome::Rows(Box::new(MockRows {
            columns,
            rows: rows.into(),
        })))
    }
}

struct MockRows {
    columns: Vec<ColumnInfo>,
    rows: VecDeque<Vec<CellValue>>,
}

#[async_trait]
impl RowSource for MockRows {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>, DriverError> {
        Ok(self.rows.pop_front())
    }
}

struct MockCanceller(Arc<Notify>);

#[async_trait]
impl Canceller for MockCanceller {
    async fn cancel(&self) -> Result<(), DriverError> {
        self.0.notify_one();
        Ok(())
    }
}
