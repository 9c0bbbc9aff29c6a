mod cancel;
mod cursor;
mod datasource;
pub mod driver;
mod engine;
mod error;
mod params;
mod pool;
mod postgres;
mod retry;
mod value;

#[cfg(test)]
mod testing;

pub use cancel::{CancelToken, CancellationRegistry, Registration};
pub use cursor::RowCursor;
pub use datasource::{DataSource, IsolationLevel, SslMode, DEFAULT_DRIVER};
pub use engine::{ExecutionRequest, QueryEngine, QueryOutcome};
pub use error::{DriverError, DriverErrorKind, ErrorCategory, ExecError};
pub use params::{
    bind_named, BoundStatement, ParameterTable, Principal, ProcedureCall, QuerySource,
};
pub use pool::{PoolFactory, PoolKey, PostgresProvider};
pub use postgres::PgConnection;
pub use retry::{classify, AttemptPlan, BooleanMode, MAX_ATTEMPTS};
pub use value::{CellValue, ColumnInfo, ParamValue, QueryResult};
