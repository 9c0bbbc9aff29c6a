//! Structured SQL model.
//!
//! A [`StructuredQuery`] describes one SELECT independently of any database
//! product: tables (named or derived), a projection, filter trees, grouping,
//! ordering and hints. It is rendered to text by [`crate::generator`].
//!
//! ```text
//! SQL text ──parser──▶ StructuredQuery ──generator──▶ dialect SQL
//!                         │    ▲
//!                  persist│    │persist
//!                         ▼    │
//!                     PersistedQuery (JSON)
//! ```

mod condition;
pub mod parser;
pub mod persist;
mod query;
mod selection;
mod types;

pub use condition::{
    BinaryCondition, Condition, ConditionSet, TablePair, TrinaryCondition, UnaryCondition,
};
pub use parser::{parse_select, ParseOutcome};
pub use persist::{ParseStatus, PersistedQuery};
pub use query::StructuredQuery;
pub use selection::{SelectColumn, Selection};
pub use types::*;
