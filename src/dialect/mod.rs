//! Per-product capability tables.
//!
//! A [`Dialect`] is plain data: quoting, reserved words, supported clause
//! forms, function name templates and the driver error codes the execution
//! engine retries on. Product-specific behavior is expressed through these
//! tables rather than code branches; the one algorithmic deviation (ROWNUM
//! pagination) is a [`Feature`] the generator handles explicitly.

mod keywords;
mod products;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub use keywords::SQL_RESERVED;

/// Database products with a dialect table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    Generic,
    PostgreSql,
    MySql,
    MariaDb,
    Oracle,
    SqlServer,
    Sybase,
    Db2,
    Informix,
    Teradata,
    H2,
    HsqlDb,
    Derby,
    Sqlite,
    Vertica,
    Snowflake,
    ClickHouse,
}

impl Product {
    pub const ALL: [Product; 17] = [
        Product::Generic,
        Product::PostgreSql,
        Product::MySql,
        Product::MariaDb,
        Product::Oracle,
        Product::SqlServer,
        Product::Sybase,
        Product::Db2,
        Product::Informix,
        Product::Teradata,
        Product::H2,
        Product::HsqlDb,
        Product::Derby,
        Product::Sqlite,
        Product::Vertica,
        Product::Snowflake,
        Product::ClickHouse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Product::Generic => "generic",
            Product::PostgreSql => "postgresql",
            Product::MySql => "mysql",
            Product::MariaDb => "mariadb",
            Product::Oracle => "oracle",
            Product::SqlServer => "sqlserver",
            Product::Sybase => "sybase",
            Product::Db2 => "db2",
            Product::Informix => "informix",
            Product::Teradata => "teradata",
            Product::H2 => "h2",
            Product::HsqlDb => "hsqldb",
            Product::Derby => "derby",
            Product::Sqlite => "sqlite",
            Product::Vertica => "vertica",
            Product::Snowflake => "snowflake",
            Product::ClickHouse => "clickhouse",
        }
    }

    /// Exact (case-insensitive) product key.
    pub fn from_name(name: &str) -> Option<Product> {
        let lower = name.trim().to_ascii_lowercase();
        Product::ALL.into_iter().find(|p| p.name() == lower)
    }

    /// Map a driver-reported product string (e.g. `PostgreSQL 16.2 on x86_64`)
    /// to a product, falling back to [`Product::Generic`].
    pub fn detect(reported: &str) -> Product {
        if let Some(p) = Product::from_name(reported) {
            return p;
        }
        let lower = reported.to_ascii_lowercase();
        const PATTERNS: &[(&str, Product)] = &[
            ("mariadb", Product::MariaDb),
            ("mysql", Product::MySql),
            ("postgres", Product::PostgreSql),
            ("oracle", Product::Oracle),
            ("microsoft", Product::SqlServer),
            ("sql server", Product::SqlServer),
            ("adaptive server", Product::Sybase),
            ("sybase", Product::Sybase),
            ("db2", Product::Db2),
            ("informix", Product::Informix),
            ("teradata", Product::Teradata),
            ("hsql", Product::HsqlDb),
            ("derby", Product::Derby),
            ("sqlite", Product::Sqlite),
            ("vertica", Product::Vertica),
            ("snowflake", Product::Snowflake),
            ("clickhouse", Product::ClickHouse),
        ];
        for (pattern, product) in PATTERNS {
            if lower.contains(pattern) {
                return *product;
            }
        }
        if lower == "h2" || lower.starts_with("h2 ") {
            return Product::H2;
        }
        Product::Generic
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Optional capabilities a product may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    RightOuterJoin,
    FullOuterJoin,
    GroupByExpression,
    OrderByExpression,
    /// Sorting by arbitrary fields instead of output aliases.
    NonAnsiOrderBy,
    LimitClause,
    TopClause,
    FirstClause,
    FetchFirstClause,
    RowNumFilter,
    NativeBoolean,
    /// Driver-level per-statement timeout.
    StatementTimeout,
    /// `''` is stored as NULL.
    EmptyStringIsNull,
    NamedProcedureArguments,
    Catalogs,
    Schemas,
}

/// Positional placeholder syntax of the product's driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    Question,
    /// `$1`, `$2`, ...
    Dollar,
    /// `:1`, `:2`, ...
    Colon,
}

impl PlaceholderStyle {
    /// Placeholder for the 1-based position `n`.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Dollar => format!("${}", n),
            PlaceholderStyle::Colon => format!(":{}", n),
        }
    }
}

/// Driver error codes, by the retry they call for.
#[derive(Debug, Clone, Default)]
pub struct RetryTable {
    /// Driver rejected a native boolean; resend booleans as strings.
    pub string_boolean: &'static [&'static str],
    /// Driver rejected a string boolean; resend as native booleans.
    pub native_boolean: &'static [&'static str],
    /// Statement was cancelled by the client.
    pub cancelled: &'static [&'static str],
    /// Statement hit the driver-level timeout.
    pub timeout: &'static [&'static str],
}

impl RetryTable {
    fn contains(codes: &[&str], code: &str) -> bool {
        codes.iter().any(|c| c.eq_ignore_ascii_case(code))
    }

    pub fn is_string_boolean(&self, code: &str) -> bool {
        Self::contains(self.string_boolean, code)
    }

    pub fn is_native_boolean(&self, code: &str) -> bool {
        Self::contains(self.native_boolean, code)
    }

    pub fn is_cancelled(&self, code: &str) -> bool {
        Self::contains(self.cancelled, code)
    }

    pub fn is_timeout(&self, code: &str) -> bool {
        Self::contains(self.timeout, code)
    }
}

/// Immutable capability table for one product.
#[derive(Debug, Clone)]
pub struct Dialect {
    pub product: Product,
    /// Opening and closing identifier quote.
    pub quote: (char, char),
    pub keywords: HashSet<&'static str>,
    pub max_identifier_length: usize,
    /// Whether FROM clauses use ANSI joins unless the data source overrides it.
    pub ansi_join_default: bool,
    pub features: HashSet<Feature>,
    /// Aggregate name templates keyed by lower-case canonical name; `{0}` is the argument.
    pub aggregates: HashMap<&'static str, &'static str>,
    /// Date-part function templates keyed by lower-case canonical name.
    pub date_functions: HashMap<&'static str, &'static str>,
    pub placeholder: PlaceholderStyle,
    /// Procedure call template with `{name}` and `{args}`.
    pub procedure_call: &'static str,
    /// Named argument template with `{name}` and `{value}`.
    pub named_argument: &'static str,
    /// String forms of `true` / `false` when booleans are sent as text.
    pub boolean_strings: (&'static str, &'static str),
    /// Table for selects without FROM (Oracle `dual`).
    pub dummy_table: Option<&'static str>,
    /// Cheap query validating a connection.
    pub test_query: &'static str,
    pub retry: RetryTable,
}

impl Dialect {
    /// Build the table for `product`. Prefer [`DialectRegistry::get`], which caches.
    pub fn for_product(product: Product) -> Dialect {
        products::build(product)
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.keywords.contains(word.to_ascii_lowercase().as_str())
    }

    /// Whether `ident` must be quoted to be read back verbatim.
    pub fn needs_quoting(&self, ident: &str) -> bool {
        let mut chars = ident.chars();
        let Some(first) = chars.next() else {
            return true;
        };
        if !(first.is_alphabetic() || first == '_') {
            return true;
        }
        if !ident.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '#') {
            return true;
        }
        self.is_keyword(ident)
    }

    pub fn is_quoted(&self, ident: &str) -> bool {
        ident.len() >= 2 && ident.starts_with(self.quote.0) && ident.ends_with(self.quote.1)
    }

    /// Quote `ident` if required, doubling embedded closing quotes.
    pub fn quote_identifier(&self, ident: &str) -> String {
        if self.is_quoted(ident) || !self.needs_quoting(ident) {
            return ident.to_string();
        }
        let close = self.quote.1;
        let escaped = ident.replace(close, &format!("{}{}", close, close));
        format!("{}{}{}", self.quote.0, escaped, close)
    }

    /// Quote each segment of a dotted path.
    pub fn quote_path(&self, path: &str) -> String {
        if path == "*" {
            return path.to_string();
        }
        path.split('.')
            .map(|segment| {
                if segment == "*" {
                    segment.to_string()
                } else {
                    self.quote_identifier(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// First pagination form the product supports, probed in the order
    /// `limit`, `top`, `first`, `fetch first`, `rownum`.
    pub fn pagination(&self) -> Option<Pagination> {
        [
            (Feature::LimitClause, Pagination::Limit),
            (Feature::TopClause, Pagination::Top),
            (Feature::FirstClause, Pagination::First),
            (Feature::FetchFirstClause, Pagination::FetchFirst),
            (Feature::RowNumFilter, Pagination::RowNum),
        ]
        .into_iter()
        .find(|(f, _)| self.supports(*f))
        .map(|(_, p)| p)
    }

    pub fn boolean_literal(&self, value: bool) -> &'static str {
        match (self.supports(Feature::NativeBoolean), value) {
            (true, true) => "true",
            (true, false) => "false",
            (false, true) => "1",
            (false, false) => "0",
        }
    }

    pub fn boolean_string(&self, value: bool) -> &'static str {
        if value {
            self.boolean_strings.0
        } else {
            self.boolean_strings.1
        }
    }

    pub fn function_template(&self, name: &str) -> Option<&'static str> {
        let lower = name.to_ascii_lowercase();
        self.aggregates
            .get(lower.as_str())
            .or_else(|| self.date_functions.get(lower.as_str()))
            .copied()
    }

    pub fn format_procedure_call(&self, name: &str, args: &[String]) -> String {
        self.procedure_call
            .replace("{name}", name)
            .replace("{args}", &args.join(", "))
    }

    pub fn format_named_argument(&self, name: &str, value: &str) -> String {
        self.named_argument
            .replace("{name}", name)
            .replace("{value}", value)
    }
}

/// Row-limit clause forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `... limit n`
    Limit,
    /// `select top n ...`
    Top,
    /// `select first n ...`
    First,
    /// `... fetch first n rows only`
    FetchFirst,
    /// `rownum <= n` in the WHERE clause, or a wrapping select.
    RowNum,
}

/// Read-through cache of dialect tables, built once per product.
///
/// Constructed at startup and passed by `Arc` to whoever needs dialects.
#[derive(Debug, Default)]
pub struct DialectRegistry {
    cache: RwLock<HashMap<Product, Arc<Dialect>>>,
}

impl DialectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, product: Product) -> Arc<Dialect> {
        if let Some(dialect) = self.cache.read().get(&product) {
            return dialect.clone();
        }
        let mut cache = self.cache.write();
        cache
            .entry(product)
            .or_insert_with(|| Arc::new(Dialect::for_product(product)))
            .clone()
    }

    /// Dialect for a driver-reported product name.
    pub fn resolve(&self, reported: &str) -> Arc<Dialect> {
        self.get(Product::detect(reported))
    }

    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}
