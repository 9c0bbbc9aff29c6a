use std::collections::{HashMap, HashSet};

use super::keywords::{extra_keywords, SQL_RESERVED};
use super::{Dialect, Feature, PlaceholderStyle, Product, RetryTable};

use super::Feature::*;

const ANSI_AGGREGATES: &[(&str, &str)] = &[
    ("count", "count({0})"),
    ("count_distinct", "count(distinct {0})"),
    ("sum", "sum({0})"),
    ("avg", "avg({0})"),
    ("min", "min({0})"),
    ("max", "max({0})"),
    ("stddev", "stddev({0})"),
    ("variance", "variance({0})"),
];

const EXTRACT_DATES: &[(&str, &str)] = &[
    ("year", "extract(year from {0})"),
    ("quarter", "extract(quarter from {0})"),
    ("month", "extract(month from {0})"),
    ("day", "extract(day from {0})"),
    ("hour", "extract(hour from {0})"),
    ("minute", "extract(minute from {0})"),
    ("second", "extract(second from {0})"),
];

const FUNCTION_DATES: &[(&str, &str)] = &[
    ("year", "year({0})"),
    ("quarter", "quarter({0})"),
    ("month", "month({0})"),
    ("day", "day({0})"),
    ("hour", "hour({0})"),
    ("minute", "minute({0})"),
    ("second", "second({0})"),
];

const DATEPART_DATES: &[(&str, &str)] = &[
    ("year", "datepart(year, {0})"),
    ("quarter", "datepart(quarter, {0})"),
    ("month", "datepart(month, {0})"),
    ("day", "datepart(day, {0})"),
    ("hour", "datepart(hour, {0})"),
    ("minute", "datepart(minute, {0})"),
    ("second", "datepart(second, {0})"),
];

const ORACLE_DATES: &[(&str, &str)] = &[
    ("year", "extract(year from {0})"),
    ("quarter", "to_number(to_char({0}, 'Q'))"),
    ("month", "extract(month from {0})"),
    ("day", "extract(day from {0})"),
    ("hour", "to_number(to_char({0}, 'HH24'))"),
    ("minute", "to_number(to_char({0}, 'MI'))"),
    ("second", "to_number(to_char({0}, 'SS'))"),
];

const SQLITE_DATES: &[(&str, &str)] = &[
    ("year", "cast(strftime('%Y', {0}) as integer)"),
    ("month", "cast(strftime('%m', {0}) as integer)"),
    ("day", "cast(strftime('%d', {0}) as integer)"),
    ("hour", "cast(strftime('%H', {0}) as integer)"),
    ("minute", "cast(strftime('%M', {0}) as integer)"),
    ("second", "cast(strftime('%S', {0}) as integer)"),
];

/// Per-product settings, filled over [`Default`].
struct ProductTable {
    quote: (char, char),
    max_identifier_length: usize,
    ansi_join_default: bool,
    features: &'static [Feature],
    aggregate_overrides: &'static [(&'static str, &'static str)],
    date_functions: &'static [(&'static str, &'static str)],
    placeholder: PlaceholderStyle,
    procedure_call: &'static str,
    named_argument: &'static str,
    boolean_strings: (&'static str, &'static str),
    dummy_table: Option<&'static str>,
    test_query: &'static str,
    retry: RetryTable,
}

impl Default for ProductTable {
    fn default() -> Self {
        Self {
            quote: ('"', '"'),
            max_identifier_length: 128,
            ansi_join_default: true,
            features: &[],
            aggregate_overrides: &[],
            date_functions: EXTRACT_DATES,
            placeholder: PlaceholderStyle::Question,
            procedure_call: "call {name}({args})",
            named_argument: "{name} => {value}",
            boolean_strings: ("true", "false"),
            dummy_table: None,
            test_query: "select 1",
            retry: RetryTable::default(),
        }
    }
}

pub(super) fn build(product: Product) -> Dialect {
    let table = table_for(product);

    let mut keywords: HashSet<&'static str> = SQL_RESERVED.iter().copied().collect();
    keywords.extend(extra_keywords(product).iter().copied());

    let mut aggregates: HashMap<&'static str, &'static str> = ANSI_AGGREGATES.iter().copied().collect();
    aggregates.extend(table.aggregate_overrides.iter().copied());

    Dialect {
        product,
        quote: table.quote,
        keywords,
        max_identifier_length: table.max_identifier_length,
        ansi_join_default: table.ansi_join_default,
        features: table.features.iter().copied().collect(),
        aggregates,
        date_functions: table.date_functions.iter().copied().collect(),
        placeholder: table.placeholder,
        procedure_call: table.procedure_call,
        named_argument: table.named_argument,
        boolean_strings: table.boolean_strings,
        dummy_table: table.dummy_table,
        test_query: table.test_query,
        retry: table.retry,
    }
}

fn table_for(product: Product) -> ProductTable {
    match product {
        Product::Generic => ProductTable {
            features: &[
                RightOuterJoin, FullOuterJoin, GroupByExpression, OrderByExpression,
                NonAnsiOrderBy, FetchFirstClause, NativeBoolean, Schemas,
            ],
            ..ProductTable::default()
        },
        Product::PostgreSql => ProductTable {
            max_identifier_length: 63,
            features: &[
                RightOuterJoin, FullOuterJoin, GroupByExpression, OrderByExpression,
                NonAnsiOrderBy, LimitClause, NativeBoolean, StatementTimeout,
                NamedProcedureArguments, Schemas,
            ],
            placeholder: PlaceholderStyle::Dollar,
            retry: RetryTable {
                // 42883 undefined_function: `boolean = text` style operator lookups.
                string_boolean: &["42883"],
                // 42804 datatype_mismatch
                native_boolean: &["42804"],
                cancelled: &["57014"],
                timeout: &["57014"],
            },
            ..ProductTable::default()
        },
        Product::MySql => ProductTable {
            quote: ('`', '`'),
            max_identifier_length: 64,
            features: &[
                RightOuterJoin, GroupByExpression, OrderByExpression, NonAnsiOrderBy,
                LimitClause, StatementTimeout, Catalogs,
            ],
            date_functions: FUNCTION_DATES,
            boolean_strings: ("1", "0"),
            retry: RetryTable {
                string_boolean: &["1366"],
                native_boolean: &[],
                cancelled: &["1317"],
                timeout: &["3024"],
            },
            ..ProductTable::default()
        },
        Product::MariaDb => ProductTable {
            quote: ('`', '`'),
            max_identifier_length: 64,
            features: &[
                RightOuterJoin, GroupByExpression, OrderByExpression, NonAnsiOrderBy,
                LimitClause, StatementTimeout, Catalogs,
            ],
            date_functions: FUNCTION_DATES,
            boolean_strings: ("1", "0"),
            retry: RetryTable {
                string_boolean: &["1366"],
                native_boolean: &[],
                cancelled: &["1317"],
                timeout: &["1969"],
            },
            ..ProductTable::default()
        },
        Product::Oracle => ProductTable {
            max_identifier_length: 30,
            ansi_join_default: false,
            features: &[
                RightOuterJoin, FullOuterJoin, GroupByExpression, OrderByExpression,
                NonAnsiOrderBy, RowNumFilter, StatementTimeout, EmptyStringIsNull,
                NamedProcedureArguments, Schemas,
            ],
            aggregate_overrides: &[("variance", "variance({0})")],
            date_functions: ORACLE_DATES,
            placeholder: PlaceholderStyle::Colon,
            procedure_call: "begin {name}({args}); end;",
            boolean_strings: ("Y", "N"),
            dummy_table: Some("dual"),
            test_query: "select 1 from dual",
            retry: RetryTable {
                // ORA-17004 invalid column type
                string_boolean: &["17004"],
                native_boolean: &["1722"],
                cancelled: &["1013"],
                timeout: &["1013"],
            },
            ..ProductTable::default()
        },
        Product::SqlServer => ProductTable {
            quote: ('[', ']'),
            features: &[
                RightOuterJoin, FullOuterJoin, GroupByExpression, OrderByExpression,
                NonAnsiOrderBy, TopClause, StatementTimeout, NamedProcedureArguments,
                Catalogs, Schemas,
            ],
            aggregate_overrides: &[("stddev", "stdev({0})"), ("variance", "var({0})")],
            date_functions: DATEPART_DATES,
            procedure_call: "exec {name} {args}",
            named_argument: "@{name} = {value}",
            boolean_strings: ("1", "0"),
            retry: RetryTable {
                // 206 operand type clash
                string_boolean: &["206"],
                native_boolean: &["245"],
                cancelled: &["HY008"],
                timeout: &["HYT00"],
            },
            ..ProductTable::default()
        },
        Product::Sybase => ProductTable {
            max_identifier_length: 30,
            ansi_join_default: false,
            features: &[RightOuterJoin, TopClause, NamedProcedureArguments, Catalogs, Schemas],
            aggregate_overrides: &[("stddev", "stddev_samp({0})"), ("variance", "var_samp({0})")],
            date_functions: DATEPART_DATES,
            procedure_call: "exec {name} {args}",
            named_argument: "@{name} = {value}",
            boolean_strings: ("1", "0"),
            retry: RetryTable {
                string_boolean: &["257"],
                native_boolean: &[],
                cancelled: &["JZ0S8"],
                timeout: &["JZ006"],
            },
            ..ProductTable::default()
        },
        Product::Db2 => ProductTable {
            features: &[
                RightOuterJoin, FullOuterJoin, GroupByExpression, OrderByExpression,
                NonAnsiOrderBy, FetchFirstClause, StatementTimeout, NamedProcedureArguments,
                Schemas,
            ],
            date_functions: FUNCTION_DATES,
            boolean_strings: ("1", "0"),
            dummy_table: Some("sysibm.sysdummy1"),
            test_query: "select 1 from sysibm.sysdummy1",
            retry: RetryTable {
                string_boolean: &["-301"],
                native_boolean: &["-420"],
                cancelled: &["-952"],
                timeout: &["-952"],
            },
            ..ProductTable::default()
        },
        Product::Informix => ProductTable {
            ansi_join_default: false,
            features: &[RightOuterJoin, FullOuterJoin, OrderByExpression, FirstClause, Schemas],
            date_functions: FUNCTION_DATES,
            boolean_strings: ("t", "f"),
            test_query: "select 1 from systables where tabid = 1",
            retry: RetryTable {
                string_boolean: &["-9634"],
                native_boolean: &["-1260"],
                cancelled: &["-213"],
                timeout: &["-213"],
            },
            ..ProductTable::default()
        },
        Product::Teradata => ProductTable {
            max_identifier_length: 30,
            features: &[
                RightOuterJoin, FullOuterJoin, GroupByExpression, OrderByExpression, TopClause,
                Schemas,
            ],
            aggregate_overrides: &[("stddev", "stddev_samp({0})"), ("variance", "var_samp({0})")],
            boolean_strings: ("1", "0"),
            retry: RetryTable {
                string_boolean: &["3532"],
                native_boolean: &[],
                cancelled: &["2646"],
                timeout: &["2646"],
            },
            ..ProductTable::default()
        },
        Product::H2 => ProductTable {
            features: &[
                RightOuterJoin, FullOuterJoin, GroupByExpression, OrderByExpression,
                NonAnsiOrderBy, LimitClause, NativeBoolean, StatementTimeout, Schemas,
            ],
            date_functions: FUNCTION_DATES,
            ..ProductTable::default()
        },
        Product::HsqlDb => ProductTable {
            features: &[
                RightOuterJoin, FullOuterJoin, GroupByExpression, OrderByExpression,
                NonAnsiOrderBy, LimitClause, NativeBoolean, Schemas,
            ],
            date_functions: FUNCTION_DATES,
            test_query: "values 1",
            ..ProductTable::default()
        },
        Product::Derby => ProductTable {
            features: &[
                RightOuterJoin, OrderByExpression, FetchFirstClause, NativeBoolean, Schemas,
            ],
            date_functions: FUNCTION_DATES,
            dummy_table: Some("sysibm.sysdummy1"),
            test_query: "values 1",
            ..ProductTable::default()
        },
        Product::Sqlite => ProductTable {
            max_identifier_length: 255,
            features: &[GroupByExpression, OrderByExpression, NonAnsiOrderBy, LimitClause],
            aggregate_overrides: &[("stddev", "stddev({0})")],
            date_functions: SQLITE_DATES,
            boolean_strings: ("1", "0"),
            ..ProductTable::default()
        },
        Product::Vertica => ProductTable {
            features: &[
                RightOuterJoin, FullOuterJoin, GroupByExpression, OrderByExpression,
                NonAnsiOrderBy, LimitClause, NativeBoolean, Schemas,
            ],
            ..ProductTable::default()
        },
        Product::Snowflake => ProductTable {
            max_identifier_length: 255,
            features: &[
                RightOuterJoin, FullOuterJoin, GroupByExpression, OrderByExpression,
                NonAnsiOrderBy, LimitClause, NativeBoolean, StatementTimeout, Catalogs,
                Schemas,
            ],
            ..ProductTable::default()
        },
        Product::ClickHouse => ProductTable {
            quote: ('`', '`'),
            max_identifier_length: 255,
            features: &[
                RightOuterJoin, FullOuterJoin, GroupByExpression, OrderByExpression,
                NonAnsiOrderBy, LimitClause, NativeBoolean, Catalogs,
            ],
            aggregate_overrides: &[("stddev", "stddevSamp({0})"), ("variance", "varSamp({0})")],
            date_functions: &[
                ("year", "toYear({0})"),
                ("quarter", "toQuarter({0})"),
                ("month", "toMonth({0})"),
                ("day", "toDayOfMonth({0})"),
                ("hour", "toHour({0})"),
                ("minute", "toMinute({0})"),
                ("second", "toSecond({0})"),
            ],
            ..ProductTable::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_table() {
        let d = build(Product::Oracle);
        assert_eq!(d.max_identifier_length, 30);
        assert!(!d.ansi_join_default);
        assert!(d.supports(EmptyStringIsNull));
        assert_eq!(d.dummy_table, Some("dual"));
        assert!(d.is_keyword("rownum"));
        assert!(d.retry.is_timeout("1013"));
    }

    #[test]
    fn test_aggregate_overrides_merge_with_ansi() {
        let d = build(Product::SqlServer);
        assert_eq!(d.function_template("stddev"), Some("stdev({0})"));
        assert_eq!(d.function_template("count_distinct"), Some("count(distinct {0})"));
        assert_eq!(d.function_template("month"), Some("datepart(month, {0})"));
        assert_eq!(d.function_template("nope"), None);
    }

    #[test]
    fn test_boolean_rendering() {
        assert_eq!(build(Product::PostgreSql).boolean_literal(true), "true");
        assert_eq!(build(Product::SqlServer).boolean_literal(true), "1");
        assert_eq!(build(Product::Informix).boolean_string(false), "f");
    }
}
