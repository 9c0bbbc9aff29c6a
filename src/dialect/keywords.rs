//! Reserved words that force identifier quoting.

use super::Product;

/// SQL:2016 reserved words shared by every product.
pub const SQL_RESERVED: &[&str] = &[
    "all", "alter", "and", "any", "array", "as", "asc", "asymmetric", "at", "authorization",
    "begin", "between", "bigint", "binary", "blob", "boolean", "both", "by", "call", "called",
    "case", "cast", "char", "character", "check", "clob", "close", "collate", "column", "commit",
    "connect", "constraint", "create", "cross", "cube", "current", "current_date",
    "current_time", "current_timestamp", "current_user", "cursor", "cycle", "date", "day",
    "deallocate", "dec", "decimal", "declare", "default", "delete", "desc", "describe",
    "distinct", "double", "drop", "each", "else", "end", "escape", "except", "exec", "execute",
    "exists", "external", "false", "fetch", "filter", "float", "for", "foreign", "free", "from",
    "full", "function", "get", "global", "grant", "group", "having", "hour", "identity", "in",
    "inner", "inout", "insert", "int", "integer", "intersect", "interval", "into", "is", "join",
    "lateral", "leading", "left", "like", "local", "localtime", "localtimestamp", "match",
    "merge", "minute", "modifies", "month", "natural", "nchar", "new", "no", "none", "not",
    "null", "numeric", "of", "old", "on", "only", "open", "or", "order", "out", "outer", "over",
    "overlaps", "partition", "precision", "primary", "procedure", "range", "reads", "real",
    "recursive", "references", "release", "return", "returns", "revoke", "right", "rollback",
    "rollup", "row", "rows", "savepoint", "scroll", "second", "select", "session_user", "set",
    "similar", "smallint", "some", "start", "static", "symmetric", "system", "system_user",
    "table", "then", "time", "timestamp", "to", "trailing", "trigger", "true", "union",
    "unique", "unknown", "update", "user", "using", "value", "values", "varchar", "varying",
    "when", "whenever", "where", "window", "with", "within", "without", "year",
];

const POSTGRESQL: &[&str] = &[
    "analyse", "analyze", "concurrently", "do", "freeze", "ilike", "isnull", "limit", "notnull",
    "offset", "placing", "returning", "tablesample", "variadic", "verbose",
];

const MYSQL: &[&str] = &[
    "accessible", "database", "databases", "div", "dual", "explain", "force", "ignore", "index",
    "key", "keys", "kill", "limit", "lock", "long", "mod", "optimize", "rank", "regexp",
    "rename", "replace", "require", "schema", "show", "straight_join", "unsigned", "use",
    "xor", "zerofill",
];

const ORACLE: &[&str] = &[
    "access", "audit", "cluster", "comment", "compress", "exclusive", "file", "identified",
    "increment", "index", "initial", "level", "lock", "long", "maxextents", "minus", "mode",
    "modify", "noaudit", "nocompress", "nowait", "number", "offline", "online", "pctfree",
    "prior", "raw", "rename", "resource", "rowid", "rownum", "session", "share", "size",
    "successful", "synonym", "sysdate", "uid", "validate", "varchar2", "view",
];

const TSQL: &[&str] = &[
    "backup", "break", "browse", "bulk", "checkpoint", "clustered", "compute", "contains",
    "containstable", "database", "dbcc", "deny", "disk", "distributed", "dump", "errlvl",
    "exit", "file", "fillfactor", "freetext", "goto", "holdlock", "identitycol", "index",
    "key", "kill", "lineno", "load", "nocheck", "nonclustered", "offsets", "opendatasource",
    "openquery", "openrowset", "openxml", "option", "percent", "pivot", "plan", "print",
    "proc", "public", "raiserror", "readtext", "reconfigure", "replication", "restore",
    "restrict", "revert", "rowcount", "rowguidcol", "rule", "save", "schema", "setuser",
    "shutdown", "statistics", "textsize", "top", "tran", "transaction", "truncate",
    "tsequal", "unpivot", "updatetext", "use", "view", "waitfor", "while", "writetext",
];

const DB2: &[&str] = &[
    "alias", "allocate", "audit", "aux", "auxiliary", "collection", "concat", "database",
    "dbinfo", "editproc", "erase", "fieldproc", "first", "index", "label", "locksize",
    "nulls", "obid", "optimization", "package", "plan", "priqty", "program", "rownumber",
    "rrn", "secqty", "stogroup", "summary", "synonym", "tablespace", "validproc", "view",
    "volumes",
];

const INFORMIX: &[&str] = &["first", "skip", "limit", "middle", "serial", "lvarchar"];

const TERADATA: &[&str] = &["sample", "qualify", "top", "title", "format", "named", "mod"];

const CLICKHOUSE: &[&str] = &["array", "final", "format", "limit", "prewhere", "sample", "settings"];

const SNOWFLAKE: &[&str] = &["ilike", "limit", "minus", "qualify", "regexp", "rlike", "sample"];

/// Product-specific additions on top of [`SQL_RESERVED`].
pub fn extra_keywords(product: Product) -> &'static [&'static str] {
    match product {
        Product::PostgreSql | Product::Vertica => POSTGRESQL,
        Product::MySql | Product::MariaDb => MYSQL,
        Product::Oracle => ORACLE,
        Product::SqlServer | Product::Sybase => TSQL,
        Product::Db2 | Product::Derby => DB2,
        Product::Informix => INFORMIX,
        Product::Teradata => TERADATA,
        Product::ClickHouse => CLICKHOUSE,
        Product::Snowflake => SNOWFLAKE,
        Product::Generic | Product::H2 | Product::HsqlDb | Product::Sqlite => &[],
    }
}
