use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use polysql::config::{self, EngineConfig};
use polysql::dialect::{Dialect, Product};
use polysql::exec::{
    DataSource, ExecutionRequest, ParamValue, ParameterTable, ProcedureCall, QueryEngine,
    QueryOutcome, QueryResult,
};
use polysql::generator::RenderOptions;
use polysql::model::{parse_select, PersistedQuery, StructuredQuery};

/// Render structured SQL for many database dialects and run it
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the known database products and their dialect traits
    Dialects,
    /// Render a SELECT statement for a product
    Render {
        /// Target product, e.g. postgresql, oracle, sqlserver
        #[arg(short, long, default_value = "generic")]
        product: String,
        /// Keep joins in the WHERE clause
        #[arg(long, conflicts_with = "ansi")]
        classic: bool,
        /// Force ANSI join syntax
        #[arg(long)]
        ansi: bool,
        /// Row limit to apply
        #[arg(long)]
        limit: Option<u64>,
        /// SQL text; read from stdin when omitted
        sql: Option<String>,
    },
    /// Parse a SELECT statement and print its stored JSON form
    Parse {
        /// SQL text; read from stdin when omitted
        sql: Option<String>,
    },
    /// Execute a statement against a saved data source
    Exec {
        /// Saved data source name
        #[arg(short, long)]
        source: String,
        /// Named parameter as name=value (repeatable)
        #[arg(short = 'P', long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
        /// Call a stored procedure with these argument names instead of running SQL
        #[arg(long, value_delimiter = ',')]
        call: Option<Vec<String>>,
        #[arg(long)]
        max_rows: Option<usize>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        /// SQL text, or the procedure name with --call; read from stdin when omitted
        sql: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn parse_param(arg: &str) -> Result<(String, ParamValue), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", arg))?;
    let value = match value {
        "null" => ParamValue::Null,
        "true" => ParamValue::Bool(true),
        "false" => ParamValue::Bool(false),
        v => v
            .parse::<i64>()
            .map(ParamValue::Int)
            .or_else(|_| v.parse::<f64>().map(ParamValue::Float))
            .unwrap_or_else(|_| ParamValue::Text(v.to_string())),
    };
    Ok((name.trim().to_string(), value))
}

fn sql_or_stdin(sql: Option<String>) -> Result<String> {
    match sql {
        Some(sql) => Ok(sql),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read SQL from stdin")?;
            Ok(buf.trim().to_string())
        }
    }
}

fn product(name: &str) -> Result<Product> {
    Product::from_name(name).with_context(|| format!("unknown product '{}'", name))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("POLYSQL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Dialects => {
            for product in Product::ALL {
                let dialect = Dialect::for_product(product);
                println!(
                    "{:<12} quote {}{}  limit {:<10}  params {:?}  ansi joins {}",
                    product.name(),
                    dialect.quote.0,
                    dialect.quote.1,
                    dialect
                        .pagination()
                        .map_or("-".to_string(), |p| format!("{:?}", p)),
                    dialect.placeholder,
                    dialect.ansi_join_default,
                );
            }
        }
        Command::Render {
            product: name,
            classic,
            ansi,
            limit,
            sql,
        } => {
            let sql = sql_or_stdin(sql)?;
            let mut query = parse_select(&sql)?.query;
            if limit.is_some() {
                query.set_row_limit(limit);
            }
            let options = if classic {
                RenderOptions::classic()
            } else if ansi {
                RenderOptions::ansi()
            } else {
                RenderOptions::default()
            };
            println!("{}", query.render_with(&Dialect::for_product(product(&name)?), options));
        }
        Command::Parse { sql } => {
            let sql = sql_or_stdin(sql)?;
            let outcome = parse_select(&sql)?;
            let stored = PersistedQuery::new(outcome.query, outcome.status, Some(sql));
            println!("{}", stored.to_json()?);
        }
        Command::Exec {
            source,
            params,
            call,
            max_rows,
            timeout_ms,
            format,
            sql,
        } => {
            let mut data_source = config::load_data_sources()?
                .into_iter()
                .find(|d| d.name.eq_ignore_ascii_case(&source))
                .with_context(|| format!("no saved data source named '{}'", source))?;
            resolve_password(&mut data_source)?;

            let text = sql_or_stdin(sql)?;
            let mut request = match call {
                Some(arguments) => ExecutionRequest::new(ProcedureCall::new(text.clone(), arguments)),
                // `${name}` markers may not parse; run such text as is.
                None => ExecutionRequest::new(
                    parse_select(&text)
                        .map(|outcome| outcome.query)
                        .unwrap_or_else(|_| StructuredQuery::from_raw(text.clone())),
                ),
            };
            let mut table = ParameterTable::new();
            for (name, value) in params {
                table.set(name, value);
            }
            request = request.parameters(table);
            if let Some(n) = max_rows {
                request = request.max_rows(n);
            }
            if let Some(ms) = timeout_ms {
                request = request.timeout(Duration::from_millis(ms));
            }

            let engine = QueryEngine::new(EngineConfig::load()?);
            match engine.execute(&data_source, request).await {
                Ok(QueryOutcome::Rows(cursor)) => print_result(&cursor.collect().await?, format)?,
                Ok(QueryOutcome::OutputParameters { columns, values }) => {
                    let mut result = QueryResult::empty();
                    result.columns = columns;
                    result.rows = vec![values];
                    result.row_count = 1;
                    print_result(&result, format)?;
                }
                Ok(QueryOutcome::TimedOut { elapsed, limit }) => {
                    bail!("statement timed out after {:?} (limit {:?})", elapsed, limit)
                }
                Err(e) => {
                    if let Some(driver) = e.driver_error() {
                        bail!("{}", driver.display_full(&text));
                    }
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

fn resolve_password(data_source: &mut DataSource) -> Result<()> {
    if !data_source.password.is_empty() {
        return Ok(());
    }
    if let Ok(pw) = std::env::var("POLYSQL_PASSWORD") {
        data_source.password = pw;
    } else {
        let prompt = format!("Password for {}: ", data_source.display_string());
        data_source.password = rpassword::read_password_from_tty(Some(&prompt))?;
    }
    Ok(())
}

fn print_result(result: &QueryResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            let mut result = result.clone();
            result.fit_widths();
            println!("{}", result.to_table());
            println!("({} rows, {:?})", result.row_count, result.execution_time);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result.to_json())?),
    }
    Ok(())
}
