use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::Table;
use config::ToolboxConfig;
use db::{Params, QueryArg};
use serde_json::Value;
use toolbox::{DEFAULT_SEARCH_LIMIT, State, ToolError, Toolbox};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "warehouse-toolbox")]
#[command(version, about = "Sales history warehouse analytics tools")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Query definitions file, overriding the configured one
    #[arg(short, long)]
    queries: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the tool and dimension manifest as JSON
    Manifest,
    /// Run a tool and print its payload
    Run {
        /// Tool id, e.g. `sales_by_category`
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,

        /// Render the payload as a table instead of JSON
        #[arg(short, long)]
        render: bool,
    },
    /// List values of a dimension containing some text
    Search {
        /// `country`, `product_category`, `channel` or `customer_segment`
        dimension: String,

        #[arg(default_value = "")]
        text: String,

        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: u32,
    },
    /// Run a named query from the definitions file
    Query {
        name: String,

        /// Bind value as `name=value` (text), `name:int=value` or
        /// `name:date=YYYY-MM-DD`; may be repeated
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, QueryArg)>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Manifest = cli.command {
        println!("{}", serde_json::to_string_pretty(&Toolbox::manifest())?);
        return Ok(());
    }

    let mut config = ToolboxConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(queries) = cli.queries {
        config.toolbox.queries = queries;
    }

    let toolbox = Toolbox::new(State::connect(&config).await?);
    let missing = toolbox.missing_queries();
    if !missing.is_empty() {
        tracing::warn!(?missing, "query definitions are missing");
    }

    let result = run(&toolbox, cli.command).await;
    finish(result, toolbox.close().await)
}

/// The command's own failure wins over a failure to close afterwards.
fn finish(result: anyhow::Result<()>, closed: Result<(), ToolError>) -> anyhow::Result<()> {
    match (result, closed) {
        (Err(err), Err(close_err)) => {
            tracing::error!(error = %close_err, "closing the warehouse connection failed");
            Err(err)
        }
        (result, closed) => {
            closed?;
            result
        }
    }
}

async fn run(toolbox: &Toolbox, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Manifest => {
            println!("{}", serde_json::to_string_pretty(&Toolbox::manifest())?);
        }
        Command::Run { tool, args, render } => {
            let args = match args {
                Some(args) => serde_json::from_str(&args).context("--args must be JSON")?,
                None => Value::Null,
            };
            let payload = toolbox.invoke(&tool, args).await?;
            if render {
                render_payload(&payload);
            } else {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
        }
        Command::Search {
            dimension,
            text,
            limit,
        } => {
            for value in toolbox.search(&dimension, &text, limit).await? {
                println!("{value}");
            }
        }
        Command::Query { name, params } => {
            let state = toolbox.state();
            let statement = state.queries().get(&name)?;
            let params = params
                .into_iter()
                .fold(Params::new(), |params, (name, value)| params.with(&name, value));
            let rows = state.runner().try_run_query(statement, &params).await?;
            println!("{}", serde_json::to_string_pretty(&rows.into_rows())?);
        }
    }
    Ok(())
}

/// Values bind as text unless the name carries an `:int` or `:date` suffix.
fn parse_param(raw: &str) -> anyhow::Result<(String, QueryArg)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("expected name=value, got '{raw}'");
    };
    let (name, value) = match name.trim().split_once(':') {
        None => (name, QueryArg::Text(value.to_string())),
        Some((name, "int")) => (
            name,
            QueryArg::Int(
                value
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("'{value}' is not an integer"))?,
            ),
        ),
        Some((name, "date")) => (
            name,
            QueryArg::Date(
                value
                    .trim()
                    .parse::<NaiveDate>()
                    .with_context(|| format!("'{value}' is not a YYYY-MM-DD date"))?,
            ),
        ),
        Some((_, kind)) => bail!("unknown parameter type '{kind}', expected int or date"),
    };
    Ok((name.trim().to_string(), value))
}

fn render_payload(payload: &Value) {
    let title = payload
        .get("title")
        .or_else(|| payload.pointer("/info/title"))
        .and_then(Value::as_str)
        .or_else(|| payload.get("type").and_then(Value::as_str))
        .unwrap_or("Result");
    println!("{}", title.bold().blue());

    let mut table = Table::new();
    match payload.get("type").and_then(Value::as_str) {
        Some("Table") => {
            table.set_header(labels(payload.get("columns"), |column| {
                column.get("label").and_then(Value::as_str)
            }));
            add_rows(&mut table, payload.get("rows"));
        }
        Some("Series") => {
            table.set_header(labels(payload.get("cols"), |col| {
                col.get(1).and_then(Value::as_str)
            }));
            add_rows(&mut table, payload.get("rows"));
        }
        Some("AreaMap") => {
            table.set_header(vec!["name", "value"]);
            for item in payload.get("items").and_then(Value::as_array).into_iter().flatten() {
                table.add_row(vec![
                    cell_text(item.get("name").unwrap_or(&Value::Null)),
                    cell_text(item.get("value").unwrap_or(&Value::Null)),
                ]);
            }
        }
        _ => {
            table.set_header(labels(payload.pointer("/data/cols"), |col| {
                col.get(1).and_then(Value::as_str)
            }));
            add_rows(&mut table, payload.pointer("/data/rows"));
        }
    }
    println!("{table}");
}

fn labels(columns: Option<&Value>, label: impl Fn(&Value) -> Option<&str>) -> Vec<String> {
    columns
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|column| label(column).unwrap_or_default().to_string())
        .collect()
}

fn add_rows(table: &mut Table, rows: Option<&Value>) {
    for row in rows.and_then(Value::as_array).into_iter().flatten() {
        if let Some(cells) = row.as_array() {
            table.add_row(cells.iter().map(cell_text).collect::<Vec<_>>());
        }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
