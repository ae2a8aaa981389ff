//! Groonga Command Line Interface

use std::time::Duration;

use clap::{Parser, ValueEnum};
use colored::*;
use prettytable::{row, Cell, Row, Table};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use groonga_client::config::{DEFAULT_HOST, DEFAULT_PORT};
use groonga_client::{
    ClientConfig, Column, Command, Connection, Error, Record, Response, Result, SelectResponse,
};

#[derive(Parser)]
#[command(name = "groonga-cli")]
#[command(author, version, about = "Groonga GQTP Command Line Interface", long_about = None)]
struct Cli {
    /// Server host
    #[arg(long, default_value = DEFAULT_HOST, env = "GROONGA_HOST")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "GROONGA_PORT")]
    port: u16,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Command name, e.g. `select`
    command: String,

    /// Command arguments as key=value pairs
    arguments: Vec<String>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Raw,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let command = build_command(&cli.command, &cli.arguments)?;

    let config = ClientConfig::new(cli.host, cli.port)
        .with_request_timeout(Duration::from_secs(cli.timeout));
    let mut connection = Connection::open(config).await?;

    let outcome = match cli.format {
        OutputFormat::Raw => connection
            .send_raw(&command)
            .await
            .map(|rendered| print!("{}", rendered)),
        format => connection
            .send(&command)
            .await
            .and_then(|response| print_response(&response, format)),
    };

    finish(outcome, connection.close().await)
}

/// The command's own result wins; a failed close is only logged
fn finish(outcome: Result<()>, closed: Result<bool>) -> Result<()> {
    if let Err(error) = closed {
        warn!("Failed to close connection: {}", error);
    }
    outcome
}

fn build_command(name: &str, arguments: &[String]) -> Result<Command> {
    let pairs = arguments
        .iter()
        .map(|argument| {
            argument
                .split_once('=')
                .ok_or_else(|| {
                    Error::invalid_argument(format!("expected key=value, got `{}`", argument))
                })
        })
        .collect::<Result<Vec<_>>>()?;
    Command::from_arguments(name, pairs)
}

fn print_response(response: &Response, format: OutputFormat) -> Result<()> {
    match response {
        Response::Select(select) => match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&select_to_json(select))?)
            }
            _ => print_select(select),
        },
        Response::Base(base) => println!("{}", serde_json::to_string_pretty(base.body())?),
        Response::Raw(text) => print!("{}", text),
    }
    Ok(())
}

fn select_to_json(select: &SelectResponse) -> serde_json::Value {
    let drilldowns: Vec<_> = select
        .drilldowns()
        .iter()
        .map(|drilldown| {
            serde_json::json!({
                "name": drilldown.name(),
                "n_hits": drilldown.n_hits(),
                "records": drilldown.records(),
            })
        })
        .collect();
    serde_json::json!({
        "n_hits": select.n_hits(),
        "elapsed_time": select.elapsed_time(),
        "records": select.records(),
        "drilldowns": drilldowns,
    })
}

fn print_select(select: &SelectResponse) {
    println!(
        "{} ({:.6} sec)",
        format!("{} hits", select.n_hits()).green(),
        select.elapsed_time()
    );
    records_table(select.columns(), select.records()).printstd();

    for drilldown in select.drilldowns() {
        println!();
        println!(
            "{}",
            format!("drilldown {}: {} groups", drilldown.name(), drilldown.n_hits()).cyan()
        );
        records_table(drilldown.columns(), drilldown.records()).printstd();
    }
}

fn records_table(columns: &[Column], records: &[Record]) -> Table {
    let mut table = Table::new();
    if columns.is_empty() {
        table.add_row(row!["(no columns)"]);
        return table;
    }

    table.set_titles(Row::new(
        columns
            .iter()
            .map(|column| Cell::new(&format!("{} ({})", column.name, column.column_type)))
            .collect(),
    ));
    for record in records {
        table.add_row(Row::new(
            record
                .iter()
                .map(|(_, value)| Cell::new(&value.to_string()))
                .collect(),
        ));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_failure_does_not_mask_outcome() {
        let outcome = finish(Ok(()), Err(Error::NotConnected));
        assert!(outcome.is_ok());

        let outcome = finish(
            Err(Error::response_parse("select", "bad body")),
            Err(Error::NotConnected),
        );
        assert!(matches!(outcome, Err(Error::ResponseParse { .. })));
    }

    #[test]
    fn test_build_command_splits_pairs() {
        let command = build_command("select", &["table=Entries".to_string()]).unwrap();
        assert_eq!(command.argument("table"), Some("Entries"));

        let error = build_command("select", &["table".to_string()]).unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)));
    }
}
