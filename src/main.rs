use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;
use tritoolkit::{ClientConfig, Condition, Filter, Frame, ResponseFormat, TriApiClient};

/// tri - query the EPA Toxics Release Inventory
///
/// Fetches TRI tables from the Envirofacts Data Service and prints them as CSV.
///
/// If the TRI_API_TOKEN environment variable is set, it is sent as a bearer token.
///
/// Examples:
///   tri filter TRI_CHEM_INFO -w CHEM_NAME=Lead
///   tri filter TRI_REPORTING_FORM -w TRI_CHEM_ID=N150 -w REPORTING_YEAR=2019,2020
///   tri count TRI_FACILITY -w STATE_ABBR=IN
#[derive(Parser, Debug)]
#[command(author, version = env!("TRI_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Envirofacts base URL (defaults to https://data.epa.gov/efservice)
    #[arg(long = "base-url", env = "TRI_BASE_URL", value_name = "URL", global = true)]
    base_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, env = "TRI_API_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Wire format requested from the service (json or csv)
    #[arg(long, value_name = "FORMAT", default_value = "json", global = true)]
    format: ResponseFormat,

    /// Retries after a transient failure
    #[arg(long, value_name = "N", global = true)]
    retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    timeout: Option<u64>,

    /// Rows requested per page
    #[arg(long = "page-size", value_name = "ROWS", global = true)]
    page_size: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch every row of a table matching the given conditions
    Filter(FilterArgs),

    /// Count the rows of a table matching the given conditions
    Count(CountArgs),

    /// Print one column of the filtered rows, one value per line
    Column(ColumnArgs),

    /// Fetch an inclusive window of rows without filtering
    Rows(RowsArgs),
}

#[derive(clap::Args, Debug)]
struct ConditionArgs {
    /// Condition as COLUMN=VALUE, or COLUMN=V1,V2 to match any listed value
    #[arg(short = 'w', long = "where", value_name = "COLUMN=VALUE", value_parser = parse_condition)]
    conditions: Vec<(String, Condition)>,
}

impl ConditionArgs {
    fn to_filter(&self) -> Filter {
        self.conditions
            .iter()
            .map(|(column, condition)| (column.as_str(), condition.clone()))
            .collect()
    }
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Write to this file instead of stdout
    #[arg(long, short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print a JSON array of objects instead of CSV
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
    /// Table name, e.g. TRI_FACILITY
    table: String,

    #[command(flatten)]
    conditions: ConditionArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(clap::Args, Debug)]
struct CountArgs {
    table: String,

    #[command(flatten)]
    conditions: ConditionArgs,
}

#[derive(clap::Args, Debug)]
struct ColumnArgs {
    table: String,

    /// Column to print
    column: String,

    #[command(flatten)]
    conditions: ConditionArgs,
}

#[derive(clap::Args, Debug)]
struct RowsArgs {
    table: String,

    /// First row (0-based)
    first: u64,

    /// Last row (inclusive)
    last: u64,

    #[command(flatten)]
    output: OutputArgs,
}

fn parse_condition(s: &str) -> Result<(String, Condition), String> {
    let (column, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got {:?}", s))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("missing column name in {:?}", s));
    }

    let condition = if value.contains(',') {
        Condition::OneOf(value.split(',').map(|v| v.trim().to_string()).collect())
    } else {
        Condition::Equals(value.to_string())
    };
    Ok((column.to_string(), condition))
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut builder = ClientConfig::builder().format(self.format);
        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(token) = &self.token {
            builder = builder.bearer_token(token)?;
        }
        if let Some(retries) = self.retries {
            builder = builder.max_retries(retries);
        }
        if let Some(secs) = self.timeout {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(page_size) = self.page_size {
            builder = builder.page_size(page_size);
        }
        Ok(builder.build()?)
    }
}

fn write_frame(frame: &Frame, args: &OutputArgs) -> Result<()> {
    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {:?}", path))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);

    if args.json {
        serde_json::to_writer_pretty(&mut writer, frame)
            .context("Failed to write JSON output")?;
        writeln!(writer)?;
    } else {
        frame
            .write_csv(&mut writer)
            .context("Failed to write CSV output")?;
    }
    writer.flush().context("Failed to flush output")?;
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let client = TriApiClient::new(cli.client_config()?)?;

    match &cli.command {
        Commands::Filter(args) => {
            let mut table = client.table(&args.table);
            let frame = table
                .filter(&args.conditions.to_filter())
                .await
                .with_context(|| format!("Failed to query {}", args.table))?;
            write_frame(frame, &args.output)?;
        }
        Commands::Count(args) => {
            let count = client
                .table(&args.table)
                .count(&args.conditions.to_filter())
                .await
                .with_context(|| format!("Failed to count {}", args.table))?;
            println!("{}", count);
        }
        Commands::Column(args) => {
            let mut table = client.table(&args.table);
            table
                .filter(&args.conditions.to_filter())
                .await
                .with_context(|| format!("Failed to query {}", args.table))?;
            let mut out = io::stdout().lock();
            for value in table.column(&args.column)? {
                match value {
                    serde_json::Value::Null => writeln!(out)?,
                    serde_json::Value::String(s) => writeln!(out, "{}", s)?,
                    other => writeln!(out, "{}", other)?,
                }
            }
        }
        Commands::Rows(args) => {
            let frame = client
                .table(&args.table)
                .row_range(args.first, args.last)
                .await
                .with_context(|| format!("Failed to fetch rows of {}", args.table))?;
            write_frame(&frame, &args.output)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_filter_parsing() {
        let cli = Cli::try_parse_from([
            "tri",
            "filter",
            "TRI_REPORTING_FORM",
            "-w",
            "TRI_CHEM_ID=N150",
            "--where",
            "REPORTING_YEAR=2019,2020",
        ])
        .unwrap();

        match cli.command {
            Commands::Filter(args) => {
                assert_eq!(args.table, "TRI_REPORTING_FORM");
                let filter = args.conditions.to_filter();
                assert_eq!(
                    filter.to_segments().unwrap(),
                    vec!["REPORTING_YEAR", "in", "2019,2020", "TRI_CHEM_ID", "N150"]
                );
                assert!(args.output.output.is_none());
                assert!(!args.output.json);
            }
            _ => panic!("Expected Filter command"),
        }
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "tri",
            "--base-url",
            "http://localhost:8989",
            "count",
            "TRI_FACILITY",
            "--retries",
            "1",
            "--format",
            "csv",
            "--page-size",
            "500",
        ])
        .unwrap();

        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:8989"));
        let config = cli.client_config().unwrap();
        assert_eq!(config.base_url(), "http://localhost:8989");
        assert_eq!(config.max_retries(), 1);
        assert_eq!(config.format(), ResponseFormat::Csv);
        assert_eq!(config.page_size(), 500);
    }

    #[test]
    fn test_cli_rows_parsing() {
        let cli = Cli::try_parse_from(["tri", "rows", "TRI_CHEM_INFO", "0", "99", "--json"]).unwrap();
        match cli.command {
            Commands::Rows(args) => {
                assert_eq!((args.first, args.last), (0, 99));
                assert!(args.output.json);
            }
            _ => panic!("Expected Rows command"),
        }
    }

    #[test]
    fn test_cli_bad_condition_fails() {
        assert!(Cli::try_parse_from(["tri", "filter", "T", "-w", "NOEQUALS"]).is_err());
        assert!(Cli::try_parse_from(["tri", "filter", "T", "-w", "=x"]).is_err());
        assert!(Cli::try_parse_from(["tri", "count", "T", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["tri", "TRI_FACILITY"]).is_err());
    }

    #[test]
    fn test_parse_condition() {
        assert_eq!(
            parse_condition("CHEM_NAME=Lead").unwrap(),
            ("CHEM_NAME".to_string(), Condition::Equals("Lead".to_string()))
        );
        assert_eq!(
            parse_condition("YEAR=2019, 2020").unwrap(),
            (
                "YEAR".to_string(),
                Condition::OneOf(vec!["2019".to_string(), "2020".to_string()])
            )
        );
        // Only the first '=' separates column from value.
        assert_eq!(
            parse_condition("NOTE=a=b").unwrap().1,
            Condition::Equals("a=b".to_string())
        );
    }
}
