use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;

use rusty_dash::dashboard::{self, DashboardConfig};
use rusty_dash::data::export::export_csv;
use rusty_dash::data::generator::{default_dataset, generate, GeneratorConfig};
use rusty_dash::data::loader::load_file;
use rusty_dash::{report, Dataset, EngineError, Session};

#[derive(Parser)]
#[command(name = "rusty-dash")]
#[command(about = "Filter and aggregate sales transactions into dashboard views")]
struct Args {
    /// Transaction table (.csv, .json, .parquet); generated when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Seed for generated data
    #[arg(long, env = "RUSTY_DASH_SEED", default_value_t = 42)]
    seed: u64,

    /// Number of generated transactions
    #[arg(long, default_value_t = 1000)]
    rows: usize,

    /// Dashboard layout as JSON (views and saved filter)
    #[arg(short, long, env = "RUSTY_DASH_CONFIG")]
    config: Option<PathBuf>,

    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Only these regions (repeatable)
    #[arg(long = "region")]
    regions: Vec<String>,

    /// Only these products (repeatable)
    #[arg(long = "product")]
    products: Vec<String>,

    /// Only transactions with this status, e.g. Confirmed
    #[arg(long)]
    status: Option<String>,

    /// Minimum revenue per transaction
    #[arg(long)]
    min_revenue: Option<f64>,

    /// Write the filtered transactions to this CSV file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Print the result as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let owned: Dataset;
    let dataset: &Dataset = match &args.input {
        Some(path) => {
            owned = load_file(path)?;
            &owned
        }
        None => {
            let config = GeneratorConfig {
                seed: args.seed,
                rows: args.rows,
                ..Default::default()
            };
            if config == GeneratorConfig::default() {
                default_dataset()
            } else {
                owned = generate(&config);
                &owned
            }
        }
    };

    let config = match &args.config {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::default(),
    };
    config
        .validate(dataset.schema())
        .context("dashboard layout does not fit the data")?;

    let mut session = match &config.filter {
        Some(filter) => Session::with_filters(dataset, filter.clone())?,
        None => Session::new(dataset),
    };
    apply_args(&mut session, &args)?;

    let subset = session.visible();
    log::info!("{} of {} transactions selected", subset.len(), dataset.len());

    if let Some(path) = &args.export {
        export_csv(path, dataset.schema(), &subset)?;
    }

    match dashboard::evaluate(dataset.schema(), &subset, &config) {
        Ok(output) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print!("{}", report::render(&output));
            }
        }
        Err(EngineError::EmptyResult) => {
            log::warn!("filters exclude every transaction");
            println!("No data available for the selected filters. Please adjust your selection.");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Narrow the session with the command-line selections.
fn apply_args(session: &mut Session<'_>, args: &Args) -> Result<()> {
    if args.start.is_some() || args.end.is_some() {
        let current = session.filters().date_range;
        let start = args
            .start
            .or(current.map(|r| r.start))
            .context("--end given but the data has no dates")?;
        let end = args
            .end
            .or(current.map(|r| r.end))
            .context("--start given but the data has no dates")?;
        session.set_date_range(start, end)?;
    }
    if !args.regions.is_empty() {
        session.select_only("region", args.regions.iter().cloned())?;
    }
    if !args.products.is_empty() {
        session.select_only("product", args.products.iter().cloned())?;
    }
    if let Some(status) = &args.status {
        session.set_equals("status", Some(status.as_str()))?;
    }
    if let Some(min) = args.min_revenue {
        session.set_min("revenue", Some(min))?;
    }
    Ok(())
}
