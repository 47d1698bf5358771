use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use rusty_dash::data::export::{export_csv, write_parquet};
use rusty_dash::data::generator::{generate, GeneratorConfig};
use rusty_dash::Record;

/// Write a reproducible synthetic sales table.
#[derive(Parser)]
#[command(name = "generate_sample")]
struct Args {
    /// Output file; the extension picks the format (.parquet or .csv)
    #[arg(default_value = "sample_sales.parquet")]
    output: PathBuf,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 1000)]
    rows: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let dataset = generate(&GeneratorConfig {
        seed: args.seed,
        rows: args.rows,
        ..Default::default()
    });
    let records: Vec<&Record> = dataset.records().iter().collect();

    let ext = args
        .output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "parquet" | "pq" => write_parquet(&args.output, dataset.schema(), &records)?,
        "csv" => export_csv(&args.output, dataset.schema(), &records)?,
        other => bail!("Unsupported output extension: .{other}"),
    }

    println!(
        "Wrote {} transactions (seed {}) to {}",
        dataset.len(),
        args.seed,
        args.output.display()
    );
    Ok(())
}
