use chrono::{Duration, NaiveDate};
use once_cell::sync::OnceCell;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::model::{Dataset, Record, Schema};

pub const PRODUCTS: [&str; 4] = [
    "Enterprise Suite",
    "Basic Plan",
    "Professional Plan",
    "Add-on Services",
];
pub const REGIONS: [&str; 4] = ["North America", "Europe", "Asia Pacific", "Latin America"];
pub const STATUSES: [&str; 3] = ["Confirmed", "Pending", "Cancelled"];

/// Parameters of the synthetic sales table.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub rows: usize,
    /// First and last day (inclusive) transactions may fall on.
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            rows: 1000,
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
        }
    }
}

pub fn sales_schema() -> Schema {
    Schema::new(
        ["product", "region", "status"],
        ["revenue", "cost", "profit"],
    )
}

/// Build a reproducible sales dataset: same config, same records.
///
/// Revenue is a whole amount in `[1000, 5000)`, margin is uniform in
/// `[0.10, 0.35)`, `profit = revenue * margin` and `cost = revenue - profit`.
/// Timestamps land on a random day of the range at a random hour.
pub fn generate(config: &GeneratorConfig) -> Dataset {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let span_days = (config.end - config.start).num_days().max(0);

    let records = (0..config.rows)
        .map(|_| {
            let day = config.start + Duration::days(rng.gen_range(0..=span_days));
            let hour = rng.gen_range(8..20);
            let date = day.and_hms_opt(hour, 0, 0).unwrap_or_default();

            let revenue = rng.gen_range(1000..5000) as f64;
            let margin: f64 = rng.gen_range(0.10..0.35);
            let profit = revenue * margin;

            Record::new(date)
                .with_dimension("product", *PRODUCTS.choose(&mut rng).unwrap_or(&PRODUCTS[0]))
                .with_dimension("region", *REGIONS.choose(&mut rng).unwrap_or(&REGIONS[0]))
                .with_dimension("status", *STATUSES.choose(&mut rng).unwrap_or(&STATUSES[0]))
                .with_measure("revenue", revenue)
                .with_measure("cost", revenue - profit)
                .with_measure("profit", profit)
        })
        .collect();

    let dataset = Dataset::new(sales_schema(), records);
    log::info!(
        "generated {} records (seed {}) between {} and {}",
        dataset.len(),
        config.seed,
        config.start,
        config.end
    );
    dataset
}

static DEFAULT_DATASET: OnceCell<Dataset> = OnceCell::new();

/// The process-wide dataset built from [`GeneratorConfig::default`]. Built on
/// first access and never rebuilt.
pub fn default_dataset() -> &'static Dataset {
    DEFAULT_DATASET.get_or_init(|| generate(&GeneratorConfig::default()))
}
