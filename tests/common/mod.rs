//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use rusty_dash::data::generator::{generate, GeneratorConfig};
use rusty_dash::data::loader::read_csv;
use rusty_dash::{Dataset, FilterSpec, Record};

pub fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn sale(date: NaiveDateTime, country: &str, revenue: f64, cost: f64) -> Record {
    Record::new(date)
        .with_dimension("country", country)
        .with_measure("revenue", revenue)
        .with_measure("cost", cost)
        .with_measure("profit", revenue - cost)
}

/// (Jan 2024, US, 100/40), (Feb 2024, US, 200/150), (Feb 2024, FR, 50/10)
pub fn three_sales() -> Dataset {
    Dataset::from_records(vec![
        sale(at(2024, 1, 15), "US", 100.0, 40.0),
        sale(at(2024, 2, 10), "US", 200.0, 150.0),
        sale(at(2024, 2, 20), "FR", 50.0, 10.0),
    ])
}

pub fn all_of_2024() -> FilterSpec {
    FilterSpec::default().with_date_range(day(2024, 1, 1), day(2024, 12, 31))
}

pub fn generated(seed: u64) -> Dataset {
    generate(&GeneratorConfig {
        seed,
        rows: 500,
        ..Default::default()
    })
}

/// A spread of selections over the generated sales schema.
pub fn sample_filters() -> Vec<FilterSpec> {
    vec![
        FilterSpec::default(),
        FilterSpec::default().with_date_range(day(2024, 3, 1), day(2024, 6, 30)),
        FilterSpec::default().with_selection("region", ["Europe", "Asia Pacific"]),
        FilterSpec::default()
            .with_selection("product", ["Basic Plan"])
            .with_equals("status", "Confirmed"),
        FilterSpec::default()
            .with_min("revenue", 3000.0)
            .with_date_range(day(2024, 7, 1), day(2024, 7, 31)),
        FilterSpec::default().with_selection("region", ["Atlantis"]),
    ]
}

/// Hand-entered export with blank cells: one sale has no region, another
/// no product.
pub fn sparse_sales() -> Dataset {
    let csv = "\
date,region,product,revenue
2024-01-05,Europe,Basic Plan,100
2024-01-06,,Basic Plan,50
2024-01-07,Asia,,70
2024-01-08,Asia,Premium Plan,120
";
    read_csv(csv.as_bytes()).unwrap()
}
