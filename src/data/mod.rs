/// Data layer: core types, loading, filtering and aggregation.
///
/// Architecture:
/// ```text
///  generator (seeded)      .csv / .json / .parquet
///        │                        │
///        └──────────┬─────────────┘
///                   ▼
///            ┌─────────────┐
///            │   Dataset   │  Vec<Record> sorted by date, dimension domains
///            └─────────────┘
///                   │
///                   ▼
///            ┌─────────────┐
///            │   filter    │  FilterSpec predicates → Subset (borrowed rows)
///            └─────────────┘
///                   │
///          ┌────────┴─────────┐
///          ▼                  ▼
///   ┌─────────────┐    ┌─────────────┐
///   │  aggregate  │    │   export    │  same subset → CSV
///   │  kpi/bucket │    └─────────────┘
///   └─────────────┘
/// ```

pub mod aggregate;
pub mod bucket;
pub mod export;
pub mod filter;
pub mod generator;
pub mod kpi;
pub mod loader;
pub mod model;
