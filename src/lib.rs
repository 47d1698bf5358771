//! Filter-and-aggregate engine behind single-page sales dashboards.
//!
//! A [`Dataset`] is built once (generated or loaded), a [`FilterSpec`] is
//! rebuilt from the user's selections on every interaction, and the filtered
//! [`Subset`] feeds grouped aggregations, KPIs and CSV export alike.

pub mod dashboard;
pub mod data;
pub mod error;
pub mod report;
pub mod session;

pub use data::aggregate::{
    aggregate, ratio_of_sums, reduce, AggregationSpec, GroupKey, GroupRow, GroupedResult,
    RatioSpec, Reducer,
};
pub use data::bucket::{GroupValue, TimeBucket};
pub use data::filter::{filter, filtered_indices, init_filter_spec, DateRange, FilterSpec, Subset};
pub use data::kpi::KpiSummary;
pub use data::model::{Dataset, FieldKind, Record, Schema, DATE_FIELD, MISSING};
pub use error::{EngineError, Result};
pub use session::Session;
