use serde::Serialize;

use super::aggregate::{ratio_of_sums, reduce, Reducer};
use super::model::{Record, Schema};
use crate::error::{EngineError, Result};

/// Headline numbers shown above the charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub records: usize,
    pub total_revenue: f64,
    pub total_profit: f64,
    /// `sum(profit) / sum(revenue) * 100`.
    pub margin_pct: f64,
    pub avg_revenue: f64,
}

impl KpiSummary {
    /// Compute the KPIs of a filtered subset.
    ///
    /// An empty subset fails with [`EngineError::EmptyResult`] for the whole
    /// row. The [`EngineError::EmptyGroup`] that its mean revenue would raise
    /// is never returned from here.
    pub fn from_subset(schema: &Schema, subset: &[&Record]) -> Result<Self> {
        if subset.is_empty() {
            return Err(EngineError::EmptyResult);
        }
        let records = subset.iter().copied();
        Ok(KpiSummary {
            records: subset.len(),
            total_revenue: reduce(schema, records.clone(), "revenue", Reducer::Sum)?,
            total_profit: reduce(schema, records.clone(), "profit", Reducer::Sum)?,
            margin_pct: ratio_of_sums(schema, records.clone(), "profit", "revenue")? * 100.0,
            avg_revenue: reduce(schema, records, "revenue", Reducer::Mean)?,
        })
    }
}
