//! Dashboard layout: which KPIs and grouped views to compute for a filtered
//! subset. Loaded from JSON, or the built-in executive sales layout.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::data::aggregate::{aggregate, AggregationSpec, GroupKey, GroupRow};
use crate::data::bucket::TimeBucket;
use crate::data::filter::FilterSpec;
use crate::data::kpi::KpiSummary;
use crate::data::model::{Record, Schema};
use crate::error::Result;

/// Keep only the `n` largest groups by `measure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopN {
    pub measure: String,
    pub n: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub title: String,
    pub aggregation: AggregationSpec,
    #[serde(default)]
    pub top: Option<TopN>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Saved selections; `None` starts with everything selected.
    #[serde(default)]
    pub filter: Option<FilterSpec>,
    pub views: Vec<ViewSpec>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let product = || GroupKey::dimension("product");
        Self {
            filter: None,
            views: vec![
                ViewSpec {
                    title: "Revenue Trend Over Time".into(),
                    aggregation: AggregationSpec::by([GroupKey::Bucket(TimeBucket::Month)])
                        .sum("revenue")
                        .sum("profit"),
                    top: None,
                },
                ViewSpec {
                    title: "Revenue by Product".into(),
                    aggregation: AggregationSpec::by([product()])
                        .sum("revenue")
                        .ratio("margin", "profit", "revenue"),
                    top: None,
                },
                ViewSpec {
                    title: "Sales Performance by Region".into(),
                    aggregation: AggregationSpec::by([GroupKey::dimension("region")])
                        .sum("revenue")
                        .count("date"),
                    top: None,
                },
                ViewSpec {
                    title: "Top Products by Profit".into(),
                    aggregation: AggregationSpec::by([product()]).sum("profit"),
                    top: Some(TopN {
                        measure: "profit".into(),
                        n: 10,
                    }),
                },
                ViewSpec {
                    title: "Orders by Weekday and Hour".into(),
                    aggregation: AggregationSpec::by([
                        GroupKey::Bucket(TimeBucket::Weekday),
                        GroupKey::Bucket(TimeBucket::Hour),
                    ])
                    .count("date"),
                    top: None,
                },
            ],
        }
    }
}

impl DashboardConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        log::info!("loaded {} views from {}", config.views.len(), path.display());
        Ok(config)
    }

    /// Check every view against a schema before any data is touched.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if let Some(filter) = &self.filter {
            filter.validate(schema)?;
        }
        for view in &self.views {
            view.aggregation.validate(schema)?;
        }
        Ok(())
    }
}

/// Computed rows of one view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewResult {
    pub title: String,
    pub group_by: Vec<String>,
    pub columns: Vec<String>,
    /// Output columns holding sum-of-parts ratios rather than amounts.
    pub ratios: Vec<String>,
    pub rows: Vec<GroupRow>,
}

/// Everything the renderer needs for one interaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardOutput {
    pub kpis: KpiSummary,
    pub views: Vec<ViewResult>,
}

/// Compute KPIs and every view over the same filtered subset.
///
/// An empty subset fails with `EmptyResult` so the caller can show a
/// "no data for current filters" message instead of charts.
pub fn evaluate(schema: &Schema, subset: &[&Record], config: &DashboardConfig) -> Result<DashboardOutput> {
    let kpis = KpiSummary::from_subset(schema, subset)?;

    let views = config
        .views
        .iter()
        .map(|view| {
            let grouped = aggregate(schema, subset.iter().copied(), &view.aggregation)?;
            let rows = match &view.top {
                Some(top) => grouped
                    .top_n(&top.measure, top.n)?
                    .into_iter()
                    .cloned()
                    .collect(),
                None => grouped.rows,
            };
            Ok(ViewResult {
                title: view.title.clone(),
                group_by: grouped.group_by,
                columns: grouped.columns,
                ratios: view.aggregation.ratios.iter().map(|r| r.name.clone()).collect(),
                rows,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DashboardOutput { kpis, views })
}
