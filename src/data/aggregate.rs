use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::bucket::{GroupValue, TimeBucket};
use super::model::{Record, Schema, DATE_FIELD};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Aggregation specification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Sum,
    Mean,
    Count,
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reducer::Sum => "sum",
            Reducer::Mean => "mean",
            Reducer::Count => "count",
        };
        write!(f, "{name}")
    }
}

/// One component of a group-by: a dimension or a time bucket of the date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Dimension(String),
    Bucket(TimeBucket),
}

impl GroupKey {
    pub fn dimension(name: impl Into<String>) -> Self {
        GroupKey::Dimension(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            GroupKey::Dimension(name) => name.as_str(),
            GroupKey::Bucket(bucket) => bucket.name(),
        }
    }

    fn value_for(&self, rec: &Record) -> GroupValue {
        match self {
            GroupKey::Dimension(name) => rec
                .dimension(name)
                .map(GroupValue::text)
                .unwrap_or(GroupValue::Null),
            GroupKey::Bucket(bucket) => bucket.key(rec.date),
        }
    }
}

/// Ratio of two measures, always computed from the group's totals:
/// `sum(numerator) / sum(denominator)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioSpec {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub group_by: Vec<GroupKey>,
    #[serde(default)]
    pub measures: BTreeMap<String, Reducer>,
    #[serde(default)]
    pub ratios: Vec<RatioSpec>,
}

impl AggregationSpec {
    pub fn by(keys: impl IntoIterator<Item = GroupKey>) -> Self {
        Self {
            group_by: keys.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn reduce(mut self, field: impl Into<String>, reducer: Reducer) -> Self {
        self.measures.insert(field.into(), reducer);
        self
    }

    pub fn sum(self, field: impl Into<String>) -> Self {
        self.reduce(field, Reducer::Sum)
    }

    pub fn mean(self, field: impl Into<String>) -> Self {
        self.reduce(field, Reducer::Mean)
    }

    pub fn count(self, field: impl Into<String>) -> Self {
        self.reduce(field, Reducer::Count)
    }

    pub fn ratio(
        mut self,
        name: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        self.ratios.push(RatioSpec {
            name: name.into(),
            numerator: numerator.into(),
            denominator: denominator.into(),
        });
        self
    }

    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if self.group_by.is_empty() {
            return Err(EngineError::EmptyGroupBy);
        }
        for key in &self.group_by {
            if let GroupKey::Dimension(name) = key {
                schema.require_dimension(name)?;
            }
        }
        for (field, reducer) in &self.measures {
            check_reducer(schema, field, *reducer)?;
        }
        let mut columns: BTreeSet<&str> = self.measures.keys().map(String::as_str).collect();
        for ratio in &self.ratios {
            schema.require_measure(&ratio.numerator)?;
            schema.require_measure(&ratio.denominator)?;
            if !columns.insert(ratio.name.as_str()) {
                return Err(EngineError::DuplicateColumn(ratio.name.clone()));
            }
        }
        Ok(())
    }

    /// Output column names: reduced fields, then ratios.
    pub fn columns(&self) -> Vec<String> {
        self.measures
            .keys()
            .chain(self.ratios.iter().map(|r| &r.name))
            .cloned()
            .collect()
    }

    /// Measures whose totals are needed, either directly or by a ratio.
    fn summed_fields(&self) -> BTreeSet<&str> {
        self.measures
            .iter()
            .filter(|(_, r)| **r != Reducer::Count)
            .map(|(f, _)| f.as_str())
            .chain(
                self.ratios
                    .iter()
                    .flat_map(|r| [r.numerator.as_str(), r.denominator.as_str()]),
            )
            .collect()
    }
}

/// `sum` and `mean` need a measure; `count` accepts any column.
fn check_reducer(schema: &Schema, field: &str, reducer: Reducer) -> Result<()> {
    match reducer {
        Reducer::Sum | Reducer::Mean => schema.require_measure(field),
        Reducer::Count => schema.require_field(field).map(|_| ()),
    }
}

fn has_field(rec: &Record, field: &str) -> bool {
    field == DATE_FIELD || rec.dimensions.contains_key(field) || rec.measures.contains_key(field)
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Running {
    sum: f64,
    n: usize,
}

impl Running {
    fn push(&mut self, v: f64) {
        self.sum += v;
        self.n += 1;
    }
}

#[derive(Debug, Default)]
struct Accumulator<'s> {
    records: usize,
    totals: BTreeMap<&'s str, Running>,
    counts: BTreeMap<&'s str, usize>,
}

impl<'s> Accumulator<'s> {
    fn push(&mut self, rec: &Record, summed: &BTreeSet<&'s str>, counted: &[&'s str]) {
        self.records += 1;
        for field in summed {
            if let Some(v) = rec.measure(field) {
                self.totals.entry(*field).or_default().push(v);
            }
        }
        for field in counted {
            if has_field(rec, field) {
                *self.counts.entry(*field).or_default() += 1;
            }
        }
    }

    fn total(&self, field: &str) -> Running {
        self.totals.get(field).copied().unwrap_or_default()
    }

    fn finish(&self, spec: &AggregationSpec) -> Result<BTreeMap<String, f64>> {
        let mut values = BTreeMap::new();
        for (field, reducer) in &spec.measures {
            let value = match reducer {
                Reducer::Sum => self.total(field).sum,
                Reducer::Count => self.counts.get(field.as_str()).copied().unwrap_or(0) as f64,
                Reducer::Mean => mean_of(self.total(field), field)?,
            };
            values.insert(field.clone(), value);
        }
        for ratio in &spec.ratios {
            let value = divide(
                self.total(&ratio.numerator).sum,
                self.total(&ratio.denominator).sum,
                ratio,
            )?;
            values.insert(ratio.name.clone(), value);
        }
        Ok(values)
    }
}

fn mean_of(running: Running, field: &str) -> Result<f64> {
    if running.n == 0 {
        return Err(EngineError::EmptyGroup {
            field: field.to_string(),
            reducer: Reducer::Mean.to_string(),
        });
    }
    Ok(running.sum / running.n as f64)
}

fn divide(numerator: f64, denominator: f64, ratio: &RatioSpec) -> Result<f64> {
    if denominator == 0.0 {
        return Err(EngineError::DivisionByZero {
            numerator: ratio.numerator.clone(),
            denominator: ratio.denominator.clone(),
        });
    }
    Ok(numerator / denominator)
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One output group: its key, the number of records in it and the reduced
/// values keyed by measure (or ratio) name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: Vec<GroupValue>,
    pub records: usize,
    pub values: BTreeMap<String, f64>,
}

impl GroupRow {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Key components joined for display, e.g. `2024-02-01 / US`.
    pub fn label(&self) -> String {
        self.key
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

/// Groups sorted ascending by key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedResult {
    pub group_by: Vec<String>,
    /// Names of the reduced and ratio columns every row carries.
    pub columns: Vec<String>,
    pub rows: Vec<GroupRow>,
}

impl GroupedResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a group by its key.
    pub fn get(&self, key: &[GroupValue]) -> Option<&GroupRow> {
        self.rows
            .binary_search_by(|row| row.key.as_slice().cmp(key))
            .ok()
            .map(|i| &self.rows[i])
    }

    fn require_column(&self, name: &str) -> Result<()> {
        if self.columns.iter().any(|c| c == name) {
            Ok(())
        } else {
            Err(EngineError::UnknownField(name.to_string()))
        }
    }

    /// Sum of one output column over all groups.
    pub fn total(&self, name: &str) -> Result<f64> {
        self.require_column(name)?;
        Ok(self.rows.iter().filter_map(|r| r.value(name)).sum())
    }

    /// The `n` groups with the largest `name`. Ties go to the smaller key so
    /// the order is stable across runs.
    pub fn top_n(&self, name: &str, n: usize) -> Result<Vec<&GroupRow>> {
        self.require_column(name)?;
        let mut ranked: Vec<&GroupRow> = self.rows.iter().collect();
        ranked.sort_by(|a, b| {
            let va = a.value(name).unwrap_or(f64::NEG_INFINITY);
            let vb = b.value(name).unwrap_or(f64::NEG_INFINITY);
            vb.total_cmp(&va).then_with(|| a.key.cmp(&b.key))
        });
        ranked.truncate(n);
        Ok(ranked)
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Partition `records` by the group keys of `spec` and reduce every group.
///
/// An empty input yields zero groups, unless a `mean` is requested, which
/// fails with [`EngineError::EmptyGroup`].
pub fn aggregate<'a, I>(schema: &Schema, records: I, spec: &AggregationSpec) -> Result<GroupedResult>
where
    I: IntoIterator<Item = &'a Record>,
{
    spec.validate(schema)?;

    let summed = spec.summed_fields();
    let counted: Vec<&str> = spec
        .measures
        .iter()
        .filter(|(_, r)| **r == Reducer::Count)
        .map(|(f, _)| f.as_str())
        .collect();

    let mut groups: BTreeMap<Vec<GroupValue>, Accumulator<'_>> = BTreeMap::new();
    for rec in records {
        let key: Vec<GroupValue> = spec.group_by.iter().map(|k| k.value_for(rec)).collect();
        groups.entry(key).or_default().push(rec, &summed, &counted);
    }

    if groups.is_empty() {
        if let Some((field, _)) = spec.measures.iter().find(|(_, r)| **r == Reducer::Mean) {
            return Err(EngineError::EmptyGroup {
                field: field.clone(),
                reducer: Reducer::Mean.to_string(),
            });
        }
    }

    let rows = groups
        .into_iter()
        .map(|(key, acc)| {
            Ok(GroupRow {
                key,
                records: acc.records,
                values: acc.finish(spec)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    log::debug!(
        "aggregated into {} groups by {:?}",
        rows.len(),
        spec.group_by.iter().map(GroupKey::name).collect::<Vec<_>>()
    );

    Ok(GroupedResult {
        group_by: spec.group_by.iter().map(|k| k.name().to_string()).collect(),
        columns: spec.columns(),
        rows,
    })
}

/// Reduce one column over all `records` without grouping.
///
/// `sum` and `count` of nothing are `0`; `mean` of nothing is an error.
pub fn reduce<'a, I>(schema: &Schema, records: I, field: &str, reducer: Reducer) -> Result<f64>
where
    I: IntoIterator<Item = &'a Record>,
{
    check_reducer(schema, field, reducer)?;
    let mut running = Running::default();
    for rec in records {
        match reducer {
            Reducer::Count => {
                if has_field(rec, field) {
                    running.push(1.0);
                }
            }
            Reducer::Sum | Reducer::Mean => {
                if let Some(v) = rec.measure(field) {
                    running.push(v);
                }
            }
        }
    }
    match reducer {
        Reducer::Sum | Reducer::Count => Ok(running.sum),
        Reducer::Mean => mean_of(running, field),
    }
}

/// `sum(numerator) / sum(denominator)` over all `records`.
///
/// Fails with [`EngineError::EmptyGroup`] on an empty input and with
/// [`EngineError::DivisionByZero`] when the denominator totals zero.
pub fn ratio_of_sums<'a, I>(
    schema: &Schema,
    records: I,
    numerator: &str,
    denominator: &str,
) -> Result<f64>
where
    I: IntoIterator<Item = &'a Record>,
{
    schema.require_measure(numerator)?;
    schema.require_measure(denominator)?;

    let mut num = 0.0;
    let mut den = 0.0;
    let mut seen = 0usize;
    for rec in records {
        seen += 1;
        num += rec.measure(numerator).unwrap_or(0.0);
        den += rec.measure(denominator).unwrap_or(0.0);
    }
    if seen == 0 {
        return Err(EngineError::EmptyGroup {
            field: format!("{numerator}/{denominator}"),
            reducer: "ratio".to_string(),
        });
    }
    let ratio = RatioSpec {
        name: format!("{numerator}/{denominator}"),
        numerator: numerator.to_string(),
        denominator: denominator.to_string(),
    };
    divide(num, den, &ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn sale(date: NaiveDateTime, product: &str, revenue: f64, cost: f64) -> Record {
        Record::new(date)
            .with_dimension("product", product)
            .with_measure("revenue", revenue)
            .with_measure("cost", cost)
            .with_measure("profit", revenue - cost)
    }

    fn schema() -> Schema {
        Schema::new(["product"], ["cost", "profit", "revenue"])
    }

    #[test]
    fn sums_means_and_counts_per_group() {
        let records = vec![
            sale(at(2024, 1, 1), "A", 100.0, 40.0),
            sale(at(2024, 1, 2), "B", 30.0, 10.0),
            sale(at(2024, 1, 3), "A", 50.0, 20.0),
        ];
        let spec = AggregationSpec::by([GroupKey::dimension("product")])
            .sum("revenue")
            .mean("cost")
            .count("date");
        let result = aggregate(&schema(), &records, &spec).unwrap();

        assert_eq!(result.len(), 2);
        let a = result.get(&[GroupValue::text("A")]).unwrap();
        assert_eq!(a.records, 2);
        assert_eq!(a.value("revenue"), Some(150.0));
        assert_eq!(a.value("cost"), Some(30.0));
        assert_eq!(a.value("date"), Some(2.0));
    }

    #[test]
    fn groups_come_back_sorted_by_key() {
        let records = vec![
            sale(at(2024, 3, 1), "B", 1.0, 0.0),
            sale(at(2024, 1, 1), "C", 1.0, 0.0),
            sale(at(2024, 2, 1), "A", 1.0, 0.0),
        ];
        let spec = AggregationSpec::by([GroupKey::Bucket(TimeBucket::Month)]).sum("revenue");
        let labels: Vec<String> = aggregate(&schema(), &records, &spec)
            .unwrap()
            .rows
            .iter()
            .map(GroupRow::label)
            .collect();
        assert_eq!(labels, vec!["2024-01-01", "2024-02-01", "2024-03-01"]);
    }

    #[test]
    fn composite_keys_partition_on_every_component() {
        let records = vec![
            sale(at(2024, 1, 1), "A", 1.0, 0.0),
            sale(at(2024, 1, 9), "A", 2.0, 0.0),
            sale(at(2024, 2, 1), "A", 4.0, 0.0),
            sale(at(2024, 2, 1), "B", 8.0, 0.0),
        ];
        let spec = AggregationSpec::by([
            GroupKey::Bucket(TimeBucket::Month),
            GroupKey::dimension("product"),
        ])
        .sum("revenue");
        let result = aggregate(&schema(), &records, &spec).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result.group_by, vec!["month", "product"]);
        assert_eq!(result.rows[0].value("revenue"), Some(3.0));
        assert_eq!(result.rows[0].label(), "2024-01-01 / A");
    }

    #[test]
    fn ratios_use_sum_of_parts() {
        let records = vec![
            sale(at(2024, 2, 1), "A", 200.0, 150.0),
            sale(at(2024, 2, 2), "A", 100.0, 10.0),
        ];
        let spec = AggregationSpec::by([GroupKey::dimension("product")])
            .ratio("margin", "profit", "revenue");
        let result = aggregate(&schema(), &records, &spec).unwrap();
        let margin = result.rows[0].value("margin").unwrap();
        assert!((margin - 140.0 / 300.0).abs() < 1e-12);
    }

    #[test]
    fn zero_denominator_is_reported() {
        let records = vec![sale(at(2024, 2, 1), "A", 0.0, 0.0)];
        let spec = AggregationSpec::by([GroupKey::dimension("product")])
            .ratio("margin", "profit", "revenue");
        assert!(matches!(
            aggregate(&schema(), &records, &spec),
            Err(EngineError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn empty_input_sums_to_nothing_but_mean_fails() {
        let records: Vec<Record> = Vec::new();
        let sums = AggregationSpec::by([GroupKey::dimension("product")]).sum("revenue");
        let empty = aggregate(&schema(), &records, &sums).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.total("revenue"), Ok(0.0));
        assert!(empty.top_n("revenue", 3).unwrap().is_empty());
        assert_eq!(
            empty.total("nonexistent"),
            Err(EngineError::UnknownField("nonexistent".into()))
        );
        assert!(empty.top_n("nonexistent", 3).is_err());

        let means = sums.mean("cost");
        assert_eq!(
            aggregate(&schema(), &records, &means),
            Err(EngineError::EmptyGroup {
                field: "cost".into(),
                reducer: "mean".into(),
            })
        );

        assert_eq!(reduce(&schema(), &records, "revenue", Reducer::Sum), Ok(0.0));
        assert_eq!(reduce(&schema(), &records, "revenue", Reducer::Count), Ok(0.0));
        assert!(reduce(&schema(), &records, "revenue", Reducer::Mean).is_err());
        assert!(matches!(
            ratio_of_sums(&schema(), &records, "profit", "revenue"),
            Err(EngineError::EmptyGroup { .. })
        ));
    }

    #[test]
    fn invalid_specs_are_rejected() {
        let records = vec![sale(at(2024, 1, 1), "A", 1.0, 0.0)];
        assert_eq!(
            aggregate(&schema(), &records, &AggregationSpec::default().sum("revenue")),
            Err(EngineError::EmptyGroupBy)
        );
        let spec = AggregationSpec::by([GroupKey::dimension("colour")]).sum("revenue");
        assert_eq!(
            aggregate(&schema(), &records, &spec),
            Err(EngineError::UnknownField("colour".into()))
        );
        let spec = AggregationSpec::by([GroupKey::dimension("product")]).sum("product");
        assert_eq!(
            aggregate(&schema(), &records, &spec),
            Err(EngineError::UnknownField("product".into()))
        );
        let spec = AggregationSpec::by([GroupKey::dimension("product")])
            .sum("revenue")
            .ratio("revenue", "profit", "revenue");
        assert_eq!(
            aggregate(&schema(), &records, &spec),
            Err(EngineError::DuplicateColumn("revenue".into()))
        );
        let spec = AggregationSpec::by([GroupKey::dimension("product")])
            .ratio("margin", "profit", "revenue")
            .ratio("margin", "cost", "revenue");
        assert_eq!(
            spec.validate(&schema()),
            Err(EngineError::DuplicateColumn("margin".into()))
        );
    }

    #[test]
    fn top_n_breaks_ties_by_key() {
        let records = vec![
            sale(at(2024, 1, 1), "C", 50.0, 0.0),
            sale(at(2024, 1, 1), "B", 80.0, 0.0),
            sale(at(2024, 1, 1), "A", 50.0, 0.0),
            sale(at(2024, 1, 1), "D", 10.0, 0.0),
        ];
        let spec = AggregationSpec::by([GroupKey::dimension("product")]).sum("revenue");
        let result = aggregate(&schema(), &records, &spec).unwrap();
        let top: Vec<String> = result
            .top_n("revenue", 3)
            .unwrap()
            .into_iter()
            .map(GroupRow::label)
            .collect();
        assert_eq!(top, vec!["B", "A", "C"]);
        assert!(result.top_n("margin", 3).is_err());
        assert_eq!(result.total("revenue"), Ok(190.0));
    }

    #[test]
    fn missing_dimension_groups_under_null() {
        let records = vec![
            Record::new(at(2024, 1, 1)).with_measure("revenue", 5.0),
            sale(at(2024, 1, 1), "A", 1.0, 0.0),
        ];
        let spec = AggregationSpec::by([GroupKey::dimension("product")]).sum("revenue");
        let result = aggregate(&schema(), &records, &spec).unwrap();
        assert_eq!(result.rows[0].key, vec![GroupValue::Null]);
        assert_eq!(result.rows[0].label(), "<null>");
    }

    #[test]
    fn group_keys_read_from_json() {
        let spec: AggregationSpec = serde_json::from_str(
            r#"{
                "group_by": [{"bucket": "week"}, {"dimension": "product"}],
                "measures": {"revenue": "sum", "cost": "mean"},
                "ratios": [{"name": "margin", "numerator": "profit", "denominator": "revenue"}]
            }"#,
        )
        .unwrap();
        assert_eq!(spec.group_by[0], GroupKey::Bucket(TimeBucket::Week));
        assert_eq!(spec.group_by[1], GroupKey::dimension("product"));
        assert_eq!(spec.measures["cost"], Reducer::Mean);
        assert!(spec.validate(&schema()).is_ok());
    }
}
