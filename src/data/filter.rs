use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::model::{Dataset, Record, Schema};
use crate::error::{EngineError, Result};

/// Filtered view over a dataset: borrowed records in their original order.
pub type Subset<'a> = Vec<&'a Record>;

// ---------------------------------------------------------------------------
// Filter specification
// ---------------------------------------------------------------------------

/// Inclusive calendar-date range. A record matches when the date part of its
/// timestamp lies in `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(EngineError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Conjunction of the user's selections.
///
/// * A dimension absent from `categories` is unconstrained.
/// * A dimension mapped to an empty set matches nothing.
/// * A record lacking a dimension carries [`MISSING`](super::model::MISSING)
///   for it, and passes a selection only when that member is selected.
/// * `min_values` keeps records whose measure is `>=` the threshold.
/// * `equals` keeps records whose dimension has exactly that value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub date_range: Option<DateRange>,
    pub categories: BTreeMap<String, BTreeSet<String>>,
    pub min_values: BTreeMap<String, f64>,
    pub equals: BTreeMap<String, String>,
}

impl FilterSpec {
    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some(DateRange { start, end });
        self
    }

    pub fn with_selection<I, S>(mut self, dimension: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories.insert(
            dimension.into(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn with_min(mut self, measure: impl Into<String>, min: f64) -> Self {
        self.min_values.insert(measure.into(), min);
        self
    }

    pub fn with_equals(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.insert(dimension.into(), value.into());
        self
    }

    /// Check the range and every field name against the schema.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if let Some(range) = &self.date_range {
            range.validate()?;
        }
        for dim in self.categories.keys().chain(self.equals.keys()) {
            schema.require_dimension(dim)?;
        }
        for measure in self.min_values.keys() {
            schema.require_measure(measure)?;
        }
        Ok(())
    }

    /// Whether some categorical selection is empty, so nothing can match.
    pub fn selects_nothing(&self) -> bool {
        self.categories.values().any(BTreeSet::is_empty)
    }
}

/// Initialise a [`FilterSpec`] with every known value selected and the full
/// date span of the data (i.e., show everything).
pub fn init_filter_spec(dataset: &Dataset) -> FilterSpec {
    FilterSpec {
        date_range: dataset
            .date_bounds()
            .map(|(start, end)| DateRange { start, end }),
        categories: dataset.unique_values().clone(),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

enum Predicate<'s> {
    Dates(DateRange),
    InSet(&'s str, &'s BTreeSet<String>),
    AtLeast(&'s str, f64),
    Equals(&'s str, &'s str),
}

impl Predicate<'_> {
    fn matches(&self, rec: &Record) -> bool {
        match self {
            Predicate::Dates(range) => range.contains(rec.date.date()),
            Predicate::InSet(col, selected) => selected.contains(rec.selectable(col)),
            Predicate::AtLeast(col, min) => rec.measure(col).is_some_and(|v| v >= *min),
            Predicate::Equals(col, expected) => rec.selectable(col) == *expected,
        }
    }
}

fn compile(spec: &FilterSpec) -> Vec<Predicate<'_>> {
    let mut predicates = Vec::new();
    if let Some(range) = spec.date_range {
        predicates.push(Predicate::Dates(range));
    }
    for (col, selected) in &spec.categories {
        predicates.push(Predicate::InSet(col.as_str(), selected));
    }
    for (col, min) in &spec.min_values {
        predicates.push(Predicate::AtLeast(col.as_str(), *min));
    }
    for (col, value) in &spec.equals {
        predicates.push(Predicate::Equals(col.as_str(), value.as_str()));
    }
    predicates
}

/// Return the records that pass every predicate of `spec`, in input order.
///
/// `records` may be a whole dataset or an earlier subset, so filters can be
/// re-applied. Fails before touching any record if the date range is
/// inverted or a field is not in `schema`.
pub fn filter<'a, I>(schema: &Schema, records: I, spec: &FilterSpec) -> Result<Subset<'a>>
where
    I: IntoIterator<Item = &'a Record>,
{
    spec.validate(schema)?;
    if spec.selects_nothing() {
        log::debug!("empty selection, filter matches nothing");
        return Ok(Vec::new());
    }

    let predicates = compile(spec);
    let subset: Subset<'a> = records
        .into_iter()
        .filter(|rec| predicates.iter().all(|p| p.matches(rec)))
        .collect();

    log::debug!(
        "filter kept {} records using {} predicates",
        subset.len(),
        predicates.len()
    );
    Ok(subset)
}

/// Return indices of records that pass `spec`.
pub fn filtered_indices(dataset: &Dataset, spec: &FilterSpec) -> Result<Vec<usize>> {
    spec.validate(dataset.schema())?;
    Ok(matching_indices(dataset, spec))
}

/// [`filtered_indices`] for a spec already known to fit the dataset.
pub(crate) fn matching_indices(dataset: &Dataset, spec: &FilterSpec) -> Vec<usize> {
    if spec.selects_nothing() {
        return Vec::new();
    }

    let predicates = compile(spec);
    dataset
        .records()
        .iter()
        .enumerate()
        .filter(|(_, rec)| predicates.iter().all(|p| p.matches(rec)))
        .map(|(i, _)| i)
        .collect()
}

impl Dataset {
    pub fn filter(&self, spec: &FilterSpec) -> Result<Subset<'_>> {
        filter(self.schema(), self.records(), spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use crate::data::model::MISSING;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> Dataset {
        Dataset::from_records(vec![
            Record::new(at(2024, 1, 10, 9))
                .with_dimension("country", "US")
                .with_dimension("status", "Confirmed")
                .with_measure("revenue", 100.0),
            Record::new(at(2024, 2, 5, 23))
                .with_dimension("country", "FR")
                .with_dimension("status", "Pending")
                .with_measure("revenue", 50.0),
            Record::new(at(2024, 2, 29, 12))
                .with_dimension("country", "US")
                .with_dimension("status", "Confirmed")
                .with_measure("revenue", 200.0),
        ])
    }

    #[test]
    fn date_range_is_inclusive_on_both_ends() {
        let ds = sample();
        let spec = FilterSpec::default().with_date_range(date(2024, 1, 10), date(2024, 2, 5));
        let subset = ds.filter(&spec).unwrap();
        assert_eq!(subset.len(), 2);
        assert_eq!(subset[1].date, at(2024, 2, 5, 23));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let ds = sample();
        let spec = FilterSpec::default().with_date_range(date(2024, 3, 1), date(2024, 1, 1));
        assert_eq!(
            ds.filter(&spec),
            Err(EngineError::InvalidRange {
                start: date(2024, 3, 1),
                end: date(2024, 1, 1),
            })
        );
        assert!(DateRange::new(date(2024, 3, 1), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn unknown_values_never_match_but_unknown_fields_fail() {
        let ds = sample();
        let spec = FilterSpec::default().with_selection("country", ["DE"]);
        assert!(ds.filter(&spec).unwrap().is_empty());

        let spec = FilterSpec::default().with_selection("planet", ["Mars"]);
        assert_eq!(
            ds.filter(&spec),
            Err(EngineError::UnknownField("planet".into()))
        );

        let spec = FilterSpec::default().with_min("country", 1.0);
        assert!(matches!(ds.filter(&spec), Err(EngineError::UnknownField(_))));
    }

    #[test]
    fn threshold_and_status_predicates_combine() {
        let ds = sample();
        let spec = FilterSpec::default()
            .with_min("revenue", 100.0)
            .with_equals("status", "Confirmed");
        let revenue: Vec<f64> = ds
            .filter(&spec)
            .unwrap()
            .iter()
            .filter_map(|r| r.measure("revenue"))
            .collect();
        assert_eq!(revenue, vec![100.0, 200.0]);
    }

    #[test]
    fn indices_agree_with_subset() {
        let ds = sample();
        let spec = FilterSpec::default().with_selection("country", ["US"]);
        let idx = filtered_indices(&ds, &spec).unwrap();
        assert_eq!(idx, vec![0, 2]);

        let subset = ds.filter(&spec).unwrap();
        for (i, rec) in idx.iter().zip(subset) {
            assert_eq!(&ds.records()[*i], rec);
        }
    }

    #[test]
    fn init_spec_selects_everything() {
        let ds = sample();
        let spec = init_filter_spec(&ds);
        assert_eq!(ds.filter(&spec).unwrap().len(), ds.len());
        assert_eq!(
            spec.date_range,
            Some(DateRange {
                start: date(2024, 1, 10),
                end: date(2024, 2, 29),
            })
        );
    }

    #[test]
    fn records_without_a_dimension_follow_the_missing_member() {
        let ds = Dataset::new(
            Schema::new(["region"], ["revenue"]),
            vec![
                Record::new(at(2024, 1, 1, 0)).with_dimension("region", "Europe"),
                Record::new(at(2024, 1, 2, 0)).with_measure("revenue", 1.0),
                Record::new(at(2024, 1, 3, 0)).with_dimension("region", "Asia"),
            ],
        );
        assert_eq!(ds.filter(&init_filter_spec(&ds)).unwrap().len(), 3);

        let named = FilterSpec::default().with_selection("region", ["Asia", "Europe"]);
        assert_eq!(ds.filter(&named).unwrap().len(), 2);

        let blanks = FilterSpec::default().with_selection("region", [MISSING]);
        let kept = ds.filter(&blanks).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].dimension("region"), None);
    }

    #[test]
    fn spec_reads_from_json() {
        let spec: FilterSpec = serde_json::from_str(
            r#"{
                "date_range": {"start": "2024-01-01", "end": "2024-12-31"},
                "categories": {"country": ["US"]}
            }"#,
        )
        .unwrap();
        assert_eq!(sample().filter(&spec).unwrap().len(), 2);
        assert!(spec.min_values.is_empty());
    }
}
