use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::data::filter::{
    filtered_indices, init_filter_spec, matching_indices, DateRange, FilterSpec, Subset,
};
use crate::data::model::Dataset;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Selection session
// ---------------------------------------------------------------------------

/// Translates raw selections (checkboxes, date pickers, sliders) into a
/// [`FilterSpec`] and keeps the matching rows cached. The dataset is shared
/// and never modified.
#[derive(Debug, Clone)]
pub struct Session<'d> {
    dataset: &'d Dataset,

    /// Current selections.
    filters: FilterSpec,

    /// Indices of records passing the current filters (cached).
    visible_indices: Vec<usize>,
}

impl<'d> Session<'d> {
    /// Start with everything selected.
    pub fn new(dataset: &'d Dataset) -> Self {
        let filters = init_filter_spec(dataset);
        let visible_indices = matching_indices(dataset, &filters);
        Self {
            dataset,
            filters,
            visible_indices,
        }
    }

    /// Start from a saved filter. Fails if it does not fit the dataset.
    pub fn with_filters(dataset: &'d Dataset, filters: FilterSpec) -> Result<Self> {
        let visible_indices = filtered_indices(dataset, &filters)?;
        Ok(Self {
            dataset,
            filters,
            visible_indices,
        })
    }

    pub fn dataset(&self) -> &'d Dataset {
        self.dataset
    }

    pub fn filters(&self) -> &FilterSpec {
        &self.filters
    }

    pub fn visible_indices(&self) -> &[usize] {
        &self.visible_indices
    }

    /// Records passing the current filters, in dataset order.
    pub fn visible(&self) -> Subset<'d> {
        let records = self.dataset.records();
        self.visible_indices.iter().map(|&i| &records[i]).collect()
    }

    /// Apply a modified copy of the filters. On error the session is left
    /// untouched.
    fn update(&mut self, edit: impl FnOnce(&mut FilterSpec)) -> Result<()> {
        let mut next = self.filters.clone();
        edit(&mut next);
        self.visible_indices = filtered_indices(self.dataset, &next)?;
        self.filters = next;
        log::debug!(
            "{} of {} records visible",
            self.visible_indices.len(),
            self.dataset.len()
        );
        Ok(())
    }

    /// Toggle a single value in a dimension's selection.
    pub fn toggle_value(&mut self, dimension: &str, value: &str) -> Result<()> {
        self.update(|f| {
            let selected = f.categories.entry(dimension.to_string()).or_default();
            if !selected.remove(value) {
                selected.insert(value.to_string());
            }
        })
    }

    /// Replace a dimension's selection.
    pub fn select_only<I, S>(&mut self, dimension: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        self.update(|f| {
            f.categories.insert(dimension.to_string(), values);
        })
    }

    /// Select all known values in a dimension.
    pub fn select_all(&mut self, dimension: &str) -> Result<()> {
        let all = self.dataset.domain(dimension).cloned().unwrap_or_default();
        self.select_only(dimension, all)
    }

    /// Deselect all values in a dimension.
    pub fn select_none(&mut self, dimension: &str) -> Result<()> {
        self.select_only(dimension, Vec::<String>::new())
    }

    pub fn set_date_range(&mut self, start: NaiveDate, end: NaiveDate) -> Result<()> {
        let range = DateRange::new(start, end)?;
        self.update(|f| f.date_range = Some(range))
    }

    /// Set or clear a lower bound on a measure.
    pub fn set_min(&mut self, measure: &str, min: Option<f64>) -> Result<()> {
        self.update(|f| match min {
            Some(v) => {
                f.min_values.insert(measure.to_string(), v);
            }
            None => {
                f.min_values.remove(measure);
            }
        })
    }

    /// Set or clear an exact-match requirement on a dimension.
    pub fn set_equals(&mut self, dimension: &str, value: Option<&str>) -> Result<()> {
        self.update(|f| match value {
            Some(v) => {
                f.equals.insert(dimension.to_string(), v.to_string());
            }
            None => {
                f.equals.remove(dimension);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::generator::{generate, GeneratorConfig};
    use crate::data::model::{Record, Schema, MISSING};
    use crate::error::EngineError;

    fn dataset() -> Dataset {
        generate(&GeneratorConfig {
            rows: 300,
            ..Default::default()
        })
    }

    #[test]
    fn starts_with_everything_visible() {
        let ds = dataset();
        let session = Session::new(&ds);
        assert_eq!(session.visible().len(), ds.len());
    }

    #[test]
    fn cached_view_agrees_with_filters_when_values_are_missing() {
        let day = |d| {
            NaiveDate::from_ymd_opt(2024, 1, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let ds = Dataset::new(
            Schema::new(["region"], ["revenue"]),
            vec![
                Record::new(day(1)).with_dimension("region", "Europe"),
                Record::new(day(2)).with_measure("revenue", 3.0),
                Record::new(day(3)).with_dimension("region", "Asia"),
            ],
        );
        let mut session = Session::new(&ds);
        assert_eq!(session.visible().len(), 3);
        assert_eq!(session.visible(), ds.filter(session.filters()).unwrap());

        session.select_none("region").unwrap();
        session.select_all("region").unwrap();
        assert_eq!(session.visible().len(), 3);

        session.toggle_value("region", MISSING).unwrap();
        assert_eq!(session.visible_indices(), &[0, 2]);
    }

    #[test]
    fn none_then_all_restores_the_view() {
        let ds = dataset();
        let mut session = Session::new(&ds);
        session.select_none("region").unwrap();
        assert!(session.visible().is_empty());
        session.select_all("region").unwrap();
        assert_eq!(session.visible().len(), ds.len());
    }

    #[test]
    fn toggling_twice_is_a_no_op() {
        let ds = dataset();
        let mut session = Session::new(&ds);
        session.toggle_value("product", "Basic Plan").unwrap();
        let without = session.visible().len();
        assert!(without < ds.len());
        assert!(session
            .visible()
            .iter()
            .all(|r| r.dimension("product") != Some("Basic Plan")));
        session.toggle_value("product", "Basic Plan").unwrap();
        assert_eq!(session.visible().len(), ds.len());
    }

    #[test]
    fn rejected_edits_leave_the_session_alone() {
        let ds = dataset();
        let mut session = Session::new(&ds);
        session.select_only("region", ["Europe"]).unwrap();
        let before = session.visible_indices().to_vec();

        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(matches!(
            session.set_date_range(start, end),
            Err(EngineError::InvalidRange { .. })
        ));
        assert_eq!(
            session.select_only("colour", ["red"]),
            Err(EngineError::UnknownField("colour".into()))
        );
        assert_eq!(session.visible_indices(), before.as_slice());
        assert!(!session.filters().categories.contains_key("colour"));
    }

    #[test]
    fn threshold_and_status_can_be_cleared() {
        let ds = dataset();
        let mut session = Session::new(&ds);
        session.set_min("revenue", Some(4000.0)).unwrap();
        session.set_equals("status", Some("Confirmed")).unwrap();
        assert!(session.visible().iter().all(|r| {
            r.measure("revenue").unwrap() >= 4000.0 && r.dimension("status") == Some("Confirmed")
        }));
        session.set_min("revenue", None).unwrap();
        session.set_equals("status", None).unwrap();
        assert_eq!(session.visible().len(), ds.len());
    }
}
