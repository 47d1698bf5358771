use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Name of the timestamp column in every dataset.
pub const DATE_FIELD: &str = "date";

/// Domain member standing for "no value" on a dimension. Selecting it keeps
/// records that lack the dimension.
pub const MISSING: &str = "";

// ---------------------------------------------------------------------------
// Record – one row of the transaction table
// ---------------------------------------------------------------------------

/// A single transaction: a timestamp, categorical dimensions and numeric
/// measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date: NaiveDateTime,
    /// Categorical columns: column_name → value.
    pub dimensions: BTreeMap<String, String>,
    /// Numeric columns: column_name → value.
    pub measures: BTreeMap<String, f64>,
}

impl Record {
    pub fn new(date: NaiveDateTime) -> Self {
        Self {
            date,
            dimensions: BTreeMap::new(),
            measures: BTreeMap::new(),
        }
    }

    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(name.into(), value.into());
        self
    }

    pub fn with_measure(mut self, name: impl Into<String>, value: f64) -> Self {
        self.measures.insert(name.into(), value);
        self
    }

    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions.get(name).map(String::as_str)
    }

    /// Value of a dimension as seen by selections: [`MISSING`] when absent.
    pub fn selectable(&self, name: &str) -> &str {
        self.dimension(name).unwrap_or(MISSING)
    }

    pub fn measure(&self, name: &str) -> Option<f64> {
        self.measures.get(name).copied()
    }
}

// ---------------------------------------------------------------------------
// Schema – which names are dimensions and which are measures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Date,
    Dimension,
    Measure,
}

/// Column layout of a dataset. The timestamp column is always [`DATE_FIELD`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub dimensions: Vec<String>,
    pub measures: Vec<String>,
}

impl Schema {
    pub fn new<D, M>(dimensions: D, measures: M) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            measures: measures.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        if name == DATE_FIELD {
            Some(FieldKind::Date)
        } else if self.dimensions.iter().any(|d| d == name) {
            Some(FieldKind::Dimension)
        } else if self.measures.iter().any(|m| m == name) {
            Some(FieldKind::Measure)
        } else {
            None
        }
    }

    pub fn require_dimension(&self, name: &str) -> Result<()> {
        match self.kind_of(name) {
            Some(FieldKind::Dimension) => Ok(()),
            _ => Err(EngineError::UnknownField(name.to_string())),
        }
    }

    pub fn require_measure(&self, name: &str) -> Result<()> {
        match self.kind_of(name) {
            Some(FieldKind::Measure) => Ok(()),
            _ => Err(EngineError::UnknownField(name.to_string())),
        }
    }

    /// Any column at all, including the timestamp.
    pub fn require_field(&self, name: &str) -> Result<FieldKind> {
        self.kind_of(name)
            .ok_or_else(|| EngineError::UnknownField(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Dataset – the complete, immutable transaction table
// ---------------------------------------------------------------------------

/// All records sorted by date, with the categorical domain of every
/// dimension computed once at construction.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<Record>,
    schema: Schema,
    /// For each dimension the sorted set of values seen in the data,
    /// including [`MISSING`] when some record lacks it.
    unique_values: BTreeMap<String, BTreeSet<String>>,
}

impl Dataset {
    /// Build a dataset with an explicit column layout. Records are sorted by
    /// date (stable, so equal timestamps keep their input order).
    pub fn new(schema: Schema, mut records: Vec<Record>) -> Self {
        records.sort_by_key(|r| r.date);

        let unique_values: BTreeMap<String, BTreeSet<String>> = schema
            .dimensions
            .iter()
            .map(|col| {
                let domain = records
                    .iter()
                    .map(|rec| rec.selectable(col).to_owned())
                    .collect();
                (col.clone(), domain)
            })
            .collect();

        Dataset {
            records,
            schema,
            unique_values,
        }
    }

    /// Build a dataset whose schema is the union of the columns found on the
    /// records.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut dimensions: BTreeSet<String> = BTreeSet::new();
        let mut measures: BTreeSet<String> = BTreeSet::new();
        for rec in &records {
            dimensions.extend(rec.dimensions.keys().cloned());
            measures.extend(rec.measures.keys().cloned());
        }
        Self::new(Schema::new(dimensions, measures), records)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn unique_values(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.unique_values
    }

    /// Known values of one dimension.
    pub fn domain(&self, dimension: &str) -> Option<&BTreeSet<String>> {
        self.unique_values.get(dimension)
    }

    /// First and last calendar date in the data.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.records.first()?.date.date();
        let last = self.records.last()?.date.date();
        Some((first, last))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
