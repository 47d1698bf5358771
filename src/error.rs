use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by the filter / aggregate engine.
///
/// Every variant is recoverable: the caller adjusts the filter or the
/// aggregation and tries again. IO-facing code wraps these in `anyhow`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("cannot compute {reducer} of '{field}' over an empty group")]
    EmptyGroup { field: String, reducer: String },

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("no records match the current filters")]
    EmptyResult,

    #[error("aggregation needs at least one group key")]
    EmptyGroupBy,

    #[error("output column '{0}' is defined more than once")]
    DuplicateColumn(String),

    #[error("ratio {numerator}/{denominator} is undefined: denominator sums to zero")]
    DivisionByZero {
        numerator: String,
        denominator: String,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
