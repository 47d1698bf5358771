use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, BooleanArray, Date32Array, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeStringArray, StringArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{NaiveDate, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{Dataset, Record, Schema, DATE_FIELD};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a transaction table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one row per transaction, `date` as Timestamp/Date32/Utf8
/// * `.json`    – `[{ "date": "2024-01-31", "region": "Europe", "revenue": 1200 }, ...]`
/// * `.csv`     – header row, `date` column, every other column is a dimension
///   or a measure depending on whether all its values are numeric
pub fn load_file(path: &Path) -> Result<Dataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let dataset = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    log::info!(
        "Loaded {} records with dimensions {:?} and measures {:?}",
        dataset.len(),
        dataset.schema().dimensions,
        dataset.schema().measures
    );
    Ok(dataset)
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("'{s}' is not a date"))?;
    date.and_hms_opt(0, 0, 0)
        .with_context(|| format!("'{s}' has no midnight"))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "date": "2024-01-05", "product": "Basic Plan", "revenue": 1830, "cost": 1500 },
///   ...
/// ]
/// ```
///
/// Strings and booleans become dimensions, numbers become measures, nulls are
/// left out of the record.
fn load_json(path: &Path) -> Result<Dataset> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    parse_json(&text)
}

pub fn parse_json(text: &str) -> Result<Dataset> {
    let root: JsonValue = serde_json::from_str(text).context("parsing JSON")?;

    let rows = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut records = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let obj = row
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let date = obj
            .get(DATE_FIELD)
            .and_then(|v| v.as_str())
            .with_context(|| format!("Row {i}: missing or invalid '{DATE_FIELD}'"))?;
        let mut record = Record::new(
            parse_timestamp(date).with_context(|| format!("Row {i}: bad '{DATE_FIELD}'"))?,
        );

        for (key, val) in obj {
            if key == DATE_FIELD {
                continue;
            }
            match val {
                JsonValue::Null => {}
                JsonValue::Number(n) => {
                    let v = n
                        .as_f64()
                        .with_context(|| format!("Row {i}, {key}: not a finite number"))?;
                    record.measures.insert(key.clone(), v);
                }
                JsonValue::String(s) => {
                    record.dimensions.insert(key.clone(), s.clone());
                }
                JsonValue::Bool(b) => {
                    record.dimensions.insert(key.clone(), b.to_string());
                }
                other => bail!("Row {i}, {key}: unsupported value {other}"),
            }
        }
        records.push(record);
    }

    Ok(Dataset::from_records(records))
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path).context("opening CSV")?;
    read_csv(file)
}

/// CSV layout:  header row with column names, one of them `date`.
/// A column whose non-empty cells all parse as numbers is a measure, anything
/// else is a dimension. Empty cells are left out of the record.
pub fn read_csv<R: Read>(input: R) -> Result<Dataset> {
    let mut reader = csv::Reader::from_reader(input);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let date_idx = headers
        .iter()
        .position(|h| h == DATE_FIELD)
        .with_context(|| format!("CSV missing '{DATE_FIELD}' column"))?;

    let rows: Vec<csv::StringRecord> = reader
        .records()
        .enumerate()
        .map(|(row_no, r)| r.with_context(|| format!("CSV row {row_no}")))
        .collect::<Result<_>>()?;

    // Column is numeric unless some non-empty cell refuses to parse.
    let numeric: Vec<bool> = (0..headers.len())
        .map(|col| {
            rows.iter()
                .filter_map(|r| r.get(col))
                .filter(|cell| !cell.trim().is_empty())
                .all(|cell| cell.trim().parse::<f64>().is_ok())
        })
        .collect();

    let mut dimensions = Vec::new();
    let mut measures = Vec::new();
    for (col, name) in headers.iter().enumerate() {
        if col == date_idx {
            continue;
        }
        if numeric[col] {
            measures.push(name.clone());
        } else {
            dimensions.push(name.clone());
        }
    }

    let mut records = Vec::with_capacity(rows.len());
    for (row_no, row) in rows.iter().enumerate() {
        let date = parse_timestamp(row.get(date_idx).unwrap_or(""))
            .with_context(|| format!("CSV row {row_no}: bad '{DATE_FIELD}'"))?;
        let mut record = Record::new(date);

        for (col, cell) in row.iter().enumerate() {
            let cell = cell.trim();
            if col == date_idx || cell.is_empty() {
                continue;
            }
            let Some(name) = headers.get(col) else {
                bail!("CSV row {row_no} has more cells than headers");
            };
            if numeric[col] {
                let v = cell
                    .parse::<f64>()
                    .with_context(|| format!("CSV row {row_no}, {name}: '{cell}'"))?;
                record.measures.insert(name.clone(), v);
            } else {
                record.dimensions.insert(name.clone(), cell.to_string());
            }
        }
        records.push(record);
    }

    Ok(Dataset::new(Schema { dimensions, measures }, records))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one transaction per row.
///
/// Expected schema:
/// - `date`: Timestamp (any unit), Date32 or Utf8
/// - Utf8 / LargeUtf8 / Boolean columns are dimensions
/// - Int32 / Int64 / Float32 / Float64 columns are measures
/// - other column types are skipped with a warning
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;

    let arrow_schema = builder.schema().clone();
    let date_idx = arrow_schema
        .index_of(DATE_FIELD)
        .map_err(|_| anyhow::anyhow!("Parquet file missing '{DATE_FIELD}' column"))?;

    let mut dimensions = Vec::new();
    let mut measures = Vec::new();
    let mut columns: Vec<(usize, String, ColumnRole)> = Vec::new();
    for (i, field) in arrow_schema.fields().iter().enumerate() {
        if i == date_idx {
            continue;
        }
        let role = match field.data_type() {
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Boolean => ColumnRole::Dimension,
            DataType::Int32 | DataType::Int64 | DataType::Float32 | DataType::Float64 => {
                ColumnRole::Measure
            }
            other => {
                log::warn!("skipping column '{}' of type {other:?}", field.name());
                continue;
            }
        };
        match role {
            ColumnRole::Dimension => dimensions.push(field.name().clone()),
            ColumnRole::Measure => measures.push(field.name().clone()),
        }
        columns.push((i, field.name().clone(), role));
    }

    let reader = builder.build().context("building parquet reader")?;
    let mut records = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let date_col = batch.column(date_idx);

        for row in 0..batch.num_rows() {
            let date = extract_timestamp(date_col, row)
                .with_context(|| format!("Row {row}: failed to read '{DATE_FIELD}'"))?;
            let mut record = Record::new(date);

            for (col_idx, name, role) in &columns {
                let col = batch.column(*col_idx);
                if col.is_null(row) {
                    continue;
                }
                match role {
                    ColumnRole::Dimension => {
                        let value = extract_text(col, row)
                            .with_context(|| format!("Row {row}: failed to read '{name}'"))?;
                        record.dimensions.insert(name.clone(), value);
                    }
                    ColumnRole::Measure => {
                        let value = extract_number(col, row)
                            .with_context(|| format!("Row {row}: failed to read '{name}'"))?;
                        record.measures.insert(name.clone(), value);
                    }
                }
            }
            records.push(record);
        }
    }

    Ok(Dataset::new(Schema { dimensions, measures }, records))
}

#[derive(Debug, Clone, Copy)]
enum ColumnRole {
    Dimension,
    Measure,
}

// -- Parquet / Arrow helpers --

fn downcast<'a, T: 'static>(col: &'a Arc<dyn Array>) -> Result<&'a T> {
    col.as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("unexpected array for {:?}", col.data_type()))
}

fn extract_timestamp(col: &Arc<dyn Array>, row: usize) -> Result<NaiveDateTime> {
    if col.is_null(row) {
        bail!("null timestamp");
    }
    let ts = match col.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => {
            downcast::<TimestampSecondArray>(col)?.value_as_datetime(row)
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            downcast::<TimestampMillisecondArray>(col)?.value_as_datetime(row)
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            downcast::<TimestampMicrosecondArray>(col)?.value_as_datetime(row)
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            downcast::<TimestampNanosecondArray>(col)?.value_as_datetime(row)
        }
        DataType::Date32 => downcast::<Date32Array>(col)?.value_as_datetime(row),
        DataType::Utf8 | DataType::LargeUtf8 => Some(parse_timestamp(&extract_text(col, row)?)?),
        other => bail!("Expected a timestamp, date or string column, got {other:?}"),
    };
    ts.context("timestamp out of range")
}

fn extract_text(col: &Arc<dyn Array>, row: usize) -> Result<String> {
    Ok(match col.data_type() {
        DataType::Utf8 => downcast::<StringArray>(col)?.value(row).to_string(),
        DataType::LargeUtf8 => downcast::<LargeStringArray>(col)?.value(row).to_string(),
        DataType::Boolean => downcast::<BooleanArray>(col)?.value(row).to_string(),
        other => bail!("Expected a string column, got {other:?}"),
    })
}

fn extract_number(col: &Arc<dyn Array>, row: usize) -> Result<f64> {
    Ok(match col.data_type() {
        DataType::Int32 => downcast::<Int32Array>(col)?.value(row) as f64,
        DataType::Int64 => downcast::<Int64Array>(col)?.value(row) as f64,
        DataType::Float32 => downcast::<Float32Array>(col)?.value(row) as f64,
        DataType::Float64 => downcast::<Float64Array>(col)?.value(row),
        other => bail!("Expected a numeric column, got {other:?}"),
    })
}
