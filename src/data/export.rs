use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::model::{Record, Schema, DATE_FIELD};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Write records as CSV: `date`, then the dimensions, then the measures, in
/// schema order. Missing values are empty cells.
pub fn write_csv<W: Write>(schema: &Schema, records: &[&Record], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);

    let header = std::iter::once(DATE_FIELD)
        .chain(schema.dimensions.iter().map(String::as_str))
        .chain(schema.measures.iter().map(String::as_str));
    writer.write_record(header).context("writing CSV header")?;

    for rec in records {
        let mut row = Vec::with_capacity(1 + schema.dimensions.len() + schema.measures.len());
        row.push(rec.date.format(TIMESTAMP_FORMAT).to_string());
        for dim in &schema.dimensions {
            row.push(rec.dimension(dim).unwrap_or_default().to_string());
        }
        for measure in &schema.measures {
            row.push(rec.measure(measure).map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&row).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

/// Export the filtered subset to a CSV file.
pub fn export_csv(path: &Path, schema: &Schema, records: &[&Record]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_csv(schema, records, file)?;
    log::info!("exported {} records to {}", records.len(), path.display());
    Ok(())
}

/// Write records to Parquet: `date` as a millisecond timestamp, dimensions
/// as Utf8, measures as Float64.
pub fn write_parquet(path: &Path, schema: &Schema, records: &[&Record]) -> Result<()> {
    let mut fields = vec![Field::new(
        DATE_FIELD,
        DataType::Timestamp(TimeUnit::Millisecond, None),
        false,
    )];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(TimestampMillisecondArray::from(
        records
            .iter()
            .map(|r| r.date.and_utc().timestamp_millis())
            .collect::<Vec<_>>(),
    ))];

    for dim in &schema.dimensions {
        fields.push(Field::new(dim, DataType::Utf8, true));
        columns.push(Arc::new(StringArray::from(
            records.iter().map(|r| r.dimension(dim)).collect::<Vec<_>>(),
        )));
    }
    for measure in &schema.measures {
        fields.push(Field::new(measure, DataType::Float64, true));
        columns.push(Arc::new(Float64Array::from(
            records.iter().map(|r| r.measure(measure)).collect::<Vec<_>>(),
        )));
    }

    let arrow_schema = Arc::new(ArrowSchema::new(fields));
    let batch = RecordBatch::try_new(arrow_schema.clone(), columns)
        .context("building record batch")?;

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer =
        ArrowWriter::try_new(file, arrow_schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}
