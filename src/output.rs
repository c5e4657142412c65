use anyhow::{Context, Result};
use arrow::array::*;
use arrow::csv::WriterBuilder;
use arrow::datatypes::*;
use arrow::record_batch::RecordBatch;
use clap::ValueEnum;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, CAST_SLOTS};
use crate::row::{MovieRow, COLUMNS};

// Macro for creating string arrays from row fields
macro_rules! string_array_required {
    ($rows:expr, $field:ident) => {
        Arc::new(StringArray::from_iter_values($rows.iter().map(|r| &r.$field))) as ArrayRef
    };
}

// Macro for creating optional string arrays
macro_rules! string_array_optional {
    ($rows:expr, $field:ident) => {
        Arc::new(StringArray::from_iter($rows.iter().map(|r| r.$field.as_deref()))) as ArrayRef
    };
}

// Macro for creating float arrays
macro_rules! float64_array_optional {
    ($rows:expr, $field:ident) => {
        Arc::new(Float64Array::from_iter($rows.iter().map(|r| r.$field))) as ArrayRef
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Comma-separated text with a header row
    Csv,
    /// Snappy-compressed Parquet
    Parquet,
    /// Both of the above
    Both,
}

pub fn table_schema() -> Schema {
    schema! {
        COLUMNS[0] => DataType::Utf8, false;
        COLUMNS[1] => DataType::Utf8;
        COLUMNS[2] => DataType::Utf8;
        COLUMNS[3] => DataType::Float64;
        COLUMNS[4] => DataType::Utf8;
        COLUMNS[5] => DataType::Utf8;
        COLUMNS[6] => DataType::Utf8;
        COLUMNS[7] => DataType::Utf8;
        COLUMNS[8] => DataType::Utf8;
    }
}

pub fn rows_to_record_batch(rows: &[MovieRow]) -> Result<RecordBatch> {
    let mut columns = vec![
        string_array_required!(rows, movie_id),
        string_array_optional!(rows, director_id),
        string_array_optional!(rows, producer_id),
        float64_array_optional!(rows, box_office_value),
    ];
    for slot in 0..CAST_SLOTS {
        columns.push(Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.cast_ids[slot].as_deref()),
        )) as ArrayRef);
    }

    let batch = RecordBatch::try_new(Arc::new(table_schema()), columns)?;
    Ok(batch)
}

pub fn write_csv(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new()
        .with_header(true)
        .build(BufWriter::new(file));
    writer.write(batch)?;
    writer.into_inner().flush()?;
    Ok(())
}

pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Write the collected rows in the configured format(s); returns the written paths.
pub fn write_table(config: &Config, rows: &[MovieRow]) -> Result<Vec<PathBuf>> {
    let batch = rows_to_record_batch(rows)?;
    let table_path = config.table_path();
    let csv_path = table_path.with_extension("csv");
    let parquet_path = table_path.with_extension("parquet");

    let mut written = Vec::new();
    if matches!(config.format, OutputFormat::Csv | OutputFormat::Both) {
        write_csv(&csv_path, &batch)?;
        written.push(csv_path);
    }
    if matches!(config.format, OutputFormat::Parquet | OutputFormat::Both) {
        write_parquet(&parquet_path, &batch)?;
        written.push(parquet_path);
    }

    for path in &written {
        info!("Wrote {} rows to {}", batch.num_rows(), path.display());
    }
    Ok(written)
}
