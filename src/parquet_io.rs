//! Arrow column builders and the streaming Parquet writer for one table.
//!
//! Rows are appended cell by cell into per-column builders and flushed to the
//! underlying [`ArrowWriter`] every [`BATCH_ROWS`] rows, so a table never has
//! to fit in memory. `Guid` columns are written as 16-byte fixed binaries
//! tagged with the canonical `arrow.uuid` extension, which the Parquet writer
//! maps to the `UUID` logical type.

use std::{collections::HashMap, fs::File, path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, FixedSizeBinaryBuilder, Float64Builder,
    Int64Builder, StringBuilder, Time64MicrosecondBuilder, TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, Date32Type, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::Timelike;
use log::debug;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::{
    data::Value,
    schema::{ColumnSchema, ColumnType, TableSchema},
};

pub const BATCH_ROWS: usize = 64 * 1024;

const EXTENSION_NAME_KEY: &str = "ARROW:extension:name";
const UUID_EXTENSION_NAME: &str = "arrow.uuid";
const UUID_BYTES: i32 = 16;

pub fn arrow_data_type(datatype: ColumnType) -> DataType {
    match datatype {
        ColumnType::String => DataType::Utf8,
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::Date => DataType::Date32,
        ColumnType::DateTime => DataType::Timestamp(TimeUnit::Microsecond, None),
        ColumnType::Time => DataType::Time64(TimeUnit::Microsecond),
        ColumnType::Guid => DataType::FixedSizeBinary(UUID_BYTES),
    }
}

pub fn arrow_field(column: &ColumnSchema) -> Field {
    let field = Field::new(&column.name, arrow_data_type(column.datatype), true);
    if column.datatype == ColumnType::Guid {
        field.with_metadata(HashMap::from([(
            EXTENSION_NAME_KEY.to_string(),
            UUID_EXTENSION_NAME.to_string(),
        )]))
    } else {
        field
    }
}

pub fn arrow_schema(schema: &TableSchema) -> SchemaRef {
    Arc::new(Schema::new(
        schema.columns.iter().map(arrow_field).collect::<Vec<_>>(),
    ))
}

enum ColumnBuilder {
    String(StringBuilder),
    Integer(Int64Builder),
    Float(Float64Builder),
    Boolean(BooleanBuilder),
    Date(Date32Builder),
    DateTime(TimestampMicrosecondBuilder),
    Time(Time64MicrosecondBuilder),
    Guid(FixedSizeBinaryBuilder),
}

impl ColumnBuilder {
    fn new(datatype: ColumnType, capacity: usize) -> Self {
        match datatype {
            ColumnType::String => ColumnBuilder::String(StringBuilder::with_capacity(
                capacity,
                capacity * 16,
            )),
            ColumnType::Integer => ColumnBuilder::Integer(Int64Builder::with_capacity(capacity)),
            ColumnType::Float => ColumnBuilder::Float(Float64Builder::with_capacity(capacity)),
            ColumnType::Boolean => ColumnBuilder::Boolean(BooleanBuilder::with_capacity(capacity)),
            ColumnType::Date => ColumnBuilder::Date(Date32Builder::with_capacity(capacity)),
            ColumnType::DateTime => {
                ColumnBuilder::DateTime(TimestampMicrosecondBuilder::with_capacity(capacity))
            }
            ColumnType::Time => ColumnBuilder::Time(Time64MicrosecondBuilder::with_capacity(capacity)),
            ColumnType::Guid => {
                ColumnBuilder::Guid(FixedSizeBinaryBuilder::with_capacity(capacity, UUID_BYTES))
            }
        }
    }

    fn append(&mut self, value: Option<Value>) -> Result<()> {
        match (self, value) {
            (ColumnBuilder::String(b), None) => b.append_null(),
            (ColumnBuilder::String(b), Some(Value::String(s))) => b.append_value(s),
            (ColumnBuilder::Integer(b), None) => b.append_null(),
            (ColumnBuilder::Integer(b), Some(Value::Integer(i))) => b.append_value(i),
            (ColumnBuilder::Float(b), None) => b.append_null(),
            (ColumnBuilder::Float(b), Some(Value::Float(f))) => b.append_value(f),
            (ColumnBuilder::Boolean(b), None) => b.append_null(),
            (ColumnBuilder::Boolean(b), Some(Value::Boolean(v))) => b.append_value(v),
            (ColumnBuilder::Date(b), None) => b.append_null(),
            (ColumnBuilder::Date(b), Some(Value::Date(d))) => {
                b.append_value(Date32Type::from_naive_date(d))
            }
            (ColumnBuilder::DateTime(b), None) => b.append_null(),
            (ColumnBuilder::DateTime(b), Some(Value::DateTime(dt))) => {
                b.append_value(dt.and_utc().timestamp_micros())
            }
            (ColumnBuilder::Time(b), None) => b.append_null(),
            (ColumnBuilder::Time(b), Some(Value::Time(t))) => {
                let micros = i64::from(t.num_seconds_from_midnight()) * 1_000_000
                    + i64::from(t.nanosecond() / 1_000);
                b.append_value(micros)
            }
            (ColumnBuilder::Guid(b), None) => b.append_null(),
            (ColumnBuilder::Guid(b), Some(Value::Guid(g))) => b
                .append_value(g.as_bytes())
                .context("Appending GUID value")?,
            (_, Some(other)) => bail!("Value '{other}' does not match the column type"),
        }
        Ok(())
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::String(b) => Arc::new(b.finish()),
            ColumnBuilder::Integer(b) => Arc::new(b.finish()),
            ColumnBuilder::Float(b) => Arc::new(b.finish()),
            ColumnBuilder::Boolean(b) => Arc::new(b.finish()),
            ColumnBuilder::Date(b) => Arc::new(b.finish()),
            ColumnBuilder::DateTime(b) => Arc::new(b.finish()),
            ColumnBuilder::Time(b) => Arc::new(b.finish()),
            ColumnBuilder::Guid(b) => Arc::new(b.finish()),
        }
    }
}

/// Streams typed rows of one table into a Parquet file.
pub struct TableWriter {
    writer: ArrowWriter<File>,
    schema: SchemaRef,
    builders: Vec<ColumnBuilder>,
    buffered: usize,
    rows: u64,
}

impl TableWriter {
    pub fn create(path: &Path, table: &TableSchema) -> Result<Self> {
        let schema = arrow_schema(table);
        let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(props))
            .with_context(|| format!("Opening Parquet writer for {path:?}"))?;
        let builders = table
            .columns
            .iter()
            .map(|col| ColumnBuilder::new(col.datatype, BATCH_ROWS))
            .collect();
        Ok(Self {
            writer,
            schema,
            builders,
            buffered: 0,
            rows: 0,
        })
    }

    /// Appends one row; `values` must hold one entry per column, in order.
    pub fn push_row(&mut self, values: Vec<Option<Value>>) -> Result<()> {
        if values.len() != self.builders.len() {
            bail!(
                "Row has {} value(s) but the table has {} column(s)",
                values.len(),
                self.builders.len()
            );
        }
        for (idx, (builder, value)) in self.builders.iter_mut().zip(values).enumerate() {
            builder
                .append(value)
                .with_context(|| format!("Column '{}'", self.schema.field(idx).name()))?;
        }
        self.buffered += 1;
        if self.buffered >= BATCH_ROWS {
            self.flush_batch()?;
        }
        Ok(())
    }

    fn flush_batch(&mut self) -> Result<()> {
        if self.buffered == 0 {
            return Ok(());
        }
        let columns = self
            .builders
            .iter_mut()
            .map(ColumnBuilder::finish)
            .collect::<Vec<_>>();
        let batch = RecordBatch::try_new(Arc::clone(&self.schema), columns)
            .context("Building record batch")?;
        self.writer.write(&batch).context("Writing record batch")?;
        debug!("Flushed batch of {} row(s)", self.buffered);
        self.rows += self.buffered as u64;
        self.buffered = 0;
        Ok(())
    }

    /// Flushes buffered rows, writes the footer, and returns the row count.
    pub fn finish(mut self) -> Result<u64> {
        self.flush_batch()?;
        self.writer.close().context("Closing Parquet writer")?;
        Ok(self.rows)
    }
}
