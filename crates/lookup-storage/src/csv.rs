//! CSV input and output
//!
//! Files carry a header row; column types are inferred from the first
//! records the way the Arrow CSV reader does it.

use crate::memory::MemoryDatabase;
use arrow::csv::reader::{Format, Reader};
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::record_batch::RecordBatch;
use lookup_core::array::{batch_to_rows, normalize_batch, rows_to_batch};
use lookup_core::{Result, Row, Schema};
use lookup_step::RowSource;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// Records used to infer column types
const INFER_RECORDS: usize = 100;

fn open_reader(path: &Path) -> Result<(Schema, Reader<File>)> {
    let mut file = File::open(path)?;
    let (arrow_schema, _) = Format::default()
        .with_header(true)
        .infer_schema(&mut file, Some(INFER_RECORDS))?;
    file.seek(SeekFrom::Start(0))?;

    let schema = Schema::from_arrow(&arrow_schema);
    let reader = ReaderBuilder::new(Arc::new(arrow_schema))
        .with_header(true)
        .build(file)?;
    Ok((schema, reader))
}

/// Read a whole CSV file into record batches.
pub fn read_csv(path: impl AsRef<Path>) -> Result<(Schema, Vec<RecordBatch>)> {
    let (schema, reader) = open_reader(path.as_ref())?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// Write rows as CSV with a header line.
pub fn write_csv<W: Write>(writer: W, schema: &Schema, rows: &[Row]) -> Result<()> {
    let batch = rows_to_batch(schema, rows)?;
    let mut writer = WriterBuilder::new().with_header(true).build(writer);
    writer.write(&batch)?;
    Ok(())
}

impl MemoryDatabase {
    /// Register a CSV file as a table.
    pub fn register_csv(&self, name: &str, path: impl AsRef<Path>) -> Result<Schema> {
        let (schema, batches) = read_csv(path)?;
        if batches.is_empty() {
            self.register_rows(name, &schema, &[])?;
            return Ok(schema);
        }
        self.register_batches(name, batches)
    }
}

/// Row source reading a CSV file batch by batch
pub struct CsvRowSource {
    schema: Schema,
    reader: Reader<File>,
    pending: VecDeque<Row>,
}

impl CsvRowSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (schema, reader) = open_reader(path.as_ref())?;
        Ok(Self {
            schema,
            reader,
            pending: VecDeque::new(),
        })
    }
}

impl RowSource for CsvRowSource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        while self.pending.is_empty() {
            match self.reader.next() {
                Some(batch) => {
                    let batch = normalize_batch(&batch?)?;
                    self.pending.extend(batch_to_rows(&batch)?);
                }
                None => return Ok(None),
            }
        }
        Ok(self.pending.pop_front())
    }
}

impl std::fmt::Debug for CsvRowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvRowSource")
            .field("schema", &self.schema)
            .field("pending", &self.pending.len())
            .finish()
    }
}
