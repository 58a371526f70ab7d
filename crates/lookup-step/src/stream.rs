//! Row streams around the step
//!
//! A [`RowSource`] delivers input rows one at a time; a [`RowSink`] receives
//! output rows and, when error handling is enabled, rejected rows.

use lookup_core::{Result, Row, Schema};
use std::collections::VecDeque;
use std::sync::mpsc::Receiver;

/// Blocking source of input rows
pub trait RowSource {
    fn schema(&self) -> &Schema;

    /// Next row, or `None` once the input is exhausted.
    fn next_row(&mut self) -> Result<Option<Row>>;
}

/// Destination of output rows and error rows
pub trait RowSink {
    fn put_row(&mut self, schema: &Schema, row: Row) -> Result<()>;

    /// Receive a row diverted to the error stream. `schema` describes the
    /// row as it was read.
    fn put_error(&mut self, schema: &Schema, row: Row, error: ErrorDescriptor) -> Result<()>;
}

/// Why a row went to the error stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescriptor {
    /// Number of errors carried by the row
    pub count: u64,
    pub message: String,
    pub field_name: Option<String>,
    pub code: String,
}

impl ErrorDescriptor {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            count: 1,
            message: message.into(),
            field_name: None,
            code: code.into(),
        }
    }

    pub fn with_field(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }
}

/// In-memory input
#[derive(Debug, Clone)]
pub struct VecRowSource {
    schema: Schema,
    rows: VecDeque<Row>,
}

impl VecRowSource {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self {
            schema,
            rows: rows.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowSource for VecRowSource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}

/// Input fed by another thread; ends when every sender is dropped.
#[derive(Debug)]
pub struct ChannelRowSource {
    schema: Schema,
    receiver: Receiver<Row>,
}

impl ChannelRowSource {
    pub fn new(schema: Schema, receiver: Receiver<Row>) -> Self {
        Self { schema, receiver }
    }
}

impl RowSource for ChannelRowSource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.receiver.recv().ok())
    }
}

/// Sink that keeps everything it receives
#[derive(Debug, Default)]
pub struct CollectingSink {
    output_schema: Option<Schema>,
    rows: Vec<Row>,
    errors: Vec<(Row, ErrorDescriptor)>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema of the output rows, known once the first row arrived
    pub fn output_schema(&self) -> Option<&Schema> {
        self.output_schema.as_ref()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn errors(&self) -> &[(Row, ErrorDescriptor)] {
        &self.errors
    }

    pub fn into_parts(self) -> (Vec<Row>, Vec<(Row, ErrorDescriptor)>) {
        (self.rows, self.errors)
    }
}

impl RowSink for CollectingSink {
    fn put_row(&mut self, schema: &Schema, row: Row) -> Result<()> {
        if self.output_schema.is_none() {
            self.output_schema = Some(schema.clone());
        }
        self.rows.push(row);
        Ok(())
    }

    fn put_error(&mut self, _schema: &Schema, row: Row, error: ErrorDescriptor) -> Result<()> {
        self.errors.push((row, error));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookup_core::{DataType, Field, Value};
    use std::sync::mpsc;
    use std::thread;

    fn schema() -> Schema {
        Schema::new(vec![Field::new("id", DataType::Int64, false)])
    }

    #[test]
    fn test_vec_source_in_order() {
        let mut source = VecRowSource::new(
            schema(),
            vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
        );
        assert_eq!(source.next_row().unwrap(), Some(vec![Value::Int64(1)]));
        assert_eq!(source.remaining(), 1);
        assert_eq!(source.next_row().unwrap(), Some(vec![Value::Int64(2)]));
        assert_eq!(source.next_row().unwrap(), None);
    }

    #[test]
    fn test_channel_source_ends_when_sender_dropped() {
        let (tx, rx) = mpsc::channel();
        let producer = thread::spawn(move || {
            for i in 0..3 {
                tx.send(vec![Value::Int64(i)]).unwrap();
            }
        });

        let mut source = ChannelRowSource::new(schema(), rx);
        let mut seen = Vec::new();
        while let Some(row) = source.next_row().unwrap() {
            seen.push(row);
        }
        producer.join().unwrap();

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], vec![Value::Int64(2)]);
    }

    #[test]
    fn test_collecting_sink() {
        let mut sink = CollectingSink::new();
        sink.put_row(&schema(), vec![Value::Int64(1)]).unwrap();
        sink.put_error(
            &schema(),
            vec![Value::Int64(2)],
            ErrorDescriptor::new("No lookup found", "DBL001"),
        )
        .unwrap();

        assert_eq!(sink.rows().len(), 1);
        assert_eq!(sink.errors()[0].1.code, "DBL001");
        assert_eq!(sink.errors()[0].1.count, 1);
        assert_eq!(sink.output_schema(), Some(&schema()));
    }
}
