//! Conversion between Arrow record batches and lookup rows
//!
//! Batches are first normalized onto the canonical Arrow type of each
//! [`DataType`], after which every column can be read with a single downcast.

use crate::error::{LookupError, Result};
use crate::schema::Schema;
use crate::types::{DataType, Row, Value};
use arrow::array::*;
use arrow::compute::cast;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Cast every column of `batch` to the canonical Arrow type of its lookup
/// type (e.g. `Int32` → `Int64`, `Timestamp(s)` → `Timestamp(µs)`).
pub fn normalize_batch(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = Schema::from_arrow(batch.schema().as_ref());
    let columns = batch
        .columns()
        .iter()
        .zip(schema.fields())
        .map(|(column, field)| {
            let target = field.data_type().to_arrow();
            if column.data_type() == &target {
                Ok(Arc::clone(column))
            } else {
                cast(column, &target).map_err(LookupError::from)
            }
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    Ok(RecordBatch::try_new(Arc::new(schema.to_arrow()), columns)?)
}

/// Read one cell of a normalized column.
pub fn value_at(array: &dyn Array, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }

    let ty = DataType::from_arrow(array.data_type());
    let any = array.as_any();
    let value = match ty {
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map(|a| Value::Boolean(a.value(row))),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| Value::Int64(a.value(row))),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| Value::Float64(a.value(row))),
        DataType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map(|a| Value::Utf8(a.value(row).to_string())),
        DataType::Binary => any
            .downcast_ref::<BinaryArray>()
            .map(|a| Value::Binary(a.value(row).to_vec())),
        DataType::Date32 => any
            .downcast_ref::<Date32Array>()
            .map(|a| Value::Date32(a.value(row))),
        DataType::Timestamp => any
            .downcast_ref::<TimestampMicrosecondArray>()
            .map(|a| Value::Timestamp(a.value(row))),
        DataType::Null => Some(Value::Null),
    };

    value.ok_or_else(|| {
        LookupError::Database(format!(
            "Unsupported column representation {:?}, normalize the batch first",
            array.data_type()
        ))
    })
}

/// Build an Arrow column of type `ty` from values already of that type
/// (nulls allowed).
pub fn values_to_array(ty: DataType, values: &[Value]) -> Result<ArrayRef> {
    let mismatch = |v: &Value| LookupError::conversion(v, v.data_type(), ty);

    let array: ArrayRef = match ty {
        DataType::Boolean => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Boolean(b) => Ok(Some(*b)),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<BooleanArray>>()?,
        ),
        DataType::Int64 => Arc::new(Int64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Int64(i) => Ok(Some(*i)),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Float64(f) => Ok(Some(*f)),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        DataType::Utf8 => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Utf8(s) => Ok(Some(s.as_str())),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        DataType::Binary => Arc::new(BinaryArray::from_opt_vec(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Binary(b) => Ok(Some(b.as_slice())),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        DataType::Date32 => Arc::new(Date32Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Date32(d) => Ok(Some(*d)),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        DataType::Timestamp => Arc::new(TimestampMicrosecondArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Timestamp(t) => Ok(Some(*t)),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Vec<_>>>()?,
        )),
        DataType::Null => Arc::new(NullArray::new(values.len())),
    };

    Ok(array)
}

/// All rows of a batch, in order.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Row>> {
    let batch = normalize_batch(batch)?;
    (0..batch.num_rows())
        .map(|row| {
            batch
                .columns()
                .iter()
                .map(|column| value_at(column.as_ref(), row))
                .collect::<Result<Row>>()
        })
        .collect()
}

/// Build a batch from rows whose values match `schema` position by position.
pub fn rows_to_batch(schema: &Schema, rows: &[Row]) -> Result<RecordBatch> {
    let columns = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let column: Vec<Value> = rows
                .iter()
                .map(|row| row.get(idx).cloned().unwrap_or(Value::Null))
                .collect();
            values_to_array(*field.data_type(), &column)
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    Ok(RecordBatch::try_new(Arc::new(schema.to_arrow()), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use arrow::datatypes::{DataType as ArrowDataType, Field as ArrowField, Schema as ArrowSchema};

    #[test]
    fn test_rows_round_trip() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("day", DataType::Date32, true),
        ]);
        let rows = vec![
            vec![Value::Int64(1), Value::from("a"), Value::Date32(3)],
            vec![Value::Int64(2), Value::Null, Value::Null],
        ];

        let batch = rows_to_batch(&schema, &rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch_to_rows(&batch).unwrap(), rows);
    }

    #[test]
    fn test_normalize_narrow_ints() {
        let schema = Arc::new(ArrowSchema::new(vec![ArrowField::new(
            "n",
            ArrowDataType::Int32,
            false,
        )]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![5, 6]))]).unwrap();

        let rows = batch_to_rows(&batch).unwrap();
        assert_eq!(rows, vec![vec![Value::Int64(5)], vec![Value::Int64(6)]]);
    }

    #[test]
    fn test_mismatched_value_rejected() {
        let result = values_to_array(DataType::Int64, &[Value::from("x")]);
        assert!(matches!(result, Err(LookupError::Conversion { .. })));
    }
}
