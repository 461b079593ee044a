use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringBuilder, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::{EtlError, Result};
use crate::relation::string_column;

/// Many-to-many decomposition of a delimited list column.
///
/// Every list element becomes its own row, with the other columns copied
/// unchanged. The list column is replaced in place by a value column named
/// `output`. Rows whose list is absent or empty produce nothing, so
/// `output rows = Σ element counts`. `"a,,b"` has three elements.
#[derive(Clone, Debug)]
pub struct Explode {
    column: String,
    output: String,
    delimiter: char,
}

impl Explode {
    pub fn new(column: impl Into<String>, output: impl Into<String>, delimiter: char) -> Self {
        Self {
            column: column.into(),
            output: output.into(),
            delimiter,
        }
    }

    pub fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        let position = schema
            .index_of(&self.column)
            .map_err(|_| EtlError::mismatch("explode", &self.column, "column not present"))?;
        let lists = string_column(batch, &self.column)?;

        let mut indices: Vec<u32> = Vec::with_capacity(lists.len());
        let mut values = StringBuilder::new();
        for (row, list) in lists.iter().enumerate() {
            let Some(list) = list.filter(|l| !l.is_empty()) else {
                continue;
            };
            for value in list.split(self.delimiter) {
                indices.push(row as u32);
                values.append_value(value);
            }
        }
        let indices = UInt32Array::from(indices);
        let values: ArrayRef = Arc::new(values.finish());

        let mut fields = Vec::with_capacity(schema.fields().len());
        let mut arrays = Vec::with_capacity(schema.fields().len());
        for (i, field) in schema.fields().iter().enumerate() {
            if i == position {
                fields.push(Field::new(&self.output, DataType::Utf8, false));
                arrays.push(values.clone());
            } else {
                fields.push(field.as_ref().clone());
                arrays.push(take(batch.column(i).as_ref(), &indices, None)?);
            }
        }
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}
