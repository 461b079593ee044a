//! Relational building blocks over Arrow record batches: typed column access,
//! projection, filtering, de-duplication and hash joins.
//!
//! Every operation returns a new batch; inputs are never modified. Row order is
//! deterministic: filters and de-duplication keep input order, joins emit rows
//! in probe-side (left) order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float32Array, Int32Array, StringArray, UInt32Array};
use arrow::compute::{filter_record_batch, take_record_batch};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::row::{RowConverter, SortField};

use crate::error::{EtlError, Result};

const RELATION: &str = "relation";

// ============================================================================
// Typed column access
// ============================================================================

pub fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| EtlError::mismatch(RELATION, name, "column not present"))
}

fn downcast<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str, ty: &str) -> Result<&'a T> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| EtlError::mismatch(RELATION, name, format!("expected {ty} column")))
}

pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    downcast(batch, name, "utf8")
}

pub fn int32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    downcast(batch, name, "int32")
}

pub fn float32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float32Array> {
    downcast(batch, name, "float32")
}

// ============================================================================
// Projection / filtering
// ============================================================================

/// Project `columns` as `(source, alias)` pairs, in the given order.
pub fn select(batch: &RecordBatch, columns: &[(&str, &str)]) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());
    for (source, alias) in columns {
        let idx = schema
            .index_of(source)
            .map_err(|_| EtlError::mismatch(RELATION, *source, "column not present"))?;
        let field = schema.field(idx);
        fields.push(Field::new(*alias, field.data_type().clone(), field.is_nullable()));
        arrays.push(batch.column(idx).clone());
    }
    // An empty projection still carries the row count.
    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &options,
    )?)
}

/// Keep the rows for which `keep` is true.
pub fn filter_rows(batch: &RecordBatch, keep: impl Fn(usize) -> bool) -> Result<RecordBatch> {
    let mask: BooleanArray = (0..batch.num_rows()).map(|i| Some(keep(i))).collect();
    Ok(filter_record_batch(batch, &mask)?)
}

/// Keep the first row of every distinct combination of `key_columns`.
pub fn distinct_on(batch: &RecordBatch, key_columns: &[&str]) -> Result<RecordBatch> {
    let keys: Vec<ArrayRef> = key_columns
        .iter()
        .map(|name| column(batch, name).cloned())
        .collect::<Result<_>>()?;
    let converter = RowConverter::new(
        keys.iter()
            .map(|a| SortField::new(a.data_type().clone()))
            .collect(),
    )?;
    let rows = converter.convert_columns(&keys)?;

    let mut seen = HashSet::with_capacity(batch.num_rows());
    let indices: UInt32Array = (0..batch.num_rows())
        .filter(|&i| seen.insert(rows.row(i)))
        .map(|i| i as u32)
        .collect();
    Ok(take_record_batch(batch, &indices)?)
}

/// Concatenate the columns of two batches with the same row count.
pub fn hstack(left: &RecordBatch, right: &RecordBatch) -> Result<RecordBatch> {
    let mut fields: Vec<Field> = left.schema().fields().iter().map(|f| f.as_ref().clone()).collect();
    fields.extend(right.schema().fields().iter().map(|f| f.as_ref().clone()));
    let mut arrays: Vec<ArrayRef> = left.columns().to_vec();
    arrays.extend(right.columns().iter().cloned());
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

// ============================================================================
// Joins
// ============================================================================

/// Hash inner join on a single utf8 key.
///
/// The output carries every left column followed by the `right_columns`
/// projection (`(source, alias)` pairs) of the matching right rows. Null keys
/// never match. A left row matching `k` right rows yields `k` output rows.
pub fn inner_join(
    left: &RecordBatch,
    left_key: &str,
    right: &RecordBatch,
    right_key: &str,
    right_columns: &[(&str, &str)],
) -> Result<RecordBatch> {
    let probe = string_column(left, left_key)?;
    let build = string_column(right, right_key)?;

    let mut index: HashMap<&str, Vec<u32>> = HashMap::with_capacity(build.len());
    for (i, key) in build.iter().enumerate() {
        if let Some(key) = key {
            index.entry(key).or_default().push(i as u32);
        }
    }

    let mut left_idx: Vec<u32> = Vec::with_capacity(probe.len());
    let mut right_idx: Vec<u32> = Vec::with_capacity(probe.len());
    for (i, key) in probe.iter().enumerate() {
        if let Some(matches) = key.and_then(|k| index.get(k)) {
            for &r in matches {
                left_idx.push(i as u32);
                right_idx.push(r);
            }
        }
    }

    let left_rows = take_record_batch(left, &UInt32Array::from(left_idx))?;
    if right_columns.is_empty() {
        return Ok(left_rows);
    }
    let right_rows = take_record_batch(&select(right, right_columns)?, &UInt32Array::from(right_idx))?;
    hstack(&left_rows, &right_rows)
}
