use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, UInt32Array};
use arrow::compute::{cast, take};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::row::{RowConverter, SortField};
use indexmap::IndexMap;

use crate::error::{EtlError, Result};
use crate::relation::column;

/// Round half away from zero to two decimals.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Default)]
struct GroupAcc {
    first_row: u32,
    count: i64,
    rating_sum: f64,
    rating_n: i64,
    votes_sum: i64,
    votes_n: i64,
}

/// Group-by with `count`, `avg_rating` and `total_votes` measures.
///
/// Output rows are unique per dimension tuple and sorted by it (ascending,
/// absent first). Dimension columns keep their input types.
#[derive(Clone, Debug)]
pub struct Aggregation {
    group_by: Vec<String>,
    rating: String,
    votes: String,
}

impl Aggregation {
    pub fn new<S: Into<String>>(group_by: impl IntoIterator<Item = S>) -> Self {
        Self {
            group_by: group_by.into_iter().map(Into::into).collect(),
            rating: "averageRating".to_string(),
            votes: "numVotes".to_string(),
        }
    }

    pub fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let dims: Vec<ArrayRef> = self
            .group_by
            .iter()
            .map(|name| column(batch, name).cloned())
            .collect::<Result<_>>()?;
        let ratings = cast(column(batch, &self.rating)?, &DataType::Float64)?;
        let ratings = ratings
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| EtlError::mismatch("aggregate", &self.rating, "not numeric"))?;
        let votes = cast(column(batch, &self.votes)?, &DataType::Int64)?;
        let votes = votes
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| EtlError::mismatch("aggregate", &self.votes, "not an integer"))?;

        let converter = RowConverter::new(
            dims.iter()
                .map(|a| SortField::new(a.data_type().clone()))
                .collect(),
        )?;
        let keys = converter.convert_columns(&dims)?;

        let mut groups: IndexMap<_, GroupAcc> = IndexMap::new();
        for i in 0..batch.num_rows() {
            let acc = groups.entry(keys.row(i)).or_insert_with(|| GroupAcc {
                first_row: i as u32,
                ..GroupAcc::default()
            });
            acc.count += 1;
            if ratings.is_valid(i) {
                acc.rating_sum += ratings.value(i);
                acc.rating_n += 1;
            }
            if votes.is_valid(i) {
                acc.votes_sum += votes.value(i);
                acc.votes_n += 1;
            }
        }
        groups.sort_unstable_keys();

        let firsts: UInt32Array = groups.values().map(|g| g.first_row).collect();
        let counts: Int64Array = groups.values().map(|g| Some(g.count)).collect();
        let means: Float64Array = groups
            .values()
            .map(|g| (g.rating_n > 0).then(|| round2(g.rating_sum / g.rating_n as f64)))
            .collect();
        let totals: Int64Array = groups
            .values()
            .map(|g| (g.votes_n > 0).then_some(g.votes_sum))
            .collect();

        let schema = batch.schema();
        let mut fields = Vec::with_capacity(dims.len() + 3);
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(dims.len() + 3);
        for (name, dim) in self.group_by.iter().zip(&dims) {
            let field = schema.field_with_name(name)?;
            fields.push(field.clone());
            arrays.push(take(dim.as_ref(), &firsts, None)?);
        }
        fields.push(Field::new("count", DataType::Int64, false));
        fields.push(Field::new("avg_rating", DataType::Float64, true));
        fields.push(Field::new("total_votes", DataType::Int64, true));
        arrays.push(Arc::new(counts));
        arrays.push(Arc::new(means));
        arrays.push(Arc::new(totals));
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}
