use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use arrow::array::Array;
use arrow::record_batch::RecordBatch;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::relation::{filter_rows, int32_column, string_column};

/// Restricts titles to the allowed categories and the ingestion window.
#[derive(Clone, Debug)]
pub struct BaseFilter {
    allowed: BTreeSet<&'static str>,
    years: RangeInclusive<i32>,
}

impl BaseFilter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            allowed: config.allowed_tokens(),
            years: config.start_year..=config.end_year,
        }
    }

    /// A title without a start year or category never passes.
    pub fn apply(&self, titles: &RecordBatch) -> Result<RecordBatch> {
        let types = string_column(titles, "titleType")?;
        let years = int32_column(titles, "startYear")?;
        filter_rows(titles, |i| {
            types.is_valid(i)
                && self.allowed.contains(types.value(i))
                && years.is_valid(i)
                && self.years.contains(&years.value(i))
        })
    }
}
