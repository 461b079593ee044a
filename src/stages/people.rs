use std::collections::BTreeSet;

use arrow::array::Array;
use arrow::record_batch::RecordBatch;

use super::{Explode, TITLE_METADATA};
use crate::common::SourceTable;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::relation::{filter_rows, inner_join, int32_column, select, string_column};

/// Resolves director and principal-cast credits to people and denormalizes
/// the credited title's metadata onto each row.
///
/// Credits whose person or title is unknown are dropped (inner-join semantics).
#[derive(Clone, Debug)]
pub struct PersonResolution {
    delimiter: char,
    cast_ordering_limit: i32,
    cast_categories: BTreeSet<String>,
}

impl PersonResolution {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            delimiter: config.list_delimiter,
            cast_ordering_limit: config.cast_ordering_limit,
            cast_categories: config.cast_categories.clone(),
        }
    }

    /// `directors`: one row per (title, director).
    pub fn directors(
        &self,
        crew: &RecordBatch,
        people: &RecordBatch,
        titles: &RecordBatch,
    ) -> Result<RecordBatch> {
        let credited = inner_join(crew, "tconst", titles, "tconst", &[])?;
        let exploded = Explode::new("directors", "nconst", self.delimiter).apply(&credited)?;
        let pairs = select(&exploded, &[("tconst", "tconst"), ("nconst", "nconst")])?;
        let named = inner_join(
            &pairs,
            "nconst",
            people,
            "nconst",
            &[("primaryName", "directorName")],
        )?;
        inner_join(&named, "tconst", titles, "tconst", &TITLE_METADATA)
    }

    /// `actors`: billed cast credits within the ordering limit.
    pub fn cast(
        &self,
        principals: &RecordBatch,
        people: &RecordBatch,
        titles: &RecordBatch,
    ) -> Result<RecordBatch> {
        let billed = self.billed_cast(principals)?;
        let named = inner_join(&billed, "nconst", people, "nconst", &[("primaryName", "actorName")])?;
        let ordered = select(
            &named,
            &[
                ("tconst", "tconst"),
                ("nconst", "nconst"),
                ("actorName", "actorName"),
                ("category", "category"),
                ("ordering", "ordering"),
            ],
        )?;
        inner_join(&ordered, "tconst", titles, "tconst", &TITLE_METADATA)
    }

    /// Load-time prefilter for raw `title.principals` rows, over the fields
    /// declared by [`SourceTable::Principals`]. Rejects rows that cannot be
    /// billed cast; an unparsable ordering is let through so decoding reports it.
    pub fn principal_prefilter(&self) -> impl Fn(&[Option<&str>]) -> bool + Sync + '_ {
        let columns = SourceTable::Principals.columns();
        let find = |name: &str| columns.iter().position(|(c, _)| *c == name);
        let category = find("category");
        let ordering = find("ordering");
        move |raw: &[Option<&str>]| {
            let field = |idx: Option<usize>| idx.and_then(|i| raw.get(i).copied().flatten());
            let Some(category) = field(category) else {
                return false;
            };
            if !self.cast_categories.contains(category) {
                return false;
            }
            match field(ordering).map(|o| o.trim().parse::<i32>()) {
                None => false,
                Some(Ok(o)) => o <= self.cast_ordering_limit,
                Some(Err(_)) => true,
            }
        }
    }

    /// Principal rows that count as billed cast.
    pub fn billed_cast(&self, principals: &RecordBatch) -> Result<RecordBatch> {
        let categories = string_column(principals, "category")?;
        let ordering = int32_column(principals, "ordering")?;
        filter_rows(principals, |i| {
            categories.is_valid(i)
                && self.cast_categories.contains(categories.value(i))
                && ordering.is_valid(i)
                && ordering.value(i) <= self.cast_ordering_limit
        })
    }
}
