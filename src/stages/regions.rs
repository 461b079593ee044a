use arrow::array::Array;
use arrow::record_batch::RecordBatch;

use crate::error::Result;
use crate::relation::{distinct_on, filter_rows, inner_join, select, string_column};

/// Region codes are ISO-3166 alpha-2 style: exactly two characters.
pub const REGION_CODE_LEN: usize = 2;

pub fn is_region_code(code: &str) -> bool {
    code.chars().count() == REGION_CODE_LEN
}

/// Derives distinct (title, region) release pairs from the alias table.
///
/// One title released in many regions yields one row per region.
#[derive(Clone, Debug, Default)]
pub struct RegionResolution;

impl RegionResolution {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, akas: &RecordBatch, titles: &RecordBatch) -> Result<RecordBatch> {
        let regions = string_column(akas, "region")?;
        let valid = filter_rows(akas, |i| regions.is_valid(i) && is_region_code(regions.value(i)))?;
        let pairs = select(
            &distinct_on(&valid, &["titleId", "region"])?,
            &[("titleId", "tconst"), ("region", "region")],
        )?;
        inner_join(
            &pairs,
            "tconst",
            titles,
            "tconst",
            &[
                ("primaryTitle", "primaryTitle"),
                ("startYear", "startYear"),
                ("titleType", "titleType"),
                ("genres", "genres"),
                ("averageRating", "averageRating"),
                ("numVotes", "numVotes"),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SourceTable;
    use crate::relation::tests::strings;
    use crate::stages::fixtures;

    #[test]
    fn test_region_code_shape() {
        assert!(is_region_code("US"));
        assert!(!is_region_code(""));
        assert!(!is_region_code("USA"));
        assert!(!is_region_code("U"));
    }

    #[test]
    fn test_distinct_well_formed_regions() {
        let akas = fixtures::source(
            SourceTable::Akas,
            "titleId\tordering\ttitle\tregion\tlanguage\n\
             tt1\t1\tAlpha\tUS\ten\n\
             tt1\t2\tAlpha\tUS\t\\N\n\
             tt1\t3\tAlfa\tES\tes\n\
             tt1\t4\tAlpha\tUSA\t\\N\n\
             tt1\t5\tAlpha\t\t\\N\n\
             tt1\t6\tAlpha\t\\N\t\\N\n\
             tt2\t1\tBeta\tGB\t\\N\n\
             tt9\t1\tUnrated\tFR\t\\N\n",
        );
        let titles = fixtures::titles_clean(&[
            ("tt1", "movie", "Alpha", "2001", "Drama", "7.5", "2000"),
            ("tt2", "movie", "Beta", "2002", "Comedy", "6.0", "3000"),
        ]);
        let out = RegionResolution::new().apply(&akas, &titles).unwrap();
        assert_eq!(
            strings(&out, "region"),
            vec![Some("US".to_string()), Some("ES".to_string()), Some("GB".to_string())]
        );
        assert_eq!(
            strings(&out, "tconst"),
            vec![Some("tt1".to_string()), Some("tt1".to_string()), Some("tt2".to_string())]
        );
        assert_eq!(strings(&out, "genres")[2], Some("Comedy".to_string()));
        assert_eq!(out.num_columns(), 8);
    }
}
