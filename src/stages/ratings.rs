use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use tracing::warn;

use super::TITLES_CLEAN_COLUMNS;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::relation::{distinct_on, filter_rows, inner_join, int32_column, select};

/// Joins vote-qualified ratings onto base-filtered titles, producing `titles_clean`.
#[derive(Clone, Debug)]
pub struct RatingJoin {
    min_votes: i32,
}

impl RatingJoin {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_votes: config.min_votes,
        }
    }

    /// Ratings with at least `min_votes` votes, one per title.
    pub fn qualifying(&self, ratings: &RecordBatch) -> Result<RecordBatch> {
        let votes = int32_column(ratings, "numVotes")?;
        let qualified = filter_rows(ratings, |i| votes.is_valid(i) && votes.value(i) >= self.min_votes)?;
        let unique = distinct_on(&qualified, &["tconst"])?;
        let dropped = qualified.num_rows() - unique.num_rows();
        if dropped > 0 {
            warn!("  Dropped {dropped} duplicate ratings (first rating per title wins)");
        }
        Ok(unique)
    }

    /// Titles without a qualifying rating are dropped silently.
    pub fn apply(&self, titles: &RecordBatch, ratings: &RecordBatch) -> Result<RecordBatch> {
        self.join(titles, &self.qualifying(ratings)?)
    }

    /// Join already-qualified ratings onto `titles`.
    pub fn join(&self, titles: &RecordBatch, qualified: &RecordBatch) -> Result<RecordBatch> {
        let joined = inner_join(
            titles,
            "tconst",
            qualified,
            "tconst",
            &[("averageRating", "averageRating"), ("numVotes", "numVotes")],
        )?;
        let projection: Vec<(&str, &str)> = TITLES_CLEAN_COLUMNS.iter().map(|c| (*c, *c)).collect();
        select(&joined, &projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SourceTable;
    use crate::relation::float32_column;
    use crate::relation::tests::strings;
    use crate::stages::fixtures;

    const TITLES: &str = "tconst\ttitleType\tprimaryTitle\toriginalTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres\n\
        T1\tmovie\tFirst\tFirst\t0\t2001\t\\N\t100\tDrama\n\
        T2\tmovie\tSecond\tSecond\t0\t2002\t\\N\t100\tDrama\n\
        T3\tmovie\tUnrated\tUnrated\t0\t2003\t\\N\t100\tDrama\n";

    fn join(min_votes: i32, ratings: &str) -> RecordBatch {
        let config = PipelineConfig {
            min_votes,
            ..PipelineConfig::default()
        };
        let titles = fixtures::source(SourceTable::Titles, TITLES);
        let ratings = fixtures::source(SourceTable::Ratings, ratings);
        RatingJoin::new(&config).apply(&titles, &ratings).unwrap()
    }

    #[test]
    fn test_vote_floor() {
        let out = join(1000, "tconst\taverageRating\tnumVotes\nT1\t8.5\t5000\nT2\t9.0\t500\n");
        assert_eq!(strings(&out, "tconst"), vec![Some("T1".to_string())]);
        assert_eq!(float32_column(&out, "averageRating").unwrap().value(0), 8.5);
    }

    #[test]
    fn test_floor_is_inclusive() {
        let out = join(500, "tconst\taverageRating\tnumVotes\nT1\t8.5\t5000\nT2\t9.0\t500\n");
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn test_output_schema() {
        let out = join(0, "tconst\taverageRating\tnumVotes\nT1\t8.5\t5000\n");
        let names: Vec<String> = out
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, TITLES_CLEAN_COLUMNS);
    }

    #[test]
    fn test_duplicate_rating_does_not_fan_out() {
        let out = join(
            0,
            "tconst\taverageRating\tnumVotes\nT1\t8.5\t5000\nT1\t1.0\t5000\nT9\t5.0\t5000\n",
        );
        assert_eq!(out.num_rows(), 1);
        assert_eq!(float32_column(&out, "averageRating").unwrap().value(0), 8.5);
    }

    #[test]
    fn test_absent_votes_never_qualify() {
        let out = join(0, "tconst\taverageRating\tnumVotes\nT1\t8.5\t\\N\n");
        assert_eq!(out.num_rows(), 0);
    }
}
