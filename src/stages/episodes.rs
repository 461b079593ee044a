use std::collections::BTreeSet;

use arrow::array::Array;
use arrow::record_batch::RecordBatch;

use crate::common::TitleCategory;
use crate::error::Result;
use crate::relation::{filter_rows, inner_join, int32_column, select, string_column};

/// Links episodes to their parent series.
///
/// Both the episode and its parent must be rated titles, and the parent must
/// be a series or mini-series; anything else is dropped rather than emitted as
/// an orphan.
#[derive(Clone, Debug)]
pub struct EpisodeHierarchy {
    parent_categories: BTreeSet<&'static str>,
}

impl Default for EpisodeHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl EpisodeHierarchy {
    pub fn new() -> Self {
        Self {
            parent_categories: TitleCategory::ALL
                .into_iter()
                .filter(TitleCategory::is_series)
                .map(|c| c.as_str())
                .collect(),
        }
    }

    /// Episodes carrying both a season and an episode number.
    pub fn numbered(&self, episodes: &RecordBatch) -> Result<RecordBatch> {
        let season = int32_column(episodes, "seasonNumber")?;
        let episode = int32_column(episodes, "episodeNumber")?;
        filter_rows(episodes, |i| season.is_valid(i) && episode.is_valid(i))
    }

    pub fn apply(&self, episodes: &RecordBatch, titles: &RecordBatch) -> Result<RecordBatch> {
        let numbered = self.numbered(episodes)?;
        let with_episode = inner_join(
            &numbered,
            "tconst",
            titles,
            "tconst",
            &[
                ("primaryTitle", "episodeTitle"),
                ("startYear", "episodeYear"),
                ("averageRating", "episodeRating"),
                ("numVotes", "episodeVotes"),
            ],
        )?;
        let with_series = inner_join(
            &with_episode,
            "parentTconst",
            titles,
            "tconst",
            &[
                ("primaryTitle", "seriesTitle"),
                ("startYear", "seriesStartYear"),
                ("titleType", "seriesType"),
            ],
        )?;

        let parent_types = string_column(&with_series, "seriesType")?;
        let linked = filter_rows(&with_series, |i| {
            parent_types.is_valid(i) && self.parent_categories.contains(parent_types.value(i))
        })?;

        select(
            &linked,
            &[
                ("tconst", "episodeId"),
                ("parentTconst", "seriesId"),
                ("seasonNumber", "seasonNumber"),
                ("episodeNumber", "episodeNumber"),
                ("episodeTitle", "episodeTitle"),
                ("episodeYear", "episodeYear"),
                ("episodeRating", "episodeRating"),
                ("episodeVotes", "episodeVotes"),
                ("seriesTitle", "seriesTitle"),
                ("seriesStartYear", "seriesStartYear"),
            ],
        )
    }
}
