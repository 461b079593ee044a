//! Common types and constants used throughout the project.

use std::fmt;
use std::str::FromStr;

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};

use crate::error::EtlError;

// ============================================================================
// Title categories
// ============================================================================

/// The closed set of title categories the pipeline knows about.
///
/// Raw sources carry more types than these (shorts, video games, ...); those
/// never pass the base filter because they cannot be named in the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TitleCategory {
    #[serde(rename = "movie")]
    Movie,
    #[serde(rename = "tvSeries")]
    TvSeries,
    #[serde(rename = "tvMovie")]
    TvMovie,
    #[serde(rename = "tvMiniSeries")]
    TvMiniSeries,
    #[serde(rename = "tvEpisode")]
    TvEpisode,
}

impl TitleCategory {
    pub const ALL: [TitleCategory; 5] = [
        TitleCategory::Movie,
        TitleCategory::TvSeries,
        TitleCategory::TvMovie,
        TitleCategory::TvMiniSeries,
        TitleCategory::TvEpisode,
    ];

    /// The token used for this category in the raw `titleType` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            TitleCategory::Movie => "movie",
            TitleCategory::TvSeries => "tvSeries",
            TitleCategory::TvMovie => "tvMovie",
            TitleCategory::TvMiniSeries => "tvMiniSeries",
            TitleCategory::TvEpisode => "tvEpisode",
        }
    }

    /// Categories that may act as the parent of an episode.
    pub fn is_series(&self) -> bool {
        matches!(self, TitleCategory::TvSeries | TitleCategory::TvMiniSeries)
    }
}

impl fmt::Display for TitleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TitleCategory {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TitleCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| EtlError::Config(format!("unknown title category '{s}'")))
    }
}

// ============================================================================
// Raw column types
// ============================================================================

/// Declared type of a raw source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Utf8,
    Int32,
    Float32,
    /// `0`/`1` (or `true`/`false`).
    Boolean,
    /// A delimiter-separated list of atomic values, kept as its raw string.
    /// Only the explosion stage splits it.
    Delimited,
}

impl ColumnType {
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnType::Utf8 | ColumnType::Delimited => DataType::Utf8,
            ColumnType::Int32 => DataType::Int32,
            ColumnType::Float32 => DataType::Float32,
            ColumnType::Boolean => DataType::Boolean,
        }
    }
}

// ============================================================================
// Raw sources
// ============================================================================

/// One of the raw catalog dumps the pipeline reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTable {
    Titles,
    Ratings,
    Crew,
    People,
    Principals,
    Akas,
    Episodes,
}

impl SourceTable {
    pub const ALL: [SourceTable; 7] = [
        SourceTable::Titles,
        SourceTable::Ratings,
        SourceTable::Crew,
        SourceTable::People,
        SourceTable::Principals,
        SourceTable::Akas,
        SourceTable::Episodes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SourceTable::Titles => "titles",
            SourceTable::Ratings => "ratings",
            SourceTable::Crew => "crew",
            SourceTable::People => "people",
            SourceTable::Principals => "principals",
            SourceTable::Akas => "akas",
            SourceTable::Episodes => "episodes",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            SourceTable::Titles => "title.basics.tsv.gz",
            SourceTable::Ratings => "title.ratings.tsv.gz",
            SourceTable::Crew => "title.crew.tsv.gz",
            SourceTable::People => "name.basics.tsv.gz",
            SourceTable::Principals => "title.principals.tsv.gz",
            SourceTable::Akas => "title.akas.tsv.gz",
            SourceTable::Episodes => "title.episode.tsv.gz",
        }
    }

    /// Columns materialized from this source, in output order.
    pub fn columns(&self) -> &'static [(&'static str, ColumnType)] {
        use ColumnType::*;
        match self {
            SourceTable::Titles => &[
                ("tconst", Utf8),
                ("titleType", Utf8),
                ("primaryTitle", Utf8),
                ("originalTitle", Utf8),
                ("isAdult", Boolean),
                ("startYear", Int32),
                ("endYear", Int32),
                ("runtimeMinutes", Int32),
                ("genres", Delimited),
            ],
            SourceTable::Ratings => &[
                ("tconst", Utf8),
                ("averageRating", Float32),
                ("numVotes", Int32),
            ],
            SourceTable::Crew => &[("tconst", Utf8), ("directors", Delimited)],
            SourceTable::People => &[
                ("nconst", Utf8),
                ("primaryName", Utf8),
                ("birthYear", Int32),
                ("deathYear", Int32),
                ("primaryProfession", Delimited),
            ],
            SourceTable::Principals => &[
                ("tconst", Utf8),
                ("nconst", Utf8),
                ("category", Utf8),
                ("ordering", Int32),
            ],
            SourceTable::Akas => &[("titleId", Utf8), ("region", Utf8)],
            SourceTable::Episodes => &[
                ("tconst", Utf8),
                ("parentTconst", Utf8),
                ("seasonNumber", Int32),
                ("episodeNumber", Int32),
            ],
        }
    }
}

// ============================================================================
// Derived tables
// ============================================================================

/// A derived table persisted as one artifact per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTable {
    TitlesClean,
    GenresByYear,
    Directors,
    Actors,
    Countries,
    Episodes,
}

impl OutputTable {
    pub const ALL: [OutputTable; 6] = [
        OutputTable::TitlesClean,
        OutputTable::GenresByYear,
        OutputTable::Directors,
        OutputTable::Actors,
        OutputTable::Countries,
        OutputTable::Episodes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OutputTable::TitlesClean => "titles_clean",
            OutputTable::GenresByYear => "genres_by_year",
            OutputTable::Directors => "directors",
            OutputTable::Actors => "actors",
            OutputTable::Countries => "countries",
            OutputTable::Episodes => "episodes",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.parquet", self.name())
    }
}

impl fmt::Display for OutputTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_tokens_round_trip() {
        for c in TitleCategory::ALL {
            assert_eq!(c.as_str().parse::<TitleCategory>().unwrap(), c);
        }
        assert!("videoGame".parse::<TitleCategory>().is_err());
    }

    #[test]
    fn test_only_series_can_parent_episodes() {
        let series: Vec<_> = TitleCategory::ALL
            .into_iter()
            .filter(|c| c.is_series())
            .collect();
        assert_eq!(series, vec![TitleCategory::TvSeries, TitleCategory::TvMiniSeries]);
    }

    #[test]
    fn test_artifact_names_are_distinct() {
        let mut names: Vec<String> = OutputTable::ALL.iter().map(|t| t.file_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), OutputTable::ALL.len());
        assert_eq!(OutputTable::GenresByYear.file_name(), "genres_by_year.parquet");
    }
}
