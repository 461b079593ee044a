//! The transformation stages, leaves first.
//!
//! Each stage is a small struct built from [`crate::config::PipelineConfig`]
//! whose `apply` maps upstream relations to one derived relation.

pub mod aggregate;
pub mod base_filter;
pub mod episodes;
pub mod explode;
pub mod people;
pub mod ratings;
pub mod regions;

pub use aggregate::Aggregation;
pub use base_filter::BaseFilter;
pub use episodes::EpisodeHierarchy;
pub use explode::Explode;
pub use people::PersonResolution;
pub use ratings::RatingJoin;
pub use regions::RegionResolution;

/// Columns of `titles_clean`, the rated-title relation every fact table joins.
pub const TITLES_CLEAN_COLUMNS: [&str; 10] = [
    "tconst",
    "titleType",
    "primaryTitle",
    "originalTitle",
    "startYear",
    "endYear",
    "runtimeMinutes",
    "genres",
    "averageRating",
    "numVotes",
];

/// Title metadata denormalized onto the person fact tables.
pub(crate) const TITLE_METADATA: [(&str, &str); 5] = [
    ("primaryTitle", "primaryTitle"),
    ("startYear", "startYear"),
    ("titleType", "titleType"),
    ("averageRating", "averageRating"),
    ("numVotes", "numVotes"),
];
