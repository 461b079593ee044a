use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::TitleCategory;
use crate::error::{EtlError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Run-level knobs for every stage.
///
/// Stages receive this (or the slice of it they need) through their
/// constructors; nothing reads configuration from globals. Missing keys in a
/// JSON config file fall back to the defaults below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Minimum `numVotes` for a rating to qualify.
    pub min_votes: i32,
    /// First year of the ingestion window (inclusive).
    pub start_year: i32,
    /// Last year of the ingestion window (inclusive).
    pub end_year: i32,
    /// Title categories kept by the base filter.
    pub allowed_categories: BTreeSet<TitleCategory>,
    /// Highest billing order kept for cast credits.
    pub cast_ordering_limit: i32,
    /// Principal categories treated as cast.
    pub cast_categories: BTreeSet<String>,
    /// Token the raw dumps use for a missing value.
    pub null_sentinel: String,
    /// Separator of multi-valued fields (genres, directors).
    pub list_delimiter: char,
    /// Rows decoded per record batch while loading.
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_votes: 1000,
            start_year: 1950,
            end_year: 2024,
            allowed_categories: TitleCategory::ALL.into_iter().collect(),
            cast_ordering_limit: 5,
            cast_categories: ["actor", "actress"].into_iter().map(String::from).collect(),
            null_sentinel: "\\N".to_string(),
            list_delimiter: ',',
            batch_size: 65_536,
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_year > self.end_year {
            return Err(EtlError::Config(format!(
                "start_year ({}) is after end_year ({})",
                self.start_year, self.end_year
            )));
        }
        if self.min_votes < 0 {
            return Err(EtlError::Config(format!(
                "min_votes must be non-negative, got {}",
                self.min_votes
            )));
        }
        if self.allowed_categories.is_empty() {
            return Err(EtlError::Config("allowed_categories is empty".into()));
        }
        if self.cast_categories.is_empty() {
            return Err(EtlError::Config("cast_categories is empty".into()));
        }
        if self.null_sentinel.is_empty() {
            return Err(EtlError::Config("null_sentinel is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(EtlError::Config("batch_size must be positive".into()));
        }
        Ok(())
    }

    /// `allowed_categories` as the raw `titleType` tokens.
    pub fn allowed_tokens(&self) -> BTreeSet<&'static str> {
        self.allowed_categories.iter().map(|c| c.as_str()).collect()
    }
}
