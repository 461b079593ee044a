//! Full-rebuild pipeline: raw dumps in, six parquet artifacts out.
//!
//! ## Steps
//!
//! 1. **Load** - check every raw source exists, then decode them in parallel.
//! 2. **Titles** - base filter, then the rating join (`titles_clean`).
//! 3. **Genres** - explode genres and aggregate by year × genre × type.
//! 4. **Directors / Actors** - person resolution over crew and principals.
//! 5. **Countries** - region resolution over release aliases.
//! 6. **Episodes** - episode → series hierarchy.
//! 7. **Write** - stage every artifact, then publish them together.
//!
//! A fatal error anywhere before step 7 leaves the output directory untouched.
//! An empty derived table is only a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use arrow::record_batch::RecordBatch;
use indexmap::IndexMap;
use indicatif::{HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::common::{OutputTable, SourceTable};
use crate::config::PipelineConfig;
use crate::error::{EtlError, Result};
use crate::loader::TableLoader;
use crate::stages::{
    Aggregation, BaseFilter, EpisodeHierarchy, Explode, PersonResolution, RatingJoin,
    RegionResolution,
};
use crate::writer::{ArtifactWriter, PublishedArtifact};

/// Number of progress ticks in [`Pipeline::transform`].
const TRANSFORM_STEPS: u64 = 6;

// ============================================================================
// Relations
// ============================================================================

/// The decoded raw sources of one run.
#[derive(Debug, Default)]
pub struct RawTables {
    tables: HashMap<SourceTable, RecordBatch>,
}

impl RawTables {
    pub fn new(tables: impl IntoIterator<Item = (SourceTable, RecordBatch)>) -> Self {
        Self {
            tables: tables.into_iter().collect(),
        }
    }

    pub fn get(&self, source: SourceTable) -> Result<&RecordBatch> {
        self.tables.get(&source).ok_or_else(|| EtlError::SourceMissing {
            source_name: source.name().to_string(),
            path: PathBuf::from(source.file_name()),
        })
    }
}

/// Derived tables in artifact order.
#[derive(Debug, Default)]
pub struct DerivedTables {
    tables: IndexMap<OutputTable, RecordBatch>,
}

impl DerivedTables {
    fn insert(&mut self, table: OutputTable, batch: RecordBatch) {
        info!("  {table}: {} rows", HumanCount(batch.num_rows() as u64));
        if batch.num_rows() == 0 {
            warn!("  {table} is empty");
        }
        self.tables.insert(table, batch);
    }

    pub fn get(&self, table: OutputTable) -> Option<&RecordBatch> {
        self.tables.get(&table)
    }

    pub fn iter(&self) -> impl Iterator<Item = (OutputTable, &RecordBatch)> {
        self.tables.iter().map(|(t, b)| (*t, b))
    }

    pub fn empty_tables(&self) -> Vec<OutputTable> {
        self.iter()
            .filter(|(_, b)| b.num_rows() == 0)
            .map(|(t, _)| t)
            .collect()
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub artifacts: Vec<PublishedArtifact>,
    /// Derived tables that ended up with zero rows.
    pub empty_tables: Vec<OutputTable>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn total_bytes(&self) -> u64 {
        self.artifacts.iter().map(|a| a.bytes).sum()
    }

    pub fn rows(&self, table: OutputTable) -> Option<usize> {
        self.artifacts.iter().find(|a| a.table == table).map(|a| a.rows)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    config: PipelineConfig,
    data_dir: PathBuf,
    progress: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, data_dir: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            data_dir: data_dir.into(),
            progress: false,
        })
    }

    /// Render progress bars on stderr.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn progress_bar(&self, len: u64, label: &str) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        let template = format!("  {label:<10} {{bar:40.cyan/blue}} {{pos}}/{{len}} [{{elapsed_precise}}] {{msg}}");
        pb.set_style(
            ProgressStyle::with_template(&template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb
    }

    /// Fail before any work if a raw source is absent.
    pub fn check_sources(&self) -> Result<()> {
        let missing: Vec<SourceTable> = SourceTable::ALL
            .into_iter()
            .filter(|s| !TableLoader::source_path(&self.data_dir, *s).is_file())
            .collect();
        for source in &missing {
            warn!(
                "  Missing source {}",
                TableLoader::source_path(&self.data_dir, *source).display()
            );
        }
        match missing.first() {
            Some(source) => Err(EtlError::SourceMissing {
                source_name: source.name().to_string(),
                path: TableLoader::source_path(&self.data_dir, *source),
            }),
            None => Ok(()),
        }
    }

    /// Decode every raw source. Sources are independent, so they load in parallel.
    /// Principals only keep rows that can be billed cast.
    pub fn load(&self) -> Result<RawTables> {
        let loader = TableLoader::new(&self.config);
        let people = PersonResolution::new(&self.config);
        let pb = self.progress_bar(SourceTable::ALL.len() as u64, "Loading");
        let loaded: Vec<(SourceTable, RecordBatch)> = SourceTable::ALL
            .par_iter()
            .map(|&source| -> Result<(SourceTable, RecordBatch)> {
                // Most principal credits are crew or low billing; drop them while decoding.
                let batch = match source {
                    SourceTable::Principals => {
                        loader.load_source_where(&self.data_dir, source, people.principal_prefilter())?
                    }
                    _ => loader.load_source(&self.data_dir, source)?,
                };
                info!("    {}: {} rows", source.name(), HumanCount(batch.num_rows() as u64));
                pb.inc(1);
                Ok((source, batch))
            })
            .collect::<Result<_>>()?;
        pb.finish_and_clear();
        Ok(RawTables::new(loaded))
    }

    /// Build every derived table from the raw sources.
    pub fn transform(&self, raw: &RawTables) -> Result<DerivedTables> {
        let config = &self.config;
        let pb = self.progress_bar(TRANSFORM_STEPS, "Stages");
        let mut derived = DerivedTables::default();

        pb.set_message("titles");
        let titles_base = BaseFilter::new(config).apply(raw.get(SourceTable::Titles)?)?;
        info!(
            "  Titles in scope ({}-{}): {}",
            config.start_year,
            config.end_year,
            HumanCount(titles_base.num_rows() as u64)
        );
        if titles_base.num_rows() == 0 {
            warn!("  No titles passed the base filter; every derived table will be empty");
        }
        let rating_join = RatingJoin::new(config);
        let qualified = rating_join.qualifying(raw.get(SourceTable::Ratings)?)?;
        info!(
            "  Ratings with at least {} votes: {}",
            config.min_votes,
            HumanCount(qualified.num_rows() as u64)
        );
        let titles_clean = rating_join.join(&titles_base, &qualified)?;
        drop(qualified);
        drop(titles_base);
        pb.inc(1);

        pb.set_message("genres");
        let genre_facts =
            Explode::new("genres", "genre", config.list_delimiter).apply(&titles_clean)?;
        let genres_by_year =
            Aggregation::new(["startYear", "genre", "titleType"]).apply(&genre_facts)?;
        drop(genre_facts);
        pb.inc(1);

        pb.set_message("people");
        let people = PersonResolution::new(config);
        let directors = people.directors(
            raw.get(SourceTable::Crew)?,
            raw.get(SourceTable::People)?,
            &titles_clean,
        )?;
        pb.inc(1);
        let actors = people.cast(
            raw.get(SourceTable::Principals)?,
            raw.get(SourceTable::People)?,
            &titles_clean,
        )?;
        pb.inc(1);

        pb.set_message("regions");
        let countries = RegionResolution::new().apply(raw.get(SourceTable::Akas)?, &titles_clean)?;
        pb.inc(1);

        pb.set_message("episodes");
        let episodes = EpisodeHierarchy::new().apply(raw.get(SourceTable::Episodes)?, &titles_clean)?;
        pb.inc(1);
        pb.finish_and_clear();

        derived.insert(OutputTable::TitlesClean, titles_clean);
        derived.insert(OutputTable::GenresByYear, genres_by_year);
        derived.insert(OutputTable::Directors, directors);
        derived.insert(OutputTable::Actors, actors);
        derived.insert(OutputTable::Countries, countries);
        derived.insert(OutputTable::Episodes, episodes);
        Ok(derived)
    }

    /// Stage every artifact, then publish them all. A failure while staging or
    /// publishing discards the staged files and leaves earlier artifacts in place.
    pub fn write(&self, derived: &DerivedTables, output_dir: &Path) -> Result<Vec<PublishedArtifact>> {
        let writer = ArtifactWriter::new(output_dir);
        let pb = self.progress_bar(OutputTable::ALL.len() as u64, "Writing");
        let mut staged = Vec::with_capacity(OutputTable::ALL.len());
        for (table, batch) in derived.iter() {
            pb.set_message(table.name());
            staged.push(writer.stage(table, batch)?);
            pb.inc(1);
        }
        pb.finish_and_clear();
        writer.publish(staged)
    }

    /// Run every step against `output_dir`.
    pub fn run(&self, output_dir: &Path) -> Result<RunReport> {
        let start = Instant::now();

        info!("Step 1: Loading raw sources from {}...", self.data_dir.display());
        self.check_sources()?;
        let raw = self.load()?;

        info!("Step 2: Building derived tables...");
        let derived = self.transform(&raw)?;
        drop(raw);

        info!("Step 3: Writing artifacts to {}...", output_dir.display());
        let artifacts = self.write(&derived, output_dir)?;

        let empty_tables = derived.empty_tables();
        for table in &empty_tables {
            warn!("Derived table {table} is empty");
        }
        let elapsed = start.elapsed();
        info!("Pipeline finished in {}", HumanDuration(elapsed));
        Ok(RunReport {
            artifacts,
            empty_tables,
            elapsed,
        })
    }
}
