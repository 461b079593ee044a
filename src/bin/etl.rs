//! ETL binary: rebuilds every analysis table from the raw catalog dumps.
//!
//! ## Input
//!
//! A data directory holding the tab-separated, gzip-compressed dumps:
//! `title.basics`, `title.ratings`, `title.crew`, `name.basics`,
//! `title.principals`, `title.akas` and `title.episode` (each `*.tsv.gz`).
//!
//! ## Output
//!
//! One zstd parquet file per derived table in the output directory:
//! `titles_clean`, `genres_by_year`, `directors`, `actors`, `countries`,
//! `episodes`. Every run replaces all six; a failed run replaces none.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin etl -- --data-dir data_raw --output-dir data_processed
//! cargo run --release --bin etl -- --data-dir data_raw --output-dir out --min-votes 500 --start-year 1980
//! ```

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use indicatif::{HumanBytes, HumanCount, HumanDuration};
use tracing::info;

use marquee::{Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(about = "Rebuild analysis tables from raw catalog dumps")]
struct Args {
    /// Directory containing the raw `*.tsv.gz` dumps.
    #[arg(long, default_value = "data_raw")]
    data_dir: PathBuf,

    /// Directory the parquet artifacts are published to.
    #[arg(long, default_value = "data_processed")]
    output_dir: PathBuf,

    /// Optional JSON config file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum number of votes for a title to be kept.
    #[arg(long)]
    min_votes: Option<i32>,

    /// First year of the ingestion window (inclusive).
    #[arg(long)]
    start_year: Option<i32>,

    /// Last year of the ingestion window (inclusive).
    #[arg(long)]
    end_year: Option<i32>,

    /// Also write the run report as JSON to this path.
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Hide progress bars.
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(v) = args.min_votes {
        config.min_votes = v;
    }
    if let Some(v) = args.start_year {
        config.start_year = v;
    }
    if let Some(v) = args.end_year {
        config.end_year = v;
    }

    info!("Data dir:   {}", args.data_dir.display());
    info!("Output dir: {}", args.output_dir.display());
    info!(
        "Filters:    min_votes={}, years {}-{}, categories {:?}",
        config.min_votes,
        config.start_year,
        config.end_year,
        config.allowed_tokens()
    );

    let pipeline = Pipeline::new(config, &args.data_dir)?.with_progress(!args.quiet);
    let report = pipeline.run(&args.output_dir)?;

    info!("══════════════════════════════════════════════════════════════");
    for artifact in &report.artifacts {
        info!(
            "  {:<24} {:>12} rows {:>12}",
            artifact.table.file_name(),
            HumanCount(artifact.rows as u64).to_string(),
            HumanBytes(artifact.bytes).to_string()
        );
    }
    if !report.empty_tables.is_empty() {
        info!("  Empty tables: {:?}", report.empty_tables);
    }
    info!(
        "  Total: {} in {}",
        HumanBytes(report.total_bytes()),
        HumanDuration(report.elapsed)
    );

    if let Some(path) = &args.report_json {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}
