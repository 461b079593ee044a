//! Inspect the published artifacts: size, row count, columns, null counts and
//! sample rows for each derived table.
//!
//! A missing artifact means the pipeline has not run yet; it is reported, not
//! treated as an error.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin inspect -- --output-dir data_processed
//! cargo run --release --bin inspect -- --output-dir data_processed --sample-rows 10
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::Array;
use arrow::compute::concat_batches;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use arrow::util::pretty::pretty_format_batches;
use clap::Parser;
use indicatif::{HumanBytes, HumanCount};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use marquee::common::OutputTable;

/// Combined artifact size above which publishing them to a git host gets awkward.
const SIZE_WARNING_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(about = "Inspect the parquet artifacts produced by the etl binary")]
struct Args {
    /// Directory holding the published artifacts.
    #[arg(long, default_value = "data_processed")]
    output_dir: PathBuf,

    /// Number of sample rows to print per table (0 to skip).
    #[arg(long, default_value_t = 3)]
    sample_rows: usize,
}

fn read_artifact(path: &Path) -> Result<RecordBatch, Box<dyn std::error::Error>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?.build()?;
    let schema = reader.schema();
    let batches: Vec<RecordBatch> = reader.collect::<Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

/// Print one artifact. Returns its size in bytes if it was readable.
fn inspect(table: OutputTable, dir: &Path, sample_rows: usize) -> Option<u64> {
    let path = dir.join(table.file_name());
    if !path.is_file() {
        println!("✗ {} - not found (pipeline not yet run)", table.file_name());
        return None;
    }
    let size = path.metadata().map(|m| m.len()).unwrap_or(0);
    let batch = match read_artifact(&path) {
        Ok(batch) => batch,
        Err(e) => {
            println!("✗ {} - unreadable: {e}", table.file_name());
            return None;
        }
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  {}", table.file_name());
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Size:    {:>14}", HumanBytes(size).to_string());
    println!("║  Rows:    {:>14}", HumanCount(batch.num_rows() as u64).to_string());
    println!("║  Columns: {:>14}", batch.num_columns());
    println!("╚══════════════════════════════════════════════════════════════╝");

    let schema = batch.schema();
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        let nulls = array.null_count();
        let pct = if batch.num_rows() > 0 {
            nulls as f64 / batch.num_rows() as f64 * 100.0
        } else {
            0.0
        };
        println!(
            "  {:<18} {:<10} nulls: {:>10} ({pct:.2}%)",
            field.name(),
            field.data_type().to_string(),
            nulls
        );
    }

    if sample_rows > 0 && batch.num_rows() > 0 {
        let head = batch.slice(0, sample_rows.min(batch.num_rows()));
        match pretty_format_batches(&[head]) {
            Ok(table) => println!("{table}"),
            Err(e) => println!("  (could not format sample rows: {e})"),
        }
    }
    println!();
    Some(size)
}

fn main() {
    let args = Args::parse();

    println!("Inspecting artifacts in {}", args.output_dir.display());
    println!();

    let mut valid = 0usize;
    let mut total_size = 0u64;
    for table in OutputTable::ALL {
        if let Some(size) = inspect(table, &args.output_dir, args.sample_rows) {
            valid += 1;
            total_size += size;
        }
    }

    println!("Valid artifacts: {valid}/{}", OutputTable::ALL.len());
    println!("Total size:      {}", HumanBytes(total_size));
    if valid < OutputTable::ALL.len() {
        println!("Some artifacts are missing; run the etl binary first.");
    }
    if total_size > SIZE_WARNING_BYTES {
        println!(
            "Warning: artifacts total more than {}; consider stricter filters.",
            HumanBytes(SIZE_WARNING_BYTES)
        );
    }
}
