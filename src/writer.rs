//! Output writer: one zstd-compressed parquet artifact per derived table.
//!
//! Writing happens in two phases. [`ArtifactWriter::stage`] serializes a table
//! into a hidden temp file inside the output directory; [`ArtifactWriter::publish`]
//! renames staged files over their final names. Readers therefore see either the
//! previous artifact or the complete new one, never a partial file. A staged
//! file that is dropped without being published is deleted.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::common::OutputTable;
use crate::error::Result;

/// A fully written artifact that has not been published yet.
#[derive(Debug)]
pub struct StagedArtifact {
    pub table: OutputTable,
    pub rows: usize,
    temp: NamedTempFile,
}

/// An artifact visible to consumers under its final name.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedArtifact {
    pub table: OutputTable,
    pub path: PathBuf,
    pub rows: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
    props: WriterProperties,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::default()))
            .build();
        Self {
            output_dir: output_dir.into(),
            props,
        }
    }

    /// Final location of `table`'s artifact.
    pub fn artifact_path(&self, table: OutputTable) -> PathBuf {
        self.output_dir.join(table.file_name())
    }

    /// Serialize `batch` into a temp file next to its final location.
    pub fn stage(&self, table: OutputTable, batch: &RecordBatch) -> Result<StagedArtifact> {
        fs::create_dir_all(&self.output_dir)?;
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", table.name()))
            .suffix(".parquet.tmp")
            .tempfile_in(&self.output_dir)?;

        let mut writer = ArrowWriter::try_new(
            BufWriter::new(temp.as_file_mut()),
            batch.schema(),
            Some(self.props.clone()),
        )?;
        writer.write(batch)?;
        let mut buffered = writer.into_inner()?;
        buffered.flush()?;
        drop(buffered);
        temp.as_file().sync_all()?;

        debug!("  Staged {} ({} rows) at {}", table, batch.num_rows(), temp.path().display());
        Ok(StagedArtifact {
            table,
            rows: batch.num_rows(),
            temp,
        })
    }

    /// Hidden name the previous generation of `table` is parked under while publishing.
    pub fn backup_path(&self, table: OutputTable) -> PathBuf {
        self.output_dir.join(format!(".{}.bak", table.file_name()))
    }

    /// Rename every staged artifact over its final name.
    ///
    /// All or nothing: each existing artifact is first moved aside to its
    /// backup name. If any rename fails, the artifacts already published are
    /// rolled back to the previous generation before the error is returned.
    /// Backups are removed only once every artifact is in place.
    pub fn publish(&self, staged: Vec<StagedArtifact>) -> Result<Vec<PublishedArtifact>> {
        let mut swaps: Vec<Swap> = Vec::with_capacity(staged.len());
        let mut published = Vec::with_capacity(staged.len());
        for artifact in staged {
            match self.swap_in(artifact, &mut swaps) {
                Ok(done) => published.push(done),
                Err(e) => {
                    self.roll_back(swaps);
                    return Err(e);
                }
            }
        }

        for swap in &swaps {
            if let Some(backup) = &swap.backup {
                if let Err(e) = fs::remove_file(backup) {
                    warn!("  Could not remove backup {}: {e}", backup.display());
                }
            }
        }
        for artifact in &published {
            info!("  Wrote {} ({} rows)", artifact.path.display(), artifact.rows);
        }
        Ok(published)
    }

    fn swap_in(&self, artifact: StagedArtifact, swaps: &mut Vec<Swap>) -> Result<PublishedArtifact> {
        let path = self.artifact_path(artifact.table);
        let backup = if path.is_file() {
            let backup = self.backup_path(artifact.table);
            fs::rename(&path, &backup)?;
            Some(backup)
        } else {
            None
        };
        swaps.push(Swap {
            path: path.clone(),
            backup,
            replaced: false,
        });

        let file = artifact
            .temp
            .persist(&path)
            .map_err(std::io::Error::from)?;
        if let Some(swap) = swaps.last_mut() {
            swap.replaced = true;
        }
        let bytes = file.metadata()?.len();
        Ok(PublishedArtifact {
            table: artifact.table,
            path,
            rows: artifact.rows,
            bytes,
        })
    }

    /// Undo `swaps` in reverse order, restoring every backed-up artifact.
    fn roll_back(&self, swaps: Vec<Swap>) {
        for swap in swaps.into_iter().rev() {
            let restored = match (&swap.backup, swap.replaced) {
                (Some(backup), _) => fs::rename(backup, &swap.path),
                (None, true) => fs::remove_file(&swap.path),
                (None, false) => Ok(()),
            };
            match restored {
                Ok(()) => debug!("  Rolled back {}", swap.path.display()),
                Err(e) => warn!("  Could not roll back {}: {e}", swap.path.display()),
            }
        }
    }
}

/// One artifact's progress through [`ArtifactWriter::publish`].
#[derive(Debug)]
struct Swap {
    path: PathBuf,
    backup: Option<PathBuf>,
    replaced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::tests::utf8_batch;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use std::fs::File;

    fn batch() -> RecordBatch {
        utf8_batch(&[
            ("tconst", vec![Some("tt1"), Some("tt2")]),
            ("region", vec![Some("US"), None]),
        ])
    }

    #[test]
    fn test_stage_then_publish() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let staged = writer.stage(OutputTable::Countries, &batch()).unwrap();
        let final_path = writer.artifact_path(OutputTable::Countries);
        assert!(!final_path.exists(), "staging must not touch the final name");

        let published = writer.publish(vec![staged]).unwrap();
        assert_eq!(published[0].rows, 2);
        assert!(published[0].bytes > 0);

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&final_path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(batches[0].columns(), batch().columns());
    }

    #[test]
    fn test_artifacts_are_zstd_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let staged = writer.stage(OutputTable::Countries, &batch()).unwrap();
        writer.publish(vec![staged]).unwrap();

        let file = File::open(writer.artifact_path(OutputTable::Countries)).unwrap();
        let reader = SerializedFileReader::new(file).unwrap();
        let column = reader.metadata().row_group(0).column(0);
        assert!(matches!(column.compression(), Compression::ZSTD(_)));
    }

    #[test]
    fn test_dropped_stage_leaves_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let first = writer.stage(OutputTable::Countries, &batch()).unwrap();
        writer.publish(vec![first]).unwrap();
        let before = fs::read(writer.artifact_path(OutputTable::Countries)).unwrap();

        let abandoned = writer.stage(OutputTable::Countries, &batch().slice(0, 1)).unwrap();
        drop(abandoned);

        let after = fs::read(writer.artifact_path(OutputTable::Countries)).unwrap();
        assert_eq!(before, after);
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temp files must be cleaned up");
    }

    #[test]
    fn test_failed_publish_restores_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let first = vec![
            writer.stage(OutputTable::TitlesClean, &batch()).unwrap(),
            writer.stage(OutputTable::Countries, &batch()).unwrap(),
        ];
        writer.publish(first).unwrap();
        let titles_before = fs::read(writer.artifact_path(OutputTable::TitlesClean)).unwrap();

        // A non-empty directory squatting on a final name makes its rename fail.
        let blocked = writer.artifact_path(OutputTable::Actors);
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("keep"), b"x").unwrap();

        let second = vec![
            writer.stage(OutputTable::TitlesClean, &batch().slice(0, 1)).unwrap(),
            writer.stage(OutputTable::Countries, &batch().slice(0, 1)).unwrap(),
            writer.stage(OutputTable::Actors, &batch()).unwrap(),
        ];
        assert!(writer.publish(second).is_err());

        let titles_after = fs::read(writer.artifact_path(OutputTable::TitlesClean)).unwrap();
        assert_eq!(titles_before, titles_after);
        let reader = ParquetRecordBatchReaderBuilder::try_new(
            File::open(writer.artifact_path(OutputTable::Countries)).unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 2);

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["actors.parquet", "countries.parquet", "titles_clean.parquet"]);
    }

    #[test]
    fn test_publish_removes_backups() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        for rows in [2, 1] {
            let staged = writer.stage(OutputTable::Episodes, &batch().slice(0, rows)).unwrap();
            let published = writer.publish(vec![staged]).unwrap();
            assert_eq!(published[0].rows, rows);
        }
        assert!(!writer.backup_path(OutputTable::Episodes).exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
