//! Raw table loader: decodes tab-separated (optionally gzip-compressed) catalog
//! dumps into Arrow record batches.
//!
//! Only the declared columns are materialized, in declaration order. The null
//! sentinel becomes an Arrow null in every column; numeric and boolean columns
//! are cast while decoding, and a value that cannot be cast aborts the load.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanBuilder, Float32Builder, Int32Builder, StringBuilder};
use arrow::compute::concat_batches;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use csv::{ReaderBuilder, StringRecord};
use flate2::read::MultiGzDecoder;
use tracing::{debug, info};

use crate::common::{ColumnType, SourceTable};
use crate::config::PipelineConfig;
use crate::error::{EtlError, Result};

// ============================================================================
// Column builders
// ============================================================================

enum ColumnBuilder {
    Utf8(StringBuilder),
    Int32(Int32Builder),
    Float32(Float32Builder),
    Boolean(BooleanBuilder),
}

impl ColumnBuilder {
    fn new(ty: ColumnType, capacity: usize) -> Self {
        match ty {
            ColumnType::Utf8 | ColumnType::Delimited => {
                ColumnBuilder::Utf8(StringBuilder::with_capacity(capacity, capacity * 16))
            }
            ColumnType::Int32 => ColumnBuilder::Int32(Int32Builder::with_capacity(capacity)),
            ColumnType::Float32 => ColumnBuilder::Float32(Float32Builder::with_capacity(capacity)),
            ColumnType::Boolean => ColumnBuilder::Boolean(BooleanBuilder::with_capacity(capacity)),
        }
    }

    /// Append one raw field. `None` means the field held the null sentinel.
    /// Returns a description of the problem if the value cannot be cast.
    fn append(&mut self, raw: Option<&str>) -> std::result::Result<(), String> {
        match self {
            ColumnBuilder::Utf8(b) => b.append_option(raw),
            ColumnBuilder::Int32(b) => match raw.map(str::trim).filter(|s| !s.is_empty()) {
                None => b.append_null(),
                Some(s) => {
                    let v = s
                        .parse::<i32>()
                        .map_err(|_| format!("'{s}' is not an integer"))?;
                    b.append_value(v);
                }
            },
            ColumnBuilder::Float32(b) => match raw.map(str::trim).filter(|s| !s.is_empty()) {
                None => b.append_null(),
                Some(s) => {
                    let v = s
                        .parse::<f32>()
                        .map_err(|_| format!("'{s}' is not a number"))?;
                    b.append_value(v);
                }
            },
            ColumnBuilder::Boolean(b) => match raw.map(str::trim).filter(|s| !s.is_empty()) {
                None => b.append_null(),
                Some("1") | Some("true") | Some("True") => b.append_value(true),
                Some("0") | Some("false") | Some("False") => b.append_value(false),
                Some(s) => return Err(format!("'{s}' is not a boolean")),
            },
        }
        Ok(())
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Utf8(b) => Arc::new(b.finish()),
            ColumnBuilder::Int32(b) => Arc::new(b.finish()),
            ColumnBuilder::Float32(b) => Arc::new(b.finish()),
            ColumnBuilder::Boolean(b) => Arc::new(b.finish()),
        }
    }
}

// ============================================================================
// Loader
// ============================================================================

#[derive(Clone, Debug)]
pub struct TableLoader {
    null_sentinel: String,
    batch_size: usize,
}

impl TableLoader {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            null_sentinel: config.null_sentinel.clone(),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Path of `source` under `data_dir`.
    pub fn source_path(data_dir: &Path, source: SourceTable) -> PathBuf {
        data_dir.join(source.file_name())
    }

    /// Load one of the known catalog sources from `data_dir`.
    pub fn load_source(&self, data_dir: &Path, source: SourceTable) -> Result<RecordBatch> {
        self.load_source_where(data_dir, source, |_| true)
    }

    /// Like [`TableLoader::load_source`], but only rows for which `keep`
    /// returns true are materialized. `keep` sees the raw declared fields in
    /// declaration order, with the null sentinel already mapped to `None`.
    pub fn load_source_where<F>(&self, data_dir: &Path, source: SourceTable, keep: F) -> Result<RecordBatch>
    where
        F: Fn(&[Option<&str>]) -> bool,
    {
        let path = Self::source_path(data_dir, source);
        self.load_path_where(source.name(), &path, source.columns(), keep)
    }

    /// Load a source file, decompressing it when the name ends in `.gz`.
    pub fn load_path(
        &self,
        table: &str,
        path: &Path,
        columns: &[(&str, ColumnType)],
    ) -> Result<RecordBatch> {
        self.load_path_where(table, path, columns, |_| true)
    }

    pub fn load_path_where<F>(
        &self,
        table: &str,
        path: &Path,
        columns: &[(&str, ColumnType)],
        keep: F,
    ) -> Result<RecordBatch>
    where
        F: Fn(&[Option<&str>]) -> bool,
    {
        if !path.is_file() {
            return Err(EtlError::SourceMissing {
                source_name: table.to_string(),
                path: path.to_path_buf(),
            });
        }
        info!("  Loading {}", path.display());
        let file = File::open(path)?;
        let gzipped = path.extension().is_some_and(|ext| ext == "gz");
        let reader: Box<dyn Read> = if gzipped {
            Box::new(MultiGzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        self.load_reader_where(table, reader, columns, keep)
    }

    /// Decode a header-first, tab-separated stream into a single record batch.
    pub fn load_reader<R: Read>(
        &self,
        table: &str,
        reader: R,
        columns: &[(&str, ColumnType)],
    ) -> Result<RecordBatch> {
        self.load_reader_where(table, reader, columns, |_| true)
    }

    pub fn load_reader_where<R, F>(
        &self,
        table: &str,
        reader: R,
        columns: &[(&str, ColumnType)],
        keep: F,
    ) -> Result<RecordBatch>
    where
        R: Read,
        F: Fn(&[Option<&str>]) -> bool,
    {
        // The dumps never quote; a literal `"` is part of the value.
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let positions: Vec<usize> = columns
            .iter()
            .map(|(name, _)| {
                headers
                    .iter()
                    .position(|h| h == *name)
                    .ok_or_else(|| EtlError::mismatch(table, *name, "declared column not in header"))
            })
            .collect::<Result<_>>()?;

        let schema: SchemaRef = Arc::new(Schema::new(
            columns
                .iter()
                .map(|(name, ty)| Field::new(*name, ty.data_type(), true))
                .collect::<Vec<_>>(),
        ));

        let new_builders = || -> Vec<ColumnBuilder> {
            columns
                .iter()
                .map(|(_, ty)| ColumnBuilder::new(*ty, self.batch_size))
                .collect()
        };
        let mut builders = new_builders();
        let mut batches: Vec<RecordBatch> = Vec::new();
        let mut rows_in_batch = 0usize;
        let mut record = StringRecord::new();

        while rdr.read_record(&mut record)? {
            // Line 1 is the header.
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.len() != headers.len() {
                return Err(EtlError::MalformedRow {
                    table: table.to_string(),
                    line,
                    reason: format!("expected {} fields, found {}", headers.len(), record.len()),
                });
            }
            let raw: Vec<Option<&str>> = positions
                .iter()
                .map(|&pos| record.get(pos).filter(|v| *v != self.null_sentinel))
                .collect();
            if !keep(&raw) {
                continue;
            }
            for ((builder, value), (name, _)) in builders.iter_mut().zip(&raw).zip(columns) {
                builder.append(*value).map_err(|reason| {
                    EtlError::mismatch(table, *name, format!("line {line}: {reason}"))
                })?;
            }
            rows_in_batch += 1;
            if rows_in_batch == self.batch_size {
                batches.push(finish_batch(&schema, &mut builders)?);
                builders = new_builders();
                rows_in_batch = 0;
            }
        }
        if rows_in_batch > 0 || batches.is_empty() {
            batches.push(finish_batch(&schema, &mut builders)?);
        }

        let batch = if batches.len() == 1 {
            batches.swap_remove(0)
        } else {
            concat_batches(&schema, &batches)?
        };
        debug!("    {table}: {} rows in {} batches", batch.num_rows(), batches.len().max(1));
        Ok(batch)
    }
}

fn finish_batch(schema: &SchemaRef, builders: &mut [ColumnBuilder]) -> Result<RecordBatch> {
    let arrays: Vec<ArrayRef> = builders.iter_mut().map(|b| b.finish()).collect();
    Ok(RecordBatch::try_new(schema.clone(), arrays)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, BooleanArray, Float32Array, Int32Array, StringArray};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const TITLES: &str = "tconst\ttitleType\tprimaryTitle\tstartYear\tgenres\tisAdult\n\
                          tt1\tmovie\t\"Quoted\" Title\t1999\tDrama,Comedy\t0\n\
                          tt2\ttvSeries\tShow\t\\N\t\\N\t1\n";

    fn columns() -> Vec<(&'static str, ColumnType)> {
        vec![
            ("tconst", ColumnType::Utf8),
            ("primaryTitle", ColumnType::Utf8),
            ("startYear", ColumnType::Int32),
            ("genres", ColumnType::Delimited),
            ("isAdult", ColumnType::Boolean),
        ]
    }

    fn loader() -> TableLoader {
        TableLoader::new(&PipelineConfig::default())
    }

    #[test]
    fn test_sentinel_becomes_null() {
        let batch = loader()
            .load_reader("titles", TITLES.as_bytes(), &columns())
            .unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 5);

        let years = batch.column(2).as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(years.value(0), 1999);
        assert!(years.is_null(1));

        let genres = batch.column(3).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(genres.value(0), "Drama,Comedy");
        assert!(genres.is_null(1));

        let adult = batch.column(4).as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(!adult.value(0));
        assert!(adult.value(1));
    }

    #[test]
    fn test_quotes_are_literal() {
        let batch = loader()
            .load_reader("titles", TITLES.as_bytes(), &columns())
            .unwrap();
        let names = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(0), "\"Quoted\" Title");
    }

    #[test]
    fn test_missing_declared_column() {
        let cols = [("tconst", ColumnType::Utf8), ("runtimeMinutes", ColumnType::Int32)];
        let err = loader()
            .load_reader("titles", TITLES.as_bytes(), &cols)
            .unwrap_err();
        assert!(
            matches!(err, EtlError::SchemaMismatch { ref column, .. } if column == "runtimeMinutes")
        );
    }

    #[test]
    fn test_untypeable_value() {
        let data = "tconst\taverageRating\ntt1\tgreat\n";
        let cols = [("tconst", ColumnType::Utf8), ("averageRating", ColumnType::Float32)];
        let err = loader().load_reader("ratings", data.as_bytes(), &cols).unwrap_err();
        assert!(matches!(err, EtlError::SchemaMismatch { .. }), "{err}");
    }

    #[test]
    fn test_short_row_is_malformed() {
        let data = "tconst\tnumVotes\ntt1\n";
        let cols = [("tconst", ColumnType::Utf8), ("numVotes", ColumnType::Int32)];
        let err = loader().load_reader("ratings", data.as_bytes(), &cols).unwrap_err();
        assert!(matches!(err, EtlError::MalformedRow { line: 2, .. }), "{err}");
    }

    #[test]
    fn test_batches_are_concatenated() {
        let mut data = String::from("tconst\taverageRating\n");
        for i in 0..10 {
            data.push_str(&format!("tt{i}\t{i}.5\n"));
        }
        let config = PipelineConfig {
            batch_size: 3,
            ..PipelineConfig::default()
        };
        let cols = [("tconst", ColumnType::Utf8), ("averageRating", ColumnType::Float32)];
        let batch = TableLoader::new(&config)
            .load_reader("ratings", data.as_bytes(), &cols)
            .unwrap();
        assert_eq!(batch.num_rows(), 10);
        let ratings = batch.column(1).as_any().downcast_ref::<Float32Array>().unwrap();
        assert_eq!(ratings.value(9), 9.5);
    }

    #[test]
    fn test_header_only_source_is_empty() {
        let cols = [("tconst", ColumnType::Utf8)];
        let batch = loader().load_reader("crew", "tconst\tdirectors\n".as_bytes(), &cols).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema().field(0).name(), "tconst");
    }

    #[test]
    fn test_gzip_source_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("title.basics.tsv.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(TITLES.as_bytes()).unwrap();
        enc.finish().unwrap();

        let batch = loader().load_path("titles", &path, &columns()).unwrap();
        assert_eq!(batch.num_rows(), 2);
    }

    #[test]
    fn test_missing_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = loader()
            .load_source(dir.path(), SourceTable::Ratings)
            .unwrap_err();
        assert!(matches!(err, EtlError::SourceMissing { ref source_name, .. } if source_name == "ratings"));
    }

    #[test]
    fn test_custom_null_sentinel() {
        let config = PipelineConfig {
            null_sentinel: "NA".to_string(),
            ..PipelineConfig::default()
        };
        let data = "tconst\tstartYear\tgenres\ntt1\tNA\tNA\ntt2\t2001\t\\N\n";
        let cols = [
            ("tconst", ColumnType::Utf8),
            ("startYear", ColumnType::Int32),
            ("genres", ColumnType::Delimited),
        ];
        let batch = TableLoader::new(&config)
            .load_reader("titles", data.as_bytes(), &cols)
            .unwrap();
        let years = batch.column(1).as_any().downcast_ref::<Int32Array>().unwrap();
        assert!(years.is_null(0));
        assert_eq!(years.value(1), 2001);
        let genres = batch.column(2).as_any().downcast_ref::<StringArray>().unwrap();
        assert!(genres.is_null(0));
        // The default sentinel is ordinary data under a custom one.
        assert_eq!(genres.value(1), "\\N");
    }

    #[test]
    fn test_row_predicate_skips_rows_before_decoding() {
        let data = "tconst\tcategory\tordering\n\
                    tt1\tactor\t1\n\
                    tt2\tcomposer\tnot-a-number\n\
                    tt3\tactress\t\\N\n";
        let cols = [
            ("tconst", ColumnType::Utf8),
            ("category", ColumnType::Utf8),
            ("ordering", ColumnType::Int32),
        ];
        let batch = loader()
            .load_reader_where("principals", data.as_bytes(), &cols, |raw| {
                raw[1] != Some("composer") && raw[2].is_some()
            })
            .unwrap();
        // tt2's untypeable ordering never reaches the builder.
        assert_eq!(batch.num_rows(), 1);
        let ids = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(ids.value(0), "tt1");
    }
}
