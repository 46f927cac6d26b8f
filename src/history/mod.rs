// src/history/mod.rs

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, StringArray, TimestampMicrosecondArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use glob::glob;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    fs,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;

use crate::process::RunSummary;

/// Run log backed by one-row Parquet files.
pub struct History {
    history_dir: PathBuf,
}

impl History {
    /// Open the history at `history_dir`, creating the directory if needed.
    pub fn new(history_dir: impl Into<PathBuf>) -> Result<Self> {
        let history_dir = history_dir.into();
        fs::create_dir_all(&history_dir)
            .with_context(|| format!("creating history directory {:?}", &history_dir))?;
        Ok(Self { history_dir })
    }

    fn schema() -> Schema {
        let ts = DataType::Timestamp(TimeUnit::Microsecond, None);
        Schema::new(vec![
            Field::new("input", DataType::Utf8, false),
            Field::new("output", DataType::Utf8, false),
            Field::new("raw_rows", DataType::UInt64, false),
            Field::new("states", DataType::UInt64, false),
            Field::new("zero_total_skipped", DataType::UInt64, false),
            Field::new("zero_rate_dropped", DataType::UInt64, false),
            Field::new("one_rate_dropped", DataType::UInt64, false),
            Field::new("rows_written", DataType::UInt64, false),
            Field::new("started_at", ts.clone(), false),
            Field::new("finished_at", ts, false),
        ])
    }

    /// Writes `<input stem>_run_<micros>.parquet`.
    pub fn record_run(&self, run: &RunSummary) -> Result<PathBuf> {
        let ts = run.finished_at.timestamp_micros();
        let path = self
            .history_dir
            .join(format!("{}_run_{}.parquet", input_key(&run.input), ts));

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![run.input.display().to_string()])),
            Arc::new(StringArray::from(vec![run.output.display().to_string()])),
            Arc::new(UInt64Array::from(vec![run.raw_rows as u64])),
            Arc::new(UInt64Array::from(vec![run.states as u64])),
            Arc::new(UInt64Array::from(vec![run.zero_total_skipped as u64])),
            Arc::new(UInt64Array::from(vec![run.zero_rate_dropped as u64])),
            Arc::new(UInt64Array::from(vec![run.one_rate_dropped as u64])),
            Arc::new(UInt64Array::from(vec![run.rows_written as u64])),
            Arc::new(TimestampMicrosecondArray::from(vec![run
                .started_at
                .timestamp_micros()])),
            Arc::new(TimestampMicrosecondArray::from(vec![ts])),
        ];

        let schema = Arc::new(Self::schema());
        let batch = RecordBatch::try_new(schema.clone(), columns)
            .context("building history record batch")?;
        let file =
            File::create(&path).with_context(|| format!("creating history file {:?}", &path))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))
            .context("creating Arrow writer for history")?;
        writer.write(&batch).context("writing history batch")?;
        writer.close().context("closing history writer")?;

        debug!(path = %path.display(), "recorded run");
        Ok(path)
    }

    /// How many runs have been recorded for `input`, by scanning file names.
    pub fn run_count(&self, input: &Path) -> Result<usize> {
        let pattern = format!(
            "{}/{}_run_*.parquet",
            self.history_dir.display(),
            glob::Pattern::escape(&input_key(input))
        );
        let mut count = 0;
        for entry in glob(&pattern)? {
            if entry.is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn input_key(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::tempdir;

    fn summary(input: &str, offset_us: i64) -> RunSummary {
        let started_at = Utc::now();
        RunSummary {
            input: PathBuf::from(input),
            output: PathBuf::from("0_processed.csv"),
            raw_rows: 3,
            states: 2,
            zero_total_skipped: 0,
            zero_rate_dropped: 0,
            one_rate_dropped: 0,
            rows_written: 2,
            started_at,
            finished_at: started_at + Duration::microseconds(offset_us),
        }
    }

    #[test]
    fn records_and_counts_runs() -> Result<()> {
        let dir = tempdir()?;
        let history = History::new(dir.path().join("history"))?;
        assert_eq!(history.run_count(Path::new("0.csv"))?, 0);

        history.record_run(&summary("0.csv", 1))?;
        history.record_run(&summary("0.csv", 2))?;
        history.record_run(&summary("1.csv", 3))?;

        assert_eq!(history.run_count(Path::new("0.csv"))?, 2);
        assert_eq!(history.run_count(Path::new("1.csv"))?, 1);
        Ok(())
    }

    #[test]
    fn record_is_readable_parquet() -> Result<()> {
        let dir = tempdir()?;
        let history = History::new(dir.path())?;
        let mut run = summary("0.csv", 5);
        run.zero_total_skipped = 1;
        let path = history.record_run(&run)?;

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?.build()?;
        let batches: Vec<RecordBatch> = reader.collect::<std::result::Result<_, _>>()?;
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 1);
        let written = batch
            .column_by_name("rows_written")
            .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
            .expect("rows_written column");
        assert_eq!(written.value(0), 2);
        let skipped = batch
            .column_by_name("zero_total_skipped")
            .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
            .expect("zero_total_skipped column");
        assert_eq!(skipped.value(0), 1);
        Ok(())
    }
}
