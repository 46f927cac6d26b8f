use anyhow::{Context, Result};
use arrow::{csv::WriterBuilder, record_batch::RecordBatch};
use std::{fs, io::BufWriter, path::Path};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::process::{RATE, STATE};

/// Write the `state,rate` columns of `batch` as headerless CSV, replacing
/// `path`. Returns the number of rows written.
#[instrument(level = "debug", skip(batch, path), fields(path = %path.display()))]
pub fn write_state_rates(batch: &RecordBatch, path: &Path) -> Result<usize> {
    let schema = batch.schema();
    let projection = [schema.index_of(STATE)?, schema.index_of(RATE)?];
    let out = batch
        .project(&projection)
        .context("selecting state and rate columns")?;

    let dir = match path.parent().filter(|d| !d.as_os_str().is_empty()) {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            dir
        }
        None => Path::new("."),
    };

    // removed on drop unless persisted
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    let tmp_path = tmp.path().to_path_buf();
    {
        let mut writer = WriterBuilder::new()
            .with_header(false)
            .build(BufWriter::new(tmp.as_file_mut()));
        writer
            .write(&out)
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        let mut inner = writer.into_inner();
        std::io::Write::flush(&mut inner)
            .with_context(|| format!("flushing {}", tmp_path.display()))?;
    }
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;

    debug!(rows = out.num_rows(), "written");
    Ok(out.num_rows())
}
