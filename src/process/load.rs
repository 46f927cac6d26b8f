use anyhow::{Context, Result};
use arrow::{
    compute::concat_batches,
    csv::ReaderBuilder,
    record_batch::RecordBatch,
};
use std::{fs::File, io::BufReader, path::Path, sync::Arc};
use tracing::{debug, instrument};

use crate::process::raw_schema;

const BATCH_ROWS: usize = 64 * 1024;

/// Read a headerless `state,win,total` CSV into a single batch.
#[instrument(level = "info", skip(path), fields(path = %path.display()))]
pub fn load_stats(path: &Path) -> Result<RecordBatch> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_stats(BufReader::new(file)).with_context(|| format!("reading {}", path.display()))
}

pub fn read_stats<R: std::io::Read>(reader: R) -> Result<RecordBatch> {
    let schema = Arc::new(raw_schema());
    let csv = ReaderBuilder::new(schema.clone())
        .with_header(false)
        .with_batch_size(BATCH_ROWS)
        .with_delimiter(b',')
        .build(reader)
        .context("creating CSV reader")?;

    let mut batches = Vec::new();
    for (idx, batch) in csv.enumerate() {
        let batch = batch.with_context(|| format!("parsing CSV batch #{}", idx))?;
        debug!(batch = idx, rows = batch.num_rows(), "read batch");
        batches.push(batch);
    }

    concat_batches(&schema, &batches).context("concatenating CSV batches")
}
