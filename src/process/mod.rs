// src/process/mod.rs
use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Float64Array, StringArray, UInt64Array},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{
    config::Config,
    plot::{histogram_counts, render_histogram},
};

pub mod aggregate;
pub mod load;
pub mod preview;
pub mod rate;
pub mod sample;
pub mod split;
pub mod write;

pub const STATE: &str = "state";
pub const WIN: &str = "win";
pub const TOTAL: &str = "total";
pub const RATE: &str = "rate";

/// Schema of the input file, in column order.
pub fn raw_schema() -> Schema {
    Schema::new(vec![
        Field::new(STATE, DataType::Utf8, false),
        Field::new(WIN, DataType::UInt64, false),
        Field::new(TOTAL, DataType::UInt64, false),
    ])
}

/// Schema after the rate column has been derived.
pub fn rated_schema() -> Schema {
    Schema::new(vec![
        Field::new(STATE, DataType::Utf8, false),
        Field::new(WIN, DataType::UInt64, false),
        Field::new(TOTAL, DataType::UInt64, false),
        Field::new(RATE, DataType::Float64, false),
    ])
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a dyn arrow::array::Array> {
    batch
        .column_by_name(name)
        .map(|c| c.as_ref())
        .ok_or_else(|| anyhow!("table has no `{}` column", name))
}

pub fn state_column(batch: &RecordBatch) -> Result<&StringArray> {
    column(batch, STATE)?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("`{}` column is not Utf8", STATE))
}

pub fn u64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| anyhow!("`{}` column is not UInt64", name))
}

pub fn rate_column(batch: &RecordBatch) -> Result<&Float64Array> {
    column(batch, RATE)?
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| anyhow!("`{}` column is not Float64", RATE))
}

/// Counters and timings for one input file.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub raw_rows: usize,
    pub states: usize,
    pub zero_total_skipped: usize,
    pub zero_rate_dropped: usize,
    pub one_rate_dropped: usize,
    pub rows_written: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Load, aggregate, rate, downsample, plot and write one input file.
#[tracing::instrument(level = "info", skip(input, config), fields(input = %input.display()))]
pub fn process_file(input: &Path, config: &Config) -> Result<RunSummary> {
    let started_at = Utc::now();
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // 1) load
    let raw = load::load_stats(input)?;
    info!(rows = raw.num_rows(), "loaded");
    preview::preview_table(&raw, "loaded").printstd();

    // 2) group by state, 3) derive rate
    let grouped = aggregate::aggregate_by_state(&raw).context("aggregating by state")?;
    let rated = rate::derive_rate(&grouped, config.zero_total).context("deriving win rate")?;
    info!(states = grouped.num_rows(), rated = rated.batch.num_rows(), "aggregated");
    preview::preview_table(&rated.batch, "aggregated").printstd();

    // 4) thin out the certain wins and losses
    let sampled = sample::downsample_extremes(&rated.batch, config.keep_fraction, &mut rng)
        .context("downsampling extreme rates")?;
    info!(
        zero_dropped = sampled.zero_dropped,
        one_dropped = sampled.one_dropped,
        remaining = sampled.batch.num_rows(),
        "downsampled"
    );
    preview::preview_table(&sampled.batch, "downsampled").printstd();

    // 5) histogram
    if config.histogram.enabled {
        plot_rates(input, &sampled.batch, config)?;
    }

    // 6) write
    let output = config.output_path(input);
    let rows_written = write::write_state_rates(&sampled.batch, &output)?;
    info!(output = %output.display(), rows = rows_written, "wrote processed rates");

    if let Some(split_cfg) = &config.split {
        let (train, valid) =
            split::split_train_valid(&sampled.batch, split_cfg.valid_fraction, &mut rng)?;
        let train_rows = write::write_state_rates(&train, &split_cfg.train_path)?;
        let valid_rows = write::write_state_rates(&valid, &split_cfg.valid_path)?;
        info!(train = train_rows, valid = valid_rows, "wrote train/valid split");
    }

    Ok(RunSummary {
        input: input.to_path_buf(),
        output,
        raw_rows: raw.num_rows(),
        states: grouped.num_rows(),
        zero_total_skipped: rated.zero_total_skipped,
        zero_rate_dropped: sampled.zero_dropped,
        one_rate_dropped: sampled.one_dropped,
        rows_written,
        started_at,
        finished_at: Utc::now(),
    })
}

fn plot_rates(input: &Path, batch: &RecordBatch, config: &Config) -> Result<()> {
    let rates: Vec<f64> = rate_column(batch)?.values().iter().copied().collect();
    let Some(histogram) = histogram_counts(&rates, config.histogram.bins) else {
        warn!("no rows left to plot, skipping histogram");
        return Ok(());
    };

    let path = config.histogram_path(input);
    let caption = format!("{} win rate ({} states)", input.display(), rates.len());
    // rendering failures are logged, not fatal
    match render_histogram(
        &path,
        &caption,
        &histogram,
        (config.histogram.width, config.histogram.height),
    ) {
        Ok(()) => info!(path = %path.display(), bins = histogram.counts.len(), "rendered histogram"),
        Err(e) => warn!(path = %path.display(), "rendering histogram failed: {:#}", e),
    }
    Ok(())
}

/// Build a raw `state,win,total` batch for tests.
#[cfg(test)]
pub(crate) fn stats_batch(rows: &[(&str, u64, u64)]) -> RecordBatch {
    use std::sync::Arc;
    let states: StringArray = rows.iter().map(|r| Some(r.0)).collect();
    let wins = UInt64Array::from(rows.iter().map(|r| r.1).collect::<Vec<_>>());
    let totals = UInt64Array::from(rows.iter().map(|r| r.2).collect::<Vec<_>>());
    RecordBatch::try_new(
        Arc::new(raw_schema()),
        vec![Arc::new(states), Arc::new(wins), Arc::new(totals)],
    )
    .expect("valid test batch")
}

#[cfg(test)]
pub(crate) fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mctsrate=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn quiet_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.histogram.enabled = false;
        config.seed = Some(42);
        config.inputs = vec![dir.join("0.csv").display().to_string()];
        config
    }

    #[test]
    fn worked_example_end_to_end() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let input = dir.path().join("0.csv");
        fs::write(&input, "A,0,10\nA,10,10\nB,5,10\n")?;

        let summary = process_file(&input, &quiet_config(dir.path()))?;

        assert_eq!(summary.raw_rows, 3);
        assert_eq!(summary.states, 2);
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.output, dir.path().join("0_processed.csv"));
        let written = fs::read_to_string(&summary.output)?;
        let mut lines: Vec<&str> = written.lines().collect();
        lines.sort();
        assert_eq!(lines, vec!["A,0.5", "B,0.5"]);
        Ok(())
    }

    #[test]
    fn extremes_are_thinned_and_middle_kept() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let input = dir.path().join("0.csv");
        let mut text = String::new();
        for i in 0..80 {
            text.push_str(&format!("z{},0,64\n", i));
            text.push_str(&format!("o{},64,64\n", i));
        }
        text.push_str("m,32,64\n");
        fs::write(&input, text)?;

        let summary = process_file(&input, &quiet_config(dir.path()))?;

        assert_eq!(summary.zero_rate_dropped, 70);
        assert_eq!(summary.one_rate_dropped, 70);
        assert_eq!(summary.rows_written, 21);
        let written = fs::read_to_string(&summary.output)?;
        assert!(written.lines().any(|l| l == "m,0.5"));
        Ok(())
    }

    #[test]
    fn zero_total_fails_by_default() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("0.csv");
        fs::write(&input, "A,0,0\nB,1,2\n")?;

        let err = process_file(&input, &quiet_config(dir.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("A"));
        assert!(!dir.path().join("0_processed.csv").exists());
        Ok(())
    }

    #[test]
    fn histogram_is_rendered_next_to_the_output() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let input = dir.path().join("0.csv");
        fs::write(&input, "A,1,4\nB,3,4\nC,2,2\n")?;

        let mut config = quiet_config(dir.path());
        config.histogram.enabled = true;
        config.histogram.width = 400;
        config.histogram.height = 300;
        process_file(&input, &config)?;

        let svg = fs::read_to_string(dir.path().join("0_histogram.svg"))?;
        assert!(svg.contains("<svg"));
        assert!(svg.contains("<rect"));
        assert!(dir.path().join("0_processed.csv").exists());
        Ok(())
    }

    #[test]
    fn histogram_failure_still_writes_output() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let input = dir.path().join("0.csv");
        fs::write(&input, "A,1,4\nB,3,4\n")?;
        fs::create_dir(dir.path().join("0_histogram.svg"))?;

        let mut config = quiet_config(dir.path());
        config.histogram.enabled = true;
        let summary = process_file(&input, &config)?;

        assert_eq!(summary.rows_written, 2);
        let written = fs::read_to_string(dir.path().join("0_processed.csv"))?;
        assert_eq!(written, "A,0.25\nB,0.75\n");
        assert!(dir.path().join("0_histogram.svg").is_dir());
        Ok(())
    }

    #[test]
    fn empty_input_skips_histogram() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let input = dir.path().join("0.csv");
        fs::write(&input, "")?;

        let mut config = quiet_config(dir.path());
        config.histogram.enabled = true;
        let summary = process_file(&input, &config)?;

        assert_eq!(summary.rows_written, 0);
        assert!(!dir.path().join("0_histogram.svg").exists());
        assert_eq!(fs::read_to_string(dir.path().join("0_processed.csv"))?, "");
        Ok(())
    }

    #[test]
    fn split_writes_train_and_valid() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("0.csv");
        let text: String = (0..20).map(|i| format!("s{},1,4\n", i)).collect();
        fs::write(&input, text)?;

        let mut config = quiet_config(dir.path());
        config.split = Some(crate::config::SplitConfig {
            valid_fraction: 0.25,
            train_path: dir.path().join("train.csv"),
            valid_path: dir.path().join("valid.csv"),
        });
        process_file(&input, &config)?;

        let train = fs::read_to_string(dir.path().join("train.csv"))?;
        let valid = fs::read_to_string(dir.path().join("valid.csv"))?;
        assert_eq!(train.lines().count(), 15);
        assert_eq!(valid.lines().count(), 5);
        Ok(())
    }
}
