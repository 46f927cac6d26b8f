use anyhow::{bail, Result};
use arrow::{array::BooleanArray, compute::filter_record_batch, record_batch::RecordBatch};
use rand::{seq::index, Rng};
use tracing::{debug, instrument};

use crate::process::rate_column;

/// Table after downsampling plus how many rows each extreme lost.
#[derive(Debug)]
pub struct Downsampled {
    pub batch: RecordBatch,
    pub zero_dropped: usize,
    pub one_dropped: usize,
}

/// Number of rows to drop from `n` so that `keep_fraction` of them survive.
/// Halves round to even.
pub fn drop_count(n: usize, keep_fraction: f64) -> usize {
    let dropped = (n as f64 * (1.0 - keep_fraction)).round_ties_even();
    (dropped.max(0.0) as usize).min(n)
}

/// Keep only `keep_fraction` of the rows whose rate is exactly 0.0 and,
/// independently, of those whose rate is exactly 1.0. The dropped rows are
/// drawn uniformly without replacement; every other row is kept and the
/// original order is preserved.
#[instrument(level = "debug", skip(batch, rng), fields(rows = batch.num_rows()))]
pub fn downsample_extremes<R: Rng + ?Sized>(
    batch: &RecordBatch,
    keep_fraction: f64,
    rng: &mut R,
) -> Result<Downsampled> {
    if !(0.0..=1.0).contains(&keep_fraction) {
        bail!("keep_fraction must be within [0, 1], got {}", keep_fraction);
    }
    let rates = rate_column(batch)?;

    let zeros: Vec<usize> = (0..rates.len()).filter(|&i| rates.value(i) == 0.0).collect();
    let ones: Vec<usize> = (0..rates.len()).filter(|&i| rates.value(i) == 1.0).collect();

    let mut keep = vec![true; rates.len()];
    let zero_dropped = drop_random(&zeros, keep_fraction, &mut keep, rng);
    let one_dropped = drop_random(&ones, keep_fraction, &mut keep, rng);
    debug!(
        zeros = zeros.len(),
        ones = ones.len(),
        zero_dropped,
        one_dropped,
        "sampled extremes"
    );

    let mask = BooleanArray::from(keep);
    Ok(Downsampled {
        batch: filter_record_batch(batch, &mask)?,
        zero_dropped,
        one_dropped,
    })
}

fn drop_random<R: Rng + ?Sized>(
    candidates: &[usize],
    keep_fraction: f64,
    keep: &mut [bool],
    rng: &mut R,
) -> usize {
    let amount = drop_count(candidates.len(), keep_fraction);
    for pick in index::sample(rng, candidates.len(), amount).iter() {
        keep[candidates[pick]] = false;
    }
    amount
}
