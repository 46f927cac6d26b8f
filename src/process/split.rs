use anyhow::{bail, Result};
use arrow::{array::UInt32Array, compute::take_record_batch, record_batch::RecordBatch};
use rand::{seq::SliceRandom, Rng};

/// Shuffle the rows and cut off `valid_fraction` of them as a validation set.
/// Returns `(train, valid)`.
pub fn split_train_valid<R: Rng + ?Sized>(
    batch: &RecordBatch,
    valid_fraction: f64,
    rng: &mut R,
) -> Result<(RecordBatch, RecordBatch)> {
    if !(0.0..=1.0).contains(&valid_fraction) {
        bail!("valid_fraction must be within [0, 1], got {}", valid_fraction);
    }
    let n = batch.num_rows();
    let mut order: Vec<u32> = (0..n as u32).collect();
    order.shuffle(rng);

    let n_valid = ((n as f64 * valid_fraction).round() as usize).min(n);
    let (valid_idx, train_idx) = order.split_at(n_valid);

    let mut train_idx = train_idx.to_vec();
    let mut valid_idx = valid_idx.to_vec();
    train_idx.sort_unstable();
    valid_idx.sort_unstable();

    let train = take_record_batch(batch, &UInt32Array::from(train_idx))?;
    let valid = take_record_batch(batch, &UInt32Array::from(valid_idx))?;
    Ok((train, valid))
}
