use anyhow::{bail, Result};
use arrow::{
    array::{ArrayRef, BooleanArray, Float64Array},
    compute::filter_record_batch,
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::warn;

use crate::{
    config::ZeroTotal,
    process::{rated_schema, state_column, u64_column, TOTAL, WIN},
};

/// Aggregated table with the `rate` column appended.
#[derive(Debug)]
pub struct Rated {
    pub batch: RecordBatch,
    pub zero_total_skipped: usize,
}

/// Append `rate = win / total`. A state with no playouts has no rate; what
/// happens to it is decided by `policy`.
pub fn derive_rate(batch: &RecordBatch, policy: ZeroTotal) -> Result<Rated> {
    let totals = u64_column(batch, TOTAL)?;

    let zero_rows: Vec<usize> = (0..batch.num_rows())
        .filter(|&i| totals.value(i) == 0)
        .collect();

    let (batch, zero_total_skipped) = match (zero_rows.first(), policy) {
        (None, _) => (batch.clone(), 0),
        (Some(&first), ZeroTotal::Error) => {
            let states = state_column(batch)?;
            bail!(
                "state {} has a total of 0, cannot compute its win rate ({} such states)",
                states.value(first),
                zero_rows.len()
            );
        }
        (Some(_), ZeroTotal::Skip) => {
            warn!(skipped = zero_rows.len(), "dropping states with a total of 0");
            let keep: BooleanArray = totals.iter().map(|t| Some(t != Some(0))).collect();
            (filter_record_batch(batch, &keep)?, zero_rows.len())
        }
    };

    let wins = u64_column(&batch, WIN)?;
    let totals = u64_column(&batch, TOTAL)?;
    let rates = Float64Array::from_iter_values(
        wins.values()
            .iter()
            .zip(totals.values().iter())
            .map(|(&w, &t)| w as f64 / t as f64),
    );

    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns.push(Arc::new(rates));
    let batch = RecordBatch::try_new(Arc::new(rated_schema()), columns)?;

    Ok(Rated {
        batch,
        zero_total_skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{rate_column, stats_batch};

    #[test]
    fn rate_is_win_over_total() -> Result<()> {
        let rated = derive_rate(
            &stats_batch(&[("A", 10, 20), ("B", 5, 10), ("C", 1, 3), ("D", 0, 7)]),
            ZeroTotal::Error,
        )?;
        let rates = rate_column(&rated.batch)?;
        assert_eq!(rates.value(0), 0.5);
        assert_eq!(rates.value(1), 0.5);
        assert!((rates.value(2) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(rates.value(3), 0.0);
        assert_eq!(rated.zero_total_skipped, 0);
        Ok(())
    }

    #[test]
    fn zero_total_errors_with_state_name() {
        let err = derive_rate(&stats_batch(&[("A", 1, 2), ("B", 0, 0)]), ZeroTotal::Error)
            .unwrap_err();
        assert!(err.to_string().contains("state B"));
    }

    #[test]
    fn zero_total_skip_drops_row() -> Result<()> {
        let rated = derive_rate(
            &stats_batch(&[("A", 1, 2), ("B", 0, 0), ("C", 3, 3)]),
            ZeroTotal::Skip,
        )?;
        assert_eq!(rated.zero_total_skipped, 1);
        assert_eq!(rated.batch.num_rows(), 2);
        let states = state_column(&rated.batch)?;
        assert_eq!(states.value(0), "A");
        assert_eq!(states.value(1), "C");
        assert_eq!(rate_column(&rated.batch)?.value(1), 1.0);
        Ok(())
    }
}
