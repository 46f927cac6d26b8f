use anyhow::{anyhow, Result};
use arrow::{
    array::{ArrayRef, StringArray, UInt64Array},
    record_batch::RecordBatch,
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, instrument};

use crate::process::{raw_schema, state_column, u64_column, TOTAL, WIN};

/// Collapse the raw rows to one row per state, summing `win` and `total`.
#[instrument(level = "debug", skip_all, fields(rows = batch.num_rows()))]
pub fn aggregate_by_state(batch: &RecordBatch) -> Result<RecordBatch> {
    let states = state_column(batch)?;
    let wins = u64_column(batch, WIN)?;
    let totals = u64_column(batch, TOTAL)?;

    let mut sums: HashMap<&str, (u64, u64)> = HashMap::new();
    for i in 0..batch.num_rows() {
        let state = states.value(i);
        let entry = sums.entry(state).or_insert((0, 0));
        entry.0 = entry
            .0
            .checked_add(wins.value(i))
            .ok_or_else(|| anyhow!("win count overflow for state {}", state))?;
        entry.1 = entry
            .1
            .checked_add(totals.value(i))
            .ok_or_else(|| anyhow!("total count overflow for state {}", state))?;
    }

    let mut grouped: Vec<(&str, (u64, u64))> = sums.into_iter().collect();
    grouped.sort_by_cached_key(|(s, _)| state_sort_key(s));
    debug!(states = grouped.len(), "grouped");

    let state_arr: StringArray = grouped.iter().map(|(s, _)| Some(*s)).collect();
    let win_arr = UInt64Array::from_iter_values(grouped.iter().map(|(_, (w, _))| *w));
    let total_arr = UInt64Array::from_iter_values(grouped.iter().map(|(_, (_, t))| *t));

    RecordBatch::try_new(
        Arc::new(raw_schema()),
        vec![
            Arc::new(state_arr) as ArrayRef,
            Arc::new(win_arr) as ArrayRef,
            Arc::new(total_arr) as ArrayRef,
        ],
    )
    .map_err(Into::into)
}

/// Integer ids sort numerically and come first; anything else is lexical.
/// Ids with the same number ("7", "07") fall back to their text, so the order
/// is total and the same on every run.
pub fn state_sort_key(state: &str) -> (bool, u128, &str) {
    match state.parse::<u128>() {
        Ok(n) => (false, n, state),
        Err(_) => (true, 0, state),
    }
}
