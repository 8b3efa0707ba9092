//! Batch Write Planner: turns a unit's pending operations into as few store
//! calls as possible, in an order that keeps row numbers valid.
//!
//! Order of execution:
//! 1. every `CellUpdate` in one batched update call,
//! 2. every `RowRangeDelete`, merged into contiguous intervals and issued
//!    highest interval first, in chunks of at most `delete_chunk_size`,
//! 3. every `Insert` in one append call.
//!
//! Deleting from the bottom up is what keeps the remaining intervals
//! addressable: removing rows only shifts rows below it, and every interval
//! not yet executed lies above.

use reviewsync_core::{CoreError, PendingOp};
use reviewsync_storage::{CellWrite, RowSpan, RowStore};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::retry::{RetryPolicy, Sleeper};

pub const DEFAULT_DELETE_CHUNK: usize = 50;

/// Closed interval of 1-based row numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowInterval {
    pub first: u32,
    pub last: u32,
}

impl RowInterval {
    /// The same rows as a 0-based half-open span.
    pub fn to_span(&self) -> RowSpan {
        RowSpan {
            start_index: self.first - 1,
            end_index: self.last,
        }
    }

    pub fn len(&self) -> u32 {
        self.last - self.first + 1
    }
}

/// Sort, de-duplicate, and merge row numbers into maximal closed intervals,
/// ascending.
pub fn compact_rows(rows: &[u32]) -> Vec<RowInterval> {
    merge_intervals(rows.iter().map(|&row| RowInterval { first: row, last: row }).collect())
}

/// Merge overlapping or adjacent intervals, ascending.
pub fn merge_intervals(mut intervals: Vec<RowInterval>) -> Vec<RowInterval> {
    intervals.sort_unstable();
    let mut out: Vec<RowInterval> = Vec::with_capacity(intervals.len());
    for iv in intervals {
        match out.last_mut() {
            Some(prev) if iv.first <= prev.last.saturating_add(1) => prev.last = prev.last.max(iv.last),
            _ => out.push(iv),
        }
    }
    out
}

/// Delete spans in execution order: descending start index.
pub fn delete_order(intervals: &[RowInterval]) -> Vec<RowSpan> {
    let mut ordered = intervals.to_vec();
    ordered.sort_by(|a, b| b.first.cmp(&a.first));
    ordered.iter().map(RowInterval::to_span).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritePlan {
    pub updates: Vec<CellWrite>,
    pub inserts: Vec<Vec<String>>,
    pub deletes: Vec<RowInterval>,
}

impl WritePlan {
    /// Partition and compact. The header row can never be deleted.
    pub fn from_ops(ops: Vec<PendingOp>) -> Result<Self, EngineError> {
        let mut plan = Self::default();
        let mut ranges = Vec::new();
        for op in ops {
            match op {
                PendingOp::CellUpdate { cell, value } => plan.updates.push(CellWrite { cell, value }),
                PendingOp::Insert { values } => plan.inserts.push(values),
                PendingOp::RowRangeDelete {
                    start_row,
                    end_row_exclusive,
                } => {
                    if start_row < 2 {
                        return Err(CoreError::InvalidOperation(format!(
                            "row range {start_row}..{end_row_exclusive} touches the header row"
                        ))
                        .into());
                    }
                    if end_row_exclusive > start_row {
                        ranges.push(RowInterval {
                            first: start_row,
                            last: end_row_exclusive - 1,
                        });
                    }
                }
            }
        }
        plan.deletes = merge_intervals(ranges);
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty() && self.deletes.is_empty()
    }

    pub fn rows_to_delete(&self) -> u32 {
        self.deletes.iter().map(RowInterval::len).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub cells_updated: usize,
    pub rows_appended: usize,
    pub rows_deleted: u32,
    pub calls: usize,
}

/// Issues plans against a store with bounded retry on quota rejection.
pub struct BatchWriter<'a> {
    write_policy: RetryPolicy,
    delete_policy: RetryPolicy,
    delete_chunk_size: usize,
    sleeper: &'a dyn Sleeper,
}

impl<'a> BatchWriter<'a> {
    pub fn new(write_policy: RetryPolicy, delete_policy: RetryPolicy, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            write_policy,
            delete_policy,
            delete_chunk_size: DEFAULT_DELETE_CHUNK,
            sleeper,
        }
    }

    pub fn with_delete_chunk_size(mut self, size: usize) -> Self {
        self.delete_chunk_size = size.max(1);
        self
    }

    pub fn execute(
        &self,
        store: &mut dyn RowStore,
        tab: &str,
        plan: &WritePlan,
    ) -> Result<WriteSummary, EngineError> {
        let mut summary = WriteSummary::default();

        if !plan.updates.is_empty() {
            self.update_cells(store, tab, &plan.updates)?;
            summary.cells_updated = plan.updates.len();
            summary.calls += 1;
        }

        if !plan.deletes.is_empty() {
            summary.calls += self.delete_intervals(store, tab, &plan.deletes)?;
            summary.rows_deleted = plan.rows_to_delete();
        }

        if !plan.inserts.is_empty() {
            self.append_rows(store, tab, &plan.inserts)?;
            summary.rows_appended = plan.inserts.len();
            summary.calls += 1;
        }

        if summary.calls > 0 {
            info!(
                tab,
                updated = summary.cells_updated,
                deleted = summary.rows_deleted,
                appended = summary.rows_appended,
                calls = summary.calls,
                "write plan applied"
            );
        }
        Ok(summary)
    }

    pub fn update_cells(
        &self,
        store: &mut dyn RowStore,
        tab: &str,
        writes: &[CellWrite],
    ) -> Result<(), EngineError> {
        self.write_policy
            .run(self.sleeper, "batch_update", || store.batch_update(tab, writes))
    }

    pub fn append_rows(
        &self,
        store: &mut dyn RowStore,
        tab: &str,
        rows: &[Vec<String>],
    ) -> Result<(), EngineError> {
        self.write_policy
            .run(self.sleeper, "append_rows", || store.append_rows(tab, rows))
    }

    /// Returns the number of store calls made.
    pub fn delete_intervals(
        &self,
        store: &mut dyn RowStore,
        tab: &str,
        intervals: &[RowInterval],
    ) -> Result<usize, EngineError> {
        let spans = delete_order(intervals);
        let mut calls = 0;
        for chunk in spans.chunks(self.delete_chunk_size) {
            debug!(tab, spans = chunk.len(), "deleting row spans");
            self.delete_policy
                .run(self.sleeper, "delete_row_spans", || store.delete_row_spans(tab, chunk))?;
            calls += 1;
        }
        Ok(calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewsync_core::CellRef;
    use reviewsync_storage::SqliteRowStore;
    use std::time::Duration;

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    fn iv(first: u32, last: u32) -> RowInterval {
        RowInterval { first, last }
    }

    #[test]
    fn rows_compact_into_closed_intervals() {
        let intervals = compact_rows(&[15, 4, 3, 10, 5, 9]);
        assert_eq!(intervals, vec![iv(3, 5), iv(9, 10), iv(15, 15)]);
    }

    #[test]
    fn deletes_run_from_the_bottom_up() {
        let spans = delete_order(&compact_rows(&[3, 4, 5, 9, 10, 15]));
        assert_eq!(
            spans,
            vec![
                RowSpan { start_index: 14, end_index: 15 },
                RowSpan { start_index: 8, end_index: 10 },
                RowSpan { start_index: 2, end_index: 5 },
            ]
        );
    }

    #[test]
    fn compact_handles_duplicates_and_empty() {
        assert!(compact_rows(&[]).is_empty());
        assert_eq!(compact_rows(&[7, 7, 8]), vec![iv(7, 8)]);
    }

    #[test]
    fn plan_partitions_ops() {
        let ops = vec![
            PendingOp::Insert { values: vec!["a".into()] },
            PendingOp::cell_update(4, 4, "d").unwrap(),
            PendingOp::row_range_delete(9, 11).unwrap(),
            PendingOp::row_range_delete(11, 12).unwrap(),
            PendingOp::Insert { values: vec!["b".into()] },
        ];
        let plan = WritePlan::from_ops(ops).unwrap();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.inserts, vec![vec!["a".to_string()], vec!["b".to_string()]]);
        assert_eq!(plan.deletes, vec![iv(9, 11)]);
        assert_eq!(plan.rows_to_delete(), 3);
    }

    #[test]
    fn delete_ranges_merge_without_expanding() {
        let ops = vec![
            PendingOp::row_range_delete(10, 20).unwrap(),
            PendingOp::row_range_delete(2, 4_000_000_000).unwrap(),
            PendingOp::row_range_delete(4_000_000_000, 4_000_000_002).unwrap(),
            PendingOp::row_range_delete(4_000_000_005, 4_000_000_006).unwrap(),
        ];
        let plan = WritePlan::from_ops(ops).unwrap();
        assert_eq!(plan.deletes, vec![iv(2, 4_000_000_001), iv(4_000_000_005, 4_000_000_005)]);
        assert_eq!(plan.rows_to_delete(), 4_000_000_001);
    }

    #[test]
    fn header_row_delete_rejected() {
        let ops = vec![PendingOp::row_range_delete(1, 3).unwrap()];
        assert!(matches!(WritePlan::from_ops(ops), Err(EngineError::Core(_))));
    }

    #[test]
    fn descending_deletes_remove_exactly_the_targets() {
        let mut store = SqliteRowStore::open_in_memory().unwrap();
        let rows: Vec<Vec<String>> = (1..=16).map(|i| vec![format!("r{i}")]).collect();
        store.append_rows("t", &rows).unwrap();

        let targets = [3, 4, 5, 9, 10, 15];
        let ops = targets
            .iter()
            .map(|r| PendingOp::row_range_delete(*r, r + 1).unwrap())
            .collect();
        let plan = WritePlan::from_ops(ops).unwrap();
        let writer = BatchWriter::new(RetryPolicy::default(), RetryPolicy::default(), &NoSleep)
            .with_delete_chunk_size(2);
        let summary = writer.execute(&mut store, "t", &plan).unwrap();
        assert_eq!(summary.rows_deleted, 6);
        assert_eq!(summary.calls, 2);

        let remaining = store.read_column("t", 1).unwrap();
        let expected: Vec<String> = (1..=16)
            .filter(|i| !targets.contains(i))
            .map(|i| format!("r{i}"))
            .collect();
        assert_eq!(remaining, expected);
    }

    #[test]
    fn updates_land_before_rows_shift() {
        let mut store = SqliteRowStore::open_in_memory().unwrap();
        let rows: Vec<Vec<String>> = (1..=5).map(|i| vec![format!("r{i}"), String::new()]).collect();
        store.append_rows("t", &rows).unwrap();

        let plan = WritePlan::from_ops(vec![
            PendingOp::Insert { values: vec!["new".into(), String::new()] },
            PendingOp::row_range_delete(2, 3).unwrap(),
            PendingOp::CellUpdate { cell: CellRef::new(4, 2).unwrap(), value: "touched".into() },
        ])
        .unwrap();
        let writer = BatchWriter::new(RetryPolicy::default(), RetryPolicy::default(), &NoSleep);
        writer.execute(&mut store, "t", &plan).unwrap();

        let values = store.read_all_values("t").unwrap();
        let firsts: Vec<&str> = values.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(firsts, vec!["r1", "r3", "r4", "r5", "new"]);
        assert_eq!(values[2][1], "touched");
    }
}
