//! Reconciliation Engine: classify incoming reviews against a unit's index.

use std::collections::HashSet;

use reviewsync_core::layout::ReviewColumn;
use reviewsync_core::{Fingerprint, PendingOp, Review};
use tracing::debug;

use crate::error::EngineError;
use crate::index::{PersistedIndex, RowSlot, SoftEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Exact occurrence already stored or already seen this run.
    Unchanged,
    /// Update candidate: known content under another occurrence, whose date
    /// and year bring nothing new. No operation emitted.
    Known,
    /// Known content with a newer date or year; cell updates emitted for `row`.
    Updated { row: u32 },
    /// Known content first inserted earlier in this run; the pending Insert
    /// was amended in place.
    Merged,
    /// Unknown content; an Insert was emitted.
    New,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub seen: usize,
    pub new: usize,
    pub updated: usize,
    pub unique: usize,
}

/// Per-unit mutable state: the index plus the operations decided so far.
/// Created fresh for each unit and dropped when the unit ends.
pub struct ReconcileContext {
    index: PersistedIndex,
    ops: Vec<PendingOp>,
    run_soft_seen: HashSet<Fingerprint>,
    seen: usize,
    new: usize,
    updated: usize,
}

impl ReconcileContext {
    pub fn new(index: PersistedIndex) -> Self {
        Self {
            index,
            ops: Vec::new(),
            run_soft_seen: HashSet::new(),
            seen: 0,
            new: 0,
            updated: 0,
        }
    }

    pub fn index(&self) -> &PersistedIndex {
        &self.index
    }

    pub fn ops(&self) -> &[PendingOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<PendingOp> {
        self.ops
    }

    pub fn stats(&self) -> ReconcileStats {
        ReconcileStats {
            seen: self.seen,
            new: self.new,
            updated: self.updated,
            unique: self.run_soft_seen.len(),
        }
    }

    pub fn reconcile(&mut self, review: &Review) -> Result<Classification, EngineError> {
        self.seen += 1;
        let soft = review.soft_key();
        self.run_soft_seen.insert(soft);

        if self.index.contains_exact(&review.exact_key()) {
            return Ok(Classification::Unchanged);
        }

        if let Some(entry) = self.index.soft_entry_mut(&soft) {
            return reconcile_known(entry, &mut self.ops, &mut self.updated, review);
        }

        let position = self.ops.len();
        self.ops.push(PendingOp::Insert {
            values: review.to_row(),
        });
        self.index.register(
            review.exact_key(),
            soft,
            SoftEntry {
                slot: RowSlot::Pending(position),
                date: review.date().to_string(),
                year: review.year().to_string(),
            },
        );
        self.new += 1;
        Ok(Classification::New)
    }
}

fn reconcile_known(
    entry: &mut SoftEntry,
    ops: &mut Vec<PendingOp>,
    updated: &mut usize,
    review: &Review,
) -> Result<Classification, EngineError> {
    let (date, year) = (review.date(), review.year());
    let date_changed = !date.is_empty() && date != entry.date;
    let year_changed = !year.is_empty() && year != entry.year;
    if !date_changed && !year_changed {
        return Ok(Classification::Known);
    }
    // an empty incoming value keeps the stored one
    if date_changed {
        entry.date = date.to_string();
    }
    if year_changed {
        entry.year = year.to_string();
    }

    match entry.slot {
        RowSlot::Persisted(row) => {
            debug!(row, date = %entry.date, year = %entry.year, "date/year update");
            ops.push(PendingOp::cell_update(row, ReviewColumn::Date.number(), entry.date.clone())?);
            ops.push(PendingOp::cell_update(row, ReviewColumn::Year.number(), entry.year.clone())?);
            *updated += 1;
            Ok(Classification::Updated { row })
        }
        RowSlot::Pending(position) => {
            if let Some(PendingOp::Insert { values }) = ops.get_mut(position) {
                set_cell(values, ReviewColumn::Date, &entry.date);
                set_cell(values, ReviewColumn::Year, &entry.year);
            }
            Ok(Classification::Merged)
        }
    }
}

fn set_cell(values: &mut [String], column: ReviewColumn, value: &str) {
    if let Some(cell) = values.get_mut(column.number() as usize - 1) {
        *cell = value.to_string();
    }
}
