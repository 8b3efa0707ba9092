use std::collections::{HashMap, HashSet};

use reviewsync_core::identity::soft_key_from_cells;
use reviewsync_core::layout::ReviewColumn;
use reviewsync_core::{Fingerprint, Platform};
use reviewsync_storage::Record;
use tracing::warn;

/// Where the row holding a soft key lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSlot {
    /// Already committed at this 1-based row.
    Persisted(u32),
    /// Decided this run; position of its Insert in the pending op list.
    Pending(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftEntry {
    pub slot: RowSlot,
    pub date: String,
    pub year: String,
}

/// In-memory projection of one unit's committed rows. Built once per unit
/// and never written back.
#[derive(Debug, Default)]
pub struct PersistedIndex {
    exact: HashSet<Fingerprint>,
    soft: HashMap<Fingerprint, SoftEntry>,
}

impl PersistedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project stored records. When several rows share a soft key the
    /// earliest row wins, matching the row the cleanup sweep keeps.
    pub fn from_records(records: &[Record]) -> Self {
        let mut index = Self::new();
        for record in records {
            let uid = record.get(ReviewColumn::Uid.name()).trim();
            if !uid.is_empty() {
                match uid.parse::<Fingerprint>() {
                    Ok(fp) => {
                        index.exact.insert(fp);
                    }
                    Err(_) => warn!(row = record.row, uid, "ignoring unparsable uid"),
                }
            }

            let url = record.get(ReviewColumn::Url.name());
            let mut platform = record.get(ReviewColumn::Platform.name()).trim().to_string();
            if platform.is_empty() {
                if let Some(p) = Platform::detect_from_url(url) {
                    platform = p.as_str().to_string();
                }
            }
            let sk = soft_key_from_cells(
                &platform,
                record.get(ReviewColumn::Reviewer.name()),
                record.get(ReviewColumn::Text.name()),
            );
            index.soft.entry(sk).or_insert_with(|| SoftEntry {
                slot: RowSlot::Persisted(record.row),
                date: record.get(ReviewColumn::Date.name()).to_string(),
                year: record.get(ReviewColumn::Year.name()).to_string(),
            });
        }
        index
    }

    pub fn contains_exact(&self, key: &Fingerprint) -> bool {
        self.exact.contains(key)
    }

    pub fn soft_entry(&self, key: &Fingerprint) -> Option<&SoftEntry> {
        self.soft.get(key)
    }

    pub(crate) fn soft_entry_mut(&mut self, key: &Fingerprint) -> Option<&mut SoftEntry> {
        self.soft.get_mut(key)
    }

    pub(crate) fn register(&mut self, exact: Fingerprint, soft: Fingerprint, entry: SoftEntry) {
        self.exact.insert(exact);
        self.soft.insert(soft, entry);
    }

    pub fn exact_len(&self) -> usize {
        self.exact.len()
    }

    pub fn soft_len(&self) -> usize {
        self.soft.len()
    }
}
