use std::collections::BTreeMap;

use reviewsync_core::CellRef;

use crate::error::StorageError;

/// One data row read back as header-keyed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based row number; the header is row 1 so data starts at 2.
    pub row: u32,
    pub values: BTreeMap<String, String>,
}

impl Record {
    /// Value under `key`, or "" when the column or cell is absent.
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(|s| s.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    pub cell: CellRef,
    pub value: String,
}

/// 0-based half-open row range for structural deletes. Index 0 is the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowSpan {
    pub start_index: u32,
    pub end_index: u32,
}

impl RowSpan {
    pub fn len(&self) -> u32 {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Capability set of the remote row store. Rows and columns are 1-based
/// except in `delete_row_spans`, which takes 0-based half-open spans.
/// Every write method is atomic: it either applies fully or not at all.
pub trait RowStore {
    /// Values of row 1, trailing blanks included as stored.
    fn header(&self, tab: &str) -> Result<Vec<String>, StorageError>;

    /// All data rows keyed by the header.
    fn read_all_records(&self, tab: &str) -> Result<Vec<Record>, StorageError>;

    /// All rows, header first, as raw cell vectors.
    fn read_all_values(&self, tab: &str) -> Result<Vec<Vec<String>>, StorageError>;

    /// Cells of one 1-based column, header first. Missing cells read as "".
    fn read_column(&self, tab: &str, column: u32) -> Result<Vec<String>, StorageError>;

    fn append_rows(&mut self, tab: &str, rows: &[Vec<String>]) -> Result<(), StorageError>;

    fn batch_update(&mut self, tab: &str, writes: &[CellWrite]) -> Result<(), StorageError>;

    /// Delete each span in the given order. Later spans see row indices as
    /// already shifted by earlier ones.
    fn delete_row_spans(&mut self, tab: &str, spans: &[RowSpan]) -> Result<(), StorageError>;
}

/// Opens the store behind a unit's target id.
pub trait StoreConnector {
    fn open(&mut self, target: &str) -> Result<Box<dyn RowStore>, StorageError>;
}
