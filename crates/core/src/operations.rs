use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// 1-based cell coordinate in a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub row: u32,
    pub column: u32,
}

impl CellRef {
    pub fn new(row: u32, column: u32) -> Result<Self, CoreError> {
        if row == 0 || column == 0 {
            return Err(CoreError::InvalidOperation(format!(
                "cell coordinates are 1-based, got row {row} column {column}"
            )));
        }
        Ok(Self { row, column })
    }

    /// A1 notation, e.g. row 3 column 28 is `AB3`.
    pub fn a1(&self) -> String {
        let mut letters = Vec::new();
        let mut n = self.column;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        let col: String = letters.into_iter().rev().collect();
        format!("{col}{}", self.row)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.a1())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingOp {
    /// Append a full row.
    Insert { values: Vec<String> },
    /// Overwrite one cell of an existing row.
    CellUpdate { cell: CellRef, value: String },
    /// Remove 1-based rows `start_row..end_row_exclusive`.
    RowRangeDelete { start_row: u32, end_row_exclusive: u32 },
}

impl PendingOp {
    pub fn cell_update(row: u32, column: u32, value: impl Into<String>) -> Result<Self, CoreError> {
        Ok(Self::CellUpdate {
            cell: CellRef::new(row, column)?,
            value: value.into(),
        })
    }

    pub fn row_range_delete(start_row: u32, end_row_exclusive: u32) -> Result<Self, CoreError> {
        if start_row == 0 || end_row_exclusive <= start_row {
            return Err(CoreError::InvalidOperation(format!(
                "empty or invalid row range {start_row}..{end_row_exclusive}"
            )));
        }
        Ok(Self::RowRangeDelete {
            start_row,
            end_row_exclusive,
        })
    }
}
