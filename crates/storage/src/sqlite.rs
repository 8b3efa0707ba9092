use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Transaction};
use tracing::debug;

use crate::error::{StorageError, classify_sqlite};
use crate::traits::{CellWrite, Record, RowSpan, RowStore, StoreConnector};

fn encode_cells(cells: &[String]) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec(cells).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_cells(bytes: &[u8]) -> Result<Vec<String>, StorageError> {
    rmp_serde::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// A row store kept in one SQLite file. Each tab is a set of numbered rows
/// whose cells are stored as a MessagePack string vector.
pub struct SqliteRowStore {
    conn: Connection,
}

impl SqliteRowStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Number of stored rows in `tab`, header included.
    pub fn row_count(&self, tab: &str) -> Result<u32, StorageError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sheet_rows WHERE tab = ?1",
            rusqlite::params![tab],
            |row| row.get(0),
        )?;
        Ok(n as u32)
    }

    fn rows(&self, tab: &str) -> Result<Vec<(u32, Vec<String>)>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT row_num, cells FROM sheet_rows WHERE tab = ?1 ORDER BY row_num")?;
        let raw: Vec<(i64, Vec<u8>)> = stmt
            .query_map(rusqlite::params![tab], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(|(n, bytes)| Ok((n as u32, decode_cells(&bytes)?)))
            .collect()
    }
}

fn load_row(tx: &Transaction, tab: &str, row: u32) -> Result<Option<Vec<String>>, StorageError> {
    let bytes: Option<Vec<u8>> = tx
        .query_row(
            "SELECT cells FROM sheet_rows WHERE tab = ?1 AND row_num = ?2",
            rusqlite::params![tab, row as i64],
            |r| r.get(0),
        )
        .optional()?;
    bytes.map(|b| decode_cells(&b)).transpose()
}

fn store_row(tx: &Transaction, tab: &str, row: u32, cells: &[String]) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO sheet_rows (tab, row_num, cells) VALUES (?1, ?2, ?3)
         ON CONFLICT (tab, row_num) DO UPDATE SET cells = excluded.cells,
             updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)",
        rusqlite::params![tab, row as i64, encode_cells(cells)?],
    )
    .map_err(classify_sqlite)?;
    Ok(())
}

fn delete_span(tx: &Transaction, tab: &str, span: RowSpan) -> Result<(), StorageError> {
    // 0-based [start, end) is 1-based rows start+1 ..= end
    let first = span.start_index as i64 + 1;
    let last = span.end_index as i64;
    let shift = span.len() as i64;
    tx.execute(
        "DELETE FROM sheet_rows WHERE tab = ?1 AND row_num BETWEEN ?2 AND ?3",
        rusqlite::params![tab, first, last],
    )
    .map_err(classify_sqlite)?;
    tx.execute(
        "UPDATE sheet_rows SET row_num = -(row_num - ?2) WHERE tab = ?1 AND row_num > ?3",
        rusqlite::params![tab, shift, last],
    )
    .map_err(classify_sqlite)?;
    tx.execute(
        "UPDATE sheet_rows SET row_num = -row_num WHERE tab = ?1 AND row_num < 0",
        rusqlite::params![tab],
    )
    .map_err(classify_sqlite)?;
    Ok(())
}

impl RowStore for SqliteRowStore {
    fn header(&self, tab: &str) -> Result<Vec<String>, StorageError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT cells FROM sheet_rows WHERE tab = ?1 AND row_num = 1",
                rusqlite::params![tab],
                |r| r.get(0),
            )
            .optional()?;
        match bytes {
            Some(b) => decode_cells(&b),
            None => Ok(Vec::new()),
        }
    }

    fn read_all_records(&self, tab: &str) -> Result<Vec<Record>, StorageError> {
        let rows = self.rows(tab)?;
        let header = match rows.first() {
            Some((1, cells)) => cells.clone(),
            _ => return Ok(Vec::new()),
        };
        let records = rows
            .into_iter()
            .filter(|(n, _)| *n > 1)
            .map(|(n, cells)| {
                let values: BTreeMap<String, String> = header
                    .iter()
                    .enumerate()
                    .filter(|(_, key)| !key.is_empty())
                    .map(|(i, key)| (key.clone(), cells.get(i).cloned().unwrap_or_default()))
                    .collect();
                Record { row: n, values }
            })
            .collect();
        Ok(records)
    }

    fn read_all_values(&self, tab: &str) -> Result<Vec<Vec<String>>, StorageError> {
        // Gaps in row numbering read back as empty rows so positions stay aligned.
        let mut out: Vec<Vec<String>> = Vec::new();
        for (n, cells) in self.rows(tab)? {
            while out.len() + 1 < n as usize {
                out.push(Vec::new());
            }
            out.push(cells);
        }
        Ok(out)
    }

    fn read_column(&self, tab: &str, column: u32) -> Result<Vec<String>, StorageError> {
        if column == 0 {
            return Err(StorageError::InvalidRequest("column numbers are 1-based".into()));
        }
        let idx = column as usize - 1;
        Ok(self
            .read_all_values(tab)?
            .into_iter()
            .map(|cells| cells.get(idx).cloned().unwrap_or_default())
            .collect())
    }

    fn append_rows(&mut self, tab: &str, rows: &[Vec<String>]) -> Result<(), StorageError> {
        if rows.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction().map_err(classify_sqlite)?;
        let last: i64 = tx.query_row(
            "SELECT COALESCE(MAX(row_num), 0) FROM sheet_rows WHERE tab = ?1",
            rusqlite::params![tab],
            |r| r.get(0),
        )?;
        for (i, cells) in rows.iter().enumerate() {
            store_row(&tx, tab, (last as u32) + 1 + i as u32, cells)?;
        }
        tx.commit().map_err(classify_sqlite)?;
        debug!(tab, count = rows.len(), "appended rows");
        Ok(())
    }

    fn batch_update(&mut self, tab: &str, writes: &[CellWrite]) -> Result<(), StorageError> {
        if writes.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction().map_err(classify_sqlite)?;
        for write in writes {
            let mut cells = load_row(&tx, tab, write.cell.row)?.unwrap_or_default();
            let idx = write.cell.column as usize - 1;
            if cells.len() <= idx {
                cells.resize(idx + 1, String::new());
            }
            cells[idx] = write.value.clone();
            store_row(&tx, tab, write.cell.row, &cells)?;
        }
        tx.commit().map_err(classify_sqlite)?;
        debug!(tab, count = writes.len(), "updated cells");
        Ok(())
    }

    fn delete_row_spans(&mut self, tab: &str, spans: &[RowSpan]) -> Result<(), StorageError> {
        if let Some(bad) = spans.iter().find(|s| s.is_empty()) {
            return Err(StorageError::InvalidRequest(format!(
                "empty row span {}..{}",
                bad.start_index, bad.end_index
            )));
        }
        let tx = self.conn.transaction().map_err(classify_sqlite)?;
        for span in spans {
            delete_span(&tx, tab, *span)?;
        }
        tx.commit().map_err(classify_sqlite)?;
        debug!(tab, count = spans.len(), "deleted row spans");
        Ok(())
    }
}

/// Resolves store targets to SQLite files under one directory.
pub struct SqliteConnector {
    base_dir: PathBuf,
}

impl SqliteConnector {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn path_for(&self, target: &str) -> PathBuf {
        self.base_dir.join(target)
    }
}

impl StoreConnector for SqliteConnector {
    fn open(&mut self, target: &str) -> Result<Box<dyn RowStore>, StorageError> {
        if target.trim().is_empty() {
            return Err(StorageError::NotFound("empty store target".into()));
        }
        Ok(Box::new(SqliteRowStore::open(self.path_for(target))?))
    }
}
