use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use reviewsync_engine::Sleeper;
use reviewsync_storage::{
    CellWrite, Record, RowSpan, RowStore, SqliteConnector, SqliteRowStore, StorageError, StoreConnector,
};
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WriteKind {
    Append,
    Update,
    Delete,
}

#[derive(Default)]
struct FaultState {
    /// Rejections still to hand out per kind; `u32::MAX` never runs out.
    rejections: BTreeMap<WriteKind, u32>,
    calls: BTreeMap<WriteKind, u32>,
}

/// Shared switchboard for injected quota rejections. Clones observe and
/// steer the same state, so a test keeps one while the store owns another.
#[derive(Clone, Default)]
pub struct FaultHandle(Rc<RefCell<FaultState>>);

impl FaultHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `times` calls of `kind`.
    pub fn reject(&self, kind: WriteKind, times: u32) {
        self.0.borrow_mut().rejections.insert(kind, times);
    }

    pub fn reject_always(&self, kind: WriteKind) {
        self.reject(kind, u32::MAX);
    }

    pub fn clear(&self) {
        self.0.borrow_mut().rejections.clear();
    }

    /// Calls attempted for `kind`, rejected ones included.
    pub fn calls(&self, kind: WriteKind) -> u32 {
        self.0.borrow().calls.get(&kind).copied().unwrap_or(0)
    }

    fn attempt(&self, kind: WriteKind) -> Result<(), StorageError> {
        let mut state = self.0.borrow_mut();
        *state.calls.entry(kind).or_insert(0) += 1;
        match state.rejections.get_mut(&kind) {
            Some(left) if *left > 0 => {
                if *left != u32::MAX {
                    *left -= 1;
                }
                Err(StorageError::RateLimited(format!("429: quota exceeded for {kind:?}")))
            }
            _ => Ok(()),
        }
    }
}

/// Wraps a store and rejects writes as the fault handle dictates.
pub struct FlakyStore {
    inner: Box<dyn RowStore>,
    faults: FaultHandle,
}

impl FlakyStore {
    pub fn new(inner: Box<dyn RowStore>, faults: FaultHandle) -> Self {
        Self { inner, faults }
    }
}

impl RowStore for FlakyStore {
    fn header(&self, tab: &str) -> Result<Vec<String>, StorageError> {
        self.inner.header(tab)
    }

    fn read_all_records(&self, tab: &str) -> Result<Vec<Record>, StorageError> {
        self.inner.read_all_records(tab)
    }

    fn read_all_values(&self, tab: &str) -> Result<Vec<Vec<String>>, StorageError> {
        self.inner.read_all_values(tab)
    }

    fn read_column(&self, tab: &str, column: u32) -> Result<Vec<String>, StorageError> {
        self.inner.read_column(tab, column)
    }

    fn append_rows(&mut self, tab: &str, rows: &[Vec<String>]) -> Result<(), StorageError> {
        self.faults.attempt(WriteKind::Append)?;
        self.inner.append_rows(tab, rows)
    }

    fn batch_update(&mut self, tab: &str, writes: &[CellWrite]) -> Result<(), StorageError> {
        self.faults.attempt(WriteKind::Update)?;
        self.inner.batch_update(tab, writes)
    }

    fn delete_row_spans(&mut self, tab: &str, spans: &[RowSpan]) -> Result<(), StorageError> {
        self.faults.attempt(WriteKind::Delete)?;
        self.inner.delete_row_spans(tab, spans)
    }
}

/// Connector whose stores all share one fault handle.
pub struct FlakyConnector<C> {
    inner: C,
    faults: FaultHandle,
}

impl<C: StoreConnector> FlakyConnector<C> {
    pub fn new(inner: C, faults: FaultHandle) -> Self {
        Self { inner, faults }
    }
}

impl<C: StoreConnector> StoreConnector for FlakyConnector<C> {
    fn open(&mut self, target: &str) -> Result<Box<dyn RowStore>, StorageError> {
        let store = self.inner.open(target)?;
        Ok(Box::new(FlakyStore::new(store, self.faults.clone())))
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Clone, Default)]
pub struct RecordingSleeper(Rc<RefCell<Vec<Duration>>>);

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.0.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.0.borrow_mut().push(duration);
    }
}

/// SQLite store files in a temporary directory, removed on drop.
pub struct TempStores {
    dir: TempDir,
}

impl TempStores {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self { dir: TempDir::new()? })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn connector(&self) -> SqliteConnector {
        SqliteConnector::new(self.dir.path())
    }

    /// Direct handle on a target's store, for seeding and inspection.
    pub fn open(&self, target: &str) -> Result<SqliteRowStore, StorageError> {
        SqliteRowStore::open(self.dir.path().join(target))
    }
}
