pub mod aggregate;
pub mod collector;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod index;
pub mod planner;
pub mod reconcile;
pub mod retry;
pub mod source;

pub use aggregate::{Aggregator, SummaryRow, compute_means, refresh_summary};
pub use collector::{Collector, RunReport, UnitOutcome, UnitStats};
pub use config::{CrawlConfig, RetryConfig, RunConfig, UnitConfig, UnitFilter};
pub use dedupe::{CleanupPlan, CleanupReport, Sweeper, plan_cleanup};
pub use error::EngineError;
pub use index::PersistedIndex;
pub use planner::{BatchWriter, RowInterval, WritePlan, WriteSummary, compact_rows, delete_order};
pub use reconcile::{Classification, ReconcileContext, ReconcileStats};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use source::{FetchError, SourceAdapter};

/// Receives plain status lines for the caller to display. Lines arrive in
/// emission order and are never buffered or de-duplicated here.
pub type ProgressSink<'a> = dyn FnMut(&str) + 'a;
