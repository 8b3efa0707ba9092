//! Unit pipeline: fetch every source of a unit, normalize, reconcile against
//! the unit's committed rows, then write the resulting plan.

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;
use rand::Rng;
use reviewsync_core::layout::REVIEW_HEADER;
use reviewsync_core::{CellRef, Normalizer, RunId};
use reviewsync_storage::{CellWrite, RowStore, StoreConnector};
use tracing::{info, info_span, warn};

use crate::config::{RunConfig, UnitConfig, UnitFilter};
use crate::error::EngineError;
use crate::index::PersistedIndex;
use crate::planner::{BatchWriter, WritePlan, WriteSummary};
use crate::reconcile::ReconcileContext;
use crate::retry::{Sleeper, ThreadSleeper};
use crate::source::{source_host, SourceAdapter};
use crate::ProgressSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitStats {
    /// Reviews read across all sources, after per-page de-duplication.
    pub raw: usize,
    /// Distinct soft keys seen this run.
    pub unique: usize,
    pub new: usize,
    pub updated: usize,
    pub sources_failed: usize,
    pub write: WriteSummary,
}

#[derive(Debug)]
pub enum UnitOutcome {
    Completed(UnitStats),
    /// Unit configuration incomplete; nothing was read or written.
    Skipped(String),
    /// The unit raised; none of its planned operations were submitted.
    Failed(EngineError),
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub units: Vec<(String, UnitOutcome)>,
}

impl RunReport {
    pub fn outcome(&self, unit: &str) -> Option<&UnitOutcome> {
        self.units.iter().find(|(name, _)| name == unit).map(|(_, o)| o)
    }

    pub fn completed(&self) -> usize {
        self.units
            .iter()
            .filter(|(_, o)| matches!(o, UnitOutcome::Completed(_)))
            .count()
    }
}

/// Write the review header into an empty tab. A tab whose header differs
/// cannot be addressed by column number and is rejected.
pub fn ensure_review_header(
    store: &mut dyn RowStore,
    tab: &str,
    writer: &BatchWriter<'_>,
) -> Result<(), EngineError> {
    let header = store.header(tab)?;
    if header.iter().all(|h| h.trim().is_empty()) {
        let row: Vec<String> = REVIEW_HEADER.iter().map(|s| s.to_string()).collect();
        if header.is_empty() {
            writer.append_rows(store, tab, &[row])?;
        } else {
            let writes = row
                .into_iter()
                .enumerate()
                .map(|(i, value)| {
                    Ok(CellWrite {
                        cell: CellRef::new(1, i as u32 + 1)?,
                        value,
                    })
                })
                .collect::<Result<Vec<_>, EngineError>>()?;
            writer.update_cells(store, tab, &writes)?;
        }
        info!(tab, "review header written");
        return Ok(());
    }
    let matches = header.len() >= REVIEW_HEADER.len()
        && header.iter().zip(REVIEW_HEADER).all(|(h, want)| h.trim() == want);
    if !matches {
        return Err(EngineError::Config(format!(
            "review tab {tab:?} has an unexpected header: {header:?}"
        )));
    }
    Ok(())
}

pub struct Collector {
    config: RunConfig,
    connector: Box<dyn StoreConnector>,
    adapters: Vec<Box<dyn SourceAdapter>>,
    sleeper: Box<dyn Sleeper>,
    today: NaiveDate,
    stop_on_failure: bool,
}

impl Collector {
    pub fn new(config: RunConfig, connector: Box<dyn StoreConnector>) -> Self {
        Self {
            config,
            connector,
            adapters: Vec::new(),
            sleeper: Box::new(ThreadSleeper),
            today: chrono::Local::now().date_naive(),
            stop_on_failure: false,
        }
    }

    /// Adapters are consulted in registration order; the first that handles
    /// a source fetches it.
    pub fn with_adapter(mut self, adapter: Box<dyn SourceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn run(&mut self, filter: &UnitFilter, sink: &mut ProgressSink<'_>) -> RunReport {
        let run_id = RunId::new();
        let _span = info_span!("collect", run = %run_id).entered();
        let mut report = RunReport {
            run_id,
            units: Vec::new(),
        };

        let selected: Vec<UnitConfig> = self.config.select(filter).into_iter().cloned().collect();
        if selected.is_empty() {
            warn!(%filter, "no unit selected");
            sink(&format!("No unit selected for filter {filter}"));
            return report;
        }
        let names: Vec<&str> = selected.iter().map(|u| u.name.as_str()).collect();
        sink(&format!("Filter: {filter} | units: {}", names.join(", ")));

        for unit in &selected {
            let outcome = match self.run_unit(unit, sink) {
                Ok(stats) => UnitOutcome::Completed(stats),
                Err(EngineError::Config(reason)) => {
                    warn!(unit = %unit.name, %reason, "unit skipped");
                    sink(&format!("{} -> skipped: {reason}", unit.name));
                    UnitOutcome::Skipped(reason)
                }
                Err(e) => {
                    warn!(unit = %unit.name, error = %e, "unit failed");
                    sink(&format!("{} -> failed: {e}", unit.name));
                    UnitOutcome::Failed(e)
                }
            };
            let stop = self.stop_on_failure && matches!(outcome, UnitOutcome::Failed(_));
            report.units.push((unit.name.clone(), outcome));
            if stop {
                sink("Stopping after failure");
                break;
            }
        }

        sink(&format!(
            "Collection finished: {}/{} unit(s) completed",
            report.completed(),
            report.units.len()
        ));
        report
    }

    pub fn run_unit(&mut self, unit: &UnitConfig, sink: &mut ProgressSink<'_>) -> Result<UnitStats, EngineError> {
        unit.validate_for_collection()?;
        let _span = info_span!("unit", unit = %unit.name).entered();
        info!("collecting");
        sink(&format!("Collecting {}", unit.name));

        let tab = self.config.review_tab.as_str();
        let writer = BatchWriter::new(
            self.config.write_retry.policy(),
            self.config.delete_retry.policy(),
            self.sleeper.as_ref(),
        )
        .with_delete_chunk_size(self.config.delete_chunk_size);

        let mut store = self.connector.open(&unit.store)?;
        ensure_review_header(store.as_mut(), tab, &writer)?;
        let records = store.read_all_records(tab)?;
        let mut ctx = ReconcileContext::new(PersistedIndex::from_records(&records));

        let sources: Vec<&str> = unit
            .sources
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        let total = sources.len();
        let mut sources_failed = 0;
        let mut last_host: Option<&str> = None;

        for (i, source) in sources.iter().copied().enumerate() {
            sink(&format!("PROGRESS {}/{}", i + 1, total));

            let host = source_host(source);
            if last_host == Some(host) {
                let pause = crawl_pause(self.config.crawl.delay_ms, self.config.crawl.jitter_ms);
                self.sleeper.sleep(pause);
            }
            last_host = Some(host);

            let Some(adapter) = self.adapters.iter_mut().find(|a| a.handles(source)) else {
                warn!(source, "no adapter for source");
                sink(&format!("{source} -> skipped: no adapter"));
                sources_failed += 1;
                continue;
            };

            let raws = match adapter.fetch(source) {
                Ok(raws) => raws,
                Err(e) => {
                    let e = e.into_engine_error(source);
                    warn!(adapter = adapter.name(), error = %e, "source skipped");
                    sink(&format!("{source} -> error: {e}"));
                    sources_failed += 1;
                    continue;
                }
            };

            let mut normalizer = Normalizer::new(self.today);
            if let Some(platform) = adapter.platform() {
                normalizer = normalizer.with_default_platform(platform);
            }

            let before = ctx.stats();
            let mut page_seen = HashSet::new();
            let mut found = 0;
            for raw in &raws {
                let review = match normalizer.normalize(raw) {
                    Ok(review) => review,
                    Err(e) => {
                        warn!(source, error = %e, "record skipped");
                        continue;
                    }
                };
                if !page_seen.insert(review.exact_key()) {
                    continue;
                }
                found += 1;
                ctx.reconcile(&review)?;
            }
            let after = ctx.stats();
            sink(&format!(
                "{source} -> {found} reviews | +{} new, ~{} updated",
                after.new - before.new,
                after.updated - before.updated
            ));
        }

        let counts = ctx.stats();
        let plan = WritePlan::from_ops(ctx.into_ops())?;
        let write = writer.execute(store.as_mut(), tab, &plan)?;

        let stats = UnitStats {
            raw: counts.seen,
            unique: counts.unique,
            new: counts.new,
            updated: counts.updated,
            sources_failed,
            write,
        };
        info!(raw = stats.raw, new = stats.new, updated = stats.updated, "unit done");
        sink(&format!(
            "{} -> raw {} | unique {} | +{} new | ~{} updated",
            unit.name, stats.raw, stats.unique, stats.new, stats.updated
        ));
        Ok(stats)
    }
}

fn crawl_pause(delay_ms: u64, jitter_ms: u64) -> Duration {
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ms)
    };
    Duration::from_millis(delay_ms + jitter)
}
