//! Aggregation Engine: per-platform and overall rating means, upserted as
//! one summary row per institution.

use std::collections::BTreeMap;

use reviewsync_core::layout::{ReviewColumn, SUMMARY_HEADER};
use reviewsync_core::review::parse_rating_cell;
use reviewsync_core::{CellRef, Platform};
use reviewsync_storage::{CellWrite, Record, RowStore, StoreConnector};
use tracing::{info, info_span, warn};

use crate::config::{RunConfig, UnitFilter};
use crate::error::EngineError;
use crate::planner::BatchWriter;
use crate::retry::Sleeper;
use crate::ProgressSink;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SummaryRow {
    pub institution: String,
    /// Indexed like `Platform::ALL`; `None` when the platform has no usable rating.
    pub platform_means: [Option<f64>; 4],
    pub overall: Option<f64>,
}

impl SummaryRow {
    pub fn mean_for(&self, platform: Platform) -> Option<f64> {
        Platform::ALL
            .iter()
            .position(|p| *p == platform)
            .and_then(|i| self.platform_means[i])
    }

    /// The six summary cells. Absent means render as "".
    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(SUMMARY_HEADER.len());
        row.push(self.institution.clone());
        row.extend(self.platform_means.iter().map(|m| mean_cell(*m)));
        row.push(mean_cell(self.overall));
        row
    }
}

fn mean_cell(mean: Option<f64>) -> String {
    mean.map(|m| m.to_string()).unwrap_or_default()
}

/// Two decimals, exact ties to even.
fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(round2(values.iter().sum::<f64>() / values.len() as f64))
}

/// Means over stored review records. Only the rating and platform columns
/// are read; ratings on unknown platforms count nowhere.
pub fn compute_means(institution: &str, records: &[Record]) -> SummaryRow {
    let mut by_platform: BTreeMap<Platform, Vec<f64>> = BTreeMap::new();
    for record in records {
        let Some(platform) = Platform::parse(record.get(ReviewColumn::Platform.name())) else {
            continue;
        };
        if let Some(v) = parse_rating_cell(record.get(ReviewColumn::Rating.name())) {
            by_platform.entry(platform).or_default().push(v);
        }
    }

    let mut row = SummaryRow {
        institution: institution.to_string(),
        ..Default::default()
    };
    let mut all = Vec::new();
    for (i, platform) in Platform::ALL.iter().enumerate() {
        let values = by_platform.get(platform).map(Vec::as_slice).unwrap_or(&[]);
        row.platform_means[i] = mean(values);
        all.extend_from_slice(values);
    }
    row.overall = mean(&all);
    row
}

/// Rewrite row 1 of the summary tab when it is not the expected header.
fn ensure_summary_header(
    store: &mut dyn RowStore,
    tab: &str,
    writer: &BatchWriter<'_>,
) -> Result<(), EngineError> {
    let header = store.header(tab)?;
    let current: Vec<&str> = header.iter().map(|s| s.as_str()).collect();
    if current.len() >= SUMMARY_HEADER.len() && current[..SUMMARY_HEADER.len()] == SUMMARY_HEADER {
        return Ok(());
    }
    if header.is_empty() {
        let row: Vec<String> = SUMMARY_HEADER.iter().map(|s| s.to_string()).collect();
        return writer.append_rows(store, tab, &[row]);
    }
    warn!(tab, ?header, "summary header differs, rewriting");
    writer.update_cells(store, tab, &row_writes(1, SUMMARY_HEADER.iter().map(|s| s.to_string()))?)
}

fn row_writes(row: u32, values: impl IntoIterator<Item = String>) -> Result<Vec<CellWrite>, EngineError> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            Ok(CellWrite {
                cell: CellRef::new(row, i as u32 + 1)?,
                value,
            })
        })
        .collect()
}

/// Where the summary row for `institution` was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryWrite {
    Updated { row: u32 },
    Appended,
}

/// Write `summary` into the summary tab: all six cells of the existing row
/// (case-insensitive institution match) in one call, or one appended row.
pub fn upsert_summary(
    store: &mut dyn RowStore,
    tab: &str,
    summary: &SummaryRow,
    writer: &BatchWriter<'_>,
) -> Result<SummaryWrite, EngineError> {
    ensure_summary_header(store, tab, writer)?;

    let wanted = summary.institution.trim().to_lowercase();
    let names = store.read_column(tab, 1)?;
    let found = names
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, name)| name.trim().to_lowercase() == wanted)
        .map(|(i, _)| i as u32 + 1);

    match found {
        Some(row) => {
            writer.update_cells(store, tab, &row_writes(row, summary.to_row())?)?;
            Ok(SummaryWrite::Updated { row })
        }
        None => {
            writer.append_rows(store, tab, &[summary.to_row()])?;
            Ok(SummaryWrite::Appended)
        }
    }
}

/// Read one unit's review tab and refresh its summary row in the same store.
pub fn refresh_summary(
    store: &mut dyn RowStore,
    config: &RunConfig,
    institution: &str,
    writer: &BatchWriter<'_>,
) -> Result<SummaryRow, EngineError> {
    let records = store.read_all_records(&config.review_tab)?;
    let summary = compute_means(institution, &records);
    let write = upsert_summary(store, &config.summary_tab, &summary, writer)?;
    info!(institution, ?write, overall = ?summary.overall, "summary refreshed");
    Ok(summary)
}

pub struct Aggregator<'a> {
    config: &'a RunConfig,
    connector: &'a mut dyn StoreConnector,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a RunConfig, connector: &'a mut dyn StoreConnector, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            config,
            connector,
            sleeper,
        }
    }

    /// Refresh every selected unit. Units without a store target and units
    /// that fail are reported and skipped.
    pub fn run(&mut self, filter: &UnitFilter, sink: &mut ProgressSink<'_>) -> Vec<(String, Result<SummaryRow, EngineError>)> {
        let config = self.config;
        let writer = BatchWriter::new(config.write_retry.policy(), config.delete_retry.policy(), self.sleeper);
        sink("Refreshing summaries...");

        let mut results = Vec::new();
        for unit in config.select(filter) {
            let _span = info_span!("aggregate", unit = %unit.name).entered();
            let result = unit.validate_store().and_then(|()| {
                let mut store = self.connector.open(&unit.store)?;
                refresh_summary(store.as_mut(), config, &unit.name, &writer)
            });
            match &result {
                Ok(_) => sink(&format!("{} -> summary updated", unit.name)),
                Err(EngineError::Config(reason)) => {
                    warn!(%reason, "unit skipped");
                    sink(&format!("{} -> skipped: {reason}", unit.name));
                }
                Err(e) => {
                    warn!(error = %e, "summary refresh failed");
                    sink(&format!("{} -> summary failed: {e}", unit.name));
                }
            }
            results.push((unit.name.clone(), result));
        }
        sink("Summary refresh done");
        results
    }
}
