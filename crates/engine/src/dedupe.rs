//! Duplicate cleanup sweep over a unit's committed review rows.
//!
//! The first row of each soft key is kept. Later rows with the same key are
//! deleted, and any newer date or year they carry is copied onto the kept row
//! first.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use reviewsync_core::identity::soft_key_from_cells;
use reviewsync_core::layout::ReviewColumn;
use reviewsync_core::{Fingerprint, PendingOp, Platform};
use reviewsync_storage::StoreConnector;
use tracing::{info, info_span, warn};

use crate::config::{RunConfig, UnitConfig, UnitFilter};
use crate::error::EngineError;
use crate::planner::{BatchWriter, WritePlan, WriteSummary};
use crate::retry::Sleeper;
use crate::ProgressSink;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupPlan {
    pub ops: Vec<PendingOp>,
    pub duplicates: usize,
    /// Individual date/year cells rewritten on kept rows.
    pub values_updated: usize,
}

struct Kept {
    row: u32,
    date: String,
    year: String,
}

/// Column positions resolved from the header row, by name.
struct Columns {
    reviewer: usize,
    text: usize,
    url: usize,
    platform: Option<usize>,
    date: Option<usize>,
    year: Option<usize>,
}

impl Columns {
    fn resolve(header: &[String]) -> Result<Self, EngineError> {
        let find = |col: ReviewColumn| header.iter().position(|h| h.trim() == col.name());
        let required = |col: ReviewColumn| {
            find(col).ok_or_else(|| EngineError::Config(format!("review tab has no {:?} column", col.name())))
        };
        Ok(Self {
            reviewer: required(ReviewColumn::Reviewer)?,
            text: required(ReviewColumn::Text)?,
            url: required(ReviewColumn::Url)?,
            platform: find(ReviewColumn::Platform),
            date: find(ReviewColumn::Date),
            year: find(ReviewColumn::Year),
        })
    }
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

fn opt_cell(row: &[String], idx: Option<usize>) -> &str {
    idx.map(|i| cell(row, i)).unwrap_or("")
}

/// Plan the sweep over all values of a review tab, header first.
pub fn plan_cleanup(values: &[Vec<String>]) -> Result<CleanupPlan, EngineError> {
    let mut plan = CleanupPlan::default();
    let Some((header, data)) = values.split_first() else {
        return Ok(plan);
    };
    let cols = Columns::resolve(header)?;
    let mut seen: HashMap<Fingerprint, Kept> = HashMap::new();

    for (offset, row) in data.iter().enumerate() {
        let row_num = offset as u32 + 2;
        let reviewer = cell(row, cols.reviewer);
        let text = cell(row, cols.text);
        let mut platform = opt_cell(row, cols.platform).trim().to_string();
        if platform.is_empty() {
            platform = Platform::detect_from_url(cell(row, cols.url))
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
        }
        if platform.is_empty() && reviewer.trim().is_empty() && text.trim().is_empty() {
            continue;
        }

        let key = soft_key_from_cells(&platform, reviewer, text);
        let date = opt_cell(row, cols.date);
        let year = opt_cell(row, cols.year);

        let kept = match seen.entry(key) {
            Entry::Occupied(first) => first.into_mut(),
            Entry::Vacant(slot) => {
                slot.insert(Kept {
                    row: row_num,
                    date: date.to_string(),
                    year: year.to_string(),
                });
                continue;
            }
        };

        if let Some(idx) = cols.date {
            if !date.is_empty() && date != kept.date {
                plan.ops.push(PendingOp::cell_update(kept.row, idx as u32 + 1, date)?);
                kept.date = date.to_string();
                plan.values_updated += 1;
            }
        }
        if let Some(idx) = cols.year {
            if !year.is_empty() && year != kept.year {
                plan.ops.push(PendingOp::cell_update(kept.row, idx as u32 + 1, year)?);
                kept.year = year.to_string();
                plan.values_updated += 1;
            }
        }
        plan.ops.push(PendingOp::row_range_delete(row_num, row_num + 1)?);
        plan.duplicates += 1;
    }
    Ok(plan)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub duplicates: usize,
    pub values_updated: usize,
    pub write: WriteSummary,
}

pub struct Sweeper<'a> {
    config: &'a RunConfig,
    connector: &'a mut dyn StoreConnector,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Sweeper<'a> {
    pub fn new(config: &'a RunConfig, connector: &'a mut dyn StoreConnector, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            config,
            connector,
            sleeper,
        }
    }

    fn writer(&self) -> BatchWriter<'a> {
        BatchWriter::new(
            self.config.write_retry.policy(),
            self.config.delete_retry.policy(),
            self.sleeper,
        )
        .with_delete_chunk_size(self.config.delete_chunk_size)
    }

    pub fn sweep_unit(&mut self, unit: &UnitConfig) -> Result<CleanupReport, EngineError> {
        unit.validate_store()?;
        let mut store = self.connector.open(&unit.store)?;
        let tab = &self.config.review_tab;

        let values = store.read_all_values(tab)?;
        let cleanup = plan_cleanup(&values)?;
        let plan = WritePlan::from_ops(cleanup.ops)?;
        let write = self.writer().execute(store.as_mut(), tab, &plan)?;

        info!(
            unit = %unit.name,
            duplicates = cleanup.duplicates,
            values_updated = cleanup.values_updated,
            "cleanup sweep done"
        );
        Ok(CleanupReport {
            duplicates: cleanup.duplicates,
            values_updated: cleanup.values_updated,
            write,
        })
    }

    /// Sweep every selected unit. Quota exhaustion stops the whole sweep;
    /// any other unit failure is reported and the sweep moves on.
    pub fn sweep_all(
        &mut self,
        filter: &UnitFilter,
        sink: &mut ProgressSink<'_>,
    ) -> Result<Vec<(String, Result<CleanupReport, EngineError>)>, EngineError> {
        let config = self.config;
        let mut results = Vec::new();
        for unit in config.select(filter) {
            let _span = info_span!("dedupe", unit = %unit.name).entered();
            sink(&format!("Dedupe {}", unit.name));
            match self.sweep_unit(unit) {
                Ok(report) => {
                    sink(&format!(
                        "{} -> {} duplicate row(s) removed | {} value(s) updated",
                        unit.name, report.write.rows_deleted, report.values_updated
                    ));
                    results.push((unit.name.clone(), Ok(report)));
                }
                Err(e) if e.is_quota_exceeded() => {
                    sink(&format!("{} -> aborted: {e}", unit.name));
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "cleanup skipped");
                    sink(&format!("{} -> skipped: {e}", unit.name));
                    results.push((unit.name.clone(), Err(e)));
                }
            }
        }
        sink(&format!("Cleanup finished for {} unit(s)", results.len()));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewsync_core::layout::REVIEW_HEADER;
    use reviewsync_core::CellRef;

    fn header() -> Vec<String> {
        REVIEW_HEADER.iter().map(|s| s.to_string()).collect()
    }

    fn row(reviewer: &str, text: &str, date: &str, year: &str, url: &str, platform: &str) -> Vec<String> {
        let mut r = vec![String::new(); REVIEW_HEADER.len()];
        r[1] = reviewer.into();
        r[3] = date.into();
        r[4] = year.into();
        r[6] = text.into();
        r[7] = url.into();
        r[13] = platform.into();
        r
    }

    #[test]
    fn later_duplicates_are_deleted() {
        let values = vec![
            header(),
            row("Ana", "Bien", "", "2022", "https://custplace.com/a", "custplace"),
            row("Bob", "Moyen", "", "", "https://custplace.com/a", "custplace"),
            row("ana ", "BIEN", "", "2022", "https://custplace.com/b", ""),
            row("Ana", "Bien", "", "", "https://diplomeo.com/a", "diplomeo"),
        ];
        let plan = plan_cleanup(&values).unwrap();
        assert_eq!(plan.duplicates, 1);
        assert_eq!(plan.values_updated, 0);
        assert_eq!(plan.ops, vec![PendingOp::row_range_delete(4, 5).unwrap()]);
    }

    #[test]
    fn duplicate_carries_newer_values_to_kept_row() {
        let values = vec![
            header(),
            row("Ana", "Bien", "2023-01-01", "2023", "", "gmb"),
            row("Ana", "Bien", "2023-06-01", "", "", "gmb"),
            row("Ana", "Bien", "2023-06-01", "2024", "", "gmb"),
        ];
        let plan = plan_cleanup(&values).unwrap();
        assert_eq!(plan.duplicates, 2);
        assert_eq!(plan.values_updated, 2);
        assert_eq!(
            plan.ops,
            vec![
                PendingOp::CellUpdate { cell: CellRef::new(2, 4).unwrap(), value: "2023-06-01".into() },
                PendingOp::row_range_delete(3, 4).unwrap(),
                PendingOp::CellUpdate { cell: CellRef::new(2, 5).unwrap(), value: "2024".into() },
                PendingOp::row_range_delete(4, 5).unwrap(),
            ]
        );
    }

    #[test]
    fn blank_rows_are_left_alone() {
        let values = vec![header(), row("", "", "", "", "", ""), row("", "", "", "", "", "")];
        let plan = plan_cleanup(&values).unwrap();
        assert!(plan.ops.is_empty());
    }

    #[test]
    fn blank_content_with_a_platform_is_still_swept() {
        let values = vec![
            header(),
            row("", "", "", "", "", "gmb"),
            row("", "", "", "", "https://fr.custplace.com/a", ""),
            row("", "", "", "", "", "gmb"),
        ];
        let plan = plan_cleanup(&values).unwrap();
        assert_eq!(plan.duplicates, 1);
        assert_eq!(plan.ops, vec![PendingOp::row_range_delete(4, 5).unwrap()]);
    }

    #[test]
    fn missing_required_column_is_config_error() {
        let values = vec![vec!["uid".to_string(), "reviewer".to_string()]];
        assert!(matches!(plan_cleanup(&values), Err(EngineError::Config(_))));
    }

    #[test]
    fn empty_tab_plans_nothing() {
        assert_eq!(plan_cleanup(&[]).unwrap(), CleanupPlan::default());
    }
}
