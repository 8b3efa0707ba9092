mod source;
mod store;

pub use source::{ScriptedSource, raw_review};
pub use store::{FaultHandle, FlakyConnector, FlakyStore, RecordingSleeper, TempStores, WriteKind};

use chrono::NaiveDate;

/// Fixed reference date so relative review dates resolve the same way in every test.
pub fn fixed_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).unwrap_or_default()
}

/// Collects progress lines into a vector.
pub fn line_sink(lines: &mut Vec<String>) -> impl FnMut(&str) + '_ {
    move |line: &str| lines.push(line.to_string())
}
