use reviewsync_core::layout::{REVIEW_HEADER, SUMMARY_HEADER};
use reviewsync_engine::{Aggregator, RunConfig, UnitFilter};
use reviewsync_harness::{RecordingSleeper, TempStores, line_sink};
use reviewsync_storage::{RowStore, StoreConnector};

fn review_row(rating: &str, platform: &str) -> Vec<String> {
    let mut row = vec![String::new(); REVIEW_HEADER.len()];
    row[2] = rating.to_string();
    row[13] = platform.to_string();
    row
}

fn seed_reviews(stores: &TempStores, target: &str, rows: &[(&str, &str)]) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = stores.open(target)?;
    let mut values = vec![REVIEW_HEADER.map(String::from).to_vec()];
    values.extend(rows.iter().map(|(rating, platform)| review_row(rating, platform)));
    store.append_rows("Reviews", &values)?;
    Ok(())
}

const CONFIG: &str = r#"
[[units]]
name = "EFAP"
store = "efap.sqlite3"

[[units]]
name = "mopa"
"#;

#[test]
fn aggregating_twice_keeps_one_identical_row() -> Result<(), Box<dyn std::error::Error>> {
    let stores = TempStores::new()?;
    seed_reviews(
        &stores,
        "efap.sqlite3",
        &[
            ("4", "custplace"),
            ("3,5", "custplace"),
            ("foo", "custplace"),
            ("5", "custplace"),
            ("no rating", "gmb"),
            ("2", "diplomeo"),
        ],
    )?;
    let config = RunConfig::from_toml_str(CONFIG)?;
    let sleeper = RecordingSleeper::new();
    let mut connector = stores.connector();
    let mut lines = Vec::new();

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        let results = Aggregator::new(&config, &mut connector, &sleeper)
            .run(&UnitFilter::parse("efap"), &mut line_sink(&mut lines));
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());
        snapshots.push(stores.open("efap.sqlite3")?.read_all_values("Summary")?);
    }

    assert_eq!(snapshots[0], snapshots[1]);
    let values = &snapshots[1];
    assert_eq!(values.len(), 2);
    assert_eq!(values[0], SUMMARY_HEADER.map(String::from).to_vec());
    // overall: (4 + 3.5 + 5 + 2) / 4 = 3.625, tie goes to even
    assert_eq!(values[1], vec!["EFAP", "2", "", "4.17", "", "3.62"]);
    Ok(())
}

#[test]
fn existing_row_matched_case_insensitively_is_rewritten_in_full() -> Result<(), Box<dyn std::error::Error>> {
    let stores = TempStores::new()?;
    seed_reviews(&stores, "efap.sqlite3", &[("5", "gmb")])?;
    {
        let mut store = stores.open("efap.sqlite3")?;
        let header = SUMMARY_HEADER.map(String::from).to_vec();
        let stale = ["icart", "1", "1", "1", "1", "1"].map(String::from).to_vec();
        let ours = ["efap ", "3", "3", "3", "3", "3"].map(String::from).to_vec();
        store.append_rows("Summary", &[header, stale, ours])?;
    }

    let config = RunConfig::from_toml_str(CONFIG)?;
    let sleeper = RecordingSleeper::new();
    let mut connector = stores.connector();
    let mut lines = Vec::new();
    Aggregator::new(&config, &mut connector, &sleeper).run(&UnitFilter::All, &mut line_sink(&mut lines));

    let values = stores.open("efap.sqlite3")?.read_all_values("Summary")?;
    assert_eq!(values.len(), 3);
    assert_eq!(values[1][0], "icart");
    assert_eq!(values[2], vec!["EFAP", "", "", "", "5", "5"]);
    Ok(())
}

#[test]
fn units_without_store_are_reported_and_skipped() -> Result<(), Box<dyn std::error::Error>> {
    let stores = TempStores::new()?;
    seed_reviews(&stores, "efap.sqlite3", &[])?;
    let config = RunConfig::from_toml_str(CONFIG)?;
    let sleeper = RecordingSleeper::new();
    let mut connector = stores.connector();
    let mut lines = Vec::new();

    let results = Aggregator::new(&config, &mut connector, &sleeper).run(&UnitFilter::All, &mut line_sink(&mut lines));
    assert_eq!(results.len(), 2);
    assert!(results[0].1.is_ok());
    assert!(results[1].1.is_err());
    assert!(lines.contains(&"EFAP -> summary updated".to_string()));
    assert!(lines.iter().any(|l| l.starts_with("mopa -> skipped:")));

    // no ratings at all: every mean is absent, never zero
    let summary = connector.open("efap.sqlite3")?.read_all_values("Summary")?;
    assert_eq!(summary[1], vec!["EFAP", "", "", "", "", ""]);
    Ok(())
}
