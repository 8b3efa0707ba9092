use reviewsync_core::layout::REVIEW_HEADER;
use reviewsync_engine::{RunConfig, Sweeper, UnitFilter};
use reviewsync_harness::{FaultHandle, FlakyConnector, RecordingSleeper, TempStores, WriteKind, line_sink};
use reviewsync_storage::RowStore;

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

fn seed(stores: &TempStores, target: &str, rows: Vec<Vec<String>>) -> Result<(), Box<dyn std::error::Error>> {
    let mut values = vec![REVIEW_HEADER.map(String::from).to_vec()];
    values.extend(rows);
    stores.open(target)?.append_rows("Reviews", &values)?;
    Ok(())
}

fn duplicated_rows() -> Vec<Vec<String>> {
    vec![
        row("Ana", "Bien", "2023-01-01", "2023", "https://fr.custplace.com/a", "custplace"),
        row("Bob", "Moyen", "", "2022", "https://fr.custplace.com/a", "custplace"),
        row("ana", "bien", "2023-06-01", "", "https://fr.custplace.com/b", ""),
        row("Bob", "Moyen", "", "2022", "https://fr.custplace.com/b", "custplace"),
        row("Chloé", "Top", "", "2021", "https://diplomeo.com/x", "diplomeo"),
        row("Ana", "Bien", "", "", "https://fr.custplace.com/c", "custplace"),
    ]
}

const CONFIG: &str = r#"
[delete_retry]
max_attempts = 2
delay_ms = 20

[[units]]
name = "a"
store = "a.sqlite3"

[[units]]
name = "b"
store = "b.sqlite3"
"#;

#[test]
fn sweep_keeps_first_occurrence_and_carries_newer_values() -> Result<(), Box<dyn std::error::Error>> {
    let stores = TempStores::new()?;
    seed(&stores, "a.sqlite3", duplicated_rows())?;
    let config = RunConfig::from_toml_str(CONFIG)?;
    let sleeper = RecordingSleeper::new();
    let mut connector = stores.connector();
    let mut lines = Vec::new();

    let results = Sweeper::new(&config, &mut connector, &sleeper)
        .sweep_all(&UnitFilter::parse("a"), &mut line_sink(&mut lines))?;
    let report = results[0].1.as_ref().map_err(|e| e.to_string())?;
    assert_eq!(report.duplicates, 3);
    assert_eq!(report.values_updated, 1);
    assert_eq!(report.write.rows_deleted, 3);

    let records = stores.open("a.sqlite3")?.read_all_records("Reviews")?;
    let kept: Vec<(&str, &str, &str)> = records
        .iter()
        .map(|r| (r.get("reviewer"), r.get("date"), r.get("year")))
        .collect();
    assert_eq!(
        kept,
        vec![("Ana", "2023-06-01", "2023"), ("Bob", "", "2022"), ("Chloé", "", "2021")]
    );
    assert!(lines.contains(&"a -> 3 duplicate row(s) removed | 1 value(s) updated".to_string()));

    // a second sweep finds nothing
    let results = Sweeper::new(&config, &mut connector, &sleeper)
        .sweep_all(&UnitFilter::parse("a"), &mut line_sink(&mut lines))?;
    let report = results[0].1.as_ref().map_err(|e| e.to_string())?;
    assert_eq!(report.duplicates, 0);
    assert_eq!(report.write.calls, 0);
    Ok(())
}

#[test]
fn quota_exhaustion_aborts_the_whole_sweep() -> Result<(), Box<dyn std::error::Error>> {
    let stores = TempStores::new()?;
    seed(&stores, "a.sqlite3", duplicated_rows())?;
    seed(&stores, "b.sqlite3", duplicated_rows())?;
    let config = RunConfig::from_toml_str(CONFIG)?;

    let faults = FaultHandle::new();
    faults.reject_always(WriteKind::Delete);
    let sleeper = RecordingSleeper::new();
    let mut connector = FlakyConnector::new(stores.connector(), faults.clone());
    let mut lines = Vec::new();

    let err = Sweeper::new(&config, &mut connector, &sleeper)
        .sweep_all(&UnitFilter::All, &mut line_sink(&mut lines))
        .unwrap_err();
    assert!(err.is_quota_exceeded());
    assert_eq!(faults.calls(WriteKind::Delete), 2);
    assert_eq!(sleeper.pauses().len(), 1);
    assert!(lines.iter().any(|l| l.starts_with("a -> aborted:")));
    assert!(!lines.iter().any(|l| l.starts_with("Dedupe b")));

    // updates landed before the deletes were refused; unit b was never touched
    let a = stores.open("a.sqlite3")?.read_all_records("Reviews")?;
    assert_eq!(a.len(), 6);
    assert_eq!(a[0].get("date"), "2023-06-01");
    assert_eq!(stores.open("b.sqlite3")?.read_all_records("Reviews")?[0].get("date"), "2023-01-01");
    Ok(())
}

#[test]
fn unit_without_store_is_skipped_but_sweep_continues() -> Result<(), Box<dyn std::error::Error>> {
    let stores = TempStores::new()?;
    seed(&stores, "b.sqlite3", duplicated_rows())?;
    let config = RunConfig::from_toml_str(
        r#"
[[units]]
name = "a"

[[units]]
name = "b"
store = "b.sqlite3"
"#,
    )?;
    let sleeper = RecordingSleeper::new();
    let mut connector = stores.connector();
    let mut lines = Vec::new();

    let results = Sweeper::new(&config, &mut connector, &sleeper).sweep_all(&UnitFilter::All, &mut line_sink(&mut lines))?;
    assert!(results[0].1.is_err());
    assert_eq!(results[1].1.as_ref().map(|r| r.duplicates).ok(), Some(3));
    assert!(lines.iter().any(|l| l.starts_with("a -> skipped:")));
    Ok(())
}
