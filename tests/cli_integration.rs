//! End-to-end tests for the vocablog binary
//!
//! Builds synthetic flashcard captures in a temp data directory and drives
//! init, ingest, reports and rebuild through the CLI.

use rusqlite::{params, Connection};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Run vocablog against a data directory and return (success, stdout, stderr)
fn run_vocablog(home: &Path, args: &[&str]) -> (bool, String, String) {
    run_vocablog_in(home, None, args)
}

/// Same as `run_vocablog`, with the child's `TZ` overridden
fn run_vocablog_in(home: &Path, tz: Option<&str>, args: &[&str]) -> (bool, String, String) {
    let mut command = Command::new(env!("CARGO_BIN_EXE_vocablog"));
    command.arg("--home").arg(home).args(args).env("RUST_LOG", "info");
    if let Some(tz) = tz {
        command.env("TZ", tz);
    }
    let output = command.output().expect("Failed to execute vocablog");

    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Card row: (id, headword, reviewed, first, last, history); times in Unix seconds
type Card<'a> = (i64, &'a str, i64, i64, i64, &'a str);

fn write_capture(home: &Path, folder: &str, cards: &[Card]) {
    let dir = home.join("snapshots").join(folder);
    std::fs::create_dir_all(&dir).unwrap();
    let conn = Connection::open(dir.join("Pleco Flashcard Database.pqb")).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE pleco_flash_cards (id INTEGER PRIMARY KEY, dictid INTEGER, dictentry INTEGER, hw TEXT, created INTEGER);
        CREATE TABLE pleco_flash_scores_1 (card INTEGER PRIMARY KEY, reviewed INTEGER, firstreviewedtime INTEGER, lastreviewedtime INTEGER, history TEXT);
        "#,
    )
    .unwrap();
    for (id, hw, reviewed, first, last, history) in cards {
        conn.execute(
            "INSERT INTO pleco_flash_cards VALUES (?1, 1, ?1, ?2, 1500000000)",
            params![id, hw],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO pleco_flash_scores_1 VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, reviewed, first, last, history],
        )
        .unwrap();
    }
}

/// Initialized data directory with UTC review times
fn setup() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let (success, stdout, stderr) = run_vocablog(temp.path(), &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Initialized"));

    let config_path = temp.path().join("config.toml");
    let config = std::fs::read_to_string(&config_path).unwrap();
    std::fs::write(&config_path, config.replace("timezone = \"local\"", "timezone = \"utc\"")).unwrap();
    temp
}

// 2019-03-01 08:00:00 UTC and friends
const MAR1_08: i64 = 1_551_427_200;
const MAR1_20: i64 = MAR1_08 + 12 * 3600;
const MAR3_08: i64 = MAR1_08 + 2 * 86400;

// US eastern time as a POSIX rule, so no zoneinfo files are needed
const EASTERN: &str = "EST5EDT,M3.2.0,M11.1.0";
// 2019-11-03 05:50:00 UTC, 01:50 EDT; clocks go back to 01:00 EST at 06:00 UTC
const NOV3_0550: i64 = 1_572_760_200;

#[test]
fn test_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_vocablog"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("vocablog"));
}

#[test]
fn test_init_creates_layout() {
    let temp = setup();
    assert!(temp.path().join("config.toml").exists());
    assert!(temp.path().join("state.sqlite").exists());
    assert!(temp.path().join("snapshots").is_dir());
}

#[test]
fn test_reports_require_init() {
    let temp = TempDir::new().unwrap();
    let (success, _, stderr) = run_vocablog(temp.path(), &["daily"]);
    assert!(!success);
    assert!(stderr.contains("vocablog init"));
}

#[test]
fn test_ingest_and_report() {
    let temp = setup();
    let home = temp.path();
    write_capture(home, "2019-03-02 06.00.00", &[
        (1, "书", 2, MAR1_08, MAR1_20, "54"),
        (2, "人@", 1, MAR1_08, MAR1_08, "1"),
    ]);

    let (success, stdout, stderr) = run_vocablog(home, &["ingest", "--json"]);
    assert!(success, "ingest failed: {}", stderr);
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["processed"], 1);
    assert_eq!(summary["events"], 3);

    write_capture(home, "2019-03-04 06.00.00", &[
        (1, "书", 3, MAR1_08, MAR3_08, "541"),
        (2, "人@", 1, MAR1_08, MAR1_08, "1"),
    ]);
    let (success, stdout, _) = run_vocablog(home, &["ingest", "--json"]);
    assert!(success);
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["processed"], 1);
    assert_eq!(summary["events"], 1);

    let (success, stdout, _) = run_vocablog(home, &["daily", "--json"]);
    assert!(success);
    let rows: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["date"], "2019-03-01");
    assert_eq!(rows[0]["reviewed"], 3);
    assert_eq!(rows[0]["new"], 2);
    assert_eq!(rows[0]["learned"], 1);
    assert_eq!(rows[1]["date"], "2019-03-03");
    assert_eq!(rows[1]["forgot"], 1);
    assert_eq!(rows[1]["cumulative_reviewed"], 4);
    assert_eq!(rows[1]["cumulative_net_learned"], 0);

    let csv_path = home.join("words.csv");
    let (success, stdout, _) = run_vocablog(home, &[
        "words", "--start", "2019-03-03", "--end", "2019-03-10",
        "--csv", csv_path.to_str().unwrap(),
    ]);
    assert!(success);
    assert!(stdout.contains("Forgot: 1 / 1 (100%)"));
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert!(csv.lines().next().unwrap().starts_with("headword,item,reviewed"));
    assert_eq!(csv.lines().count(), 2);

    let (success, stdout, _) = run_vocablog(home, &["history", "人"]);
    assert!(success, "headword markers should be stripped");
    assert!(stdout.contains("2019-03-01 08:00:00"));

    let (success, stdout, _) = run_vocablog(home, &["status"]);
    assert!(success);
    assert!(stdout.contains("Processed snapshots: 2"));
    assert!(stdout.contains("Review events: 4"));
    assert!(stdout.contains("Pending snapshots: 0"));
}

#[test]
fn test_rebuild_reproduces_log() {
    let temp = setup();
    let home = temp.path();
    write_capture(home, "2019-03-02 06.00.00", &[(1, "书", 2, MAR1_08, MAR1_20, "54")]);
    write_capture(home, "2019-03-04 06.00.00", &[(1, "书", 3, MAR1_08, MAR3_08, "541")]);

    assert!(run_vocablog(home, &["ingest"]).0);
    let (_, before, _) = run_vocablog(home, &["history", "书", "--json"]);

    let (success, stdout, _) = run_vocablog(home, &["rebuild", "--json"]);
    assert!(success);
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["processed"], 2);

    let (_, after, _) = run_vocablog(home, &["history", "书", "--json"]);
    assert_eq!(before, after);
}

#[test]
fn test_counter_regression_reports_card_and_snapshots() {
    let temp = setup();
    let home = temp.path();
    write_capture(home, "2019-03-02 06.00.00", &[(1, "书", 2, MAR1_08, MAR1_20, "54")]);
    write_capture(home, "2019-03-04 06.00.00", &[(1, "书", 1, MAR3_08, MAR3_08, "5")]);

    let (success, _, stderr) = run_vocablog(home, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("书"));
    assert!(stderr.contains("2019-03-02 06.00.00"));
    assert!(stderr.contains("2019-03-04 06.00.00"));

    let (_, stdout, _) = run_vocablog(home, &["status"]);
    assert!(stdout.contains("Processed snapshots: 1"));
    assert!(stdout.contains("Pending snapshots: 1"));
}

#[test]
fn test_local_zone_across_clock_change() {
    let temp = TempDir::new().unwrap();
    let home = temp.path();
    let (success, _, stderr) = run_vocablog_in(home, Some(EASTERN), &["init"]);
    assert!(success, "init failed: {}", stderr);

    // 01:50 EDT, then 01:10 EST twenty minutes later, then 22:00 EST
    let after_change = NOV3_0550 + 20 * 60;
    let evening = NOV3_0550 + 21 * 3600 + 10 * 60;
    write_capture(home, "2019-11-03 05.55.00", &[(1, "书", 1, NOV3_0550, NOV3_0550, "5")]);
    write_capture(home, "2019-11-03 07.00.00", &[(1, "书", 2, NOV3_0550, after_change, "54")]);
    write_capture(home, "2019-11-04 06.00.00", &[(1, "书", 3, NOV3_0550, evening, "545")]);

    let (success, stdout, stderr) = run_vocablog_in(home, Some(EASTERN), &["ingest", "--json"]);
    assert!(success, "ingest failed: {}", stderr);
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["processed"], 3);
    assert_eq!(summary["events"], 3);

    // All three reviews fall on November 3rd locally, the last one not in UTC
    let (success, stdout, _) = run_vocablog_in(home, Some(EASTERN), &["daily", "--json"]);
    assert!(success);
    let rows: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["date"], "2019-11-03");
    assert_eq!(rows[0]["reviewed"], 3);

    let (success, stdout, _) = run_vocablog_in(home, Some(EASTERN), &["history", "书"]);
    assert!(success);
    assert!(stdout.contains("2019-11-03 01:50:00"));
    assert!(stdout.contains("2019-11-03 01:10:00"));
    assert!(stdout.contains("2019-11-03 22:00:00"));

    let (success, _, stderr) = run_vocablog_in(home, Some(EASTERN), &["rebuild"]);
    assert!(success, "rebuild failed: {}", stderr);
}
