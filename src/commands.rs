//! Command implementations behind the CLI

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::info;

use crate::config::{load_config, Config, DEFAULT_CONFIG};
use crate::ingest::{ingest_pending, pending_snapshots, RunSummary};
use crate::learning::LearningLedger;
use crate::report::{daily_report, words_report, write_csv, DateRange, WordRow, WordSummary};
use crate::storage::{RunLock, StateStore, LOCK_FILE, STATE_FILE};

pub const CONFIG_FILE: &str = "config.toml";

/// Data directory: explicit flag, else `./.vocablog` if present, else `~/.vocablog`
pub fn resolve_home(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(home) = flag {
        return Ok(home);
    }

    let cwd = std::env::current_dir()?;
    let project = cwd.join(".vocablog");
    if project.exists() {
        return Ok(project);
    }

    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(".vocablog"))
}

pub fn load(home: &Path) -> Result<Config> {
    load_config(&home.join(CONFIG_FILE))
}

/// Open existing state; reports need a prior `init`
fn open_state(home: &Path) -> Result<StateStore> {
    let path = home.join(STATE_FILE);
    if !path.exists() {
        anyhow::bail!("No state at {:?}. Run 'vocablog init' first", home);
    }
    StateStore::open(&path)
}

fn ledger(home: &Path, config: &Config) -> Result<LearningLedger> {
    let store = open_state(home)?;
    let log = store.load_log()?;
    Ok(LearningLedger::build(&log, config.learning.group_by, config.time.timezone))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn init(home: &Path) -> Result<()> {
    std::fs::create_dir_all(home).with_context(|| format!("Failed to create {:?}", home))?;

    let config_path = home.join(CONFIG_FILE);
    if !config_path.exists() {
        std::fs::write(&config_path, DEFAULT_CONFIG)?;
        info!("Created default configuration at {:?}", config_path);
    }

    let config = load(home)?;
    let root = config.snapshot_root(home);
    std::fs::create_dir_all(&root)?;
    StateStore::open(&home.join(STATE_FILE))?;

    println!("✅ Initialized {}", home.display());
    println!("   Snapshots: {}", root.display());
    Ok(())
}

pub fn ingest(home: &Path, limit: Option<usize>, running: &AtomicBool, json: bool) -> Result<()> {
    let config = load(home)?;
    open_state(home)?;
    let summary = ingest_pending(home, &config, limit, running)?;
    print_summary(&summary, json)
}

/// Clear all state, then ingest every snapshot again
pub fn rebuild(home: &Path, running: &AtomicBool, json: bool) -> Result<()> {
    let config = load(home)?;
    {
        let _lock = RunLock::acquire(&home.join(LOCK_FILE))?;
        open_state(home)?.reset()?;
    }
    let summary = ingest_pending(home, &config, None, running)?;
    print_summary(&summary, json)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        return print_json(summary);
    }
    println!(
        "Processed {} of {} pending snapshots ({} new reviews)",
        summary.processed, summary.pending, summary.events
    );
    if summary.skipped > 0 {
        println!("Skipped {} snapshots without a database", summary.skipped);
    }
    if summary.interrupted {
        println!("Interrupted; run ingest again to continue");
    }
    Ok(())
}

#[derive(Serialize)]
struct Status {
    home: PathBuf,
    snapshots: PathBuf,
    processed: u64,
    latest: Option<String>,
    events: u64,
    items: u64,
    pending: usize,
}

pub fn status(home: &Path, json: bool) -> Result<()> {
    let config = load(home)?;
    let store = open_state(home)?;
    let counts = store.counts()?;
    let pending = pending_snapshots(home, &config, &store)?.len();

    let status = Status {
        home: home.to_path_buf(),
        snapshots: config.snapshot_root(home),
        processed: counts.snapshots,
        latest: counts.latest.map(|p| p.folder),
        events: counts.events,
        items: counts.items,
        pending,
    };
    if json {
        return print_json(&status);
    }

    println!("vocablog Status");
    println!("===============");
    println!();
    println!("Data directory: {}", status.home.display());
    println!("Snapshot folder: {}", status.snapshots.display());
    println!("Processed snapshots: {}", status.processed);
    if let Some(latest) = &status.latest {
        println!("Latest snapshot: {}", latest);
    }
    println!("Review events: {}", status.events);
    println!("Cards reviewed: {}", status.items);
    println!("Pending snapshots: {}", status.pending);
    Ok(())
}

pub fn daily(
    home: &Path,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    csv: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load(home)?;
    let range = DateRange::new(start, end)?;
    let rows = daily_report(&ledger(home, &config)?, &range);

    if let Some(path) = csv {
        write_csv(&path, &rows)?;
    }
    if json {
        return print_json(&rows);
    }

    println!(
        "{:<10}  {:>8} {:>5} {:>7} {:>6} {:>5} {:>5}  {:>9} {:>7} {:>7}",
        "date", "reviewed", "new", "learned", "forgot", "net", "est", "cum_revd", "cum_new", "cum_net"
    );
    for row in &rows {
        println!(
            "{:<10}  {:>8} {:>5} {:>7} {:>6} {:>5} {:>5}  {:>9} {:>7} {:>7}",
            row.date,
            row.reviewed,
            row.new,
            row.learned,
            row.forgot,
            row.net_learned,
            row.estimated,
            row.cumulative_reviewed,
            row.cumulative_new,
            row.cumulative_net_learned
        );
    }
    if rows.is_empty() {
        println!("No reviews in {}", range);
    }
    Ok(())
}

#[derive(Serialize)]
struct WordsOutput<'a> {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    summary: &'a WordSummary,
    learned_ratio: Option<f64>,
    forgot_ratio: Option<f64>,
    words: &'a [WordRow],
}

pub fn words(
    home: &Path,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    csv: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load(home)?;
    // The wall clock is only consulted for the default window
    let range = match (start, end) {
        (None, None) => DateRange::last_days(config.time.timezone.today(), config.report.window_days),
        _ => DateRange::new(start, end)?,
    };
    let rows = words_report(&ledger(home, &config)?, &range);
    let summary = WordSummary::from_rows(&rows);

    if let Some(path) = csv {
        write_csv(&path, &rows)?;
    }
    if json {
        return print_json(&WordsOutput {
            start: range.start,
            end: range.end,
            summary: &summary,
            learned_ratio: summary.learned_ratio(),
            forgot_ratio: summary.forgot_ratio(),
            words: &rows,
        });
    }

    println!("Words reviewed in {}: {}", range, summary.reviewed);
    println!("  New: {}", summary.new);
    println!(
        "  Learned: {} / {}{}",
        summary.learned,
        summary.learnable,
        ratio(summary.learned_ratio())
    );
    println!(
        "  Forgot: {} / {}{}",
        summary.forgot,
        summary.forgettable,
        ratio(summary.forgot_ratio())
    );
    println!("  Still learning: {}", summary.still_learning);
    println!("  Retained: {}", summary.retained);

    let sections: [(&str, fn(&WordRow) -> bool); 4] = [
        ("Learned", |r| r.learned),
        ("Forgot", |r| r.forgot),
        ("New", |r| r.new),
        ("Still learning", |r| !r.new && !r.knew && !r.know),
    ];
    for (title, pick) in sections {
        let picked: Vec<&str> = rows.iter().filter(|r| pick(r)).map(|r| r.headword.as_str()).collect();
        if !picked.is_empty() {
            println!();
            println!("{} ({}): {}", title, picked.len(), picked.join(" "));
        }
    }
    Ok(())
}

fn ratio(value: Option<f64>) -> String {
    value.map(|v| format!(" ({:.0}%)", v)).unwrap_or_default()
}

/// Per-review learning trace for one headword
pub fn history(home: &Path, headword: &str, json: bool) -> Result<()> {
    let config = load(home)?;
    let zone = config.time.timezone;
    let ledger = ledger(home, &config)?;
    let matches: Vec<_> = ledger.find_headword(headword).collect();
    if matches.is_empty() {
        anyhow::bail!("No reviews logged for {:?}", headword);
    }

    if json {
        let traces: Vec<_> = matches
            .iter()
            .map(|(subject, records)| serde_json::json!({ "subject": subject.to_string(), "reviews": records }))
            .collect();
        return print_json(&traces);
    }

    for (subject, records) in matches {
        println!("{}", subject);
        println!(
            "  {:>4}  {:<19}  {:<3} {:<5}  {:>7}  {:>5}  {:<7}  {:<7}  {:>3}",
            "occ", "reviewed_at", "ok", "exact", "cum c/i", "day", "bod/eod", "learned", "net"
        );
        for r in records {
            println!(
                "  {:>4}  {:<19}  {:<3} {:<5}  {:>7}  {:>5}  {:<7}  {:<7}  {:>+3}",
                r.occurrence,
                zone.local_time(r.reviewed_at).format("%Y-%m-%d %H:%M:%S").to_string(),
                if r.correct { "y" } else { "n" },
                if r.exact_date { "date" } else { "est" },
                format!("{}/{}", r.correct_count, r.incorrect_count),
                format!("{}/{}", r.day_correct, r.day_incorrect),
                format!("{}/{}", mark(r.day_opened_correct), mark(r.day_closed_correct)),
                r.learned,
                r.net_learned
            );
        }
        println!();
    }
    Ok(())
}

fn mark(correct: bool) -> char {
    if correct {
        'y'
    } else {
        'n'
    }
}
