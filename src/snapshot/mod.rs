//! Snapshot model
//!
//! A snapshot is one immutable capture of every card's cumulative review
//! state. Captures live in folders named by capture time; `discover` lists
//! them in chronological order and `SnapshotReader` loads one.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::config::SnapshotSettings;
use crate::error::{IntegrityFault, SnapshotError};

pub(crate) mod reader;

pub use reader::SnapshotReader;

/// Identity of one flashcard across all snapshots
///
/// `created` disambiguates cards re-created with the same headword.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub dict_id: i64,
    pub dict_entry: i64,
    pub headword: String,
    /// Card creation time, Unix seconds as stored by the source
    pub created: i64,
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (dict {}/{}, created {})",
            self.headword, self.dict_id, self.dict_entry, self.created
        )
    }
}

/// Cumulative review counters for one card at capture time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemScore {
    pub reviewed: u32,
    pub first_reviewed: Option<DateTime<Utc>>,
    pub last_reviewed: Option<DateTime<Utc>>,
    /// One outcome digit (0-5) per review, oldest first; may be capped
    pub history: String,
}

/// Identifies a capture by folder name and the capture time it encodes
///
/// `captured_at` is only used to order captures, so it stays as written in
/// the folder name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId {
    pub captured_at: NaiveDateTime,
    pub folder: String,
}

impl SnapshotId {
    pub fn parse(folder: &str, format: &str) -> Result<Self, SnapshotError> {
        let captured_at = NaiveDateTime::parse_from_str(folder, format)
            .map_err(|_| SnapshotError::BadFolderName(folder.to_string()))?;
        Ok(Self {
            captured_at,
            folder: folder.to_string(),
        })
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.folder)
    }
}

/// One capture of all cards, keyed and ordered by `ItemKey`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: SnapshotId,
    items: BTreeMap<ItemKey, ItemScore>,
}

impl Snapshot {
    pub fn new(id: SnapshotId) -> Self {
        Self {
            id,
            items: BTreeMap::new(),
        }
    }

    /// Add a card; a key may appear only once per capture
    pub fn insert(&mut self, key: ItemKey, score: ItemScore) -> Result<(), IntegrityFault> {
        if self.items.contains_key(&key) {
            return Err(IntegrityFault::DuplicateItem { key });
        }
        self.items.insert(key, score);
        Ok(())
    }

    pub fn get(&self, key: &ItemKey) -> Option<&ItemScore> {
        self.items.get(key)
    }

    pub fn items(&self) -> impl Iterator<Item = (&ItemKey, &ItemScore)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// List capture folders under `root`, oldest first
///
/// Entries that are not directories or whose names do not match the
/// configured pattern are ignored.
pub fn discover(root: &Path, settings: &SnapshotSettings) -> Result<Vec<SnapshotId>, SnapshotError> {
    let pattern = Regex::new(&settings.folder_pattern)
        .map_err(|e| SnapshotError::BadSetting(format!("folder_pattern: {}", e)))?;

    let mut ids = Vec::new();
    for entry in std::fs::read_dir(root)?.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !pattern.is_match(&name) {
            debug!("Ignoring folder {:?}", name);
            continue;
        }
        ids.push(SnapshotId::parse(&name, &settings.folder_format)?);
    }

    ids.sort();
    Ok(ids)
}
