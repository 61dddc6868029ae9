//! Birthday record store backed by a JSON file.
//!
//! Owns the in-memory record collection behind a single mutex and persists
//! the whole collection after every durable mutation. All reads and writes
//! go through this type; the scheduler and the command dispatcher never
//! mutate a record directly, so memory and disk cannot diverge.

use crate::error::BotError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Recurring dates use a fixed `DD-MM` form, year-agnostic.
static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}-\d{2}$").unwrap());

/// Check a date string against the `DD-MM` pattern.
///
/// Validation happens at creation/update time only, never at delivery time.
pub fn is_valid_date(date: &str) -> bool {
    DATE_PATTERN.is_match(date)
}

/// Case-insensitive name comparison; names may carry accented characters,
/// so this folds the full Unicode way rather than ASCII-only.
fn name_eq(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Delivery bookkeeping for a record, serialized as the legacy `_meta` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderMeta {
    /// Most recent year a reminder was delivered, or `None` if never sent
    /// or explicitly reset. Always serialized (as an explicit null when
    /// unset) so normalized files are self-describing.
    #[serde(rename = "lastReminderYear", default)]
    pub last_reminder_year: Option<i32>,
}

/// One reminder entry. Field names match the persisted JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthdayRecord {
    pub name: String,
    /// `DD-MM`, recurring annually
    pub date: String,
    /// Last-known destination id; may be absent or stale
    #[serde(rename = "groupId", default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Human-readable destination name, used to re-resolve `group_id`
    #[serde(rename = "groupName", default)]
    pub group_name: String,
    /// Custom reminder text; absent means the default greeting is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "_meta", default)]
    pub meta: ReminderMeta,
}

impl BirthdayRecord {
    /// Identity match used to locate this record inside the store.
    ///
    /// Date and case-insensitive name always participate. When both sides
    /// carry a destination id the ids must be equal; two destinations can
    /// share a display name, so the name is only a fallback for records
    /// that have no id yet. Callers holding a copy with a stale id must
    /// refresh it (the resolver does) before mutating through the store.
    fn same_identity(&self, other: &BirthdayRecord) -> bool {
        if self.date != other.date
            || !name_eq(&self.name, &other.name)
        {
            return false;
        }
        match (&self.group_id, &other.group_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.group_name == other.group_name,
        }
    }
}

/// JSON-file-backed store for [`BirthdayRecord`]s.
pub struct BirthdayStore {
    path: PathBuf,
    records: Mutex<Vec<BirthdayRecord>>,
}

impl BirthdayStore {
    /// Load the persisted collection, normalizing legacy entries.
    ///
    /// A missing file is treated as an empty, freshly-initialized
    /// collection. Records that lack the `_meta` object are normalized to
    /// `lastReminderYear = null` and the whole collection is rewritten
    /// before first use. A malformed payload is a `Storage` error; callers
    /// treat that as fatal at startup.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, BotError> {
        let path = path.into();

        if !path.exists() {
            let store = Self {
                path,
                records: Mutex::new(Vec::new()),
            };
            store.save()?;
            return Ok(store);
        }

        let text = fs::read_to_string(&path)
            .map_err(|e| BotError::Storage(format!("Failed to read {}: {}", path.display(), e)))?;

        let raw: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| BotError::Storage(format!("Malformed JSON in {}: {}", path.display(), e)))?;
        let entries = raw
            .as_array()
            .ok_or_else(|| {
                BotError::Storage(format!("{} does not contain a list of records", path.display()))
            })?;
        let needs_normalize = entries.iter().any(|e| e.get("_meta").is_none());

        let records: Vec<BirthdayRecord> = serde_json::from_value(raw).map_err(|e| {
            BotError::Storage(format!("Malformed record in {}: {}", path.display(), e))
        })?;

        let store = Self {
            path,
            records: Mutex::new(records),
        };

        if needs_normalize {
            log::info!("[STORE] Normalizing legacy records without _meta");
            store.save()?;
        }

        Ok(store)
    }

    /// Durably write the full current collection, replacing prior content.
    pub fn save(&self) -> Result<(), BotError> {
        let records = self.records.lock().unwrap();
        persist(&self.path, &records)
    }

    /// Insert a record, rejecting identity-key collisions.
    ///
    /// The duplicate key is (`date`, case-insensitive `name`, `group_id`),
    /// so the same person/date pair may exist in different destinations.
    pub fn insert(&self, record: BirthdayRecord) -> Result<(), BotError> {
        let mut records = self.records.lock().unwrap();
        let exists = records.iter().any(|r| {
            r.date == record.date
                && name_eq(&r.name, &record.name)
                && r.group_id == record.group_id
        });
        if exists {
            return Err(BotError::Duplicate);
        }
        records.push(record);
        persist(&self.path, &records)
    }

    /// Remove every record matching `name` (case-insensitive) within one
    /// destination. Returns the first removed record for reply formatting.
    pub fn delete(&self, destination_id: &str, name: &str) -> Result<BirthdayRecord, BotError> {
        let mut records = self.records.lock().unwrap();
        let matches = |r: &BirthdayRecord| {
            r.group_id.as_deref() == Some(destination_id) && name_eq(&r.name, name)
        };
        let removed = records.iter().find(|r| matches(r)).cloned();
        match removed {
            Some(record) => {
                records.retain(|r| !matches(r));
                persist(&self.path, &records)?;
                Ok(record)
            }
            None => Err(BotError::NotFound),
        }
    }

    /// Records whose date equals `today`, in store order.
    ///
    /// Re-derived from the full collection on every call; no iterator state
    /// is cached between scheduler runs.
    pub fn due_today(&self, today: &str) -> Vec<BirthdayRecord> {
        let records = self.records.lock().unwrap();
        records.iter().filter(|r| r.date == today).cloned().collect()
    }

    /// All records registered for one destination.
    pub fn in_group(&self, destination_id: &str) -> Vec<BirthdayRecord> {
        let records = self.records.lock().unwrap();
        records
            .iter()
            .filter(|r| r.group_id.as_deref() == Some(destination_id))
            .cloned()
            .collect()
    }

    /// Case-insensitive name lookup within one destination.
    pub fn find_in_group(&self, destination_id: &str, name: &str) -> Option<BirthdayRecord> {
        let records = self.records.lock().unwrap();
        records
            .iter()
            .find(|r| {
                r.group_id.as_deref() == Some(destination_id) && name_eq(&r.name, name)
            })
            .cloned()
    }

    /// Live read of a record's delivered year.
    ///
    /// The scheduler re-checks through this instead of trusting its own
    /// copy, so an overlapping run's `mark_delivered` is always visible.
    pub fn last_delivered_year(&self, record: &BirthdayRecord) -> Option<i32> {
        let records = self.records.lock().unwrap();
        records
            .iter()
            .find(|r| r.same_identity(record))
            .and_then(|r| r.meta.last_reminder_year)
    }

    /// Record a successful delivery for `year` and persist.
    pub fn mark_delivered(&self, record: &BirthdayRecord, year: i32) -> Result<(), BotError> {
        self.update(record, |r| r.meta.last_reminder_year = Some(year))
    }

    /// Clear the delivered year so the next delivery attempt goes through.
    pub fn reset_delivery(&self, record: &BirthdayRecord) -> Result<(), BotError> {
        self.update(record, |r| r.meta.last_reminder_year = None)
    }

    /// Repair a record's destination id and persist.
    pub fn set_group_id(&self, record: &BirthdayRecord, group_id: &str) -> Result<(), BotError> {
        self.update(record, |r| r.group_id = Some(group_id.to_string()))
    }

    fn update(
        &self,
        record: &BirthdayRecord,
        mutate: impl FnOnce(&mut BirthdayRecord),
    ) -> Result<(), BotError> {
        let mut records = self.records.lock().unwrap();
        let target = records
            .iter_mut()
            .find(|r| r.same_identity(record))
            .ok_or(BotError::NotFound)?;
        mutate(target);
        persist(&self.path, &records)
    }

    /// Snapshot of the whole collection (read-only, for batch repair).
    pub fn all(&self) -> Vec<BirthdayRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

/// Write the collection to a temp file and rename it over the target, so a
/// crash mid-write never leaves a half-written record list behind.
///
/// A failed save keeps the in-memory mutation; the next successful persist
/// writes it out.
fn persist(path: &Path, records: &[BirthdayRecord]) -> Result<(), BotError> {
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| BotError::Storage(format!("Failed to serialize records: {}", e)))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .map_err(|e| BotError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| {
        BotError::Storage(format!("Failed to replace {}: {}", path.display(), e))
    })?;
    Ok(())
}
