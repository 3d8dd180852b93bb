// ABOUTME: Durable ledger of transactions already forwarded to the marketing platform
// ABOUTME: JSON file written atomically; a corrupt file aborts the run before any network call

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::TransactionKind;

const LEDGER_VERSION: u32 = 1;

/// Above this many entries, loading logs a warning so an operator knows to
/// archive the file before it grows unwieldy. Entries are never dropped
/// automatically.
const SIZE_WARNING_THRESHOLD: usize = 10_000;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read ledger file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but cannot be trusted. Running against a ledger we
    /// cannot read would re-deliver everything it recorded, so the caller
    /// must abort instead of treating this as an empty ledger.
    #[error(
        "ledger file {} is corrupt: {detail}. \
         Refusing to run: continuing would re-send every transaction it recorded. \
         Restore the file from backup or move it aside to deliberately start fresh.",
        .path.display()
    )]
    Corrupt { path: PathBuf, detail: String },

    #[error(
        "ledger file {} was written by a newer retail-sync version ({found} > {supported}). \
         Upgrade this CLI or restore an older ledger.",
        .path.display()
    )]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("failed to write ledger file {}: {detail}", .path.display())]
    Write { path: PathBuf, detail: String },
}

/// Result of a forwarding attempt, as remembered across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    /// Delivered and acknowledged by the sink. Never sent again.
    Success,
    /// Rejected for a reason a retry cannot fix. Skipped on later runs
    /// but kept visible in failure counts until an operator clears it.
    Failed,
}

/// One remembered forwarding attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub synced_at: DateTime<Utc>,
    pub outcome: SyncOutcome,
}

/// The persisted dedup state: every transaction this installation has ever
/// forwarded (or permanently failed to forward), keyed by "<kind>:<id>".
///
/// Unknown JSON fields are ignored on load and optional fields default, so
/// files survive round-trips across versions in both directions as long as
/// the major `version` matches.
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncLedger {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    entries: HashMap<String, LedgerEntry>,
    #[serde(skip)]
    dirty: bool,
}

impl Default for SyncLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncLedger {
    pub fn new() -> Self {
        Self {
            version: LEDGER_VERSION,
            updated_at: Utc::now(),
            entries: HashMap::new(),
            dirty: false,
        }
    }

    /// Ledger key for a transaction, e.g. "sale:1041".
    pub fn key(kind: TransactionKind, id: &str) -> String {
        format!("{}:{}", kind.as_str(), id)
    }

    /// True iff this transaction was already delivered successfully.
    /// Failed entries do not count: callers that care about quarantine
    /// inspect `outcome` instead.
    pub fn contains(&self, kind: TransactionKind, id: &str) -> bool {
        matches!(
            self.entries.get(&Self::key(kind, id)),
            Some(entry) if entry.outcome == SyncOutcome::Success
        )
    }

    /// The remembered outcome for a transaction, if any.
    pub fn outcome(&self, kind: TransactionKind, id: &str) -> Option<SyncOutcome> {
        self.entries.get(&Self::key(kind, id)).map(|e| e.outcome)
    }

    /// Record the outcome of a forwarding attempt. Overwrites any earlier
    /// entry for the same transaction.
    pub fn record(
        &mut self,
        kind: TransactionKind,
        id: &str,
        outcome: SyncOutcome,
        synced_at: DateTime<Utc>,
    ) {
        self.entries
            .insert(Self::key(kind, id), LedgerEntry { synced_at, outcome });
        self.updated_at = synced_at;
        self.dirty = true;
    }

    /// Remove one entry so the next run re-delivers that transaction.
    /// Returns false if no such entry existed.
    pub fn remove(&mut self, kind: TransactionKind, id: &str) -> bool {
        let removed = self.entries.remove(&Self::key(kind, id)).is_some();
        if removed {
            self.updated_at = Utc::now();
            self.dirty = true;
        }
        removed
    }

    /// Drop every entry. The next run re-delivers everything in its window.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        if dropped > 0 {
            self.entries.clear();
            self.updated_at = Utc::now();
            self.dirty = true;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (successes, failures) entry counts.
    pub fn counts(&self) -> (usize, usize) {
        let successes = self
            .entries
            .values()
            .filter(|e| e.outcome == SyncOutcome::Success)
            .count();
        (successes, self.entries.len() - successes)
    }

    /// Failed entries sorted by key, for operator inspection.
    pub fn failures(&self) -> Vec<(&str, &LedgerEntry)> {
        let mut failed: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.outcome == SyncOutcome::Failed)
            .map(|(key, entry)| (key.as_str(), entry))
            .collect();
        failed.sort_by_key(|(key, _)| *key);
        failed
    }

    /// True if there are recorded changes not yet saved to disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Load the ledger from disk. A missing file is an empty ledger; an
    /// unreadable or unparsable file is an error the caller must not
    /// paper over.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No ledger file at {}, starting fresh", path.display());
                return Ok(Self::new());
            }
            Err(err) => {
                return Err(LedgerError::Io {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        };

        let ledger: SyncLedger =
            serde_json::from_str(&contents).map_err(|err| LedgerError::Corrupt {
                path: path.to_path_buf(),
                detail: err.to_string(),
            })?;

        if ledger.version > LEDGER_VERSION {
            return Err(LedgerError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: ledger.version,
                supported: LEDGER_VERSION,
            });
        }

        if ledger.len() > SIZE_WARNING_THRESHOLD {
            tracing::warn!(
                "Ledger at {} holds {} entries (threshold {}); consider archiving it",
                path.display(),
                ledger.len(),
                SIZE_WARNING_THRESHOLD
            );
        }

        tracing::debug!(
            "Loaded ledger from {} ({} entries)",
            path.display(),
            ledger.len()
        );
        Ok(ledger)
    }

    /// Save the ledger atomically: write a temp file in the same directory,
    /// then rename it over the old file. A crash mid-save leaves either the
    /// old ledger or the new one, never a truncated file.
    pub fn save(&mut self, path: &Path) -> Result<(), LedgerError> {
        let write_err = |detail: String| LedgerError::Write {
            path: path.to_path_buf(),
            detail,
        };

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            std::fs::create_dir_all(dir).map_err(|e| write_err(e.to_string()))?;
        }

        let contents =
            serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))
            .map_err(|e| write_err(e.to_string()))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| write_err(e.to_string()))?;
        tmp.persist(path).map_err(|e| write_err(e.error.to_string()))?;

        self.dirty = false;
        tracing::debug!("Saved ledger to {} ({} entries)", path.display(), self.len());
        Ok(())
    }
}
