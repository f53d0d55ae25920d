//! Digest store: per-[`SyncKey`] record of the last pushed content digest.
//!
//! Persists a JSON object at a caller-chosen path:
//!
//! ```json
//! {
//!   "docker.io/library/redis:7": {
//!     "digest": "sha256:…",
//!     "lastSyncTime": "2024-05-01T10:00:00Z"
//!   }
//! }
//! ```
//!
//! Loading never fails: a missing, empty or unreadable file is an empty
//! store. Writes use the atomic `.tmp` + rename pattern so a reader never
//! observes a half-written file.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use imgsync_core::types::{DigestRecord, SyncKey};

use crate::error::{io_err, SyncError};

/// In-memory digest store. Keys are kept sorted so saved files diff cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestStore {
    records: BTreeMap<SyncKey, DigestRecord>,
}

impl DigestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SyncKey) -> Option<&DigestRecord> {
        self.records.get(key)
    }

    /// Insert or overwrite the record for `key`.
    pub fn put(&mut self, key: SyncKey, record: DigestRecord) {
        self.records.insert(key, record);
    }

    pub fn contains(&self, key: &SyncKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SyncKey, &DigestRecord)> {
        self.records.iter()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DigestStoreCompat {
    Current(BTreeMap<SyncKey, DigestRecord>),
    Legacy(Vec<LegacyEntry>),
}

/// Entry of the older append-only success log (`[{image, digest, sync_time}]`).
#[derive(Debug, Deserialize)]
struct LegacyEntry {
    image: String,
    digest: Option<String>,
    sync_time: Option<String>,
}

/// Load the digest store at `path`.
///
/// Returns an empty store if the file is missing, blank, unreadable or not
/// a recognised layout.
pub fn load_at(path: &Path) -> DigestStore {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::debug!("no digest store at {}, starting empty", path.display());
            return DigestStore::new();
        }
        Err(err) => {
            tracing::warn!(
                "cannot read digest store {}: {err}; starting empty",
                path.display()
            );
            return DigestStore::new();
        }
    };

    if contents.trim().is_empty() {
        return DigestStore::new();
    }

    match serde_json::from_str::<DigestStoreCompat>(&contents) {
        Ok(DigestStoreCompat::Current(records)) => DigestStore { records },
        Ok(DigestStoreCompat::Legacy(entries)) => {
            tracing::info!(
                "migrating {} legacy entries from {}",
                entries.len(),
                path.display()
            );
            migrate_legacy(entries)
        }
        Err(err) => {
            tracing::warn!(
                "digest store {} is not valid: {err}; starting empty",
                path.display()
            );
            DigestStore::new()
        }
    }
}

/// Save the digest store atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_at(path: &Path, store: &DigestStore) -> Result<(), SyncError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let json = serde_json::to_string_pretty(store)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Registry the old success log prefixed to names configured without one.
const LEGACY_DEFAULT_REGISTRY: &str = "docker.io/";

// Later entries win; entries without a digest still mark the key as synced.
fn migrate_legacy(entries: Vec<LegacyEntry>) -> DigestStore {
    let mut store = DigestStore::new();
    for entry in entries {
        let synced_at = entry
            .sync_time
            .as_deref()
            .and_then(parse_legacy_time)
            .unwrap_or_else(Utc::now);
        let record = DigestRecord::new(entry.digest.unwrap_or_default(), synced_at);
        for key in legacy_keys(&entry.image) {
            store.put(key, record.clone());
        }
    }
    store
}

/// Keys a legacy `image` may be looked up under.
///
/// The old log always qualified names with a registry, `docker.io` when the
/// config gave none, so `docker.io/nginx:1.25` also answers for a config
/// entry `{"name": "nginx"}`, whose key is `nginx:1.25`.
fn legacy_keys(image: &str) -> Vec<SyncKey> {
    let mut keys = vec![SyncKey::from(image)];
    if let Some(bare) = image
        .strip_prefix(LEGACY_DEFAULT_REGISTRY)
        .filter(|bare| !bare.is_empty())
    {
        keys.push(SyncKey::from(bare));
    }
    keys
}

fn parse_legacy_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
