//! Hybrid hot/cold persistence (component C6).
//!
//! The hot store is an in-memory, synchronous, per-mutation cache of each
//! live session's document — reads never leave the process. The cold store
//! is the durable record: it is written only on an idle flush, an explicit
//! REST write, or every [`sequencer_core::document::SERVER_SEQ_FLUSH_INTERVAL`]
//! broadcasts, never on every mutation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sequencer_core::document::SessionDocument;

use crate::error::PersistenceError;

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Seconds remaining until the next UTC midnight, used as the `Retry-After`
/// hint for a quota-exceeded write (quotas are expected to free up on the
/// daily rollover).
fn seconds_until_next_midnight_utc() -> u64 {
    const SECS_PER_DAY: u64 = 86_400;
    let now_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    SECS_PER_DAY - (now_secs % SECS_PER_DAY)
}

/// The durable record for one session: document plus the metadata that
/// lives alongside it but outside the replicated document (name,
/// publication state, sequencing checkpoint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    pub document: SessionDocument,
    pub immutable: bool,
    pub server_seq: u64,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub remixed_from: Option<String>,
    #[serde(default)]
    pub remixed_from_name: Option<String>,
    #[serde(default)]
    pub remix_count: u64,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>) -> SessionRecord {
        let now = now_unix_millis();
        SessionRecord {
            id: id.into(),
            name: "Untitled Session".to_string(),
            document: SessionDocument::default(),
            immutable: false,
            server_seq: 0,
            created_at: now,
            updated_at: now,
            remixed_from: None,
            remixed_from_name: None,
            remix_count: 0,
        }
    }
}

/// In-memory cache of live sessions' documents, keyed by session id.
/// Every actor mutation writes through here synchronously; REST reads for
/// a live session are served from here instead of round-tripping through
/// the actor's command channel.
pub trait HotStore: Send + Sync {
    fn get(&self, id: &str) -> Option<SessionDocument>;
    fn put(&self, id: &str, doc: SessionDocument);
    fn remove(&self, id: &str);
}

#[derive(Default)]
pub struct InMemoryHotStore {
    inner: RwLock<HashMap<String, SessionDocument>>,
}

impl HotStore for InMemoryHotStore {
    fn get(&self, id: &str) -> Option<SessionDocument> {
        self.inner.read().get(id).cloned()
    }

    fn put(&self, id: &str, doc: SessionDocument) {
        self.inner.write().insert(id.to_string(), doc);
    }

    fn remove(&self, id: &str) {
        self.inner.write().remove(id);
    }
}

/// Durable session storage. Implementations are free to enforce a
/// `max_sessions` quota; callers must be prepared for
/// [`PersistenceError::QuotaExceeded`] on `save` of a session that does
/// not already exist.
pub trait ColdStore: Send + Sync {
    fn load(&self, id: &str) -> Result<Option<SessionRecord>, PersistenceError>;
    fn save(&self, record: &SessionRecord) -> Result<(), PersistenceError>;
    fn exists(&self, id: &str) -> Result<bool, PersistenceError>;
    fn count(&self) -> Result<usize, PersistenceError>;
}

/// Filesystem-backed cold store: one JSON file per session under `dir`.
pub struct FsColdStore {
    dir: PathBuf,
    max_sessions: usize,
}

impl FsColdStore {
    pub fn new(dir: impl Into<PathBuf>, max_sessions: usize) -> FsColdStore {
        FsColdStore {
            dir: dir.into(),
            max_sessions,
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl ColdStore for FsColdStore {
    fn load(&self, id: &str) -> Result<Option<SessionRecord>, PersistenceError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let record: SessionRecord = serde_json::from_str(&raw)?;
        Ok(Some(record))
    }

    fn save(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&record.id);
        if !path.exists() && self.count()? >= self.max_sessions {
            return Err(PersistenceError::QuotaExceeded {
                retry_after_secs: seconds_until_next_midnight_utc(),
            });
        }
        let json = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn exists(&self, id: &str) -> Result<bool, PersistenceError> {
        Ok(self.path_for(id).exists())
    }

    fn count(&self) -> Result<usize, PersistenceError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut n = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                n += 1;
            }
        }
        Ok(n)
    }
}

/// Re-derive a fresh [`SessionRecord`] from a repaired document, bumping
/// `updatedAt`. Used when flushing the hot store to the cold store.
pub fn checkpoint(existing: &SessionRecord, doc: SessionDocument, server_seq: u64) -> SessionRecord {
    SessionRecord {
        id: existing.id.clone(),
        name: existing.name.clone(),
        document: doc,
        immutable: existing.immutable,
        server_seq,
        created_at: existing.created_at,
        updated_at: now_unix_millis(),
        remixed_from: existing.remixed_from.clone(),
        remixed_from_name: existing.remixed_from_name.clone(),
        remix_count: existing.remix_count,
    }
}

pub fn data_dir_or_default(path: &Path) -> PathBuf {
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hot_store_round_trips() {
        let store = InMemoryHotStore::default();
        assert!(store.get("s1").is_none());
        store.put("s1", SessionDocument::default());
        assert!(store.get("s1").is_some());
        store.remove("s1");
        assert!(store.get("s1").is_none());
    }

    #[test]
    fn cold_store_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FsColdStore::new(dir.path(), 10);
        let record = SessionRecord::new("abc");
        store.save(&record).unwrap();
        let loaded = store.load("abc").unwrap().unwrap();
        assert_eq!(loaded.id, "abc");
        assert_eq!(loaded.document, SessionDocument::default());
    }

    #[test]
    fn cold_store_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = FsColdStore::new(dir.path(), 10);
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn cold_store_enforces_quota_for_new_sessions() {
        let dir = tempdir().unwrap();
        let store = FsColdStore::new(dir.path(), 1);
        store.save(&SessionRecord::new("a")).unwrap();
        let err = store.save(&SessionRecord::new("b")).unwrap_err();
        assert!(matches!(err, PersistenceError::QuotaExceeded { .. }));
    }

    #[test]
    fn cold_store_quota_does_not_block_updates_to_existing_session() {
        let dir = tempdir().unwrap();
        let store = FsColdStore::new(dir.path(), 1);
        let mut record = SessionRecord::new("a");
        store.save(&record).unwrap();
        record.name = "renamed".to_string();
        store.save(&record).unwrap();
        assert_eq!(store.load("a").unwrap().unwrap().name, "renamed");
    }
}
