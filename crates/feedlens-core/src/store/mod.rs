//! Shared state store.
//!
//! The only channel between contexts that cannot call each other directly.
//! Every value lives under one key of a flat namespace and is overwritten
//! wholesale. The analysis slot is a set of related keys that always hold the
//! outcome of exactly one request; the slot keys are written together in one
//! transaction so a reader never sees the source text of one request next to
//! the result of another.
//!
//! Database location priority:
//! 1. FEEDLENS_DATABASE_PATH env var
//! 2. `<data_dir>/state.db` (resolved by the CLI configuration)

mod migrations;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{AnalysisResult, Credentials};

/// Persisted state keys.
pub mod keys {
    pub const API_KEY: &str = "credentials.apiKey";
    pub const MODEL_NAME: &str = "credentials.modelName";
    pub const LAST_ANALYZED_POST: &str = "lastAnalyzedPost";
    pub const LAST_GENERATED_INSIGHTS: &str = "lastGeneratedInsights";
    pub const LAST_ANALYSIS_TIMESTAMP: &str = "lastAnalysisTimestamp";
    pub const LAST_ANALYSIS_ERROR: &str = "lastAnalysisError";
    pub const LAST_REQUEST_ID: &str = "lastRequestId";

    /// Keys whose change means the rendered result may be stale.
    pub const RESULT_KEYS: &[&str] = &[LAST_GENERATED_INSIGHTS, LAST_ANALYSIS_ERROR];
}

/// Keys written by one store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub keys: Vec<String>,
}

impl StateChange {
    /// Whether the change touches the result or error keys.
    pub fn touches_result(&self) -> bool {
        self.keys
            .iter()
            .any(|k| keys::RESULT_KEYS.contains(&k.as_str()))
    }
}

/// Snapshot of the analysis slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotView {
    pub request_id: Option<String>,
    pub source_text: Option<String>,
    pub insights_text: Option<String>,
    pub error: Option<String>,
    pub timestamp: Option<i64>,
}

impl SlotView {
    /// Completed outcome held by the slot, if any.
    pub fn outcome(&self) -> Option<AnalysisResult> {
        let request_id = self.request_id.clone().unwrap_or_default();
        let source_text = self.source_text.clone().unwrap_or_default();
        let timestamp = self.timestamp.unwrap_or_default();
        if let Some(insights_text) = &self.insights_text {
            return Some(AnalysisResult::Success {
                request_id,
                source_text,
                insights_text: insights_text.clone(),
                timestamp,
            });
        }
        self.error.as_ref().map(|error_message| AnalysisResult::Failure {
            request_id,
            source_text,
            error_message: error_message.clone(),
            timestamp,
        })
    }

    /// A request has been accepted but has not completed yet.
    pub fn is_pending(&self) -> bool {
        self.source_text.is_some() && self.insights_text.is_none() && self.error.is_none()
    }
}

/// SQLite-backed key/value store.
///
/// Thread-safe via internal Mutex. All operations acquire the lock.
pub struct StateStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StateChange>,
}

impl StateStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        debug!(path = %path.display(), "Opened state store");
        Self::from_connection(conn)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        let (changes, _) = broadcast::channel(64);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    /// Observe writes made through this store handle.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Generic Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a value. Missing keys and stored `null` both read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value_json FROM state_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(serde_json::from_str::<Option<T>>(&json)?),
            None => Ok(None),
        }
    }

    /// Overwrite one key.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_many(&[(key, serde_json::to_value(value)?)])
    }

    /// Overwrite several keys in a single transaction.
    pub fn set_many(&self, entries: &[(&str, Value)]) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        {
            let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
            let tx = conn.transaction()?;
            for (key, value) in entries {
                tx.execute(
                    "INSERT INTO state_entries (key, value_json, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json,
                                                    updated_at = excluded.updated_at",
                    params![key, serde_json::to_string(value)?, now],
                )?;
            }
            Self::bump_revision(&tx)?;
            tx.commit()?;
        }
        self.publish(entries.iter().map(|(k, _)| k.to_string()).collect());
        Ok(())
    }

    /// Delete a key.
    pub fn remove(&self, key: &str) -> Result<()> {
        {
            let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM state_entries WHERE key = ?1", params![key])?;
            Self::bump_revision(&tx)?;
            tx.commit()?;
        }
        self.publish(vec![key.to_string()]);
        Ok(())
    }

    /// Write counter, shared by every process using the same database file.
    pub fn revision(&self) -> Result<i64> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let revision: Option<i64> = conn
            .query_row(
                "SELECT value FROM state_meta WHERE name = 'revision'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(revision.unwrap_or(0))
    }

    fn bump_revision(tx: &rusqlite::Transaction<'_>) -> Result<()> {
        tx.execute(
            "INSERT INTO state_meta (name, value) VALUES ('revision', 1)
             ON CONFLICT(name) DO UPDATE SET value = value + 1",
            [],
        )?;
        Ok(())
    }

    fn publish(&self, keys: Vec<String>) {
        // No subscribers is fine.
        let _ = self.changes.send(StateChange { keys });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Credentials
    // ─────────────────────────────────────────────────────────────────────────

    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            api_key: self.get(keys::API_KEY)?,
            model_name: self.get(keys::MODEL_NAME)?,
        })
    }

    pub fn set_api_key(&self, api_key: &str) -> Result<()> {
        self.set(keys::API_KEY, &api_key)
    }

    pub fn set_model_name(&self, model_name: &str) -> Result<()> {
        self.set(keys::MODEL_NAME, &model_name)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Analysis Slot
    // ─────────────────────────────────────────────────────────────────────────

    /// Read every slot key.
    pub fn read_slot(&self) -> Result<SlotView> {
        Ok(SlotView {
            request_id: self.get(keys::LAST_REQUEST_ID)?,
            source_text: self.get(keys::LAST_ANALYZED_POST)?,
            insights_text: self.get(keys::LAST_GENERATED_INSIGHTS)?,
            error: self.get(keys::LAST_ANALYSIS_ERROR)?,
            timestamp: self.get(keys::LAST_ANALYSIS_TIMESTAMP)?,
        })
    }

    /// Claim the slot for a newly accepted request, clearing the previous outcome.
    pub fn mark_pending(&self, request_id: &str, source_text: &str) -> Result<()> {
        self.set_many(&[
            (keys::LAST_REQUEST_ID, Value::from(request_id)),
            (keys::LAST_ANALYZED_POST, Value::from(source_text)),
            (keys::LAST_GENERATED_INSIGHTS, Value::Null),
            (keys::LAST_ANALYSIS_TIMESTAMP, Value::Null),
            (keys::LAST_ANALYSIS_ERROR, Value::Null),
        ])
    }

    /// Write a completed outcome over the whole slot.
    pub fn write_outcome(&self, result: &AnalysisResult) -> Result<()> {
        let (insights, error) = match result {
            AnalysisResult::Success { insights_text, .. } => {
                (Value::from(insights_text.as_str()), Value::Null)
            }
            AnalysisResult::Failure { error_message, .. } => {
                (Value::Null, Value::from(error_message.as_str()))
            }
        };
        let current: Option<String> = self.get(keys::LAST_REQUEST_ID)?;
        if current.as_deref().is_some_and(|id| id != result.request_id()) {
            warn!(
                request_id = %result.request_id(),
                current = ?current,
                "Overwriting slot claimed by a newer request"
            );
        }
        self.set_many(&[
            (keys::LAST_REQUEST_ID, Value::from(result.request_id())),
            (keys::LAST_ANALYZED_POST, Value::from(result.source_text())),
            (keys::LAST_GENERATED_INSIGHTS, insights),
            (keys::LAST_ANALYSIS_TIMESTAMP, Value::from(result.timestamp())),
            (keys::LAST_ANALYSIS_ERROR, error),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn success(id: &str, text: &str) -> AnalysisResult {
        AnalysisResult::Success {
            request_id: id.into(),
            source_text: text.into(),
            insights_text: "- one".into(),
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_get_set_remove() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.get::<String>("missing").unwrap(), None);

        store.set("k", &"v").unwrap();
        assert_eq!(store.get::<String>("k").unwrap().as_deref(), Some("v"));

        store.set("k", &Value::Null).unwrap();
        assert_eq!(store.get::<String>("k").unwrap(), None);

        store.set("k", &42).unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get::<i64>("k").unwrap(), None);
    }

    #[test]
    fn test_revision_counts_writes() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.revision().unwrap(), 0);
        store.set("a", &1).unwrap();
        store.set_many(&[("b", Value::from(2)), ("c", Value::from(3))]).unwrap();
        assert_eq!(store.revision().unwrap(), 2);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("state.db");
        {
            let store = StateStore::open(&path).unwrap();
            store.set_api_key("sk-test").unwrap();
        }
        let store = StateStore::open(&path).unwrap();
        let creds = store.credentials().unwrap();
        assert_eq!(creds.api_key(), Some("sk-test"));
        assert_eq!(creds.model(), crate::types::DEFAULT_MODEL);
    }

    #[test]
    fn test_slot_success_then_failure_supersedes() {
        let store = StateStore::open_in_memory().unwrap();
        store.write_outcome(&success("r1", "first post")).unwrap();
        assert_eq!(store.read_slot().unwrap().outcome(), Some(success("r1", "first post")));

        store
            .write_outcome(&AnalysisResult::Failure {
                request_id: "r2".into(),
                source_text: "second post".into(),
                error_message: "API failed: 500. ".into(),
                timestamp: 1_700_000_000_500,
            })
            .unwrap();

        let slot = store.read_slot().unwrap();
        assert_eq!(slot.request_id.as_deref(), Some("r2"));
        assert_eq!(slot.source_text.as_deref(), Some("second post"));
        assert_eq!(slot.insights_text, None);
        assert_eq!(slot.error.as_deref(), Some("API failed: 500. "));
        assert!(!slot.outcome().unwrap().is_success());
    }

    #[test]
    fn test_mark_pending_clears_outcome() {
        let store = StateStore::open_in_memory().unwrap();
        store.write_outcome(&success("r1", "first")).unwrap();
        store.mark_pending("r2", "second").unwrap();

        let slot = store.read_slot().unwrap();
        assert!(slot.is_pending());
        assert_eq!(slot.outcome(), None);
        assert_eq!(slot.request_id.as_deref(), Some("r2"));
        assert_eq!(slot.timestamp, None);
    }

    #[tokio::test]
    async fn test_subscribe_reports_written_keys() {
        let store = StateStore::open_in_memory().unwrap();
        let mut rx = store.subscribe();

        store.set_model_name("model-x").unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.keys, vec![keys::MODEL_NAME.to_string()]);
        assert!(!change.touches_result());

        store.write_outcome(&success("r1", "post")).unwrap();
        let change = rx.recv().await.unwrap();
        assert!(change.touches_result());
        assert_eq!(change.keys.len(), 5);
    }
}
