//! StateStore: redb-backed persistence for Rollover.
//!
//! Provides raw KV access, an ordered task queue, and typed CRUD over the
//! local control-plane records. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(KV).map_err(map_err!(Table))?;
        txn.open_table(QUEUE).map_err(map_err!(Table))?;
        txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        txn.open_table(GROUPS).map_err(map_err!(Table))?;
        txn.open_table(LAUNCH_TEMPLATES).map_err(map_err!(Table))?;
        txn.open_table(REFRESHES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── KV ─────────────────────────────────────────────────────────

    /// Insert or replace a raw document.
    pub fn put_value(&self, key: &str, value: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(KV).map_err(map_err!(Table))?;
            table.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, bytes = value.len(), "kv document stored");
        Ok(())
    }

    /// Get a raw document.
    pub fn get_value(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(KV).map_err(map_err!(Table))?;
        let value = table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    /// List all documents whose key starts with `prefix`, in key order.
    ///
    /// Directory marker keys (ending in `/`) are returned as stored.
    pub fn list_values(&self, prefix: &str) -> StateResult<Vec<(String, Vec<u8>)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(KV).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(prefix) {
                break;
            }
            results.push((key.value().to_string(), value.value().to_vec()));
        }
        Ok(results)
    }

    // ── Queue ──────────────────────────────────────────────────────

    /// Append a message to `group_key`. The sequence counter and the
    /// message are committed in the same transaction.
    pub fn publish(&self, group_key: &str, body: &str) -> StateResult<QueuedMessage> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let message;
        {
            let mut counters = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
            let sequence = counters
                .get(QUEUE_SEQUENCE)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0)
                + 1;
            counters
                .insert(QUEUE_SEQUENCE, sequence)
                .map_err(map_err!(Write))?;

            message = QueuedMessage {
                id: format!("msg-{sequence:010}"),
                group_key: group_key.to_string(),
                sequence,
                body: body.to_string(),
                enqueued_at: epoch_secs(),
            };
            let value = serde_json::to_vec(&message).map_err(map_err!(Serialize))?;
            let mut queue = txn.open_table(QUEUE).map_err(map_err!(Table))?;
            queue
                .insert(message.table_key().as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id = %message.id, group = %group_key, "message published");
        Ok(message)
    }

    /// Remove and return the oldest message of `group_key`.
    pub fn receive(&self, group_key: &str) -> StateResult<Option<QueuedMessage>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let received;
        {
            let mut queue = txn.open_table(QUEUE).map_err(map_err!(Table))?;
            let found = first_in_group(&queue, group_key)?;
            if let Some(message) = &found {
                queue
                    .remove(message.table_key().as_str())
                    .map_err(map_err!(Write))?;
            }
            received = found;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if let Some(message) = &received {
            debug!(id = %message.id, group = %group_key, "message received");
        }
        Ok(received)
    }

    /// List messages of `group_key` in delivery order without removing them.
    pub fn pending(&self, group_key: &str) -> StateResult<Vec<QueuedMessage>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let queue = txn.open_table(QUEUE).map_err(map_err!(Table))?;
        let prefix = format!("{group_key}:");
        let mut results = Vec::new();
        for entry in queue.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let message: QueuedMessage =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if message.group_key == group_key {
                results.push(message);
            }
        }
        Ok(results)
    }

    // ── Groups ─────────────────────────────────────────────────────

    pub fn put_group(&self, group: &GroupRecord) -> StateResult<()> {
        self.put_record(GROUPS, &group.name, group)?;
        debug!(name = %group.name, "group stored");
        Ok(())
    }

    pub fn get_group(&self, name: &str) -> StateResult<Option<GroupRecord>> {
        self.get_record(GROUPS, name)
    }

    // ── Launch templates ───────────────────────────────────────────

    pub fn put_launch_template(&self, template: &LaunchTemplateRecord) -> StateResult<()> {
        self.put_record(LAUNCH_TEMPLATES, &template.id, template)?;
        debug!(id = %template.id, versions = template.versions.len(), "launch template stored");
        Ok(())
    }

    pub fn get_launch_template(&self, id: &str) -> StateResult<Option<LaunchTemplateRecord>> {
        self.get_record(LAUNCH_TEMPLATES, id)
    }

    // ── Refreshes ──────────────────────────────────────────────────

    /// Allocate the next instance refresh id.
    pub fn next_refresh_id(&self) -> StateResult<String> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let next;
        {
            let mut counters = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
            next = counters
                .get(REFRESH_SEQUENCE)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0)
                + 1;
            counters
                .insert(REFRESH_SEQUENCE, next)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(format!("refresh-{next:08}"))
    }

    pub fn put_refresh(&self, refresh: &RefreshRecord) -> StateResult<()> {
        self.put_record(REFRESHES, &refresh.table_key(), refresh)
    }

    pub fn get_refresh(&self, group_name: &str, id: &str) -> StateResult<Option<RefreshRecord>> {
        self.get_record(REFRESHES, &refresh_key(group_name, id))
    }

    /// List refreshes of a group in id order.
    pub fn list_refreshes(&self, group_name: &str) -> StateResult<Vec<RefreshRecord>> {
        let prefix = format!("{group_name}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REFRESHES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let refresh: RefreshRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if refresh.group_name == group_name {
                results.push(refresh);
            }
        }
        Ok(results)
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn put_record<T: Serialize>(&self, def: RecordTable, key: &str, record: &T) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_record<T: DeserializeOwned>(&self, def: RecordTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

/// Oldest message of `group_key`. Keys are `{group}:{seq:020}`, so the
/// group's messages sit contiguously and in sequence order under its prefix.
fn first_in_group(
    queue: &impl ReadableTable<&'static str, &'static [u8]>,
    group_key: &str,
) -> StateResult<Option<QueuedMessage>> {
    let prefix = format!("{group_key}:");
    for entry in queue.range(prefix.as_str()..).map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        if !key.value().starts_with(&prefix) {
            break;
        }
        let message: QueuedMessage =
            serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        if message.group_key == group_key {
            return Ok(Some(message));
        }
    }
    Ok(None)
}

pub(crate) fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    // ── KV ─────────────────────────────────────────────────────────

    #[test]
    fn kv_put_and_get() {
        let store = test_store();
        store.put_value("packer_manifest", br#"{"builds":[]}"#).unwrap();

        let value = store.get_value("packer_manifest").unwrap().unwrap();
        assert_eq!(value, br#"{"builds":[]}"#);
        assert!(store.get_value("missing").unwrap().is_none());
    }

    #[test]
    fn kv_list_by_prefix_in_key_order() {
        let store = test_store();
        store.put_value("rollover/groups/1/web", b"w").unwrap();
        store.put_value("rollover/groups/1/", b"").unwrap();
        store.put_value("rollover/groups/1/api", b"a").unwrap();
        store.put_value("rollover/groups/2/db", b"d").unwrap();

        let listed = store.list_values("rollover/groups/1/").unwrap();
        let keys: Vec<&str> = listed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["rollover/groups/1/", "rollover/groups/1/api", "rollover/groups/1/web"]
        );
    }

    #[test]
    fn kv_list_stops_at_prefix_boundary() {
        let store = test_store();
        store.put_value("rollover/a", b"1").unwrap();
        store.put_value("rollover/ab", b"2").unwrap();
        store.put_value("rollover0", b"3").unwrap();
        store.put_value("rollovera", b"4").unwrap();
        store.put_value("roll", b"5").unwrap();

        let listed = store.list_values("rollover/").unwrap();
        let keys: Vec<&str> = listed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["rollover/a", "rollover/ab"]);
        assert!(store.list_values("zzz").unwrap().is_empty());
        assert_eq!(store.list_values("").unwrap().len(), 5);
    }

    // ── Queue ──────────────────────────────────────────────────────

    #[test]
    fn queue_is_fifo_per_group() {
        let store = test_store();
        let first = store.publish("group-a", "one").unwrap();
        store.publish("group-b", "other").unwrap();
        let second = store.publish("group-a", "two").unwrap();
        assert_ne!(first.id, second.id);

        assert_eq!(store.receive("group-a").unwrap().unwrap().body, "one");
        assert_eq!(store.receive("group-a").unwrap().unwrap().body, "two");
        assert!(store.receive("group-a").unwrap().is_none());
        assert_eq!(store.receive("group-b").unwrap().unwrap().body, "other");
    }

    #[test]
    fn queue_order_survives_many_messages() {
        let store = test_store();
        for i in 0..25 {
            store.publish("g", &i.to_string()).unwrap();
        }
        let pending: Vec<String> = store
            .pending("g")
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        assert_eq!(pending, expected);
    }

    #[test]
    fn queue_groups_with_shared_prefix_stay_separate() {
        let store = test_store();
        store.publish("a:b", "nested").unwrap();
        store.publish("a", "plain").unwrap();

        assert_eq!(store.receive("a").unwrap().unwrap().body, "plain");
        assert!(store.receive("a").unwrap().is_none());
        assert_eq!(store.pending("a:b").unwrap().len(), 1);
    }

    #[test]
    fn queue_scan_skips_neighbouring_groups() {
        let store = test_store();
        store.publish("g", "first").unwrap();
        store.publish("g:0", "nested").unwrap();
        store.publish("g-other", "sibling").unwrap();
        store.publish("f", "before").unwrap();
        for i in 0..12 {
            store.publish("g", &format!("m{i}")).unwrap();
        }
        store.publish("h", "after").unwrap();

        let bodies: Vec<String> = store
            .pending("g")
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        let mut expected = vec!["first".to_string()];
        expected.extend((0..12).map(|i| format!("m{i}")));
        assert_eq!(bodies, expected);

        assert_eq!(store.receive("g").unwrap().unwrap().body, "first");
        assert_eq!(store.receive("g").unwrap().unwrap().body, "m0");
        assert_eq!(store.pending("g:0").unwrap().len(), 1);
        assert_eq!(store.pending("g-other").unwrap().len(), 1);
        assert!(store.pending("").unwrap().is_empty());
    }

    #[test]
    fn pending_does_not_consume() {
        let store = test_store();
        store.publish("g", "x").unwrap();
        assert_eq!(store.pending("g").unwrap().len(), 1);
        assert_eq!(store.pending("g").unwrap().len(), 1);
    }

    // ── Control plane ──────────────────────────────────────────────

    #[test]
    fn group_put_and_get() {
        let store = test_store();
        let group = GroupRecord {
            name: "web-prod".to_string(),
            launch_template_id: Some("lt-0abc".to_string()),
        };
        store.put_group(&group).unwrap();
        assert_eq!(store.get_group("web-prod").unwrap(), Some(group));
        assert!(store.get_group("nope").unwrap().is_none());
    }

    #[test]
    fn refresh_ids_are_unique() {
        let store = test_store();
        let a = store.next_refresh_id().unwrap();
        let b = store.next_refresh_id().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn refresh_put_get_and_list() {
        let store = test_store();
        for (group, id) in [("web", "r1"), ("web", "r2"), ("web-canary", "r3")] {
            store
                .put_refresh(&RefreshRecord {
                    id: id.to_string(),
                    group_name: group.to_string(),
                    status: "Pending".to_string(),
                    percent_complete: 0,
                    status_reason: None,
                    started_at: 1000,
                })
                .unwrap();
        }

        assert!(store.get_refresh("web", "r2").unwrap().is_some());
        assert!(store.get_refresh("web", "r3").unwrap().is_none());
        assert_eq!(store.list_refreshes("web").unwrap().len(), 2);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("rollover.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.publish("g", "queued").unwrap();
            store.put_value("packer_manifest", b"{}").unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.get_value("packer_manifest").unwrap().unwrap(), b"{}");
        let next = store.publish("g", "after").unwrap();
        assert_eq!(next.sequence, 2);
        assert_eq!(store.receive("g").unwrap().unwrap().body, "queued");
    }
}
