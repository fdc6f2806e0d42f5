//! Path-addressed document store
//!
//! The session, history and profile layers talk to persistence only through
//! [`DocumentStore`]. Two implementations ship with the crate: an in-process
//! [`MemoryStore`] and a SQLite-backed [`SqliteStore`].

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;

/// A stored document
pub type Document = Value;

/// What a subscriber receives after a change
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// Current value of a watched document (None once deleted)
    Document(Option<Document>),
    /// All documents of a watched collection, as (id, document)
    Collection(Vec<(String, Document)>),
}

/// Subscriber callback
pub type WatchCallback = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Persistence collaborator
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError>;

    /// Overwrite the document at `path`
    async fn put(&self, path: &str, doc: Document) -> Result<(), StoreError>;

    /// Shallow top-level merge; creates the document if absent
    async fn merge(&self, path: &str, partial: Document) -> Result<(), StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Store `doc` under a generated id inside `collection`
    async fn append_to_collection(&self, collection: &str, doc: Document) -> Result<String, StoreError>;

    async fn list_collection(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError>;

    /// Watch a document path or a collection path. Dropping the returned
    /// handle unsubscribes.
    fn subscribe(&self, path: &str, callback: WatchCallback) -> Subscription;
}

/// Per-user document locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPaths {
    pub profile: String,
    pub in_progress: String,
    pub completed: String,
}

impl UserPaths {
    pub fn for_user(user_id: &str) -> Self {
        let root = format!("users/{}", user_id);
        Self {
            profile: format!("{}/profile/data", root),
            in_progress: format!("{}/inProgressWorkout/current", root),
            completed: format!("{}/completedWorkouts", root),
        }
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn id_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, id)| id).unwrap_or(path)
}

/// Shallow merge of `partial` into `existing`
fn merge_documents(path: &str, existing: Option<Document>, partial: Document) -> Result<Document, StoreError> {
    let Value::Object(fields) = partial else {
        return Err(StoreError::NotAnObject { path: path.to_string() });
    };
    let mut target = match existing {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(StoreError::NotAnObject { path: path.to_string() }),
    };
    for (key, value) in fields {
        target.insert(key, value);
    }
    Ok(Value::Object(target))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Subscriber registry shared by the store implementations
#[derive(Default)]
pub struct Watchers {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, (String, WatchCallback)>>,
}

impl Watchers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(self: &Arc<Self>, path: &str, callback: WatchCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).insert(id, (path.to_string(), callback));
        Subscription { id, watchers: Arc::downgrade(self) }
    }

    fn remove(&self, id: u64) {
        lock(&self.entries).remove(&id);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watchers affected by a write to `changed`: the document itself or its
    /// parent collection
    fn interested(&self, changed: &str) -> Vec<(String, WatchCallback)> {
        let parent = parent_of(changed);
        lock(&self.entries)
            .values()
            .filter(|(path, _)| path == changed || path == parent)
            .map(|(path, cb)| (path.clone(), Arc::clone(cb)))
            .collect()
    }

    /// Deliver fresh snapshots to everyone watching `changed`
    pub async fn notify<S: DocumentStore + ?Sized>(&self, store: &S, changed: &str) {
        for (path, callback) in self.interested(changed) {
            let snapshot = if path == changed {
                store.get(&path).await.map(Snapshot::Document)
            } else {
                store.list_collection(&path).await.map(Snapshot::Collection)
            };
            match snapshot {
                Ok(snapshot) => callback(&snapshot),
                Err(e) => warn!(path = %path, error = %e, "Skipping subscriber notification"),
            }
        }
    }
}

/// Handle returned by [`DocumentStore::subscribe`]
pub struct Subscription {
    id: u64,
    watchers: Weak<Watchers>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(watchers) = self.watchers.upgrade() {
            watchers.remove(self.id);
        }
    }
}

/// In-process store.
///
/// `fail_writes_matching` makes every write whose path contains the given
/// fragment fail as if the backend were unreachable; `heal` clears it.
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, Document>>,
    watchers: Arc<Watchers>,
    failing: Mutex<Option<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { docs: Mutex::new(BTreeMap::new()), watchers: Watchers::new(), failing: Mutex::new(None) }
    }

    /// Simulate an outage for writes touching `fragment` ("" = every write)
    pub fn fail_writes_matching(&self, fragment: impl Into<String>) {
        *lock(&self.failing) = Some(fragment.into());
    }

    pub fn heal(&self) {
        *lock(&self.failing) = None;
    }

    pub fn document_count(&self) -> usize {
        lock(&self.docs).len()
    }

    fn check_writable(&self, path: &str) -> Result<(), StoreError> {
        match lock(&self.failing).as_deref() {
            Some(fragment) if path.contains(fragment) => Err(StoreError::Unavailable {
                path: path.to_string(),
                reason: "simulated outage".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        Ok(lock(&self.docs).get(path).cloned())
    }

    async fn put(&self, path: &str, doc: Document) -> Result<(), StoreError> {
        self.check_writable(path)?;
        lock(&self.docs).insert(path.to_string(), doc);
        debug!(path, "put");
        self.watchers.notify(self, path).await;
        Ok(())
    }

    async fn merge(&self, path: &str, partial: Document) -> Result<(), StoreError> {
        self.check_writable(path)?;
        {
            let mut docs = lock(&self.docs);
            let merged = merge_documents(path, docs.get(path).cloned(), partial)?;
            docs.insert(path.to_string(), merged);
        }
        debug!(path, "merge");
        self.watchers.notify(self, path).await;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.check_writable(path)?;
        lock(&self.docs).remove(path);
        debug!(path, "delete");
        self.watchers.notify(self, path).await;
        Ok(())
    }

    async fn append_to_collection(&self, collection: &str, doc: Document) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.put(&format!("{}/{}", collection, id), doc).await?;
        Ok(id)
    }

    async fn list_collection(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        Ok(lock(&self.docs)
            .iter()
            .filter(|(path, _)| parent_of(path) == collection)
            .map(|(path, doc)| (id_of(path).to_string(), doc.clone()))
            .collect())
    }

    fn subscribe(&self, path: &str, callback: WatchCallback) -> Subscription {
        self.watchers.register(path, callback)
    }
}

/// SQLite-backed store: one row per document, JSON bodies
pub struct SqliteStore {
    conn: Mutex<Connection>,
    watchers: Arc<Watchers>,
}

impl SqliteStore {
    /// Create or open a store at the specified path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self { conn: Mutex::new(conn), watchers: Watchers::new() };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = lock(&self.conn);
        // journal_mode returns a row, so it cannot go through execute()
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA synchronous=NORMAL", [])?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                parent TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents (parent)", [])?;
        Ok(())
    }

    fn write(conn: &Connection, path: &str, doc: &Document) -> Result<(), StoreError> {
        conn.execute(
            r#"
            INSERT INTO documents (path, parent, body, updated_at)
            VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
            ON CONFLICT(path) DO UPDATE SET body = excluded.body, updated_at = CURRENT_TIMESTAMP
            "#,
            params![path, parent_of(path), doc],
        )?;
        Ok(())
    }

    fn read(conn: &Connection, path: &str) -> Result<Option<Document>, StoreError> {
        Ok(conn
            .query_row("SELECT body FROM documents WHERE path = ?1", params![path], |row| row.get::<_, Value>(0))
            .optional()?)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        let conn = lock(&self.conn);
        Self::read(&conn, path)
    }

    async fn put(&self, path: &str, doc: Document) -> Result<(), StoreError> {
        {
            let conn = lock(&self.conn);
            Self::write(&conn, path, &doc)?;
        }
        debug!(path, "put");
        self.watchers.notify(self, path).await;
        Ok(())
    }

    async fn merge(&self, path: &str, partial: Document) -> Result<(), StoreError> {
        {
            let mut conn = lock(&self.conn);
            let tx = conn.transaction()?;
            let merged = merge_documents(path, Self::read(&tx, path)?, partial)?;
            Self::write(&tx, path, &merged)?;
            tx.commit()?;
        }
        debug!(path, "merge");
        self.watchers.notify(self, path).await;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        {
            let conn = lock(&self.conn);
            conn.execute("DELETE FROM documents WHERE path = ?1", params![path])?;
        }
        debug!(path, "delete");
        self.watchers.notify(self, path).await;
        Ok(())
    }

    async fn append_to_collection(&self, collection: &str, doc: Document) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.put(&format!("{}/{}", collection, id), doc).await?;
        Ok(id)
    }

    async fn list_collection(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare("SELECT path, body FROM documents WHERE parent = ?1 ORDER BY path")?;
        let rows = stmt.query_map(params![collection], |row| {
            let path: String = row.get(0)?;
            let body: Value = row.get(1)?;
            Ok((id_of(&path).to_string(), body))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }
        Ok(documents)
    }

    fn subscribe(&self, path: &str, callback: WatchCallback) -> Subscription {
        self.watchers.register(path, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_merge_is_shallow() {
        let store = MemoryStore::new();
        store.put("a/doc", json!({"x": 1, "nested": {"keep": true}})).await.unwrap();
        store.merge("a/doc", json!({"nested": {"replaced": true}, "y": 2})).await.unwrap();

        let doc = store.get("a/doc").await.unwrap().unwrap();
        assert_eq!(doc["x"], 1);
        assert_eq!(doc["y"], 2);
        assert_eq!(doc["nested"], json!({"replaced": true}));
    }

    #[tokio::test]
    async fn test_merge_creates_missing_document() {
        let store = MemoryStore::new();
        store.merge("a/new", json!({"x": 1})).await.unwrap();
        assert_eq!(store.get("a/new").await.unwrap(), Some(json!({"x": 1})));
        assert!(store.merge("a/new", json!([1, 2])).await.is_err());
    }

    #[tokio::test]
    async fn test_collections_only_list_direct_children() {
        let store = MemoryStore::new();
        let id = store.append_to_collection("users/u/log", json!({"n": 1})).await.unwrap();
        store.put("users/u/log/x/deeper", json!({"n": 2})).await.unwrap();
        store.put("users/u/other", json!({"n": 3})).await.unwrap();

        let listed = store.list_collection("users/u/log").await.unwrap();
        assert_eq!(listed, vec![(id, json!({"n": 1}))]);
    }

    #[tokio::test]
    async fn test_simulated_outage_rejects_writes() {
        let store = MemoryStore::new();
        store.put("users/u/profile/data", json!({"a": 1})).await.unwrap();
        store.fail_writes_matching("profile");

        assert!(store.put("users/u/profile/data", json!({"a": 2})).await.is_err());
        store.put("users/u/other", json!({})).await.unwrap();
        assert_eq!(store.get("users/u/profile/data").await.unwrap(), Some(json!({"a": 1})));

        store.heal();
        store.put("users/u/profile/data", json!({"a": 2})).await.unwrap();
    }

    #[tokio::test]
    async fn test_subscription_receives_document_and_collection_snapshots() {
        let store = MemoryStore::new();
        let seen: Arc<Mutex<Vec<Snapshot>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let doc_sub = store.subscribe("d/doc", Arc::new(move |s: &Snapshot| sink.lock().unwrap().push(s.clone())));
        let sink = Arc::clone(&seen);
        let col_sub = store.subscribe("c", Arc::new(move |s: &Snapshot| sink.lock().unwrap().push(s.clone())));

        store.put("d/doc", json!({"v": 1})).await.unwrap();
        store.delete("d/doc").await.unwrap();
        store.put("c/1", json!({"v": 2})).await.unwrap();

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 3);
            assert_eq!(seen[0], Snapshot::Document(Some(json!({"v": 1}))));
            assert_eq!(seen[1], Snapshot::Document(None));
            assert_eq!(seen[2], Snapshot::Collection(vec![("1".to_string(), json!({"v": 2}))]));
        }

        doc_sub.unsubscribe();
        drop(col_sub);
        store.put("d/doc", json!({"v": 3})).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("users/u/profile/data", json!({"goals": {"calories": 2500}})).await.unwrap();
        store.merge("users/u/profile/data", json!({"favorites": []})).await.unwrap();

        let doc = store.get("users/u/profile/data").await.unwrap().unwrap();
        assert_eq!(doc["goals"]["calories"], 2500);
        assert!(doc["favorites"].as_array().unwrap().is_empty());

        let id = store.append_to_collection("users/u/log", json!({"n": 1})).await.unwrap();
        let listed = store.list_collection("users/u/log").await.unwrap();
        assert_eq!(listed, vec![(id, json!({"n": 1}))]);

        store.delete("users/u/profile/data").await.unwrap();
        assert!(store.get("users/u/profile/data").await.unwrap().is_none());
    }

    #[test]
    fn test_user_paths() {
        let paths = UserPaths::for_user("abc");
        assert_eq!(paths.profile, "users/abc/profile/data");
        assert_eq!(paths.in_progress, "users/abc/inProgressWorkout/current");
        assert_eq!(parent_of(&format!("{}/id1", paths.completed)), paths.completed);
    }
}
