//! SQLite-backed [`DocumentStore`].
//!
//! The [`SqliteStore`] owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation. Queries load the target
//! collection and are evaluated in process, which is adequate for the
//! per-user chat volumes this backend serves.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use directories::ProjectDirs;
use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

use crate::backend::DocumentStore;
use crate::document::{Document, NewDocument};
use crate::documents;
use crate::error::{Result, StoreError};
use crate::migrations;
use crate::query::Query;
use crate::subscription::{lock, LiveQueries, Subscription};
use crate::update::{apply_updates, FieldUpdate, ServerClock};

/// Document store persisted in a local SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    live: LiveQueries,
    clock: ServerClock,
}

impl SqliteStore {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/parlor/parlor.db`
    /// - macOS:   `~/Library/Application Support/org.parlor.parlor/parlor.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\parlor\parlor\data\parlor.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("org", "parlor", "parlor").ok_or(StoreError::NoDataDir)?;
        Self::open_in_dir(project_dirs.data_dir())
    }

    /// Open (or create) `parlor.db` inside `data_dir`, creating the directory.
    pub fn open_in_dir(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("parlor.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Recommended SQLite settings.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::from_connection(conn)
    }

    /// Private in-memory database, gone when the store is dropped.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            live: LiveQueries::default(),
            clock: ServerClock::new(),
        })
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn().path().map(PathBuf::from)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    fn write_new(&self, collection: &str, id: &str, doc: NewDocument) -> Result<()> {
        let now = self.clock.now();
        let mut fields = Value::Object(doc.fields.clone());
        apply_updates(&mut fields, &doc.timestamp_updates(), &now)?;

        let conn = self.conn();
        documents::upsert_document(&conn, collection, id, &fields, &now)?;
        self.publish(&conn, collection)
    }

    /// Push fresh snapshots for `collection`. Runs under the connection lock
    /// so listeners see writes in order.
    fn publish(&self, conn: &Connection, collection: &str) -> Result<()> {
        let contents = documents::select_collection(conn, collection)?;
        self.live.publish(collection, &contents);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn subscribe(&self, query: Query) -> Result<Subscription> {
        let conn = self.conn();
        let initial = query.run(documents::select_collection(&conn, &query.collection)?);
        Ok(self.live.register(query, initial))
    }

    async fn get_one(&self, collection: &str, id: &str) -> Result<Document> {
        documents::select_document(&self.conn(), collection, id)?
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn insert(&self, collection: &str, doc: NewDocument) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.write_new(collection, &id, doc)?;
        tracing::debug!(collection, id = %id, "document inserted");
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, doc: NewDocument) -> Result<()> {
        self.write_new(collection, id, doc)?;
        tracing::debug!(collection, id, "document written");
        Ok(())
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut doc = documents::select_document(&tx, collection, id)?
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        apply_updates(&mut doc.fields, &updates, &now)?;
        documents::update_document_fields(&tx, collection, id, &doc.fields, &now)?;
        tx.commit()?;

        self.publish(&conn, collection)?;
        tracing::debug!(collection, id, updates = updates.len(), "document updated");
        Ok(())
    }

    fn live_subscriptions(&self) -> usize {
        self.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;
    use serde_json::json;

    fn fields(value: Value) -> NewDocument {
        match value {
            Value::Object(map) => NewDocument::new(map),
            _ => panic!("fields must be an object"),
        }
    }

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let store = SqliteStore::open_at(&path).expect("should open");
        assert!(store.path().is_some());
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = SqliteStore::open_in_dir(dir.path()).unwrap();
            store
                .insert("users", fields(json!({ "username": "ana" })))
                .await
                .unwrap()
        };

        let store = SqliteStore::open_in_dir(dir.path()).unwrap();
        let doc = store.get_one("users", &id).await.unwrap();
        assert_eq!(doc.get("username"), Some(&json!("ana")));
    }

    #[tokio::test]
    async fn live_query_follows_updates() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put("chats", "c1", fields(json!({ "members": ["a", "b"] })))
            .await
            .unwrap();

        let query = Query::collection("chats")
            .where_array_contains("members", "c")
            .order_by("name", Direction::Ascending);
        let mut sub = store.subscribe(query).await.unwrap();
        assert!(sub.next().await.unwrap().is_empty());

        store
            .update_fields("chats", "c1", vec![FieldUpdate::array_union("members", "c")])
            .await
            .unwrap();
        let snapshot = sub.next().await.unwrap();
        assert_eq!(snapshot.documents[0].id, "c1");

        sub.cancel();
        assert_eq!(store.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .update_fields("chats", "nope", vec![FieldUpdate::set("name", "x")])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn put_replaces_and_keeps_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("users", "u1", fields(json!({ "n": 1 }))).await.unwrap();
        store.put("users", "u2", fields(json!({ "n": 2 }))).await.unwrap();
        store.put("users", "u1", fields(json!({ "n": 3 }))).await.unwrap();

        let mut sub = store.subscribe(Query::collection("users")).await.unwrap();
        let snapshot = sub.next().await.unwrap();
        let ids: Vec<&str> = snapshot.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
        assert_eq!(snapshot.documents[0].get("n"), Some(&json!(3)));
    }
}
