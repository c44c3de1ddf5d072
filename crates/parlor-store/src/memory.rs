//! In-process [`DocumentStore`] backend.
//!
//! Holds every collection in memory behind one mutex. Cloning a `MemoryStore`
//! yields another handle to the same data, which is how tests hand the same
//! store to several clients.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::backend::DocumentStore;
use crate::document::{Document, NewDocument};
use crate::error::{Result, StoreError};
use crate::query::Query;
use crate::subscription::{lock, LiveQueries, Subscription};
use crate::update::{apply_updates, FieldUpdate, ServerClock};

#[derive(Default)]
struct Collections {
    docs: HashMap<String, BTreeMap<String, Document>>,
    next_seq: u64,
}

impl Collections {
    fn contents(&self, collection: &str) -> Vec<Document> {
        self.docs
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<Collections>>,
    live: LiveQueries,
    clock: Arc<ServerClock>,
    writes: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total successful writes (insert, put, update) since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// While set, every write fails with `StoreError::Unavailable`. Reads and
    /// subscriptions keep working.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every document currently in `collection`, in creation order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        let mut docs = lock(&self.data).contents(collection);
        docs.sort_by_key(|d| d.seq);
        docs
    }

    fn check_writable(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }

    fn store_new(&self, collection: &str, id: String, doc: NewDocument) -> Result<()> {
        self.check_writable()?;
        let mut fields = Value::Object(doc.fields.clone());
        apply_updates(&mut fields, &doc.timestamp_updates(), &self.clock.now())?;

        let mut data = lock(&self.data);
        data.next_seq += 1;
        let seq = data.next_seq;
        let coll = data.docs.entry(collection.to_string()).or_default();
        // `put` over an existing id keeps its creation order.
        let seq = coll.get(&id).map_or(seq, |existing| existing.seq);
        coll.insert(id.clone(), Document { id, seq, fields });

        self.writes.fetch_add(1, Ordering::SeqCst);
        let contents = data.contents(collection);
        self.live.publish(collection, &contents);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn subscribe(&self, query: Query) -> Result<Subscription> {
        let data = lock(&self.data);
        let initial = query.run(data.contents(&query.collection));
        Ok(self.live.register(query, initial))
    }

    async fn get_one(&self, collection: &str, id: &str) -> Result<Document> {
        lock(&self.data)
            .docs
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn insert(&self, collection: &str, doc: NewDocument) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.store_new(collection, id.clone(), doc)?;
        debug!(collection, id = %id, "document inserted");
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, doc: NewDocument) -> Result<()> {
        self.store_new(collection, id.to_string(), doc)?;
        debug!(collection, id, "document written");
        Ok(())
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<()> {
        self.check_writable()?;
        let now = self.clock.now();

        let mut data = lock(&self.data);
        let doc = data
            .docs
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        // Apply to a copy so a failing update leaves the document untouched.
        let mut fields = doc.fields.clone();
        apply_updates(&mut fields, &updates, &now)?;
        doc.fields = fields;

        self.writes.fetch_add(1, Ordering::SeqCst);
        let contents = data.contents(collection);
        self.live.publish(collection, &contents);
        debug!(collection, id, updates = updates.len(), "document updated");
        Ok(())
    }

    fn live_subscriptions(&self) -> usize {
        self.live.len()
    }
}
