use async_trait::async_trait;

use crate::document::{Document, NewDocument};
use crate::error::Result;
use crate::query::Query;
use crate::subscription::Subscription;
use crate::update::FieldUpdate;

/// The remote document store the client synchronizes against.
///
/// Implementations must push a full snapshot to a new subscription right
/// away, then again whenever a write changes that query's result set, in
/// write order. Writes are last-write-wins per field.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a live query.
    async fn subscribe(&self, query: Query) -> Result<Subscription>;

    /// One-shot fetch. Fails with `StoreError::NotFound` if absent.
    async fn get_one(&self, collection: &str, id: &str) -> Result<Document>;

    /// Create a document under a fresh id and return that id.
    async fn insert(&self, collection: &str, doc: NewDocument) -> Result<String>;

    /// Create or fully replace the document at `id`.
    async fn put(&self, collection: &str, id: &str, doc: NewDocument) -> Result<()>;

    /// Apply `updates` atomically to one existing document.
    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<()>;

    /// Number of live queries currently registered.
    fn live_subscriptions(&self) -> usize;
}
