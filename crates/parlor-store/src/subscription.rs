//! Live subscriptions.
//!
//! A backend keeps one [`LiveQueries`] registry. Registering a query returns a
//! [`Subscription`] that receives the full result set immediately and again
//! after every write that changes it. The subscription is released exactly
//! once: by [`Subscription::cancel`], by any clone of its
//! [`SubscriptionHandle`], or on drop. Further cancels are no-ops.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::document::{Document, Snapshot};
use crate::query::Query;

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Listener {
    query: Query,
    tx: mpsc::UnboundedSender<Snapshot>,
    last: Vec<Document>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<u64, Listener>,
}

/// Registry of open live queries for one backend.
#[derive(Clone, Default)]
pub(crate) struct LiveQueries {
    inner: Arc<Mutex<Registry>>,
}

impl LiveQueries {
    /// Register `query` and deliver `initial` as its first snapshot.
    ///
    /// Callers must hold their data lock across computing `initial` and this
    /// call so no write can slip in between.
    pub(crate) fn register(&self, query: Query, initial: Vec<Document>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = lock(&self.inner);
        registry.next_id += 1;
        let id = registry.next_id;

        // The receiver is alive, this cannot fail.
        let _ = tx.send(Snapshot {
            documents: initial.clone(),
        });

        debug!(
            subscription = id,
            collection = %query.collection,
            initial = initial.len(),
            "live query opened"
        );

        registry.listeners.insert(
            id,
            Listener {
                query,
                tx,
                last: initial,
            },
        );

        Subscription {
            rx,
            handle: SubscriptionHandle {
                id,
                registry: Arc::downgrade(&self.inner),
                cancelled: Arc::new(AtomicBool::new(false)),
            },
        }
    }

    /// Re-evaluate every query on `collection` against its current contents
    /// and push a snapshot to each listener whose result set changed.
    ///
    /// Called with the backend's data lock held so snapshots leave in write
    /// order.
    pub(crate) fn publish(&self, collection: &str, contents: &[Document]) {
        let mut registry = lock(&self.inner);
        let mut dead = Vec::new();

        for (id, listener) in registry.listeners.iter_mut() {
            if listener.query.collection != collection {
                continue;
            }
            let result = listener.query.run(contents.iter().cloned());
            if result == listener.last {
                continue;
            }
            listener.last = result.clone();
            if listener.tx.send(Snapshot { documents: result }).is_err() {
                dead.push(*id);
            }
        }

        for id in dead {
            warn!(subscription = id, "dropping live query with closed receiver");
            registry.listeners.remove(&id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.inner).listeners.len()
    }
}

/// Cloneable cancellation handle for a [`Subscription`].
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    registry: Weak<Mutex<Registry>>,
    cancelled: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unregister the live query. Returns `true` only for the call that
    /// actually released it.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).listeners.remove(&self.id);
        }
        debug!(subscription = self.id, "live query closed");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A live query. Yields full snapshots until cancelled or dropped.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Snapshot>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.handle.id
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// Next snapshot, or `None` once the subscription is cancelled. Snapshots
    /// still buffered at cancellation are discarded.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if self.handle.is_cancelled() {
            return None;
        }
        let snapshot = self.rx.recv().await?;
        if self.handle.is_cancelled() {
            return None;
        }
        Some(snapshot)
    }

    /// Release the live query. Safe to call more than once.
    pub fn cancel(&mut self) -> bool {
        self.rx.close();
        self.handle.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Snapshot>> {
        if self.handle.is_cancelled() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn doc(id: &str, seq: u64, chat: &str) -> Document {
        Document {
            id: id.into(),
            seq,
            fields: json!({ "chatId": chat }),
        }
    }

    #[tokio::test]
    async fn initial_snapshot_then_changes_only() {
        let live = LiveQueries::default();
        let query = Query::collection("messages").where_eq("chatId", "c1");
        let mut sub = live.register(query, vec![doc("m1", 1, "c1")]);

        let first = sub.next().await.unwrap();
        assert_eq!(first.len(), 1);

        // A write to another chat does not change this result set.
        live.publish("messages", &[doc("m1", 1, "c1"), doc("x", 2, "c2")]);
        live.publish(
            "messages",
            &[doc("m1", 1, "c1"), doc("x", 2, "c2"), doc("m2", 3, "c1")],
        );

        let second = sub.next().await.unwrap();
        let ids: Vec<&str> = second.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_unregisters() {
        let live = LiveQueries::default();
        let mut sub = live.register(Query::collection("chats"), Vec::new());
        let handle = sub.handle();
        assert_eq!(live.len(), 1);

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(!sub.cancel());
        assert_eq!(live.len(), 0);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn drop_unregisters() {
        let live = LiveQueries::default();
        {
            let _sub = live.register(Query::collection("chats"), Vec::new());
            assert_eq!(live.len(), 1);
        }
        assert_eq!(live.len(), 0);
    }

    #[tokio::test]
    async fn cancel_discards_buffered_snapshots() {
        let live = LiveQueries::default();
        let mut sub = live.register(Query::collection("messages"), Vec::new());
        live.publish("messages", &[doc("m1", 1, "c1")]);
        sub.handle().cancel();
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_yields_snapshots() {
        let live = LiveQueries::default();
        let mut sub = live.register(Query::collection("messages"), vec![doc("m1", 1, "c1")]);
        let first = StreamExt::next(&mut sub).await.unwrap();
        assert_eq!(first.documents[0].id, "m1");
    }
}
