//! Background tasks that follow a live query or another change stream.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use parlor_store::{Snapshot, Subscription, SubscriptionHandle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A spawned task plus everything needed to stop it.
///
/// Stopping cancels the token, releases the live query synchronously (so the
/// store's subscription count drops before `stop` returns) and aborts the
/// task. Dropping a `SyncTask` stops it.
#[derive(Debug)]
pub struct SyncTask {
    label: &'static str,
    stop: CancellationToken,
    subscription: Option<SubscriptionHandle>,
    task: Option<JoinHandle<()>>,
}

impl SyncTask {
    /// Feed every snapshot of `subscription` to `on_snapshot` until stopped.
    pub(crate) fn follow<F>(
        label: &'static str,
        mut subscription: Subscription,
        mut on_snapshot: F,
    ) -> Self
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        let stop = CancellationToken::new();
        let handle = subscription.handle();
        let token = stop.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = subscription.next() => match next {
                        Some(snapshot) => on_snapshot(snapshot),
                        None => break,
                    },
                }
            }
            subscription.cancel();
            debug!(task = label, "sync task finished");
        });

        debug!(task = label, subscription = handle.id(), "sync task started");
        Self {
            label,
            stop,
            subscription: Some(handle),
            task: Some(task),
        }
    }

    /// Run `body` with a cancellation token that fires when the task is stopped.
    pub(crate) fn spawn<F, Fut>(label: &'static str, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop = CancellationToken::new();
        let task = tokio::spawn(body(stop.clone()));
        debug!(task = label, "task started");
        Self {
            label,
            stop,
            subscription: None,
            task: Some(task),
        }
    }

    /// Idempotent.
    pub fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.stop.cancel();
        if let Some(handle) = self.subscription.take() {
            handle.cancel();
        }
        task.abort();
        debug!(task = self.label, "sync task stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SyncTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parlor_store::{DocumentStore, MemoryStore, NewDocument, Query};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn follow_delivers_snapshots_and_stop_releases() {
        let store = MemoryStore::new();
        let sub = store.subscribe(Query::collection("chats")).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut task = SyncTask::follow("test", sub, move |snapshot| {
            let _ = tx.send(snapshot.len());
        });
        assert_eq!(rx.recv().await, Some(0));

        store
            .insert("chats", NewDocument::new(Default::default()))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(1));

        task.stop();
        task.stop();
        assert_eq!(store.live_subscriptions(), 0);
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn drop_stops_spawned_body() {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let task = SyncTask::spawn("body", move |stop| async move {
            let _keep = tx;
            stop.cancelled().await;
        });
        drop(task);
        // The sender goes away with the task.
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert_eq!(closed, Ok(None));
    }
}
