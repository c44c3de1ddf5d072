//! Session state: who is signed in.
//!
//! The auth provider only knows an opaque id. [`SessionState`] resolves it to
//! the full [`User`] record and publishes the result on a watch channel. A
//! generation counter makes sure a slow fetch for a previous identity never
//! overwrites a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parlor_shared::constants::USERS;
use parlor_shared::{User, UserId};
use parlor_store::DocumentStore;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::AuthProvider;
use crate::error::{ClientError, Result};
use crate::sync_task::SyncTask;

/// What views observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub identity: Option<User>,
    /// True until the first identity change has been resolved.
    pub loading: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            identity: None,
            loading: true,
        }
    }
}

pub struct SessionState {
    store: Arc<dyn DocumentStore>,
    tx: watch::Sender<SessionSnapshot>,
    generation: AtomicU64,
}

impl SessionState {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let (tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            store,
            tx,
            generation: AtomicU64::new(0),
        }
    }

    pub fn current_identity(&self) -> Option<User> {
        self.tx.borrow().identity.clone()
    }

    pub fn current_user_id(&self) -> Option<UserId> {
        self.tx.borrow().identity.as_ref().map(|u| u.id.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.tx.borrow().loading
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// The signed-in user, or `NotSignedIn`.
    pub fn require_identity(&self) -> Result<User> {
        self.current_identity().ok_or(ClientError::NotSignedIn)
    }

    /// Resolve a new identity from the auth provider.
    ///
    /// A failed fetch leaves the session signed out; the error is only logged.
    pub async fn handle_identity_change(&self, user: Option<UserId>) -> Option<User> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let identity = match user {
            None => None,
            Some(id) => {
                self.tx.send_modify(|s| s.loading = true);
                match self.fetch_user(&id).await {
                    Ok(user) => Some(user),
                    Err(e) => {
                        warn!(user = %id, error = %e, "failed to load signed-in user");
                        None
                    }
                }
            }
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("identity change superseded, discarding result");
            return self.current_identity();
        }

        match &identity {
            Some(user) => info!(user = %user.id, username = %user.username, "session started"),
            None => info!("session cleared"),
        }
        self.tx.send_replace(SessionSnapshot {
            identity: identity.clone(),
            loading: false,
        });
        identity
    }

    /// Replace the cached identity after a local profile write.
    ///
    /// Ignored if `user` is not the signed-in user.
    pub fn apply_profile(&self, user: User) {
        self.tx.send_if_modified(|s| match &s.identity {
            Some(current) if current.id == user.id && *current != user => {
                s.identity = Some(user);
                true
            }
            _ => false,
        });
    }

    /// Drop the identity immediately, without waiting for the auth provider.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.tx.send_replace(SessionSnapshot {
            identity: None,
            loading: false,
        });
    }

    async fn fetch_user(&self, id: &UserId) -> Result<User> {
        let doc = self
            .store
            .get_one(USERS, id.as_str())
            .await
            .map_err(ClientError::Fetch)?;
        Ok(User::from_document(&doc.id, &doc.fields)?)
    }

    /// Follow `auth` until `stop` fires: the current identity first, then
    /// every change.
    pub async fn run_auth_listener(
        self: Arc<Self>,
        auth: Arc<dyn AuthProvider>,
        stop: tokio_util::sync::CancellationToken,
    ) {
        let mut changes = auth.identity_changes();
        loop {
            let user = changes.borrow_and_update().clone();
            self.handle_identity_change(user).await;

            tokio::select! {
                _ = stop.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        debug!("auth provider went away");
                        break;
                    }
                }
            }
        }
    }

    pub fn spawn_auth_listener(self: &Arc<Self>, auth: Arc<dyn AuthProvider>) -> SyncTask {
        let session = Arc::clone(self);
        SyncTask::spawn("auth-listener", move |stop| session.run_auth_listener(auth, stop))
    }
}
