//! Authentication collaborator.
//!
//! The client never talks to an identity service itself. It only needs a
//! stream of "who is signed in now" values and a way to sign out.

use async_trait::async_trait;
use parlor_shared::UserId;
use tokio::sync::watch;

use crate::error::Result;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current identity and every later change. `None` means signed out.
    fn identity_changes(&self) -> watch::Receiver<Option<UserId>>;

    async fn sign_out(&self) -> Result<()>;
}

/// In-process provider: whoever holds it decides who is signed in.
#[derive(Debug)]
pub struct LocalAuth {
    tx: watch::Sender<Option<UserId>>,
}

impl LocalAuth {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn sign_in(&self, user: UserId) {
        tracing::info!(user = %user, "signed in");
        self.tx.send_replace(Some(user));
    }

    pub fn current(&self) -> Option<UserId> {
        self.tx.borrow().clone()
    }
}

impl Default for LocalAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    fn identity_changes(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }

    async fn sign_out(&self) -> Result<()> {
        if self.tx.send_replace(None).is_some() {
            tracing::info!("signed out");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_and_out_are_observed() {
        let auth = LocalAuth::new();
        let mut rx = auth.identity_changes();
        assert_eq!(*rx.borrow_and_update(), None);

        auth.sign_in(UserId::from("ana"));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(UserId::from("ana")));

        auth.sign_out().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), None);
        assert_eq!(auth.current(), None);
    }
}
