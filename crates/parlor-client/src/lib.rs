//! # parlor-client
//!
//! Real-time chat state on top of a [`DocumentStore`](parlor_store::DocumentStore).
//!
//! The components, leaves first:
//! - [`SessionState`]: who is signed in.
//! - [`ActiveConversation`]: the open chat, its peer and the block flags.
//! - [`ConversationList`]: every chat of the signed-in user, live.
//! - [`MessageStream`]: the open chat's messages, live, plus sending.
//! - [`Membership`]: group membership, block lists, group lifecycle.
//!
//! [`ParlorClient`] owns one of each and wires them to an [`AuthProvider`].

pub mod active;
pub mod alerts;
pub mod auth;
pub mod chat_list;
pub mod client;
pub mod config;
pub mod error;
pub mod groups;
pub mod membership;
pub mod messages;
pub mod profile;
pub mod session;
pub mod sync_task;
pub mod upload;

pub use active::{ActiveChat, ActiveConversation, BlockStatus, Peer};
pub use alerts::{Alert, AlertKind, Alerts};
pub use auth::{AuthProvider, LocalAuth};
pub use chat_list::{ChatListView, ConversationList, DirectRow, GroupRow};
pub use client::ParlorClient;
pub use config::{ClientConfig, StoreBackend};
pub use error::{ClientError, Result, UploadError};
pub use groups::{GroupNavigator, GroupView};
pub use membership::{GroupEdit, Membership, NewGroup};
pub use messages::{MessageStream, MessagesView, OutgoingMessage, SenderAvatars};
pub use profile::{ProfileEdit, ProfileSettings};
pub use session::{SessionSnapshot, SessionState};
pub use sync_task::SyncTask;
pub use upload::{BlobDirUploader, DataUrlUploader, ImageBlob, Uploader};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Calling this twice is harmless: the
/// second install fails and is ignored.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    if installed.is_ok() {
        tracing::info!("Starting {}", parlor_shared::constants::APP_NAME);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use async_trait::async_trait;
    use parlor_shared::constants::USERS;
    use parlor_shared::{User, UserId};
    use parlor_store::{DocumentStore, Fields, MemoryStore, NewDocument};
    use serde_json::{json, Value};
    use tokio::sync::watch;

    use crate::error::UploadError;
    use crate::upload::{ImageBlob, Uploader};

    pub fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    pub async fn seed_user(store: &MemoryStore, id: &str, username: &str) {
        store
            .put(
                USERS,
                id,
                NewDocument::new(fields(json!({ "username": username, "bio": "", "blocked": [] }))),
            )
            .await
            .unwrap();
    }

    pub fn user(id: &str, username: &str) -> User {
        User {
            id: UserId::from(id),
            username: username.to_string(),
            avatar: None,
            bio: String::new(),
            blocked: BTreeSet::new(),
        }
    }

    /// Wait (bounded) until the watched value satisfies `pred`.
    pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, pred: F) -> T
    where
        T: Clone,
        F: FnMut(&T) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed")
            .clone()
    }

    pub struct FailingUploader;

    #[async_trait]
    impl Uploader for FailingUploader {
        async fn upload(&self, _image: ImageBlob) -> Result<String, UploadError> {
            Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "storage offline",
            )))
        }
    }
}
