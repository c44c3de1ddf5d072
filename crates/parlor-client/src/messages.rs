//! Message stream synchronizer and message sending.
//!
//! At most one chat's messages are followed at a time. Opening a chat tears
//! the previous subscription down first, and every snapshot is tagged with
//! the chat it was opened for: a snapshot that arrives for anything but the
//! currently open chat is dropped, so a rapid switch never shows one chat's
//! messages in another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use parlor_shared::constants::{IMAGE_PREVIEW_TEXT, MESSAGES, USERS};
use parlor_shared::{ChatId, Message, MessageDraft, MessageId, Sender, User, UserId};
use parlor_store::{Direction, DocumentStore, Query, Snapshot};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::alerts::{AlertKind, Alerts};
use crate::error::{ClientError, Result};
use crate::membership::{insert_message, update_preview};
use crate::sync_task::{lock, SyncTask};
use crate::upload::{ImageBlob, Uploader};

pub const NOTHING_TO_SEND: &str = "Nothing to send";
pub const SEND_FAILED: &str = "Message could not be sent";

/// What the composer hands over.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub text: String,
    pub image: Option<ImageBlob>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn image(image: ImageBlob) -> Self {
        Self {
            text: String::new(),
            image: Some(image),
        }
    }

    pub fn with_image(mut self, image: ImageBlob) -> Self {
        self.image = Some(image);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagesView {
    pub chat_id: Option<ChatId>,
    /// Oldest first.
    pub messages: Vec<Message>,
}

pub struct MessageStream {
    store: Arc<dyn DocumentStore>,
    uploader: Arc<dyn Uploader>,
    alerts: Alerts,
    tx: Arc<watch::Sender<MessagesView>>,
    task: Mutex<Option<SyncTask>>,
}

impl MessageStream {
    pub fn new(store: Arc<dyn DocumentStore>, uploader: Arc<dyn Uploader>, alerts: Alerts) -> Self {
        let (tx, _) = watch::channel(MessagesView::default());
        Self {
            store,
            uploader,
            alerts,
            tx: Arc::new(tx),
            task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MessagesView> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> MessagesView {
        self.tx.borrow().clone()
    }

    pub fn open_chat(&self) -> Option<ChatId> {
        self.tx.borrow().chat_id.clone()
    }

    /// Follow `chat_id`'s messages, oldest first.
    pub async fn open(&self, chat_id: ChatId) -> Result<()> {
        self.stop_task();
        // From here on snapshots for any earlier chat are ignored.
        self.tx.send_replace(MessagesView {
            chat_id: Some(chat_id.clone()),
            messages: Vec::new(),
        });

        let query = Query::collection(MESSAGES)
            .where_eq("chatId", chat_id.as_str())
            .order_by("timestamp", Direction::Ascending);
        let subscription = self
            .store
            .subscribe(query)
            .await
            .map_err(ClientError::Subscribe)?;

        let tx = Arc::clone(&self.tx);
        let tag = chat_id.clone();
        let task = SyncTask::follow("messages", subscription, move |snapshot| {
            apply_snapshot(&tx, &tag, snapshot);
        });

        // Another open or close may have won while we were subscribing.
        if self.open_chat().as_ref() != Some(&chat_id) {
            debug!(chat = %chat_id, "chat switched while opening, dropping subscription");
            return Ok(());
        }
        if let Some(mut previous) = lock(&self.task).replace(task) {
            previous.stop();
        }
        info!(chat = %chat_id, "message stream opened");
        Ok(())
    }

    pub fn close(&self) {
        self.stop_task();
        self.tx.send_if_modified(|view| {
            let changed = view.chat_id.is_some() || !view.messages.is_empty();
            *view = MessagesView::default();
            changed
        });
    }

    pub fn is_open(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(SyncTask::is_running)
    }

    /// Send a message to `chat_id` as `sender`.
    ///
    /// An image is uploaded first and a failed upload writes nothing. The
    /// message insert and the preview update are separate writes.
    pub async fn send_message(
        &self,
        sender: &User,
        chat_id: &ChatId,
        message: OutgoingMessage,
    ) -> Result<MessageId> {
        let text = message.text.trim();
        if text.is_empty() && message.image.is_none() {
            debug!(chat = %chat_id, "empty message, not sending");
            return Err(ClientError::rejected(NOTHING_TO_SEND));
        }

        let img = match message.image {
            Some(image) => match self.uploader.upload(image).await {
                Ok(reference) => Some(reference),
                Err(e) => {
                    warn!(chat = %chat_id, error = %e, "image upload failed, message not sent");
                    self.alerts.emit(AlertKind::UploadFailed, e.to_string());
                    return Err(ClientError::Upload(e));
                }
            },
            None => None,
        };

        let preview = if text.is_empty() {
            IMAGE_PREVIEW_TEXT
        } else {
            text
        };
        let draft = MessageDraft {
            chat_id: chat_id.clone(),
            sender_id: Sender::User(sender.id.clone()),
            sender_name: Some(sender.username.clone()),
            text: text.to_string(),
            img,
        };

        let store = self.store.as_ref();
        let id = insert_message(store, &draft)
            .await
            .map_err(|e| self.alert_write(e))?;
        update_preview(store, chat_id, preview, draft.sender_id.clone())
            .await
            .map_err(|e| self.alert_write(e))?;

        info!(chat = %chat_id, message = %id, image = draft.img.is_some(), "message sent");
        Ok(MessageId(id))
    }

    fn alert_write(&self, e: ClientError) -> ClientError {
        self.alerts.emit(AlertKind::WriteFailed, SEND_FAILED);
        e
    }

    fn stop_task(&self) {
        let previous = lock(&self.task).take();
        if let Some(mut task) = previous {
            task.stop();
        }
    }
}

fn apply_snapshot(tx: &watch::Sender<MessagesView>, chat_id: &ChatId, snapshot: Snapshot) {
    let mut messages = Vec::with_capacity(snapshot.len());
    for doc in snapshot {
        match Message::from_document(&doc.id, &doc.fields) {
            Ok(msg) if &msg.chat_id == chat_id => messages.push(msg),
            Ok(msg) => warn!(chat = %chat_id, other = %msg.chat_id, "message for another chat"),
            Err(e) => warn!(message = %doc.id, error = %e, "skipping malformed message"),
        }
    }

    tx.send_if_modified(|view| {
        if view.chat_id.as_ref() != Some(chat_id) {
            debug!(chat = %chat_id, "discarding snapshot for a closed chat");
            return false;
        }
        if view.messages == messages {
            return false;
        }
        view.messages = messages;
        true
    });
}

// ---------------------------------------------------------------------------
// Sender avatars
// ---------------------------------------------------------------------------

/// Avatars of message senders, looked up once per sender.
///
/// Group chats show each sender's avatar next to their messages. A failed
/// lookup is not cached so the next render tries again.
pub struct SenderAvatars {
    store: Arc<dyn DocumentStore>,
    cache: tokio::sync::Mutex<HashMap<UserId, Option<String>>>,
}

impl SenderAvatars {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            cache: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn avatar_for(&self, user: &UserId) -> Option<String> {
        if let Some(cached) = self.cache.lock().await.get(user) {
            return cached.clone();
        }

        let avatar = match self.store.get_one(USERS, user.as_str()).await {
            Ok(doc) => match User::from_document(&doc.id, &doc.fields) {
                Ok(profile) => profile.avatar,
                Err(e) => {
                    warn!(user = %user, error = %e, "malformed sender profile");
                    return None;
                }
            },
            Err(e) => {
                warn!(user = %user, error = %e, "sender avatar lookup failed");
                return None;
            }
        };

        self.cache.lock().await.insert(user.clone(), avatar.clone());
        avatar
    }

    /// Look up every distinct user sender in `messages`.
    pub async fn prefetch(&self, messages: &[Message]) -> HashMap<UserId, Option<String>> {
        let mut out = HashMap::new();
        for user in messages.iter().filter_map(|m| m.sender.user_id()) {
            if !out.contains_key(user) {
                let avatar = self.avatar_for(user).await;
                out.insert(user.clone(), avatar);
            }
        }
        out
    }

    pub async fn forget(&self, user: &UserId) {
        self.cache.lock().await.remove(user);
    }
}
