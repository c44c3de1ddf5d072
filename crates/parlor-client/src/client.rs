//! The composition root.
//!
//! [`ParlorClient`] builds every component around one store, one auth
//! provider and one uploader, and wires them together: identity changes
//! retarget the chat list and reset the open conversation, and chat list
//! snapshots keep the open group's metadata fresh.

use std::sync::{Arc, Mutex, MutexGuard};

use parlor_shared::constants::{CHATS, USERS};
use parlor_shared::{Chat, ChatId, GroupChat, MessageId, User, UserId};
use parlor_store::{DocumentStore, MemoryStore, SqliteStore};
use tracing::{debug, info, warn};

use crate::active::{ActiveConversation, Peer};
use crate::alerts::{AlertKind, Alerts};
use crate::auth::AuthProvider;
use crate::chat_list::{ConversationList, DirectRow};
use crate::config::{ClientConfig, StoreBackend};
use crate::error::{ClientError, Result};
use crate::groups::GroupNavigator;
use crate::membership::{GroupEdit, Membership, NewGroup};
use crate::messages::{MessageStream, OutgoingMessage, SenderAvatars};
use crate::profile::{ProfileEdit, ProfileSettings};
use crate::session::SessionState;
use crate::sync_task::{lock, SyncTask};
use crate::upload::{BlobDirUploader, Uploader};

pub const CANNOT_SEND: &str = "You cannot send messages in this chat";

pub struct ParlorClient {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    alerts: Alerts,
    session: Arc<SessionState>,
    active: Arc<ActiveConversation>,
    chats: Arc<ConversationList>,
    messages: Arc<MessageStream>,
    membership: Membership,
    profile: ProfileSettings,
    avatars: SenderAvatars,
    navigator: Arc<Mutex<GroupNavigator>>,
    tasks: Mutex<Vec<SyncTask>>,
}

impl ParlorClient {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        let alerts = Alerts::new();
        let session = Arc::new(SessionState::new(Arc::clone(&store)));
        Self {
            active: Arc::new(ActiveConversation::new(Arc::clone(&store))),
            chats: Arc::new(ConversationList::new(Arc::clone(&store))),
            messages: Arc::new(MessageStream::new(
                Arc::clone(&store),
                Arc::clone(&uploader),
                alerts.clone(),
            )),
            membership: Membership::new(Arc::clone(&store), Arc::clone(&uploader), alerts.clone()),
            profile: ProfileSettings::new(
                Arc::clone(&store),
                uploader,
                Arc::clone(&session),
                alerts.clone(),
            ),
            avatars: SenderAvatars::new(Arc::clone(&store)),
            navigator: Arc::new(Mutex::new(GroupNavigator::new())),
            tasks: Mutex::new(Vec::new()),
            store,
            auth,
            alerts,
            session,
        }
    }

    /// Open the configured store and blob directory.
    pub async fn from_config(config: &ClientConfig, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.store_backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Sqlite => {
                let opened = match &config.data_dir {
                    Some(dir) => SqliteStore::open_in_dir(dir),
                    None => SqliteStore::new(),
                };
                Arc::new(opened.map_err(ClientError::Open)?)
            }
        };
        let uploader =
            BlobDirUploader::new(config.blob_dir.clone(), config.max_upload_bytes).await?;

        info!(backend = ?config.store_backend, "client configured");
        Ok(Self::new(store, auth, Arc::new(uploader)))
    }

    /// Start following the auth provider. Idempotent.
    pub fn start(&self) {
        let mut tasks = lock(&self.tasks);
        if !tasks.is_empty() {
            return;
        }

        tasks.push(self.session.spawn_auth_listener(Arc::clone(&self.auth)));
        tasks.push(self.spawn_session_reactor());
        tasks.push(self.spawn_group_refresh());
        info!("client started");
    }

    /// Stop background work and release every live query.
    pub fn shutdown(&self) {
        for mut task in lock(&self.tasks).drain(..) {
            task.stop();
        }
        self.reset_conversation();
        self.chats.detach();
        info!("client stopped");
    }

    fn spawn_session_reactor(&self) -> SyncTask {
        let session = Arc::clone(&self.session);
        let active = Arc::clone(&self.active);
        let chats = Arc::clone(&self.chats);
        let messages = Arc::clone(&self.messages);
        let navigator = Arc::clone(&self.navigator);

        SyncTask::spawn("session-reactor", move |stop| async move {
            let mut rx = session.subscribe();
            let mut following: Option<UserId> = None;
            loop {
                let identity = rx.borrow_and_update().identity.clone();
                let user = identity.as_ref().map(|u| u.id.clone());
                active.apply_current_user(identity);

                if user != following {
                    debug!(from = ?following, to = ?user, "identity changed");
                    active.clear();
                    messages.close();
                    lock(&navigator).reset();
                    if let Err(e) = chats.switch_user(user.clone()).await {
                        warn!(error = %e, "could not follow chat list");
                    }
                    following = user;
                }

                tokio::select! {
                    _ = stop.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    fn spawn_group_refresh(&self) -> SyncTask {
        let active = Arc::clone(&self.active);
        let mut rx = self.chats.subscribe();

        SyncTask::spawn("group-refresh", move |stop| async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let Some(chat_id) = active.current_chat_id() else {
                    continue;
                };
                let group = rx.borrow_and_update().group(&chat_id).cloned();
                if let Some(group) = group {
                    active.apply_group(group);
                }
            }
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn alerts(&self) -> &Alerts {
        &self.alerts
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn active(&self) -> &ActiveConversation {
        &self.active
    }

    pub fn chats(&self) -> &ConversationList {
        &self.chats
    }

    pub fn messages(&self) -> &MessageStream {
        &self.messages
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn avatars(&self) -> &SenderAvatars {
        &self.avatars
    }

    pub fn navigator(&self) -> MutexGuard<'_, GroupNavigator> {
        lock(&self.navigator)
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await?;
        self.session.clear();
        self.reset_conversation();
        self.chats.detach();
        Ok(())
    }

    pub async fn update_profile(&self, edit: ProfileEdit) -> Result<User> {
        let user = self.profile.update_profile(edit).await?;
        self.active.apply_current_user(Some(user.clone()));
        Ok(user)
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    /// Open a direct chat: resolve the peer, follow the messages and keep
    /// the block flags live.
    pub async fn open_direct(&self, row: &DirectRow) -> Result<()> {
        let peer = self.chats.resolve_direct_peer(row).await?;
        self.active
            .select_conversation(row.chat_id.clone(), Peer::User(peer));
        self.messages.open(row.chat_id.clone()).await?;
        self.active.watch_peer().await
    }

    pub async fn open_group(&self, chat_id: &ChatId) -> Result<()> {
        let group = match self.chats.current().group(chat_id).cloned() {
            Some(group) => group,
            None => self.fetch_group(chat_id).await?,
        };
        self.active
            .select_conversation(chat_id.clone(), Peer::Group(group));
        lock(&self.navigator).select(chat_id.clone());
        self.messages.open(chat_id.clone()).await
    }

    pub fn close_conversation(&self) {
        self.active.clear();
        self.messages.close();
        lock(&self.navigator).back();
    }

    pub async fn send(&self, message: OutgoingMessage) -> Result<MessageId> {
        let me = self.session.require_identity()?;
        let chat = self
            .active
            .current()
            .ok_or(ClientError::NoActiveConversation)?;
        if !chat.can_send() {
            self.alerts.emit(AlertKind::Rejected, CANNOT_SEND);
            return Err(ClientError::rejected(CANNOT_SEND));
        }
        self.messages.send_message(&me, &chat.chat_id, message).await
    }

    pub async fn toggle_block(&self) -> Result<bool> {
        self.active.toggle_block().await
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub async fn create_group(&self, group: NewGroup) -> Result<ChatId> {
        let me = self.session.require_identity()?;
        let chat_id = self.membership.create_group(&me, group).await?;
        lock(&self.navigator).close_create_form();
        Ok(chat_id)
    }

    /// Add `user` to the open group.
    pub async fn add_member(&self, user: &UserId) -> Result<()> {
        let group = self.active_group()?;
        let profile = self.fetch_user(user).await?;
        self.membership.add_member(&group.id, &profile).await
    }

    /// Remove `user` from the open group.
    pub async fn remove_member(&self, user: &UserId) -> Result<()> {
        let group = self.active_group()?;
        self.membership.remove_member(&group.id, user).await
    }

    /// Leave the open group and return to the group list.
    pub async fn leave_group(&self) -> Result<()> {
        let me = self.session.require_identity()?;
        let group = self.active_group()?;
        self.membership.remove_member(&group.id, &me.id).await?;
        self.close_conversation();
        Ok(())
    }

    pub async fn update_group(&self, edit: GroupEdit) -> Result<bool> {
        let group = self.active_group()?;
        self.membership.update_group(&group, edit).await
    }

    /// Direct-chat peers who can still be added to the open group.
    pub fn add_member_candidates(&self) -> Result<Vec<UserId>> {
        let group = self.active_group()?;
        Ok(self.chats.add_member_candidates(&group.id))
    }

    /// Profiles of the open group's members.
    pub async fn group_members(&self) -> Result<Vec<User>> {
        let group = self.active_group()?;
        Ok(self.membership.group_members(&group).await)
    }

    /// Everyone the signed-in user can invite to a new group.
    pub async fn invite_candidates(&self) -> Result<Vec<User>> {
        let me = self.session.require_identity()?;
        self.membership.user_directory(&me.id).await
    }

    fn active_group(&self) -> Result<GroupChat> {
        let chat = self
            .active
            .current()
            .ok_or(ClientError::NoActiveConversation)?;
        match chat.peer {
            Peer::Group(group) => Ok(group),
            Peer::User(_) => Err(ClientError::rejected("Not a group chat")),
        }
    }

    fn reset_conversation(&self) {
        self.active.clear();
        self.messages.close();
        lock(&self.navigator).reset();
    }

    async fn fetch_user(&self, id: &UserId) -> Result<User> {
        let doc = self
            .store
            .get_one(USERS, id.as_str())
            .await
            .map_err(ClientError::Fetch)?;
        Ok(User::from_document(&doc.id, &doc.fields)?)
    }

    async fn fetch_group(&self, chat_id: &ChatId) -> Result<GroupChat> {
        let doc = self
            .store
            .get_one(CHATS, chat_id.as_str())
            .await
            .map_err(ClientError::Fetch)?;
        match Chat::from_document(&doc.id, &doc.fields)? {
            Chat::Group(group) => Ok(group),
            Chat::Direct(_) => Err(ClientError::rejected("Not a group chat")),
        }
    }
}
