//! Group membership, block lists and group lifecycle.
//!
//! Every mutation here is a sequence of independent store writes (membership
//! change, system notice, preview update). A failure part-way leaves the
//! earlier writes in place; nothing is rolled back or retried.

use std::collections::BTreeSet;
use std::sync::Arc;

use parlor_shared::constants::{
    left_notice, joined_notice, CHATS, GROUP_CREATED_TEXT, MESSAGES, MIN_GROUP_INVITEES, USERS,
};
use parlor_shared::{
    to_fields, Chat, ChatId, GroupChat, GroupDraft, LastMessageDraft, MessageDraft, Sender, User,
    UserId,
};
use parlor_store::{DocumentStore, FieldUpdate, NewDocument, Query};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::alerts::{AlertKind, Alerts};
use crate::error::{ClientError, Result};
use crate::upload::{ImageBlob, Uploader};

pub const GROUP_NAME_REQUIRED: &str = "Please enter a group name";
pub const GROUP_TOO_SMALL: &str = "Please select at least 2 users";
pub const LAST_MEMBER: &str = "A group needs at least one member";

/// Input of the group creation form.
#[derive(Debug, Clone, Default)]
pub struct NewGroup {
    pub name: String,
    pub bio: String,
    pub avatar: Option<ImageBlob>,
    /// Users to add besides the creator.
    pub invitees: Vec<UserId>,
}

/// Changes from the group edit form. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct GroupEdit {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<ImageBlob>,
}

impl GroupEdit {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.bio.is_none() && self.avatar.is_none()
    }
}

// ---------------------------------------------------------------------------
// Shared write helpers
// ---------------------------------------------------------------------------

/// Add or remove `target` from `me`'s block list.
pub(crate) async fn write_blocked(
    store: &dyn DocumentStore,
    me: &UserId,
    target: &UserId,
    blocked: bool,
) -> Result<()> {
    let update = if blocked {
        FieldUpdate::array_union("blocked", target.as_str())
    } else {
        FieldUpdate::array_remove("blocked", target.as_str())
    };
    store
        .update_fields(USERS, me.as_str(), vec![update])
        .await
        .map_err(|e| {
            warn!(user = %me, target = %target, error = %e, "block list update failed");
            ClientError::Write(e)
        })?;
    info!(user = %me, target = %target, blocked, "block list updated");
    Ok(())
}

/// Insert one message document with a server timestamp.
pub(crate) async fn insert_message(store: &dyn DocumentStore, draft: &MessageDraft) -> Result<String> {
    let doc = NewDocument::new(to_fields(draft)?).with_server_timestamp("timestamp");
    store.insert(MESSAGES, doc).await.map_err(|e| {
        warn!(chat = %draft.chat_id, error = %e, "message insert failed");
        ClientError::Write(e)
    })
}

/// Overwrite a chat's `lastMessage` preview.
pub(crate) async fn update_preview(
    store: &dyn DocumentStore,
    chat_id: &ChatId,
    text: &str,
    sender: Sender,
) -> Result<()> {
    let preview = serde_json::to_value(LastMessageDraft {
        text: text.to_string(),
        sender,
    })
    .map_err(parlor_shared::ModelError::from)?;
    store
        .update_fields(
            CHATS,
            chat_id.as_str(),
            vec![
                FieldUpdate::set("lastMessage", preview),
                FieldUpdate::server_timestamp("lastMessage.timestamp"),
            ],
        )
        .await
        .map_err(|e| {
            warn!(chat = %chat_id, error = %e, "preview update failed");
            ClientError::Write(e)
        })
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

pub struct Membership {
    store: Arc<dyn DocumentStore>,
    uploader: Arc<dyn Uploader>,
    alerts: Alerts,
}

impl Membership {
    pub fn new(store: Arc<dyn DocumentStore>, uploader: Arc<dyn Uploader>, alerts: Alerts) -> Self {
        Self {
            store,
            uploader,
            alerts,
        }
    }

    /// Add `user` to the group and announce it. Adding an existing member
    /// leaves the member set unchanged but still posts the notice. Direct
    /// chats are refused without a write.
    pub async fn add_member(&self, chat_id: &ChatId, user: &User) -> Result<()> {
        self.fetch_group(chat_id).await?;

        self.store
            .update_fields(
                CHATS,
                chat_id.as_str(),
                vec![FieldUpdate::array_union("members", user.id.as_str())],
            )
            .await
            .map_err(|e| self.write_failed(chat_id, "add member", e))?;
        info!(chat = %chat_id, user = %user.id, "member added");

        let notice = joined_notice(&user.username);
        self.post_system_notice(chat_id, &notice).await
    }

    /// Remove `user` from the group and announce it. The last member cannot
    /// leave.
    ///
    /// The member count is checked before the remove, so two clients removing
    /// the last two members at once can both pass the check. The group is
    /// re-read after the write and, if it came out empty, `user` is put back
    /// and the removal is rejected.
    pub async fn remove_member(&self, chat_id: &ChatId, user: &UserId) -> Result<()> {
        let group = self.fetch_group(chat_id).await?;
        if !group.has_member(user) {
            debug!(chat = %chat_id, user = %user, "not a member, nothing to remove");
            return Ok(());
        }
        if group.member_count() <= 1 {
            return Err(self.reject(LAST_MEMBER));
        }

        let username = match self.store.get_one(USERS, user.as_str()).await {
            Ok(doc) => User::from_document(&doc.id, &doc.fields)
                .map(|u| u.username)
                .unwrap_or_else(|_| user.to_string()),
            Err(e) => {
                warn!(user = %user, error = %e, "could not resolve leaving member's name");
                user.to_string()
            }
        };

        self.store
            .update_fields(
                CHATS,
                chat_id.as_str(),
                vec![FieldUpdate::array_remove("members", user.as_str())],
            )
            .await
            .map_err(|e| self.write_failed(chat_id, "remove member", e))?;
        self.restore_if_emptied(chat_id, user).await?;
        info!(chat = %chat_id, user = %user, "member removed");

        self.post_system_notice(chat_id, &left_notice(&username)).await
    }

    /// Profiles of every member of `group`, in member order. Members whose
    /// profile cannot be read are logged and left out.
    pub async fn group_members(&self, group: &GroupChat) -> Vec<User> {
        let mut profiles = Vec::with_capacity(group.member_count());
        for id in &group.members {
            match self.store.get_one(USERS, id.as_str()).await {
                Ok(doc) => match User::from_document(&doc.id, &doc.fields) {
                    Ok(user) => profiles.push(user),
                    Err(e) => warn!(chat = %group.id, user = %id, error = %e, "malformed member profile"),
                },
                Err(e) => warn!(chat = %group.id, user = %id, error = %e, "member lookup failed"),
            }
        }
        profiles
    }

    /// Every user except `me`, sorted by username, for picking group invitees.
    ///
    /// Reads the first snapshot of a `users` live query and releases it.
    pub async fn user_directory(&self, me: &UserId) -> Result<Vec<User>> {
        let mut subscription = self
            .store
            .subscribe(Query::collection(USERS))
            .await
            .map_err(ClientError::Subscribe)?;
        let snapshot = subscription.next().await.unwrap_or_default();
        subscription.cancel();

        let mut users: Vec<User> = snapshot
            .into_iter()
            .filter(|doc| doc.id != me.as_str())
            .filter_map(|doc| match User::from_document(&doc.id, &doc.fields) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(user = %doc.id, error = %e, "skipping malformed user");
                    None
                }
            })
            .collect();
        users.sort_by_cached_key(|u| u.username.to_lowercase());
        debug!(count = users.len(), "user directory loaded");
        Ok(users)
    }

    pub async fn set_blocked(&self, me: &UserId, target: &UserId, blocked: bool) -> Result<()> {
        write_blocked(self.store.as_ref(), me, target, blocked).await
    }

    /// Create a group owned by `creator`.
    ///
    /// Validation failures are reported as `Rejected` and alerted without
    /// touching the store.
    pub async fn create_group(&self, creator: &User, group: NewGroup) -> Result<ChatId> {
        let name = group.name.trim();
        if name.is_empty() {
            return Err(self.reject(GROUP_NAME_REQUIRED));
        }

        let invitees: BTreeSet<&UserId> = group
            .invitees
            .iter()
            .filter(|id| **id != creator.id)
            .collect();
        if invitees.len() < MIN_GROUP_INVITEES {
            return Err(self.reject(GROUP_TOO_SMALL));
        }

        let avatar = match group.avatar {
            Some(image) => Some(self.upload(image).await?),
            None => None,
        };

        let mut members = vec![creator.id.clone()];
        members.extend(invitees.into_iter().cloned());

        let draft = GroupDraft {
            kind: "group",
            name: name.to_string(),
            avatar,
            bio: group.bio.trim().to_string(),
            created_by: creator.id.clone(),
            members,
            last_message: LastMessageDraft {
                text: GROUP_CREATED_TEXT.to_string(),
                sender: Sender::User(creator.id.clone()),
            },
        };
        let doc = NewDocument::new(to_fields(&draft)?)
            .with_server_timestamp("createdAt")
            .with_server_timestamp("lastMessage.timestamp");
        let id = self.store.insert(CHATS, doc).await.map_err(|e| {
            warn!(name = %draft.name, error = %e, "group insert failed");
            self.alerts.emit(AlertKind::WriteFailed, "Could not create the group");
            ClientError::Write(e)
        })?;
        let chat_id = ChatId::from(id);
        info!(chat = %chat_id, name = %draft.name, members = draft.members.len(), "group created");

        insert_message(
            self.store.as_ref(),
            &MessageDraft {
                chat_id: chat_id.clone(),
                sender_id: Sender::User(creator.id.clone()),
                sender_name: Some(creator.username.clone()),
                text: GROUP_CREATED_TEXT.to_string(),
                img: None,
            },
        )
        .await?;

        Ok(chat_id)
    }

    /// Apply the fields of `edit` that differ from `current`. Returns whether
    /// anything was written.
    pub async fn update_group(&self, current: &GroupChat, edit: GroupEdit) -> Result<bool> {
        let mut updates = Vec::new();

        if let Some(name) = edit.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(self.reject(GROUP_NAME_REQUIRED));
            }
            if name != current.name {
                updates.push(FieldUpdate::set("name", name));
            }
        }
        if let Some(bio) = edit.bio {
            let bio = bio.trim();
            if bio != current.bio {
                updates.push(FieldUpdate::set("bio", bio));
            }
        }
        if let Some(image) = edit.avatar {
            let reference = self.upload(image).await?;
            if current.avatar.as_deref() != Some(reference.as_str()) {
                updates.push(FieldUpdate::set("avatar", reference));
            }
        }

        if updates.is_empty() {
            debug!(chat = %current.id, "group edit changes nothing");
            return Ok(false);
        }

        let fields: Vec<String> = updates.iter().map(|u| u.path().to_string()).collect();
        self.store
            .update_fields(CHATS, current.id.as_str(), updates)
            .await
            .map_err(|e| self.write_failed(&current.id, "update group", e))?;
        info!(chat = %current.id, fields = ?fields, "group updated");
        Ok(true)
    }

    async fn post_system_notice(&self, chat_id: &ChatId, text: &str) -> Result<()> {
        insert_message(
            self.store.as_ref(),
            &MessageDraft {
                chat_id: chat_id.clone(),
                sender_id: Sender::System,
                sender_name: None,
                text: text.to_string(),
                img: None,
            },
        )
        .await?;
        update_preview(self.store.as_ref(), chat_id, text, Sender::System).await
    }

    async fn restore_if_emptied(&self, chat_id: &ChatId, user: &UserId) -> Result<()> {
        let doc = self
            .store
            .get_one(CHATS, chat_id.as_str())
            .await
            .map_err(ClientError::Fetch)?;
        let emptied = doc
            .get("members")
            .and_then(Value::as_array)
            .is_some_and(Vec::is_empty);
        if !emptied {
            return Ok(());
        }

        warn!(chat = %chat_id, user = %user, "concurrent removal emptied the group, restoring member");
        self.store
            .update_fields(
                CHATS,
                chat_id.as_str(),
                vec![FieldUpdate::array_union("members", user.as_str())],
            )
            .await
            .map_err(|e| self.write_failed(chat_id, "restore member", e))?;
        Err(self.reject(LAST_MEMBER))
    }

    async fn fetch_group(&self, chat_id: &ChatId) -> Result<GroupChat> {
        let doc = self
            .store
            .get_one(CHATS, chat_id.as_str())
            .await
            .map_err(ClientError::Fetch)?;
        match Chat::from_document(&doc.id, &doc.fields)? {
            Chat::Group(group) => Ok(group),
            Chat::Direct(_) => Err(self.reject("Direct chats have fixed members")),
        }
    }

    async fn upload(&self, image: ImageBlob) -> Result<String> {
        self.uploader.upload(image).await.map_err(|e| {
            warn!(error = %e, "image upload failed");
            self.alerts.emit(AlertKind::UploadFailed, e.to_string());
            ClientError::Upload(e)
        })
    }

    fn reject(&self, message: &str) -> ClientError {
        debug!(reason = message, "action rejected");
        self.alerts.emit(AlertKind::Rejected, message);
        ClientError::rejected(message)
    }

    fn write_failed(&self, chat_id: &ChatId, action: &str, e: parlor_store::StoreError) -> ClientError {
        warn!(chat = %chat_id, action, error = %e, "chat update failed");
        ClientError::Write(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fields, seed_user, user, FailingUploader};
    use crate::upload::DataUrlUploader;
    use async_trait::async_trait;
    use parlor_shared::Message;
    use parlor_store::{Document, MemoryStore, Subscription};
    use serde_json::json;

    /// Removes `rival` from the member set right before any member removal,
    /// as another client leaving at the same moment would.
    struct ConcurrentLeave {
        inner: MemoryStore,
        rival: UserId,
    }

    #[async_trait]
    impl DocumentStore for ConcurrentLeave {
        async fn subscribe(&self, query: Query) -> parlor_store::Result<Subscription> {
            self.inner.subscribe(query).await
        }

        async fn get_one(&self, collection: &str, id: &str) -> parlor_store::Result<Document> {
            self.inner.get_one(collection, id).await
        }

        async fn insert(&self, collection: &str, doc: NewDocument) -> parlor_store::Result<String> {
            self.inner.insert(collection, doc).await
        }

        async fn put(&self, collection: &str, id: &str, doc: NewDocument) -> parlor_store::Result<()> {
            self.inner.put(collection, id, doc).await
        }

        async fn update_fields(
            &self,
            collection: &str,
            id: &str,
            updates: Vec<FieldUpdate>,
        ) -> parlor_store::Result<()> {
            let removes_member = updates
                .iter()
                .any(|u| matches!(u, FieldUpdate::ArrayRemove { path, .. } if path == "members"));
            if removes_member {
                self.inner
                    .update_fields(
                        collection,
                        id,
                        vec![FieldUpdate::array_remove("members", self.rival.as_str())],
                    )
                    .await?;
            }
            self.inner.update_fields(collection, id, updates).await
        }

        fn live_subscriptions(&self) -> usize {
            self.inner.live_subscriptions()
        }
    }

    async fn seed_group(store: &MemoryStore, id: &str, members: &[&str]) {
        store
            .put(
                CHATS,
                id,
                NewDocument::new(fields(json!({ "type": "group", "name": "x", "members": members }))),
            )
            .await
            .unwrap();
    }

    fn membership(store: &MemoryStore) -> (Membership, Alerts) {
        let alerts = Alerts::new();
        let m = Membership::new(
            Arc::new(store.clone()),
            Arc::new(DataUrlUploader::new(1024)),
            alerts.clone(),
        );
        (m, alerts)
    }

    fn messages_of(store: &MemoryStore, chat: &ChatId) -> Vec<Message> {
        store
            .documents(MESSAGES)
            .into_iter()
            .filter_map(|d| Message::from_document(&d.id, &d.fields).ok())
            .filter(|m| &m.chat_id == chat)
            .collect()
    }

    fn group_of(store: &MemoryStore, id: &ChatId) -> GroupChat {
        let doc = store
            .documents(CHATS)
            .into_iter()
            .find(|d| d.id == id.as_str())
            .unwrap();
        match Chat::from_document(&doc.id, &doc.fields).unwrap() {
            Chat::Group(group) => group,
            Chat::Direct(_) => panic!("expected a group"),
        }
    }

    #[tokio::test]
    async fn create_group_trip() {
        let store = MemoryStore::new();
        let (m, _) = membership(&store);
        let a = user("a", "Ana");

        let id = m
            .create_group(
                &a,
                NewGroup {
                    name: "Trip".into(),
                    invitees: vec![UserId::from("b"), UserId::from("c"), UserId::from("a")],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let group = group_of(&store, &id);
        let members: BTreeSet<&str> = group.members.iter().map(UserId::as_str).collect();
        assert_eq!(members, BTreeSet::from(["a", "b", "c"]));
        assert_eq!(group.created_by, Some(UserId::from("a")));
        assert!(group.created_at.is_some());
        let preview = group.last_message.unwrap();
        assert_eq!(preview.text, "Group created");
        assert!(preview.timestamp.is_some());

        let msgs = messages_of(&store, &id);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].text, "Group created");
        assert!(msgs[0].is_from(&UserId::from("a")));
    }

    #[tokio::test]
    async fn create_group_validation_is_local() {
        let store = MemoryStore::new();
        let (m, alerts) = membership(&store);
        let mut rx = alerts.subscribe();
        let a = user("a", "Ana");

        let err = m
            .create_group(
                &a,
                NewGroup {
                    name: "   ".into(),
                    invitees: vec![UserId::from("b"), UserId::from("c")],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(rx.recv().await.unwrap().message, GROUP_NAME_REQUIRED);

        // The creator does not count as an invitee.
        let err = m
            .create_group(
                &a,
                NewGroup {
                    name: "Trip".into(),
                    invitees: vec![UserId::from("b"), UserId::from("a"), UserId::from("b")],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), GROUP_TOO_SMALL);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn failed_avatar_upload_creates_nothing() {
        let store = MemoryStore::new();
        let m = Membership::new(Arc::new(store.clone()), Arc::new(FailingUploader), Alerts::new());
        let err = m
            .create_group(
                &user("a", "Ana"),
                NewGroup {
                    name: "Trip".into(),
                    avatar: Some(ImageBlob::new(&b"img"[..], "image/png")),
                    invitees: vec![UserId::from("b"), UserId::from("c")],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Upload(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn add_member_is_idempotent_on_members() {
        let store = MemoryStore::new();
        let (m, _) = membership(&store);
        let id = m
            .create_group(
                &user("a", "Ana"),
                NewGroup {
                    name: "Trip".into(),
                    invitees: vec![UserId::from("b"), UserId::from("c")],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let dan = user("d", "dan");
        m.add_member(&id, &dan).await.unwrap();
        m.add_member(&id, &dan).await.unwrap();

        let group = group_of(&store, &id);
        assert_eq!(group.member_count(), 4);
        assert_eq!(group.last_message.unwrap().text, "dan has joined the group");

        let notices: Vec<Message> = messages_of(&store, &id)
            .into_iter()
            .filter(|m| m.sender.is_system())
            .collect();
        assert_eq!(notices.len(), 2);
    }

    #[tokio::test]
    async fn remove_member_keeps_one() {
        let store = MemoryStore::new();
        seed_user(&store, "b", "bob").await;
        let (m, _) = membership(&store);
        let id = ChatId::from("g1");
        seed_group(&store, "g1", &["a", "b"]).await;

        m.remove_member(&id, &UserId::from("b")).await.unwrap();
        let group = group_of(&store, &id);
        assert_eq!(group.members, vec![UserId::from("a")]);
        assert_eq!(group.last_message.unwrap().text, "bob has left the group");

        let err = m.remove_member(&id, &UserId::from("a")).await.unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(group_of(&store, &id).member_count(), 1);
    }

    #[tokio::test]
    async fn set_blocked_union_and_remove() {
        let store = MemoryStore::new();
        seed_user(&store, "a", "Ana").await;
        let (m, _) = membership(&store);
        let (a, b) = (UserId::from("a"), UserId::from("b"));

        m.set_blocked(&a, &b, true).await.unwrap();
        m.set_blocked(&a, &b, true).await.unwrap();
        let doc = store.get_one(USERS, "a").await.unwrap();
        assert_eq!(doc.get("blocked"), Some(&json!(["b"])));

        m.set_blocked(&a, &b, false).await.unwrap();
        let doc = store.get_one(USERS, "a").await.unwrap();
        assert_eq!(doc.get("blocked"), Some(&json!([])));
    }

    #[tokio::test]
    async fn update_group_writes_only_changes() {
        let store = MemoryStore::new();
        let (m, _) = membership(&store);
        let id = m
            .create_group(
                &user("a", "Ana"),
                NewGroup {
                    name: "Trip".into(),
                    bio: "summer".into(),
                    invitees: vec![UserId::from("b"), UserId::from("c")],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let current = group_of(&store, &id);
        let writes = store.write_count();

        let unchanged = GroupEdit {
            name: Some("Trip".into()),
            bio: Some("summer".into()),
            avatar: None,
        };
        assert!(!m.update_group(&current, unchanged).await.unwrap());
        assert!(!m.update_group(&current, GroupEdit::default()).await.unwrap());
        assert_eq!(store.write_count(), writes);

        let rename = GroupEdit {
            name: Some("Road trip".into()),
            ..Default::default()
        };
        assert!(m.update_group(&current, rename).await.unwrap());
        let updated = group_of(&store, &id);
        assert_eq!(updated.name, "Road trip");
        assert_eq!(updated.bio, "summer");
    }

    #[tokio::test]
    async fn add_member_refuses_direct_chats() {
        let store = MemoryStore::new();
        store
            .put(
                CHATS,
                "ab",
                NewDocument::new(fields(json!({ "type": "direct", "members": ["a", "b"] }))),
            )
            .await
            .unwrap();
        let (m, _) = membership(&store);
        let writes = store.write_count();

        let err = m
            .add_member(&ChatId::from("ab"), &user("c", "Cy"))
            .await
            .unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(store.write_count(), writes);

        let doc = store.get_one(CHATS, "ab").await.unwrap();
        assert!(matches!(
            Chat::from_document(&doc.id, &doc.fields),
            Ok(Chat::Direct(_))
        ));
        assert!(messages_of(&store, &ChatId::from("ab")).is_empty());
    }

    #[tokio::test]
    async fn concurrent_leave_cannot_empty_group() {
        let store = MemoryStore::new();
        seed_user(&store, "b", "bob").await;
        seed_group(&store, "g1", &["a", "b"]).await;
        let m = Membership::new(
            Arc::new(ConcurrentLeave {
                inner: store.clone(),
                rival: UserId::from("a"),
            }),
            Arc::new(DataUrlUploader::new(1024)),
            Alerts::new(),
        );

        let err = m
            .remove_member(&ChatId::from("g1"), &UserId::from("b"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), LAST_MEMBER);

        let group = group_of(&store, &ChatId::from("g1"));
        assert_eq!(group.members, vec![UserId::from("b")]);
        assert!(messages_of(&store, &ChatId::from("g1")).is_empty());
    }

    #[tokio::test]
    async fn group_members_skips_unknown_profiles() {
        let store = MemoryStore::new();
        seed_user(&store, "a", "Ana").await;
        seed_user(&store, "b", "Bob").await;
        seed_group(&store, "g1", &["b", "ghost", "a"]).await;
        let (m, _) = membership(&store);

        let members = m.group_members(&group_of(&store, &ChatId::from("g1"))).await;
        let names: Vec<&str> = members.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Ana"]);
    }

    #[tokio::test]
    async fn user_directory_lists_everyone_else() {
        let store = MemoryStore::new();
        for (id, name) in [("a", "Ana"), ("c", "cy"), ("b", "Bob")] {
            seed_user(&store, id, name).await;
        }
        let (m, _) = membership(&store);

        let users = m.user_directory(&UserId::from("a")).await.unwrap();
        let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(store.live_subscriptions(), 0);
    }
}
