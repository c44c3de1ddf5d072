//! Conversation list synchronizer.
//!
//! Follows every chat the signed-in user belongs to. Each snapshot from the
//! store rebuilds the whole list: direct chats become rows keyed by the other
//! member, groups become rows with their member count. Rows are ordered by
//! the time of their latest message, newest first.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use parlor_shared::constants::{CHATS, USERS};
use parlor_shared::{Chat, ChatId, GroupChat, LastMessage, User, UserId};
use parlor_store::{DocumentStore, Query, Snapshot};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::sync_task::{lock, SyncTask};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectRow {
    pub chat_id: ChatId,
    pub peer: UserId,
    pub last_message: Option<LastMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRow {
    pub group: GroupChat,
    pub member_count: usize,
}

impl GroupRow {
    pub fn chat_id(&self) -> &ChatId {
        &self.group.id
    }
}

/// The projected list for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatListView {
    /// Whose chats these are. `None` while detached.
    pub user: Option<UserId>,
    pub direct: Vec<DirectRow>,
    pub groups: Vec<GroupRow>,
}

impl ChatListView {
    pub fn group(&self, chat_id: &ChatId) -> Option<&GroupChat> {
        self.groups
            .iter()
            .map(|row| &row.group)
            .find(|g| &g.id == chat_id)
    }

    pub fn direct_with(&self, peer: &UserId) -> Option<&DirectRow> {
        self.direct.iter().find(|row| &row.peer == peer)
    }

    fn project(user: &UserId, snapshot: Snapshot) -> Self {
        let mut chats = Vec::with_capacity(snapshot.len());
        for doc in snapshot {
            match Chat::from_document(&doc.id, &doc.fields) {
                Ok(chat) => chats.push(chat),
                Err(e) => warn!(chat = %doc.id, error = %e, "skipping malformed chat"),
            }
        }
        // Stable: equal timestamps keep store order.
        chats.sort_by_key(|chat| Reverse(recency(chat.last_message())));

        let mut view = ChatListView {
            user: Some(user.clone()),
            ..Default::default()
        };
        for chat in chats {
            match chat {
                Chat::Direct(direct) => match direct.other_member(user).cloned() {
                    Some(peer) => view.direct.push(DirectRow {
                        chat_id: direct.id,
                        peer,
                        last_message: direct.last_message,
                    }),
                    None => debug!(chat = %direct.id, "direct chat without current user"),
                },
                Chat::Group(group) => view.groups.push(GroupRow {
                    member_count: group.member_count(),
                    group,
                }),
            }
        }
        view
    }
}

fn recency(last: Option<&LastMessage>) -> Option<DateTime<Utc>> {
    last.and_then(|m| m.timestamp)
}

pub struct ConversationList {
    store: Arc<dyn DocumentStore>,
    tx: Arc<watch::Sender<ChatListView>>,
    task: Mutex<Option<SyncTask>>,
}

impl ConversationList {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let (tx, _) = watch::channel(ChatListView::default());
        Self {
            store,
            tx: Arc::new(tx),
            task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatListView> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ChatListView {
        self.tx.borrow().clone()
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(SyncTask::is_running)
    }

    /// Start following `user`'s chats, replacing any previous user.
    pub async fn attach(&self, user: UserId) -> Result<()> {
        self.detach();

        let query = Query::collection(CHATS).where_array_contains("members", user.as_str());
        let subscription = self
            .store
            .subscribe(query)
            .await
            .map_err(ClientError::Subscribe)?;

        self.tx.send_replace(ChatListView {
            user: Some(user.clone()),
            ..Default::default()
        });

        let tx = Arc::clone(&self.tx);
        let owner = user.clone();
        let task = SyncTask::follow("chat-list", subscription, move |snapshot| {
            let view = ChatListView::project(&owner, snapshot);
            tx.send_if_modified(|current| {
                // A late snapshot for a previous user.
                if current.user.as_ref() != Some(&owner) || *current == view {
                    return false;
                }
                *current = view;
                true
            });
        });

        if let Some(mut previous) = lock(&self.task).replace(task) {
            previous.stop();
        }
        info!(user = %user, "chat list attached");
        Ok(())
    }

    /// Stop following and empty the list. Safe to call when detached.
    pub fn detach(&self) {
        let previous = lock(&self.task).take();
        if let Some(mut task) = previous {
            task.stop();
            info!("chat list detached");
        }
        self.tx.send_if_modified(|view| {
            let changed = *view != ChatListView::default();
            *view = ChatListView::default();
            changed
        });
    }

    /// Follow another user, or nobody.
    pub async fn switch_user(&self, user: Option<UserId>) -> Result<()> {
        let following = self.tx.borrow().user.clone();
        match user {
            Some(user) if following.as_ref() == Some(&user) && self.is_attached() => Ok(()),
            Some(user) => self.attach(user).await,
            None => {
                self.detach();
                Ok(())
            }
        }
    }

    /// Fetch the profile behind a direct chat row.
    pub async fn resolve_direct_peer(&self, row: &DirectRow) -> Result<User> {
        let doc = self
            .store
            .get_one(USERS, row.peer.as_str())
            .await
            .map_err(|e| {
                warn!(chat = %row.chat_id, peer = %row.peer, error = %e, "peer lookup failed");
                ClientError::Fetch(e)
            })?;
        Ok(User::from_document(&doc.id, &doc.fields)?)
    }

    /// Direct-chat peers who are not yet members of `chat_id`.
    pub fn add_member_candidates(&self, chat_id: &ChatId) -> Vec<UserId> {
        let view = self.tx.borrow();
        let members: BTreeSet<&UserId> = view
            .group(chat_id)
            .map(|g| g.members.iter().collect())
            .unwrap_or_default();

        let mut seen = BTreeSet::new();
        let candidates = view
            .direct
            .iter()
            .map(|row| &row.peer)
            .filter(|peer| !members.contains(peer) && seen.insert(*peer))
            .cloned()
            .collect();
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fields, seed_user, wait_until};
    use parlor_store::{FieldUpdate, MemoryStore, NewDocument};
    use serde_json::json;

    async fn put_chat(store: &MemoryStore, id: &str, value: serde_json::Value) {
        store.put(CHATS, id, NewDocument::new(fields(value))).await.unwrap();
    }

    #[tokio::test]
    async fn splits_direct_and_group_and_orders_by_recency() {
        let store = MemoryStore::new();
        put_chat(
            &store,
            "d1",
            json!({ "type": "direct", "members": ["a", "b"],
                    "lastMessage": { "text": "old", "sender": "b", "timestamp": "2024-01-01T00:00:00Z" } }),
        )
        .await;
        put_chat(
            &store,
            "g1",
            json!({ "type": "group", "name": "Trip", "members": ["a", "b", "c"],
                    "lastMessage": { "text": "new", "sender": "c", "timestamp": "2024-02-01T00:00:00Z" } }),
        )
        .await;
        put_chat(
            &store,
            "d2",
            json!({ "members": ["c", "a"],
                    "lastMessage": { "text": "newest", "sender": "c", "timestamp": "2024-03-01T00:00:00Z" } }),
        )
        .await;
        // Not a member.
        put_chat(&store, "d3", json!({ "members": ["b", "c"] })).await;
        // Invalid, skipped.
        put_chat(&store, "bad", json!({ "type": "direct", "members": ["a"] })).await;

        let list = ConversationList::new(Arc::new(store.clone()));
        list.attach(UserId::from("a")).await.unwrap();
        let mut rx = list.subscribe();
        let view = wait_until(&mut rx, |v| v.direct.len() == 2).await;

        let peers: Vec<&str> = view.direct.iter().map(|r| r.peer.as_str()).collect();
        assert_eq!(peers, vec!["c", "b"]);
        assert_eq!(view.groups.len(), 1);
        assert_eq!(view.groups[0].member_count, 3);
        assert_eq!(store.live_subscriptions(), 1);
    }

    #[tokio::test]
    async fn list_follows_membership_changes() {
        let store = MemoryStore::new();
        put_chat(&store, "g1", json!({ "type": "group", "name": "x", "members": ["b", "c"] })).await;

        let list = ConversationList::new(Arc::new(store.clone()));
        list.attach(UserId::from("a")).await.unwrap();
        let mut rx = list.subscribe();

        store
            .update_fields(CHATS, "g1", vec![FieldUpdate::array_union("members", "a")])
            .await
            .unwrap();
        let view = wait_until(&mut rx, |v| v.groups.len() == 1).await;
        assert_eq!(view.groups[0].member_count, 3);

        store
            .update_fields(CHATS, "g1", vec![FieldUpdate::array_remove("members", "a")])
            .await
            .unwrap();
        wait_until(&mut rx, |v| v.groups.is_empty()).await;
    }

    #[tokio::test]
    async fn switch_user_replaces_subscription() {
        let store = MemoryStore::new();
        put_chat(&store, "d1", json!({ "members": ["a", "b"] })).await;
        put_chat(&store, "d2", json!({ "members": ["c", "d"] })).await;

        let list = ConversationList::new(Arc::new(store.clone()));
        let mut rx = list.subscribe();
        list.switch_user(Some(UserId::from("a"))).await.unwrap();
        wait_until(&mut rx, |v| v.direct.len() == 1).await;

        list.switch_user(Some(UserId::from("c"))).await.unwrap();
        assert_eq!(store.live_subscriptions(), 1);
        let view = wait_until(&mut rx, |v| {
            v.direct.first().is_some_and(|r| r.peer == UserId::from("d"))
        })
        .await;
        assert_eq!(view.user, Some(UserId::from("c")));

        list.switch_user(None).await.unwrap();
        assert_eq!(store.live_subscriptions(), 0);
        assert_eq!(list.current(), ChatListView::default());

        list.detach();
        assert_eq!(store.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn drop_releases_subscription() {
        let store = MemoryStore::new();
        {
            let list = ConversationList::new(Arc::new(store.clone()));
            list.attach(UserId::from("a")).await.unwrap();
            assert_eq!(store.live_subscriptions(), 1);
        }
        assert_eq!(store.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn resolve_peer_and_candidates() {
        let store = MemoryStore::new();
        seed_user(&store, "b", "bob").await;
        put_chat(&store, "d1", json!({ "members": ["a", "b"] })).await;
        put_chat(&store, "d2", json!({ "members": ["a", "c"] })).await;
        put_chat(&store, "g1", json!({ "type": "group", "name": "x", "members": ["a", "c"] })).await;

        let list = ConversationList::new(Arc::new(store.clone()));
        list.attach(UserId::from("a")).await.unwrap();
        let mut rx = list.subscribe();
        let view = wait_until(&mut rx, |v| v.direct.len() == 2 && v.groups.len() == 1).await;

        let row = view.direct_with(&UserId::from("b")).unwrap();
        let bob = list.resolve_direct_peer(row).await.unwrap();
        assert_eq!(bob.username, "bob");

        let missing = view.direct_with(&UserId::from("c")).unwrap();
        assert!(matches!(
            list.resolve_direct_peer(missing).await,
            Err(ClientError::Fetch(_))
        ));

        let candidates = list.add_member_candidates(&ChatId::from("g1"));
        assert_eq!(candidates, vec![UserId::from("b")]);
    }
}
