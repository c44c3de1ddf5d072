//! The conversation currently open on screen.
//!
//! Holds the open chat, the resolved peer (a user for direct chats, the
//! group itself otherwise) and the two block flags derived from the signed-in
//! user and the peer. The flags are recomputed whenever either side changes.

use std::sync::{Arc, Mutex};

use parlor_shared::constants::USERS;
use parlor_shared::{ChatId, GroupChat, User, UserId};
use parlor_store::{DocumentStore, Query, Snapshot};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::membership::write_blocked;
use crate::sync_task::{lock, SyncTask};

/// Who is on the other side of the open chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    User(User),
    Group(GroupChat),
}

impl Peer {
    pub fn as_user(&self) -> Option<&User> {
        match self {
            Peer::User(user) => Some(user),
            Peer::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupChat> {
        match self {
            Peer::Group(group) => Some(group),
            Peer::User(_) => None,
        }
    }
}

/// Which block notice, if any, replaces the message input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    None,
    /// "User blocked": I blocked the peer.
    PeerBlocked,
    /// "You are Blocked!": the peer blocked me. Takes precedence.
    BlockedByPeer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChat {
    pub chat_id: ChatId,
    pub peer: Peer,
    pub i_blocked_peer: bool,
    pub blocked_by_peer: bool,
}

impl ActiveChat {
    pub fn is_group(&self) -> bool {
        matches!(self.peer, Peer::Group(_))
    }

    pub fn can_send(&self) -> bool {
        !self.i_blocked_peer && !self.blocked_by_peer
    }

    pub fn block_status(&self) -> BlockStatus {
        if self.blocked_by_peer {
            BlockStatus::BlockedByPeer
        } else if self.i_blocked_peer {
            BlockStatus::PeerBlocked
        } else {
            BlockStatus::None
        }
    }

    fn derive_flags(&mut self, me: Option<&User>) {
        let (i_blocked, blocked_by) = match (&self.peer, me) {
            (Peer::User(peer), Some(me)) => (me.has_blocked(&peer.id), peer.has_blocked(&me.id)),
            _ => (false, false),
        };
        self.i_blocked_peer = i_blocked;
        self.blocked_by_peer = blocked_by;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveView {
    /// The signed-in user as last seen.
    pub me: Option<User>,
    pub chat: Option<ActiveChat>,
}

pub struct ActiveConversation {
    store: Arc<dyn DocumentStore>,
    tx: Arc<watch::Sender<ActiveView>>,
    peer_watch: Mutex<Option<SyncTask>>,
}

impl ActiveConversation {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let (tx, _) = watch::channel(ActiveView::default());
        Self {
            store,
            tx: Arc::new(tx),
            peer_watch: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ActiveView> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<ActiveChat> {
        self.tx.borrow().chat.clone()
    }

    pub fn current_chat_id(&self) -> Option<ChatId> {
        self.tx.borrow().chat.as_ref().map(|c| c.chat_id.clone())
    }

    /// False with no open chat, or when either side has blocked the other.
    pub fn can_send(&self) -> bool {
        self.tx.borrow().chat.as_ref().is_some_and(ActiveChat::can_send)
    }

    pub fn block_status(&self) -> BlockStatus {
        self.tx
            .borrow()
            .chat
            .as_ref()
            .map_or(BlockStatus::None, ActiveChat::block_status)
    }

    /// Make `chat_id` the open chat, replacing whatever was open.
    pub fn select_conversation(&self, chat_id: ChatId, peer: Peer) {
        self.stop_peer_watch();
        info!(chat = %chat_id, group = matches!(peer, Peer::Group(_)), "conversation selected");
        self.tx.send_modify(|view| {
            let mut chat = ActiveChat {
                chat_id,
                peer,
                i_blocked_peer: false,
                blocked_by_peer: false,
            };
            chat.derive_flags(view.me.as_ref());
            view.chat = Some(chat);
        });
    }

    pub fn clear(&self) {
        self.stop_peer_watch();
        self.tx.send_if_modified(|view| view.chat.take().is_some());
    }

    /// New authoritative copy of the signed-in user.
    pub fn apply_current_user(&self, me: Option<User>) {
        self.tx.send_if_modified(|view| apply_me(view, me));
    }

    /// New authoritative copy of a user; applied if it is the open chat's peer.
    pub fn apply_peer(&self, user: User) -> bool {
        self.tx.send_if_modified(|view| apply_peer_user(view, user))
    }

    /// Refresh the open group's metadata (name, members, ...).
    pub fn apply_group(&self, group: GroupChat) -> bool {
        self.tx.send_if_modified(|view| {
            let Some(chat) = view.chat.as_mut() else {
                return false;
            };
            match &mut chat.peer {
                Peer::Group(current) if current.id == group.id && *current != group => {
                    *current = group;
                    true
                }
                _ => false,
            }
        })
    }

    /// Block or unblock the open direct chat's peer.
    ///
    /// The flag flips locally as soon as the write succeeds. The next user
    /// snapshot, if one is being watched, replaces it with the stored value.
    pub async fn toggle_block(&self) -> Result<bool> {
        let (me, peer, currently) = {
            let view = self.tx.borrow();
            let me = view.me.clone().ok_or(ClientError::NotSignedIn)?;
            let chat = view.chat.as_ref().ok_or(ClientError::NoActiveConversation)?;
            let peer = chat
                .peer
                .as_user()
                .ok_or_else(|| ClientError::rejected("Groups cannot be blocked"))?
                .id
                .clone();
            (me, peer, chat.i_blocked_peer)
        };

        let blocked = !currently;
        write_blocked(self.store.as_ref(), &me.id, &peer, blocked).await?;

        self.tx.send_if_modified(|view| {
            let Some(chat) = view.chat.as_mut() else {
                return false;
            };
            let same_peer = chat.peer.as_user().is_some_and(|p| p.id == peer);
            if !same_peer || chat.i_blocked_peer == blocked {
                return false;
            }
            chat.i_blocked_peer = blocked;
            true
        });
        Ok(blocked)
    }

    /// Keep the open direct chat's peer and the signed-in user live.
    ///
    /// Opens one live query on both user documents and re-derives the block
    /// flags on every snapshot. Replaced by the next `select_conversation` or
    /// `clear`. Does nothing for groups.
    pub async fn watch_peer(&self) -> Result<()> {
        let (chat_id, me, peer) = {
            let view = self.tx.borrow();
            let Some(chat) = view.chat.as_ref() else {
                return Err(ClientError::NoActiveConversation);
            };
            let Some(peer) = chat.peer.as_user() else {
                return Ok(());
            };
            let me = view.me.as_ref().ok_or(ClientError::NotSignedIn)?;
            (chat.chat_id.clone(), me.id.clone(), peer.id.clone())
        };

        let query = Query::collection(USERS).where_id_in([me.as_str(), peer.as_str()]);
        let subscription = self
            .store
            .subscribe(query)
            .await
            .map_err(ClientError::Subscribe)?;

        let tx = Arc::clone(&self.tx);
        let tag = chat_id.clone();
        let task = SyncTask::follow("peer-watch", subscription, move |snapshot| {
            apply_user_snapshot(&tx, &tag, &me, snapshot);
        });

        // The chat may have changed while subscribing.
        if self.current_chat_id().as_ref() != Some(&chat_id) {
            debug!(chat = %chat_id, "chat changed before peer watch started");
            return Ok(());
        }
        if let Some(mut previous) = lock(&self.peer_watch).replace(task) {
            previous.stop();
        }
        Ok(())
    }

    pub fn is_watching_peer(&self) -> bool {
        lock(&self.peer_watch).as_ref().is_some_and(SyncTask::is_running)
    }

    fn stop_peer_watch(&self) {
        if let Some(mut task) = lock(&self.peer_watch).take() {
            task.stop();
        }
    }
}

fn apply_me(view: &mut ActiveView, me: Option<User>) -> bool {
    if view.me == me {
        return false;
    }
    view.me = me;
    let me = view.me.clone();
    if let Some(chat) = view.chat.as_mut() {
        chat.derive_flags(me.as_ref());
    }
    true
}

fn apply_peer_user(view: &mut ActiveView, user: User) -> bool {
    let me = view.me.clone();
    let Some(chat) = view.chat.as_mut() else {
        return false;
    };
    match &mut chat.peer {
        Peer::User(current) if current.id == user.id => {
            let before = chat.clone();
            chat.peer = Peer::User(user);
            chat.derive_flags(me.as_ref());
            *chat != before
        }
        _ => false,
    }
}

fn apply_user_snapshot(
    tx: &watch::Sender<ActiveView>,
    chat_id: &ChatId,
    me: &UserId,
    snapshot: Snapshot,
) {
    let mut users = Vec::new();
    for doc in snapshot {
        match User::from_document(&doc.id, &doc.fields) {
            Ok(user) => users.push(user),
            Err(e) => warn!(user = %doc.id, error = %e, "skipping malformed user"),
        }
    }

    tx.send_if_modified(|view| {
        if view.chat.as_ref().map(|c| &c.chat_id) != Some(chat_id) {
            return false;
        }
        let mut changed = false;
        for user in users {
            if &user.id == me {
                if view.me.as_ref().is_some_and(|current| current.id == *me) {
                    changed |= apply_me(view, Some(user));
                }
            } else {
                changed |= apply_peer_user(view, user);
            }
        }
        // Optimistic flags never outlive an authoritative snapshot.
        let me = view.me.clone();
        if let Some(chat) = view.chat.as_mut() {
            let before = (chat.i_blocked_peer, chat.blocked_by_peer);
            chat.derive_flags(me.as_ref());
            changed |= before != (chat.i_blocked_peer, chat.blocked_by_peer);
        }
        changed
    });
}
