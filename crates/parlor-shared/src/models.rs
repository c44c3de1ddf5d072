//! Typed projections of the documents held in the remote store.
//!
//! Store documents are loosely shaped JSON objects. Everything the client
//! renders goes through the `from_document` parsers here first, so the rest of
//! the code only ever sees validated values: a [`Chat`] is either a
//! [`DirectChat`] with exactly two members or a [`GroupChat`] with a non-empty
//! member set.
//!
//! The `*Draft` structs are the write-side shapes. They serialize to the
//! camelCase field names used in the store; timestamps are never part of a
//! draft because the store assigns them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::constants::SYSTEM_SENDER;
use crate::error::ModelError;
use crate::types::{ChatId, MessageId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user profile as stored in the `users` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Durable reference returned by the upload collaborator.
    pub avatar: Option<String>,
    pub bio: String,
    /// Users this user has blocked.
    pub blocked: BTreeSet<UserId>,
}

#[derive(Deserialize)]
struct UserFields {
    #[serde(default)]
    username: String,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    blocked: Vec<UserId>,
}

impl User {
    pub fn from_document(id: &str, fields: &Value) -> Result<Self, ModelError> {
        let raw: UserFields = parse("user", id, fields)?;
        Ok(Self {
            id: UserId::new(id),
            username: raw.username,
            avatar: raw.avatar,
            bio: raw.bio.unwrap_or_default(),
            blocked: raw.blocked.into_iter().collect(),
        })
    }

    pub fn has_blocked(&self, other: &UserId) -> bool {
        self.blocked.contains(other)
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Author of a message or preview: a user, or the system for membership notices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sender {
    User(UserId),
    System,
}

impl Sender {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Sender::User(id) => Some(id),
            Sender::System => None,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Sender::System)
    }
}

impl From<UserId> for Sender {
    fn from(id: UserId) -> Self {
        Sender::User(id)
    }
}

impl Serialize for Sender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Sender::User(id) => serializer.serialize_str(id.as_str()),
            Sender::System => serializer.serialize_str(SYSTEM_SENDER),
        }
    }
}

impl<'de> Deserialize<'de> for Sender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == SYSTEM_SENDER {
            Ok(Sender::System)
        } else {
            Ok(Sender::User(UserId(raw)))
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Denormalized summary of the newest message, stored on the chat itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    #[serde(default)]
    pub text: String,
    pub sender: Sender,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectChat {
    pub id: ChatId,
    pub members: [UserId; 2],
    pub last_message: Option<LastMessage>,
}

impl DirectChat {
    /// The member that is not `me`, if `me` is a member at all.
    pub fn other_member(&self, me: &UserId) -> Option<&UserId> {
        match &self.members {
            [a, b] if a == me => Some(b),
            [a, b] if b == me => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupChat {
    pub id: ChatId,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: String,
    pub created_by: Option<UserId>,
    /// Server time of creation. Absent on groups written before it existed.
    pub created_at: Option<DateTime<Utc>>,
    /// Never empty. Kept in store order.
    pub members: Vec<UserId>,
    pub last_message: Option<LastMessage>,
}

impl GroupChat {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn has_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }
}

/// A chat document, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chat {
    Direct(DirectChat),
    Group(GroupChat),
}

#[derive(Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ChatKind {
    // Chats written before the `type` field existed are direct chats.
    #[default]
    Direct,
    Group,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatFields {
    #[serde(default, rename = "type")]
    kind: ChatKind,
    #[serde(default)]
    members: Vec<UserId>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    created_by: Option<UserId>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    last_message: Option<LastMessage>,
}

impl Chat {
    pub fn from_document(id: &str, fields: &Value) -> Result<Self, ModelError> {
        let raw: ChatFields = parse("chat", id, fields)?;

        if raw.members.is_empty() {
            return Err(ModelError::NoMembers(id.to_string()));
        }

        match raw.kind {
            ChatKind::Direct => {
                let found = raw.members.len();
                let members: [UserId; 2] =
                    raw.members
                        .try_into()
                        .map_err(|_| ModelError::DirectMemberCount {
                            id: id.to_string(),
                            found,
                        })?;
                if members[0] == members[1] {
                    return Err(ModelError::DirectMemberCount {
                        id: id.to_string(),
                        found,
                    });
                }
                Ok(Chat::Direct(DirectChat {
                    id: ChatId::from(id),
                    members,
                    last_message: raw.last_message,
                }))
            }
            ChatKind::Group => {
                // Union semantics on the store side should prevent duplicates,
                // but a hand-edited document may still carry them.
                let mut seen = BTreeSet::new();
                let members = raw
                    .members
                    .into_iter()
                    .filter(|m| seen.insert(m.clone()))
                    .collect();
                Ok(Chat::Group(GroupChat {
                    id: ChatId::from(id),
                    name: raw.name.unwrap_or_default(),
                    avatar: raw.avatar,
                    bio: raw.bio.unwrap_or_default(),
                    created_by: raw.created_by,
                    created_at: raw.created_at,
                    members,
                    last_message: raw.last_message,
                }))
            }
        }
    }

    pub fn id(&self) -> &ChatId {
        match self {
            Chat::Direct(c) => &c.id,
            Chat::Group(c) => &c.id,
        }
    }

    pub fn members(&self) -> &[UserId] {
        match self {
            Chat::Direct(c) => &c.members,
            Chat::Group(c) => &c.members,
        }
    }

    pub fn last_message(&self) -> Option<&LastMessage> {
        match self {
            Chat::Direct(c) => c.last_message.as_ref(),
            Chat::Group(c) => c.last_message.as_ref(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Chat::Group(_))
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// An immutable chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender: Sender,
    pub sender_name: Option<String>,
    /// Empty for image-only messages.
    pub text: String,
    pub img: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageFields {
    chat_id: ChatId,
    sender_id: Sender,
    #[serde(default)]
    sender_name: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    img: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn from_document(id: &str, fields: &Value) -> Result<Self, ModelError> {
        let raw: MessageFields = parse("message", id, fields)?;
        Ok(Self {
            id: MessageId(id.to_string()),
            chat_id: raw.chat_id,
            sender: raw.sender_id,
            sender_name: raw.sender_name,
            text: raw.text.unwrap_or_default(),
            img: raw.img.filter(|s| !s.is_empty()),
            timestamp: raw.timestamp,
        })
    }

    pub fn is_from(&self, user: &UserId) -> bool {
        self.sender.user_id() == Some(user)
    }
}

// ---------------------------------------------------------------------------
// Write-side drafts
// ---------------------------------------------------------------------------

/// Fields of a new message document, minus the server timestamp.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub chat_id: ChatId,
    pub sender_id: Sender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
}

/// Preview written to a chat's `lastMessage`, minus the server timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct LastMessageDraft {
    pub text: String,
    pub sender: Sender,
}

/// Fields of a new group chat document. `createdAt` and
/// `lastMessage.timestamp` are filled in by the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDraft {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: String,
    pub created_by: UserId,
    pub members: Vec<UserId>,
    pub last_message: LastMessageDraft,
}

/// Serialize a draft into the JSON object handed to the store.
pub fn to_fields<T: Serialize>(draft: &T) -> Result<serde_json::Map<String, Value>, ModelError> {
    match serde_json::to_value(draft)? {
        Value::Object(map) => Ok(map),
        other => Err(ModelError::Serialization(serde::ser::Error::custom(format!(
            "expected an object, got {other}"
        )))),
    }
}

fn parse<T: for<'de> Deserialize<'de>>(
    kind: &'static str,
    id: &str,
    fields: &Value,
) -> Result<T, ModelError> {
    T::deserialize(fields).map_err(|source| ModelError::Malformed {
        kind,
        id: id.to_string(),
        source,
    })
}
