/// Application name
pub const APP_NAME: &str = "Parlor";

/// Collection holding one document per user profile
pub const USERS: &str = "users";

/// Collection holding direct and group chat documents
pub const CHATS: &str = "chats";

/// Collection holding every message, keyed to its chat by `chatId`
pub const MESSAGES: &str = "messages";

/// Sender id written on membership-change notices
pub const SYSTEM_SENDER: &str = "system";

/// Preview text used when the latest message carries only an image
pub const IMAGE_PREVIEW_TEXT: &str = "Sent an image";

/// Text of the first message and preview of a new group
pub const GROUP_CREATED_TEXT: &str = "Group created";

/// Maximum number of characters in a profile bio
pub const MAX_BIO_CHARS: usize = 10;

/// Members a group creator must select besides themselves
pub const MIN_GROUP_INVITEES: usize = 2;

/// Maximum image upload size in bytes (50 MiB)
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Notice written when a member joins a group.
pub fn joined_notice(username: &str) -> String {
    format!("{username} has joined the group")
}

/// Notice written when a member leaves or is removed from a group.
pub fn left_notice(username: &str) -> String {
    format!("{username} has left the group")
}
