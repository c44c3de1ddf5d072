use thiserror::Error;

/// Errors raised while turning a raw store document into a typed model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Malformed {kind} document {id}: {source}")]
    Malformed {
        kind: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Chat {0} has no members")]
    NoMembers(String),

    #[error("Direct chat {id} must have exactly 2 distinct members, found {found}")]
    DirectMemberCount { id: String, found: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
