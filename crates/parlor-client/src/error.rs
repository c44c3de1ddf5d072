use parlor_shared::ModelError;
use parlor_store::StoreError;
use thiserror::Error;

/// Failures of the image upload collaborator.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Empty upload")]
    Empty,

    #[error("Upload too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Upload IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by client operations.
///
/// Every remote failure is caught at the boundary of the action that started
/// it. None of them is retried.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Sign-in or sign-out failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A profile or user lookup failed.
    #[error("Fetch failed: {0}")]
    Fetch(#[source] StoreError),

    /// A message, chat or profile mutation failed.
    #[error("Write failed: {0}")]
    Write(#[source] StoreError),

    /// Image upload failed; the enclosing send was aborted.
    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    /// The configured document store could not be opened.
    #[error("Store unavailable: {0}")]
    Open(#[source] StoreError),

    /// Opening a live query failed.
    #[error("Subscription failed: {0}")]
    Subscribe(#[source] StoreError),

    /// Client-side validation refused the action. No store call was made.
    #[error("{0}")]
    Rejected(String),

    #[error("Malformed document: {0}")]
    Model(#[from] ModelError),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("No active conversation")]
    NoActiveConversation,
}

impl ClientError {
    pub fn rejected(message: impl Into<String>) -> Self {
        ClientError::Rejected(message.into())
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ClientError::Rejected(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
