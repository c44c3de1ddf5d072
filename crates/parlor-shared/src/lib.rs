//! Types shared by every Parlor crate: identifiers, product constants and the
//! typed chat data model parsed from store documents.

pub mod constants;
pub mod error;
pub mod models;
pub mod types;

pub use error::ModelError;
pub use models::*;
pub use types::{ChatId, MessageId, UserId};
