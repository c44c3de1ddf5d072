//! # parlor-store
//!
//! The document store the chat client synchronizes against.
//!
//! [`DocumentStore`] is the contract: filtered and ordered live subscriptions
//! that push the full matching set on every change, one-shot reads, inserts and
//! atomic field updates (set, array-union, array-remove, server timestamp).
//! Two backends implement it: [`MemoryStore`] for tests and embedding, and
//! [`SqliteStore`], which keeps documents as JSON rows in a local SQLite file.
//!
//! Every live subscription is a [`Subscription`] handle. Dropping or
//! cancelling the handle unregisters it from the store exactly once.

pub mod backend;
pub mod database;
pub mod document;
pub mod memory;
pub mod migrations;
pub mod query;
pub mod subscription;
pub mod update;

mod documents;
mod error;

pub use backend::DocumentStore;
pub use database::SqliteStore;
pub use document::{Document, Fields, NewDocument, Snapshot};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use query::{Direction, Filter, OrderBy, Query};
pub use subscription::{Subscription, SubscriptionHandle};
pub use update::FieldUpdate;
