//! Persistent store adapter.
//!
//! The coordinator reads and writes durable entities through [`Store`]:
//! point lookups by id, compound lookups by canonical pair, and bounded
//! scans used by the reconciliation sweeps. No operation spans more than one
//! entity. Two backends:
//! - [`MemoryStore`]: process-local maps, used by tests and when no
//!   database is configured
//! - [`SqliteStore`]: SQLite via SQLx, entities kept as JSON documents
//!   beside the indexed columns their queries filter on
//!
//! Both enforce the same uniqueness rules (one connection and one chat per
//! pair, one pending request per pair and kind, one open call per pair) and
//! report violations as [`DbError::Duplicate`].

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_proto::{
    CallSession, ChatSession, Connection, Event, Identity, Message, PairKey, Poll, RequestKind,
    SessionRequest,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("stored document is corrupt: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("{0} already exists")]
    Duplicate(&'static str),
    #[error("{0} not found")]
    Missing(&'static str),
    #[error("backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    // Identities
    async fn upsert_identity(&self, identity: &Identity) -> Result<(), DbError>;
    async fn get_identity(&self, id: &str) -> Result<Option<Identity>, DbError>;

    // Connections
    async fn insert_connection(&self, connection: &Connection) -> Result<(), DbError>;
    async fn update_connection(&self, connection: &Connection) -> Result<(), DbError>;
    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, DbError>;
    async fn find_connection(&self, pair: &PairKey) -> Result<Option<Connection>, DbError>;
    async fn list_connections(&self, identity: &str) -> Result<Vec<Connection>, DbError>;

    // Session requests
    async fn insert_request(&self, request: &SessionRequest) -> Result<(), DbError>;
    async fn update_request(&self, request: &SessionRequest) -> Result<(), DbError>;
    async fn get_request(&self, id: &str) -> Result<Option<SessionRequest>, DbError>;
    /// The pending request of `kind` between the pair, stale or not.
    async fn find_pending_request(
        &self,
        pair: &PairKey,
        kind: RequestKind,
    ) -> Result<Option<SessionRequest>, DbError>;
    async fn has_accepted_request(&self, pair: &PairKey, kind: RequestKind)
    -> Result<bool, DbError>;
    /// Incoming and outgoing requests, newest first.
    async fn list_requests(
        &self,
        identity: &str,
        kind: Option<RequestKind>,
    ) -> Result<Vec<SessionRequest>, DbError>;
    /// Pending requests with `expires_at <= now`.
    async fn list_due_requests(&self, now: DateTime<Utc>) -> Result<Vec<SessionRequest>, DbError>;

    // Chats and messages
    async fn insert_chat(&self, chat: &ChatSession) -> Result<(), DbError>;
    async fn update_chat(&self, chat: &ChatSession) -> Result<(), DbError>;
    async fn get_chat(&self, id: &str) -> Result<Option<ChatSession>, DbError>;
    async fn find_chat(&self, pair: &PairKey) -> Result<Option<ChatSession>, DbError>;
    async fn list_chats(&self, identity: &str) -> Result<Vec<ChatSession>, DbError>;
    async fn insert_message(&self, message: &Message) -> Result<(), DbError>;
    async fn update_message(&self, message: &Message) -> Result<(), DbError>;
    /// Newest first, strictly older than `before` when given.
    async fn list_messages(
        &self,
        chat_id: &str,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Message>, DbError>;
    /// Messages from the other participant that `reader` has not marked read.
    async fn list_unread(&self, chat_id: &str, reader: &str) -> Result<Vec<Message>, DbError>;

    // Calls
    async fn insert_call(&self, call: &CallSession) -> Result<(), DbError>;
    async fn update_call(&self, call: &CallSession) -> Result<(), DbError>;
    async fn get_call(&self, id: &str) -> Result<Option<CallSession>, DbError>;
    /// The pending or accepted call between the pair.
    async fn find_open_call(&self, pair: &PairKey) -> Result<Option<CallSession>, DbError>;
    /// Newest first.
    async fn list_calls(&self, identity: &str, limit: u32) -> Result<Vec<CallSession>, DbError>;

    // Events
    async fn insert_event(&self, event: &Event) -> Result<(), DbError>;
    async fn update_event(&self, event: &Event) -> Result<(), DbError>;
    async fn get_event(&self, id: &str) -> Result<Option<Event>, DbError>;
    async fn delete_event(&self, id: &str) -> Result<(), DbError>;
    async fn list_events(&self) -> Result<Vec<Event>, DbError>;
    /// Not completed, with `scheduled_end <= at`.
    async fn list_events_ending_by(&self, at: DateTime<Utc>) -> Result<Vec<Event>, DbError>;
    /// Not live, not completed, with `scheduled_start <= at`.
    async fn list_events_starting_by(&self, at: DateTime<Utc>) -> Result<Vec<Event>, DbError>;

    // Polls
    async fn insert_poll(&self, poll: &Poll) -> Result<(), DbError>;
    async fn update_poll(&self, poll: &Poll) -> Result<(), DbError>;
    async fn get_poll(&self, id: &str) -> Result<Option<Poll>, DbError>;
    async fn delete_poll(&self, id: &str) -> Result<(), DbError>;
    async fn list_polls(&self, event_id: &str) -> Result<Vec<Poll>, DbError>;
    async fn delete_polls_for_event(&self, event_id: &str) -> Result<u64, DbError>;
}

/// Open the store named by the configuration: SQLite when a path is given,
/// otherwise the in-memory store.
pub async fn open_store(path: Option<&str>) -> Result<Arc<dyn Store>, DbError> {
    match path {
        Some(path) => Ok(Arc::new(SqliteStore::new(path).await?)),
        None => {
            info!("No database configured, using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
