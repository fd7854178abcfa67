//! SQLite store.
//!
//! Each entity lives in its own table as a JSON document (`body`), beside
//! the handful of columns that queries filter on. Uniqueness rules are
//! enforced by the schema (see `migrations/`), so a lost race surfaces as
//! [`DbError::Duplicate`] rather than a second row.

use super::{DbError, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_proto::{
    CallSession, ChatSession, Connection, Event, Identity, Message, PairKey, Poll, RequestKind,
    SessionRequest,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn encode<T: Serialize>(value: &T) -> Result<String, DbError> {
    Ok(serde_json::to_string(value)?)
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, DbError> {
    Ok(serde_json::from_str(body)?)
}

fn decode_all<T: DeserializeOwned>(bodies: Vec<String>) -> Result<Vec<T>, DbError> {
    bodies.iter().map(|b| decode(b)).collect()
}

fn decode_opt<T: DeserializeOwned>(body: Option<String>) -> Result<Option<T>, DbError> {
    body.as_deref().map(decode).transpose()
}

/// Map a unique-constraint violation to [`DbError::Duplicate`].
fn unique(what: &'static str) -> impl FnOnce(sqlx::Error) -> DbError {
    move |err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => DbError::Duplicate(what),
        _ => DbError::Sqlx(err),
    }
}

fn expect_row(rows: u64, what: &'static str) -> Result<(), DbError> {
    if rows == 0 {
        Err(DbError::Missing(what))
    } else {
        Ok(())
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

impl SqliteStore {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (or create) a database, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            // Uniquely named shared-cache database per store, so parallel
            // tests never see each other's rows.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:huddle-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .foreign_keys(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .foreign_keys(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database connected");

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations checked/applied");

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    async fn body_by_id(&self, table: &'static str, id: &str) -> Result<Option<String>, DbError> {
        let sql = format!("SELECT body FROM {table} WHERE id = ?");
        Ok(sqlx::query_scalar::<_, String>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_identity(&self, identity: &Identity) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO identities (id, body) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(&identity.id)
        .bind(encode(identity)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_identity(&self, id: &str) -> Result<Option<Identity>, DbError> {
        decode_opt(self.body_by_id("identities", id).await?)
    }

    async fn insert_connection(&self, c: &Connection) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO connections (id, pair_key, low_id, high_id, updated_at, body)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&c.id)
        .bind(c.pair.as_key())
        .bind(c.pair.low())
        .bind(c.pair.high())
        .bind(millis(c.updated_at))
        .bind(encode(c)?)
        .execute(&self.pool)
        .await
        .map_err(unique("connection"))?;
        Ok(())
    }

    async fn update_connection(&self, c: &Connection) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE connections SET updated_at = ?, body = ? WHERE id = ?")
            .bind(millis(c.updated_at))
            .bind(encode(c)?)
            .bind(&c.id)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), "connection")
    }

    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, DbError> {
        decode_opt(self.body_by_id("connections", id).await?)
    }

    async fn find_connection(&self, pair: &PairKey) -> Result<Option<Connection>, DbError> {
        let body = sqlx::query_scalar::<_, String>("SELECT body FROM connections WHERE pair_key = ?")
            .bind(pair.as_key())
            .fetch_optional(&self.pool)
            .await?;
        decode_opt(body)
    }

    async fn list_connections(&self, identity: &str) -> Result<Vec<Connection>, DbError> {
        let bodies = sqlx::query_scalar::<_, String>(
            r#"
            SELECT body FROM connections
            WHERE low_id = ? OR high_id = ?
            ORDER BY updated_at DESC
            "#,
        )
        .bind(identity)
        .bind(identity)
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn insert_request(&self, r: &SessionRequest) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO session_requests
                (id, pair_key, kind, sender, receiver, status, created_at, expires_at, body)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&r.id)
        .bind(r.pair().as_key())
        .bind(r.kind.as_str())
        .bind(&r.sender)
        .bind(&r.receiver)
        .bind(r.status.as_str())
        .bind(millis(r.created_at))
        .bind(millis(r.expires_at))
        .bind(encode(r)?)
        .execute(&self.pool)
        .await
        .map_err(unique("pending request"))?;
        Ok(())
    }

    async fn update_request(&self, r: &SessionRequest) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE session_requests SET status = ?, expires_at = ?, body = ? WHERE id = ?",
        )
        .bind(r.status.as_str())
        .bind(millis(r.expires_at))
        .bind(encode(r)?)
        .bind(&r.id)
        .execute(&self.pool)
        .await
        .map_err(unique("pending request"))?;
        expect_row(result.rows_affected(), "request")
    }

    async fn get_request(&self, id: &str) -> Result<Option<SessionRequest>, DbError> {
        decode_opt(self.body_by_id("session_requests", id).await?)
    }

    async fn find_pending_request(
        &self,
        pair: &PairKey,
        kind: RequestKind,
    ) -> Result<Option<SessionRequest>, DbError> {
        let body = sqlx::query_scalar::<_, String>(
            r#"
            SELECT body FROM session_requests
            WHERE pair_key = ? AND kind = ? AND status = 'pending'
            "#,
        )
        .bind(pair.as_key())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        decode_opt(body)
    }

    async fn has_accepted_request(
        &self,
        pair: &PairKey,
        kind: RequestKind,
    ) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM session_requests
            WHERE pair_key = ? AND kind = ? AND status = 'accepted'
            "#,
        )
        .bind(pair.as_key())
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn list_requests(
        &self,
        identity: &str,
        kind: Option<RequestKind>,
    ) -> Result<Vec<SessionRequest>, DbError> {
        let bodies = sqlx::query_scalar::<_, String>(
            r#"
            SELECT body FROM session_requests
            WHERE (sender = ? OR receiver = ?) AND (? IS NULL OR kind = ?)
            ORDER BY created_at DESC
            "#,
        )
        .bind(identity)
        .bind(identity)
        .bind(kind.map(|k| k.as_str()))
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn list_due_requests(&self, now: DateTime<Utc>) -> Result<Vec<SessionRequest>, DbError> {
        let bodies = sqlx::query_scalar::<_, String>(
            "SELECT body FROM session_requests WHERE status = 'pending' AND expires_at <= ?",
        )
        .bind(millis(now))
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn insert_chat(&self, chat: &ChatSession) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO chats (id, pair_key, low_id, high_id, active_at, body)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chat.id)
        .bind(chat.pair.as_key())
        .bind(chat.pair.low())
        .bind(chat.pair.high())
        .bind(millis(chat.created_at))
        .bind(encode(chat)?)
        .execute(&self.pool)
        .await
        .map_err(unique("chat"))?;
        Ok(())
    }

    async fn update_chat(&self, chat: &ChatSession) -> Result<(), DbError> {
        let active_at = chat.last_message.as_ref().map_or(chat.created_at, |m| m.at);
        let result = sqlx::query("UPDATE chats SET active_at = ?, body = ? WHERE id = ?")
            .bind(millis(active_at))
            .bind(encode(chat)?)
            .bind(&chat.id)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), "chat")
    }

    async fn get_chat(&self, id: &str) -> Result<Option<ChatSession>, DbError> {
        decode_opt(self.body_by_id("chats", id).await?)
    }

    async fn find_chat(&self, pair: &PairKey) -> Result<Option<ChatSession>, DbError> {
        let body = sqlx::query_scalar::<_, String>("SELECT body FROM chats WHERE pair_key = ?")
            .bind(pair.as_key())
            .fetch_optional(&self.pool)
            .await?;
        decode_opt(body)
    }

    async fn list_chats(&self, identity: &str) -> Result<Vec<ChatSession>, DbError> {
        let bodies = sqlx::query_scalar::<_, String>(
            r#"
            SELECT body FROM chats
            WHERE low_id = ? OR high_id = ?
            ORDER BY active_at DESC
            "#,
        )
        .bind(identity)
        .bind(identity)
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn insert_message(&self, m: &Message) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO messages (id, chat_id, sender, created_at, body) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&m.id)
        .bind(&m.chat_id)
        .bind(&m.sender)
        .bind(millis(m.created_at))
        .bind(encode(m)?)
        .execute(&self.pool)
        .await
        .map_err(unique("message"))?;
        Ok(())
    }

    async fn update_message(&self, m: &Message) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE messages SET body = ? WHERE id = ?")
            .bind(encode(m)?)
            .bind(&m.id)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), "message")
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Message>, DbError> {
        let bodies = sqlx::query_scalar::<_, String>(
            r#"
            SELECT body FROM messages
            WHERE chat_id = ? AND (? IS NULL OR created_at < ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(chat_id)
        .bind(before.map(millis))
        .bind(before.map(millis))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn list_unread(&self, chat_id: &str, reader: &str) -> Result<Vec<Message>, DbError> {
        let bodies = sqlx::query_scalar::<_, String>(
            "SELECT body FROM messages WHERE chat_id = ? AND sender != ? ORDER BY created_at",
        )
        .bind(chat_id)
        .bind(reader)
        .fetch_all(&self.pool)
        .await?;
        let messages: Vec<Message> = decode_all(bodies)?;
        Ok(messages
            .into_iter()
            .filter(|m| !m.read_by.contains_key(reader))
            .collect())
    }

    async fn insert_call(&self, call: &CallSession) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO calls (id, pair_key, caller, receiver, status, created_at, body)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&call.id)
        .bind(call.pair().as_key())
        .bind(&call.caller)
        .bind(&call.receiver)
        .bind(call.status.as_str())
        .bind(millis(call.created_at))
        .bind(encode(call)?)
        .execute(&self.pool)
        .await
        .map_err(unique("open call"))?;
        Ok(())
    }

    async fn update_call(&self, call: &CallSession) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE calls SET status = ?, body = ? WHERE id = ?")
            .bind(call.status.as_str())
            .bind(encode(call)?)
            .bind(&call.id)
            .execute(&self.pool)
            .await
            .map_err(unique("open call"))?;
        expect_row(result.rows_affected(), "call")
    }

    async fn get_call(&self, id: &str) -> Result<Option<CallSession>, DbError> {
        decode_opt(self.body_by_id("calls", id).await?)
    }

    async fn find_open_call(&self, pair: &PairKey) -> Result<Option<CallSession>, DbError> {
        let body = sqlx::query_scalar::<_, String>(
            "SELECT body FROM calls WHERE pair_key = ? AND status IN ('pending', 'accepted')",
        )
        .bind(pair.as_key())
        .fetch_optional(&self.pool)
        .await?;
        decode_opt(body)
    }

    async fn list_calls(&self, identity: &str, limit: u32) -> Result<Vec<CallSession>, DbError> {
        let bodies = sqlx::query_scalar::<_, String>(
            r#"
            SELECT body FROM calls
            WHERE caller = ? OR receiver = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(identity)
        .bind(identity)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn insert_event(&self, e: &Event) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO events
                (id, host_id, is_live, is_completed, scheduled_start, scheduled_end, created_at, body)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&e.id)
        .bind(&e.host_id)
        .bind(e.is_live)
        .bind(e.is_completed)
        .bind(e.scheduled_start.map(millis))
        .bind(e.scheduled_end.map(millis))
        .bind(millis(e.created_at))
        .bind(encode(e)?)
        .execute(&self.pool)
        .await
        .map_err(unique("event"))?;
        Ok(())
    }

    async fn update_event(&self, e: &Event) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET is_live = ?, is_completed = ?, scheduled_start = ?, scheduled_end = ?, body = ?
            WHERE id = ?
            "#,
        )
        .bind(e.is_live)
        .bind(e.is_completed)
        .bind(e.scheduled_start.map(millis))
        .bind(e.scheduled_end.map(millis))
        .bind(encode(e)?)
        .bind(&e.id)
        .execute(&self.pool)
        .await?;
        expect_row(result.rows_affected(), "event")
    }

    async fn get_event(&self, id: &str) -> Result<Option<Event>, DbError> {
        decode_opt(self.body_by_id("events", id).await?)
    }

    async fn delete_event(&self, id: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_events(&self) -> Result<Vec<Event>, DbError> {
        let bodies = sqlx::query_scalar::<_, String>(
            "SELECT body FROM events ORDER BY scheduled_start IS NOT NULL, scheduled_start, created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn list_events_ending_by(&self, at: DateTime<Utc>) -> Result<Vec<Event>, DbError> {
        let bodies = sqlx::query_scalar::<_, String>(
            r#"
            SELECT body FROM events
            WHERE is_completed = 0 AND scheduled_end IS NOT NULL AND scheduled_end <= ?
            "#,
        )
        .bind(millis(at))
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn list_events_starting_by(&self, at: DateTime<Utc>) -> Result<Vec<Event>, DbError> {
        let bodies = sqlx::query_scalar::<_, String>(
            r#"
            SELECT body FROM events
            WHERE is_live = 0 AND is_completed = 0
              AND scheduled_start IS NOT NULL AND scheduled_start <= ?
            "#,
        )
        .bind(millis(at))
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn insert_poll(&self, p: &Poll) -> Result<(), DbError> {
        sqlx::query("INSERT INTO polls (id, event_id, created_at, body) VALUES (?, ?, ?, ?)")
            .bind(&p.id)
            .bind(&p.event_id)
            .bind(millis(p.created_at))
            .bind(encode(p)?)
            .execute(&self.pool)
            .await
            .map_err(unique("poll"))?;
        Ok(())
    }

    async fn update_poll(&self, p: &Poll) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE polls SET body = ? WHERE id = ?")
            .bind(encode(p)?)
            .bind(&p.id)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), "poll")
    }

    async fn get_poll(&self, id: &str) -> Result<Option<Poll>, DbError> {
        decode_opt(self.body_by_id("polls", id).await?)
    }

    async fn delete_poll(&self, id: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM polls WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_polls(&self, event_id: &str) -> Result<Vec<Poll>, DbError> {
        let bodies = sqlx::query_scalar::<_, String>(
            "SELECT body FROM polls WHERE event_id = ? ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn delete_polls_for_event(&self, event_id: &str) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM polls WHERE event_id = ?")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
