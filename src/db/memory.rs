//! In-memory store.

use super::{DbError, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_proto::{
    CallSession, ChatSession, Connection, Event, Identity, Message, PairKey, Poll, RequestKind,
    RequestStatus, SessionRequest,
};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Tables {
    identities: HashMap<String, Identity>,
    connections: HashMap<String, Connection>,
    requests: HashMap<String, SessionRequest>,
    chats: HashMap<String, ChatSession>,
    messages: HashMap<String, Message>,
    calls: HashMap<String, CallSession>,
    events: HashMap<String, Event>,
    polls: HashMap<String, Poll>,
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    #[cfg(test)]
    failing_inserts: parking_lot::Mutex<std::collections::HashSet<&'static str>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later insert into `table` fail with a backend error.
    #[cfg(test)]
    pub fn fail_inserts_into(&self, table: &'static str) {
        self.failing_inserts.lock().insert(table);
    }

    #[cfg(test)]
    fn check_insert(&self, table: &'static str) -> Result<(), DbError> {
        if self.failing_inserts.lock().contains(table) {
            return Err(DbError::Backend(format!("insert into {table} failed")));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_insert(&self, _table: &'static str) -> Result<(), DbError> {
        Ok(())
    }
}

fn replace<T: Clone>(
    map: &mut HashMap<String, T>,
    id: &str,
    value: &T,
    what: &'static str,
) -> Result<(), DbError> {
    match map.get_mut(id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(DbError::Missing(what)),
    }
}

fn is_open_call(call: &CallSession) -> bool {
    !call.status.is_terminal()
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_identity(&self, identity: &Identity) -> Result<(), DbError> {
        self.tables
            .write()
            .identities
            .insert(identity.id.clone(), identity.clone());
        Ok(())
    }

    async fn get_identity(&self, id: &str) -> Result<Option<Identity>, DbError> {
        Ok(self.tables.read().identities.get(id).cloned())
    }

    async fn insert_connection(&self, connection: &Connection) -> Result<(), DbError> {
        let mut t = self.tables.write();
        if t.connections.values().any(|c| c.pair == connection.pair) {
            return Err(DbError::Duplicate("connection"));
        }
        t.connections
            .insert(connection.id.clone(), connection.clone());
        Ok(())
    }

    async fn update_connection(&self, connection: &Connection) -> Result<(), DbError> {
        replace(
            &mut self.tables.write().connections,
            &connection.id,
            connection,
            "connection",
        )
    }

    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, DbError> {
        Ok(self.tables.read().connections.get(id).cloned())
    }

    async fn find_connection(&self, pair: &PairKey) -> Result<Option<Connection>, DbError> {
        Ok(self
            .tables
            .read()
            .connections
            .values()
            .find(|c| &c.pair == pair)
            .cloned())
    }

    async fn list_connections(&self, identity: &str) -> Result<Vec<Connection>, DbError> {
        let mut out: Vec<Connection> = self
            .tables
            .read()
            .connections
            .values()
            .filter(|c| c.pair.contains(identity))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }

    async fn insert_request(&self, request: &SessionRequest) -> Result<(), DbError> {
        let mut t = self.tables.write();
        let pair = request.pair();
        if request.status == RequestStatus::Pending
            && t.requests.values().any(|r| {
                r.status == RequestStatus::Pending && r.kind == request.kind && r.pair() == pair
            })
        {
            return Err(DbError::Duplicate("pending request"));
        }
        t.requests.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn update_request(&self, request: &SessionRequest) -> Result<(), DbError> {
        replace(
            &mut self.tables.write().requests,
            &request.id,
            request,
            "request",
        )
    }

    async fn get_request(&self, id: &str) -> Result<Option<SessionRequest>, DbError> {
        Ok(self.tables.read().requests.get(id).cloned())
    }

    async fn find_pending_request(
        &self,
        pair: &PairKey,
        kind: RequestKind,
    ) -> Result<Option<SessionRequest>, DbError> {
        Ok(self
            .tables
            .read()
            .requests
            .values()
            .find(|r| r.status == RequestStatus::Pending && r.kind == kind && &r.pair() == pair)
            .cloned())
    }

    async fn has_accepted_request(
        &self,
        pair: &PairKey,
        kind: RequestKind,
    ) -> Result<bool, DbError> {
        Ok(self
            .tables
            .read()
            .requests
            .values()
            .any(|r| r.status == RequestStatus::Accepted && r.kind == kind && &r.pair() == pair))
    }

    async fn list_requests(
        &self,
        identity: &str,
        kind: Option<RequestKind>,
    ) -> Result<Vec<SessionRequest>, DbError> {
        let mut out: Vec<SessionRequest> = self
            .tables
            .read()
            .requests
            .values()
            .filter(|r| r.sender == identity || r.receiver == identity)
            .filter(|r| kind.is_none_or(|k| r.kind == k))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn list_due_requests(&self, now: DateTime<Utc>) -> Result<Vec<SessionRequest>, DbError> {
        Ok(self
            .tables
            .read()
            .requests
            .values()
            .filter(|r| r.is_stale(now))
            .cloned()
            .collect())
    }

    async fn insert_chat(&self, chat: &ChatSession) -> Result<(), DbError> {
        self.check_insert("chat")?;
        let mut t = self.tables.write();
        if t.chats.values().any(|c| c.pair == chat.pair) {
            return Err(DbError::Duplicate("chat"));
        }
        t.chats.insert(chat.id.clone(), chat.clone());
        Ok(())
    }

    async fn update_chat(&self, chat: &ChatSession) -> Result<(), DbError> {
        replace(&mut self.tables.write().chats, &chat.id, chat, "chat")
    }

    async fn get_chat(&self, id: &str) -> Result<Option<ChatSession>, DbError> {
        Ok(self.tables.read().chats.get(id).cloned())
    }

    async fn find_chat(&self, pair: &PairKey) -> Result<Option<ChatSession>, DbError> {
        Ok(self
            .tables
            .read()
            .chats
            .values()
            .find(|c| &c.pair == pair)
            .cloned())
    }

    async fn list_chats(&self, identity: &str) -> Result<Vec<ChatSession>, DbError> {
        let mut out: Vec<ChatSession> = self
            .tables
            .read()
            .chats
            .values()
            .filter(|c| c.is_participant(identity))
            .cloned()
            .collect();
        out.sort_by_key(|c| {
            let active_at = c.last_message.as_ref().map_or(c.created_at, |m| m.at);
            std::cmp::Reverse(active_at)
        });
        Ok(out)
    }

    async fn insert_message(&self, message: &Message) -> Result<(), DbError> {
        self.tables
            .write()
            .messages
            .insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn update_message(&self, message: &Message) -> Result<(), DbError> {
        replace(
            &mut self.tables.write().messages,
            &message.id,
            message,
            "message",
        )
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Message>, DbError> {
        let mut out: Vec<Message> = self
            .tables
            .read()
            .messages
            .values()
            .filter(|m| m.chat_id == chat_id)
            .filter(|m| before.is_none_or(|b| m.created_at < b))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn list_unread(&self, chat_id: &str, reader: &str) -> Result<Vec<Message>, DbError> {
        Ok(self
            .tables
            .read()
            .messages
            .values()
            .filter(|m| m.chat_id == chat_id && m.sender != reader)
            .filter(|m| !m.read_by.contains_key(reader))
            .cloned()
            .collect())
    }

    async fn insert_call(&self, call: &CallSession) -> Result<(), DbError> {
        self.check_insert("call")?;
        let mut t = self.tables.write();
        let pair = call.pair();
        if is_open_call(call) && t.calls.values().any(|c| is_open_call(c) && c.pair() == pair) {
            return Err(DbError::Duplicate("open call"));
        }
        t.calls.insert(call.id.clone(), call.clone());
        Ok(())
    }

    async fn update_call(&self, call: &CallSession) -> Result<(), DbError> {
        replace(&mut self.tables.write().calls, &call.id, call, "call")
    }

    async fn get_call(&self, id: &str) -> Result<Option<CallSession>, DbError> {
        Ok(self.tables.read().calls.get(id).cloned())
    }

    async fn find_open_call(&self, pair: &PairKey) -> Result<Option<CallSession>, DbError> {
        Ok(self
            .tables
            .read()
            .calls
            .values()
            .find(|c| is_open_call(c) && &c.pair() == pair)
            .cloned())
    }

    async fn list_calls(&self, identity: &str, limit: u32) -> Result<Vec<CallSession>, DbError> {
        let mut out: Vec<CallSession> = self
            .tables
            .read()
            .calls
            .values()
            .filter(|c| c.is_participant(identity))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn insert_event(&self, event: &Event) -> Result<(), DbError> {
        self.tables
            .write()
            .events
            .insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn update_event(&self, event: &Event) -> Result<(), DbError> {
        replace(&mut self.tables.write().events, &event.id, event, "event")
    }

    async fn get_event(&self, id: &str) -> Result<Option<Event>, DbError> {
        Ok(self.tables.read().events.get(id).cloned())
    }

    async fn delete_event(&self, id: &str) -> Result<(), DbError> {
        self.tables.write().events.remove(id);
        Ok(())
    }

    async fn list_events(&self) -> Result<Vec<Event>, DbError> {
        let mut out: Vec<Event> = self.tables.read().events.values().cloned().collect();
        out.sort_by(|a, b| {
            a.scheduled_start
                .cmp(&b.scheduled_start)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(out)
    }

    async fn list_events_ending_by(&self, at: DateTime<Utc>) -> Result<Vec<Event>, DbError> {
        Ok(self
            .tables
            .read()
            .events
            .values()
            .filter(|e| !e.is_completed && e.scheduled_end.is_some_and(|end| end <= at))
            .cloned()
            .collect())
    }

    async fn list_events_starting_by(&self, at: DateTime<Utc>) -> Result<Vec<Event>, DbError> {
        Ok(self
            .tables
            .read()
            .events
            .values()
            .filter(|e| {
                !e.is_live && !e.is_completed && e.scheduled_start.is_some_and(|s| s <= at)
            })
            .cloned()
            .collect())
    }

    async fn insert_poll(&self, poll: &Poll) -> Result<(), DbError> {
        self.tables
            .write()
            .polls
            .insert(poll.id.clone(), poll.clone());
        Ok(())
    }

    async fn update_poll(&self, poll: &Poll) -> Result<(), DbError> {
        replace(&mut self.tables.write().polls, &poll.id, poll, "poll")
    }

    async fn get_poll(&self, id: &str) -> Result<Option<Poll>, DbError> {
        Ok(self.tables.read().polls.get(id).cloned())
    }

    async fn delete_poll(&self, id: &str) -> Result<(), DbError> {
        self.tables.write().polls.remove(id);
        Ok(())
    }

    async fn list_polls(&self, event_id: &str) -> Result<Vec<Poll>, DbError> {
        let mut out: Vec<Poll> = self
            .tables
            .read()
            .polls
            .values()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn delete_polls_for_event(&self, event_id: &str) -> Result<u64, DbError> {
        let mut t = self.tables.write();
        let before = t.polls.len();
        t.polls.retain(|_, p| p.event_id != event_id);
        Ok((before - t.polls.len()) as u64)
    }
}
