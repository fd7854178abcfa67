//! # huddle-proto
//!
//! Data model and wire types shared by the huddle coordinator and its clients.
//!
//! - [`model`]: durable entities (connections, session requests, chats, calls,
//!   events, polls) and the canonical [`PairKey`].
//! - [`channel`]: relay channel-name rules.
//! - [`topic`]: fan-out topics.
//! - [`notification`]: the closed set of server-pushed notifications.
//! - [`command`]: client command frames.
//! - [`frame`]: server frames (replies, errors, notifications).
//!
//! Everything here is plain data and pure functions. The coordinator crate
//! owns all I/O.

#![deny(clippy::all)]

pub mod channel;
pub mod command;
pub mod frame;
pub mod model;
pub mod notification;
pub mod topic;

pub use channel::{
    ChannelNameError, call_channel, is_valid_channel_name, sanitize_channel_name,
    validate_channel_name,
};
pub use command::{ClientCommand, ClientFrame, EventFilter, RelayRequestRole, RespondAction};
pub use frame::{ErrorFrame, ErrorKind, EventFrame, ServerFrame};
pub use model::{
    CallSession, CallStatus, ChatSession, Connection, ConnectionStatus, Event, EventCategory,
    EventDraft, EventPatch, Identity, IdentityKind, Message, MessageKind, MessagePreview, PairKey,
    Poll, PollOption, PollView, RequestKind, RequestStatus, SessionRequest, ViewerEntry,
};
pub use notification::Notification;
pub use topic::Topic;
