//! Durable entities owned by the coordinator.
//!
//! Identity ids are opaque strings issued by the external auth subsystem;
//! every other entity id is generated by the coordinator.

mod call;
mod chat;
mod connection;
mod event;
mod identity;
mod pair;
mod poll;
mod request;

pub use call::{CallSession, CallStatus};
pub use chat::{ChatSession, Message, MessageKind, MessagePreview};
pub use connection::{Connection, ConnectionStatus};
pub use event::{Event, EventCategory, EventDraft, EventPatch, ViewerEntry};
pub use identity::{Identity, IdentityKind};
pub use pair::PairKey;
pub use poll::{Poll, PollOption, PollView};
pub use request::{RequestKind, RequestStatus, SessionRequest};
