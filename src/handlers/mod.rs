//! Client command handlers.
//!
//! [`dispatch`] routes one [`ClientCommand`] to the component that owns it
//! and returns the reply payload. Every command runs inside a debug span,
//! is timed, and counts its failures by error code.
//!
//! Handlers are grouped by component:
//! - [`session`]: authenticate, ping, subscribe/unsubscribe
//! - [`consent`]: connection requests
//! - [`negotiation`]: session requests, chats, calls
//! - [`broadcast`]: events, relay tokens, rosters, polls

mod broadcast;
mod consent;
mod negotiation;
mod session;

use crate::coordinator::Coordinator;
use crate::error::{CoordError, CoordResult};
use crate::metrics;
use crate::state::ConnId;
use crate::telemetry::{CommandTimer, spans};
use huddle_proto::{ClientCommand, ClientFrame, Identity, ServerFrame};
use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, debug, error};

/// Per-connection handler state.
#[derive(Debug)]
pub struct Session {
    pub conn: ConnId,
    /// Bound identity, set by a successful authentication.
    pub identity: Option<Identity>,
}

impl Session {
    pub fn new(conn: ConnId) -> Self {
        Self {
            conn,
            identity: None,
        }
    }

    pub fn identity_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    fn actor(&self) -> CoordResult<String> {
        self.identity_id()
            .map(str::to_string)
            .ok_or_else(|| CoordError::InvalidCredential("authenticate first".into()))
    }
}

/// Run one command on behalf of `session`.
pub async fn dispatch(
    coord: &Coordinator,
    session: &mut Session,
    command: ClientCommand,
) -> CoordResult<Value> {
    let name = command.name();
    let span = spans::command(name, session.conn, session.identity_id());
    let _timer = CommandTimer::new(name);

    let result = route(coord, session, command).instrument(span).await;
    if let Err(e) = &result {
        metrics::record_command_error(name, e.error_code());
        debug!(command = name, conn = %session.conn, error = %e, "command failed");
    }
    result
}

/// Answer a client frame with a reply or an error frame.
pub async fn handle_frame(coord: &Coordinator, session: &mut Session, frame: ClientFrame) -> ServerFrame {
    let id = frame.id;
    match dispatch(coord, session, frame.command).await {
        Ok(data) => ServerFrame::reply(id, data),
        Err(e) => e.to_frame(id),
    }
}

async fn route(coord: &Coordinator, session: &mut Session, command: ClientCommand) -> CoordResult<Value> {
    if !command.allowed_before_auth() && !session.is_authenticated() {
        return Err(CoordError::InvalidCredential("authenticate first".into()));
    }

    use ClientCommand as C;
    match command {
        C::Authenticate { token } => session::authenticate(coord, session, &token).await,
        C::Ping => session::ping(coord),
        C::Subscribe { topic } => session::subscribe(coord, session, topic).await,
        C::Unsubscribe { topic } => session::unsubscribe(coord, session, &topic),
        C::GetAnonymousRelayToken {
            event_id,
            session_tag,
        } => reply(
            coord
                .broadcast
                .issue_anonymous_token(&event_id, session_tag.as_deref())
                .await?,
        ),
        command => {
            let actor = session.actor()?;
            match command {
                C::RequestConnection { .. }
                | C::RespondConnection { .. }
                | C::GetConnectionStatus { .. }
                | C::ListConnections => consent::handle(coord, &actor, command).await,

                C::CreateSessionRequest { .. }
                | C::RespondSessionRequest { .. }
                | C::ListSessionRequests { .. }
                | C::CreateChat { .. }
                | C::ListChats
                | C::GetMessages { .. }
                | C::SendMessage { .. }
                | C::MarkRead { .. }
                | C::SetTyping { .. }
                | C::InitiateCall { .. }
                | C::AcceptCall { .. }
                | C::RejectCall { .. }
                | C::EndCall { .. }
                | C::GetCallHistory { .. }
                | C::GetActiveCallWithPeer { .. }
                | C::JoinLiveStream { .. }
                | C::LeaveLiveStream { .. } => negotiation::handle(coord, &actor, command).await,

                command => broadcast::handle(coord, &actor, command).await,
            }
        }
    }
}

/// Serialize a reply payload.
fn reply<T: Serialize>(value: T) -> CoordResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        error!(error = %e, "failed to encode reply");
        CoordError::Internal
    })
}

/// A command routed to a handler group that does not own it.
fn misrouted(command: &ClientCommand) -> CoordError {
    error!(command = command.name(), "command reached the wrong handler group");
    CoordError::Internal
}
