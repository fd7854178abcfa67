//! Session requests, chats and calls.

use super::{misrouted, reply};
use crate::coordinator::Coordinator;
use crate::error::CoordResult;
use huddle_proto::ClientCommand;
use serde_json::{Value, json};

pub(super) async fn handle(coord: &Coordinator, actor: &str, command: ClientCommand) -> CoordResult<Value> {
    let n = &coord.negotiator;
    use ClientCommand as C;
    match command {
        C::CreateSessionRequest {
            receiver,
            kind,
            message,
        } => reply(n.create_request(actor, &receiver, kind, message).await?),
        C::RespondSessionRequest { request_id, action } => {
            reply(n.respond_request(&request_id, actor, &action).await?)
        }
        C::ListSessionRequests { kind } => reply(n.list_requests(actor, kind).await?),

        C::CreateChat { peer } => reply(n.create_chat(actor, &peer).await?),
        C::ListChats => reply(n.list_chats(actor).await?),
        C::GetMessages {
            chat_id,
            before,
            limit,
        } => reply(n.messages(&chat_id, actor, before, limit).await?),
        C::SendMessage {
            chat_id,
            content,
            kind,
        } => reply(n.send_message(&chat_id, actor, content, kind).await?),
        C::MarkRead { chat_id } => {
            let count = n.mark_read(&chat_id, actor).await?;
            reply(json!({ "chat_id": chat_id, "marked": count }))
        }
        C::SetTyping { chat_id, typing } => {
            n.set_typing(&chat_id, actor, typing).await?;
            reply(json!({ "chat_id": chat_id, "typing": typing }))
        }

        C::InitiateCall {
            receiver,
            broadcast,
        } => reply(n.initiate_call(actor, &receiver, broadcast).await?),
        C::AcceptCall { call_id } => reply(n.accept_call(&call_id, actor).await?),
        C::RejectCall { call_id } => reply(n.reject_call(&call_id, actor).await?),
        C::EndCall { call_id } => reply(n.end_call(&call_id, actor).await?),
        C::GetCallHistory { limit } => reply(n.call_history(actor, limit).await?),
        C::GetActiveCallWithPeer { peer } => reply(n.active_call_with(actor, &peer).await?),
        C::JoinLiveStream { call_id } => reply(n.join_live_stream(&call_id, actor).await?),
        C::LeaveLiveStream { call_id } => reply(n.leave_live_stream(&call_id, actor).await?),

        other => Err(misrouted(&other)),
    }
}
