//! Events, broadcasts, rosters and polls.

use super::{misrouted, reply};
use crate::coordinator::Coordinator;
use crate::error::CoordResult;
use huddle_proto::ClientCommand;
use serde_json::{Value, json};

pub(super) async fn handle(coord: &Coordinator, actor: &str, command: ClientCommand) -> CoordResult<Value> {
    let b = &coord.broadcast;
    use ClientCommand as C;
    match command {
        C::StartBroadcast { event_id } => reply(b.start_broadcast(&event_id, actor).await?),
        C::StopBroadcast { event_id } => reply(b.stop_broadcast(&event_id, actor).await?),
        C::ExtendBroadcast { event_id, minutes } => {
            reply(b.extend_broadcast(&event_id, actor, minutes).await?)
        }
        C::GetRelayToken {
            event_id,
            role,
            session_tag,
        } => reply(
            b.issue_relay_token(&event_id, actor, role, session_tag.as_deref())
                .await?,
        ),

        C::CreateEvent { event } => reply(b.create_event(actor, event).await?),
        C::UpdateEvent { event_id, patch } => reply(b.update_event(&event_id, actor, patch).await?),
        C::DeleteEvent { event_id } => {
            b.delete_event(&event_id, actor).await?;
            reply(json!({ "deleted": event_id }))
        }
        C::JoinEvent { event_id } => reply(b.join_event(&event_id, actor).await?),
        C::ListEvents { filter } => reply(b.list_events(actor, filter).await?),

        C::JoinViewerRoster { event_id } => {
            let viewers = b.join_viewer_roster(&event_id, actor).await?;
            reply(json!({ "event_id": event_id, "count": viewers.len(), "viewers": viewers }))
        }
        C::LeaveViewerRoster { event_id } => {
            let viewers = b.leave_viewer_roster(&event_id, actor).await?;
            reply(json!({ "event_id": event_id, "count": viewers.len(), "viewers": viewers }))
        }
        C::GetRoster { event_id } => {
            let viewers = b.roster(&event_id).await?;
            reply(json!({ "event_id": event_id, "count": viewers.len(), "viewers": viewers }))
        }

        C::CreatePoll {
            event_id,
            question,
            options,
        } => reply(b.create_poll(&event_id, actor, &question, &options).await?),
        C::ListPolls { event_id } => reply(b.list_polls(&event_id).await?),
        C::Vote {
            poll_id,
            option_index,
        } => reply(b.vote(&poll_id, actor, option_index).await?),
        C::ClosePoll { poll_id } => {
            b.close_poll(&poll_id, actor).await?;
            reply(json!({ "closed": poll_id }))
        }

        other => Err(misrouted(&other)),
    }
}
