//! Authentication, keepalive and topic membership.

use super::{Session, reply};
use crate::clock::Clock;
use crate::coordinator::Coordinator;
use crate::error::{CoordError, CoordResult};
use huddle_proto::Topic;
use serde_json::{Value, json};
use tracing::info;

/// Bind the connection to the identity in `token`.
///
/// The verified identity is mirrored into the store. Re-authenticating as
/// someone else releases the previous identity's presence first.
pub(super) async fn authenticate(
    coord: &Coordinator,
    session: &mut Session,
    token: &str,
) -> CoordResult<Value> {
    let identity = coord.issuer.verify_identity_token(token)?;
    coord.store.upsert_identity(&identity).await?;

    let conn = session.conn;
    if let Some(previous) = session.identity.take()
        && previous.id != identity.id
    {
        coord.hub.unsubscribe(conn, &Topic::identity(&previous.id));
        coord.presence.on_disconnect_cleanup(&previous.id, conn);
    }

    coord.hub.subscribe(conn, Topic::identity(&identity.id));
    coord.hub.subscribe(conn, Topic::Global);
    coord.presence.mark_online(&identity.id, conn);
    info!(conn = %conn, identity = %identity.id, "connection authenticated");

    let body = reply(&identity)?;
    session.identity = Some(identity);
    Ok(body)
}

pub(super) fn ping(coord: &Coordinator) -> CoordResult<Value> {
    Ok(json!({ "pong": coord.clock.now() }))
}

pub(super) async fn subscribe(
    coord: &Coordinator,
    session: &Session,
    topic: Topic,
) -> CoordResult<Value> {
    let me = session.actor()?;
    authorize(coord, &me, &topic).await?;
    coord.hub.subscribe(session.conn, topic.clone());
    reply(json!({ "subscribed": topic }))
}

pub(super) fn unsubscribe(coord: &Coordinator, session: &Session, topic: &Topic) -> CoordResult<Value> {
    coord.hub.unsubscribe(session.conn, topic);
    reply(json!({ "unsubscribed": topic }))
}

/// Who may follow what: chat topics for participants, call topics for
/// participants and live-stream viewers, event topics for anyone signed in,
/// identity topics for their owner only.
async fn authorize(coord: &Coordinator, me: &str, topic: &Topic) -> CoordResult<()> {
    let allowed = match topic {
        Topic::Identity(id) => id == me,
        Topic::Chat(id) => coord.negotiator.can_follow_chat(id, me).await?,
        Topic::Call(id) => coord.negotiator.can_follow_call(id, me).await?,
        Topic::EventHost(id) => {
            coord.broadcast.get_event(id).await?;
            true
        }
        Topic::Global => true,
    };
    if allowed {
        Ok(())
    } else {
        Err(CoordError::Forbidden(format!("may not follow {topic}")))
    }
}
