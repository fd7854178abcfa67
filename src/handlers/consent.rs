use super::{misrouted, reply};
use crate::coordinator::Coordinator;
use crate::error::CoordResult;
use huddle_proto::ClientCommand;
use serde_json::{Value, json};

pub(super) async fn handle(coord: &Coordinator, actor: &str, command: ClientCommand) -> CoordResult<Value> {
    let consent = &coord.consent;
    match command {
        ClientCommand::RequestConnection { peer } => {
            reply(consent.request_connection(actor, &peer).await?)
        }
        ClientCommand::RespondConnection {
            connection_id,
            action,
        } => reply(consent.respond(&connection_id, actor, &action).await?),
        ClientCommand::GetConnectionStatus { peer } => {
            let connection = consent.connection_with(actor, &peer).await?;
            reply(json!({
                "peer": peer,
                "status": connection.as_ref().map(|c| c.status.as_str()),
                "connection": connection,
            }))
        }
        ClientCommand::ListConnections => reply(consent.list_connections(actor).await?),
        other => Err(misrouted(&other)),
    }
}
