//! Consent gate.
//!
//! The pairwise connection relation is the single source of truth for
//! "may these two identities communicate". Every read and write goes
//! through [`PairKey`], so `(a, b)` and `(b, a)` always resolve to the
//! same record.

use super::{RequestLimiter, ServiceContext};
use crate::error::{CoordError, CoordResult};
use crate::state::locks::keys;
use crate::state::new_entity_id;
use huddle_proto::{
    Connection, ConnectionStatus, Notification, PairKey, RespondAction, Topic,
};
use std::sync::Arc;
use tracing::info;

pub struct ConsentGate {
    ctx: ServiceContext,
    limiter: Arc<RequestLimiter>,
}

impl ConsentGate {
    pub fn new(ctx: ServiceContext, limiter: Arc<RequestLimiter>) -> Self {
        Self { ctx, limiter }
    }

    /// Ask `peer` for consent.
    ///
    /// Creates a pending connection, or resets a rejected one to pending.
    /// A pending or accepted connection is returned unchanged.
    pub async fn request_connection(&self, actor: &str, peer: &str) -> CoordResult<Connection> {
        if actor == peer {
            return Err(CoordError::SelfRequest);
        }
        self.ctx.identity(peer).await?;
        self.limiter.check(actor)?;

        let pair = PairKey::new(actor, peer);
        let _guard = self.ctx.locks.lock(keys::connection_pair(&pair)).await;
        let now = self.ctx.now();

        let connection = match self.ctx.store.find_connection(&pair).await? {
            None => {
                let connection = Connection {
                    id: new_entity_id(),
                    pair,
                    requested_by: actor.to_string(),
                    status: ConnectionStatus::Pending,
                    created_at: now,
                    updated_at: now,
                };
                self.ctx.store.insert_connection(&connection).await?;
                connection
            }
            Some(mut connection) if connection.status == ConnectionStatus::Rejected => {
                connection.status = ConnectionStatus::Pending;
                connection.requested_by = actor.to_string();
                connection.updated_at = now;
                self.ctx.store.update_connection(&connection).await?;
                connection
            }
            Some(existing) => return Ok(existing),
        };

        info!(from = %actor, to = %peer, connection = %connection.id, "connection requested");
        self.ctx.notifier.publish(
            &Topic::identity(peer),
            Notification::ConnectionRequested {
                connection: connection.clone(),
            },
        );
        Ok(connection)
    }

    /// Accept or reject. A pending request is answered by the peer, never
    /// by the identity that sent it.
    pub async fn respond(
        &self,
        connection_id: &str,
        actor: &str,
        action: &RespondAction,
    ) -> CoordResult<Connection> {
        let status = match action {
            RespondAction::Accept => ConnectionStatus::Accepted,
            RespondAction::Reject => ConnectionStatus::Rejected,
            RespondAction::Other(other) => {
                return Err(CoordError::InvalidState(format!(
                    "unsupported action {other:?}"
                )));
            }
        };

        let existing = self.load(connection_id).await?;
        if !existing.pair.contains(actor) {
            return Err(CoordError::Forbidden(
                "not a participant of this connection".into(),
            ));
        }

        let _guard = self.ctx.locks.lock(keys::connection_pair(&existing.pair)).await;
        let mut connection = self.load(connection_id).await?;
        if connection.status == ConnectionStatus::Pending && connection.requested_by == actor {
            return Err(CoordError::Forbidden(
                "a connection request is answered by its recipient".into(),
            ));
        }
        connection.status = status;
        connection.updated_at = self.ctx.now();
        self.ctx.store.update_connection(&connection).await?;

        info!(connection = %connection.id, by = %actor, status = status.as_str(), "connection updated");
        self.ctx.notifier.publish_all(
            &[
                Topic::identity(connection.pair.low()),
                Topic::identity(connection.pair.high()),
            ],
            Notification::ConnectionUpdated {
                connection: connection.clone(),
            },
        );
        Ok(connection)
    }

    pub async fn status(&self, a: &str, b: &str) -> CoordResult<Option<ConnectionStatus>> {
        Ok(self
            .ctx
            .store
            .find_connection(&PairKey::new(a, b))
            .await?
            .map(|c| c.status))
    }

    pub async fn is_accepted(&self, a: &str, b: &str) -> CoordResult<bool> {
        Ok(self.status(a, b).await? == Some(ConnectionStatus::Accepted))
    }

    pub async fn connection_with(&self, a: &str, b: &str) -> CoordResult<Option<Connection>> {
        Ok(self.ctx.store.find_connection(&PairKey::new(a, b)).await?)
    }

    pub async fn list_connections(&self, identity: &str) -> CoordResult<Vec<Connection>> {
        Ok(self.ctx.store.list_connections(identity).await?)
    }

    async fn load(&self, id: &str) -> CoordResult<Connection> {
        self.ctx
            .store
            .get_connection(id)
            .await?
            .ok_or_else(|| CoordError::not_found("connection", id))
    }
}
