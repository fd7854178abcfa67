//! The coordinator: owns and wires every component.
//!
//! There is exactly one per process. The gateway and the handlers reach
//! every component through it; tests build one over in-memory ports.

use crate::auth::CredentialIssuer;
use crate::clock::Clock;
use crate::config::Config;
use crate::db::Store;
use crate::mail::Mailer;
use crate::metrics;
use crate::notify::{Hub, Outbound};
use crate::services::{
    BroadcastCoordinator, ConsentGate, Reconciler, RequestLimiter, ServiceContext,
    SessionNegotiator,
};
use crate::state::{ConnId, ConnIdGenerator, KeyedLocks, PresenceTracker};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Injectable parts of a [`Coordinator`].
pub struct CoordinatorParams {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub issuer: Arc<dyn CredentialIssuer>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
}

pub struct Coordinator {
    pub hub: Arc<Hub>,
    pub presence: Arc<PresenceTracker>,
    pub consent: Arc<ConsentGate>,
    pub negotiator: Arc<SessionNegotiator>,
    pub broadcast: Arc<BroadcastCoordinator>,
    pub reconciler: Arc<Reconciler>,
    pub issuer: Arc<dyn CredentialIssuer>,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
    conn_ids: ConnIdGenerator,
}

impl Coordinator {
    pub fn new(params: CoordinatorParams) -> Self {
        let CoordinatorParams {
            config,
            store,
            issuer,
            mailer,
            clock,
        } = params;

        let hub = Arc::new(Hub::new());
        let ctx = ServiceContext {
            store: Arc::clone(&store),
            notifier: hub.clone(),
            clock: Arc::clone(&clock),
            locks: Arc::new(KeyedLocks::new()),
        };
        let relay_ttl = config.auth.relay_token_ttl_secs;

        let limiter = Arc::new(RequestLimiter::new(config.limits.requests_per_minute));
        let presence = Arc::new(PresenceTracker::new(hub.clone()));
        let consent = Arc::new(ConsentGate::new(ctx.clone(), Arc::clone(&limiter)));
        let negotiator = Arc::new(SessionNegotiator::new(
            ctx.clone(),
            Arc::clone(&consent),
            Arc::clone(&limiter),
            Arc::clone(&issuer),
            config.sessions.clone(),
            relay_ttl,
        ));
        let broadcast = Arc::new(BroadcastCoordinator::new(
            ctx.clone(),
            Arc::clone(&presence),
            Arc::clone(&issuer),
            mailer,
            config.broadcast.clone(),
            relay_ttl,
        ));
        let reconciler = Arc::new(Reconciler::new(
            ctx,
            Arc::clone(&broadcast),
            Arc::clone(&negotiator),
            limiter,
            config.broadcast.clone(),
        ));

        Self {
            hub,
            presence,
            consent,
            negotiator,
            broadcast,
            reconciler,
            issuer,
            store,
            clock,
            config,
            conn_ids: ConnIdGenerator::new(),
        }
    }

    /// Allocate an id for a new connection and register its outbound
    /// queue with the hub.
    pub fn open_connection(&self, sender: mpsc::Sender<Outbound>) -> ConnId {
        let conn = self.conn_ids.next();
        self.hub.register(conn, sender);
        metrics::set_connections(self.hub.connection_count());
        debug!(conn = %conn, "connection registered");
        conn
    }

    /// Tear down a connection: drop its subscriptions and, if it was bound,
    /// its presence and roster entries.
    pub fn close_connection(&self, conn: ConnId, identity: Option<&str>) {
        self.hub.unregister(conn);
        if let Some(identity) = identity {
            self.presence.on_disconnect_cleanup(identity, conn);
        }
        metrics::set_connections(self.hub.connection_count());
        debug!(conn = %conn, "connection released");
    }
}
