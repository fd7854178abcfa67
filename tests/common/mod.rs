//! Integration test common infrastructure.
//!
//! Builds an in-process coordinator over the memory store and a manual
//! clock, and provides clients that drive it through the command handlers
//! exactly as the WebSocket connection task does.

pub mod client;

#[allow(unused_imports)]
pub use client::TestClient;

use chrono::{TimeZone, Utc};
use huddle::auth::HmacIssuer;
use huddle::clock::ManualClock;
use huddle::config::Config;
use huddle::db::MemoryStore;
use huddle::mail::RecordingMailer;
use huddle::{Coordinator, CoordinatorParams};
use huddle_proto::{Identity, IdentityKind};
use std::sync::Arc;

pub const IDENTITY_SECRET: &str = "integration-identity-secret";
pub const RELAY_SECRET: &str = "integration-relay-secret!";
pub const APP_ID: &str = "app-integration";

/// A coordinator plus handles on its test doubles.
#[allow(dead_code)]
pub struct TestServer {
    pub coord: Arc<Coordinator>,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<RecordingMailer>,
    pub issuer: Arc<HmacIssuer>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0)
                .single()
                .expect("valid start time"),
        ));
        let issuer = Arc::new(HmacIssuer::new(
            IDENTITY_SECRET,
            RELAY_SECRET,
            APP_ID,
            clock.clone(),
        ));
        let mailer = Arc::new(RecordingMailer::default());
        let coord = Arc::new(Coordinator::new(CoordinatorParams {
            config,
            store: Arc::new(MemoryStore::new()),
            issuer: issuer.clone(),
            mailer: mailer.clone(),
            clock: clock.clone(),
        }));
        Self {
            coord,
            clock,
            mailer,
            issuer,
        }
    }

    /// Identity token for `id`, valid for an hour of manual-clock time.
    pub fn token(&self, id: &str, kind: IdentityKind) -> String {
        let identity = Identity {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            kind,
            email: Some(format!("{id}@example.org")),
        };
        self.issuer
            .mint_identity_token(&identity, 3600)
            .expect("mint identity token")
    }

    /// Open a connection and authenticate it as an individual.
    pub async fn individual(&self, id: &str) -> TestClient {
        self.signed_in(id, IdentityKind::Individual).await
    }

    /// Open a connection and authenticate it as an institution.
    pub async fn institution(&self, id: &str) -> TestClient {
        self.signed_in(id, IdentityKind::Institutional).await
    }

    pub async fn signed_in(&self, id: &str, kind: IdentityKind) -> TestClient {
        let mut client = TestClient::open(Arc::clone(&self.coord));
        client
            .authenticate(&self.token(id, kind))
            .await
            .expect("authenticate");
        client.drain();
        client
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.identity_secret = IDENTITY_SECRET.into();
    config.auth.relay_secret = RELAY_SECRET.into();
    config.auth.relay_app_id = APP_ID.into();
    config.limits.requests_per_minute = 1000;
    config
}
