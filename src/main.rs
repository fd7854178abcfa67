//! huddled - the huddle coordination daemon.

use huddle::auth::HmacIssuer;
use huddle::clock::{Clock, SystemClock};
use huddle::config::{self, Config, MailBackend};
use huddle::db::open_store;
use huddle::mail::{LogMailer, Mailer, WebhookMailer};
use huddle::network::Gateway;
use huddle::services::spawn_reconcile_task;
use huddle::{Coordinator, CoordinatorParams, http, metrics};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "huddle.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!(
            "refusing to start with {} configuration error(s), see above",
            errors.len()
        );
    }

    info!(server = %config.server.name, listen = %config.listen.address, "Starting huddled");

    metrics::init();

    let store = open_store(config.database.as_ref().map(|d| d.path.as_str())).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let issuer = Arc::new(HmacIssuer::new(
        &config.auth.identity_secret,
        &config.auth.relay_secret,
        config.auth.relay_app_id.clone(),
        Arc::clone(&clock),
    ));
    let mailer: Arc<dyn Mailer> = match (config.mail.backend, config.mail.webhook_url.as_deref()) {
        (MailBackend::Webhook, Some(url)) => {
            info!(url = %url, "Delivering notifications by webhook");
            Arc::new(WebhookMailer::new(url))
        }
        _ => Arc::new(LogMailer),
    };

    let listen = config.listen.address;
    let metrics_port = config.server.metrics_port;
    let reconcile_interval = config.reconcile.interval_secs;

    let coord = Arc::new(Coordinator::new(CoordinatorParams {
        config,
        store,
        issuer,
        mailer,
        clock,
    }));

    spawn_reconcile_task(Arc::clone(&coord.reconciler), reconcile_interval);
    info!(interval_secs = reconcile_interval, "Reconciliation scheduler started");

    if metrics_port != 0 {
        tokio::spawn(http::run_http_server(metrics_port));
    }

    let gateway = Gateway::bind(listen, coord).await?;
    gateway.run().await
}
