//! Gateway - WebSocket listener that accepts incoming connections.
//!
//! The Gateway binds the listener, performs the WebSocket upgrade (with an
//! `Origin` allow-list and an optional `?token=` handshake credential) and
//! spawns a [`Connection`] task per client.

use crate::coordinator::Coordinator;
use crate::network::Connection;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{error, info, instrument, warn};

/// The Gateway accepts incoming WebSocket connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    coord: Arc<Coordinator>,
}

impl Gateway {
    /// Bind the gateway to `addr`.
    pub async fn bind(addr: SocketAddr, coord: Arc<Coordinator>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "WebSocket listener bound");
        Ok(Self { listener, coord })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let coord = Arc::clone(&self.coord);
                    tokio::spawn(async move {
                        upgrade(stream, addr, coord).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept WebSocket connection");
                }
            }
        }
    }
}

/// Perform the WebSocket handshake and hand the socket to a connection task.
async fn upgrade(stream: TcpStream, addr: SocketAddr, coord: Arc<Coordinator>) {
    let allowed = coord.config.listen.allow_origins.clone();
    let mut token: Option<String> = None;

    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        token = token_from_query(req.uri().query());

        if allowed.is_empty() {
            return Ok(response);
        }
        let origin = req.headers().get("Origin").and_then(|o| o.to_str().ok());
        if let Some(origin) = origin
            && allowed.iter().any(|a| a == origin || a == "*")
        {
            return Ok(response);
        }
        warn!(%addr, origin = ?origin, "WebSocket origin rejected");
        let mut rejection = ErrorResponse::new(Some("origin not allowed".to_string()));
        *rejection.status_mut() = StatusCode::FORBIDDEN;
        Err(rejection)
    };

    let handshake = accept_hdr_async(stream, callback).await;
    match handshake {
        Ok(ws) => {
            info!(%addr, "WebSocket handshake successful");
            Connection::new(ws, addr, coord, token).run().await;
        }
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake failed");
        }
    }
}

/// Extract a non-empty `token` parameter from a query string.
fn token_from_query(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_read_from_the_query() {
        assert_eq!(token_from_query(Some("token=abc.def")), Some("abc.def".into()));
        assert_eq!(token_from_query(Some("v=1&token=xyz")), Some("xyz".into()));
        assert_eq!(token_from_query(Some("token=")), None);
        assert_eq!(token_from_query(Some("tokens=1")), None);
        assert_eq!(token_from_query(None), None);
    }
}
