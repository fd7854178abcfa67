//! Connection - one client socket.
//!
//! Each Connection runs in its own Tokio task:
//!
//! ```text
//!   handshake token? -> authenticate (failure reported, socket kept)
//!        |
//!   tokio::select! over
//!     - inbound frames  -> handlers::handle_frame -> reply/error frame
//!     - outbound queue  <- Hub fan-out
//!     - auth deadline   (unauthenticated sockets only)
//!     - ping timer
//!        |
//!   cleanup: hub unregister + presence/roster release
//! ```
//!
//! A failed explicit `authenticate` closes the connection.

use crate::coordinator::Coordinator;
use crate::error::CoordError;
use crate::handlers::{Session, handle_frame};
use crate::notify::Outbound;
use crate::telemetry::spans;
use futures_util::{SinkExt, StreamExt};
use huddle_proto::{ClientCommand, ClientFrame, ServerFrame};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{Instrument, Span, debug, info, warn};

type Socket = WebSocketStream<TcpStream>;

/// A client connection handler.
pub struct Connection {
    ws: Socket,
    addr: SocketAddr,
    coord: Arc<Coordinator>,
    handshake_token: Option<String>,
}

enum Step {
    Continue,
    Close,
}

/// Owns the session for the life of the task and releases it on drop, so
/// presence and hub state are cleaned up even if serving unwinds.
struct Registration {
    coord: Arc<Coordinator>,
    session: Session,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let conn = self.session.conn;
        self.coord.close_connection(conn, self.session.identity_id());
        info!(conn = %conn, "connection closed");
    }
}

impl Connection {
    pub fn new(
        ws: Socket,
        addr: SocketAddr,
        coord: Arc<Coordinator>,
        handshake_token: Option<String>,
    ) -> Self {
        Self {
            ws,
            addr,
            coord,
            handshake_token,
        }
    }

    /// Serve the socket until either side closes it.
    pub async fn run(self) {
        let limits = self.coord.config.limits.clone();
        let (tx, rx) = mpsc::channel(limits.outbound_queue);
        let conn = self.coord.open_connection(tx);
        let span = spans::connection(conn, self.addr);

        let mut registration = Registration {
            coord: Arc::clone(&self.coord),
            session: Session::new(conn),
        };
        self.serve(&mut registration.session, rx)
            .instrument(span)
            .await;
    }

    async fn serve(self, session: &mut Session, mut rx: mpsc::Receiver<Outbound>) {
        let Self {
            ws,
            coord,
            handshake_token,
            ..
        } = self;
        let limits = &coord.config.limits;
        let (mut sink, mut stream) = ws.split();

        // Initial handshake: failure is reported but the socket stays open.
        if let Some(token) = handshake_token {
            let frame = ClientFrame {
                id: None,
                command: ClientCommand::Authenticate { token },
            };
            let reply = handle_frame(&coord, session, frame).await;
            record_identity(session);
            if send(&mut sink, &reply).await.is_err() {
                return;
            }
        }

        let auth_deadline = tokio::time::sleep(Duration::from_secs(limits.auth_timeout_secs));
        tokio::pin!(auth_deadline);
        let mut ping = tokio::time::interval(Duration::from_secs(limits.ping_interval_secs));
        ping.tick().await;

        loop {
            let step = tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_text(&coord, session, &text, &mut sink).await
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        match sink.send(WsMessage::Pong(payload)).await {
                            Ok(()) => Step::Continue,
                            Err(_) => Step::Close,
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => Step::Close,
                    Some(Ok(_)) => Step::Continue,
                    Some(Err(e)) => {
                        debug!(error = %e, "read error");
                        Step::Close
                    }
                },

                Some(payload) = rx.recv() => {
                    match sink.send(WsMessage::Text(payload.to_string())).await {
                        Ok(()) => Step::Continue,
                        Err(_) => Step::Close,
                    }
                }

                _ = &mut auth_deadline, if !session.is_authenticated() => {
                    info!("authentication timeout");
                    let frame = CoordError::InvalidCredential("authentication timeout".into())
                        .to_frame(None);
                    let _ = send(&mut sink, &frame).await;
                    Step::Close
                }

                _ = ping.tick() => {
                    match sink.send(WsMessage::Ping(Vec::new())).await {
                        Ok(()) => Step::Continue,
                        Err(_) => Step::Close,
                    }
                }
            };

            if let Step::Close = step {
                break;
            }
        }

        let _ = sink.close().await;
    }
}

async fn handle_text<S>(coord: &Coordinator, session: &mut Session, text: &str, sink: &mut S) -> Step
where
    S: SinkExt<WsMessage> + Unpin,
{
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            let error = CoordError::InvalidArgument(format!("malformed frame: {e}")).to_frame(None);
            return match send(sink, &error).await {
                Ok(()) => Step::Continue,
                Err(()) => Step::Close,
            };
        }
    };

    let reauth = matches!(frame.command, ClientCommand::Authenticate { .. });
    let reply = handle_frame(coord, session, frame).await;
    let failed = matches!(reply, ServerFrame::Error(_));
    if send(sink, &reply).await.is_err() {
        return Step::Close;
    }

    if reauth {
        if failed {
            warn!("re-authentication failed, closing");
            return Step::Close;
        }
        record_identity(session);
    }
    Step::Continue
}

async fn send<S>(sink: &mut S, frame: &ServerFrame) -> Result<(), ()>
where
    S: SinkExt<WsMessage> + Unpin,
{
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to encode frame");
            return Ok(());
        }
    };
    sink.send(WsMessage::Text(json)).await.map_err(|_| ())
}

fn record_identity(session: &Session) {
    if let Some(identity) = session.identity_id() {
        Span::current().record("identity", identity);
    }
}
