//! TCP server: one task per monitored client connection
//!
//! Each connection attaches to one session, feeds its ticks into the shared
//! [`ProctorMonitor`] and forwards that session's notifications back down the
//! same socket.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use proctoring::vision::{VisionAnalyzer, VisionCapabilities};
use proctoring::{
    ExamSession, InMemorySessionStore, Notification, NotificationBus, ProctorConfig, ProctorMonitor,
    SessionId, SessionReceiver, SharedNotificationBus, SubmissionOutcome,
};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::protocol::{
    decode_client, encode_server, ClientMessage, ProtocolError, ServerMessage, MAX_LINE_LENGTH,
};

/// Which vision capabilities the server hands to the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum VisionSelection {
    /// Strongest capability available (the built-in face detector)
    #[default]
    Auto,
    /// No frame analysis
    Off,
}

impl VisionSelection {
    pub fn capabilities(self) -> VisionCapabilities {
        match self {
            Self::Auto => VisionCapabilities::builtin(),
            Self::Off => VisionCapabilities::none(),
        }
    }
}

/// State shared by every connection
pub struct ServerState {
    monitor: ProctorMonitor,
    store: Arc<InMemorySessionStore>,
    bus: SharedNotificationBus,
}

impl ServerState {
    pub fn new(config: ProctorConfig, vision: VisionAnalyzer) -> Self {
        let store = InMemorySessionStore::new().shared();
        let bus = NotificationBus::new().shared();
        let monitor = ProctorMonitor::new(config, vision, store.clone(), bus.clone());
        Self {
            monitor,
            store,
            bus,
        }
    }

    /// Build from config, selecting the vision strategy from `selection`
    pub fn from_config(config: ProctorConfig, selection: VisionSelection) -> Self {
        let vision = VisionAnalyzer::select(selection.capabilities(), &config.vision);
        Self::new(config, vision)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn monitor(&self) -> &ProctorMonitor {
        &self.monitor
    }

    pub fn store(&self) -> &Arc<InMemorySessionStore> {
        &self.store
    }
}

/// Accept loop
pub struct ProctorServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl ProctorServer {
    pub async fn bind(addr: impl ToSocketAddrs, state: Arc<ServerState>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` is cancelled, then wait for open connections
    /// to finish.
    pub async fn run(self, shutdown: CancellationToken) -> io::Result<()> {
        let tracker = TaskTracker::new();
        info!(addr = %self.local_addr()?, "Proctor server listening");

        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => accepted?,
                _ = shutdown.cancelled() => break,
            };
            debug!(%peer, "Client connected");

            let state = Arc::clone(&self.state);
            let shutdown = shutdown.clone();
            tracker.spawn(async move {
                match handle_connection(stream, state, shutdown).await {
                    Ok(()) => debug!(%peer, "Client disconnected"),
                    Err(e) => warn!(%peer, "Connection ended with error: {}", e),
                }
            });
        }

        tracker.close();
        tracker.wait().await;
        info!("Proctor server stopped");
        Ok(())
    }
}

/// Per-connection session binding
#[derive(Default)]
struct Connection {
    receiver: Option<SessionReceiver>,
}

impl Connection {
    fn session_id(&self) -> Option<SessionId> {
        self.receiver.as_ref().map(SessionReceiver::session_id)
    }

    /// Next notification for the attached session; pending forever if detached
    async fn next_notification(&mut self) -> Result<Notification, RecvError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => std::future::pending().await,
        }
    }
}

enum Event {
    Line(Option<Result<String, LinesCodecError>>),
    Notification(Result<Notification, RecvError>),
    Shutdown,
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) -> Result<(), ProtocolError> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut conn = Connection::default();

    loop {
        let event = tokio::select! {
            line = framed.next() => Event::Line(line),
            notification = conn.next_notification() => Event::Notification(notification),
            _ = shutdown.cancelled() => Event::Shutdown,
        };

        match event {
            Event::Line(None) | Event::Shutdown => return Ok(()),
            Event::Line(Some(line)) => {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let reply = match decode_client(&line) {
                    Ok(message) => handle_message(&state, &mut conn, message).await,
                    Err(e) => Some(ServerMessage::error(e.to_string())),
                };
                if let Some(reply) = reply {
                    framed.send(encode_server(&reply)?).await?;
                }
            }
            Event::Notification(Ok(notification)) => {
                framed
                    .send(encode_server(&ServerMessage::from(notification))?)
                    .await?;
            }
            Event::Notification(Err(RecvError::Lagged(skipped))) => {
                warn!(session_id = ?conn.session_id(), skipped, "Client fell behind on notifications");
                // A lost termination notice must still reach the client
                if let Some(id) = conn.session_id() {
                    if let Some(session) = state.store.session(id).await {
                        if session.status.is_terminal() {
                            framed.send(encode_server(&status_reply(&session))?).await?;
                        }
                    }
                }
            }
            Event::Notification(Err(RecvError::Closed)) => conn.receiver = None,
        }
    }
}

fn status_reply(session: &ExamSession) -> ServerMessage {
    ServerMessage::Status {
        status: session.status,
        warnings_count: session.warnings_count,
        cheating_flag: session.cheating_flag,
    }
}

/// Apply one client message. Notifications produced by the monitor reach the
/// client through the bus, not through the return value.
async fn handle_message(
    state: &ServerState,
    conn: &mut Connection,
    message: ClientMessage,
) -> Option<ServerMessage> {
    if let ClientMessage::Attach { session_id } = message {
        let session = state.store.ensure_session(session_id).await;
        conn.receiver = Some(state.bus.subscribe_session(session_id));
        info!(%session_id, status = %session.status, "Client attached");
        return Some(ServerMessage::Attached { session_id });
    }

    let Some(id) = conn.session_id() else {
        return Some(ServerMessage::error("not attached to a session"));
    };

    match message {
        ClientMessage::Attach { .. } => None,
        ClientMessage::Frame { .. } => {
            let tick = message.into_tick()?;
            match state.monitor.process_tick(id, tick).await {
                Ok(_) => None,
                Err(e) => {
                    warn!(session_id = %id, "Tick failed: {}", e);
                    Some(ServerMessage::error(e.to_string()))
                }
            }
        }
        ClientMessage::TabChange => match state.monitor.report_focus_loss(id).await {
            Ok(_) => None,
            Err(e) => {
                warn!(session_id = %id, "Focus loss report failed: {}", e);
                Some(ServerMessage::error(e.to_string()))
            }
        },
        ClientMessage::Submit => match state.monitor.submit(id).await {
            Ok(outcome) => Some(ServerMessage::Submitted {
                completed: outcome == SubmissionOutcome::Completed,
            }),
            Err(e) => {
                warn!(session_id = %id, "Submission failed: {}", e);
                Some(ServerMessage::error(e.to_string()))
            }
        },
        ClientMessage::Status => Some(match state.store.session(id).await {
            Some(session) => status_reply(&session),
            None => ServerMessage::error(format!("unknown session {}", id)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctoring::vision::VisionMode;

    #[test]
    fn test_vision_selection_modes() {
        let config = ProctorConfig::default();
        let auto = VisionAnalyzer::select(VisionSelection::Auto.capabilities(), &config.vision);
        assert_eq!(auto.mode(), VisionMode::Fallback);
        let off = VisionAnalyzer::select(VisionSelection::Off.capabilities(), &config.vision);
        assert_eq!(off.mode(), VisionMode::Disabled);
    }
}
