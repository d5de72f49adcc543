/// Reconnecting WebSocket client session
///
/// Keeps one socket to the gateway open, replays active room joins after every
/// reconnect and publishes its connection state so a UI can render
/// "reconnecting" and the terminal "disconnected" state.
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{ClientError, JoinedRooms, ReconnectPolicy};
use crate::relay::ClientEvent;
use crate::websocket::UserId;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Waiting before reconnect attempt `attempt`
    Reconnecting { attempt: u32 },
    /// Gave up or closed; a new session is needed
    Disconnected,
}

enum SessionEnd {
    /// Local side closed the session
    Closed,
    /// Socket dropped underneath us
    Dropped,
}

pub struct ClientSession {
    commands: mpsc::UnboundedSender<ClientEvent>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ClientSession {
    /// Open a session to `endpoint` (e.g. `ws://host/socket.io/`) as `user_id`
    ///
    /// Returns the session and the stream of raw text frames pushed by the server.
    pub fn connect(
        endpoint: &str,
        user_id: &UserId,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let url = format!("{endpoint}?userId={}", urlencoding::encode(user_id.as_str()));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let task = tokio::spawn(run(url, policy, commands_rx, inbound_tx, state_tx));

        (
            Self {
                commands: commands_tx,
                state: state_rx,
                task,
            },
            inbound_rx,
        )
    }

    /// Queue an event; joins and leaves are remembered for replay after reconnects
    pub fn send(&self, event: ClientEvent) -> Result<(), ClientError> {
        self.commands.send(event).map_err(|_| ClientError::Closed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Close the socket and wait for the background task to finish
    pub async fn close(self) {
        let ClientSession { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "client session task failed");
        }
    }
}

async fn run(
    url: String,
    policy: ReconnectPolicy,
    mut commands: mpsc::UnboundedReceiver<ClientEvent>,
    inbound: mpsc::UnboundedSender<String>,
    state: watch::Sender<ConnectionState>,
) {
    let mut rooms = JoinedRooms::new();
    let mut attempt: u32 = 0;

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                attempt = 0;
                state.send_replace(ConnectionState::Connected);
                tracing::info!(%url, rooms = rooms.len(), "client session connected");

                match pump(stream, &mut rooms, &mut commands, &inbound).await {
                    SessionEnd::Closed => {
                        state.send_replace(ConnectionState::Disconnected);
                        return;
                    }
                    SessionEnd::Dropped => {
                        tracing::warn!(%url, "client session dropped");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "client session connect failed");
            }
        }

        attempt += 1;
        let Some(delay) = policy.delay_for(attempt) else {
            tracing::warn!(%url, attempts = policy.max_attempts, "giving up on reconnect");
            state.send_replace(ConnectionState::Disconnected);
            return;
        };

        state.send_replace(ConnectionState::Reconnecting { attempt });
        tracing::info!(%url, attempt, ?delay, "reconnecting");

        if !wait_for_retry(delay, &mut rooms, &mut commands).await {
            state.send_replace(ConnectionState::Disconnected);
            return;
        }
    }
}

/// Sleep out the backoff while still tracking joins issued meanwhile.
/// Returns false if the session was closed locally.
async fn wait_for_retry(
    delay: std::time::Duration,
    rooms: &mut JoinedRooms,
    commands: &mut mpsc::UnboundedReceiver<ClientEvent>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = commands.recv() => match command {
                Some(event) => {
                    rooms.record(&event);
                    tracing::debug!(event = event.name(), "event issued while disconnected");
                }
                None => return false,
            },
        }
    }
}

async fn pump(
    stream: WsStream,
    rooms: &mut JoinedRooms,
    commands: &mut mpsc::UnboundedReceiver<ClientEvent>,
    inbound: &mpsc::UnboundedSender<String>,
) -> SessionEnd {
    let (mut sink, mut source): (SplitSink<WsStream, Message>, SplitStream<WsStream>) =
        stream.split();

    for event in rooms.rejoin_events() {
        if let Err(e) = send_event(&mut sink, &event).await {
            tracing::warn!(error = %e, "failed to replay room join");
            return SessionEnd::Dropped;
        }
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(event) => {
                    rooms.record(&event);
                    if let Err(e) = send_event(&mut sink, &event).await {
                        tracing::warn!(event = event.name(), error = %e, "failed to send event");
                        return SessionEnd::Dropped;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Closed;
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = inbound.send(text.as_str().to_owned());
                }
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Dropped,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "client socket error");
                    return SessionEnd::Dropped;
                }
            },
        }
    }
}

async fn send_event(
    sink: &mut SplitSink<WsStream, Message>,
    event: &ClientEvent,
) -> Result<(), ClientError> {
    let json = serde_json::to_string(event)?;
    sink.send(Message::text(json)).await?;
    Ok(())
}
