// Push channel: one WebSocket per active session, delivering whole game
// snapshots to the engine.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use heist_core::GameSnapshot;

/// Inbound frames of one connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Lifecycle of the connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Events delivered to the engine. Every event names the connection it
/// came from so events of a replaced connection can be told apart.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Snapshot {
        connection_id: u64,
        snapshot: Box<GameSnapshot>,
    },
    /// Sent exactly once per connection, however it ended.
    Closed { connection_id: u64 },
}

/// Opens the transport. Swapped for in-memory streams in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<FrameStream, WsError>;
}

/// [`Connector`] over tokio-tungstenite.
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<FrameStream, WsError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        Ok(Box::pin(ws_stream))
    }
}

/// `{ws_base}/ws/{game_id}/{player_id}`.
pub fn push_url(ws_base: &str, game_id: &str, player_id: &str) -> String {
    format!("{}/ws/{game_id}/{player_id}", ws_base.trim_end_matches('/'))
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot {
    connection_id: u64,
    state: ConnectionState,
    /// Set by `disconnect`; the slot's connection no longer speaks for the
    /// session even if its queued events are still in flight.
    released: bool,
}

/// Owns the single connection slot.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    ws_base: String,
    slot: Arc<Mutex<Slot>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, ws_base: impl Into<String>) -> Self {
        Self {
            connector,
            ws_base: ws_base.into(),
            slot: Arc::new(Mutex::new(Slot {
                connection_id: 0,
                state: ConnectionState::Idle,
                released: false,
            })),
            shutdown: None,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().expect("connection slot mutex poisoned")
    }

    pub fn state(&self) -> ConnectionState {
        self.slot().state
    }

    /// Whether events from `connection_id` still belong to the session.
    ///
    /// True for the most recently started connection until `disconnect` is
    /// called, including after the server closed it: frames it delivered
    /// before the close are still applied, in order, followed by its
    /// `Closed` event.
    pub fn accepts(&self, connection_id: u64) -> bool {
        let slot = self.slot();
        connection_id != 0 && slot.connection_id == connection_id && !slot.released
    }

    /// Start a connection for `(game_id, player_id)`. A no-op returning
    /// `false` while another connection is connecting or open.
    pub fn connect(
        &mut self,
        game_id: &str,
        player_id: &str,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> bool {
        let connection_id = {
            let mut slot = self.slot();
            if matches!(slot.state, ConnectionState::Connecting | ConnectionState::Open) {
                debug!(
                    connection_id = slot.connection_id,
                    state = ?slot.state,
                    "connect ignored, a connection is already active"
                );
                return false;
            }
            slot.connection_id += 1;
            slot.state = ConnectionState::Connecting;
            slot.released = false;
            slot.connection_id
        };

        let url = push_url(&self.ws_base, game_id, player_id);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown = Some(shutdown_tx);

        info!(connection_id, %url, "opening push connection");
        tokio::spawn(run_connection(
            Arc::clone(&self.connector),
            url,
            connection_id,
            Arc::clone(&self.slot),
            events,
            shutdown_rx,
        ));
        true
    }

    /// Close the active connection, if any. The slot is released at once;
    /// the connection task still reports its `Closed` event.
    pub fn disconnect(&mut self) {
        {
            let mut slot = self.slot();
            if matches!(slot.state, ConnectionState::Connecting | ConnectionState::Open) {
                info!(connection_id = slot.connection_id, "closing push connection");
                slot.state = ConnectionState::Closed;
            }
            slot.released = true;
        }
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Connection task: handshake, read frames until the stream ends or a
/// disconnect is requested, then release the slot and report `Closed`.
async fn run_connection(
    connector: Arc<dyn Connector>,
    url: String,
    connection_id: u64,
    slot: Arc<Mutex<Slot>>,
    events: mpsc::Sender<ConnectionEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let stream = tokio::select! {
        _ = &mut shutdown => None,
        result = connector.connect(&url) => match result {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(connection_id, "push connection failed: {e}");
                None
            }
        },
    };

    if let Some(stream) = stream {
        set_state(&slot, connection_id, ConnectionState::Open);
        info!(connection_id, "push connection open");
        tokio::select! {
            _ = &mut shutdown => {
                debug!(connection_id, "disconnect requested");
            }
            _ = process_message_stream(stream, connection_id, &events) => {}
        }
    }

    set_state(&slot, connection_id, ConnectionState::Closed);
    info!(connection_id, "push connection closed");
    let _ = events.send(ConnectionEvent::Closed { connection_id }).await;
}

/// Update the slot only if it still belongs to `connection_id`.
fn set_state(slot: &Mutex<Slot>, connection_id: u64, state: ConnectionState) {
    let mut slot = match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if slot.connection_id != connection_id {
        return;
    }
    // A disconnect may already have closed the slot; never reopen it.
    if slot.state == ConnectionState::Closed && state == ConnectionState::Open {
        return;
    }
    slot.state = state;
}

/// Forward decoded snapshots from `stream` until it closes or errors.
///
/// Undecodable text frames are skipped. Returns `Err(())` if the receiver
/// is gone.
pub async fn process_message_stream<St>(
    mut stream: St,
    connection_id: u64,
    tx: &mpsc::Sender<ConnectionEvent>,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<GameSnapshot>(text.as_str()) {
                Ok(snapshot) => {
                    let event = ConnectionEvent::Snapshot {
                        connection_id,
                        snapshot: Box::new(snapshot),
                    };
                    if tx.send(event).await.is_err() {
                        return Err(());
                    }
                }
                Err(e) => {
                    warn!(connection_id, "skipping undecodable snapshot frame: {e}");
                }
            },
            Ok(Message::Close(frame)) => {
                info!(connection_id, ?frame, "server sent close frame");
                break;
            }
            Err(e) => {
                warn!(connection_id, "push connection error: {e}");
                break;
            }
            _ => {
                // Binary, Ping, Pong and raw frames carry nothing for us.
            }
        }
    }
    Ok(())
}
