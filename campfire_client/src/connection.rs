//! Connection management.
//!
//! The manager owns one persistent WebSocket link at a time. All of its
//! state is mutated from the driving loop only: the link task and the
//! reconnect timer report back through the inbound queue as [`Inbound`]
//! items, which the loop drains between frames and routes into
//! [`ConnectionManager::handle_link`] / [`ConnectionManager::handle_reconnect_due`].
//!
//! Policy:
//! - `connect` is a no-op while a link is open or opening.
//! - `send` only transmits while the link is open; otherwise the message is
//!   dropped.
//! - After an abnormal close, and only if a connection had succeeded before,
//!   exactly one reconnect is scheduled after a fixed delay.
//! - `close` cancels any pending reconnect.

use std::time::Duration;

use campfire_shared::{
    error::ProtocolError,
    event::{ConnectionEvent, LinkStatus},
    protocol::{decode_server_msg, encode_client_msg, ClientMsg, ServerMsg},
};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::frame::coding::CloseCode, Message},
};
use tracing::{debug, info, trace, warn};

/// Item delivered to the driving loop.
#[derive(Debug)]
pub enum Inbound {
    /// A decoded server message.
    Message(ServerMsg),
    /// Lifecycle report from link task `link`.
    Link { link: u64, event: LinkEvent },
    /// The reconnect timer with this id fired.
    ReconnectDue { id: u64 },
}

/// What a link task observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    Closed { abnormal: bool },
    /// The connect attempt itself failed.
    Failed,
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or the link dropped.
    Disconnected,
    Connecting,
    Open,
    /// Closed by the client; no reconnects.
    Closed,
}

/// Callback run once the link is open.
pub type OnOpen = Box<dyn FnOnce(&mut ConnectionManager) + Send>;

/// Cloneable send handle that follows the current link.
#[derive(Debug, Clone)]
pub struct Outbound {
    link: watch::Receiver<Option<mpsc::UnboundedSender<String>>>,
}

impl Outbound {
    /// Serializes and queues `msg` if a link is open. Returns whether it was
    /// queued.
    pub fn send(&self, msg: &ClientMsg) -> bool {
        let Some(tx) = self.link.borrow().clone() else {
            trace!(?msg, "Dropping outbound message, link not open");
            return false;
        };
        match encode_client_msg(msg) {
            Ok(text) => tx.send(text).is_ok(),
            Err(e) => {
                warn!(error = %e, "Failed to encode outbound message");
                false
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.link.borrow().is_some()
    }

    /// Handle whose link slot is driven by the caller instead of a manager.
    #[cfg(test)]
    pub(crate) fn detached() -> (watch::Sender<Option<mpsc::UnboundedSender<String>>>, Self) {
        let (tx, link) = watch::channel(None);
        (tx, Self { link })
    }
}

struct PendingReconnect {
    id: u64,
    handle: JoinHandle<()>,
}

pub struct ConnectionManager {
    url: String,
    reconnect_delay: Duration,
    state: ConnectionState,
    has_connected: bool,

    /// Id of the live link; events from older links are ignored.
    link_id: u64,
    /// Writer for the link being opened, published once it is open.
    pending_writer: Option<mpsc::UnboundedSender<String>>,
    writer: watch::Sender<Option<mpsc::UnboundedSender<String>>>,
    link_task: Option<JoinHandle<()>>,

    reconnect: Option<PendingReconnect>,
    reconnects_scheduled: u64,

    inbound_tx: mpsc::UnboundedSender<Inbound>,
    on_open: Vec<OnOpen>,
}

impl ConnectionManager {
    /// Creates a manager and the inbound queue the driving loop drains.
    pub fn new(
        url: impl Into<String>,
        reconnect_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (writer, _) = watch::channel(None);
        (
            Self {
                url: url.into(),
                reconnect_delay,
                state: ConnectionState::Disconnected,
                has_connected: false,
                link_id: 0,
                pending_writer: None,
                writer,
                link_task: None,
                reconnect: None,
                reconnects_scheduled: 0,
                inbound_tx,
                on_open: Vec::new(),
            },
            inbound_rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn link_id(&self) -> u64 {
        self.link_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn link_status(&self) -> LinkStatus {
        match self.state {
            ConnectionState::Open => LinkStatus::Online,
            ConnectionState::Connecting if self.has_connected => LinkStatus::Reconnecting,
            ConnectionState::Connecting => LinkStatus::Connecting,
            ConnectionState::Disconnected if self.reconnect.is_some() => LinkStatus::Reconnecting,
            ConnectionState::Disconnected | ConnectionState::Closed => LinkStatus::Offline,
        }
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Total reconnect timers scheduled over the manager's lifetime.
    pub fn reconnects_scheduled(&self) -> u64 {
        self.reconnects_scheduled
    }

    /// A send handle for tasks outside the driving loop.
    pub fn outbound(&self) -> Outbound {
        Outbound {
            link: self.writer.subscribe(),
        }
    }

    /// Opens the link unless one is already open or opening.
    ///
    /// `on_open` runs immediately when the link is already open, otherwise
    /// once it opens.
    pub fn connect(&mut self, on_open: Option<OnOpen>) {
        match self.state {
            ConnectionState::Open => {
                if let Some(f) = on_open {
                    f(self);
                }
                return;
            }
            ConnectionState::Connecting => {
                self.on_open.extend(on_open);
                return;
            }
            ConnectionState::Disconnected | ConnectionState::Closed => {}
        }

        self.on_open.extend(on_open);
        self.cancel_reconnect();
        self.link_id += 1;
        self.state = ConnectionState::Connecting;

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        self.pending_writer = Some(writer_tx);

        info!(url = %self.url, link = self.link_id, "Connecting to server");
        self.link_task = Some(tokio::spawn(run_link(
            self.url.clone(),
            self.link_id,
            writer_rx,
            self.inbound_tx.clone(),
        )));
    }

    /// Sends `msg` if the link is open; drops it otherwise.
    pub fn send(&self, msg: &ClientMsg) -> bool {
        if self.state != ConnectionState::Open {
            trace!(?msg, state = ?self.state, "Dropping outbound message");
            return false;
        }
        self.outbound().send(msg)
    }

    /// Closes the link on request. Cancels any pending reconnect.
    pub fn close(&mut self) {
        self.cancel_reconnect();
        self.on_open.clear();
        self.pending_writer = None;
        // Dropping the writer makes the link task send a normal close frame.
        self.writer.send_replace(None);
        self.link_task = None;
        // Events from the old link are stale from here on.
        self.link_id += 1;
        if self.state != ConnectionState::Closed {
            info!("Connection closed by client");
        }
        self.state = ConnectionState::Closed;
    }

    /// Applies a lifecycle report from a link task.
    pub fn handle_link(&mut self, link: u64, event: LinkEvent) -> Option<ConnectionEvent> {
        if link != self.link_id {
            debug!(link, live = self.link_id, ?event, "Ignoring event from stale link");
            return None;
        }

        match event {
            LinkEvent::Opened => {
                let restored = self.has_connected;
                self.has_connected = true;
                self.state = ConnectionState::Open;
                self.cancel_reconnect();
                if let Some(tx) = self.pending_writer.take() {
                    self.writer.send_replace(Some(tx));
                }
                info!(link, restored, "Connection open");

                for f in std::mem::take(&mut self.on_open) {
                    f(self);
                }
                Some(if restored {
                    ConnectionEvent::Restored
                } else {
                    ConnectionEvent::Connected
                })
            }
            LinkEvent::Closed { abnormal: false } => {
                self.drop_link();
                info!(link, "Connection closed by server");
                Some(ConnectionEvent::Lost {
                    will_reconnect: false,
                })
            }
            LinkEvent::Closed { abnormal: true } | LinkEvent::Failed => {
                self.drop_link();
                let will_reconnect = self.has_connected;
                if will_reconnect {
                    self.schedule_reconnect();
                }
                warn!(link, ?event, will_reconnect, "Connection lost");
                Some(ConnectionEvent::Lost { will_reconnect })
            }
        }
    }

    /// Runs the reconnect attempt for timer `id` if it is still the pending one.
    pub fn handle_reconnect_due(&mut self, id: u64) -> Option<ConnectionEvent> {
        match &self.reconnect {
            Some(pending) if pending.id == id => {
                self.reconnect = None;
            }
            _ => {
                debug!(id, "Ignoring cancelled reconnect timer");
                return None;
            }
        }
        if self.state != ConnectionState::Disconnected {
            return None;
        }
        info!(id, "Reconnecting");
        self.connect(None);
        Some(ConnectionEvent::Reconnecting)
    }

    fn drop_link(&mut self) {
        self.pending_writer = None;
        self.writer.send_replace(None);
        self.link_task = None;
        self.state = ConnectionState::Disconnected;
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect.is_some() {
            debug!("Reconnect already pending");
            return;
        }
        self.reconnects_scheduled += 1;
        let id = self.reconnects_scheduled;
        let delay = self.reconnect_delay;
        let tx = self.inbound_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Inbound::ReconnectDue { id });
        });
        info!(id, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        self.reconnect = Some(PendingReconnect { id, handle });
    }

    fn cancel_reconnect(&mut self) {
        if let Some(pending) = self.reconnect.take() {
            pending.handle.abort();
            debug!(id = pending.id, "Reconnect cancelled");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel_reconnect();
    }
}

/// Decodes a text frame; binary frames are not part of the protocol.
fn decode_frame(msg: &Message) -> Result<Option<ServerMsg>, ProtocolError> {
    match msg {
        Message::Text(text) => decode_server_msg(text.as_str()).map(Some),
        Message::Binary(bytes) => Err(ProtocolError::Binary(bytes.len())),
        _ => Ok(None),
    }
}

/// Owns one WebSocket for its lifetime.
async fn run_link(
    url: String,
    link: u64,
    mut writer: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    let report = |event| {
        let _ = inbound.send(Inbound::Link { link, event });
    };

    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            warn!(link, error = %e, "Connect failed");
            report(LinkEvent::Failed);
            return;
        }
    };
    report(LinkEvent::Opened);

    let (mut sink, mut stream) = ws.split();
    let abnormal = loop {
        tokio::select! {
            out = writer.recv() => match out {
                Some(text) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        warn!(link, error = %e, "Send failed");
                        break true;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break false;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(close))) => {
                    let normal = close
                        .as_ref()
                        .is_some_and(|f| matches!(f.code, CloseCode::Normal | CloseCode::Away));
                    debug!(link, ?close, "Close frame received");
                    break !normal;
                }
                Some(Ok(msg)) => match decode_frame(&msg) {
                    Ok(Some(decoded)) => {
                        if inbound.send(Inbound::Message(decoded)).is_err() {
                            break false;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(link, error = %e, "Dropping malformed message"),
                },
                Some(Err(e)) => {
                    warn!(link, error = %e, "Read failed");
                    break true;
                }
                None => break true,
            },
        }
    };

    report(LinkEvent::Closed { abnormal });
}
