//! Test support: a scripted WebSocket server and a recording renderer.
//!
//! The server speaks the client's wire protocol but has no game logic.
//! Each test drives it by hand, one message at a time.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context};
use campfire_shared::{
    event::ClientEvent,
    math::Vec2,
    protocol::{decode_client_msg, encode_server_msg, ClientMsg, ServerMsg},
    render::{FrameView, RenderBackend, RenderState},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    WebSocketStream,
};
use tracing::debug;

/// Default wait for anything the client is expected to do.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Installs a test-friendly subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Listening side of the scripted server.
pub struct ScriptedServer {
    listener: TcpListener,
    url: String,
}

impl ScriptedServer {
    /// Binds an ephemeral local port.
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind ephemeral test port")?;
        let addr = listener.local_addr()?;
        Ok(Self {
            listener,
            url: format!("ws://{addr}/ws"),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Accepts the next client and completes the WebSocket handshake.
    pub async fn accept(&self) -> anyhow::Result<Peer> {
        let (stream, addr) = tokio::time::timeout(STEP_TIMEOUT, self.listener.accept())
            .await
            .context("timed out waiting for a client")??;
        let ws = accept_async(stream).await.context("websocket handshake")?;
        debug!(%addr, "Scripted server accepted client");
        Ok(Peer { ws })
    }
}

/// One accepted client connection.
pub struct Peer {
    ws: WebSocketStream<TcpStream>,
}

impl Peer {
    pub async fn send(&mut self, msg: &ServerMsg) -> anyhow::Result<()> {
        self.send_raw(encode_server_msg(msg)?).await
    }

    /// Sends a text frame as-is, valid or not.
    pub async fn send_raw(&mut self, text: impl Into<String>) -> anyhow::Result<()> {
        self.ws.send(Message::text(text.into())).await?;
        Ok(())
    }

    pub async fn send_binary(&mut self, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.ws.send(Message::binary(bytes)).await?;
        Ok(())
    }

    /// Next client message, skipping control frames.
    pub async fn recv(&mut self) -> anyhow::Result<ClientMsg> {
        loop {
            let frame = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for a client message")?;
            match frame {
                Some(Ok(Message::Text(text))) => return Ok(decode_client_msg(text.as_str())?),
                Some(Ok(Message::Close(close))) => bail!("client closed: {close:?}"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => bail!("client went away"),
            }
        }
    }

    /// Skips client messages until one satisfies `pred`.
    pub async fn recv_until(
        &mut self,
        mut pred: impl FnMut(&ClientMsg) -> bool,
    ) -> anyhow::Result<ClientMsg> {
        loop {
            let msg = self.recv().await?;
            if pred(&msg) {
                return Ok(msg);
            }
        }
    }

    /// Waits for the client to close the link; returns the close code if any.
    pub async fn expect_close(&mut self) -> anyhow::Result<Option<CloseCode>> {
        loop {
            let frame = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for close")?;
            match frame {
                Some(Ok(Message::Close(close))) => return Ok(close.map(|f| f.code)),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => bail!("stream ended without a close frame"),
            }
        }
    }

    /// Closes with a close frame carrying `code`.
    pub async fn close(mut self, code: CloseCode) -> anyhow::Result<()> {
        self.ws
            .close(Some(CloseFrame {
                code,
                reason: "scripted".into(),
            }))
            .await?;
        Ok(())
    }

    /// Drops the TCP connection without a closing handshake.
    pub fn drop_abruptly(self) {
        drop(self.ws);
    }
}

/// Polls `cond` until it holds or [`STEP_TIMEOUT`] passes.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    tokio::time::timeout(STEP_TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("condition not met in time")
}

/// Current wall clock in server timestamp units (seconds).
pub fn server_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// World state with the given players and nothing else.
pub fn world_state(timestamp: f64, status: &str, players: &[(&str, Value)]) -> Value {
    let players: serde_json::Map<String, Value> = players
        .iter()
        .map(|(id, p)| (id.to_string(), p.clone()))
        .collect();
    json!({
        "timestamp": timestamp,
        "status": status,
        "players": players,
        "enemies": {},
        "bullets": {},
        "powerups": {},
    })
}

/// A living player at `(x, y)` moving at `speed`.
pub fn player_at(x: f32, y: f32, speed: f32) -> Value {
    json!({ "x": x, "y": y, "health": 100, "player_status": "alive", "speed": speed })
}

/// What the renderer saw.
#[derive(Debug, Default)]
pub struct Recorded {
    pub frames: usize,
    pub idle_frames: usize,
    pub events: Vec<ClientEvent>,
    /// Local player's position in the latest drawn frame.
    pub last_local: Option<Vec2>,
    /// Player count in the latest drawn frame.
    pub last_players: usize,
    pub last_view: Option<FrameView>,
}

/// Render backend that records instead of drawing. Clones share storage.
#[derive(Debug, Clone)]
pub struct RecordingRenderer {
    inner: Arc<Mutex<Recorded>>,
    local: String,
}

impl RecordingRenderer {
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            inner: Arc::default(),
            local: local.into(),
        }
    }

    pub fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RenderBackend for RecordingRenderer {
    fn draw(&mut self, state: &RenderState<'_>, view: &FrameView) {
        let local = state.player(&self.local).map(|p| p.position);
        let mut rec = self.recorded();
        rec.frames += 1;
        rec.last_local = local;
        rec.last_players = state.players.len();
        rec.last_view = Some(*view);
    }

    fn draw_idle(&mut self, view: &FrameView) {
        let mut rec = self.recorded();
        rec.idle_frames += 1;
        rec.last_view = Some(*view);
    }

    fn on_event(&mut self, event: &ClientEvent) {
        self.recorded().events.push(event.clone());
    }
}
