//! Wire protocol.
//!
//! Every frame is a JSON text message tagged by `type`. Inbound world state
//! is carried as raw JSON and parsed into a [`Snapshot`](crate::snapshot::Snapshot)
//! by the receiver, so a bad snapshot never fails the frame decode.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::ProtocolError, math::Vec2};

/// Longest chat line the server accepts.
pub const MAX_CHAT_LENGTH: usize = 100;

/// Normalized movement intent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Direction {
    pub dx: f32,
    pub dy: f32,
}

impl From<Vec2> for Direction {
    fn from(v: Vec2) -> Self {
        Self { dx: v.x, dy: v.y }
    }
}

/// Server -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Periodic world snapshot.
    #[serde(alias = "state")]
    GameState { state: Value },
    /// Reply to `create_game`.
    GameCreated {
        game_id: String,
        player_id: String,
        initial_state: Value,
        #[serde(default)]
        max_players: Option<u32>,
    },
    /// Reply to `join_game`.
    GameJoined {
        game_id: String,
        player_id: String,
        initial_state: Value,
    },
    /// Reply to `start_single_player`.
    SpGameStarted {
        game_id: String,
        player_id: String,
        initial_state: Value,
    },
    GameOverNotification {
        #[serde(default)]
        final_state: Option<Value>,
    },
    ChatMessage { sender_id: String, message: String },
    Error { message: String },
    HelloFromServer {
        #[serde(default)]
        message: String,
    },
    HighScoresList {
        #[serde(default)]
        scores: Value,
    },
    /// Any message type this client does not know.
    #[serde(other)]
    Unknown,
}

/// Client -> server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    PlayerMove { direction: Direction },
    PlayerShoot { target: Vec2 },
    PlayerPushback,
    PlayerChat { message: String },
    StartSinglePlayer,
    CreateGame { max_players: u32 },
    JoinGame { game_id: String },
}

impl ClientMsg {
    /// Builds a chat message, trimming and truncating it. Empty lines yield
    /// `None`.
    pub fn chat(text: &str) -> Option<Self> {
        let message: String = text.trim().chars().take(MAX_CHAT_LENGTH).collect();
        (!message.is_empty()).then_some(Self::PlayerChat { message })
    }
}

pub fn encode_client_msg(msg: &ClientMsg) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

pub fn decode_client_msg(text: &str) -> Result<ClientMsg, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode_server_msg(msg: &ServerMsg) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

pub fn decode_server_msg(text: &str) -> Result<ServerMsg, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}
