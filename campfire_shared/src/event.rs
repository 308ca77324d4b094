//! Client-side events.
//!
//! Events are derived from connection transitions and from comparing each
//! ingested snapshot with its predecessor. They are handed to the render
//! adapter once per frame and never feed back into synchronization.

use crate::snapshot::{EntityId, GameStatus};

/// Connection-state transitions surfaced by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// First successful open.
    Connected,
    /// The link went down. `will_reconnect` is set when a retry is pending.
    Lost { will_reconnect: bool },
    /// A scheduled reconnect attempt started.
    Reconnecting,
    /// The link came back after an earlier loss.
    Restored,
}

/// Link status as seen by the render adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Offline,
    Connecting,
    Online,
    Reconnecting,
}

/// Gameplay-facing notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connection(ConnectionEvent),
    /// The local player joined a game.
    Joined { game_id: String, player_id: EntityId },
    StatusChanged { from: Option<GameStatus>, to: GameStatus },
    /// Local player health dropped between two snapshots.
    DamageTaken { amount: f32 },
    /// An enemy was hit since the previous snapshot.
    EnemyHit { id: EntityId },
    Chat { sender_id: String, message: String, is_self: bool },
    ServerError { message: String },
    GameOver,
    /// The client left its game without a result and is back in the menu.
    ReturnedToMenu,
}
