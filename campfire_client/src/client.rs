//! Client implementation.
//!
//! [`GameClient`] is the explicit context owned by the driving loop. It
//! holds:
//! - The connection manager (one WebSocket, reconnect policy)
//! - The snapshot window and render-state derivation
//! - Local prediction/reconciliation state
//! - Local input
//!
//! Inbound items are applied between frames through [`GameClient::handle_inbound`];
//! [`GameClient::frame`] then runs advance, reconcile and render-state
//! derivation in that order.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use campfire_shared::{
    config::ClientConfig,
    event::{ClientEvent, ConnectionEvent, LinkStatus},
    math::Vec2,
    protocol::{ClientMsg, ServerMsg},
    render::{FrameView, RenderState},
    snapshot::{EntityId, PlayerState, Replicated, Snapshot},
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    connection::{ConnectionManager, Inbound},
    input::{InputSampler, MoveKeys},
    interp::{LocalOverride, StateSynchronizer},
    prediction::PredictionEngine,
};

/// Server reply to game messages from a socket that is in no game, e.g.
/// after the server dropped the game or after a reconnect.
pub const NOT_IN_GAME_ERROR: &str = "Please create or join a game first.";

/// Time without snapshots after which the scene is reported stale.
pub const STALE_AFTER: Duration = Duration::from_secs(1);

/// Where the client is in the game flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not in a game; world snapshots are ignored.
    Menu,
    InGame,
    Finished,
}

/// Local commands fed to the loop (keyboard, pointer, console).
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Keys(MoveKeys),
    Pointer { screen: Vec2, camera_origin: Vec2 },
    Aim(Vec2),
    Shoot,
    Pushback,
    Chat(String),
    Send(ClientMsg),
    /// Log a one-line summary of the client.
    Status,
    Quit,
}

impl Control {
    /// Parses a console line.
    ///
    /// ```text
    /// move <wasd>|stop   aim <x> <y>   shoot [<x> <y>]
    /// push               say <text>    status    quit
    /// ```
    pub fn parse_console(line: &str) -> anyhow::Result<Vec<Control>> {
        let mut tokens = line.split_whitespace();
        let Some(cmd) = tokens.next() else {
            return Ok(Vec::new());
        };
        let rest: Vec<&str> = tokens.collect();

        let point = |args: &[&str]| -> anyhow::Result<Vec2> {
            match args {
                [x, y] => Ok(Vec2::new(
                    x.parse().with_context(|| format!("bad x '{x}'"))?,
                    y.parse().with_context(|| format!("bad y '{y}'"))?,
                )),
                _ => bail!("expected <x> <y>"),
            }
        };

        let controls = match cmd {
            "move" => match rest.as_slice() {
                ["stop"] | [] => vec![Control::Keys(MoveKeys::empty())],
                [keys] => vec![Control::Keys(MoveKeys::from_letters(keys))],
                _ => bail!("usage: move <wasd>|stop"),
            },
            "aim" => vec![Control::Aim(point(&rest)?)],
            "shoot" if rest.is_empty() => vec![Control::Shoot],
            "shoot" => vec![Control::Aim(point(&rest)?), Control::Shoot],
            "push" => vec![Control::Pushback],
            "say" => vec![Control::Chat(rest.join(" "))],
            "status" => vec![Control::Status],
            "quit" | "exit" => vec![Control::Quit],
            other => bail!("unknown command '{other}'"),
        };
        Ok(controls)
    }
}

/// High-level game client.
pub struct GameClient {
    cfg: ClientConfig,
    pub conn: ConnectionManager,
    pub sync: StateSynchronizer,
    pub prediction: PredictionEngine,
    pub input: InputSampler,

    local_player: Option<EntityId>,
    game_id: Option<String>,
    phase: Phase,
    events: Vec<ClientEvent>,
}

impl GameClient {
    /// Creates the client and the inbound queue its loop must drain.
    pub fn new(cfg: ClientConfig) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (conn, inbound) = ConnectionManager::new(cfg.server_url.clone(), cfg.reconnect_delay());
        let client = Self {
            sync: StateSynchronizer::new(cfg.interpolation_buffer_ms),
            prediction: PredictionEngine::new(&cfg),
            input: InputSampler::default(),
            conn,
            local_player: None,
            game_id: None,
            phase: Phase::Menu,
            events: Vec::new(),
            cfg,
        };
        (client, inbound)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn local_player_id(&self) -> Option<&str> {
        self.local_player.as_deref()
    }

    pub fn game_id(&self) -> Option<&str> {
        self.game_id.as_deref()
    }

    /// Local player's entry in the current authoritative snapshot.
    pub fn local_state(&self) -> Option<&PlayerState> {
        let id = self.local_player.as_ref()?;
        self.sync.current()?.players.get(id)
    }

    /// Connects and asks the server for a single-player game once open.
    pub fn start_single_player(&mut self) {
        self.connect_then(ClientMsg::StartSinglePlayer);
    }

    pub fn create_game(&mut self, max_players: u32) {
        self.connect_then(ClientMsg::CreateGame { max_players });
    }

    pub fn join_game(&mut self, game_id: impl Into<String>) {
        self.connect_then(ClientMsg::JoinGame {
            game_id: game_id.into(),
        });
    }

    fn connect_then(&mut self, msg: ClientMsg) {
        self.conn.connect(Some(Box::new(move |conn: &mut ConnectionManager| {
            if !conn.send(&msg) {
                warn!(?msg, "Failed to send request after connecting");
            }
        })));
    }

    /// Takes the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    /// Applies one item from the inbound queue.
    pub fn handle_inbound(&mut self, item: Inbound, now: Instant) {
        match item {
            Inbound::Message(msg) => self.handle_server_msg(msg, now),
            Inbound::Link { link, event } => {
                if let Some(ev) = self.conn.handle_link(link, event) {
                    self.on_connection_event(ev);
                }
            }
            Inbound::ReconnectDue { id } => {
                if let Some(ev) = self.conn.handle_reconnect_due(id) {
                    self.on_connection_event(ev);
                }
            }
        }
    }

    fn on_connection_event(&mut self, ev: ConnectionEvent) {
        match ev {
            ConnectionEvent::Lost { will_reconnect } => {
                info!(will_reconnect, "Connection lost, holding last world state");
            }
            ConnectionEvent::Restored => info!("Connection restored"),
            ConnectionEvent::Connected | ConnectionEvent::Reconnecting => {}
        }
        self.events.push(ClientEvent::Connection(ev));
    }

    /// Dispatches a decoded server message to its handler.
    pub fn handle_server_msg(&mut self, msg: ServerMsg, now: Instant) {
        match msg {
            ServerMsg::GameState { state } => self.on_game_state(&state, now),
            ServerMsg::GameCreated {
                game_id,
                player_id,
                initial_state,
                max_players,
            } => {
                debug!(?max_players, "Game created");
                self.on_joined(game_id, player_id, &initial_state, now);
            }
            ServerMsg::GameJoined {
                game_id,
                player_id,
                initial_state,
            }
            | ServerMsg::SpGameStarted {
                game_id,
                player_id,
                initial_state,
            } => self.on_joined(game_id, player_id, &initial_state, now),
            ServerMsg::GameOverNotification { final_state } => {
                self.on_game_over(final_state.as_ref(), now)
            }
            ServerMsg::ChatMessage { sender_id, message } => {
                let is_self = self.local_player.as_deref() == Some(sender_id.as_str());
                self.events.push(ClientEvent::Chat {
                    sender_id,
                    message,
                    is_self,
                });
            }
            ServerMsg::Error { message } => {
                warn!(message = %message, "Server error");
                let not_in_game = message == NOT_IN_GAME_ERROR;
                self.events.push(ClientEvent::ServerError { message });
                if not_in_game && self.phase != Phase::Menu {
                    self.reset_to_menu();
                }
            }
            ServerMsg::HelloFromServer { message } => {
                debug!(message = %message, "Server hello");
            }
            ServerMsg::HighScoresList { scores } => {
                debug!(entries = scores.as_array().map_or(0, Vec::len), "High scores received");
            }
            ServerMsg::Unknown => debug!("Ignoring unknown message type"),
        }
    }

    fn on_joined(&mut self, game_id: String, player_id: String, initial: &Value, now: Instant) {
        info!(game_id = %game_id, player_id = %player_id, "Joined game");
        self.sync.reset();
        self.local_player = Some(player_id.clone());
        self.game_id = Some(game_id.clone());
        self.phase = Phase::InGame;
        self.events.push(ClientEvent::Joined { game_id, player_id });

        match Snapshot::from_value(initial) {
            Ok(snap) => {
                if let Some(me) = self.local_player.as_ref().and_then(|id| snap.players.get(id)) {
                    self.prediction.seed(me.position());
                }
                self.apply_snapshot(snap, now);
            }
            Err(e) => warn!(error = %e, "Initial state unusable, waiting for the first snapshot"),
        }
    }

    fn on_game_state(&mut self, state: &Value, now: Instant) {
        if self.phase == Phase::Menu {
            debug!("Ignoring world state outside a game");
            return;
        }
        match Snapshot::from_value(state) {
            Ok(snap) => self.apply_snapshot(snap, now),
            Err(e) => warn!(error = %e, "Dropping snapshot"),
        }
    }

    fn on_game_over(&mut self, final_state: Option<&Value>, now: Instant) {
        let Some(final_state) = final_state else {
            warn!("Game over without final state");
            self.reset_to_menu();
            return;
        };
        match Snapshot::from_value(final_state) {
            Ok(snap) => self.apply_snapshot(snap, now),
            Err(e) => warn!(error = %e, "Final state unusable"),
        }
        info!("Game over");
        self.phase = Phase::Finished;
        self.events.push(ClientEvent::GameOver);
    }

    /// Leaves the current game: drops the window and the local player, and
    /// stops predicting. The connection stays up.
    pub fn reset_to_menu(&mut self) {
        info!(game_id = ?self.game_id, "Returning to menu");
        self.sync.reset();
        self.prediction.observe_absent();
        self.local_player = None;
        self.game_id = None;
        self.phase = Phase::Menu;
        self.events.push(ClientEvent::ReturnedToMenu);
    }

        fn apply_snapshot(&mut self, snap: Snapshot, now: Instant) {
        self.derive_events(&snap);
        if !self.sync.ingest_snapshot(snap, now) {
            return;
        }
        let me = self
            .local_player
            .as_ref()
            .and_then(|id| self.sync.current()?.players.get(id));
        match me {
            Some(me) => self.prediction.observe(me),
            None => self.prediction.observe_absent(),
        }
    }

    /// Compares `next` with the held snapshot and records notable changes.
    fn derive_events(&mut self, next: &Snapshot) {
        let prev = self.sync.current();

        let from = prev.map(|p| p.status);
        if from != Some(next.status) {
            info!(?from, to = ?next.status, "Game status changed");
            self.events.push(ClientEvent::StatusChanged {
                from,
                to: next.status,
            });
        }

        let Some(prev) = prev else { return };

        if let Some(id) = &self.local_player {
            let before = prev.players.get(id).and_then(|p| p.health);
            let after = next.players.get(id).and_then(|p| p.health);
            if let (Some(before), Some(after)) = (before, after) {
                if after < before {
                    self.events.push(ClientEvent::DamageTaken {
                        amount: before - after,
                    });
                }
            }
        }

        for (id, enemy) in &next.enemies {
            let Some(hit_at) = enemy.last_damage_time else {
                continue;
            };
            let seen = prev.enemies.get(id).and_then(|e| e.last_damage_time);
            if seen != Some(hit_at) {
                self.events.push(ClientEvent::EnemyHit { id: id.clone() });
            }
        }
    }

    /// Applies a local command. Returns false when the user asked to quit.
    pub fn apply_control(&mut self, control: Control) -> bool {
        match control {
            Control::Keys(keys) => self.input.set_keys(keys),
            Control::Pointer {
                screen,
                camera_origin,
            } => self.input.set_pointer(screen, camera_origin),
            Control::Aim(world) => self.input.set_aim(world),
            Control::Shoot => match self.input.aim_target() {
                Some(target) => {
                    self.conn.send(&ClientMsg::PlayerShoot { target });
                }
                None => debug!("Shoot ignored, no aim target"),
            },
            Control::Pushback => {
                self.conn.send(&ClientMsg::PlayerPushback);
            }
            Control::Chat(text) => match ClientMsg::chat(&text) {
                Some(msg) => {
                    self.conn.send(&msg);
                }
                None => debug!("Empty chat line ignored"),
            },
            Control::Send(msg) => {
                self.conn.send(&msg);
            }
            Control::Status => info!(
                phase = ?self.phase,
                link = ?self.conn.link_status(),
                game_id = ?self.game_id,
                player_id = ?self.local_player,
                snapshots = self.sync.ingested(),
                predicted = ?self.prediction.predicted(),
                "Status"
            ),
            Control::Quit => return false,
        }
        true
    }

    /// Runs one frame: advance, reconcile against the same-frame
    /// authoritative position, then derive the render state.
    pub fn frame(&mut self, dt: f32, render_wall_clock_ms: f64) -> Option<RenderState<'_>> {
        let intent = self.input.movement_vector();
        let authoritative = self.local_state().map(|me| (me.position(), me.speed));

        let speed = authoritative
            .and_then(|(_, speed)| speed)
            .unwrap_or(self.cfg.prediction_speed);
        self.prediction.advance(dt, intent, speed);

        if let Some((pos, _)) = authoritative {
            self.prediction.reconcile(pos);
        }

        let local = self.local_player.as_deref().map(|player_id| LocalOverride {
            player_id,
            rendered_position: self.prediction.rendered(),
        });
        self.sync.compute_render_state(render_wall_clock_ms, local)
    }

    /// Read-only context for the render adapter.
    pub fn frame_view(&self, now: Instant) -> FrameView {
        let link = self.conn.link_status();
        FrameView {
            camera: self.local_player.as_ref().map(|_| self.prediction.rendered()),
            link,
            stale: self.sync.is_stale(now, STALE_AFTER)
                || (self.phase == Phase::InGame && link != LinkStatus::Online),
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch, the clock server
/// timestamps are compared against.
pub fn wall_clock_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}
