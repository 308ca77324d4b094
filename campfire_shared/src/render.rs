//! Rendering abstraction.
//!
//! This crate intentionally does not depend on a graphics backend. The
//! synchronizer produces a [`RenderState`] each frame that borrows from the
//! current snapshot; a backend draws it and must not keep it past the frame.

use crate::{
    event::{ClientEvent, LinkStatus},
    math::Vec2,
    snapshot::{
        BulletState, Campfire, DamageText, EnemySpeech, EnemyState, EntityId, EntityMap,
        Environment, GameStatus, PlayerState, PowerupState,
    },
};
use serde_json::{Map, Value};

/// One entity as it should be drawn this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderEntity<'a, T> {
    pub id: &'a EntityId,
    /// Interpolated (or substituted) position.
    pub position: Vec2,
    /// Authoritative non-positional fields, straight from the current snapshot.
    pub state: &'a T,
}

/// Per-frame derived view. Never stored or fed back into the window.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState<'a> {
    /// Server timestamp of the snapshot the state was taken from.
    pub timestamp: f64,
    pub status: GameStatus,
    /// Interpolation factor used, `None` when no window was available.
    pub alpha: Option<f32>,
    pub players: Vec<RenderEntity<'a, PlayerState>>,
    pub enemies: Vec<RenderEntity<'a, EnemyState>>,
    pub bullets: Vec<RenderEntity<'a, BulletState>>,
    pub powerups: Vec<RenderEntity<'a, PowerupState>>,
    pub damage_texts: &'a EntityMap<DamageText>,
    pub environment: &'a Environment,
    pub score: i64,
    pub countdown: Option<f32>,
    pub enemy_speech: Option<&'a EnemySpeech>,
    pub campfire: Option<&'a Campfire>,
    pub extra: &'a Map<String, Value>,
}

impl RenderState<'_> {
    pub fn player(&self, id: &str) -> Option<&RenderEntity<'_, PlayerState>> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn enemy(&self, id: &str) -> Option<&RenderEntity<'_, EnemyState>> {
        self.enemies.iter().find(|e| e.id == id)
    }
}

/// Read-only frame context handed to the backend next to the render state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    /// Camera follow target: the local player's rendered position.
    pub camera: Option<Vec2>,
    pub link: LinkStatus,
    /// No snapshot arrived recently; the scene is frozen on the last one.
    pub stale: bool,
}

/// A minimal rendering API.
pub trait RenderBackend: Send {
    fn begin_frame(&mut self) {}
    fn draw(&mut self, state: &RenderState<'_>, view: &FrameView);
    /// Called when there is nothing to draw yet (no snapshot received).
    fn draw_idle(&mut self, _view: &FrameView) {}
    fn on_event(&mut self, _event: &ClientEvent) {}
    fn end_frame(&mut self) {}
}

/// A no-op renderer useful for headless tests.
#[derive(Default)]
pub struct NullRenderer;

impl RenderBackend for NullRenderer {
    fn draw(&mut self, _state: &RenderState<'_>, _view: &FrameView) {}
}
