//! Prediction and reconciliation for the local player.
//!
//! `predicted` moves immediately from local input; `rendered` is what gets
//! drawn and trails `predicted` through per-frame exponential smoothing.
//! Authoritative positions only intervene when they diverge past the snap
//! threshold, in which case both are hard-set.

use campfire_shared::{
    config::ClientConfig,
    math::{Bounds, Vec2},
    snapshot::PlayerState,
};
use tracing::debug;

/// Outcome of one reconciliation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Rendered position eased toward the prediction.
    Smoothed { divergence: f32 },
    /// Divergence exceeded the threshold; both positions were reset.
    Snapped { divergence: f32 },
}

#[derive(Debug, Clone)]
pub struct PredictionEngine {
    predicted: Vec2,
    rendered: Vec2,
    alive: bool,
    half_extents: Vec2,
    default_half_extents: Vec2,
    bounds: Bounds,
    snap_threshold: f32,
    smoothing: f32,
    max_dt: f32,
}

impl PredictionEngine {
    pub fn new(cfg: &ClientConfig) -> Self {
        Self {
            predicted: Vec2::ZERO,
            rendered: Vec2::ZERO,
            alive: false,
            half_extents: cfg.player_half_extents(),
            default_half_extents: cfg.player_half_extents(),
            bounds: cfg.world_bounds(),
            snap_threshold: cfg.snap_threshold,
            smoothing: cfg.smoothing_factor.clamp(0.0, 1.0),
            max_dt: cfg.max_frame_dt.max(0.0),
        }
    }

    pub fn predicted(&self) -> Vec2 {
        self.predicted
    }

    pub fn rendered(&self) -> Vec2 {
        self.rendered
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Places both positions at `pos`, e.g. on joining a game.
    pub fn seed(&mut self, pos: Vec2) {
        self.predicted = pos;
        self.rendered = pos;
    }

    /// Takes liveness and box size from the latest authoritative entry.
    pub fn observe(&mut self, me: &PlayerState) {
        self.alive = me.is_alive();
        self.half_extents = me.half_extents(self.default_half_extents);
    }

    /// Local player missing from the latest snapshot.
    pub fn observe_absent(&mut self) {
        self.alive = false;
    }

    /// Integrates one frame of local input.
    ///
    /// `dt` is clamped to `[0, max_frame_dt]` and `input` to unit length.
    /// Nothing moves unless the local player is alive.
    pub fn advance(&mut self, dt: f32, input: Vec2, speed: f32) {
        if !self.alive {
            return;
        }
        let dt = if dt.is_finite() { dt.clamp(0.0, self.max_dt) } else { 0.0 };
        let input = if input.is_finite() { input.clamp_unit() } else { Vec2::ZERO };
        let speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };

        let next = self.predicted + input * (speed * dt);
        self.predicted = self.bounds.clamp_center(next, self.half_extents);
    }

    /// Corrects against the same-frame authoritative position.
    pub fn reconcile(&mut self, authoritative: Vec2) -> Reconciliation {
        let divergence = self.predicted.distance(authoritative);
        if divergence > self.snap_threshold {
            debug!(divergence, "Prediction diverged, snapping to server position");
            self.predicted = authoritative;
            self.rendered = authoritative;
            Reconciliation::Snapped { divergence }
        } else {
            self.rendered = self.rendered.lerp(self.predicted, self.smoothing);
            Reconciliation::Smoothed { divergence }
        }
    }
}
