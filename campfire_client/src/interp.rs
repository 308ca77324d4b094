//! Interpolation.
//!
//! The server pushes discrete snapshots; the client renders at its own rate.
//! [`StateSynchronizer`] keeps a two-snapshot window and, for any render
//! time, blends remote entities between the two endpoints. Rendering runs
//! `interpolation_buffer_ms` in the past so there is usually a newer snapshot
//! to blend towards.
//!
//! Snapshots are accepted in arrival order. A snapshot that is not newer
//! than the held one still replaces it; the window then has no usable time
//! span and the current snapshot is rendered as-is.

use std::time::{Duration, Instant};

use campfire_shared::{
    math::{clamp01, Vec2},
    render::{RenderEntity, RenderState},
    snapshot::{EntityMap, Replicated, Snapshot},
};
use tracing::{debug, warn};

/// Local player substitution applied after interpolation.
#[derive(Debug, Clone, Copy)]
pub struct LocalOverride<'a> {
    pub player_id: &'a str,
    pub rendered_position: Vec2,
}

/// Two-snapshot window plus render-state derivation.
#[derive(Debug)]
pub struct StateSynchronizer {
    previous: Option<Snapshot>,
    current: Option<Snapshot>,
    interpolation_buffer_ms: f64,
    last_received: Option<Instant>,
    ingested: u64,
}

impl StateSynchronizer {
    pub fn new(interpolation_buffer_ms: f64) -> Self {
        Self {
            previous: None,
            current: None,
            interpolation_buffer_ms: interpolation_buffer_ms.max(0.0),
            last_received: None,
            ingested: 0,
        }
    }

    /// Shifts `current` to `previous` and stores `snap` as `current`.
    ///
    /// Returns false (and leaves the window untouched) when the timestamp is
    /// not a finite number.
    pub fn ingest_snapshot(&mut self, snap: Snapshot, received_at: Instant) -> bool {
        if !snap.timestamp.is_finite() {
            warn!(timestamp = snap.timestamp, "Dropping snapshot with invalid timestamp");
            return false;
        }

        if let Some(cur) = &self.current {
            if snap.timestamp <= cur.timestamp {
                debug!(
                    incoming = snap.timestamp,
                    held = cur.timestamp,
                    "Snapshot not newer than current, accepting in arrival order"
                );
            }
        }

        self.previous = self.current.replace(snap);
        self.last_received = Some(received_at);
        self.ingested += 1;
        true
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&Snapshot> {
        self.previous.as_ref()
    }

    /// Number of snapshots accepted so far.
    pub fn ingested(&self) -> u64 {
        self.ingested
    }

    pub fn last_received(&self) -> Option<Instant> {
        self.last_received
    }

    /// True when nothing arrived for longer than `threshold`.
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        match self.last_received {
            Some(at) => now.saturating_duration_since(at) > threshold,
            None => false,
        }
    }

    /// Drops both snapshots, e.g. when leaving a game.
    pub fn reset(&mut self) {
        self.previous = None;
        self.current = None;
        self.last_received = None;
    }

    /// Interpolation factor for a render time, or `None` when the window has
    /// no positive time span.
    pub fn interpolation_factor(&self, render_wall_clock_ms: f64) -> Option<f32> {
        let cur = self.current.as_ref()?;
        let prev = self.previous.as_ref()?;
        if cur.timestamp <= prev.timestamp {
            return None;
        }

        let prev_ms = prev.server_time_ms();
        let span = cur.server_time_ms() - prev_ms;
        if span <= 0.0 {
            return None;
        }

        let target = render_wall_clock_ms - self.interpolation_buffer_ms;
        Some(clamp01((target - prev_ms) / span) as f32)
    }

    /// Builds the render state for `render_wall_clock_ms` (epoch millis).
    ///
    /// Positions of entities present in both snapshots are blended; new
    /// entities snap in and dead ones stay at their current position. The
    /// local player, if any, is always placed at its rendered position.
    pub fn compute_render_state(
        &self,
        render_wall_clock_ms: f64,
        local: Option<LocalOverride<'_>>,
    ) -> Option<RenderState<'_>> {
        let cur = self.current.as_ref()?;
        let alpha = self.interpolation_factor(render_wall_clock_ms);
        let prev = alpha.and(self.previous.as_ref());

        let mut state = RenderState {
            timestamp: cur.timestamp,
            status: cur.status,
            alpha,
            players: blend(prev.map(|p| &p.players), &cur.players, alpha),
            enemies: blend(prev.map(|p| &p.enemies), &cur.enemies, alpha),
            bullets: blend(prev.map(|p| &p.bullets), &cur.bullets, alpha),
            powerups: blend(prev.map(|p| &p.powerups), &cur.powerups, alpha),
            damage_texts: &cur.damage_texts,
            environment: &cur.environment,
            score: cur.score,
            countdown: cur.countdown,
            enemy_speech: cur.enemy_speech.as_ref(),
            campfire: cur.campfire.as_ref(),
            extra: &cur.extra,
        };

        if let Some(local) = local {
            if let Some(me) = state.players.iter_mut().find(|p| p.id == local.player_id) {
                me.position = local.rendered_position;
            }
        }

        Some(state)
    }
}

fn blend<'a, T: Replicated>(
    prev: Option<&'a EntityMap<T>>,
    cur: &'a EntityMap<T>,
    alpha: Option<f32>,
) -> Vec<RenderEntity<'a, T>> {
    cur.iter()
        .map(|(id, state)| {
            let to = state.position();
            let position = match (prev.and_then(|p| p.get(id)), alpha) {
                (Some(before), Some(t)) if !state.is_dead() => {
                    let from = before.position();
                    if from.is_finite() && to.is_finite() {
                        from.lerp(to, t)
                    } else {
                        to
                    }
                }
                _ => to,
            };
            RenderEntity {
                id,
                position,
                state,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use campfire_shared::snapshot::{Campfire, EnemySpeech, EnemyState, GameStatus, PlayerState};
    use serde_json::Map;

    fn player(x: f32, y: f32) -> PlayerState {
        PlayerState {
            x,
            y,
            health: Some(100.0),
            armor: None,
            player_status: Default::default(),
            speed: None,
            width: None,
            height: None,
            extra: Map::new(),
        }
    }

    fn enemy(x: f32, y: f32, health: f32) -> EnemyState {
        EnemyState {
            x,
            y,
            health: Some(health),
            kind: None,
            last_damage_time: None,
            death_timestamp: None,
            extra: Map::new(),
        }
    }

    fn snap(ts: f64, players: &[(&str, f32, f32)]) -> Snapshot {
        let mut s = Snapshot::empty(ts, GameStatus::Active);
        for (id, x, y) in players {
            s.players.insert(id.to_string(), player(*x, *y));
        }
        s
    }

    /// Window with S1 at t=10s and S2 at t=10.1s, 100 ms buffer.
    fn window(s1: Snapshot, s2: Snapshot) -> StateSynchronizer {
        let mut sync = StateSynchronizer::new(100.0);
        let now = Instant::now();
        assert!(sync.ingest_snapshot(s1, now));
        assert!(sync.ingest_snapshot(s2, now));
        sync
    }

    // Render wall-clock time whose buffered target lands at `server_ms`.
    fn at(server_ms: f64) -> f64 {
        server_ms + 100.0
    }

    #[test]
    fn window_holds_exactly_two_snapshots() {
        let mut sync = StateSynchronizer::new(100.0);
        let now = Instant::now();
        sync.ingest_snapshot(snap(1.0, &[]), now);
        sync.ingest_snapshot(snap(2.0, &[]), now);
        sync.ingest_snapshot(snap(3.0, &[]), now);
        assert_eq!(sync.previous().unwrap().timestamp, 2.0);
        assert_eq!(sync.current().unwrap().timestamp, 3.0);
        assert_eq!(sync.ingested(), 3);
    }

    #[test]
    fn interpolates_strictly_between_endpoints() {
        let sync = window(snap(10.0, &[("r", 0.0, 50.0)]), snap(10.1, &[("r", 10.0, 70.0)]));

        for server_ms in [10_010.0, 10_050.0, 10_090.0] {
            let rs = sync.compute_render_state(at(server_ms), None).unwrap();
            let p = rs.player("r").unwrap().position;
            assert!(p.x > 0.0 && p.x < 10.0, "x {} at {server_ms}", p.x);
            assert!(p.y > 50.0 && p.y < 70.0, "y {} at {server_ms}", p.y);
        }

        let early = sync.compute_render_state(at(10_020.0), None).unwrap();
        let late = sync.compute_render_state(at(10_080.0), None).unwrap();
        assert!(early.player("r").unwrap().position.x < late.player("r").unwrap().position.x);
    }

    #[test]
    fn returns_current_values_once_target_reaches_current() {
        let sync = window(snap(10.0, &[("r", 0.1, 0.7)]), snap(10.1, &[("r", 0.3, 0.9)]));
        for server_ms in [10_100.0, 10_150.0, 99_999.0] {
            let rs = sync.compute_render_state(at(server_ms), None).unwrap();
            assert_eq!(rs.player("r").unwrap().position, Vec2::new(0.3, 0.9));
        }
    }

    #[test]
    fn factor_is_clamped_far_outside_the_window() {
        let sync = window(snap(10.0, &[]), snap(10.1, &[]));
        assert_eq!(sync.interpolation_factor(0.0), Some(0.0));
        assert_eq!(sync.interpolation_factor(-1e12), Some(0.0));
        assert_eq!(sync.interpolation_factor(1e15), Some(1.0));
        let mid = sync.interpolation_factor(at(10_050.0)).unwrap();
        assert!((mid - 0.5).abs() < 1e-3);
    }

    #[test]
    fn equal_timestamps_render_current_without_interpolation() {
        let sync = window(snap(10.0, &[("r", 0.0, 0.0)]), snap(10.0, &[("r", 8.0, 4.0)]));
        assert_eq!(sync.interpolation_factor(at(10_000.0)), None);
        let rs = sync.compute_render_state(at(10_000.0), None).unwrap();
        assert_eq!(rs.alpha, None);
        assert_eq!(rs.player("r").unwrap().position, Vec2::new(8.0, 4.0));
    }

    #[test]
    fn older_snapshot_still_replaces_current() {
        let sync = window(snap(10.0, &[("r", 0.0, 0.0)]), snap(9.5, &[("r", 3.0, 3.0)]));
        assert_eq!(sync.current().unwrap().timestamp, 9.5);
        let rs = sync.compute_render_state(at(9_700.0), None).unwrap();
        assert_eq!(rs.alpha, None);
        assert_eq!(rs.player("r").unwrap().position, Vec2::new(3.0, 3.0));
    }

    #[test]
    fn single_snapshot_renders_as_is() {
        let mut sync = StateSynchronizer::new(100.0);
        assert!(sync.compute_render_state(0.0, None).is_none());
        sync.ingest_snapshot(snap(5.0, &[("r", 1.0, 2.0)]), Instant::now());
        let rs = sync.compute_render_state(at(5_000.0), None).unwrap();
        assert_eq!(rs.player("r").unwrap().position, Vec2::new(1.0, 2.0));
    }

    #[test]
    fn new_entities_snap_in() {
        let sync = window(snap(10.0, &[]), snap(10.1, &[("new", 42.0, 24.0)]));
        let rs = sync.compute_render_state(at(10_050.0), None).unwrap();
        assert_eq!(rs.player("new").unwrap().position, Vec2::new(42.0, 24.0));
    }

    #[test]
    fn dead_enemy_is_not_smoothed() {
        let mut s1 = snap(10.0, &[]);
        s1.enemies.insert("e".into(), enemy(0.0, 0.0, 20.0));
        let mut s2 = snap(10.1, &[]);
        s2.enemies.insert("e".into(), enemy(30.0, 40.0, 0.0));
        let sync = window(s1, s2);

        let rs = sync.compute_render_state(at(10_050.0), None).unwrap();
        assert_eq!(rs.enemy("e").unwrap().position, Vec2::new(30.0, 40.0));
        assert_eq!(rs.enemy("e").unwrap().state.health, Some(0.0));
    }

    #[test]
    fn local_player_always_uses_rendered_position() {
        let sync = window(
            snap(10.0, &[("me", 0.0, 0.0), ("r", 0.0, 0.0)]),
            snap(10.1, &[("me", 10.0, 10.0), ("r", 10.0, 10.0)]),
        );
        let local = LocalOverride {
            player_id: "me",
            rendered_position: Vec2::new(77.0, 88.0),
        };
        let rs = sync.compute_render_state(at(10_050.0), Some(local)).unwrap();
        assert_eq!(rs.player("me").unwrap().position, Vec2::new(77.0, 88.0));
        assert_ne!(rs.player("r").unwrap().position, Vec2::new(77.0, 88.0));

        let mut single = StateSynchronizer::new(100.0);
        single.ingest_snapshot(snap(1.0, &[("me", 1.0, 1.0)]), Instant::now());
        let rs = single.compute_render_state(0.0, Some(local)).unwrap();
        assert_eq!(rs.player("me").unwrap().position, Vec2::new(77.0, 88.0));
    }

    #[test]
    fn non_positional_fields_come_from_current() {
        let mut s1 = snap(10.0, &[("r", 0.0, 0.0)]);
        s1.players.get_mut("r").unwrap().health = Some(90.0);
        s1.environment.is_night = false;
        let mut s2 = snap(10.1, &[("r", 10.0, 0.0)]);
        s2.players.get_mut("r").unwrap().health = Some(40.0);
        s2.environment.is_night = true;
        s2.status = GameStatus::Finished;
        let sync = window(s1, s2);

        let rs = sync.compute_render_state(at(10_050.0), None).unwrap();
        assert_eq!(rs.player("r").unwrap().state.health, Some(40.0));
        assert!(rs.environment.is_night);
        assert_eq!(rs.status, GameStatus::Finished);
    }

    #[test]
    fn transient_events_come_from_current_only() {
        let mut s1 = snap(10.0, &[]);
        s1.enemy_speech = Some(EnemySpeech {
            speaker_id: "e1".into(),
            text: "Old".into(),
        });
        let mut s2 = snap(10.1, &[]);
        s2.enemy_speech = Some(EnemySpeech {
            speaker_id: "e2".into(),
            text: "Hey".into(),
        });
        s2.campfire = Some(Campfire {
            x: 400.0,
            y: 300.0,
            radius: 75.0,
            active: true,
        });
        s2.extra.insert("max_players".into(), serde_json::json!(2));
        let sync = window(s1, s2);

        let rs = sync.compute_render_state(at(10_050.0), None).unwrap();
        let speech = rs.enemy_speech.unwrap();
        assert_eq!((speech.speaker_id.as_str(), speech.text.as_str()), ("e2", "Hey"));
        assert!(rs.campfire.unwrap().active);
        assert_eq!(rs.extra["max_players"], serde_json::json!(2));

        // The next snapshot without speech clears the bubble.
        let mut sync = sync;
        sync.ingest_snapshot(snap(10.2, &[]), Instant::now());
        let rs = sync.compute_render_state(at(10_150.0), None).unwrap();
        assert!(rs.enemy_speech.is_none());
    }

    #[test]
    fn compute_is_idempotent() {
        let sync = window(snap(10.0, &[("r", 0.0, 0.0)]), snap(10.1, &[("r", 10.0, 5.0)]));
        let a = sync.compute_render_state(at(10_033.0), None);
        let b = sync.compute_render_state(at(10_033.0), None);
        assert_eq!(a, b);
    }

    #[test]
    fn staleness_tracks_last_receive() {
        let mut sync = StateSynchronizer::new(100.0);
        let t0 = Instant::now();
        assert!(!sync.is_stale(t0, Duration::from_millis(500)));
        sync.ingest_snapshot(snap(1.0, &[]), t0);
        assert!(!sync.is_stale(t0 + Duration::from_millis(100), Duration::from_millis(500)));
        assert!(sync.is_stale(t0 + Duration::from_secs(1), Duration::from_millis(500)));
    }

    #[test]
    fn non_finite_timestamp_leaves_window_untouched() {
        let mut sync = StateSynchronizer::new(100.0);
        sync.ingest_snapshot(snap(1.0, &[]), Instant::now());
        assert!(!sync.ingest_snapshot(snap(f64::NAN, &[]), Instant::now()));
        assert_eq!(sync.current().unwrap().timestamp, 1.0);
        assert!(sync.previous().is_none());
    }
}
