//! Configuration system.
//!
//! Loads client configuration from JSON strings/files. Every knob has a
//! default so a partial document (or `{}`) is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::math::{Bounds, Vec2};

/// Root client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Game server WebSocket endpoint, e.g. `ws://127.0.0.1:8080/ws`.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Render delay behind the server clock, in milliseconds.
    #[serde(default = "default_interpolation_buffer_ms")]
    pub interpolation_buffer_ms: f64,
    /// Predicted/authoritative divergence (world units) above which the local
    /// player snaps instead of smoothing.
    #[serde(default = "default_snap_threshold")]
    pub snap_threshold: f32,
    /// Per-frame lerp factor pulling the rendered position toward the
    /// predicted one.
    #[serde(default = "default_smoothing_factor")]
    pub smoothing_factor: f32,
    /// Period of the outbound movement intent, in milliseconds.
    #[serde(default = "default_input_send_interval_ms")]
    pub input_send_interval_ms: u64,
    /// Local movement speed when the snapshot carries none.
    #[serde(default = "default_prediction_speed")]
    pub prediction_speed: f32,
    /// Delay before the single reconnect attempt after an abnormal close.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Target frame rate of the driving loop.
    #[serde(default = "default_frame_hz")]
    pub frame_hz: u32,
    /// Largest frame delta fed to prediction, in seconds.
    #[serde(default = "default_max_frame_dt")]
    pub max_frame_dt: f32,
    #[serde(default = "default_world_width")]
    pub world_width: f32,
    #[serde(default = "default_world_height")]
    pub world_height: f32,
    /// Local player box size used for bounds clamping when the snapshot
    /// carries none.
    #[serde(default = "default_player_size")]
    pub player_width: f32,
    #[serde(default = "default_player_size")]
    pub player_height: f32,
    /// Display name (client only).
    #[serde(default = "default_player_name")]
    pub player_name: String,
}

fn default_server_url() -> String {
    "ws://127.0.0.1:8080/ws".to_string()
}

fn default_interpolation_buffer_ms() -> f64 {
    100.0
}

fn default_snap_threshold() -> f32 {
    35.0
}

fn default_smoothing_factor() -> f32 {
    0.15
}

fn default_input_send_interval_ms() -> u64 {
    33
}

fn default_prediction_speed() -> f32 {
    150.0
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_frame_hz() -> u32 {
    60
}

fn default_max_frame_dt() -> f32 {
    0.25
}

fn default_world_width() -> f32 {
    800.0
}

fn default_world_height() -> f32 {
    600.0
}

fn default_player_size() -> f32 {
    20.0
}

fn default_player_name() -> String {
    "Player".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            interpolation_buffer_ms: default_interpolation_buffer_ms(),
            snap_threshold: default_snap_threshold(),
            smoothing_factor: default_smoothing_factor(),
            input_send_interval_ms: default_input_send_interval_ms(),
            prediction_speed: default_prediction_speed(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            frame_hz: default_frame_hz(),
            max_frame_dt: default_max_frame_dt(),
            world_width: default_world_width(),
            world_height: default_world_height(),
            player_width: default_player_size(),
            player_height: default_player_size(),
            player_name: default_player_name(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn world_bounds(&self) -> Bounds {
        Bounds::new(self.world_width, self.world_height)
    }

    pub fn player_half_extents(&self) -> Vec2 {
        Vec2::new(self.player_width / 2.0, self.player_height / 2.0)
    }

    pub fn input_send_interval(&self) -> Duration {
        Duration::from_millis(self.input_send_interval_ms.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_hz.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = ClientConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.interpolation_buffer_ms, 100.0);
        assert_eq!(cfg.snap_threshold, 35.0);
        assert_eq!(cfg.input_send_interval(), Duration::from_millis(33));
    }

    #[test]
    fn partial_document_overrides_only_named_knobs() {
        let cfg = ClientConfig::from_json_str(
            r#"{ "server_url": "ws://example:9000/ws", "snap_threshold": 50.0 }"#,
        )
        .unwrap();
        assert_eq!(cfg.server_url, "ws://example:9000/ws");
        assert_eq!(cfg.snap_threshold, 50.0);
        assert_eq!(cfg.smoothing_factor, 0.15);
        assert_eq!(cfg.player_half_extents(), Vec2::new(10.0, 10.0));
    }
}
