//! Authoritative world snapshots.
//!
//! Snapshots arrive as loosely-typed JSON. Parsing is lenient per entity: a
//! player or enemy whose coordinates are missing or non-numeric is skipped,
//! while the rest of the snapshot is kept. Only a missing or non-numeric
//! timestamp rejects the whole snapshot.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{error::SnapshotError, math::Vec2};

/// Server-assigned entity id.
pub type EntityId = String;

/// Entity mapping for one category, ordered by id for stable iteration.
pub type EntityMap<T> = BTreeMap<EntityId, T>;

/// Match lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    Waiting,
    Countdown,
    Active,
    Finished,
}

impl GameStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "countdown" => Some(Self::Countdown),
            "active" => Some(Self::Active),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

/// Player lifecycle within a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    #[default]
    Alive,
    Down,
    Dead,
}

/// Common view over every replicated entity category.
pub trait Replicated {
    fn position(&self) -> Vec2;

    /// Authoritative health, for categories that have one.
    fn health(&self) -> Option<f32> {
        None
    }

    /// Whether the entity is dead and must not be motion-smoothed.
    fn is_dead(&self) -> bool {
        self.health().is_some_and(|h| h <= 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub health: Option<f32>,
    #[serde(default)]
    pub armor: Option<f32>,
    #[serde(default)]
    pub player_status: PlayerStatus,
    /// Current movement speed including boosts.
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default)]
    pub width: Option<f32>,
    #[serde(default)]
    pub height: Option<f32>,
    /// Fields the client carries but does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlayerState {
    pub fn is_alive(&self) -> bool {
        self.player_status == PlayerStatus::Alive && !self.is_dead()
    }

    /// Half extents from the snapshot, falling back to `default`.
    pub fn half_extents(&self, default: Vec2) -> Vec2 {
        Vec2::new(
            self.width.map_or(default.x, |w| w / 2.0),
            self.height.map_or(default.y, |h| h / 2.0),
        )
    }
}

impl Replicated for PlayerState {
    fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    fn health(&self) -> Option<f32> {
        self.health
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyState {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub health: Option<f32>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Server time of the last hit, used to trigger client hit effects.
    #[serde(default)]
    pub last_damage_time: Option<f64>,
    #[serde(default)]
    pub death_timestamp: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Replicated for EnemyState {
    fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    fn health(&self) -> Option<f32> {
        self.health
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletState {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub bullet_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Replicated for BulletState {
    fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerupState {
    pub x: f32,
    pub y: f32,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Replicated for PowerupState {
    fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Floating combat text. Rendered verbatim, never interpolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageText {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_crit: bool,
}

/// Scalar environment fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub is_night: bool,
    pub current_temperature: f32,
    pub is_raining: bool,
    pub is_dust_storm: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            is_night: false,
            current_temperature: 18.0,
            is_raining: false,
            is_dust_storm: false,
        }
    }
}

/// Enemy speech bubble, present only in the snapshot it was spoken in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemySpeech {
    pub speaker_id: EntityId,
    pub text: String,
}

/// Campfire in the middle of the map; heals nearby players at night.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Campfire {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub radius: f32,
    #[serde(default)]
    pub active: bool,
}

/// Top-level keys parsed into typed fields; everything else lands in
/// [`Snapshot::extra`].
const TYPED_KEYS: &[&str] = &[
    "timestamp",
    "status",
    "players",
    "enemies",
    "bullets",
    "powerups",
    "damage_texts",
    "is_night",
    "current_temperature",
    "is_raining",
    "is_dust_storm",
    "score",
    "countdown",
    "enemy_speaker_id",
    "enemy_speech_text",
    "campfire",
];

/// One immutable authoritative world view.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Server clock, seconds.
    pub timestamp: f64,
    pub status: GameStatus,
    pub players: EntityMap<PlayerState>,
    pub enemies: EntityMap<EnemyState>,
    pub bullets: EntityMap<BulletState>,
    pub powerups: EntityMap<PowerupState>,
    pub damage_texts: EntityMap<DamageText>,
    pub environment: Environment,
    pub score: i64,
    /// Seconds left while `status` is `countdown`.
    pub countdown: Option<f32>,
    pub enemy_speech: Option<EnemySpeech>,
    pub campfire: Option<Campfire>,
    /// Remaining top-level fields (`max_players`, `day_night_timer_remaining`, ...).
    pub extra: Map<String, Value>,
}

impl Snapshot {
    /// Empty snapshot at the given server time.
    pub fn empty(timestamp: f64, status: GameStatus) -> Self {
        Self {
            timestamp,
            status,
            players: EntityMap::new(),
            enemies: EntityMap::new(),
            bullets: EntityMap::new(),
            powerups: EntityMap::new(),
            damage_texts: EntityMap::new(),
            environment: Environment::default(),
            score: 0,
            countdown: None,
            enemy_speech: None,
            campfire: None,
            extra: Map::new(),
        }
    }

    /// Server time in milliseconds.
    pub fn server_time_ms(&self) -> f64 {
        self.timestamp * 1000.0
    }

    /// Builds a snapshot from the `state` payload of a server message.
    pub fn from_value(v: &Value) -> Result<Self, SnapshotError> {
        let obj = v.as_object().ok_or(SnapshotError::NotAnObject)?;

        let timestamp = obj
            .get("timestamp")
            .and_then(Value::as_f64)
            .filter(|t| t.is_finite())
            .ok_or(SnapshotError::BadTimestamp)?;

        let status = match obj.get("status").and_then(Value::as_str) {
            Some(s) => GameStatus::parse(s).ok_or_else(|| SnapshotError::UnknownStatus(s.into()))?,
            None => GameStatus::default(),
        };

        let environment = Environment::deserialize(v).unwrap_or_else(|e| {
            warn!(error = %e, "Malformed environment fields, using defaults");
            Environment::default()
        });

        Ok(Self {
            timestamp,
            status,
            players: parse_category(obj, "players"),
            enemies: parse_category(obj, "enemies"),
            bullets: parse_category(obj, "bullets"),
            powerups: parse_category(obj, "powerups"),
            damage_texts: parse_category(obj, "damage_texts"),
            environment,
            score: obj.get("score").and_then(Value::as_i64).unwrap_or(0),
            countdown: obj
                .get("countdown")
                .and_then(Value::as_f64)
                .map(|c| c as f32),
            enemy_speech: parse_speech(obj),
            campfire: obj.get("campfire").and_then(|raw| match Campfire::deserialize(raw) {
                Ok(fire) => Some(fire),
                Err(e) => {
                    // `null` is how the server says there is none.
                    if !raw.is_null() {
                        warn!(error = %e, "Malformed campfire, ignoring");
                    }
                    None
                }
            }),
            extra: obj
                .iter()
                .filter(|(k, _)| !TYPED_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    /// Server-side game parameter carried in [`Snapshot::extra`].
    pub fn max_players(&self) -> Option<u32> {
        self.extra
            .get("max_players")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }
}

fn parse_speech(obj: &Map<String, Value>) -> Option<EnemySpeech> {
    let speaker_id = obj.get("enemy_speaker_id").and_then(Value::as_str)?;
    let text = obj.get("enemy_speech_text").and_then(Value::as_str)?;
    if speaker_id.is_empty() || text.is_empty() {
        return None;
    }
    Some(EnemySpeech {
        speaker_id: speaker_id.to_owned(),
        text: text.to_owned(),
    })
}

fn parse_category<T: DeserializeOwned>(obj: &Map<String, Value>, key: &str) -> EntityMap<T> {
    let Some(entries) = obj.get(key).and_then(Value::as_object) else {
        return EntityMap::new();
    };

    entries
        .iter()
        .filter_map(|(id, raw)| match T::deserialize(raw) {
            Ok(entity) => Some((id.clone(), entity)),
            Err(e) => {
                warn!(category = key, id = %id, error = %e, "Skipping malformed entity");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_state() {
        let v = json!({
            "timestamp": 10.5,
            "status": "active",
            "players": { "p1": { "x": 100, "y": 120.5, "health": 80, "player_status": "alive", "kills": 3 } },
            "enemies": { "e1": { "x": 5, "y": 6, "health": 0, "type": "shooter" } },
            "bullets": { "b1": { "x": 1, "y": 2, "owner_id": "p1" } },
            "powerups": { "u1": { "x": 7, "y": 8, "type": "armor" } },
            "damage_texts": { "d1": { "x": 3, "y": 4, "text": "12", "is_crit": true } },
            "is_night": true,
            "is_raining": true,
            "score": 250,
        });
        let snap = Snapshot::from_value(&v).unwrap();
        assert_eq!(snap.timestamp, 10.5);
        assert_eq!(snap.server_time_ms(), 10_500.0);
        assert_eq!(snap.status, GameStatus::Active);
        let p1 = &snap.players["p1"];
        assert_eq!(p1.position(), Vec2::new(100.0, 120.5));
        assert!(p1.is_alive());
        assert_eq!(p1.extra["kills"], json!(3));
        assert!(snap.enemies["e1"].is_dead());
        assert_eq!(snap.enemies["e1"].kind.as_deref(), Some("shooter"));
        assert_eq!(snap.bullets["b1"].owner_id.as_deref(), Some("p1"));
        assert!(snap.damage_texts["d1"].is_crit);
        assert!(snap.environment.is_night);
        assert!(snap.environment.is_raining);
        assert_eq!(snap.environment.current_temperature, 18.0);
        assert_eq!(snap.score, 250);
    }

    #[test]
    fn rejects_missing_or_non_numeric_timestamp() {
        assert_eq!(
            Snapshot::from_value(&json!({ "status": "active" })),
            Err(SnapshotError::BadTimestamp)
        );
        assert_eq!(
            Snapshot::from_value(&json!({ "timestamp": "soon" })),
            Err(SnapshotError::BadTimestamp)
        );
        assert_eq!(Snapshot::from_value(&json!([1, 2])), Err(SnapshotError::NotAnObject));
    }

    #[test]
    fn rejects_unknown_status() {
        assert_eq!(
            Snapshot::from_value(&json!({ "timestamp": 1.0, "status": "paused" })),
            Err(SnapshotError::UnknownStatus("paused".into()))
        );
    }

    #[test]
    fn skips_entities_with_bad_coordinates_only() {
        let v = json!({
            "timestamp": 1.0,
            "players": {
                "good": { "x": 1, "y": 2 },
                "bad": { "x": "left", "y": 2 },
                "missing": { "y": 2 },
            },
        });
        let snap = Snapshot::from_value(&v).unwrap();
        assert_eq!(snap.players.len(), 1);
        assert!(snap.players.contains_key("good"));
    }

    #[test]
    fn keeps_speech_campfire_and_other_fields() {
        let v = json!({
            "timestamp": 2.0,
            "status": "active",
            "enemy_speaker_id": "e7",
            "enemy_speech_text": "Hey",
            "campfire": { "x": 400, "y": 300, "radius": 75, "active": true },
            "max_players": 2,
            "day_night_timer_remaining": 12.5,
            "host_id": "p1",
        });
        let snap = Snapshot::from_value(&v).unwrap();
        assert_eq!(
            snap.enemy_speech,
            Some(EnemySpeech {
                speaker_id: "e7".into(),
                text: "Hey".into()
            })
        );
        let fire = snap.campfire.unwrap();
        assert_eq!((fire.x, fire.y, fire.radius), (400.0, 300.0, 75.0));
        assert!(fire.active);
        assert_eq!(snap.max_players(), Some(2));
        assert_eq!(snap.extra["day_night_timer_remaining"], json!(12.5));
        assert_eq!(snap.extra["host_id"], json!("p1"));
        assert!(!snap.extra.contains_key("timestamp"));
        assert!(!snap.extra.contains_key("campfire"));
    }

    #[test]
    fn silent_enemy_has_no_speech() {
        let v = json!({
            "timestamp": 2.0,
            "enemy_speaker_id": null,
            "enemy_speech_text": "",
            "campfire": null,
        });
        let snap = Snapshot::from_value(&v).unwrap();
        assert!(snap.enemy_speech.is_none());
        assert!(snap.campfire.is_none());
    }

    #[test]
    fn down_player_is_not_alive() {
        let v = json!({
            "timestamp": 1.0,
            "players": { "p": { "x": 1, "y": 2, "health": 0, "player_status": "down" } },
        });
        let snap = Snapshot::from_value(&v).unwrap();
        assert!(!snap.players["p"].is_alive());
    }
}
