//! Input handling.
//!
//! The sampler holds raw input (held movement keys, pointer position) and
//! derives intent synchronously on demand. The outbound side runs on its own
//! timer: [`spawn_intent_sender`] publishes the latest intent at a fixed rate
//! regardless of frame rate.

use std::time::Duration;

use bitflags::bitflags;
use campfire_shared::{
    math::Vec2,
    protocol::{ClientMsg, Direction},
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, trace};

use crate::connection::Outbound;

bitflags! {
    /// Held movement keys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MoveKeys: u8 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
    }
}

impl MoveKeys {
    /// Parses WASD-style key letters, e.g. `"wd"`. Unknown letters are ignored.
    pub fn from_letters(s: &str) -> Self {
        s.chars().fold(Self::empty(), |keys, c| {
            keys | match c.to_ascii_lowercase() {
                'w' => Self::UP,
                's' => Self::DOWN,
                'a' => Self::LEFT,
                'd' => Self::RIGHT,
                _ => Self::empty(),
            }
        })
    }
}

/// Local input state.
#[derive(Debug, Clone, Default)]
pub struct InputSampler {
    keys: MoveKeys,
    aim: Option<Vec2>,
}

impl InputSampler {
    pub fn set_keys(&mut self, keys: MoveKeys) {
        self.keys = keys;
    }

    pub fn press(&mut self, keys: MoveKeys) {
        self.keys.insert(keys);
    }

    pub fn release(&mut self, keys: MoveKeys) {
        self.keys.remove(keys);
    }

    pub fn keys(&self) -> MoveKeys {
        self.keys
    }

    /// Current movement intent: unit length or zero.
    pub fn movement_vector(&self) -> Vec2 {
        let axis = |pos: MoveKeys, neg: MoveKeys| {
            f32::from(u8::from(self.keys.contains(pos))) - f32::from(u8::from(self.keys.contains(neg)))
        };
        Vec2::new(axis(MoveKeys::RIGHT, MoveKeys::LEFT), axis(MoveKeys::DOWN, MoveKeys::UP))
            .clamp_unit()
    }

    /// Aims at the world position under the pointer. `camera_origin` is the
    /// world position of the screen's top-left corner.
    pub fn set_pointer(&mut self, screen: Vec2, camera_origin: Vec2) {
        self.aim = Some(camera_origin + screen);
    }

    /// Aims directly at a world position.
    pub fn set_aim(&mut self, world: Vec2) {
        self.aim = Some(world);
    }

    /// Last computed aim target in world space.
    pub fn aim_target(&self) -> Option<Vec2> {
        self.aim
    }
}

/// Turns a sampled intent into the outbound move message.
pub fn build_move(intent: Vec2) -> ClientMsg {
    ClientMsg::PlayerMove {
        direction: Direction::from(intent),
    }
}

/// Decides which intents go on the wire.
///
/// Movement is resent every period while non-zero; a stop is sent once.
#[derive(Debug, Default)]
pub struct IntentDebouncer {
    last_sent: Option<Vec2>,
}

impl IntentDebouncer {
    pub fn next(&mut self, intent: Vec2) -> Option<ClientMsg> {
        if intent == Vec2::ZERO && self.last_sent.is_some_and(|last| last == Vec2::ZERO) {
            return None;
        }
        self.last_sent = Some(intent);
        Some(build_move(intent))
    }

    /// Forgets what was sent, so the next intent goes out even if unchanged.
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

/// Spawns the periodic intent sender.
///
/// `None` on the intent channel means there is no game to move in; nothing
/// is sent then. The task ends when `shutdown` fires or the intent publisher
/// is dropped.
pub fn spawn_intent_sender(
    period: Duration,
    mut intent: watch::Receiver<Option<Vec2>>,
    outbound: Outbound,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut debounce = IntentDebouncer::default();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            if intent.has_changed().is_err() {
                break;
            }
            let Some(current) = *intent.borrow_and_update() else {
                debounce.reset();
                continue;
            };
            if let Some(msg) = debounce.next(current) {
                if !outbound.send(&msg) {
                    // Link is down; make sure the intent is repeated once it is back.
                    debounce.reset();
                    trace!("Intent dropped, link not open");
                }
            }
        }
        debug!("Intent sender stopped");
    })
}
