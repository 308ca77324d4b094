//! `campfire_client`
//!
//! Client-side synchronization core:
//! - [`connection`]: one WebSocket link with a single pending reconnect
//! - [`input`]: key state, aim, and the periodic intent sender
//! - [`prediction`]: local movement prediction and reconciliation
//! - [`interp`]: snapshot window and interpolated render state
//! - [`client`]: the context tying them together
//! - [`session`]: the frame loop driving a [`GameClient`]

pub mod client;
pub mod connection;
pub mod input;
pub mod interp;
pub mod prediction;
pub mod session;

pub use client::{Control, GameClient};
