//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p campfire_client -- [--url ws://127.0.0.1:5000/ws] [--config client.json]
//!                                   [--interp-ms 100] [--name Player] [--join <game_id>]
//!
//! Without `--join` the client starts a single-player game. Rendering is
//! headless: frames and events are reported through `tracing`.
//!
//! Console commands:
//!   move <wasd>|stop  - Hold movement keys (e.g. `move wd`)
//!   aim <x> <y>       - Aim at a world position
//!   shoot [<x> <y>]   - Shoot at the aim target
//!   push              - Pushback
//!   say <message>     - Send chat message
//!   status            - Show client status
//!   quit              - Exit client

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use campfire_client::{session, Control, GameClient};
use campfire_shared::{
    config::ClientConfig,
    event::ClientEvent,
    render::{FrameView, RenderBackend, RenderState},
};
use tokio::sync::mpsc;
use tracing::{info, warn};

struct Args {
    cfg: ClientConfig,
    join: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = &args[i + 1];
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            ClientConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        _ => ClientConfig::default(),
    };

    let mut join = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--url" if i + 1 < args.len() => {
                cfg.server_url = args[i + 1].clone();
                i += 2;
            }
            "--interp-ms" if i + 1 < args.len() => {
                cfg.interpolation_buffer_ms =
                    args[i + 1].parse().context("--interp-ms expects a number")?;
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--join" if i + 1 < args.len() => {
                join = Some(args[i + 1].clone());
                i += 2;
            }
            "--config" => i += 2,
            _ => i += 1,
        }
    }
    Ok(Args { cfg, join })
}

/// Reports frames through tracing instead of drawing them.
#[derive(Default)]
struct HeadlessRenderer {
    frames: u64,
}

impl RenderBackend for HeadlessRenderer {
    fn draw(&mut self, state: &RenderState<'_>, view: &FrameView) {
        self.frames += 1;
        if self.frames % 120 == 0 {
            info!(
                status = ?state.status,
                players = state.players.len(),
                enemies = state.enemies.len(),
                bullets = state.bullets.len(),
                score = state.score,
                camera = ?view.camera,
                stale = view.stale,
                "Frame"
            );
        }
    }

    fn draw_idle(&mut self, view: &FrameView) {
        self.frames += 1;
        if self.frames % 120 == 0 {
            info!(link = ?view.link, "Waiting for world state");
        }
    }

    fn on_event(&mut self, event: &ClientEvent) {
        match event {
            ClientEvent::Chat {
                sender_id, message, ..
            } => println!("<{sender_id}> {message}"),
            ClientEvent::ServerError { message } => println!("Server: {message}"),
            ClientEvent::EnemyHit { .. } => {}
            other => info!(event = ?other, "Event"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Args { cfg, join } = parse_args()?;
    info!(
        url = %cfg.server_url,
        name = %cfg.player_name,
        interp_ms = cfg.interpolation_buffer_ms,
        "Starting client"
    );

    let (mut client, inbound) = GameClient::new(cfg);
    match join {
        Some(game_id) => client.join_game(game_id),
        None => client.start_single_player(),
    }

    let (control_tx, control_rx) = mpsc::unbounded_channel::<Control>();

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            match Control::parse_console(&line) {
                Ok(controls) => {
                    for control in controls {
                        if control_tx.send(control).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => println!("Error: {e}"),
            }
        }
    });

    println!("Type 'status' for info, 'quit' to exit.");
    println!();

    let handle = session::spawn(client, inbound, control_rx, HeadlessRenderer::default());
    let client = handle.wait().await?;
    if client.is_finished() {
        info!("Game finished");
    } else {
        warn!("Session ended before the game finished");
    }
    Ok(())
}
