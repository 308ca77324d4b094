//! Frame loop.
//!
//! One task owns the [`GameClient`] and drives it at `frame_hz`. Each tick
//! applies everything already queued (server messages, link transitions,
//! local controls), then runs the frame and hands the result to the render
//! backend. The intent sender runs beside it and reads the latest intent
//! through a watch channel; outside a game the published intent is `None`.

use std::time::Instant;

use anyhow::Context;
use campfire_shared::{math::Vec2, render::RenderBackend};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{
    client::{wall_clock_ms, Control, GameClient, Phase},
    connection::Inbound,
    input::spawn_intent_sender,
};

/// Running session. Dropping the handle shuts both tasks down at their next
/// wakeup, like [`SessionHandle::stop`] without waiting for them.
pub struct SessionHandle {
    shutdown: watch::Sender<bool>,
    frame_task: JoinHandle<GameClient>,
    intent_task: JoinHandle<()>,
}

/// Starts the frame loop and the intent sender.
pub fn spawn<R>(
    client: GameClient,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    controls: mpsc::UnboundedReceiver<Control>,
    renderer: R,
) -> SessionHandle
where
    R: RenderBackend + 'static,
{
    let (shutdown, shutdown_rx) = watch::channel(false);
    let (intent_tx, intent_rx) = watch::channel(None);

    let intent_task = spawn_intent_sender(
        client.config().input_send_interval(),
        intent_rx,
        client.conn.outbound(),
        shutdown_rx.clone(),
    );
    let frame_task = tokio::spawn(frame_loop(
        client,
        inbound,
        controls,
        renderer,
        intent_tx,
        shutdown_rx,
    ));

    SessionHandle {
        shutdown,
        frame_task,
        intent_task,
    }
}

impl SessionHandle {
    /// True once the frame loop ended on its own (quit or game over).
    pub fn is_finished(&self) -> bool {
        self.frame_task.is_finished()
    }

    /// Stops both tasks and returns the client for inspection.
    pub async fn stop(self) -> anyhow::Result<GameClient> {
        let _ = self.shutdown.send(true);
        self.join().await
    }

    /// Waits for the frame loop to end by itself, then stops the sender.
    pub async fn wait(self) -> anyhow::Result<GameClient> {
        let client = self.frame_task.await.context("frame loop panicked")?;
        let _ = self.shutdown.send(true);
        self.intent_task.await.context("intent sender panicked")?;
        Ok(client)
    }

    async fn join(self) -> anyhow::Result<GameClient> {
        let client = self.frame_task.await.context("frame loop panicked")?;
        self.intent_task.await.context("intent sender panicked")?;
        Ok(client)
    }
}

async fn frame_loop<R: RenderBackend>(
    mut client: GameClient,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    mut controls: mpsc::UnboundedReceiver<Control>,
    mut renderer: R,
    intent: watch::Sender<Option<Vec2>>,
    mut shutdown: watch::Receiver<bool>,
) -> GameClient {
    let mut ticker = time::interval(client.config().frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();
    let mut frames: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;

        // Only what was queued before this point belongs to this frame.
        while let Ok(item) = inbound.try_recv() {
            client.handle_inbound(item, now);
        }
        let mut quit = false;
        while let Ok(control) = controls.try_recv() {
            quit |= !client.apply_control(control);
        }
        // Movement only means something to the server once we are in a game.
        let in_game = client.phase() == Phase::InGame;
        intent.send_replace(in_game.then(|| client.input.movement_vector()));

        for event in client.drain_events() {
            renderer.on_event(&event);
        }

        let view = client.frame_view(now);
        renderer.begin_frame();
        match client.frame(dt, wall_clock_ms()) {
            Some(state) => renderer.draw(&state, &view),
            None => renderer.draw_idle(&view),
        }
        renderer.end_frame();
        frames += 1;

        if quit {
            info!("Quit requested");
            break;
        }
        if client.is_finished() {
            break;
        }
    }

    client.conn.close();
    debug!(frames, "Frame loop stopped");
    client
}
