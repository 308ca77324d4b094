use std::time::Duration;

use campfire_client::{session, GameClient};
use campfire_shared::{config::ClientConfig, event::LinkStatus, render::NullRenderer};
use tokio::sync::mpsc;

/// Smoke test: a session with no server keeps framing and stops cleanly.
#[tokio::test]
async fn session_runs_without_a_server() -> anyhow::Result<()> {
    let (client, inbound) = GameClient::new(ClientConfig {
        server_url: "ws://127.0.0.1:9/ws".into(),
        ..ClientConfig::default()
    });
    let (_controls, controls_rx) = mpsc::unbounded_channel();
    let handle = session::spawn(client, inbound, controls_rx, NullRenderer);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    let client = handle.stop().await?;
    assert!(client.sync.current().is_none());
    assert_eq!(client.conn.link_status(), LinkStatus::Offline);
    Ok(())
}
