use palaver::application::orchestrator::CallOrchestrator;
use palaver::config::Config;
use palaver::domain::call::transfer::TransferMode;
use palaver::infrastructure::media::NullMediaRouter;
use palaver::infrastructure::signaling::loopback::LoopbackSignalingClient;
use palaver::interface::handle::OrchestratorHandle;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting Palaver Call Orchestrator");

    // Load configuration
    let mut config = Config::default();
    config.caller.default_caller_id = Some("+15550000000".to_string());
    info!("Configuration loaded: {:?}", config);

    // Wire the loopback signaling client; a real deployment plugs in a
    // network-backed adapter here.
    let (signaling, leg_events, offers) = LoopbackSignalingClient::new(
        Duration::from_millis(200),
        Duration::from_millis(400),
    );
    let media = Arc::new(NullMediaRouter);
    let handle = CallOrchestrator::spawn(
        config,
        signaling.clone(),
        media,
        leg_events,
        offers,
    );

    // Demo: walk a full call lifecycle against the loopback adapter
    demo_call_lifecycle(&handle).await?;

    info!("Palaver Call Orchestrator demo finished");
    Ok(())
}

/// Scripted lifecycle: dial out, mute, hold, add a participant, blind
/// transfer, end, then print the session log.
async fn demo_call_lifecycle(handle: &OrchestratorHandle) -> anyhow::Result<()> {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                info!("status: {}", json);
            }
        }
    });

    let leg = handle.initiate_call("+15551234567", None).await?;
    info!("Demo call initiated on leg {}", leg);

    // Give the simulated far end time to ring and answer.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let snapshot = handle.snapshot().await?;
    info!("Demo call status: {:?}", snapshot.status);

    let muted = handle.toggle_mute().await?;
    info!("Demo mute confirmed: {}", muted);
    let unmuted = handle.toggle_mute().await?;
    info!("Demo unmute confirmed: {}", unmuted);

    let held = handle.toggle_hold().await?;
    info!("Demo hold confirmed: {}", held);
    let resumed = handle.toggle_hold().await?;
    info!("Demo resume confirmed: {}", resumed);

    handle.send_dtmf('5').await?;

    let participant = handle.add_participant("+15557654321").await?;
    info!("Demo participant connected on leg {}", participant);
    let snapshot = handle.snapshot().await?;
    info!(
        "Demo conference: {:?} with {} participant(s)",
        snapshot.status,
        snapshot.participants.len()
    );

    let new_primary = handle
        .transfer_call("+15559990000", TransferMode::Blind)
        .await?;
    info!("Demo blind transfer completed, new primary {}", new_primary);

    handle.end_call().await?;
    info!("Demo call ended");

    for entry in handle.session_log().await? {
        info!("Session log: {}", serde_json::to_string(&entry)?);
    }

    Ok(())
}
