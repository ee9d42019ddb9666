use super::{format_duration, Context};
use crate::capture::hexdump::{parse_hexdump, PACKET_LABEL};
use crate::capture::{CaptureMode, RecordingController, ReplayTransport};
use crate::db::KeyValueStore;
use crate::session::RecordingEntry;
use anyhow::Context as _;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Run a logged packet capture through the pipeline and file the result in
/// the current session.
///
/// Logged packets were recorded after the device warm-up, so no discard
/// window applies.
pub async fn replay<S: KeyValueStore>(
    ctx: &Context<S>,
    log_path: &Path,
    name: Option<&str>,
    mode: CaptureMode,
) -> anyhow::Result<RecordingEntry> {
    let text = tokio::fs::read_to_string(log_path)
        .await
        .with_context(|| format!("Failed to read {:?}", log_path))?;

    let packets = parse_hexdump(&text, PACKET_LABEL);
    if packets.is_empty() {
        anyhow::bail!("No audio packets found in {:?}", log_path);
    }
    info!("Replaying {} packets from {:?}", packets.len(), log_path);

    let session = ctx.sessions.current_session().await?;

    let mut config = ctx.config.controller_config(mode);
    config.discard_window = Duration::ZERO;
    let mut controller = RecordingController::new(ReplayTransport::default(), config);

    controller.start_stream().await?;
    for packet in &packets {
        controller.handle_notification(packet).await?;
    }
    let stats = controller.stats().borrow().clone();
    let recording = controller
        .stop_stream()
        .await?
        .context("Stream ended before it was stopped")?;

    if stats.sequence_gaps > 0 {
        warn!("{} sequence gap(s) in replayed capture", stats.sequence_gaps);
    }

    let name = match name {
        Some(name) => name.to_string(),
        None => log_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "replay".to_string()),
    };
    let entry = ctx
        .sessions
        .add_recording(&session.id, &recording.path, &name)
        .await
        .with_context(|| {
            format!(
                "Failed to add recording to session, capture left at {}",
                recording.path.display()
            )
        })?;

    println!(
        "🎙️ Replayed {} packets ({} malformed, {} gaps)\n📁 Session: {}\n⏱️ Duration: {}\n💾 {}",
        stats.packets + stats.malformed_packets,
        stats.malformed_packets,
        stats.sequence_gaps,
        session.display_name,
        format_duration(recording.duration.as_secs_f64()),
        entry.path.display()
    );

    Ok(entry)
}
