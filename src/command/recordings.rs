use super::{format_duration, Context};
use crate::db::KeyValueStore;
use crate::session::RecordingEntry;

/// List the recordings of `session_id`, or of the current session.
pub async fn list_recordings<S: KeyValueStore>(
    ctx: &Context<S>,
    session_id: Option<&str>,
) -> anyhow::Result<Vec<RecordingEntry>> {
    let session = match session_id {
        Some(id) => ctx
            .sessions
            .get_session(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Session not found: {}", id))?,
        None => ctx.sessions.current_session().await?,
    };

    let recordings = ctx.sessions.list_recordings(&session.id).await?;
    println!("📁 {} ({})", session.display_name, session.id);

    if recordings.is_empty() {
        println!("  No recordings yet.");
    }
    for recording in &recordings {
        match recording.duration_secs {
            Some(secs) => println!(
                "  {}  {}  {} bytes",
                recording.name,
                format_duration(secs),
                recording.size_bytes
            ),
            None => println!(
                "  {}  (unfinalized)  {} bytes",
                recording.name, recording.size_bytes
            ),
        }
    }

    Ok(recordings)
}
