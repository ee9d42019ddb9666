use super::Context;
use crate::db::KeyValueStore;
use crate::session::Session;
use anyhow::Context as _;
use tracing::info;

pub async fn list_sessions<S: KeyValueStore>(ctx: &Context<S>) -> anyhow::Result<Vec<Session>> {
    let current = ctx.sessions.current_session().await?;
    let sessions = ctx.sessions.list_sessions().await?;

    for session in &sessions {
        let marker = if session.id == current.id { "*" } else { " " };
        println!(
            "{} {}  {}  (created {})",
            marker,
            session.id,
            session.display_name,
            session.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(sessions)
}

pub async fn new_session<S: KeyValueStore>(
    ctx: &Context<S>,
    name: Option<&str>,
) -> anyhow::Result<Session> {
    let session = ctx
        .sessions
        .create_session(name)
        .await
        .context("Failed to create session")?;

    println!("Created session `{}` ({})", session.display_name, session.id);
    Ok(session)
}

pub async fn rename_session<S: KeyValueStore>(
    ctx: &Context<S>,
    id: &str,
    name: &str,
) -> anyhow::Result<Session> {
    let session = ctx
        .sessions
        .rename_session(id, name)
        .await
        .with_context(|| format!("Failed to rename session {}", id))?;

    println!("Renamed session {} to `{}`", session.id, session.display_name);
    Ok(session)
}

pub async fn delete_session<S: KeyValueStore>(ctx: &Context<S>, id: &str) -> anyhow::Result<()> {
    ctx.sessions
        .delete_session(id)
        .await
        .with_context(|| format!("Failed to delete session {}", id))?;

    info!("Session {} deleted with its recordings", id);
    println!("Deleted session {}", id);
    Ok(())
}

pub async fn use_session<S: KeyValueStore>(ctx: &Context<S>, id: &str) -> anyhow::Result<Session> {
    let session = ctx
        .sessions
        .set_current_session(id)
        .await
        .with_context(|| format!("Failed to switch to session {}", id))?;

    println!("Current session is now `{}` ({})", session.display_name, session.id);
    Ok(session)
}
