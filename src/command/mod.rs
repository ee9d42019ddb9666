pub mod recordings;
pub mod replay;
pub mod sessions;

pub use recordings::list_recordings;
pub use replay::replay;
pub use sessions::{delete_session, list_sessions, new_session, rename_session, use_session};

use crate::config::Config;
use crate::db::{KeyValueStore, SqliteStore};
use crate::session::SessionStore;

pub struct Context<S: KeyValueStore = SqliteStore> {
    pub config: Config,
    pub sessions: SessionStore<S>,
}

impl<S: KeyValueStore> Context<S> {
    pub fn new(config: Config, store: S) -> Self {
        let sessions = SessionStore::new(store, config.recordings_dir.clone());
        Self { config, sessions }
    }
}

pub fn format_duration(total_secs: f64) -> String {
    let total_secs = total_secs.max(0.0);
    let whole = total_secs as u64;
    let hours = whole / 3600;
    let minutes = (whole % 3600) / 60;
    let seconds = total_secs - (hours * 3600 + minutes * 60) as f64;

    if hours > 0 {
        format!("{}h {}m {:.0}s", hours, minutes, seconds.floor())
    } else if minutes > 0 {
        format!("{}m {:.0}s", minutes, seconds.floor())
    } else {
        format!("{:.1}s", seconds)
    }
}
