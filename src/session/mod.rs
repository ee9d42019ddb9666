//! Catalog of named recording sessions.
//!
//! Each session owns a directory under the recordings root holding its WAV
//! files; the metadata lives in a [`KeyValueStore`]. Exactly one session is
//! current at a time and that pointer survives restarts.

use crate::db::KeyValueStore;
use crate::error::StoreError;
use crate::storage::wav::WavHeader;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SESSION_PREFIX: &str = "session/";
const CURRENT_SESSION_KEY: &str = "current_session";
const RECORDING_EXTENSION: &str = "wav";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub storage_locator: String,
}

impl Session {
    pub fn dir(&self) -> PathBuf {
        PathBuf::from(&self.storage_locator)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingEntry {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// `None` when the header was never finalized.
    pub samples: Option<u64>,
    pub duration_secs: Option<f64>,
}

impl RecordingEntry {
    pub fn is_finalized(&self) -> bool {
        self.samples.is_some()
    }
}

pub struct SessionStore<S: KeyValueStore> {
    store: S,
    root: PathBuf,
}

fn session_key(id: &str) -> String {
    format!("{}{}", SESSION_PREFIX, id)
}

fn validate_name(name: &str) -> Result<String, StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

fn validate_file_stem(name: &str) -> Result<String, StoreError> {
    let trimmed = validate_name(name)?;
    let stem = trimmed
        .strip_suffix(".wav")
        .unwrap_or(&trimmed)
        .to_string();
    if stem.is_empty()
        || stem.starts_with('.')
        || stem.contains(['/', '\\'])
        || stem.contains("..")
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(stem)
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(store: S, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let json = serde_json::to_string(session)?;
        self.store.put(&session_key(&session.id), &json).await
    }

    async fn next_session_id(&self, created_at: DateTime<Utc>) -> Result<String, StoreError> {
        let base = created_at.format("%Y%m%d_%H%M%S_%3f").to_string();
        let mut id = base.clone();
        let mut suffix = 1;
        while self.store.get(&session_key(&id)).await?.is_some() {
            id = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        Ok(id)
    }

    /// Create a session and make it current.
    pub async fn create_session(&self, name: Option<&str>) -> Result<Session, StoreError> {
        let created_at = Utc::now();
        let display_name = match name {
            Some(name) => validate_name(name)?,
            None => created_at.format("Session %Y-%m-%d %H:%M:%S").to_string(),
        };

        let id = self.next_session_id(created_at).await?;
        let dir = self.root.join(&id);
        tokio::fs::create_dir_all(&dir).await?;

        let session = Session {
            id,
            display_name,
            created_at,
            storage_locator: dir.to_string_lossy().into_owned(),
        };
        self.save(&session).await?;
        self.store.put(CURRENT_SESSION_KEY, &session.id).await?;

        info!("Created session {} ({:?})", session.id, session.display_name);
        Ok(session)
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        match self.store.get(&session_key(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn require_session(&self, id: &str) -> Result<Session, StoreError> {
        self.get_session(id)
            .await?
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }

    /// The current session, created on first use or when the previous one
    /// is gone.
    pub async fn current_session(&self) -> Result<Session, StoreError> {
        if let Some(id) = self.store.get(CURRENT_SESSION_KEY).await? {
            if let Some(session) = self.get_session(&id).await? {
                return Ok(session);
            }
            warn!("Current session {} no longer exists", id);
        }
        self.create_session(None).await
    }

    pub async fn set_current_session(&self, id: &str) -> Result<Session, StoreError> {
        let session = self.require_session(id).await?;
        self.store.put(CURRENT_SESSION_KEY, &session.id).await?;
        Ok(session)
    }

    /// Newest first.
    pub async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions = Vec::new();
        for (key, json) in self.store.scan_prefix(SESSION_PREFIX).await? {
            match serde_json::from_str::<Session>(&json) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Skipping unreadable session record {}: {}", key, e),
            }
        }
        sessions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(sessions)
    }

    pub async fn rename_session(&self, id: &str, name: &str) -> Result<Session, StoreError> {
        let mut session = self.require_session(id).await?;
        session.display_name = validate_name(name)?;
        self.save(&session).await?;
        info!("Renamed session {} to {:?}", session.id, session.display_name);
        Ok(session)
    }

    /// Delete a session together with every recording in it.
    pub async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        let session = self.require_session(id).await?;

        match tokio::fs::remove_dir_all(session.dir()).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Session directory {:?} was already gone", session.dir());
            }
            Err(e) => return Err(e.into()),
        }
        self.store.delete(&session_key(id)).await?;

        if self.store.get(CURRENT_SESSION_KEY).await?.as_deref() == Some(id) {
            self.store.delete(CURRENT_SESSION_KEY).await?;
        }

        info!("Deleted session {}", id);
        Ok(())
    }

    /// Move a finalized recording into a session under `name`. A numeric
    /// suffix is added if the name is taken.
    pub async fn add_recording(
        &self,
        id: &str,
        source: &Path,
        name: &str,
    ) -> Result<RecordingEntry, StoreError> {
        let session = self.require_session(id).await?;
        let stem = validate_file_stem(name)?;
        let dir = session.dir();
        tokio::fs::create_dir_all(&dir).await?;

        let mut target = dir.join(format!("{}.{}", stem, RECORDING_EXTENSION));
        let mut suffix = 1;
        while tokio::fs::try_exists(&target).await? {
            target = dir.join(format!("{}_{}.{}", stem, suffix, RECORDING_EXTENSION));
            suffix += 1;
        }

        if let Err(e) = tokio::fs::rename(source, &target).await {
            // Rename fails across filesystems; fall back to copying.
            warn!("Rename of {:?} failed ({}), copying instead", source, e);
            tokio::fs::copy(source, &target).await?;
            tokio::fs::remove_file(source).await?;
        }

        info!("Added {:?} to session {}", target, session.id);
        let path = target.clone();
        tokio::task::spawn_blocking(move || read_entry(&path))
            .await
            .map_err(|e| StoreError::Io(io::Error::other(e)))?
            .map_err(StoreError::from)
    }

    pub async fn list_recordings(&self, id: &str) -> Result<Vec<RecordingEntry>, StoreError> {
        let session = self.require_session(id).await?;
        let dir = session.dir();

        tokio::task::spawn_blocking(move || scan_recordings(&dir))
            .await
            .map_err(|e| StoreError::Io(io::Error::other(e)))?
            .map_err(StoreError::from)
    }

    pub async fn delete_recording(&self, id: &str, name: &str) -> Result<(), StoreError> {
        let session = self.require_session(id).await?;
        let stem = validate_file_stem(name)?;
        let path = session.dir().join(format!("{}.{}", stem, RECORDING_EXTENSION));

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted recording {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::RecordingNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn read_entry(path: &Path) -> io::Result<RecordingEntry> {
    let size_bytes = std::fs::metadata(path)?.len();
    let header = WavHeader::read_from(path).ok();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(RecordingEntry {
        name,
        path: path.to_path_buf(),
        size_bytes,
        samples: header.map(|h| h.samples()),
        duration_secs: header.map(|h| h.duration_secs()),
    })
}

fn scan_recordings(dir: &Path) -> io::Result<Vec<RecordingEntry>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut recordings = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext == RECORDING_EXTENSION)
        {
            recordings.push(read_entry(&path)?);
        }
    }
    recordings.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(recordings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;
    use crate::db::MemoryStore;
    use crate::storage::wav::{save_wav, StreamingWavWriter};

    fn store(root: &Path) -> SessionStore<MemoryStore> {
        SessionStore::new(MemoryStore::new(), root)
    }

    #[tokio::test]
    async fn test_current_session_created_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = store(dir.path());

        let first = sessions.current_session().await.unwrap();
        assert!(first.dir().is_dir());
        assert!(first.display_name.starts_with("Session "));

        let again = sessions.current_session().await.unwrap();
        assert_eq!(first, again);
        assert_eq!(sessions.list_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rename_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = store(dir.path());

        let a = sessions.create_session(Some("  Morning walk ")).await.unwrap();
        let b = sessions.create_session(Some("Evening")).await.unwrap();
        assert_eq!(a.display_name, "Morning walk");
        assert_ne!(a.id, b.id);
        assert_eq!(sessions.current_session().await.unwrap().id, b.id);

        let listed = sessions.list_sessions().await.unwrap();
        assert_eq!(listed.iter().map(|s| s.id.clone()).collect::<Vec<_>>(), vec![b.id.clone(), a.id.clone()]);

        let renamed = sessions.rename_session(&a.id, "Commute").await.unwrap();
        assert_eq!(renamed.display_name, "Commute");
        assert_eq!(sessions.get_session(&a.id).await.unwrap().unwrap().display_name, "Commute");

        assert!(matches!(
            sessions.rename_session(&a.id, "   ").await,
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(
            sessions.rename_session("nope", "x").await,
            Err(StoreError::SessionNotFound(_))
        ));

        sessions.set_current_session(&a.id).await.unwrap();
        assert_eq!(sessions.current_session().await.unwrap().id, a.id);
    }

    #[tokio::test]
    async fn test_deleting_current_session_creates_a_new_one() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = store(dir.path());

        let current = sessions.current_session().await.unwrap();
        let source = dir.path().join("take.wav");
        save_wav(&[1, 2, 3], &source, AudioFormat::DEVICE).unwrap();
        sessions.add_recording(&current.id, &source, "take").await.unwrap();

        sessions.delete_session(&current.id).await.unwrap();
        assert!(!current.dir().exists());
        assert!(sessions.get_session(&current.id).await.unwrap().is_none());

        // Ids are millisecond stamps; make sure the replacement gets a new one.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let replacement = sessions.current_session().await.unwrap();
        assert_ne!(replacement.id, current.id);
        assert!(matches!(
            sessions.delete_session(&current.id).await,
            Err(StoreError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recordings_are_moved_and_listed() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = store(dir.path());
        let session = sessions.create_session(Some("Bench")).await.unwrap();

        let first = dir.path().join("capture_1.wav");
        save_wav(&vec![0; 32000], &first, AudioFormat::DEVICE).unwrap();
        let entry = sessions.add_recording(&session.id, &first, "voice").await.unwrap();
        assert!(!first.exists());
        assert_eq!(entry.name, "voice");
        assert_eq!(entry.samples, Some(32000));
        assert_eq!(entry.duration_secs, Some(1.0));

        let second = dir.path().join("capture_2.wav");
        save_wav(&[5; 10], &second, AudioFormat::DEVICE).unwrap();
        let entry = sessions.add_recording(&session.id, &second, "voice.wav").await.unwrap();
        assert_eq!(entry.name, "voice_1");

        // A capture that was never finalized.
        let mut open = StreamingWavWriter::new(session.dir().join("crashed.wav"), AudioFormat::DEVICE);
        open.open().unwrap();
        open.write_samples(&[1; 4]).unwrap();
        drop(open);

        let listed = sessions.list_recordings(&session.id).await.unwrap();
        let names: Vec<_> = listed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["crashed", "voice", "voice_1"]);
        assert!(!listed[0].is_finalized());
        assert_eq!(listed[0].size_bytes, 44 + 8);
        assert!(listed[1].is_finalized());

        sessions.delete_recording(&session.id, "voice").await.unwrap();
        assert!(matches!(
            sessions.delete_recording(&session.id, "voice").await,
            Err(StoreError::RecordingNotFound(_))
        ));
        assert!(matches!(
            sessions.add_recording(&session.id, &second, "../escape").await,
            Err(StoreError::InvalidName(_))
        ));
        assert_eq!(sessions.list_recordings(&session.id).await.unwrap().len(), 2);
    }
}
