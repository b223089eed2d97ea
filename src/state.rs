//! Status snapshot publication (`state.json`)
//!
//! The snapshot is the single current view of the controller for external
//! pollers. It is overwritten on every transition; there is no history.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{ConfigStore, Mode};
use crate::error::ShowError;
use crate::media::{epoch_seconds, NowPlaying};
use crate::paths::replace_file;

/// Snapshot document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub mode: Mode,
    pub playing: bool,
    pub now_playing: Option<NowPlaying>,
    pub midi_out_port: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub current_cue: Option<u32>,
}

impl StateSnapshot {
    /// Read a snapshot file (used by tooling and tests)
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ShowError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ShowError::io(format!("failed to read {}", path.display()), e))?;

        serde_json::from_str(&json).map_err(|e| {
            ShowError::io(
                format!("failed to parse {}", path.display()),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }
}

/// Fields owned by the controller; mode and port come from the config
#[derive(Debug, Default)]
struct Published {
    now_playing: Option<NowPlaying>,
    current_cue: Option<u32>,
}

/// Writes the snapshot after each transition
///
/// Clones share state, and writes are serialized so the file always matches
/// the most recent transition.
#[derive(Debug, Clone)]
pub struct StatePublisher {
    path: PathBuf,
    config: ConfigStore,
    published: Arc<Mutex<Published>>,
}

impl StatePublisher {
    pub fn new(path: impl Into<PathBuf>, config: ConfigStore) -> Self {
        Self {
            path: path.into(),
            config,
            published: Arc::new(Mutex::new(Published::default())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a playback start (`Some`) or stop (`None`)
    pub async fn publish_playback(&self, now_playing: Option<NowPlaying>) {
        let mut published = self.published.lock().await;
        published.now_playing = now_playing;
        self.write(&published).await;
    }

    /// Record a cue selection change
    pub async fn publish_cue(&self, cue: Option<u32>) {
        let mut published = self.published.lock().await;
        published.current_cue = cue;
        self.write(&published).await;
    }

    /// Rewrite with unchanged fields (picks up mode or port changes)
    pub async fn republish(&self) {
        let published = self.published.lock().await;
        self.write(&published).await;
    }

    /// Whether the last published snapshot said something is playing
    pub async fn is_playing(&self) -> bool {
        self.published.lock().await.now_playing.is_some()
    }

    async fn write(&self, published: &Published) {
        let cfg = self.config.load().await;
        let snapshot = StateSnapshot {
            mode: cfg.mode,
            playing: published.now_playing.is_some(),
            now_playing: published.now_playing.clone(),
            midi_out_port: cfg.midi_out_port,
            timestamp: epoch_seconds(),
            current_cue: published.current_cue,
        };

        if let Err(e) = self.write_snapshot(&snapshot).await {
            warn!("Error writing state: {}", e);
        }
    }

    async fn write_snapshot(&self, snapshot: &StateSnapshot) -> Result<(), ShowError> {
        let json = serde_json::to_string_pretty(snapshot).map_err(|e| {
            ShowError::io(
                "failed to serialize state",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;

        replace_file(&self.path, json.into_bytes())
            .await
            .map_err(|e| ShowError::io(format!("failed to write {}", self.path.display()), e))?;

        debug!(
            "State published: playing={} cue={:?}",
            snapshot.playing, snapshot.current_cue
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaFile;
    use tempfile::TempDir;

    fn publisher_in(dir: &TempDir) -> StatePublisher {
        let config = ConfigStore::new(dir.path().join("config.json"));
        StatePublisher::new(dir.path().join("state.json"), config)
    }

    #[tokio::test]
    async fn test_playback_snapshot_round() {
        let dir = TempDir::new().unwrap();
        let publisher = publisher_in(&dir);
        let media = MediaFile::from_path("/show/cues/07_workcue.wav").unwrap();

        publisher.publish_cue(Some(7)).await;
        publisher
            .publish_playback(Some(NowPlaying::new(&media, false)))
            .await;

        let snapshot = StateSnapshot::load_from_file(publisher.path()).await.unwrap();
        assert!(snapshot.playing);
        assert_eq!(snapshot.current_cue, Some(7));
        assert_eq!(snapshot.mode, Mode::Cues);
        assert_eq!(snapshot.midi_out_port, "14:0");
        assert_eq!(snapshot.now_playing.unwrap().name, "07_workcue.wav");

        publisher.publish_playback(None).await;
        let snapshot = StateSnapshot::load_from_file(publisher.path()).await.unwrap();
        assert!(!snapshot.playing);
        assert!(snapshot.now_playing.is_none());
        assert_eq!(snapshot.current_cue, Some(7));
    }

    #[tokio::test]
    async fn test_snapshot_json_field_names() {
        let dir = TempDir::new().unwrap();
        let publisher = publisher_in(&dir);

        publisher.republish().await;

        let text = std::fs::read_to_string(publisher.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        for key in ["mode", "playing", "now_playing", "midi_out_port", "timestamp", "current_cue"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["mode"], "cues");
        assert!(value["now_playing"].is_null());
    }

    #[tokio::test]
    async fn test_write_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let config = ConfigStore::new(dir.path().join("config.json"));
        let publisher = StatePublisher::new(dir.path().join("missing/dir/state.json"), config);

        // Logged, no panic
        publisher.publish_cue(Some(3)).await;
        assert!(!publisher.path().exists());
    }
}
