//! Settings document persistence
//!
//! The store never fails a load: an absent or corrupt document is replaced
//! with defaults on disk so the admin UI and the controller agree again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{Mode, ShowConfig};
use crate::error::ShowError;
use crate::paths::replace_file;

/// Reads and writes `config.json`
///
/// Cheap to clone; clones share the write lock so read-modify-write cycles
/// from different tasks do not interleave.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current settings, restoring defaults if needed
    pub async fn load(&self) -> ShowConfig {
        match self.try_load().await {
            Ok(Some(cfg)) => cfg,
            Ok(None) => {
                info!("No config at {}, writing defaults", self.path.display());
                self.restore_defaults().await
            }
            Err(e) => {
                warn!("{}; restoring defaults", e);
                self.restore_defaults().await
            }
        }
    }

    /// Persist the whole document
    pub async fn save(&self, cfg: &ShowConfig) -> Result<(), ShowError> {
        let json = cfg
            .to_json()
            .map_err(|e| ShowError::Config(format!("failed to serialize config: {}", e)))?;

        replace_file(&self.path, json.into_bytes())
            .await
            .map_err(|e| {
                ShowError::Config(format!(
                    "failed writing {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }

    /// Load, apply `change`, save. Returns the updated settings even when the
    /// save fails (the failure is logged).
    pub async fn update<F>(&self, change: F) -> ShowConfig
    where
        F: FnOnce(&mut ShowConfig),
    {
        let _guard = self.write_lock.lock().await;
        let mut cfg = self.load().await;
        change(&mut cfg);
        if let Err(e) = self.save(&cfg).await {
            warn!("{}", e);
        }
        cfg
    }

    /// Switch the stored mode
    pub async fn set_mode(&self, mode: Mode) -> ShowConfig {
        self.update(|cfg| cfg.mode = mode).await
    }

    /// Stage-safe boot: the controller always starts in cue mode
    pub async fn force_startup_defaults(&self) -> ShowConfig {
        let _guard = self.write_lock.lock().await;
        let mut cfg = self.load().await;
        if cfg.mode != Mode::Cues {
            info!("Resetting mode from {} to cues for startup", cfg.mode);
            cfg.mode = Mode::Cues;
            if let Err(e) = self.save(&cfg).await {
                warn!("{}", e);
            }
        }
        cfg
    }

    async fn try_load(&self) -> Result<Option<ShowConfig>, ShowError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ShowError::Config(format!(
                    "failed reading {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        ShowConfig::from_json(&contents).map(Some).map_err(|e| {
            ShowError::Config(format!("{} invalid: {}", self.path.display(), e))
        })
    }

    async fn restore_defaults(&self) -> ShowConfig {
        let cfg = ShowConfig::default();
        if let Err(e) = self.save(&cfg).await {
            warn!("{}", e);
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayMode;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("config.json"))
    }

    #[tokio::test]
    async fn test_missing_file_written_with_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let cfg = store.load().await;

        assert_eq!(cfg, ShowConfig::default());
        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(ShowConfig::from_json(&on_disk).unwrap(), cfg);
    }

    #[tokio::test]
    async fn test_corrupt_file_replaced_with_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{\"mode\": \"jukebox\",").unwrap();

        let cfg = store.load().await;

        assert_eq!(cfg.mode, Mode::Cues);
        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        assert!(ShowConfig::from_json(&on_disk).is_ok());
    }

    #[tokio::test]
    async fn test_update_persists_change() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store
            .update(|cfg| cfg.jukebox.play_mode = PlayMode::Playlist)
            .await;

        let reloaded = store.load().await;
        assert_eq!(reloaded.jukebox.play_mode, PlayMode::Playlist);
    }

    #[tokio::test]
    async fn test_startup_forces_cue_mode() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"mode": "jukebox", "midi_out_port": "20:0"}"#,
        )
        .unwrap();

        let cfg = store.force_startup_defaults().await;

        assert_eq!(cfg.mode, Mode::Cues);
        assert_eq!(cfg.midi_out_port, "20:0");
        assert_eq!(store.load().await.mode, Mode::Cues);
    }
}
