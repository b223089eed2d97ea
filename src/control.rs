//! One-shot command channel (`control.json`)
//!
//! The admin UI drops a `{"cmd": "..."}` document; the watcher claims it by
//! renaming, reads it, and deletes it whether or not it parsed. A command is
//! therefore handled at most once, even across a crash mid-processing.

use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use crate::controller::Controller;
use crate::error::ShowError;

/// Poll period of the watcher
pub const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Commands accepted from the admin UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    ModeCues,
    ModeJukebox,
    JukeboxStart,
    JukeboxStop,
    JukeboxNext,
    /// Well-formed document with an unrecognized name
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct ControlDocument {
    cmd: String,
}

impl ControlCommand {
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "mode_cues" => ControlCommand::ModeCues,
            "mode_jukebox" => ControlCommand::ModeJukebox,
            "jukebox_start" => ControlCommand::JukeboxStart,
            "jukebox_stop" => ControlCommand::JukeboxStop,
            "jukebox_next" => ControlCommand::JukeboxNext,
            other => ControlCommand::Unknown(other.to_string()),
        }
    }

    /// Parse a control document; anything without a string `cmd` is malformed
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let doc: ControlDocument = serde_json::from_str(json)?;
        Ok(Self::from_name(&doc.cmd))
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlCommand::ModeCues => write!(f, "mode_cues"),
            ControlCommand::ModeJukebox => write!(f, "mode_jukebox"),
            ControlCommand::JukeboxStart => write!(f, "jukebox_start"),
            ControlCommand::JukeboxStop => write!(f, "jukebox_stop"),
            ControlCommand::JukeboxNext => write!(f, "jukebox_next"),
            ControlCommand::Unknown(name) => write!(f, "{}", name),
        }
    }
}

/// File-backed command mailbox
#[derive(Debug, Clone)]
pub struct ControlChannel {
    path: PathBuf,
}

impl ControlChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn claimed_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".claimed");
        PathBuf::from(name)
    }

    /// Claim and consume the pending document, if any
    pub async fn take(&self) -> Result<Option<ControlCommand>, ShowError> {
        let claimed = self.claimed_path();
        match fs::rename(&self.path, &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ShowError::io(
                    format!("failed to claim {}", self.path.display()),
                    e,
                ))
            }
        }

        let contents = fs::read_to_string(&claimed).await;
        if let Err(e) = fs::remove_file(&claimed).await {
            warn!("Failed to remove {}: {}", claimed.display(), e);
        }
        let contents = contents
            .map_err(|e| ShowError::io(format!("failed to read {}", claimed.display()), e))?;

        match ControlCommand::parse(&contents) {
            Ok(cmd) => Ok(Some(cmd)),
            Err(e) => {
                warn!("Discarding malformed control document: {}", e);
                Ok(None)
            }
        }
    }
}

/// Poll the channel for the lifetime of the process
pub async fn run_control_watcher(controller: Arc<Controller>, channel: ControlChannel, period: Duration) {
    info!("Watching {} for control commands", channel.path().display());
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match channel.take().await {
            Ok(Some(cmd)) => controller.apply_control(cmd).await,
            Ok(None) => {}
            Err(e) => warn!("Control watcher error: {}", e),
        }
    }
}
