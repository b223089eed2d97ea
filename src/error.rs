//! Error taxonomy for the show controller
//!
//! Each variant maps to one recovery policy: config faults reset to defaults,
//! device faults restart the MIDI session, playback faults abort only the
//! current attempt, and status write faults are logged and dropped.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the control engine
#[derive(Debug, Error)]
pub enum ShowError {
    /// Settings document could not be read or written
    #[error("config error: {0}")]
    Config(String),

    /// No usable MIDI input (none present, or configured port missing)
    #[error("MIDI device error: {message}; available ports: [{}]", .available.join(", "))]
    Device {
        message: String,
        available: Vec<String>,
    },

    /// External player binary needed for this file is not installed
    #[error("required player '{tool}' not found ({hint})")]
    PlaybackToolMissing { tool: String, hint: String },

    /// Requested cue or track is not on disk
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Player binary exists but could not be started
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Non-fatal filesystem failure (status snapshot, control document)
    #[error("{context}: {source}")]
    TransientIo {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ShowError {
    /// Build a device error with the list of ports that were seen
    pub fn device(message: impl Into<String>, available: &[String]) -> Self {
        ShowError::Device {
            message: message.into(),
            available: available.to_vec(),
        }
    }

    /// Wrap an I/O error with a short description of what was attempted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ShowError::TransientIo {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_lists_ports() {
        let err = ShowError::device(
            "configured midi_in_port not found: Launchpad",
            &["Midi Through:0".to_string(), "USB Keys".to_string()],
        );
        let text = err.to_string();
        assert!(text.contains("Launchpad"));
        assert!(text.contains("Midi Through:0, USB Keys"));
    }

    #[test]
    fn test_tool_missing_mentions_hint() {
        let err = ShowError::PlaybackToolMissing {
            tool: "aplaymidi".to_string(),
            hint: "install alsa-utils".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "required player 'aplaymidi' not found (install alsa-utils)"
        );
    }
}
