//! Configuration management for ShowBox
//!
//! The settings document is shared with the admin UI, so parsing is
//! deliberately forgiving: missing fields take defaults and a field holding an
//! invalid value falls back to its own default instead of poisoning the whole
//! document.

pub mod store;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

pub use store::ConfigStore;

/// Operating mode of the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Manual cue triggering from the MIDI controller
    #[default]
    Cues,
    /// Background autoplay
    Jukebox,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Cues => write!(f, "cues"),
            Mode::Jukebox => write!(f, "jukebox"),
        }
    }
}

/// Jukebox track selection policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    #[default]
    Random,
    Playlist,
}

impl std::fmt::Display for PlayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayMode::Random => write!(f, "random"),
            PlayMode::Playlist => write!(f, "playlist"),
        }
    }
}

/// Root settings document (`config.json`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ShowConfig {
    #[serde(default, deserialize_with = "lenient")]
    pub mode: Mode,

    /// Input port name; empty means auto-select
    #[serde(default, deserialize_with = "lenient")]
    pub midi_in_port: String,

    /// ALSA port handed to the MIDI file player
    #[serde(
        default = "default_midi_out_port",
        deserialize_with = "lenient_midi_out_port"
    )]
    pub midi_out_port: String,

    #[serde(default, deserialize_with = "lenient")]
    pub jukebox: JukeboxConfig,

    /// Keys written by other tools, preserved on save
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Jukebox sub-configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JukeboxConfig {
    #[serde(default, deserialize_with = "lenient")]
    pub play_mode: PlayMode,

    /// Playlist document name under the playlists directory
    #[serde(default = "default_playlist", deserialize_with = "lenient_playlist")]
    pub playlist: String,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Cues,
            midi_in_port: String::new(),
            midi_out_port: default_midi_out_port(),
            jukebox: JukeboxConfig::default(),
            extra: Map::new(),
        }
    }
}

impl Default for JukeboxConfig {
    fn default() -> Self {
        Self {
            play_mode: PlayMode::Random,
            playlist: default_playlist(),
        }
    }
}

impl ShowConfig {
    /// Parse a settings document
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Serialize as pretty-printed JSON (the format the admin UI writes)
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Accept any JSON for a field, keeping the default when it does not fit `T`
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(from_value_or(value, T::default))
}

fn lenient_midi_out_port<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(from_value_or(value, default_midi_out_port))
}

fn lenient_playlist<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(from_value_or(value, default_playlist))
}

fn from_value_or<T: DeserializeOwned>(value: Value, fallback: impl FnOnce() -> T) -> T {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(v) => v,
        Err(e) => {
            warn!("Invalid config value {} ({}), using default", value, e);
            fallback()
        }
    }
}

// Default value functions
fn default_midi_out_port() -> String { "14:0".to_string() }
fn default_playlist() -> String { "default.json".to_string() }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let cfg = ShowConfig::from_json(r#"{"mode": "jukebox"}"#).unwrap();

        assert_eq!(cfg.mode, Mode::Jukebox);
        assert_eq!(cfg.midi_in_port, "");
        assert_eq!(cfg.midi_out_port, "14:0");
        assert_eq!(cfg.jukebox.play_mode, PlayMode::Random);
        assert_eq!(cfg.jukebox.playlist, "default.json");
    }

    #[test]
    fn test_invalid_field_falls_back_individually() {
        let cfg = ShowConfig::from_json(
            r#"{
                "mode": "cues",
                "midi_out_port": 14,
                "jukebox": {"play_mode": "shuffle", "playlist": "gig.json"}
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.midi_out_port, "14:0");
        assert_eq!(cfg.jukebox.play_mode, PlayMode::Random);
        assert_eq!(cfg.jukebox.playlist, "gig.json");
    }

    #[test]
    fn test_non_object_jukebox_replaced() {
        let cfg = ShowConfig::from_json(r#"{"jukebox": "nope"}"#).unwrap();
        assert_eq!(cfg.jukebox, JukeboxConfig::default());
    }

    #[test]
    fn test_unknown_keys_survive_save() {
        let cfg = ShowConfig::from_json(r#"{"mode": "cues", "ui_theme": "dark"}"#).unwrap();
        let text = cfg.to_json().unwrap();

        assert!(text.contains("\"ui_theme\": \"dark\""));
        assert!(text.contains("\"midi_out_port\": \"14:0\""));
    }

    #[test]
    fn test_not_an_object_is_rejected() {
        assert!(ShowConfig::from_json("[1, 2, 3]").is_err());
        assert!(ShowConfig::from_json("{not json").is_err());
    }
}
