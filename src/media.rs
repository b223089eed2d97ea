//! Media files and the now-playing descriptor

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Audio extensions handled by an audio player
pub const AUDIO_EXTENSIONS: [&str; 2] = ["wav", "mp3"];

/// Standard MIDI file extensions, sent to the MIDI output port
pub const MIDI_EXTENSIONS: [&str; 2] = ["mid", "midi"];

/// What kind of player a file needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Midi,
}

impl MediaKind {
    /// Classify a lowercase extension (without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        if AUDIO_EXTENSIONS.contains(&ext) {
            Some(MediaKind::Audio)
        } else if MIDI_EXTENSIONS.contains(&ext) {
            Some(MediaKind::Midi)
        } else {
            None
        }
    }
}

/// A playable file. Existence is checked when selected, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    /// Lowercase extension without the dot
    pub ext: String,
    pub kind: MediaKind,
}

impl MediaFile {
    /// Classify a path by extension; `None` for unsupported types
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let ext = path.extension()?.to_str()?.to_lowercase();
        let kind = MediaKind::from_extension(&ext)?;
        Some(Self { path, ext, kind })
    }

    /// Like `from_path`, but only if the file currently exists
    pub fn existing(path: impl Into<PathBuf>) -> Option<Self> {
        Self::from_path(path).filter(|media| media.path.is_file())
    }

    /// File name for display
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Now-playing descriptor published in the state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub name: String,
    pub path: String,
    /// Extension including the leading dot, e.g. ".wav"
    pub ext: String,
    pub is_jukebox: bool,
    /// Seconds since the Unix epoch
    pub start_time: f64,
}

impl NowPlaying {
    pub fn new(media: &MediaFile, is_jukebox: bool) -> Self {
        Self {
            name: media.name(),
            path: media.path.to_string_lossy().into_owned(),
            ext: format!(".{}", media.ext),
            is_jukebox,
            start_time: epoch_seconds(),
        }
    }
}

/// Current wall-clock time as float seconds
pub fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        let wav = MediaFile::from_path("/show/cues/07_workcue.WAV").unwrap();
        assert_eq!(wav.kind, MediaKind::Audio);
        assert_eq!(wav.ext, "wav");

        let midi = MediaFile::from_path("/show/songs/intro.midi").unwrap();
        assert_eq!(midi.kind, MediaKind::Midi);

        assert!(MediaFile::from_path("/show/songs/cover.jpg").is_none());
        assert!(MediaFile::from_path("/show/songs/README").is_none());
    }

    #[test]
    fn test_now_playing_descriptor() {
        let media = MediaFile::from_path("/show/cues/07_workcue.mp3").unwrap();
        let now = NowPlaying::new(&media, false);

        assert_eq!(now.name, "07_workcue.mp3");
        assert_eq!(now.ext, ".mp3");
        assert!(!now.is_jukebox);
        assert!(now.start_time > 1_600_000_000.0);
    }
}
