//! Jukebox track selection
//!
//! Two policies: `random` picks uniformly among the songs on disk and keeps no
//! state; `playlist` walks the selected playlist with a cycling cursor.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{JukeboxConfig, PlayMode};
use crate::media::MediaFile;

/// Playlist document (`jukebox/playlists/<name>`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Playlist {
    #[serde(default)]
    pub name: String,
    /// Song file names, in play order
    #[serde(default)]
    pub tracks: Vec<String>,
}

impl Playlist {
    /// Load a playlist by name. Missing or unreadable documents are empty.
    pub fn load(playlists_dir: &Path, name: &str) -> Self {
        let empty = || Playlist {
            name: name.to_string(),
            tracks: Vec::new(),
        };

        let Some(file_name) = plain_file_name(name) else {
            warn!("Ignoring playlist with unusable name: {:?}", name);
            return empty();
        };

        let path = playlists_dir.join(file_name);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("Playlist {} unavailable: {}", path.display(), e);
                return empty();
            }
        };

        match serde_json::from_str::<Playlist>(&contents) {
            Ok(playlist) => playlist,
            Err(e) => {
                warn!("Playlist {} invalid: {}", path.display(), e);
                empty()
            }
        }
    }
}

/// Keep only the final path component, so documents cannot point outside
/// their directory.
fn plain_file_name(name: &str) -> Option<PathBuf> {
    Path::new(name.trim())
        .file_name()
        .map(PathBuf::from)
}

/// Supported media in the songs directory, sorted by path
pub fn list_songs(songs_dir: &Path) -> Vec<MediaFile> {
    let entries = match std::fs::read_dir(songs_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Songs directory {} unavailable: {}", songs_dir.display(), e);
            return Vec::new();
        }
    };

    let mut songs: Vec<MediaFile> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(MediaFile::from_path)
        .collect();
    songs.sort_by(|a, b| a.path.cmp(&b.path));
    songs
}

/// Chooses the next jukebox track
#[derive(Debug)]
pub struct JukeboxSelector {
    /// Zero-based position in the current playlist
    cursor: usize,
    rng: StdRng,
}

impl JukeboxSelector {
    pub fn new() -> Self {
        Self {
            cursor: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic shuffle for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            cursor: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Select the next track under the configured policy
    pub fn next_track(
        &mut self,
        cfg: &JukeboxConfig,
        songs_dir: &Path,
        playlists_dir: &Path,
    ) -> Option<MediaFile> {
        match cfg.play_mode {
            PlayMode::Random => self.pick_random(songs_dir),
            PlayMode::Playlist => {
                let playlist = Playlist::load(playlists_dir, &cfg.playlist);
                self.pick_from_playlist(&playlist, songs_dir)
            }
        }
    }

    /// Move the cursor back two positions (floored at 0), so the next pick
    /// replays the track before the one just played.
    pub fn rewind(&mut self) -> usize {
        self.cursor = self.cursor.saturating_sub(2);
        self.cursor
    }

    fn pick_random(&mut self, songs_dir: &Path) -> Option<MediaFile> {
        list_songs(songs_dir).choose(&mut self.rng).cloned()
    }

    /// Return the track at the cursor and advance it.
    ///
    /// The cursor advances even when the named file is missing; that call
    /// yields no track and the next call moves on to the following entry.
    fn pick_from_playlist(&mut self, playlist: &Playlist, songs_dir: &Path) -> Option<MediaFile> {
        if playlist.tracks.is_empty() {
            return None;
        }

        let len = playlist.tracks.len();
        if self.cursor >= len {
            self.cursor = 0;
        }

        let entry = &playlist.tracks[self.cursor];
        self.cursor = (self.cursor + 1) % len;

        let Some(file_name) = plain_file_name(entry) else {
            warn!("Playlist '{}' has an unusable entry: {:?}", playlist.name, entry);
            return None;
        };

        let chosen = MediaFile::existing(songs_dir.join(&file_name));
        if chosen.is_none() {
            warn!(
                "Playlist '{}' track missing or unsupported: {}",
                playlist.name,
                file_name.display()
            );
        }
        chosen
    }
}

impl Default for JukeboxSelector {
    fn default() -> Self {
        Self::new()
    }
}
