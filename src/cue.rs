//! Cue selection state machine and cue file lookup
//!
//! Cue files follow the `NN_workcue.<ext>` convention: a zero-padded two digit
//! number (wider numbers are used as-is) and one of the supported extensions.

use std::path::Path;

use crate::media::MediaFile;

/// Suffix between the cue number and the extension
const CUE_SUFFIX: &str = "_workcue";

/// Extensions tried for a cue, highest priority first
const CUE_EXTENSIONS: [&str; 4] = ["wav", "mp3", "mid", "midi"];

/// Selected cue number. Starts unselected; cue numbers are one-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CueSelection {
    current: Option<u32>,
}

impl CueSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<u32> {
        self.current
    }

    /// Select from a zero-based program change. Returns the new cue if the
    /// selection changed.
    pub fn program_change(&mut self, program: u8) -> Option<u32> {
        let cue = cue_for_program(program);
        if self.current == Some(cue) {
            return None;
        }
        self.current = Some(cue);
        Some(cue)
    }

    /// Step back one cue, floored at 1; from unselected go straight to cue 1
    pub fn back(&mut self) -> u32 {
        let cue = match self.current {
            Some(n) => n.saturating_sub(1).max(1),
            None => 1,
        };
        self.current = Some(cue);
        cue
    }
}

/// Map a zero-based program number to a one-based cue
pub fn cue_for_program(program: u8) -> u32 {
    (u32::from(program) + 1).max(1)
}

/// File name stem for a cue, e.g. `07_workcue`
pub fn cue_stem(cue: u32) -> String {
    format!("{:02}{}", cue, CUE_SUFFIX)
}

/// Find the playable file for `cue`, trying extensions in priority order
pub fn resolve_cue_file(cues_dir: &Path, cue: u32) -> Option<MediaFile> {
    let stem = cue_stem(cue);
    CUE_EXTENSIONS
        .iter()
        .find_map(|ext| MediaFile::existing(cues_dir.join(format!("{}.{}", stem, ext))))
}
