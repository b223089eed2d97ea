//! ShowBox - live show cue controller
//!
//! A MIDI pad controller selects and fires numbered cues (audio or MIDI
//! clips played by external players); a jukebox mode autoplays background
//! music between sets. The admin UI talks to the controller through three
//! JSON documents in the show directory: settings, one-shot commands and a
//! published status snapshot.

pub mod config;
pub mod control;
pub mod controller;
pub mod cue;
pub mod debounce;
pub mod error;
pub mod jukebox;
pub mod media;
pub mod midi;
pub mod paths;
pub mod player;
pub mod state;

pub use controller::Controller;
pub use error::ShowError;
