//! External player selection
//!
//! Decoding is delegated to whatever players are installed. Discovery runs
//! once at construction; a missing player surfaces as `PlaybackToolMissing`
//! with an install hint when a file actually needs it.

use colored::*;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::ShowError;
use crate::media::{MediaFile, MediaKind};

/// Every player binary the launcher knows about
pub const KNOWN_TOOLS: [&str; 5] = ["mpv", "ffplay", "aplay", "mpg123", "aplaymidi"];

/// General audio players, most preferred first
const GENERAL_AUDIO_PLAYERS: [&str; 2] = ["mpv", "ffplay"];

/// Builds the command that plays a file. Swapped for fakes in tests.
pub trait PlayerLauncher: Send + Sync {
    fn command(&self, media: &MediaFile, midi_out_port: &str) -> Result<Command, ShowError>;
}

/// Resolved player binaries
#[derive(Debug, Clone, Default)]
pub struct Tooling {
    found: BTreeMap<&'static str, PathBuf>,
}

impl Tooling {
    /// Search `PATH` for every known player
    pub fn detect() -> Self {
        let found = KNOWN_TOOLS
            .iter()
            .filter_map(|tool| which::which(tool).ok().map(|path| (*tool, path)))
            .collect();
        Self { found }
    }

    /// Tooling with an explicit set of binaries
    pub fn with_tools<I>(tools: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, PathBuf)>,
    {
        Self {
            found: tools.into_iter().collect(),
        }
    }

    pub fn find(&self, tool: &str) -> Option<&Path> {
        self.found.get(tool).map(PathBuf::as_path)
    }

    /// Log one "ok"/"missing" line per known tool
    pub fn log_summary(&self) {
        info!("Player tooling:");
        for tool in KNOWN_TOOLS {
            match self.find(tool) {
                Some(path) => info!("  {:<10} ok ({})", tool, path.display()),
                None => info!("  {:<10} missing", tool),
            }
        }
        if GENERAL_AUDIO_PLAYERS.iter().all(|t| self.find(t).is_none()) {
            warn!("No general audio player found; wav needs aplay and mp3 needs mpg123");
        }
    }

    /// Colored table for `--check-tools`
    pub fn print_summary(&self) {
        println!("\n{}", "=== Player Tooling ===".bold().cyan());
        for tool in KNOWN_TOOLS {
            match self.find(tool) {
                Some(path) => println!(
                    "  {:<10} {} {}",
                    tool,
                    "ok".green(),
                    path.display().to_string().dimmed()
                ),
                None => println!("  {:<10} {}", tool, "missing".red()),
            }
        }
        println!();
    }
}

/// A chosen program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerPlan {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl PlayerPlan {
    fn new(program: &Path, flags: &[&str], file: &Path) -> Self {
        let mut args: Vec<OsString> = flags.iter().map(OsString::from).collect();
        args.push(file.as_os_str().to_owned());
        Self {
            program: program.to_path_buf(),
            args,
        }
    }

    pub fn into_command(self) -> Command {
        let mut command = Command::new(self.program);
        command.args(self.args);
        command
    }
}

/// Launcher backed by the players found on this machine
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    tooling: Tooling,
}

impl SystemLauncher {
    pub fn new(tooling: Tooling) -> Self {
        Self { tooling }
    }

    pub fn tooling(&self) -> &Tooling {
        &self.tooling
    }

    /// Pick the player for a file
    ///
    /// MIDI goes to `aplaymidi` on the output port. Audio prefers a general
    /// player and otherwise falls back by extension.
    pub fn plan(&self, media: &MediaFile, midi_out_port: &str) -> Result<PlayerPlan, ShowError> {
        let file = media.path();
        match media.kind {
            MediaKind::Midi => {
                let program = self.require("aplaymidi", "install alsa-utils")?;
                Ok(PlayerPlan::new(program, &["-p", midi_out_port], file))
            }
            MediaKind::Audio => {
                if let Some(program) = self.tooling.find("mpv") {
                    return Ok(PlayerPlan::new(program, &["--no-video", "--really-quiet"], file));
                }
                if let Some(program) = self.tooling.find("ffplay") {
                    return Ok(PlayerPlan::new(
                        program,
                        &["-nodisp", "-autoexit", "-loglevel", "quiet"],
                        file,
                    ));
                }
                match media.ext.as_str() {
                    "wav" => {
                        let program = self.require("aplay", "install alsa-utils or mpv")?;
                        Ok(PlayerPlan::new(program, &["-q"], file))
                    }
                    "mp3" => {
                        let program = self.require("mpg123", "install mpg123 or mpv")?;
                        Ok(PlayerPlan::new(program, &["-q"], file))
                    }
                    _ => Err(ShowError::PlaybackToolMissing {
                        tool: "mpv".to_string(),
                        hint: format!("install mpv or ffmpeg to play .{} files", media.ext),
                    }),
                }
            }
        }
    }

    fn require(&self, tool: &str, hint: &str) -> Result<&Path, ShowError> {
        self.tooling
            .find(tool)
            .ok_or_else(|| ShowError::PlaybackToolMissing {
                tool: tool.to_string(),
                hint: hint.to_string(),
            })
    }
}

impl PlayerLauncher for SystemLauncher {
    fn command(&self, media: &MediaFile, midi_out_port: &str) -> Result<Command, ShowError> {
        self.plan(media, midi_out_port).map(PlayerPlan::into_command)
    }
}
