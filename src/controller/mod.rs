//! Controller - turns MIDI events and control commands into playback
//!
//! One object owns every piece of mutable show state:
//! - selected cue
//! - jukebox cursor and RNG
//! - debounce memory
//! - the playback supervisor
//!
//! Dependencies (data paths, player launcher) are injected so tests can run
//! real subprocess lifecycles without audio tools.


use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, Mode, ShowConfig};
use crate::control::ControlCommand;
use crate::cue::{cue_stem, resolve_cue_file, CueSelection};
use crate::debounce::TriggerFilter;
use crate::error::ShowError;
use crate::jukebox::JukeboxSelector;
use crate::midi::{InputEvent, NoteAction};
use crate::paths::ShowPaths;
use crate::player::{ExitCallback, PlaybackSupervisor, PlayerLauncher};
use crate::state::StatePublisher;

/// Pause between a jukebox track ending and the next one starting
pub const AUTOPLAY_SETTLE: Duration = Duration::from_millis(100);

pub struct Controller {
    paths: ShowPaths,
    config: ConfigStore,
    publisher: StatePublisher,
    supervisor: PlaybackSupervisor,
    cue: Mutex<CueSelection>,
    jukebox: Mutex<JukeboxSelector>,
    filter: Mutex<TriggerFilter>,
    /// Serializes go/stop/control/autoplay transitions
    transition: tokio::sync::Mutex<()>,
    /// Bumped by every controller-initiated start or stop; a pending
    /// autoplay step only proceeds if nothing happened since it was armed.
    playback_epoch: AtomicU64,
    settle_delay: Duration,
    weak_self: Weak<Controller>,
}

impl Controller {
    pub fn new(paths: ShowPaths, launcher: Arc<dyn PlayerLauncher>) -> Arc<Self> {
        Self::with_parts(paths, launcher, JukeboxSelector::new(), AUTOPLAY_SETTLE)
    }

    /// Construct with an explicit jukebox selector and settle delay
    pub fn with_parts(
        paths: ShowPaths,
        launcher: Arc<dyn PlayerLauncher>,
        jukebox: JukeboxSelector,
        settle_delay: Duration,
    ) -> Arc<Self> {
        let config = ConfigStore::new(&paths.config);
        let publisher = StatePublisher::new(&paths.state, config.clone());
        let supervisor = PlaybackSupervisor::new(launcher, publisher.clone());

        Arc::new_cyclic(|weak_self| Self {
            paths,
            config,
            publisher,
            supervisor,
            cue: Mutex::new(CueSelection::new()),
            jukebox: Mutex::new(jukebox),
            filter: Mutex::new(TriggerFilter::new()),
            transition: tokio::sync::Mutex::new(()),
            playback_epoch: AtomicU64::new(0),
            settle_delay,
            weak_self: weak_self.clone(),
        })
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn publisher(&self) -> &StatePublisher {
        &self.publisher
    }

    pub fn supervisor(&self) -> &PlaybackSupervisor {
        &self.supervisor
    }

    pub fn current_cue(&self) -> Option<u32> {
        self.cue.lock().current()
    }

    pub fn jukebox_cursor(&self) -> usize {
        self.jukebox.lock().cursor()
    }

    /// Stage-safe boot: force cue mode and publish an idle snapshot
    pub async fn prepare_startup(&self) -> ShowConfig {
        let cfg = self.config.force_startup_defaults().await;
        self.publisher.publish_playback(None).await;
        cfg
    }

    /// Dispatch one MIDI event
    pub async fn handle_event(&self, event: InputEvent) {
        match event {
            InputEvent::ProgramChange { program, .. } => {
                let accepted = self
                    .filter
                    .lock()
                    .accept_program_change(program, Instant::now());
                if !accepted {
                    debug!("Debounced program change {}", program);
                    return;
                }

                let changed = self.cue.lock().program_change(program);
                if let Some(cue) = changed {
                    info!("🎯 Cue {:02} selected", cue);
                    self.publisher.publish_cue(Some(cue)).await;
                }
            }
            InputEvent::NoteOn { note, .. } => {
                let Some(action) = NoteAction::from_note(note) else {
                    return;
                };
                if !self.accept_action(action) {
                    debug!("Debounced {}", action);
                    return;
                }

                match action {
                    NoteAction::Go | NoteAction::Fire => self.go().await,
                    NoteAction::Back => self.back().await,
                    NoteAction::Stop => self.stop().await,
                }
            }
            InputEvent::Other => {}
        }
    }

    fn accept_action(&self, action: NoteAction) -> bool {
        let now = Instant::now();
        let mut filter = self.filter.lock();
        if !filter.accept_note_action(action, now) {
            return false;
        }
        match action {
            NoteAction::Go | NoteAction::Fire => filter.accept_go(now),
            NoteAction::Back | NoteAction::Stop => true,
        }
    }

    /// Go/fire: play the selected cue, or the next track in jukebox mode
    pub async fn go(&self) {
        let _transition = self.transition.lock().await;
        let cfg = self.config.load().await;
        match cfg.mode {
            Mode::Jukebox => {
                info!("Jukebox GO");
                let epoch = self.begin_transition();
                self.play_next_track(&cfg, epoch).await;
            }
            Mode::Cues => {
                let Some(cue) = self.current_cue() else {
                    info!("GO ignored (no cue selected)");
                    return;
                };
                info!("GO cue {:02}", cue);
                self.halt().await;
                self.play_cue(cue, &cfg).await;
            }
        }
    }

    /// Back: previous cue, or rewind the jukebox cursor
    pub async fn back(&self) {
        let cfg = self.config.load().await;
        match cfg.mode {
            Mode::Cues => {
                let cue = self.cue.lock().back();
                info!("🎯 Cue {:02} selected", cue);
                self.publisher.publish_cue(Some(cue)).await;
            }
            Mode::Jukebox => {
                let cursor = self.jukebox.lock().rewind();
                info!("Jukebox back: next index {}", cursor);
            }
        }
    }

    /// Stop playback in either mode
    pub async fn stop(&self) {
        let _transition = self.transition.lock().await;
        self.halt().await;
    }

    /// Apply a command from the control channel. Settings are re-read first.
    pub async fn apply_control(&self, cmd: ControlCommand) {
        info!("Control: {}", cmd);
        let _transition = self.transition.lock().await;
        match cmd {
            ControlCommand::ModeCues => self.switch_mode(Mode::Cues).await,
            ControlCommand::ModeJukebox => self.switch_mode(Mode::Jukebox).await,
            ControlCommand::JukeboxStart => {
                let cfg = self.config.set_mode(Mode::Jukebox).await;
                let epoch = self.begin_transition();
                self.play_next_track(&cfg, epoch).await;
            }
            ControlCommand::JukeboxStop => self.halt().await,
            ControlCommand::JukeboxNext => {
                let cfg = self.config.load().await;
                self.halt().await;
                let epoch = self.begin_transition();
                self.play_next_track(&cfg, epoch).await;
            }
            ControlCommand::Unknown(name) => warn!("Unknown control command: {}", name),
        }
    }

    /// Persist the mode, stop playback, keep the selected cue
    async fn switch_mode(&self, mode: Mode) {
        self.config.set_mode(mode).await;
        self.halt().await;
        self.publisher.republish().await;
        info!("Mode is now {}", mode);
    }

    /// Stop playback and let the caller finish the shutdown
    pub async fn shutdown(&self) {
        info!("Stopping playback for shutdown");
        self.stop().await;
    }

    fn begin_transition(&self) -> u64 {
        self.playback_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Stop without taking the transition lock (caller holds it)
    async fn halt(&self) {
        self.begin_transition();
        self.supervisor.stop().await;
    }

    async fn play_cue(&self, cue: u32, cfg: &ShowConfig) {
        let Some(media) = resolve_cue_file(&self.paths.cues_dir, cue) else {
            let missing = ShowError::FileNotFound(self.paths.cues_dir.join(cue_stem(cue)));
            warn!("No file for cue {:02}: {}.(wav|mp3|mid|midi)", cue, missing);
            return;
        };

        let name = media.name();
        let on_exit: ExitCallback = Box::new(move || info!("Cue finished: {}", name));
        self.begin_transition();
        if let Err(e) = self
            .supervisor
            .start(&media, false, &cfg.midi_out_port, on_exit)
            .await
        {
            log_playback_error(&e);
        }
    }

    /// Select and start the next jukebox track, arming autoplay on its exit.
    /// `epoch` is the transition that requested it.
    async fn play_next_track(&self, cfg: &ShowConfig, epoch: u64) {
        let track = self.jukebox.lock().next_track(
            &cfg.jukebox,
            &self.paths.songs_dir,
            &self.paths.playlists_dir,
        );

        let Some(media) = track else {
            warn!("No jukebox track available ({} mode)", cfg.jukebox.play_mode);
            self.halt().await;
            self.publisher.republish().await;
            return;
        };

        let on_exit = self.autoplay_callback(epoch);
        info!("🎵 Jukebox: {}", media.name());
        if let Err(e) = self
            .supervisor
            .start(&media, true, &cfg.midi_out_port, on_exit)
            .await
        {
            log_playback_error(&e);
        }
    }

    fn autoplay_callback(&self, epoch: u64) -> ExitCallback {
        let weak = self.weak_self.clone();
        let delay = self.settle_delay;
        Box::new(move || {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(controller) = weak.upgrade() {
                    controller.autoplay_next(epoch).await;
                }
            });
        })
    }

    /// Continue the autoplay loop unless stopped or switched out of jukebox
    fn autoplay_next(self: Arc<Self>, epoch: u64) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let _transition = self.transition.lock().await;
            if self.playback_epoch.load(Ordering::SeqCst) != epoch {
                debug!("Autoplay cancelled by a newer transition");
                return;
            }
            let cfg = self.config.load().await;
            if cfg.mode != Mode::Jukebox {
                info!("Autoplay ended (mode is {})", cfg.mode);
                return;
            }
            let epoch = self.begin_transition();
            self.play_next_track(&cfg, epoch).await;
        })
    }
}

fn log_playback_error(e: &ShowError) {
    match e {
        ShowError::PlaybackToolMissing { .. } | ShowError::Spawn { .. } => error!("{}", e),
        _ => warn!("Playback not started: {}", e),
    }
}
