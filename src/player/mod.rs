//! Playback supervisor: owns the single active player process
//!
//! One slot guarded by one async mutex. `start`, `stop` and the exit path of
//! each watcher all take that lock, so a new playback can only begin after the
//! previous process is reaped and its watcher has finished.

pub mod launcher;

pub use launcher::{PlayerLauncher, SystemLauncher, Tooling};

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ShowError;
use crate::media::{MediaFile, NowPlaying};
use crate::state::StatePublisher;

/// Grace period between SIGTERM and SIGKILL
pub const STOP_GRACE: Duration = Duration::from_secs(2);

/// Runs once when a playback ends on its own. Never runs after an explicit stop.
pub type ExitCallback = Box<dyn FnOnce() + Send + 'static>;

struct ActivePlayback {
    id: u64,
    pid: Option<u32>,
    media: MediaFile,
    stop_tx: oneshot::Sender<()>,
    watcher: JoinHandle<()>,
}

struct Inner {
    launcher: Arc<dyn PlayerLauncher>,
    publisher: StatePublisher,
    slot: Mutex<Option<ActivePlayback>>,
    next_id: AtomicU64,
}

/// Handle to the supervisor. Clones share the same slot.
#[derive(Clone)]
pub struct PlaybackSupervisor {
    inner: Arc<Inner>,
}

impl PlaybackSupervisor {
    pub fn new(launcher: Arc<dyn PlayerLauncher>, publisher: StatePublisher) -> Self {
        Self {
            inner: Arc::new(Inner {
                launcher,
                publisher,
                slot: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Stop whatever is playing, then launch a player for `media`.
    ///
    /// Returns once the process is spawned and the playing state is published;
    /// the clip itself plays in the background.
    pub async fn start(
        &self,
        media: &MediaFile,
        is_jukebox: bool,
        midi_out_port: &str,
        on_exit: ExitCallback,
    ) -> Result<(), ShowError> {
        let mut slot = self.inner.slot.lock().await;
        Self::stop_locked(&self.inner, &mut slot).await;

        match self.spawn_player(media, midi_out_port) {
            Ok(child) => {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                let pid = child.id();
                info!("▶️  Playing {} (pid {:?})", media.name(), pid);

                self.inner
                    .publisher
                    .publish_playback(Some(NowPlaying::new(media, is_jukebox)))
                    .await;

                let (stop_tx, stop_rx) = oneshot::channel();
                let watcher = tokio::spawn(watch(self.inner.clone(), id, child, stop_rx, on_exit));
                *slot = Some(ActivePlayback {
                    id,
                    pid,
                    media: media.clone(),
                    stop_tx,
                    watcher,
                });
                Ok(())
            }
            Err(e) => {
                self.inner.publisher.publish_playback(None).await;
                Err(e)
            }
        }
    }

    /// Stop the active playback, if any.
    ///
    /// Safe to call repeatedly and from several tasks at once. When this
    /// returns, the old process has exited and its watcher has finished.
    pub async fn stop(&self) {
        let mut slot = self.inner.slot.lock().await;
        Self::stop_locked(&self.inner, &mut slot).await;
    }

    pub async fn is_active(&self) -> bool {
        self.inner.slot.lock().await.is_some()
    }

    /// Process id of the active player
    pub async fn active_pid(&self) -> Option<u32> {
        self.inner.slot.lock().await.as_ref().and_then(|a| a.pid)
    }

    /// File currently playing
    pub async fn active_media(&self) -> Option<MediaFile> {
        self.inner
            .slot
            .lock()
            .await
            .as_ref()
            .map(|a| a.media.clone())
    }

    fn spawn_player(&self, media: &MediaFile, midi_out_port: &str) -> Result<Child, ShowError> {
        if !media.path().is_file() {
            return Err(ShowError::FileNotFound(media.path.clone()));
        }

        let mut command = self.inner.launcher.command(media, midi_out_port)?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let program = command.as_std().get_program().to_string_lossy().into_owned();
        debug!("Starting player: {:?}", command.as_std());
        command
            .spawn()
            .map_err(|source| ShowError::Spawn { program, source })
    }

    async fn stop_locked(inner: &Inner, slot: &mut Option<ActivePlayback>) {
        let Some(active) = slot.take() else {
            return;
        };

        info!("⏹️  Stopping {} (pid {:?})", active.media.name(), active.pid);
        // Err means the watcher already finished
        let _ = active.stop_tx.send(());
        if let Err(e) = active.watcher.await {
            warn!("Playback watcher for {} failed: {}", active.media.name(), e);
        }

        inner.publisher.publish_playback(None).await;
    }
}

/// Wait for the player to exit or for a stop request
async fn watch(
    inner: Arc<Inner>,
    id: u64,
    mut child: Child,
    mut stop_rx: oneshot::Receiver<()>,
    on_exit: ExitCallback,
) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => debug!("Player exited: {}", status),
            Err(e) => warn!("Error waiting for player: {}", e),
        },
        _ = &mut stop_rx => {
            terminate(&mut child).await;
            return;
        }
    }

    // A stop that arrives while we wait for the lock owns the cleanup
    let mut slot = tokio::select! {
        guard = inner.slot.lock() => guard,
        _ = &mut stop_rx => return,
    };

    if slot.as_ref().map(|active| active.id) != Some(id) {
        return;
    }
    if let Some(active) = slot.take() {
        info!("Playback finished: {}", active.media.name());
    }
    inner.publisher.publish_playback(None).await;

    // Runs under the lock so a concurrent start waits for it
    on_exit();
}

/// SIGTERM, bounded wait, then SIGKILL
async fn terminate(child: &mut Child) {
    if request_terminate(child) {
        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Player terminated: {}", status);
                return;
            }
            Ok(Err(e)) => warn!("Error waiting for player: {}", e),
            Err(_) => warn!("Player ignored SIGTERM for {:?}, killing", STOP_GRACE),
        }
    }

    if let Err(e) = child.kill().await {
        debug!("Kill failed (already exited?): {}", e);
    }
}

#[cfg(unix)]
fn request_terminate(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: plain signal delivery to our own child process
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn request_terminate(_child: &Child) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::state::StateSnapshot;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;
    use tokio::process::Command;

    /// Launches `sleep <secs>` whatever the file
    struct SleepLauncher(&'static str);

    impl PlayerLauncher for SleepLauncher {
        fn command(&self, _media: &MediaFile, _port: &str) -> Result<Command, ShowError> {
            let mut command = Command::new("sleep");
            command.arg(self.0);
            Ok(command)
        }
    }

    struct MissingLauncher;

    impl PlayerLauncher for MissingLauncher {
        fn command(&self, _media: &MediaFile, _port: &str) -> Result<Command, ShowError> {
            Err(ShowError::PlaybackToolMissing {
                tool: "aplaymidi".to_string(),
                hint: "install alsa-utils".to_string(),
            })
        }
    }

    struct Fixture {
        dir: TempDir,
        supervisor: PlaybackSupervisor,
        publisher: StatePublisher,
    }

    impl Fixture {
        fn new(launcher: impl PlayerLauncher + 'static) -> Self {
            let dir = TempDir::new().unwrap();
            let config = ConfigStore::new(dir.path().join("config.json"));
            let publisher = StatePublisher::new(dir.path().join("state.json"), config);
            let supervisor = PlaybackSupervisor::new(Arc::new(launcher), publisher.clone());
            Self {
                dir,
                supervisor,
                publisher,
            }
        }

        fn media(&self, name: &str) -> MediaFile {
            let path = self.dir.path().join(name);
            std::fs::write(&path, b"RIFF").unwrap();
            MediaFile::from_path(path).unwrap()
        }

        async fn snapshot(&self) -> StateSnapshot {
            StateSnapshot::load_from_file(self.publisher.path()).await.unwrap()
        }
    }

    fn noop() -> ExitCallback {
        Box::new(|| {})
    }

    fn process_alive(pid: u32) -> bool {
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    #[tokio::test]
    async fn test_start_publishes_playing_and_stop_tears_down() {
        let fx = Fixture::new(SleepLauncher("30"));
        let media = fx.media("07_workcue.wav");

        fx.supervisor.start(&media, false, "14:0", noop()).await.unwrap();
        let pid = fx.supervisor.active_pid().await.unwrap();
        assert!(process_alive(pid));

        let snapshot = fx.snapshot().await;
        assert!(snapshot.playing);
        assert_eq!(snapshot.now_playing.unwrap().name, "07_workcue.wav");

        fx.supervisor.stop().await;
        assert!(!fx.supervisor.is_active().await);
        assert!(!process_alive(pid));
        assert!(!fx.snapshot().await.playing);
    }

    #[tokio::test]
    async fn test_new_start_stops_previous_process() {
        let fx = Fixture::new(SleepLauncher("30"));
        let first = fx.media("01_workcue.wav");
        let second = fx.media("02_workcue.wav");

        fx.supervisor.start(&first, false, "14:0", noop()).await.unwrap();
        let first_pid = fx.supervisor.active_pid().await.unwrap();

        fx.supervisor.start(&second, false, "14:0", noop()).await.unwrap();
        let second_pid = fx.supervisor.active_pid().await.unwrap();

        assert_ne!(first_pid, second_pid);
        assert!(!process_alive(first_pid));
        assert!(process_alive(second_pid));
        assert_eq!(fx.supervisor.active_media().await.unwrap().name(), "02_workcue.wav");

        fx.supervisor.stop().await;
    }

    #[tokio::test]
    async fn test_natural_exit_fires_callback_once() {
        let fx = Fixture::new(SleepLauncher("0"));
        let media = fx.media("song.mp3");
        let calls = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = oneshot::channel();

        let counter = calls.clone();
        let on_exit: ExitCallback = Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = done_tx.send(());
        });
        fx.supervisor.start(&media, true, "14:0", on_exit).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!fx.supervisor.is_active().await);
        assert!(!fx.snapshot().await.playing);

        // Already idle
        fx.supervisor.stop().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_explicit_stop_skips_callback() {
        let fx = Fixture::new(SleepLauncher("30"));
        let media = fx.media("song.mp3");
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let on_exit: ExitCallback = Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        fx.supervisor.start(&media, true, "14:0", on_exit).await.unwrap();
        fx.supervisor.stop().await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_concurrent_safe() {
        let fx = Fixture::new(SleepLauncher("30"));
        let media = fx.media("07_workcue.wav");

        // Nothing active
        fx.supervisor.stop().await;

        fx.supervisor.start(&media, false, "14:0", noop()).await.unwrap();
        let pid = fx.supervisor.active_pid().await.unwrap();

        let a = fx.supervisor.clone();
        let b = fx.supervisor.clone();
        tokio::join!(a.stop(), b.stop());
        fx.supervisor.stop().await;

        assert!(!process_alive(pid));
        assert!(!fx.snapshot().await.playing);
    }

    #[tokio::test]
    async fn test_missing_tool_leaves_state_idle() {
        let fx = Fixture::new(MissingLauncher);
        let media = fx.media("03_workcue.mid");

        let err = fx
            .supervisor
            .start(&media, false, "14:0", noop())
            .await
            .unwrap_err();

        assert!(matches!(err, ShowError::PlaybackToolMissing { .. }));
        assert!(!fx.supervisor.is_active().await);
        assert!(!fx.snapshot().await.playing);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_spawned() {
        let fx = Fixture::new(SleepLauncher("30"));
        let media = MediaFile::from_path(fx.dir.path().join("gone.wav")).unwrap();

        let err = fx
            .supervisor
            .start(&media, false, "14:0", noop())
            .await
            .unwrap_err();

        assert!(matches!(err, ShowError::FileNotFound(_)));
        assert!(!fx.supervisor.is_active().await);
    }
}
