//! Trigger debouncing
//!
//! Controllers (and apps like OnSong) often send the same message twice in
//! quick succession. These filters drop repeats inside a time window. Callers
//! pass `now` explicitly so the windows can be tested without sleeping.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::midi::NoteAction;

/// Repeat window for identical program changes
pub const PROGRAM_CHANGE_WINDOW: Duration = Duration::from_millis(200);

/// Repeat window per note action
pub const NOTE_ACTION_WINDOW: Duration = Duration::from_millis(250);

/// Shared window for go/fire, guarding a cue mid-stop against re-triggering
pub const GO_WINDOW: Duration = Duration::from_millis(400);

/// Key-only debounce: remembers the last accepted time per key.
#[derive(Debug)]
pub struct DebounceWindow<K> {
    window: Duration,
    last_fire: HashMap<K, Instant>,
}

impl<K: Eq + Hash> DebounceWindow<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fire: HashMap::new(),
        }
    }

    /// Returns true if `key` may fire at `now`, recording the fire.
    ///
    /// Suppressed triggers do not extend the window.
    pub fn accept(&mut self, key: K, now: Instant) -> bool {
        if let Some(last) = self.last_fire.get(&key) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
        }
        self.last_fire.insert(key, now);
        true
    }
}

/// Value-aware debounce: only an identical value inside the window is dropped.
#[derive(Debug)]
pub struct ValueDebounce<V> {
    window: Duration,
    last: Option<(V, Instant)>,
}

impl<V: PartialEq + Copy> ValueDebounce<V> {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn accept(&mut self, value: V, now: Instant) -> bool {
        if let Some((last_value, last_time)) = self.last {
            if last_value == value && now.saturating_duration_since(last_time) < self.window {
                return false;
            }
        }
        self.last = Some((value, now));
        true
    }
}

/// All debounce state for MIDI input. Volatile; reset on restart.
#[derive(Debug)]
pub struct TriggerFilter {
    program_changes: ValueDebounce<u8>,
    note_actions: DebounceWindow<NoteAction>,
    go_guard: DebounceWindow<()>,
}

impl TriggerFilter {
    pub fn new() -> Self {
        Self {
            program_changes: ValueDebounce::new(PROGRAM_CHANGE_WINDOW),
            note_actions: DebounceWindow::new(NOTE_ACTION_WINDOW),
            go_guard: DebounceWindow::new(GO_WINDOW),
        }
    }

    pub fn accept_program_change(&mut self, program: u8, now: Instant) -> bool {
        self.program_changes.accept(program, now)
    }

    pub fn accept_note_action(&mut self, action: NoteAction, now: Instant) -> bool {
        self.note_actions.accept(action, now)
    }

    /// Go and fire share one guard
    pub fn accept_go(&mut self, now: Instant) -> bool {
        self.go_guard.accept((), now)
    }
}

impl Default for TriggerFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_repeat_inside_window_dropped() {
        let mut window = DebounceWindow::new(ms(250));
        let t0 = Instant::now();

        assert!(window.accept("go", t0));
        assert!(!window.accept("go", t0 + ms(100)));
        assert!(!window.accept("go", t0 + ms(249)));
        assert!(window.accept("go", t0 + ms(250)));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut window = DebounceWindow::new(ms(250));
        let t0 = Instant::now();

        assert!(window.accept("go", t0));
        assert!(window.accept("back", t0 + ms(10)));
        assert!(!window.accept("back", t0 + ms(20)));
    }

    #[test]
    fn test_suppressed_trigger_does_not_extend_window() {
        let mut window = DebounceWindow::new(ms(250));
        let t0 = Instant::now();

        assert!(window.accept("stop", t0));
        assert!(!window.accept("stop", t0 + ms(200)));
        // Measured from the accepted fire, not the dropped one
        assert!(window.accept("stop", t0 + ms(260)));
    }

    #[test]
    fn test_value_debounce_only_drops_same_value() {
        let mut pc = ValueDebounce::new(ms(200));
        let t0 = Instant::now();

        assert!(pc.accept(4u8, t0));
        assert!(!pc.accept(4, t0 + ms(50)));
        assert!(pc.accept(5, t0 + ms(60)));
        assert!(pc.accept(4, t0 + ms(70)));
        assert!(pc.accept(4, t0 + ms(300)));
    }

    #[test]
    fn test_go_guard_covers_fire() {
        let mut filter = TriggerFilter::new();
        let t0 = Instant::now();

        assert!(filter.accept_note_action(NoteAction::Go, t0));
        assert!(filter.accept_go(t0));

        // Fire passes its own note window but hits the shared go guard
        assert!(filter.accept_note_action(NoteAction::Fire, t0 + ms(300)));
        assert!(!filter.accept_go(t0 + ms(300)));

        assert!(filter.accept_go(t0 + ms(450)));
    }
}
