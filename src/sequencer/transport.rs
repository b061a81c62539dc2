// Transport - Playback state and clock bookkeeping
// Tracks the play/pause/stop state, the cursor into the timeline and the
// wall-clock anchor used to compute group deadlines

use std::fmt;
use std::time::{Duration, Instant};

/// Playback state of the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }

    /// Playing or paused: a Stop has something to halt
    pub fn is_active(&self) -> bool {
        !matches!(self, PlaybackState::Idle)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Snapshot reported by the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    /// Index of the next group to dispatch
    pub cursor: usize,
    pub group_count: usize,
    /// Elapsed playback time
    pub position: Duration,
}

/// Cursor and clock of one playback
///
/// While playing, `started_at` is the wall-clock instant matching offset 0,
/// so a group is due at `started_at + offset`. Pausing freezes the elapsed
/// time into `position`; resuming moves the anchor so that elapsed time
/// continues from there.
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    state: PlaybackState,
    cursor: usize,
    position: Duration,
    started_at: Option<Instant>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Start or resume at `now`
    pub fn play(&mut self, now: Instant) {
        // Instants before the platform epoch don't exist; restart from 0 then
        let started_at = now.checked_sub(self.position).unwrap_or(now);
        self.started_at = Some(started_at);
        self.state = PlaybackState::Playing;
    }

    /// Halt keeping cursor and elapsed time
    pub fn pause(&mut self, now: Instant) {
        self.position = self.position(now);
        self.started_at = None;
        self.state = PlaybackState::Paused;
    }

    /// Halt and rewind to the start
    pub fn stop(&mut self) {
        self.state = PlaybackState::Idle;
        self.cursor = 0;
        self.position = Duration::ZERO;
        self.started_at = None;
    }

    /// Mark the group at the cursor as dispatched
    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    /// Wall-clock instant a group at `offset` is due, while playing
    pub fn deadline(&self, offset: Duration) -> Option<Instant> {
        match (self.state, self.started_at) {
            (PlaybackState::Playing, Some(started_at)) => Some(started_at + offset),
            _ => None,
        }
    }

    /// Elapsed playback time at `now`
    pub fn position(&self, now: Instant) -> Duration {
        match (self.state, self.started_at) {
            (PlaybackState::Playing, Some(started_at)) => now.saturating_duration_since(started_at),
            _ => self.position,
        }
    }

    pub fn status(&self, now: Instant, group_count: usize) -> PlaybackStatus {
        PlaybackStatus {
            state: self.state,
            cursor: self.cursor,
            group_count,
            position: self.position(now),
        }
    }
}
