// Tempo map
// Converts absolute tick counts into elapsed real time, piecewise over
// the tempo changes of a file

use midly::{Fps, MetaMessage, Smf, Timing, TrackEventKind};
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Tempo expressed the way MIDI files store it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tempo {
    micros_per_quarter: u32,
}

impl Tempo {
    /// 120 BPM, the tempo a file has until its first Set Tempo event
    pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

    pub fn from_micros_per_quarter(micros_per_quarter: u32) -> Self {
        Self { micros_per_quarter }
    }

    /// Microseconds per quarter note
    pub fn micros_per_quarter(&self) -> u32 {
        self.micros_per_quarter
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::from_micros_per_quarter(Self::DEFAULT_MICROS_PER_QUARTER)
    }
}

/// Stretch of the file played at one tempo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    tick: u64,
    start_nanos: u128,
    micros_per_quarter: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Clock {
    Metrical {
        ticks_per_quarter: u64,
        segments: Vec<Segment>,
    },
    /// Constant rate: `ticks_per_sec = ticks_num / ticks_den`
    Timecode { ticks_num: u64, ticks_den: u64 },
}

/// Tick → time conversion for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempoMap {
    clock: Clock,
}

impl TempoMap {
    /// Build a map from a division and tempo changes
    ///
    /// `changes` must be ordered by tick; when two changes share a tick the
    /// later one wins. Changes are ignored for timecode divisions.
    pub fn new(timing: Timing, changes: impl IntoIterator<Item = (u64, Tempo)>) -> Self {
        let clock = match timing {
            Timing::Metrical(ticks_per_quarter) => {
                let ticks_per_quarter = ticks_per_quarter.as_int().max(1) as u64;
                let mut segments = vec![Segment {
                    tick: 0,
                    start_nanos: 0,
                    micros_per_quarter: Tempo::DEFAULT_MICROS_PER_QUARTER as u64,
                }];

                for (tick, tempo) in changes {
                    let micros_per_quarter = tempo.micros_per_quarter() as u64;
                    let Some(last) = segments.last_mut() else {
                        continue;
                    };
                    if tick <= last.tick {
                        last.micros_per_quarter = micros_per_quarter;
                        continue;
                    }
                    let start_nanos = last.start_nanos
                        + span_nanos(tick - last.tick, last.micros_per_quarter, ticks_per_quarter);
                    segments.push(Segment {
                        tick,
                        start_nanos,
                        micros_per_quarter,
                    });
                }

                Clock::Metrical {
                    ticks_per_quarter,
                    segments,
                }
            }
            Timing::Timecode(fps, ticks_per_frame) => {
                let (num, den) = frame_rate(fps);
                Clock::Timecode {
                    ticks_num: num * ticks_per_frame.max(1) as u64,
                    ticks_den: den,
                }
            }
        };

        Self { clock }
    }

    /// Collect the Set Tempo events of every track of a file
    pub fn from_smf(smf: &Smf<'_>) -> Self {
        let mut changes = Vec::new();
        for track in &smf.tracks {
            let mut tick: u64 = 0;
            for event in track {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(micros)) = event.kind {
                    changes.push((tick, Tempo::from_micros_per_quarter(micros.as_int())));
                }
            }
        }
        // Stable: equal ticks keep file order
        changes.sort_by_key(|(tick, _)| *tick);

        Self::new(smf.header.timing, changes)
    }

    /// Elapsed time from the start of the file to `tick`
    pub fn duration_at(&self, tick: u64) -> Duration {
        let nanos = match &self.clock {
            Clock::Metrical {
                ticks_per_quarter,
                segments,
            } => {
                let idx = segments.partition_point(|s| s.tick <= tick).saturating_sub(1);
                let segment = &segments[idx];
                segment.start_nanos
                    + span_nanos(
                        tick - segment.tick,
                        segment.micros_per_quarter,
                        *ticks_per_quarter,
                    )
            }
            Clock::Timecode {
                ticks_num,
                ticks_den,
            } => tick as u128 * NANOS_PER_SEC * *ticks_den as u128 / *ticks_num as u128,
        };

        nanos_to_duration(nanos)
    }
}

/// Frames per second as an exact ratio; 29 is the 29.97 drop-frame rate
fn frame_rate(fps: Fps) -> (u64, u64) {
    match fps {
        Fps::Fps24 => (24, 1),
        Fps::Fps25 => (25, 1),
        Fps::Fps29 => (30_000, 1_001),
        Fps::Fps30 => (30, 1),
    }
}

fn span_nanos(ticks: u64, micros_per_quarter: u64, ticks_per_quarter: u64) -> u128 {
    ticks as u128 * micros_per_quarter as u128 * 1_000 / ticks_per_quarter as u128
}

fn nanos_to_duration(nanos: u128) -> Duration {
    let secs = (nanos / NANOS_PER_SEC).min(u64::MAX as u128) as u64;
    let sub = (nanos % NANOS_PER_SEC) as u32;
    Duration::new(secs, sub)
}
