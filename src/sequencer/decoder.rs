// Timeline decoder
// Turns a MIDI file into one time-ordered stream of note on/off events

use crate::midi::TempoMap;
use midly::{MidiMessage, Smf, TrackEventKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A note switching on or off at an absolute time from the start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawNoteEvent {
    pub offset: Duration,
    pub note: u8,
    pub is_on: bool,
}

/// Errors raised while reading the timing file
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: midly::Error,
    },
}

/// Decode note events from a complete MIDI file held in memory
///
/// Tracks are walked in file order; the result is stably sorted by offset so
/// simultaneous events keep track order, then in-track order. Velocity and
/// channel are dropped, every other event type is skipped.
pub fn decode(data: &[u8]) -> Result<Vec<RawNoteEvent>, midly::Error> {
    let smf = Smf::parse(data)?;
    Ok(note_events(&smf))
}

/// Note events of an already parsed file
pub fn note_events(smf: &Smf<'_>) -> Vec<RawNoteEvent> {
    let tempo_map = TempoMap::from_smf(smf);

    let mut events = Vec::new();
    for track in &smf.tracks {
        let mut tick: u64 = 0;
        for event in track {
            tick += event.delta.as_int() as u64;
            let TrackEventKind::Midi { message, .. } = event.kind else {
                continue;
            };
            if let Some((note, is_on)) = note_switch(message) {
                events.push(RawNoteEvent {
                    offset: tempo_map.duration_at(tick),
                    note,
                    is_on,
                });
            }
        }
    }

    events.sort_by_key(|e| e.offset);
    events
}

/// Note number and on/off of a note message; note on at velocity 0 is off
fn note_switch(message: MidiMessage) -> Option<(u8, bool)> {
    match message {
        MidiMessage::NoteOn { key, vel } => Some((key.as_int(), vel.as_int() > 0)),
        MidiMessage::NoteOff { key, .. } => Some((key.as_int(), false)),
        _ => None,
    }
}

/// Read and decode a MIDI file from disk
pub fn load_raw_events(path: &Path) -> Result<Vec<RawNoteEvent>, DecodeError> {
    let data = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let events = decode(&data).map_err(|source| DecodeError::Format {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), events = events.len(), "timing file decoded");
    Ok(events)
}
