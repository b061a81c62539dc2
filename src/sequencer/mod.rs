// Sequencer module
// Decodes a MIDI file, maps its notes onto lamps and plays the result back

pub mod decoder;
pub mod mapping;
pub mod player;
pub mod timeline;
pub mod transport;

pub use decoder::{DecodeError, RawNoteEvent};
pub use mapping::{Mapping, MappingEntry, MappingError};
pub use player::{Sequencer, SequencerError};
pub use timeline::{CompileError, LoadError, ProviderBatch, Timeline, TimelineGroup};
pub use transport::{PlaybackClock, PlaybackState, PlaybackStatus};
