// MIDI timing
// Tempo maps over files parsed by midly

pub mod tempo;

pub use tempo::{Tempo, TempoMap};
