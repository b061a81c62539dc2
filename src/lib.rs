// lampctl - Library exports for the binary, tests and benchmarks

pub mod config;
pub mod messaging;
pub mod midi;
pub mod registry;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError, SequencerConfig};
pub use messaging::channels::{create_command_channel, create_notification_channel};
pub use messaging::notification::{Notification, NotificationCategory, NotificationLevel};
pub use midi::{Tempo, TempoMap};
pub use registry::{Change, MemoryProvider, Provider, ProviderError, Registry, RegistryError};
pub use sequencer::{
    Mapping, PlaybackState, PlaybackStatus, RawNoteEvent, Sequencer, SequencerError, Timeline,
};
