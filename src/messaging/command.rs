// Commands sent from a Sequencer handle to its worker

use crate::sequencer::{PlaybackStatus, SequencerError};
use crossbeam::channel::Sender;
use std::path::PathBuf;

/// Reply channel for commands that can be rejected
pub type Reply = Sender<Result<(), SequencerError>>;

#[derive(Debug)]
pub enum Command {
    Load {
        midi_path: PathBuf,
        mapping_path: PathBuf,
        reply: Reply,
    },
    Play { reply: Reply },
    Pause { reply: Reply },
    Stop { reply: Reply },
    Status { reply: Sender<PlaybackStatus> },
}

impl Command {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Load { .. } => "load",
            Command::Play { .. } => "play",
            Command::Pause { .. } => "pause",
            Command::Stop { .. } => "stop",
            Command::Status { .. } => "status",
        }
    }
}
