// Sequencer Player - Playback actor
// One worker thread owns the timeline and cursor; handles talk to it only
// through commands, each answered on its own reply channel

use super::timeline::{LoadError, Timeline};
use super::transport::{PlaybackClock, PlaybackStatus};
use crate::config::SequencerConfig;
use crate::messaging::{
    Command, CommandReceiver, CommandSender, Notification, NotificationCategory,
    NotificationProducer, create_command_channel,
};
use crate::registry::Registry;
use crossbeam::channel::{Receiver, Sender, select};
use ringbuf::traits::Producer;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

const COMMAND_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error("no timeline loaded")]
    NoTimeline,

    #[error("already playing")]
    AlreadyPlaying,

    #[error("not playing")]
    NotPlaying,

    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    #[error("failed to start sequencer worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("sequencer is closed")]
    Closed,
}

/// Handle to the playback actor
///
/// Every method blocks until the worker has handled the command. The handle
/// can be shared between threads; commands are processed one at a time.
pub struct Sequencer {
    commands: CommandSender,
    shutdown: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Sequencer {
    pub fn new(registry: Arc<Registry>, config: SequencerConfig) -> Result<Self, SequencerError> {
        Self::spawn(registry, config, None)
    }

    /// Like `new`, also pushing observer notifications into `notifications`
    pub fn with_notifications(
        registry: Arc<Registry>,
        config: SequencerConfig,
        notifications: NotificationProducer,
    ) -> Result<Self, SequencerError> {
        Self::spawn(registry, config, Some(notifications))
    }

    fn spawn(
        registry: Arc<Registry>,
        config: SequencerConfig,
        notifications: Option<NotificationProducer>,
    ) -> Result<Self, SequencerError> {
        let (commands, command_rx) = create_command_channel(COMMAND_QUEUE_CAPACITY);
        let (shutdown, shutdown_rx) = crossbeam::channel::bounded::<()>(0);

        let worker = Worker {
            registry,
            config,
            timeline: None,
            clock: PlaybackClock::new(),
            notifications,
        };
        let handle = thread::Builder::new()
            .name("sequencer".to_string())
            .spawn(move || worker.run(command_rx, shutdown_rx))
            .map_err(SequencerError::Spawn)?;

        Ok(Self {
            commands,
            shutdown: Mutex::new(Some(shutdown)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Decode, map and compile; on success the new timeline replaces the
    /// current one and any playback is stopped
    pub fn load(
        &self,
        midi_path: impl AsRef<Path>,
        mapping_path: impl AsRef<Path>,
    ) -> Result<(), SequencerError> {
        let midi_path = midi_path.as_ref().to_path_buf();
        let mapping_path = mapping_path.as_ref().to_path_buf();
        self.request(|reply| Command::Load {
            midi_path,
            mapping_path,
            reply,
        })?
    }

    /// Start from the cursor, or resume after a pause
    pub fn play(&self) -> Result<(), SequencerError> {
        self.request(|reply| Command::Play { reply })?
    }

    /// Halt keeping the cursor
    pub fn pause(&self) -> Result<(), SequencerError> {
        self.request(|reply| Command::Pause { reply })?
    }

    /// Halt and rewind to the start
    pub fn stop(&self) -> Result<(), SequencerError> {
        self.request(|reply| Command::Stop { reply })?
    }

    pub fn status(&self) -> Result<PlaybackStatus, SequencerError> {
        self.request(|reply| Command::Status { reply })
    }

    /// Stop the worker and wait for it to exit
    ///
    /// Interrupts any pending wait. Safe to call more than once; later
    /// commands fail with `SequencerError::Closed`.
    pub fn close(&self) {
        // Dropping the sender disconnects the worker's shutdown receiver
        drop(lock(&self.shutdown).take());

        if let Some(handle) = lock(&self.worker).take()
            && handle.join().is_err()
        {
            tracing::error!("sequencer worker panicked");
        }
    }

    fn request<T>(
        &self,
        command: impl FnOnce(Sender<T>) -> Command,
    ) -> Result<T, SequencerError> {
        let (reply, response) = crossbeam::channel::bounded(1);
        self.commands
            .send(command(reply))
            .map_err(|_| SequencerError::Closed)?;
        response.recv().map_err(|_| SequencerError::Closed)
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State owned by the worker thread
struct Worker {
    registry: Arc<Registry>,
    config: SequencerConfig,
    timeline: Option<Timeline>,
    clock: PlaybackClock,
    notifications: Option<NotificationProducer>,
}

impl Worker {
    fn run(mut self, commands: CommandReceiver, shutdown: Receiver<()>) {
        let span = tracing::info_span!("sequencer");
        let _enter = span.enter();
        tracing::info!("worker started");

        loop {
            let timer = match self.next_deadline() {
                Some(deadline) => crossbeam::channel::at(deadline),
                None => crossbeam::channel::never(),
            };

            select! {
                recv(shutdown) -> _ => break,
                recv(commands) -> command => match command {
                    Ok(command) => self.handle(command),
                    Err(_) => break,
                },
                recv(timer) -> _ => self.dispatch(),
            }
        }

        tracing::info!("worker stopped");
    }

    fn handle(&mut self, command: Command) {
        tracing::debug!(command = command.name(), "command received");

        // A dropped reply receiver only means the caller went away
        match command {
            Command::Load {
                midi_path,
                mapping_path,
                reply,
            } => {
                let _ = reply.send(self.load(midi_path, mapping_path));
            }
            Command::Play { reply } => {
                let _ = reply.send(self.play());
            }
            Command::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop());
            }
            Command::Status { reply } => {
                let group_count = self.timeline.as_ref().map_or(0, Timeline::len);
                let _ = reply.send(self.clock.status(Instant::now(), group_count));
            }
        }
    }

    fn load(&mut self, midi_path: PathBuf, mapping_path: PathBuf) -> Result<(), SequencerError> {
        let timeline = match Timeline::load(&midi_path, &mapping_path, &self.registry) {
            Ok(timeline) => timeline,
            Err(err) => {
                tracing::warn!(
                    midi = %midi_path.display(),
                    mapping = %mapping_path.display(),
                    error = %err,
                    "load failed"
                );
                self.notify(Notification::error(
                    NotificationCategory::Load,
                    format!("load failed: {}", err),
                ));
                return Err(err.into());
            }
        };

        if self.clock.state().is_active() {
            tracing::info!("playback halted by load");
        }
        self.clock.stop();

        tracing::info!(
            midi = %midi_path.display(),
            groups = timeline.len(),
            changes = timeline.change_count(),
            duration = ?timeline.duration(),
            "timeline loaded"
        );
        self.notify(Notification::info(
            NotificationCategory::Load,
            format!(
                "loaded {} ({} groups)",
                midi_path.display(),
                timeline.len()
            ),
        ));
        self.timeline = Some(timeline);
        Ok(())
    }

    fn play(&mut self) -> Result<(), SequencerError> {
        let Some(timeline) = &self.timeline else {
            return Err(SequencerError::NoTimeline);
        };
        if self.clock.state().is_playing() {
            return Err(SequencerError::AlreadyPlaying);
        }

        let group_count = timeline.len();
        self.clock.play(Instant::now());
        tracing::info!(cursor = self.clock.cursor(), groups = group_count, "playback started");

        if self.clock.cursor() >= group_count {
            self.finish();
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), SequencerError> {
        if !self.clock.state().is_playing() {
            return Err(SequencerError::NotPlaying);
        }
        self.clock.pause(Instant::now());
        tracing::info!(cursor = self.clock.cursor(), "playback paused");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SequencerError> {
        if !self.clock.state().is_active() {
            return Err(SequencerError::NotPlaying);
        }
        self.clock.stop();
        tracing::info!("playback stopped");
        Ok(())
    }

    /// Deadline of the group at the cursor, while playing
    fn next_deadline(&self) -> Option<Instant> {
        let group = self.timeline.as_ref()?.get(self.clock.cursor())?;
        self.clock.deadline(group.offset)
    }

    /// Apply the group at the cursor and move on
    fn dispatch(&mut self) {
        let Some(timeline) = &self.timeline else {
            return;
        };
        let cursor = self.clock.cursor();
        let Some(group) = timeline.get(cursor) else {
            return;
        };
        let Some(deadline) = self.clock.deadline(group.offset) else {
            return;
        };

        let lateness = Instant::now().saturating_duration_since(deadline);
        if lateness > self.config.lateness_warning() {
            tracing::warn!(
                group = cursor,
                lateness = ?lateness,
                "group dispatched late"
            );
        }

        let mut failures = Vec::new();
        for batch in &group.batches {
            match batch.provider.apply(&batch.changes) {
                Ok(()) => tracing::debug!(
                    group = cursor,
                    provider = batch.provider_id(),
                    changes = batch.changes.len(),
                    "batch applied"
                ),
                Err(err) => {
                    tracing::warn!(
                        group = cursor,
                        provider = batch.provider_id(),
                        error = %err,
                        "apply failed"
                    );
                    failures.push(format!(
                        "provider {} failed at {:?}: {}",
                        batch.provider_id(),
                        group.offset,
                        err
                    ));
                }
            }
        }
        let finished = cursor + 1 >= timeline.len();

        for message in failures {
            self.notify(Notification::warning(NotificationCategory::Provider, message));
        }

        self.clock.advance();
        if finished {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.clock.stop();
        tracing::info!("playback finished");
        self.notify(Notification::info(
            NotificationCategory::Playback,
            "playback finished",
        ));
    }

    fn notify(&mut self, notification: Notification) {
        if let Some(producer) = &mut self.notifications
            && producer.try_push(notification).is_err()
        {
            tracing::debug!("notification buffer full, dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{NotificationLevel, create_notification_channel};
    use crate::registry::{Change, Group, Lamp, Provider, ProviderError};
    use crate::sequencer::PlaybackState;
    use ringbuf::traits::Consumer;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Records every apply call; optionally fails them all
    struct RecordingProvider {
        id: String,
        fail: bool,
        calls: Mutex<Vec<Vec<Change>>>,
    }

    impl RecordingProvider {
        fn new(id: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                fail,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<Change>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Provider for RecordingProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn name(&self) -> &str {
            "recording"
        }

        fn groups(&self) -> Vec<Group> {
            Vec::new()
        }

        fn lamps(&self) -> Vec<Lamp> {
            Vec::new()
        }

        fn apply(&self, changes: &[Change]) -> Result<(), ProviderError> {
            self.calls.lock().unwrap().push(changes.to_vec());
            if self.fail {
                return Err(ProviderError::Backend("bridge unreachable".to_string()));
            }
            Ok(())
        }

        fn apply_to_all(&self, _change: &Change) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn registry(provider: Arc<RecordingProvider>) -> Arc<Registry> {
        let mut registry = Registry::new();
        registry.register(provider).unwrap();
        Arc::new(registry)
    }

    /// Format 0 file, 480 ticks per quarter, default tempo
    fn write_midi(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
        let mut bytes = b"MThd".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 6, 0, 0, 0, 1, 0x01, 0xE0]);
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(body);

        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn write_mapping(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join("mapping.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    struct Fixture {
        _dir: TempDir,
        midi: PathBuf,
        mapping: PathBuf,
    }

    /// Note 60 on at 0ms, off at 500ms, mapped to p/g/l
    fn on_off_fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let midi = write_midi(
            dir.path(),
            "song.mid",
            &[0x00, 0x90, 60, 100, 0x83, 0x60, 0x80, 60, 0, 0x00, 0xFF, 0x2F, 0x00],
        );
        let mapping = write_mapping(
            dir.path(),
            r#"{"60": {"provider_id": "p", "group_id": "g", "lamp_id": "l"}}"#,
        );
        Fixture {
            _dir: dir,
            midi,
            mapping,
        }
    }

    fn wait_for_idle(sequencer: &Sequencer, timeout: Duration) -> PlaybackStatus {
        let deadline = Instant::now() + timeout;
        loop {
            let status = sequencer.status().unwrap();
            if status.state == PlaybackState::Idle || Instant::now() > deadline {
                return status;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_play_without_timeline() {
        let provider = RecordingProvider::new("p", false);
        let sequencer = Sequencer::new(registry(provider.clone()), SequencerConfig::default()).unwrap();

        assert!(matches!(sequencer.play(), Err(SequencerError::NoTimeline)));
        assert_eq!(sequencer.status().unwrap().state, PlaybackState::Idle);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn test_plays_groups_in_order() {
        let fixture = on_off_fixture();
        let provider = RecordingProvider::new("p", false);
        let sequencer = Sequencer::new(registry(provider.clone()), SequencerConfig::default()).unwrap();

        sequencer.load(&fixture.midi, &fixture.mapping).unwrap();
        let status = sequencer.status().unwrap();
        assert_eq!(status.group_count, 2);
        assert_eq!(status.state, PlaybackState::Idle);

        let started = Instant::now();
        sequencer.play().unwrap();
        let status = wait_for_idle(&sequencer, Duration::from_secs(3));

        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.cursor, 0);
        assert_eq!(
            provider.calls(),
            vec![
                vec![Change::new("g", "l", true)],
                vec![Change::new("g", "l", false)],
            ]
        );
    }

    #[test]
    fn test_late_dispatch_still_applies() {
        let fixture = on_off_fixture();
        let provider = RecordingProvider::new("p", false);
        // Every dispatch counts as late
        let config = SequencerConfig {
            lateness_warning_ms: 0,
            ..SequencerConfig::default()
        };
        let sequencer = Sequencer::new(registry(provider.clone()), config).unwrap();

        sequencer.load(&fixture.midi, &fixture.mapping).unwrap();
        sequencer.play().unwrap();
        let status = wait_for_idle(&sequencer, Duration::from_secs(3));

        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(provider.calls().len(), 2);
    }

    #[test]
    fn test_stop_before_deadline_cancels_group() {
        let fixture = on_off_fixture();
        let provider = RecordingProvider::new("p", false);
        let sequencer = Sequencer::new(registry(provider.clone()), SequencerConfig::default()).unwrap();

        sequencer.load(&fixture.midi, &fixture.mapping).unwrap();
        sequencer.play().unwrap();
        thread::sleep(Duration::from_millis(100));
        sequencer.stop().unwrap();

        let status = sequencer.status().unwrap();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.cursor, 0);

        thread::sleep(Duration::from_millis(600));
        // Only the group at 0ms fired
        assert_eq!(provider.calls(), vec![vec![Change::new("g", "l", true)]]);
    }

    #[test]
    fn test_pause_and_resume() {
        let fixture = on_off_fixture();
        let provider = RecordingProvider::new("p", false);
        let sequencer = Sequencer::new(registry(provider.clone()), SequencerConfig::default()).unwrap();

        sequencer.load(&fixture.midi, &fixture.mapping).unwrap();
        sequencer.play().unwrap();
        thread::sleep(Duration::from_millis(100));
        sequencer.pause().unwrap();

        let status = sequencer.status().unwrap();
        assert_eq!(status.state, PlaybackState::Paused);
        assert_eq!(status.cursor, 1);

        thread::sleep(Duration::from_millis(600));
        assert_eq!(provider.calls().len(), 1);

        sequencer.play().unwrap();
        let status = wait_for_idle(&sequencer, Duration::from_secs(3));
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(provider.calls().len(), 2);
    }

    #[test]
    fn test_command_misuse() {
        let fixture = on_off_fixture();
        let provider = RecordingProvider::new("p", false);
        let sequencer = Sequencer::new(registry(provider), SequencerConfig::default()).unwrap();

        assert!(matches!(sequencer.stop(), Err(SequencerError::NotPlaying)));
        assert!(matches!(sequencer.pause(), Err(SequencerError::NotPlaying)));

        sequencer.load(&fixture.midi, &fixture.mapping).unwrap();
        sequencer.play().unwrap();
        assert!(matches!(sequencer.play(), Err(SequencerError::AlreadyPlaying)));

        sequencer.pause().unwrap();
        assert!(matches!(sequencer.pause(), Err(SequencerError::NotPlaying)));
        sequencer.stop().unwrap();
        assert!(matches!(sequencer.stop(), Err(SequencerError::NotPlaying)));
    }

    #[test]
    fn test_failed_load_keeps_timeline() {
        let fixture = on_off_fixture();
        let provider = RecordingProvider::new("p", false);
        let sequencer = Sequencer::new(registry(provider), SequencerConfig::default()).unwrap();

        sequencer.load(&fixture.midi, &fixture.mapping).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let other = write_mapping(
            dir.path(),
            r#"{"61": {"provider_id": "p", "group_id": "g", "lamp_id": "l"}}"#,
        );
        let result = sequencer.load(&fixture.midi, &other);
        assert!(matches!(result, Err(SequencerError::Load(_))));

        let status = sequencer.status().unwrap();
        assert_eq!(status.group_count, 2);
        assert_eq!(status.state, PlaybackState::Idle);
    }

    #[test]
    fn test_load_while_playing_stops_playback() {
        let fixture = on_off_fixture();
        let provider = RecordingProvider::new("p", false);
        let sequencer = Sequencer::new(registry(provider.clone()), SequencerConfig::default()).unwrap();

        sequencer.load(&fixture.midi, &fixture.mapping).unwrap();
        sequencer.play().unwrap();
        thread::sleep(Duration::from_millis(100));

        sequencer.load(&fixture.midi, &fixture.mapping).unwrap();
        let status = sequencer.status().unwrap();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.cursor, 0);

        thread::sleep(Duration::from_millis(600));
        assert_eq!(provider.calls().len(), 1);
    }

    #[test]
    fn test_empty_timeline_finishes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let midi = write_midi(dir.path(), "empty.mid", &[0x00, 0xFF, 0x2F, 0x00]);
        let mapping = write_mapping(dir.path(), "{}");

        let provider = RecordingProvider::new("p", false);
        let (producer, mut consumer) = create_notification_channel(8);
        let sequencer = Sequencer::with_notifications(
            registry(provider.clone()),
            SequencerConfig::default(),
            producer,
        )
        .unwrap();

        sequencer.load(&midi, &mapping).unwrap();
        assert_eq!(sequencer.status().unwrap().group_count, 0);

        sequencer.play().unwrap();
        assert_eq!(sequencer.status().unwrap().state, PlaybackState::Idle);
        assert!(provider.calls().is_empty());

        let messages: Vec<_> = std::iter::from_fn(|| consumer.try_pop()).collect();
        assert!(
            messages
                .iter()
                .any(|n| n.category == NotificationCategory::Playback)
        );
    }

    #[test]
    fn test_apply_failure_does_not_abort() {
        let fixture = on_off_fixture();
        let provider = RecordingProvider::new("p", true);
        let (producer, mut consumer) = create_notification_channel(16);
        let sequencer = Sequencer::with_notifications(
            registry(provider.clone()),
            SequencerConfig::default(),
            producer,
        )
        .unwrap();

        sequencer.load(&fixture.midi, &fixture.mapping).unwrap();
        sequencer.play().unwrap();
        wait_for_idle(&sequencer, Duration::from_secs(3));

        assert_eq!(provider.calls().len(), 2);

        let warnings: Vec<_> = std::iter::from_fn(|| consumer.try_pop())
            .filter(|n| n.category == NotificationCategory::Provider)
            .collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|n| n.level == NotificationLevel::Warning));
        assert!(warnings[0].message.contains("bridge unreachable"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let fixture = on_off_fixture();
        let provider = RecordingProvider::new("p", false);
        let sequencer = Sequencer::new(registry(provider.clone()), SequencerConfig::default()).unwrap();

        sequencer.load(&fixture.midi, &fixture.mapping).unwrap();
        sequencer.play().unwrap();
        thread::sleep(Duration::from_millis(50));

        sequencer.close();
        sequencer.close();

        assert!(matches!(sequencer.play(), Err(SequencerError::Closed)));
        assert!(matches!(sequencer.status(), Err(SequencerError::Closed)));

        thread::sleep(Duration::from_millis(550));
        assert_eq!(provider.calls().len(), 1);
    }
}
