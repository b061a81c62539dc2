// Timeline - compiled, time-ordered lamp changes grouped per provider
// Built from decoded note events and a note mapping

use super::decoder::{DecodeError, RawNoteEvent, load_raw_events};
use super::mapping::{Mapping, MappingError};
use crate::registry::{Change, Provider, Registry};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Errors raised while compiling a timeline
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("note {note} has no mapping")]
    NoMapping { note: u8 },

    #[error("provider {provider_id} does not exist (mapped from note {note})")]
    UnknownProvider { note: u8, provider_id: String },
}

/// Anything that can make a load fail
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// All changes for one provider at one offset
#[derive(Clone)]
pub struct ProviderBatch {
    pub provider: Arc<dyn Provider>,
    pub changes: Vec<Change>,
}

impl ProviderBatch {
    pub fn provider_id(&self) -> &str {
        self.provider.id()
    }
}

impl fmt::Debug for ProviderBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBatch")
            .field("provider", &self.provider.id())
            .field("changes", &self.changes)
            .finish()
    }
}

impl PartialEq for ProviderBatch {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.provider, &other.provider) && self.changes == other.changes
    }
}

/// Everything due at one playback offset, one batch per provider
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineGroup {
    pub offset: Duration,
    pub batches: Vec<ProviderBatch>,
}

/// Ordered sequence of groups with strictly increasing offsets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    groups: Vec<TimelineGroup>,
}

impl Timeline {
    pub fn groups(&self) -> &[TimelineGroup] {
        &self.groups
    }

    pub fn get(&self, index: usize) -> Option<&TimelineGroup> {
        self.groups.get(index)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Offset of the last group
    pub fn duration(&self) -> Duration {
        self.groups.last().map(|g| g.offset).unwrap_or_default()
    }

    /// Total number of changes across all groups
    pub fn change_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.batches.iter())
            .map(|b| b.changes.len())
            .sum()
    }

    /// Compile note events into a timeline
    ///
    /// Every note must be mapped and every mapped provider must exist;
    /// the first failure aborts the whole compile. Group and lamp ids are
    /// not checked here - providers reject them at apply time.
    pub fn compile(
        events: &[RawNoteEvent],
        mapping: &Mapping,
        registry: &Registry,
    ) -> Result<Self, CompileError> {
        let mut providers: HashMap<&str, Arc<dyn Provider>> = HashMap::new();
        let mut groups: Vec<TimelineGroup> = Vec::new();
        let mut current: Option<TimelineGroup> = None;

        for event in events {
            let entry = mapping
                .get(event.note)
                .ok_or(CompileError::NoMapping { note: event.note })?;

            let provider = match providers.get(entry.provider_id.as_str()) {
                Some(provider) => provider.clone(),
                None => {
                    let provider = registry.get_provider(&entry.provider_id).map_err(|_| {
                        CompileError::UnknownProvider {
                            note: event.note,
                            provider_id: entry.provider_id.clone(),
                        }
                    })?;
                    providers.insert(entry.provider_id.as_str(), provider.clone());
                    provider
                }
            };

            // Seal the previous group once the offset moves on
            let group = match current.take() {
                Some(group) if group.offset == event.offset => group,
                Some(group) => {
                    groups.push(group);
                    TimelineGroup {
                        offset: event.offset,
                        batches: Vec::new(),
                    }
                }
                None => TimelineGroup {
                    offset: event.offset,
                    batches: Vec::new(),
                },
            };
            let group = current.insert(group);

            let change = Change::new(entry.group_id.clone(), entry.lamp_id.clone(), event.is_on);
            match group
                .batches
                .iter_mut()
                .find(|b| Arc::ptr_eq(&b.provider, &provider))
            {
                Some(batch) => batch.changes.push(change),
                None => group.batches.push(ProviderBatch {
                    provider,
                    changes: vec![change],
                }),
            }
        }

        groups.extend(current);
        Ok(Self { groups })
    }

    /// Decode a MIDI file, read its mapping and compile both
    pub fn load(
        midi_path: &Path,
        mapping_path: &Path,
        registry: &Registry,
    ) -> Result<Self, LoadError> {
        let events = load_raw_events(midi_path)?;
        let mapping = Mapping::load(mapping_path)?;
        Ok(Self::compile(&events, &mapping, registry)?)
    }
}
