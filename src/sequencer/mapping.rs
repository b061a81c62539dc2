// Note mapping
// Translates MIDI note numbers into (provider, group, lamp) targets

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Target lamp for one note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub provider_id: String,
    pub group_id: String,
    pub lamp_id: String,
}

/// Errors raised while loading a mapping file
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse mapping: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Note number → target table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    entries: HashMap<u8, MappingEntry>,
}

impl Mapping {
    /// Parse the JSON mapping document
    ///
    /// Notes are looked up by their canonical spelling, so only plain decimal
    /// keys 0-127 can ever match (`"60"`, not `"060"` or `"+60"`). Other keys
    /// are skipped with a warning; extra fields in an entry are ignored.
    pub fn from_json_str(data: &str) -> Result<Self, MappingError> {
        let raw: BTreeMap<String, MappingEntry> = serde_json::from_str(data)?;

        let mut entries = HashMap::with_capacity(raw.len());
        for (key, entry) in raw {
            match parse_key(&key) {
                Some(note) => {
                    entries.insert(note, entry);
                }
                None => tracing::warn!(key = %key, "skipping mapping key that is not a note number"),
            }
        }
        Ok(Self { entries })
    }

    /// Load a mapping file from disk
    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let data = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mapping = Self::from_json_str(&data)?;

        tracing::debug!(path = %path.display(), notes = mapping.len(), "mapping loaded");
        Ok(mapping)
    }

    /// Target for a note, if mapped
    pub fn get(&self, note: u8) -> Option<&MappingEntry> {
        self.entries.get(&note)
    }

    pub fn insert(&mut self, note: u8, entry: MappingEntry) {
        self.entries.insert(note, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical decimal note number in 0..=127
fn parse_key(key: &str) -> Option<u8> {
    let canonical = !key.is_empty()
        && key.bytes().all(|b| b.is_ascii_digit())
        && (key == "0" || !key.starts_with('0'));
    if !canonical {
        return None;
    }
    key.parse::<u8>().ok().filter(|note| *note <= 127)
}
