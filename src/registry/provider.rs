// Provider capability - the surface every lamp backend exposes
// Backends (shift registers, bridges, LED strips) live outside the sequencer

use serde::{Deserialize, Serialize};

/// Logical grouping of lamps inside a provider (one register, one bridge...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
}

/// A single lamp that can be switched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lamp {
    pub id: String,
    pub name: String,
    pub group_id: String,
    pub state: bool,
}

/// Request to change the state of one lamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub group_id: String,
    pub lamp_id: String,
    pub state: bool,

    /// Optional brightness (0.0 - 100.0), ignored by on/off backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,

    /// Optional transition time in milliseconds
    #[serde(
        rename = "duration",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_ms: Option<i64>,
}

impl Change {
    /// Plain on/off change without brightness or transition
    pub fn new(group_id: impl Into<String>, lamp_id: impl Into<String>, state: bool) -> Self {
        Self {
            group_id: group_id.into(),
            lamp_id: lamp_id.into(),
            state,
            brightness: None,
            duration_ms: None,
        }
    }
}

/// Errors a provider can report from `apply`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid group specified: {0}")]
    InvalidGroup(String),

    #[error("invalid lamp specified: {lamp} (group {group})")]
    InvalidLamp { group: String, lamp: String },

    #[error("backend error: {0}")]
    Backend(String),
}

/// A set of lamps with a uniform control surface
///
/// Implementations are shared between the HTTP layer and the sequencer
/// worker, so every method takes `&self` and state changes go through
/// interior mutability.
///
/// `apply` is called from the sequencer's playback thread and should return
/// quickly; a backend that can block for long should hand the work off
/// internally.
pub trait Provider: Send + Sync {
    /// Machine-friendly identifier, unique within a registry
    fn id(&self) -> &str;

    /// Human-friendly name
    fn name(&self) -> &str;

    /// Groups exposed by this provider
    fn groups(&self) -> Vec<Group>;

    /// All lamps managed by this provider
    fn lamps(&self) -> Vec<Lamp>;

    /// Apply an ordered batch of changes
    fn apply(&self, changes: &[Change]) -> Result<(), ProviderError>;

    /// Apply the same state to every lamp of the provider
    fn apply_to_all(&self, change: &Change) -> Result<(), ProviderError>;

    /// Free backend resources. Called once by `Registry::close`.
    fn close(&self) {}
}
