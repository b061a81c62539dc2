// In-memory provider
// Keeps lamp state in process memory; used for dry runs and as a stand-in
// for hardware backends on machines without the devices attached

use super::provider::{Change, Group, Lamp, Provider, ProviderError};
use crate::config::ProviderConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone)]
struct LampState {
    id: String,
    name: String,
    state: bool,
}

#[derive(Debug, Clone)]
struct GroupState {
    id: String,
    name: String,
    lamps: Vec<LampState>,
}

/// Provider whose lamps only exist in memory
#[derive(Debug)]
pub struct MemoryProvider {
    id: String,
    name: String,
    groups: RwLock<Vec<GroupState>>,
    apply_count: AtomicU64,
}

impl MemoryProvider {
    /// Build a provider from its configuration entry. All lamps start off.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let groups = config
            .groups
            .iter()
            .map(|g| GroupState {
                id: g.id.clone(),
                name: g.name.clone(),
                lamps: g
                    .lamps
                    .iter()
                    .map(|l| LampState {
                        id: l.id.clone(),
                        name: l.name.clone(),
                        state: false,
                    })
                    .collect(),
            })
            .collect();

        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            groups: RwLock::new(groups),
            apply_count: AtomicU64::new(0),
        }
    }

    /// Current state of one lamp, `None` if the group or lamp is unknown
    pub fn lamp_state(&self, group_id: &str, lamp_id: &str) -> Option<bool> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups
            .iter()
            .find(|g| g.id == group_id)?
            .lamps
            .iter()
            .find(|l| l.id == lamp_id)
            .map(|l| l.state)
    }

    /// Number of successful `apply` / `apply_to_all` calls
    pub fn apply_count(&self) -> u64 {
        self.apply_count.load(Ordering::Relaxed)
    }
}

/// Resolve a change to (group index, lamp index)
fn locate(groups: &[GroupState], change: &Change) -> Result<(usize, usize), ProviderError> {
    let group_idx = groups
        .iter()
        .position(|g| g.id == change.group_id)
        .ok_or_else(|| ProviderError::InvalidGroup(change.group_id.clone()))?;

    let lamp_idx = groups[group_idx]
        .lamps
        .iter()
        .position(|l| l.id == change.lamp_id)
        .ok_or_else(|| ProviderError::InvalidLamp {
            group: change.group_id.clone(),
            lamp: change.lamp_id.clone(),
        })?;

    Ok((group_idx, lamp_idx))
}

impl Provider for MemoryProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn groups(&self) -> Vec<Group> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups
            .iter()
            .map(|g| Group {
                id: g.id.clone(),
                name: g.name.clone(),
            })
            .collect()
    }

    fn lamps(&self) -> Vec<Lamp> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups
            .iter()
            .flat_map(|g| {
                g.lamps.iter().map(move |l| Lamp {
                    id: l.id.clone(),
                    name: l.name.clone(),
                    group_id: g.id.clone(),
                    state: l.state,
                })
            })
            .collect()
    }

    fn apply(&self, changes: &[Change]) -> Result<(), ProviderError> {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);

        // Resolve everything first so a bad change leaves state untouched
        let targets = changes
            .iter()
            .map(|c| locate(&groups, c))
            .collect::<Result<Vec<_>, _>>()?;

        for ((group_idx, lamp_idx), change) in targets.into_iter().zip(changes) {
            groups[group_idx].lamps[lamp_idx].state = change.state;
        }

        self.apply_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(provider = %self.id, changes = changes.len(), "changes applied");
        Ok(())
    }

    fn apply_to_all(&self, change: &Change) -> Result<(), ProviderError> {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        for lamp in groups.iter_mut().flat_map(|g| g.lamps.iter_mut()) {
            lamp.state = change.state;
        }

        self.apply_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(provider = %self.id, state = change.state, "state applied to all lamps");
        Ok(())
    }

    fn close(&self) {
        tracing::debug!(provider = %self.id, "memory provider closed");
    }
}
