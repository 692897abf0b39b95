//! Entity state storage with domain indexing for Home Assistant
//!
//! The StateStore holds the current state of every entity that an
//! integration has written. Entities are indexed by domain so a test or a
//! diagnostics dump can list, for example, every `sensor` at once.

use dashmap::DashMap;
use ha_core::{Attributes, EntityId, State, MAX_STATE_LENGTH, STATE_UNKNOWN};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Entity ids by domain, in first-write order
    domain_index: DashMap<String, Vec<String>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
        }
    }

    /// Set the state of an entity
    ///
    /// `last_changed` only moves when the state value differs from the one
    /// already stored. Values longer than [`MAX_STATE_LENGTH`] are replaced
    /// by `unknown`.
    #[instrument(skip(self, state, attributes), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: &EntityId,
        state: impl Into<String>,
        attributes: Attributes,
    ) -> State {
        let mut state = state.into();
        if state.len() > MAX_STATE_LENGTH {
            warn!(len = state.len(), "State value too long, storing as unknown");
            state = STATE_UNKNOWN.to_string();
        }

        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes),
            None => State::new(entity_id.clone(), state, attributes),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(key.clone(), new_state.clone());
        if old_state.is_none() {
            self.domain_index
                .entry(entity_id.domain().to_string())
                .or_default()
                .push(key);
        }

        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// The state value only, or None if the entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        self.entity_ids(domain)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// All states, sorted by entity_id
    pub fn all(&self) -> Vec<State> {
        let mut states: Vec<State> = self.states.iter().map(|r| r.value().clone()).collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        states
    }

    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &str) -> Option<State> {
        let (_, old_state) = self.states.remove(entity_id)?;
        if let Some(mut ids) = self.domain_index.get_mut(old_state.entity_id.domain()) {
            ids.retain(|id| id != entity_id);
        }
        debug!("Removed entity state");
        Some(old_state)
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for StateStore
pub type SharedStateStore = Arc<StateStore>;
