// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Wattline.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use super::ValueStore;
use crate::correction::StateLookup;
use crate::errors::StoreResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;
use wattline_types::{
    BatState, ComponentKey, CorrectedState, CounterState, GridProtectionState,
};

#[derive(Debug, Default)]
struct SharedInner {
    states: HashMap<ComponentKey, CorrectedState>,
    grid_protection: GridProtectionState,
}

/// Process-wide table of the latest committed state per component.
///
/// Cloning shares the same table. Readers always see either the previous or
/// the new state of a component, never a mix.
#[derive(Debug, Clone, Default)]
pub struct SharedStateStore {
    inner: Arc<RwLock<SharedInner>>,
}

impl SharedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(&self, key: ComponentKey, state: CorrectedState) {
        self.inner.write().states.insert(key, state);
    }

    pub fn get(&self, key: &ComponentKey) -> Option<CorrectedState> {
        self.inner.read().states.get(key).cloned()
    }

    pub fn counter(&self, id: u32) -> Option<CounterState> {
        self.get(&ComponentKey::counter(id))
            .and_then(|s| s.state().as_counter().cloned())
    }

    pub fn battery(&self, id: u32) -> Option<BatState> {
        self.get(&ComponentKey::battery(id))
            .and_then(|s| s.state().as_battery().cloned())
    }

    pub fn snapshot(&self) -> HashMap<ComponentKey, CorrectedState> {
        self.inner.read().states.clone()
    }

    /// Drop entries for components that are no longer configured
    pub fn retain(&self, keep: impl Fn(&ComponentKey) -> bool) {
        self.inner.write().states.retain(|k, _| keep(k));
    }

    pub fn publish_grid_protection(&self, state: GridProtectionState) {
        self.inner.write().grid_protection = state;
    }

    pub fn grid_protection(&self) -> GridProtectionState {
        self.inner.read().grid_protection.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().states.is_empty()
    }
}

impl StateLookup for SharedStateStore {
    fn corrected(&self, key: &ComponentKey) -> Option<CorrectedState> {
        self.get(key)
    }
}

/// Commits into the [`SharedStateStore`] once the wrapped backend accepted the state
#[derive(Debug)]
pub struct SharedStateMirror<S> {
    inner: S,
    shared: SharedStateStore,
}

impl<S: ValueStore> SharedStateMirror<S> {
    pub fn new(inner: S, shared: SharedStateStore) -> Self {
        Self { inner, shared }
    }
}

impl<S: ValueStore> ValueStore for SharedStateMirror<S> {
    fn key(&self) -> ComponentKey {
        self.inner.key()
    }

    fn set(&mut self, state: CorrectedState) {
        self.inner.set(state);
    }

    fn update(&mut self) -> StoreResult<()> {
        self.inner.update()?;
        if let Some(state) = self.inner.staged() {
            trace!("{} committed to shared state", self.inner.key());
            self.shared.commit(self.inner.key(), state.clone());
        }
        Ok(())
    }

    fn staged(&self) -> Option<&CorrectedState> {
        self.inner.staged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use wattline_types::DeviceState;

    struct FailingStore {
        staged: Option<CorrectedState>,
    }

    impl ValueStore for FailingStore {
        fn key(&self) -> ComponentKey {
            ComponentKey::battery(2)
        }

        fn set(&mut self, state: CorrectedState) {
            self.staged = Some(state);
        }

        fn update(&mut self) -> StoreResult<()> {
            Err(StoreError::Publish {
                topic: "bat/2".to_owned(),
                reason: "offline".to_owned(),
            })
        }

        fn staged(&self) -> Option<&CorrectedState> {
            self.staged.as_ref()
        }
    }

    fn bat(power: f64) -> CorrectedState {
        CorrectedState::new(DeviceState::Battery(BatState {
            power,
            soc: 40.0,
            ..Default::default()
        }))
    }

    #[test]
    fn test_failed_backend_does_not_reach_shared_state() {
        let shared = SharedStateStore::new();
        shared.commit(ComponentKey::battery(2), bat(100.0));

        let mut store = SharedStateMirror::new(FailingStore { staged: None }, shared.clone());
        store.set(bat(-900.0));
        assert!(store.update().is_err());

        assert_eq!(shared.battery(2).unwrap().power, 100.0);
    }

    #[test]
    fn test_clones_share_one_table() {
        let shared = SharedStateStore::new();
        let reader = shared.clone();
        shared.commit(ComponentKey::battery(2), bat(300.0));

        assert_eq!(reader.battery(2).unwrap().power, 300.0);
        assert_eq!(reader.len(), 1);

        reader.retain(|k| k.id != 2);
        assert!(shared.is_empty());
    }

    #[test]
    fn test_grid_protection_snapshot() {
        let shared = SharedStateStore::new();
        assert!(!shared.grid_protection().active);

        shared.publish_grid_protection(GridProtectionState {
            active: true,
            stagger_secs: 17,
            tripped_at: None,
        });
        assert_eq!(shared.grid_protection().stagger_secs, 17);
    }
}
