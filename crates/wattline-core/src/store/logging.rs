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
use crate::errors::StoreResult;
use tracing::debug;
use wattline_types::{ComponentKey, CorrectedState};

/// Transparent decorator logging every committed field at debug level
#[derive(Debug)]
pub struct LoggingValueStore<S> {
    inner: S,
}

impl<S: ValueStore> LoggingValueStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ValueStore> ValueStore for LoggingValueStore<S> {
    fn key(&self) -> ComponentKey {
        self.inner.key()
    }

    fn set(&mut self, state: CorrectedState) {
        self.inner.set(state);
    }

    fn update(&mut self) -> StoreResult<()> {
        self.inner.update()?;
        if let Some(state) = self.inner.staged() {
            let key = self.inner.key();
            for field in state.fields() {
                debug!("📤 {} {} = {} (q{})", key, field.name, field.value, field.quality.level());
            }
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
    use crate::store::{BusValueStore, RetainedBus};
    use std::sync::Arc;
    use wattline_types::{DeviceState, VehicleState};

    #[test]
    fn test_decorator_is_transparent() {
        let bus = Arc::new(RetainedBus::new());
        let key = ComponentKey::vehicle(4);
        let mut store =
            LoggingValueStore::new(BusValueStore::new("wattline/set", key, bus.clone()));

        let state = CorrectedState::new(DeviceState::Vehicle(VehicleState {
            soc: 55.0,
            soc_timestamp: None,
        }));
        store.set(state.clone());
        store.update().unwrap();

        assert_eq!(store.key(), key);
        assert_eq!(store.staged(), Some(&state));
        assert_eq!(bus.topics(), vec!["wattline/set/vehicle/4/get/soc".to_owned()]);
        assert_eq!(store.into_inner().staged(), Some(&state));
    }
}
