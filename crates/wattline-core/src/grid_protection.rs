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

//! Grid-frequency protection.
//!
//! Two states, `Normal` and `Tripped`, driven by the reference counter's
//! frequency scaled to centi-hertz. The recovery band is narrower than, and
//! offset from, both trip bands so a frequency hovering at a band edge cannot
//! flip the state back and forth.
//!
//! | From    | Scaled frequency   | To      | Stagger        | Timestamp |
//! |---------|--------------------|---------|----------------|-----------|
//! | Normal  | under-frequency    | Tripped | random 1..=max | now       |
//! | Normal  | over-frequency     | Tripped | 0              | none      |
//! | Tripped | recovery           | Normal  | 0              | none      |
//!
//! Anything else leaves the state alone. A failure to obtain a usable reading
//! never clears a trip.

use crate::store::SharedStateStore;
use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{info, trace, warn};
use wattline_types::{ComponentKey, GridProtectionConfig, GridProtectionState, Topology};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Tripped { stagger_secs: u32 },
    Recovered,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtectionError {
    #[error("no reference counter configured or found in the topology")]
    NoReferenceCounter,

    #[error("no reading from reference counter {0} yet")]
    MissingReading(ComponentKey),

    #[error("reference counter {0} reported unusable frequency {1}")]
    InvalidFrequency(ComponentKey, f64),
}

#[derive(Debug, Clone, Default)]
pub struct GridProtection {
    config: GridProtectionConfig,
}

impl GridProtection {
    pub fn new(config: GridProtectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridProtectionConfig {
        &self.config
    }

    /// Configured reference counter, or the topology's root counter
    pub fn reference_counter(&self, topology: &Topology) -> Option<ComponentKey> {
        self.config
            .reference_counter
            .map(ComponentKey::counter)
            .or_else(|| topology.root_counter())
    }

    /// Apply one frequency reading to `state`
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        state: &mut GridProtectionState,
        frequency_hz: f64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Transition {
        let scaled = frequency_hz * 100.0;

        if state.active {
            if self.config.recovery.contains(scaled) {
                *state = GridProtectionState::default();
                info!("🟢 Grid protection cleared at {:.2} Hz", frequency_hz);
                return Transition::Recovered;
            }
            return Transition::Unchanged;
        }

        if self.config.under_frequency_trip.contains(scaled) {
            let stagger_secs = rng.gen_range(1..=self.config.max_stagger_secs.max(1));
            *state = GridProtectionState {
                active: true,
                stagger_secs,
                tripped_at: Some(now),
            };
            warn!(
                "🔴 Grid protection tripped: under-frequency {:.2} Hz, charge points resume {}s after recovery",
                frequency_hz, stagger_secs
            );
            Transition::Tripped { stagger_secs }
        } else if self.config.over_frequency_trip.contains(scaled) {
            *state = GridProtectionState {
                active: true,
                stagger_secs: 0,
                tripped_at: None,
            };
            warn!("🔴 Grid protection tripped: over-frequency {:.2} Hz", frequency_hz);
            Transition::Tripped { stagger_secs: 0 }
        } else {
            Transition::Unchanged
        }
    }

    fn reference_frequency(
        &self,
        topology: &Topology,
        shared: &SharedStateStore,
    ) -> Result<f64, ProtectionError> {
        let key = self
            .reference_counter(topology)
            .ok_or(ProtectionError::NoReferenceCounter)?;
        let counter = shared
            .counter(key.id)
            .ok_or(ProtectionError::MissingReading(key))?;
        if !counter.frequency.is_finite() || counter.frequency <= 0.0 {
            return Err(ProtectionError::InvalidFrequency(key, counter.frequency));
        }
        Ok(counter.frequency)
    }

    /// One protection cycle: read the reference frequency, evaluate, publish
    /// the resulting snapshot. Errors are logged and leave `state` untouched.
    pub fn run_cycle<R: Rng + ?Sized>(
        &self,
        state: &mut GridProtectionState,
        topology: &Topology,
        shared: &SharedStateStore,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Transition {
        if !self.config.configured {
            trace!("Grid protection not configured");
            return Transition::Unchanged;
        }

        let transition = match self.reference_frequency(topology, shared) {
            Ok(frequency_hz) => self.evaluate(state, frequency_hz, now, rng),
            Err(e) => {
                warn!("⚠️  Grid protection evaluation skipped: {}", e);
                Transition::Unchanged
            }
        };
        shared.publish_grid_protection(state.clone());
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use wattline_types::{ComponentRecord, CorrectedState, CounterState, DeviceState};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn tripped() -> GridProtectionState {
        GridProtectionState {
            active: true,
            stagger_secs: 33,
            tripped_at: Some(now()),
        }
    }

    #[test]
    fn test_under_frequency_trip_then_recovery() {
        let protection = GridProtection::default();
        let mut state = GridProtectionState::default();
        let mut rng = rng();

        let transition = protection.evaluate(&mut state, 45.50, now(), &mut rng);
        let Transition::Tripped { stagger_secs } = transition else {
            panic!("expected trip, got {transition:?}");
        };
        assert!((1..=90).contains(&stagger_secs));
        assert!(state.active);
        assert_eq!(state.stagger_secs, stagger_secs);
        assert!(state.tripped_at.is_some());

        assert_eq!(
            protection.evaluate(&mut state, 49.80, now(), &mut rng),
            Transition::Recovered
        );
        assert_eq!(state, GridProtectionState::default());
    }

    #[test]
    fn test_over_frequency_trip_has_no_stagger() {
        let protection = GridProtection::default();
        let mut state = GridProtectionState::default();

        assert_eq!(
            protection.evaluate(&mut state, 52.00, now(), &mut rng()),
            Transition::Tripped { stagger_secs: 0 }
        );
        assert!(state.active);
        assert_eq!(state.tripped_at, None);
    }

    #[test]
    fn test_band_edges_are_exclusive() {
        let protection = GridProtection::default();
        for hz in [45.00, 53.00, 50.00, 44.0, 55.0] {
            let mut state = GridProtectionState::default();
            assert_eq!(
                protection.evaluate(&mut state, hz, now(), &mut rng()),
                Transition::Unchanged,
                "{hz} Hz"
            );
        }
    }

    #[test]
    fn test_trip_holds_outside_recovery_band() {
        let protection = GridProtection::default();
        // Gap below the recovery band, its upper edge, above it, and deeper under-frequency.
        for hz in [49.30, 49.50, 51.00, 51.50, 45.8] {
            let mut state = tripped();
            let before = state.clone();
            assert_eq!(
                protection.evaluate(&mut state, hz, now(), &mut rng()),
                Transition::Unchanged,
                "{hz} Hz"
            );
            assert_eq!(state, before);
        }
    }

    #[test]
    fn test_stagger_stays_in_range() {
        let protection = GridProtection::default();
        let mut rng = rng();
        for _ in 0..500 {
            let mut state = GridProtectionState::default();
            protection.evaluate(&mut state, 48.0, now(), &mut rng);
            assert!((1..=90).contains(&state.stagger_secs));
        }
    }

    fn grid_counter(frequency: f64) -> (Topology, SharedStateStore) {
        let record = ComponentRecord::new(ComponentKey::counter(0), "test");
        let topology = Topology::build([&record]).unwrap();
        let shared = SharedStateStore::new();
        shared.commit(
            ComponentKey::counter(0),
            CorrectedState::new(DeviceState::Counter(CounterState {
                frequency,
                ..Default::default()
            })),
        );
        (topology, shared)
    }

    #[test]
    fn test_cycle_publishes_snapshot() {
        let (topology, shared) = grid_counter(47.0);
        let protection = GridProtection::default();
        let mut state = GridProtectionState::default();

        let transition = protection.run_cycle(&mut state, &topology, &shared, now(), &mut rng());

        assert!(matches!(transition, Transition::Tripped { .. }));
        assert_eq!(shared.grid_protection(), state);
    }

    #[test]
    fn test_missing_reading_keeps_trip() {
        let record = ComponentRecord::new(ComponentKey::counter(0), "test");
        let topology = Topology::build([&record]).unwrap();
        let shared = SharedStateStore::new();
        let protection = GridProtection::default();
        let mut state = tripped();
        let before = state.clone();

        let transition = protection.run_cycle(&mut state, &topology, &shared, now(), &mut rng());

        assert_eq!(transition, Transition::Unchanged);
        assert_eq!(state, before);
    }

    #[test]
    fn test_invalid_frequency_keeps_trip() {
        let protection = GridProtection::default();
        for frequency in [f64::NAN, 0.0, -50.0] {
            let (topology, shared) = grid_counter(frequency);
            let mut state = tripped();
            let before = state.clone();
            protection.run_cycle(&mut state, &topology, &shared, now(), &mut rng());
            assert_eq!(state, before);
        }
    }

    #[test]
    fn test_configured_reference_counter_wins() {
        let records = [
            ComponentRecord::new(ComponentKey::counter(0), "test"),
            ComponentRecord::new(ComponentKey::counter(5), "test"),
        ];
        let topology = Topology::build(&records).unwrap();
        let protection = GridProtection::new(GridProtectionConfig {
            reference_counter: Some(5),
            ..Default::default()
        });
        assert_eq!(
            protection.reference_counter(&topology),
            Some(ComponentKey::counter(5))
        );
        assert_eq!(
            GridProtection::default().reference_counter(&topology),
            Some(ComponentKey::counter(0))
        );
    }

    #[test]
    fn test_disabled_protection_does_nothing() {
        let (topology, shared) = grid_counter(46.0);
        let protection = GridProtection::new(GridProtectionConfig {
            configured: false,
            ..Default::default()
        });
        let mut state = GridProtectionState::default();

        protection.run_cycle(&mut state, &topology, &shared, now(), &mut rng());
        assert!(!state.active);
    }
}
