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

//! Correction pipeline turning a raw reading into the state that gets published.
//!
//! Steps run in a fixed order:
//! 1. Peak clamp: power beyond the nameplate capacity is cut back to it.
//! 2. Hybrid compensation: an inverter with exactly one battery child reports
//!    AC power that includes the battery flow, which gets subtracted out.
//! 3. DC-zero override: an inverter whose DC side reads exactly zero cannot be
//!    producing, whatever the AC path says.
//!
//! The pipeline keeps no state between invocations. Everything it needs about
//! other components comes in through [`StateLookup`].

use std::collections::HashMap;
use tracing::{debug, info, warn};
use wattline_types::{
    ComponentKey, ComponentRecord, CorrectedState, DeviceState, InverterState, RawDeviceState,
    Topology,
};

/// Read access to the latest corrected state of other components
pub trait StateLookup {
    fn corrected(&self, key: &ComponentKey) -> Option<CorrectedState>;
}

impl StateLookup for HashMap<ComponentKey, CorrectedState> {
    fn corrected(&self, key: &ComponentKey) -> Option<CorrectedState> {
        self.get(key).cloned()
    }
}

/// Something the pipeline noticed while correcting
#[derive(Debug, Clone, PartialEq)]
pub enum Anomaly {
    PeakClamped { raw_w: f64, capacity_w: f64 },
    AmbiguousHybrid { batteries: Vec<ComponentKey> },
    MissingBatteryReading { battery: ComponentKey },
    DcZeroOverride { ac_w: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub state: CorrectedState,
    pub anomalies: Vec<Anomaly>,
}

impl Correction {
    /// Emit one log line per anomaly, attributed to `key`
    pub fn log(&self, key: ComponentKey) {
        for anomaly in &self.anomalies {
            match anomaly {
                Anomaly::PeakClamped { raw_w, capacity_w } => info!(
                    "✂️  {}: power {:.0}W exceeds nameplate {:.0}W, clamped",
                    key, raw_w, capacity_w
                ),
                Anomaly::AmbiguousHybrid { batteries } => warn!(
                    "⚠️  {}: {} battery children, hybrid compensation skipped",
                    key,
                    batteries.len()
                ),
                Anomaly::MissingBatteryReading { battery } => warn!(
                    "⚠️  {}: no reading from {} yet, hybrid compensation skipped",
                    key, battery
                ),
                Anomaly::DcZeroOverride { ac_w } => debug!(
                    "🔌 {}: DC side idle, AC reading {:.0}W forced to 0",
                    key, ac_w
                ),
            }
        }
    }
}

/// Clamp `power` into `[-capacity, capacity]`. A non-positive capacity means "not rated".
pub fn clamp_peak(power: f64, capacity_w: f64) -> f64 {
    if capacity_w > 0.0 {
        power.clamp(-capacity_w, capacity_w)
    } else {
        power
    }
}

/// Run the full pipeline for one component reading
pub fn correct<L>(
    raw: RawDeviceState,
    record: &ComponentRecord,
    topology: &Topology,
    lookup: &L,
) -> Correction
where
    L: StateLookup + ?Sized,
{
    let mut anomalies = Vec::new();
    let mut state = raw.into_inner();

    if let Some(power) = state.power() {
        let clamped = clamp_peak(power, record.nameplate_capacity_w);
        if clamped != power {
            anomalies.push(Anomaly::PeakClamped {
                raw_w: power,
                capacity_w: record.nameplate_capacity_w,
            });
            state.set_power(clamped);
        }
    }

    if let DeviceState::Inverter(inverter) = &mut state {
        compensate_hybrid(inverter, record.key, topology, lookup, &mut anomalies);
        // DC-zero only means "idle" on an inverter that fronts other components.
        if !topology.children(&record.key).is_empty() {
            override_dc_zero(inverter, &mut anomalies);
        }
    }

    Correction {
        state: CorrectedState::new(state),
        anomalies,
    }
}

fn compensate_hybrid<L>(
    inverter: &mut InverterState,
    key: ComponentKey,
    topology: &Topology,
    lookup: &L,
    anomalies: &mut Vec<Anomaly>,
) where
    L: StateLookup + ?Sized,
{
    let batteries = topology.battery_children(&key);
    let battery = match batteries.as_slice() {
        [] => return,
        [battery] => *battery,
        _ => {
            anomalies.push(Anomaly::AmbiguousHybrid { batteries });
            return;
        }
    };

    let reading = lookup.corrected(&battery);
    let Some(bat) = reading.as_ref().and_then(|s| s.state().as_battery()) else {
        anomalies.push(Anomaly::MissingBatteryReading { battery });
        return;
    };

    // Battery charge flows out of the inverter's AC figure, discharge into it.
    inverter.power -= bat.power;
    inverter.exported = inverter.exported + bat.imported - bat.exported - inverter.imported;
}

fn override_dc_zero(inverter: &mut InverterState, anomalies: &mut Vec<Anomaly>) {
    // Only an exact zero counts; any other DC value is trusted as-is.
    if inverter.dc_power == Some(0.0) {
        if inverter.power != 0.0 {
            anomalies.push(Anomaly::DcZeroOverride { ac_w: inverter.power });
        }
        inverter.power = 0.0;
    }
}
