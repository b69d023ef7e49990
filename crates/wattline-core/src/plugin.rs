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

use crate::bridge::AsyncBridge;
use crate::device::{CycleContext, DeviceOutcome, PollableDevice};
use crate::grid_protection::GridProtection;
use crate::store::SharedStateStore;
use crate::vendors::Fleet;
use bevy_app::prelude::*;
use bevy_ecs::prelude::*;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};
use wattline_types::{GeneralConfig, GridProtectionConfig, GridProtectionState, Topology};

// ============= Resources =============

/// Every polled device plus the topology spanning their components.
/// Replaced wholesale on reconfiguration.
#[derive(Resource, Default)]
pub struct DeviceRegistry {
    pub devices: Vec<Box<dyn PollableDevice>>,
    pub topology: Topology,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.devices.len())
            .field("topology", &self.topology)
            .finish()
    }
}

impl From<Fleet> for DeviceRegistry {
    fn from(fleet: Fleet) -> Self {
        Self {
            devices: fleet.devices,
            topology: fleet.topology,
        }
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct SharedStateResource(pub SharedStateStore);

/// Runtime handle for components with asynchronous transports
#[derive(Resource, Debug, Clone, Default)]
pub struct AsyncBridgeResource(pub Option<AsyncBridge>);

/// Protection evaluator with its explicitly owned state and stagger RNG
#[derive(Resource, Debug)]
pub struct GridProtectionResource {
    pub protection: GridProtection,
    pub state: GridProtectionState,
    pub rng: StdRng,
}

impl GridProtectionResource {
    pub fn new(config: GridProtectionConfig, state: GridProtectionState) -> Self {
        Self {
            protection: GridProtection::new(config),
            state,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }
}

impl Default for GridProtectionResource {
    fn default() -> Self {
        Self::new(GridProtectionConfig::default(), GridProtectionState::default())
    }
}

/// Enforces the control interval between polling cycles
#[derive(Resource, Debug, Clone)]
pub struct PollTimer {
    interval: Duration,
    last_cycle: Option<Instant>,
}

impl PollTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_cycle: None,
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// True, and the timer restarted, when a cycle is due at `now`
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn due(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_cycle
            && now.duration_since(last) < self.interval
        {
            return false;
        }
        self.last_cycle = Some(now);
        true
    }
}

impl Default for PollTimer {
    fn default() -> Self {
        Self::from_secs(10)
    }
}

/// Outcomes of the most recent polling cycle
#[derive(Resource, Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcomes: Vec<(u32, DeviceOutcome)>,
}

// ============= Systems =============

/// Apply runtime edits of [`GeneralConfig`] to the polling resources.
///
/// Values present at startup are inserted directly, so only later changes
/// are picked up here.
pub fn apply_general_config_system(
    config: Option<Res<GeneralConfig>>,
    mut timer: ResMut<PollTimer>,
    mut grid: ResMut<GridProtectionResource>,
) {
    let Some(config) = config else {
        return;
    };
    if config.is_added() || !config.is_changed() {
        return;
    }

    let interval = Duration::from_secs(config.control_interval);
    if timer.interval() != interval {
        info!("⚙️  Control interval set to {}s", config.control_interval);
        timer.set_interval(interval);
    }

    if grid.protection.config() != &config.grid_protection {
        info!("⚙️  Grid protection bands updated");
        grid.protection = GridProtection::new(config.grid_protection.clone());
        if !config.grid_protection.configured {
            // Nothing would ever recover a trip once evaluation stops.
            grid.state = GridProtectionState::default();
        }
    }
}

/// Poll every device once, devices in parallel on scoped threads
pub fn poll_devices_system(
    mut timer: ResMut<PollTimer>,
    mut registry: ResMut<DeviceRegistry>,
    shared: Res<SharedStateResource>,
    bridge: Res<AsyncBridgeResource>,
    mut report: ResMut<CycleReport>,
) {
    if !timer.due(Instant::now()) {
        return;
    }

    let DeviceRegistry { devices, topology } = &mut *registry;
    let ctx = CycleContext {
        topology,
        shared: &shared.0,
        bridge: bridge.0.as_ref(),
    };
    let ctx = &ctx;

    let outcomes: Vec<(u32, DeviceOutcome)> = std::thread::scope(|scope| {
        let handles: Vec<_> = devices
            .iter_mut()
            .map(|device| {
                let id = device.id();
                (id, scope.spawn(move || device.update(ctx)))
            })
            .collect();

        handles
            .into_iter()
            .filter_map(|(id, handle)| match handle.join() {
                Ok(outcome) => Some((id, outcome)),
                Err(_) => {
                    error!("❌ Device {} panicked during its cycle", id);
                    None
                }
            })
            .collect()
    });

    report.cycle += 1;
    let succeeded = outcomes.iter().filter(|(_, o)| o.is_success()).count();
    if succeeded == outcomes.len() {
        debug!("🔄 Cycle {}: {} devices polled", report.cycle, outcomes.len());
    } else {
        info!(
            "🔄 Cycle {}: {}/{} devices fully polled",
            report.cycle,
            succeeded,
            outcomes.len()
        );
    }
    report.outcomes = outcomes;
}

/// Evaluate grid protection once per completed polling cycle
pub fn grid_protection_system(
    mut grid: ResMut<GridProtectionResource>,
    registry: Res<DeviceRegistry>,
    shared: Res<SharedStateResource>,
    report: Res<CycleReport>,
    mut evaluated_cycle: Local<u64>,
) {
    if report.cycle == *evaluated_cycle {
        return;
    }
    *evaluated_cycle = report.cycle;

    let GridProtectionResource {
        protection,
        state,
        rng,
    } = &mut *grid;
    let transition = protection.run_cycle(state, &registry.topology, &shared.0, Utc::now(), rng);
    trace!("Grid protection after cycle {}: {:?}", report.cycle, transition);
}

// ============= Plugin =============

/// Registers polling resources and the chained poll → protection systems
#[derive(Debug, Default)]
pub struct PollingPlugin;

impl Plugin for PollingPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DeviceRegistry>()
            .init_resource::<SharedStateResource>()
            .init_resource::<AsyncBridgeResource>()
            .init_resource::<GridProtectionResource>()
            .init_resource::<PollTimer>()
            .init_resource::<CycleReport>()
            .add_systems(
                Update,
                (
                    apply_general_config_system,
                    poll_devices_system,
                    grid_protection_system,
                )
                    .chain(),
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_timer_enforces_interval() {
        let mut timer = PollTimer::from_secs(10);
        let start = Instant::now();

        assert!(timer.due(start));
        assert!(!timer.due(start + Duration::from_secs(3)));
        assert!(timer.due(start + Duration::from_secs(10)));
        assert!(!timer.due(start + Duration::from_secs(15)));
    }

    #[test]
    fn test_zero_interval_always_due() {
        let mut timer = PollTimer::new(Duration::ZERO);
        let now = Instant::now();
        assert!(timer.due(now));
        assert!(timer.due(now));
    }
}
