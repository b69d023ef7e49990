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

//! Per-device polling orchestration.
//!
//! A device owns its components. Components sharing the device's transport
//! session are read inside one acquired session, batteries first so that a
//! hybrid inverter on the same device sees this cycle's battery reading. The
//! session is released before any per-call asynchronous component runs.

use crate::bridge::AsyncBridge;
use crate::correction;
use crate::errors::{ComponentError, ComponentResult};
use crate::source::{AsyncTelemetrySource, Connector, SessionGuard, TelemetrySource};
use crate::store::{SharedStateStore, ValueStore};
use chrono::Utc;
use std::fmt;
use tracing::{debug, error, info, trace, warn};
use wattline_types::{
    ComponentKey, ComponentRecord, DeviceClass, FaultKind, FaultRecord, RawDeviceState, Topology,
};

/// What one device cycle needs from the outside world
#[derive(Debug, Clone, Copy)]
pub struct CycleContext<'a> {
    pub topology: &'a Topology,
    pub shared: &'a SharedStateStore,
    pub bridge: Option<&'a AsyncBridge>,
}

/// Result of one device cycle
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOutcome {
    Succeeded {
        components: usize,
    },
    PartiallySucceeded {
        succeeded: usize,
        total: usize,
        failures: Vec<(ComponentKey, FaultKind)>,
    },
    /// The shared session could not be acquired; no component was read
    Failed {
        error: ComponentError,
    },
}

impl DeviceOutcome {
    pub fn succeeded(&self) -> usize {
        match self {
            Self::Succeeded { components } => *components,
            Self::PartiallySucceeded { succeeded, .. } => *succeeded,
            Self::Failed { .. } => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

impl fmt::Display for DeviceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { components } => write!(f, "{components}/{components} components"),
            Self::PartiallySucceeded {
                succeeded, total, ..
            } => write!(f, "{succeeded}/{total} components"),
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Anything the polling scheduler can drive once per cycle
pub trait PollableDevice: Send + Sync {
    fn id(&self) -> u32;

    fn name(&self) -> &str;

    fn records(&self) -> Vec<&ComponentRecord>;

    fn fault_record(&self, key: &ComponentKey) -> Option<&FaultRecord>;

    fn update(&mut self, ctx: &CycleContext<'_>) -> DeviceOutcome;
}

struct ComponentSlot<T> {
    record: ComponentRecord,
    source: T,
    store: Box<dyn ValueStore>,
    fault: FaultRecord,
}

impl<T> ComponentSlot<T> {
    /// Correct, stage and commit one raw reading
    fn publish(&mut self, raw: RawDeviceState, ctx: &CycleContext<'_>) -> ComponentResult<()> {
        if raw.class() != self.record.class() {
            return Err(ComponentError::internal(format!(
                "source returned a {} reading for {}",
                raw.class(),
                self.record.key
            )));
        }
        if let Some(reason) = raw.state().out_of_range() {
            return Err(ComponentError::protocol(reason));
        }

        let corrected = correction::correct(raw, &self.record, ctx.topology, ctx.shared);
        corrected.log(self.record.key);

        self.store.set(corrected.state);
        self.store.update()?;
        Ok(())
    }

    fn settle(&mut self, device: &str, result: ComponentResult<()>) -> Option<FaultKind> {
        let key = self.record.key;
        match result {
            Ok(()) => {
                if self.fault.consecutive_failures > 0 {
                    info!(
                        "✅ {} on {} recovered after {} failed cycles",
                        key, device, self.fault.consecutive_failures
                    );
                }
                self.fault.record_success(Utc::now());
                trace!("{} on {} polled", key, device);
                None
            }
            Err(e) => {
                let kind = e.kind();
                match kind {
                    FaultKind::Transport | FaultKind::Internal => {
                        warn!("⚠️  {} on {}: {}", key, device, e);
                    }
                    FaultKind::Protocol | FaultKind::Configuration => {
                        error!("❌ {} on {}: {}", key, device, e);
                    }
                }
                self.fault.record_failure(kind, e.to_string());
                Some(kind)
            }
        }
    }
}

/// Poll order within a device: batteries feed hybrid compensation, so they go first
fn poll_rank(class: DeviceClass) -> u8 {
    match class {
        DeviceClass::Battery => 0,
        DeviceClass::Counter => 1,
        DeviceClass::Inverter => 2,
        DeviceClass::Vehicle => 3,
    }
}

fn sort_slots<T>(slots: &mut [ComponentSlot<T>]) {
    slots.sort_by_key(|s| (poll_rank(s.record.class()), s.record.key.id));
}

/// Device built from configuration: a connector plus its components
pub struct ConfigurableDevice<C: Connector> {
    id: u32,
    name: String,
    connector: C,
    shared_components: Vec<ComponentSlot<Box<dyn TelemetrySource<C::Session>>>>,
    per_call_components: Vec<ComponentSlot<Box<dyn AsyncTelemetrySource>>>,
}

impl<C: Connector> fmt::Debug for ConfigurableDevice<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurableDevice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shared_components", &self.shared_components.len())
            .field("per_call_components", &self.per_call_components.len())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConfigurableDevice<C> {
    pub fn new(id: u32, name: impl Into<String>, connector: C) -> Self {
        Self {
            id,
            name: name.into(),
            connector,
            shared_components: Vec::new(),
            per_call_components: Vec::new(),
        }
    }

    /// Add a component that reads over the shared session
    pub fn add_component(
        &mut self,
        record: ComponentRecord,
        source: Box<dyn TelemetrySource<C::Session>>,
        store: Box<dyn ValueStore>,
    ) {
        self.shared_components.push(ComponentSlot {
            record,
            source,
            store,
            fault: FaultRecord::default(),
        });
        sort_slots(&mut self.shared_components);
    }

    /// Add a component with its own asynchronous transport
    pub fn add_async_component(
        &mut self,
        record: ComponentRecord,
        source: Box<dyn AsyncTelemetrySource>,
        store: Box<dyn ValueStore>,
    ) {
        self.per_call_components.push(ComponentSlot {
            record,
            source,
            store,
            fault: FaultRecord::default(),
        });
        sort_slots(&mut self.per_call_components);
    }

    pub fn component_count(&self) -> usize {
        self.shared_components.len() + self.per_call_components.len()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn poll_shared(&mut self, ctx: &CycleContext<'_>, tally: &mut Tally) -> ComponentResult<()> {
        if self.shared_components.is_empty() {
            return Ok(());
        }

        let mut guard = match SessionGuard::acquire(&mut self.connector) {
            Ok(guard) => guard,
            Err(e) => {
                for slot in &mut self.shared_components {
                    slot.fault.record_failure(e.kind(), e.to_string());
                }
                return Err(e);
            }
        };
        debug!("🔗 Session open for device {} ({})", self.name, self.id);

        for slot in &mut self.shared_components {
            if slot.fault.is_fatal() {
                tally.skip(slot.record.key);
                continue;
            }
            let result = slot
                .source
                .read_raw(guard.session_mut())
                .and_then(|raw| slot.publish(raw, ctx));
            let fault = slot.settle(&self.name, result);
            tally.record(slot.record.key, fault);
        }
        Ok(())
    }

    fn poll_per_call(&mut self, ctx: &CycleContext<'_>, tally: &mut Tally) {
        for slot in &mut self.per_call_components {
            if slot.fault.is_fatal() {
                tally.skip(slot.record.key);
                continue;
            }
            let result = match ctx.bridge {
                Some(bridge) => bridge.run(slot.source.read_raw()),
                None => Err(ComponentError::internal("no async runtime available")),
            }
            .and_then(|raw| slot.publish(raw, ctx));
            let fault = slot.settle(&self.name, result);
            tally.record(slot.record.key, fault);
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    total: usize,
    succeeded: usize,
    failures: Vec<(ComponentKey, FaultKind)>,
}

impl Tally {
    fn record(&mut self, key: ComponentKey, fault: Option<FaultKind>) {
        self.total += 1;
        match fault {
            None => self.succeeded += 1,
            Some(kind) => self.failures.push((key, kind)),
        }
    }

    fn skip(&mut self, key: ComponentKey) {
        trace!("{} skipped until reconfigured", key);
        self.record(key, Some(FaultKind::Configuration));
    }

    fn into_outcome(self) -> DeviceOutcome {
        if self.failures.is_empty() {
            DeviceOutcome::Succeeded {
                components: self.succeeded,
            }
        } else {
            DeviceOutcome::PartiallySucceeded {
                succeeded: self.succeeded,
                total: self.total,
                failures: self.failures,
            }
        }
    }
}

impl<C: Connector> PollableDevice for ConfigurableDevice<C> {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn records(&self) -> Vec<&ComponentRecord> {
        self.shared_components
            .iter()
            .map(|s| &s.record)
            .chain(self.per_call_components.iter().map(|s| &s.record))
            .collect()
    }

    fn fault_record(&self, key: &ComponentKey) -> Option<&FaultRecord> {
        self.shared_components
            .iter()
            .map(|s| (&s.record, &s.fault))
            .chain(self.per_call_components.iter().map(|s| (&s.record, &s.fault)))
            .find(|(record, _)| record.key == *key)
            .map(|(_, fault)| fault)
    }

    fn update(&mut self, ctx: &CycleContext<'_>) -> DeviceOutcome {
        if self.component_count() == 0 {
            warn!("⚠️  Device {} ({}) has no components configured", self.name, self.id);
            return DeviceOutcome::Succeeded { components: 0 };
        }

        let mut tally = Tally::default();
        if let Err(error) = self.poll_shared(ctx, &mut tally) {
            warn!(
                "⚠️  Device {} ({}): session unavailable: {}",
                self.name, self.id, error
            );
            return DeviceOutcome::Failed { error };
        }
        self.poll_per_call(ctx, &mut tally);

        let outcome = tally.into_outcome();
        debug!("📊 Device {} ({}): {}", self.name, self.id, outcome);
        outcome
    }
}
