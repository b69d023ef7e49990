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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::device::{ComponentKey, DeviceClass};
use crate::errors::{ConfigError, ConfigResult};

// ============= Component Registration =============

/// How a component reaches its hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Shares the device's exclusive session with its siblings
    #[default]
    Shared,
    /// Opens its own connection per call (REST/cloud APIs)
    PerCall,
}

/// Static registration of one component. Built at configuration load and
/// replaced wholesale on reconfiguration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub key: ComponentKey,
    pub name: String,
    /// Vendor type of the owning device (e.g. "json_file")
    pub vendor: String,
    /// Vendor-specific component type (e.g. "bat_api", "counter")
    pub component_type: String,
    pub device_id: u32,
    pub parent: Option<ComponentKey>,
    /// Maximum AC output (W). Values <= 0 disable peak clamping.
    pub nameplate_capacity_w: f64,
    pub session: SessionKind,
    /// Opaque vendor configuration
    pub configuration: Value,
}

impl ComponentRecord {
    pub fn new(key: ComponentKey, vendor: impl Into<String>) -> Self {
        Self {
            key,
            name: key.to_string(),
            vendor: vendor.into(),
            component_type: key.class.topic_segment().to_owned(),
            device_id: 0,
            parent: None,
            nameplate_capacity_w: 0.0,
            session: SessionKind::Shared,
            configuration: Value::Null,
        }
    }

    pub fn with_parent(mut self, parent: ComponentKey) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_capacity(mut self, capacity_w: f64) -> Self {
        self.nameplate_capacity_w = capacity_w;
        self
    }

    pub fn with_session(mut self, session: SessionKind) -> Self {
        self.session = session;
        self
    }

    pub fn class(&self) -> DeviceClass {
        self.key.class
    }
}

// ============= Topology =============

/// Id-keyed parent/child table. Components refer to each other only by key,
/// so no component owns another.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    keys: BTreeSet<ComponentKey>,
    parents: HashMap<ComponentKey, ComponentKey>,
    children: HashMap<ComponentKey, Vec<ComponentKey>>,
}

impl Topology {
    pub fn build<'a>(records: impl IntoIterator<Item = &'a ComponentRecord>) -> ConfigResult<Self> {
        let records: Vec<&ComponentRecord> = records.into_iter().collect();
        let mut topology = Self::default();

        for record in &records {
            if !topology.keys.insert(record.key) {
                return Err(ConfigError::DuplicateComponent(record.key));
            }
        }

        for record in &records {
            let Some(parent) = record.parent else {
                continue;
            };
            if !topology.keys.contains(&parent) {
                return Err(ConfigError::UnknownParent {
                    child: record.key,
                    parent,
                });
            }
            topology.parents.insert(record.key, parent);
            topology.children.entry(parent).or_default().push(record.key);
        }

        for children in topology.children.values_mut() {
            children.sort();
        }

        Ok(topology)
    }

    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.keys.contains(key)
    }

    pub fn parent(&self, key: &ComponentKey) -> Option<ComponentKey> {
        self.parents.get(key).copied()
    }

    pub fn children(&self, key: &ComponentKey) -> &[ComponentKey] {
        self.children.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Battery children of a component, in key order
    pub fn battery_children(&self, key: &ComponentKey) -> Vec<ComponentKey> {
        self.children(key)
            .iter()
            .filter(|c| c.class == DeviceClass::Battery)
            .copied()
            .collect()
    }

    /// Top-level counter (the grid connection point): the lowest-id counter without a parent
    pub fn root_counter(&self) -> Option<ComponentKey> {
        self.keys
            .iter()
            .find(|k| k.class == DeviceClass::Counter && !self.parents.contains_key(k))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// ============= Fault Tracking =============

/// Error taxonomy shared by fault records and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    /// Connection or timeout; recoverable next cycle
    Transport,
    /// Malformed or out-of-range payload; recoverable
    Protocol,
    /// Invalid static configuration; fatal for the component
    Configuration,
    /// Invariant violation inside the pipeline
    Internal,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Per-component failure bookkeeping, persisted across cycles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaultRecord {
    pub last_error: Option<FaultKind>,
    pub last_message: Option<String>,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub fatal: bool,
}

impl FaultRecord {
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_error = None;
        self.last_message = None;
        self.consecutive_failures = 0;
        self.last_success = Some(at);
    }

    pub fn record_failure(&mut self, kind: FaultKind, message: impl Into<String>) {
        self.last_error = Some(kind);
        self.last_message = Some(message.into());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures = self.total_failures.saturating_add(1);
        if kind == FaultKind::Configuration {
            self.fatal = true;
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0 && !self.fatal
    }
}
