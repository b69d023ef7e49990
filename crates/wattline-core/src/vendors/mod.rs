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

//! Vendor factory: maps a device's type string to the code that builds it.

pub mod json_file;

use crate::device::PollableDevice;
use crate::store::StoreFactory;
use std::collections::BTreeMap;
use tracing::{error, info};
use wattline_types::{ConfigError, ConfigResult, DeviceConfig, Topology};

/// What a vendor constructor gets besides the device's own configuration
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub stores: &'a StoreFactory,
}

pub type DeviceConstructor = Box<
    dyn Fn(&DeviceConfig, &BuildContext<'_>) -> ConfigResult<Box<dyn PollableDevice>>
        + Send
        + Sync,
>;

/// Devices that passed validation, plus the topology spanning all of them
pub struct Fleet {
    pub devices: Vec<Box<dyn PollableDevice>>,
    pub topology: Topology,
    pub rejected: Vec<(u32, ConfigError)>,
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet")
            .field("devices", &self.devices.len())
            .field("topology", &self.topology)
            .field("rejected", &self.rejected)
            .finish()
    }
}

#[derive(Default)]
pub struct VendorRegistry {
    constructors: BTreeMap<String, DeviceConstructor>,
}

impl std::fmt::Debug for VendorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorRegistry")
            .field("vendors", &self.supported())
            .finish()
    }
}

impl VendorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every vendor shipped in this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(json_file::VENDOR, json_file::build_device);
        registry
    }

    pub fn register<F>(&mut self, vendor: impl Into<String>, constructor: F)
    where
        F: Fn(&DeviceConfig, &BuildContext<'_>) -> ConfigResult<Box<dyn PollableDevice>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(vendor.into(), Box::new(constructor));
    }

    pub fn supported(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn build(
        &self,
        config: &DeviceConfig,
        ctx: &BuildContext<'_>,
    ) -> ConfigResult<Box<dyn PollableDevice>> {
        let constructor =
            self.constructors
                .get(&config.vendor)
                .ok_or_else(|| ConfigError::UnknownVendor {
                    vendor: config.vendor.clone(),
                    supported: self.supported().join(", "),
                })?;
        constructor(config, ctx)
    }

    /// Build every configured device. A device whose configuration is invalid
    /// is left out and reported; the topology must still be consistent.
    pub fn build_fleet(
        &self,
        configs: &[DeviceConfig],
        ctx: &BuildContext<'_>,
    ) -> ConfigResult<Fleet> {
        let mut devices = Vec::new();
        let mut rejected = Vec::new();

        for config in configs {
            match self.build(config, ctx) {
                Ok(device) => {
                    info!(
                        "🔧 Device {} ({}) ready: {} via {}",
                        config.id,
                        config.name,
                        device.records().len(),
                        config.vendor
                    );
                    devices.push(device);
                }
                Err(e) => {
                    error!("❌ Device {} ({}) rejected: {}", config.id, config.name, e);
                    rejected.push((config.id, e));
                }
            }
        }

        let topology = Topology::build(devices.iter().flat_map(|d| d.records()))?;
        Ok(Fleet {
            devices,
            topology,
            rejected,
        })
    }
}
