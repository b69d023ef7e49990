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

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::component::{ComponentRecord, SessionKind};
use crate::device::{ComponentKey, DeviceClass};

// ============= General Settings =============

/// How home-battery state is weighed against vehicle charging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatConsiderationMode {
    #[default]
    EvMode,
    BatMode,
    MinSocBatMode,
}

/// Surplus (PV) charging thresholds consumed by the load-management layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvCharging {
    pub bat_power_reserve: i32,
    pub bat_power_reserve_active: bool,
    /// Target band for grid power while surplus charging (W)
    pub control_range: Vec<i32>,
    pub feed_in_yield: i32,
    pub phase_switch_delay: u32,
    pub bat_power_discharge: i32,
    pub bat_power_discharge_active: bool,
    pub min_bat_soc: u32,
    pub bat_mode: BatConsiderationMode,
    pub switch_off_delay: u32,
    pub switch_off_threshold: i32,
    pub switch_on_delay: u32,
    pub switch_on_threshold: i32,
}

impl Default for PvCharging {
    fn default() -> Self {
        Self {
            bat_power_reserve: 2000,
            bat_power_reserve_active: false,
            control_range: vec![0, 230],
            feed_in_yield: 15000,
            phase_switch_delay: 7,
            bat_power_discharge: 1500,
            bat_power_discharge_active: false,
            min_bat_soc: 50,
            bat_mode: BatConsiderationMode::EvMode,
            switch_off_delay: 60,
            switch_off_threshold: 0,
            switch_on_delay: 30,
            switch_on_threshold: 1500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargemodeConfig {
    pub phase_switch_delay: u32,
    pub pv_charging: PvCharging,
    pub retry_failed_phase_switches: bool,
    pub unbalanced_load_limit: u32,
    pub unbalanced_load: bool,
}

impl Default for ChargemodeConfig {
    fn default() -> Self {
        Self {
            phase_switch_delay: 5,
            pv_charging: PvCharging::default(),
            retry_failed_phase_switches: false,
            unbalanced_load_limit: 18,
            unbalanced_load: false,
        }
    }
}

/// Open frequency interval in scaled Hz (Hz x 100); both bounds exclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub lower: f64,
    pub upper: f64,
}

impl FrequencyBand {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, scaled_hz: f64) -> bool {
        self.lower < scaled_hz && scaled_hz < self.upper
    }
}

/// Grid-frequency protection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridProtectionConfig {
    pub configured: bool,
    /// Counter whose frequency is evaluated; defaults to the topology root counter
    pub reference_counter: Option<u32>,
    pub under_frequency_trip: FrequencyBand,
    pub over_frequency_trip: FrequencyBand,
    pub recovery: FrequencyBand,
    /// Upper bound of the randomized stagger delay (seconds)
    pub max_stagger_secs: u32,
}

impl Default for GridProtectionConfig {
    fn default() -> Self {
        Self {
            configured: true,
            reference_counter: None,
            under_frequency_trip: FrequencyBand::new(4500.0, 4920.0),
            over_frequency_trip: FrequencyBand::new(5180.0, 5300.0),
            recovery: FrequencyBand::new(4962.0, 5100.0),
            max_stagger_secs: 90,
        }
    }
}

/// Process-wide settings synchronized with the configuration UI
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub chargemode_config: ChargemodeConfig,
    /// Seconds between polling cycles
    pub control_interval: u64,
    pub extern_display_mode: String,
    #[serde(rename = "extern")]
    pub extern_control: bool,
    pub external_buttons_hw: bool,
    pub grid_protection: GridProtectionConfig,
    pub http_api: bool,
    pub range_unit: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            chargemode_config: ChargemodeConfig::default(),
            control_interval: 10,
            extern_display_mode: "primary".to_owned(),
            extern_control: false,
            external_buttons_hw: false,
            grid_protection: GridProtectionConfig::default(),
            http_api: false,
            range_unit: "km".to_owned(),
        }
    }
}

// ============= Storage =============

/// Value-store backend selection. Read once when stores are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Write fixed-format local records instead of publishing to the bus
    pub local_records: bool,
    pub record_dir: PathBuf,
    pub topic_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_records: false,
            record_dir: PathBuf::from("./ramdisk"),
            topic_prefix: "wattline/set".to_owned(),
        }
    }
}

// ============= Devices =============

/// One physical device (one transport endpoint) and its components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    /// Vendor type string selecting the device factory
    #[serde(rename = "type")]
    pub vendor: String,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub class: DeviceClass,
    /// Vendor-specific component type; defaults to the class name
    #[serde(default, rename = "type")]
    pub component_type: Option<String>,
    #[serde(default)]
    pub parent: Option<ComponentKey>,
    #[serde(default, alias = "max_ac_out")]
    pub nameplate_capacity_w: f64,
    #[serde(default)]
    pub session: Option<SessionKind>,
    #[serde(default)]
    pub configuration: Value,
}

impl ComponentConfig {
    pub fn key(&self) -> ComponentKey {
        ComponentKey::new(self.class, self.id)
    }

    /// Build the immutable record for this component of `device`
    pub fn to_record(
        &self,
        device: &DeviceConfig,
        default_session: SessionKind,
    ) -> ComponentRecord {
        let key = self.key();
        ComponentRecord {
            key,
            name: if self.name.is_empty() {
                key.to_string()
            } else {
                self.name.clone()
            },
            vendor: device.vendor.clone(),
            component_type: self
                .component_type
                .clone()
                .unwrap_or_else(|| self.class.topic_segment().to_owned()),
            device_id: device.id,
            parent: self.parent,
            nameplate_capacity_w: self.nameplate_capacity_w,
            session: self.session.unwrap_or(default_session),
            configuration: self.configuration.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_band_is_open() {
        let band = FrequencyBand::new(4962.0, 5100.0);
        assert!(!band.contains(4962.0));
        assert!(band.contains(4980.0));
        assert!(!band.contains(5100.0));
    }

    #[test]
    fn test_component_record_defaults() {
        let device: DeviceConfig = serde_json::from_value(serde_json::json!({
            "id": 4,
            "type": "json_file",
            "components": [
                {"id": 7, "class": "pv", "max_ac_out": 6000.0,
                 "parent": {"class": "counter", "id": 0}}
            ]
        }))
        .unwrap();

        let record = device.components[0].to_record(&device, SessionKind::Shared);
        assert_eq!(record.key, ComponentKey::inverter(7));
        assert_eq!(record.name, "pv7");
        assert_eq!(record.component_type, "pv");
        assert_eq!(record.device_id, 4);
        assert_eq!(record.nameplate_capacity_w, 6000.0);
        assert_eq!(record.parent, Some(ComponentKey::counter(0)));
    }
}
