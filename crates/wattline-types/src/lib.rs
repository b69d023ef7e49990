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

pub mod component;
pub mod config;
pub mod device;
pub mod errors;
pub mod grid;
pub mod registry;

// Re-export common types for convenience
pub use component::{ComponentRecord, FaultKind, FaultRecord, SessionKind, Topology};
pub use config::{
    BatConsiderationMode, ChargemodeConfig, ComponentConfig, DeviceConfig, FrequencyBand,
    GeneralConfig, GridProtectionConfig, PvCharging, StorageConfig,
};
pub use device::{
    BatState, ComponentKey, CorrectedState, CounterState, DeliveryQuality, DeviceClass,
    DeviceState, InverterState, RawDeviceState, StateField, VehicleState,
};
pub use errors::{ConfigError, ConfigResult};
pub use grid::GridProtectionState;
pub use registry::ConfigRegistry;
