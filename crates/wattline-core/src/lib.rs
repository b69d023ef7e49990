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

//! Telemetry polling core: correction, value stores, device orchestration,
//! grid protection and the ECS plugin that drives them.

pub mod bridge;
pub mod correction;
pub mod device;
pub mod errors;
pub mod grid_protection;
pub mod plugin;
pub mod sim_count;
pub mod source;
pub mod store;
pub mod vendors;

pub use bridge::AsyncBridge;
pub use correction::{Anomaly, Correction, StateLookup, clamp_peak, correct};
pub use device::{ConfigurableDevice, CycleContext, DeviceOutcome, PollableDevice};
pub use errors::{ComponentError, ComponentResult, StoreError, StoreResult};
pub use grid_protection::{GridProtection, ProtectionError, Transition};
pub use plugin::{
    AsyncBridgeResource, CycleReport, DeviceRegistry, GridProtectionResource, PollTimer,
    PollingPlugin, SharedStateResource, apply_general_config_system, grid_protection_system,
    poll_devices_system,
};
pub use sim_count::SimCounter;
pub use source::{AsyncTelemetrySource, Connector, SessionGuard, Sessionless, TelemetrySource};
pub use store::{
    BusMessage, BusPublisher, BusValueStore, LocalRecordStore, LoggingValueStore, PublishedValue,
    RetainedBus, SharedStateMirror, SharedStateStore, StoreBackend, StoreFactory, ValueStore,
};
pub use vendors::{BuildContext, DeviceConstructor, Fleet, VendorRegistry};
