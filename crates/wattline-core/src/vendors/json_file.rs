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

//! Built-in vendor reading one JSON document per component from a directory.
//!
//! The device configuration names the directory:
//!
//! ```toml
//! [[devices]]
//! id = 1
//! type = "json_file"
//! configuration = { directory = "/run/wattline/feed" }
//! ```
//!
//! Each component reads `<directory>/<key>.json` (for example `bat2.json`),
//! holding the fields of its class. Components whose document carries no
//! energy counters get them integrated from power.

use super::BuildContext;
use crate::device::{ConfigurableDevice, PollableDevice};
use crate::errors::{ComponentError, ComponentResult};
use crate::sim_count::SimCounter;
use crate::source::{AsyncTelemetrySource, Connector, TelemetrySource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;
use wattline_types::{
    BatState, ComponentKey, ConfigError, ConfigResult, CounterState, DeviceClass, DeviceConfig,
    InverterState, RawDeviceState, SessionKind, VehicleState,
};

pub const VENDOR: &str = "json_file";

/// Open handle on the feed directory
#[derive(Debug)]
pub struct DirectorySession {
    dir: PathBuf,
}

#[derive(Debug)]
pub struct DirectoryConnector {
    dir: PathBuf,
}

impl DirectoryConnector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Connector for DirectoryConnector {
    type Session = DirectorySession;

    fn connect(&mut self) -> ComponentResult<DirectorySession> {
        match fs::metadata(&self.dir) {
            Ok(meta) if meta.is_dir() => Ok(DirectorySession {
                dir: self.dir.clone(),
            }),
            Ok(_) => Err(ComponentError::transport(format!(
                "{} is not a directory",
                self.dir.display()
            ))),
            Err(e) => Err(ComponentError::transport(format!(
                "{}: {e}",
                self.dir.display()
            ))),
        }
    }

    fn release(&mut self, session: &mut DirectorySession) {
        trace!("Released feed directory {}", session.dir.display());
    }
}

fn document_path(dir: &Path, key: ComponentKey) -> PathBuf {
    dir.join(format!("{key}.json"))
}

/// Component reading over the device's directory session
#[derive(Debug)]
pub struct JsonFileSource {
    key: ComponentKey,
    energy: SimCounter,
}

impl JsonFileSource {
    pub fn new(key: ComponentKey) -> Self {
        Self {
            key,
            energy: SimCounter::new(),
        }
    }
}

impl TelemetrySource<DirectorySession> for JsonFileSource {
    fn read_raw(&mut self, session: &mut DirectorySession) -> ComponentResult<RawDeviceState> {
        let path = document_path(&session.dir, self.key);
        let text = fs::read_to_string(&path)
            .map_err(|e| ComponentError::transport(format!("{}: {e}", path.display())))?;
        parse_reading(self.key.class, &text, &mut self.energy, Utc::now())
    }
}

/// Component reading its document asynchronously, outside the shared session
#[derive(Debug)]
pub struct AsyncJsonFileSource {
    key: ComponentKey,
    dir: PathBuf,
    energy: SimCounter,
}

impl AsyncJsonFileSource {
    pub fn new(key: ComponentKey, dir: impl Into<PathBuf>) -> Self {
        Self {
            key,
            dir: dir.into(),
            energy: SimCounter::new(),
        }
    }
}

#[async_trait]
impl AsyncTelemetrySource for AsyncJsonFileSource {
    async fn read_raw(&mut self) -> ComponentResult<RawDeviceState> {
        let path = document_path(&self.dir, self.key);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ComponentError::transport(format!("{}: {e}", path.display())))?;
        parse_reading(self.key.class, &text, &mut self.energy, Utc::now())
    }
}

fn decode<T: DeserializeOwned>(document: Value) -> ComponentResult<T> {
    serde_json::from_value(document).map_err(|e| ComponentError::protocol(e.to_string()))
}

/// Decode one document for `class`, filling missing energy counters from `energy`
pub fn parse_reading(
    class: DeviceClass,
    text: &str,
    energy: &mut SimCounter,
    now: DateTime<Utc>,
) -> ComponentResult<RawDeviceState> {
    let document: Value =
        serde_json::from_str(text).map_err(|e| ComponentError::protocol(e.to_string()))?;
    let Some(object) = document.as_object() else {
        return Err(ComponentError::protocol("document is not a JSON object"));
    };
    let has_counters = object.contains_key("imported") || object.contains_key("exported");

    let raw: RawDeviceState = match class {
        DeviceClass::Counter => {
            let mut s: CounterState = decode(document)?;
            if !has_counters {
                (s.imported, s.exported) = energy.sample(s.power, now);
            }
            s.into()
        }
        DeviceClass::Inverter => {
            let mut s: InverterState = decode(document)?;
            if !has_counters {
                (s.imported, s.exported) = energy.sample(s.power, now);
            }
            s.into()
        }
        DeviceClass::Battery => {
            let mut s: BatState = decode(document)?;
            if !has_counters {
                (s.imported, s.exported) = energy.sample(s.power, now);
            }
            s.into()
        }
        DeviceClass::Vehicle => decode::<VehicleState>(document)?.into(),
    };
    Ok(raw)
}

fn feed_directory(config: &DeviceConfig) -> ConfigResult<PathBuf> {
    config
        .configuration
        .get("directory")
        .and_then(Value::as_str)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| ConfigError::InvalidValue {
            path: format!("devices/{}/configuration/directory", config.id),
            reason: "a feed directory is required".to_owned(),
        })
}

/// Constructor registered under [`VENDOR`]
pub fn build_device(
    config: &DeviceConfig,
    ctx: &BuildContext<'_>,
) -> ConfigResult<Box<dyn PollableDevice>> {
    let dir = feed_directory(config)?;
    let mut device =
        ConfigurableDevice::new(config.id, config.name.clone(), DirectoryConnector::new(&dir));

    for component in &config.components {
        let record = component.to_record(config, SessionKind::Shared);
        let store = ctx.stores.build(record.key);
        match record.session {
            SessionKind::Shared => {
                let source = JsonFileSource::new(record.key);
                device.add_component(record, Box::new(source), store);
            }
            SessionKind::PerCall => {
                let source = AsyncJsonFileSource::new(record.key, &dir);
                device.add_async_component(record, Box::new(source), store);
            }
        }
    }

    Ok(Box::new(device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RetainedBus, SharedStateStore, StoreBackend, StoreFactory};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_counter_document_decoded() {
        let text = r#"{"power": 1520.5, "imported": 12000, "exported": 300, "frequency": 49.97,
                       "voltages": [231.0, 229.5, 230.1]}"#;
        let raw = parse_reading(DeviceClass::Counter, text, &mut SimCounter::new(), now()).unwrap();
        let counter = raw.state().as_counter().unwrap();
        assert_eq!(counter.power, 1520.5);
        assert_eq!(counter.frequency, 49.97);
        assert_eq!(counter.voltages, Some([231.0, 229.5, 230.1]));
    }

    #[test]
    fn test_missing_counters_are_simulated() {
        let mut energy = SimCounter::new();
        parse_reading(DeviceClass::Battery, r#"{"power": 3600, "soc": 50}"#, &mut energy, now())
            .unwrap();
        let raw = parse_reading(
            DeviceClass::Battery,
            r#"{"power": 3600, "soc": 51}"#,
            &mut energy,
            now() + chrono::Duration::seconds(60),
        )
        .unwrap();

        let bat = raw.state().as_battery().unwrap();
        assert!((bat.imported - 60.0).abs() < 1e-9);
        assert_eq!(bat.exported, 0.0);
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        let mut energy = SimCounter::new();
        for text in ["not json", "[1, 2, 3]", r#"{"power": "lots"}"#] {
            let err = parse_reading(DeviceClass::Inverter, text, &mut energy, now()).unwrap_err();
            assert_eq!(err.kind(), wattline_types::FaultKind::Protocol, "{text}");
        }
    }

    #[test]
    fn test_missing_directory_is_transport_error() {
        let mut connector = DirectoryConnector::new("/definitely/not/here");
        let err = connector.connect().unwrap_err();
        assert_eq!(err.kind(), wattline_types::FaultKind::Transport);
    }

    #[test]
    fn test_directory_is_required() {
        let config: DeviceConfig =
            serde_json::from_value(serde_json::json!({ "id": 3, "type": VENDOR })).unwrap();
        let err = feed_directory(&config).unwrap_err();
        assert!(err.to_string().contains("devices/3/configuration/directory"));
    }

    #[test]
    fn test_negative_capacity_is_treated_as_unrated() {
        let stores = StoreFactory::new(
            StoreBackend::Bus {
                prefix: "wattline/set".to_owned(),
                publisher: Arc::new(RetainedBus::new()),
            },
            SharedStateStore::new(),
        );
        let config: DeviceConfig = serde_json::from_value(serde_json::json!({
            "id": 4,
            "type": VENDOR,
            "configuration": { "directory": "/feeds" },
            "components": [{ "id": 1, "class": "inverter", "nameplate_capacity_w": -1.0 }],
        }))
        .unwrap();

        let device = build_device(&config, &BuildContext { stores: &stores }).unwrap();

        assert_eq!(device.records().len(), 1);
        assert_eq!(device.records()[0].nameplate_capacity_w, -1.0);
    }
}
