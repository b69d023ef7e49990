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

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::errors::ConfigError;

// ============= Device Classes =============

/// Class of a metered component. Determines which state shape it produces
/// and where its values are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceClass {
    #[serde(rename = "counter")]
    Counter,
    #[serde(rename = "inverter", alias = "pv")]
    Inverter,
    #[serde(rename = "bat", alias = "battery")]
    Battery,
    #[serde(rename = "vehicle")]
    Vehicle,
}

impl DeviceClass {
    /// Segment used in store keys and bus topics
    pub fn topic_segment(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Inverter => "pv",
            Self::Battery => "bat",
            Self::Vehicle => "vehicle",
        }
    }

    pub fn all() -> &'static [DeviceClass] {
        &[Self::Counter, Self::Inverter, Self::Battery, Self::Vehicle]
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic_segment())
    }
}

impl FromStr for DeviceClass {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "counter" => Ok(Self::Counter),
            "inverter" | "pv" => Ok(Self::Inverter),
            "bat" | "battery" => Ok(Self::Battery),
            "vehicle" => Ok(Self::Vehicle),
            _ => Err(ConfigError::UnknownClass(s.to_owned())),
        }
    }
}

/// Identity of one component in the shared store: (class, numeric id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey {
    pub class: DeviceClass,
    pub id: u32,
}

impl ComponentKey {
    pub fn new(class: DeviceClass, id: u32) -> Self {
        Self { class, id }
    }

    pub fn counter(id: u32) -> Self {
        Self::new(DeviceClass::Counter, id)
    }

    pub fn inverter(id: u32) -> Self {
        Self::new(DeviceClass::Inverter, id)
    }

    pub fn battery(id: u32) -> Self {
        Self::new(DeviceClass::Battery, id)
    }

    pub fn vehicle(id: u32) -> Self {
        Self::new(DeviceClass::Vehicle, id)
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class.topic_segment(), self.id)
    }
}

// ============= Delivery Quality =============

/// Per-field delivery guarantee on the shared bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeliveryQuality {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl DeliveryQuality {
    /// Numeric level as used by MQTT-style brokers
    pub fn level(&self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

/// One publishable field of a state snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct StateField {
    pub name: &'static str,
    pub value: Value,
    pub quality: DeliveryQuality,
}

impl StateField {
    fn power(value: f64) -> Self {
        Self {
            name: "power",
            value: json!(value),
            quality: DeliveryQuality::ExactlyOnce,
        }
    }

    fn counter(name: &'static str, value: f64) -> Self {
        Self {
            name,
            value: json!(value),
            quality: DeliveryQuality::AtLeastOnce,
        }
    }

    fn diagnostic(name: &'static str, value: Value) -> Self {
        Self {
            name,
            value,
            quality: DeliveryQuality::AtMostOnce,
        }
    }
}

// ============= Per-Class States =============

/// Grid or sub-meter reading. Power positive = import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterState {
    pub power: f64,
    /// Imported energy (Wh)
    pub imported: f64,
    /// Exported energy (Wh)
    pub exported: f64,
    pub currents: Option<[f64; 3]>,
    pub voltages: Option<[f64; 3]>,
    pub powers: Option<[f64; 3]>,
    pub power_factors: Option<[f64; 3]>,
    /// Grid frequency (Hz)
    pub frequency: f64,
}

impl Default for CounterState {
    fn default() -> Self {
        Self {
            power: 0.0,
            imported: 0.0,
            exported: 0.0,
            currents: None,
            voltages: None,
            powers: None,
            power_factors: None,
            frequency: 50.0,
        }
    }
}

/// PV inverter reading. Generation is reported as negative power.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterState {
    pub power: f64,
    pub imported: f64,
    pub exported: f64,
    pub currents: Option<[f64; 3]>,
    /// DC-side power, if the device reports it
    pub dc_power: Option<f64>,
}

/// Battery reading. Power positive = charging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatState {
    pub power: f64,
    /// State of charge (0-100%)
    pub soc: f64,
    pub imported: f64,
    pub exported: f64,
    pub currents: Option<[f64; 3]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleState {
    pub soc: f64,
    pub soc_timestamp: Option<DateTime<Utc>>,
}

/// Class-tagged snapshot of one poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum DeviceState {
    Counter(CounterState),
    Inverter(InverterState),
    #[serde(rename = "bat")]
    Battery(BatState),
    Vehicle(VehicleState),
}

impl DeviceState {
    pub fn class(&self) -> DeviceClass {
        match self {
            Self::Counter(_) => DeviceClass::Counter,
            Self::Inverter(_) => DeviceClass::Inverter,
            Self::Battery(_) => DeviceClass::Battery,
            Self::Vehicle(_) => DeviceClass::Vehicle,
        }
    }

    /// Instantaneous power, if this class has one
    pub fn power(&self) -> Option<f64> {
        match self {
            Self::Counter(s) => Some(s.power),
            Self::Inverter(s) => Some(s.power),
            Self::Battery(s) => Some(s.power),
            Self::Vehicle(_) => None,
        }
    }

    pub fn set_power(&mut self, power: f64) {
        match self {
            Self::Counter(s) => s.power = power,
            Self::Inverter(s) => s.power = power,
            Self::Battery(s) => s.power = power,
            Self::Vehicle(_) => {}
        }
    }

    pub fn as_battery(&self) -> Option<&BatState> {
        match self {
            Self::Battery(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_counter(&self) -> Option<&CounterState> {
        match self {
            Self::Counter(s) => Some(s),
            _ => None,
        }
    }

    /// Describes the first value a sane device could not have produced
    pub fn out_of_range(&self) -> Option<String> {
        let non_finite = |name: &str, v: f64| (!v.is_finite()).then(|| format!("{name} is {v}"));
        match self {
            Self::Counter(s) => non_finite("power", s.power)
                .or_else(|| non_finite("imported", s.imported))
                .or_else(|| non_finite("exported", s.exported))
                .or_else(|| {
                    (!s.frequency.is_finite() || s.frequency < 0.0)
                        .then(|| format!("frequency {} Hz", s.frequency))
                }),
            Self::Inverter(s) => non_finite("power", s.power)
                .or_else(|| non_finite("imported", s.imported))
                .or_else(|| non_finite("exported", s.exported))
                .or_else(|| s.dc_power.and_then(|v| non_finite("dc_power", v))),
            Self::Battery(s) => non_finite("power", s.power)
                .or_else(|| non_finite("imported", s.imported))
                .or_else(|| non_finite("exported", s.exported))
                .or_else(|| soc_out_of_range(s.soc)),
            Self::Vehicle(s) => soc_out_of_range(s.soc),
        }
    }

    /// Publishable fields, each with its delivery quality. Absent optionals are skipped.
    pub fn fields(&self) -> Vec<StateField> {
        let mut fields = Vec::new();
        match self {
            Self::Counter(s) => {
                push_currents(&mut fields, s.currents);
                push_phases(&mut fields, "voltages", s.voltages);
                push_phases(&mut fields, "powers", s.powers);
                push_phases(&mut fields, "power_factors", s.power_factors);
                fields.push(StateField::power(s.power));
                fields.push(StateField::counter("imported", s.imported));
                fields.push(StateField::counter("exported", s.exported));
                fields.push(StateField::diagnostic("frequency", json!(s.frequency)));
            }
            Self::Inverter(s) => {
                push_currents(&mut fields, s.currents);
                fields.push(StateField::power(s.power));
                fields.push(StateField::counter("imported", s.imported));
                fields.push(StateField::counter("exported", s.exported));
                if let Some(dc) = s.dc_power {
                    fields.push(StateField::diagnostic("dc_power", json!(dc)));
                }
            }
            Self::Battery(s) => {
                push_currents(&mut fields, s.currents);
                fields.push(StateField::power(s.power));
                fields.push(StateField::counter("soc", s.soc));
                fields.push(StateField::counter("imported", s.imported));
                fields.push(StateField::counter("exported", s.exported));
            }
            Self::Vehicle(s) => {
                fields.push(StateField::counter("soc", s.soc));
                if let Some(ts) = s.soc_timestamp {
                    fields.push(StateField::diagnostic("soc_timestamp", json!(ts.timestamp())));
                }
            }
        }
        fields
    }
}

/// Phase currents go out at least once; other phase values are diagnostics
fn push_currents(fields: &mut Vec<StateField>, currents: Option<[f64; 3]>) {
    if let Some(currents) = currents {
        fields.push(StateField {
            name: "currents",
            value: json!(currents),
            quality: DeliveryQuality::AtLeastOnce,
        });
    }
}

fn push_phases(fields: &mut Vec<StateField>, name: &'static str, values: Option<[f64; 3]>) {
    if let Some(values) = values {
        fields.push(StateField::diagnostic(name, json!(values)));
    }
}

fn soc_out_of_range(soc: f64) -> Option<String> {
    (!(0.0..=100.0).contains(&soc)).then(|| format!("soc {soc}% outside 0-100"))
}

/// Reading exactly as a telemetry source produced it
#[derive(Debug, Clone, PartialEq)]
pub struct RawDeviceState(DeviceState);

impl RawDeviceState {
    pub fn new(state: DeviceState) -> Self {
        Self(state)
    }

    pub fn state(&self) -> &DeviceState {
        &self.0
    }

    pub fn class(&self) -> DeviceClass {
        self.0.class()
    }

    pub fn into_inner(self) -> DeviceState {
        self.0
    }
}

impl From<CounterState> for RawDeviceState {
    fn from(s: CounterState) -> Self {
        Self(DeviceState::Counter(s))
    }
}

impl From<InverterState> for RawDeviceState {
    fn from(s: InverterState) -> Self {
        Self(DeviceState::Inverter(s))
    }
}

impl From<BatState> for RawDeviceState {
    fn from(s: BatState) -> Self {
        Self(DeviceState::Battery(s))
    }
}

impl From<VehicleState> for RawDeviceState {
    fn from(s: VehicleState) -> Self {
        Self(DeviceState::Vehicle(s))
    }
}

/// Reading after the correction pipeline. Only this type reaches a value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedState(DeviceState);

impl CorrectedState {
    /// Wrap a state that has already been through correction
    pub fn new(state: DeviceState) -> Self {
        Self(state)
    }

    pub fn state(&self) -> &DeviceState {
        &self.0
    }

    pub fn class(&self) -> DeviceClass {
        self.0.class()
    }

    pub fn power(&self) -> Option<f64> {
        self.0.power()
    }

    pub fn fields(&self) -> Vec<StateField> {
        self.0.fields()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_parsing_accepts_aliases() {
        assert_eq!("pv".parse::<DeviceClass>().unwrap(), DeviceClass::Inverter);
        assert_eq!("Battery".parse::<DeviceClass>().unwrap(), DeviceClass::Battery);
        assert!("heatpump".parse::<DeviceClass>().is_err());
    }

    #[test]
    fn test_key_display_uses_topic_segment() {
        assert_eq!(ComponentKey::battery(3).to_string(), "bat3");
        assert_eq!(ComponentKey::inverter(1).to_string(), "pv1");
    }

    #[test]
    fn test_power_is_strongest_quality() {
        let state = DeviceState::Inverter(InverterState {
            power: -1200.0,
            exported: 5000.0,
            currents: Some([1.0, 2.0, 3.0]),
            ..Default::default()
        });
        let fields = state.fields();
        let power = fields.iter().find(|f| f.name == "power").unwrap();
        let exported = fields.iter().find(|f| f.name == "exported").unwrap();
        let currents = fields.iter().find(|f| f.name == "currents").unwrap();
        assert_eq!(power.quality, DeliveryQuality::ExactlyOnce);
        assert_eq!(exported.quality, DeliveryQuality::AtLeastOnce);
        assert_eq!(currents.quality, DeliveryQuality::AtLeastOnce);
        assert!(fields.iter().all(|f| f.name != "dc_power"));
    }

    #[test]
    fn test_counter_currents_outrank_other_phase_values() {
        let state = DeviceState::Counter(CounterState {
            currents: Some([6.1, 5.9, 6.0]),
            voltages: Some([230.0, 231.0, 229.0]),
            ..Default::default()
        });
        let fields = state.fields();
        let quality = |name: &str| fields.iter().find(|f| f.name == name).map(|f| f.quality);
        assert_eq!(quality("currents"), Some(DeliveryQuality::AtLeastOnce));
        assert_eq!(quality("voltages"), Some(DeliveryQuality::AtMostOnce));
        assert_eq!(quality("frequency"), Some(DeliveryQuality::AtMostOnce));
    }

    #[test]
    fn test_out_of_range_soc() {
        let state = DeviceState::Battery(BatState {
            soc: 104.0,
            ..Default::default()
        });
        assert!(state.out_of_range().unwrap().contains("soc"));

        let ok = DeviceState::Counter(CounterState::default());
        assert!(ok.out_of_range().is_none());
    }

    #[test]
    fn test_state_json_is_class_tagged() {
        let state: DeviceState =
            serde_json::from_str(r#"{"class":"bat","power":300.0,"soc":55.0}"#).unwrap();
        assert_eq!(state.class(), DeviceClass::Battery);
        assert_eq!(state.power(), Some(300.0));
    }
}
