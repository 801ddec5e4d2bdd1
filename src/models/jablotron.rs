//! Typed records for the Jablotron Cloud API resources.
//!
//! Field names follow the kebab-case keys of the cloud responses. Collections the
//! API omits for some service types default to empty rather than failing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Service types the integration does not expose any entities for.
pub const UNSUPPORTED_SERVICES: [&str; 4] = ["FUTURA2", "AMBIENTA", "VOLTA", "LOGBOOK"];

/// Placeholder reported when a service does not publish its firmware version.
pub const UNKNOWN_FIRMWARE: &str = "N/A";

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub i64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceType(pub String);

impl ServiceType {
    pub fn is_supported(&self) -> bool {
        !UNSUPPORTED_SERVICES.contains(&self.0.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =====================
// Services
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Service {
    pub service_id: ServiceId,
    pub name: String,
    pub service_type: ServiceType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceList {
    #[serde(default)]
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDevice {
    #[serde(default)]
    pub firmware: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInformation {
    #[serde(default)]
    pub device: Option<ServiceDevice>,
}

impl ServiceInformation {
    pub fn firmware(&self) -> String {
        self.device
            .as_ref()
            .and_then(|d| d.firmware.clone())
            .unwrap_or_else(|| UNKNOWN_FIRMWARE.to_string())
    }
}

// =====================
// Component states
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionState {
    Arm,
    PartialArm,
    Disarm,
    #[serde(other)]
    Unknown,
}

impl SectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionState::Arm => "ARM",
            SectionState::PartialArm => "PARTIAL_ARM",
            SectionState::Disarm => "DISARM",
            SectionState::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateState {
    On,
    Off,
    #[serde(other)]
    Unknown,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::On => "ON",
            GateState::Off => "OFF",
            GateState::Unknown => "UNKNOWN",
        }
    }
}

/// Current state of a single section or programmable gate, joined to its
/// metadata by `cloud_component_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ComponentState<S> {
    pub cloud_component_id: String,
    pub state: S,
}

/// Look up the state of one component; `None` when the API did not report it.
pub fn component_state<S: Copy>(component_id: &str, states: &[ComponentState<S>]) -> Option<S> {
    states
        .iter()
        .find(|s| s.cloud_component_id == component_id)
        .map(|s| s.state)
}

// =====================
// Sections
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Section {
    pub cloud_component_id: String,
    pub name: String,
    #[serde(default)]
    pub can_control: bool,
    #[serde(default)]
    pub partial_arm_enabled: bool,
    #[serde(default)]
    pub need_authorization: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sections {
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub states: Vec<ComponentState<SectionState>>,
}

// =====================
// Programmable gates
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProgrammableGate {
    pub cloud_component_id: String,
    pub name: String,
    #[serde(default)]
    pub can_control: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgrammableGates {
    #[serde(rename = "programmableGates", default)]
    pub programmable_gates: Vec<ProgrammableGate>,
    #[serde(default)]
    pub states: Vec<ComponentState<GateState>>,
}

// =====================
// Thermo devices
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ThermoDevice {
    pub object_device_id: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ThermoDevices {
    #[serde(default)]
    pub thermo_devices: Vec<ThermoDevice>,
}
