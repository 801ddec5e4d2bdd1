//! Entities derived from the service cache.
//!
//! Entities are built once from the discovered services and afterwards only
//! read the cache. Control requests bypass the cache and go straight to a new
//! cloud session; the next poll reconciles the reported state.

pub mod alarm_control_panel;
pub mod binary_sensor;
pub mod sensor;
pub mod switch;

use crate::cache::{ServiceCache, ServiceData};
use crate::client::JablotronClientError;
use crate::models::jablotron::{GateState, SectionState, ServiceId};
use core::fmt;
use log::debug;

pub use alarm_control_panel::{AlarmControlPanel, AlarmState};
pub use binary_sensor::GateBinarySensor;
pub use sensor::ThermoSensor;
pub use switch::GateSwitch;

pub const DOMAIN: &str = "jablotron_cloud";
pub const MANUFACTURER: &str = "Jablotron";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    AlarmControlPanel,
    BinarySensor,
    Switch,
    Sensor,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::AlarmControlPanel,
        Platform::BinarySensor,
        Platform::Switch,
        Platform::Sensor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::AlarmControlPanel => "alarm_control_panel",
            Platform::BinarySensor => "binary_sensor",
            Platform::Switch => "switch",
            Platform::Sensor => "sensor",
        }
    }
}

/// Physical installation an entity belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub identifiers: (String, String),
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
}

impl DeviceInfo {
    pub fn for_service(service_id: ServiceId, service: &ServiceData) -> Self {
        DeviceInfo {
            identifiers: (DOMAIN.to_string(), service_id.to_string()),
            name: service.name.clone(),
            manufacturer: MANUFACTURER.to_string(),
            model: service.service_type.to_string(),
            sw_version: service.firmware.clone(),
        }
    }
}

pub fn unique_id(service_id: ServiceId, component_id: &str) -> String {
    format!("{}_{}", service_id, component_id)
}

pub fn section_state_to_alarm_state(state: Option<SectionState>) -> AlarmState {
    match state {
        Some(SectionState::Arm) => AlarmState::ArmedAway,
        Some(SectionState::PartialArm) => AlarmState::ArmedHome,
        Some(SectionState::Disarm) => AlarmState::Disarmed,
        Some(SectionState::Unknown) | None => AlarmState::Unknown,
    }
}

pub fn pg_state_to_binary_state(state: Option<GateState>) -> bool {
    matches!(state, Some(GateState::On))
}

pub trait Entity {
    fn unique_id(&self) -> &str;

    fn name(&self) -> &str;

    fn platform(&self) -> Platform;

    fn device_info(&self) -> &DeviceInfo;

    /// Current value as presented to the user.
    fn state(&self) -> String;

    /// Re-read this entity's slice of the cache. Missing data keeps the
    /// previous value.
    fn handle_coordinator_update(&mut self, services: &ServiceCache);
}

#[derive(Debug)]
pub enum ControlError {
    ReauthRequired(JablotronClientError),
    InvalidPin,
    Api(JablotronClientError),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::ReauthRequired(e) => write!(f, "re-authentication required: {}", e),
            ControlError::InvalidPin => write!(f, "invalid PIN code"),
            ControlError::Api(e) => write!(f, "control request failed: {}", e),
        }
    }
}

impl std::error::Error for ControlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControlError::ReauthRequired(e) | ControlError::Api(e) => Some(e),
            ControlError::InvalidPin => None,
        }
    }
}

impl From<JablotronClientError> for ControlError {
    fn from(value: JablotronClientError) -> Self {
        match value {
            JablotronClientError::Unauthorized(_) => ControlError::ReauthRequired(value),
            JablotronClientError::IncorrectPin => ControlError::InvalidPin,
            other => ControlError::Api(other),
        }
    }
}

/// Every entity created for the discovered services, grouped by platform.
#[derive(Debug, Default)]
pub struct Entities {
    pub alarm_panels: Vec<AlarmControlPanel>,
    pub binary_sensors: Vec<GateBinarySensor>,
    pub switches: Vec<GateSwitch>,
    pub sensors: Vec<ThermoSensor>,
}

impl Entities {
    pub fn setup(services: &ServiceCache) -> Self {
        let entities = Entities {
            alarm_panels: alarm_control_panel::setup_entities(services),
            binary_sensors: binary_sensor::setup_entities(services),
            switches: switch::setup_entities(services),
            sensors: sensor::setup_entities(services),
        };
        debug!(
            "Set up {} alarm panel(s), {} binary sensor(s), {} switch(es), {} sensor(s)",
            entities.alarm_panels.len(),
            entities.binary_sensors.len(),
            entities.switches.len(),
            entities.sensors.len()
        );
        entities
    }

    pub fn len(&self) -> usize {
        self.alarm_panels.len() + self.binary_sensors.len() + self.switches.len() + self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Entity> {
        self.alarm_panels
            .iter()
            .map(|e| e as &dyn Entity)
            .chain(self.binary_sensors.iter().map(|e| e as &dyn Entity))
            .chain(self.switches.iter().map(|e| e as &dyn Entity))
            .chain(self.sensors.iter().map(|e| e as &dyn Entity))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut dyn Entity> {
        self.alarm_panels
            .iter_mut()
            .map(|e| e as &mut dyn Entity)
            .chain(self.binary_sensors.iter_mut().map(|e| e as &mut dyn Entity))
            .chain(self.switches.iter_mut().map(|e| e as &mut dyn Entity))
            .chain(self.sensors.iter_mut().map(|e| e as &mut dyn Entity))
    }

    pub fn extend(&mut self, other: Entities) {
        self.alarm_panels.extend(other.alarm_panels);
        self.binary_sensors.extend(other.binary_sensors);
        self.switches.extend(other.switches);
        self.sensors.extend(other.sensors);
    }

    pub fn handle_coordinator_update(&mut self, services: &ServiceCache) {
        for entity in self.iter_mut() {
            entity.handle_coordinator_update(services);
        }
    }

    pub fn find(&self, unique_id: &str) -> Option<&dyn Entity> {
        self.iter().find(|e| e.unique_id() == unique_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use crate::jablotron::JablotronClient;
    use crate::testing::FakeConnector;
    use std::time::Duration;

    #[test]
    fn section_mapping_is_total() {
        assert_eq!(section_state_to_alarm_state(Some(SectionState::Arm)), AlarmState::ArmedAway);
        assert_eq!(section_state_to_alarm_state(Some(SectionState::PartialArm)), AlarmState::ArmedHome);
        assert_eq!(section_state_to_alarm_state(Some(SectionState::Disarm)), AlarmState::Disarmed);
        assert_eq!(section_state_to_alarm_state(Some(SectionState::Unknown)), AlarmState::Unknown);
        assert_eq!(section_state_to_alarm_state(None), AlarmState::Unknown);
    }

    #[test]
    fn gate_mapping_defaults_to_off() {
        assert!(pg_state_to_binary_state(Some(GateState::On)));
        assert!(!pg_state_to_binary_state(Some(GateState::Off)));
        assert!(!pg_state_to_binary_state(Some(GateState::Unknown)));
        assert!(!pg_state_to_binary_state(None));
    }

    #[test]
    fn control_errors_are_classified() {
        assert!(matches!(
            ControlError::from(JablotronClientError::Unauthorized("expired".into())),
            ControlError::ReauthRequired(_)
        ));
        assert!(matches!(
            ControlError::from(JablotronClientError::IncorrectPin),
            ControlError::InvalidPin
        ));
        assert!(matches!(
            ControlError::from(JablotronClientError::Timeout),
            ControlError::Api(_)
        ));
    }

    #[test]
    fn one_entity_per_qualifying_component() {
        let connector = FakeConnector::default();
        {
            let state = connector.state();
            let mut s = state.borrow_mut();
            s.add_fixture_service(1001, "OASiS");
            s.add_fixture_service(2002, "VOLTA");
        }
        let client = JablotronClient::new(connector, "user", "pass", "", true);
        let mut coordinator = Coordinator::new(client, Duration::from_secs(30), Duration::from_secs(15));
        coordinator.first_refresh().expect("setup");

        let entities = Entities::setup(coordinator.services());
        // Two controllable sections, one controllable and one read-only gate, one thermo device.
        assert_eq!(entities.alarm_panels.len(), 2);
        assert_eq!(entities.switches.len(), 1);
        assert_eq!(entities.binary_sensors.len(), 1);
        assert_eq!(entities.sensors.len(), 1);
        assert_eq!(entities.len(), 5);
        assert!(entities.iter().all(|e| e.unique_id().starts_with("1001_")));

        let panel = entities.find("1001_S1").expect("panel for S1");
        assert_eq!(panel.platform(), Platform::AlarmControlPanel);
        assert_eq!(panel.state(), "armed_away");
        assert_eq!(panel.device_info().model, "OASiS");
        assert_eq!(panel.device_info().identifiers, (DOMAIN.to_string(), "1001".to_string()));

        // A gate is exposed either as a switch or as a binary sensor, never both.
        assert_eq!(entities.find("1001_PG-1").map(|e| e.platform()), Some(Platform::Switch));
        assert_eq!(entities.find("1001_PG-2").map(|e| e.platform()), Some(Platform::BinarySensor));
        assert!(entities.find("1001_S3").is_none());
    }
}
