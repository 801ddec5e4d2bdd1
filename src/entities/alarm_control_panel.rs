use log::{debug, error, info, warn};

use super::{ControlError, DeviceInfo, Entity, Platform, section_state_to_alarm_state, unique_id};
use crate::cache::ServiceCache;
use crate::client::{Connector, JablotronBridge};
use crate::jablotron::JablotronClient;
use crate::models::jablotron::{SectionState, ServiceId, ServiceType, component_state};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AlarmState {
    ArmedAway,
    ArmedHome,
    Disarmed,
    Arming,
    Disarming,
    Unknown,
}

impl AlarmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::ArmedAway => "armed_away",
            AlarmState::ArmedHome => "armed_home",
            AlarmState::Disarmed => "disarmed",
            AlarmState::Arming => "arming",
            AlarmState::Disarming => "disarming",
            AlarmState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AlarmFeature {
    ArmAway,
    ArmHome,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CodeFormat {
    Number,
}

/// Register an alarm panel for every controllable section.
pub fn setup_entities(services: &ServiceCache) -> Vec<AlarmControlPanel> {
    debug!("Adding Jablotron alarm control panel entities");
    let mut entities = Vec::new();
    for (service_id, service) in services {
        let device_info = DeviceInfo::for_service(*service_id, service);
        for section in &service.alarm.sections {
            if !section.can_control {
                debug!("Section '{}' is not controllable, ignoring!", section.name);
                continue;
            }

            debug!("Adding controllable section '{}'", section.name);
            let state = component_state(&section.cloud_component_id, &service.alarm.states);
            entities.push(AlarmControlPanel {
                unique_id: unique_id(*service_id, &section.cloud_component_id),
                service_id: *service_id,
                service_type: service.service_type.clone(),
                section_id: section.cloud_component_id.clone(),
                name: section.name.clone(),
                supports_partial_arm: section.partial_arm_enabled,
                authorization_required: section.need_authorization,
                alarm_state: section_state_to_alarm_state(state),
                device_info: device_info.clone(),
            });
        }
    }
    entities
}

#[derive(Debug, Clone)]
pub struct AlarmControlPanel {
    unique_id: String,
    service_id: ServiceId,
    service_type: ServiceType,
    section_id: String,
    name: String,
    supports_partial_arm: bool,
    authorization_required: bool,
    alarm_state: AlarmState,
    device_info: DeviceInfo,
}

impl AlarmControlPanel {
    pub fn alarm_state(&self) -> AlarmState {
        self.alarm_state
    }

    pub fn code_format(&self) -> Option<CodeFormat> {
        self.authorization_required.then_some(CodeFormat::Number)
    }

    pub fn code_arm_required(&self) -> bool {
        self.authorization_required
    }

    pub fn supported_features(&self) -> Vec<AlarmFeature> {
        let mut features = vec![AlarmFeature::ArmAway];
        if self.supports_partial_arm {
            features.push(AlarmFeature::ArmHome);
        }
        features
    }

    pub fn alarm_disarm<C: Connector>(
        &mut self,
        client: &JablotronClient<C>,
        code: Option<&str>,
    ) -> Result<(), ControlError> {
        self.control(client, SectionState::Disarm, code, false, AlarmState::Disarming)
    }

    pub fn alarm_arm_away<C: Connector>(
        &mut self,
        client: &JablotronClient<C>,
        code: Option<&str>,
    ) -> Result<(), ControlError> {
        self.control(client, SectionState::Arm, code, client.force_arm, AlarmState::Arming)
    }

    /// No-op for sections without partial arm support.
    pub fn alarm_arm_home<C: Connector>(
        &mut self,
        client: &JablotronClient<C>,
        code: Option<&str>,
    ) -> Result<(), ControlError> {
        if !self.supports_partial_arm {
            warn!("Section '{}' does not support partial arm", self.name);
            return Ok(());
        }
        self.control(client, SectionState::PartialArm, code, client.force_arm, AlarmState::Arming)
    }

    fn control<C: Connector>(
        &mut self,
        client: &JablotronClient<C>,
        target: SectionState,
        code: Option<&str>,
        force: bool,
        pending: AlarmState,
    ) -> Result<(), ControlError> {
        let code = client.code_or_default(code);
        let bridge = client.get_bridge()?;
        let accepted = bridge.control_section(
            self.service_id,
            &self.service_type,
            &self.section_id,
            target,
            code,
            force,
        )?;

        if accepted {
            info!("Section '{}' accepted {} request", self.name, target.as_str());
            self.alarm_state = pending;
        } else {
            warn!("Section '{}' did not accept {} request", self.name, target.as_str());
        }
        Ok(())
    }
}

impl Entity for AlarmControlPanel {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        Platform::AlarmControlPanel
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    fn state(&self) -> String {
        self.alarm_state.as_str().to_string()
    }

    fn handle_coordinator_update(&mut self, services: &ServiceCache) {
        debug!("Updating alarm state for section '{}'", self.name);
        let Some(service) = services.get(&self.service_id) else {
            error!("No data available for service '{}'!", self.service_id);
            return;
        };

        let states = &service.alarm.states;
        if states.is_empty() {
            warn!("No states data available for service '{}'!", self.service_id);
            return;
        }

        let Some(state) = component_state(&self.section_id, states) else {
            warn!("No state available for section '{}'!", self.name);
            return;
        };

        self.alarm_state = section_state_to_alarm_state(Some(state));
        debug!("Successfully updated alarm state for section '{}'", self.name);
    }
}
