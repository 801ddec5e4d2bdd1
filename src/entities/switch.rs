use log::{debug, error, info, warn};

use super::{ControlError, DeviceInfo, Entity, Platform, pg_state_to_binary_state, unique_id};
use crate::cache::ServiceCache;
use crate::client::{Connector, JablotronBridge};
use crate::jablotron::JablotronClient;
use crate::models::jablotron::{GateState, ServiceId, ServiceType, component_state};

/// Register a switch for every controllable programmable gate.
pub fn setup_entities(services: &ServiceCache) -> Vec<GateSwitch> {
    debug!("Adding Jablotron switch entities");
    let mut entities = Vec::new();
    for (service_id, service) in services {
        let device_info = DeviceInfo::for_service(*service_id, service);
        for gate in &service.gates.programmable_gates {
            if !gate.can_control {
                debug!("Programmable gate '{}' is uncontrollable, ignoring!", gate.name);
                continue;
            }

            debug!("Adding controllable programmable gate '{}'", gate.name);
            let state = component_state(&gate.cloud_component_id, &service.gates.states);
            entities.push(GateSwitch {
                unique_id: unique_id(*service_id, &gate.cloud_component_id),
                service_id: *service_id,
                service_type: service.service_type.clone(),
                gate_id: gate.cloud_component_id.clone(),
                name: gate.name.clone(),
                is_on: pg_state_to_binary_state(state),
                device_info: device_info.clone(),
            });
        }
    }
    entities
}

#[derive(Debug, Clone)]
pub struct GateSwitch {
    unique_id: String,
    service_id: ServiceId,
    service_type: ServiceType,
    gate_id: String,
    name: String,
    is_on: bool,
    device_info: DeviceInfo,
}

impl GateSwitch {
    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn turn_on<C: Connector>(&mut self, client: &JablotronClient<C>) -> Result<(), ControlError> {
        self.control(client, GateState::On)
    }

    pub fn turn_off<C: Connector>(&mut self, client: &JablotronClient<C>) -> Result<(), ControlError> {
        self.control(client, GateState::Off)
    }

    fn control<C: Connector>(&mut self, client: &JablotronClient<C>, target: GateState) -> Result<(), ControlError> {
        let bridge = client.get_bridge()?;
        let accepted = bridge.control_programmable_gate(
            self.service_id,
            &self.service_type,
            &self.gate_id,
            target,
            client.code_or_default(None),
        )?;

        if accepted {
            info!("Gate '{}' switched {}", self.name, target.as_str());
            self.is_on = target == GateState::On;
        } else {
            warn!("Gate '{}' did not accept {} request", self.name, target.as_str());
        }
        Ok(())
    }
}

impl Entity for GateSwitch {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        Platform::Switch
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    fn state(&self) -> String {
        let state = if self.is_on { "on" } else { "off" };
        state.to_string()
    }

    fn handle_coordinator_update(&mut self, services: &ServiceCache) {
        debug!("Updating gate state for gate '{}'", self.name);
        let Some(service) = services.get(&self.service_id) else {
            error!("No data available for service '{}'!", self.service_id);
            return;
        };

        let states = &service.gates.states;
        if states.is_empty() {
            warn!("No states data available for service '{}'!", self.service_id);
            return;
        }

        let Some(state) = component_state(&self.gate_id, states) else {
            warn!("No state available for gate '{}'!", self.name);
            return;
        };

        self.is_on = pg_state_to_binary_state(Some(state));
        debug!("Successfully updated gate state for gate '{}'", self.name);
    }
}
