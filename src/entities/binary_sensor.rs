use log::{debug, error, warn};

use super::{DeviceInfo, Entity, Platform, pg_state_to_binary_state, unique_id};
use crate::cache::ServiceCache;
use crate::models::jablotron::{ServiceId, component_state};

/// Register a binary sensor for every programmable gate that cannot be controlled.
pub fn setup_entities(services: &ServiceCache) -> Vec<GateBinarySensor> {
    debug!("Adding Jablotron binary sensor entities");
    let mut entities = Vec::new();
    for (service_id, service) in services {
        let device_info = DeviceInfo::for_service(*service_id, service);
        for gate in &service.gates.programmable_gates {
            if gate.can_control {
                debug!("Programmable gate '{}' is controllable, ignoring!", gate.name);
                continue;
            }

            debug!("Adding uncontrollable programmable gate '{}'", gate.name);
            let state = component_state(&gate.cloud_component_id, &service.gates.states);
            entities.push(GateBinarySensor {
                unique_id: unique_id(*service_id, &gate.cloud_component_id),
                service_id: *service_id,
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
pub struct GateBinarySensor {
    unique_id: String,
    service_id: ServiceId,
    gate_id: String,
    name: String,
    is_on: bool,
    device_info: DeviceInfo,
}

impl GateBinarySensor {
    pub fn is_on(&self) -> bool {
        self.is_on
    }
}

impl Entity for GateBinarySensor {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        Platform::BinarySensor
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
