use log::{debug, error, warn};

use super::{DeviceInfo, Entity, Platform, unique_id};
use crate::cache::ServiceCache;
use crate::models::jablotron::ServiceId;

pub const UNIT_CELSIUS: &str = "°C";
pub const DEVICE_CLASS_TEMPERATURE: &str = "temperature";
pub const STATE_CLASS_MEASUREMENT: &str = "measurement";

/// Register a temperature sensor for every thermo device.
pub fn setup_entities(services: &ServiceCache) -> Vec<ThermoSensor> {
    debug!("Adding Jablotron sensor entities");
    let mut entities = Vec::new();
    for (service_id, service) in services {
        let device_info = DeviceInfo::for_service(*service_id, service);
        for device in &service.thermo {
            debug!("Adding thermo device '{}'", device.object_device_id);
            entities.push(ThermoSensor {
                unique_id: unique_id(*service_id, &device.object_device_id),
                name: format!("{}_temperature", device.object_device_id),
                service_id: *service_id,
                device_id: device.object_device_id.clone(),
                temperature: device.temperature,
                device_info: device_info.clone(),
            });
        }
    }
    entities
}

#[derive(Debug, Clone)]
pub struct ThermoSensor {
    unique_id: String,
    name: String,
    service_id: ServiceId,
    device_id: String,
    temperature: f64,
    device_info: DeviceInfo,
}

impl ThermoSensor {
    pub fn native_value(&self) -> f64 {
        self.temperature
    }

    pub fn native_unit_of_measurement(&self) -> &'static str {
        UNIT_CELSIUS
    }

    pub fn device_class(&self) -> &'static str {
        DEVICE_CLASS_TEMPERATURE
    }

    pub fn state_class(&self) -> &'static str {
        STATE_CLASS_MEASUREMENT
    }
}

impl Entity for ThermoSensor {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        Platform::Sensor
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    fn state(&self) -> String {
        format!("{:.1} {}", self.temperature, UNIT_CELSIUS)
    }

    fn handle_coordinator_update(&mut self, services: &ServiceCache) {
        debug!("Updating thermo device state for device '{}'", self.device_id);
        let Some(service) = services.get(&self.service_id) else {
            error!("No data available for service '{}'!", self.service_id);
            return;
        };

        if service.thermo.is_empty() {
            warn!("No thermo devices available for service '{}'!", self.service_id);
            return;
        }

        let Some(device) = service.thermo.iter().find(|d| d.object_device_id == self.device_id) else {
            warn!("No thermo device found with id '{}'!", self.device_id);
            return;
        };

        self.temperature = device.temperature;
        debug!("Successfully updated thermo device state for device '{}'", self.device_id);
    }
}
