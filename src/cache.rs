//! Per-service data held between polls.

use crate::models::jablotron::{
    ProgrammableGates, Sections, ServiceId, ServiceInformation, ServiceType, ThermoDevice,
};
use std::collections::BTreeMap;

pub type ServiceCache = BTreeMap<ServiceId, ServiceData>;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceData {
    pub name: String,
    pub service_type: ServiceType,
    pub firmware: String,
    pub alarm: Sections,
    pub gates: ProgrammableGates,
    pub thermo: Vec<ThermoDevice>,
}

impl ServiceData {
    pub fn new(name: impl Into<String>, service_type: ServiceType, info: &ServiceInformation) -> Self {
        ServiceData {
            name: name.into(),
            service_type,
            firmware: info.firmware(),
            alarm: Sections::default(),
            gates: ProgrammableGates::default(),
            thermo: Vec::new(),
        }
    }

    /// Replace section states. Section metadata is kept from discovery unless
    /// discovery never saw any sections.
    pub fn apply_sections(&mut self, fresh: Sections) {
        if self.alarm.sections.is_empty() {
            self.alarm.sections = fresh.sections;
        }
        self.alarm.states = fresh.states;
    }

    pub fn apply_gates(&mut self, fresh: ProgrammableGates) {
        if self.gates.programmable_gates.is_empty() {
            self.gates.programmable_gates = fresh.programmable_gates;
        }
        self.gates.states = fresh.states;
    }

    pub fn apply_thermo(&mut self, fresh: Vec<ThermoDevice>) {
        self.thermo = fresh;
    }
}
