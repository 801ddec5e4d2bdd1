//! In-memory stand-ins for the cloud API used by unit tests.

use crate::client::{Connector, Credentials, JablotronBridge, JablotronClientError};
use crate::models::jablotron::*;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Services,
    Information(ServiceId),
    Sections(ServiceId),
    Gates(ServiceId),
    Thermo(ServiceId),
    Control(ServiceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Unauthorized,
    Timeout,
    Transport,
    IncorrectPin,
}

impl Fault {
    fn to_error(self) -> JablotronClientError {
        match self {
            Fault::Unauthorized => JablotronClientError::Unauthorized("session expired".into()),
            Fault::Timeout => JablotronClientError::Timeout,
            Fault::Transport => JablotronClientError::Transport("connection reset".into()),
            Fault::IncorrectPin => JablotronClientError::IncorrectPin,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlCall {
    pub service_id: ServiceId,
    pub component_id: String,
    pub state: String,
    pub pin_code: String,
    pub force: bool,
}

#[derive(Debug)]
pub struct FakeState {
    pub logins: u32,
    pub reject_login: bool,
    pub services: Vec<Service>,
    pub information: BTreeMap<ServiceId, ServiceInformation>,
    pub sections: BTreeMap<ServiceId, Sections>,
    pub gates: BTreeMap<ServiceId, ProgrammableGates>,
    pub thermo: BTreeMap<ServiceId, Vec<ThermoDevice>>,
    pub faults: Vec<(Call, Fault)>,
    pub calls: Vec<Call>,
    pub control_calls: Vec<ControlCall>,
    pub control_accepted: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        FakeState {
            logins: 0,
            reject_login: false,
            services: Vec::new(),
            information: BTreeMap::new(),
            sections: BTreeMap::new(),
            gates: BTreeMap::new(),
            thermo: BTreeMap::new(),
            faults: Vec::new(),
            calls: Vec::new(),
            control_accepted: true,
            control_calls: Vec::new(),
        }
    }
}

impl FakeState {
    pub fn add_service(&mut self, id: i64, name: &str, service_type: &str) -> ServiceId {
        let service_id = ServiceId(id);
        self.services.push(Service {
            service_id,
            name: name.to_string(),
            service_type: ServiceType(service_type.to_string()),
        });
        self.information.insert(
            service_id,
            ServiceInformation {
                device: Some(ServiceDevice {
                    firmware: Some("LJ60422".to_string()),
                }),
            },
        );
        service_id
    }

    /// Service `id` populated from the JSON fixtures under `tests/data`.
    pub fn add_fixture_service(&mut self, id: i64, service_type: &str) -> ServiceId {
        let service_id = self.add_service(id, "Home", service_type);
        self.sections.insert(service_id, load_fixture("sections.json"));
        self.gates.insert(service_id, load_fixture("gates.json"));
        let thermo: ThermoDevices = load_fixture("thermo.json");
        self.thermo.insert(service_id, thermo.thermo_devices);
        service_id
    }

    pub fn set_section_state(&mut self, service_id: ServiceId, component_id: &str, state: SectionState) {
        let sections = self.sections.entry(service_id).or_default();
        sections.states.retain(|s| s.cloud_component_id != component_id);
        sections.states.push(ComponentState {
            cloud_component_id: component_id.to_string(),
            state,
        });
    }

    pub fn set_temperature(&mut self, service_id: ServiceId, device_id: &str, temperature: f64) {
        let devices = self.thermo.entry(service_id).or_default();
        devices.retain(|d| d.object_device_id != device_id);
        devices.push(ThermoDevice {
            object_device_id: device_id.to_string(),
            temperature,
        });
    }

    pub fn fail(&mut self, call: Call, fault: Fault) {
        self.faults.push((call, fault));
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    fn record(&mut self, call: Call) -> Result<(), JablotronClientError> {
        self.calls.push(call);
        match self.faults.iter().find(|(c, _)| *c == call) {
            Some((_, fault)) => Err(fault.to_error()),
            None => Ok(()),
        }
    }
}

pub fn load_fixture<T: serde::de::DeserializeOwned>(name: &str) -> T {
    let json = std::fs::read_to_string(format!("tests/data/{name}")).expect("fixture present");
    serde_json::from_str(&json).expect("parse fixture")
}

#[derive(Default, Clone)]
pub struct FakeConnector {
    state: Rc<RefCell<FakeState>>,
}

impl FakeConnector {
    pub fn state(&self) -> Rc<RefCell<FakeState>> {
        Rc::clone(&self.state)
    }
}

impl Connector for FakeConnector {
    type Bridge = FakeBridge;

    fn connect(&self, _credentials: &Credentials) -> Result<FakeBridge, JablotronClientError> {
        let mut state = self.state.borrow_mut();
        state.logins += 1;
        if state.reject_login {
            return Err(JablotronClientError::Unauthorized("invalid credentials".into()));
        }
        Ok(FakeBridge {
            state: Rc::clone(&self.state),
        })
    }
}

pub struct FakeBridge {
    state: Rc<RefCell<FakeState>>,
}

impl JablotronBridge for FakeBridge {
    fn get_services(&self) -> Result<Vec<Service>, JablotronClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::Services)?;
        Ok(state.services.clone())
    }

    fn get_service_information(&self, service_id: ServiceId) -> Result<ServiceInformation, JablotronClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::Information(service_id))?;
        Ok(state.information.get(&service_id).cloned().unwrap_or_default())
    }

    fn get_sections(&self, service_id: ServiceId, _service_type: &ServiceType) -> Result<Sections, JablotronClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::Sections(service_id))?;
        Ok(state.sections.get(&service_id).cloned().unwrap_or_default())
    }

    fn get_programmable_gates(
        &self,
        service_id: ServiceId,
        _service_type: &ServiceType,
    ) -> Result<ProgrammableGates, JablotronClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::Gates(service_id))?;
        Ok(state.gates.get(&service_id).cloned().unwrap_or_default())
    }

    fn get_thermo_devices(
        &self,
        service_id: ServiceId,
        _service_type: &ServiceType,
    ) -> Result<Vec<ThermoDevice>, JablotronClientError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::Thermo(service_id))?;
        Ok(state.thermo.get(&service_id).cloned().unwrap_or_default())
    }

    fn control_section(
        &self,
        service_id: ServiceId,
        _service_type: &ServiceType,
        component_id: &str,
        state: SectionState,
        pin_code: &str,
        force: bool,
    ) -> Result<bool, JablotronClientError> {
        let mut fake = self.state.borrow_mut();
        fake.record(Call::Control(service_id))?;
        fake.control_calls.push(ControlCall {
            service_id,
            component_id: component_id.to_string(),
            state: state.as_str().to_string(),
            pin_code: pin_code.to_string(),
            force,
        });
        Ok(fake.control_accepted)
    }

    fn control_programmable_gate(
        &self,
        service_id: ServiceId,
        _service_type: &ServiceType,
        component_id: &str,
        state: GateState,
        pin_code: &str,
    ) -> Result<bool, JablotronClientError> {
        let mut fake = self.state.borrow_mut();
        fake.record(Call::Control(service_id))?;
        fake.control_calls.push(ControlCall {
            service_id,
            component_id: component_id.to_string(),
            state: state.as_str().to_string(),
            pin_code: pin_code.to_string(),
            force: false,
        });
        Ok(fake.control_accepted)
    }
}
