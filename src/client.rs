//! Access to the Jablotron Cloud API.
//!
//! - `JablotronBridge` is the API surface the rest of the crate programs against.
//! - `Connector` produces freshly authenticated bridges.
//! - `CloudBridge`/`CloudConnector` implement both over a blocking `ureq` agent.
//!
//! Authentication
//! - `userAuthorize.json` establishes a session cookie that the agent's cookie
//!   jar replays on every later call. Sessions expire server side, which is why
//!   callers reconnect instead of caching a bridge.

use http::StatusCode;
use log::debug;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use crate::models::jablotron::*;

pub const DEFAULT_BASE_URL: &str = "https://api.jablonet.net/api/2.2";
const VENDOR_ID: &str = "JABLOTRON:Jablotron";
const CLIENT_VERSION: &str = "MYJ-PUB-ANDROID-12";

#[derive(Debug)]
pub enum JablotronClientError {
    /// Credentials rejected or session no longer valid.
    Unauthorized(String),
    IncorrectPin,
    Timeout,
    Transport(String),
    Http { status: u16, message: String },
    Api { status: String, message: String },
    /// Response did not match the expected record layout.
    Schema { path: String, source: serde_json::Error },
    MissingData(&'static str),
}

impl core::fmt::Display for JablotronClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            JablotronClientError::Unauthorized(s) => write!(f, "unauthorized: {}", s),
            JablotronClientError::IncorrectPin => write!(f, "incorrect PIN code"),
            JablotronClientError::Timeout => write!(f, "request timed out"),
            JablotronClientError::Transport(s) => write!(f, "transport error: {}", s),
            JablotronClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            JablotronClientError::Api { status, message } => write!(f, "api error {}: {}", status, message),
            JablotronClientError::Schema { path, source } => write!(f, "unexpected response at {}: {}", path, source),
            JablotronClientError::MissingData(endpoint) => write!(f, "{} returned no data", endpoint),
        }
    }
}

impl std::error::Error for JablotronClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JablotronClientError::Schema { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Operations offered by an authenticated cloud session.
pub trait JablotronBridge {
    fn get_services(&self) -> Result<Vec<Service>, JablotronClientError>;

    fn get_service_information(&self, service_id: ServiceId) -> Result<ServiceInformation, JablotronClientError>;

    fn get_sections(&self, service_id: ServiceId, service_type: &ServiceType) -> Result<Sections, JablotronClientError>;

    fn get_programmable_gates(
        &self,
        service_id: ServiceId,
        service_type: &ServiceType,
    ) -> Result<ProgrammableGates, JablotronClientError>;

    fn get_thermo_devices(
        &self,
        service_id: ServiceId,
        service_type: &ServiceType,
    ) -> Result<Vec<ThermoDevice>, JablotronClientError>;

    /// Returns whether the panel accepted the request.
    fn control_section(
        &self,
        service_id: ServiceId,
        service_type: &ServiceType,
        component_id: &str,
        state: SectionState,
        pin_code: &str,
        force: bool,
    ) -> Result<bool, JablotronClientError>;

    fn control_programmable_gate(
        &self,
        service_id: ServiceId,
        service_type: &ServiceType,
        component_id: &str,
        state: GateState,
        pin_code: &str,
    ) -> Result<bool, JablotronClientError>;
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub default_pin: String,
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("default_pin", &"<redacted>")
            .finish()
    }
}

/// Builds an authenticated bridge; every call performs a fresh login.
pub trait Connector {
    type Bridge: JablotronBridge;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Bridge, JablotronClientError>;
}

#[derive(Debug, Clone)]
pub struct CloudConnector {
    base_url: String,
    request_timeout: Duration,
}

impl CloudConnector {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        CloudConnector {
            base_url: base_url.into(),
            request_timeout,
        }
    }
}

impl Connector for CloudConnector {
    type Bridge = CloudBridge;

    fn connect(&self, credentials: &Credentials) -> Result<CloudBridge, JablotronClientError> {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.request_timeout))
            .http_status_as_error(false)
            .build();
        let bridge = CloudBridge {
            agent: config.into(),
            base_url: self.base_url.clone(),
        };
        bridge.perform_login(credentials)?;
        Ok(bridge)
    }
}

pub struct CloudBridge {
    agent: ureq::Agent,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ErrorProbe {
    #[serde(default)]
    error_status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl CloudBridge {
    fn perform_login(&self, credentials: &Credentials) -> Result<(), JablotronClientError> {
        debug!("Authenticating to Jablotron Cloud as {}", credentials.username);
        let body = json!({
            "login": credentials.username,
            "password": credentials.password,
        });
        self.post::<serde_json::Value>("userAuthorize.json", &body).map(|_| ())
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<Option<T>, JablotronClientError> {
        let url = endpoint_url(&self.base_url, path);
        let mut resp = self
            .agent
            .post(&url)
            .header("Accept", "application/json")
            .header("x-vendor-id", VENDOR_ID)
            .header("x-client-version", CLIENT_VERSION)
            .send_json(body)
            .map_err(map_ureq_error)?;
        let status = resp.status();
        let text = resp.body_mut().read_to_string().map_err(map_ureq_error)?;
        decode_response(status, &text)
    }

    fn post_data<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T, JablotronClientError> {
        self.post(path, body)?
            .ok_or(JablotronClientError::MissingData(endpoint_name(path)))
    }
}

impl JablotronBridge for CloudBridge {
    fn get_services(&self) -> Result<Vec<Service>, JablotronClientError> {
        let body = json!({ "list-type": "EXTENDED", "visibility": "DEFAULT" });
        let list: ServiceList = self.post_data("serviceListGet.json", &body)?;
        Ok(list.services)
    }

    fn get_service_information(&self, service_id: ServiceId) -> Result<ServiceInformation, JablotronClientError> {
        self.post_data("serviceInformationGet.json", &json!({ "service-id": service_id }))
    }

    fn get_sections(&self, service_id: ServiceId, service_type: &ServiceType) -> Result<Sections, JablotronClientError> {
        let body = json!({ "service-id": service_id, "connect-device": true });
        self.post_data(&format!("{}/sectionsGet.json", service_type), &body)
    }

    fn get_programmable_gates(
        &self,
        service_id: ServiceId,
        service_type: &ServiceType,
    ) -> Result<ProgrammableGates, JablotronClientError> {
        let body = json!({ "service-id": service_id, "connect-device": true });
        self.post_data(&format!("{}/programmableGatesGet.json", service_type), &body)
    }

    fn get_thermo_devices(
        &self,
        service_id: ServiceId,
        service_type: &ServiceType,
    ) -> Result<Vec<ThermoDevice>, JablotronClientError> {
        let body = json!({ "service-id": service_id });
        let devices: ThermoDevices = self.post_data(&format!("{}/thermoDevicesGet.json", service_type), &body)?;
        Ok(devices.thermo_devices)
    }

    fn control_section(
        &self,
        service_id: ServiceId,
        service_type: &ServiceType,
        component_id: &str,
        state: SectionState,
        pin_code: &str,
        force: bool,
    ) -> Result<bool, JablotronClientError> {
        let body = control_body(service_id, component_id, state.as_str(), pin_code, force);
        let data: Option<serde_json::Value> = self.post(&format!("{}/controlSegment.json", service_type), &body)?;
        Ok(data.is_some())
    }

    fn control_programmable_gate(
        &self,
        service_id: ServiceId,
        service_type: &ServiceType,
        component_id: &str,
        state: GateState,
        pin_code: &str,
    ) -> Result<bool, JablotronClientError> {
        let body = control_body(service_id, component_id, state.as_str(), pin_code, false);
        let data: Option<serde_json::Value> = self.post(&format!("{}/controlSegment.json", service_type), &body)?;
        Ok(data.is_some())
    }
}

fn control_body(service_id: ServiceId, component_id: &str, value: &str, pin_code: &str, force: bool) -> serde_json::Value {
    json!({
        "service-id": service_id,
        "control-components": [{
            "component-id": component_id,
            "actions": { "action": "CONTROL", "value": value },
            "authorization": { "authorization-code": pin_code },
        }],
        "force": force,
    })
}

fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn endpoint_name(path: &str) -> &'static str {
    match path.rsplit('/').next().unwrap_or(path) {
        "serviceListGet.json" => "serviceListGet",
        "serviceInformationGet.json" => "serviceInformationGet",
        "sectionsGet.json" => "sectionsGet",
        "programmableGatesGet.json" => "programmableGatesGet",
        "thermoDevicesGet.json" => "thermoDevicesGet",
        _ => "endpoint",
    }
}

fn map_ureq_error(e: ureq::Error) -> JablotronClientError {
    match e {
        ureq::Error::Timeout(_) => JablotronClientError::Timeout,
        ureq::Error::StatusCode(status) => JablotronClientError::Http {
            status,
            message: String::from("<no body>"),
        },
        other => JablotronClientError::Transport(other.to_string()),
    }
}

/// Map an `error-status` reported by the API onto the error taxonomy.
pub fn classify_error_status(status: &str, message: &str) -> JablotronClientError {
    let upper = status.to_ascii_uppercase();
    if upper.contains("PIN") {
        JablotronClientError::IncorrectPin
    } else if ["AUTHORIZ", "SESSION", "CREDENTIALS", "LOGIN", "PASSWORD"]
        .iter()
        .any(|marker| upper.contains(marker))
    {
        JablotronClientError::Unauthorized(format!("{}: {}", status, message))
    } else {
        JablotronClientError::Api {
            status: status.to_string(),
            message: message.to_string(),
        }
    }
}

/// Decode one API response body into its `data` payload.
pub fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<Option<T>, JablotronClientError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(JablotronClientError::Unauthorized(format!("http {}", status.as_u16())));
    }

    if let Ok(ErrorProbe {
        error_status: Some(error_status),
        error_message,
    }) = serde_json::from_str::<ErrorProbe>(body)
    {
        return Err(classify_error_status(&error_status, error_message.as_deref().unwrap_or("")));
    }

    if !status.is_success() {
        return Err(JablotronClientError::Http {
            status: status.as_u16(),
            message: body.to_string(),
        });
    }

    let de = &mut serde_json::Deserializer::from_str(body);
    let envelope: Envelope<T> = serde_path_to_error::deserialize(de).map_err(|e| JablotronClientError::Schema {
        path: e.path().to_string(),
        source: e.into_inner(),
    })?;
    Ok(envelope.data)
}
