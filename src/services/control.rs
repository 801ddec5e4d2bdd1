//! One-shot control commands addressed by entity unique id.

use core::fmt;
use core::str::FromStr;
use log::info;

use crate::client::Connector;
use crate::entities::{ControlError, Entities, Entity};
use crate::jablotron::JablotronClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ArmAway,
    ArmHome,
    Disarm,
    TurnOn,
    TurnOff,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ArmAway => "arm_away",
            Action::ArmHome => "arm_home",
            Action::Disarm => "disarm",
            Action::TurnOn => "on",
            Action::TurnOff => "off",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arm_away" => Ok(Action::ArmAway),
            "arm_home" => Ok(Action::ArmHome),
            "disarm" => Ok(Action::Disarm),
            "on" => Ok(Action::TurnOn),
            "off" => Ok(Action::TurnOff),
            other => Err(format!(
                "unknown action '{}' (expected arm_away, arm_home, disarm, on or off)",
                other
            )),
        }
    }
}

#[derive(Debug)]
pub enum CommandError {
    UnknownEntity(String),
    Unsupported { unique_id: String, action: Action },
    Control(ControlError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnknownEntity(id) => write!(f, "no entity with unique id '{}'", id),
            CommandError::Unsupported { unique_id, action } => {
                write!(f, "entity '{}' does not support '{}'", unique_id, action.as_str())
            }
            CommandError::Control(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Control(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ControlError> for CommandError {
    fn from(value: ControlError) -> Self {
        CommandError::Control(value)
    }
}

/// Run `action` against the entity and return its state afterwards.
pub fn execute<C: Connector>(
    entities: &mut Entities,
    client: &JablotronClient<C>,
    unique_id: &str,
    action: Action,
    code: Option<&str>,
) -> Result<String, CommandError> {
    if let Some(panel) = entities.alarm_panels.iter_mut().find(|e| e.unique_id() == unique_id) {
        match action {
            Action::ArmAway => panel.alarm_arm_away(client, code)?,
            Action::ArmHome => panel.alarm_arm_home(client, code)?,
            Action::Disarm => panel.alarm_disarm(client, code)?,
            Action::TurnOn | Action::TurnOff => return Err(unsupported(unique_id, action)),
        }
        return Ok(finish(&*panel, action));
    }

    if let Some(switch) = entities.switches.iter_mut().find(|e| e.unique_id() == unique_id) {
        match action {
            Action::TurnOn => switch.turn_on(client)?,
            Action::TurnOff => switch.turn_off(client)?,
            _ => return Err(unsupported(unique_id, action)),
        }
        return Ok(finish(&*switch, action));
    }

    // Read-only entities exist but cannot be controlled.
    match entities.find(unique_id) {
        Some(_) => Err(unsupported(unique_id, action)),
        None => Err(CommandError::UnknownEntity(unique_id.to_string())),
    }
}

fn unsupported(unique_id: &str, action: Action) -> CommandError {
    CommandError::Unsupported {
        unique_id: unique_id.to_string(),
        action,
    }
}

fn finish(entity: &dyn Entity, action: Action) -> String {
    let state = entity.state();
    info!("{} '{}' ({}): now {}", action.as_str(), entity.name(), entity.unique_id(), state);
    state
}
