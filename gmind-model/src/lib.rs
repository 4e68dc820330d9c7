//! Shared data model for the greenhouse-minder backend.
//!
//! Defines the identity types and wire payloads that cross crate
//! boundaries: client/greenhouse identities used by the session
//! registry in `gmind-registry`, and the device/action vocabulary
//! used by the scheduled-control layer in `gmind-sched`. The types
//! here carry no behavior beyond parsing and formatting so that the
//! registry and dispatcher crates stay free of each other's concerns.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// [`ClientId`] identifies a connected mobile client. Derived from the
/// authenticated session by the (out of scope) gateway layer; the
/// registry treats it as opaque
pub type ClientId = String;

/// [`GreenhouseId`] identifies a subscribable greenhouse. Assigned by
/// the external data service; the registry treats it as a lookup key
pub type GreenhouseId = String;

/// Index of a field (growing bed) within a greenhouse
pub type FieldId = i32;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unknown device {0:?}")]
    UnknownDevice(String),
    #[error("unknown action {0:?}")]
    UnknownAction(String),
}

/// Controllable device attached to a greenhouse field. The variants
/// match the device vocabulary of the external control service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Fan,
    Led,
    Pump,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Fan => "fan",
            Device::Led => "led",
            Device::Pump => "pump",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fan" => Ok(Device::Fan),
            "led" => Ok(Device::Led),
            "pump" => Ok(Device::Pump),
            other => Err(ModelError::UnknownDevice(other.to_string())),
        }
    }
}

/// Action to apply to a [`Device`]. On the wire the control service
/// expects 1 for on and 0 for off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceAction {
    On,
    Off,
}

impl DeviceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceAction::On => "on",
            DeviceAction::Off => "off",
        }
    }

    /// Wire payload understood by the control service
    pub fn wire_value(&self) -> u8 {
        match self {
            DeviceAction::On => 1,
            DeviceAction::Off => 0,
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceAction {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(DeviceAction::On),
            "off" => Ok(DeviceAction::Off),
            other => Err(ModelError::UnknownAction(other.to_string())),
        }
    }
}

/// Per-field sensor state as reported by the data service. The sensor
/// map is carried opaquely; only the index is meaningful to the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    pub field_index: FieldId,
    pub sensors: serde_json::Value,
}

/// [`GreenhouseSnapshot`] is the payload fanned out to subscribed
/// clients whenever a greenhouse's state changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreenhouseSnapshot {
    pub greenhouse: GreenhouseId,
    pub name: String,
    pub fields: Vec<FieldState>,
    pub updated_at: NaiveDateTime,
}

impl GreenhouseSnapshot {
    pub fn new(greenhouse: GreenhouseId, name: String, updated_at: NaiveDateTime) -> Self {
        Self {
            greenhouse,
            name,
            fields: vec![],
            updated_at,
        }
    }
}
