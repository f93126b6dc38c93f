//! Core data types shared by the resolver, renderer and job runner.

use crate::error::{LivedataError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of platform record a live query can start from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Interface,
    Device,
    DeviceCluster,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Interface => "interface",
            ObjectType::Device => "device",
            ObjectType::DeviceCluster => "device_cluster",
        }
    }

    /// Parse an object type as sent by callers.
    ///
    /// Accepts the short names and the `app.model` labels used by the web
    /// platform (`dcim.interface`, `dcim.device`, `dcim.virtualchassis`).
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "interface" | "dcim.interface" => Ok(ObjectType::Interface),
            "device" | "dcim.device" => Ok(ObjectType::Device),
            "device_cluster" | "cluster" | "virtual_chassis" | "dcim.virtualchassis" => {
                Ok(ObjectType::DeviceCluster)
            }
            _ => Err(LivedataError::InvalidObjectType(s.to_string())),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable input to resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    pub object_type: ObjectType,
    pub id: String,
}

impl ObjectReference {
    pub fn new(object_type: ObjectType, id: impl Into<String>) -> Self {
        Self {
            object_type,
            id: id.into(),
        }
    }

    pub fn parse(object_type: &str, id: &str) -> Result<Self> {
        Ok(Self::new(ObjectType::parse(object_type)?, id))
    }
}

/// Operational status of a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalState {
    Active,
    Planned,
    Staged,
    Offline,
    Failed,
    Inventory,
    Decommissioning,
    #[default]
    #[serde(other)]
    Unknown,
}

impl OperationalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalState::Active => "active",
            OperationalState::Planned => "planned",
            OperationalState::Staged => "staged",
            OperationalState::Offline => "offline",
            OperationalState::Failed => "failed",
            OperationalState::Inventory => "inventory",
            OperationalState::Decommissioning => "decommissioning",
            OperationalState::Unknown => "unknown",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, OperationalState::Active)
    }
}

impl fmt::Display for OperationalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    /// Primary management address, optionally with prefix length (`10.0.0.1/24`)
    #[serde(default)]
    pub management_address: Option<String>,
    #[serde(default, rename = "status")]
    pub operational_state: OperationalState,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub platform_id: Option<String>,
}

impl Device {
    /// Address usable for reaching the device, if any
    pub fn usable_address(&self) -> Option<&str> {
        self.management_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }

    pub fn has_usable_address(&self) -> bool {
        self.usable_address().is_some()
    }
}

/// Strip an optional `/prefix` from a management address
pub fn address_host(address: &str) -> &str {
    let address = address.trim();
    match address.split_once('/') {
        Some((host, _prefix)) => host,
        None => address,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub id: String,
    pub device_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A set of devices presented as one logical unit (virtual chassis)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub primary_member_id: Option<String>,
    /// Canonical member order; never re-sorted
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub network_driver: Option<String>,
    /// One command template per line
    #[serde(default)]
    pub interface_commands: Option<String>,
}

/// Ordered command templates for a platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub templates: Vec<String>,
}

impl CommandSpec {
    /// Build from multi-line text, dropping blank lines
    pub fn from_text(text: &str) -> Self {
        Self {
            templates: text
                .lines()
                .map(str::trim_end)
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }
}

/// Resolution result for one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDeviceContext {
    pub reference: ObjectReference,
    pub source_device: Device,
    pub source_interface: Option<Interface>,
    pub source_cluster: Option<Cluster>,
    /// Always has a usable address and is active
    pub managed_device: Device,
}

impl ManagedDeviceContext {
    pub fn summary(&self) -> ManagedDeviceSummary {
        ManagedDeviceSummary {
            object_type: self.reference.object_type,
            id: self.reference.id.clone(),
            device: self.source_device.id.clone(),
            interface: self.source_interface.as_ref().map(|i| i.id.clone()),
            cluster: self.source_cluster.as_ref().map(|c| c.id.clone()),
            managed_device: self.managed_device.id.clone(),
        }
    }
}

/// Id-only view of a resolution, as returned by the lookup endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedDeviceSummary {
    pub object_type: ObjectType,
    pub id: String,
    pub device: String,
    pub interface: Option<String>,
    pub cluster: Option<String>,
    pub managed_device: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedCommand {
    pub template: String,
    pub rendered: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
}
