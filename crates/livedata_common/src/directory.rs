//! Read-only device/cluster directory.
//!
//! The resolver and the command lookup only ever see this trait, so they
//! can run against the file-backed inventory below or any other store.

use crate::error::{LivedataError, Result};
use crate::types::{Cluster, CommandSpec, Device, Interface, Platform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

pub trait DeviceDirectory: Send + Sync {
    fn interface(&self, id: &str) -> Option<Interface>;

    fn device(&self, id: &str) -> Option<Device>;

    fn cluster(&self, id: &str) -> Option<Cluster>;

    fn platform(&self, id: &str) -> Option<Platform>;

    fn device_count(&self) -> usize;

    /// Configured command templates for a platform, if any
    fn command_spec(&self, platform_id: &str) -> Option<CommandSpec> {
        self.platform(platform_id)
            .and_then(|p| p.interface_commands)
            .map(|text| CommandSpec::from_text(&text))
            .filter(|spec| !spec.is_empty())
    }
}

/// Look up the command templates for a device's platform
pub fn command_spec_for_device(directory: &dyn DeviceDirectory, device: &Device) -> Result<CommandSpec> {
    let missing = |reason: &str| LivedataError::MissingCommandSource {
        device: device.name.clone(),
        reason: reason.to_string(),
    };

    let platform_id = device
        .platform_id
        .as_deref()
        .ok_or_else(|| missing("the platform is not set"))?;
    let platform = directory
        .platform(platform_id)
        .ok_or_else(|| missing("the platform does not exist"))?;

    if platform.network_driver.as_deref().map_or(true, |d| d.trim().is_empty()) {
        return Err(missing("the network driver is not set"));
    }

    directory
        .command_spec(platform_id)
        .ok_or_else(|| missing("the platform has no interface commands configured"))
}

/// Serialized inventory file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryFile {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub platforms: Vec<Platform>,
}

/// In-memory directory loaded from a TOML inventory
#[derive(Debug, Clone, Default)]
pub struct InventoryDirectory {
    devices: HashMap<String, Device>,
    interfaces: HashMap<String, Interface>,
    clusters: HashMap<String, Cluster>,
    platforms: HashMap<String, Platform>,
}

impl InventoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_inventory(inventory: InventoryFile) -> Self {
        let mut directory = Self::new();
        for device in inventory.devices {
            directory.add_device(device);
        }
        for interface in inventory.interfaces {
            directory.add_interface(interface);
        }
        for cluster in inventory.clusters {
            directory.add_cluster(cluster);
        }
        for platform in inventory.platforms {
            directory.add_platform(platform);
        }
        directory
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let inventory: InventoryFile =
            toml::from_str(content).map_err(|e| LivedataError::Config(format!("inventory: {}", e)))?;
        Ok(Self::from_inventory(inventory))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| LivedataError::Config(format!("reading {}: {}", path.display(), e)))?;
        let directory = Self::from_toml_str(&content)?;
        info!(
            "Loaded inventory from {} ({} devices, {} interfaces, {} clusters)",
            path.display(),
            directory.devices.len(),
            directory.interfaces.len(),
            directory.clusters.len()
        );
        Ok(directory)
    }

    pub fn add_device(&mut self, device: Device) {
        self.devices.insert(device.id.clone(), device);
    }

    pub fn add_interface(&mut self, interface: Interface) {
        self.interfaces.insert(interface.id.clone(), interface);
    }

    pub fn add_cluster(&mut self, cluster: Cluster) {
        self.clusters.insert(cluster.id.clone(), cluster);
    }

    pub fn add_platform(&mut self, platform: Platform) {
        self.platforms.insert(platform.id.clone(), platform);
    }
}

impl DeviceDirectory for InventoryDirectory {
    fn interface(&self, id: &str) -> Option<Interface> {
        self.interfaces.get(id).cloned()
    }

    fn device(&self, id: &str) -> Option<Device> {
        self.devices.get(id).cloned()
    }

    fn cluster(&self, id: &str) -> Option<Cluster> {
        self.clusters.get(id).cloned()
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn platform(&self, id: &str) -> Option<Platform> {
        self.platforms.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"
[[platforms]]
id = "ios"
name = "Cisco IOS"
network_driver = "cisco_ios"
interface_commands = """
show interface {{ intf_name }}

show run interface {{ intf_name }}
"""

[[platforms]]
id = "bare"
name = "No driver"

[[devices]]
id = "d1"
name = "sw-access-1"
management_address = "10.0.0.11/24"
status = "active"
platform_id = "ios"

[[devices]]
id = "d2"
name = "sw-access-2"
platform_id = "bare"

[[interfaces]]
id = "i1"
device_id = "d1"
name = "GigabitEthernet1/0/1"
"#;

    #[test]
    fn test_parse_inventory() {
        let dir = InventoryDirectory::from_toml_str(INVENTORY).unwrap();
        assert_eq!(dir.device_count(), 2);
        let iface = dir.interface("i1").unwrap();
        assert_eq!(iface.device_id, "d1");
        let device = dir.device("d2").unwrap();
        assert!(device.management_address.is_none());
    }

    #[test]
    fn test_command_spec_for_device() {
        let dir = InventoryDirectory::from_toml_str(INVENTORY).unwrap();
        let spec = command_spec_for_device(&dir, &dir.device("d1").unwrap()).unwrap();
        assert_eq!(
            spec.templates,
            vec!["show interface {{ intf_name }}", "show run interface {{ intf_name }}"]
        );
    }

    #[test]
    fn test_missing_network_driver() {
        let dir = InventoryDirectory::from_toml_str(INVENTORY).unwrap();
        let err = command_spec_for_device(&dir, &dir.device("d2").unwrap()).unwrap_err();
        assert_eq!(err.kind(), "missing_command_source");
        assert!(err.to_string().contains("network driver"));
    }

    #[test]
    fn test_invalid_inventory_is_config_error() {
        let err = InventoryDirectory::from_toml_str("[[devices]]\nname = 3").unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
