//! Managed device resolution.
//!
//! Works out which physical device should receive CLI commands for an
//! interface, device or cluster reference. Cluster members share one
//! management identity, so a member without an address falls back to the
//! first member (in canonical cluster order) that has one.

use crate::directory::DeviceDirectory;
use crate::error::{LivedataError, Result};
use crate::types::{Cluster, Device, Interface, ManagedDeviceContext, ObjectReference, ObjectType};
use tracing::debug;

/// Resolve a raw `(object_type, id)` pair as received from a caller
pub fn resolve_raw(directory: &dyn DeviceDirectory, object_type: &str, id: &str) -> Result<ManagedDeviceContext> {
    let reference = ObjectReference::parse(object_type, id)?;
    resolve(directory, &reference)
}

pub fn resolve(directory: &dyn DeviceDirectory, reference: &ObjectReference) -> Result<ManagedDeviceContext> {
    let (source_device, source_interface, source_cluster) = source_for(directory, reference)?;

    let mut managed_device = source_device.clone();

    if !managed_device.has_usable_address() {
        let cluster_id = managed_device
            .cluster_id
            .clone()
            .ok_or_else(|| LivedataError::NoManagementAddress {
                device: managed_device.name.clone(),
            })?;
        let cluster = directory.cluster(&cluster_id).ok_or(LivedataError::NotFound {
            kind: "Cluster",
            id: cluster_id,
        })?;
        managed_device = first_reachable_member(directory, &cluster).ok_or_else(|| {
            LivedataError::NoManagementAddress {
                device: managed_device.name.clone(),
            }
        })?;
        debug!(
            "{} has no management address, using cluster member {}",
            source_device.name, managed_device.name
        );
    }

    if !managed_device.operational_state.is_active() {
        return Err(LivedataError::NotActive {
            device: managed_device.name.clone(),
            state: managed_device.operational_state.to_string(),
        });
    }

    Ok(ManagedDeviceContext {
        reference: reference.clone(),
        source_device,
        source_interface,
        source_cluster,
        managed_device,
    })
}

type Source = (Device, Option<Interface>, Option<Cluster>);

fn source_for(directory: &dyn DeviceDirectory, reference: &ObjectReference) -> Result<Source> {
    match reference.object_type {
        ObjectType::Interface => {
            let interface = directory
                .interface(&reference.id)
                .ok_or_else(|| not_found("Interface", &reference.id))?;
            let device = directory
                .device(&interface.device_id)
                .ok_or_else(|| not_found("Device", &interface.device_id))?;
            Ok((device, Some(interface), None))
        }
        ObjectType::Device => {
            let device = directory
                .device(&reference.id)
                .ok_or_else(|| not_found("Device", &reference.id))?;
            Ok((device, None, None))
        }
        ObjectType::DeviceCluster => {
            let cluster = directory
                .cluster(&reference.id)
                .ok_or_else(|| not_found("Cluster", &reference.id))?;
            let member_id = cluster
                .primary_member_id
                .as_ref()
                .or_else(|| cluster.member_ids.first())
                .ok_or_else(|| not_found("Cluster member of", &cluster.id))?;
            let device = directory
                .device(member_id)
                .ok_or_else(|| not_found("Device", member_id))?;
            Ok((device, None, Some(cluster)))
        }
    }
}

fn first_reachable_member(directory: &dyn DeviceDirectory, cluster: &Cluster) -> Option<Device> {
    cluster
        .member_ids
        .iter()
        .filter_map(|id| directory.device(id))
        .find(Device::has_usable_address)
}

fn not_found(kind: &'static str, id: &str) -> LivedataError {
    LivedataError::NotFound {
        kind,
        id: id.to_string(),
    }
}
