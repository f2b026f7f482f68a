//! Metadata resolved for managed objects.
//!
//! Fields backed by an optional property are `None` when the property was not
//! part of the request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::handle::{ResourceHandle, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterInfo {
    pub name: String,
}

/// Capacity and accessibility of a datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreSummary {
    pub accessible: bool,
    /// Bytes.
    pub capacity: u64,
    /// Bytes.
    pub free_space: u64,
    /// Filesystem type (VMFS, NFS, vsan, ...).
    pub datastore_type: String,
}

impl DatastoreSummary {
    /// Free space as a percentage of capacity, 0 when capacity is unknown.
    pub fn free_percent(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.free_space as f64 / self.capacity as f64;
        ratio * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreInfo {
    pub name: String,
    pub url: Option<String>,
    pub summary: Option<DatastoreSummary>,
    /// Hosts that mount this datastore.
    pub host_mounts: Vec<ResourceHandle>,
}

/// Product running on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub version: String,
    pub api_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSummary {
    pub connected: bool,
    pub in_maintenance_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub name: String,
    pub summary: Option<HostSummary>,
    pub product: Option<ProductInfo>,
    /// Compute cluster or standalone compute resource owning the host.
    pub parent: Option<ResourceHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub num_hosts: u32,
    pub num_effective_hosts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeClusterInfo {
    pub name: String,
    pub summary: Option<ClusterSummary>,
    pub hosts: Vec<ResourceHandle>,
}

/// Resolved metadata of any managed object. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceMetadata {
    Datacenter(Arc<DatacenterInfo>),
    Datastore(Arc<DatastoreInfo>),
    Host(Arc<HostInfo>),
    ComputeCluster(Arc<ComputeClusterInfo>),
}

impl ResourceMetadata {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Datacenter(_) => ResourceKind::Datacenter,
            Self::Datastore(_) => ResourceKind::Datastore,
            Self::Host(_) => ResourceKind::HostSystem,
            Self::ComputeCluster(_) => ResourceKind::ComputeCluster,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Datacenter(info) => &info.name,
            Self::Datastore(info) => &info.name,
            Self::Host(info) => &info.name,
            Self::ComputeCluster(info) => &info.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_percent() {
        let summary = DatastoreSummary {
            accessible: true,
            capacity: 200,
            free_space: 50,
            datastore_type: "VMFS".into(),
        };
        assert!((summary.free_percent() - 25.0).abs() < f64::EPSILON);

        let unknown = DatastoreSummary {
            capacity: 0,
            ..summary
        };
        assert!(unknown.free_percent().abs() < f64::EPSILON);
    }
}
