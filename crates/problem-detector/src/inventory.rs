//! Offline inventory backed by a YAML snapshot.
//!
//! The snapshot describes datacenters with their datastores, clusters and
//! standalone hosts, plus the privileges each principal holds per object
//! name. Object ids are assigned in file order the way vCenter hands out
//! managed object references (`datacenter-1`, `datastore-2`, `host-3`,
//! `domain-c4`, ...).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use check_engine::{
    AuthorizationManager, ClusterProperty, ClusterSummary, ComputeClusterInfo, DatacenterInfo,
    DatastoreInfo, DatastoreProperty, DatastoreSummary, EntityPrivileges, HostInfo, HostProperty,
    HostSummary, InventoryClient, InventoryError, ProductInfo, PropertyRequest, ResourceHandle,
    ResourceKind, ResourceMetadata,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{read_snapshot, SnapshotError};

fn default_true() -> bool {
    true
}

fn default_datastore_type() -> String {
    "VMFS".to_string()
}

/// Root of an inventory snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryModel {
    /// `false` makes the connectivity probe fail.
    #[serde(default = "default_true")]
    pub reachable: bool,
    #[serde(default)]
    pub datacenters: Vec<DatacenterModel>,
    /// Principal, then object name, then granted privileges.
    #[serde(default)]
    pub privileges: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatacenterModel {
    pub name: String,
    #[serde(default)]
    pub datastores: Vec<DatastoreModel>,
    #[serde(default)]
    pub clusters: Vec<ClusterModel>,
    /// Hosts outside any cluster.
    #[serde(default)]
    pub hosts: Vec<HostModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreModel {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "type", default = "default_datastore_type")]
    pub datastore_type: String,
    #[serde(default = "default_true")]
    pub accessible: bool,
    /// Bytes.
    pub capacity: u64,
    /// Bytes.
    pub free_space: u64,
    /// Names of the hosts mounting the datastore.
    #[serde(default)]
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterModel {
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<HostModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostModel {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_true")]
    pub connected: bool,
    #[serde(default)]
    pub in_maintenance_mode: bool,
}

/// A located object: its handle and the datacenter it lives in.
#[derive(Debug, Clone)]
struct Placement {
    datacenter: ResourceHandle,
    handle: ResourceHandle,
}

/// In-memory [`InventoryClient`] and [`AuthorizationManager`].
#[derive(Debug, Default)]
pub struct StaticInventory {
    reachable: bool,
    objects: HashMap<ResourceHandle, ResourceMetadata>,
    names: HashMap<(ResourceKind, String), Vec<Placement>>,
    privileges: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl StaticInventory {
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let model: InventoryModel = read_snapshot(path)?;
        Self::from_model(model)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, SnapshotError> {
        let model: InventoryModel = serde_yaml::from_str(contents)
            .map_err(|err| SnapshotError::Invalid(err.to_string()))?;
        Self::from_model(model)
    }

    pub fn from_model(model: InventoryModel) -> Result<Self, SnapshotError> {
        let mut builder = Builder::default();
        for datacenter in &model.datacenters {
            builder.datacenter(datacenter)?;
        }
        debug!(
            objects = builder.inventory.objects.len(),
            "Loaded inventory snapshot"
        );

        let mut inventory = builder.inventory;
        inventory.reachable = model.reachable;
        inventory.privileges = model.privileges;
        Ok(inventory)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn object(&self, handle: &ResourceHandle) -> Result<&ResourceMetadata, InventoryError> {
        self.objects
            .get(handle)
            .ok_or_else(|| InventoryError::not_found(handle.kind(), handle.id()))
    }
}

#[derive(Default)]
struct Builder {
    inventory: StaticInventory,
    next_id: u32,
}

impl Builder {
    fn handle(&mut self, kind: ResourceKind) -> ResourceHandle {
        self.next_id += 1;
        let prefix = match kind {
            ResourceKind::Datacenter => "datacenter-",
            ResourceKind::Datastore => "datastore-",
            ResourceKind::HostSystem => "host-",
            ResourceKind::ComputeCluster => "domain-c",
        };
        ResourceHandle::new(kind, format!("{prefix}{}", self.next_id))
    }

    fn insert(
        &mut self,
        datacenter: &ResourceHandle,
        handle: ResourceHandle,
        metadata: ResourceMetadata,
    ) -> Result<(), SnapshotError> {
        let placements = self
            .inventory
            .names
            .entry((handle.kind(), metadata.name().to_string()))
            .or_default();
        if placements.iter().any(|p| &p.datacenter == datacenter) {
            return Err(SnapshotError::Invalid(format!(
                "duplicate {} {} in the same datacenter",
                handle.kind(),
                metadata.name()
            )));
        }
        placements.push(Placement {
            datacenter: datacenter.clone(),
            handle: handle.clone(),
        });
        self.inventory.objects.insert(handle, metadata);
        Ok(())
    }

    fn datacenter(&mut self, model: &DatacenterModel) -> Result<(), SnapshotError> {
        let datacenter = self.handle(ResourceKind::Datacenter);
        self.insert(
            &datacenter.clone(),
            datacenter.clone(),
            ResourceMetadata::Datacenter(Arc::new(DatacenterInfo {
                name: model.name.clone(),
            })),
        )?;

        let mut hosts_by_name = HashMap::new();
        for cluster in &model.clusters {
            let handle = self.handle(ResourceKind::ComputeCluster);
            let mut members = Vec::with_capacity(cluster.hosts.len());
            for host in &cluster.hosts {
                let host_handle = self.host(&datacenter, host, handle.clone())?;
                hosts_by_name.insert(host.name.clone(), host_handle.clone());
                members.push(host_handle);
            }
            let connected = cluster.hosts.iter().filter(|host| host.connected).count();
            self.insert(
                &datacenter,
                handle,
                ResourceMetadata::ComputeCluster(Arc::new(ComputeClusterInfo {
                    name: cluster.name.clone(),
                    summary: Some(ClusterSummary {
                        num_hosts: u32::try_from(members.len()).unwrap_or(u32::MAX),
                        num_effective_hosts: u32::try_from(connected).unwrap_or(u32::MAX),
                    }),
                    hosts: members,
                })),
            )?;
        }
        for host in &model.hosts {
            let host_handle = self.host(&datacenter, host, datacenter.clone())?;
            hosts_by_name.insert(host.name.clone(), host_handle);
        }

        for datastore in &model.datastores {
            let mounts = datastore
                .hosts
                .iter()
                .map(|name| {
                    hosts_by_name.get(name).cloned().ok_or_else(|| {
                        SnapshotError::Invalid(format!(
                            "datastore {} is mounted on unknown host {name}",
                            datastore.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let handle = self.handle(ResourceKind::Datastore);
            self.insert(
                &datacenter,
                handle,
                ResourceMetadata::Datastore(Arc::new(DatastoreInfo {
                    name: datastore.name.clone(),
                    url: datastore.url.clone(),
                    summary: Some(DatastoreSummary {
                        accessible: datastore.accessible,
                        capacity: datastore.capacity,
                        free_space: datastore.free_space,
                        datastore_type: datastore.datastore_type.clone(),
                    }),
                    host_mounts: mounts,
                })),
            )?;
        }
        Ok(())
    }

    fn host(
        &mut self,
        datacenter: &ResourceHandle,
        model: &HostModel,
        parent: ResourceHandle,
    ) -> Result<ResourceHandle, SnapshotError> {
        let handle = self.handle(ResourceKind::HostSystem);
        self.insert(
            datacenter,
            handle.clone(),
            ResourceMetadata::Host(Arc::new(HostInfo {
                name: model.name.clone(),
                summary: Some(HostSummary {
                    connected: model.connected,
                    in_maintenance_mode: model.in_maintenance_mode,
                }),
                product: Some(ProductInfo {
                    version: model.version.clone(),
                    api_version: model
                        .api_version
                        .clone()
                        .unwrap_or_else(|| model.version.clone()),
                }),
                parent: Some(parent),
            })),
        )?;
        Ok(handle)
    }
}

/// Keep only the properties named in `request`.
fn project(metadata: &ResourceMetadata, request: &PropertyRequest) -> ResourceMetadata {
    match (metadata, request) {
        (ResourceMetadata::Datastore(info), PropertyRequest::Datastore(properties)) => {
            let wants = |property| properties.contains(&property);
            ResourceMetadata::Datastore(Arc::new(DatastoreInfo {
                name: info.name.clone(),
                url: info.url.clone().filter(|_| wants(DatastoreProperty::Info)),
                summary: info.summary.clone().filter(|_| wants(DatastoreProperty::Summary)),
                host_mounts: if wants(DatastoreProperty::HostMounts) {
                    info.host_mounts.clone()
                } else {
                    Vec::new()
                },
            }))
        }
        (ResourceMetadata::Host(info), PropertyRequest::Host(properties)) => {
            let wants = |property| properties.contains(&property);
            ResourceMetadata::Host(Arc::new(HostInfo {
                name: info.name.clone(),
                summary: info.summary.clone().filter(|_| wants(HostProperty::Summary)),
                product: info.product.clone().filter(|_| wants(HostProperty::Product)),
                parent: info.parent.clone().filter(|_| wants(HostProperty::Parent)),
            }))
        }
        (ResourceMetadata::ComputeCluster(info), PropertyRequest::ComputeCluster(properties)) => {
            let wants = |property| properties.contains(&property);
            ResourceMetadata::ComputeCluster(Arc::new(ComputeClusterInfo {
                name: info.name.clone(),
                summary: info.summary.clone().filter(|_| wants(ClusterProperty::Summary)),
                hosts: if wants(ClusterProperty::Hosts) {
                    info.hosts.clone()
                } else {
                    Vec::new()
                },
            }))
        }
        _ => metadata.clone(),
    }
}

#[async_trait]
impl InventoryClient for StaticInventory {
    async fn ping(&self) -> Result<(), InventoryError> {
        if self.reachable {
            Ok(())
        } else {
            Err(InventoryError::Unreachable(
                "inventory snapshot is marked unreachable".into(),
            ))
        }
    }

    async fn find(
        &self,
        kind: ResourceKind,
        name: &str,
        scope: Option<&ResourceHandle>,
    ) -> Result<ResourceHandle, InventoryError> {
        let placements = self
            .names
            .get(&(kind, name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default();
        placements
            .iter()
            .find(|placement| scope.map_or(true, |scope| &placement.datacenter == scope))
            .map(|placement| placement.handle.clone())
            .ok_or_else(|| InventoryError::not_found(kind, name))
    }

    async fn retrieve(
        &self,
        handle: &ResourceHandle,
        request: &PropertyRequest,
    ) -> Result<ResourceMetadata, InventoryError> {
        if request.kind() != handle.kind() {
            return Err(InventoryError::Other(format!(
                "{} properties requested for {handle}",
                request.kind()
            )));
        }
        Ok(project(self.object(handle)?, request))
    }
}

#[async_trait]
impl AuthorizationManager for StaticInventory {
    async fn fetch_user_privileges(
        &self,
        entities: &[ResourceHandle],
        user: &str,
    ) -> Result<Vec<EntityPrivileges>, InventoryError> {
        let granted = self.privileges.get(user);
        entities
            .iter()
            .map(|entity| -> Result<EntityPrivileges, InventoryError> {
                let name = self.object(entity)?.name();
                Ok(EntityPrivileges {
                    entity: entity.clone(),
                    privileges: granted
                        .and_then(|objects| objects.get(name))
                        .cloned()
                        .unwrap_or_default(),
                })
            })
            .collect()
    }
}
