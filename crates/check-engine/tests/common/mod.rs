//! Hand-written stand-ins for the collaborator traits.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use check_engine::{
    AuthorizationManager, ClusterState, Collaborators, ComputeClusterInfo, DatacenterInfo,
    DatastoreInfo, DatastoreSummary, EntityPrivileges, HostInfo, InfrastructureDescriptor,
    InventoryClient, InventoryError, ProductInfo, PropertyRequest, ResourceHandle, ResourceKind,
    ResourceMetadata,
};
use k8s_openapi::api::core::v1::{Node, PersistentVolume};
use k8s_openapi::api::storage::v1::StorageClass;

pub const DATACENTER_ID: &str = "datacenter-2";
pub const DATASTORE_ID: &str = "datastore-10";
pub const CLUSTER_ID: &str = "domain-c7";
pub const CLUSTER_HOST_ID: &str = "host-24";
pub const STANDALONE_HOST_ID: &str = "host-30";

/// In-memory inventory that counts remote calls and can inject latency.
pub struct FakeInventory {
    objects: HashMap<ResourceHandle, ResourceMetadata>,
    names: HashMap<(ResourceKind, String), ResourceHandle>,
    latency: Duration,
    unreachable: bool,
    pub pings: AtomicUsize,
    pub finds: AtomicUsize,
    pub retrieves: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeInventory {
    /// DC0 with one datastore, a clustered host and a standalone host.
    pub fn new() -> Self {
        let mut inventory = Self {
            objects: HashMap::new(),
            names: HashMap::new(),
            latency: Duration::ZERO,
            unreachable: false,
            pings: AtomicUsize::new(0),
            finds: AtomicUsize::new(0),
            retrieves: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        };

        let cluster_host = ResourceHandle::new(ResourceKind::HostSystem, CLUSTER_HOST_ID);
        let standalone_host = ResourceHandle::new(ResourceKind::HostSystem, STANDALONE_HOST_ID);
        let cluster = ResourceHandle::new(ResourceKind::ComputeCluster, CLUSTER_ID);

        inventory.add(
            ResourceHandle::new(ResourceKind::Datacenter, DATACENTER_ID),
            ResourceMetadata::Datacenter(Arc::new(DatacenterInfo { name: "DC0".into() })),
        );
        inventory.add(
            ResourceHandle::new(ResourceKind::Datastore, DATASTORE_ID),
            ResourceMetadata::Datastore(Arc::new(DatastoreInfo {
                name: "LocalDS_0".into(),
                url: Some("ds:///vmfs/volumes/local-0/".into()),
                summary: Some(DatastoreSummary {
                    accessible: true,
                    capacity: 100,
                    free_space: 40,
                    datastore_type: "VMFS".into(),
                }),
                host_mounts: vec![cluster_host.clone(), standalone_host.clone()],
            })),
        );
        inventory.add(
            cluster_host.clone(),
            ResourceMetadata::Host(Arc::new(HostInfo {
                name: "DC0_C0_H0".into(),
                summary: None,
                product: Some(ProductInfo {
                    version: "7.0.3".into(),
                    api_version: "7.0.3.0".into(),
                }),
                parent: Some(cluster.clone()),
            })),
        );
        inventory.add(
            standalone_host,
            ResourceMetadata::Host(Arc::new(HostInfo {
                name: "DC0_H0".into(),
                summary: None,
                product: Some(ProductInfo {
                    version: "6.5.0".into(),
                    api_version: "6.5".into(),
                }),
                parent: Some(ResourceHandle::new(ResourceKind::Datacenter, DATACENTER_ID)),
            })),
        );
        inventory.add(
            cluster,
            ResourceMetadata::ComputeCluster(Arc::new(ComputeClusterInfo {
                name: "DC0_C0".into(),
                summary: None,
                hosts: vec![cluster_host],
            })),
        );
        inventory
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    fn add(&mut self, handle: ResourceHandle, metadata: ResourceMetadata) {
        self.names
            .insert((handle.kind(), metadata.name().to_string()), handle.clone());
        self.objects.insert(handle, metadata);
    }

    async fn remote_call(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl InventoryClient for FakeInventory {
    async fn ping(&self) -> Result<(), InventoryError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(InventoryError::Unreachable("connection refused".into()));
        }
        Ok(())
    }

    async fn find(
        &self,
        kind: ResourceKind,
        name: &str,
        _scope: Option<&ResourceHandle>,
    ) -> Result<ResourceHandle, InventoryError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.remote_call().await;
        self.names
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| InventoryError::not_found(kind, name))
    }

    async fn retrieve(
        &self,
        handle: &ResourceHandle,
        request: &PropertyRequest,
    ) -> Result<ResourceMetadata, InventoryError> {
        self.retrieves.fetch_add(1, Ordering::SeqCst);
        self.remote_call().await;
        assert_eq!(request.kind(), handle.kind(), "mismatched property request");
        self.objects
            .get(handle)
            .cloned()
            .ok_or_else(|| InventoryError::not_found(handle.kind(), handle.id()))
    }
}

/// Grants a fixed privilege list on every entity.
pub struct FakeAuthorization {
    pub privileges: Vec<String>,
}

#[async_trait]
impl AuthorizationManager for FakeAuthorization {
    async fn fetch_user_privileges(
        &self,
        entities: &[ResourceHandle],
        _user: &str,
    ) -> Result<Vec<EntityPrivileges>, InventoryError> {
        Ok(entities
            .iter()
            .map(|entity| EntityPrivileges {
                entity: entity.clone(),
                privileges: self.privileges.clone(),
            })
            .collect())
    }
}

/// Cluster state backed by plain vectors.
#[derive(Default)]
pub struct FakeCluster {
    pub nodes: Vec<Node>,
    pub storage_classes: Vec<StorageClass>,
    pub persistent_volumes: Vec<PersistentVolume>,
    pub unavailable: bool,
}

#[async_trait]
impl ClusterState for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>, InventoryError> {
        if self.unavailable {
            return Err(InventoryError::Unavailable("api server down".into()));
        }
        Ok(self.nodes.clone())
    }

    async fn list_storage_classes(&self) -> Result<Vec<StorageClass>, InventoryError> {
        Ok(self.storage_classes.clone())
    }

    async fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>, InventoryError> {
        Ok(self.persistent_volumes.clone())
    }

    async fn infrastructure(&self) -> Result<InfrastructureDescriptor, InventoryError> {
        Ok(InfrastructureDescriptor {
            infrastructure_name: "my-cluster-id".into(),
            platform: "VSphere".into(),
            vcenters: vec!["vcenter.example.com".into()],
        })
    }
}

pub fn collaborators(inventory: Arc<FakeInventory>) -> Collaborators {
    Collaborators::new(
        inventory,
        Arc::new(FakeAuthorization {
            privileges: vec!["System.Read".into()],
        }),
        Arc::new(FakeCluster::default()),
        "administrator@vsphere.local",
    )
}
