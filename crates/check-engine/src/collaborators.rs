//! Capability traits for the remote systems checks talk to.
//!
//! Each trait is a small capability set so tests can substitute hand-written
//! stand-ins.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, PersistentVolume};
use k8s_openapi::api::storage::v1::StorageClass;
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::handle::{PropertyRequest, ResourceHandle, ResourceKind};
use crate::metadata::ResourceMetadata;

/// Directory lookup and property retrieval on the infrastructure endpoint.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Verify that the endpoint answers and the session is usable.
    async fn ping(&self) -> Result<(), InventoryError>;

    /// Resolve a named object to a handle, optionally within a parent scope
    /// (typically a datacenter).
    async fn find(
        &self,
        kind: ResourceKind,
        name: &str,
        scope: Option<&ResourceHandle>,
    ) -> Result<ResourceHandle, InventoryError>;

    /// Fetch the requested properties of one object.
    async fn retrieve(
        &self,
        handle: &ResourceHandle,
        request: &PropertyRequest,
    ) -> Result<ResourceMetadata, InventoryError>;
}

/// Privileges granted to a principal on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPrivileges {
    pub entity: ResourceHandle,
    pub privileges: Vec<String>,
}

impl EntityPrivileges {
    pub fn has(&self, privilege: &str) -> bool {
        self.privileges.iter().any(|p| p == privilege)
    }
}

/// Permission queries for a principal.
#[async_trait]
pub trait AuthorizationManager: Send + Sync {
    async fn fetch_user_privileges(
        &self,
        entities: &[ResourceHandle],
        user: &str,
    ) -> Result<Vec<EntityPrivileges>, InventoryError>;
}

/// Cluster-wide infrastructure descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureDescriptor {
    /// Unique infrastructure name of the cluster.
    pub infrastructure_name: String,
    /// Platform type, e.g. `VSphere`.
    pub platform: String,
    /// vCenter servers the cluster is configured against.
    #[serde(default)]
    pub vcenters: Vec<String>,
}

/// Read access to the container-orchestration API.
#[async_trait]
pub trait ClusterState: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>, InventoryError>;

    async fn list_storage_classes(&self) -> Result<Vec<StorageClass>, InventoryError>;

    async fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>, InventoryError>;

    async fn infrastructure(&self) -> Result<InfrastructureDescriptor, InventoryError>;
}

/// Everything a run needs from the outside world.
///
/// Collaborators are shared, never owned by the run: their lifetime is
/// managed by the caller.
#[derive(Clone)]
pub struct Collaborators {
    pub inventory: Arc<dyn InventoryClient>,
    pub authorization: Arc<dyn AuthorizationManager>,
    pub cluster: Arc<dyn ClusterState>,
    /// Principal whose privileges checks audit.
    pub username: String,
}

impl Collaborators {
    pub fn new(
        inventory: Arc<dyn InventoryClient>,
        authorization: Arc<dyn AuthorizationManager>,
        cluster: Arc<dyn ClusterState>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            inventory,
            authorization,
            cluster,
            username: username.into(),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
