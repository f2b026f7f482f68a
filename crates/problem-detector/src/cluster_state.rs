//! Cluster-state listers: a live Kubernetes backend and a YAML snapshot.

use std::path::Path;

use async_trait::async_trait;
use check_engine::{ClusterState, InfrastructureDescriptor, InventoryError};
use k8s_openapi::api::core::v1::{Node, PersistentVolume};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{read_snapshot, SnapshotError};

/// Name of the cluster-scoped infrastructure singleton.
const INFRASTRUCTURE_NAME: &str = "cluster";

fn infrastructure_api() -> ApiResource {
    ApiResource {
        group: "config.openshift.io".to_string(),
        version: "v1".to_string(),
        api_version: "config.openshift.io/v1".to_string(),
        kind: "Infrastructure".to_string(),
        plural: "infrastructures".to_string(),
    }
}

fn unavailable(what: &str, err: &kube::Error) -> InventoryError {
    InventoryError::Unavailable(format!("{what}: {err}"))
}

/// [`ClusterState`] over a live API server.
#[derive(Clone)]
pub struct KubeClusterState {
    client: Client,
}

impl KubeClusterState {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with the in-cluster or kubeconfig credentials.
    pub async fn try_default() -> Result<Self, kube::Error> {
        Ok(Self::new(Client::try_default().await?))
    }
}

#[async_trait]
impl ClusterState for KubeClusterState {
    async fn list_nodes(&self) -> Result<Vec<Node>, InventoryError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|err| unavailable("list nodes", &err))?;
        debug!(count = list.items.len(), "Listed nodes");
        Ok(list.items)
    }

    async fn list_storage_classes(&self) -> Result<Vec<StorageClass>, InventoryError> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|err| unavailable("list storage classes", &err))?;
        Ok(list.items)
    }

    async fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>, InventoryError> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|err| unavailable("list persistent volumes", &err))?;
        Ok(list.items)
    }

    async fn infrastructure(&self) -> Result<InfrastructureDescriptor, InventoryError> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &infrastructure_api());
        let object = api
            .get(INFRASTRUCTURE_NAME)
            .await
            .map_err(|err| unavailable("get infrastructure", &err))?;
        Ok(describe_infrastructure(&object.data))
    }
}

/// Extract the descriptor from an `Infrastructure` object body.
fn describe_infrastructure(data: &serde_json::Value) -> InfrastructureDescriptor {
    let status = data.get("status");
    let infrastructure_name = status
        .and_then(|s| s.get("infrastructureName"))
        .and_then(|s| s.as_str())
        .unwrap_or_default()
        .to_string();

    // platformStatus.type supersedes the deprecated status.platform.
    let platform = status
        .and_then(|s| s.get("platformStatus"))
        .and_then(|s| s.get("type"))
        .or_else(|| status.and_then(|s| s.get("platform")))
        .and_then(|s| s.as_str())
        .unwrap_or_default()
        .to_string();

    let vcenters = data
        .get("spec")
        .and_then(|s| s.get("platformSpec"))
        .and_then(|s| s.get("vsphere"))
        .and_then(|s| s.get("vcenters"))
        .and_then(|s| s.as_array())
        .map(|vcenters| {
            vcenters
                .iter()
                .filter_map(|vcenter| vcenter.get("server").and_then(|s| s.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    InfrastructureDescriptor {
        infrastructure_name,
        platform,
        vcenters,
    }
}

/// Cluster snapshot as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub infrastructure: Option<InfrastructureDescriptor>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub storage_classes: Vec<StorageClass>,
    #[serde(default)]
    pub persistent_volumes: Vec<PersistentVolume>,
}

/// [`ClusterState`] served from a snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticClusterState {
    snapshot: ClusterSnapshot,
}

impl StaticClusterState {
    pub fn new(snapshot: ClusterSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        Ok(Self::new(read_snapshot(path)?))
    }

    pub fn from_yaml(contents: &str) -> Result<Self, SnapshotError> {
        let snapshot = serde_yaml::from_str(contents)
            .map_err(|err| SnapshotError::Invalid(err.to_string()))?;
        Ok(Self::new(snapshot))
    }
}

#[async_trait]
impl ClusterState for StaticClusterState {
    async fn list_nodes(&self) -> Result<Vec<Node>, InventoryError> {
        Ok(self.snapshot.nodes.clone())
    }

    async fn list_storage_classes(&self) -> Result<Vec<StorageClass>, InventoryError> {
        Ok(self.snapshot.storage_classes.clone())
    }

    async fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>, InventoryError> {
        Ok(self.snapshot.persistent_volumes.clone())
    }

    async fn infrastructure(&self) -> Result<InfrastructureDescriptor, InventoryError> {
        self.snapshot.infrastructure.clone().ok_or_else(|| {
            InventoryError::Unavailable("snapshot carries no infrastructure".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_describe_infrastructure() {
        let data = json!({
            "spec": {
                "platformSpec": {
                    "type": "VSphere",
                    "vsphere": {"vcenters": [{"server": "vcenter.example.com"}]}
                }
            },
            "status": {
                "infrastructureName": "my-cluster-id",
                "platform": "None",
                "platformStatus": {"type": "VSphere"}
            }
        });
        let descriptor = describe_infrastructure(&data);
        assert_eq!(descriptor.infrastructure_name, "my-cluster-id");
        assert_eq!(descriptor.platform, "VSphere");
        assert_eq!(descriptor.vcenters, vec!["vcenter.example.com"]);
    }

    #[test]
    fn test_describe_legacy_platform_field() {
        let data = json!({"status": {"infrastructureName": "legacy", "platform": "VSphere"}});
        let descriptor = describe_infrastructure(&data);
        assert_eq!(descriptor.platform, "VSphere");
        assert!(descriptor.vcenters.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_lists() {
        let state = StaticClusterState::from_yaml(
            r"
nodes:
  - apiVersion: v1
    kind: Node
    metadata:
      name: worker-0
    spec:
      providerID: vsphere://4207a3b4-1f5d-4a44-9a0f-6b2bd1c7e001
",
        )
        .unwrap();
        let nodes = state.list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].metadata.name.as_deref(), Some("worker-0"));
        assert!(state.list_storage_classes().await.unwrap().is_empty());
        assert!(matches!(
            state.infrastructure().await,
            Err(InventoryError::Unavailable(_))
        ));
    }
}
