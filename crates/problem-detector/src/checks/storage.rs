//! Storage classes naming a vSphere datastore.

use std::sync::Arc;

use check_engine::{CheckContext, CheckError, Finding, FindingKind};
use k8s_openapi::api::storage::v1::StorageClass;

use crate::config::DetectorConfig;

pub const NAME: &str = "CheckStorageClasses";

pub const IN_TREE_PROVISIONER: &str = "kubernetes.io/vsphere-volume";
pub const CSI_PROVISIONER: &str = "csi.vsphere.vmware.com";

/// Datastore named by a vSphere storage class, if any. Parameter keys are
/// case-insensitive.
pub fn storage_class_datastore(class: &StorageClass) -> Option<&str> {
    if class.provisioner != IN_TREE_PROVISIONER && class.provisioner != CSI_PROVISIONER {
        return None;
    }
    class
        .parameters
        .as_ref()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("datastore"))
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
}

/// Every vSphere storage class refers to a datastore that exists.
pub async fn check_storage_classes(
    ctx: CheckContext,
    config: Arc<DetectorConfig>,
) -> Result<Finding, CheckError> {
    let classes = ctx.storage_classes().await?;
    let referencing: Vec<(&str, &str)> = classes
        .iter()
        .filter_map(|class| {
            let datastore = storage_class_datastore(class)?;
            Some((class.metadata.name.as_deref().unwrap_or("<unnamed>"), datastore))
        })
        .collect();
    if referencing.is_empty() {
        return Ok(Finding::ok("no storage class names a vSphere datastore"));
    }

    let datacenter = ctx.datacenter(&config.workspace.datacenter).await?;
    let mut missing = Vec::new();
    for (class, datastore) in &referencing {
        match ctx.datastore_by_name(&datacenter, datastore).await {
            Ok(_) => {}
            Err(err) if err.severity() == FindingKind::Warning => {
                missing.push(format!("{class} ({datastore})"));
            }
            Err(err) => return Err(err.into()),
        }
    }

    if missing.is_empty() {
        Ok(Finding::ok(format!(
            "{} storage classes reference existing datastores",
            referencing.len()
        )))
    } else {
        Ok(Finding::warning(super::describe(
            "storage classes reference unknown datastores",
            &missing,
        ))
        .with_affected(missing))
    }
}
