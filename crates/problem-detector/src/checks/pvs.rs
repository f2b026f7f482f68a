//! In-tree vSphere persistent volumes.

use std::sync::Arc;

use check_engine::{CheckContext, CheckError, Finding, FindingKind};
use k8s_openapi::api::core::v1::PersistentVolume;

use crate::config::DetectorConfig;

pub const NAME: &str = "CheckPVs";

/// Datastore part of a `[datastore] folder/disk.vmdk` volume path.
pub fn volume_path_datastore(path: &str) -> Option<&str> {
    let rest = path.trim_start().strip_prefix('[')?;
    let (datastore, _) = rest.split_once(']')?;
    let datastore = datastore.trim();
    (!datastore.is_empty()).then_some(datastore)
}

fn volume_path(pv: &PersistentVolume) -> Option<&str> {
    pv.spec
        .as_ref()?
        .vsphere_volume
        .as_ref()
        .map(|source| source.volume_path.as_str())
}

/// Every vSphere-backed PV lives on a datastore that exists.
pub async fn check_pvs(
    ctx: CheckContext,
    config: Arc<DetectorConfig>,
) -> Result<Finding, CheckError> {
    let volumes = ctx.persistent_volumes().await?;
    let backed: Vec<(&str, &str)> = volumes
        .iter()
        .filter_map(|pv| {
            let path = volume_path(pv)?;
            Some((pv.metadata.name.as_deref().unwrap_or("<unnamed>"), path))
        })
        .collect();
    if backed.is_empty() {
        return Ok(Finding::ok("no in-tree vSphere persistent volumes"));
    }

    let datacenter = ctx.datacenter(&config.workspace.datacenter).await?;
    let mut problems = Vec::new();
    for (pv, path) in &backed {
        let Some(datastore) = volume_path_datastore(path) else {
            problems.push(format!("{pv} (malformed volume path {path:?})"));
            continue;
        };
        match ctx.datastore_by_name(&datacenter, datastore).await {
            Ok(_) => {}
            Err(err) if err.severity() == FindingKind::Warning => {
                problems.push(format!("{pv} (datastore {datastore} not found)"));
            }
            Err(err) => return Err(err.into()),
        }
    }

    if problems.is_empty() {
        Ok(Finding::ok(format!(
            "{} vSphere persistent volumes reference existing datastores",
            backed.len()
        )))
    } else {
        Ok(Finding::warning(super::describe(
            "persistent volumes with unusable volume paths",
            &problems,
        ))
        .with_affected(problems))
    }
}
