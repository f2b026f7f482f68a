//! Node provider IDs.

use std::sync::{Arc, LazyLock};

use check_engine::{CheckContext, CheckError, Finding};
use k8s_openapi::api::core::v1::Node;
use regex::Regex;

use crate::config::DetectorConfig;

pub const NAME: &str = "CheckNodeProviderID";

/// `vsphere://` followed by the VM's BIOS UUID.
static PROVIDER_ID: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"^vsphere://[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
});

/// Every node carries a vSphere provider ID.
pub async fn check_node_provider_id(
    ctx: CheckContext,
    _config: Arc<DetectorConfig>,
) -> Result<Finding, CheckError> {
    let pattern = PROVIDER_ID
        .as_ref()
        .map_err(|err| CheckError::failed(format!("invalid provider ID pattern: {err}")))?;
    let nodes = ctx.nodes().await?;
    if nodes.is_empty() {
        return Ok(Finding::warning("cluster has no nodes"));
    }

    let offenders: Vec<String> = nodes
        .iter()
        .filter_map(|node| offender(pattern, node))
        .collect();
    if offenders.is_empty() {
        Ok(Finding::ok(format!(
            "all {} nodes have a vSphere provider ID",
            nodes.len()
        )))
    } else {
        Ok(Finding::error(super::describe(
            "nodes without a valid vSphere provider ID",
            &offenders,
        ))
        .with_affected(offenders))
    }
}

/// Describe `node` if its provider ID is missing or malformed.
fn offender(pattern: &Regex, node: &Node) -> Option<String> {
    let name = node.metadata.name.as_deref().unwrap_or("<unnamed>");
    match node.spec.as_ref().and_then(|spec| spec.provider_id.as_deref()) {
        None | Some("") => Some(format!("{name} (no provider ID)")),
        Some(id) if !pattern.is_match(id) => Some(format!("{name} ({id})")),
        Some(_) => None,
    }
}
