//! Cluster infrastructure descriptor.

use std::sync::Arc;

use check_engine::{CheckContext, CheckError, Finding};

use crate::config::DetectorConfig;

pub const NAME: &str = "CheckInfrastructure";

const VSPHERE_PLATFORM: &str = "VSphere";

/// The cluster is installed on vSphere, has an infrastructure name and, when
/// it lists vCenters, lists the configured one.
pub async fn check_infrastructure(
    ctx: CheckContext,
    config: Arc<DetectorConfig>,
) -> Result<Finding, CheckError> {
    let infrastructure = ctx.infrastructure().await?;

    if !infrastructure.platform.eq_ignore_ascii_case(VSPHERE_PLATFORM) {
        return Ok(Finding::error(format!(
            "cluster platform is {:?}, expected {VSPHERE_PLATFORM}",
            infrastructure.platform
        )));
    }
    if infrastructure.infrastructure_name.is_empty() {
        return Ok(Finding::error("infrastructure name is empty"));
    }

    let server = config.workspace.server.as_str();
    if !server.is_empty()
        && !infrastructure.vcenters.is_empty()
        && !infrastructure.vcenters.iter().any(|vcenter| vcenter == server)
    {
        return Ok(Finding::warning(format!(
            "configured vCenter {server} is not among the cluster's vCenters: {}",
            infrastructure.vcenters.join(", ")
        ))
        .with_affected([server]));
    }

    Ok(Finding::ok(format!(
        "infrastructure {} runs on {VSPHERE_PLATFORM}",
        infrastructure.infrastructure_name
    )))
}
