//! Default datastore health.

use std::sync::Arc;

use check_engine::{CheckContext, CheckError, Finding};

use crate::config::DetectorConfig;

pub const NAME: &str = "CheckDefaultDatastore";

/// Longest datastore name whose escaped volume paths stay within the
/// kubelet's volume name limit.
pub const MAX_DATASTORE_NAME_LEN: usize = 59;

/// The configured default datastore exists, is accessible, has room left
/// and has a name short enough for dynamic provisioning.
pub async fn check_default_datastore(
    ctx: CheckContext,
    config: Arc<DetectorConfig>,
) -> Result<Finding, CheckError> {
    let name = config.workspace.default_datastore.as_str();
    let datacenter = ctx.datacenter(&config.workspace.datacenter).await?;
    let handle = ctx.datastore_by_name(&datacenter, name).await?;
    let info = ctx.datastore(&handle).await?;

    let Some(summary) = info.summary.as_ref() else {
        return Ok(Finding::warning(format!("datastore {name} reported no summary"))
            .with_affected([name]));
    };
    if !summary.accessible {
        return Ok(Finding::error(format!("datastore {name} is not accessible")).with_affected([name]));
    }

    let mut warnings = Vec::new();
    if name.len() > MAX_DATASTORE_NAME_LEN {
        warnings.push(format!(
            "name is {} characters long, dynamic provisioning supports at most {MAX_DATASTORE_NAME_LEN}",
            name.len()
        ));
    }
    let free = summary.free_percent();
    let minimum = config.thresholds.min_free_space_percent;
    if free < minimum {
        warnings.push(format!("only {free:.1}% free, below the {minimum:.1}% threshold"));
    }

    if warnings.is_empty() {
        Ok(Finding::ok(format!(
            "datastore {name} is accessible with {free:.1}% free"
        )))
    } else {
        Ok(Finding::warning(format!("datastore {name}: {}", warnings.join("; "))).with_affected([name]))
    }
}
