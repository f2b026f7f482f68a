//! ESXi versions of the hosts backing the default datastore.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use check_engine::{CheckContext, CheckError, Finding, FindingKind, HostSystem, TypedHandle};
use tracing::debug;

use crate::config::DetectorConfig;

pub const NAME: &str = "CheckHostVersions";

/// Dotted numeric release such as `6.7.3`. Missing trailing components
/// compare as zero.
#[derive(Debug, Clone)]
pub struct HostVersion(Vec<u32>);

impl FromStr for HostVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| format!("{s:?} is not a dotted numeric version"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(parts))
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl PartialEq for HostVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for HostVersion {}

impl PartialOrd for HostVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HostVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| {
                let a = self.0.get(i).copied().unwrap_or(0);
                let b = other.0.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// Every host mounting the default datastore runs at least the configured
/// minimum version.
pub async fn check_host_versions(
    ctx: CheckContext,
    config: Arc<DetectorConfig>,
) -> Result<Finding, CheckError> {
    let minimum: HostVersion = config
        .thresholds
        .minimum_host_version
        .parse()
        .map_err(CheckError::failed)?;
    let datacenter = ctx.datacenter(&config.workspace.datacenter).await?;
    let datastore = ctx
        .datastore_by_name(&datacenter, &config.workspace.default_datastore)
        .await?;
    let info = ctx.datastore(&datastore).await?;
    if info.host_mounts.is_empty() {
        return Ok(Finding::warning(format!(
            "datastore {} is not mounted on any host",
            info.name
        )));
    }

    let mut outdated = Vec::new();
    for mount in &info.host_mounts {
        let handle = TypedHandle::<HostSystem>::from_raw(mount.clone())?;
        let host = ctx.host(&handle).await?;
        let location = match ctx.compute_cluster_of(&handle).await {
            Ok((_, cluster)) => format!("cluster {}", cluster.name),
            Err(err) if err.severity() == FindingKind::Warning => "standalone".to_string(),
            Err(err) => return Err(err.into()),
        };

        let Some(product) = host.product.as_ref() else {
            outdated.push(format!("{} ({location}): version unknown", host.name));
            continue;
        };
        let Ok(version) = product.version.parse::<HostVersion>() else {
            outdated.push(format!(
                "{} ({location}): unparseable version {:?}",
                host.name, product.version
            ));
            continue;
        };
        debug!(host = %host.name, version = %version, location = %location, "Resolved host version");
        if version < minimum {
            outdated.push(format!("{} ({location}): {version}", host.name));
        }
    }

    if outdated.is_empty() {
        Ok(Finding::ok(format!(
            "{} hosts run ESXi {minimum} or newer",
            info.host_mounts.len()
        )))
    } else {
        Ok(Finding::warning(super::describe(
            &format!("hosts older than ESXi {minimum}"),
            &outdated,
        ))
        .with_affected(outdated))
    }
}
