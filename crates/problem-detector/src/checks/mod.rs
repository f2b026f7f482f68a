//! Built-in check battery.
//!
//! Every check is an async function of its [`CheckContext`] and the detector
//! configuration. Checks share inventory lookups through the context cache
//! and never depend on each other.

pub mod datastore;
pub mod hosts;
pub mod infrastructure;
pub mod nodes;
pub mod permissions;
pub mod pvs;
pub mod storage;

use std::future::Future;
use std::sync::Arc;

use check_engine::{CheckContext, CheckError, CheckRegistry, Finding, RegistryError};
use tracing::{debug, warn};

use crate::config::DetectorConfig;

/// Names of every built-in check, in registry order.
pub const BUILTIN_CHECKS: &[&str] = &[
    permissions::NAME,
    datastore::NAME,
    hosts::NAME,
    infrastructure::NAME,
    nodes::NAME,
    pvs::NAME,
    storage::NAME,
];

/// Build the registry of enabled built-in checks, applying the configured
/// timeout overrides.
pub fn default_registry(config: &DetectorConfig) -> Result<CheckRegistry, RegistryError> {
    for name in config.checks.disabled.iter().chain(config.checks.overrides.keys()) {
        if !BUILTIN_CHECKS.contains(&name.as_str()) {
            warn!(check = %name, "Configuration names an unknown check");
        }
    }

    let config = Arc::new(config.clone());
    let mut registry = CheckRegistry::new();
    add(&mut registry, &config, datastore::NAME, datastore::check_default_datastore)?;
    add(&mut registry, &config, nodes::NAME, nodes::check_node_provider_id)?;
    add(&mut registry, &config, storage::NAME, storage::check_storage_classes)?;
    add(&mut registry, &config, pvs::NAME, pvs::check_pvs)?;
    add(&mut registry, &config, permissions::NAME, permissions::check_account_permissions)?;
    add(&mut registry, &config, hosts::NAME, hosts::check_host_versions)?;
    add(&mut registry, &config, infrastructure::NAME, infrastructure::check_infrastructure)?;
    Ok(registry)
}

fn add<F, Fut>(
    registry: &mut CheckRegistry,
    config: &Arc<DetectorConfig>,
    name: &str,
    check: F,
) -> Result<(), RegistryError>
where
    F: Fn(CheckContext, Arc<DetectorConfig>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Finding, CheckError>> + Send + 'static,
{
    if config.is_disabled(name) {
        debug!(check = %name, "Check disabled by configuration");
        return Ok(());
    }
    let shared = Arc::clone(config);
    let run = move |ctx: CheckContext| check(ctx, Arc::clone(&shared));
    match config.check_timeout(name) {
        Some(timeout) => registry.register_with_timeout(name, timeout, run),
        None => registry.register(name, run),
    }
}

/// Join affected object descriptions into one finding message.
pub(crate) fn describe(prefix: &str, items: &[String]) -> String {
    format!("{prefix}: {}", items.join(", "))
}
