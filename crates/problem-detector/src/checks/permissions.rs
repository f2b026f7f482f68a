//! Privileges of the audited account.

use std::sync::Arc;

use check_engine::{CheckContext, CheckError, Finding};

use crate::config::DetectorConfig;

pub const NAME: &str = "CheckAccountPermissions";

/// Privileges needed on the datacenter.
pub const DATACENTER_PRIVILEGES: &[&str] = &["System.Anonymous", "System.Read", "System.View"];

/// Privileges needed on the default datastore to provision volumes.
pub const DATASTORE_PRIVILEGES: &[&str] = &[
    "Datastore.AllocateSpace",
    "Datastore.Browse",
    "Datastore.FileManagement",
    "InventoryService.Tagging.ObjectAttachable",
];

/// The configured principal holds the privileges volume provisioning needs.
pub async fn check_account_permissions(
    ctx: CheckContext,
    config: Arc<DetectorConfig>,
) -> Result<Finding, CheckError> {
    let datacenter = ctx.datacenter(&config.workspace.datacenter).await?;
    let datastore = ctx
        .datastore_by_name(&datacenter, &config.workspace.default_datastore)
        .await?;

    let required = [
        (
            config.workspace.datacenter.as_str(),
            datacenter.raw().clone(),
            DATACENTER_PRIVILEGES,
        ),
        (
            config.workspace.default_datastore.as_str(),
            datastore.raw().clone(),
            DATASTORE_PRIVILEGES,
        ),
    ];
    let entities: Vec<_> = required.iter().map(|(_, handle, _)| handle.clone()).collect();
    let granted = ctx.privileges(&entities).await?;

    let mut missing = Vec::new();
    for (object, handle, privileges) in &required {
        let held = granted.iter().find(|entry| &entry.entity == handle);
        for privilege in *privileges {
            if !held.is_some_and(|entry| entry.has(privilege)) {
                missing.push(format!("{object}: {privilege}"));
            }
        }
    }

    if missing.is_empty() {
        Ok(Finding::ok(format!(
            "{} holds all required privileges",
            ctx.username()
        )))
    } else {
        Ok(Finding::error(super::describe(
            &format!("{} is missing privileges", ctx.username()),
            &missing,
        ))
        .with_affected(missing))
    }
}
