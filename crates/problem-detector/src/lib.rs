//! vSphere problem detector.
//!
//! Wires the built-in check battery to the check engine:
//! - [`config`]: YAML configuration and executor tuning
//! - [`checks`]: the built-in checks and [`checks::default_registry`]
//! - [`inventory`] / [`cluster_state`]: snapshot and Kubernetes backends
//! - [`conditions`] / [`render`]: report output

pub mod checks;
pub mod cluster_state;
pub mod conditions;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod render;

use check_engine::{
    CancellationToken, Collaborators, Executor, OverallStatus, RunContext, RunReport,
};
use tracing::info;

pub use config::{ConfigError, DetectorConfig};
pub use error::{DetectorError, SnapshotError};

/// Exit status of a run that produced a report.
pub fn exit_code(status: OverallStatus) -> u8 {
    match status {
        OverallStatus::Healthy => 0,
        OverallStatus::Degraded => 1,
        OverallStatus::Failing => 2,
    }
}

/// Exit status when no report could be produced.
pub const EXIT_FATAL: u8 = 3;

/// Run every enabled built-in check once against `collaborators`.
pub async fn detect(
    config: &DetectorConfig,
    collaborators: Collaborators,
    cancellation: CancellationToken,
) -> Result<RunReport, DetectorError> {
    let registry = checks::default_registry(config)?;
    let executor = Executor::new(config.executor_config());

    let mut ctx = RunContext::new(collaborators).with_cancellation(cancellation);
    if let Some(timeout) = config.run_timeout() {
        ctx = ctx.with_timeout(timeout);
    }

    info!(
        datacenter = %config.workspace.datacenter,
        datastore = %config.workspace.default_datastore,
        checks = registry.len(),
        "Running vSphere problem detector"
    );
    Ok(executor.run(&registry, ctx).await?)
}
