//! Error taxonomy shared by collaborators, the cache, checks and the executor.

use std::time::Duration;

use thiserror::Error;

use crate::finding::FindingKind;
use crate::handle::ResourceKind;

/// Errors raised by remote collaborators and by the run-scoped context.
///
/// `Clone` is required because one in-flight cache resolution hands the same
/// failure to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Named object does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    /// The principal lacks a privilege needed for the call.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A remote call or the calling check ran out of time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The infrastructure endpoint could not be contacted.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// A cluster-state collaborator could not serve the read.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The run was cancelled while the call was in flight.
    #[error("cancelled")]
    Cancelled,

    /// The check context was used after its run finished.
    #[error("check context is closed")]
    ContextClosed,

    /// Any other collaborator failure.
    #[error("{0}")]
    Other(String),
}

impl InventoryError {
    /// Shorthand for a [`InventoryError::NotFound`].
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// How a check should grade this failure: a missing object degrades,
    /// anything else fails.
    pub fn severity(&self) -> FindingKind {
        if self.is_not_found() {
            FindingKind::Warning
        } else {
            FindingKind::Error
        }
    }
}

/// Error returned by a check body.
#[derive(Error, Debug, Clone)]
pub enum CheckError {
    /// A collaborator call failed and the check chose to propagate it.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// The check could not reach a verdict for its own reasons.
    #[error("{0}")]
    Failed(String),
}

impl CheckError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn severity(&self) -> FindingKind {
        match self {
            Self::Inventory(err) => err.severity(),
            Self::Failed(_) => FindingKind::Error,
        }
    }
}

/// Errors raised while building a [`crate::CheckRegistry`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("check {0} is already registered")]
    Duplicate(String),

    #[error("check {0} is not registered")]
    Unknown(String),

    #[error("check name must not be empty")]
    EmptyName,

    #[error("timeout for check {0} must be greater than zero")]
    ZeroTimeout(String),
}

/// Errors that abort a whole run before any check executes.
#[derive(Error, Debug)]
pub enum RunError {
    /// The pre-run connectivity probe failed; no check can plausibly succeed.
    #[error("infrastructure endpoint is not reachable: {0}")]
    Unreachable(#[source] InventoryError),

    /// The connectivity probe did not answer within the connect timeout.
    #[error("connectivity probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    /// The executor was configured with values it cannot run with.
    #[error("invalid executor configuration: {0}")]
    InvalidConfig(String),
}
