//! Check orchestration engine.
//!
//! Runs a registry of independent diagnostic checks against an
//! infrastructure endpoint and a cluster API:
//! - [`CheckRegistry`]: named checks, iterated in name order
//! - [`Executor`]: bounded-parallel execution with per-check timeouts,
//!   panic containment and cancellation
//! - [`ResourceCache`]: run-scoped single-flight cache of inventory lookups
//! - [`CheckContext`]: a check's view of its run
//! - [`aggregate`] / [`summarize`]: deterministic report and overall status

pub mod cache;
pub mod collaborators;
pub mod context;
pub mod error;
pub mod executor;
pub mod finding;
pub mod handle;
pub mod metadata;
pub mod registry;
pub mod report;

pub use cache::ResourceCache;
pub use collaborators::{
    AuthorizationManager, ClusterState, Collaborators, EntityPrivileges, InfrastructureDescriptor,
    InventoryClient,
};
pub use context::{CheckContext, ContextState, LookupKey, RunContext};
pub use error::{CheckError, InventoryError, RegistryError, RunError};
pub use executor::{Executor, ExecutorConfig};
pub use finding::{Finding, FindingKind};
pub use handle::{
    ClusterProperty, ComputeCluster, Datacenter, DatacenterProperty, Datastore, DatastoreProperty,
    HostProperty, HostSystem, ManagedKind, PropertyRequest, ResourceHandle, ResourceKind,
    TypedHandle,
};
pub use metadata::{
    ClusterSummary, ComputeClusterInfo, DatacenterInfo, DatastoreInfo, DatastoreSummary,
    HostInfo, HostSummary, ProductInfo, ResourceMetadata,
};
pub use registry::{Check, CheckFuture, CheckRegistry, RegisteredCheck};
pub use report::{
    aggregate, summarize, CheckFailure, CheckOutcome, CheckRecord, FailureKind, OverallStatus,
    ReportEntry, RunReport,
};
pub use tokio_util::sync::CancellationToken;
