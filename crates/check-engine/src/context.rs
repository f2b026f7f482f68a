//! Run-scoped execution context handed to checks.
//!
//! One [`RunScope`] exists per run. It owns the resource caches and the
//! run-level cancellation token, and moves through
//! `Created -> Active -> Closed`. Every check receives its own
//! [`CheckContext`] view of the scope carrying the check's deadline and a
//! child cancellation token. Any use of a context after its run closed fails
//! with [`InventoryError::ContextClosed`].

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Node, PersistentVolume};
use k8s_openapi::api::storage::v1::StorageClass;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::ResourceCache;
use crate::collaborators::{Collaborators, EntityPrivileges, InfrastructureDescriptor};
use crate::error::InventoryError;
use crate::handle::{
    ComputeCluster, Datacenter, Datastore, HostSystem, ManagedKind, ResourceHandle, ResourceKind,
    TypedHandle,
};
use crate::metadata::{ComputeClusterInfo, DatastoreInfo, HostInfo, ResourceMetadata};

/// Lifecycle state of a run's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Caches empty, deadline set, no check started yet.
    Created,
    /// Checks may use the caches and make remote calls.
    Active,
    /// Run finished or its deadline passed; caches discarded.
    Closed,
}

impl ContextState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Active,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Active => 1,
            Self::Closed => 2,
        }
    }
}

/// Key of a cached name lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub kind: ResourceKind,
    pub name: String,
    pub scope: Option<ResourceHandle>,
}

/// Base context supplied by the caller for one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    collaborators: Collaborators,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Tie the run to a caller-owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// State shared by every check of one run.
pub(crate) struct RunScope {
    state: AtomicU8,
    collaborators: Collaborators,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
    objects: ResourceCache<ResourceHandle, ResourceMetadata>,
    lookups: ResourceCache<LookupKey, ResourceHandle>,
    /// Serialises remote client access when the client is not safe for
    /// concurrent use. Independent of the cache locks.
    client_gate: Option<Arc<Mutex<()>>>,
}

impl RunScope {
    /// `cancellation` must be owned by the run: closing the scope does not
    /// cancel it, the executor does.
    pub(crate) fn new(
        collaborators: Collaborators,
        cancellation: CancellationToken,
        deadline: Option<Instant>,
        serialize_client: bool,
    ) -> Self {
        Self {
            state: AtomicU8::new(ContextState::Created.as_u8()),
            collaborators,
            objects: ResourceCache::new(cancellation.clone()),
            lookups: ResourceCache::new(cancellation.clone()),
            cancellation,
            deadline,
            client_gate: serialize_client.then(|| Arc::new(Mutex::new(()))),
        }
    }

    pub(crate) fn activate(&self) {
        let _ = self.state.compare_exchange(
            ContextState::Created.as_u8(),
            ContextState::Active.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn close(&self) {
        self.state
            .store(ContextState::Closed.as_u8(), Ordering::Release);
        self.objects.close();
        self.lookups.close();
    }

    /// An active scope whose run deadline has passed reads as closed.
    pub(crate) fn state(&self) -> ContextState {
        match ContextState::from_u8(self.state.load(Ordering::Acquire)) {
            ContextState::Active if self.deadline_exceeded() => ContextState::Closed,
            state => state,
        }
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn deadline_exceeded(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// A check's view of its run.
#[derive(Clone)]
pub struct CheckContext {
    name: Arc<str>,
    scope: Arc<RunScope>,
    cancellation: CancellationToken,
    deadline: Instant,
}

impl fmt::Debug for CheckContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckContext")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl CheckContext {
    pub(crate) fn new(
        name: Arc<str>,
        scope: Arc<RunScope>,
        cancellation: CancellationToken,
        deadline: Instant,
    ) -> Self {
        Self {
            name,
            scope,
            cancellation,
            deadline,
        }
    }

    /// Name of the check this context belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Token cancelled when this check must stop (its own timeout, run
    /// cancellation or run deadline).
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn state(&self) -> ContextState {
        self.scope.state()
    }

    /// Principal whose privileges are audited.
    pub fn username(&self) -> &str {
        &self.scope.collaborators.username
    }

    /// Resolved metadata for `handle` if some check already fetched it.
    pub fn cached(&self, handle: &ResourceHandle) -> Result<Option<ResourceMetadata>, InventoryError> {
        self.ensure_active()?;
        self.scope.objects.get(handle)
    }

    /// Resolve a named object of kind `K`, caching the handle for the run.
    pub async fn find<K: ManagedKind>(
        &self,
        name: &str,
        scope: Option<&ResourceHandle>,
    ) -> Result<TypedHandle<K>, InventoryError> {
        let key = LookupKey {
            kind: K::KIND,
            name: name.to_string(),
            scope: scope.cloned(),
        };
        let what = format!("find {} {name}", K::KIND);
        let inventory = Arc::clone(&self.scope.collaborators.inventory);
        let gate = self.scope.client_gate.clone();
        let run_deadline = self.scope.deadline;
        let lookup = key.clone();
        let call = what.clone();

        let raw = self
            .guarded(
                &what,
                self.scope.lookups.get_or_resolve(&key, move || async move {
                    bounded(run_deadline, &call, async {
                        let _gate = lock_gate(gate.as_deref()).await;
                        inventory
                            .find(lookup.kind, &lookup.name, lookup.scope.as_ref())
                            .await
                    })
                    .await
                }),
            )
            .await?;
        TypedHandle::from_raw(raw)
    }

    /// Fetch the cached property set of `handle`, resolving it once per run.
    pub async fn properties<K: ManagedKind>(
        &self,
        handle: &TypedHandle<K>,
    ) -> Result<Arc<K::Info>, InventoryError> {
        let what = format!("retrieve {handle}");
        let inventory = Arc::clone(&self.scope.collaborators.inventory);
        let gate = self.scope.client_gate.clone();
        let run_deadline = self.scope.deadline;
        let raw = handle.raw().clone();
        let request = handle.request(K::CACHED);
        let call = what.clone();

        let metadata = self
            .guarded(
                &what,
                self.scope.objects.get_or_resolve(handle.raw(), move || async move {
                    bounded(run_deadline, &call, async {
                        let _gate = lock_gate(gate.as_deref()).await;
                        inventory.retrieve(&raw, &request).await
                    })
                    .await
                }),
            )
            .await?;
        K::extract(&metadata).ok_or_else(|| {
            InventoryError::Other(format!(
                "{handle} resolved to {} metadata",
                metadata.kind()
            ))
        })
    }

    pub async fn datacenter(&self, name: &str) -> Result<TypedHandle<Datacenter>, InventoryError> {
        self.find::<Datacenter>(name, None).await
    }

    pub async fn datastore_by_name(
        &self,
        datacenter: &TypedHandle<Datacenter>,
        name: &str,
    ) -> Result<TypedHandle<Datastore>, InventoryError> {
        self.find::<Datastore>(name, Some(datacenter.raw())).await
    }

    pub async fn datastore(
        &self,
        handle: &TypedHandle<Datastore>,
    ) -> Result<Arc<DatastoreInfo>, InventoryError> {
        self.properties(handle).await
    }

    pub async fn host(&self, handle: &TypedHandle<HostSystem>) -> Result<Arc<HostInfo>, InventoryError> {
        self.properties(handle).await
    }

    pub async fn compute_cluster(
        &self,
        handle: &TypedHandle<ComputeCluster>,
    ) -> Result<Arc<ComputeClusterInfo>, InventoryError> {
        self.properties(handle).await
    }

    /// Resolve the compute cluster a host belongs to. Standalone hosts yield
    /// [`InventoryError::NotFound`].
    pub async fn compute_cluster_of(
        &self,
        host: &TypedHandle<HostSystem>,
    ) -> Result<(TypedHandle<ComputeCluster>, Arc<ComputeClusterInfo>), InventoryError> {
        let info = self.host(host).await?;
        match &info.parent {
            Some(parent) if parent.kind() == ResourceKind::ComputeCluster => {
                let cluster = TypedHandle::<ComputeCluster>::from_raw(parent.clone())?;
                let cluster_info = self.compute_cluster(&cluster).await?;
                Ok((cluster, cluster_info))
            }
            _ => Err(InventoryError::not_found(
                ResourceKind::ComputeCluster,
                format!("parent of host {}", info.name),
            )),
        }
    }

    /// Privileges of the audited principal on `entities`.
    pub async fn privileges(
        &self,
        entities: &[ResourceHandle],
    ) -> Result<Vec<EntityPrivileges>, InventoryError> {
        let _gate = self.enter_gate().await?;
        let collaborators = &self.scope.collaborators;
        self.guarded(
            "privilege query",
            collaborators
                .authorization
                .fetch_user_privileges(entities, &collaborators.username),
        )
        .await
    }

    pub async fn nodes(&self) -> Result<Vec<Node>, InventoryError> {
        self.guarded("list nodes", self.scope.collaborators.cluster.list_nodes())
            .await
    }

    pub async fn storage_classes(&self) -> Result<Vec<StorageClass>, InventoryError> {
        self.guarded(
            "list storage classes",
            self.scope.collaborators.cluster.list_storage_classes(),
        )
        .await
    }

    pub async fn persistent_volumes(&self) -> Result<Vec<PersistentVolume>, InventoryError> {
        self.guarded(
            "list persistent volumes",
            self.scope.collaborators.cluster.list_persistent_volumes(),
        )
        .await
    }

    pub async fn infrastructure(&self) -> Result<InfrastructureDescriptor, InventoryError> {
        self.guarded(
            "get infrastructure",
            self.scope.collaborators.cluster.infrastructure(),
        )
        .await
    }

    fn ensure_active(&self) -> Result<(), InventoryError> {
        match self.scope.state() {
            ContextState::Active => Ok(()),
            ContextState::Created | ContextState::Closed => Err(InventoryError::ContextClosed),
        }
    }

    /// Run `call` bounded by this check's deadline and cancellation.
    async fn guarded<T, Fut>(&self, what: &str, call: Fut) -> Result<T, InventoryError>
    where
        Fut: Future<Output = Result<T, InventoryError>>,
    {
        self.ensure_active()?;
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(self.interruption()),
            result = tokio::time::timeout_at(self.deadline, call) => match result {
                Ok(result) => result,
                Err(_) => Err(InventoryError::Timeout(format!(
                    "{what} exceeded the deadline of check {}",
                    self.name
                ))),
            },
        }
    }

    async fn enter_gate(&self) -> Result<Option<OwnedMutexGuard<()>>, InventoryError> {
        match &self.scope.client_gate {
            Some(gate) => {
                let gate = Arc::clone(gate);
                let guard = self
                    .guarded("wait for client", async move { Ok(gate.lock_owned().await) })
                    .await?;
                Ok(Some(guard))
            }
            None => Ok(None),
        }
    }

    /// Why this check's token fired.
    fn interruption(&self) -> InventoryError {
        if self.scope.cancellation.is_cancelled() && !self.scope.deadline_exceeded() {
            InventoryError::Cancelled
        } else {
            InventoryError::Timeout(format!("check {} was stopped at its deadline", self.name))
        }
    }
}

async fn lock_gate(gate: Option<&Mutex<()>>) -> Option<MutexGuard<'_, ()>> {
    match gate {
        Some(gate) => Some(gate.lock().await),
        None => None,
    }
}

/// Bound a shared resolution by the run deadline only. Each waiter bounds its
/// own wait by its check deadline in [`CheckContext::guarded`], so one check's
/// timeout never fails another check joining the same resolution.
async fn bounded<T, Fut>(
    run_deadline: Option<Instant>,
    what: &str,
    call: Fut,
) -> Result<T, InventoryError>
where
    Fut: Future<Output = Result<T, InventoryError>>,
{
    let Some(deadline) = run_deadline else {
        return call.await;
    };
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(InventoryError::Timeout(format!(
            "{what} exceeded the run deadline"
        ))),
    }
}
