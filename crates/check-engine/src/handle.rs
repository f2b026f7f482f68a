//! Resource handles and typed property sets.
//!
//! A [`ResourceHandle`] identifies one managed object on the infrastructure
//! endpoint (kind plus stable id). Typed handles tie a handle to the property
//! enum of its kind, so a property request can only be built for the kind it
//! belongs to.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::metadata::{
    ComputeClusterInfo, DatacenterInfo, DatastoreInfo, HostInfo, ResourceMetadata,
};

/// Kind of a managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Datacenter,
    Datastore,
    HostSystem,
    ComputeCluster,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Datacenter => write!(f, "datacenter"),
            Self::Datastore => write!(f, "datastore"),
            Self::HostSystem => write!(f, "host"),
            Self::ComputeCluster => write!(f, "compute cluster"),
        }
    }
}

/// Opaque, comparable identifier of a managed object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceHandle {
    kind: ResourceKind,
    id: String,
}

impl ResourceHandle {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Datacenter properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatacenterProperty {
    Name,
}

/// Datastore properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatastoreProperty {
    Name,
    Info,
    Summary,
    HostMounts,
}

/// Host system properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostProperty {
    Name,
    Summary,
    Parent,
    Product,
}

/// Compute cluster properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterProperty {
    Name,
    Summary,
    Hosts,
}

impl DatacenterProperty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
        }
    }
}

impl DatastoreProperty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Info => "info",
            Self::Summary => "summary",
            Self::HostMounts => "host",
        }
    }
}

impl HostProperty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Summary => "summary",
            Self::Parent => "parent",
            Self::Product => "config.product",
        }
    }
}

impl ClusterProperty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Summary => "summary",
            Self::Hosts => "host",
        }
    }
}

/// Properties to fetch for one object, grouped by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyRequest {
    Datacenter(Vec<DatacenterProperty>),
    Datastore(Vec<DatastoreProperty>),
    Host(Vec<HostProperty>),
    ComputeCluster(Vec<ClusterProperty>),
}

impl PropertyRequest {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Datacenter(_) => ResourceKind::Datacenter,
            Self::Datastore(_) => ResourceKind::Datastore,
            Self::Host(_) => ResourceKind::HostSystem,
            Self::ComputeCluster(_) => ResourceKind::ComputeCluster,
        }
    }

    /// Wire names of the requested properties.
    pub fn names(&self) -> Vec<&'static str> {
        match self {
            Self::Datacenter(p) => p.iter().map(|p| p.as_str()).collect(),
            Self::Datastore(p) => p.iter().map(|p| p.as_str()).collect(),
            Self::Host(p) => p.iter().map(|p| p.as_str()).collect(),
            Self::ComputeCluster(p) => p.iter().map(|p| p.as_str()).collect(),
        }
    }
}

/// Links a marker type to its kind, property enum and resolved metadata.
pub trait ManagedKind: Send + Sync + 'static {
    const KIND: ResourceKind;

    /// Properties this kind exposes.
    type Property: Copy + Send + Sync + 'static;

    /// Metadata resolved for this kind.
    type Info: Send + Sync + 'static;

    /// Property set fetched (and cached) by the check context.
    const CACHED: &'static [Self::Property];

    fn request(properties: &[Self::Property]) -> PropertyRequest;

    fn extract(metadata: &ResourceMetadata) -> Option<Arc<Self::Info>>;
}

/// Marker for datacenters.
#[derive(Debug)]
pub enum Datacenter {}

/// Marker for datastores.
#[derive(Debug)]
pub enum Datastore {}

/// Marker for host systems.
#[derive(Debug)]
pub enum HostSystem {}

/// Marker for compute clusters.
#[derive(Debug)]
pub enum ComputeCluster {}

impl ManagedKind for Datacenter {
    const KIND: ResourceKind = ResourceKind::Datacenter;
    type Property = DatacenterProperty;
    type Info = DatacenterInfo;
    const CACHED: &'static [DatacenterProperty] = &[DatacenterProperty::Name];

    fn request(properties: &[DatacenterProperty]) -> PropertyRequest {
        PropertyRequest::Datacenter(properties.to_vec())
    }

    fn extract(metadata: &ResourceMetadata) -> Option<Arc<DatacenterInfo>> {
        match metadata {
            ResourceMetadata::Datacenter(info) => Some(Arc::clone(info)),
            _ => None,
        }
    }
}

impl ManagedKind for Datastore {
    const KIND: ResourceKind = ResourceKind::Datastore;
    type Property = DatastoreProperty;
    type Info = DatastoreInfo;
    const CACHED: &'static [DatastoreProperty] = &[
        DatastoreProperty::Name,
        DatastoreProperty::Info,
        DatastoreProperty::Summary,
        DatastoreProperty::HostMounts,
    ];

    fn request(properties: &[DatastoreProperty]) -> PropertyRequest {
        PropertyRequest::Datastore(properties.to_vec())
    }

    fn extract(metadata: &ResourceMetadata) -> Option<Arc<DatastoreInfo>> {
        match metadata {
            ResourceMetadata::Datastore(info) => Some(Arc::clone(info)),
            _ => None,
        }
    }
}

impl ManagedKind for HostSystem {
    const KIND: ResourceKind = ResourceKind::HostSystem;
    type Property = HostProperty;
    type Info = HostInfo;
    const CACHED: &'static [HostProperty] = &[
        HostProperty::Name,
        HostProperty::Summary,
        HostProperty::Parent,
        HostProperty::Product,
    ];

    fn request(properties: &[HostProperty]) -> PropertyRequest {
        PropertyRequest::Host(properties.to_vec())
    }

    fn extract(metadata: &ResourceMetadata) -> Option<Arc<HostInfo>> {
        match metadata {
            ResourceMetadata::Host(info) => Some(Arc::clone(info)),
            _ => None,
        }
    }
}

impl ManagedKind for ComputeCluster {
    const KIND: ResourceKind = ResourceKind::ComputeCluster;
    type Property = ClusterProperty;
    type Info = ComputeClusterInfo;
    const CACHED: &'static [ClusterProperty] = &[
        ClusterProperty::Name,
        ClusterProperty::Summary,
        ClusterProperty::Hosts,
    ];

    fn request(properties: &[ClusterProperty]) -> PropertyRequest {
        PropertyRequest::ComputeCluster(properties.to_vec())
    }

    fn extract(metadata: &ResourceMetadata) -> Option<Arc<ComputeClusterInfo>> {
        match metadata {
            ResourceMetadata::ComputeCluster(info) => Some(Arc::clone(info)),
            _ => None,
        }
    }
}

/// A handle statically known to refer to an object of kind `K`.
pub struct TypedHandle<K> {
    raw: ResourceHandle,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ManagedKind> TypedHandle<K> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            raw: ResourceHandle::new(K::KIND, id),
            _kind: PhantomData,
        }
    }

    /// Narrow an untyped handle, failing when its kind does not match `K`.
    pub fn from_raw(raw: ResourceHandle) -> Result<Self, InventoryError> {
        if raw.kind() == K::KIND {
            Ok(Self {
                raw,
                _kind: PhantomData,
            })
        } else {
            Err(InventoryError::Other(format!(
                "handle {raw} is not a {}",
                K::KIND
            )))
        }
    }

    /// Build a property request that is guaranteed to match this handle's kind.
    pub fn request(&self, properties: &[K::Property]) -> PropertyRequest {
        K::request(properties)
    }

    pub fn raw(&self) -> &ResourceHandle {
        &self.raw
    }

    pub fn into_raw(self) -> ResourceHandle {
        self.raw
    }

    pub fn id(&self) -> &str {
        self.raw.id()
    }
}

impl<K> Clone for TypedHandle<K> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> PartialEq for TypedHandle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K> Eq for TypedHandle<K> {}

impl<K> fmt::Debug for TypedHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedHandle").field(&self.raw).finish()
    }
}

impl<K> fmt::Display for TypedHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}
