mod container;
pub mod factory;
mod generic;
pub mod log_item;
pub mod log_options;
mod non_resource;
mod pod;
mod registry;
pub mod tail;
#[cfg(test)]
pub mod testing;
mod workload;

use k8s_openapi::api::core::v1::PodSpec;
use kube::core::DynamicObject;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{DaoError, DaoResult};
use crate::gvr::Gvr;
use crate::model::{ImageSpecs, RowData};

pub use container::Container;
pub use factory::Factory;
pub use generic::Generic;
pub use non_resource::NonResource;
pub use pod::Pod;
pub(crate) use pod::ensure_log_access;
pub use registry::{AccessorRegistry, capability_check};
pub use workload::Workload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Listable,
    Loggable,
    ContainsPodSpec,
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Listable => write!(f, "listing"),
            Self::Loggable => write!(f, "logs"),
            Self::ContainsPodSpec => write!(f, "pod specs"),
        }
    }
}

/// Data access handle for one resource kind.
#[async_trait::async_trait]
pub trait Accessor: Send + Sync {
    /// Binds the accessor to a factory and identifier. A rebind replaces both
    /// atomically.
    fn init(&self, factory: Arc<dyn Factory>, gvr: Gvr);

    fn gvr(&self) -> Gvr;

    fn factory(&self) -> DaoResult<Arc<dyn Factory>>;

    async fn get(&self, path: &str) -> DaoResult<DynamicObject>;

    /// Capability handles this concrete accessor exposes.
    fn capabilities(self: Arc<Self>) -> Capabilities;
}

#[async_trait::async_trait]
pub trait Listable: Send + Sync {
    fn headers(&self) -> Vec<String>;

    /// Lists instances under a context path: a namespace for real kinds, the
    /// owning object's path for pseudo kinds.
    async fn list(&self, path: &str) -> DaoResult<Vec<RowData>>;
}

#[async_trait::async_trait]
pub trait Loggable: Send + Sync {
    /// Opens one stream per log source. Streams stop when `cancel` fires.
    async fn tail_logs(
        &self,
        opts: &crate::dao::log_options::LogOptions,
        cancel: &CancellationToken,
    ) -> DaoResult<Vec<tail::LogStream>>;
}

#[async_trait::async_trait]
pub trait ContainsPodSpec: Send + Sync {
    async fn get_pod_spec(&self, path: &str) -> DaoResult<PodSpec>;

    async fn set_images(&self, path: &str, specs: &ImageSpecs) -> DaoResult<()>;
}

#[derive(Clone, Default)]
pub struct Capabilities {
    pub listable: Option<Arc<dyn Listable>>,
    pub loggable: Option<Arc<dyn Loggable>>,
    pub pod_spec: Option<Arc<dyn ContainsPodSpec>>,
}

impl Capabilities {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Listable => self.listable.is_some(),
            Capability::Loggable => self.loggable.is_some(),
            Capability::ContainsPodSpec => self.pod_spec.is_some(),
        }
    }
}

/// An accessor together with the capability handles it exposes.
#[derive(Clone)]
pub struct Resolved {
    pub accessor: Arc<dyn Accessor>,
    pub caps: Capabilities,
}

impl Resolved {
    pub fn new(accessor: Arc<dyn Accessor>) -> Self {
        let caps = accessor.clone().capabilities();
        Self { accessor, caps }
    }

    pub fn listable(&self) -> DaoResult<Arc<dyn Listable>> {
        self.caps
            .listable
            .clone()
            .ok_or_else(|| DaoError::unsupported(self.accessor.gvr(), Capability::Listable))
    }

    pub fn loggable(&self) -> DaoResult<Arc<dyn Loggable>> {
        self.caps
            .loggable
            .clone()
            .ok_or_else(|| DaoError::unsupported(self.accessor.gvr(), Capability::Loggable))
    }

    pub fn pod_spec(&self) -> DaoResult<Arc<dyn ContainsPodSpec>> {
        self.caps
            .pod_spec
            .clone()
            .ok_or_else(|| DaoError::unsupported(self.accessor.gvr(), Capability::ContainsPodSpec))
    }
}
