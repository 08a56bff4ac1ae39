use anyhow::Result;
use futures::stream::BoxStream;
use kube::core::DynamicObject;
use serde_json::Value;
use std::collections::HashMap;

use crate::dao::log_options::LogFetchParams;
use crate::gvr::Gvr;

/// Verbs required to read logs for a namespace.
pub const MONITOR_ACCESS: [&str; 3] = ["get", "list", "watch"];

pub type LineStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerMetrics {
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
}

pub type ContainersMetrics = HashMap<String, ContainerMetrics>;

/// Cluster API access shared by every accessor.
///
/// Implementations must tolerate concurrent calls from accessors of unrelated
/// kinds; nothing here assumes exclusive access.
#[async_trait::async_trait]
pub trait Factory: Send + Sync {
    async fn get(&self, gvr: &Gvr, path: &str) -> Result<DynamicObject>;

    async fn list(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>>;

    /// Live usage per container of the pod at `path`.
    async fn fetch_container_metrics(&self, path: &str) -> Result<ContainersMetrics>;

    async fn can_i(&self, gvr: &Gvr, namespace: &str, verbs: &[&str]) -> Result<bool>;

    /// Opens a line stream for one container of the pod at `path`.
    async fn stream_logs(&self, path: &str, params: &LogFetchParams) -> Result<LineStream>;

    /// Applies a strategic merge patch.
    async fn patch(&self, gvr: &Gvr, path: &str, patch: Value) -> Result<()>;
}
