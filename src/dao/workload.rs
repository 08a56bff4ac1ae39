use k8s_openapi::api::core::v1::PodSpec;
use kube::core::DynamicObject;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dao::log_options::LogOptions;
use crate::dao::pod::{ensure_log_access, image_patch, tail_pod};
use crate::dao::tail::{LogStream, failed_stream};
use crate::dao::{
    Accessor, Capabilities, ContainsPodSpec, Factory, Listable, Loggable, NonResource,
};
use crate::error::{DaoError, DaoResult};
use crate::gvr::{Gvr, PODS, namespaced};
use crate::model::{ImageSpecs, RowData};
use crate::render::{WORKLOAD_HEADERS, decode_at, headers, object_path, selector_query, workload_row};

const TEMPLATE_SPEC: &str = "/spec/template/spec";
const MATCH_LABELS: &str = "/spec/selector/matchLabels";

/// Controllers owning pods through a label selector and a pod template.
#[derive(Default)]
pub struct Workload {
    base: NonResource,
}

#[async_trait::async_trait]
impl Accessor for Workload {
    fn init(&self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.bind(factory, gvr);
    }

    fn gvr(&self) -> Gvr {
        self.base.gvr()
    }

    fn factory(&self) -> DaoResult<Arc<dyn Factory>> {
        self.base.factory()
    }

    async fn get(&self, path: &str) -> DaoResult<DynamicObject> {
        let (factory, gvr) = self.base.snapshot()?;
        Ok(factory.get(&gvr, path).await?)
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities {
            listable: Some(self.clone()),
            loggable: Some(self.clone()),
            pod_spec: Some(self),
        }
    }
}

#[async_trait::async_trait]
impl Listable for Workload {
    fn headers(&self) -> Vec<String> {
        headers(&WORKLOAD_HEADERS)
    }

    async fn list(&self, path: &str) -> DaoResult<Vec<RowData>> {
        let (factory, gvr) = self.base.snapshot()?;
        let items = factory
            .list(&gvr, Some(path).filter(|ns| !ns.is_empty()), None)
            .await?;
        Ok(items.iter().map(workload_row).collect())
    }
}

#[async_trait::async_trait]
impl Loggable for Workload {
    /// Tails every pod matched by the workload selector. A pod that cannot be
    /// tailed contributes a single error entry; its siblings keep streaming.
    async fn tail_logs(
        &self,
        opts: &LogOptions,
        cancel: &CancellationToken,
    ) -> DaoResult<Vec<LogStream>> {
        let (factory, gvr) = self.base.snapshot()?;
        ensure_log_access(factory.as_ref(), &opts.path).await?;

        let workload = factory.get(&gvr, &opts.path).await?;
        let labels: BTreeMap<String, String> = decode_at(&workload, MATCH_LABELS)?;
        if labels.is_empty() {
            return Err(DaoError::invalid(&opts.path, "selector has no match labels"));
        }

        let (namespace, _) = namespaced(&opts.path);
        let selector = selector_query(&labels);
        let pods = factory
            .list(&Gvr::new(PODS), Some(namespace), Some(selector.as_str()))
            .await?;
        if pods.is_empty() {
            return Err(DaoError::invalid(
                &opts.path,
                format!("no pods match {selector}"),
            ));
        }
        debug!(path = %opts.path, pods = pods.len(), "tailing workload pods");

        let mut streams = Vec::new();
        for pod in &pods {
            let mut pod_opts = opts.clone();
            pod_opts.path = object_path(pod);
            pod_opts.multi_pods = true;
            match tail_pod(factory.clone(), pod, &pod_opts, cancel) {
                Ok(pod_streams) => streams.extend(pod_streams),
                Err(error) => {
                    warn!(path = %pod_opts.path, error = %error, "skipping workload pod");
                    streams.push(failed_stream(&pod_opts, &error));
                }
            }
        }
        Ok(streams)
    }
}

#[async_trait::async_trait]
impl ContainsPodSpec for Workload {
    async fn get_pod_spec(&self, path: &str) -> DaoResult<PodSpec> {
        let workload = self.get(path).await?;
        decode_at(&workload, TEMPLATE_SPEC)
    }

    async fn set_images(&self, path: &str, specs: &ImageSpecs) -> DaoResult<()> {
        let (factory, gvr) = self.base.snapshot()?;
        let patch = json!({ "spec": { "template": { "spec": image_patch(path, specs)? } } });
        factory.patch(&gvr, path, patch).await?;
        Ok(())
    }
}
