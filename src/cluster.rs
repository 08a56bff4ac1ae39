use anyhow::{Context, Result, bail};
use futures::{AsyncBufReadExt, StreamExt, stream};
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::config::Kubeconfig;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client, Config, ResourceExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::dao::factory::{ContainerMetrics, ContainersMetrics, Factory, LineStream};
use crate::dao::log_options::LogFetchParams;
use crate::gvr::{Gvr, namespaced};
use crate::render::{parse_cpu_millicores, parse_memory_bytes};

const LINE_BUFFER: usize = 512;

/// Factory backed by the cluster selected in the local kubeconfig.
#[derive(Clone)]
pub struct KubeFactory {
    client: Client,
    context: String,
    cluster: String,
    default_namespace: String,
}

impl KubeFactory {
    pub async fn new() -> Result<Self> {
        let config = Config::infer()
            .await
            .context("failed to infer Kubernetes configuration")?;
        let context = Kubeconfig::read()
            .ok()
            .and_then(|kubeconfig| kubeconfig.current_context)
            .unwrap_or_else(|| "in-cluster".to_string());
        let cluster = config.cluster_url.to_string();
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;
        info!(context = %context, cluster = %cluster, "connected to cluster");

        Ok(Self {
            client,
            context,
            cluster,
            default_namespace,
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    fn api(&self, gvr: &Gvr, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        let (resource, namespaced) = api_resource(gvr)?;
        Ok(match namespace.filter(|ns| namespaced && !ns.is_empty()) {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        })
    }

    async fn access_review(&self, gvr: &Gvr, namespace: &str, verb: &str) -> Result<bool> {
        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let attributes = ResourceAttributes {
            group: Some(gvr.group().to_string()).filter(|group| !group.is_empty()),
            resource: Some(gvr.resource().to_string()),
            verb: Some(verb.to_string()),
            namespace: Some(namespace.to_string()).filter(|ns| !ns.is_empty()),
            ..Default::default()
        };
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(attributes),
                ..Default::default()
            },
            ..Default::default()
        };
        let created = api
            .create(&PostParams::default(), &review)
            .await
            .with_context(|| format!("failed to review access to {verb} {gvr}"))?;
        Ok(created.status.map(|status| status.allowed).unwrap_or(false))
    }
}

#[async_trait::async_trait]
impl Factory for KubeFactory {
    async fn get(&self, gvr: &Gvr, path: &str) -> Result<DynamicObject> {
        let (namespace, name) = namespaced(path);
        self.api(gvr, Some(namespace))?
            .get(name)
            .await
            .with_context(|| format!("failed to get {gvr} {path}"))
    }

    async fn list(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let mut params = list_params();
        if let Some(selector) = selector {
            params = params.labels(selector);
        }
        let mut items = self
            .api(gvr, namespace)?
            .list(&params)
            .await
            .with_context(|| format!("failed to list {gvr}"))?
            .items;

        items.sort_by(|left, right| {
            left.namespace()
                .cmp(&right.namespace())
                .then_with(|| left.name_any().cmp(&right.name_any()))
        });
        Ok(items)
    }

    async fn fetch_container_metrics(&self, path: &str) -> Result<ContainersMetrics> {
        let (namespace, name) = namespaced(path);
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "pods");
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &resource);
        let metrics = api
            .get(name)
            .await
            .with_context(|| format!("failed to fetch metrics for {path}"))?;

        Ok(parse_container_metrics(&metrics.data))
    }

    async fn can_i(&self, gvr: &Gvr, namespace: &str, verbs: &[&str]) -> Result<bool> {
        for verb in verbs {
            if !self.access_review(gvr, namespace, verb).await? {
                debug!(gvr = %gvr, namespace, verb, "access review denied");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn stream_logs(&self, path: &str, params: &LogFetchParams) -> Result<LineStream> {
        let (namespace, name) = namespaced(path);
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let log_params = LogParams {
            container: params.container.clone(),
            follow: params.follow,
            limit_bytes: params.limit_bytes,
            previous: params.previous,
            since_seconds: params.since_seconds,
            since_time: params.since_time,
            tail_lines: params.tail_lines,
            timestamps: params.timestamps,
            ..LogParams::default()
        };

        let (opened_tx, opened_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let name = name.to_string();
        tokio::spawn(async move {
            let reader = match api.log_stream(&name, &log_params).await {
                Ok(reader) => {
                    let _ = opened_tx.send(Ok(()));
                    reader
                }
                Err(error) => {
                    let _ = opened_tx.send(Err(error));
                    return;
                }
            };

            let mut lines = std::pin::pin!(reader.lines());
            loop {
                let line = tokio::select! {
                    _ = tx.closed() => break,
                    line = lines.next() => line,
                };
                let Some(line) = line else {
                    break;
                };
                let failed = line.is_err();
                if tx.send(line.map_err(anyhow::Error::from)).await.is_err() || failed {
                    break;
                }
            }
        });

        opened_rx
            .await
            .context("log stream task ended before opening")?
            .with_context(|| format!("failed to open logs for {path}"))?;

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|line| (line, rx))
        })
        .boxed())
    }

    async fn patch(&self, gvr: &Gvr, path: &str, patch: Value) -> Result<()> {
        let (namespace, name) = namespaced(path);
        self.api(gvr, Some(namespace))?
            .patch(name, &PatchParams::default(), &Patch::Strategic(&patch))
            .await
            .with_context(|| format!("failed to patch {gvr} {path}"))?;
        Ok(())
    }
}

/// API resource for a built-in identifier and whether it is namespaced.
fn api_resource(gvr: &Gvr) -> Result<(ApiResource, bool)> {
    let (kind, namespaced) = match gvr.resource() {
        "pods" => ("Pod", true),
        "services" => ("Service", true),
        "configmaps" => ("ConfigMap", true),
        "secrets" => ("Secret", true),
        "serviceaccounts" => ("ServiceAccount", true),
        "namespaces" => ("Namespace", false),
        "nodes" => ("Node", false),
        "deployments" => ("Deployment", true),
        "statefulsets" => ("StatefulSet", true),
        "daemonsets" => ("DaemonSet", true),
        "replicasets" => ("ReplicaSet", true),
        "jobs" => ("Job", true),
        _ => bail!("{gvr} is not served by the cluster API"),
    };
    if gvr.is_pseudo() {
        bail!("{gvr} is not served by the cluster API");
    }

    let gvk = GroupVersionKind::gvk(gvr.group(), gvr.version(), kind);
    Ok((ApiResource::from_gvk_with_plural(&gvk, gvr.resource()), namespaced))
}

fn list_params() -> ListParams {
    ListParams::default().limit(500)
}

fn parse_container_metrics(data: &Value) -> ContainersMetrics {
    let Some(containers) = data.get("containers").and_then(Value::as_array) else {
        return ContainersMetrics::new();
    };

    containers
        .iter()
        .filter_map(|container| {
            let name = container.get("name").and_then(Value::as_str)?;
            let usage = container.get("usage");
            let quantity = |key: &str| {
                usage
                    .and_then(|usage| usage.get(key))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            Some((
                name.to_string(),
                ContainerMetrics {
                    cpu_millicores: quantity("cpu")
                        .as_deref()
                        .and_then(parse_cpu_millicores)
                        .unwrap_or(0),
                    memory_bytes: quantity("memory")
                        .as_deref()
                        .and_then(parse_memory_bytes)
                        .unwrap_or(0),
                },
            ))
        })
        .collect()
}
