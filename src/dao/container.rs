use k8s_openapi::api::core::v1::{PodSpec, PodStatus};
use kube::core::DynamicObject;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dao::factory::ContainersMetrics;
use crate::dao::log_options::LogOptions;
use crate::dao::tail::LogStream;
use crate::dao::{Accessor, Capabilities, Factory, Listable, Loggable, NonResource, Pod};
use crate::error::{DaoError, DaoResult};
use crate::gvr::{Gvr, PODS, is_resource_path};
use crate::model::{ContainerRes, RowData};
use crate::render::{
    CONTAINER_HEADERS, container_row, decode_at, find_container_status, headers, human_age,
    pod_status,
};

/// Pseudo kind listing the containers of one pod.
#[derive(Default)]
pub struct Container {
    base: NonResource,
    pods: Pod,
}

#[async_trait::async_trait]
impl Accessor for Container {
    fn init(&self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.pods.init(factory.clone(), Gvr::new(PODS));
        self.base.bind(factory, gvr);
    }

    fn gvr(&self) -> Gvr {
        self.base.gvr()
    }

    fn factory(&self) -> DaoResult<Arc<dyn Factory>> {
        self.base.factory()
    }

    async fn get(&self, path: &str) -> DaoResult<DynamicObject> {
        self.base.get(path).await
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities {
            listable: Some(self.clone()),
            loggable: Some(self),
            pod_spec: None,
        }
    }
}

#[async_trait::async_trait]
impl Listable for Container {
    fn headers(&self) -> Vec<String> {
        headers(&CONTAINER_HEADERS)
    }

    /// Lists the containers of the pod at `path`.
    async fn list(&self, path: &str) -> DaoResult<Vec<RowData>> {
        if !is_resource_path(path) {
            return Err(DaoError::invalid(path, "containers are listed for a pod path"));
        }
        let factory = self.base.factory()?;
        let pod = factory.get(&Gvr::new(PODS), path).await?;
        let spec: PodSpec = decode_at(&pod, "/spec")?;
        let metrics = match factory.fetch_container_metrics(path).await {
            Ok(metrics) => metrics,
            Err(error) => {
                debug!(path, error = %error, "container metrics unavailable");
                ContainersMetrics::new()
            }
        };
        let age = human_age(pod.metadata.creation_timestamp.as_ref());

        Ok(container_resources(&spec, &pod_status(&pod), &metrics, &age)
            .iter()
            .map(container_row)
            .collect())
    }
}

#[async_trait::async_trait]
impl Loggable for Container {
    async fn tail_logs(
        &self,
        opts: &LogOptions,
        cancel: &CancellationToken,
    ) -> DaoResult<Vec<LogStream>> {
        self.pods.tail_logs(opts, cancel).await
    }
}

/// Init containers first, then regular containers, each in declared order.
fn container_resources(
    spec: &PodSpec,
    status: &PodStatus,
    metrics: &ContainersMetrics,
    age: &str,
) -> Vec<ContainerRes> {
    let init = spec.init_containers.iter().flatten().map(|c| (c, true));
    let regular = spec.containers.iter().map(|c| (c, false));

    init.chain(regular)
        .map(|(container, is_init)| ContainerRes {
            name: container.name.clone(),
            image: container.image.clone().unwrap_or_default(),
            is_init,
            status: find_container_status(&container.name, status).cloned(),
            metrics: metrics.get(&container.name).copied(),
            age: age.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::Container;
    use crate::dao::factory::{ContainerMetrics, ContainersMetrics};
    use crate::dao::log_options::LogOptions;
    use crate::dao::testing::{MockFactory, MockLogs, pod};
    use crate::dao::{Accessor, Listable, Loggable};
    use crate::error::DaoError;
    use crate::gvr::{CONTAINERS, Gvr, PODS};
    use futures::StreamExt;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn accessor(factory: MockFactory) -> Arc<Container> {
        let accessor = Arc::new(Container::default());
        accessor.init(Arc::new(factory), Gvr::new(CONTAINERS));
        accessor
    }

    fn column(row: &crate::model::RowData, header: &str) -> String {
        let index = super::CONTAINER_HEADERS
            .iter()
            .position(|name| *name == header)
            .expect("header");
        row.columns[index].clone()
    }

    #[tokio::test]
    async fn lists_init_containers_first_with_metrics() {
        let mut metrics = ContainersMetrics::new();
        metrics.insert(
            "main".to_string(),
            ContainerMetrics {
                cpu_millicores: 250,
                memory_bytes: 134_217_728,
            },
        );
        let containers = accessor(
            MockFactory::default()
                .with_object(PODS, pod("ns", "web-0", &["init-a", "init-b"], &["main", "sidecar"]))
                .with_metrics(metrics),
        );

        let rows = containers.list("ns/web-0").await.expect("rows");
        let names = rows.iter().map(|row| row.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["init-a", "init-b", "main", "sidecar"]);
        assert_eq!(column(&rows[0], "Init"), "true");
        assert_eq!(column(&rows[2], "Init"), "false");
        assert_eq!(column(&rows[2], "CPU"), "250m");
        assert_eq!(column(&rows[2], "MEM"), "128.0Mi");
        assert_eq!(column(&rows[3], "CPU"), "n/a");
        assert_eq!(column(&rows[2], "State"), "Running");
        assert!(rows.iter().all(|row| row.namespace.is_none()));
    }

    #[tokio::test]
    async fn metrics_failure_degrades_to_no_metrics() {
        let containers =
            accessor(MockFactory::default().with_object(PODS, pod("ns", "web-0", &[], &["main"])));

        let rows = containers.list("ns/web-0").await.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(column(&rows[0], "CPU"), "n/a");
        assert_eq!(column(&rows[0], "MEM"), "n/a");
    }

    #[tokio::test]
    async fn listing_needs_a_pod_path() {
        let containers = accessor(MockFactory::default());
        let err = containers.list("ns").await.expect_err("bare namespace");
        assert!(matches!(err, DaoError::InvalidResource { .. }));
    }

    #[tokio::test]
    async fn logs_delegate_to_pods() {
        let containers = accessor(
            MockFactory::default()
                .with_object(PODS, pod("ns", "web-0", &[], &["main", "sidecar"]))
                .with_logs("ns/web-0:sidecar", MockLogs::Lines(vec!["hi".to_string()])),
        );
        let opts = LogOptions {
            path: "ns/web-0".to_string(),
            container: "sidecar".to_string(),
            single_container: true,
            since_seconds: -1,
            ..LogOptions::default()
        };

        let mut streams = containers
            .tail_logs(&opts, &CancellationToken::new())
            .await
            .expect("streams");
        assert_eq!(streams.len(), 1);
        let item = streams[0].next().await.expect("line");
        assert_eq!(item.bytes, b"hi".to_vec());
        assert!(item.single_container);
    }
}
