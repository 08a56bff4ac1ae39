use k8s_openapi::api::core::v1::PodSpec;
use kube::ResourceExt;
use kube::core::DynamicObject;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::dao::factory::MONITOR_ACCESS;
use crate::dao::log_options::LogOptions;
use crate::dao::tail::{LogStream, tail_container};
use crate::dao::{
    Accessor, Capabilities, ContainsPodSpec, Factory, Listable, Loggable, NonResource,
};
use crate::error::{DaoError, DaoResult};
use crate::gvr::{Gvr, PODS, namespaced};
use crate::model::{ImageSpecs, RowData};
use crate::render::{POD_HEADERS, container_names, decode_at, headers, pod_row};

/// Annotation naming the container that logs default to.
pub const DEFAULT_CONTAINER_ANNOTATION: &str = "kubectl.kubernetes.io/default-container";

#[derive(Default)]
pub struct Pod {
    base: NonResource,
}

#[async_trait::async_trait]
impl Accessor for Pod {
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
impl Listable for Pod {
    fn headers(&self) -> Vec<String> {
        headers(&POD_HEADERS)
    }

    async fn list(&self, path: &str) -> DaoResult<Vec<RowData>> {
        let (factory, gvr) = self.base.snapshot()?;
        let pods = factory
            .list(&gvr, Some(path).filter(|ns| !ns.is_empty()), None)
            .await?;
        Ok(pods.iter().map(pod_row).collect())
    }
}

#[async_trait::async_trait]
impl Loggable for Pod {
    async fn tail_logs(
        &self,
        opts: &LogOptions,
        cancel: &CancellationToken,
    ) -> DaoResult<Vec<LogStream>> {
        let factory = self.base.factory()?;
        ensure_log_access(factory.as_ref(), &opts.path).await?;
        let pod = factory.get(&Gvr::new(PODS), &opts.path).await?;
        tail_pod(factory, &pod, opts, cancel)
    }
}

#[async_trait::async_trait]
impl ContainsPodSpec for Pod {
    async fn get_pod_spec(&self, path: &str) -> DaoResult<PodSpec> {
        let pod = self.get(path).await?;
        decode_at(&pod, "/spec")
    }

    async fn set_images(&self, path: &str, specs: &ImageSpecs) -> DaoResult<()> {
        let (factory, gvr) = self.base.snapshot()?;
        let patch = json!({ "spec": image_patch(path, specs)? });
        factory.patch(&gvr, path, patch).await?;
        Ok(())
    }
}

/// Fails unless the caller may monitor pods in the namespace of `path`.
pub(crate) async fn ensure_log_access(factory: &dyn Factory, path: &str) -> DaoResult<()> {
    let (namespace, _) = namespaced(path);
    let allowed = factory
        .can_i(&Gvr::new(PODS), namespace, &MONITOR_ACCESS)
        .await
        .map_err(|error| DaoError::Client(error.context("checking log access")))?;
    if allowed {
        return Ok(());
    }

    Err(DaoError::AccessDenied {
        gvr: PODS.to_string(),
        namespace: namespace.to_string(),
        verbs: MONITOR_ACCESS.join("|"),
    })
}

/// Opens the streams `opts` selects for one pod.
///
/// An explicit container wins, then the default-container annotation. A pod
/// with one declared container is tailed in single-container mode. With
/// `all_containers` set every init, regular and ephemeral container gets its
/// own stream; otherwise the first regular container is used.
pub(crate) fn tail_pod(
    factory: Arc<dyn Factory>,
    pod: &DynamicObject,
    opts: &LogOptions,
    cancel: &CancellationToken,
) -> DaoResult<Vec<LogStream>> {
    let spec: PodSpec = decode_at(pod, "/spec")?;
    let declared = container_names(&spec);
    let tail = |opts: LogOptions| tail_container(factory.clone(), opts, cancel.clone());

    if !opts.all_containers {
        if opts.has_container() {
            if !declared.contains(&opts.container) {
                return Err(DaoError::invalid(
                    &opts.path,
                    format!("no container named {}", opts.container),
                ));
            }
            return Ok(vec![tail(opts.clone())]);
        }

        if let Some(default) = pod.annotations().get(DEFAULT_CONTAINER_ANNOTATION)
            && declared.contains(default)
        {
            let mut opts = opts.for_container(&opts.path, default);
            opts.default_container = default.clone();
            return Ok(vec![tail(opts)]);
        }
    }

    if let [only] = declared.as_slice() {
        let mut opts = opts.for_container(&opts.path, only);
        opts.single_container = true;
        opts.all_containers = false;
        return Ok(vec![tail(opts)]);
    }

    if opts.all_containers {
        return Ok(declared
            .iter()
            .map(|container| tail(opts.for_container(&opts.path, container)))
            .collect());
    }

    let first = spec
        .containers
        .first()
        .map(|container| container.name.clone())
        .ok_or_else(|| DaoError::invalid(&opts.path, "pod declares no containers"))?;
    Ok(vec![tail(opts.for_container(&opts.path, &first))])
}

/// Strategic merge patch body for a pod spec replacing container images.
pub(crate) fn image_patch(path: &str, specs: &ImageSpecs) -> DaoResult<Value> {
    if specs.is_empty() {
        return Err(DaoError::invalid(path, "no image changes to apply"));
    }

    let entries = |init: bool| {
        specs
            .iter()
            .filter(|spec| spec.init == init)
            .map(|spec| json!({ "name": spec.name, "image": spec.docker_image }))
            .collect::<Vec<_>>()
    };

    let mut spec = Map::new();
    let containers = entries(false);
    if !containers.is_empty() {
        spec.insert("containers".to_string(), Value::Array(containers));
    }
    let init_containers = entries(true);
    if !init_containers.is_empty() {
        spec.insert("initContainers".to_string(), Value::Array(init_containers));
    }

    Ok(Value::Object(spec))
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_CONTAINER_ANNOTATION, Pod};
    use crate::dao::log_item::LogItem;
    use crate::dao::log_options::LogOptions;
    use crate::dao::tail::LogStream;
    use crate::dao::testing::{MockFactory, MockLogs, pod};
    use crate::dao::{Accessor, ContainsPodSpec, Listable, Loggable};
    use crate::error::DaoError;
    use crate::gvr::{Gvr, PODS};
    use crate::model::ImageSpec;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn accessor(factory: MockFactory) -> (Arc<Pod>, Arc<MockFactory>) {
        let factory = Arc::new(factory);
        let accessor = Arc::new(Pod::default());
        accessor.init(factory.clone(), Gvr::new(PODS));
        (accessor, factory)
    }

    fn opts(path: &str) -> LogOptions {
        LogOptions {
            path: path.to_string(),
            lines: 100,
            since_seconds: -1,
            ..LogOptions::default()
        }
    }

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    async fn drain(stream: &mut LogStream) -> Vec<LogItem> {
        let mut items = Vec::new();
        while let Some(item) = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("stream should close")
        {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn all_containers_opens_one_independent_stream_per_container() {
        let (pods, _) = accessor(
            MockFactory::default()
                .with_object(PODS, pod("ns", "web-0", &["init-a"], &["main"]))
                .with_logs(
                    "ns/web-0:init-a",
                    MockLogs::FailOpen("init container gone".to_string()),
                )
                .with_logs("ns/web-0:main", MockLogs::Lines(lines(&["ready", "serving"]))),
        );
        let mut options = opts("ns/web-0");
        options.all_containers = true;

        let mut streams = pods
            .tail_logs(&options, &CancellationToken::new())
            .await
            .expect("streams");
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].source(), "ns/web-0 (init-a)");
        assert_eq!(streams[1].source(), "ns/web-0 (main)");

        let init = drain(&mut streams[0]).await;
        assert_eq!(init.len(), 1);
        assert!(init[0].is_error);

        let main = drain(&mut streams[1]).await;
        assert_eq!(main.len(), 2);
        assert!(main.iter().all(|item| !item.is_error && item.container == "main"));
    }

    #[tokio::test]
    async fn single_container_pod_switches_to_single_mode() {
        let (pods, factory) = accessor(
            MockFactory::default()
                .with_object(PODS, pod("ns", "api-0", &[], &["api"]))
                .with_logs("ns/api-0:api", MockLogs::Lines(lines(&["up"]))),
        );
        let mut options = opts("ns/api-0");
        options.all_containers = true;

        let mut streams = pods
            .tail_logs(&options, &CancellationToken::new())
            .await
            .expect("streams");
        assert_eq!(streams.len(), 1);
        let items = drain(&mut streams[0]).await;
        assert!(items[0].single_container);
        assert_eq!(factory.requested_sources(), vec!["ns/api-0:api"]);
    }

    #[tokio::test]
    async fn explicit_container_and_annotation_select_one_stream() {
        let mut annotated = pod("ns", "web-1", &["init-a"], &["main", "sidecar"]);
        annotated
            .metadata
            .annotations
            .get_or_insert_default()
            .insert(DEFAULT_CONTAINER_ANNOTATION.to_string(), "sidecar".to_string());
        let (pods, factory) = accessor(MockFactory::default().with_object(PODS, annotated));

        let streams = pods
            .tail_logs(&opts("ns/web-1"), &CancellationToken::new())
            .await
            .expect("streams");
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].source(), "ns/web-1 (sidecar)");

        let mut explicit = opts("ns/web-1");
        explicit.container = "main".to_string();
        let streams = pods
            .tail_logs(&explicit, &CancellationToken::new())
            .await
            .expect("streams");
        assert_eq!(streams[0].source(), "ns/web-1 (main)");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut requested = factory.requested_sources();
        requested.sort();
        assert_eq!(requested, vec!["ns/web-1:main", "ns/web-1:sidecar"]);
    }

    #[tokio::test]
    async fn unknown_container_is_rejected() {
        let (pods, _) =
            accessor(MockFactory::default().with_object(PODS, pod("ns", "web-0", &[], &["main"])));
        let mut options = opts("ns/web-0");
        options.container = "ghost".to_string();

        let err = pods
            .tail_logs(&options, &CancellationToken::new())
            .await
            .err()
            .expect("unknown container");
        assert!(matches!(err, DaoError::InvalidResource { .. }));
    }

    #[tokio::test]
    async fn denied_access_opens_no_stream() {
        let (pods, factory) = accessor(
            MockFactory::default()
                .with_object(PODS, pod("ns", "web-0", &[], &["main"]))
                .denied(),
        );

        let err = pods
            .tail_logs(&opts("ns/web-0"), &CancellationToken::new())
            .await
            .err()
            .expect("access denied");
        match err {
            DaoError::AccessDenied { namespace, .. } => assert_eq!(namespace, "ns"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(factory.requested_sources().is_empty());
    }

    #[tokio::test]
    async fn lists_pods_in_namespace() {
        let (pods, _) = accessor(
            MockFactory::default()
                .with_object(PODS, pod("ns", "web-0", &[], &["main"]))
                .with_object(PODS, pod("other", "db-0", &[], &["db"])),
        );

        let rows = pods.list("ns").await.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path(), "ns/web-0");
        assert_eq!(rows[0].columns.len(), pods.headers().len());
        assert_eq!(pods.list("").await.expect("rows").len(), 2);
    }

    #[tokio::test]
    async fn set_images_patches_regular_and_init_containers() {
        let (pods, factory) =
            accessor(MockFactory::default().with_object(PODS, pod("ns", "web-0", &["init-a"], &["main"])));
        let spec = pods.get_pod_spec("ns/web-0").await.expect("spec");
        assert_eq!(spec.containers[0].name, "main");

        let specs = vec![
            ImageSpec {
                name: "main".to_string(),
                docker_image: "main:2.0".to_string(),
                init: false,
            },
            ImageSpec {
                name: "init-a".to_string(),
                docker_image: "init:2.0".to_string(),
                init: true,
            },
        ];
        pods.set_images("ns/web-0", &specs).await.expect("patched");

        let patches = factory.patches.lock().expect("patches").clone();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].1, "ns/web-0");
        assert_eq!(
            patches[0].2,
            json!({ "spec": {
                "containers": [{ "name": "main", "image": "main:2.0" }],
                "initContainers": [{ "name": "init-a", "image": "init:2.0" }]
            }})
        );

        let err = pods.set_images("ns/web-0", &Vec::new()).await.err().expect("empty");
        assert!(matches!(err, DaoError::InvalidResource { .. }));
    }
}
