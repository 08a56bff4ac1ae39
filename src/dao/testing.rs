use anyhow::{Result, anyhow};
use futures::StreamExt;
use futures::stream;
use kube::ResourceExt;
use kube::core::DynamicObject;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::dao::factory::{ContainersMetrics, Factory, LineStream};
use crate::dao::log_options::LogFetchParams;
use crate::gvr::{Gvr, fqn};

/// Canned behaviour for one `path:container` log source.
#[derive(Debug, Clone)]
pub enum MockLogs {
    Lines(Vec<String>),
    FailOpen(String),
    FailAfter(Vec<String>, String),
    /// Yields the lines, then never ends.
    Pending(Vec<String>),
}

/// In-memory factory serving canned objects and log sources.
#[derive(Default)]
pub struct MockFactory {
    objects: Mutex<Vec<(Gvr, DynamicObject)>>,
    logs: Mutex<HashMap<String, MockLogs>>,
    metrics: Mutex<Option<ContainersMetrics>>,
    denied: AtomicBool,
    open: Arc<AtomicUsize>,
    pub log_requests: Mutex<Vec<(String, LogFetchParams)>>,
    pub patches: Mutex<Vec<(Gvr, String, Value)>>,
}

impl MockFactory {
    pub fn with_object(self, gvr: &str, object: DynamicObject) -> Self {
        lock(&self.objects).push((Gvr::new(gvr), object));
        self
    }

    pub fn with_logs(self, source: &str, logs: MockLogs) -> Self {
        lock(&self.logs).insert(source.to_string(), logs);
        self
    }

    pub fn with_metrics(self, metrics: ContainersMetrics) -> Self {
        *lock(&self.metrics) = Some(metrics);
        self
    }

    pub fn denied(self) -> Self {
        self.denied.store(true, Ordering::SeqCst);
        self
    }

    pub fn requested_sources(&self) -> Vec<String> {
        lock(&self.log_requests)
            .iter()
            .map(|(path, params)| source_key(path, params))
            .collect()
    }

    /// Log streams handed out and not yet dropped.
    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Counts a line stream as open until the stream is dropped.
struct OpenStream(Arc<AtomicUsize>);

impl OpenStream {
    fn new(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self(open.clone())
    }
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn source_key(path: &str, params: &LogFetchParams) -> String {
    format!("{path}:{}", params.container.as_deref().unwrap_or_default())
}

fn matches_selector(object: &DynamicObject, selector: &str) -> bool {
    let labels = object.labels();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

#[async_trait::async_trait]
impl Factory for MockFactory {
    async fn get(&self, gvr: &Gvr, path: &str) -> Result<DynamicObject> {
        lock(&self.objects)
            .iter()
            .find(|(kind, object)| {
                kind == gvr && fqn(&object.namespace().unwrap_or_default(), &object.name_any()) == path
            })
            .map(|(_, object)| object.clone())
            .ok_or_else(|| anyhow!("{gvr} {path} not found"))
    }

    async fn list(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        Ok(lock(&self.objects)
            .iter()
            .filter(|(kind, _)| kind == gvr)
            .map(|(_, object)| object)
            .filter(|object| match namespace {
                Some(namespace) if !namespace.is_empty() => {
                    object.namespace().as_deref() == Some(namespace)
                }
                _ => true,
            })
            .filter(|object| selector.is_none_or(|selector| matches_selector(object, selector)))
            .cloned()
            .collect())
    }

    async fn fetch_container_metrics(&self, path: &str) -> Result<ContainersMetrics> {
        lock(&self.metrics)
            .clone()
            .ok_or_else(|| anyhow!("metrics unavailable for {path}"))
    }

    async fn can_i(&self, _gvr: &Gvr, _namespace: &str, _verbs: &[&str]) -> Result<bool> {
        Ok(!self.denied.load(Ordering::SeqCst))
    }

    async fn stream_logs(&self, path: &str, params: &LogFetchParams) -> Result<LineStream> {
        lock(&self.log_requests).push((path.to_string(), params.clone()));
        let key = source_key(path, params);
        let logs = lock(&self.logs)
            .get(&key)
            .cloned()
            .unwrap_or(MockLogs::Lines(Vec::new()));

        let canned = |lines: Vec<String>| stream::iter(lines.into_iter().map(Ok));
        let lines: LineStream = match logs {
            MockLogs::Lines(values) => canned(values).boxed(),
            MockLogs::FailOpen(reason) => return Err(anyhow!(reason)),
            MockLogs::FailAfter(values, reason) => canned(values)
                .chain(stream::once(async move { Err(anyhow!(reason)) }))
                .boxed(),
            MockLogs::Pending(values) => canned(values).chain(stream::pending()).boxed(),
        };
        let open = OpenStream::new(&self.open);
        Ok(lines
            .map(move |line| {
                let _open = &open;
                line
            })
            .boxed())
    }

    async fn patch(&self, gvr: &Gvr, path: &str, patch: Value) -> Result<()> {
        lock(&self.patches).push((gvr.clone(), path.to_string(), patch));
        Ok(())
    }
}

fn containers(names: &[&str]) -> Vec<Value> {
    names
        .iter()
        .map(|name| json!({ "name": name, "image": format!("{name}:1.0") }))
        .collect()
}

pub fn pod(namespace: &str, name: &str, init: &[&str], regular: &[&str]) -> DynamicObject {
    let statuses = |names: &[&str]| {
        names
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "image": format!("{name}:1.0"),
                    "imageID": "",
                    "ready": true,
                    "restartCount": 0,
                    "state": { "running": {} }
                })
            })
            .collect::<Vec<_>>()
    };
    let object = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": { "app": name.split('-').next().unwrap_or(name) }
        },
        "spec": {
            "initContainers": containers(init),
            "containers": containers(regular)
        },
        "status": {
            "phase": "Running",
            "initContainerStatuses": statuses(init),
            "containerStatuses": statuses(regular)
        }
    });
    serde_json::from_value(object).expect("valid pod fixture")
}

pub fn deployment(namespace: &str, name: &str, app: &str, regular: &[&str]) -> DynamicObject {
    let object = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name, "namespace": namespace },
        "spec": {
            "replicas": 2,
            "selector": { "matchLabels": { "app": app } },
            "template": {
                "metadata": { "labels": { "app": app } },
                "spec": { "containers": containers(regular) }
            }
        },
        "status": { "readyReplicas": 2 }
    });
    serde_json::from_value(object).expect("valid deployment fixture")
}

pub fn config_map(namespace: &str, name: &str) -> DynamicObject {
    let object = json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name, "namespace": namespace },
        "data": { "key": "value" }
    });
    serde_json::from_value(object).expect("valid configmap fixture")
}
