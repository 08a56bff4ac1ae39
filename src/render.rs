use k8s_openapi::api::core::v1::{ContainerStatus, PodSpec, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use kube::core::DynamicObject;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::dao::factory::ContainerMetrics;
use crate::error::{DaoError, DaoResult};
use crate::gvr::fqn;
use crate::model::{ContainerRes, RowData};

pub const GENERIC_HEADERS: [&str; 3] = ["Name", "Namespace", "Age"];
pub const POD_HEADERS: [&str; 7] = [
    "Name",
    "Namespace",
    "Node",
    "Ready",
    "Status",
    "Restarts",
    "Age",
];
pub const WORKLOAD_HEADERS: [&str; 4] = ["Name", "Namespace", "Ready", "Age"];
pub const CONTAINER_HEADERS: [&str; 9] = [
    "Name", "Image", "Ready", "State", "Init", "Restarts", "CPU", "MEM", "Age",
];

pub fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

pub fn object_path(obj: &DynamicObject) -> String {
    fqn(&obj.namespace().unwrap_or_default(), &obj.name_any())
}

/// Deserializes the value at `pointer` (e.g. `/spec/template/spec`).
pub fn decode_at<T>(obj: &DynamicObject, pointer: &str) -> DaoResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let value = obj
        .data
        .pointer(pointer)
        .cloned()
        .ok_or_else(|| DaoError::invalid(object_path(obj), format!("missing {pointer}")))?;
    serde_json::from_value(value)
        .map_err(|error| DaoError::invalid(object_path(obj), format!("{pointer}: {error}")))
}

pub fn pod_status(obj: &DynamicObject) -> PodStatus {
    obj.data
        .get("status")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

pub fn generic_row(obj: &DynamicObject) -> RowData {
    let name = obj.name_any();
    let namespace = obj.namespace();
    RowData {
        name: name.clone(),
        namespace: namespace.clone(),
        columns: vec![
            name,
            namespace.unwrap_or_else(|| "-".to_string()),
            human_age(obj.metadata.creation_timestamp.as_ref()),
        ],
    }
}

pub fn pod_row(obj: &DynamicObject) -> RowData {
    let name = obj.name_any();
    let namespace = obj.namespace();
    let status = pod_status(obj);
    let phase = status
        .phase
        .clone()
        .unwrap_or_else(|| "Unknown".to_string());
    let node = obj
        .data
        .pointer("/spec/nodeName")
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string();
    let (ready, total, restarts) = pod_readiness(&status);

    RowData {
        name: name.clone(),
        namespace: namespace.clone(),
        columns: vec![
            name,
            namespace.unwrap_or_else(|| "-".to_string()),
            node,
            format!("{ready}/{total}"),
            phase,
            restarts.to_string(),
            human_age(obj.metadata.creation_timestamp.as_ref()),
        ],
    }
}

pub fn workload_row(obj: &DynamicObject) -> RowData {
    let name = obj.name_any();
    let namespace = obj.namespace();
    let status = obj.data.get("status");
    let count = |key: &str| {
        status
            .and_then(|value| value.get(key))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    };
    let desired = obj
        .data
        .pointer("/spec/replicas")
        .and_then(Value::as_i64)
        .or_else(|| {
            status
                .and_then(|value| value.get("desiredNumberScheduled"))
                .and_then(Value::as_i64)
        })
        .or_else(|| obj.data.pointer("/spec/completions").and_then(Value::as_i64))
        .unwrap_or(0);
    let ready = [count("readyReplicas"), count("numberReady"), count("succeeded")]
        .into_iter()
        .max()
        .unwrap_or(0);

    RowData {
        name: name.clone(),
        namespace: namespace.clone(),
        columns: vec![
            name,
            namespace.unwrap_or_else(|| "-".to_string()),
            format!("{ready}/{desired}"),
            human_age(obj.metadata.creation_timestamp.as_ref()),
        ],
    }
}

pub fn container_row(res: &ContainerRes) -> RowData {
    let (state, _) = res
        .status
        .as_ref()
        .map(|status| container_state_and_age(status, &res.age))
        .unwrap_or_else(|| ("Unknown".to_string(), res.age.clone()));
    let ready = res.status.as_ref().is_some_and(|status| status.ready);
    let restarts = res
        .status
        .as_ref()
        .map(|status| status.restart_count)
        .unwrap_or(0);
    let (cpu, memory) = match res.metrics {
        Some(ContainerMetrics {
            cpu_millicores,
            memory_bytes,
        }) => (
            format_cpu_millicores(cpu_millicores),
            format_bytes(memory_bytes),
        ),
        None => ("n/a".to_string(), "n/a".to_string()),
    };

    RowData {
        name: res.name.clone(),
        namespace: None,
        columns: vec![
            res.name.clone(),
            res.image.clone(),
            ready.to_string(),
            state,
            res.is_init.to_string(),
            restarts.to_string(),
            cpu,
            memory,
            res.age.clone(),
        ],
    }
}

pub fn find_container_status<'a>(name: &str, status: &'a PodStatus) -> Option<&'a ContainerStatus> {
    status
        .container_statuses
        .iter()
        .flatten()
        .chain(status.init_container_statuses.iter().flatten())
        .find(|candidate| candidate.name == name)
}

/// Declared container names: init, regular then ephemeral, in order.
pub fn container_names(spec: &PodSpec) -> Vec<String> {
    spec.init_containers
        .iter()
        .flatten()
        .map(|container| container.name.clone())
        .chain(spec.containers.iter().map(|container| container.name.clone()))
        .chain(
            spec.ephemeral_containers
                .iter()
                .flatten()
                .map(|container| container.name.clone()),
        )
        .collect()
}

pub fn selector_query(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn pod_readiness(status: &PodStatus) -> (usize, usize, i32) {
    let container_statuses = status.container_statuses.as_deref().unwrap_or(&[]);
    let total = container_statuses.len();
    let ready = container_statuses
        .iter()
        .filter(|container| container.ready)
        .count();
    let restarts = container_statuses
        .iter()
        .map(|container| container.restart_count)
        .sum();

    (ready, total, restarts)
}

pub fn container_state_and_age(container: &ContainerStatus, pod_age: &str) -> (String, String) {
    if let Some(state) = container.state.as_ref() {
        if let Some(running) = state.running.as_ref() {
            let age = running
                .started_at
                .as_ref()
                .map(|time| human_age(Some(time)))
                .unwrap_or_else(|| pod_age.to_string());
            return ("Running".to_string(), age);
        }
        if let Some(waiting) = state.waiting.as_ref() {
            let label = waiting
                .reason
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "Waiting".to_string());
            return (label, pod_age.to_string());
        }
        if let Some(terminated) = state.terminated.as_ref() {
            let label = terminated
                .reason
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| format!("Exit({})", terminated.exit_code));
            let age = terminated
                .finished_at
                .as_ref()
                .map(|time| human_age(Some(time)))
                .unwrap_or_else(|| pod_age.to_string());
            return (label, age);
        }
    }

    ("Unknown".to_string(), pod_age.to_string())
}

pub fn human_age(timestamp: Option<&Time>) -> String {
    let Some(timestamp) = timestamp else {
        return "-".to_string();
    };

    let elapsed_seconds =
        (k8s_openapi::jiff::Timestamp::now().as_second() - timestamp.0.as_second()).max(0);
    format_elapsed_seconds(elapsed_seconds)
}

fn format_elapsed_seconds(seconds: i64) -> String {
    if seconds >= 86_400 {
        return format!("{}d", seconds / 86_400);
    }

    if seconds >= 3_600 {
        return format!("{}h", seconds / 3_600);
    }

    if seconds >= 60 {
        return format!("{}m", seconds / 60);
    }

    format!("{seconds}s")
}

pub fn parse_cpu_millicores(value: &str) -> Option<u64> {
    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }

    let (number, multiplier) = if let Some(number) = raw.strip_suffix('m') {
        (number, 1.0)
    } else if let Some(number) = raw.strip_suffix('u') {
        (number, 0.001)
    } else if let Some(number) = raw.strip_suffix('n') {
        (number, 0.000001)
    } else {
        (raw, 1000.0)
    };

    let numeric = number.parse::<f64>().ok()?;
    let millicores = (numeric * multiplier).round();
    if !millicores.is_finite() || millicores < 0.0 {
        return None;
    }
    Some(millicores as u64)
}

pub fn parse_memory_bytes(value: &str) -> Option<u64> {
    const UNITS: [(&str, f64); 12] = [
        ("Ei", 1_152_921_504_606_846_976.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ti", 1_099_511_627_776.0),
        ("Gi", 1_073_741_824.0),
        ("Mi", 1_048_576.0),
        ("Ki", 1_024.0),
        ("E", 1_000_000_000_000_000_000.0),
        ("P", 1_000_000_000_000_000.0),
        ("T", 1_000_000_000_000.0),
        ("G", 1_000_000_000.0),
        ("M", 1_000_000.0),
        ("k", 1_000.0),
    ];

    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }

    let (number, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, multiplier)| raw.strip_suffix(suffix).map(|n| (n, *multiplier)))
        .unwrap_or((raw, 1.0));
    let bytes = (number.parse::<f64>().ok()? * multiplier).round();
    if !bytes.is_finite() || bytes < 0.0 {
        return None;
    }
    Some(bytes as u64)
}

pub fn format_cpu_millicores(value: u64) -> String {
    if value >= 1_000 {
        let cores = value as f64 / 1_000.0;
        format!("{cores:.2}c")
    } else {
        format!("{value}m")
    }
}

pub fn format_bytes(value: u64) -> String {
    const UNITS: [(&str, f64); 6] = [
        ("Ei", 1_152_921_504_606_846_976.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ti", 1_099_511_627_776.0),
        ("Gi", 1_073_741_824.0),
        ("Mi", 1_048_576.0),
        ("Ki", 1_024.0),
    ];
    if value == 0 {
        return "0B".to_string();
    }

    let value_f64 = value as f64;
    for (suffix, unit_size) in UNITS {
        if value_f64 >= unit_size {
            return format!("{:.1}{suffix}", value_f64 / unit_size);
        }
    }
    format!("{value}B")
}
