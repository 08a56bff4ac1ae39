use std::fmt::{Display, Formatter};

pub const PODS: &str = "v1/pods";
pub const CONTAINERS: &str = "containers";
pub const SERVICES: &str = "v1/services";
pub const CONFIG_MAPS: &str = "v1/configmaps";
pub const SECRETS: &str = "v1/secrets";
pub const NAMESPACES: &str = "v1/namespaces";
pub const NODES: &str = "v1/nodes";
pub const SERVICE_ACCOUNTS: &str = "v1/serviceaccounts";
pub const DEPLOYMENTS: &str = "apps/v1/deployments";
pub const STATEFUL_SETS: &str = "apps/v1/statefulsets";
pub const DAEMON_SETS: &str = "apps/v1/daemonsets";
pub const REPLICA_SETS: &str = "apps/v1/replicasets";
pub const JOBS: &str = "batch/v1/jobs";

/// Group/version/resource key identifying a resource kind.
///
/// Core kinds print as `v1/pods`, grouped kinds as `apps/v1/deployments` and
/// pseudo kinds as a bare resource such as `containers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gvr {
    group: String,
    version: String,
    resource: String,
}

impl Gvr {
    pub fn new(raw: &str) -> Self {
        let parts = raw.trim().trim_matches('/').split('/').collect::<Vec<_>>();
        let (group, version, resource) = match parts.as_slice() {
            [resource] => ("", "", *resource),
            [version, resource] => ("", *version, *resource),
            [group, version, resource] => (*group, *version, *resource),
            _ => {
                let resource = parts.last().copied().unwrap_or_default();
                let version = parts.get(parts.len().saturating_sub(2)).copied();
                let group = parts[..parts.len().saturating_sub(2)].join("/");
                return Self {
                    group,
                    version: version.unwrap_or_default().to_string(),
                    resource: resource.to_string(),
                };
            }
        };

        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_pseudo(&self) -> bool {
        self.version.is_empty()
    }

    pub fn title(&self) -> String {
        let mut chars = self.resource.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn from_alias(token: &str) -> Option<Self> {
        let raw = match token.trim().to_ascii_lowercase().as_str() {
            "po" | "pod" | "pods" => PODS,
            "co" | "container" | "containers" => CONTAINERS,
            "svc" | "service" | "services" => SERVICES,
            "cm" | "configmap" | "configmaps" | "config-map" | "config-maps" => CONFIG_MAPS,
            "secret" | "secrets" => SECRETS,
            "ns" | "namespace" | "namespaces" => NAMESPACES,
            "no" | "node" | "nodes" => NODES,
            "sa" | "serviceaccount" | "serviceaccounts" | "service-account"
            | "service-accounts" => SERVICE_ACCOUNTS,
            "deploy" | "deployment" | "deployments" | "dp" => DEPLOYMENTS,
            "sts" | "statefulset" | "statefulsets" => STATEFUL_SETS,
            "ds" | "daemonset" | "daemonsets" | "daemon-set" | "daemon-sets" => DAEMON_SETS,
            "rs" | "replicaset" | "replicasets" | "replica-set" | "replica-sets" => REPLICA_SETS,
            "job" | "jobs" => JOBS,
            _ => return None,
        };
        Some(Self::new(raw))
    }
}

impl Display for Gvr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.group.is_empty(), self.version.is_empty()) {
            (_, true) => write!(f, "{}", self.resource),
            (true, false) => write!(f, "{}/{}", self.version, self.resource),
            (false, false) => write!(f, "{}/{}/{}", self.group, self.version, self.resource),
        }
    }
}

impl From<&str> for Gvr {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Splits a path into namespace and name at the last separator.
pub fn namespaced(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((namespace, name)) => (namespace.trim_matches('/'), name),
        None => ("", path),
    }
}

pub fn fqn(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}/{name}")
    }
}

pub fn is_resource_path(path: &str) -> bool {
    let (namespace, name) = namespaced(path);
    !namespace.is_empty() && !name.is_empty()
}
