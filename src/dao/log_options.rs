use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::jiff::{SignedDuration, Timestamp};
use std::fmt::Display;

use crate::dao::log_item::LogItem;
use crate::gvr::namespaced;

/// Byte cap applied to head fetches.
pub const HEAD_LIMIT_BYTES: i64 = 5_000;

/// Describes which slice of logs to fetch or follow and how to label entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub path: String,
    pub container: String,
    pub default_container: String,
    pub since_time: String,
    pub lines: i64,
    pub since_seconds: i64,
    pub head: bool,
    pub previous: bool,
    pub single_container: bool,
    pub multi_pods: bool,
    pub show_timestamp: bool,
    pub all_containers: bool,
}

/// Fetch parameters handed to the factory for a single container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFetchParams {
    pub container: Option<String>,
    pub follow: bool,
    pub timestamps: bool,
    pub previous: bool,
    pub tail_lines: Option<i64>,
    pub since_seconds: Option<i64>,
    pub since_time: Option<Timestamp>,
    pub limit_bytes: Option<i64>,
}

impl LogOptions {
    pub fn info(&self) -> String {
        if self.has_container() {
            format!("{} ({})", self.path, self.container)
        } else {
            self.path.clone()
        }
    }

    pub fn has_container(&self) -> bool {
        !self.container.is_empty()
    }

    /// Flips between one container and all containers. No-op for pods that
    /// only have a single container.
    pub fn toggle_all_containers(&mut self) {
        if self.single_container {
            return;
        }
        self.all_containers = !self.all_containers;
        if self.all_containers {
            self.default_container = std::mem::take(&mut self.container);
            return;
        }

        if !self.default_container.is_empty() {
            self.container = self.default_container.clone();
        }
    }

    /// Copy of these options targeting one container of the pod at `path`.
    pub fn for_container(&self, path: &str, container: &str) -> Self {
        let mut opts = self.clone();
        opts.path = path.to_string();
        opts.container = container.to_string();
        opts
    }

    pub fn to_fetch_params(&self) -> LogFetchParams {
        let mut params = LogFetchParams {
            container: self.has_container().then(|| self.container.clone()),
            follow: true,
            timestamps: true,
            previous: self.previous,
            tail_lines: (self.lines >= 0).then_some(self.lines),
            since_seconds: None,
            since_time: None,
            limit_bytes: None,
        };
        if self.head {
            params.follow = false;
            params.tail_lines = None;
            params.limit_bytes = Some(HEAD_LIMIT_BYTES);
            return params;
        }
        if self.since_seconds < 0 {
            return params;
        }
        if self.since_seconds != 0 {
            params.since_seconds = Some(self.since_seconds);
            return params;
        }
        if self.since_time.is_empty() {
            return params;
        }
        // Step past the boundary entry so it is not delivered twice.
        params.since_time = parse_rfc3339(&self.since_time)
            .and_then(|since| since.checked_add(SignedDuration::from_secs(1)).ok());

        params
    }

    pub fn to_log_item(&self, bytes: Vec<u8>) -> LogItem {
        let mut item = LogItem::new(bytes);
        if item.is_empty() {
            return item;
        }
        item.single_container = self.single_container;
        item.container = self.container.clone();
        if self.multi_pods {
            let (_, pod) = namespaced(&self.path);
            item.pod = pod.to_string();
        }

        item
    }

    pub fn to_err_log_item(&self, err: &dyn Display) -> LogItem {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        let mut item = LogItem::new(format!("{timestamp} {err}").into_bytes());
        item.container = self.container.clone();
        item.single_container = self.single_container;
        if self.multi_pods {
            let (_, pod) = namespaced(&self.path);
            item.pod = pod.to_string();
        }
        item.is_error = true;
        item
    }
}

/// Strict RFC 3339; looser forms such as bracketed zone names are rejected.
fn parse_rfc3339(value: &str) -> Option<Timestamp> {
    let parsed = DateTime::parse_from_rfc3339(value).ok()?;
    let nanos = i32::try_from(parsed.timestamp_subsec_nanos()).ok()?;
    Timestamp::new(parsed.timestamp(), nanos).ok()
}
