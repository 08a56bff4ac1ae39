use chrono::{DateTime, Local};
use k8s_openapi::api::core::v1::ContainerStatus;
use std::fmt::{Display, Formatter};

use crate::dao::factory::ContainerMetrics;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NamespaceScope {
    All,
    Named(String),
}

impl NamespaceScope {
    /// Context path handed to `Listable::list`; empty means every namespace.
    pub fn path(&self) -> String {
        match self {
            Self::All => String::new(),
            Self::Named(namespace) => namespace.clone(),
        }
    }
}

impl Display for NamespaceScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Named(namespace) => write!(f, "{namespace}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowData {
    pub name: String,
    pub namespace: Option<String>,
    pub columns: Vec<String>,
}

impl RowData {
    /// Path of the row: `namespace/name`, or the bare name for cluster scoped
    /// rows and pseudo kinds.
    pub fn path(&self) -> String {
        match self.namespace.as_deref() {
            Some(namespace) if !namespace.is_empty() => format!("{namespace}/{}", self.name),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<RowData>,
    pub selected: usize,
    pub last_refreshed: Option<DateTime<Local>>,
    pub error: Option<String>,
}

impl TableData {
    pub fn set_rows(
        &mut self,
        headers: Vec<String>,
        rows: Vec<RowData>,
        refreshed_at: DateTime<Local>,
    ) {
        self.headers = headers;
        self.rows = rows;
        self.last_refreshed = Some(refreshed_at);
        self.error = None;
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }

    pub fn set_error(&mut self, error: impl Into<String>, refreshed_at: DateTime<Local>) {
        self.rows.clear();
        self.error = Some(error.into());
        self.last_refreshed = Some(refreshed_at);
        self.selected = 0;
    }

    pub fn selected_row(&self) -> Option<&RowData> {
        self.rows.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.rows.len() {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }
}

/// One declared container of a pod joined with its status and usage.
#[derive(Debug, Clone, Default)]
pub struct ContainerRes {
    pub name: String,
    pub image: String,
    pub is_init: bool,
    pub status: Option<ContainerStatus>,
    pub metrics: Option<ContainerMetrics>,
    pub age: String,
}

/// Image override for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub name: String,
    pub docker_image: String,
    pub init: bool,
}

pub type ImageSpecs = Vec<ImageSpec>;

#[cfg(test)]
mod tests {
    use super::{NamespaceScope, RowData, TableData};
    use chrono::Local;

    fn row(name: &str, namespace: Option<&str>) -> RowData {
        RowData {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            columns: vec![name.to_string()],
        }
    }

    #[test]
    fn row_path_joins_namespace() {
        assert_eq!(row("web-0", Some("shop")).path(), "shop/web-0");
        assert_eq!(row("node-a", None).path(), "node-a");
        assert_eq!(row("main", Some("")).path(), "main");
    }

    #[test]
    fn selection_is_clamped_after_refresh() {
        let mut table = TableData::default();
        table.set_rows(
            vec!["Name".to_string()],
            vec![row("a", None), row("b", None), row("c", None)],
            Local::now(),
        );
        table.select_next();
        table.select_next();
        table.select_next();
        assert_eq!(table.selected, 2);

        table.set_rows(vec!["Name".to_string()], vec![row("a", None)], Local::now());
        assert_eq!(table.selected, 0);
        assert_eq!(table.selected_row().map(|row| row.name.as_str()), Some("a"));
    }

    #[test]
    fn namespace_scope_path() {
        assert_eq!(NamespaceScope::All.path(), "");
        assert_eq!(NamespaceScope::Named("shop".to_string()).path(), "shop");
    }
}
