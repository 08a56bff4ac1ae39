pub mod actions;
mod browser;
mod image_extender;
mod log;
mod logs_extender;

use crossterm::event::KeyCode;
use k8s_openapi::api::core::v1::PodSpec;
use std::cell::Cell;
use std::rc::Rc;

use crate::app::AppContext;
use crate::dao::log_options::LogOptions;
use crate::error::DaoResult;
use crate::gvr::{Gvr, is_resource_path};
use crate::model::{RowData, TableData};
use actions::KeyHints;

pub use browser::Browser;
pub use image_extender::ImageExtender;
pub use log::{LogStatus, LogView};
pub use logs_extender::{LogsExtender, container_log_options};

/// Interactive resource list plus whatever extensions wrap it.
///
/// Extensions hold one inner viewer and implement this trait by delegating
/// to it, adding only their own bindings and state.
pub trait ResourceViewer {
    /// Routing key for events produced by this view's background work.
    fn id(&self) -> u64;

    fn gvr(&self) -> &Gvr;

    fn app(&self) -> &Rc<AppContext>;

    /// Path of the highlighted row, if any.
    fn selected_item(&self) -> Option<String>;

    /// Context the list was opened for: a namespace, or the owning object.
    fn current_path(&self) -> &str;

    /// Pauses background refresh until the guard is dropped.
    fn suspend(&self) -> SuspendGuard;

    fn is_suspended(&self) -> bool;

    fn bind_keys(&self, hints: &mut KeyHints);

    /// Returns whether the key was consumed.
    fn handle_key(&mut self, key: KeyCode) -> bool;

    /// Hands the event back when no layer claims it.
    fn deliver(&mut self, event: ViewEvent) -> Option<ViewEvent>;

    fn refresh(&mut self);

    fn table(&self) -> &TableData;

    fn dialog(&self) -> Option<DialogView>;
}

/// Path a command should act on: the selection, or the view's own context
/// path when the selection is not a `namespace/name` path.
pub fn command_path(view: &dyn ResourceViewer) -> Option<String> {
    let selected = view.selected_item().filter(|path| !path.is_empty())?;
    if is_resource_path(&selected) {
        Some(selected)
    } else {
        Some(view.current_path().to_string())
    }
}

/// Results of background work, routed back to the view that asked.
#[derive(Debug)]
pub enum ViewEvent {
    TableLoaded {
        view: u64,
        result: DaoResult<(Vec<String>, Vec<RowData>)>,
    },
    PodSpecLoaded {
        view: u64,
        path: String,
        result: DaoResult<PodSpec>,
    },
    ImagesApplied {
        view: u64,
        path: String,
        result: DaoResult<()>,
    },
    LogAccessChecked {
        view: u64,
        opts: LogOptions,
        result: DaoResult<()>,
    },
}

impl ViewEvent {
    pub fn view(&self) -> u64 {
        match self {
            Self::TableLoaded { view, .. }
            | Self::PodSpecLoaded { view, .. }
            | Self::ImagesApplied { view, .. }
            | Self::LogAccessChecked { view, .. } => *view,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Suspender {
    depth: Rc<Cell<u32>>,
}

impl Suspender {
    pub fn suspend(&self) -> SuspendGuard {
        self.depth.set(self.depth.get() + 1);
        SuspendGuard {
            depth: self.depth.clone(),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.depth.get() > 0
    }
}

/// Keeps a view suspended while alive.
#[derive(Debug)]
pub struct SuspendGuard {
    depth: Rc<Cell<u32>>,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// Render snapshot of a modal form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogView {
    pub title: String,
    pub fields: Vec<DialogField>,
    pub hint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogField {
    pub label: String,
    pub value: String,
    pub focused: bool,
}
