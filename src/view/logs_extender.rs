use crossterm::event::KeyCode;
use std::rc::Rc;
use tracing::warn;

use crate::app::{AppContext, AppEvent, Page};
use crate::dao::ensure_log_access;
use crate::dao::log_options::LogOptions;
use crate::error::{DaoError, DaoResult};
use crate::gvr::{Gvr, is_resource_path};
use crate::model::TableData;
use crate::view::actions::{KeyAction, KeyActions, KeyHints};
use crate::view::{
    DialogView, LogView, ResourceViewer, SuspendGuard, ViewEvent, command_path,
};

/// Shapes the log options for a view; `bool` asks for previous logs.
pub type LogOptionsFn = fn(&dyn ResourceViewer, bool) -> DaoResult<LogOptions>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogsCommand {
    Logs,
    Previous,
}

/// Adds log commands to a resource view.
pub struct LogsExtender<V> {
    inner: V,
    actions: KeyActions<LogsCommand>,
    options_fn: Option<LogOptionsFn>,
}

impl<V: ResourceViewer> LogsExtender<V> {
    pub fn new(inner: V, options_fn: Option<LogOptionsFn>) -> Self {
        let mut actions = KeyActions::default();
        actions.add(KeyCode::Char('l'), KeyAction::new("Logs", LogsCommand::Logs));
        actions.add(
            KeyCode::Char('p'),
            KeyAction::new("Logs Previous", LogsCommand::Previous),
        );
        Self {
            inner,
            actions,
            options_fn,
        }
    }

    /// Builds the options, then checks log access off the UI loop. The page
    /// opens only once the check passes.
    fn show_logs(&mut self, previous: bool) {
        let built = match self.options_fn {
            Some(build) => build(&*self, previous),
            None => default_log_options(&*self, previous),
        };
        let opts = match built {
            Ok(opts) => opts,
            Err(DaoError::NoSelection) => return,
            Err(error) => {
                self.app().flash_error(error);
                return;
            }
        };

        let factory = match self.app().registry.resolve(self.gvr()).and_then(|resolved| {
            resolved.loggable()?;
            resolved.accessor.factory()
        }) {
            Ok(factory) => factory,
            Err(error) => {
                self.app().flash_error(error);
                return;
            }
        };

        let view = self.id();
        let events = self.app().events();
        tokio::spawn(async move {
            let result = ensure_log_access(factory.as_ref(), &opts.path).await;
            let _ = events.send(AppEvent::View(ViewEvent::LogAccessChecked {
                view,
                opts,
                result,
            }));
        });
    }

    fn open_logs(&self, opts: LogOptions, access: DaoResult<()>) {
        let loggable = access.and_then(|()| {
            self.app()
                .registry
                .resolve(self.gvr())
                .and_then(|resolved| resolved.loggable())
        });
        match loggable {
            Ok(loggable) => {
                let app = self.app().clone();
                let view = LogView::open(app.clone(), loggable, opts);
                app.inject(Page::Logs(view));
            }
            Err(error) => {
                warn!(path = %opts.path, error = %error, "logs refused");
                self.app().flash_error(error);
            }
        }
    }
}

fn seeded_options(app: &AppContext, path: String, previous: bool) -> LogOptions {
    let logger = &app.config.logger;
    LogOptions {
        path,
        previous,
        lines: logger.tail_count,
        since_seconds: logger.since_seconds,
        show_timestamp: logger.show_time,
        ..LogOptions::default()
    }
}

/// Options for the selected object with every container included.
fn default_log_options(view: &dyn ResourceViewer, previous: bool) -> DaoResult<LogOptions> {
    let path = command_path(view).ok_or(DaoError::NoSelection)?;
    let mut opts = seeded_options(view.app(), path, previous);
    opts.all_containers = !opts.has_container();
    Ok(opts)
}

/// Options for the selected container of the pod the view was opened for.
pub fn container_log_options(view: &dyn ResourceViewer, previous: bool) -> DaoResult<LogOptions> {
    let container = view
        .selected_item()
        .filter(|name| !name.is_empty())
        .ok_or(DaoError::NoSelection)?;
    let path = view.current_path();
    if !is_resource_path(path) {
        return Err(DaoError::invalid(path, "container logs need a pod path"));
    }

    let mut opts = seeded_options(view.app(), path.to_string(), previous);
    opts.container = container;
    opts.single_container = true;
    Ok(opts)
}

impl<V: ResourceViewer> ResourceViewer for LogsExtender<V> {
    fn id(&self) -> u64 {
        self.inner.id()
    }

    fn gvr(&self) -> &Gvr {
        self.inner.gvr()
    }

    fn app(&self) -> &Rc<AppContext> {
        self.inner.app()
    }

    fn selected_item(&self) -> Option<String> {
        self.inner.selected_item()
    }

    fn current_path(&self) -> &str {
        self.inner.current_path()
    }

    fn suspend(&self) -> SuspendGuard {
        self.inner.suspend()
    }

    fn is_suspended(&self) -> bool {
        self.inner.is_suspended()
    }

    fn bind_keys(&self, hints: &mut KeyHints) {
        self.inner.bind_keys(hints);
        self.actions.hints_into(hints);
    }

    fn handle_key(&mut self, key: KeyCode) -> bool {
        if !self.inner.is_suspended()
            && let Some(command) = self.actions.command(key)
        {
            self.show_logs(command == LogsCommand::Previous);
            return true;
        }
        self.inner.handle_key(key)
    }

    fn deliver(&mut self, event: ViewEvent) -> Option<ViewEvent> {
        match event {
            ViewEvent::LogAccessChecked { view, opts, result } if view == self.id() => {
                self.open_logs(opts, result);
                None
            }
            event => self.inner.deliver(event),
        }
    }

    fn refresh(&mut self) {
        self.inner.refresh();
    }

    fn table(&self) -> &TableData {
        self.inner.table()
    }

    fn dialog(&self) -> Option<DialogView> {
        self.inner.dialog()
    }
}
