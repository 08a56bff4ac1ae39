use crate::config::Config;
use crate::dao::log_item::LogItem;
use crate::dao::log_options::LogOptions;
use crate::dao::tail::LogStream;
use crate::dao::{AccessorRegistry, Capability, Loggable, capability_check};
use crate::error::DaoError;
use crate::gvr::{CONTAINERS, Gvr, PODS};
use crate::input::Action;
use crate::model::NamespaceScope;
use crate::view::actions::KeyHints;
use crate::view::{
    Browser, DialogView, ImageExtender, LogView, LogsExtender, ResourceViewer, ViewEvent,
    container_log_options,
};
use crossterm::event::KeyCode;
use futures::StreamExt;
use futures::stream::select_all;
use std::cell::{Cell, RefCell};
use std::fmt::Display;
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Command,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashLevel {
    Info,
    Error,
}

/// Transient status message shown in the footer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn is_error(&self) -> bool {
        self.level == FlashLevel::Error
    }
}

/// Everything background tasks report back to the UI loop.
#[derive(Debug)]
pub enum AppEvent {
    View(ViewEvent),
    LogItem { session: u64, item: LogItem },
    LogsEnded { session: u64 },
    TailFailed { session: u64, error: DaoError },
}

pub enum Page {
    Resource(Box<dyn ResourceViewer>),
    Logs(LogView),
}

/// Handle on a running log session. Dropping it cancels every stream.
#[derive(Debug)]
pub struct LogSession {
    id: u64,
    cancel: CancellationToken,
}

impl LogSession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for LogSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State shared by every page: configuration, accessors, and the channels
/// views use to talk back to the loop.
pub struct AppContext {
    pub config: Config,
    pub registry: AccessorRegistry,
    events: UnboundedSender<AppEvent>,
    flash: RefCell<Option<Flash>>,
    pages: RefCell<Vec<Page>>,
    next_id: Cell<u64>,
}

impl AppContext {
    pub fn new(
        config: Config,
        registry: AccessorRegistry,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            config,
            registry,
            events,
            flash: RefCell::new(None),
            pages: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub fn events(&self) -> UnboundedSender<AppEvent> {
        self.events.clone()
    }

    pub fn flash_info(&self, message: impl Into<String>) {
        self.set_flash(FlashLevel::Info, message.into());
    }

    pub fn flash_error(&self, error: impl Display) {
        self.set_flash(FlashLevel::Error, error.to_string());
    }

    fn set_flash(&self, level: FlashLevel, message: String) {
        *self.flash.borrow_mut() = Some(Flash { level, message });
    }

    pub fn flash(&self) -> Option<Flash> {
        self.flash.borrow().clone()
    }

    pub fn clear_flash(&self) {
        self.flash.borrow_mut().take();
    }

    /// Queues a page for the loop to push once the current key is handled.
    pub fn inject(&self, page: Page) {
        self.pages.borrow_mut().push(page);
    }

    pub fn take_pages(&self) -> Vec<Page> {
        std::mem::take(&mut *self.pages.borrow_mut())
    }

    /// Starts a log session and merges its streams into the event channel.
    pub fn spawn_tail(&self, loggable: Arc<dyn Loggable>, opts: LogOptions) -> LogSession {
        let session = self.next_id();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let events = self.events();
        tokio::spawn(async move {
            let streams = match loggable.tail_logs(&opts, &token).await {
                Ok(streams) => streams,
                Err(error) => {
                    warn!(session, path = %opts.path, error = %error, "log session failed");
                    token.cancel();
                    let _ = events.send(AppEvent::TailFailed { session, error });
                    return;
                }
            };
            let sources = streams.iter().map(LogStream::source).collect::<Vec<_>>();
            info!(session, path = %opts.path, sources = ?sources, "log session started");

            let mut merged = select_all(streams);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(session, "log session cancelled");
                        return;
                    }
                    next = merged.next() => {
                        let Some(item) = next else {
                            break;
                        };
                        if events.send(AppEvent::LogItem { session, item }).is_err() {
                            return;
                        }
                    }
                }
            }
            if token.is_cancelled() {
                debug!(session, "log session cancelled");
                return;
            }
            let _ = events.send(AppEvent::LogsEnded { session });
        });
        LogSession { id: session, cancel }
    }
}

/// Builds the view chain for a kind from the capabilities its accessor
/// exposes.
pub fn make_viewer(
    app: &Rc<AppContext>,
    gvr: Gvr,
    path: impl Into<String>,
) -> Box<dyn ResourceViewer> {
    let browser = Browser::new(gvr.clone(), path, app.clone());
    if gvr == Gvr::new(CONTAINERS) {
        return Box::new(LogsExtender::new(browser, Some(container_log_options)));
    }

    let (loggable, pod_spec) = match app.registry.resolve(&gvr) {
        Ok(resolved) => (
            capability_check(&resolved, Capability::Loggable),
            capability_check(&resolved, Capability::ContainsPodSpec),
        ),
        Err(_) => (false, false),
    };
    match (loggable, pod_spec) {
        (true, true) => Box::new(LogsExtender::new(ImageExtender::new(browser), None)),
        (true, false) => Box::new(LogsExtender::new(browser, None)),
        (false, true) => Box::new(ImageExtender::new(browser)),
        (false, false) => Box::new(browser),
    }
}

pub struct App {
    ctx: Rc<AppContext>,
    scope: NamespaceScope,
    context: String,
    cluster: String,
    pages: Vec<Page>,
    mode: InputMode,
    input: String,
    show_help: bool,
    running: bool,
}

impl App {
    pub fn new(
        ctx: Rc<AppContext>,
        scope: NamespaceScope,
        context: String,
        cluster: String,
    ) -> Self {
        let root = make_viewer(&ctx, Gvr::new(PODS), scope.path());
        Self {
            ctx,
            scope,
            context,
            cluster,
            pages: vec![Page::Resource(root)],
            mode: InputMode::Normal,
            input: String::new(),
            show_help: false,
            running: true,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn scope(&self) -> &NamespaceScope {
        &self.scope
    }

    pub fn flash(&self) -> Option<Flash> {
        self.ctx.flash()
    }

    pub fn read_only(&self) -> bool {
        self.ctx.config.read_only
    }

    pub fn page(&self) -> Option<&Page> {
        self.pages.last()
    }

    pub fn depth(&self) -> usize {
        self.pages.len()
    }

    /// Whether the active page has a modal form open.
    pub fn modal(&self) -> bool {
        self.dialog().is_some()
    }

    pub fn dialog(&self) -> Option<DialogView> {
        match self.pages.last() {
            Some(Page::Resource(view)) => view.dialog(),
            _ => None,
        }
    }

    /// Bindings of the active page plus the global ones.
    pub fn hints(&self) -> KeyHints {
        let mut hints = KeyHints::default();
        match self.pages.last() {
            Some(Page::Resource(view)) => view.bind_keys(&mut hints),
            Some(Page::Logs(view)) => view.bind_keys(&mut hints),
            None => {}
        }
        hints.add(KeyCode::Char(':'), "Command");
        hints.add(KeyCode::Char('?'), "Help");
        if self.pages.len() > 1 {
            hints.add(KeyCode::Esc, "Back");
        }
        hints
    }

    pub fn apply_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.running = false,
            Action::ToggleHelp => self.show_help = !self.show_help,
            Action::StartCommand => {
                self.ctx.clear_flash();
                self.mode = InputMode::Command;
                self.input.clear();
            }
            Action::Back => self.back(),
            Action::SubmitInput => {
                self.mode = InputMode::Normal;
                let line = std::mem::take(&mut self.input);
                self.execute_command_line(&line);
            }
            Action::CancelInput => {
                self.mode = InputMode::Normal;
                self.input.clear();
            }
            Action::Backspace => {
                self.input.pop();
            }
            Action::InputChar(c) => self.input.push(c),
            Action::Forward(code) => self.forward(code),
        }
    }

    fn back(&mut self) {
        if self.show_help {
            self.show_help = false;
            return;
        }
        if self.pages.len() > 1 {
            self.pages.pop();
            self.ctx.clear_flash();
            if let Some(Page::Resource(view)) = self.pages.last_mut() {
                view.refresh();
            }
        }
    }

    fn forward(&mut self, code: KeyCode) {
        let handled = match self.pages.last_mut() {
            Some(Page::Resource(view)) => view.handle_key(code),
            Some(Page::Logs(view)) => view.handle_key(code),
            None => false,
        };
        if !handled {
            debug!(key = ?code, "unbound key");
        }
        self.push_injected();
    }

    fn push_injected(&mut self) {
        for mut page in self.ctx.take_pages() {
            if let Page::Resource(view) = &mut page {
                view.refresh();
            }
            self.pages.push(page);
        }
    }

    pub fn execute_command_line(&mut self, line: &str) {
        let mut tokens = line.split_whitespace();
        let Some(command) = tokens.next() else {
            return;
        };
        let argument = tokens.next();

        match (command, argument) {
            ("q" | "q!" | "quit", _) => self.running = false,
            ("ns" | "namespace", Some(target)) => {
                self.scope = match target {
                    "all" | "-A" | "*" => NamespaceScope::All,
                    name => NamespaceScope::Named(name.to_string()),
                };
                let root = self.root_gvr();
                self.reset_root(root);
                self.ctx.flash_info(format!("Namespace {}", self.scope));
            }
            (alias, _) => match Gvr::from_alias(alias) {
                Some(gvr) if gvr.is_pseudo() => {
                    self.ctx
                        .flash_error(format!("{} are listed from a pod", gvr.title()));
                }
                Some(gvr) => match self.ctx.registry.resolve(&gvr) {
                    Ok(_) => self.reset_root(gvr),
                    Err(error) => self.ctx.flash_error(error),
                },
                None => self.ctx.flash_error(format!("unknown command: {line}")),
            },
        }
    }

    fn root_gvr(&self) -> Gvr {
        match self.pages.first() {
            Some(Page::Resource(view)) => view.gvr().clone(),
            _ => Gvr::new(PODS),
        }
    }

    fn reset_root(&mut self, gvr: Gvr) {
        info!(gvr = %gvr, scope = %self.scope, "switching view");
        let mut root = make_viewer(&self.ctx, gvr, self.scope.path());
        root.refresh();
        self.pages.clear();
        self.pages.push(Page::Resource(root));
    }

    /// Routes a background result to the page that asked for it.
    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::View(event) => {
                let target = event.view();
                let owner = self.pages.iter_mut().find_map(|page| match page {
                    Page::Resource(view) if view.id() == target => Some(view),
                    _ => None,
                });
                match owner {
                    Some(view) => {
                        if let Some(unclaimed) = view.deliver(event) {
                            debug!(view = unclaimed.view(), "view event not claimed");
                        }
                    }
                    None => debug!(view = target, "dropping event for closed view"),
                }
                self.push_injected();
            }
            AppEvent::LogItem { session, item } => {
                if let Some(view) = self.log_view(session) {
                    view.append(item);
                }
            }
            AppEvent::LogsEnded { session } => {
                if let Some(view) = self.log_view(session) {
                    view.mark_ended();
                }
            }
            AppEvent::TailFailed { session, error } => match self.log_view(session) {
                Some(view) => view.mark_failed(&error),
                None => debug!(session, error = %error, "failure for closed log session"),
            },
        }
    }

    fn log_view(&mut self, session: u64) -> Option<&mut LogView> {
        self.pages.iter_mut().find_map(|page| match page {
            Page::Logs(view) if view.session() == session => Some(view),
            _ => None,
        })
    }

    /// Periodic refresh of the active list.
    pub fn tick(&mut self) {
        if let Some(Page::Resource(view)) = self.pages.last_mut() {
            view.refresh();
        }
    }
}
