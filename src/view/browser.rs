use chrono::Local;
use crossterm::event::KeyCode;
use std::rc::Rc;
use tracing::debug;

use crate::app::{AppContext, AppEvent, Page, make_viewer};
use crate::gvr::{CONTAINERS, Gvr, PODS};
use crate::model::{RowData, TableData};
use crate::view::actions::{KeyAction, KeyActions, KeyHints};
use crate::view::{DialogView, ResourceViewer, SuspendGuard, Suspender, ViewEvent, command_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrowserCommand {
    Up,
    Down,
    Top,
    Bottom,
    Refresh,
    Containers,
}

/// Base list view for one resource kind under one context path.
pub struct Browser {
    id: u64,
    gvr: Gvr,
    path: String,
    app: Rc<AppContext>,
    table: TableData,
    suspender: Suspender,
    loading: bool,
    actions: KeyActions<BrowserCommand>,
}

impl Browser {
    pub fn new(gvr: Gvr, path: impl Into<String>, app: Rc<AppContext>) -> Self {
        let mut actions = KeyActions::default();
        actions.add(KeyCode::Up, KeyAction::hidden("Up", BrowserCommand::Up));
        actions.add(KeyCode::Char('k'), KeyAction::hidden("Up", BrowserCommand::Up));
        actions.add(KeyCode::Down, KeyAction::hidden("Down", BrowserCommand::Down));
        actions.add(KeyCode::Char('j'), KeyAction::hidden("Down", BrowserCommand::Down));
        actions.add(KeyCode::Char('g'), KeyAction::hidden("Top", BrowserCommand::Top));
        actions.add(KeyCode::Char('G'), KeyAction::hidden("Bottom", BrowserCommand::Bottom));
        actions.add(KeyCode::Char('r'), KeyAction::new("Refresh", BrowserCommand::Refresh));
        if gvr == Gvr::new(PODS) {
            actions.add(
                KeyCode::Enter,
                KeyAction::new("Containers", BrowserCommand::Containers),
            );
        }

        Self {
            id: app.next_id(),
            gvr,
            path: path.into(),
            app,
            table: TableData::default(),
            suspender: Suspender::default(),
            loading: false,
            actions,
        }
    }

    fn show_containers(&mut self) {
        let Some(path) = command_path(&*self) else {
            return;
        };
        let viewer = make_viewer(&self.app, Gvr::new(CONTAINERS), path);
        self.app.inject(Page::Resource(viewer));
    }
}

impl ResourceViewer for Browser {
    fn id(&self) -> u64 {
        self.id
    }

    fn gvr(&self) -> &Gvr {
        &self.gvr
    }

    fn app(&self) -> &Rc<AppContext> {
        &self.app
    }

    fn selected_item(&self) -> Option<String> {
        self.table.selected_row().map(RowData::path)
    }

    fn current_path(&self) -> &str {
        &self.path
    }

    fn suspend(&self) -> SuspendGuard {
        self.suspender.suspend()
    }

    fn is_suspended(&self) -> bool {
        self.suspender.is_suspended()
    }

    fn bind_keys(&self, hints: &mut KeyHints) {
        self.actions.hints_into(hints);
    }

    fn handle_key(&mut self, key: KeyCode) -> bool {
        let Some(command) = self.actions.command(key) else {
            return false;
        };
        match command {
            BrowserCommand::Up => self.table.select_previous(),
            BrowserCommand::Down => self.table.select_next(),
            BrowserCommand::Top => self.table.selected = 0,
            BrowserCommand::Bottom => {
                self.table.selected = self.table.rows.len().saturating_sub(1);
            }
            BrowserCommand::Refresh => self.refresh(),
            BrowserCommand::Containers => self.show_containers(),
        }
        true
    }

    fn deliver(&mut self, event: ViewEvent) -> Option<ViewEvent> {
        match event {
            ViewEvent::TableLoaded { view, result } if view == self.id => {
                self.loading = false;
                match result {
                    Ok((headers, rows)) => self.table.set_rows(headers, rows, Local::now()),
                    Err(error) => self.table.set_error(error.to_string(), Local::now()),
                }
                None
            }
            other => Some(other),
        }
    }

    fn refresh(&mut self) {
        if self.loading || self.is_suspended() {
            return;
        }
        let listable = match self.app.registry.resolve(&self.gvr).and_then(|r| r.listable()) {
            Ok(listable) => listable,
            Err(error) => {
                self.table.set_error(error.to_string(), Local::now());
                return;
            }
        };

        self.loading = true;
        let view = self.id;
        let path = self.path.clone();
        let events = self.app.events();
        debug!(gvr = %self.gvr, path = %path, "refreshing table");
        tokio::spawn(async move {
            let headers = listable.headers();
            let result = listable.list(&path).await.map(|rows| (headers, rows));
            let _ = events.send(AppEvent::View(ViewEvent::TableLoaded { view, result }));
        });
    }

    fn table(&self) -> &TableData {
        &self.table
    }

    fn dialog(&self) -> Option<DialogView> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::Browser;
    use crate::app::{AppEvent, Page};
    use crate::config::Config;
    use crate::dao::testing::{MockFactory, pod};
    use crate::gvr::{CONTAINERS, Gvr, PODS};
    use crate::view::testing::context;
    use crate::view::{ResourceViewer, command_path};
    use crossterm::event::KeyCode;

    #[tokio::test]
    async fn refresh_loads_rows_through_the_event_channel() {
        let (app, mut events) = context(
            MockFactory::default()
                .with_object(PODS, pod("ns", "web-0", &[], &["main"]))
                .with_object(PODS, pod("ns", "web-1", &[], &["main"])),
            Config::default(),
        );
        let mut browser = Browser::new(Gvr::new(PODS), "ns", app);
        browser.refresh();
        browser.refresh();

        let Some(AppEvent::View(event)) = events.recv().await else {
            panic!("expected a view event");
        };
        assert!(browser.deliver(event).is_none());
        assert_eq!(browser.table().rows.len(), 2);
        assert_eq!(browser.selected_item().as_deref(), Some("ns/web-0"));

        browser.handle_key(KeyCode::Char('j'));
        assert_eq!(browser.selected_item().as_deref(), Some("ns/web-1"));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn suspended_view_skips_refresh() {
        let (app, mut events) = context(MockFactory::default(), Config::default());
        let mut browser = Browser::new(Gvr::new(PODS), "ns", app);
        {
            let _guard = browser.suspend();
            assert!(browser.is_suspended());
            browser.refresh();
        }
        assert!(!browser.is_suspended());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn enter_on_pod_opens_container_view() {
        let (app, mut events) = context(
            MockFactory::default().with_object(PODS, pod("ns", "web-0", &[], &["main"])),
            Config::default(),
        );
        let mut browser = Browser::new(Gvr::new(PODS), "ns", app.clone());
        browser.refresh();
        let Some(AppEvent::View(event)) = events.recv().await else {
            panic!("expected a view event");
        };
        browser.deliver(event);

        assert!(browser.handle_key(KeyCode::Enter));
        let pages = app.take_pages();
        assert_eq!(pages.len(), 1);
        let Page::Resource(containers) = &pages[0] else {
            panic!("expected a resource page");
        };
        assert_eq!(containers.gvr(), &Gvr::new(CONTAINERS));
        assert_eq!(containers.current_path(), "ns/web-0");
    }

    #[tokio::test]
    async fn bare_selection_falls_back_to_current_path() {
        let (app, mut events) = context(
            MockFactory::default().with_object(PODS, pod("ns", "web-0", &["init-a"], &["main"])),
            Config::default(),
        );
        let mut containers = Browser::new(Gvr::new(CONTAINERS), "ns/web-0", app);
        containers.refresh();
        let Some(AppEvent::View(event)) = events.recv().await else {
            panic!("expected a view event");
        };
        containers.deliver(event);

        assert_eq!(containers.selected_item().as_deref(), Some("init-a"));
        assert_eq!(command_path(&containers).as_deref(), Some("ns/web-0"));
    }

    #[test]
    fn empty_selection_has_no_command_path() {
        let (app, _events) = context(MockFactory::default(), Config::default());
        let browser = Browser::new(Gvr::new(PODS), "ns", app);
        assert_eq!(command_path(&browser), None);
    }
}
