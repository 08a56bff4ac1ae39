use crossterm::event::KeyCode;
use k8s_openapi::api::core::v1::PodSpec;
use std::rc::Rc;
use tracing::info;

use crate::app::{AppContext, AppEvent};
use crate::gvr::Gvr;
use crate::model::{ImageSpec, ImageSpecs, TableData};
use crate::view::actions::{KeyAction, KeyActions, KeyHints};
use crate::view::{
    DialogField, DialogView, ResourceViewer, SuspendGuard, ViewEvent, command_path,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageCommand {
    SetImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ImageField {
    name: String,
    init: bool,
    current: String,
    value: String,
}

/// Editable image values for every container of one pod template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageForm {
    path: String,
    fields: Vec<ImageField>,
    focus: usize,
}

impl ImageForm {
    pub fn from_pod_spec(path: impl Into<String>, spec: &PodSpec) -> Self {
        let init = spec.init_containers.iter().flatten().map(|c| (c, true));
        let regular = spec.containers.iter().map(|c| (c, false));
        let fields = init
            .chain(regular)
            .map(|(container, init)| {
                let image = container.image.clone().unwrap_or_default();
                ImageField {
                    name: container.name.clone(),
                    init,
                    current: image.clone(),
                    value: image,
                }
            })
            .collect();
        Self {
            path: path.into(),
            fields,
            focus: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Containers whose image was changed to a non-blank value.
    pub fn modified(&self) -> ImageSpecs {
        self.fields
            .iter()
            .filter_map(|field| {
                let value = field.value.trim();
                (!value.is_empty() && value != field.current).then(|| ImageSpec {
                    name: field.name.clone(),
                    docker_image: value.to_string(),
                    init: field.init,
                })
            })
            .collect()
    }

    fn focus_next(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + 1) % self.fields.len();
        }
    }

    fn focus_previous(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
        }
    }

    fn push(&mut self, c: char) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            field.value.push(c);
        }
    }

    fn pop(&mut self) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            field.value.pop();
        }
    }

    fn view(&self) -> DialogView {
        DialogView {
            title: format!("Set Image {}", self.path),
            fields: self
                .fields
                .iter()
                .enumerate()
                .map(|(index, field)| DialogField {
                    label: if field.init {
                        format!("{} (init)", field.name)
                    } else {
                        field.name.clone()
                    },
                    value: field.value.clone(),
                    focused: index == self.focus,
                })
                .collect(),
            hint: "enter apply  esc cancel  tab next".to_string(),
        }
    }
}

enum ImageState {
    Idle,
    Loading { path: String },
    DialogOpen { form: ImageForm, _guard: SuspendGuard },
    Applying { path: String },
}

/// Adds an image editor to views whose kind carries a pod template.
pub struct ImageExtender<V> {
    inner: V,
    actions: KeyActions<ImageCommand>,
    state: ImageState,
}

impl<V: ResourceViewer> ImageExtender<V> {
    pub fn new(inner: V) -> Self {
        let mut actions = KeyActions::default();
        if !inner.app().config.read_only {
            actions.add(
                KeyCode::Char('i'),
                KeyAction::new("Set Image", ImageCommand::SetImage),
            );
        }
        Self {
            inner,
            actions,
            state: ImageState::Idle,
        }
    }

    fn show_image_dialog(&mut self) {
        if !matches!(self.state, ImageState::Idle) {
            return;
        }
        let Some(path) = command_path(&*self) else {
            return;
        };
        let pod_spec = match self
            .app()
            .registry
            .resolve(self.gvr())
            .and_then(|resolved| resolved.pod_spec())
        {
            Ok(pod_spec) => pod_spec,
            Err(error) => {
                self.app().flash_error(error);
                return;
            }
        };

        self.state = ImageState::Loading { path: path.clone() };
        let view = self.id();
        let events = self.app().events();
        tokio::spawn(async move {
            let result = pod_spec.get_pod_spec(&path).await;
            let _ = events.send(AppEvent::View(ViewEvent::PodSpecLoaded { view, path, result }));
        });
    }

    fn handle_dialog_key(&mut self, key: KeyCode) {
        let ImageState::DialogOpen { form, .. } = &mut self.state else {
            return;
        };
        match key {
            KeyCode::Esc => self.state = ImageState::Idle,
            KeyCode::Enter => self.apply(),
            KeyCode::Down | KeyCode::Tab => form.focus_next(),
            KeyCode::Up | KeyCode::BackTab => form.focus_previous(),
            KeyCode::Backspace => form.pop(),
            KeyCode::Char(c) => form.push(c),
            _ => {}
        }
    }

    fn apply(&mut self) {
        let ImageState::DialogOpen { form, .. } = &self.state else {
            return;
        };
        let specs = form.modified();
        let path = form.path.clone();
        if specs.is_empty() {
            self.state = ImageState::Idle;
            self.app().flash_info("No image changes");
            return;
        }
        let pod_spec = match self
            .app()
            .registry
            .resolve(self.gvr())
            .and_then(|resolved| resolved.pod_spec())
        {
            Ok(pod_spec) => pod_spec,
            Err(error) => {
                self.state = ImageState::Idle;
                self.app().flash_error(error);
                return;
            }
        };

        info!(path = %path, changes = specs.len(), "applying image update");
        self.state = ImageState::Applying { path: path.clone() };
        let view = self.id();
        let events = self.app().events();
        tokio::spawn(async move {
            let result = pod_spec.set_images(&path, &specs).await;
            let _ = events.send(AppEvent::View(ViewEvent::ImagesApplied { view, path, result }));
        });
    }

    fn on_pod_spec(&mut self, path: String, result: crate::error::DaoResult<PodSpec>) {
        if !matches!(&self.state, ImageState::Loading { path: pending } if *pending == path) {
            return;
        }
        match result {
            Ok(spec) => {
                let form = ImageForm::from_pod_spec(path.clone(), &spec);
                if form.is_empty() {
                    self.state = ImageState::Idle;
                    self.app().flash_error(format!("{path} declares no containers"));
                    return;
                }
                let guard = self.inner.suspend();
                self.state = ImageState::DialogOpen {
                    form,
                    _guard: guard,
                };
            }
            Err(error) => {
                self.state = ImageState::Idle;
                self.app().flash_error(error);
            }
        }
    }

    fn on_images_applied(&mut self, path: String, result: crate::error::DaoResult<()>) {
        if !matches!(&self.state, ImageState::Applying { path: pending } if *pending == path) {
            return;
        }
        self.state = ImageState::Idle;
        match result {
            Ok(()) => {
                self.app().flash_info(format!("Images updated for {path}"));
                self.inner.refresh();
            }
            Err(error) => self.app().flash_error(error),
        }
    }
}

impl<V: ResourceViewer> ResourceViewer for ImageExtender<V> {
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
        if matches!(self.state, ImageState::DialogOpen { .. }) {
            self.handle_dialog_key(key);
            return true;
        }
        if let Some(ImageCommand::SetImage) = self.actions.command(key) {
            self.show_image_dialog();
            return true;
        }
        self.inner.handle_key(key)
    }

    fn deliver(&mut self, event: ViewEvent) -> Option<ViewEvent> {
        match event {
            ViewEvent::PodSpecLoaded { view, path, result } if view == self.id() => {
                self.on_pod_spec(path, result);
                None
            }
            ViewEvent::ImagesApplied { view, path, result } if view == self.id() => {
                self.on_images_applied(path, result);
                None
            }
            other => self.inner.deliver(other),
        }
    }

    fn refresh(&mut self) {
        self.inner.refresh();
    }

    fn table(&self) -> &TableData {
        self.inner.table()
    }

    fn dialog(&self) -> Option<DialogView> {
        match &self.state {
            ImageState::DialogOpen { form, .. } => Some(form.view()),
            _ => self.inner.dialog(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ImageExtender, ImageForm};
    use crate::app::AppEvent;
    use crate::config::Config;
    use crate::dao::testing::{MockFactory, deployment, pod};
    use crate::gvr::{DEPLOYMENTS, Gvr, PODS};
    use crate::model::{ImageSpec, RowData};
    use crate::view::actions::KeyHints;
    use crate::view::testing::{context, shared_context};
    use crate::view::{Browser, ResourceViewer, ViewEvent};
    use crossterm::event::KeyCode;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn select(view: &mut dyn ResourceViewer, name: &str) {
        let event = ViewEvent::TableLoaded {
            view: view.id(),
            result: Ok((
                vec!["Name".to_string()],
                vec![RowData {
                    name: name.to_string(),
                    namespace: Some("ns".to_string()),
                    columns: vec![name.to_string()],
                }],
            )),
        };
        assert!(view.deliver(event).is_none());
    }

    async fn next_view_event(events: &mut UnboundedReceiver<AppEvent>) -> ViewEvent {
        loop {
            if let Some(AppEvent::View(event)) = events.recv().await {
                return event;
            }
        }
    }

    fn type_text(view: &mut dyn ResourceViewer, text: &str) {
        for c in text.chars() {
            assert!(view.handle_key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn form_reports_only_changed_images() {
        let spec = PodSpec {
            init_containers: Some(vec![Container {
                name: "setup".to_string(),
                image: Some("setup:1".to_string()),
                ..Container::default()
            }]),
            containers: vec![
                Container {
                    name: "main".to_string(),
                    image: Some("main:1".to_string()),
                    ..Container::default()
                },
                Container {
                    name: "sidecar".to_string(),
                    image: Some("sidecar:1".to_string()),
                    ..Container::default()
                },
            ],
            ..PodSpec::default()
        };
        let mut form = ImageForm::from_pod_spec("ns/web-0", &spec);
        assert_eq!(form.view().fields[0].label, "setup (init)");

        form.fields[0].value = "setup:2".to_string();
        form.fields[1].value = "   ".to_string();
        form.fields[2].value = " sidecar:1 ".to_string();
        assert_eq!(
            form.modified(),
            vec![ImageSpec {
                name: "setup".to_string(),
                docker_image: "setup:2".to_string(),
                init: true,
            }]
        );
    }

    #[tokio::test]
    async fn dialog_applies_changed_images() {
        let factory = Arc::new(
            MockFactory::default().with_object(DEPLOYMENTS, deployment("ns", "web", "web", &["main"])),
        );
        let (app, mut events) = shared_context(factory.clone(), Config::default());
        let mut view = ImageExtender::new(Browser::new(Gvr::new(DEPLOYMENTS), "ns", app.clone()));
        select(&mut view, "web");

        assert!(view.handle_key(KeyCode::Char('i')));
        let loaded = next_view_event(&mut events).await;
        assert!(view.deliver(loaded).is_none());

        let dialog = view.dialog().expect("dialog open");
        assert_eq!(dialog.fields.len(), 1);
        assert_eq!(dialog.fields[0].value, "main:1.0");
        assert!(view.is_suspended());

        // Keys go to the form while it is open.
        assert!(view.handle_key(KeyCode::Backspace));
        assert!(view.handle_key(KeyCode::Backspace));
        assert!(view.handle_key(KeyCode::Backspace));
        type_text(&mut view, "2.0");
        assert!(view.handle_key(KeyCode::Enter));
        assert!(view.dialog().is_none());
        assert!(!view.is_suspended());

        let applied = next_view_event(&mut events).await;
        assert!(view.deliver(applied).is_none());
        let flash = app.flash().expect("flash");
        assert!(!flash.is_error());
        assert!(flash.message.contains("ns/web"));
        let patches = factory.patches.lock().expect("patches").clone();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].1, "ns/web");
        assert_eq!(
            patches[0].2,
            json!({ "spec": { "template": { "spec": {
                "containers": [{ "name": "main", "image": "main:2.0" }]
            }}}})
        );

        // Success refreshes the inner list.
        let refreshed = next_view_event(&mut events).await;
        assert!(matches!(refreshed, ViewEvent::TableLoaded { .. }));
    }

    #[tokio::test]
    async fn escape_cancels_without_patching() {
        let (app, mut events) = context(
            MockFactory::default().with_object(PODS, pod("ns", "web-0", &[], &["main"])),
            Config::default(),
        );
        let mut view = ImageExtender::new(Browser::new(Gvr::new(PODS), "ns", app.clone()));
        select(&mut view, "web-0");

        view.handle_key(KeyCode::Char('i'));
        let loaded = next_view_event(&mut events).await;
        view.deliver(loaded);
        assert!(view.dialog().is_some());

        assert!(view.handle_key(KeyCode::Esc));
        assert!(view.dialog().is_none());
        assert!(!view.is_suspended());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn unchanged_form_is_not_submitted() {
        let (app, mut events) = context(
            MockFactory::default().with_object(PODS, pod("ns", "web-0", &[], &["main"])),
            Config::default(),
        );
        let mut view = ImageExtender::new(Browser::new(Gvr::new(PODS), "ns", app.clone()));
        select(&mut view, "web-0");

        view.handle_key(KeyCode::Char('i'));
        let loaded = next_view_event(&mut events).await;
        view.deliver(loaded);
        assert!(view.handle_key(KeyCode::Enter));

        assert!(view.dialog().is_none());
        assert_eq!(app.flash().map(|flash| flash.message).as_deref(), Some("No image changes"));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn load_failure_flashes_and_stays_idle() {
        let (app, mut events) = context(MockFactory::default(), Config::default());
        let mut view = ImageExtender::new(Browser::new(Gvr::new(PODS), "ns", app.clone()));
        select(&mut view, "missing");

        view.handle_key(KeyCode::Char('i'));
        let loaded = next_view_event(&mut events).await;
        view.deliver(loaded);

        assert!(view.dialog().is_none());
        assert!(!view.is_suspended());
        assert!(app.flash().is_some_and(|flash| flash.is_error()));
    }

    #[test]
    fn read_only_mode_hides_the_command() {
        let config = Config {
            read_only: true,
            ..Config::default()
        };
        let (app, _events) = context(MockFactory::default(), config);
        let mut view = ImageExtender::new(Browser::new(Gvr::new(PODS), "ns", app));

        let mut hints = KeyHints::default();
        view.bind_keys(&mut hints);
        assert_eq!(hints.description(KeyCode::Char('i')), None);
        assert!(!view.handle_key(KeyCode::Char('i')));
    }
}
