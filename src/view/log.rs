use crossterm::event::KeyCode;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

use crate::app::{AppContext, LogSession};
use crate::dao::Loggable;
use crate::dao::log_item::LogItem;
use crate::dao::log_options::LogOptions;
use crate::error::DaoError;
use crate::view::actions::{KeyAction, KeyActions, KeyHints};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogCommand {
    Timestamps,
    AllContainers,
    Clear,
    Up,
    Down,
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogStatus {
    Streaming,
    Ended,
    Failed(String),
}

/// One rendered log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub text: String,
    pub is_error: bool,
}

/// Follows a log session and keeps the most recent entries for display.
pub struct LogView {
    app: Rc<AppContext>,
    loggable: Arc<dyn Loggable>,
    opts: LogOptions,
    session: LogSession,
    items: VecDeque<LogItem>,
    capacity: usize,
    offset_from_bottom: usize,
    status: LogStatus,
    actions: KeyActions<LogCommand>,
}

impl LogView {
    pub fn open(app: Rc<AppContext>, loggable: Arc<dyn Loggable>, opts: LogOptions) -> Self {
        let mut actions = KeyActions::default();
        actions.add(
            KeyCode::Char('t'),
            KeyAction::new("Timestamps", LogCommand::Timestamps),
        );
        if !opts.single_container {
            actions.add(
                KeyCode::Char('a'),
                KeyAction::new("All Containers", LogCommand::AllContainers),
            );
        }
        actions.add(KeyCode::Char('c'), KeyAction::new("Clear", LogCommand::Clear));
        actions.add(KeyCode::Up, KeyAction::hidden("Up", LogCommand::Up));
        actions.add(KeyCode::Char('k'), KeyAction::hidden("Up", LogCommand::Up));
        actions.add(KeyCode::Down, KeyAction::hidden("Down", LogCommand::Down));
        actions.add(KeyCode::Char('j'), KeyAction::hidden("Down", LogCommand::Down));
        actions.add(KeyCode::Char('g'), KeyAction::hidden("Top", LogCommand::Top));
        actions.add(KeyCode::Char('G'), KeyAction::hidden("Tail", LogCommand::Bottom));

        let capacity = app.config.logger.buffer_size.max(1);
        let session = app.spawn_tail(loggable.clone(), opts.clone());
        Self {
            app,
            loggable,
            opts,
            session,
            items: VecDeque::new(),
            capacity,
            offset_from_bottom: 0,
            status: LogStatus::Streaming,
            actions,
        }
    }

    pub fn session(&self) -> u64 {
        self.session.id()
    }

    #[cfg(test)]
    pub fn options(&self) -> &LogOptions {
        &self.opts
    }

    pub fn status(&self) -> &LogStatus {
        &self.status
    }

    pub fn title(&self) -> String {
        let mut title = format!("Logs {}", self.opts.info());
        if self.opts.previous {
            title.push_str(" [previous]");
        }
        if self.opts.all_containers && !self.opts.single_container {
            title.push_str(" [all]");
        }
        title
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn append(&mut self, item: LogItem) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
        if self.offset_from_bottom > 0 {
            self.offset_from_bottom = (self.offset_from_bottom + 1).min(self.max_offset());
        }
    }

    pub fn mark_ended(&mut self) {
        if self.status == LogStatus::Streaming {
            self.status = LogStatus::Ended;
        }
    }

    pub fn mark_failed(&mut self, error: &DaoError) {
        self.status = LogStatus::Failed(error.to_string());
        self.app.flash_error(error);
    }

    /// Last `height` lines above the scroll offset.
    pub fn visible(&self, height: usize) -> Vec<LogLine> {
        let end = self.items.len().saturating_sub(self.offset_from_bottom);
        let start = end.saturating_sub(height);
        self.items
            .range(start..end)
            .map(|item| LogLine {
                text: item.render(self.opts.show_timestamp),
                is_error: item.is_error,
            })
            .collect()
    }

    pub fn bind_keys(&self, hints: &mut KeyHints) {
        self.actions.hints_into(hints);
    }

    pub fn handle_key(&mut self, key: KeyCode) -> bool {
        let Some(command) = self.actions.command(key) else {
            return false;
        };
        match command {
            LogCommand::Timestamps => self.opts.show_timestamp = !self.opts.show_timestamp,
            LogCommand::AllContainers => self.toggle_all_containers(),
            LogCommand::Clear => {
                self.items.clear();
                self.offset_from_bottom = 0;
            }
            LogCommand::Up => {
                self.offset_from_bottom = (self.offset_from_bottom + 1).min(self.max_offset());
            }
            LogCommand::Down => self.offset_from_bottom = self.offset_from_bottom.saturating_sub(1),
            LogCommand::Top => self.offset_from_bottom = self.max_offset(),
            LogCommand::Bottom => self.offset_from_bottom = 0,
        }
        true
    }

    fn max_offset(&self) -> usize {
        self.items.len().saturating_sub(1)
    }

    fn toggle_all_containers(&mut self) {
        let before = self.opts.all_containers;
        self.opts.toggle_all_containers();
        if self.opts.all_containers == before {
            return;
        }
        debug!(source = %self.opts.info(), all = self.opts.all_containers, "restarting log session");
        self.restart();
    }

    /// Replaces the session; dropping the old one cancels its streams.
    fn restart(&mut self) {
        self.session = self
            .app
            .spawn_tail(self.loggable.clone(), self.opts.clone());
        self.items.clear();
        self.offset_from_bottom = 0;
        self.status = LogStatus::Streaming;
    }
}
