use crossterm::event::KeyCode;

/// One binding: a label shown in the hint bar and the command it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAction<C> {
    pub description: String,
    pub command: C,
    pub visible: bool,
}

impl<C> KeyAction<C> {
    pub fn new(description: impl Into<String>, command: C) -> Self {
        Self {
            description: description.into(),
            command,
            visible: true,
        }
    }

    pub fn hidden(description: impl Into<String>, command: C) -> Self {
        Self {
            visible: false,
            ..Self::new(description, command)
        }
    }
}

/// Bindings owned by one layer of a view, in registration order.
#[derive(Debug, Clone)]
pub struct KeyActions<C> {
    entries: Vec<(KeyCode, KeyAction<C>)>,
}

impl<C> Default for KeyActions<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<C: Copy> KeyActions<C> {
    /// Binds `key`; a later binding for the same key replaces the earlier.
    pub fn add(&mut self, key: KeyCode, action: KeyAction<C>) {
        match self.entries.iter_mut().find(|(bound, _)| *bound == key) {
            Some((_, existing)) => *existing = action,
            None => self.entries.push((key, action)),
        }
    }

    pub fn get(&self, key: KeyCode) -> Option<&KeyAction<C>> {
        self.entries
            .iter()
            .find(|(bound, _)| *bound == key)
            .map(|(_, action)| action)
    }

    pub fn command(&self, key: KeyCode) -> Option<C> {
        self.get(key).map(|action| action.command)
    }

    /// Adds this layer's visible bindings to the shared hint collection.
    pub fn hints_into(&self, hints: &mut KeyHints) {
        for (key, action) in &self.entries {
            if action.visible {
                hints.add(*key, &action.description);
            }
        }
    }
}

/// Key hints collected across the layers of a view chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyHints {
    entries: Vec<(KeyCode, String)>,
}

impl KeyHints {
    pub fn add(&mut self, key: KeyCode, description: &str) {
        match self.entries.iter_mut().find(|(bound, _)| *bound == key) {
            Some((_, existing)) => *existing = description.to_string(),
            None => self.entries.push((key, description.to_string())),
        }
    }

    #[cfg(test)]
    pub fn description(&self, key: KeyCode) -> Option<&str> {
        self.entries
            .iter()
            .find(|(bound, _)| *bound == key)
            .map(|(_, description)| description.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (String, &str)> {
        self.entries
            .iter()
            .map(|(key, description)| (key_label(*key), description.as_str()))
    }
}

pub fn key_label(key: KeyCode) -> String {
    match key {
        KeyCode::Char(' ') => "space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "enter".to_string(),
        KeyCode::Esc => "esc".to_string(),
        KeyCode::Tab => "tab".to_string(),
        KeyCode::Up => "↑".to_string(),
        KeyCode::Down => "↓".to_string(),
        other => format!("{other:?}").to_ascii_lowercase(),
    }
}
