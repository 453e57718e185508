//! Create / edit form for connection profiles, opened from the picker.
//!
//! Fields are edited one at a time: `enter` opens the focused text field in a
//! single-line editor, `enter` again commits, `esc` drops the edit. Choice
//! fields cycle with left/right/space. `ctrl+s` validates and saves.
//!
//! Credential rows only show when they apply: the registry key/secret pair
//! behind the basic-auth toggle, the SASL pair behind a SASL protocol.

use crossterm::event::{Event as CrosstermEvent, KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Layout, Position, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use reqwest::Url;
use strum::IntoEnumIterator;
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use crate::config::{ConfigFile, KafkaConfig, ProfileConfig, SchemaRegistryConfig, SecurityProtocol};
use crate::ui::theme::{Theme, UiGroup};

const LABEL_WIDTH: usize = 24;
const TOGGLE: [&str; 2] = ["off", "on"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKey {
    Key,
    Name,
    RegistryUrl,
    BasicAuth,
    ApiKey,
    ApiSecret,
    Bootstrap,
    Protocol,
    SaslUsername,
    SaslPassword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldKind {
    Text,
    Secret,
    Choice(Vec<String>),
}

#[derive(Debug, Clone)]
struct Field {
    key: FieldKey,
    label: &'static str,
    kind: FieldKind,
    value: String,
    placeholder: &'static str,
}

impl Field {
    fn text(key: FieldKey, label: &'static str, value: impl Into<String>, placeholder: &'static str) -> Self {
        Self {
            key,
            label,
            kind: FieldKind::Text,
            value: value.into(),
            placeholder,
        }
    }

    fn secret(key: FieldKey, label: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Secret,
            ..Self::text(key, label, value, "")
        }
    }

    fn choice(key: FieldKey, label: &'static str, options: Vec<String>, value: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Choice(options),
            ..Self::text(key, label, value, "")
        }
    }

    fn is_textual(&self) -> bool {
        matches!(self.kind, FieldKind::Text | FieldKind::Secret)
    }

    /// What the row shows: secrets are masked one bullet per character.
    fn display(&self) -> String {
        match self.kind {
            FieldKind::Secret => "•".repeat(self.value.chars().count()),
            _ => self.value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorOutcome {
    Pending,
    Cancelled,
    /// Validated profile under `key`. `replaces` is the key it was opened
    /// with when editing, so a rename can drop the old entry.
    Saved {
        key: String,
        replaces: Option<String>,
        profile: ProfileConfig,
    },
}

#[derive(Debug, Clone)]
pub struct ProfileEditor {
    /// Key being edited, `None` when creating.
    original: Option<String>,
    /// Keys already taken by other profiles.
    taken: Vec<String>,
    fields: Vec<Field>,
    focused: usize,
    editing: bool,
    input: Input,
    error: Option<String>,
}

impl ProfileEditor {
    /// Blank form for a new profile.
    pub fn create(file: &ConfigFile) -> Self {
        Self::build(file, None, &ProfileConfig::default())
    }

    /// Form prefilled from the profile stored under `key`.
    pub fn edit(file: &ConfigFile, key: &str) -> Option<Self> {
        let profile = file.profiles.get(key)?;
        Some(Self::build(file, Some(key), profile))
    }

    fn build(file: &ConfigFile, original: Option<&str>, profile: &ProfileConfig) -> Self {
        let registry = &profile.schema_registry;
        let kafka = &profile.kafka;
        let basic = !registry.api_key.is_empty() || !registry.api_secret.is_empty();
        let protocols = SecurityProtocol::iter().map(|p| p.to_string()).collect();
        let toggle = TOGGLE.iter().map(|s| s.to_string()).collect();
        let fields = vec![
            Field::text(FieldKey::Key, "Profile key", original.unwrap_or_default(), "e.g. local, production"),
            Field::text(FieldKey::Name, "Display name", profile.name.clone(), "defaults to the key"),
            Field::text(FieldKey::RegistryUrl, "Schema registry URL", registry.url.clone(), "http://localhost:8081"),
            Field::choice(FieldKey::BasicAuth, "Registry basic auth", toggle, TOGGLE[usize::from(basic)]),
            Field::text(FieldKey::ApiKey, "Registry API key", registry.api_key.clone(), ""),
            Field::secret(FieldKey::ApiSecret, "Registry API secret", registry.api_secret.clone()),
            Field::text(FieldKey::Bootstrap, "Kafka bootstrap servers", kafka.bootstrap_servers.clone(), "localhost:9092 (optional)"),
            Field::choice(FieldKey::Protocol, "Kafka security protocol", protocols, kafka.security_protocol.to_string()),
            Field::text(FieldKey::SaslUsername, "Kafka SASL username", kafka.sasl_username.clone(), ""),
            Field::secret(FieldKey::SaslPassword, "Kafka SASL password", kafka.sasl_password.clone()),
        ];
        Self {
            original: original.map(str::to_string),
            taken: file
                .profiles
                .keys()
                .filter(|k| Some(k.as_str()) != original)
                .cloned()
                .collect(),
            fields,
            focused: 0,
            editing: false,
            input: Input::default(),
            error: None,
        }
    }

    pub fn title(&self) -> String {
        match &self.original {
            Some(key) => format!(" Edit profile: {key} "),
            None => " New profile ".to_string(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Surface a failure that happened after the form was accepted (saving).
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    fn value(&self, key: FieldKey) -> &str {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
            .unwrap_or_default()
    }

    fn protocol(&self) -> SecurityProtocol {
        SecurityProtocol::try_from(self.value(FieldKey::Protocol).to_string()).unwrap_or_default()
    }

    fn is_visible(&self, key: FieldKey) -> bool {
        match key {
            FieldKey::ApiKey | FieldKey::ApiSecret => self.value(FieldKey::BasicAuth) == TOGGLE[1],
            FieldKey::SaslUsername | FieldKey::SaslPassword => self.protocol().uses_sasl(),
            _ => true,
        }
    }

    /// Labels of the rows currently shown, top to bottom.
    pub fn visible_labels(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| self.is_visible(f.key))
            .map(|f| f.label)
            .collect()
    }

    pub fn focused_label(&self) -> &'static str {
        self.fields[self.focused].label
    }

    fn step_focus(&mut self, forward: bool) {
        let len = self.fields.len();
        let mut next = self.focused;
        for _ in 0..len {
            next = if forward { (next + 1) % len } else { (next + len - 1) % len };
            if self.is_visible(self.fields[next].key) {
                self.focused = next;
                return;
            }
        }
    }

    fn cycle(&mut self, forward: bool) {
        let field = &mut self.fields[self.focused];
        let FieldKind::Choice(options) = &field.kind else {
            return;
        };
        if options.is_empty() {
            return;
        }
        let len = options.len();
        let idx = options.iter().position(|o| *o == field.value).unwrap_or(0);
        let next = if forward { (idx + 1) % len } else { (idx + len - 1) % len };
        field.value = options[next].clone();
    }

    fn start_editing(&mut self) {
        self.editing = true;
        self.input = Input::default().with_value(self.fields[self.focused].value.clone());
    }

    fn commit_editing(&mut self) {
        self.fields[self.focused].value = self.input.value().trim().to_string();
        self.editing = false;
        self.input = Input::default();
    }

    fn cancel_editing(&mut self) {
        self.editing = false;
        self.input = Input::default();
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> EditorOutcome {
        if self.editing {
            match key.code {
                KeyCode::Enter | KeyCode::Tab => {
                    self.commit_editing();
                    if key.code == KeyCode::Tab {
                        self.step_focus(true);
                    }
                }
                KeyCode::Esc => self.cancel_editing(),
                _ => {
                    self.input.handle_event(&CrosstermEvent::Key(key));
                }
            }
            return EditorOutcome::Pending;
        }

        match key.code {
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => return self.submit(),
            KeyCode::Esc => return EditorOutcome::Cancelled,
            KeyCode::Up | KeyCode::BackTab | KeyCode::Char('k') => self.step_focus(false),
            KeyCode::Down | KeyCode::Tab | KeyCode::Char('j') => self.step_focus(true),
            KeyCode::Left => self.cycle(false),
            KeyCode::Right | KeyCode::Char(' ') => self.cycle(true),
            KeyCode::Enter if self.fields[self.focused].is_textual() => self.start_editing(),
            KeyCode::Enter => self.cycle(true),
            _ => {}
        }
        EditorOutcome::Pending
    }

    fn submit(&mut self) -> EditorOutcome {
        match self.validate() {
            Ok((key, profile)) => {
                self.error = None;
                EditorOutcome::Saved {
                    key,
                    replaces: self.original.clone(),
                    profile,
                }
            }
            Err(message) => {
                self.error = Some(message);
                EditorOutcome::Pending
            }
        }
    }

    /// Check the form and build the profile it describes. Hidden credential
    /// rows are dropped, not saved.
    pub fn validate(&self) -> Result<(String, ProfileConfig), String> {
        let key = self.value(FieldKey::Key);
        if key.is_empty() {
            return Err("profile key is required".into());
        }
        if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err("profile key may only contain letters, digits, '-' and '_'".into());
        }
        if self.taken.iter().any(|k| k == key) {
            return Err(format!("profile `{key}` already exists"));
        }

        let url = self.value(FieldKey::RegistryUrl);
        if url.is_empty() {
            return Err("schema registry URL is required".into());
        }
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(format!("`{url}` is not an http(s) URL")),
        }

        let basic = self.is_visible(FieldKey::ApiKey);
        let (api_key, api_secret) = if basic {
            (self.value(FieldKey::ApiKey), self.value(FieldKey::ApiSecret))
        } else {
            ("", "")
        };
        if basic && (api_key.is_empty() || api_secret.is_empty()) {
            return Err("basic auth needs both an API key and a secret".into());
        }

        let protocol = self.protocol();
        let (sasl_username, sasl_password) = if protocol.uses_sasl() {
            (self.value(FieldKey::SaslUsername), self.value(FieldKey::SaslPassword))
        } else {
            ("", "")
        };
        if protocol.uses_sasl() && sasl_username.is_empty() {
            return Err(format!("{protocol} needs a SASL username"));
        }

        let name = match self.value(FieldKey::Name) {
            "" => key,
            name => name,
        };
        Ok((
            key.to_string(),
            ProfileConfig {
                name: name.to_string(),
                schema_registry: SchemaRegistryConfig {
                    url: url.to_string(),
                    api_key: api_key.to_string(),
                    api_secret: api_secret.to_string(),
                },
                kafka: KafkaConfig {
                    bootstrap_servers: self.value(FieldKey::Bootstrap).to_string(),
                    security_protocol: protocol,
                    sasl_username: sasl_username.to_string(),
                    sasl_password: sasl_password.to_string(),
                },
            },
        ))
    }

    pub fn draw(&self, frame: &mut Frame<'_>, theme: &Theme) {
        let [form_area, error_area, help_area] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        let outer = Block::default()
            .borders(Borders::ALL)
            .border_style(theme.style(UiGroup::BorderFocused))
            .title(self.title())
            .title_style(theme.style(UiGroup::Title));
        let inner = outer.inner(form_area);
        frame.render_widget(outer, form_area);

        let rows = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| self.is_visible(f.key));
        for (row, (idx, field)) in rows.enumerate() {
            if row as u16 >= inner.height {
                break;
            }
            let area = Rect::new(inner.x, inner.y + row as u16, inner.width, 1);
            let focused = idx == self.focused;
            let marker = if focused { "▸ " } else { "  " };
            let label = format!("{marker}{:<width$}", field.label, width = LABEL_WIDTH);
            let label_style = if focused {
                theme.style(UiGroup::Selected)
            } else {
                theme.style(UiGroup::Text)
            };

            if focused && self.editing {
                let shown = match field.kind {
                    FieldKind::Secret => "•".repeat(self.input.value().chars().count()),
                    _ => self.input.value().to_string(),
                };
                let value_x = label.chars().count() as u16;
                let width = inner.width.saturating_sub(value_x).max(1) as usize;
                let scroll = self.input.visual_scroll(width);
                frame.render_widget(
                    Paragraph::new(Line::from(vec![
                        Span::styled(label, label_style),
                        Span::styled(shown, theme.style(UiGroup::Text)),
                    ])),
                    area,
                );
                let offset = self.input.visual_cursor().saturating_sub(scroll) as u16;
                frame.set_cursor_position(Position::new(area.x + value_x + offset, area.y));
                continue;
            }

            let value = match (&field.kind, field.display()) {
                (FieldKind::Choice(_), v) => Span::styled(format!("◂ {v} ▸"), theme.style(UiGroup::Info)),
                (_, v) if v.is_empty() => Span::styled(field.placeholder, theme.style(UiGroup::Dimmed)),
                (_, v) => Span::styled(v, theme.style(UiGroup::Text)),
            };
            frame.render_widget(Paragraph::new(Line::from(vec![Span::styled(label, label_style), value])), area);
        }

        if let Some(error) = &self.error {
            frame.render_widget(
                Paragraph::new(Span::styled(format!(" {error}"), theme.style(UiGroup::Error))),
                error_area,
            );
        }

        let hints: &[(&str, &str)] = if self.editing {
            &[(" enter", " keep "), (" esc", " discard ")]
        } else {
            &[(" ↑↓", " move "), (" enter", " edit "), (" ←→", " choose "), (" ctrl+s", " save "), (" esc", " back ")]
        };
        let spans: Vec<Span> = hints
            .iter()
            .flat_map(|(key, what)| {
                [
                    Span::styled(*key, theme.style(UiGroup::KeyHint)),
                    Span::styled(*what, theme.style(UiGroup::Dimmed)),
                ]
            })
            .collect();
        frame.render_widget(Paragraph::new(Line::from(spans)), help_area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn save() -> KeyEvent {
        KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL)
    }

    /// Replace the focused field's text.
    fn type_text(editor: &mut ProfileEditor, text: &str) {
        editor.handle_key(press(KeyCode::Enter));
        editor.handle_key(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL));
        for c in text.chars() {
            editor.handle_key(press(KeyCode::Char(c)));
        }
        editor.handle_key(press(KeyCode::Enter));
    }

    fn focus(editor: &mut ProfileEditor, label: &str) {
        for _ in 0..editor.fields.len() {
            if editor.focused_label() == label {
                return;
            }
            editor.handle_key(press(KeyCode::Down));
        }
        panic!("{label} is not reachable; visible: {:?}", editor.visible_labels());
    }

    fn secured_file() -> ConfigFile {
        let mut file = ConfigFile::starter();
        file.profiles.insert(
            "prod".into(),
            ProfileConfig {
                name: "Production".into(),
                schema_registry: SchemaRegistryConfig {
                    url: "https://registry.prod".into(),
                    api_key: "key".into(),
                    api_secret: "hunter2".into(),
                },
                kafka: KafkaConfig {
                    bootstrap_servers: "b1:9093".into(),
                    security_protocol: SecurityProtocol::SaslSsl,
                    sasl_username: "svc".into(),
                    sasl_password: "pw".into(),
                },
            },
        );
        file
    }

    #[test]
    fn new_profile_is_built_from_typed_fields() {
        let mut editor = ProfileEditor::create(&ConfigFile::starter());
        assert_eq!(editor.title(), " New profile ");
        assert_eq!(
            editor.visible_labels(),
            vec![
                "Profile key",
                "Display name",
                "Schema registry URL",
                "Registry basic auth",
                "Kafka bootstrap servers",
                "Kafka security protocol",
            ]
        );

        type_text(&mut editor, "staging");
        focus(&mut editor, "Schema registry URL");
        type_text(&mut editor, "http://registry.staging:8081");
        focus(&mut editor, "Kafka bootstrap servers");
        type_text(&mut editor, "k1:9092,k2:9092");

        let EditorOutcome::Saved { key, replaces, profile } = editor.handle_key(save()) else {
            panic!("expected save, error: {:?}", editor.error());
        };
        assert_eq!(key, "staging");
        assert_eq!(replaces, None);
        assert_eq!(profile.name, "staging");
        assert_eq!(profile.schema_registry.url, "http://registry.staging:8081");
        assert_eq!(profile.schema_registry.basic_auth(), None);
        assert_eq!(profile.kafka.brokers(), vec!["k1:9092".to_string(), "k2:9092".to_string()]);
        assert_eq!(profile.kafka.security_protocol, SecurityProtocol::Plaintext);
    }

    #[test]
    fn edit_prefills_and_masks_secrets() {
        let editor = ProfileEditor::edit(&secured_file(), "prod").unwrap();
        assert_eq!(editor.title(), " Edit profile: prod ");
        assert_eq!(editor.visible_labels().len(), 10);

        let secret = editor.fields.iter().find(|f| f.key == FieldKey::ApiSecret).unwrap();
        assert_eq!(secret.display(), "•••••••");
        let password = editor.fields.iter().find(|f| f.key == FieldKey::SaslPassword).unwrap();
        assert_eq!(password.display(), "••");

        let (key, profile) = editor.validate().unwrap();
        assert_eq!(key, "prod");
        assert_eq!(profile, secured_file().profiles["prod"]);
        assert!(ProfileEditor::edit(&secured_file(), "missing").is_none());
    }

    #[test]
    fn credential_rows_follow_their_switches() {
        let mut editor = ProfileEditor::edit(&secured_file(), "prod").unwrap();

        focus(&mut editor, "Kafka security protocol");
        while editor.protocol().uses_sasl() {
            editor.handle_key(press(KeyCode::Right));
        }
        assert!(!editor.visible_labels().contains(&"Kafka SASL username"));

        focus(&mut editor, "Registry basic auth");
        editor.handle_key(press(KeyCode::Right));
        assert!(!editor.visible_labels().contains(&"Registry API key"));

        // hidden rows are skipped by navigation and dropped on save
        editor.handle_key(press(KeyCode::Down));
        assert_eq!(editor.focused_label(), "Kafka bootstrap servers");
        let (_, profile) = editor.validate().unwrap();
        assert_eq!(profile.schema_registry.api_key, "");
        assert_eq!(profile.schema_registry.api_secret, "");
        assert_eq!(profile.kafka.sasl_username, "");
        assert_eq!(profile.kafka.sasl_password, "");
    }

    #[test]
    fn invalid_forms_stay_open_with_an_error() {
        let mut editor = ProfileEditor::create(&ConfigFile::starter());
        assert_eq!(editor.handle_key(save()), EditorOutcome::Pending);
        assert_eq!(editor.error(), Some("profile key is required"));

        type_text(&mut editor, "local");
        focus(&mut editor, "Schema registry URL");
        type_text(&mut editor, "http://x");
        editor.handle_key(save());
        assert_eq!(editor.error(), Some("profile `local` already exists"));

        focus(&mut editor, "Profile key");
        type_text(&mut editor, "my env");
        editor.handle_key(save());
        assert!(editor.error().unwrap_or_default().starts_with("profile key may only contain"));

        let mut editor = ProfileEditor::create(&ConfigFile::starter());
        type_text(&mut editor, "dev");
        focus(&mut editor, "Schema registry URL");
        type_text(&mut editor, "registry:8081");
        editor.handle_key(save());
        assert_eq!(editor.error(), Some("`registry:8081` is not an http(s) URL"));

        focus(&mut editor, "Registry basic auth");
        editor.handle_key(press(KeyCode::Char(' ')));
        focus(&mut editor, "Schema registry URL");
        type_text(&mut editor, "https://registry");
        editor.handle_key(save());
        assert_eq!(editor.error(), Some("basic auth needs both an API key and a secret"));
    }

    #[test]
    fn escape_discards_the_edit_before_leaving() {
        let mut editor = ProfileEditor::edit(&secured_file(), "prod").unwrap();
        focus(&mut editor, "Display name");
        editor.handle_key(press(KeyCode::Enter));
        assert!(editor.is_editing());
        editor.handle_key(press(KeyCode::Char('!')));
        assert_eq!(editor.handle_key(press(KeyCode::Esc)), EditorOutcome::Pending);
        assert_eq!(editor.value(FieldKey::Name), "Production");
        assert_eq!(editor.handle_key(press(KeyCode::Esc)), EditorOutcome::Cancelled);
    }
}
