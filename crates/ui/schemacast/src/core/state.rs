//! Session state.
//!
//! `RootState` holds exactly one [`Mode`]. Each variant carries only the data
//! that mode needs; session-wide data (subject list, schema context, status
//! line, pending fetch) lives beside it.
//!
//! The engine owns the state exclusively. Background tasks never see it; they
//! only send completion events back.

use apache_avro::Schema;
use ratatui::style::Style;
use tui_input::Input;
use tui_textarea::TextArea;

use crate::domain::drafts::DraftEntry;
use crate::domain::subject::{filter_subjects, subject_to_topic};
use crate::services::registry::SubjectSchema;
use crate::services::ConsumerHandle;

/// Rows moved by page up / page down.
pub const PAGE_STEP: usize = 10;

/// Identifies one background request so late completions can be recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTag {
    pub seq: u64,
    pub subject: String,
    pub schema_id: Option<u32>,
}

/// The schema currently on screen.
#[derive(Debug, Clone)]
pub struct SchemaContext {
    pub subject: String,
    pub version: i32,
    pub id: u32,
    pub raw: String,
    pub pretty: String,
    compiled: Result<Schema, String>,
}

impl SchemaContext {
    pub fn from_registry(found: SubjectSchema) -> Self {
        let pretty = found.pretty();
        let compiled = if found.is_avro() {
            Schema::parse_str(&found.schema).map_err(|err| err.to_string())
        } else {
            Err(format!(
                "{} schemas are not supported",
                found.schema_type.as_deref().unwrap_or("non-Avro")
            ))
        };
        Self {
            subject: found.subject,
            version: found.version,
            id: found.id,
            raw: found.schema,
            pretty,
            compiled,
        }
    }

    /// Compiled schema, or the reason it could not be compiled.
    pub fn compiled(&self) -> Result<&Schema, &str> {
        self.compiled.as_ref().map_err(String::as_str)
    }

    pub fn topic(&self) -> &str {
        subject_to_topic(&self.subject)
    }
}

/// Which half of the main screen has focus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
pub enum Pane {
    #[default]
    List,
    Viewer,
}

impl Pane {
    pub fn toggle(self) -> Self {
        match self {
            Pane::List => Pane::Viewer,
            Pane::Viewer => Pane::List,
        }
    }
}

/// Subject list with live filter and selection.
#[derive(Debug, Default)]
pub struct SubjectBrowser {
    all: Vec<String>,
    query: String,
    selected: usize,
    pub loaded: bool,
}

impl SubjectBrowser {
    pub fn set_subjects(&mut self, mut subjects: Vec<String>) {
        subjects.sort();
        self.all = subjects;
        self.loaded = true;
        self.clamp();
    }

    pub fn total(&self) -> usize {
        self.all.len()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Changing the filter resets the selection to the first match.
    pub fn set_query(&mut self, query: &str) {
        if self.query != query {
            self.query = query.to_string();
            self.selected = 0;
        }
    }

    pub fn visible(&self) -> Vec<&str> {
        filter_subjects(&self.all, &self.query)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&str> {
        self.visible().get(self.selected).copied()
    }

    pub fn move_by(&mut self, delta: isize) {
        let len = self.visible().len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, len as isize - 1) as usize;
    }

    fn clamp(&mut self) {
        let len = self.visible().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub input: Input,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewingState {
    pub scroll: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DraftField {
    #[default]
    Payload,
    Key,
}

/// Payload being edited plus an optional message key.
#[derive(Debug, Clone)]
pub struct Draft {
    pub payload: TextArea<'static>,
    pub key: Input,
    pub focus: DraftField,
}

impl Draft {
    pub fn new(payload: &str) -> Self {
        Self {
            payload: text_area(payload),
            key: Input::default(),
            focus: DraftField::Payload,
        }
    }

    pub fn payload_text(&self) -> String {
        self.payload.lines().join("\n")
    }

    pub fn set_payload(&mut self, text: &str) {
        self.payload = text_area(text);
    }

    /// Trimmed key, `None` when blank.
    pub fn key_value(&self) -> Option<&str> {
        Some(self.key.value().trim()).filter(|k| !k.is_empty())
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            DraftField::Payload => DraftField::Key,
            DraftField::Key => DraftField::Payload,
        };
    }
}

fn text_area(text: &str) -> TextArea<'static> {
    let mut area = TextArea::from(text.lines().map(str::to_string));
    area.set_cursor_line_style(Style::default());
    area
}

#[derive(Debug, Clone)]
pub struct DraftState {
    pub draft: Draft,
    pub topic: String,
}

#[derive(Debug, Clone)]
pub struct SendingState {
    pub draft: DraftState,
    pub tag: RequestTag,
}

#[derive(Debug, Clone)]
pub struct SaveDraftState {
    pub draft: DraftState,
    pub name: Input,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoadDraftState {
    pub draft: DraftState,
    pub entries: Vec<DraftEntry>,
    pub selected: usize,
    pub loading: bool,
    pub error: Option<String>,
}

/// A consumed message ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub partition: i32,
    pub offset: i64,
    pub timestamp: String,
    pub key: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumePhase {
    Opening,
    Fetching,
    Idle,
}

#[derive(Debug)]
pub struct ConsumeState {
    pub topic: String,
    pub tag: RequestTag,
    /// `None` while opening, while a fetch owns it, or after opening failed.
    pub consumer: Option<ConsumerHandle>,
    pub phase: ConsumePhase,
    pub messages: Vec<RenderedMessage>,
    pub index: usize,
}

impl ConsumeState {
    pub fn current(&self) -> Option<&RenderedMessage> {
        self.messages.get(self.index)
    }
}

/// High-level application mode.
#[derive(Debug, Default, strum::IntoStaticStr)]
pub enum Mode {
    #[default]
    Loading,
    Browsing,
    Searching(SearchState),
    Viewing(ViewingState),
    SendDraft(DraftState),
    Sending(SendingState),
    SaveDraft(SaveDraftState),
    LoadDraft(LoadDraftState),
    Consuming(ConsumeState),
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Loading => "loading",
            Mode::Browsing => "browse",
            Mode::Searching(_) => "search",
            Mode::Viewing(_) => "view",
            Mode::SendDraft(_) => "draft",
            Mode::Sending(_) => "sending",
            Mode::SaveDraft(_) => "save",
            Mode::LoadDraft(_) => "load",
            Mode::Consuming(_) => "consume",
        }
    }

    /// Modes that claim every key for themselves.
    pub fn is_exclusive(&self) -> bool {
        !matches!(self, Mode::Loading | Mode::Browsing | Mode::Viewing(_))
    }
}

/// One-line feedback under the panes. Key presses clear `notice` and `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusLine {
    pub busy: Option<String>,
    pub notice: Option<String>,
    pub error: Option<String>,
}

impl StatusLine {
    pub fn clear_messages(&mut self) {
        self.notice = None;
        self.error = None;
    }

    pub fn notice(&mut self, msg: impl Into<String>) {
        self.error = None;
        self.notice = Some(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.notice = None;
        self.error = Some(msg.into());
    }
}

#[derive(Debug)]
pub struct RootState {
    pub mode: Mode,
    pub subjects: SubjectBrowser,
    pub schema: Option<SchemaContext>,
    pub pending_fetch: Option<RequestTag>,
    pub pane: Pane,
    pub status: StatusLine,
    pub profile: String,
    pub broker_configured: bool,
    pub should_quit: bool,
    next_seq: u64,
}

impl RootState {
    pub fn new(profile: impl Into<String>, broker_configured: bool) -> Self {
        Self {
            mode: Mode::Loading,
            subjects: SubjectBrowser::default(),
            schema: None,
            pending_fetch: None,
            pane: Pane::List,
            status: StatusLine {
                busy: Some("Loading subjects…".into()),
                ..Default::default()
            },
            profile: profile.into(),
            broker_configured,
            should_quit: false,
            next_seq: 0,
        }
    }

    pub fn next_tag(&mut self, subject: &str, schema_id: Option<u32>) -> RequestTag {
        self.next_seq += 1;
        RequestTag {
            seq: self.next_seq,
            subject: subject.to_string(),
            schema_id,
        }
    }

    /// Takes the mode out, leaving `Loading` in its place until the caller
    /// puts the next one back.
    pub fn take_mode(&mut self) -> Mode {
        std::mem::take(&mut self.mode)
    }
}
