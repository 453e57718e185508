//! Workflow engine.
//!
//! Pure transitions over [`RootState`]: an [`Intent`] or an [`InternalEvent`]
//! goes in, the state is updated in place and the follow-up work comes back
//! as a list of [`Effect`]s. Nothing in here blocks, spawns or touches I/O.
//!
//! Policy:
//!   * The current mode is taken out of the state, handled by value and a
//!     (possibly different) mode is put back. Each handler returns both.
//!   * Sending ignores all input; only the publish completion moves it.
//!   * Completions are matched against the tag they were issued with.
//!     Mismatches are dropped at debug level and never reach the status line.
//!   * Background failures become a status error and control stays with the
//!     mode that issued the work. Nothing is retried automatically.

use apache_avro::Schema;
use crossterm::event::{Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::debug;
use tui_input::backend::crossterm::EventHandler;
use tui_input::{Input, InputRequest};

use crate::core::effects::{CopyTarget, Effect, InternalEvent, IoRequest, TaskKind, TaskResult};
use crate::core::intent::Intent;
use crate::core::state::{
    ConsumePhase, ConsumeState, Draft, DraftField, DraftState, LoadDraftState, Mode, Pane,
    RenderedMessage, RootState, SaveDraftState, SchemaContext, SearchState, SendingState,
    ViewingState, PAGE_STEP,
};
use crate::domain::{codec, template};
use crate::services::kafka::{ConsumedMessage, FetchOutcome, OutboundRecord};

/// Upper bound of messages per consume fetch.
pub const CONSUME_BATCH: usize = 10;

/// Effects to run once at startup.
pub fn initial_effects(state: &mut RootState) -> Vec<Effect> {
    state.status.busy = Some("Loading subjects…".into());
    vec![Effect::async_task(TaskKind::ListSubjects)]
}

/// Reduce a user intent.
pub fn reduce_intent(state: &mut RootState, intent: Intent) -> Vec<Effect> {
    if matches!(state.mode, Mode::Sending(_)) {
        return Vec::new();
    }
    match intent {
        Intent::Key(key) => {
            if key.kind == KeyEventKind::Release {
                return Vec::new();
            }
            state.status.clear_messages();
            let mode = state.take_mode();
            let (mode, effects) = match mode {
                Mode::Searching(s) => on_search_key(state, s, key),
                Mode::SendDraft(d) => on_draft_key(state, d, key),
                Mode::SaveDraft(s) => on_save_key(state, s, key),
                Mode::LoadDraft(l) => on_load_key(l, key),
                Mode::Consuming(c) => on_consume_key(state, c, key),
                other => on_main_key(state, other, key),
            };
            state.mode = mode;
            effects
        }
        Intent::Paste(text) => {
            match &mut state.mode {
                Mode::Searching(s) => {
                    insert_line(&mut s.input, &text);
                    let query = s.input.value().to_string();
                    state.subjects.set_query(&query);
                }
                Mode::SendDraft(d) => match d.draft.focus {
                    DraftField::Payload => {
                        d.draft.payload.insert_str(text);
                    }
                    DraftField::Key => insert_line(&mut d.draft.key, &text),
                },
                Mode::SaveDraft(s) => insert_line(&mut s.name, &text),
                _ => {}
            }
            Vec::new()
        }
    }
}

/// Reduce a system event (task completion or local I/O outcome).
pub fn reduce_internal(state: &mut RootState, event: InternalEvent) -> Vec<Effect> {
    match event {
        InternalEvent::Task(result) => on_task_result(state, result),
        InternalEvent::DraftSaved(result) => {
            let Mode::SaveDraft(form) = &mut state.mode else {
                debug!("draft save outcome outside the save form; dropped");
                return Vec::new();
            };
            match result {
                Ok(path) => {
                    if let Mode::SaveDraft(form) = state.take_mode() {
                        state.mode = Mode::SendDraft(form.draft);
                    }
                    state.status.notice(format!("Draft saved to {}", path.display()));
                }
                Err(err) => form.error = Some(err),
            }
            Vec::new()
        }
        InternalEvent::DraftsListed { topic, result } => {
            match &mut state.mode {
                Mode::LoadDraft(form) if form.draft.topic == topic => {
                    form.loading = false;
                    match result {
                        Ok(entries) => {
                            form.entries = entries;
                            form.selected = 0;
                        }
                        Err(err) => form.error = Some(err),
                    }
                }
                _ => debug!(%topic, "draft listing no longer wanted; dropped"),
            }
            Vec::new()
        }
        InternalEvent::DraftLoaded(result) => {
            let Mode::LoadDraft(form) = &mut state.mode else {
                debug!("draft load outcome outside the load form; dropped");
                return Vec::new();
            };
            match result {
                Ok(saved) => {
                    if let Mode::LoadDraft(form) = state.take_mode() {
                        let mut draft = form.draft;
                        draft.draft.set_payload(&saved.payload);
                        draft.draft.key = Input::new(saved.key.clone().unwrap_or_default());
                        draft.draft.focus = DraftField::Payload;
                        if saved.topic != draft.topic {
                            state.status.notice(format!(
                                "Loaded draft {} (saved for topic {})",
                                saved.name, saved.topic
                            ));
                        } else {
                            state.status.notice(format!("Loaded draft {}", saved.name));
                        }
                        state.mode = Mode::SendDraft(draft);
                    }
                }
                Err(err) => form.error = Some(err),
            }
            Vec::new()
        }
        InternalEvent::EditorClosed(result) => {
            let Mode::SendDraft(d) = &mut state.mode else {
                debug!("editor closed outside the draft editor; dropped");
                return Vec::new();
            };
            match result {
                Ok(text) => {
                    d.draft.set_payload(text.trim_end_matches('\n'));
                    d.draft.focus = DraftField::Payload;
                    state.status.notice("Payload updated from editor");
                }
                Err(err) => state.status.error(format!("Editor: {err}")),
            }
            Vec::new()
        }
        InternalEvent::Copied { what, result } => {
            match result {
                Ok(()) => state.status.notice(format!("Copied {what} to clipboard")),
                Err(err) => state.status.error(format!("Clipboard: {err}")),
            }
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Key handlers
// ---------------------------------------------------------------------------

fn plain(key: &KeyEvent, c: char) -> bool {
    key.code == KeyCode::Char(c)
        && !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
}

fn ctrl(key: &KeyEvent, c: char) -> bool {
    key.code == KeyCode::Char(c) && key.modifiers.contains(KeyModifiers::CONTROL)
}

/// Loading, Browsing and Viewing share the global bindings.
fn on_main_key(state: &mut RootState, mut mode: Mode, key: KeyEvent) -> (Mode, Vec<Effect>) {
    if plain(&key, 'q') || ctrl(&key, 'c') {
        state.should_quit = true;
        return (mode, Vec::new());
    }
    if plain(&key, '/') {
        let input = Input::new(state.subjects.query().to_string());
        return (Mode::Searching(SearchState { input }), Vec::new());
    }
    if key.code == KeyCode::Tab {
        state.pane = state.pane.toggle();
        return (mode, Vec::new());
    }
    if plain(&key, 'y') {
        let effects = match &state.schema {
            Some(ctx) => vec![Effect::Io(IoRequest::Copy {
                what: CopyTarget::Schema,
                text: ctx.pretty.clone(),
            })],
            None => {
                state.status.error("No schema loaded");
                Vec::new()
            }
        };
        return (mode, effects);
    }
    if plain(&key, 'R') {
        state.status.busy = Some("Loading subjects…".into());
        return (mode, vec![Effect::async_task(TaskKind::ListSubjects)]);
    }

    if let Mode::Viewing(_) = mode {
        if plain(&key, 'e') || plain(&key, 's') {
            return enter_draft(state, mode, false);
        }
        if plain(&key, 'E') {
            return enter_draft(state, mode, true);
        }
        if plain(&key, 'c') {
            return enter_consume(state, mode);
        }
    }

    match state.pane {
        Pane::List => {
            let effects = on_list_key(state, &key);
            (mode, effects)
        }
        Pane::Viewer => {
            if let Mode::Viewing(view) = &mut mode {
                scroll_viewer(view, &key);
            }
            (mode, Vec::new())
        }
    }
}

fn on_list_key(state: &mut RootState, key: &KeyEvent) -> Vec<Effect> {
    let page = PAGE_STEP as isize;
    match key.code {
        KeyCode::Up => state.subjects.move_by(-1),
        KeyCode::Down => state.subjects.move_by(1),
        KeyCode::PageUp => state.subjects.move_by(-page),
        KeyCode::PageDown => state.subjects.move_by(page),
        KeyCode::Char('k') if plain(key, 'k') => state.subjects.move_by(-1),
        KeyCode::Char('j') if plain(key, 'j') => state.subjects.move_by(1),
        KeyCode::Char('u') if ctrl(key, 'u') => state.subjects.move_by(-page),
        KeyCode::Char('d') if ctrl(key, 'd') => state.subjects.move_by(page),
        KeyCode::Enter => return fetch_selected(state),
        _ => {}
    }
    Vec::new()
}

fn scroll_viewer(view: &mut ViewingState, key: &KeyEvent) {
    let page = PAGE_STEP as u16;
    match key.code {
        KeyCode::Up => view.scroll = view.scroll.saturating_sub(1),
        KeyCode::Down => view.scroll = view.scroll.saturating_add(1),
        KeyCode::PageUp => view.scroll = view.scroll.saturating_sub(page),
        KeyCode::PageDown => view.scroll = view.scroll.saturating_add(page),
        KeyCode::Home => view.scroll = 0,
        KeyCode::Char('k') if plain(key, 'k') => view.scroll = view.scroll.saturating_sub(1),
        KeyCode::Char('j') if plain(key, 'j') => view.scroll = view.scroll.saturating_add(1),
        KeyCode::Char('g') if plain(key, 'g') => view.scroll = 0,
        _ => {}
    }
}

/// Request the selected subject's latest schema. Supersedes any fetch in flight.
fn fetch_selected(state: &mut RootState) -> Vec<Effect> {
    let Some(subject) = state.subjects.selected().map(str::to_string) else {
        return Vec::new();
    };
    let tag = state.next_tag(&subject, None);
    state.pending_fetch = Some(tag.clone());
    state.status.busy = Some(format!("Fetching {subject}…"));
    vec![Effect::async_task(TaskKind::FetchSchema { tag })]
}

/// The schema context must be present and compiled before leaving Viewing.
fn usable_schema(state: &RootState) -> Result<(&SchemaContext, &Schema), String> {
    let ctx = state.schema.as_ref().ok_or_else(|| "No schema loaded".to_string())?;
    let schema = ctx.compiled().map_err(str::to_string)?;
    Ok((ctx, schema))
}

/// The context is frozen from here on, so a fetch still in flight is abandoned.
fn leave_for_dependent_mode(state: &mut RootState) {
    if let Some(tag) = state.pending_fetch.take() {
        debug!(seq = tag.seq, subject = %tag.subject, "abandoning schema fetch");
    }
    state.status.busy = None;
}

fn enter_draft(state: &mut RootState, mode: Mode, external: bool) -> (Mode, Vec<Effect>) {
    let prepared = usable_schema(state).and_then(|(ctx, schema)| {
        let payload = template::generate_pretty(schema).map_err(|e| e.to_string())?;
        Ok(DraftState {
            draft: Draft::new(&payload),
            topic: ctx.topic().to_string(),
        })
    });
    match prepared {
        Ok(draft) => {
            leave_for_dependent_mode(state);
            let effects = if external {
                vec![Effect::Io(IoRequest::OpenEditor {
                    text: draft.draft.payload_text(),
                })]
            } else {
                Vec::new()
            };
            (Mode::SendDraft(draft), effects)
        }
        Err(err) => {
            state.status.error(err);
            (mode, Vec::new())
        }
    }
}

fn enter_consume(state: &mut RootState, mode: Mode) -> (Mode, Vec<Effect>) {
    if !state.broker_configured {
        state.status.error("KAFKA_BOOTSTRAP_SERVERS not configured");
        return (mode, Vec::new());
    }
    let target = usable_schema(state)
        .map(|(ctx, _)| (ctx.subject.clone(), ctx.id, ctx.topic().to_string()));
    let (subject, id, topic) = match target {
        Ok(target) => target,
        Err(err) => {
            state.status.error(err);
            return (mode, Vec::new());
        }
    };
    leave_for_dependent_mode(state);
    let tag = state.next_tag(&subject, Some(id));
    state.status.busy = Some(format!("Opening consumer on {topic}…"));
    let effects = vec![Effect::async_task(TaskKind::OpenConsumer {
        tag: tag.clone(),
        topic: topic.clone(),
    })];
    let consume = ConsumeState {
        topic,
        tag,
        consumer: None,
        phase: ConsumePhase::Opening,
        messages: Vec::new(),
        index: 0,
    };
    (Mode::Consuming(consume), effects)
}

fn on_search_key(state: &mut RootState, mut search: SearchState, key: KeyEvent) -> (Mode, Vec<Effect>) {
    match key.code {
        KeyCode::Esc => {
            state.subjects.set_query("");
            (Mode::Browsing, Vec::new())
        }
        KeyCode::Enter => (Mode::Browsing, Vec::new()),
        KeyCode::Up => {
            state.subjects.move_by(-1);
            (Mode::Searching(search), Vec::new())
        }
        KeyCode::Down => {
            state.subjects.move_by(1);
            (Mode::Searching(search), Vec::new())
        }
        _ => {
            search.input.handle_event(&CrosstermEvent::Key(key));
            state.subjects.set_query(search.input.value());
            (Mode::Searching(search), Vec::new())
        }
    }
}

fn on_draft_key(state: &mut RootState, mut ds: DraftState, key: KeyEvent) -> (Mode, Vec<Effect>) {
    if key.code == KeyCode::Esc {
        return (Mode::Viewing(ViewingState::default()), Vec::new());
    }
    if ctrl(&key, 's') {
        return submit(state, ds);
    }
    if ctrl(&key, 'n') {
        let form = SaveDraftState {
            draft: ds,
            name: Input::default(),
            error: None,
        };
        return (Mode::SaveDraft(form), Vec::new());
    }
    if ctrl(&key, 'o') {
        let effects = vec![Effect::Io(IoRequest::ListDrafts {
            topic: ds.topic.clone(),
        })];
        let form = LoadDraftState {
            draft: ds,
            entries: Vec::new(),
            selected: 0,
            loading: true,
            error: None,
        };
        return (Mode::LoadDraft(form), effects);
    }
    if ctrl(&key, 'e') {
        let text = ds.draft.payload_text();
        return (Mode::SendDraft(ds), vec![Effect::Io(IoRequest::OpenEditor { text })]);
    }
    if ctrl(&key, 'y') {
        let text = ds.draft.payload_text();
        let effects = vec![Effect::Io(IoRequest::Copy {
            what: CopyTarget::Payload,
            text,
        })];
        return (Mode::SendDraft(ds), effects);
    }
    if ctrl(&key, 'r') {
        let regenerated = usable_schema(state)
            .and_then(|(_, schema)| template::generate_pretty(schema).map_err(|e| e.to_string()));
        match regenerated {
            Ok(payload) => {
                ds.draft.set_payload(&payload);
                state.status.notice("Payload reset to template");
            }
            Err(err) => state.status.error(err),
        }
        return (Mode::SendDraft(ds), Vec::new());
    }
    if matches!(key.code, KeyCode::Tab | KeyCode::BackTab) {
        ds.draft.toggle_focus();
        return (Mode::SendDraft(ds), Vec::new());
    }

    match ds.draft.focus {
        DraftField::Payload => {
            ds.draft.payload.input(key);
        }
        DraftField::Key => {
            if key.code != KeyCode::Enter {
                ds.draft.key.handle_event(&CrosstermEvent::Key(key));
            }
        }
    }
    (Mode::SendDraft(ds), Vec::new())
}

/// Validate and encode synchronously; only a valid envelope leaves the editor.
fn submit(state: &mut RootState, ds: DraftState) -> (Mode, Vec<Effect>) {
    if !state.broker_configured {
        state.status.error("KAFKA_BOOTSTRAP_SERVERS not configured");
        return (Mode::SendDraft(ds), Vec::new());
    }
    let encoded = usable_schema(state).and_then(|(ctx, schema)| {
        codec::encode_envelope(schema, ctx.id, &ds.draft.payload_text())
            .map(|value| (ctx.subject.clone(), ctx.id, value))
            .map_err(|err| format!("Validation failed: {err}"))
    });
    let (subject, id, value) = match encoded {
        Ok(encoded) => encoded,
        Err(err) => {
            state.status.error(err);
            return (Mode::SendDraft(ds), Vec::new());
        }
    };

    let tag = state.next_tag(&subject, Some(id));
    let record = OutboundRecord {
        topic: ds.topic.clone(),
        key: ds.draft.key_value().map(|k| k.as_bytes().to_vec()),
        value,
    };
    state.status.busy = Some(format!("Publishing to {}…", ds.topic));
    let effects = vec![Effect::async_task(TaskKind::Publish {
        tag: tag.clone(),
        record,
    })];
    (Mode::Sending(SendingState { draft: ds, tag }), effects)
}

fn on_save_key(state: &mut RootState, mut form: SaveDraftState, key: KeyEvent) -> (Mode, Vec<Effect>) {
    match key.code {
        KeyCode::Esc => (Mode::SendDraft(form.draft), Vec::new()),
        KeyCode::Enter => {
            let name = Some(form.name.value().trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            let request = IoRequest::SaveDraft {
                topic: form.draft.topic.clone(),
                schema_id: state.schema.as_ref().map_or(0, |ctx| ctx.id),
                payload: form.draft.draft.payload_text(),
                key: form.draft.draft.key_value().map(str::to_string),
                name,
            };
            form.error = None;
            (Mode::SaveDraft(form), vec![Effect::Io(request)])
        }
        _ => {
            form.name.handle_event(&CrosstermEvent::Key(key));
            form.error = None;
            (Mode::SaveDraft(form), Vec::new())
        }
    }
}

fn on_load_key(mut form: LoadDraftState, key: KeyEvent) -> (Mode, Vec<Effect>) {
    if key.code == KeyCode::Esc || plain(&key, 'q') {
        return (Mode::SendDraft(form.draft), Vec::new());
    }
    let last = form.entries.len().saturating_sub(1);
    match key.code {
        KeyCode::Up => form.selected = form.selected.saturating_sub(1),
        KeyCode::Down => form.selected = (form.selected + 1).min(last),
        KeyCode::Char('k') if plain(&key, 'k') => form.selected = form.selected.saturating_sub(1),
        KeyCode::Char('j') if plain(&key, 'j') => form.selected = (form.selected + 1).min(last),
        KeyCode::Enter => {
            if let Some(entry) = form.entries.get(form.selected) {
                let request = IoRequest::LoadDraft {
                    path: entry.path.clone(),
                };
                form.error = None;
                return (Mode::LoadDraft(form), vec![Effect::Io(request)]);
            }
        }
        _ => {}
    }
    (Mode::LoadDraft(form), Vec::new())
}

fn on_consume_key(state: &mut RootState, mut consume: ConsumeState, key: KeyEvent) -> (Mode, Vec<Effect>) {
    if key.code == KeyCode::Esc {
        state.status.busy = None;
        let effects = consume
            .consumer
            .take()
            .map(Effect::CloseConsumer)
            .into_iter()
            .collect();
        return (Mode::Viewing(ViewingState::default()), effects);
    }
    let last = consume.messages.len().saturating_sub(1);
    match key.code {
        KeyCode::Enter => return request_fetch(state, consume),
        KeyCode::Char('f') if plain(&key, 'f') => return request_fetch(state, consume),
        KeyCode::Up => consume.index = consume.index.saturating_sub(1),
        KeyCode::Down => consume.index = (consume.index + 1).min(last),
        KeyCode::Char('k') if plain(&key, 'k') => consume.index = consume.index.saturating_sub(1),
        KeyCode::Char('j') if plain(&key, 'j') => consume.index = (consume.index + 1).min(last),
        KeyCode::Char('y') if plain(&key, 'y') => {
            if let Some(message) = consume.current() {
                let effects = vec![Effect::Io(IoRequest::Copy {
                    what: CopyTarget::Message,
                    text: message.value.clone(),
                })];
                return (Mode::Consuming(consume), effects);
            }
        }
        _ => {}
    }
    (Mode::Consuming(consume), Vec::new())
}

/// Fetch the next batch, or reopen when the previous open failed.
/// Requests while one is already in flight are ignored.
fn request_fetch(state: &mut RootState, mut consume: ConsumeState) -> (Mode, Vec<Effect>) {
    if consume.phase != ConsumePhase::Idle {
        return (Mode::Consuming(consume), Vec::new());
    }
    let effect = match consume.consumer.take() {
        Some(consumer) => {
            consume.phase = ConsumePhase::Fetching;
            state.status.busy = Some(format!("Fetching from {}…", consume.topic));
            TaskKind::Fetch {
                tag: consume.tag.clone(),
                consumer,
                max: CONSUME_BATCH,
            }
        }
        None => {
            consume.phase = ConsumePhase::Opening;
            state.status.busy = Some(format!("Opening consumer on {}…", consume.topic));
            TaskKind::OpenConsumer {
                tag: consume.tag.clone(),
                topic: consume.topic.clone(),
            }
        }
    };
    (Mode::Consuming(consume), vec![Effect::async_task(effect)])
}

fn insert_line(input: &mut Input, text: &str) {
    for c in text.chars().filter(|c| *c != '\n' && *c != '\r') {
        input.handle(InputRequest::InsertChar(c));
    }
}

// ---------------------------------------------------------------------------
// Task completions
// ---------------------------------------------------------------------------

fn on_task_result(state: &mut RootState, result: TaskResult) -> Vec<Effect> {
    match result {
        TaskResult::SubjectsLoaded(result) => {
            state.status.busy = None;
            match result {
                Ok(subjects) => {
                    let count = subjects.len();
                    state.subjects.set_subjects(subjects);
                    state.status.notice(format!("{count} subjects"));
                }
                Err(err) => state.status.error(format!("Failed to load subjects: {err}")),
            }
            if matches!(state.mode, Mode::Loading) {
                state.mode = Mode::Browsing;
            }
            Vec::new()
        }
        TaskResult::SchemaLoaded { tag, result } => {
            if state.pending_fetch.as_ref() != Some(&tag) {
                debug!(seq = tag.seq, subject = %tag.subject, "stale schema completion dropped");
                return Vec::new();
            }
            state.pending_fetch = None;
            state.status.busy = None;
            match result {
                Ok(found) => {
                    let ctx = SchemaContext::from_registry(found);
                    if let Err(err) = ctx.compiled() {
                        debug!(subject = %ctx.subject, %err, "schema kept uncompiled");
                    }
                    state.schema = Some(ctx);
                    if matches!(state.mode, Mode::Loading | Mode::Browsing | Mode::Viewing(_)) {
                        state.mode = Mode::Viewing(ViewingState::default());
                    }
                }
                Err(err) => state
                    .status
                    .error(format!("Failed to fetch {}: {err}", tag.subject)),
            }
            Vec::new()
        }
        TaskResult::Published { tag, topic, result } => {
            let current = matches!(&state.mode, Mode::Sending(s) if s.tag == tag);
            if !current {
                debug!(seq = tag.seq, %topic, "publish completion without matching send; dropped");
                return Vec::new();
            }
            state.status.busy = None;
            if let Mode::Sending(sending) = state.take_mode() {
                state.mode = match result {
                    Ok(()) => {
                        state.status.notice(format!("Published to {topic}"));
                        Mode::Viewing(ViewingState::default())
                    }
                    Err(err) => {
                        state.status.error(format!("Publish failed: {err}"));
                        Mode::SendDraft(sending.draft)
                    }
                };
            }
            Vec::new()
        }
        TaskResult::ConsumerOpened { tag, result } => {
            let Mode::Consuming(consume) = &mut state.mode else {
                return release_stale(tag.seq, result.ok());
            };
            if consume.tag != tag || consume.phase != ConsumePhase::Opening {
                return release_stale(tag.seq, result.ok());
            }
            match result {
                Ok(consumer) => {
                    consume.phase = ConsumePhase::Fetching;
                    state.status.busy = Some(format!("Fetching from {}…", consume.topic));
                    vec![Effect::async_task(TaskKind::Fetch {
                        tag,
                        consumer,
                        max: CONSUME_BATCH,
                    })]
                }
                Err(err) => {
                    consume.phase = ConsumePhase::Idle;
                    state.status.busy = None;
                    state.status.error(format!("Could not open consumer: {err}"));
                    Vec::new()
                }
            }
        }
        TaskResult::Fetched { tag, consumer, result } => {
            let Mode::Consuming(consume) = &mut state.mode else {
                return release_stale(tag.seq, Some(consumer));
            };
            if consume.tag != tag || consume.phase != ConsumePhase::Fetching {
                return release_stale(tag.seq, Some(consumer));
            }
            consume.consumer = Some(consumer);
            consume.phase = ConsumePhase::Idle;
            state.status.busy = None;
            match result {
                Ok(FetchOutcome::Messages(batch)) => {
                    let (schema, id) = match &state.schema {
                        Some(ctx) => (ctx.compiled().ok(), ctx.id),
                        None => (None, 0),
                    };
                    consume.messages = batch
                        .into_iter()
                        .map(|msg| render_message(schema, id, msg))
                        .collect();
                    consume.index = 0;
                    state
                        .status
                        .notice(format!("Fetched {} message(s)", consume.messages.len()));
                }
                Ok(FetchOutcome::Empty) => {
                    consume.messages.clear();
                    consume.index = 0;
                    state.status.notice("No new messages");
                }
                Ok(FetchOutcome::TimedOut) => {
                    consume.messages.clear();
                    consume.index = 0;
                    state.status.notice("No messages arrived before the timeout");
                }
                Err(err) => state.status.error(format!("Fetch failed: {err}")),
            }
            Vec::new()
        }
    }
}

fn release_stale(seq: u64, consumer: Option<crate::services::ConsumerHandle>) -> Vec<Effect> {
    debug!(seq, "stale consumer completion dropped");
    consumer.map(Effect::CloseConsumer).into_iter().collect()
}

/// Decode a consumed record for display.
pub fn render_message(schema: Option<&Schema>, schema_id: u32, msg: ConsumedMessage) -> RenderedMessage {
    let value = match &msg.value {
        Some(bytes) => codec::describe(schema, schema_id, bytes),
        None => "<tombstone>".to_string(),
    };
    RenderedMessage {
        partition: msg.partition,
        offset: msg.offset,
        timestamp: msg.timestamp.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        key: msg.key.as_deref().map(codec::raw_text),
        value,
    }
}
