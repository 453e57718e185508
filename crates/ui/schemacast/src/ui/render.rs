//! Rendering.
//!
//! Pure function of `&RootState` and `&Theme`: nothing here mutates state or
//! decides anything. Layout:
//!
//! ```text
//! +-----------+------------------------+
//! | subjects  | schema / draft editor  |   1/3 : 2/3
//! +-----------+------------------------+
//! | status line                        |
//! | key hints                          |
//! +------------------------------------+
//! ```
//!
//! Consuming, Save-draft and Load-draft take over the whole content area.

use chrono::{DateTime, Local};
use ratatui::{
    layout::{Constraint, Layout, Position, Rect},
    style::Style,
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use tui_input::Input;

use crate::core::state::{
    ConsumePhase, ConsumeState, DraftField, DraftState, LoadDraftState, Mode, Pane, RootState,
    SaveDraftState, SchemaContext,
};
use crate::ui::keymap;
use crate::ui::theme::{Theme, UiGroup};

pub fn draw(frame: &mut Frame<'_>, state: &RootState, theme: &Theme) {
    let [content, status, help] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    match &state.mode {
        Mode::Consuming(consume) => draw_consume(frame, content, state, consume, theme),
        Mode::SaveDraft(form) => draw_save(frame, content, form, theme),
        Mode::LoadDraft(form) => draw_load(frame, content, form, theme),
        _ => {
            let [list, viewer] =
                Layout::horizontal([Constraint::Ratio(1, 3), Constraint::Ratio(2, 3)]).areas(content);
            draw_subjects(frame, list, state, theme);
            draw_viewer(frame, viewer, state, theme);
        }
    }

    draw_status(frame, status, state, theme);
    draw_help(frame, help, state, theme);
}

fn block<'a>(title: impl Into<Line<'a>>, focused: bool, theme: &Theme) -> Block<'a> {
    let border = if focused {
        UiGroup::BorderFocused
    } else {
        UiGroup::Border
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(theme.style(border))
        .title(title)
        .title_style(theme.style(UiGroup::Title))
}

fn draw_subjects(frame: &mut Frame<'_>, area: Rect, state: &RootState, theme: &Theme) {
    let browser = &state.subjects;
    let visible = browser.visible();
    let focused = state.pane == Pane::List && !state.mode.is_exclusive();
    let title = format!(" Subjects {}/{} ", visible.len(), browser.total());
    let outer = block(title, focused || matches!(state.mode, Mode::Searching(_)), theme);
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let (filter_area, list_area) = if matches!(state.mode, Mode::Searching(_)) || !browser.query().is_empty() {
        let [f, l] = Layout::vertical([Constraint::Length(1), Constraint::Fill(1)]).areas(inner);
        (Some(f), l)
    } else {
        (None, inner)
    };

    if let Some(filter_area) = filter_area {
        match &state.mode {
            Mode::Searching(search) => draw_input(frame, filter_area, "/", &search.input, true, theme),
            _ => frame.render_widget(
                Paragraph::new(Line::from(vec![
                    Span::styled("/", theme.style(UiGroup::KeyHint)),
                    Span::styled(browser.query().to_string(), theme.style(UiGroup::Dimmed)),
                ])),
                filter_area,
            ),
        }
    }

    if !browser.loaded {
        frame.render_widget(
            Paragraph::new("loading…").style(theme.style(UiGroup::Dimmed)),
            list_area,
        );
        return;
    }
    if visible.is_empty() {
        let msg = if browser.total() == 0 {
            "no subjects"
        } else {
            "no match"
        };
        frame.render_widget(Paragraph::new(msg).style(theme.style(UiGroup::Dimmed)), list_area);
        return;
    }

    let items: Vec<ListItem> = visible.iter().map(|s| ListItem::new(s.to_string())).collect();
    let list = List::new(items)
        .style(theme.style(UiGroup::Text))
        .highlight_style(theme.style(UiGroup::Selected))
        .highlight_symbol("▸ ");
    let mut list_state = ListState::default().with_selected(Some(browser.selected_index()));
    frame.render_stateful_widget(list, list_area, &mut list_state);
}

fn draw_viewer(frame: &mut Frame<'_>, area: Rect, state: &RootState, theme: &Theme) {
    match &state.mode {
        Mode::SendDraft(draft) => draw_draft(frame, area, draft, false, theme),
        Mode::Sending(sending) => draw_draft(frame, area, &sending.draft, true, theme),
        Mode::Viewing(view) => {
            if let Some(ctx) = &state.schema {
                draw_schema(frame, area, ctx, view.scroll, state.pane == Pane::Viewer, theme);
            }
        }
        Mode::Searching(_) if state.schema.is_some() => {
            if let Some(ctx) = &state.schema {
                draw_schema(frame, area, ctx, 0, false, theme);
            }
        }
        _ => {
            let outer = block(" Schema ", state.pane == Pane::Viewer, theme);
            let hint = if state.pending_fetch.is_some() {
                "fetching…"
            } else {
                "Select a subject and press enter"
            };
            frame.render_widget(
                Paragraph::new(hint)
                    .style(theme.style(UiGroup::Dimmed))
                    .block(outer),
                area,
            );
        }
    }
}

fn draw_schema(
    frame: &mut Frame<'_>,
    area: Rect,
    ctx: &SchemaContext,
    scroll: u16,
    focused: bool,
    theme: &Theme,
) {
    let title = format!(" {} v{} (id {}) ", ctx.subject, ctx.version, ctx.id);
    let mut lines: Vec<Line> = Vec::new();
    if let Err(err) = ctx.compiled() {
        lines.push(Line::styled(format!("⚠ {err}"), theme.style(UiGroup::Warn)));
        lines.push(Line::default());
    }
    lines.extend(ctx.pretty.lines().map(|l| Line::styled(l.to_string(), theme.style(UiGroup::Text))));
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .block(block(title, focused, theme))
            .scroll((scroll, 0)),
        area,
    );
}

fn draw_draft(frame: &mut Frame<'_>, area: Rect, ds: &DraftState, sending: bool, theme: &Theme) {
    let [payload_area, key_area] =
        Layout::vertical([Constraint::Fill(1), Constraint::Length(3)]).areas(area);

    let payload_title = if sending {
        format!(" Publishing to {}… ", ds.topic)
    } else {
        format!(" Payload → {} ", ds.topic)
    };
    let payload_focused = !sending && ds.draft.focus == DraftField::Payload;
    let outer = block(payload_title, payload_focused, theme);
    let inner = outer.inner(payload_area);
    frame.render_widget(outer, payload_area);
    frame.render_widget(&ds.draft.payload, inner);

    let key_focused = !sending && ds.draft.focus == DraftField::Key;
    let outer = block(" Key (optional) ", key_focused, theme);
    let inner = outer.inner(key_area);
    frame.render_widget(outer, key_area);
    draw_input(frame, inner, "", &ds.draft.key, key_focused, theme);
}

/// Single-line input with horizontal scroll and, when focused, the cursor.
fn draw_input(frame: &mut Frame<'_>, area: Rect, prefix: &str, input: &Input, focused: bool, theme: &Theme) {
    let prefix_len = prefix.chars().count() as u16;
    let width = area.width.saturating_sub(prefix_len).max(1) as usize;
    let scroll = input.visual_scroll(width);
    let line = Line::from(vec![
        Span::styled(prefix.to_string(), theme.style(UiGroup::KeyHint)),
        Span::styled(input.value().to_string(), theme.style(UiGroup::Text)),
    ]);
    frame.render_widget(Paragraph::new(line).scroll((0, scroll as u16)), area);
    if focused {
        let offset = input.visual_cursor().saturating_sub(scroll) as u16;
        frame.set_cursor_position(Position::new(area.x + prefix_len + offset, area.y));
    }
}

fn draw_consume(frame: &mut Frame<'_>, area: Rect, state: &RootState, consume: &ConsumeState, theme: &Theme) {
    let phase = match consume.phase {
        ConsumePhase::Opening => "opening…",
        ConsumePhase::Fetching => "fetching…",
        ConsumePhase::Idle if consume.consumer.is_none() => "not connected",
        ConsumePhase::Idle => "idle",
    };
    let schema = state
        .schema
        .as_ref()
        .map(|ctx| format!(" · {} (id {})", ctx.subject, ctx.id))
        .unwrap_or_default();
    let outer = block(format!(" Consuming {}{schema} · {phase} ", consume.topic), true, theme);
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    if consume.messages.is_empty() {
        frame.render_widget(
            Paragraph::new("No messages. Press enter to fetch.").style(theme.style(UiGroup::Dimmed)),
            inner,
        );
        return;
    }

    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Length(28), Constraint::Fill(1)]).areas(inner);

    let items: Vec<ListItem> = consume
        .messages
        .iter()
        .map(|m| ListItem::new(format!("p{} @ {}", m.partition, m.offset)))
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::RIGHT).border_style(theme.style(UiGroup::Border)))
        .style(theme.style(UiGroup::Text))
        .highlight_style(theme.style(UiGroup::Selected))
        .highlight_symbol("▸ ");
    let mut list_state = ListState::default().with_selected(Some(consume.index));
    frame.render_stateful_widget(list, list_area, &mut list_state);

    if let Some(message) = consume.current() {
        let label = theme.style(UiGroup::Dimmed);
        let mut lines = vec![
            Line::from(vec![
                Span::styled("partition ", label),
                Span::raw(message.partition.to_string()),
                Span::styled("  offset ", label),
                Span::raw(message.offset.to_string()),
            ]),
            Line::from(vec![Span::styled("time ", label), Span::raw(message.timestamp.clone())]),
            Line::from(vec![
                Span::styled("key ", label),
                Span::raw(message.key.clone().unwrap_or_else(|| "∅".into())),
            ]),
            Line::default(),
        ];
        lines.extend(message.value.lines().map(|l| Line::styled(l.to_string(), theme.style(UiGroup::Text))));
        frame.render_widget(
            Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false }),
            detail_area.inner(ratatui::layout::Margin::new(1, 0)),
        );
    }
}

fn draw_save(frame: &mut Frame<'_>, area: Rect, form: &SaveDraftState, theme: &Theme) {
    let outer = block(format!(" Save draft · {} ", form.draft.topic), true, theme);
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let [label, input, error, _, preview] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Fill(1),
    ])
    .areas(inner);

    frame.render_widget(
        Paragraph::new("Name (leave empty for a timestamp):").style(theme.style(UiGroup::Dimmed)),
        label,
    );
    draw_input(frame, input, "> ", &form.name, true, theme);
    if let Some(err) = &form.error {
        frame.render_widget(Paragraph::new(err.as_str()).style(theme.style(UiGroup::Error)), error);
    }
    frame.render_widget(
        Paragraph::new(form.draft.draft.payload_text()).style(theme.style(UiGroup::Dimmed)),
        preview,
    );
}

fn draw_load(frame: &mut Frame<'_>, area: Rect, form: &LoadDraftState, theme: &Theme) {
    let outer = block(format!(" Load draft · {} ", form.draft.topic), true, theme);
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let [list_area, error_area] =
        Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]).areas(inner);

    if let Some(err) = &form.error {
        frame.render_widget(Paragraph::new(err.as_str()).style(theme.style(UiGroup::Error)), error_area);
    }
    if form.loading {
        frame.render_widget(Paragraph::new("loading…").style(theme.style(UiGroup::Dimmed)), list_area);
        return;
    }
    if form.entries.is_empty() {
        frame.render_widget(
            Paragraph::new("No saved drafts for this topic.").style(theme.style(UiGroup::Dimmed)),
            list_area,
        );
        return;
    }

    let items: Vec<ListItem> = form
        .entries
        .iter()
        .map(|entry| {
            let modified: DateTime<Local> = entry.modified.into();
            ListItem::new(Line::from(vec![
                Span::raw(format!("{:<40}", entry.name)),
                Span::styled(
                    modified.format("%Y-%m-%d %H:%M:%S").to_string(),
                    theme.style(UiGroup::Dimmed),
                ),
            ]))
        })
        .collect();
    let list = List::new(items)
        .style(theme.style(UiGroup::Text))
        .highlight_style(theme.style(UiGroup::Selected))
        .highlight_symbol("▸ ");
    let mut list_state = ListState::default().with_selected(Some(form.selected));
    frame.render_stateful_widget(list, list_area, &mut list_state);
}

fn draw_status(frame: &mut Frame<'_>, area: Rect, state: &RootState, theme: &Theme) {
    let mut spans = vec![
        Span::styled(
            format!(" {} ", state.mode.label().to_uppercase()),
            theme.style(UiGroup::ModeChip),
        ),
        Span::styled(format!(" {} ", state.profile), theme.chip_style()),
        Span::raw(" "),
    ];
    if let Some(err) = &state.status.error {
        spans.push(Span::styled(err.clone(), theme.style(UiGroup::Error)));
    } else if let Some(notice) = &state.status.notice {
        spans.push(Span::styled(notice.clone(), theme.style(UiGroup::Success)));
    } else if let Some(busy) = &state.status.busy {
        spans.push(Span::styled(busy.clone(), theme.style(UiGroup::Info)));
    }
    if !state.broker_configured {
        spans.push(Span::styled("  (no broker)", theme.style(UiGroup::Warn)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_help(frame: &mut Frame<'_>, area: Rect, state: &RootState, theme: &Theme) {
    let spans: Vec<Span> = keymap::hints(state)
        .iter()
        .flat_map(|(key, what)| {
            [
                Span::styled(format!(" {key}"), theme.style(UiGroup::KeyHint)),
                Span::styled(format!(" {what} "), theme.style(UiGroup::Dimmed)),
            ]
        })
        .collect();
    frame.render_widget(Paragraph::new(Line::from(spans)).style(Style::default()), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{Draft, ViewingState};
    use crate::services::registry::SubjectSchema;
    use ratatui::{backend::TestBackend, Terminal};

    fn screen(state: &RootState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal
            .draw(|f| draw(f, state, &Theme::default()))
            .unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn with_schema() -> RootState {
        let mut state = RootState::new("staging", true);
        state.subjects.set_subjects(vec!["orders-value".into()]);
        state.schema = Some(SchemaContext::from_registry(SubjectSchema {
            subject: "orders-value".into(),
            version: 2,
            id: 11,
            schema_type: None,
            schema: r#"{"type":"string"}"#.into(),
        }));
        state
    }

    #[test]
    fn viewing_shows_schema_and_profile() {
        let mut state = with_schema();
        state.mode = Mode::Viewing(ViewingState::default());
        let text = screen(&state);
        assert!(text.contains("orders-value v2 (id 11)"), "{text}");
        assert!(text.contains("\"type\": \"string\""));
        assert!(text.contains("staging"));
        assert!(text.contains("consume"));
    }

    #[test]
    fn draft_editor_names_the_topic() {
        let mut state = with_schema();
        state.mode = Mode::SendDraft(DraftState {
            draft: Draft::new("\"\""),
            topic: "orders".into(),
        });
        state.status.error("Validation failed: boom".to_string());
        let text = screen(&state);
        assert!(text.contains("Payload → orders"), "{text}");
        assert!(text.contains("Validation failed: boom"));
    }
}
