//! Interactive profile selection for `--select-config`.
//!
//! Runs its own small loop on the shared [`Tui`] before the main loop starts.
//! `n` and `e` open the [`ProfileEditor`]; saved profiles are written back to
//! the profile file right away.

use std::path::Path;

use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Layout},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use tracing::info;

use crate::config::{write_config_file, ConfigFile};
use crate::tui::{Event, Tui};
use crate::ui::profile_editor::{EditorOutcome, ProfileEditor};
use crate::ui::theme::{Theme, UiGroup};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerOutcome {
    Pending,
    Chosen(String),
    Create,
    Edit(String),
    Cancelled,
}

/// Selection state: `(key, display name)` rows, default profile first.
#[derive(Debug, Clone)]
pub struct ProfilePicker {
    rows: Vec<(String, String)>,
    default: String,
    selected: usize,
}

impl ProfilePicker {
    pub fn new(file: &ConfigFile) -> Self {
        let rows = file
            .ordered_profiles()
            .into_iter()
            .map(|key| {
                let name = file
                    .profiles
                    .get(key)
                    .map(|p| p.name.clone())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| key.to_string());
                (key.to_string(), name)
            })
            .collect();
        Self {
            rows,
            default: file.default.clone(),
            selected: 0,
        }
    }

    pub fn selected_key(&self) -> Option<&str> {
        self.rows.get(self.selected).map(|(key, _)| key.as_str())
    }

    /// Move the cursor onto `key` if it is listed.
    pub fn select(&mut self, key: &str) {
        if let Some(idx) = self.rows.iter().position(|(k, _)| k == key) {
            self.selected = idx;
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> PickerOutcome {
        let last = self.rows.len().saturating_sub(1);
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return PickerOutcome::Cancelled,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return PickerOutcome::Cancelled
            }
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => self.selected = (self.selected + 1).min(last),
            KeyCode::Enter => {
                if let Some(key) = self.selected_key() {
                    return PickerOutcome::Chosen(key.to_string());
                }
            }
            KeyCode::Char('n') => return PickerOutcome::Create,
            KeyCode::Char('e') => {
                if let Some(key) = self.selected_key() {
                    return PickerOutcome::Edit(key.to_string());
                }
            }
            _ => {}
        }
        PickerOutcome::Pending
    }

    pub fn draw(&self, frame: &mut Frame<'_>, theme: &Theme) {
        let [list_area, help_area] =
            Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]).areas(frame.area());

        let items: Vec<ListItem> = self
            .rows
            .iter()
            .map(|(key, name)| {
                let mut spans = vec![Span::raw(format!("{name:<24}")), Span::styled(key.clone(), theme.style(UiGroup::Dimmed))];
                if *key == self.default {
                    spans.push(Span::styled("  (default)", theme.style(UiGroup::Info)));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.style(UiGroup::BorderFocused))
                    .title(" Select configuration profile ")
                    .title_style(theme.style(UiGroup::Title)),
            )
            .style(theme.style(UiGroup::Text))
            .highlight_style(theme.style(UiGroup::Selected))
            .highlight_symbol("▸ ");
        let mut state = ListState::default().with_selected(Some(self.selected));
        frame.render_stateful_widget(list, list_area, &mut state);

        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(" enter", theme.style(UiGroup::KeyHint)),
                Span::styled(" use ", theme.style(UiGroup::Dimmed)),
                Span::styled(" n", theme.style(UiGroup::KeyHint)),
                Span::styled(" new ", theme.style(UiGroup::Dimmed)),
                Span::styled(" e", theme.style(UiGroup::KeyHint)),
                Span::styled(" edit ", theme.style(UiGroup::Dimmed)),
                Span::styled(" esc", theme.style(UiGroup::KeyHint)),
                Span::styled(" cancel ", theme.style(UiGroup::Dimmed)),
            ])),
            help_area,
        );
    }
}

/// Picker plus the editor it may have open. Saving goes through `path`.
struct Selector<'a> {
    file: &'a mut ConfigFile,
    path: &'a Path,
    picker: ProfilePicker,
    editor: Option<ProfileEditor>,
}

impl Selector<'_> {
    fn handle_key(&mut self, key: KeyEvent) -> PickerOutcome {
        let Some(editor) = &mut self.editor else {
            return match self.picker.handle_key(key) {
                PickerOutcome::Create => {
                    self.editor = Some(ProfileEditor::create(self.file));
                    PickerOutcome::Pending
                }
                PickerOutcome::Edit(key) => {
                    self.editor = ProfileEditor::edit(self.file, &key);
                    PickerOutcome::Pending
                }
                other => other,
            };
        };
        match editor.handle_key(key) {
            EditorOutcome::Pending => {}
            EditorOutcome::Cancelled => self.editor = None,
            EditorOutcome::Saved { key, replaces, profile } => {
                let mut updated = self.file.clone();
                updated.upsert_profile(&key, replaces.as_deref(), profile);
                match write_config_file(self.path, &updated) {
                    Ok(()) => {
                        info!(profile = %key, path = %self.path.display(), "profile saved");
                        *self.file = updated;
                        self.picker = ProfilePicker::new(self.file);
                        self.picker.select(&key);
                        self.editor = None;
                    }
                    Err(err) => editor.set_error(err.to_string()),
                }
            }
        }
        PickerOutcome::Pending
    }

    fn draw(&self, frame: &mut Frame<'_>, theme: &Theme) {
        match &self.editor {
            Some(editor) => editor.draw(frame, theme),
            None => self.picker.draw(frame, theme),
        }
    }
}

/// Run the picker until a profile is chosen (`Some`) or the user cancels
/// (`None`). Profiles created or edited on the way are saved to `path` and
/// reflected in `file`.
pub async fn pick(tui: &mut Tui, file: &mut ConfigFile, path: &Path, theme: &Theme) -> Result<Option<String>> {
    let picker = ProfilePicker::new(file);
    let mut selector = Selector {
        file,
        path,
        picker,
        editor: None,
    };
    tui.draw(|f| selector.draw(f, theme))?;
    while let Some(event) = tui.next().await {
        match event {
            Event::Key(key) => {
                match selector.handle_key(key) {
                    PickerOutcome::Chosen(key) => return Ok(Some(key)),
                    PickerOutcome::Cancelled => return Ok(None),
                    _ => {}
                }
                tui.draw(|f| selector.draw(f, theme))?;
            }
            Event::Render | Event::Resize(..) => {
                tui.draw(|f| selector.draw(f, theme))?;
            }
            _ => {}
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileConfig;

    fn file() -> ConfigFile {
        let mut file = ConfigFile::starter();
        for key in ["zeta", "alpha"] {
            file.profiles.insert(
                key.into(),
                ProfileConfig {
                    name: format!("{key} cluster"),
                    ..Default::default()
                },
            );
        }
        file.default = "zeta".into();
        file
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn default_profile_is_preselected() {
        let picker = ProfilePicker::new(&file());
        assert_eq!(picker.selected_key(), Some("zeta"));
    }

    #[test]
    fn navigation_and_choice() {
        let mut picker = ProfilePicker::new(&file());
        assert_eq!(picker.handle_key(press(KeyCode::Down)), PickerOutcome::Pending);
        assert_eq!(
            picker.handle_key(press(KeyCode::Enter)),
            PickerOutcome::Chosen("alpha".into())
        );
        assert_eq!(picker.handle_key(press(KeyCode::Esc)), PickerOutcome::Cancelled);
    }

    #[test]
    fn new_and_edit_keys_ask_for_the_editor() {
        let mut picker = ProfilePicker::new(&file());
        assert_eq!(picker.handle_key(press(KeyCode::Char('n'))), PickerOutcome::Create);
        assert_eq!(
            picker.handle_key(press(KeyCode::Char('e'))),
            PickerOutcome::Edit("zeta".into())
        );
    }

    fn type_into(selector: &mut Selector<'_>, text: &str) {
        selector.handle_key(press(KeyCode::Enter));
        for c in text.chars() {
            selector.handle_key(press(KeyCode::Char(c)));
        }
        selector.handle_key(press(KeyCode::Enter));
    }

    #[test]
    fn created_profile_is_saved_and_selected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let mut file = file();
        let mut selector = Selector {
            picker: ProfilePicker::new(&file),
            file: &mut file,
            path: &path,
            editor: None,
        };

        selector.handle_key(press(KeyCode::Char('n')));
        assert!(selector.editor.is_some());
        type_into(&mut selector, "beta");
        selector.handle_key(press(KeyCode::Down));
        selector.handle_key(press(KeyCode::Down));
        type_into(&mut selector, "http://registry.beta:8081");
        selector.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL));

        assert!(selector.editor.is_none());
        assert_eq!(selector.picker.selected_key(), Some("beta"));
        assert_eq!(
            selector.handle_key(press(KeyCode::Enter)),
            PickerOutcome::Chosen("beta".into())
        );

        let saved = crate::config::load_config_file(&path).unwrap();
        assert_eq!(saved.default, "zeta");
        assert_eq!(saved.profiles["beta"].schema_registry.url, "http://registry.beta:8081");
        assert_eq!(&saved, &*selector.file);
    }

    #[test]
    fn failed_save_keeps_the_editor_open() {
        let tmp = tempfile::tempdir().unwrap();
        // a directory where the file should be
        let path = tmp.path().to_path_buf();
        let mut file = file();
        if let Some(zeta) = file.profiles.get_mut("zeta") {
            zeta.schema_registry.url = "http://zeta:8081".into();
        }
        let before = file.clone();
        let mut selector = Selector {
            picker: ProfilePicker::new(&file),
            file: &mut file,
            path: &path,
            editor: None,
        };

        selector.handle_key(press(KeyCode::Char('e')));
        selector.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL));
        let editor = selector.editor.as_ref().unwrap();
        assert!(editor.error().unwrap_or_default().starts_with("writing"), "{:?}", editor.error());
        assert_eq!(&*selector.file, &before);
    }
}
