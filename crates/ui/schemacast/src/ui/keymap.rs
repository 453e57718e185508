//! Key hints for the help line, per mode.
//!
//! These only describe bindings; the reducer owns the actual dispatch.

use crate::core::state::{DraftField, Mode, Pane, RootState};

pub type Hint = (&'static str, &'static str);

const LIST: &[Hint] = &[
    ("j/k", "move"),
    ("enter", "open"),
    ("/", "search"),
    ("tab", "pane"),
    ("R", "reload"),
    ("q", "quit"),
];

const VIEW_LIST: &[Hint] = &[
    ("j/k", "move"),
    ("enter", "open"),
    ("e", "edit"),
    ("E", "$EDITOR"),
    ("c", "consume"),
    ("y", "copy"),
    ("/", "search"),
    ("tab", "pane"),
    ("q", "quit"),
];

const VIEW_SCROLL: &[Hint] = &[
    ("j/k", "scroll"),
    ("g", "top"),
    ("e", "edit"),
    ("E", "$EDITOR"),
    ("c", "consume"),
    ("y", "copy"),
    ("tab", "pane"),
    ("q", "quit"),
];

const SEARCH: &[Hint] = &[("type", "filter"), ("↑/↓", "move"), ("enter", "keep"), ("esc", "clear")];

const DRAFT_PAYLOAD: &[Hint] = &[
    ("ctrl+s", "send"),
    ("tab", "key"),
    ("ctrl+e", "$EDITOR"),
    ("ctrl+n", "save"),
    ("ctrl+o", "load"),
    ("ctrl+r", "reset"),
    ("ctrl+y", "copy"),
    ("esc", "back"),
];

const DRAFT_KEY: &[Hint] = &[("ctrl+s", "send"), ("tab", "payload"), ("esc", "back")];

const SENDING: &[Hint] = &[("…", "waiting for broker")];

const SAVE: &[Hint] = &[("enter", "save"), ("esc", "cancel")];

const LOAD: &[Hint] = &[("j/k", "move"), ("enter", "load"), ("esc/q", "cancel")];

const CONSUME: &[Hint] = &[
    ("enter/f", "fetch"),
    ("j/k", "message"),
    ("y", "copy"),
    ("esc", "close"),
];

pub fn hints(state: &RootState) -> &'static [Hint] {
    match &state.mode {
        Mode::Loading | Mode::Browsing => LIST,
        Mode::Viewing(_) => match state.pane {
            Pane::List => VIEW_LIST,
            Pane::Viewer => VIEW_SCROLL,
        },
        Mode::Searching(_) => SEARCH,
        Mode::SendDraft(d) => match d.draft.focus {
            DraftField::Payload => DRAFT_PAYLOAD,
            DraftField::Key => DRAFT_KEY,
        },
        Mode::Sending(_) => SENDING,
        Mode::SaveDraft(_) => SAVE,
        Mode::LoadDraft(_) => LOAD,
        Mode::Consuming(_) => CONSUME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_pane_advertises_scrolling() {
        let mut state = RootState::new("local", true);
        state.mode = Mode::Viewing(Default::default());
        assert!(hints(&state).iter().any(|(k, _)| *k == "enter"));
        state.pane = Pane::Viewer;
        assert!(hints(&state).iter().any(|(_, what)| *what == "scroll"));
    }
}
