//! User-originated input, already separated from terminal plumbing
//! (ticks, renders and resizes never reach the reducer).

use crossterm::event::KeyEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Key(KeyEvent),
    /// Bracketed paste.
    Paste(String),
}
