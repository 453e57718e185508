/*!
Root UI module.

Everything here reads state and draws it; nothing here changes it. The
profile selector is the exception: it runs before the session starts and
saves the profiles it edits.

- `render`         : frame layout for every mode
- `keymap`         : per-mode key hints for the help line
- `theme`          : colour-mode detection and palette roles
- `profile_picker` : the `--select-config` selector
- `profile_editor` : create / edit form the selector opens
*/

pub mod keymap;
pub mod profile_editor;
pub mod profile_picker;
pub mod render;
pub mod theme;

pub use theme::Theme;
