use std::env;

use ratatui::style::{Color, Modifier, Style};

/// Overrides colour detection: `truecolor`, `256` or `16`.
pub const COLOR_MODE_ENV: &str = "SCHEMACAST_COLOR_MODE";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    TrueColor,
    Ansi256,
    Ansi16,
}

impl ColorMode {
    pub fn detect() -> Self {
        Self::detect_with(|var| env::var(var).ok())
    }

    /// Detection against an arbitrary variable lookup.
    pub fn detect_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(mode) = lookup(COLOR_MODE_ENV).and_then(|v| Self::parse(&v)) {
            return mode;
        }
        if let Some(v) = lookup("COLORTERM") {
            let l = v.to_ascii_lowercase();
            if l.contains("truecolor") || l.contains("24bit") {
                return ColorMode::TrueColor;
            }
        }
        if let Some(v) = lookup("TERM") {
            if v.to_ascii_lowercase().contains("256color") {
                return ColorMode::Ansi256;
            }
        }
        ColorMode::Ansi16
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "24bit" | "truecolor" | "rgb" => Some(ColorMode::TrueColor),
            "256" | "ansi256" => Some(ColorMode::Ansi256),
            "16" | "ansi16" | "ansi" => Some(ColorMode::Ansi16),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ColorMode::TrueColor => "24-bit",
            ColorMode::Ansi256 => "256",
            ColorMode::Ansi16 => "16",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UiGroup {
    Border,
    BorderFocused,
    Dimmed,
    Text,
    Title,
    Selected,
    KeyHint,
    ModeChip,
    Success,
    Error,
    Warn,
    Info,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

#[derive(Clone, Debug)]
pub struct Palette {
    pub fg: Rgb,
    pub dim: Rgb,
    pub border: Rgb,
    pub accent: Rgb,
    pub selection: Rgb,
    pub success: Rgb,
    pub error: Rgb,
    pub warn: Rgb,
    pub info: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        // Dark, low-contrast base with saturated accents
        Self {
            fg: Rgb(192, 202, 245),
            dim: Rgb(107, 112, 137),
            border: Rgb(59, 63, 81),
            accent: Rgb(125, 207, 255),
            selection: Rgb(41, 46, 66),
            success: Rgb(158, 206, 106),
            error: Rgb(247, 118, 142),
            warn: Rgb(224, 175, 104),
            info: Rgb(122, 162, 247),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Theme {
    pub mode: ColorMode,
    pub palette: Palette,
}

impl Theme {
    pub fn new(mode: ColorMode) -> Self {
        Self {
            mode,
            palette: Palette::default(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ColorMode::detect())
    }

    pub fn mode_label(&self) -> &'static str {
        self.mode.label()
    }

    pub fn style(&self, group: UiGroup) -> Style {
        let p = &self.palette;
        match group {
            UiGroup::Border => Style::default().fg(self.color(p.border)),
            UiGroup::BorderFocused => Style::default().fg(self.color(p.accent)),
            UiGroup::Dimmed => Style::default().fg(self.color(p.dim)),
            UiGroup::Text => Style::default().fg(self.color(p.fg)),
            UiGroup::Title => Style::default()
                .fg(self.color(p.fg))
                .add_modifier(Modifier::BOLD),
            UiGroup::Selected => Style::default()
                .bg(self.color(p.selection))
                .fg(self.color(p.accent))
                .add_modifier(Modifier::BOLD),
            UiGroup::KeyHint => Style::default()
                .fg(self.color(p.accent))
                .add_modifier(Modifier::BOLD),
            UiGroup::ModeChip => Style::default()
                .bg(self.color(p.accent))
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
            UiGroup::Success => Style::default()
                .fg(self.color(p.success))
                .add_modifier(Modifier::BOLD),
            UiGroup::Error => Style::default()
                .fg(self.color(p.error))
                .add_modifier(Modifier::BOLD),
            UiGroup::Warn => Style::default()
                .fg(self.color(p.warn))
                .add_modifier(Modifier::BOLD),
            UiGroup::Info => Style::default().fg(self.color(p.info)),
        }
    }

    /// Badge style for the profile chip on the status bar.
    pub fn chip_style(&self) -> Style {
        Style::default()
            .bg(self.color(self.palette.border))
            .fg(self.color(self.palette.fg))
    }

    pub fn color(&self, rgb: Rgb) -> Color {
        match self.mode {
            ColorMode::TrueColor => Color::Rgb(rgb.0, rgb.1, rgb.2),
            ColorMode::Ansi256 => Color::Indexed(rgb_to_ansi256(rgb.0, rgb.1, rgb.2)),
            ColorMode::Ansi16 => ansi16_from_rgb(rgb.0, rgb.1, rgb.2),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::new(ColorMode::Ansi16)
    }
}

fn rgb_to_ansi256(r: u8, g: u8, b: u8) -> u8 {
    // 6x6x6 cube (16..231) or grayscale ramp (232..255), whichever is closer
    let r_idx = (r as f32 / 255.0 * 5.0).round() as u8;
    let g_idx = (g as f32 / 255.0 * 5.0).round() as u8;
    let b_idx = (b as f32 / 255.0 * 5.0).round() as u8;
    let color_idx = 16 + 36 * r_idx + 6 * g_idx + b_idx;

    let avg = (r as u16 + g as u16 + b as u16) as f32 / 3.0;
    let gray_idx = (avg / 255.0 * 23.0).round() as u8;
    let gray_color = 232 + gray_idx;

    let cube_r = r_idx as f32 * 255.0 / 5.0;
    let cube_g = g_idx as f32 * 255.0 / 5.0;
    let cube_b = b_idx as f32 * 255.0 / 5.0;
    let dcube = (cube_r - r as f32).abs() + (cube_g - g as f32).abs() + (cube_b - b as f32).abs();
    let gval = gray_idx as f32 * 255.0 / 23.0;
    let dgray = (gval - r as f32).abs() + (gval - g as f32).abs() + (gval - b as f32).abs();
    if dgray + 15.0 < dcube {
        gray_color
    } else {
        color_idx
    }
}

const ANSI8: [(Color, Color, (i32, i32, i32)); 8] = [
    (Color::Black, Color::DarkGray, (0, 0, 0)),
    (Color::Red, Color::LightRed, (205, 0, 0)),
    (Color::Green, Color::LightGreen, (0, 205, 0)),
    (Color::Yellow, Color::LightYellow, (205, 205, 0)),
    (Color::Blue, Color::LightBlue, (0, 0, 238)),
    (Color::Magenta, Color::LightMagenta, (205, 0, 205)),
    (Color::Cyan, Color::LightCyan, (0, 205, 205)),
    (Color::Gray, Color::White, (229, 229, 229)),
];

fn ansi16_from_rgb(r: u8, g: u8, b: u8) -> Color {
    let bright = (r as u16 + g as u16 + b as u16) / 3 > 128;
    let (r, g, b) = (r as i32, g as i32, b as i32);
    ANSI8
        .iter()
        .min_by_key(|(_, _, (cr, cg, cb))| (cr - r).abs() + (cg - g).abs() + (cb - b).abs())
        .map(|(normal, light, _)| if bright { *light } else { *normal })
        .unwrap_or(Color::White)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |var| {
            pairs
                .iter()
                .find(|(k, _)| *k == var)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn override_wins_over_terminal_hints() {
        let mode = ColorMode::detect_with(lookup(&[
            (COLOR_MODE_ENV, "256"),
            ("COLORTERM", "truecolor"),
        ]));
        assert_eq!(mode, ColorMode::Ansi256);
    }

    #[test]
    fn detection_falls_back_to_16_colours() {
        assert_eq!(
            ColorMode::detect_with(lookup(&[("COLORTERM", "24bit")])),
            ColorMode::TrueColor
        );
        assert_eq!(
            ColorMode::detect_with(lookup(&[("TERM", "xterm-256color")])),
            ColorMode::Ansi256
        );
        assert_eq!(
            ColorMode::detect_with(lookup(&[(COLOR_MODE_ENV, "bogus")])),
            ColorMode::Ansi16
        );
    }

    #[test]
    fn rgb_maps_into_each_mode() {
        assert_eq!(rgb_to_ansi256(255, 0, 0), 196);
        assert_eq!(rgb_to_ansi256(128, 128, 128), 244);
        assert_eq!(ansi16_from_rgb(250, 10, 10), Color::Red);
        assert_eq!(ansi16_from_rgb(10, 10, 10), Color::Black);
        assert_eq!(ansi16_from_rgb(240, 240, 240), Color::White);
    }
}
