//! Palette, glyphs and styles shared by every view.

/// Rounded box drawing characters.
pub mod borders {
    pub const TOP_LEFT: &str = "\u{256d}"; // ╭
    pub const TOP_RIGHT: &str = "\u{256e}"; // ╮
    pub const BOTTOM_LEFT: &str = "\u{2570}"; // ╰
    pub const BOTTOM_RIGHT: &str = "\u{256f}"; // ╯
    pub const HORIZONTAL: &str = "\u{2500}"; // ─
    pub const VERTICAL: &str = "\u{2502}"; // │
}

pub mod symbols {
    pub const APP_ICON: &str = "\u{2699}"; // ⚙
    pub const STATUS_OK: &str = "\u{2714}"; // ✔
    pub const STATUS_IDLE: &str = "\u{25cb}"; // ○
    pub const SELECTED: &str = "\u{276f}"; // ❯
    pub const WARNING: &str = "\u{26a0}"; // ⚠
    pub const ERROR: &str = "\u{2718}"; // ✘
    /// Marks modules whose changes can be undone.
    pub const REVERTIBLE: &str = "\u{21ba}"; // ↺
    pub const TREE_BRANCH: &str = "\u{251c}\u{2500}"; // ├─
    pub const TREE_END: &str = "\u{2514}\u{2500}"; // └─
    pub const SEPARATOR_CHAR: &str = "\u{00b7}"; // ·

    /// Braille spinner frames shown while a module runs.
    pub const SPINNER: &[char] = &[
        '\u{280b}', '\u{2819}', '\u{2839}', '\u{2838}', '\u{283c}', '\u{2834}', '\u{2826}',
        '\u{2827}', '\u{2807}', '\u{280f}',
    ];
}

pub mod colors {
    use ratatui::style::Color;

    pub const TEXT_PRIMARY: Color = Color::White;
    pub const TEXT_SECONDARY: Color = Color::DarkGray;

    pub const SUCCESS: Color = Color::Green;
    pub const WARNING: Color = Color::Yellow;
    pub const ERROR: Color = Color::LightRed;
    /// Title, focus borders, spinner.
    pub const ACCENT: Color = Color::LightBlue;
    pub const ADAPTER: Color = Color::Magenta;
}

pub mod styles {
    use super::colors;
    use ratatui::style::{Modifier, Style};

    fn bold(color: ratatui::style::Color) -> Style {
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    }

    pub fn title() -> Style {
        bold(colors::ACCENT)
    }

    pub fn status_ok() -> Style {
        bold(colors::SUCCESS)
    }

    pub fn status_warning() -> Style {
        bold(colors::WARNING)
    }

    pub fn status_failed() -> Style {
        bold(colors::ERROR)
    }

    pub fn selected() -> Style {
        bold(colors::WARNING)
    }

    pub fn unselected() -> Style {
        Style::default().fg(colors::TEXT_PRIMARY)
    }

    pub fn border_focused() -> Style {
        Style::default().fg(colors::ACCENT)
    }

    pub fn border_unfocused() -> Style {
        Style::default().fg(colors::TEXT_SECONDARY)
    }

    /// Key names in the help bar.
    pub fn help_key() -> Style {
        bold(colors::ACCENT)
    }

    pub fn menu_number() -> Style {
        Style::default().fg(colors::ACCENT)
    }

    pub fn adapter() -> Style {
        bold(colors::ADAPTER)
    }

    pub fn card_title() -> Style {
        bold(colors::TEXT_SECONDARY)
    }

    /// Secondary text: hints, tree lines, separators, help descriptions.
    pub fn muted() -> Style {
        Style::default().fg(colors::TEXT_SECONDARY)
    }

    pub fn revertible() -> Style {
        Style::default().fg(colors::SUCCESS)
    }

    /// "Restart needed" badge and notes.
    pub fn reboot() -> Style {
        bold(colors::WARNING).add_modifier(Modifier::ITALIC)
    }
}
