//! UI modules for the TUI.

pub mod adapters;
pub mod details;
pub mod main_menu;
pub mod results;
pub mod status;
pub mod theme;
pub mod widgets;

use ratatui::layout::Rect;

/// A `width` x `height` rect centered in `area`, clamped to fit.
pub fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

/// The area inside a card border with horizontal padding.
pub fn card_inner(card: Rect, pad_x: u16) -> Rect {
    Rect::new(
        card.x + pad_x,
        card.y + 1,
        card.width.saturating_sub(pad_x * 2),
        card.height.saturating_sub(2),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_clamps_to_area() {
        let area = Rect::new(0, 0, 20, 10);
        assert_eq!(centered(area, 10, 4), Rect::new(5, 3, 10, 4));
        assert_eq!(centered(area, 50, 50), area);
    }
}
