//! Card widget with rounded corners (╭╮╰╯), an optional title on the left
//! and an optional badge on the right of the top border.

use ratatui::{buffer::Buffer, layout::Rect, style::Style, text::Span, widgets::Widget};

use crate::ui::theme::{borders, styles};

pub struct Card<'a> {
    title: Option<Span<'a>>,
    border_style: Style,
    badge: Option<Span<'a>>,
}

impl<'a> Card<'a> {
    pub fn new(title: impl Into<Span<'a>>) -> Self {
        Self {
            title: Some(title.into()),
            border_style: styles::border_unfocused(),
            badge: None,
        }
    }

    /// A card without a title.
    pub fn empty() -> Self {
        Self {
            title: None,
            border_style: styles::border_unfocused(),
            badge: None,
        }
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.border_style = if focused {
            styles::border_focused()
        } else {
            styles::border_unfocused()
        };
        self
    }

    pub fn border_style(mut self, style: Style) -> Self {
        self.border_style = style;
        self
    }

    /// Right-aligned text in the top border.
    pub fn badge(mut self, badge: impl Into<Span<'a>>) -> Self {
        self.badge = Some(badge.into());
        self
    }

    /// Shorthand for a muted `N items` badge.
    pub fn item_count(self, count: usize) -> Self {
        self.badge(Span::styled(format!("{} items", count), styles::muted()))
    }
}

impl Widget for Card<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width < 2 || area.height < 2 {
            return;
        }

        let style = self.border_style;
        let right = area.x + area.width - 1;
        let bottom = area.y + area.height - 1;

        buf.set_string(area.x, area.y, borders::TOP_LEFT, style);
        buf.set_string(right, area.y, borders::TOP_RIGHT, style);
        buf.set_string(area.x, bottom, borders::BOTTOM_LEFT, style);
        buf.set_string(right, bottom, borders::BOTTOM_RIGHT, style);

        for x in (area.x + 1)..right {
            buf.set_string(x, area.y, borders::HORIZONTAL, style);
            buf.set_string(x, bottom, borders::HORIZONTAL, style);
        }
        for y in (area.y + 1)..bottom {
            buf.set_string(area.x, y, borders::VERTICAL, style);
            buf.set_string(right, y, borders::VERTICAL, style);
        }

        let mut title_end = area.x + 1;
        if let Some(title) = self.title {
            let text = format!(" {} ", title.content.trim());
            let width = text.chars().count() as u16;
            if width <= area.width.saturating_sub(4) {
                buf.set_string(area.x + 1, area.y, &text, title.style);
                title_end = area.x + 1 + width;
            }
        }

        if let Some(badge) = self.badge {
            let text = format!(" {} ", badge.content.trim());
            let width = text.chars().count() as u16;
            let x = right.saturating_sub(width);
            if x > title_end {
                buf.set_string(x, area.y, &text, badge.style);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_draws_corners_and_title() {
        let area = Rect::new(0, 0, 20, 3);
        let mut buf = Buffer::empty(area);
        Card::new("Menu").item_count(3).render(area, &mut buf);

        assert_eq!(buf[(0, 0)].symbol(), borders::TOP_LEFT);
        assert_eq!(buf[(19, 2)].symbol(), borders::BOTTOM_RIGHT);
        assert_eq!(buf[(2, 0)].symbol(), "M");
        assert_eq!(buf[(18, 0)].symbol(), " ");
        assert_eq!(buf[(17, 0)].symbol(), "s");
    }
}
