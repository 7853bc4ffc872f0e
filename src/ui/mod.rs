//! Screen layout and drawing. Everything here reads `App`; nothing schedules work.

pub mod tabs;

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};
use unicode_width::UnicodeWidthChar;

use crate::image_render::RenderedImage;
use crate::{App, Mode, OverlayBody, Tab};

/// Catppuccin Mocha.
pub(crate) struct Palette {
    pub bg: Color,
    pub fg: Color,
    pub accent_primary: Color,
    pub accent_secondary: Color,
    pub border_inactive: Color,
    pub selection_bg: Color,
    pub dir_color: Color,
    pub size_color: Color,
    pub diff_add_fg: Color,
    pub diff_del_fg: Color,
    pub diff_add_bg: Color,
    pub diff_del_bg: Color,
    pub diff_hunk_bg: Color,
}

pub(crate) const PALETTE: Palette = Palette {
    bg: Color::Rgb(30, 30, 46),
    fg: Color::Rgb(248, 248, 255),
    accent_primary: Color::Rgb(203, 166, 247),
    accent_secondary: Color::Rgb(250, 179, 135),
    border_inactive: Color::Rgb(120, 124, 150),
    selection_bg: Color::Rgb(78, 82, 110),
    dir_color: Color::Rgb(137, 180, 250),
    size_color: Color::Rgb(147, 153, 178),
    diff_add_fg: Color::Rgb(148, 226, 213),
    diff_del_fg: Color::Rgb(243, 139, 168),
    diff_add_bg: Color::Rgb(54, 75, 85),
    diff_del_bg: Color::Rgb(73, 55, 77),
    diff_hunk_bg: Color::Rgb(51, 49, 72),
};

/// Fixed regions of the main screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Areas {
    pub header: Rect,
    pub list: Rect,
    pub preview: Rect,
    pub footer: Rect,
}

pub(crate) fn layout(screen: Rect) -> Areas {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(1)])
        .split(screen);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(rows[1]);
    Areas {
        header: rows[0],
        list: cols[0],
        preview: cols[1],
        footer: rows[2],
    }
}

/// Cells available for preview content (inside the pane border).
pub(crate) fn preview_viewport(screen: Rect) -> (u16, u16) {
    let inner = layout(screen).preview.inner(Margin {
        vertical: 1,
        horizontal: 1,
    });
    (inner.width, inner.height)
}

/// Content area of the full-screen image overlay.
pub(crate) fn overlay_inner(screen: Rect) -> Rect {
    screen.inner(Margin {
        vertical: 1,
        horizontal: 1,
    })
}

pub(crate) fn draw_ui(f: &mut Frame, app: &App) {
    let screen = f.area();
    if let Mode::ImageOverlay(_) = app.mode {
        render_overlay(f, app, screen);
        return;
    }

    let areas = layout(screen);
    render_header(f, app, areas.header);
    match app.mode.tab() {
        Tab::Explorer => tabs::render_explorer_tab(app, f, areas.list, areas.preview),
        Tab::Changes => tabs::render_changes_tab(app, f, areas.list, areas.preview),
    }
    render_footer(f, app, areas.footer);
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let tab_style = |tab: Tab| {
        if app.mode.tab() == tab {
            Style::default()
                .fg(PALETTE.bg)
                .bg(PALETTE.accent_primary)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(PALETTE.border_inactive)
        }
    };

    let mut spans = vec![
        Span::styled(
            " ctxview ",
            Style::default()
                .fg(PALETTE.accent_secondary)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(" 1 Explorer ", tab_style(Tab::Explorer)),
        Span::raw(" "),
        Span::styled(
            format!(" 2 Changes ({}) ", app.git.changes.len()),
            tab_style(Tab::Changes),
        ),
    ];
    if !app.git.snapshot.branch.is_empty() {
        spans.push(Span::styled(
            format!("   {}", app.git.snapshot.branch),
            Style::default().fg(PALETTE.dir_color),
        ));
    }
    if !app.context.is_empty() {
        spans.push(Span::styled(
            format!("   context: {}", app.context.len()),
            Style::default().fg(PALETTE.accent_secondary),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let (text, color) = match &app.status_message {
        Some((msg, _)) => (format!(" {}", msg), PALETTE.accent_secondary),
        None => (
            " j/k move  enter open  h up  J/K scroll  f image  space mark  y copy  r reload  q quit"
                .to_string(),
            PALETTE.border_inactive,
        ),
    };
    f.render_widget(
        Paragraph::new(Span::styled(
            truncate_to_width(&text, area.width as usize),
            Style::default().fg(color),
        )),
        area,
    );
}

fn render_overlay(f: &mut Frame, app: &App, screen: Rect) {
    let Mode::ImageOverlay(overlay) = &app.mode else {
        return;
    };
    let name = overlay
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_set(ratatui::symbols::border::PLAIN)
        .border_style(Style::default().fg(PALETTE.accent_primary))
        .title(format!(" {} (esc to close) ", name));
    f.render_widget(Clear, screen);
    f.render_widget(block, screen);

    let inner = overlay_inner(screen);
    match &overlay.body {
        OverlayBody::Loading => render_centered(f, inner, "Loading…"),
        OverlayBody::Message(msg) => render_centered(f, inner, msg),
        OverlayBody::Image(RenderedImage::Blocks(lines)) => {
            let top = inner.height.saturating_sub(lines.len() as u16) / 2;
            let area = Rect::new(inner.x, inner.y + top, inner.width, inner.height - top);
            f.render_widget(
                Paragraph::new(lines.clone()).alignment(Alignment::Center),
                area,
            );
        }
        // Drawn by the graphics protocol after the frame is flushed.
        OverlayBody::Image(RenderedImage::Kitty(_)) => {}
    }
}

pub(crate) fn render_centered(f: &mut Frame, area: Rect, text: &str) {
    if area.height == 0 {
        return;
    }
    let y = area.y + area.height / 2;
    f.render_widget(
        Paragraph::new(Span::styled(
            text.to_string(),
            Style::default().fg(PALETTE.border_inactive),
        ))
        .alignment(Alignment::Center),
        Rect::new(area.x, y, area.width, 1),
    );
}

pub(crate) fn render_scrollbar(f: &mut Frame, area: Rect, total: usize, position: usize) {
    let viewport = area.height.saturating_sub(2) as usize;
    if total <= viewport {
        return;
    }
    let mut state = ScrollbarState::new(total.saturating_sub(viewport).max(1)).position(position);
    f.render_stateful_widget(
        Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(None)
            .end_symbol(None)
            .track_symbol(Some("│"))
            .thumb_symbol("█"),
        area.inner(Margin {
            vertical: 1,
            horizontal: 0,
        }),
        &mut state,
    );
}

pub(crate) fn display_width(s: &str) -> usize {
    s.chars()
        .map(|ch| {
            if ch == '\t' {
                4
            } else {
                UnicodeWidthChar::width(ch).unwrap_or(0)
            }
        })
        .sum()
}

pub(crate) fn truncate_to_width(s: &str, width: usize) -> String {
    if display_width(s) <= width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0usize;
    let budget = width.saturating_sub(1);
    for ch in s.chars() {
        let w = if ch == '\t' {
            4
        } else {
            UnicodeWidthChar::width(ch).unwrap_or(0)
        };
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    if width > 0 {
        out.push('…');
    }
    out
}

pub(crate) fn pad_to_width(mut s: String, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let w = display_width(&s);
    if w >= width {
        return truncate_to_width(&s, width);
    }
    s.push_str(&" ".repeat(width - w));
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_viewport_is_inside_border() {
        let screen = Rect::new(0, 0, 120, 40);
        let areas = layout(screen);
        let (w, h) = preview_viewport(screen);
        assert_eq!(w, areas.preview.width - 2);
        assert_eq!(h, 40 - 2 - 2);
    }

    #[test]
    fn test_truncate_respects_wide_chars() {
        assert_eq!(truncate_to_width("hello", 10), "hello");
        assert_eq!(truncate_to_width("hello world", 6), "hello…");
        assert_eq!(truncate_to_width("日本語テキスト", 5), "日本…");
        assert_eq!(display_width("a\tb"), 6);
    }

    #[test]
    fn test_pad_to_width() {
        assert_eq!(pad_to_width("ab".into(), 4), "ab  ");
        assert_eq!(pad_to_width("abcdef".into(), 4), "abc…");
    }
}
