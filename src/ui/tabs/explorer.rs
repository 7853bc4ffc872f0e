//! Explorer tab rendering - file list on the left, preview on the right.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use crate::files::format_size;
use crate::image_render::RenderedImage;
use crate::ui::{PALETTE, render_centered, render_scrollbar, truncate_to_width};
use crate::{App, PreviewBody};

/// Render the Explorer tab: current directory listing and the preview pane.
pub fn render_explorer_tab(app: &App, f: &mut Frame, list_area: Rect, preview_area: Rect) {
    render_file_list(app, f, list_area);
    let numbered = app.selected_file().is_some_and(|file| !file.is_dir);
    render_preview_pane(app, f, preview_area, numbered);
}

fn file_color(name: &str, is_dir: bool) -> Color {
    if is_dir {
        return PALETTE.dir_color;
    }
    let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    match ext {
        "rs" => Color::Rgb(255, 140, 90),
        "py" | "sh" | "bash" | "zsh" => Color::Rgb(80, 200, 120),
        "js" | "jsx" => Color::Rgb(240, 220, 80),
        "ts" | "tsx" | "css" | "scss" => Color::Rgb(80, 160, 240),
        "json" | "toml" | "yaml" | "yml" => Color::Rgb(180, 140, 200),
        "md" | "txt" => Color::Rgb(180, 180, 180),
        "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "bmp" | "ico" => {
            Color::Rgb(200, 120, 200)
        }
        _ => PALETTE.fg,
    }
}

fn render_file_list(app: &App, f: &mut Frame, area: Rect) {
    let rel = app
        .current_path
        .strip_prefix(&app.root)
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let title = if rel.is_empty() {
        format!(" Files ({}) ", app.files.len())
    } else {
        format!(" {}/ ({}) ", rel, app.files.len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_set(ratatui::symbols::border::PLAIN)
        .border_style(Style::default().fg(PALETTE.accent_primary))
        .title(title);

    let name_width = area.width.saturating_sub(16) as usize;
    let items: Vec<ListItem> = app
        .files
        .iter()
        .map(|file| {
            let color = file_color(&file.name, file.is_dir);
            let marker = if app.context.contains(&file.path) {
                Span::styled("● ", Style::default().fg(PALETTE.accent_secondary))
            } else {
                Span::raw("  ")
            };
            let name = if file.is_dir {
                format!("{}/", file.name)
            } else {
                file.name.clone()
            };
            let mut name_style = Style::default().fg(color);
            if file.is_hidden {
                name_style = name_style.add_modifier(Modifier::DIM);
            }
            let mut spans = vec![
                marker,
                Span::styled(truncate_to_width(&name, name_width), name_style),
            ];
            if !file.is_dir {
                spans.push(Span::styled(
                    format!(" {}", format_size(file.size)),
                    Style::default().fg(PALETTE.size_color),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    if items.is_empty() {
        f.render_widget(block, area);
        render_centered(f, area, "(empty directory)");
        return;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(PALETTE.selection_bg)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▎");
    let mut state = ListState::default().with_selected(Some(app.selected));
    f.render_stateful_widget(list, area, &mut state);
}

/// Render the preview pane: highlighted text, inline image, or a placeholder.
pub(crate) fn render_preview_pane(app: &App, f: &mut Frame, area: Rect, numbered: bool) {
    let preview = &app.preview;
    let name = preview
        .path
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "Preview".to_string());

    let (title, lines) = match &preview.body {
        PreviewBody::Empty => (format!(" {} ", name), Vec::new()),
        PreviewBody::Loading => (format!(" {} (loading...) ", name), Vec::new()),
        PreviewBody::Message(msg) => {
            let block = pane_block(format!(" {} ", name));
            f.render_widget(block, area);
            render_centered(f, area, msg);
            return;
        }
        PreviewBody::Text(content) => {
            let suffix = if content.truncated { ", truncated" } else { "" };
            let title = format!(" {} ({} lines{}) ", name, content.lines.len(), suffix);
            let lines = if numbered {
                with_line_numbers(&content.lines)
            } else {
                content.lines.clone()
            };
            (title, lines)
        }
        PreviewBody::Image(RenderedImage::Blocks(lines)) => {
            (format!(" {} (f to enlarge) ", name), lines.clone())
        }
        // Graphics-protocol payloads are only produced for the overlay.
        PreviewBody::Image(RenderedImage::Kitty(_)) => (format!(" {} ", name), Vec::new()),
    };

    let total = lines.len();
    let visible = area.height.saturating_sub(2) as usize;
    let scroll = (preview.scroll as usize).min(total.saturating_sub(visible));
    f.render_widget(
        Paragraph::new(lines)
            .block(pane_block(title))
            .scroll((scroll as u16, 0)),
        area,
    );
    render_scrollbar(f, area, total, scroll);
}

fn pane_block(title: String) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_set(ratatui::symbols::border::PLAIN)
        .border_style(Style::default().fg(PALETTE.border_inactive))
        .title(title)
}

fn with_line_numbers(lines: &[Line<'static>]) -> Vec<Line<'static>> {
    let width = lines.len().to_string().len().max(3);
    let style = Style::default().fg(PALETTE.border_inactive);
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let mut spans = vec![Span::styled(format!("{:>width$} │ ", i + 1), style)];
            spans.extend(line.spans.iter().cloned());
            Line::from(spans)
        })
        .collect()
}
