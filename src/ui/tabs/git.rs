//! Changes tab rendering - git change list and the progressive diff view.

use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use super::explorer::render_preview_pane;
use crate::App;
use crate::git_diff_loader::{DiffBody, DiffContext};
use crate::ui::{PALETTE, display_width, pad_to_width, render_centered, render_scrollbar};

/// Render the Changes tab: change list on the left; diff (or file preview for
/// untracked entries) on the right.
pub fn render_changes_tab(app: &App, f: &mut Frame, list_area: Rect, preview_area: Rect) {
    render_change_list(app, f, list_area);
    match app.git.selected_change() {
        Some(change) if change.untracked => render_preview_pane(app, f, preview_area, true),
        _ => render_diff_view(app, f, preview_area),
    }
}

fn render_change_list(app: &App, f: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_set(ratatui::symbols::border::PLAIN)
        .border_style(Style::default().fg(PALETTE.accent_primary))
        .title(format!(" Changes ({}) ", app.git.changes.len()));

    if app.git.repo_root().is_none() {
        f.render_widget(block, area);
        render_centered(f, area, "Not a git repository");
        return;
    }
    if app.git.changes.is_empty() {
        f.render_widget(block, area);
        render_centered(f, area, "Working tree clean");
        return;
    }

    let items: Vec<ListItem> = app
        .git
        .changes
        .iter()
        .map(|change| {
            let (side, color) = if change.untracked {
                ("?", PALETTE.size_color)
            } else if change.staged {
                ("S", PALETTE.diff_add_fg)
            } else {
                ("W", PALETTE.accent_secondary)
            };
            let marked = app
                .git
                .repo_root()
                .is_some_and(|root| app.context.contains(&root.join(&change.path)));
            let marker = if marked { "● " } else { "  " };
            let label = match &change.renamed_from {
                Some(from) => format!("{} → {}", from, change.path),
                None => change.path.clone(),
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(PALETTE.accent_secondary)),
                Span::styled(
                    format!("{}{} ", side, change.status),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::styled(label, Style::default().fg(PALETTE.fg)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(PALETTE.selection_bg)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▎");
    let mut state = ListState::default().with_selected(Some(app.git.selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn render_diff_view(app: &App, f: &mut Frame, area: Rect) {
    let diff = &app.diff;
    let class = match diff.shown {
        Some(DiffContext::Quick) => " (quick)",
        Some(DiffContext::Full) => "",
        None => "",
    };
    let side = if diff.staged { "staged" } else { "unstaged" };
    let title = if diff.rel_path.is_empty() {
        " Diff ".to_string()
    } else {
        format!(" {} [{}]{} ", diff.rel_path, side, class)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_set(ratatui::symbols::border::PLAIN)
        .border_style(Style::default().fg(PALETTE.border_inactive))
        .title(title);

    let lines = match &diff.body {
        DiffBody::Empty => {
            f.render_widget(block, area);
            return;
        }
        DiffBody::Loading => {
            f.render_widget(block, area);
            render_centered(f, area, "Loading...");
            return;
        }
        DiffBody::Message(msg) => {
            f.render_widget(block, area);
            render_centered(f, area, msg);
            return;
        }
        DiffBody::Lines(lines) if lines.is_empty() => {
            f.render_widget(block, area);
            render_centered(f, area, "No changes");
            return;
        }
        DiffBody::Lines(lines) => render_unified_diff(lines, area.width.saturating_sub(2) as usize),
    };

    let total = lines.len();
    let visible = area.height.saturating_sub(2) as usize;
    let scroll = (diff.scroll as usize).min(total.saturating_sub(visible));
    f.render_widget(
        Paragraph::new(lines).block(block).scroll((scroll as u16, 0)),
        area,
    );
    render_scrollbar(f, area, total, scroll);
}

/// Color unified diff lines; git's header noise is kept so line offsets match
/// the scroll position the app tracks.
fn render_unified_diff(diff_lines: &[String], content_w: usize) -> Vec<Line<'static>> {
    diff_lines
        .iter()
        .map(|t| {
            let t = t.as_str();
            if t.starts_with("@@") {
                return Line::from(Span::styled(
                    pad_to_width(t.to_string(), content_w),
                    Style::default()
                        .fg(PALETTE.fg)
                        .bg(PALETTE.diff_hunk_bg)
                        .add_modifier(Modifier::BOLD),
                ));
            }
            if t.starts_with("diff --git")
                || t.starts_with("index ")
                || t.starts_with("--- ")
                || t.starts_with("+++ ")
            {
                return Line::from(Span::styled(
                    t.to_string(),
                    Style::default().fg(PALETTE.border_inactive),
                ));
            }

            let (fg, bg) = match t.chars().next() {
                Some('+') => (PALETTE.diff_add_fg, Some(PALETTE.diff_add_bg)),
                Some('-') => (PALETTE.diff_del_fg, Some(PALETTE.diff_del_bg)),
                _ => (PALETTE.fg, None),
            };
            let style = Style::default().fg(fg);
            match bg {
                Some(bg) if display_width(t) < content_w => Line::from(Span::styled(
                    pad_to_width(t.to_string(), content_w),
                    style.bg(bg),
                )),
                Some(bg) => Line::from(Span::styled(t.to_string(), style.bg(bg))),
                None => Line::from(Span::styled(t.to_string(), style)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_lines_keep_one_to_one_mapping() {
        let raw: Vec<String> = [
            "diff --git a/x b/x",
            "index 1..2 100644",
            "--- a/x",
            "+++ b/x",
            "@@ -1,2 +1,2 @@",
            " same",
            "-old",
            "+new",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let lines = render_unified_diff(&raw, 20);
        assert_eq!(lines.len(), raw.len());
        assert_eq!(lines[7].spans[0].style.fg, Some(PALETTE.diff_add_fg));
        assert_eq!(lines[7].spans[0].content.len(), 20);
        assert_eq!(lines[4].spans[0].style.bg, Some(PALETTE.diff_hunk_bg));
    }
}
