//! syntect highlighting for text previews.

use std::sync::OnceLock;

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::{
    easy::HighlightLines,
    highlighting::{self, FontStyle, ScopeSelectors, StyleModifier, Theme, ThemeItem, ThemeSettings},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};

fn syntaxes() -> &'static SyntaxSet {
    static SYNTAXES: OnceLock<SyntaxSet> = OnceLock::new();
    SYNTAXES.get_or_init(SyntaxSet::load_defaults_newlines)
}

const fn mocha(r: u8, g: u8, b: u8) -> highlighting::Color {
    highlighting::Color { r, g, b, a: 255 }
}

const TEXT: highlighting::Color = mocha(205, 214, 244);
const OVERLAY: highlighting::Color = mocha(127, 132, 156);
const MAUVE: highlighting::Color = mocha(203, 166, 247);
const BLUE: highlighting::Color = mocha(137, 180, 250);
const GREEN: highlighting::Color = mocha(166, 227, 161);
const YELLOW: highlighting::Color = mocha(249, 226, 175);
const PEACH: highlighting::Color = mocha(250, 179, 135);
const TEAL: highlighting::Color = mocha(148, 226, 213);
const RED: highlighting::Color = mocha(243, 139, 168);

const RULES: &[(&str, highlighting::Color, FontStyle)] = &[
    ("comment", OVERLAY, FontStyle::ITALIC),
    ("string", GREEN, FontStyle::empty()),
    ("constant.numeric, constant.character", PEACH, FontStyle::empty()),
    ("constant.language", PEACH, FontStyle::BOLD),
    ("keyword, storage", MAUVE, FontStyle::empty()),
    ("keyword.operator", TEAL, FontStyle::empty()),
    ("storage.type", YELLOW, FontStyle::empty()),
    ("entity.name.function, support.function, meta.function-call", BLUE, FontStyle::empty()),
    ("entity.name.type, entity.name.class, support.type", YELLOW, FontStyle::empty()),
    ("variable.parameter", RED, FontStyle::ITALIC),
    ("entity.name.tag", MAUVE, FontStyle::empty()),
    ("entity.other.attribute-name", PEACH, FontStyle::empty()),
    ("markup.heading", BLUE, FontStyle::BOLD),
    ("markup.bold", PEACH, FontStyle::BOLD),
    ("markup.italic", YELLOW, FontStyle::ITALIC),
    ("markup.raw", GREEN, FontStyle::empty()),
    ("markup.inserted", GREEN, FontStyle::empty()),
    ("markup.deleted", RED, FontStyle::empty()),
    ("invalid", RED, FontStyle::UNDERLINE),
];

fn theme() -> &'static Theme {
    static THEME: OnceLock<Theme> = OnceLock::new();
    THEME.get_or_init(|| Theme {
        name: Some("ctxview".to_string()),
        author: None,
        settings: ThemeSettings {
            foreground: Some(TEXT),
            ..Default::default()
        },
        scopes: RULES
            .iter()
            .filter_map(|&(selector, fg, font_style)| {
                let scope = selector.parse::<ScopeSelectors>().ok()?;
                Some(ThemeItem {
                    scope,
                    style: StyleModifier {
                        foreground: Some(fg),
                        background: None,
                        font_style: Some(font_style),
                    },
                })
            })
            .collect(),
    })
}

/// Syntax by extension, then by first line (shebangs, modelines). Plain text
/// counts as no match.
fn syntax_for(text: &str, ext: &str) -> Option<&'static SyntaxReference> {
    let set = syntaxes();
    let syntax = set.find_syntax_by_extension(ext).or_else(|| {
        let first = text.lines().next()?;
        set.find_syntax_by_first_line(first)
    })?;
    (syntax.name != "Plain Text").then_some(syntax)
}

fn to_span(style: highlighting::Style, text: &str) -> Span<'static> {
    let fg = style.foreground;
    let mut out = Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b));
    for (font, modifier) in [
        (FontStyle::BOLD, Modifier::BOLD),
        (FontStyle::ITALIC, Modifier::ITALIC),
        (FontStyle::UNDERLINE, Modifier::UNDERLINED),
    ] {
        if style.font_style.contains(font) {
            out = out.add_modifier(modifier);
        }
    }
    Span::styled(text.to_string(), out)
}

/// Highlight `text` as the language of `ext`. `None` when no grammar matches;
/// callers fall back to plain lines.
pub fn highlight_text(text: &str, ext: &str) -> Option<Vec<Line<'static>>> {
    let syntax = syntax_for(text, ext)?;
    let mut hl = HighlightLines::new(syntax, theme());

    let mut lines = Vec::new();
    for raw in LinesWithEndings::from(text) {
        let line = raw.trim_end_matches(['\n', '\r']);
        match hl.highlight_line(line, syntaxes()) {
            Ok(ranges) => lines.push(Line::from(
                ranges
                    .into_iter()
                    .map(|(style, piece)| to_span(style, piece))
                    .collect::<Vec<_>>(),
            )),
            Err(e) => {
                log::debug!("highlighting stopped at line {}: {e}", lines.len() + 1);
                return None;
            }
        }
    }
    if lines.is_empty() {
        lines.push(Line::raw(""));
    }
    Some(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn test_unknown_extension_is_not_highlighted() {
        assert!(highlight_text("hello", "xyz").is_none());
        assert!(highlight_text("hello", "txt").is_none());
    }

    #[test]
    fn test_highlight_preserves_text() {
        let lines = highlight_text("fn main() {\n    let x = 1;\n}\n", "rs").unwrap();
        assert_eq!(plain(&lines), vec!["fn main() {", "    let x = 1;", "}"]);
        assert!(lines[0].spans.len() > 1);
    }

    #[test]
    fn test_shebang_selects_syntax() {
        let lines = highlight_text("#!/bin/sh\necho hi\n", "run").unwrap();
        assert_eq!(plain(&lines), vec!["#!/bin/sh", "echo hi"]);
    }

    #[test]
    fn test_empty_text_yields_one_line() {
        assert_eq!(highlight_text("", "rs").unwrap().len(), 1);
    }
}
