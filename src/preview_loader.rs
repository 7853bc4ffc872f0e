//! Plain file and directory preview loading.
//!
//! Runs on a blocking worker. The file's mtime is read before its content so
//! an edit racing with the load makes the cached entry look stale rather than
//! fresh.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use ratatui::style::{Color, Style, Stylize};
use ratatui::text::{Line, Span};

use crate::files;
use crate::highlight;
use crate::preview_cache::{Mtime, file_mtime};

/// Maximum file size to load for preview (10MB - large enough for most source files).
const MAX_PREVIEW_BYTES: usize = 10 * 1024 * 1024;

/// Files larger than this are shown without syntax highlighting.
const MAX_HIGHLIGHT_BYTES: usize = 512 * 1024;

/// Rendered preview content for a file or directory.
#[derive(Clone, Debug)]
pub struct PreviewContent {
    pub lines: Vec<Line<'static>>,
    /// Whether the file appears to be binary (contains control characters).
    pub is_binary: bool,
    /// Whether the content was truncated due to size limits.
    pub truncated: bool,
}

/// A finished load together with the mtime it is valid for.
#[derive(Clone, Debug)]
pub struct LoadedPreview {
    pub content: PreviewContent,
    pub mtime: Mtime,
}

pub fn load_preview(path: &Path, highlight: bool) -> Result<LoadedPreview, String> {
    load_preview_with_limit(path, highlight, MAX_PREVIEW_BYTES)
}

fn load_preview_with_limit(
    path: &Path,
    highlight: bool,
    max_bytes: usize,
) -> Result<LoadedPreview, String> {
    let mtime = file_mtime(path);

    if path.is_dir() {
        let content = directory_preview(path)?;
        return Ok(LoadedPreview { content, mtime });
    }

    let file = File::open(path).map_err(|e| format!("Could not open file: {}", e))?;
    let mut bytes = Vec::new();
    file.take(max_bytes as u64 + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| format!("Error reading file: {}", e))?;

    let truncated = bytes.len() > max_bytes;
    if truncated {
        bytes.truncate(max_bytes);
    }

    if is_binary_content(&bytes) {
        return Ok(LoadedPreview {
            content: PreviewContent {
                lines: Vec::new(),
                is_binary: true,
                truncated: false,
            },
            mtime,
        });
    }

    let text = String::from_utf8_lossy(&bytes);
    let ext = extension_of(path);
    let highlighted = if highlight && text.len() <= MAX_HIGHLIGHT_BYTES {
        highlight::highlight_text(&text, &ext)
    } else {
        None
    };
    let mut lines =
        highlighted.unwrap_or_else(|| text.lines().map(|l| Line::raw(l.to_string())).collect());
    if truncated {
        lines.push(Line::raw(""));
        lines.push(Line::from(
            "... (file truncated, too large to preview)".dark_gray(),
        ));
    }

    Ok(LoadedPreview {
        content: PreviewContent {
            lines,
            is_binary: false,
            truncated,
        },
        mtime,
    })
}

fn directory_preview(path: &Path) -> Result<PreviewContent, String> {
    let entries = files::read_dir_entries(path, true)?;
    let lines = if entries.is_empty() {
        vec![Line::from("(empty directory)".dark_gray())]
    } else {
        entries
            .into_iter()
            .map(|e| {
                if e.is_dir {
                    Line::from(Span::styled(
                        format!("{}/", e.name),
                        Style::default().fg(Color::Blue).bold(),
                    ))
                } else {
                    Line::raw(e.name)
                }
            })
            .collect()
    };
    Ok(PreviewContent {
        lines,
        is_binary: false,
        truncated: false,
    })
}

/// Lowercased extension, or the file name for extension-less files like `Makefile`.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Check if content appears to be binary by looking for control characters.
///
/// Allows common whitespace characters (tab, newline, carriage return) and
/// form feed / escape, which show up in ordinary text files.
fn is_binary_content(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .any(|&b| b < 0x20 && !matches!(b, 0x09 | 0x0A | 0x0C | 0x0D | 0x1B))
}
