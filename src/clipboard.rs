//! Copying the context basket.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use arboard::Clipboard;
use base64::{Engine as _, engine::general_purpose};
use crossterm::{execute, style::Print};

use crate::kitty::{in_tmux, tmux_passthrough};

/// How the text reached the clipboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyMethod {
    System,
    Osc52,
}

/// One path per line, relative to `root` where possible.
pub fn format_context<'a>(root: &Path, paths: impl IntoIterator<Item = &'a PathBuf>) -> String {
    paths
        .into_iter()
        .map(|p| p.strip_prefix(root).unwrap_or(p).display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn osc52_sequence(text: &str) -> String {
    let encoded = general_purpose::STANDARD.encode(text.as_bytes());
    format!("\x1b]52;c;{}\x07", encoded)
}

fn emit_osc52<W: Write>(w: &mut W, text: &str) -> io::Result<()> {
    let seq = osc52_sequence(text);
    let out = if in_tmux() {
        tmux_passthrough(&seq)
    } else {
        seq
    };
    execute!(w, Print(out))?;
    w.flush()
}

fn try_set_system_clipboard(text: &str) -> Result<(), String> {
    let mut cb = Clipboard::new().map_err(|e| e.to_string())?;
    cb.set_text(text.to_string()).map_err(|e| e.to_string())
}

/// Copy via the system clipboard, falling back to OSC 52 on the terminal.
pub fn copy(text: &str) -> Result<CopyMethod, String> {
    match try_set_system_clipboard(text) {
        Ok(()) => Ok(CopyMethod::System),
        Err(e) => {
            log::debug!("system clipboard unavailable ({e}), using OSC 52");
            emit_osc52(&mut io::stdout(), text).map_err(|e| e.to_string())?;
            Ok(CopyMethod::Osc52)
        }
    }
}
